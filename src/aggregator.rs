//! Transport aggregation.
//!
//! Merges the primary, auxiliary and display serial ports and the WiFi bridge
//! into one non-blocking byte source, and fans outgoing messages back out to
//! all of them.

use log::{debug, warn};

use crate::error::{LinkError, Result};
use crate::port::{Port, PortSet};
use crate::serial::SerialPort;
use crate::wifi::WifiBridge;

/// One byte pulled by [`Aggregator::next_byte`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incoming {
    pub byte: u8,
    /// Transport the byte came from.
    pub port: Port,
    /// Transports that had data when this poll started.
    pub pending: PortSet,
}

/// Per-port counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortStats {
    pub bytes_received: u32,
    pub bytes_sent: u32,
    pub send_errors: u32,
}

/// Outcome of a broadcast. Failures on one leg never stop the others.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub delivered: PortSet,
    pub failures: Vec<(Port, LinkError)>,
}

impl BroadcastReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self, port: Port) -> bool {
        self.failures.iter().any(|(p, _)| *p == port)
    }
}

/// Fixed-priority poller over every attached transport.
#[derive(Default)]
pub struct Aggregator {
    primary: Option<Box<dyn SerialPort>>,
    aux: Option<Box<dyn SerialPort>>,
    display: Option<Box<dyn SerialPort>>,
    wifi: Option<Box<dyn WifiBridge>>,
    stats: [PortStats; 4],
}

impl Aggregator {
    /// An aggregator with no transports attached.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_primary(mut self, port: impl SerialPort + 'static) -> Self {
        self.primary = Some(Box::new(port));
        self
    }

    pub fn with_aux(mut self, port: impl SerialPort + 'static) -> Self {
        self.aux = Some(Box::new(port));
        self
    }

    pub fn with_display(mut self, port: impl SerialPort + 'static) -> Self {
        self.display = Some(Box::new(port));
        self
    }

    pub fn with_wifi(mut self, bridge: impl WifiBridge + 'static) -> Self {
        self.wifi = Some(Box::new(bridge));
        self
    }

    /// Transports currently attached.
    pub fn attached(&self) -> PortSet {
        let mut set = PortSet::EMPTY;
        for port in Port::ALL {
            let present = match port {
                Port::Wifi => self.wifi.is_some(),
                other => self.serial(other).is_some(),
            };
            if present {
                set.insert(port);
            }
        }
        set
    }

    pub fn stats(&self, port: Port) -> PortStats {
        self.stats[port.index()]
    }

    pub fn reset_stats(&mut self) {
        self.stats = Default::default();
    }

    /// Transports with bytes waiting.
    pub fn pending(&mut self) -> PortSet {
        if let Some(wifi) = self.wifi.as_mut() {
            wifi.receive();
        }
        let mut set = PortSet::EMPTY;
        for port in Port::ALL {
            if self.available_on(port) > 0 {
                set.insert(port);
            }
        }
        set
    }

    /// Bytes waiting across all transports.
    pub fn total_available(&mut self) -> usize {
        if let Some(wifi) = self.wifi.as_mut() {
            wifi.receive();
        }
        Port::ALL.iter().map(|&p| self.available_on(p)).sum()
    }

    /// Take the next byte in priority order: primary, aux, display, WiFi.
    /// Returns `None` immediately when nothing is waiting.
    pub fn next_byte(&mut self) -> Option<Incoming> {
        let pending = self.pending();
        let port = pending.iter().next()?;
        let byte = match port {
            Port::Wifi => match self.wifi.as_mut()?.read() {
                Ok(b) => b,
                Err(LinkError::EmptyQueue) => return None,
                Err(e) => {
                    debug!("WiFi read failed: {e}");
                    return None;
                }
            },
            serial => self.serial_mut(serial)?.read()?,
        };
        let stats = &mut self.stats[port.index()];
        stats.bytes_received = stats.bytes_received.saturating_add(1);
        Some(Incoming { byte, port, pending })
    }

    /// Write `bytes` to every targeted serial port, then to the WiFi bridge
    /// inside a send frame.
    pub fn broadcast(&mut self, targets: PortSet, bytes: &[u8]) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for port in targets.iter().filter(|p| *p != Port::Wifi) {
            let Some(serial) = self.serial_mut(port) else {
                continue;
            };
            let result = serial.write(bytes);
            self.record(&mut report, port, bytes.len(), result);
        }
        if let Some(wifi) = self.wifi.as_mut() {
            let result = Self::framed(&mut **wifi, bytes);
            self.record(&mut report, Port::Wifi, bytes.len(), result);
        }
        report
    }

    /// Broadcast on every transport.
    pub fn broadcast_all(&mut self, bytes: &[u8]) -> BroadcastReport {
        self.broadcast(PortSet::ALL, bytes)
    }

    /// Reset the WiFi bridge. A no-op when no bridge is attached.
    pub fn restart_wifi(&mut self) -> Result<()> {
        match self.wifi.as_mut() {
            Some(wifi) => wifi.restart(),
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn framed(wifi: &mut dyn WifiBridge, bytes: &[u8]) -> Result<()> {
        wifi.send_frame(true)?;
        let written = wifi.write(bytes);
        let closed = wifi.send_frame(false);
        written.and(closed)
    }

    fn record(&mut self, report: &mut BroadcastReport, port: Port, len: usize, result: Result<()>) {
        let stats = &mut self.stats[port.index()];
        match result {
            Ok(()) => {
                let len = u32::try_from(len).unwrap_or(u32::MAX);
                stats.bytes_sent = stats.bytes_sent.saturating_add(len);
                report.delivered.insert(port);
            }
            Err(e) => {
                stats.send_errors = stats.send_errors.saturating_add(1);
                warn!("broadcast on {port} failed: {e}");
                report.failures.push((port, e));
            }
        }
    }

    fn available_on(&self, port: Port) -> usize {
        match port {
            Port::Wifi => self.wifi.as_ref().map_or(0, |w| w.available()),
            serial => self.serial(serial).map_or(0, |s| s.available()),
        }
    }

    fn serial(&self, port: Port) -> Option<&dyn SerialPort> {
        match port {
            Port::Primary => self.primary.as_deref(),
            Port::Aux => self.aux.as_deref(),
            Port::Display => self.display.as_deref(),
            Port::Wifi => None,
        }
    }

    fn serial_mut(&mut self, port: Port) -> Option<&mut (dyn SerialPort + 'static)> {
        match port {
            Port::Primary => self.primary.as_deref_mut(),
            Port::Aux => self.aux.as_deref_mut(),
            Port::Display => self.display.as_deref_mut(),
            Port::Wifi => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
