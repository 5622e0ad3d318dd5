//! WiFi bridge driver for an ESP-01 companion module running AT firmware.
//!
//! The module sits on a serial link. Data from network clients arrives
//! wrapped as `+IPD,<channel>,<len>:<payload>`; only the payload reaches the
//! receive queue. Outgoing data is collected between `send_frame(true)` and
//! `send_frame(false)` and sent with `AT+CIPSEND=<channel>,<len>`.

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::{LinkError, Result};
use crate::serial::SerialPort;

/// Acknowledgement window for [`WifiBridge::restart`].
pub const RESTART_TIMEOUT: Duration = Duration::from_secs(2);

/// Receive queue capacity (bytes). Overflow is dropped.
pub const QUEUE_CAPACITY: usize = 256;

/// TCP port the module serves on.
pub const SERVER_PORT: u16 = 1090;

const IPD_PREFIX: &[u8] = b"+IPD,";
const READY: &str = "ready";

/// Driver contract for the WiFi bridge.
pub trait WifiBridge {
    /// Move bytes from the module link into the receive queue.
    fn receive(&mut self);

    /// Next queued byte, or [`LinkError::EmptyQueue`].
    fn read(&mut self) -> Result<u8>;

    /// Number of queued bytes.
    fn available(&self) -> usize;

    /// Open (`true`) or close and transmit (`false`) a send frame.
    fn send_frame(&mut self, start: bool) -> Result<()>;

    /// Append to the open frame, or send a one-shot frame when none is open.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Reset the module and wait for it to come back. Unread bytes are lost.
    fn restart(&mut self) -> Result<()>;
}

/// `+IPD` unwrapping state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ipd {
    Idle { matched: usize },
    Channel(u8),
    Length { channel: u8, len: usize },
    Payload { remaining: usize },
}

/// ESP-01 driver over any [`SerialPort`].
#[derive(Debug)]
pub struct Esp01<P> {
    link: P,
    rx: VecDeque<u8>,
    ipd: Ipd,
    /// Open send frame.
    tx: Option<Vec<u8>>,
    /// Channel of the last client that sent data; replies go there.
    channel: u8,
    responsive: bool,
    timeout: Duration,
    dropped: usize,
}

impl<P: SerialPort> Esp01<P> {
    pub fn new(link: P) -> Self {
        Self::with_timeout(link, RESTART_TIMEOUT)
    }

    pub fn with_timeout(link: P, timeout: Duration) -> Self {
        Self {
            link,
            rx: VecDeque::with_capacity(QUEUE_CAPACITY),
            ipd: Ipd::Idle { matched: 0 },
            tx: None,
            channel: 0,
            responsive: true,
            timeout,
            dropped: 0,
        }
    }

    /// False after a restart that timed out, until a restart succeeds.
    pub fn is_responsive(&self) -> bool {
        self.responsive
    }

    /// Bytes dropped because the receive queue was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Borrow the underlying link.
    pub fn link(&self) -> &P {
        &self.link
    }

    fn unwrap_byte(&mut self, b: u8) {
        self.ipd = match self.ipd {
            Ipd::Idle { matched } => {
                if b == IPD_PREFIX[matched] {
                    if matched + 1 == IPD_PREFIX.len() {
                        Ipd::Channel(0)
                    } else {
                        Ipd::Idle { matched: matched + 1 }
                    }
                } else if b == IPD_PREFIX[0] {
                    Ipd::Idle { matched: 1 }
                } else {
                    Ipd::Idle { matched: 0 }
                }
            }
            Ipd::Channel(ch) => match b {
                b'0'..=b'9' => Ipd::Channel(ch.saturating_mul(10).saturating_add(b - b'0')),
                b',' => Ipd::Length { channel: ch, len: 0 },
                _ => Ipd::Idle { matched: 0 },
            },
            Ipd::Length { channel, len } => match b {
                b'0'..=b'9' => Ipd::Length {
                    channel,
                    len: len.saturating_mul(10).saturating_add(usize::from(b - b'0')),
                },
                b':' if len > 0 => {
                    self.channel = channel;
                    Ipd::Payload { remaining: len }
                }
                _ => Ipd::Idle { matched: 0 },
            },
            Ipd::Payload { remaining } => {
                if self.rx.len() < QUEUE_CAPACITY {
                    self.rx.push_back(b);
                } else {
                    self.dropped += 1;
                    if self.dropped == 1 {
                        warn!("WiFi receive queue full, dropping input");
                    }
                }
                if remaining > 1 {
                    Ipd::Payload { remaining: remaining - 1 }
                } else {
                    Ipd::Idle { matched: 0 }
                }
            }
        };
    }

    fn transmit(&mut self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Ok(());
        }
        let header = format!("AT+CIPSEND={},{}\r\n", self.channel, payload.len());
        self.link.write(header.as_bytes())?;
        self.link.write(payload)
    }

    /// Poll the link for a `ready` line until the deadline.
    fn wait_ready(&mut self) -> bool {
        let deadline = Instant::now() + self.timeout;
        let mut line = String::new();
        loop {
            while let Some(b) = self.link.read() {
                match b {
                    b'\r' | b'\n' => {
                        if line.trim() == READY {
                            return true;
                        }
                        line.clear();
                    }
                    _ => line.push(b as char),
                }
            }
            if line.trim() == READY {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl<P: SerialPort> WifiBridge for Esp01<P> {
    fn receive(&mut self) {
        while let Some(b) = self.link.read() {
            self.unwrap_byte(b);
        }
    }

    fn read(&mut self) -> Result<u8> {
        if self.rx.is_empty() {
            self.receive();
        }
        self.rx.pop_front().ok_or(LinkError::EmptyQueue)
    }

    fn available(&self) -> usize {
        self.rx.len()
    }

    fn send_frame(&mut self, start: bool) -> Result<()> {
        if !self.responsive {
            self.tx = None;
            return Err(LinkError::DeviceUnresponsive);
        }
        if start {
            self.tx = Some(Vec::new());
            Ok(())
        } else {
            match self.tx.take() {
                Some(payload) => self.transmit(&payload),
                None => Ok(()),
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.responsive {
            return Err(LinkError::DeviceUnresponsive);
        }
        match self.tx.as_mut() {
            Some(frame) => {
                frame.extend_from_slice(bytes);
                Ok(())
            }
            None => self.transmit(bytes),
        }
    }

    fn restart(&mut self) -> Result<()> {
        debug!("restarting WiFi bridge");
        self.rx.clear();
        self.tx = None;
        self.ipd = Ipd::Idle { matched: 0 };
        self.link.write(b"AT+RST\r\n")?;

        if !self.wait_ready() {
            warn!("WiFi bridge did not answer within {:?}", self.timeout);
            self.responsive = false;
            return Err(LinkError::DeviceUnresponsive);
        }

        self.link.write(b"AT+CIPMUX=1\r\n")?;
        self.link
            .write(format!("AT+CIPSERVER=1,{SERVER_PORT}\r\n").as_bytes())?;
        self.responsive = true;
        info!("WiFi bridge ready");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::MemoryPort;

    fn bridge() -> (Esp01<MemoryPort>, MemoryPort) {
        let link = MemoryPort::new();
        (Esp01::with_timeout(link.clone(), Duration::from_millis(20)), link)
    }

    #[test]
    fn unwraps_ipd_payload() {
        let (mut esp, link) = bridge();
        link.inject(b"\r\n0,CONNECT\r\n\r\n+IPD,2,7:{\"A\":1}\r\nOK\r\n");
        esp.receive();
        assert_eq!(esp.available(), 7);
        assert_eq!(esp.channel(), 2);
        let mut out = Vec::new();
        while let Ok(b) = esp.read() {
            out.push(b);
        }
        assert_eq!(out, b"{\"A\":1}");
    }

    #[test]
    fn empty_queue() {
        let (mut esp, _link) = bridge();
        assert!(matches!(esp.read(), Err(LinkError::EmptyQueue)));
    }

    #[test]
    fn payload_split_across_receives() {
        let (mut esp, link) = bridge();
        link.inject(b"+IP");
        esp.receive();
        link.inject(b"D,0,3:ab");
        esp.receive();
        link.inject(b"c+IPD,0,1:d");
        esp.receive();
        assert_eq!(esp.available(), 4);
    }

    #[test]
    fn queue_overflow_drops() {
        let (mut esp, link) = bridge();
        let mut data = format!("+IPD,0,{}:", QUEUE_CAPACITY + 10).into_bytes();
        data.extend(std::iter::repeat_n(b'x', QUEUE_CAPACITY + 10));
        link.inject(&data);
        esp.receive();
        assert_eq!(esp.available(), QUEUE_CAPACITY);
        assert_eq!(esp.dropped(), 10);
    }

    #[test]
    fn framed_send() {
        let (mut esp, link) = bridge();
        link.inject(b"+IPD,3,1:x");
        esp.receive();
        esp.send_frame(true).unwrap();
        esp.write(b"{\"NAME_ID\":").unwrap();
        esp.write(b"7}").unwrap();
        assert!(link.tx().is_empty());
        esp.send_frame(false).unwrap();
        assert_eq!(link.take_tx(), b"AT+CIPSEND=3,13\r\n{\"NAME_ID\":7}");
    }

    #[test]
    fn restart_ok() {
        let (mut esp, link) = bridge();
        link.inject(b"+IPD,0,2:ab");
        esp.receive();
        link.inject(b"\r\nets Jan  8 2013\r\nready\r\n");
        esp.restart().unwrap();
        assert!(esp.is_responsive());
        assert_eq!(esp.available(), 0);
        let tx = String::from_utf8(link.take_tx()).unwrap();
        assert!(tx.starts_with("AT+RST\r\n"));
        assert!(tx.contains("AT+CIPSERVER=1,1090"));
    }

    #[test]
    fn restart_timeout_marks_unresponsive() {
        let (mut esp, _link) = bridge();
        assert!(matches!(esp.restart(), Err(LinkError::DeviceUnresponsive)));
        assert!(!esp.is_responsive());
        assert!(matches!(esp.send_frame(true), Err(LinkError::DeviceUnresponsive)));
        assert!(matches!(esp.write(b"x"), Err(LinkError::DeviceUnresponsive)));
    }

    #[test]
    fn restart_recovers() {
        let (mut esp, link) = bridge();
        let _ = esp.restart();
        assert!(!esp.is_responsive());
        link.inject(b"ready\r\n");
        esp.restart().unwrap();
        assert!(esp.write(b"x").is_ok());
    }
}
