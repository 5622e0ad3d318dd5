//! Serial byte-stream transports.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use crate::error::Result;

/// A non-blocking byte stream (UART, USB CDC, ...).
pub trait SerialPort {
    /// Next received byte, or `None` when nothing is waiting.
    fn read(&mut self) -> Option<u8>;

    /// Number of received bytes waiting.
    fn available(&self) -> usize;

    /// Queue bytes for transmission.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    fail_writes: bool,
}

/// In-memory serial port.
///
/// Clones share the same buffers, so a test (or a host bridge) can keep a
/// handle for injecting input and inspecting output after the port has been
/// handed to an [`Aggregator`](crate::aggregator::Aggregator).
///
/// ```
/// use etarget::serial::{MemoryPort, SerialPort};
///
/// let port = MemoryPort::new();
/// let mut handle = port.clone();
/// port.inject(b"{}");
/// assert_eq!(handle.read(), Some(b'{'));
/// handle.write(b"ok").unwrap();
/// assert_eq!(port.take_tx(), b"ok");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryPort {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as if they had been received.
    pub fn inject(&self, data: &[u8]) {
        self.inner.borrow_mut().rx.extend(data);
    }

    /// Everything written so far.
    pub fn tx(&self) -> Vec<u8> {
        self.inner.borrow().tx.clone()
    }

    /// Everything written so far, clearing the transmit buffer.
    pub fn take_tx(&self) -> Vec<u8> {
        std::mem::take(&mut self.inner.borrow_mut().tx)
    }

    /// Make subsequent writes fail with `BrokenPipe`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_writes = fail;
    }
}

impl SerialPort for MemoryPort {
    fn read(&mut self) -> Option<u8> {
        self.inner.borrow_mut().rx.pop_front()
    }

    fn available(&self) -> usize {
        self.inner.borrow().rx.len()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "port closed").into());
        }
        inner.tx.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;

    #[test]
    fn read_in_order() {
        let mut port = MemoryPort::new();
        port.inject(b"ab");
        assert_eq!(port.available(), 2);
        assert_eq!(port.read(), Some(b'a'));
        assert_eq!(port.read(), Some(b'b'));
        assert_eq!(port.read(), None);
    }

    #[test]
    fn failing_writes() {
        let mut port = MemoryPort::new();
        port.set_fail_writes(true);
        assert!(matches!(port.write(b"x"), Err(LinkError::Io(_))));
        assert!(port.tx().is_empty());
    }
}
