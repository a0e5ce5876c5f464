//! The byte channel underneath the protocol engine.

use crate::Error;
use log::*;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Line speed of the adapter's virtual serial port
pub const BAUD_RATE: u32 = 115_200;

/// How long a single byte read may block before reporting that nothing arrived
const POLL_WINDOW: Duration = Duration::from_millis(10);

/// Duplex byte stream to the adapter.
///
/// `read_byte` blocks for at most a short, transport defined poll window. When no
/// byte arrived in that window it fails with `TimedOut` or `WouldBlock`; callers
/// treat that as "try again" and enforce their own deadlines.
pub trait Transport {
    /// Read exactly one byte
    fn read_byte(&mut self) -> io::Result<u8>;
    /// Write the whole buffer in one go
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;
    /// Discard whatever the adapter already sent and nobody read yet
    fn flush_input(&mut self) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_byte(&mut self) -> io::Result<u8> {
        (**self).read_byte()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_bytes(bytes)
    }

    fn flush_input(&mut self) -> io::Result<()> {
        (**self).flush_input()
    }
}

/// A read that failed only because nothing arrived in time
pub(crate) fn is_poll_expiry(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// An adapter attached through the `serialport` crate.
///
/// The port is raw 8N1 at [`BAUD_RATE`] without flow control, and is closed when
/// this value is dropped.
pub struct SerialTransport {
    path: String,
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open the adapter at `path` with the standard line settings
    pub fn open(path: &str) -> Result<Self, Error> {
        SerialTransport::open_with_baud_rate(path, BAUD_RATE)
    }

    /// Open the adapter at `path` with a non standard line speed
    pub fn open_with_baud_rate(path: &str, baud_rate: u32) -> Result<Self, Error> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(POLL_WINDOW)
            .open()
            .map_err(|source| open_error(path, source))?;
        debug!("serial port '{}' opened at {} baud", path, baud_rate);
        Ok(SerialTransport {
            path: path.to_string(),
            port,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Only a missing or inaccessible device is unavailable; a path that opened but
/// refused the line settings (not a tty, unsupported speed) failed configuration
fn open_error(path: &str, source: serialport::Error) -> Error {
    match source.kind() {
        serialport::ErrorKind::NoDevice
        | serialport::ErrorKind::Io(io::ErrorKind::NotFound)
        | serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => Error::PortUnavailable {
            path: path.to_string(),
            source,
        },
        _ => Error::ConfigurationFailed {
            path: path.to_string(),
            source,
        },
    }
}

impl Transport for SerialTransport {
    fn read_byte(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf)? {
            0 => Err(io::ErrorKind::TimedOut.into()),
            _ => Ok(buf[0]),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        // one write, the adapter does not reassemble commands split across USB packets
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn flush_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::All).map_err(io::Error::from)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        debug!("closing serial port '{}'", self.path);
    }
}
