use crate::trace::{dump, format_hex};
use crate::transport::{is_poll_expiry, Transport};
use crate::{Error, Result, BEL, CR, MAX_LINE_LEN};
use heapless::Vec as LineBuffer;
use log::*;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

/// Default deadline for a complete line
pub(crate) const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Default pause after a read that came back empty
pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One terminator delimited unit received from the adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Ended by the normal terminator, which is not part of the payload
    Terminated(Vec<u8>),
    /// Ended by the error terminator; whatever preceded it is dropped
    Signaled,
}

impl Line {
    /// Payload of a terminated line
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Line::Terminated(payload) => Some(payload.as_slice()),
            Line::Signaled => None,
        }
    }

    pub fn is_signaled(&self) -> bool {
        matches!(self, Line::Signaled)
    }
}

/// Splits the adapter's byte stream into [`Line`]s, one byte at a time
pub struct Framer<T> {
    transport: T,
    buffer: LineBuffer<u8, MAX_LINE_LEN>,
    read_timeout: Duration,
    poll_interval: Duration,
    trace: bool,
}

impl<T: Transport> Framer<T> {
    pub fn new(transport: T) -> Self {
        Framer {
            transport,
            buffer: LineBuffer::new(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            trace: false,
        }
    }

    /// Give up on a line when no terminator arrives within `timeout`
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sleep this long before retrying a read that found nothing
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Dump every received line
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub(crate) fn is_tracing(&self) -> bool {
        self.trace
    }

    /// Read the next line.
    ///
    /// A transport failure, a read timeout or an overlong line abandon the partial line;
    /// there is no recovery of partially received data.
    pub fn read_line(&mut self) -> Result<Line> {
        let started = Instant::now();
        loop {
            let byte = match self.transport.read_byte() {
                Ok(byte) => byte,
                Err(e) if is_poll_expiry(&e) => {
                    let waited = started.elapsed();
                    if waited < self.read_timeout {
                        thread::sleep(self.poll_interval.min(self.read_timeout - waited));
                        continue;
                    }
                    let partial = self.take();
                    return Err(Error::Transport(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!(
                            "no line terminator within {:?} (received [{}])",
                            self.read_timeout,
                            format_hex(&partial)
                        ),
                    )));
                }
                Err(e) => {
                    self.buffer.clear();
                    return Err(Error::Transport(e));
                }
            };
            match byte {
                CR => {
                    let payload = self.take();
                    if self.trace {
                        let mut raw = payload.clone();
                        raw.push(CR);
                        dump("R", &raw);
                    }
                    return Ok(Line::Terminated(payload));
                }
                BEL => {
                    let discarded = self.take();
                    if self.trace {
                        let mut raw = discarded.clone();
                        raw.push(BEL);
                        dump("R", &raw);
                    }
                    if !discarded.is_empty() {
                        debug!(
                            "dropping [{}] before error terminator",
                            format_hex(&discarded)
                        );
                    }
                    return Ok(Line::Signaled);
                }
                _ => {
                    if self.buffer.push(byte).is_err() {
                        let mut partial = self.take();
                        partial.push(byte);
                        return Err(Error::FramingOverflow {
                            limit: MAX_LINE_LEN,
                            partial,
                        });
                    }
                }
            }
        }
    }

    /// Forget any partially received line
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn take(&mut self) -> Vec<u8> {
        let bytes = self.buffer.to_vec();
        self.buffer.clear();
        bytes
    }
}
