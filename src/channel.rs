use crate::command::Command;
use crate::framer::{Framer, Line};
use crate::trace::dump;
use crate::transport::Transport;
use crate::{Error, Result};
use log::*;
use std::io;

/// Write one command, read one line.
///
/// Exchanges never overlap: the response of a command is consumed before the next
/// command can be written, and nothing is retried.
pub struct CommandChannel<T> {
    framer: Framer<T>,
}

impl<T: Transport> CommandChannel<T> {
    pub fn new(framer: Framer<T>) -> Self {
        CommandChannel { framer }
    }

    /// Send `command` with its terminator and return the adapter's status line.
    ///
    /// A [`Line::Signaled`] answer is returned as is; deciding what a rejection means
    /// is up to the caller.
    pub fn exchange(&mut self, command: &Command) -> Result<Line> {
        self.write(command)?;
        let line = self.framer.read_line()?;
        debug!("'{}' -> {:?}", command, line);
        Ok(line)
    }

    /// Read a line the adapter sends without being asked, such as a loopback echo
    pub fn read_line(&mut self) -> Result<Line> {
        self.framer.read_line()
    }

    pub(crate) fn write(&mut self, command: &Command) -> Result<()> {
        self.write_raw(&command.to_wire())
            .map_err(|source| Error::WriteFailure {
                command: command.clone(),
                source,
            })
    }

    pub(crate) fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.framer.is_tracing() {
            dump("W", bytes);
        }
        self.framer.transport_mut().write_bytes(bytes)
    }

    pub fn framer(&self) -> &Framer<T> {
        &self.framer
    }

    pub fn framer_mut(&mut self) -> &mut Framer<T> {
        &mut self.framer
    }

    pub fn into_inner(self) -> T {
        self.framer.into_inner()
    }
}
