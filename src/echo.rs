use crate::channel::CommandChannel;
use crate::command::Command;
use crate::framer::Line;
use crate::transport::Transport;
use crate::{Error, Result, ACK_TOKEN};
use log::*;

/// Checks the two line answer to a transmit command.
///
/// The adapter acknowledges the command with "z" as soon as it has queued the frame,
/// then echoes the command text as a separate line once the frame went out on the
/// bus. Both lines are read and validated on their own; they are never merged into
/// one read.
pub struct EchoVerifier<'a, T> {
    channel: &'a mut CommandChannel<T>,
}

impl<'a, T: Transport> EchoVerifier<'a, T> {
    pub fn new(channel: &'a mut CommandChannel<T>) -> Self {
        EchoVerifier { channel }
    }

    /// Send `command` and require "z" followed by an exact echo of `command`
    pub fn send_verified(&mut self, command: &Command) -> Result<()> {
        match self.channel.exchange(command)? {
            Line::Signaled => {
                return Err(Error::DeviceRejected {
                    command: command.clone(),
                })
            }
            Line::Terminated(ack) if ack == ACK_TOKEN.as_bytes() => {}
            Line::Terminated(ack) => {
                return Err(Error::UnexpectedAck {
                    command: command.clone(),
                    expected: ACK_TOKEN,
                    actual: ack,
                })
            }
        }

        // the loopback is unsolicited, no command goes out for it
        match self.channel.read_line()? {
            Line::Signaled => Err(Error::LoopbackError {
                command: command.clone(),
            }),
            Line::Terminated(echo) if echo == command.as_bytes() => {
                debug!("'{}' looped back", command);
                Ok(())
            }
            Line::Terminated(echo) => Err(Error::LoopbackMismatch {
                expected: command.clone(),
                actual: echo,
            }),
        }
    }
}
