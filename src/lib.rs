//! # slcan_session
//!
//! ## Features
//!
//! This crate drives a USB CAN adapter (USBtin, CANable and friends) that speaks the
//! line oriented SLCAN ASCII protocol over a serial port. Every request is a short
//! command string terminated by a carriage return, and the adapter answers each one
//! with a status line:
//! '\r' - the command was accepted, possibly preceded by response text
//! '\x07' (BEL) - the command was rejected
//!
//! Transmit commands ('t', 'T', 'r', 'R') are special: the adapter first answers with
//! the acknowledgment token "z", and then echoes the transmitted command back as a
//! second, independently terminated line once the frame has gone out on the bus.
//!
//! The engine is layered:
//! - [`Framer`] turns the byte stream into [`Line`]s
//! - [`CommandChannel`] writes one [`Command`] and reads its status line
//! - [`InitSequencer`] resynchronizes a freshly opened adapter and configures the channel
//! - [`EchoVerifier`] checks the ack and loopback lines of transmit commands
//! - [`Session`] owns the [`Transport`] and ties everything together
//!
//! An example against a real adapter:
//!
//! ```no_run
//! use slcan_session::{Command, SerialTransport, Session, SessionConfig};
//!
//! let transport = SerialTransport::open("/dev/ttyACM0")?;
//! let mut session = Session::new(transport, SessionConfig::default());
//! let version = session.initialize()?;
//! println!("connected to {}", version);
//! session.send_verified(&Command::new("t001411223344")?)?;
//! # Ok::<(), slcan_session::Error>(())
//! ```
//!
//! All I/O is blocking and strictly sequential: one exchange is in flight at a time.

#[macro_use]
extern crate machine;

mod channel;
mod command;
mod echo;
mod frame;
mod framer;
mod init;
#[cfg(test)]
mod mock;
mod session;
mod trace;
mod transport;

pub use crate::channel::CommandChannel;
pub use crate::command::{Bitrate, ChannelMode, Command};
pub use crate::echo::EchoVerifier;
pub use crate::frame::{CanserialFrame, FrameDataLen};
pub use crate::framer::{Framer, Line};
pub use crate::init::{InitSequencer, InitStage, Version};
pub use crate::session::{Session, SessionConfig, SessionState};
pub use crate::trace::format_hex;
pub use crate::transport::{SerialTransport, Transport, BAUD_RATE};

use crate::trace::printable;
use std::io;
use std::time::Duration;

/// Normal line terminator
pub const CR: u8 = b'\r';
/// Error terminator, sent by the adapter when the preceding command failed
pub const BEL: u8 = 0x07;
/// Acknowledgment line preceding the loopback echo of a transmit command
pub const ACK_TOKEN: &str = "z";
/// A line longer than this means the stream lost framing
pub const MAX_LINE_LEN: usize = 512;

/// Errors that can be encountered in this crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The serial device could not be opened
    #[error("unable to open port {path}: {source}")]
    PortUnavailable {
        path: String,
        #[source]
        source: serialport::Error,
    },
    /// The serial device opened but rejected the line settings
    #[error("unable to configure port {path}: {source}")]
    ConfigurationFailed {
        path: String,
        #[source]
        source: serialport::Error,
    },
    /// Read or write failure of the underlying transport, including read timeouts
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),
    /// Writing a command failed, nothing is assumed to have been sent
    #[error("failed to write command '{command}': {source}")]
    WriteFailure {
        command: Command,
        #[source]
        source: io::Error,
    },
    /// No terminator seen within `limit` bytes
    #[error("no line terminator within {limit} bytes, stream is desynchronized (received [{}])", format_hex(.partial))]
    FramingOverflow { limit: usize, partial: Vec<u8> },
    /// The adapter never produced a terminator while draining
    #[error("adapter did not resynchronize within {waited:?} (drained [{}])", format_hex(.drained))]
    ResyncTimeout { waited: Duration, drained: Vec<u8> },
    /// A configuration stage of the bring-up failed
    #[error("initialization failed at stage '{stage}': {cause}")]
    InitRejected {
        stage: InitStage,
        #[source]
        cause: Box<Error>,
    },
    /// The adapter answered the command with the error terminator
    #[error("device rejected command '{command}'")]
    DeviceRejected { command: Command },
    /// A transmit command was answered with something other than the ack token
    #[error("unexpected ack to '{command}', expected '{expected}', actual '{}' [{}]", printable(.actual), format_hex(.actual))]
    UnexpectedAck {
        command: Command,
        expected: &'static str,
        actual: Vec<u8>,
    },
    /// The adapter signaled an error instead of echoing the transmitted frame
    #[error("device signaled an error instead of the loopback of '{command}'")]
    LoopbackError { command: Command },
    /// The loopback echo differs from the transmitted command
    #[error("mismatched loopback response, expected '{expected}', actual '{}' [{}]", printable(.actual), format_hex(.actual))]
    LoopbackMismatch { expected: Command, actual: Vec<u8> },
    /// Command text containing a terminator or a non printable byte
    #[error("invalid command text [{}]", format_hex(.0))]
    InvalidCommand(Vec<u8>),
    /// Data length not within bounds
    #[error("data length {0} out of range 0..=8")]
    DataLen(usize),
    /// The operation needs a session state that has not been reached, or was lost
    #[error("session is {state}, operation not permitted")]
    NotReady { state: SessionState },
}

impl Error {
    /// Whether the session that produced this error must be discarded.
    ///
    /// Validation failures of a single exchange leave the session usable; transport,
    /// framing and bring-up failures do not.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::DeviceRejected { .. }
                | Error::UnexpectedAck { .. }
                | Error::LoopbackError { .. }
                | Error::LoopbackMismatch { .. }
                | Error::InvalidCommand(_)
                | Error::DataLen(_)
                | Error::NotReady { .. }
        )
    }
}

/// Result alias used throughout the crate
pub type Result<T> = core::result::Result<T, Error>;
