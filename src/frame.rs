//! Classic CAN frames rendered as SLCAN transmit commands.
//!
//! A transmit command begins with one character that defines what type of CAN frame it is:
//! 't' - a standard id CAN frame
//! 'r' - a standard id RTR CAN frame
//! 'T' - an extended id CAN frame
//! 'R' - an extended id RTR CAN frame
//! followed by 3 hex digits for a standard id or 8 for an extended id, one hex digit of
//! data length, and two hex digits per data byte (none for RTR frames).
//!
//! id 0x1, data 0x11 0x22 0x33 0x44 is sent as `t001411223344`

use crate::command::Command;
use crate::Error;
use core::convert::TryFrom;
use core::fmt;
use embedded_can::{Frame, Id, StandardId};

/// Constrain a usize to values allowed for frame data length [0..8]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameDataLen(usize);

impl FrameDataLen {
    /// Create a new `FrameDataLen`
    pub const fn new(value: usize) -> Result<Self, Error> {
        if value <= 8 {
            Ok(Self(value))
        } else {
            Err(Error::DataLen(value))
        }
    }
    /// Get the raw value of the FrameDataLen
    pub const fn raw(&self) -> usize {
        self.0
    }
}

impl TryFrom<usize> for FrameDataLen {
    type Error = Error;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        FrameDataLen::new(value)
    }
}

/// CanserialFrame
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CanserialFrame {
    rtr: bool,
    dlc: FrameDataLen,
    id: Id,
    data: [u8; 8],
}

impl CanserialFrame {
    /// a data frame
    pub fn new_frame(can_id: impl Into<Id>, data: &[u8]) -> Result<Self, Error> {
        let mut frame = CanserialFrame {
            rtr: false,
            dlc: FrameDataLen::try_from(data.len())?,
            id: can_id.into(),
            data: [0; 8],
        };
        frame.data[..frame.dlc.raw()].copy_from_slice(data);
        Ok(frame)
    }

    /// a remote frame requesting `dlc` bytes
    pub fn new_remote_frame(can_id: impl Into<Id>, dlc: usize) -> Result<Self, Error> {
        Ok(CanserialFrame {
            rtr: true,
            dlc: FrameDataLen::try_from(dlc)?,
            id: can_id.into(),
            data: [0; 8],
        })
    }

    /// The transmit command for this frame
    pub fn to_command(&self) -> Command {
        Command::transmit(self)
    }
}

impl Default for CanserialFrame {
    fn default() -> Self {
        CanserialFrame {
            rtr: false,
            dlc: FrameDataLen(0),
            id: Id::Standard(StandardId::ZERO),
            data: [0; 8],
        }
    }
}

impl fmt::Display for CanserialFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_transmit(self, f)
    }
}

/// Write the transmit command text of any frame, without terminator
pub(crate) fn write_transmit<F: Frame, W: fmt::Write>(frame: &F, out: &mut W) -> fmt::Result {
    let prefix = match (frame.is_extended(), frame.is_remote_frame()) {
        (false, false) => 't',
        (false, true) => 'r',
        (true, false) => 'T',
        (true, true) => 'R',
    };
    match frame.id() {
        Id::Standard(id) => write!(out, "{}{:03X}", prefix, id.as_raw())?,
        Id::Extended(id) => write!(out, "{}{:08X}", prefix, id.as_raw())?,
    }
    write!(out, "{:X}", frame.dlc())?;
    if !frame.is_remote_frame() {
        for byte in frame.data() {
            write!(out, "{:02X}", byte)?;
        }
    }
    Ok(())
}

impl Frame for CanserialFrame {
    /// Creates a new frame.
    ///
    /// This will return `None` if the data slice is too long.
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        CanserialFrame::new_frame(id, data).ok()
    }

    /// Creates a new remote frame (RTR bit set).
    ///
    /// This will return `None` if the data length code (DLC) is not valid.
    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        CanserialFrame::new_remote_frame(id, dlc).ok()
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        self.rtr
    }

    fn id(&self) -> Id {
        self.id
    }

    /// Returns the data length code (DLC) which is in the range 0..8.
    ///
    /// Remote frames do not carry any data, yet the DLC can be greater than 0.
    fn dlc(&self) -> usize {
        self.dlc.raw()
    }

    /// Returns the frame data (0..8 bytes in length).
    fn data(&self) -> &[u8] {
        if self.rtr {
            &self.data[0..0]
        } else {
            &self.data[..self.dlc.raw()]
        }
    }
}
