use crate::frame::write_transmit;
use crate::{Error, CR};
use core::fmt;
use core::str::FromStr;
use embedded_can::Frame;

/// One protocol request, without its terminator.
///
/// The text is restricted to printable ASCII so that it can never contain the
/// normal or the error terminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(String);

impl Command {
    /// Validate `text` as a command
    pub fn new(text: impl Into<String>) -> Result<Self, Error> {
        let text = text.into();
        if text.bytes().all(is_command_byte) {
            Ok(Command(text))
        } else {
            Err(Error::InvalidCommand(text.into_bytes()))
        }
    }

    /// Version query, 'v'
    pub fn version() -> Self {
        Command("v".into())
    }

    /// Close the CAN channel, 'C'
    pub fn close() -> Self {
        Command("C".into())
    }

    /// Open the CAN channel in the given mode, 'O' or 'l'
    pub fn open(mode: ChannelMode) -> Self {
        Command(mode.command_letter().into())
    }

    /// Select one of the standard bitrates, 'S0' to 'S8'
    pub fn bitrate(bitrate: Bitrate) -> Self {
        Command(format!("S{}", bitrate.code()))
    }

    /// Write a controller register, 'W' followed by register and value in hex
    pub fn write_register(register: u8, value: u8) -> Self {
        Command(format!("W{:02X}{:02X}", register, value))
    }

    /// The filter/mask setup used when nothing else is configured: clears the
    /// controller's receive buffer control register so every frame is accepted.
    pub fn default_filter() -> Self {
        Command::write_register(0x2D, 0x00)
    }

    /// Render a CAN frame as a transmit command ('t', 'T', 'r' or 'R')
    pub fn transmit<F: Frame>(frame: &F) -> Self {
        let mut text = String::with_capacity(1 + 8 + 1 + 16);
        // writing into a String cannot fail
        let _ = write_transmit(frame, &mut text);
        Command(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The bytes that go on the wire: the text plus the normal terminator
    pub(crate) fn to_wire(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(self.0.len() + 1);
        wire.extend_from_slice(self.0.as_bytes());
        wire.push(CR);
        wire
    }
}

fn is_command_byte(byte: u8) -> bool {
    byte == b' ' || byte.is_ascii_graphic()
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::new(s)
    }
}

impl TryFrom<&str> for Command {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Command::new(value)
    }
}

impl AsRef<[u8]> for Command {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// How the CAN channel is opened at the end of bring-up
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ChannelMode {
    /// Receive only, the adapter never acknowledges or transmits on the bus
    #[default]
    ListenOnly,
    /// Regular bus participant
    Normal,
}

impl ChannelMode {
    fn command_letter(self) -> &'static str {
        match self {
            ChannelMode::ListenOnly => "l",
            ChannelMode::Normal => "O",
        }
    }
}

/// Standard SLCAN bitrates
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Bitrate {
    Rate10Kbit,
    Rate20Kbit,
    Rate50Kbit,
    Rate100Kbit,
    Rate125Kbit,
    Rate250Kbit,
    #[default]
    Rate500Kbit,
    Rate750Kbit,
    Rate1Mbit,
}

impl Bitrate {
    /// All bitrates in command code order
    pub const ALL: [Bitrate; 9] = [
        Bitrate::Rate10Kbit,
        Bitrate::Rate20Kbit,
        Bitrate::Rate50Kbit,
        Bitrate::Rate100Kbit,
        Bitrate::Rate125Kbit,
        Bitrate::Rate250Kbit,
        Bitrate::Rate500Kbit,
        Bitrate::Rate750Kbit,
        Bitrate::Rate1Mbit,
    ];

    /// Look up the standard bitrate for a value in bit/s
    pub fn from_bps(bps: u32) -> Option<Self> {
        Bitrate::ALL.iter().copied().find(|rate| rate.bps() == bps)
    }

    pub fn bps(self) -> u32 {
        match self {
            Bitrate::Rate10Kbit => 10_000,
            Bitrate::Rate20Kbit => 20_000,
            Bitrate::Rate50Kbit => 50_000,
            Bitrate::Rate100Kbit => 100_000,
            Bitrate::Rate125Kbit => 125_000,
            Bitrate::Rate250Kbit => 250_000,
            Bitrate::Rate500Kbit => 500_000,
            Bitrate::Rate750Kbit => 750_000,
            Bitrate::Rate1Mbit => 1_000_000,
        }
    }

    fn code(self) -> u8 {
        self as u8
    }
}
