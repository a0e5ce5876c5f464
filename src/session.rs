use crate::channel::CommandChannel;
use crate::command::{Bitrate, ChannelMode, Command};
use crate::echo::EchoVerifier;
use crate::framer::{Framer, Line, DEFAULT_READ_TIMEOUT};
use crate::init::{InitSequencer, Version};
use crate::transport::Transport;
use crate::{Error, Result};
use core::fmt;
use embedded_can::Frame;
use log::*;
use std::time::Duration;

/// Connection state of one adapter
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing known about the adapter's framing
    Unsynchronized,
    /// Framing recovered, configuration in progress
    Synchronized,
    /// Configured, channel not yet open
    Configured,
    /// Channel open, transmit commands allowed
    Ready,
    /// A fatal error happened; the session has to be replaced
    Faulted,
}

impl SessionState {
    /// Whether plain commands may be sent
    pub fn is_synchronized(self) -> bool {
        matches!(
            self,
            SessionState::Synchronized | SessionState::Configured | SessionState::Ready
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Unsynchronized => "unsynchronized",
            SessionState::Synchronized => "synchronized",
            SessionState::Configured => "configured",
            SessionState::Ready => "ready",
            SessionState::Faulted => "faulted",
        })
    }
}

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How the channel is opened
    pub channel_mode: ChannelMode,
    /// Dump every byte written and every line read
    pub verbose_trace: bool,
    pub bitrate: Bitrate,
    /// Filter/mask setup issued between the version query and the bitrate
    pub filter_command: Command,
    /// Pause after the first close so the adapter can finish what it was doing
    pub settle_delay: Duration,
    /// Pause between empty reads, both while draining and while waiting for a line
    pub poll_interval: Duration,
    /// Give up draining after this long
    pub resync_timeout: Duration,
    /// Give up waiting for a line after this long
    pub read_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            channel_mode: ChannelMode::default(),
            verbose_trace: false,
            bitrate: Bitrate::default(),
            filter_command: Command::default_filter(),
            settle_delay: Duration::from_millis(100),
            poll_interval: Duration::from_millis(100),
            resync_timeout: Duration::from_secs(2),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl SessionConfig {
    pub fn with_channel_mode(mut self, mode: ChannelMode) -> Self {
        self.channel_mode = mode;
        self
    }

    pub fn with_verbose_trace(mut self, verbose: bool) -> Self {
        self.verbose_trace = verbose;
        self
    }

    pub fn with_bitrate(mut self, bitrate: Bitrate) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_filter_command(mut self, command: Command) -> Self {
        self.filter_command = command;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_resync_timeout(mut self, timeout: Duration) -> Self {
        self.resync_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// One adapter connection.
///
/// The session owns its transport exclusively and releases it when dropped or
/// closed. Calls are strictly sequential; a session is never shared.
pub struct Session<T> {
    channel: CommandChannel<T>,
    config: SessionConfig,
    state: SessionState,
    version: Option<Version>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let framer = Framer::new(transport)
            .with_read_timeout(config.read_timeout)
            .with_poll_interval(config.poll_interval)
            .with_trace(config.verbose_trace);
        Session {
            channel: CommandChannel::new(framer),
            config,
            state: SessionState::Unsynchronized,
            version: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Version reported during the last successful initialization
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn transport(&self) -> &T {
        self.channel.framer().transport()
    }

    /// Resynchronize and configure the adapter, leaving the channel open.
    ///
    /// Safe to repeat on a session that is already ready. Any failure faults the
    /// session; recover by building a new one.
    pub fn initialize(&mut self) -> Result<Version> {
        if self.state == SessionState::Faulted {
            return Err(Error::NotReady { state: self.state });
        }
        let mut sequencer = InitSequencer::new(&self.config);
        let result = sequencer.run(&mut self.channel);
        match result {
            Ok(version) => {
                self.state = sequencer.state();
                self.version = Some(version.clone());
                Ok(version)
            }
            Err(e) => {
                warn!("initialization failed in state {}: {}", sequencer.state(), e);
                self.state = SessionState::Faulted;
                Err(e)
            }
        }
    }

    /// Like [`Session::initialize`], opening the channel in `mode` instead of the
    /// configured [`SessionConfig::channel_mode`]. The mode sticks for later calls.
    pub fn initialize_with(&mut self, mode: ChannelMode) -> Result<Version> {
        self.config.channel_mode = mode;
        self.initialize()
    }

    /// Send a plain command and return its status line, uninterpreted
    pub fn query(&mut self, command: &Command) -> Result<Line> {
        if !self.state.is_synchronized() {
            return Err(Error::NotReady { state: self.state });
        }
        let result = self.channel.exchange(command);
        self.track(result)
    }

    /// Send a transmit command and verify its ack and loopback
    pub fn send_verified(&mut self, command: &Command) -> Result<()> {
        if self.state != SessionState::Ready {
            return Err(Error::NotReady { state: self.state });
        }
        let result = EchoVerifier::new(&mut self.channel).send_verified(command);
        self.track(result)
    }

    /// Transmit a CAN frame, verifying its loopback
    pub fn send_frame<F: Frame>(&mut self, frame: &F) -> Result<()> {
        self.send_verified(&Command::transmit(frame))
    }

    /// Close the channel if it is open and hand back the transport
    pub fn close(mut self) -> T {
        if self.state == SessionState::Ready {
            if let Err(e) = self.channel.write(&Command::close()) {
                warn!("closing the channel failed: {}", e);
            }
        }
        self.channel.into_inner()
    }

    /// Hand back the transport without talking to the adapter
    pub fn into_transport(self) -> T {
        self.channel.into_inner()
    }

    fn track<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(e) = &result {
            if e.is_fatal() {
                warn!("session faulted: {}", e);
                self.state = SessionState::Faulted;
            }
        }
        result
    }
}
