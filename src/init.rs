use crate::channel::CommandChannel;
use crate::command::Command;
use crate::framer::Line;
use crate::session::{SessionConfig, SessionState};
use crate::trace::dump;
use crate::transport::{is_poll_expiry, Transport};
use crate::{Error, Result, BEL, CR, MAX_LINE_LEN};
use core::fmt;
use log::*;
use std::thread;
use std::time::Instant;

/// Configuration steps of the bring-up, in the order they are issued
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InitStage {
    Version,
    Filter,
    Bitrate,
    Open,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InitStage::Version => "version",
            InitStage::Filter => "filter",
            InitStage::Bitrate => "bitrate",
            InitStage::Open => "open",
        })
    }
}

const CONFIG_STAGES: [InitStage; 3] = [InitStage::Version, InitStage::Filter, InitStage::Bitrate];

/// Firmware version line reported by the adapter, e.g. "v0107"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version(String);

impl Version {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Define the machine states
machine!(
    #[derive(Clone, Debug, PartialEq)]
    enum InitState {
        Unsynchronized,
        Synchronized { stage: usize },
        Configured,
        Ready,
    }
);

/// Step to the next state once the current one has done its work
#[derive(Clone, Debug, PartialEq)]
pub struct Advance;

// the allowed state, transition pairs
transitions!(InitState,
             [
                 (Unsynchronized, Advance) => Synchronized,
                 (Synchronized, Advance) => [Synchronized, Configured],
                 (Configured, Advance) => Ready
             ]
);

methods!(InitState,
         [
             Synchronized => get stage: usize,
             Ready => fn is_ready(&self) -> bool
         ]
);

/// framing recovered, configuration starts with the first stage
impl Unsynchronized {
    pub fn on_advance(self, _: Advance) -> Synchronized {
        Synchronized { stage: 0 }
    }
}

/// one configuration command per visit
impl Synchronized {
    pub fn on_advance(self, _: Advance) -> InitState {
        if self.stage + 1 < CONFIG_STAGES.len() {
            InitState::synchronized(self.stage + 1)
        } else {
            InitState::configured()
        }
    }
}

/// channel opened
impl Configured {
    pub fn on_advance(self, _: Advance) -> Ready {
        Ready {}
    }
}

/// end of the sequence, nothing follows
impl Ready {
    pub fn is_ready(&self) -> bool {
        true
    }
}

/// Brings a freshly opened adapter to an open, configured channel.
///
/// The adapter may be in any state when this starts: mid-frame, holding stale output
/// of an earlier session, or already open. The sequence is:
/// 1. write a bare CR and a close, let the adapter settle, flush its output
/// 2. close again and drain byte by byte until a CR or BEL shows up
/// 3. version query, filter setup and bitrate selection, each must be answered with CR
/// 4. open the channel in the configured mode
pub struct InitSequencer<'a> {
    config: &'a SessionConfig,
    state: InitState,
    version: Option<Version>,
}

impl<'a> InitSequencer<'a> {
    pub fn new(config: &'a SessionConfig) -> Self {
        InitSequencer {
            config,
            state: InitState::unsynchronized(),
            version: None,
        }
    }

    /// Where the sequence stands
    pub fn state(&self) -> SessionState {
        match self.state {
            InitState::Unsynchronized(_) => SessionState::Unsynchronized,
            InitState::Synchronized(_) => SessionState::Synchronized,
            InitState::Configured(_) => SessionState::Configured,
            InitState::Ready(_) => SessionState::Ready,
            _ => SessionState::Faulted,
        }
    }

    /// Run the whole sequence, returning the adapter version on success.
    ///
    /// Nothing is retried; on failure the sequencer stays in the state that failed.
    pub fn run<T: Transport>(&mut self, channel: &mut CommandChannel<T>) -> Result<Version> {
        loop {
            match self.state {
                InitState::Unsynchronized(_) => self.resynchronize(channel)?,
                InitState::Synchronized(_) => {
                    let stage = self.state.stage().map_or(0, |stage| *stage);
                    self.configure(channel, CONFIG_STAGES[stage])?;
                }
                InitState::Configured(_) => self.open(channel)?,
                InitState::Ready(_) => break,
                _ => {
                    return Err(Error::NotReady {
                        state: SessionState::Faulted,
                    })
                }
            }
            self.advance();
        }
        self.version.clone().ok_or(Error::InitRejected {
            stage: InitStage::Version,
            cause: Box::new(Error::DeviceRejected {
                command: Command::version(),
            }),
        })
    }

    fn advance(&mut self) {
        let next = self.state.clone().on_advance(Advance);
        debug!("init {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn resynchronize<T: Transport>(&self, channel: &mut CommandChannel<T>) -> Result<()> {
        let close = Command::close();
        // a bare CR terminates whatever half command the adapter may be holding
        let mut wire = vec![CR];
        wire.extend_from_slice(&close.to_wire());
        channel
            .write_raw(&wire)
            .map_err(|source| Error::WriteFailure {
                command: close.clone(),
                source,
            })?;

        thread::sleep(self.config.settle_delay);
        if let Err(e) = channel.framer_mut().transport_mut().flush_input() {
            warn!("input flush failed, relying on drain: {}", e);
        }
        channel.framer_mut().reset();

        channel.write(&close)?;
        let drained = self.drain(channel)?;
        debug!("resynchronized after draining {} bytes", drained.len());
        Ok(())
    }

    /// Discard input until a terminator of either kind is seen
    fn drain<T: Transport>(&self, channel: &mut CommandChannel<T>) -> Result<Vec<u8>> {
        let started = Instant::now();
        let trace = channel.framer().is_tracing();
        let mut drained = Vec::new();
        loop {
            // noise without a terminator must not keep the drain alive either
            let waited = started.elapsed();
            if waited >= self.config.resync_timeout {
                return Err(Error::ResyncTimeout { waited, drained });
            }
            match channel.framer_mut().transport_mut().read_byte() {
                Ok(byte) => {
                    trace!("drained 0x{:02X}", byte);
                    if trace {
                        dump("R", &[byte]);
                    }
                    if drained.len() < MAX_LINE_LEN {
                        drained.push(byte);
                    }
                    if byte == CR || byte == BEL {
                        return Ok(drained);
                    }
                }
                Err(e) if is_poll_expiry(&e) => thread::sleep(self.config.poll_interval),
                Err(e) => return Err(Error::Transport(e)),
            }
        }
    }

    fn configure<T: Transport>(
        &mut self,
        channel: &mut CommandChannel<T>,
        stage: InitStage,
    ) -> Result<()> {
        let command = match stage {
            InitStage::Version => Command::version(),
            InitStage::Filter => self.config.filter_command.clone(),
            InitStage::Bitrate => Command::bitrate(self.config.bitrate),
            InitStage::Open => Command::open(self.config.channel_mode),
        };
        let payload = exchange_stage(channel, stage, &command)?;
        if stage == InitStage::Version {
            let version = Version(String::from_utf8_lossy(&payload).into_owned());
            info!("connected to adapter {}", version);
            self.version = Some(version);
        }
        Ok(())
    }

    fn open<T: Transport>(&mut self, channel: &mut CommandChannel<T>) -> Result<()> {
        self.configure(channel, InitStage::Open)?;
        info!("device initialized, channel open ({:?})", self.config.channel_mode);
        Ok(())
    }
}

/// One bring-up exchange; anything but a terminated line rejects the stage
fn exchange_stage<T: Transport>(
    channel: &mut CommandChannel<T>,
    stage: InitStage,
    command: &Command,
) -> Result<Vec<u8>> {
    let rejected = |cause: Error| Error::InitRejected {
        stage,
        cause: Box::new(cause),
    };
    match channel.exchange(command).map_err(rejected)? {
        Line::Terminated(payload) => Ok(payload),
        Line::Signaled => Err(rejected(Error::DeviceRejected {
            command: command.clone(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framer::Framer;
    use crate::mock::{quick_config, MockAdapter};
    use crate::ChannelMode;
    use std::time::Duration;
    use test_log::test;

    fn channel(adapter: MockAdapter, config: &SessionConfig) -> CommandChannel<MockAdapter> {
        CommandChannel::new(
            Framer::new(adapter)
                .with_read_timeout(config.read_timeout)
                .with_trace(config.verbose_trace),
        )
    }

    #[test]
    fn state_machine_walk() {
        let mut state = InitState::unsynchronized();
        let mut seen = vec![];
        while state.is_ready().is_none() {
            seen.push(state.clone());
            state = state.on_advance(Advance);
        }
        assert_eq!(
            seen,
            vec![
                InitState::unsynchronized(),
                InitState::synchronized(0),
                InitState::synchronized(1),
                InitState::synchronized(2),
                InitState::configured(),
            ]
        );
    }

    #[test]
    fn ready_does_not_advance() {
        let state = InitState::ready().on_advance(Advance);
        assert!(state.is_ready().is_none());
        assert!(state.stage().is_none());
    }

    #[test]
    fn full_sequence() {
        let config = quick_config();
        let mut channel = channel(MockAdapter::new(), &config);
        let mut sequencer = InitSequencer::new(&config);
        let version = sequencer.run(&mut channel).unwrap();
        assert_eq!(version.as_str(), "v0107");
        assert_eq!(sequencer.state(), SessionState::Ready);

        let adapter = channel.into_inner();
        assert!(adapter.is_open());
        assert_eq!(adapter.flushes, 1);
        assert_eq!(adapter.commands, vec!["", "C", "C", "v", "W2D00", "S6", "l"]);
    }

    #[test]
    fn normal_mode_and_bitrate() {
        let config = quick_config()
            .with_channel_mode(ChannelMode::Normal)
            .with_bitrate(crate::Bitrate::Rate125Kbit);
        let mut channel = channel(MockAdapter::new(), &config);
        InitSequencer::new(&config).run(&mut channel).unwrap();
        let adapter = channel.into_inner();
        assert_eq!(&adapter.commands[4..], &["W2D00", "S4", "O"]);
    }

    #[test]
    fn already_open_adapter_resyncs() {
        let config = quick_config().with_verbose_trace(true);
        let mut channel = channel(MockAdapter::new().opened(), &config);
        assert!(InitSequencer::new(&config).run(&mut channel).is_ok());
        assert!(channel.framer().transport().is_open());
    }

    #[test]
    fn filter_rejection_names_stage() {
        let config = quick_config();
        let mut channel = channel(MockAdapter::new().rejecting("W"), &config);
        let mut sequencer = InitSequencer::new(&config);
        match sequencer.run(&mut channel) {
            Err(Error::InitRejected { stage, cause }) => {
                assert_eq!(stage, InitStage::Filter);
                assert_eq!(stage.to_string(), "filter");
                assert!(matches!(*cause, Error::DeviceRejected { .. }));
            }
            other => panic!("expected filter rejection, got {:?}", other),
        }
        assert_eq!(sequencer.state(), SessionState::Synchronized);
        assert!(!channel.framer().transport().is_open());
    }

    #[test]
    fn open_rejection_names_stage() {
        let config = quick_config();
        let mut channel = channel(MockAdapter::new().rejecting("l"), &config);
        let mut sequencer = InitSequencer::new(&config);
        assert!(matches!(
            sequencer.run(&mut channel),
            Err(Error::InitRejected {
                stage: InitStage::Open,
                ..
            })
        ));
        assert_eq!(sequencer.state(), SessionState::Configured);
    }

    #[test]
    fn silent_adapter_times_out_draining() {
        let config = quick_config();
        let mut channel = channel(MockAdapter::new().silent(), &config);
        let mut sequencer = InitSequencer::new(&config);
        assert!(matches!(
            sequencer.run(&mut channel),
            Err(Error::ResyncTimeout { .. })
        ));
        assert_eq!(sequencer.state(), SessionState::Unsynchronized);
    }

    #[test]
    fn adapter_silent_after_resync_rejects_version() {
        let config = quick_config();
        let mut channel = channel(MockAdapter::new(), &config);
        let mut sequencer = InitSequencer::new(&config);
        sequencer.resynchronize(&mut channel).unwrap();
        sequencer.advance();
        *channel.framer_mut().transport_mut() = MockAdapter::new().silent();
        match sequencer.run(&mut channel) {
            Err(Error::InitRejected { stage, cause }) => {
                assert_eq!(stage, InitStage::Version);
                assert!(matches!(*cause, Error::Transport(_)));
            }
            other => panic!("expected version rejection, got {:?}", other),
        }
    }

    #[test]
    fn endless_noise_times_out_draining() {
        let config = quick_config();
        let mut channel = channel(MockAdapter::new().babbling(b'A'), &config);
        let mut sequencer = InitSequencer::new(&config);
        let started = Instant::now();
        match sequencer.run(&mut channel) {
            Err(Error::ResyncTimeout { waited, drained }) => {
                assert!(waited >= config.resync_timeout);
                assert_eq!(drained.len(), MAX_LINE_LEN);
                assert!(drained.iter().all(|&b| b == b'A'));
            }
            other => panic!("expected resync timeout, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(sequencer.state(), SessionState::Unsynchronized);
    }

    #[test]
    fn drain_stops_at_first_terminator() {
        let config = quick_config();
        let mut channel = channel(MockAdapter::with_output(b"0F\rv0107\r"), &config);
        let sequencer = InitSequencer::new(&config);
        assert_eq!(sequencer.drain(&mut channel).unwrap(), b"0F\r");
        assert_eq!(
            channel.read_line().unwrap(),
            Line::Terminated(b"v0107".to_vec())
        );
    }
}
