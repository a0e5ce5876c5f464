//! A fake adapter that answers the command vocabulary the way a USBtin does.

use crate::session::SessionConfig;
use crate::transport::Transport;
use crate::{BEL, CR};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::time::Duration;

pub(crate) struct MockAdapter {
    /// bytes the adapter has sent and nobody read yet
    pending: VecDeque<u8>,
    /// incoming command bytes up to the next CR
    partial: Vec<u8>,
    /// every complete command received, in order
    pub commands: Vec<String>,
    pub flushes: usize,
    /// reads that found nothing to return
    pub empty_reads: usize,
    open: bool,
    silent: bool,
    fail_reads: bool,
    fail_writes: bool,
    babble: Option<u8>,
    rejected: Vec<String>,
    ack: String,
    loopback: HashMap<String, Vec<u8>>,
    failed_loopback: Vec<String>,
}

impl MockAdapter {
    /// A closed adapter with nothing buffered
    pub fn new() -> Self {
        MockAdapter {
            pending: VecDeque::new(),
            partial: Vec::new(),
            commands: Vec::new(),
            flushes: 0,
            empty_reads: 0,
            open: false,
            silent: false,
            fail_reads: false,
            fail_writes: false,
            babble: None,
            rejected: Vec::new(),
            ack: "z".into(),
            loopback: HashMap::new(),
            failed_loopback: Vec::new(),
        }
    }

    /// Raw bytes waiting to be read, no command handling needed
    pub fn with_output(output: &[u8]) -> Self {
        let mut adapter = MockAdapter::new();
        adapter.pending.extend(output);
        adapter
    }

    /// Channel left open by a previous session
    pub fn opened(mut self) -> Self {
        self.open = true;
        self
    }

    /// Answer every command starting with `prefix` with BEL
    pub fn rejecting(mut self, prefix: &str) -> Self {
        self.rejected.push(prefix.into());
        self
    }

    /// Answer transmit commands with `ack` instead of "z"
    pub fn acking_with(mut self, ack: &str) -> Self {
        self.ack = ack.into();
        self
    }

    /// Echo `echo` instead of `command` after acknowledging it
    pub fn looping_back(mut self, command: &str, echo: &[u8]) -> Self {
        self.loopback.insert(command.into(), echo.to_vec());
        self
    }

    /// Acknowledge `command`, then report the transmission as failed with BEL
    pub fn signaling_loopback(mut self, command: &str) -> Self {
        self.failed_loopback.push(command.into());
        self
    }

    /// Never answer anything
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Send `byte` over and over once everything else has been read, never a terminator
    pub fn babbling(mut self, byte: u8) -> Self {
        self.babble = Some(byte);
        self
    }

    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn reply(&mut self, text: &[u8], terminator: u8) {
        self.pending.extend(text);
        self.pending.push_back(terminator);
    }

    fn respond(&mut self, command: &str) {
        if self.silent {
            return;
        }
        if self.rejected.iter().any(|prefix| command.starts_with(prefix.as_str())) {
            self.reply(b"", BEL);
            return;
        }
        match command.chars().next() {
            Some('C') if self.open => {
                self.open = false;
                self.reply(b"", CR);
            }
            Some('v') => self.reply(b"v0107", CR),
            Some('V') => self.reply(b"V0100", CR),
            Some('W') | Some('S') if !self.open => self.reply(b"", CR),
            Some('O') | Some('l') if !self.open => {
                self.open = true;
                self.reply(b"", CR);
            }
            Some('t') | Some('T') | Some('r') | Some('R') if self.open => {
                let ack = self.ack.clone().into_bytes();
                self.reply(&ack, CR);
                if self.failed_loopback.iter().any(|c| c == command) {
                    self.reply(b"", BEL);
                    return;
                }
                let echo = match self.loopback.get(command) {
                    Some(echo) => echo.clone(),
                    None => command.as_bytes().to_vec(),
                };
                if !echo.is_empty() {
                    self.reply(&echo, CR);
                }
            }
            // empty lines, unknown commands and commands invalid in the current state
            _ => self.reply(b"", BEL),
        }
    }
}

impl Transport for MockAdapter {
    fn read_byte(&mut self) -> io::Result<u8> {
        if self.fail_reads {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        match self.pending.pop_front().or(self.babble) {
            Some(byte) => Ok(byte),
            None => {
                self.empty_reads += 1;
                Err(io::ErrorKind::TimedOut.into())
            }
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.fail_writes {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        for &byte in bytes {
            if byte == CR {
                let command = String::from_utf8_lossy(&self.partial).into_owned();
                self.partial.clear();
                self.commands.push(command.clone());
                self.respond(&command);
            } else {
                self.partial.push(byte);
            }
        }
        Ok(())
    }

    fn flush_input(&mut self) -> io::Result<()> {
        self.pending.clear();
        self.flushes += 1;
        Ok(())
    }
}

/// Settings that keep tests fast
pub(crate) fn quick_config() -> SessionConfig {
    SessionConfig::default()
        .with_settle_delay(Duration::ZERO)
        .with_poll_interval(Duration::from_millis(1))
        .with_resync_timeout(Duration::from_millis(50))
        .with_read_timeout(Duration::from_millis(50))
}
