//! Loopback self-test for SLCAN adapters.
//!
//! Each scenario opens the adapter, brings it up on a fresh session and sends a
//! sequence of transmit commands, every one of which must be acknowledged and
//! looped back unchanged. The exit code is the number of failed scenarios.

use clap::Parser;
use log::*;
use slcan_session::{Bitrate, ChannelMode, Command, SerialTransport, Session, SessionConfig};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(version, about = "Loopback self-test for SLCAN adapters")]
struct Args {
    /// TTY device of the adapter, e.g. /dev/ttyACM0
    device: String,
    /// Open the channel as a regular bus participant instead of listen-only
    #[arg(long)]
    normal: bool,
    /// CAN bitrate in bit/s
    #[arg(long, default_value_t = 500_000)]
    bitrate: u32,
    /// Dump every byte written and read
    #[arg(short, long)]
    verbose: bool,
}

const SCENARIOS: [(&str, &[&str]); 4] = [
    ("Standard doc example", &["t001411223344"]),
    (
        "Sequence from 2016/03/30",
        &[
            "t750840013E0000000000",
            "t758340017E",
            "t75084002138100000000",
            "t75854003112233",
        ],
    ),
    (
        "Sequence from 2016/07/15",
        &[
            "t3006A1018AFF4AFF",
            "t33E51000021089",
            "t3001B1",
            "t30051000025089",
        ],
    ),
    (
        "F00 after two bytes of data ending with F",
        &["t0002000F", "t000100"],
    ),
];

fn run_scenario(
    device: &str,
    config: &SessionConfig,
    sequence: &[&str],
) -> slcan_session::Result<()> {
    let transport = SerialTransport::open(device)?;
    let mut session = Session::new(transport, config.clone());
    session.initialize()?;
    for text in sequence {
        session.send_verified(&Command::new(*text)?)?;
    }
    session.close();
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let bitrate = match Bitrate::from_bps(args.bitrate) {
        Some(bitrate) => bitrate,
        None => {
            let valid: Vec<String> = Bitrate::ALL.iter().map(|b| b.bps().to_string()).collect();
            error!(
                "unsupported bitrate {}, valid bitrates: {}",
                args.bitrate,
                valid.join(", ")
            );
            return ExitCode::from(255);
        }
    };
    let mode = if args.normal {
        ChannelMode::Normal
    } else {
        ChannelMode::ListenOnly
    };
    let config = SessionConfig::default()
        .with_channel_mode(mode)
        .with_bitrate(bitrate)
        .with_verbose_trace(args.verbose);

    let mut passed = 0u8;
    let mut failed = 0u8;
    for (name, sequence) in SCENARIOS.iter() {
        info!("Starting test '{}'...", name);
        match run_scenario(&args.device, &config, sequence) {
            Ok(()) => {
                passed += 1;
                info!("Test PASSED: '{}'", name);
            }
            Err(e) => {
                failed += 1;
                error!("{}", e);
                error!("Test FAILED: '{}'", name);
            }
        }
    }

    info!("Tests ran   : {}", passed + failed);
    info!("Tests PASSED: {}", passed);
    info!("Tests FAILED: {}", failed);
    ExitCode::from(failed)
}
