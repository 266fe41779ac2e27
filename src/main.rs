//! MIDI Reader - prints performance data from a MIDI input as it arrives.
//!
//! Usage: midi-reader [--port <index>] [--duration <secs>] [--chords] [--rhythm] [--verbose]
//!
//! Lists the input ports, connects to the chosen one (asking if needed) and
//! prints one line per MIDI event until Ctrl+C or the device goes away.

mod cancel;
mod catalog;
mod chord;
mod config;
mod connection;
mod decoder;
mod error;
mod midi;
mod prompt;
mod rhythm;
mod session;
mod sink;

#[cfg(test)]
mod testing;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use env_logger::Env;

use cancel::{cancel_on_ctrl_c, CancelToken};
use catalog::MidirHost;
use chord::ChordSink;
use config::ReaderConfig;
use rhythm::RhythmSink;
use session::{Session, StopReason};
use sink::{EventSink, FanOut, TextSink};

/// Print MIDI events from an input device as they arrive
#[derive(Parser, Debug)]
#[clap(name = "midi-reader")]
struct CliArgs {
    /// Input port index (see --list); skips the prompt.
    #[clap(short = 'p', long = "port")]
    port: Option<usize>,

    /// List MIDI input ports and exit.
    #[clap(short = 'l', long = "list")]
    list: bool,

    /// Stop after this many seconds instead of waiting for Ctrl+C.
    #[clap(short = 'd', long = "duration", value_name = "SECS")]
    duration: Option<u64>,

    /// Configuration file (default: ./midi_reader.yaml).
    #[clap(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Report chord changes while notes are held.
    #[clap(long = "chords")]
    chords: bool,

    /// Estimate the tempo from note onsets.
    #[clap(long = "rhythm")]
    rhythm: bool,

    /// Add note names and descriptions of other messages to each line.
    #[clap(short = 'v', long = "verbose")]
    verbose: bool,

    /// Show MIDI clock and active sensing messages.
    #[clap(long = "show-timing")]
    show_timing: bool,

    /// Remember the chosen port in the configuration file.
    #[clap(long = "save-config")]
    save_config: bool,
}

impl CliArgs {
    fn apply(&self, config: &mut ReaderConfig) {
        if self.chords {
            config.detect_chords = true;
        }
        if self.rhythm {
            config.detect_rhythm = true;
        }
        if self.verbose {
            config.show_note_names = true;
            config.describe_other = true;
        }
        if self.show_timing {
            config.ignore_clock = false;
            config.ignore_active_sense = false;
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(ReaderConfig::default_path);
    let mut config = ReaderConfig::load(&config_path)?;
    args.apply(&mut config);

    let host = MidirHost::new(
        &config.client_name,
        config.ignore_filter(),
        config.poll_interval(),
    );
    let mut session = Session::new(host);
    let ports = session
        .refresh_ports()
        .context("Cannot list MIDI input ports")?
        .to_vec();

    if args.list {
        prompt::print_ports(&ports, &mut io::stdout())?;
        return Ok(());
    }

    println!("=== MIDI Reader ===");
    if ports.is_empty() {
        println!("No MIDI input ports found!");
        return Ok(());
    }

    let stdin = io::stdin();
    let chosen = prompt::choose_port(
        &mut session,
        args.port,
        config.preferred_port.as_deref(),
        &mut stdin.lock(),
        &mut io::stdout(),
    )?;
    let Some((port, how)) = chosen else {
        println!("No port selected.");
        return Ok(());
    };
    log::debug!("Port chosen by {:?}", how);

    println!("\nConnecting to: {}", port.name);
    session
        .connect()
        .with_context(|| format!("Failed to connect to {}", port.name))?;

    if args.save_config {
        config.preferred_port = session.selected().map(|p| p.name.clone());
        if let Err(e) = config.save(&config_path) {
            session.stop();
            return Err(e);
        }
    }

    let mut cancel = CancelToken::new();
    if let Some(secs) = args.duration {
        println!("Monitoring for {} seconds...", secs);
        cancel = cancel.with_deadline(Duration::from_secs(secs));
    }
    cancel_on_ctrl_c(&cancel)?;

    println!(
        "Connected at {}. Press Ctrl+C to exit.\n",
        Local::now().format("%H:%M:%S")
    );

    let mut sink = build_sink(&config);
    let result = session.run(sink.as_mut(), &cancel);

    println!(
        "\nStopped at {}: {}",
        Local::now().format("%H:%M:%S"),
        session.summary()
    );
    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            if let Some(StopReason::TransportFault(_)) = session.stop_reason() {
                eprintln!("The MIDI device was disconnected. Start a new session to reconnect.");
            }
            Err(e.into())
        }
    }
}

fn build_sink(config: &ReaderConfig) -> Box<dyn EventSink> {
    let text = TextSink::stdout()
        .with_note_names(config.show_note_names)
        .with_descriptions(config.describe_other);
    if !config.detect_chords && !config.detect_rhythm {
        return Box::new(text);
    }

    let mut fan_out = FanOut::new();
    fan_out.push(Box::new(text));
    if config.detect_chords {
        fan_out.push(Box::new(ChordSink::stdout()));
    }
    if config.detect_rhythm {
        fan_out.push(Box::new(RhythmSink::stdout()));
    }
    Box::new(fan_out)
}
