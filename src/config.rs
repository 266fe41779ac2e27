//! Configuration persistence for the MIDI reader.
//!
//! Saves and loads reader settings to/from YAML files. Command line flags are
//! applied on top of whatever the file holds.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::catalog::IgnoreFilter;

/// Complete reader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Connect to the first input port whose name contains this text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_port: Option<String>,
    /// Client name announced to the host MIDI subsystem
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Drop MIDI clock (and other timing) messages in the driver
    #[serde(default = "default_true")]
    pub ignore_clock: bool,
    /// Drop active sensing keep-alives in the driver
    #[serde(default = "default_true")]
    pub ignore_active_sense: bool,
    /// Drop system exclusive messages in the driver
    #[serde(default)]
    pub ignore_sysex: bool,
    /// Append note names to note events
    #[serde(default)]
    pub show_note_names: bool,
    /// Append a description to non-note, non-CC events
    #[serde(default)]
    pub describe_other: bool,
    /// Report chord changes alongside the event lines
    #[serde(default)]
    pub detect_chords: bool,
    /// Report tempo estimates from note onsets
    #[serde(default)]
    pub detect_rhythm: bool,
    /// How often a waiting receive checks for cancellation
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_client_name() -> String {
    "midi-reader".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            preferred_port: None,
            client_name: default_client_name(),
            ignore_clock: true,
            ignore_active_sense: true,
            ignore_sysex: false,
            show_note_names: false,
            describe_other: false,
            detect_chords: false,
            detect_rhythm: false,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ReaderConfig {
    /// Get the default config file path (in the working directory).
    pub fn default_path() -> PathBuf {
        PathBuf::from("midi_reader.yaml")
    }

    /// Load configuration from a YAML file, or defaults if it doesn't exist.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config YAML {}", path.display()))
    }

    /// Save configuration to a YAML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        log::info!("Saved configuration to {}", path.display());
        Ok(())
    }

    pub fn ignore_filter(&self) -> IgnoreFilter {
        IgnoreFilter {
            clock: self.ignore_clock,
            active_sense: self.ignore_active_sense,
            sysex: self.ignore_sysex,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        // Never zero; the receive wait must block.
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
