//! Error taxonomy for the read pipeline.
//!
//! Only [`MidiError::Decode`] is recoverable inside a running session; the
//! session loop logs it and moves on to the next message. [`MidiError::Selection`]
//! is recoverable before a session starts (the prompt asks again). Everything
//! else ends the session.

use thiserror::Error;

use crate::session::SessionState;

/// Why a raw message could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty message")]
    Empty,

    /// Data byte where a status byte was expected (running status is not supported).
    #[error("missing status byte (first byte 0x{0:02X})")]
    MissingStatus(u8),

    #[error("status 0x{status:02X} needs {expected} bytes, got {actual}")]
    Truncated {
        status: u8,
        expected: usize,
        actual: usize,
    },

    #[error("data byte 0x{value:02X} at offset {offset} is out of range")]
    DataOutOfRange { offset: usize, value: u8 },
}

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("MIDI subsystem unavailable: {0}")]
    DeviceQuery(String),

    #[error("no input port at index {index} ({available} available)")]
    Selection { index: usize, available: usize },

    #[error("could not connect to '{port}': {reason}")]
    Connection { port: String, reason: String },

    #[error("could not decode MIDI message: {0}")]
    Decode(#[from] DecodeError),

    #[error("lost connection to '{0}'")]
    TransportFault(String),

    #[error("operation not allowed while the session is {0:?}")]
    InvalidState(SessionState),
}

impl MidiError {
    /// Whether the current session may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MidiError::Decode(_) | MidiError::Selection { .. })
    }
}
