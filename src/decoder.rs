//! Raw MIDI bytes to typed events.
//!
//! [`decode`] is a pure function of the message bytes and the timestamp it is
//! given. It never looks at previous messages, so running status (a message
//! that starts with a data byte and reuses the previous status) is rejected
//! with [`DecodeError::MissingStatus`]. midir hands us complete messages with
//! the status byte restored, so this only trips on transport corruption.

use std::fmt;
use std::time::Duration;

use midly::live::{LiveEvent, SystemCommon};
use midly::MidiMessage;

use crate::error::DecodeError;
use crate::midi::{self, CONTROL_CHANGE, NOTE_OFF, NOTE_ON};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    ControlChange,
    Other,
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::NoteOn => "NoteOn",
            EventKind::NoteOff => "NoteOff",
            EventKind::ControlChange => "ControlChange",
            EventKind::Other => "Other",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A decoded MIDI message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiEvent {
    pub kind: EventKind,
    /// Low nibble of the status byte (0-15)
    pub channel: u8,
    /// First data byte (note number, controller number), 0 if absent
    pub data1: u8,
    /// Second data byte (velocity, controller value), 0 if absent
    pub data2: u8,
    /// Arrival time relative to the start of the session
    pub timestamp: Duration,
    /// The message bytes this event was decoded from
    pub message: Vec<u8>,
}

impl MidiEvent {
    pub fn is_note(&self) -> bool {
        matches!(self.kind, EventKind::NoteOn | EventKind::NoteOff)
    }
}

/// Decode one complete MIDI message received at `now`.
pub fn decode(bytes: &[u8], now: Duration) -> Result<MidiEvent, DecodeError> {
    let status = *bytes.first().ok_or(DecodeError::Empty)?;
    if !midi::is_status_byte(status) {
        return Err(DecodeError::MissingStatus(status));
    }

    let expected = midi::required_len(status);
    if bytes.len() < expected {
        return Err(DecodeError::Truncated {
            status,
            expected,
            actual: bytes.len(),
        });
    }
    if let Some((offset, &value)) = bytes[..expected]
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, b)| midi::is_status_byte(**b))
    {
        return Err(DecodeError::DataOutOfRange { offset, value });
    }

    let data1 = data_byte(bytes, 1);
    let data2 = data_byte(bytes, 2);

    let kind = match status & 0xF0 {
        NOTE_ON if data2 == 0 => EventKind::NoteOff,
        NOTE_ON => EventKind::NoteOn,
        NOTE_OFF => EventKind::NoteOff,
        CONTROL_CHANGE => EventKind::ControlChange,
        _ => EventKind::Other,
    };

    Ok(MidiEvent {
        kind,
        channel: status & 0x0F,
        data1,
        data2,
        timestamp: now,
        message: bytes.to_vec(),
    })
}

// Trailing bytes past the required length (sysex payloads, the F7 terminator)
// only count as data when they are in range.
fn data_byte(bytes: &[u8], index: usize) -> u8 {
    bytes
        .get(index)
        .copied()
        .filter(|b| !midi::is_status_byte(*b))
        .unwrap_or(0)
}

/// Human description of the message behind an event, e.g. "ProgramChange program=5".
pub fn describe(message: &[u8]) -> Option<String> {
    let event = LiveEvent::parse(message).ok()?;
    let text = match event {
        LiveEvent::Midi { message, .. } => match message {
            MidiMessage::NoteOff { key, vel } => {
                format!("NoteOff key={} vel={}", key.as_int(), vel.as_int())
            }
            MidiMessage::NoteOn { key, vel } => {
                format!("NoteOn key={} vel={}", key.as_int(), vel.as_int())
            }
            MidiMessage::Aftertouch { key, vel } => {
                format!("PolyPressure key={} value={}", key.as_int(), vel.as_int())
            }
            MidiMessage::Controller { controller, value } => {
                format!("Controller cc={} value={}", controller.as_int(), value.as_int())
            }
            MidiMessage::ProgramChange { program } => {
                format!("ProgramChange program={}", program.as_int())
            }
            MidiMessage::ChannelAftertouch { vel } => {
                format!("ChannelPressure value={}", vel.as_int())
            }
            MidiMessage::PitchBend { bend } => format!("PitchBend value={}", bend.as_int()),
        },
        LiveEvent::Common(common) => match common {
            SystemCommon::SysEx(data) => format!("SysEx {} bytes", data.len()),
            SystemCommon::SongPosition(position) => {
                format!("SongPosition beats={}", position.as_int())
            }
            SystemCommon::SongSelect(song) => format!("SongSelect song={}", song.as_int()),
            other => format!("{:?}", other),
        },
        LiveEvent::Realtime(realtime) => format!("{:?}", realtime),
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_millis(1500);

    fn event(kind: EventKind, channel: u8, data1: u8, data2: u8, bytes: &[u8]) -> MidiEvent {
        MidiEvent {
            kind,
            channel,
            data1,
            data2,
            timestamp: T,
            message: bytes.to_vec(),
        }
    }

    #[test]
    fn test_note_on() {
        let decoded = decode(&[0x90, 0x3C, 0x40], T).unwrap();
        assert_eq!(decoded, event(EventKind::NoteOn, 0, 60, 64, &[0x90, 0x3C, 0x40]));
    }

    #[test]
    fn test_note_off() {
        let decoded = decode(&[0x80, 0x3C, 0x00], T).unwrap();
        assert_eq!(decoded, event(EventKind::NoteOff, 0, 60, 0, &[0x80, 0x3C, 0x00]));
    }

    #[test]
    fn test_control_change() {
        let decoded = decode(&[0xB0, 0x07, 0x7F], T).unwrap();
        assert_eq!(
            decoded,
            event(EventKind::ControlChange, 0, 7, 127, &[0xB0, 0x07, 0x7F])
        );
    }

    #[test]
    fn test_note_on_fields_on_every_channel() {
        for channel in 0..16u8 {
            for (note, vel) in [(0u8, 1u8), (60, 64), (127, 127)] {
                let decoded = decode(&[0x90 | channel, note, vel], T).unwrap();
                assert_eq!(decoded.kind, EventKind::NoteOn);
                assert_eq!(decoded.channel, channel);
                assert_eq!(decoded.data1, note);
                assert_eq!(decoded.data2, vel);
            }
        }
    }

    #[test]
    fn test_zero_velocity_note_on_is_note_off() {
        let released = decode(&[0x93, 0x40, 0x00], T).unwrap();
        let explicit = decode(&[0x83, 0x40, 0x00], T).unwrap();
        assert_eq!(released.kind, EventKind::NoteOff);
        assert_eq!(released.kind, explicit.kind);
        assert_eq!(released.channel, explicit.channel);
        assert_eq!(released.data1, explicit.data1);
        assert_eq!(released.data2, 0);
        // The raw status byte is kept.
        assert_eq!(released.message[0], 0x93);
    }

    #[test]
    fn test_decode_is_pure() {
        let first = decode(&[0x95, 0x30, 0x00], T).unwrap();
        let second = decode(&[0x95, 0x30, 0x00], T).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_truncated_note_on() {
        assert_eq!(
            decode(&[0x90], T),
            Err(DecodeError::Truncated {
                status: 0x90,
                expected: 3,
                actual: 1
            })
        );
        assert!(decode(&[0x90, 0x3C], T).is_err());
    }

    #[test]
    fn test_empty_message() {
        assert_eq!(decode(&[], T), Err(DecodeError::Empty));
    }

    #[test]
    fn test_running_status_rejected() {
        assert_eq!(decode(&[0x3C, 0x40], T), Err(DecodeError::MissingStatus(0x3C)));
    }

    #[test]
    fn test_data_byte_out_of_range() {
        assert_eq!(
            decode(&[0x90, 0x3C, 0xC0], T),
            Err(DecodeError::DataOutOfRange {
                offset: 2,
                value: 0xC0
            })
        );
    }

    #[test]
    fn test_two_byte_messages() {
        let program = decode(&[0xC2, 0x05], T).unwrap();
        assert_eq!(program.kind, EventKind::Other);
        assert_eq!(program.channel, 2);
        assert_eq!(program.data1, 5);
        assert_eq!(program.data2, 0);
        assert!(decode(&[0xC2], T).is_err());
    }

    #[test]
    fn test_realtime_and_sysex_are_other() {
        let clock = decode(&[0xF8], T).unwrap();
        assert_eq!(clock.kind, EventKind::Other);
        assert_eq!((clock.data1, clock.data2), (0, 0));

        let sysex = decode(&[0xF0, 0x7E, 0xF7], T).unwrap();
        assert_eq!(sysex.kind, EventKind::Other);
        assert_eq!(sysex.data1, 0x7E);
        assert_eq!(sysex.data2, 0);
    }

    #[test]
    fn test_describe_channel_messages() {
        assert_eq!(describe(&[0xC0, 0x05]).as_deref(), Some("ProgramChange program=5"));
        assert_eq!(
            describe(&[0xB1, 0x40, 0x7F]).as_deref(),
            Some("Controller cc=64 value=127")
        );
        assert_eq!(
            describe(&[0xD0, 0x22]).as_deref(),
            Some("ChannelPressure value=34")
        );
    }

    #[test]
    fn test_describe_rejects_garbage() {
        assert_eq!(describe(&[]), None);
    }
}
