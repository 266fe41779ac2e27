//! MIDI protocol constants and utilities.
//!
//! Status nibbles, system message bytes and message lengths follow the
//! MIDI 1.0 specification.

/// Note Off - key released
pub const NOTE_OFF: u8 = 0x80;

/// Note On - key pressed (velocity 0 doubles as a release)
pub const NOTE_ON: u8 = 0x90;

/// Polyphonic key pressure
pub const POLY_PRESSURE: u8 = 0xA0;

/// Control Change - knobs, sliders, pedals
pub const CONTROL_CHANGE: u8 = 0xB0;

/// Program Change
pub const PROGRAM_CHANGE: u8 = 0xC0;

/// Channel pressure (mono aftertouch)
pub const CHANNEL_PRESSURE: u8 = 0xD0;

/// Pitch bend, 14-bit value split over two data bytes
pub const PITCH_BEND: u8 = 0xE0;

/// MTC quarter frame
pub const MTC_QUARTER_FRAME: u8 = 0xF1;

/// Song position pointer
pub const SONG_POSITION: u8 = 0xF2;

/// Song select
pub const SONG_SELECT: u8 = 0xF3;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// True for bytes with the high bit set.
pub fn is_status_byte(byte: u8) -> bool {
    byte & 0x80 != 0
}

/// Total message length (status included) required by a status byte.
///
/// System exclusive is variable length; only its status byte is required.
pub fn required_len(status: u8) -> usize {
    match status & 0xF0 {
        NOTE_OFF | NOTE_ON | POLY_PRESSURE | CONTROL_CHANGE | PITCH_BEND => 3,
        PROGRAM_CHANGE | CHANNEL_PRESSURE => 2,
        _ => match status {
            MTC_QUARTER_FRAME | SONG_SELECT => 2,
            SONG_POSITION => 3,
            _ => 1,
        },
    }
}

/// Pitch class name without octave ("C", "F#").
pub fn pitch_class_name(pitch_class: u8) -> &'static str {
    NOTE_NAMES[(pitch_class % 12) as usize]
}

/// Note name with octave, middle C (60) being "C4".
pub fn note_name(note: u8) -> String {
    let octave = (note / 12) as i8 - 1;
    format!("{}{}", pitch_class_name(note), octave)
}
