//! Chord recognition over the notes currently held down.
//!
//! [`ChordSink`] follows note on/off events, and whenever the set of held
//! notes changes it names the chord they form. Recognition works on pitch
//! classes: every root is tried in turn, and for each root the pattern
//! families and the shapes inside each family are tried largest first, so
//! `C E G Bb D` is a dominant ninth rather than a major triad with extras.
//!
//! Extensions (9, 11, 13) are compared as pitch classes, so `C E G D` is an
//! add9 in any voicing.

use std::collections::BTreeSet;
use std::io::{self, Write};

use crate::decoder::{EventKind, MidiEvent};
use crate::midi::pitch_class_name;
use crate::sink::EventSink;

/// A chord shape as semitone intervals above the root.
type Pattern = (&'static [u8], &'static str);

// Within a family, a shape must come before any shape it contains.
const EXTENDED: &[Pattern] = &[
    (&[0, 4, 7, 10, 14, 17, 21], "13"),
    (&[0, 4, 7, 11, 14, 17, 21], "Maj13"),
    (&[0, 3, 7, 10, 14, 17, 21], "m13"),
    (&[0, 4, 7, 10, 14, 17], "11"),
    (&[0, 4, 7, 11, 14, 17], "Maj11"),
    (&[0, 3, 7, 10, 14, 17], "m11"),
];

const NINTHS: &[Pattern] = &[
    (&[0, 4, 7, 10, 14], "9"),
    (&[0, 4, 7, 11, 14], "Maj9"),
    (&[0, 3, 7, 10, 14], "m9"),
    (&[0, 4, 7, 10, 13], "7b9"),
    (&[0, 4, 7, 10, 15], "7#9"),
];

const SEVENTHS: &[Pattern] = &[
    (&[0, 4, 7, 10], "7"),
    (&[0, 4, 7, 11], "Maj7"),
    (&[0, 3, 7, 10], "m7"),
    (&[0, 3, 6, 10], "m7b5"),
    (&[0, 3, 6, 9], "dim7"),
    (&[0, 3, 7, 11], "mMaj7"),
    (&[0, 4, 8, 11], "Aug7"),
    (&[0, 4, 8, 10], "7#5"),
    (&[0, 4, 6, 10], "7b5"),
    (&[0, 5, 7, 10], "7sus4"),
];

const SIXTHS: &[Pattern] = &[
    (&[0, 4, 7, 9, 14], "6/9"),
    (&[0, 4, 7, 9], "6"),
    (&[0, 3, 7, 9], "m6"),
];

const ADDED_NOTES: &[Pattern] = &[
    (&[0, 4, 7, 14], "add9"),
    (&[0, 3, 7, 14], "madd9"),
    (&[0, 4, 7, 17], "add11"),
    (&[0, 3, 7, 17], "madd11"),
    (&[0, 4, 7, 21], "add13"),
    (&[0, 3, 7, 21], "madd13"),
];

const TRIADS: &[Pattern] = &[
    (&[0, 4, 7], "Major"),
    (&[0, 3, 7], "Minor"),
    (&[0, 3, 6], "Diminished"),
    (&[0, 4, 8], "Augmented"),
    (&[0, 5, 7], "Sus4"),
    (&[0, 2, 7], "Sus2"),
];

const FAMILIES: [&[Pattern]; 6] = [EXTENDED, NINTHS, SEVENTHS, SIXTHS, ADDED_NOTES, TRIADS];

/// Pitch classes beyond the pattern that are still tolerated.
const MAX_EXTRA_PITCH_CLASSES: usize = 2;

/// Name the chord formed by `notes` (MIDI note numbers), e.g. "C Major/E".
///
/// Needs at least three distinct pitch classes. When the lowest note is not
/// the root, the bass is appended after a slash.
pub fn detect_chord(notes: &[u8]) -> Option<String> {
    let bass = *notes.iter().min()?;
    let pitch_classes: BTreeSet<u8> = notes.iter().map(|n| n % 12).collect();
    if pitch_classes.len() < 3 {
        return None;
    }

    let (root, quality) = identify(&pitch_classes)?;
    let mut name = format!("{} {}", pitch_class_name(root), quality);
    if bass % 12 != root {
        name.push('/');
        name.push_str(pitch_class_name(bass % 12));
    }
    Some(name)
}

fn identify(pitch_classes: &BTreeSet<u8>) -> Option<(u8, &'static str)> {
    for root in 0..12u8 {
        let relative: BTreeSet<u8> = pitch_classes
            .iter()
            .map(|pc| (pc + 12 - root) % 12)
            .collect();
        for family in FAMILIES {
            if let Some((_, quality)) = family
                .iter()
                .find(|(intervals, _)| fits(&relative, intervals))
            {
                return Some((root, *quality));
            }
        }
    }
    None
}

fn fits(relative: &BTreeSet<u8>, intervals: &[u8]) -> bool {
    intervals.iter().all(|i| relative.contains(&(i % 12)))
        && relative.len() <= intervals.len() + MAX_EXTRA_PITCH_CLASSES
}

/// Tracks held notes and reports chord changes as text lines.
pub struct ChordSink<W: Write> {
    out: W,
    held: BTreeSet<u8>,
    current: Option<String>,
}

impl ChordSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ChordSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            held: BTreeSet::new(),
            current: None,
        }
    }

    pub fn held_notes(&self) -> Vec<u8> {
        self.held.iter().copied().collect()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn report(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            log::warn!("Failed to write chord: {}", e);
        }
    }
}

impl<W: Write> EventSink for ChordSink<W> {
    fn emit(&mut self, event: &MidiEvent) {
        let changed = match event.kind {
            EventKind::NoteOn => self.held.insert(event.data1),
            EventKind::NoteOff => self.held.remove(&event.data1),
            _ => false,
        };
        if !changed {
            return;
        }

        let notes = self.held_notes();
        let chord = detect_chord(&notes);
        if chord == self.current {
            return;
        }
        match &chord {
            Some(name) => self.report(&format!("Chord: {}", name)),
            None => self.report("No chord"),
        }
        self.current = chord;
    }
}
