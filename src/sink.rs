//! Event sinks: where decoded events end up.
//!
//! The session loop hands every event, in arrival order, to one
//! [`EventSink`]. The base sink prints a line per event; [`FanOut`] feeds
//! several sinks from the same stream.

use std::io::{self, Write};

use crate::decoder::{self, EventKind, MidiEvent};
use crate::midi;

/// Consumes decoded events one at a time, in order.
pub trait EventSink {
    fn emit(&mut self, event: &MidiEvent);

    /// Called once when the session stops.
    fn finish(&mut self) {}
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn emit(&mut self, event: &MidiEvent) {
        (**self).emit(event)
    }

    fn finish(&mut self) {
        (**self).finish()
    }
}

/// `<kind> ch=<channel> d1=<data1> d2=<data2> t=<seconds>`
pub fn format_event(event: &MidiEvent) -> String {
    format!(
        "{} ch={} d1={} d2={} t={:.3}",
        event.kind,
        event.channel,
        event.data1,
        event.data2,
        event.timestamp.as_secs_f64()
    )
}

/// Prints one line per event.
pub struct TextSink<W: Write> {
    out: W,
    note_names: bool,
    describe_other: bool,
}

impl TextSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            note_names: false,
            describe_other: false,
        }
    }

    /// Append `note=C4` to note events.
    pub fn with_note_names(mut self, enabled: bool) -> Self {
        self.note_names = enabled;
        self
    }

    /// Append a description such as `(ProgramChange program=5)` to other events.
    pub fn with_descriptions(mut self, enabled: bool) -> Self {
        self.describe_other = enabled;
        self
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn render(&self, event: &MidiEvent) -> String {
        let mut line = format_event(event);
        if self.note_names && event.is_note() {
            line.push_str(" note=");
            line.push_str(&midi::note_name(event.data1));
        }
        if self.describe_other && event.kind == EventKind::Other {
            let description = decoder::describe(&event.message)
                .unwrap_or_else(|| format!("{:02X?}", event.message));
            line.push_str(&format!(" ({})", description));
        }
        line
    }
}

impl<W: Write> EventSink for TextSink<W> {
    fn emit(&mut self, event: &MidiEvent) {
        let line = self.render(event);
        // Flush to ensure immediate output
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            log::warn!("Failed to write event: {}", e);
        }
    }

    fn finish(&mut self) {
        if let Err(e) = self.out.flush() {
            log::warn!("Failed to flush events: {}", e);
        }
    }
}

/// Feeds every event to each inner sink in turn.
#[derive(Default)]
pub struct FanOut {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

impl EventSink for FanOut {
    fn emit(&mut self, event: &MidiEvent) {
        for sink in &mut self.sinks {
            sink.emit(event);
        }
    }

    fn finish(&mut self) {
        for sink in &mut self.sinks {
            sink.finish();
        }
    }
}
