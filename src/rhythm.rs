//! Tempo estimation from note onsets.
//!
//! [`RhythmSink`] keeps a rolling window of note-on times. Once enough onsets
//! are collected, the gaps between them are binned into a histogram, smoothed,
//! and the tallest peak is taken as the beat interval. Confidence is the peak
//! height, reduced when a second peak competes with it. Successive estimates
//! are blended so one stray note does not swing the tempo.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::time::Duration;

use crate::decoder::{EventKind, MidiEvent};
use crate::sink::EventSink;

/// Size of the rolling onset window
const ONSET_WINDOW: usize = 100;

/// Onsets needed before the first estimate
const MIN_ONSETS: usize = 6;

/// Gaps this long or longer are pauses, not beats (seconds)
const MAX_INTERVAL: f64 = 2.0;

/// Histogram range and resolution for inter-onset gaps (seconds)
const HISTOGRAM_MIN: f64 = 0.1;
const HISTOGRAM_MAX: f64 = 2.0;
const HISTOGRAM_BINS: usize = 30;

const SMOOTHING_KERNEL: [f64; 5] = [0.1, 0.2, 0.4, 0.2, 0.1];

/// Smoothed bins below this height are not peaks
const MIN_PEAK_HEIGHT: f64 = 0.05;

/// Estimates at or below this confidence are discarded
const MIN_ANALYSIS_CONFIDENCE: f64 = 0.3;

/// Weight of a new estimate against the running one
const ADAPTATION_RATE: f64 = 0.3;

const MIN_BPM: f64 = 40.0;
const MAX_BPM: f64 = 240.0;

/// One histogram peak: smoothed height and the gap it stands for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub height: f64,
    pub interval: f64,
}

/// Beat interval and confidence found in a set of inter-onset gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct BeatEstimate {
    pub interval: f64,
    pub confidence: f64,
    /// Up to three strongest peaks, tallest first
    pub candidates: Vec<Peak>,
}

/// Find the most likely beat interval among `intervals` (seconds).
///
/// Returns `None` when no gap falls in the histogram range or the smoothed
/// histogram has no clear peak.
pub fn estimate_beat(intervals: &[f64]) -> Option<BeatEstimate> {
    let width = (HISTOGRAM_MAX - HISTOGRAM_MIN) / HISTOGRAM_BINS as f64;
    let mut histogram = [0.0f64; HISTOGRAM_BINS];
    let mut total = 0.0;
    for &interval in intervals {
        if !(HISTOGRAM_MIN..=HISTOGRAM_MAX).contains(&interval) {
            continue;
        }
        let bin = (((interval - HISTOGRAM_MIN) / width) as usize).min(HISTOGRAM_BINS - 1);
        histogram[bin] += 1.0;
        total += 1.0;
    }
    if total == 0.0 {
        return None;
    }

    let mut smoothed = [0.0f64; HISTOGRAM_BINS];
    for (i, value) in smoothed.iter_mut().enumerate() {
        for (k, weight) in SMOOTHING_KERNEL.iter().enumerate() {
            let j = i as isize + k as isize - 2;
            if (0..HISTOGRAM_BINS as isize).contains(&j) {
                *value += weight * histogram[j as usize] / total;
            }
        }
    }

    let mut peaks: Vec<Peak> = (1..HISTOGRAM_BINS - 1)
        .filter(|&i| {
            smoothed[i] > smoothed[i - 1]
                && smoothed[i] > smoothed[i + 1]
                && smoothed[i] > MIN_PEAK_HEIGHT
        })
        .map(|i| Peak {
            height: smoothed[i],
            interval: HISTOGRAM_MIN + (i as f64 + 0.5) * width,
        })
        .collect();
    peaks.sort_by(|a, b| b.height.total_cmp(&a.height));

    let top = *peaks.first()?;
    let confidence = match peaks.get(1) {
        Some(second) => top.height * (1.0 - second.height / top.height),
        None => top.height,
    };
    peaks.truncate(3);

    Some(BeatEstimate {
        interval: top.interval,
        confidence,
        candidates: peaks,
    })
}

fn to_bpm(interval: f64) -> u32 {
    (60.0 / interval).round() as u32
}

/// Follows note onsets and reports the tempo whenever its estimate changes.
pub struct RhythmSink<W: Write> {
    out: W,
    onsets: VecDeque<Duration>,
    beat_interval: Option<f64>,
    confidence: f64,
    reported_bpm: Option<u32>,
}

impl RhythmSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> RhythmSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            onsets: VecDeque::with_capacity(ONSET_WINDOW),
            beat_interval: None,
            confidence: 0.0,
            reported_bpm: None,
        }
    }

    pub fn bpm(&self) -> Option<u32> {
        self.beat_interval.map(to_bpm)
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn push_onset(&mut self, at: Duration) {
        if self.onsets.len() == ONSET_WINDOW {
            self.onsets.pop_front();
        }
        self.onsets.push_back(at);
    }

    fn analyze(&mut self) {
        if self.onsets.len() < MIN_ONSETS {
            return;
        }

        let intervals: Vec<f64> = self
            .onsets
            .iter()
            .zip(self.onsets.iter().skip(1))
            .map(|(a, b)| b.saturating_sub(*a).as_secs_f64())
            .filter(|gap| *gap < MAX_INTERVAL)
            .collect();
        let Some(estimate) = estimate_beat(&intervals) else {
            return;
        };
        if estimate.confidence <= MIN_ANALYSIS_CONFIDENCE {
            return;
        }
        log::debug!(
            "Tempo candidates: {:?}",
            estimate
                .candidates
                .iter()
                .map(|p| (to_bpm(p.interval), p.height))
                .collect::<Vec<_>>()
        );

        // Fold into 40-240 BPM.
        let mut interval = estimate.interval;
        let bpm = 60.0 / interval;
        if bpm < MIN_BPM {
            interval /= 2.0;
        } else if bpm > MAX_BPM {
            interval *= 2.0;
        }

        match self.beat_interval {
            Some(previous) => {
                self.beat_interval =
                    Some((1.0 - ADAPTATION_RATE) * previous + ADAPTATION_RATE * interval);
                self.confidence = (1.0 - ADAPTATION_RATE) * self.confidence
                    + ADAPTATION_RATE * estimate.confidence;
            }
            None => {
                self.beat_interval = Some(interval);
                self.confidence = estimate.confidence;
            }
        }
    }

    fn report(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            log::warn!("Failed to write tempo: {}", e);
        }
    }
}

impl<W: Write> EventSink for RhythmSink<W> {
    fn emit(&mut self, event: &MidiEvent) {
        if event.kind != EventKind::NoteOn {
            return;
        }
        self.push_onset(event.timestamp);
        self.analyze();

        let Some(bpm) = self.bpm() else {
            return;
        };
        if self.reported_bpm != Some(bpm) {
            self.reported_bpm = Some(bpm);
            let line = format!("Tempo: ~{} BPM (confidence {:.2})", bpm, self.confidence);
            self.report(&line);
        }
    }

    fn finish(&mut self) {
        match self.bpm() {
            Some(bpm) => {
                let line = format!(
                    "Final tempo: ~{} BPM (confidence {:.2})",
                    bpm,
                    self.confidence()
                );
                self.report(&line);
            }
            None => log::info!("Not enough notes for a tempo estimate"),
        }
    }
}
