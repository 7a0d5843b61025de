//! The composition data model: the validated, read-only input the engine
//! renders from. Loading, saving, and editing this structure belong to the
//! host; the engine only reads it.

/// Instrument configuration: oscillator, effects, envelopes.
pub mod instrument;
/// Notes and their piecewise-linear pitch/size pins.
pub mod note;

pub use instrument::{
    ChordKind, EffectFlags, EnvelopeSetting, EnvelopeShape, EnvelopeTarget, FilterControlPoint,
    FilterKind, FilterSettings, Instrument, LfoWaveform, OscillatorType, RandomKey, Transition,
    Unison,
};
pub use note::{Note, NotePin};

use crate::PARTS_PER_BEAT;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One bar's worth of notes, played by one of the channel's instruments.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    pub notes: Vec<Note>,
    /// Index into the owning channel's instrument list.
    pub instrument: usize,
}

impl Pattern {
    pub fn new(instrument: usize, notes: Vec<Note>) -> Self {
        Self { notes, instrument }
    }

    /// The note sounding at `part` (parts are counted from the bar start).
    pub fn note_at(&self, part: u32) -> Option<&Note> {
        self.notes.iter().find(|n| n.start <= part && part < n.end)
    }

    /// The note that starts exactly when `note` ends, if any.
    pub fn note_after(&self, note: &Note) -> Option<&Note> {
        self.notes.iter().find(|n| n.start == note.end)
    }

    /// The note that ends exactly when `note` starts, if any.
    pub fn note_before(&self, note: &Note) -> Option<&Note> {
        self.notes.iter().find(|n| n.end == note.start)
    }
}

/// A channel groups instruments with the patterns they play.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct Channel {
    pub instruments: Vec<Instrument>,
    pub patterns: Vec<Pattern>,
    /// Bar index -> pattern index, `None` for an empty bar.
    pub bars: Vec<Option<usize>>,
}

impl Channel {
    pub fn pattern_at_bar(&self, bar: u32) -> Option<&Pattern> {
        self.bars
            .get(bar as usize)
            .copied()
            .flatten()
            .and_then(|idx| self.patterns.get(idx))
    }
}

/// A full composition. All times are in parts (`PARTS_PER_BEAT` per beat).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Song {
    /// Beats per minute. Modulatable at runtime; this is the base value.
    pub tempo: f32,
    pub beats_per_bar: u32,
    pub bar_count: u32,
    /// First bar of the loop region.
    pub loop_start: u32,
    /// Number of bars in the loop region (at least 1).
    pub loop_length: u32,
    /// Master output gain applied before the limiter.
    pub master_volume: f32,
    pub channels: Vec<Channel>,
}

impl Song {
    pub fn new(tempo: f32, beats_per_bar: u32, bar_count: u32) -> Self {
        Self {
            tempo: tempo.clamp(30.0, 320.0),
            beats_per_bar: beats_per_bar.clamp(3, 16),
            bar_count: bar_count.max(1),
            loop_start: 0,
            loop_length: bar_count.max(1),
            master_volume: 1.0,
            channels: Vec::new(),
        }
    }

    pub fn parts_per_bar(&self) -> u32 {
        self.beats_per_bar * PARTS_PER_BEAT
    }

    /// A small built-in composition used by the player binary, benches, and
    /// integration tests: a chip-wave melody over a picked-string bass with
    /// echo and reverb on the lead.
    pub fn demo() -> Self {
        let mut song = Song::new(120.0, 4, 4);
        song.loop_start = 0;
        song.loop_length = 4;

        let mut lead = Instrument::chip(2);
        lead.volume = 0.7;
        lead.effects = EffectFlags::CHORUS | EffectFlags::ECHO | EffectFlags::REVERB;
        lead.echo_sustain = 0.5;
        lead.echo_delay_beats = 0.5;
        lead.reverb = 0.4;

        let mut bass = Instrument::picked_string();
        bass.volume = 0.8;

        let q = PARTS_PER_BEAT; // one beat, in parts
        let melody = |pitches: &[i32]| -> Vec<Note> {
            pitches
                .iter()
                .enumerate()
                .map(|(i, &p)| Note::simple(p, i as u32 * q, (i as u32 + 1) * q))
                .collect()
        };

        let lead_channel = Channel {
            instruments: vec![lead],
            patterns: vec![
                Pattern::new(0, melody(&[60, 64, 67, 72])),
                Pattern::new(0, melody(&[59, 62, 67, 71])),
            ],
            bars: vec![Some(0), Some(1), Some(0), Some(1)],
        };

        let bass_channel = Channel {
            instruments: vec![bass],
            patterns: vec![
                Pattern::new(0, vec![Note::simple(36, 0, 2 * q), Note::simple(43, 2 * q, 4 * q)]),
                Pattern::new(0, vec![Note::simple(31, 0, 2 * q), Note::simple(38, 2 * q, 4 * q)]),
            ],
            bars: vec![Some(0), Some(1), Some(0), Some(1)],
        };

        song.channels = vec![lead_channel, bass_channel];
        song
    }
}
