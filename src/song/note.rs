#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Highest number of simultaneous pitches one note may carry.
pub const MAX_PITCHES: usize = 4;

/// Note size (volume) settings range from 0 to `MAX_NOTE_SIZE`.
pub const MAX_NOTE_SIZE: u32 = 6;

/// A control point within a note. Between consecutive pins the engine
/// interpolates interval (pitch bend, in semitones) and size (volume)
/// linearly.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotePin {
    /// Offset from the note's start, in parts.
    pub time: u32,
    /// Pitch bend relative to the note's base pitches, in semitones.
    pub interval: i32,
    /// Volume, 0..=MAX_NOTE_SIZE.
    pub size: u32,
}

impl NotePin {
    pub fn new(time: u32, interval: i32, size: u32) -> Self {
        Self {
            time,
            interval,
            size: size.min(MAX_NOTE_SIZE),
        }
    }
}

/// A note: one or more pitches sounding from `start` to `end` (in parts,
/// counted from the bar start), shaped by an ordered list of pins.
///
/// Invariant: pins are ordered by time, the first pin is at time 0 and the
/// last at `end - start`. `simple()` and `with_pins()` maintain this.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub pitches: Vec<i32>,
    pub start: u32,
    pub end: u32,
    pub pins: Vec<NotePin>,
    /// True when this note is the continuation of a note that ended at the
    /// previous pattern's boundary (seamless hand-off eligibility).
    pub continues_last_pattern: bool,
}

impl Note {
    /// A single-pitch note at full size with no bend.
    pub fn simple(pitch: i32, start: u32, end: u32) -> Self {
        let end = end.max(start + 1);
        Self {
            pitches: vec![pitch],
            start,
            end,
            pins: vec![
                NotePin::new(0, 0, MAX_NOTE_SIZE),
                NotePin::new(end - start, 0, MAX_NOTE_SIZE),
            ],
            continues_last_pattern: false,
        }
    }

    /// A note with explicit pins. Pins are sorted and clamped so the pin
    /// invariant holds even for sloppy input.
    pub fn with_pins(pitches: Vec<i32>, start: u32, end: u32, mut pins: Vec<NotePin>) -> Self {
        let end = end.max(start + 1);
        let length = end - start;
        pins.sort_by_key(|p| p.time);
        pins.retain(|p| p.time <= length);
        if pins.first().map(|p| p.time) != Some(0) {
            pins.insert(0, NotePin::new(0, 0, MAX_NOTE_SIZE));
        }
        if pins.last().map(|p| p.time) != Some(length) {
            let last = *pins.last().unwrap();
            pins.push(NotePin::new(length, last.interval, last.size));
        }
        let mut pitches = pitches;
        pitches.truncate(MAX_PITCHES);
        Self {
            pitches,
            start,
            end,
            pins,
            continues_last_pattern: false,
        }
    }

    pub fn length_parts(&self) -> u32 {
        self.end - self.start
    }

    /// Interval and size at `part` (offset from the note start, may be
    /// fractional), linearly interpolated between the surrounding pins.
    pub fn pin_values_at(&self, part: f64) -> (f64, f64) {
        let part = part.clamp(0.0, self.length_parts() as f64);
        let mut prev = self.pins[0];
        for &pin in &self.pins[1..] {
            if (pin.time as f64) >= part {
                let span = (pin.time - prev.time).max(1) as f64;
                let ratio = (part - prev.time as f64) / span;
                let interval = prev.interval as f64 + (pin.interval - prev.interval) as f64 * ratio;
                let size = prev.size as f64 + (pin.size as f64 - prev.size as f64) * ratio;
                return (interval, size);
            }
            prev = pin;
        }
        (prev.interval as f64, prev.size as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_note_has_full_size_pins() {
        let note = Note::simple(60, 0, 24);
        assert_eq!(note.pins.len(), 2);
        assert_eq!(note.pin_values_at(0.0), (0.0, MAX_NOTE_SIZE as f64));
        assert_eq!(note.pin_values_at(24.0), (0.0, MAX_NOTE_SIZE as f64));
    }

    #[test]
    fn pin_interpolation_is_linear() {
        let note = Note::with_pins(
            vec![60],
            0,
            24,
            vec![NotePin::new(0, 0, 6), NotePin::new(24, 12, 0)],
        );

        let (interval, size) = note.pin_values_at(12.0);
        assert!((interval - 6.0).abs() < 1e-9);
        assert!((size - 3.0).abs() < 1e-9);
    }

    #[test]
    fn sloppy_pins_are_repaired() {
        // Missing a pin at time 0 and at the end; out of order.
        let note = Note::with_pins(
            vec![60],
            0,
            24,
            vec![NotePin::new(18, 2, 4), NotePin::new(6, -2, 6)],
        );

        assert_eq!(note.pins.first().unwrap().time, 0);
        assert_eq!(note.pins.last().unwrap().time, 24);
        for pair in note.pins.windows(2) {
            assert!(pair[0].time <= pair[1].time);
        }
    }

    #[test]
    fn pitch_count_is_capped() {
        let note = Note::with_pins(vec![60, 61, 62, 63, 64, 65], 0, 12, vec![]);
        assert_eq!(note.pitches.len(), MAX_PITCHES);
    }
}
