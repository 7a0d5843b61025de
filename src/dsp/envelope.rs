use std::f64::consts::TAU;

use crate::dsp::{hash32, hash_unit};
use crate::song::{EnvelopeSetting, EnvelopeShape, EnvelopeTarget, LfoWaveform, RandomKey};

/*
Envelope evaluation
===================

Envelopes turn elapsed time into a scalar multiplier. They are evaluated
exactly twice per tick - once for the tick's first sample and once for the
sample after its last - and everything downstream interpolates linearly
between the two. Discrete envelopes skip the end evaluation and hold the
start value, producing stepped motion.

Shapes receive elapsed time twice: raw seconds (wall-clock-independent,
derived from the sample counter) and "beats" already scaled by the
envelope's speed setting. Pseudo-random shapes hash a quantized time,
pitch, or note identity through `dsp::hash32`, so identical renders are
bit-for-bit identical; there is no stateful PRNG anywhere.
*/

/// How many beats the punch transient lasts.
const PUNCH_BEATS: f64 = 0.1;

/// Pure evaluation of one envelope shape. Output is non-negative and
/// nominally within [0, 2] (punch intentionally exceeds 1).
pub fn evaluate_shape(
    shape: &EnvelopeShape,
    seconds: f64,
    beats: f64,
    note_size: f64,
    pitch: f64,
    seed: u32,
) -> f64 {
    let _ = seconds;
    match shape {
        EnvelopeShape::None => 1.0,
        EnvelopeShape::NoteSize => note_size.clamp(0.0, 1.0),
        EnvelopeShape::Punch => 1.0 + (1.0 - beats / PUNCH_BEATS).max(0.0),
        EnvelopeShape::Twang => 1.0 / (1.0 + beats),
        EnvelopeShape::Swell => 1.0 - 1.0 / (1.0 + beats),
        EnvelopeShape::Lfo(waveform) => (lfo_bipolar(*waveform, beats) + 1.0) * 0.5,
        EnvelopeShape::RandomStep(key) => hash_unit(seed ^ random_bucket(*key, beats, pitch)) as f64,
        EnvelopeShape::RandomSmooth(key) => match key {
            RandomKey::Time => {
                let floor = beats.floor();
                let a = hash_unit(seed ^ mix_i64(floor as i64)) as f64;
                let b = hash_unit(seed ^ mix_i64(floor as i64 + 1)) as f64;
                let t = smoothstep(beats - floor);
                a + (b - a) * t
            }
            _ => hash_unit(seed ^ random_bucket(*key, beats, pitch)) as f64,
        },
        EnvelopeShape::PitchPosition {
            low_pitch,
            high_pitch,
        } => {
            let low = *low_pitch as f64;
            let high = (*high_pitch as f64).max(low + 1.0);
            ((pitch - low) / (high - low)).clamp(0.0, 1.0)
        }
        EnvelopeShape::Ramp(segments) => ramp_value(segments, beats),
    }
}

#[inline]
fn lfo_bipolar(waveform: LfoWaveform, cycles: f64) -> f64 {
    let phase = cycles.rem_euclid(1.0);
    match waveform {
        LfoWaveform::Sine => (phase * TAU).cos(),
        LfoWaveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs().min(0.5),
        LfoWaveform::Saw => 1.0 - 2.0 * phase,
        LfoWaveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
    }
}

#[inline]
fn random_bucket(key: RandomKey, beats: f64, pitch: f64) -> u32 {
    match key {
        RandomKey::Time => mix_i64(beats.floor() as i64),
        RandomKey::Pitch => mix_i64(pitch.round() as i64),
        // Note-keyed envelopes fold the note identity into the seed before
        // this is called; the bucket itself is constant for the note.
        RandomKey::Note => 0x9e37_79b9,
    }
}

#[inline]
fn mix_i64(x: i64) -> u32 {
    hash32((x as u32).wrapping_add(((x >> 32) as u32).wrapping_mul(0x85eb_ca6b)))
}

#[inline]
fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn ramp_value(segments: &[(f32, f32)], beats: f64) -> f64 {
    if segments.is_empty() {
        return 1.0;
    }
    let mut prev_time = 0.0f64;
    let mut prev_level = segments[0].1 as f64;
    for &(time, level) in segments {
        let time = time as f64;
        if beats <= time {
            let span = (time - prev_time).max(1e-9);
            let t = (beats - prev_time) / span;
            return prev_level + (level as f64 - prev_level) * t;
        }
        prev_time = time;
        prev_level = level as f64;
    }
    prev_level
}

/// Apply an envelope's bounds and inversion flag to a raw shape value.
#[inline]
pub fn apply_bounds(setting: &EnvelopeSetting, raw: f64) -> f64 {
    let (lo, hi) = setting.bounds();
    let mut value = raw.clamp(0.0, 2.0);
    if setting.inverted {
        value = 1.0 - value.min(1.0);
    }
    lo as f64 + (hi - lo) as f64 * value
}

/// Cross-fade ratio for a slide transition: 0 at the boundary, 1 once
/// `slide_ticks` have elapsed. Reused by every kernel that blends state
/// across adjacent notes.
#[inline]
pub fn slide_ratio(ticks_into_note: f64, slide_ticks: f64) -> f64 {
    if slide_ticks <= 0.0 {
        return 1.0;
    }
    (ticks_into_note / slide_ticks).clamp(0.0, 1.0)
}

/// Per-target multipliers at a tick's start and end.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeValues {
    pub note_volume_start: f64,
    pub note_volume_end: f64,
    pub note_filter_mult_start: f64,
    pub note_filter_mult_end: f64,
    pub pulse_width_mult_start: f64,
    pub pulse_width_mult_end: f64,
    pub supersaw_dynamism_mult_start: f64,
    pub supersaw_dynamism_mult_end: f64,
    pub pitch_shift_start: f64,
    pub pitch_shift_end: f64,
}

impl Default for EnvelopeValues {
    fn default() -> Self {
        Self {
            note_volume_start: 1.0,
            note_volume_end: 1.0,
            note_filter_mult_start: 1.0,
            note_filter_mult_end: 1.0,
            pulse_width_mult_start: 1.0,
            pulse_width_mult_end: 1.0,
            supersaw_dynamism_mult_start: 1.0,
            supersaw_dynamism_mult_end: 1.0,
            pitch_shift_start: 0.0,
            pitch_shift_end: 0.0,
        }
    }
}

/// Everything `EnvelopeComputer::compute` needs to know about the tick.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeTiming {
    /// Length of this tick in seconds.
    pub tick_seconds: f64,
    /// Length of this tick in beats.
    pub tick_beats: f64,
    /// Note pin size at the tick start and end, normalized 0..1.
    pub note_size_start: f64,
    pub note_size_end: f64,
    /// The tone's primary pitch in semitones.
    pub pitch: f64,
    /// Identity of the originating note (stable across its lifetime).
    pub note_id: u32,
}

/// Per-tone envelope state: elapsed time since the note attack and the
/// evaluated per-target multipliers for the current tick.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeComputer {
    /// Seconds since the note attack, at the current tick's start.
    pub note_seconds: f64,
    /// Ticks since the note attack, at the current tick's start.
    pub note_ticks: f64,
    pub values: EnvelopeValues,
}

impl EnvelopeComputer {
    pub fn reset(&mut self) {
        self.note_seconds = 0.0;
        self.note_ticks = 0.0;
        self.values = EnvelopeValues::default();
    }

    /// Evaluate every envelope at the tick's start and end, folding results
    /// into per-target products. Call once per tick before rendering, then
    /// `advance_tick` after.
    pub fn compute(&mut self, envelopes: &[EnvelopeSetting], timing: &EnvelopeTiming) {
        let mut values = EnvelopeValues::default();
        // Beats since attack derive from ticks, so tempo changes mid-note
        // track the transport rather than wall seconds.
        let start_beats = self.note_ticks * timing.tick_beats;
        let end_beats = (self.note_ticks + 1.0) * timing.tick_beats;
        let start_seconds = self.note_seconds;
        let end_seconds = self.note_seconds + timing.tick_seconds;

        for setting in envelopes {
            let seed = match &setting.shape {
                EnvelopeShape::RandomStep(RandomKey::Note)
                | EnvelopeShape::RandomSmooth(RandomKey::Note) => setting.seed ^ hash32(timing.note_id),
                _ => setting.seed,
            };
            let speed = setting.speed.max(0.0) as f64;
            let start_raw = evaluate_shape(
                &setting.shape,
                start_seconds,
                start_beats * speed,
                timing.note_size_start,
                timing.pitch,
                seed,
            );
            let start = apply_bounds(setting, start_raw);
            let end = if setting.discrete {
                start
            } else {
                let end_raw = evaluate_shape(
                    &setting.shape,
                    end_seconds,
                    end_beats * speed,
                    timing.note_size_end,
                    timing.pitch,
                    seed,
                );
                apply_bounds(setting, end_raw)
            };

            match setting.target {
                EnvelopeTarget::NoteVolume => {
                    values.note_volume_start *= start;
                    values.note_volume_end *= end;
                }
                EnvelopeTarget::NoteFilterFreqs => {
                    values.note_filter_mult_start *= start;
                    values.note_filter_mult_end *= end;
                }
                EnvelopeTarget::PulseWidth => {
                    values.pulse_width_mult_start *= start;
                    values.pulse_width_mult_end *= end;
                }
                EnvelopeTarget::SupersawDynamism => {
                    values.supersaw_dynamism_mult_start *= start;
                    values.supersaw_dynamism_mult_end *= end;
                }
                EnvelopeTarget::PitchShift => {
                    // Additive in semitones, centered so 0.5 is no shift.
                    values.pitch_shift_start += (start - 0.5) * 24.0;
                    values.pitch_shift_end += (end - 0.5) * 24.0;
                }
            }
        }
        self.values = values;
    }

    /// Advance the attack clocks by one tick. Seconds accumulate from the
    /// tick length so the clock is sample-accurate, not wall-clock based.
    pub fn advance_tick(&mut self, tick_seconds: f64) {
        self.note_seconds += tick_seconds;
        self.note_ticks += 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(shape: &EnvelopeShape, beats: f64) -> f64 {
        evaluate_shape(shape, beats * 0.5, beats, 1.0, 60.0, 1)
    }

    #[test]
    fn twang_decays_and_swell_rises() {
        assert!((eval(&EnvelopeShape::Twang, 0.0) - 1.0).abs() < 1e-9);
        assert!(eval(&EnvelopeShape::Twang, 4.0) < 0.25);
        assert!((eval(&EnvelopeShape::Swell, 0.0)).abs() < 1e-9);
        assert!(eval(&EnvelopeShape::Swell, 4.0) > 0.75);
    }

    #[test]
    fn punch_boosts_only_the_attack() {
        assert!(eval(&EnvelopeShape::Punch, 0.0) > 1.9);
        assert!((eval(&EnvelopeShape::Punch, 1.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn lfo_cycles_per_beat() {
        let shape = EnvelopeShape::Lfo(LfoWaveform::Sine);
        assert!((eval(&shape, 0.0) - 1.0).abs() < 1e-9);
        assert!(eval(&shape, 0.5) < 1e-9);
        assert!((eval(&shape, 1.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn random_step_is_deterministic_and_stepped() {
        let shape = EnvelopeShape::RandomStep(RandomKey::Time);
        let a = eval(&shape, 0.2);
        let b = eval(&shape, 0.8);
        let c = eval(&shape, 1.2);
        assert_eq!(a, b, "same bucket, same value");
        assert_ne!(a, c, "different bucket should (almost surely) differ");
        assert_eq!(eval(&shape, 0.2), a, "re-evaluation is identical");
    }

    #[test]
    fn random_smooth_interpolates_between_buckets() {
        let shape = EnvelopeShape::RandomSmooth(RandomKey::Time);
        let at_bucket = eval(&shape, 1.0);
        let mid = eval(&shape, 1.5);
        let next = eval(&shape, 2.0);
        let (lo, hi) = if at_bucket < next {
            (at_bucket, next)
        } else {
            (next, at_bucket)
        };
        assert!(mid >= lo - 1e-9 && mid <= hi + 1e-9);
    }

    #[test]
    fn pitch_position_maps_range() {
        let shape = EnvelopeShape::PitchPosition {
            low_pitch: 24,
            high_pitch: 84,
        };
        assert!((evaluate_shape(&shape, 0.0, 0.0, 1.0, 24.0, 1) - 0.0).abs() < 1e-9);
        assert!((evaluate_shape(&shape, 0.0, 0.0, 1.0, 54.0, 1) - 0.5).abs() < 1e-9);
        assert!((evaluate_shape(&shape, 0.0, 0.0, 1.0, 120.0, 1) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ramp_follows_breakpoints() {
        let shape = EnvelopeShape::Ramp(vec![(0.0, 0.0), (1.0, 1.0), (2.0, 0.5)]);
        assert!((eval(&shape, 0.5) - 0.5).abs() < 1e-9);
        assert!((eval(&shape, 1.0) - 1.0).abs() < 1e-9);
        assert!((eval(&shape, 1.5) - 0.75).abs() < 1e-9);
        assert!((eval(&shape, 9.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn inversion_and_bounds() {
        let mut setting = EnvelopeSetting::new(EnvelopeTarget::NoteVolume, EnvelopeShape::Twang);
        setting.lower_bound = 0.25;
        setting.upper_bound = 0.75;
        assert!((apply_bounds(&setting, 1.0) - 0.75).abs() < 1e-9);
        assert!((apply_bounds(&setting, 0.0) - 0.25).abs() < 1e-9);
        setting.inverted = true;
        assert!((apply_bounds(&setting, 1.0) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn slide_primitives() {
        assert_eq!(slide_ratio(0.0, 4.0), 0.0);
        assert_eq!(slide_ratio(2.0, 4.0), 0.5);
        assert_eq!(slide_ratio(8.0, 4.0), 1.0);
        assert_eq!(slide_ratio(1.0, 0.0), 1.0);
    }

    #[test]
    fn computer_advances_clocks_per_tick() {
        let mut computer = EnvelopeComputer::default();
        let timing = EnvelopeTiming {
            tick_seconds: 0.01,
            tick_beats: 1.0 / 48.0,
            note_size_start: 1.0,
            note_size_end: 1.0,
            pitch: 60.0,
            note_id: 7,
        };
        let envelopes = vec![EnvelopeSetting::new(
            EnvelopeTarget::NoteVolume,
            EnvelopeShape::Twang,
        )];

        computer.compute(&envelopes, &timing);
        let first = computer.values.note_volume_start;
        assert!((first - 1.0).abs() < 1e-9, "fresh note starts undecayed");

        for _ in 0..480 {
            computer.advance_tick(timing.tick_seconds);
        }
        computer.compute(&envelopes, &timing);
        assert!(computer.values.note_volume_start < first);
        assert!((computer.note_seconds - 4.8).abs() < 1e-9);
    }

    #[test]
    fn discrete_envelope_holds_start_value() {
        let mut setting =
            EnvelopeSetting::new(EnvelopeTarget::NoteVolume, EnvelopeShape::Twang);
        setting.discrete = true;
        setting.speed = 100.0;
        let mut computer = EnvelopeComputer::default();
        let timing = EnvelopeTiming {
            tick_seconds: 0.01,
            tick_beats: 0.5,
            note_size_start: 1.0,
            note_size_end: 1.0,
            pitch: 60.0,
            note_id: 0,
        };
        computer.compute(std::slice::from_ref(&setting), &timing);
        assert_eq!(
            computer.values.note_volume_start,
            computer.values.note_volume_end
        );
    }
}
