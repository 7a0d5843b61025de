//! Feedback delay network reverb.
//!
//! Four delay lines with mutually prime lengths, mixed each sample by a
//! Hadamard matrix so energy keeps being exchanged between lines instead
//! of settling into a single repeating pattern. Each feedback path runs
//! through a one-pole low-pass, so the tail darkens as it decays. Input is
//! the mono sum; the four line outputs pair off differently for left and
//! right, which decorrelates the channels.

use crate::dsp::delay::DelayLine;
use crate::dsp::ramp::Ramp;

/// Mutually prime line lengths (samples). Tuned at 48 kHz; at other rates
/// the reverb is simply a little shorter or longer.
const LINE_LENGTHS: [usize; 4] = [1913, 2273, 2647, 3119];

/// Keeps the total loop gain below 1 after the Hadamard mix.
const FEEDBACK_SCALE: f64 = 0.5 * 0.82;

const SHELF_COEFFICIENT: f64 = 0.55;

#[derive(Debug, Clone)]
pub struct Reverb {
    lines: [DelayLine; 4],
    shelf_samples: [f64; 4],
}

impl Reverb {
    pub fn new() -> Self {
        Self {
            lines: [
                DelayLine::new(LINE_LENGTHS[0]),
                DelayLine::new(LINE_LENGTHS[1]),
                DelayLine::new(LINE_LENGTHS[2]),
                DelayLine::new(LINE_LENGTHS[3]),
            ],
            shelf_samples: [0.0; 4],
        }
    }

    pub fn process(
        &mut self,
        wet_start: f64,
        wet_end: f64,
        left: &mut [f32],
        right: &mut [f32],
    ) {
        let run = left.len();
        let mut wet = Ramp::over(wet_start, wet_end, run);

        for i in 0..run {
            let mix = wet.next().clamp(0.0, 1.0);
            let input = (left[i] as f64 + right[i] as f64) * 0.5 * mix;

            let mut outputs = [0.0f64; 4];
            for line in 0..4 {
                let delayed = self.lines[line].read(LINE_LENGTHS[line]) as f64;
                self.shelf_samples[line] +=
                    (delayed - self.shelf_samples[line]) * SHELF_COEFFICIENT;
                outputs[line] = self.shelf_samples[line];
            }

            // Hadamard mix of the four line outputs.
            let a = outputs[0] + outputs[1];
            let b = outputs[0] - outputs[1];
            let c = outputs[2] + outputs[3];
            let d = outputs[2] - outputs[3];
            let mixed = [
                (a + c) * FEEDBACK_SCALE,
                (b + d) * FEEDBACK_SCALE,
                (a - c) * FEEDBACK_SCALE,
                (b - d) * FEEDBACK_SCALE,
            ];
            for line in 0..4 {
                self.lines[line].write((mixed[line] + input) as f32);
            }

            left[i] += (outputs[0] + outputs[2]) as f32;
            right[i] += (outputs[1] + outputs[3]) as f32;
        }
    }

    pub fn is_silent(&self) -> bool {
        self.lines.iter().all(|line| line.is_silent())
    }

    pub fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
        self.shelf_samples = [0.0; 4];
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_grows_a_decaying_tail() {
        let mut reverb = Reverb::new();
        let mut left = vec![0.0f32; 96_000];
        let mut right = vec![0.0f32; 96_000];
        left[0] = 1.0;
        right[0] = 1.0;
        reverb.process(1.0, 1.0, &mut left, &mut right);

        assert!(left.iter().all(|s| s.is_finite()));
        let early: f32 = left[2000..20_000].iter().map(|s| s * s).sum();
        let late: f32 = left[76_000..].iter().map(|s| s * s).sum();
        assert!(early > 1e-6, "tail should exist, energy {early}");
        assert!(late < early, "tail should decay: {late} vs {early}");
    }

    #[test]
    fn zero_wet_is_transparent_and_stays_silent() {
        let mut reverb = Reverb::new();
        let mut left = vec![0.5f32; 512];
        let mut right = vec![0.5f32; 512];
        reverb.process(0.0, 0.0, &mut left, &mut right);
        assert!(left.iter().all(|&s| (s - 0.5).abs() < 1e-6));
        assert!(reverb.is_silent());
    }

    #[test]
    fn channels_decorrelate() {
        let mut reverb = Reverb::new();
        let mut left = vec![0.0f32; 30_000];
        let mut right = vec![0.0f32; 30_000];
        left[0] = 1.0;
        right[0] = 1.0;
        reverb.process(1.0, 1.0, &mut left, &mut right);
        let difference: f32 = left[5000..]
            .iter()
            .zip(right[5000..].iter())
            .map(|(l, r)| (l - r).abs())
            .sum();
        assert!(difference > 1e-3);
    }
}
