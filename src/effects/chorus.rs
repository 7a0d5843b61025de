//! Chorus: three modulated delay taps per channel.
//!
//! Each channel reads the input at three slowly wobbling delays; the LFO
//! phase offsets differ per tap and per channel so the copies never line
//! up and the detuning spreads across the stereo field.

use crate::dsp::delay::DelayLine;
use crate::dsp::ramp::Ramp;

/// Tap delay wobbles around this center, in seconds.
const CENTER_DELAY_SECONDS: f64 = 0.011;
const DEPTH_SECONDS: f64 = 0.0034;
const LFO_HZ: f64 = 0.52;

/// Per-tap LFO phase offsets, one row per channel.
const TAP_PHASES: [[f64; 3]; 2] = [[0.0, 0.36, 0.71], [0.17, 0.53, 0.88]];

#[derive(Debug, Clone)]
pub struct Chorus {
    lines: [DelayLine; 2],
    lfo_phase: f64,
}

impl Chorus {
    pub fn new(sample_rate: f64) -> Self {
        let capacity = ((CENTER_DELAY_SECONDS + DEPTH_SECONDS) * sample_rate) as usize + 8;
        Self {
            lines: [DelayLine::new(capacity), DelayLine::new(capacity)],
            lfo_phase: 0.0,
        }
    }

    pub fn process(
        &mut self,
        wet_start: f64,
        wet_end: f64,
        sample_rate: f64,
        left: &mut [f32],
        right: &mut [f32],
    ) {
        let run = left.len();
        let mut wet = Ramp::over(wet_start, wet_end, run);
        let lfo_delta = LFO_HZ / sample_rate;
        let center = CENTER_DELAY_SECONDS * sample_rate;
        let depth = DEPTH_SECONDS * sample_rate;
        let mut lfo_phase = self.lfo_phase;

        for i in 0..run {
            let mix = wet.next().clamp(0.0, 1.0);
            self.lines[0].write(left[i]);
            self.lines[1].write(right[i]);

            for (channel, sample) in [&mut left[i], &mut right[i]].into_iter().enumerate() {
                let mut taps = 0.0f64;
                for tap in 0..3 {
                    let phase = lfo_phase + TAP_PHASES[channel][tap];
                    let wobble = (phase * std::f64::consts::TAU).sin();
                    let delay = center + wobble * depth;
                    taps += self.lines[channel].read_fractional(delay) as f64;
                }
                let dry = *sample as f64;
                *sample = (dry + (taps / 3.0 - dry) * mix) as f32;
            }

            lfo_phase += lfo_delta;
            lfo_phase -= lfo_phase.floor();
        }

        self.lfo_phase = lfo_phase;
    }

    /// True when the delay memory has fully emptied.
    pub fn is_silent(&self) -> bool {
        self.lines.iter().all(|line| line.is_silent())
    }

    pub fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
        self.lfo_phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_wet_is_transparent() {
        let mut chorus = Chorus::new(48_000.0);
        let mut left: Vec<f32> = (0..256).map(|i| (i as f32 * 0.1).sin()).collect();
        let mut right = left.clone();
        let original = left.clone();
        chorus.process(0.0, 0.0, 48_000.0, &mut left, &mut right);
        for (a, b) in left.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn wet_output_is_delayed_copy() {
        let mut chorus = Chorus::new(48_000.0);
        let mut left = vec![0.0f32; 1024];
        left[0] = 1.0;
        let mut right = left.clone();
        chorus.process(1.0, 1.0, 48_000.0, &mut left, &mut right);
        // Full wet: nothing at time zero, energy around the center delay.
        assert!(left[0].abs() < 1e-6);
        let window = 400..700; // ~11 ms at 48 kHz is sample 528
        assert!(left[window.clone()].iter().any(|&s| s.abs() > 0.05));
    }

    #[test]
    fn channels_decorrelate() {
        let mut chorus = Chorus::new(48_000.0);
        let mut left: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.05).sin()).collect();
        let mut right = left.clone();
        chorus.process(1.0, 1.0, 48_000.0, &mut left, &mut right);
        let difference: f32 = left
            .iter()
            .zip(right.iter())
            .skip(1024)
            .map(|(l, r)| (l - r).abs())
            .sum();
        assert!(difference > 0.1, "channels should differ, sum {difference}");
    }
}
