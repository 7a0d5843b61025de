//! Tempo-synced stereo echo.
//!
//! The delay time is a number of beats, so it changes with the tempo. The
//! offset between write and read positions is interpolated per sample when
//! the target changes, and the delay line grows (preserving history) when
//! a slower tempo needs more room. Each feedback pass runs through a
//! one-pole low-pass so repeats get progressively darker.

use crate::dsp::delay::DelayLine;
use crate::dsp::ramp::Ramp;

/// Feedback shelf coefficient; lower is darker repeats.
const SHELF_COEFFICIENT: f64 = 0.45;

#[derive(Debug, Clone)]
pub struct Echo {
    lines: [DelayLine; 2],
    shelf_samples: [f64; 2],
    /// Delay offset currently in effect, in samples.
    current_offset: f64,
}

impl Echo {
    pub fn new() -> Self {
        Self {
            lines: [DelayLine::new(2048), DelayLine::new(2048)],
            shelf_samples: [0.0; 2],
            current_offset: 0.0,
        }
    }

    /// Make sure both lines can hold `samples` of history, growing without
    /// dropping audio already in flight.
    pub fn ensure_capacity(&mut self, samples: usize) {
        for line in &mut self.lines {
            line.grow_preserving(samples + 4);
        }
    }

    pub fn process(
        &mut self,
        delay_samples: f64,
        sustain_start: f64,
        sustain_end: f64,
        left: &mut [f32],
        right: &mut [f32],
    ) {
        let run = left.len();
        let delay_samples = delay_samples.max(2.0);
        self.ensure_capacity(delay_samples.ceil() as usize);
        if self.current_offset == 0.0 {
            self.current_offset = delay_samples;
        }
        // Glide toward a changed delay instead of jumping.
        let mut offset = Ramp::over(self.current_offset, delay_samples, run);
        let mut sustain = Ramp::over(sustain_start, sustain_end, run);

        for i in 0..run {
            let delay = offset.next();
            let feedback = sustain.next().clamp(0.0, 0.9);
            for (channel, sample) in [&mut left[i], &mut right[i]].into_iter().enumerate() {
                let delayed = self.lines[channel].read_fractional(delay) as f64;
                self.shelf_samples[channel] +=
                    (delayed - self.shelf_samples[channel]) * SHELF_COEFFICIENT;
                let echoed = self.shelf_samples[channel] * feedback;
                let dry = *sample as f64;
                self.lines[channel].write((dry + echoed) as f32);
                *sample = (dry + echoed) as f32;
            }
        }
        self.current_offset = delay_samples;
    }

    pub fn is_silent(&self) -> bool {
        self.lines.iter().all(|line| line.is_silent())
    }

    pub fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
        self.shelf_samples = [0.0; 2];
        self.current_offset = 0.0;
    }
}

impl Default for Echo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_repeats_at_the_delay_time() {
        let mut echo = Echo::new();
        let delay = 1000.0;
        let mut left = vec![0.0f32; 4000];
        left[0] = 1.0;
        let mut right = left.clone();
        echo.process(delay, 0.6, 0.6, &mut left, &mut right);

        assert!((left[0] - 1.0).abs() < 1e-6);
        // First repeat lands around sample 1000, darker and quieter.
        let first_repeat: f32 = left[995..1010].iter().map(|s| s.abs()).sum();
        assert!(first_repeat > 0.1, "repeat energy {first_repeat}");
        // Second repeat is quieter than the first.
        let second_repeat: f32 = left[1995..2010].iter().map(|s| s.abs()).sum();
        assert!(second_repeat < first_repeat);
    }

    #[test]
    fn zero_sustain_produces_no_repeats() {
        let mut echo = Echo::new();
        let mut left = vec![0.0f32; 3000];
        left[0] = 1.0;
        let mut right = left.clone();
        echo.process(500.0, 0.0, 0.0, &mut left, &mut right);
        let tail: f32 = left[100..].iter().map(|s| s.abs()).sum();
        assert!(tail < 1e-6);
    }

    #[test]
    fn longer_delay_grows_without_dropping_the_tail() {
        let mut echo = Echo::new();
        let mut left = vec![0.0f32; 1024];
        left[0] = 1.0;
        let mut right = left.clone();
        echo.process(800.0, 0.8, 0.8, &mut left, &mut right);
        assert!(!echo.is_silent());

        // Tempo slows: the delay now exceeds the original capacity.
        let mut left = vec![0.0f32; 8192];
        let mut right = left.clone();
        echo.process(5000.0, 0.8, 0.8, &mut left, &mut right);
        assert!(left.iter().all(|s| s.is_finite()));
        // The first impulse's repeat still emerges.
        assert!(left.iter().any(|&s| s.abs() > 0.01));
    }
}
