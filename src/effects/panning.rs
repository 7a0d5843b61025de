//! Mono to stereo conversion with equal-power panning and micro-delay.
//!
//! Level panning alone collapses on headphones; delaying the far channel
//! by a fraction of a millisecond (the Haas effect) keeps the image wide.
//! The mono input is written into a short ring so the lagging channel can
//! read slightly into the past.

use crate::dsp::delay::DelayLine;
use crate::dsp::ramp::Ramp;

/// Longest micro-delay in seconds at full pan and full pan-delay.
const MAX_DELAY_SECONDS: f64 = 0.001;

#[derive(Debug, Clone)]
pub struct Panning {
    history: DelayLine,
}

impl Panning {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            history: DelayLine::new((sample_rate * MAX_DELAY_SECONDS) as usize + 4),
        }
    }

    /// Split the mono buffer into left/right.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        pan_start: f64,
        pan_end: f64,
        delay_amount: f64,
        sample_rate: f64,
        mono: &[f32],
        left: &mut [f32],
        right: &mut [f32],
    ) {
        let run = mono.len();
        let mut pan = Ramp::over(pan_start, pan_end, run);
        let max_delay = sample_rate * MAX_DELAY_SECONDS * delay_amount.clamp(0.0, 1.0);

        for i in 0..run {
            let sample = mono[i];
            self.history.write(sample);
            let position = pan.next().clamp(-1.0, 1.0);
            let angle = (position + 1.0) * std::f64::consts::FRAC_PI_4;
            let gain_left = angle.cos();
            let gain_right = angle.sin();

            // The channel opposite the pan direction lags.
            let lag = 1.0 + position.abs() * max_delay;
            let delayed = self.history.read_fractional(lag);
            let (near, far) = (sample, delayed);
            if position >= 0.0 {
                left[i] = far * gain_left as f32;
                right[i] = near * gain_right as f32;
            } else {
                left[i] = near * gain_left as f32;
                right[i] = far * gain_right as f32;
            }
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
