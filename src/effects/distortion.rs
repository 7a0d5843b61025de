//! Waveshaping distortion with 2x oversampling.
//!
//! The shaper is a soft clip `x * drive / (1 + |x * drive|)`. Running it at
//! the audio rate would alias (the shaper generates harmonics above
//! Nyquist), so each input sample is processed twice: once at a midpoint
//! interpolated from the previous input and once at the sample itself, and
//! the two shaped values are averaged.

use crate::dsp::ramp::Ramp;

#[derive(Debug, Clone, Default)]
pub struct Distortion {
    prev_input: f64,
}

#[inline]
fn shape(x: f64, drive: f64) -> f64 {
    let driven = x * drive;
    driven / (1.0 + driven.abs())
}

impl Distortion {
    pub fn process(&mut self, amount_start: f64, amount_end: f64, buffer: &mut [f32]) {
        let mut amount = Ramp::over(amount_start, amount_end, buffer.len());
        let mut prev = self.prev_input;
        for sample in buffer.iter_mut() {
            let wet = amount.next().clamp(0.0, 1.0);
            let input = *sample as f64;
            // Drive rises steeply with the slider; +1 keeps zero neutral.
            let drive = 1.0 + wet * wet * 15.0;
            let midpoint = (prev + input) * 0.5;
            let shaped = (shape(midpoint, drive) + shape(input, drive)) * 0.5;
            // Compensate the soft clip's gain loss at low levels.
            let makeup = 1.0 + wet * 0.6;
            *sample = (input + (shaped * makeup - input) * wet) as f32;
            prev = input;
        }
        self.prev_input = prev;
    }

    pub fn reset(&mut self) {
        self.prev_input = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_amount_is_transparent() {
        let mut distortion = Distortion::default();
        let mut buffer: Vec<f32> = (0..64).map(|i| (i as f32 / 10.0).sin() * 0.5).collect();
        let original = buffer.clone();
        distortion.process(0.0, 0.0, &mut buffer);
        for (a, b) in buffer.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn full_amount_compresses_peaks() {
        let mut distortion = Distortion::default();
        let mut buffer = vec![0.9f32; 64];
        distortion.process(1.0, 1.0, &mut buffer);
        // Soft clip keeps output below the driven input and finite.
        for &sample in &buffer {
            assert!(sample.is_finite());
            assert!(sample.abs() < 1.7);
        }
        // A loud input should be squashed relative to a quiet one.
        let mut quiet = vec![0.05f32; 64];
        let mut loud = vec![0.9f32; 64];
        Distortion::default().process(1.0, 1.0, &mut quiet);
        Distortion::default().process(1.0, 1.0, &mut loud);
        let quiet_gain = quiet[63] / 0.05;
        let loud_gain = loud[63] / 0.9;
        assert!(quiet_gain > loud_gain);
    }
}
