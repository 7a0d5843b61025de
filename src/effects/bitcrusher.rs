//! Bit depth and sample rate reduction.
//!
//! Two degradations in one stage: a sample-and-hold that only picks up a
//! new input every N samples (N fractional, from the freq-crush amount),
//! and an amplitude quantizer. Out-of-range input triangle-folds back into
//! [-1, 1] before quantizing, which is what gives an overdriven bitcrusher
//! its characteristic wrap instead of a flat clip.

use crate::dsp::ramp::Ramp;

#[derive(Debug, Clone, Default)]
pub struct Bitcrusher {
    held: f64,
    phase: f64,
}

/// Fold any input into [-1, 1] with period-4 triangle symmetry.
#[inline]
fn triangle_fold(x: f64) -> f64 {
    ((x + 1.0).rem_euclid(4.0) - 2.0).abs() - 1.0
}

#[inline]
fn quantize(x: f64, bits: u32) -> f64 {
    let steps = (1u32 << bits.clamp(1, 8)) as f64;
    let folded = triangle_fold(x);
    ((folded + 1.0) * 0.5 * steps).round() / steps * 2.0 - 1.0
}

impl Bitcrusher {
    pub fn process(
        &mut self,
        bits: u32,
        freq_crush_start: f64,
        freq_crush_end: f64,
        buffer: &mut [f32],
    ) {
        let mut freq_crush = Ramp::over(freq_crush_start, freq_crush_end, buffer.len());
        for sample in buffer.iter_mut() {
            let amount = freq_crush.next().clamp(0.0, 1.0);
            // 1x at zero up to 64x hold at full crush.
            let hold_length = (amount * 6.0).exp2();
            self.phase += 1.0;
            if self.phase >= hold_length {
                self.phase -= hold_length;
                self.held = quantize(*sample as f64, bits);
            }
            *sample = self.held as f32;
        }
    }

    pub fn reset(&mut self) {
        self.held = 0.0;
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_is_identity_in_range() {
        for x in [-1.0, -0.5, 0.0, 0.3, 1.0] {
            assert!((triangle_fold(x) - x).abs() < 1e-12);
        }
    }

    #[test]
    fn fold_reflects_overdrive() {
        assert!((triangle_fold(1.5) - 0.5).abs() < 1e-12);
        assert!((triangle_fold(-1.5) + 0.5).abs() < 1e-12);
        assert!((triangle_fold(3.0) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn quantizer_limits_distinct_levels() {
        let bits = 2;
        let mut levels: Vec<i64> = (-100..=100)
            .map(|i| (quantize(i as f64 / 100.0, bits) * 1e9) as i64)
            .collect();
        levels.sort_unstable();
        levels.dedup();
        assert!(levels.len() <= (1 << bits) + 1, "got {} levels", levels.len());
    }

    #[test]
    fn freq_crush_holds_samples() {
        let mut crusher = Bitcrusher::default();
        let mut buffer: Vec<f32> = (0..256).map(|i| (i as f32 * 0.07).sin()).collect();
        crusher.process(8, 1.0, 1.0, &mut buffer);
        // At 64x hold, long runs of identical output samples appear.
        let repeats = buffer.windows(2).filter(|w| w[0] == w[1]).count();
        assert!(repeats > 200, "expected held samples, got {repeats} repeats");
    }
}
