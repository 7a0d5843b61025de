/// Soft-knee limiter for the final stereo mix.
///
/// An envelope follower tracks the per-sample peak of both channels with
/// asymmetric smoothing: it rises quickly toward a louder signal and decays
/// slowly afterward, so short transients duck the gain briefly instead of
/// pumping. Above the threshold the applied gain is the soft-knee curve
/// `threshold + excess / ratio` over the follower value.
#[derive(Debug, Clone)]
pub struct Limiter {
    follower: f32,
    threshold: f32,
    ratio: f32,
    attack: f32,
    decay: f32,
}

impl Limiter {
    pub fn new(sample_rate: f32) -> Self {
        // Time constants: ~2 ms attack, ~250 ms decay.
        let attack = 1.0 - (-1.0 / (0.002 * sample_rate)).exp();
        let decay = 1.0 - (-1.0 / (0.25 * sample_rate)).exp();
        Self {
            follower: 0.0,
            threshold: 1.0,
            ratio: 4.0,
            attack,
            decay,
        }
    }

    /// Limit both channels in place over a sample range.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len());
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let peak = l.abs().max(r.abs());
            let coefficient = if peak > self.follower {
                self.attack
            } else {
                self.decay
            };
            self.follower += (peak - self.follower) * coefficient;

            let gain = if self.follower > self.threshold {
                let excess = self.follower - self.threshold;
                (self.threshold + excess / self.ratio) / self.follower
            } else {
                1.0
            };
            *l = (*l * gain).clamp(-1.0, 1.0);
            *r = (*r * gain).clamp(-1.0, 1.0);
        }
    }

    pub fn reset(&mut self) {
        self.follower = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_signal_passes_unchanged() {
        let mut limiter = Limiter::new(48_000.0);
        let mut left = vec![0.25f32; 256];
        let mut right = vec![-0.25f32; 256];
        limiter.process(&mut left, &mut right);
        for (&l, &r) in left.iter().zip(right.iter()) {
            assert!((l - 0.25).abs() < 1e-6);
            assert!((r + 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn loud_signal_is_reduced_and_bounded() {
        let mut limiter = Limiter::new(48_000.0);
        let mut left = vec![3.0f32; 4096];
        let mut right = vec![3.0f32; 4096];
        limiter.process(&mut left, &mut right);
        // After the attack settles the gain should be well below unity.
        assert!(left[4095] < 2.0);
        for &sample in left.iter().chain(right.iter()) {
            assert!(sample.is_finite());
            assert!(sample.abs() <= 1.0);
        }
    }

    #[test]
    fn gain_recovers_after_transient() {
        let mut limiter = Limiter::new(48_000.0);
        let mut left = vec![4.0f32; 512];
        let mut right = vec![4.0f32; 512];
        limiter.process(&mut left, &mut right);

        // A long quiet stretch lets the follower decay back below threshold.
        let mut quiet_l = vec![0.1f32; 48_000];
        let mut quiet_r = vec![0.1f32; 48_000];
        limiter.process(&mut quiet_l, &mut quiet_r);
        let tail = quiet_l[47_999];
        assert!((tail - 0.1).abs() < 1e-3, "gain should recover, got {tail}");
    }
}
