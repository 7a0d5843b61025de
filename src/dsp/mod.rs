//! Low-level DSP primitives used by the kernels and the effects pipeline.
//!
//! These components are allocation-free on the render path and realtime
//! safe, so they can be embedded directly inside tone and instrument state.
//! Orchestration (which tone uses which primitive when) lives in `synth`.

/// Ring-buffer delay line with fractional reads.
pub mod delay;
/// Envelope shape evaluation and the per-tone envelope computer.
pub mod envelope;
/// Biquad coefficients with per-sample interpolation.
pub mod filter;
/// Soft-knee limiter for the final stereo mix.
pub mod limiter;
/// The value-plus-delta interpolation primitive.
pub mod ramp;
/// Built-in waves, integrals, and FFT-synthesized wavetables.
pub mod wavetable;

/// Magnitudes below this are snapped to exactly zero to keep denormals out
/// of filter and delay feedback paths.
pub const DENORMAL_LIMIT: f64 = 1e-24;

/// Deterministic 32-bit integer mix. This is the only source of
/// "randomness" in the engine: random envelopes, noise tables, and supersaw
/// phase offsets all hash quantized inputs through it, so re-rendering a
/// composition is bit-for-bit reproducible.
#[inline]
pub fn hash32(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^= x >> 16;
    x
}

/// Hash to a float in [0, 1).
#[inline]
pub fn hash_unit(x: u32) -> f32 {
    (hash32(x) >> 8) as f32 / (1 << 24) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash32(12345), hash32(12345));
        assert_ne!(hash32(12345), hash32(12346));
    }

    #[test]
    fn hash_unit_stays_in_range() {
        for i in 0..10_000 {
            let v = hash_unit(i);
            assert!((0.0..1.0).contains(&v));
        }
    }
}
