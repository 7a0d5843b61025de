/*
Oscillator kernels
==================

One render function per instrument family. Every kernel follows the same
contract:

  - The scheduler has already filled the tone's per-run ramp targets
    (frequency, expression, and any kernel-specific parameters) for the
    sample run being rendered.
  - The kernel copies its phase state to locals, runs a tight per-sample
    loop, and writes the state back at the end of the run.
  - Each raw oscillator sample goes through the tone's note filter chain,
    is scaled by the interpolated expression, and is ADDED into the mono
    scratch buffer (tones on one instrument sum together).
  - No allocation inside the loop. The picked-string kernel may allocate
    string state the first time a tone sounds, never per sample.
*/

pub mod chip;
pub mod fm;
pub mod noise;
pub mod pulse;
pub mod string;
pub mod supersaw;

use crate::song::instrument::{Instrument, OscillatorType};
use crate::synth::tone::Tone;

/// Everything a kernel needs beyond the tone itself. The wavetable slices
/// are resolved by the instrument state (built-in chip tables, or tables
/// synthesized from harmonics/spectrum sliders) and are empty for kernels
/// that don't read tables.
pub struct RenderArgs<'a> {
    pub sample_rate: f64,
    pub instrument: &'a Instrument,
    /// Raw single-cycle (or noise) table.
    pub wave_raw: &'a [f32],
    /// Integrated table with one guard sample, for anti-aliased playback.
    pub wave_integrated: &'a [f32],
}

/// Render one tone's contribution for a sample run into `out`.
pub fn render(args: &RenderArgs, tone: &mut Tone, out: &mut [f32]) {
    match args.instrument.oscillator {
        OscillatorType::Chip | OscillatorType::Harmonics => chip::render(args, tone, out),
        OscillatorType::Noise | OscillatorType::Spectrum => noise::render(args, tone, out),
        OscillatorType::PulseWidth => pulse::render(args, tone, out),
        OscillatorType::Supersaw => supersaw::render(args, tone, out),
        OscillatorType::Fm => fm::render(args, tone, out),
        OscillatorType::PickedString => string::render(args, tone, out),
    }
    tone.sanitize_filters();
}

/// Band-limiting correction for a step discontinuity at phase `t` with
/// per-sample phase advance `dt`, both in cycles. Subtracting this from a
/// naive saw (or adding at a pulse edge) cancels the worst aliasing.
#[inline]
pub(crate) fn poly_blep(t: f64, dt: f64) -> f64 {
    if t < dt {
        let t = t / dt;
        t + t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + t + t + 1.0
    } else {
        0.0
    }
}
