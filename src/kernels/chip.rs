//! Wavetable playback for chip and harmonics instruments.
//!
//! The band-limited path looks up the table's running integral at the
//! current phase and at the next sample's phase; their difference divided
//! by the phase advance recovers the average of the underlying wave over
//! that interval, which suppresses aliasing at high phase deltas. The
//! `aliases` option bypasses this and reads the raw table directly for the
//! gritty retro sound.

use crate::dsp::ramp::{GeometricRamp, Ramp};
use crate::kernels::RenderArgs;
use crate::synth::tone::Tone;

/// Interpolated lookup into an integrated table (length `n + 1`).
#[inline]
fn integral_at(integrated: &[f32], phase: f64, length: f64) -> f64 {
    let wrapped = phase - phase.floor();
    let pos = wrapped * length;
    let index = pos as usize;
    let fraction = pos - index as f64;
    let a = integrated[index] as f64;
    let b = integrated[index + 1] as f64;
    a + (b - a) * fraction
}

/// Interpolated lookup into a raw single-cycle table.
#[inline]
fn raw_at(wave: &[f32], phase: f64, length: usize) -> f64 {
    let wrapped = phase - phase.floor();
    let pos = wrapped * length as f64;
    let index = pos as usize;
    let fraction = pos - index as f64;
    let a = wave[index] as f64;
    let b = wave[(index + 1) % length] as f64;
    a + (b - a) * fraction
}

pub fn render(args: &RenderArgs, tone: &mut Tone, out: &mut [f32]) {
    let run = out.len();
    if run == 0 || args.wave_raw.is_empty() {
        return;
    }
    let length = args.wave_raw.len();
    let length_f = length as f64;
    let unison = args.instrument.unison;
    let voices = unison.voice_count();
    let half_spread = unison.spread as f64 * 0.5;
    let voice_amp = unison.expression as f64;
    let aliases = args.instrument.aliases || args.wave_integrated.is_empty();

    let mut expression = Ramp::over(tone.expression_start, tone.expression_end, run);
    let mut phases = [tone.phases[0], tone.phases[1]];
    let mut deltas = [GeometricRamp::constant(0.0); 2];
    let mut signs = [1.0f64; 2];
    for voice in 0..voices {
        // Two-voice unison detunes symmetrically around the pitch.
        let detune = if voices == 1 {
            1.0
        } else if voice == 0 {
            (-half_spread / 12.0).exp2()
        } else {
            (half_spread / 12.0).exp2()
        };
        deltas[voice] = GeometricRamp::over(
            tone.freq_start * detune / args.sample_rate,
            tone.freq_end * detune / args.sample_rate,
            run,
        );
        signs[voice] = if voice == 1 { unison.sign as f64 } else { 1.0 };
    }

    for sample_out in out.iter_mut() {
        let mut raw = 0.0f64;
        for voice in 0..voices {
            let delta = deltas[voice].next();
            let phase = phases[voice];
            let voice_sample = if aliases {
                raw_at(args.wave_raw, phase, length)
            } else {
                let a = integral_at(args.wave_integrated, phase, length_f);
                let b = integral_at(args.wave_integrated, phase + delta, length_f);
                (b - a) / (delta * length_f).max(1e-12)
            };
            raw += voice_sample * voice_amp * signs[voice];
            phases[voice] = phase + delta;
        }
        let filtered = tone.apply_note_filters(raw);
        *sample_out += (filtered * expression.next()) as f32;
    }

    tone.phases[0] = phases[0] - phases[0].floor();
    tone.phases[1] = phases[1] - phases[1].floor();
}
