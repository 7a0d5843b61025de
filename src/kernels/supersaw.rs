//! Supersaw: seven detuned PolyBLEP saws.
//!
//! The center voice is always at full amplitude; the six side voices fade
//! in with the dynamism parameter, and their detune offsets scale with the
//! spread parameter. The shape parameter morphs each voice from a saw
//! toward a pulse by subtracting a half-cycle-shifted copy. Side-voice
//! phases start from a hash of the note identity so a re-render is
//! bit-identical without every note starting phase-locked.

use crate::dsp::hash_unit;
use crate::dsp::ramp::{GeometricRamp, Ramp};
use crate::kernels::{poly_blep, RenderArgs};
use crate::synth::tone::Tone;

pub const VOICE_COUNT: usize = 7;

/// Normalized detune offsets, center voice first.
const DETUNE_OFFSETS: [f64; VOICE_COUNT] = [0.0, -1.0, -0.6, -0.2, 0.2, 0.6, 1.0];

/// Deterministic starting phases for the side voices, derived from the
/// note's identity. Called by the scheduler when the tone first sounds.
pub fn init_phases(tone: &mut Tone) {
    for voice in 1..VOICE_COUNT {
        tone.phases[voice] = hash_unit(tone.note_id.wrapping_mul(31).wrapping_add(voice as u32)) as f64;
    }
}

#[inline]
fn blep_saw(phase: f64, dt: f64) -> f64 {
    2.0 * phase - 1.0 - poly_blep(phase, dt)
}

pub fn render(args: &RenderArgs, tone: &mut Tone, out: &mut [f32]) {
    let run = out.len();
    if run == 0 {
        return;
    }
    let spread = args.instrument.supersaw_spread as f64;
    let shape = args.instrument.supersaw_shape.clamp(0.0, 1.0) as f64;
    let mut expression = Ramp::over(tone.expression_start, tone.expression_end, run);
    let mut dynamism = Ramp::over(tone.dynamism_start, tone.dynamism_end, run);

    let mut phases = tone.phases;
    let mut deltas = [GeometricRamp::constant(0.0); VOICE_COUNT];
    for voice in 0..VOICE_COUNT {
        let detune = (DETUNE_OFFSETS[voice] * spread / 12.0).exp2();
        deltas[voice] = GeometricRamp::over(
            tone.freq_start * detune / args.sample_rate,
            tone.freq_end * detune / args.sample_rate,
            run,
        );
    }

    let mut prev = tone.supersaw_prev_sample;
    for sample_out in out.iter_mut() {
        let dyn_amount = dynamism.next().clamp(0.0, 1.0);
        // Keep total energy roughly level as side voices fade in.
        let normalize = 1.0 / (1.0 + 6.0 * dyn_amount * dyn_amount).sqrt();

        let mut raw = 0.0f64;
        for voice in 0..VOICE_COUNT {
            let dt = deltas[voice].next();
            let phase = phases[voice];
            let mut voice_sample = blep_saw(phase, dt);
            if shape > 0.0 {
                let shifted = phase + 0.5;
                voice_sample -= shape * blep_saw(shifted - shifted.floor(), dt);
            }
            let amp = if voice == 0 { 1.0 } else { dyn_amount };
            raw += voice_sample * amp;
            let next = phase + dt;
            phases[voice] = next - next.floor();
        }
        raw *= normalize;
        prev = raw;

        let filtered = tone.apply_note_filters(raw);
        *sample_out += (filtered * expression.next()) as f32;
    }

    tone.phases = phases;
    tone.supersaw_prev_sample = prev;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::instrument::Instrument;

    fn supersaw_tone(freq: f64, dynamism: f64) -> Tone {
        let mut tone = Tone::default();
        tone.pitches.push(57);
        tone.note_id = 7;
        tone.freq_start = freq;
        tone.freq_end = freq;
        tone.expression_start = 1.0;
        tone.expression_end = 1.0;
        tone.dynamism_start = dynamism;
        tone.dynamism_end = dynamism;
        init_phases(&mut tone);
        tone
    }

    #[test]
    fn phase_init_is_deterministic_per_note() {
        let a = supersaw_tone(220.0, 0.5);
        let b = supersaw_tone(220.0, 0.5);
        assert_eq!(a.phases, b.phases);

        let mut c = Tone::default();
        c.note_id = 8;
        init_phases(&mut c);
        assert_ne!(a.phases, c.phases);
    }

    #[test]
    fn zero_dynamism_is_a_single_saw() {
        let instrument = Instrument::supersaw();
        let args = RenderArgs {
            sample_rate: 48_000.0,
            instrument: &instrument,
            wave_raw: &[],
            wave_integrated: &[],
        };
        let mut tone = supersaw_tone(220.0, 0.0);
        let mut out = vec![0.0f32; 2048];
        render(&args, &mut tone, &mut out);
        // One saw at full level: output spans most of [-1, 1].
        let min = out.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = out.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!(max > 0.8 && min < -0.8, "range [{min}, {max}]");
    }

    #[test]
    fn dynamism_thickens_without_blowing_up() {
        let instrument = Instrument::supersaw();
        let args = RenderArgs {
            sample_rate: 48_000.0,
            instrument: &instrument,
            wave_raw: &[],
            wave_integrated: &[],
        };
        let mut tone = supersaw_tone(220.0, 1.0);
        let mut out = vec![0.0f32; 8192];
        render(&args, &mut tone, &mut out);
        assert!(out.iter().all(|s| s.is_finite()));
        let peak = out.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
        assert!(peak < 3.5, "normalization failed, peak {peak}");
        assert!(peak > 0.3);
    }
}
