//! Variable-width pulse oscillator.
//!
//! A pulse is two steps per cycle: up at phase 0, down at the duty-cycle
//! point. Each step gets a PolyBLEP correction so the edges stay band
//! limited even while the width sweeps under an envelope. The `aliases`
//! option drops the corrections for a raw edge.

use crate::dsp::ramp::{GeometricRamp, Ramp};
use crate::kernels::{poly_blep, RenderArgs};
use crate::synth::tone::Tone;

pub fn render(args: &RenderArgs, tone: &mut Tone, out: &mut [f32]) {
    let run = out.len();
    if run == 0 {
        return;
    }
    let aliases = args.instrument.aliases;
    let mut expression = Ramp::over(tone.expression_start, tone.expression_end, run);
    let mut width = Ramp::over(tone.pulse_width_start, tone.pulse_width_end, run);
    let mut delta = GeometricRamp::over(
        tone.freq_start / args.sample_rate,
        tone.freq_end / args.sample_rate,
        run,
    );
    let mut phase = tone.phases[0];

    for sample_out in out.iter_mut() {
        let dt = delta.next();
        let duty = width.next().clamp(0.01, 0.99);
        let mut raw = if phase < duty { 1.0 } else { -1.0 };
        if !aliases {
            raw += poly_blep(phase, dt);
            let falling = phase + 1.0 - duty;
            raw -= poly_blep(falling - falling.floor(), dt);
        }
        phase += dt;
        phase -= phase.floor();

        let filtered = tone.apply_note_filters(raw);
        *sample_out += (filtered * expression.next()) as f32;
    }

    tone.phases[0] = phase;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::instrument::Instrument;

    fn render_pulse(freq: f64, width: f64, aliases: bool) -> Vec<f32> {
        let mut instrument = Instrument::pulse_width(width as f32);
        instrument.aliases = aliases;
        let args = RenderArgs {
            sample_rate: 48_000.0,
            instrument: &instrument,
            wave_raw: &[],
            wave_integrated: &[],
        };
        let mut tone = Tone::default();
        tone.pitches.push(60);
        tone.freq_start = freq;
        tone.freq_end = freq;
        tone.expression_start = 1.0;
        tone.expression_end = 1.0;
        tone.pulse_width_start = width;
        tone.pulse_width_end = width;
        let mut out = vec![0.0f32; 4800];
        render(&args, &mut tone, &mut out);
        out
    }

    #[test]
    fn duty_cycle_shifts_the_mean() {
        let narrow = render_pulse(100.0, 0.1, true);
        let mean: f32 = narrow.iter().sum::<f32>() / narrow.len() as f32;
        // 10% high, 90% low: mean near -0.8.
        assert!((mean + 0.8).abs() < 0.05, "mean {mean}");

        let square = render_pulse(100.0, 0.5, true);
        let mean: f32 = square.iter().sum::<f32>() / square.len() as f32;
        assert!(mean.abs() < 0.05, "mean {mean}");
    }

    #[test]
    fn blep_path_smooths_the_edges() {
        let max_jump = |samples: &[f32]| {
            samples
                .windows(2)
                .map(|w| (w[1] - w[0]).abs())
                .fold(0.0f32, f32::max)
        };
        let rough = render_pulse(2000.0, 0.5, true);
        let smooth = render_pulse(2000.0, 0.5, false);
        assert!(max_jump(&smooth) < max_jump(&rough));
    }

    #[test]
    fn output_is_finite_while_width_sweeps() {
        let instrument = Instrument::pulse_width(0.25);
        let args = RenderArgs {
            sample_rate: 48_000.0,
            instrument: &instrument,
            wave_raw: &[],
            wave_integrated: &[],
        };
        let mut tone = Tone::default();
        tone.pitches.push(60);
        tone.freq_start = 440.0;
        tone.freq_end = 440.0;
        tone.expression_start = 1.0;
        tone.expression_end = 1.0;
        tone.pulse_width_start = 0.05;
        tone.pulse_width_end = 0.45;
        let mut out = vec![0.0f32; 2048];
        render(&args, &mut tone, &mut out);
        assert!(out.iter().all(|s| s.is_finite()));
    }
}
