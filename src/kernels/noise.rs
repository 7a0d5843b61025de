//! Noise and spectrum playback.
//!
//! Both families loop a long noise table (white for the basic noise
//! instrument, spectrally shaped for spectrum instruments). Pitch controls
//! playback speed through the table, and a one-pole low-pass whose
//! coefficient tracks the playback speed darkens low pitches the way a
//! slowed-down sample would sound.

use crate::dsp::ramp::{GeometricRamp, Ramp};
use crate::kernels::RenderArgs;
use crate::synth::tone::Tone;

/// Table playback runs at unit speed at this frequency; pitch scales it.
const REFERENCE_HZ: f64 = 440.0;

pub fn render(args: &RenderArgs, tone: &mut Tone, out: &mut [f32]) {
    let run = out.len();
    if run == 0 || args.wave_raw.is_empty() {
        return;
    }
    let length = args.wave_raw.len();
    let mask = length - 1;
    debug_assert!(length.is_power_of_two());

    let mut expression = Ramp::over(tone.expression_start, tone.expression_end, run);
    let mut step = GeometricRamp::over(
        tone.freq_start / REFERENCE_HZ,
        tone.freq_end / REFERENCE_HZ,
        run,
    );
    let mut phase = tone.phases[0];
    let mut smoothed = tone.noise_sample;

    for sample_out in out.iter_mut() {
        let delta = step.next();
        let index = (phase as usize) & mask;
        let table_sample = args.wave_raw[index] as f64;
        // Faster playback passes more of the table through unfiltered.
        let damping = delta.min(1.0);
        smoothed += (table_sample - smoothed) * damping;
        phase += delta;

        let filtered = tone.apply_note_filters(smoothed);
        *sample_out += (filtered * expression.next()) as f32;
    }

    tone.phases[0] = phase % length as f64;
    tone.noise_sample = smoothed;
}
