//! Karplus-Strong picked string.
//!
//! Each pitch of the tone gets its own string: a circular delay line whose
//! loop length is the pitch period, excited by a short noise burst at note
//! attack. The loop runs through a first-order all-pass that realizes the
//! fractional part of the period (tuning stays exact between semitones)
//! and a one-pole low-pass whose coefficient and loop gain come from the
//! sustain setting. The period is interpolated per sample so pitch glides
//! stay smooth. Strings are summed and run through the note filter chain
//! once per sample.

use crate::dsp::hash_unit;
use crate::dsp::ramp::Ramp;
use crate::kernels::RenderArgs;
use crate::song::note::MAX_PITCHES;
use crate::synth::tone::{PickedString, Tone};

/// Loop gain and low-pass brightness for a sustain slider value.
#[inline]
fn sustain_response(sustain: f32) -> (f64, f64) {
    let sustain = sustain.clamp(0.0, 1.0) as f64;
    let gain = 0.88 + 0.119 * sustain;
    let brightness = 0.25 + 0.72 * sustain;
    (gain, brightness)
}

fn pluck(string: &mut PickedString, period: f64, note_id: u32) {
    string.impulse_remaining = (period.ceil() as u32).max(2);
    string.impulse_counter = note_id.wrapping_mul(2654435769);
    string.delay_length = period;
}

pub fn render(args: &RenderArgs, tone: &mut Tone, out: &mut [f32]) {
    let run = out.len();
    if run == 0 || tone.pitches.is_empty() || tone.freq_start <= 0.0 {
        return;
    }
    let (gain, brightness) = sustain_response(args.instrument.string_sustain);
    let count = tone.pitches.len().min(MAX_PITCHES);
    while tone.strings.len() < count {
        tone.strings.push(PickedString::new());
    }

    let primary = tone.primary_pitch();
    let mut periods = [Ramp::ZERO; MAX_PITCHES];
    for index in 0..count {
        // Chord pitches keep a fixed ratio to the primary frequency.
        let ratio = ((tone.pitches[index] - primary) as f64 / 12.0).exp2();
        let period_start = args.sample_rate / (tone.freq_start * ratio);
        let period_end = args.sample_rate / (tone.freq_end * ratio).max(1e-3);
        periods[index] = Ramp::over(period_start, period_end, run);

        let string = &mut tone.strings[index];
        let max_period = period_start.max(period_end) as usize;
        if string.delay_line.capacity() < max_period + 4 {
            string.delay_line.grow_preserving(max_period + 4);
        }
        if string.delay_length == 0.0 && string.impulse_remaining == 0 {
            pluck(string, period_start, tone.note_id.wrapping_add(index as u32));
        }
    }

    let mut expression = Ramp::over(tone.expression_start, tone.expression_end, run);
    for sample_out in out.iter_mut() {
        let mut raw = 0.0f64;
        for index in 0..count {
            let string = &mut tone.strings[index];
            let delay = periods[index].next().max(2.0);
            // Integer part from the ring, fractional part from the all-pass.
            let whole = delay.floor();
            let fraction = delay - whole;
            let coefficient = (1.0 - fraction) / (1.0 + fraction);
            let delayed = string.delay_line.read(whole as usize) as f64;
            let dispersed =
                coefficient * (delayed - string.all_pass_output) + string.all_pass_input;
            string.all_pass_input = delayed;
            string.all_pass_output = dispersed;

            string.shelf_sample += (dispersed - string.shelf_sample) * brightness;
            let mut feedback = string.shelf_sample * gain;
            if string.impulse_remaining > 0 {
                string.impulse_remaining -= 1;
                string.impulse_counter = string.impulse_counter.wrapping_add(1);
                feedback += (hash_unit(string.impulse_counter) * 2.0 - 1.0) as f64;
            }
            string.delay_line.write(feedback as f32);
            string.delay_length = delay;
            raw += string.shelf_sample;
        }

        let filtered = tone.apply_note_filters(raw);
        *sample_out += (filtered * expression.next()) as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::instrument::Instrument;

    fn pluck_and_render(sustain: f32, samples: usize) -> Vec<f32> {
        let mut instrument = Instrument::picked_string();
        instrument.string_sustain = sustain;
        let args = RenderArgs {
            sample_rate: 48_000.0,
            instrument: &instrument,
            wave_raw: &[],
            wave_integrated: &[],
        };
        let mut tone = Tone::default();
        tone.pitches.push(57);
        tone.note_id = 3;
        tone.freq_start = 220.0;
        tone.freq_end = 220.0;
        tone.expression_start = 1.0;
        tone.expression_end = 1.0;
        let mut out = vec![0.0f32; samples];
        render(&args, &mut tone, &mut out);
        out
    }

    #[test]
    fn pluck_produces_a_decaying_tone() {
        let out = pluck_and_render(0.5, 48_000);
        assert!(out.iter().all(|s| s.is_finite()));
        let early: f32 = out[..4800].iter().map(|s| s * s).sum();
        let late: f32 = out[43_200..].iter().map(|s| s * s).sum();
        assert!(early > 1e-4, "string should sound after the pluck");
        assert!(late < early, "string should decay");
    }

    #[test]
    fn higher_sustain_rings_longer() {
        let tail_energy = |sustain: f32| {
            let out = pluck_and_render(sustain, 48_000);
            out[24_000..].iter().map(|s| s * s).sum::<f32>()
        };
        assert!(tail_energy(0.95) > tail_energy(0.2) * 2.0);
    }

    #[test]
    fn chord_grows_one_string_per_pitch() {
        let instrument = Instrument::picked_string();
        let args = RenderArgs {
            sample_rate: 48_000.0,
            instrument: &instrument,
            wave_raw: &[],
            wave_integrated: &[],
        };
        let mut tone = Tone::default();
        tone.pitches.extend([57, 61, 64]);
        tone.freq_start = 220.0;
        tone.freq_end = 220.0;
        tone.expression_start = 1.0;
        tone.expression_end = 1.0;
        let mut out = vec![0.0f32; 1024];
        render(&args, &mut tone, &mut out);
        assert_eq!(tone.strings.len(), 3);
        assert!(tone.strings.iter().all(|s| !s.delay_line.is_silent()));
    }
}
