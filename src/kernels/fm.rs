//! Four-operator phase-modulation synthesis.
//!
//! Each operator is a sine read from the shared table. The algorithm table
//! says which operators modulate which and how many of them are carriers
//! (carriers are always the lowest-numbered operators). Modulators add
//! their previous-sample output, scaled by their amplitude curve, to the
//! phase of the operator they feed; operator 1 can additionally feed back
//! its own averaged output.

use crate::dsp::ramp::{GeometricRamp, Ramp};
use crate::dsp::wavetable::{self, SINE_TABLE_LENGTH};
use crate::kernels::RenderArgs;
use crate::song::instrument::OPERATOR_COUNT;
use crate::synth::tone::Tone;

/// Operator frequency multipliers, indexed by `FmOperator::frequency`.
pub const FREQUENCY_RATIOS: [f64; 15] = [
    0.5, 1.0, 1.5, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 11.0, 13.0, 16.0, 20.0,
];

/// One wiring of the four operators.
#[derive(Debug, Clone, Copy)]
pub struct Algorithm {
    pub carrier_count: usize,
    /// For each operator, which operators modulate it.
    pub modulated_by: [&'static [usize]; OPERATOR_COUNT],
}

/// The classic thirteen 4-op wirings, from a single full stack (every
/// modulator feeding carrier 1) to four independent carriers.
pub const ALGORITHMS: [Algorithm; 13] = [
    // 1 <- (2 3 4)
    Algorithm { carrier_count: 1, modulated_by: [&[1, 2, 3], &[], &[], &[]] },
    // 1 <- (2, 3 <- 4)
    Algorithm { carrier_count: 1, modulated_by: [&[1, 2], &[], &[3], &[]] },
    // 1 <- 2 <- (3 4)
    Algorithm { carrier_count: 1, modulated_by: [&[1], &[2, 3], &[], &[]] },
    // 1 <- (2 3) <- 4
    Algorithm { carrier_count: 1, modulated_by: [&[1, 2], &[3], &[3], &[]] },
    // 1 <- 2 <- 3 <- 4
    Algorithm { carrier_count: 1, modulated_by: [&[1], &[2], &[3], &[]] },
    // 1 <- 3, 2 <- 4
    Algorithm { carrier_count: 2, modulated_by: [&[2], &[3], &[], &[]] },
    // 1, 2 <- (3 4)
    Algorithm { carrier_count: 2, modulated_by: [&[], &[2, 3], &[], &[]] },
    // 1, 2 <- 3 <- 4
    Algorithm { carrier_count: 2, modulated_by: [&[], &[2], &[3], &[]] },
    // (1 2) <- 3 <- 4
    Algorithm { carrier_count: 2, modulated_by: [&[2], &[2], &[3], &[]] },
    // (1 2) <- (3 4)
    Algorithm { carrier_count: 2, modulated_by: [&[2, 3], &[2, 3], &[], &[]] },
    // 1, 2, 3 <- 4
    Algorithm { carrier_count: 3, modulated_by: [&[], &[], &[3], &[]] },
    // (1 2 3) <- 4
    Algorithm { carrier_count: 3, modulated_by: [&[3], &[3], &[3], &[]] },
    // 1, 2, 3, 4
    Algorithm { carrier_count: 4, modulated_by: [&[], &[], &[], &[]] },
];

/// Perceptual amplitude curve for the 0..=15 slider.
#[inline]
pub fn amplitude_curve(amplitude: u32) -> f64 {
    (16.0f64.powf(amplitude.min(15) as f64 / 15.0) - 1.0) / 15.0
}

#[inline]
fn sine_at(table: &[f32], phase: f64) -> f64 {
    let wrapped = phase - phase.floor();
    let pos = wrapped * SINE_TABLE_LENGTH as f64;
    let index = pos as usize & (SINE_TABLE_LENGTH - 1);
    let fraction = pos - pos.floor();
    let a = table[index] as f64;
    let b = table[(index + 1) & (SINE_TABLE_LENGTH - 1)] as f64;
    a + (b - a) * fraction
}

pub fn render(args: &RenderArgs, tone: &mut Tone, out: &mut [f32]) {
    let run = out.len();
    if run == 0 {
        return;
    }
    let table = wavetable::sine_table();
    let algorithm = ALGORITHMS[args.instrument.fm_algorithm.min(ALGORITHMS.len() - 1)];
    let carrier_count = algorithm.carrier_count;
    let carrier_scale = 1.0 / carrier_count as f64;
    let feedback = amplitude_curve(args.instrument.fm_feedback) * 0.3;

    let mut amplitudes = [0.0f64; OPERATOR_COUNT];
    let mut deltas = [GeometricRamp::constant(0.0); OPERATOR_COUNT];
    for (op, setting) in args.instrument.fm_operators.iter().enumerate() {
        amplitudes[op] = amplitude_curve(setting.amplitude);
        let ratio = FREQUENCY_RATIOS[setting.frequency.min(FREQUENCY_RATIOS.len() - 1)];
        deltas[op] = GeometricRamp::over(
            tone.freq_start * ratio / args.sample_rate,
            tone.freq_end * ratio / args.sample_rate,
            run,
        );
    }

    let mut expression = Ramp::over(tone.expression_start, tone.expression_end, run);
    let mut phases = [tone.phases[0], tone.phases[1], tone.phases[2], tone.phases[3]];
    let mut prev_outputs = tone.fm_prev_outputs;

    for sample_out in out.iter_mut() {
        let mut outputs = [0.0f64; OPERATOR_COUNT];
        // Highest operator first so modulators are fresh within the sample.
        for op in (0..OPERATOR_COUNT).rev() {
            let mut phase_mod = 0.0f64;
            for &source in algorithm.modulated_by[op] {
                // Sources are always higher-numbered, so already computed.
                phase_mod += outputs[source] * amplitudes[source];
            }
            if op == 0 && feedback > 0.0 {
                phase_mod += prev_outputs[0] * feedback;
            }
            outputs[op] = sine_at(table, phases[op] + phase_mod);
            phases[op] += deltas[op].next();
        }

        let mut raw = 0.0f64;
        for carrier in 0..carrier_count {
            raw += outputs[carrier] * amplitudes[carrier];
        }
        raw *= carrier_scale;
        prev_outputs = outputs;

        let filtered = tone.apply_note_filters(raw);
        *sample_out += (filtered * expression.next()) as f32;
    }

    for op in 0..OPERATOR_COUNT {
        tone.phases[op] = phases[op] - phases[op].floor();
    }
    tone.fm_prev_outputs = prev_outputs;
}
