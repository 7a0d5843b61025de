use std::f64::consts::{LN_2, PI};

use crate::dsp::DENORMAL_LIMIT;
use crate::song::{FilterControlPoint, FilterKind};

/*
| kind         | response                  | gain slider means      |
| ------------ | ------------------------- | ---------------------- |
| low-pass     | 2nd-order Butterworth     | resonance at cutoff    |
| high-pass    | 2nd-order Butterworth     | resonance at cutoff    |
| peak         | RBJ peaking EQ, 1 octave  | boost/cut at center    |
| legacy 1st   | one-pole                  | ignored                |

Filter settings arrive in integer "slider" units and convert geometrically:
each frequency step is a quarter octave around an 8 kHz reference, each
gain step is half a power of two around a flat center.
*/

/// Number of frequency slider steps.
pub const FREQ_RANGE: u32 = 34;
/// The slider setting that maps to `FREQ_REFERENCE_HZ`.
pub const FREQ_REFERENCE_SETTING: u32 = 28;
pub const FREQ_REFERENCE_HZ: f64 = 8000.0;
/// Octaves per frequency slider step.
pub const FREQ_STEP_OCTAVES: f64 = 0.25;
/// Number of gain slider steps; `GAIN_CENTER` is flat.
pub const GAIN_RANGE: u32 = 15;
pub const GAIN_CENTER: u32 = 7;
/// Powers of two per gain slider step.
pub const GAIN_STEP: f64 = 0.5;

/// History magnitudes above this are treated as a numerical blow-up.
const RUNAWAY_LIMIT: f64 = 1e12;

pub fn setting_to_hz(freq_setting: u32) -> f64 {
    let setting = freq_setting.min(FREQ_RANGE - 1) as f64;
    FREQ_REFERENCE_HZ
        * 2.0_f64.powf((setting - FREQ_REFERENCE_SETTING as f64) * FREQ_STEP_OCTAVES)
}

pub fn setting_to_linear_gain(gain_setting: u32) -> f64 {
    let setting = gain_setting.min(GAIN_RANGE - 1) as f64;
    2.0_f64.powf((setting - GAIN_CENTER as f64) * GAIN_STEP)
}

/// Canonical biquad coefficients (direct form 1, a0 normalized away).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterCoefficients {
    pub a1: f64,
    pub a2: f64,
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
}

impl FilterCoefficients {
    pub fn through() -> Self {
        Self {
            b0: 1.0,
            ..Default::default()
        }
    }

    /// 2nd-order Butterworth low-pass; `peak_linear_gain` acts as Q, so the
    /// gain slider controls resonance at the cutoff.
    pub fn low_pass_2nd_butterworth(corner_radians: f64, peak_linear_gain: f64) -> Self {
        let corner = corner_radians.clamp(1e-4, PI * 0.99);
        let alpha = corner.sin() / (2.0 * peak_linear_gain.max(1e-4));
        let cos_w = corner.cos();
        let a0 = 1.0 + alpha;
        Self {
            a1: -2.0 * cos_w / a0,
            a2: (1.0 - alpha) / a0,
            b0: (1.0 - cos_w) * 0.5 / a0,
            b1: (1.0 - cos_w) / a0,
            b2: (1.0 - cos_w) * 0.5 / a0,
        }
    }

    /// 2nd-order Butterworth high-pass, gain slider as resonance.
    pub fn high_pass_2nd_butterworth(corner_radians: f64, peak_linear_gain: f64) -> Self {
        let corner = corner_radians.clamp(1e-4, PI * 0.99);
        let alpha = corner.sin() / (2.0 * peak_linear_gain.max(1e-4));
        let cos_w = corner.cos();
        let a0 = 1.0 + alpha;
        Self {
            a1: -2.0 * cos_w / a0,
            a2: (1.0 - alpha) / a0,
            b0: (1.0 + cos_w) * 0.5 / a0,
            b1: -(1.0 + cos_w) / a0,
            b2: (1.0 + cos_w) * 0.5 / a0,
        }
    }

    /// Peaking EQ, one octave wide, boosting or cutting by `linear_gain`.
    pub fn peak_2nd_order(corner_radians: f64, linear_gain: f64) -> Self {
        let corner = corner_radians.clamp(1e-4, PI * 0.99);
        let sqrt_gain = linear_gain.max(1e-4).sqrt();
        // Bandwidth-form alpha keeps the octave width stable near Nyquist.
        let alpha = corner.sin() * (LN_2 / 2.0 * corner / corner.sin()).sinh();
        let a0 = 1.0 + alpha / sqrt_gain;
        Self {
            a1: -2.0 * corner.cos() / a0,
            a2: (1.0 - alpha / sqrt_gain) / a0,
            b0: (1.0 + alpha * sqrt_gain) / a0,
            b1: -2.0 * corner.cos() / a0,
            b2: (1.0 - alpha * sqrt_gain) / a0,
        }
    }

    /// Legacy one-pole low-pass kept for imported compositions.
    pub fn low_pass_1st_order(corner_radians: f64) -> Self {
        let g = 2.0 * (corner_radians.clamp(1e-4, PI * 0.99) / 2.0).sin();
        let g = g.min(1.0);
        Self {
            a1: g - 1.0,
            b0: g,
            ..Default::default()
        }
    }

    /// Legacy one-pole high-pass kept for imported compositions.
    pub fn high_pass_1st_order(corner_radians: f64) -> Self {
        let g = 2.0 * (corner_radians.clamp(1e-4, PI * 0.99) / 2.0).sin();
        let g = g.min(1.0);
        Self {
            a1: g - 1.0,
            b0: 1.0 - g * 0.5,
            b1: -(1.0 - g * 0.5),
            ..Default::default()
        }
    }

    /// Legacy simplified resonant low-pass (2nd order, fixed topology).
    pub fn low_pass_2nd_order_simplified(corner_radians: f64, resonance: f64) -> Self {
        let g = 2.0 * (corner_radians.clamp(1e-4, PI * 0.99) / 2.0).sin();
        let feedback = resonance.clamp(0.0, 0.9) + resonance / (1.0 - g).max(1e-4);
        let scale = 1.0 / (1.0 + feedback * g).max(1e-4);
        Self {
            a1: -2.0 * (1.0 - g) * scale,
            a2: (1.0 - g) * (1.0 - g) * scale * scale,
            b0: g * g,
            ..Default::default()
        }
    }
}

/// Convert a control point to coefficients for a sample rate, with runtime
/// multipliers from envelopes/modulation applied to frequency and gain.
pub fn control_point_coefficients(
    point: &FilterControlPoint,
    sample_rate: f64,
    freq_mult: f64,
    gain_mult: f64,
) -> FilterCoefficients {
    let hz = (setting_to_hz(point.freq) * freq_mult.max(0.0)).clamp(8.0, sample_rate * 0.495);
    let corner = 2.0 * PI * hz / sample_rate;
    let gain = (setting_to_linear_gain(point.gain) * gain_mult.max(0.0)).max(1e-4);
    match point.kind {
        FilterKind::LowPass => FilterCoefficients::low_pass_2nd_butterworth(corner, gain),
        FilterKind::HighPass => FilterCoefficients::high_pass_2nd_butterworth(corner, gain),
        FilterKind::Peak => FilterCoefficients::peak_2nd_order(corner, gain),
        FilterKind::LegacyLowPass1 => FilterCoefficients::low_pass_1st_order(corner),
        FilterKind::LegacyHighPass1 => FilterCoefficients::high_pass_1st_order(corner),
        FilterKind::LegacyLowPass2 => {
            FilterCoefficients::low_pass_2nd_order_simplified(corner, gain.min(0.9))
        }
    }
}

/// A biquad section whose coefficients slide per sample between a tick's
/// start and end values. Feedback coefficient deltas are additive; input
/// coefficient deltas may be additive or multiplicative per section
/// (multiplicative suits cutoff sweeps where b coefficients span orders of
/// magnitude).
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicBiquad {
    pub a1: f64,
    pub a2: f64,
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    a1_delta: f64,
    a2_delta: f64,
    b0_delta: f64,
    b1_delta: f64,
    b2_delta: f64,
    multiplicative_inputs: bool,
    pub output1: f64,
    pub output2: f64,
}

impl DynamicBiquad {
    /// Hold `coefs` for the whole run (no interpolation).
    pub fn load(&mut self, coefs: &FilterCoefficients) {
        self.a1 = coefs.a1;
        self.a2 = coefs.a2;
        self.b0 = coefs.b0;
        self.b1 = coefs.b1;
        self.b2 = coefs.b2;
        self.a1_delta = 0.0;
        self.a2_delta = 0.0;
        self.b0_delta = 0.0;
        self.b1_delta = 0.0;
        self.b2_delta = 0.0;
        self.multiplicative_inputs = false;
    }

    /// Interpolate from `start` to `end` over `run_length` samples.
    pub fn load_gradient(
        &mut self,
        start: &FilterCoefficients,
        end: &FilterCoefficients,
        run_length: usize,
        multiplicative_inputs: bool,
    ) {
        if run_length == 0 {
            self.load(start);
            return;
        }
        let inv = 1.0 / run_length as f64;
        self.a1 = start.a1;
        self.a2 = start.a2;
        self.b0 = start.b0;
        self.b1 = start.b1;
        self.b2 = start.b2;
        self.a1_delta = (end.a1 - start.a1) * inv;
        self.a2_delta = (end.a2 - start.a2) * inv;
        self.multiplicative_inputs = multiplicative_inputs;
        if multiplicative_inputs {
            // Geometric steps; degenerate signs fall back to additive.
            let ok = start.b0 * end.b0 > 0.0 && start.b1 * end.b1 > 0.0 && start.b2 * end.b2 > 0.0;
            if ok {
                self.b0_delta = (end.b0 / start.b0).powf(inv);
                self.b1_delta = (end.b1 / start.b1).powf(inv);
                self.b2_delta = (end.b2 / start.b2).powf(inv);
                return;
            }
            self.multiplicative_inputs = false;
        }
        self.b0_delta = (end.b0 - start.b0) * inv;
        self.b1_delta = (end.b1 - start.b1) * inv;
        self.b2_delta = (end.b2 - start.b2) * inv;
    }

    #[inline]
    fn advance_coefficients(&mut self) {
        self.a1 += self.a1_delta;
        self.a2 += self.a2_delta;
        if self.multiplicative_inputs {
            self.b0 *= self.b0_delta;
            self.b1 *= self.b1_delta;
            self.b2 *= self.b2_delta;
        } else {
            self.b0 += self.b0_delta;
            self.b1 += self.b1_delta;
            self.b2 += self.b2_delta;
        }
    }

    pub fn reset_history(&mut self) {
        self.output1 = 0.0;
        self.output2 = 0.0;
    }
}

/// Run `sample` through a cascade of sections, advancing each section's
/// interpolated coefficients by one sample.
///
/// `input1`/`input2` are the raw input's one- and two-sample history; each
/// subsequent section's input history is the previous section's output
/// history, which the sections already store.
#[inline]
pub fn apply_chain(
    filters: &mut [DynamicBiquad],
    mut sample: f64,
    mut input1: f64,
    mut input2: f64,
) -> f64 {
    for filter in filters.iter_mut() {
        let output1 = filter.output1;
        let output2 = filter.output2;
        sample = filter.b0 * sample + filter.b1 * input1 + filter.b2 * input2
            - filter.a1 * output1
            - filter.a2 * output2;
        filter.advance_coefficients();
        filter.output2 = output1;
        filter.output1 = sample;
        input1 = output1;
        input2 = output2;
    }
    sample
}

/// Post-run numerical hygiene for one chain. A single runaway section
/// corrupts the whole cascade, so any non-finite or implausibly large
/// history resets every section's history at once. Tiny magnitudes snap to
/// exactly zero so later runs don't grind through denormals.
pub fn sanitize_chain(filters: &mut [DynamicBiquad], initial_input: &mut [f64; 2]) {
    let mut blown_up = !initial_input[0].is_finite() || !initial_input[1].is_finite();
    for filter in filters.iter() {
        if !filter.output1.is_finite()
            || !filter.output2.is_finite()
            || filter.output1.abs() > RUNAWAY_LIMIT
            || filter.output2.abs() > RUNAWAY_LIMIT
        {
            blown_up = true;
            break;
        }
    }
    if blown_up {
        for filter in filters.iter_mut() {
            filter.reset_history();
        }
        *initial_input = [0.0; 2];
        return;
    }
    for filter in filters.iter_mut() {
        if filter.output1.abs() < DENORMAL_LIMIT {
            filter.output1 = 0.0;
        }
        if filter.output2.abs() < DENORMAL_LIMIT {
            filter.output2 = 0.0;
        }
    }
    for value in initial_input.iter_mut() {
        if value.abs() < DENORMAL_LIMIT {
            *value = 0.0;
        }
    }
}
