use std::f32::consts::TAU;
use std::sync::OnceLock;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::dsp::hash_unit;
use crate::song::instrument::{HARMONICS_COUNT, SPECTRUM_COUNT};

/*
Wavetables
==========

Chip-style playback reads a short single-cycle table. Naive lookup aliases
badly once the phase delta exceeds a sample or two, so each table is also
stored as its running integral: the kernel recovers the band-limited sample
as the finite difference of consecutive integral lookups divided by the
local phase delta. The raw table remains available for the explicit
"aliases" retro option.

Harmonics and spectrum instruments don't ship tables at all; their tables
are synthesized here from slider settings via an inverse FFT (rustfft) the
first time an instrument state is configured.
*/

/// Length of one built-in chip wave cycle.
pub const CHIP_WAVE_LENGTH: usize = 64;
/// Length of the harmonics-instrument wavetable.
pub const HARMONICS_WAVE_LENGTH: usize = 2048;
/// Length of the noise and spectrum wavetables.
pub const NOISE_WAVE_LENGTH: usize = 32768;
/// FM sine table length (power of two, used with a mask).
pub const SINE_TABLE_LENGTH: usize = 1024;

pub const CHIP_WAVE_COUNT: usize = 8;

const CHIP_WAVE_NAMES: [&str; CHIP_WAVE_COUNT] = [
    "square",
    "triangle",
    "sawtooth",
    "sine",
    "pulse 25%",
    "double saw",
    "rounded",
    "staircase",
];

pub fn chip_wave_name(index: usize) -> &'static str {
    CHIP_WAVE_NAMES[index.min(CHIP_WAVE_COUNT - 1)]
}

fn chip_wave_sample(index: usize, phase: f32) -> f32 {
    match index {
        0 => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        1 => 1.0 - 4.0 * (phase - 0.5).abs().min(0.5),
        2 => 2.0 * phase - 1.0,
        3 => (phase * TAU).sin(),
        4 => {
            if phase < 0.25 {
                1.0
            } else {
                -1.0
            }
        }
        5 => 2.0 * (phase * 2.0).fract() - 1.0,
        6 => {
            // Square with sine-rounded corners.
            let s = (phase * TAU).sin();
            (s * 2.5).clamp(-1.0, 1.0)
        }
        _ => {
            let steps = 4.0;
            ((phase * steps).floor() / (steps - 1.0)) * 2.0 - 1.0
        }
    }
}

fn build_chip_waves() -> Vec<Vec<f32>> {
    (0..CHIP_WAVE_COUNT)
        .map(|index| {
            let mut wave: Vec<f32> = (0..CHIP_WAVE_LENGTH)
                .map(|i| chip_wave_sample(index, i as f32 / CHIP_WAVE_LENGTH as f32))
                .collect();
            remove_dc(&mut wave);
            wave
        })
        .collect()
}

/// Raw single-cycle chip wave, zero-mean.
pub fn chip_wave(index: usize) -> &'static [f32] {
    static WAVES: OnceLock<Vec<Vec<f32>>> = OnceLock::new();
    let waves = WAVES.get_or_init(build_chip_waves);
    &waves[index.min(CHIP_WAVE_COUNT - 1)]
}

/// Running integral of a chip wave, with one guard sample so a lookup at
/// phase N is valid. Used by the anti-aliased playback path.
pub fn chip_wave_integrated(index: usize) -> &'static [f32] {
    static INTEGRALS: OnceLock<Vec<Vec<f32>>> = OnceLock::new();
    let integrals =
        INTEGRALS.get_or_init(|| (0..CHIP_WAVE_COUNT).map(|i| integrate(chip_wave(i))).collect());
    &integrals[index.min(CHIP_WAVE_COUNT - 1)]
}

/// Subtract the mean so the integral doesn't drift cycle over cycle.
pub fn remove_dc(wave: &mut [f32]) {
    if wave.is_empty() {
        return;
    }
    let mean = wave.iter().sum::<f32>() / wave.len() as f32;
    for sample in wave.iter_mut() {
        *sample -= mean;
    }
}

/// Running integral with a guard sample: output length is `wave.len() + 1`
/// and `out[i]` is the sum of `wave[..i]`.
pub fn integrate(wave: &[f32]) -> Vec<f32> {
    let mut out = Vec::with_capacity(wave.len() + 1);
    let mut sum = 0.0f32;
    out.push(0.0);
    for &sample in wave {
        sum += sample;
        out.push(sum);
    }
    out
}

fn normalize_peak(wave: &mut [f32]) {
    let peak = wave.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()));
    if peak > 1e-9 {
        let scale = 1.0 / peak;
        for sample in wave.iter_mut() {
            *sample *= scale;
        }
    }
}

/// Additive wavetable from harmonic amplitude sliders (0..=1 each).
/// Harmonic k gets amplitude `levels[k-1]^2` at a pure-sine phase, so the
/// result is deterministic and starts at a zero crossing.
pub fn harmonics_wave(levels: &[f32; HARMONICS_COUNT]) -> Vec<f32> {
    let n = HARMONICS_WAVE_LENGTH;
    let mut spectrum = vec![Complex::new(0.0f32, 0.0f32); n];
    for (i, &level) in levels.iter().enumerate() {
        let bin = i + 1;
        let amplitude = level.clamp(0.0, 1.0).powi(2) / (bin as f32).sqrt();
        // Pure sine phase: -i/2 in the positive bin, +i/2 in the mirror.
        spectrum[bin] = Complex::new(0.0, -0.5 * amplitude);
        spectrum[n - bin] = Complex::new(0.0, 0.5 * amplitude);
    }
    let mut planner = FftPlanner::<f32>::new();
    planner.plan_fft_inverse(n).process(&mut spectrum);
    let mut wave: Vec<f32> = spectrum.iter().map(|c| c.re).collect();
    remove_dc(&mut wave);
    normalize_peak(&mut wave);
    wave
}

/// Long noise table shaped by the spectrum sliders. Slider bands are spaced
/// logarithmically; per-bin phases come from the deterministic hash so the
/// same settings always produce the same table.
pub fn spectrum_wave(levels: &[f32; SPECTRUM_COUNT], seed: u32) -> Vec<f32> {
    let n = NOISE_WAVE_LENGTH;
    let mut spectrum = vec![Complex::new(0.0f32, 0.0f32); n];
    let lowest_octave = 4.0f32; // lowest band around 2^4 bins
    let octaves_spanned = 9.0f32;
    for bin in 1..n / 2 {
        let octave = (bin as f32).log2();
        let band = ((octave - lowest_octave) / octaves_spanned * (SPECTRUM_COUNT - 1) as f32)
            .clamp(0.0, (SPECTRUM_COUNT - 1) as f32);
        let low = band.floor() as usize;
        let high = (low + 1).min(SPECTRUM_COUNT - 1);
        let t = band - low as f32;
        let level = levels[low] * (1.0 - t) + levels[high] * t;
        let amplitude = level.clamp(0.0, 1.0).powi(2) / (bin as f32).sqrt();
        if amplitude <= 0.0 {
            continue;
        }
        let phase = hash_unit(seed ^ (bin as u32)) * TAU;
        let value = Complex::new(phase.cos(), phase.sin()) * (amplitude * 0.5);
        spectrum[bin] = value;
        spectrum[n - bin] = value.conj();
    }
    let mut planner = FftPlanner::<f32>::new();
    planner.plan_fft_inverse(n).process(&mut spectrum);
    let mut wave: Vec<f32> = spectrum.iter().map(|c| c.re).collect();
    remove_dc(&mut wave);
    normalize_peak(&mut wave);
    wave
}

/// Deterministic white-noise table shared by all basic noise instruments.
pub fn noise_wave() -> &'static [f32] {
    static NOISE: OnceLock<Vec<f32>> = OnceLock::new();
    NOISE.get_or_init(|| {
        (0..NOISE_WAVE_LENGTH)
            .map(|i| hash_unit(0x6e6f_6973 ^ i as u32) * 2.0 - 1.0)
            .collect()
    })
}

/// Shared sine table for the FM kernel (length is a power of two).
pub fn sine_table() -> &'static [f32] {
    static SINE: OnceLock<Vec<f32>> = OnceLock::new();
    SINE.get_or_init(|| {
        (0..SINE_TABLE_LENGTH)
            .map(|i| (i as f32 / SINE_TABLE_LENGTH as f32 * TAU).sin())
            .collect()
    })
}
