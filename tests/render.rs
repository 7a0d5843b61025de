use chipsynth::song::instrument::FmOperator;
use chipsynth::song::{Channel, EffectFlags, Instrument, Note, Pattern};
use chipsynth::{Song, Synth};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

const SAMPLE_RATE: f64 = 48_000.0;

fn render_seconds(synth: &mut Synth, seconds: f64) -> (Vec<f32>, Vec<f32>) {
    let samples = (SAMPLE_RATE * seconds) as usize;
    let mut left = vec![0.0f32; samples];
    let mut right = vec![0.0f32; samples];
    synth.render(&mut left, &mut right);
    (left, right)
}

fn single_note_song(instrument: Instrument, note: Note) -> Song {
    let mut song = Song::new(120.0, 4, 1);
    song.channels = vec![Channel {
        instruments: vec![instrument],
        patterns: vec![Pattern::new(0, vec![note])],
        bars: vec![Some(0)],
    }];
    song
}

#[test]
fn demo_song_renders_audibly_and_bounded() {
    let mut synth = Synth::new(Song::demo(), SAMPLE_RATE);
    synth.play();
    let (left, right) = render_seconds(&mut synth, 4.0);
    let rms: f32 = (left.iter().map(|s| s * s).sum::<f32>() / left.len() as f32).sqrt();
    assert!(rms > 0.01, "demo song should be audible, rms {rms}");
    for &sample in left.iter().chain(right.iter()) {
        assert!(sample.is_finite());
        assert!(sample.abs() <= 1.0);
    }
}

#[test]
fn chunked_rendering_is_bit_identical() {
    // Buffer boundaries fall mid-tick; splitting a tick across render calls
    // must not change a single sample.
    let mut whole = Synth::new(Song::demo(), SAMPLE_RATE);
    whole.play();
    let (expected, _) = render_seconds(&mut whole, 2.0);

    let mut chunked = Synth::new(Song::demo(), SAMPLE_RATE);
    chunked.play();
    let mut actual = Vec::with_capacity(expected.len());
    let mut right = vec![0.0f32; 611];
    let mut left = vec![0.0f32; 611];
    while actual.len() < expected.len() {
        let run = (expected.len() - actual.len()).min(left.len());
        chunked.render(&mut left[..run], &mut right[..run]);
        actual.extend_from_slice(&left[..run]);
    }
    assert_eq!(actual, expected);
}

#[test]
fn repeated_renders_are_deterministic() {
    let run = |seconds: f64| {
        let mut synth = Synth::new(Song::demo(), SAMPLE_RATE);
        synth.play();
        render_seconds(&mut synth, seconds)
    };
    let (left_a, right_a) = run(3.0);
    let (left_b, right_b) = run(3.0);
    assert_eq!(left_a, left_b);
    assert_eq!(right_a, right_b);
}

#[test]
fn sine_chip_note_peaks_at_its_fundamental() {
    // Chip wave 3 is a pure sine; an A at key 69 must peak at 440 Hz.
    // Four seconds of render give 0.25 Hz bins, fine enough to pin the
    // fundamental to a tenth of a percent.
    let song = single_note_song(Instrument::chip(3), Note::simple(69, 0, 96));
    let mut synth = Synth::new(song, SAMPLE_RATE);
    synth.play();
    let (left, _) = render_seconds(&mut synth, 4.0);

    // Unit sine through the centered equal-power pan leaves each channel
    // at half amplitude, so the channel RMS sits at 0.5.
    let rms: f32 = (left.iter().map(|s| s * s).sum::<f32>() / left.len() as f32).sqrt();
    assert!((rms - 0.5).abs() < 0.05, "unexpected sine level, rms {rms}");

    let n = left.len();
    let mut buffer: Vec<Complex<f32>> = left.iter().map(|&s| Complex::new(s, 0.0)).collect();
    FftPlanner::new().plan_fft_forward(n).process(&mut buffer);
    let peak_bin = (1..n / 2)
        .max_by(|&a, &b| {
            buffer[a]
                .norm_sqr()
                .partial_cmp(&buffer[b].norm_sqr())
                .unwrap()
        })
        .unwrap();
    let peak_hz = peak_bin as f64 * SAMPLE_RATE / n as f64;
    assert!(
        (peak_hz - 440.0).abs() < 440.0 * 0.001,
        "expected 440 Hz fundamental, got {peak_hz}"
    );
}

#[test]
fn integrated_playback_suppresses_folded_harmonics() {
    // A sawtooth at key 110 (~4.7 kHz) pushes harmonics past Nyquist.
    // Played from the raw table those harmonics fold back to predictable
    // frequencies; the integrated path attenuates them. Measure the energy
    // in the fold-down bands of harmonics 6..=9, which land about 1 kHz
    // clear of every real harmonic.
    let render = |aliases: bool| {
        let mut instrument = Instrument::chip(2);
        instrument.aliases = aliases;
        let song = single_note_song(instrument, Note::simple(110, 0, 96));
        let mut synth = Synth::new(song, SAMPLE_RATE);
        synth.play();
        render_seconds(&mut synth, 1.6).0
    };

    const N: usize = 65_536;
    let spectrum = |samples: &[f32]| -> Vec<f32> {
        // Skip the attack, then Hann-window so harmonic leakage stays out
        // of the alias bands.
        let mut buffer: Vec<Complex<f32>> = samples[4_800..4_800 + N]
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let w = 0.5 - 0.5 * (std::f32::consts::TAU * i as f32 / N as f32).cos();
                Complex::new(s * w, 0.0)
            })
            .collect();
        FftPlanner::new().plan_fft_forward(N).process(&mut buffer);
        buffer[..N / 2].iter().map(|c| c.norm_sqr()).collect()
    };
    let band_energy = |spec: &[f32], center_hz: f64| -> f32 {
        let bin_hz = SAMPLE_RATE / N as f64;
        let lo = ((center_hz - 150.0) / bin_hz) as usize;
        let hi = ((center_hz + 150.0) / bin_hz) as usize;
        spec[lo..=hi].iter().sum()
    };

    let f0 = 440.0 * ((110.0 - 69.0) / 12.0f64).exp2();
    let clean = spectrum(&render(false));
    let rough = spectrum(&render(true));
    let alias_energy = |spec: &[f32]| -> f32 {
        (6..=9)
            .map(|k| band_energy(spec, SAMPLE_RATE - k as f64 * f0))
            .sum()
    };
    // Normalize by each render's own fundamental so a level difference
    // between the paths cannot skew the comparison.
    let clean_ratio = alias_energy(&clean) / band_energy(&clean, f0);
    let rough_ratio = alias_energy(&rough) / band_energy(&rough, f0);
    assert!(
        rough_ratio > 3.0 * clean_ratio,
        "aliased path should fold in far more energy: {rough_ratio} vs {clean_ratio}"
    );
}

#[test]
fn song_end_without_loop_falls_silent() {
    // The demo song is 4 bars (8 s); the longest tail is the lead's echo.
    let mut synth = Synth::new(Song::demo(), SAMPLE_RATE);
    synth.set_loop_enabled(false);
    synth.play();
    render_seconds(&mut synth, 12.0);
    assert!(!synth.is_playing());
    let (left, right) = render_seconds(&mut synth, 0.5);
    for &sample in left.iter().chain(right.iter()) {
        assert!(sample.abs() < 1e-4, "tail should have died out: {sample}");
    }
}

#[test]
fn extreme_song_stays_finite_and_bounded() {
    // Worst-case settings across two channels: max-feedback FM at the top
    // of the pitch range, a fully spread supersaw at the bottom, and every
    // heavy effect at its limit. The mix must stay finite and inside the
    // limiter's bound for the full render.
    let mut lead = Instrument::fm(
        0,
        [
            FmOperator::new(14, 15),
            FmOperator::new(14, 15),
            FmOperator::new(14, 15),
            FmOperator::new(14, 15),
        ],
    );
    lead.fm_feedback = 15;
    lead.effects = EffectFlags::DISTORTION
        | EffectFlags::BITCRUSHER
        | EffectFlags::PHASER
        | EffectFlags::ECHO
        | EffectFlags::REVERB;
    lead.distortion = 1.0;
    lead.phaser_feedback = 0.95;
    lead.echo_sustain = 0.9;
    lead.reverb = 1.0;

    let mut bass = Instrument::supersaw();
    bass.supersaw_spread = 1.0;
    bass.supersaw_dynamism = 1.0;
    bass.effects = EffectFlags::DISTORTION | EffectFlags::CHORUS | EffectFlags::REVERB;
    bass.distortion = 1.0;
    bass.chorus = 1.0;
    bass.reverb = 1.0;

    let mut song = Song::new(120.0, 4, 1);
    song.channels = vec![
        Channel {
            instruments: vec![lead],
            patterns: vec![Pattern::new(0, vec![Note::simple(115, 0, 96)])],
            bars: vec![Some(0)],
        },
        Channel {
            instruments: vec![bass],
            patterns: vec![Pattern::new(0, vec![Note::simple(12, 0, 96)])],
            bars: vec![Some(0)],
        },
    ];
    let mut synth = Synth::new(song, SAMPLE_RATE);
    synth.play();
    let (left, right) = render_seconds(&mut synth, 3.0);
    for &sample in left.iter().chain(right.iter()) {
        assert!(sample.is_finite());
        assert!(sample.abs() <= 1.0, "limiter bound violated: {sample}");
    }
}

#[test]
fn looping_keeps_the_song_audible_indefinitely() {
    let mut synth = Synth::new(Song::demo(), SAMPLE_RATE);
    synth.play();
    // Past two full loops of the 4-bar song.
    render_seconds(&mut synth, 17.0);
    assert!(synth.is_playing());
    let (left, _) = render_seconds(&mut synth, 1.0);
    let rms: f32 = (left.iter().map(|s| s * s).sum::<f32>() / left.len() as f32).sqrt();
    assert!(rms > 0.005, "looped song went quiet, rms {rms}");
}
