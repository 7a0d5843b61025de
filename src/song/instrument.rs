use std::ops::BitOr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of harmonic amplitude sliders for additive instruments.
pub const HARMONICS_COUNT: usize = 28;
/// Number of spectrum amplitude sliders for spectrum noise instruments.
pub const SPECTRUM_COUNT: usize = 30;
/// Hard cap on biquad sections in one filter chain.
pub const FILTER_MAX_POINTS: usize = 8;
/// FM operator count.
pub const OPERATOR_COUNT: usize = 4;

/// Which oscillator kernel renders this instrument.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OscillatorType {
    /// Wavetable playback of a built-in chip wave.
    Chip,
    /// Variable-width pulse with PolyBLEP edges.
    PulseWidth,
    /// Seven detuned saws.
    Supersaw,
    /// Four-operator phase modulation.
    Fm,
    /// Additive wavetable built from harmonic amplitudes.
    Harmonics,
    /// Karplus-Strong plucked string.
    PickedString,
    /// White-noise wavetable with pitch-dependent damping.
    Noise,
    /// Noise wavetable shaped by a frequency-spectrum envelope.
    Spectrum,
}

/// Policy for consecutive notes on the same instrument.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Retrigger: the old tone releases, a fresh tone attacks.
    Normal,
    /// Retrigger and cut the old tone's release short.
    Interrupt,
    /// Seamless: the tone persists, pitch steps instantly.
    Continue,
    /// Seamless with a pitch glide across the boundary.
    Slide,
}

impl Transition {
    pub fn is_seamless(self) -> bool {
        matches!(self, Transition::Continue | Transition::Slide)
    }

    pub fn slides(self) -> bool {
        self == Transition::Slide
    }
}

/// Policy for multiple simultaneous pitches on one note.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChordKind {
    /// All pitches sound at once, one tone per pitch.
    Simultaneous,
    /// One tone cycles through the pitches tick by tick.
    Arpeggio,
    /// One tone per pitch, starts staggered by a few ticks.
    Strum,
}

/// Duplicate detuned voices summed to thicken a pitch.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unison {
    /// 1 or 2 oscillator copies.
    pub voices: u32,
    /// Detune of the second voice in semitones (+/- half each side).
    pub spread: f32,
    /// Amplitude of each copy.
    pub expression: f32,
    /// Sign of the second copy (-1.0 inverts it).
    pub sign: f32,
}

impl Unison {
    pub const NONE: Unison = Unison {
        voices: 1,
        spread: 0.0,
        expression: 1.0,
        sign: 1.0,
    };

    pub fn shimmer() -> Self {
        Unison {
            voices: 2,
            spread: 0.02,
            expression: 0.8,
            sign: 1.0,
        }
    }

    pub fn honky_tonk() -> Self {
        Unison {
            voices: 2,
            spread: 0.09,
            expression: 0.8,
            sign: 1.0,
        }
    }

    pub fn voice_count(&self) -> usize {
        self.voices.clamp(1, 2) as usize
    }
}

/// Per-instrument effect enable bitmask. Only enabled effects execute.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectFlags(pub u32);

impl EffectFlags {
    pub const NONE: EffectFlags = EffectFlags(0);
    pub const DISTORTION: EffectFlags = EffectFlags(1 << 0);
    pub const BITCRUSHER: EffectFlags = EffectFlags(1 << 1);
    pub const RING_MOD: EffectFlags = EffectFlags(1 << 2);
    pub const PHASER: EffectFlags = EffectFlags(1 << 3);
    pub const NOTE_FILTER: EffectFlags = EffectFlags(1 << 4);
    pub const PANNING: EffectFlags = EffectFlags(1 << 5);
    pub const CHORUS: EffectFlags = EffectFlags(1 << 6);
    pub const ECHO: EffectFlags = EffectFlags(1 << 7);
    pub const REVERB: EffectFlags = EffectFlags(1 << 8);

    pub fn contains(self, other: EffectFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for EffectFlags {
    type Output = EffectFlags;
    fn bitor(self, rhs: EffectFlags) -> EffectFlags {
        EffectFlags(self.0 | rhs.0)
    }
}

/// Biquad section variants. The legacy variants exist only so imported
/// compositions keep their original (less selective) response.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    LowPass,
    HighPass,
    Peak,
    LegacyLowPass1,
    LegacyLowPass2,
    LegacyHighPass1,
}

/// One section of a filter chain, in integer "slider" units.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterControlPoint {
    pub kind: FilterKind,
    /// 0..=FILTER_FREQ_RANGE, geometric map to Hz.
    pub freq: u32,
    /// 0..=FILTER_GAIN_RANGE, geometric map to linear gain, center is flat.
    pub gain: u32,
}

impl FilterControlPoint {
    pub fn new(kind: FilterKind, freq: u32, gain: u32) -> Self {
        Self { kind, freq, gain }
    }
}

/// A cascade of up to `FILTER_MAX_POINTS` sections applied in series.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSettings {
    pub points: Vec<FilterControlPoint>,
}

impl FilterSettings {
    pub fn none() -> Self {
        Self { points: Vec::new() }
    }

    pub fn low_pass(freq: u32, gain: u32) -> Self {
        Self {
            points: vec![FilterControlPoint::new(FilterKind::LowPass, freq, gain)],
        }
    }

    /// Sections beyond the cap are ignored rather than rejected.
    pub fn active_points(&self) -> &[FilterControlPoint] {
        &self.points[..self.points.len().min(FILTER_MAX_POINTS)]
    }
}

/// LFO waveform for tremolo/vibrato-style envelopes and ring modulation.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfoWaveform {
    Sine,
    Triangle,
    Saw,
    Square,
}

/// What a pseudo-random envelope is keyed by.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomKey {
    /// Quantized elapsed time.
    Time,
    /// The tone's current pitch.
    Pitch,
    /// The note's identity (start part), one value per note.
    Note,
}

/// The shape an envelope evaluates. All time-based shapes receive elapsed
/// time both raw and scaled by the envelope's speed.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeShape {
    None,
    /// Follows the note's pin size.
    NoteSize,
    /// Short attack transient.
    Punch,
    /// Decaying exponential.
    Twang,
    /// Rising toward 1.
    Swell,
    /// Periodic modulation with a selectable waveform.
    Lfo(LfoWaveform),
    /// Stepped deterministic noise.
    RandomStep(RandomKey),
    /// Smoothly interpolated deterministic noise.
    RandomSmooth(RandomKey),
    /// Maps the tone's pitch position into the output range.
    PitchPosition { low_pitch: i32, high_pitch: i32 },
    /// Multi-segment linear ramp: (beats, level) breakpoints.
    Ramp(Vec<(f32, f32)>),
}

/// What an envelope modulates.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeTarget {
    NoteVolume,
    /// Scales every note-filter cutoff together.
    NoteFilterFreqs,
    PulseWidth,
    SupersawDynamism,
    /// Pitch offset in semitones, scaled by the evaluated envelope.
    PitchShift,
}

/// One entry of an instrument's ordered envelope list.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeSetting {
    pub target: EnvelopeTarget,
    pub shape: EnvelopeShape,
    /// Multiplies elapsed beats before shape evaluation.
    pub speed: f32,
    pub lower_bound: f32,
    pub upper_bound: f32,
    pub inverted: bool,
    /// Seed for the random shapes.
    pub seed: u32,
    /// Discrete envelopes hold the tick-start value for the whole tick
    /// instead of interpolating toward the tick-end value.
    pub discrete: bool,
}

impl EnvelopeSetting {
    pub fn new(target: EnvelopeTarget, shape: EnvelopeShape) -> Self {
        Self {
            target,
            shape,
            speed: 1.0,
            lower_bound: 0.0,
            upper_bound: 1.0,
            inverted: false,
            seed: 1,
            discrete: false,
        }
    }

    /// Out-of-range or inverted bounds reset to the full-range default.
    pub fn bounds(&self) -> (f32, f32) {
        let (lo, hi) = (self.lower_bound, self.upper_bound);
        if !lo.is_finite() || !hi.is_finite() || lo < 0.0 || hi > 2.0 || lo >= hi {
            (0.0, 1.0)
        } else {
            (lo, hi)
        }
    }
}

/// One FM operator: a frequency ratio index and an amplitude slider.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FmOperator {
    /// Index into `kernels::fm::FREQUENCY_RATIOS`.
    pub frequency: usize,
    /// 0..=15.
    pub amplitude: u32,
}

impl FmOperator {
    pub fn new(frequency: usize, amplitude: u32) -> Self {
        Self {
            frequency,
            amplitude: amplitude.min(15),
        }
    }
}

/// Full instrument configuration. Constructed via the per-type helpers so
/// every field has a sensible value regardless of the oscillator in use.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub oscillator: OscillatorType,
    pub volume: f32,
    /// Seconds of expression fade-in at note attack.
    pub fade_in: f32,
    /// Seconds of release tail after note end (capped by the engine).
    pub fade_out: f32,
    pub transition: Transition,
    pub chord: ChordKind,
    /// Ticks between arpeggio steps.
    pub arpeggio_speed: u32,
    /// Ticks between strummed chord entries.
    pub strum_speed: u32,
    pub unison: Unison,

    // Oscillator-family parameters.
    /// Index into the built-in chip wave set.
    pub chip_wave: usize,
    /// Raw table lookup instead of the anti-aliased integrated table.
    pub aliases: bool,
    /// 0..=0.5 duty cycle for PulseWidth.
    pub pulse_width: f32,
    pub supersaw_dynamism: f32,
    pub supersaw_spread: f32,
    /// 0 = saw, toward 1 = pulse-like.
    pub supersaw_shape: f32,
    pub fm_algorithm: usize,
    pub fm_operators: [FmOperator; OPERATOR_COUNT],
    /// Operator-1 self feedback, 0..=15.
    pub fm_feedback: u32,
    pub harmonics: [f32; HARMONICS_COUNT],
    pub spectrum: [f32; SPECTRUM_COUNT],
    /// 0..=1; damping of the picked string's feedback loop.
    pub string_sustain: f32,

    // Effects.
    pub effects: EffectFlags,
    pub note_filter: FilterSettings,
    pub eq_filter: FilterSettings,
    /// 0..=1.
    pub distortion: f32,
    /// 1..=8 bits kept after quantization.
    pub bit_crush: u32,
    /// 0..=1 frequency reduction amount.
    pub freq_crush: f32,
    /// Ring modulator frequency in Hz.
    pub ring_mod_hz: f32,
    pub ring_mod_wave: LfoWaveform,
    /// 0..=1 wet amount.
    pub ring_mod: f32,
    /// Even stage count, 2..=8.
    pub phaser_stages: u32,
    pub phaser_rate: f32,
    pub phaser_center_hz: f32,
    pub phaser_depth: f32,
    pub phaser_feedback: f32,
    /// -1 (left) ..= 1 (right).
    pub pan: f32,
    /// 0..=1: how much micro-delay accompanies level panning.
    pub pan_delay: f32,
    /// 0..=1 chorus amount.
    pub chorus: f32,
    /// 0..=1 echo feedback.
    pub echo_sustain: f32,
    /// Echo delay in beats (tempo-synced).
    pub echo_delay_beats: f32,
    /// 0..=1 reverb send.
    pub reverb: f32,

    pub envelopes: Vec<EnvelopeSetting>,
}

impl Instrument {
    fn base(oscillator: OscillatorType) -> Self {
        Self {
            oscillator,
            volume: 1.0,
            fade_in: 0.0,
            fade_out: 0.1,
            transition: Transition::Normal,
            chord: ChordKind::Simultaneous,
            arpeggio_speed: 12,
            strum_speed: 2,
            unison: Unison::NONE,
            chip_wave: 0,
            aliases: false,
            pulse_width: 0.25,
            supersaw_dynamism: 0.75,
            supersaw_spread: 0.25,
            supersaw_shape: 0.0,
            fm_algorithm: 0,
            fm_operators: [
                FmOperator::new(0, 15),
                FmOperator::new(0, 8),
                FmOperator::new(0, 0),
                FmOperator::new(0, 0),
            ],
            fm_feedback: 0,
            harmonics: [0.0; HARMONICS_COUNT],
            spectrum: [0.0; SPECTRUM_COUNT],
            string_sustain: 0.7,
            effects: EffectFlags::NONE,
            note_filter: FilterSettings::none(),
            eq_filter: FilterSettings::none(),
            distortion: 0.5,
            bit_crush: 4,
            freq_crush: 0.5,
            ring_mod_hz: 220.0,
            ring_mod_wave: LfoWaveform::Sine,
            ring_mod: 1.0,
            phaser_stages: 4,
            phaser_rate: 0.6,
            phaser_center_hz: 700.0,
            phaser_depth: 0.8,
            phaser_feedback: 0.5,
            pan: 0.0,
            pan_delay: 0.5,
            chorus: 0.5,
            echo_sustain: 0.5,
            echo_delay_beats: 0.5,
            reverb: 0.3,
            envelopes: Vec::new(),
        }
    }

    pub fn chip(wave: usize) -> Self {
        let mut inst = Self::base(OscillatorType::Chip);
        inst.chip_wave = wave;
        inst
    }

    pub fn pulse_width(width: f32) -> Self {
        let mut inst = Self::base(OscillatorType::PulseWidth);
        inst.pulse_width = width.clamp(0.01, 0.5);
        inst
    }

    pub fn supersaw() -> Self {
        Self::base(OscillatorType::Supersaw)
    }

    pub fn fm(algorithm: usize, operators: [FmOperator; OPERATOR_COUNT]) -> Self {
        let mut inst = Self::base(OscillatorType::Fm);
        inst.fm_algorithm = algorithm;
        inst.fm_operators = operators;
        inst
    }

    pub fn harmonics(levels: [f32; HARMONICS_COUNT]) -> Self {
        let mut inst = Self::base(OscillatorType::Harmonics);
        inst.harmonics = levels;
        inst
    }

    pub fn picked_string() -> Self {
        let mut inst = Self::base(OscillatorType::PickedString);
        inst.fade_out = 0.3;
        inst
    }

    pub fn noise() -> Self {
        Self::base(OscillatorType::Noise)
    }

    pub fn spectrum(levels: [f32; SPECTRUM_COUNT]) -> Self {
        let mut inst = Self::base(OscillatorType::Spectrum);
        inst.spectrum = levels;
        inst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_flags_compose() {
        let flags = EffectFlags::ECHO | EffectFlags::REVERB;
        assert!(flags.contains(EffectFlags::ECHO));
        assert!(flags.contains(EffectFlags::REVERB));
        assert!(!flags.contains(EffectFlags::CHORUS));
    }

    #[test]
    fn envelope_bounds_reset_when_invalid() {
        let mut env = EnvelopeSetting::new(EnvelopeTarget::NoteVolume, EnvelopeShape::Twang);
        env.lower_bound = 0.8;
        env.upper_bound = 0.2; // inverted
        assert_eq!(env.bounds(), (0.0, 1.0));

        env.lower_bound = 0.2;
        env.upper_bound = 0.8;
        assert_eq!(env.bounds(), (0.2, 0.8));
    }

    #[test]
    fn filter_chain_length_is_capped() {
        let settings = FilterSettings {
            points: vec![FilterControlPoint::new(FilterKind::Peak, 10, 7); 12],
        };
        assert_eq!(settings.active_points().len(), FILTER_MAX_POINTS);
    }

    #[test]
    fn operator_amplitude_clamps() {
        assert_eq!(FmOperator::new(0, 99).amplitude, 15);
    }
}
