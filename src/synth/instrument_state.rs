//! Per-instrument runtime state: the tone queues, the effect units and
//! their parameter ramps, resolved wavetables, and the wake/sleep
//! bookkeeping that lets an idle instrument cost nothing.

use crate::dsp::filter::{self, DynamicBiquad};
use crate::dsp::wavetable;
use crate::effects::bitcrusher::Bitcrusher;
use crate::effects::chorus::Chorus;
use crate::effects::distortion::Distortion;
use crate::effects::echo::Echo;
use crate::effects::panning::Panning;
use crate::effects::phaser::Phaser;
use crate::effects::reverb::Reverb;
use crate::effects::ringmod::RingMod;
use crate::effects::{self, EffectStage};
use crate::kernels::{self, RenderArgs};
use crate::song::instrument::{EffectFlags, FilterKind, Instrument, OscillatorType};
use crate::synth::tone::Tone;
use crate::TICKS_PER_BEAT;

/// A scalar that moves linearly across one tick. `advance` shifts the old
/// end to the new start, so modulation changes glide instead of stepping.
#[derive(Debug, Clone, Copy)]
pub struct ParamRamp {
    pub start: f64,
    pub end: f64,
}

impl ParamRamp {
    pub fn held(value: f64) -> Self {
        Self {
            start: value,
            end: value,
        }
    }

    pub fn advance(&mut self, target: f64) {
        self.start = self.end;
        self.end = target;
    }

    #[inline]
    pub fn at(&self, fraction: f64) -> f64 {
        self.start + (self.end - self.start) * fraction
    }

    /// Start/end values for a sub-range of the tick.
    #[inline]
    pub fn segment(&self, f0: f64, f1: f64) -> (f64, f64) {
        (self.at(f0), self.at(f1))
    }
}

/// Tick-interpolated targets for every modulatable effect parameter.
#[derive(Debug, Clone, Copy)]
pub struct EffectParams {
    pub mix_volume: ParamRamp,
    pub fade_gain: ParamRamp,
    pub distortion: ParamRamp,
    pub freq_crush: ParamRamp,
    pub ring_mod_wet: ParamRamp,
    pub ring_mod_hz: ParamRamp,
    pub phaser_depth: ParamRamp,
    pub pan: ParamRamp,
    pub chorus: ParamRamp,
    pub echo_sustain: ParamRamp,
    pub reverb: ParamRamp,
}

/// Wavetables resolved for the instrument's oscillator family.
#[derive(Debug, Clone)]
enum WaveTables {
    NotBuilt,
    /// Kernels that don't read tables (pulse, supersaw, FM, string).
    NotApplicable,
    /// Built-in chip wave, shared statics.
    Chip(usize),
    /// Shared white-noise table.
    Noise,
    /// Synthesized from harmonics sliders (raw plus integral).
    Periodic { raw: Vec<f32>, integrated: Vec<f32> },
    /// Synthesized from spectrum sliders (noise-like, raw only).
    Shaped { raw: Vec<f32> },
}

impl WaveTables {
    fn slices(&self) -> (&[f32], &[f32]) {
        match self {
            WaveTables::NotBuilt | WaveTables::NotApplicable => (&[], &[]),
            WaveTables::Chip(index) => (
                wavetable::chip_wave(*index),
                wavetable::chip_wave_integrated(*index),
            ),
            WaveTables::Noise => (wavetable::noise_wave(), &[]),
            WaveTables::Periodic { raw, integrated } => (raw, integrated),
            WaveTables::Shaped { raw } => (raw, &[]),
        }
    }
}

/// Runtime state for one instrument of one channel.
pub struct InstrumentState {
    pub active_tones: Vec<Box<Tone>>,
    pub released_tones: Vec<Box<Tone>>,

    pub awake: bool,
    /// `Some(n)`: no tones remain; keep rendering `n` more ticks of effect
    /// tail, then flush and sleep.
    pub sleep_countdown: Option<u32>,

    // Modulation overrides, applied at tick boundaries.
    pub volume_override: Option<f64>,
    pub pan_override: Option<f64>,
    pub reverb_override: Option<f64>,
    pub distortion_override: Option<f64>,
    pub echo_sustain_override: Option<f64>,

    pub params: EffectParams,

    distortion: Distortion,
    bitcrusher: Bitcrusher,
    ring_mod: RingMod,
    phaser: Phaser,
    // The heavier units hold delay memory, so they exist only while awake.
    panning: Option<Panning>,
    chorus: Option<Chorus>,
    echo: Option<Echo>,
    reverb: Option<Reverb>,

    eq_filters: [DynamicBiquad; crate::song::instrument::FILTER_MAX_POINTS],
    eq_count: usize,
    eq_input: [f64; 2],

    plan: Vec<EffectStage>,
    configured_effects: Option<EffectFlags>,
    tables: WaveTables,
}

impl InstrumentState {
    pub fn new() -> Self {
        Self {
            active_tones: Vec::new(),
            released_tones: Vec::new(),
            awake: false,
            sleep_countdown: None,
            volume_override: None,
            pan_override: None,
            reverb_override: None,
            distortion_override: None,
            echo_sustain_override: None,
            params: EffectParams {
                mix_volume: ParamRamp::held(1.0),
                fade_gain: ParamRamp::held(1.0),
                distortion: ParamRamp::held(0.0),
                freq_crush: ParamRamp::held(0.0),
                ring_mod_wet: ParamRamp::held(0.0),
                ring_mod_hz: ParamRamp::held(220.0),
                phaser_depth: ParamRamp::held(0.0),
                pan: ParamRamp::held(0.0),
                chorus: ParamRamp::held(0.0),
                echo_sustain: ParamRamp::held(0.0),
                reverb: ParamRamp::held(0.0),
            },
            distortion: Distortion::default(),
            bitcrusher: Bitcrusher::default(),
            ring_mod: RingMod::default(),
            phaser: Phaser::default(),
            panning: None,
            chorus: None,
            echo: None,
            reverb: None,
            eq_filters: Default::default(),
            eq_count: 0,
            eq_input: [0.0; 2],
            plan: Vec::with_capacity(9),
            configured_effects: None,
            tables: WaveTables::NotBuilt,
        }
    }

    pub fn has_tones(&self) -> bool {
        !self.active_tones.is_empty() || !self.released_tones.is_empty()
    }

    /// Bring the instrument online: allocate effect memory, resolve
    /// wavetables, build the stage plan, and load the EQ chain. Idempotent
    /// while the configuration is unchanged.
    pub fn wake(&mut self, instrument: &Instrument, sample_rate: f64) {
        self.sleep_countdown = None;
        if self.awake && self.configured_effects == Some(instrument.effects) {
            return;
        }
        self.awake = true;

        if matches!(self.tables, WaveTables::NotBuilt) {
            self.tables = match instrument.oscillator {
                OscillatorType::Chip => WaveTables::Chip(instrument.chip_wave),
                OscillatorType::Noise => WaveTables::Noise,
                OscillatorType::Harmonics => {
                    let raw = wavetable::harmonics_wave(&instrument.harmonics);
                    let integrated = wavetable::integrate(&raw);
                    WaveTables::Periodic { raw, integrated }
                }
                OscillatorType::Spectrum => WaveTables::Shaped {
                    raw: wavetable::spectrum_wave(&instrument.spectrum, 1),
                },
                _ => WaveTables::NotApplicable,
            };
        }

        effects::build_plan(instrument, &mut self.plan);
        self.configured_effects = Some(instrument.effects);

        if self.panning.is_none() {
            self.panning = Some(Panning::new(sample_rate));
        }
        if instrument.effects.contains(EffectFlags::CHORUS) && self.chorus.is_none() {
            self.chorus = Some(Chorus::new(sample_rate));
        }
        if instrument.effects.contains(EffectFlags::ECHO) && self.echo.is_none() {
            self.echo = Some(Echo::new());
        }
        if instrument.effects.contains(EffectFlags::REVERB) && self.reverb.is_none() {
            self.reverb = Some(Reverb::new());
        }

        let points = instrument.eq_filter.active_points();
        self.eq_count = points.len();
        for (slot, point) in self.eq_filters.iter_mut().zip(points) {
            slot.load(&filter::control_point_coefficients(
                point,
                sample_rate,
                1.0,
                1.0,
            ));
            slot.reset_history();
        }
        self.eq_input = [0.0; 2];

        // Params snap to the instrument's settings on wake so the first
        // tick doesn't sweep in from stale values.
        let t = self.targets(instrument);
        self.params = EffectParams {
            mix_volume: t.mix_volume,
            fade_gain: ParamRamp::held(1.0),
            distortion: t.distortion,
            freq_crush: t.freq_crush,
            ring_mod_wet: t.ring_mod_wet,
            ring_mod_hz: t.ring_mod_hz,
            phaser_depth: t.phaser_depth,
            pan: t.pan,
            chorus: t.chorus,
            echo_sustain: t.echo_sustain,
            reverb: t.reverb,
        };
    }

    fn targets(&self, instrument: &Instrument) -> EffectParams {
        EffectParams {
            mix_volume: ParamRamp::held(
                self.volume_override.unwrap_or(instrument.volume as f64),
            ),
            fade_gain: ParamRamp::held(1.0),
            distortion: ParamRamp::held(
                self.distortion_override.unwrap_or(instrument.distortion as f64),
            ),
            freq_crush: ParamRamp::held(instrument.freq_crush as f64),
            ring_mod_wet: ParamRamp::held(instrument.ring_mod as f64),
            ring_mod_hz: ParamRamp::held(instrument.ring_mod_hz as f64),
            phaser_depth: ParamRamp::held(instrument.phaser_depth as f64),
            // With the panning bit clear the stage still runs (it is the
            // mono to stereo point) but stays centered.
            pan: ParamRamp::held(if instrument.effects.contains(EffectFlags::PANNING) {
                self.pan_override.unwrap_or(instrument.pan as f64)
            } else {
                0.0
            }),
            chorus: ParamRamp::held(instrument.chorus as f64),
            echo_sustain: ParamRamp::held(
                self.echo_sustain_override.unwrap_or(instrument.echo_sustain as f64),
            ),
            reverb: ParamRamp::held(self.reverb_override.unwrap_or(instrument.reverb as f64)),
        }
    }

    /// Slide every parameter ramp toward its current target. Called once
    /// per tick. On the final tail tick the fade gain ramps to zero so the
    /// flush that follows is inaudible.
    pub fn advance_params(&mut self, instrument: &Instrument) {
        let t = self.targets(instrument);
        self.params.mix_volume.advance(t.mix_volume.end);
        let fading_out = self.sleep_countdown == Some(1);
        self.params
            .fade_gain
            .advance(if fading_out { 0.0 } else { 1.0 });
        self.params.distortion.advance(t.distortion.end);
        self.params.freq_crush.advance(t.freq_crush.end);
        self.params.ring_mod_wet.advance(t.ring_mod_wet.end);
        self.params.ring_mod_hz.advance(t.ring_mod_hz.end);
        self.params.phaser_depth.advance(t.phaser_depth.end);
        self.params.pan.advance(t.pan.end);
        self.params.chorus.advance(t.chorus.end);
        self.params.echo_sustain.advance(t.echo_sustain.end);
        self.params.reverb.advance(t.reverb.end);
    }

    /// How many ticks of effect tail are worth rendering after the last
    /// tone dies, from the decaying feedback paths still holding audio.
    pub fn tail_ticks(&self, instrument: &Instrument, tempo: f64) -> u32 {
        let ticks_per_second = tempo / 60.0 * TICKS_PER_BEAT as f64;
        let mut tail_seconds: f64 = 0.05;
        if instrument.effects.contains(EffectFlags::ECHO) {
            // Repeats until the feedback has decayed below audibility.
            let sustain = (instrument.echo_sustain as f64).clamp(0.0, 0.9);
            let delay_seconds = instrument.echo_delay_beats as f64 * 60.0 / tempo;
            if sustain > 0.0 {
                let repeats = (1e-3f64.ln() / sustain.ln()).ceil();
                tail_seconds = tail_seconds.max(delay_seconds * repeats);
            }
        }
        if instrument.effects.contains(EffectFlags::REVERB) {
            tail_seconds = tail_seconds.max(1.5 * instrument.reverb as f64 + 0.2);
        }
        if instrument.effects.contains(EffectFlags::CHORUS) {
            tail_seconds = tail_seconds.max(0.05);
        }
        (tail_seconds * ticks_per_second).ceil() as u32 + 1
    }

    /// Drop all delay memory and filter history. Called when the instrument
    /// goes to sleep so the next wake starts from silence.
    pub fn flush(&mut self) {
        self.distortion.reset();
        self.bitcrusher.reset();
        self.ring_mod.reset();
        self.phaser.reset();
        if let Some(panning) = &mut self.panning {
            panning.reset();
        }
        if let Some(chorus) = &mut self.chorus {
            chorus.reset();
        }
        if let Some(echo) = &mut self.echo {
            echo.reset();
        }
        if let Some(reverb) = &mut self.reverb {
            reverb.reset();
        }
        for eq in &mut self.eq_filters[..self.eq_count] {
            eq.reset_history();
        }
        self.eq_input = [0.0; 2];
        self.params.fade_gain = ParamRamp::held(1.0);
        self.awake = false;
        self.sleep_countdown = None;
    }

    /// True once every delay line actually emptied (used by tests and the
    /// tail logic to confirm a flushed instrument is really silent).
    pub fn delay_lines_silent(&self) -> bool {
        self.chorus.as_ref().map_or(true, Chorus::is_silent)
            && self.echo.as_ref().map_or(true, Echo::is_silent)
            && self.reverb.as_ref().map_or(true, Reverb::is_silent)
    }

    /// Render one run of samples: tones into the mono scratch, the effect
    /// plan over it, and the stereo result accumulated into the master
    /// buffers. `tick_len` is the full tick in samples; `tick_offset` is
    /// how far into the tick this run starts.
    #[allow(clippy::too_many_arguments)]
    pub fn render_run(
        &mut self,
        instrument: &Instrument,
        sample_rate: f64,
        samples_per_beat: f64,
        tick_len: usize,
        tick_offset: usize,
        scratch: &mut [f32],
        stereo_left: &mut [f32],
        stereo_right: &mut [f32],
        out_left: &mut [f32],
        out_right: &mut [f32],
    ) {
        let run = scratch.len();
        debug_assert!(tick_offset + run <= tick_len);
        let f0 = tick_offset as f64 / tick_len.max(1) as f64;
        let f1 = (tick_offset + run) as f64 / tick_len.max(1) as f64;

        scratch.fill(0.0);
        let (wave_raw, wave_integrated) = self.tables.slices();
        let args = RenderArgs {
            sample_rate,
            instrument,
            wave_raw,
            wave_integrated,
        };
        for tone in self
            .active_tones
            .iter_mut()
            .chain(self.released_tones.iter_mut())
        {
            render_tone_segment(&args, tone, f0, f1, scratch);
        }

        let left = &mut stereo_left[..run];
        let right = &mut stereo_right[..run];
        let mut stereo = false;
        for i in 0..self.plan.len() {
            match self.plan[i] {
                EffectStage::Distortion => {
                    let (a, b) = self.params.distortion.segment(f0, f1);
                    self.distortion.process(a, b, scratch);
                }
                EffectStage::Bitcrusher => {
                    let (a, b) = self.params.freq_crush.segment(f0, f1);
                    self.bitcrusher.process(instrument.bit_crush, a, b, scratch);
                }
                EffectStage::RingMod => {
                    let (hz0, hz1) = self.params.ring_mod_hz.segment(f0, f1);
                    let (w0, w1) = self.params.ring_mod_wet.segment(f0, f1);
                    self.ring_mod.process(
                        instrument.ring_mod_wave,
                        hz0,
                        hz1,
                        w0,
                        w1,
                        sample_rate,
                        scratch,
                    );
                }
                EffectStage::Phaser => {
                    let (d0, d1) = self.params.phaser_depth.segment(f0, f1);
                    self.phaser.process(
                        instrument.phaser_stages,
                        instrument.phaser_rate as f64,
                        instrument.phaser_center_hz as f64,
                        d0,
                        d1,
                        instrument.phaser_feedback as f64,
                        sample_rate,
                        scratch,
                    );
                }
                EffectStage::Eq => {
                    for sample in scratch.iter_mut() {
                        let raw = *sample as f64;
                        let filtered = filter::apply_chain(
                            &mut self.eq_filters[..self.eq_count],
                            raw,
                            self.eq_input[0],
                            self.eq_input[1],
                        );
                        self.eq_input[1] = self.eq_input[0];
                        self.eq_input[0] = raw;
                        *sample = filtered as f32;
                    }
                    filter::sanitize_chain(
                        &mut self.eq_filters[..self.eq_count],
                        &mut self.eq_input,
                    );
                }
                EffectStage::Panning => {
                    let (p0, p1) = self.params.pan.segment(f0, f1);
                    let pan_delay = if instrument.effects.contains(EffectFlags::PANNING) {
                        instrument.pan_delay as f64
                    } else {
                        0.0
                    };
                    if let Some(panning) = &mut self.panning {
                        panning.process(
                            p0,
                            p1,
                            pan_delay,
                            sample_rate,
                            scratch,
                            left,
                            right,
                        );
                        stereo = true;
                    }
                }
                EffectStage::Chorus => {
                    let (a, b) = self.params.chorus.segment(f0, f1);
                    if let Some(chorus) = &mut self.chorus {
                        chorus.process(a, b, sample_rate, left, right);
                    }
                }
                EffectStage::Echo => {
                    let (a, b) = self.params.echo_sustain.segment(f0, f1);
                    let delay = samples_per_beat * instrument.echo_delay_beats as f64;
                    if let Some(echo) = &mut self.echo {
                        echo.process(delay, a, b, left, right);
                    }
                }
                EffectStage::Reverb => {
                    let (a, b) = self.params.reverb.segment(f0, f1);
                    if let Some(reverb) = &mut self.reverb {
                        reverb.process(a, b, left, right);
                    }
                }
            }
        }
        if !stereo {
            // Should not happen (panning is always planned), but never emit
            // an un-split buffer.
            for i in 0..run {
                left[i] = scratch[i];
                right[i] = scratch[i];
            }
        }

        let (v0, v1) = self.params.mix_volume.segment(f0, f1);
        let (g0, g1) = self.params.fade_gain.segment(f0, f1);
        let mut gain = crate::dsp::ramp::Ramp::over(v0 * g0, v1 * g1, run);
        for i in 0..run {
            let g = gain.next() as f32;
            out_left[i] += left[i] * g;
            out_right[i] += right[i] * g;
        }
    }
}

impl Default for InstrumentState {
    fn default() -> Self {
        Self::new()
    }
}

/// Render one tone's slice of the current tick. The tone's ramp targets
/// span the whole tick; this narrows them to the sub-range, runs the
/// kernel, and restores them so a later slice of the same tick still sees
/// the full-tick endpoints.
fn render_tone_segment(args: &RenderArgs, tone: &mut Tone, f0: f64, f1: f64, out: &mut [f32]) {
    let saved = (
        tone.freq_start,
        tone.freq_end,
        tone.expression_start,
        tone.expression_end,
        tone.pulse_width_start,
        tone.pulse_width_end,
        tone.dynamism_start,
        tone.dynamism_end,
    );
    let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;
    // Frequency interpolates geometrically, matching the kernels' glides.
    let geom = |a: f64, b: f64, t: f64| {
        if a > 0.0 && b > 0.0 {
            a * (b / a).powf(t)
        } else {
            lerp(a, b, t)
        }
    };
    tone.freq_start = geom(saved.0, saved.1, f0);
    tone.freq_end = geom(saved.0, saved.1, f1);
    tone.expression_start = lerp(saved.2, saved.3, f0);
    tone.expression_end = lerp(saved.2, saved.3, f1);
    tone.pulse_width_start = lerp(saved.4, saved.5, f0);
    tone.pulse_width_end = lerp(saved.4, saved.5, f1);
    tone.dynamism_start = lerp(saved.6, saved.7, f0);
    tone.dynamism_end = lerp(saved.6, saved.7, f1);

    kernels::render(args, tone, out);

    (
        tone.freq_start,
        tone.freq_end,
        tone.expression_start,
        tone.expression_end,
        tone.pulse_width_start,
        tone.pulse_width_end,
        tone.dynamism_start,
        tone.dynamism_end,
    ) = saved;
}

/// Which interpolation an envelope-swept filter section should use.
pub fn filter_interpolation_is_multiplicative(kind: FilterKind) -> bool {
    !matches!(kind, FilterKind::Peak)
}
