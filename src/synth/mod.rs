/*
The synthesis engine
====================

`Synth` owns the composition, the transport, and all runtime state, and
renders interleaved-free stereo on demand. The driving structure is the
tick: the finest scheduling unit (two per part, 48 per beat). At every
tick boundary the scheduler decides which tones exist, evaluates
envelopes and note pins at the tick's start and end, and loads per-sample
interpolation ramps; between boundaries the kernels and effects just run
their tight loops. A tick may be rendered in several runs when the
caller's buffer ends mid-tick, but no run ever crosses a tick boundary.

Everything here is deterministic: rendering the same song from the same
position twice produces bit-identical output.
*/

pub mod channel_state;
pub mod instrument_state;
#[cfg(feature = "rtrb")]
pub mod message;
pub mod modulation;
pub mod tone;

use crate::dsp::envelope::{slide_ratio, EnvelopeTiming};
use crate::dsp::filter::{self, FilterCoefficients};
use crate::dsp::limiter::Limiter;
use crate::song::instrument::{ChordKind, EffectFlags, Instrument, OscillatorType};
use crate::song::note::MAX_NOTE_SIZE;
use crate::song::{Note, Pattern, Song};
use crate::{MAX_BLOCK_SIZE, PARTS_PER_BEAT, TICKS_PER_BEAT, TICKS_PER_PART};
use channel_state::ChannelState;
use instrument_state::InstrumentState;
#[cfg(feature = "rtrb")]
use message::LiveMessage;
use modulation::{ModTarget, ModulationState};
use tone::{Tone, TonePool, ToneSource};

/// Ticks a slide transition takes to reach the new pitch.
const SLIDE_TICKS: f64 = 3.0;

/// Release fade for an interrupted tone, in ticks.
const INTERRUPT_FADE_TICKS: f64 = 1.0;

/// Everything per-tick computation needs, copied out of the synth so the
/// scheduling helpers can borrow channel state mutably alongside it.
#[derive(Clone, Copy)]
struct TickCtx {
    sample_rate: f64,
    tick_seconds: f64,
    tick_beats: f64,
    tick_samples: usize,
    tick_in_bar: u32,
    parts_per_bar: u32,
}

pub struct Synth {
    pub song: Song,
    sample_rate: f64,

    playing: bool,
    tempo: f64,
    master_volume: f32,
    bar: u32,
    beat: u32,
    part: u32,
    tick: u32,
    tick_samples_total: usize,
    tick_samples_done: usize,
    /// Carries the fractional part of the exact tick length between ticks
    /// so long renders don't drift against the tempo.
    tick_remainder: f64,
    loop_enabled: bool,
    next_bar_override: Option<u32>,

    channels: Vec<ChannelState>,
    pool: TonePool,
    limiter: Limiter,
    mods: ModulationState,
    next_live_id: u32,

    scratch_mono: Vec<f32>,
    scratch_left: Vec<f32>,
    scratch_right: Vec<f32>,

    #[cfg(feature = "rtrb")]
    live_input: Option<rtrb::Consumer<LiveMessage>>,
}

impl Synth {
    pub fn new(song: Song, sample_rate: f64) -> Self {
        let channels = song
            .channels
            .iter()
            .map(|c| ChannelState::new(c.instruments.len()))
            .collect();
        let tempo = song.tempo as f64;
        let master_volume = song.master_volume;
        Self {
            song,
            sample_rate,
            playing: false,
            tempo,
            master_volume,
            bar: 0,
            beat: 0,
            part: 0,
            tick: 0,
            tick_samples_total: 0,
            tick_samples_done: 0,
            tick_remainder: 0.0,
            loop_enabled: true,
            next_bar_override: None,
            channels,
            pool: TonePool::with_capacity(32),
            limiter: Limiter::new(sample_rate as f32),
            mods: ModulationState::default(),
            next_live_id: 1,
            scratch_mono: vec![0.0; MAX_BLOCK_SIZE],
            scratch_left: vec![0.0; MAX_BLOCK_SIZE],
            scratch_right: vec![0.0; MAX_BLOCK_SIZE],
            #[cfg(feature = "rtrb")]
            live_input: None,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    /// Stop the transport. Sounding notes release naturally and effect
    /// tails ring out; live input keeps working.
    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
    }

    /// Jump the transport to the start of a bar. Sounding tones release.
    pub fn skip_to_bar(&mut self, bar: u32) {
        self.bar = bar.min(self.song.bar_count.saturating_sub(1));
        self.beat = 0;
        self.part = 0;
        self.tick = 0;
        self.tick_samples_total = 0;
        self.tick_samples_done = 0;
    }

    pub fn current_bar(&self) -> u32 {
        self.bar
    }

    /// Playhead position within the current bar, in parts.
    pub fn current_part(&self) -> u32 {
        self.beat * PARTS_PER_BEAT + self.part
    }

    /// Drop all effect memory and sounding tones immediately. The next
    /// rendered sample starts from total silence.
    pub fn reset_effects(&mut self) {
        for channel in &mut self.channels {
            for state in &mut channel.instruments {
                for tone in state
                    .active_tones
                    .drain(..)
                    .chain(state.released_tones.drain(..))
                {
                    self.pool.give_back(tone);
                }
                state.flush();
            }
        }
        self.limiter.reset();
    }

    /// Queue a modulation value; it takes effect at the next tick.
    pub fn set_mod_value(&mut self, target: ModTarget, value: f64) {
        self.mods.queue(target, value);
    }

    /// The currently effective value for a modulation target.
    pub fn mod_value(&self, target: ModTarget) -> f64 {
        match target {
            ModTarget::Tempo => self.tempo,
            ModTarget::MasterVolume => self.master_volume as f64,
            ModTarget::NextBar => self.next_bar_override.unwrap_or(self.bar) as f64,
            ModTarget::InstrumentVolume { channel } => self
                .channel_override(channel, |s| s.volume_override)
                .unwrap_or(1.0),
            ModTarget::Pan { channel } => {
                self.channel_override(channel, |s| s.pan_override).unwrap_or(0.0)
            }
            ModTarget::Reverb { channel } => self
                .channel_override(channel, |s| s.reverb_override)
                .unwrap_or(0.0),
            ModTarget::Distortion { channel } => self
                .channel_override(channel, |s| s.distortion_override)
                .unwrap_or(0.0),
            ModTarget::EchoSustain { channel } => self
                .channel_override(channel, |s| s.echo_sustain_override)
                .unwrap_or(0.0),
        }
    }

    fn channel_override(
        &self,
        channel: usize,
        get: impl Fn(&InstrumentState) -> Option<f64>,
    ) -> Option<f64> {
        self.channels
            .get(channel)
            .and_then(|c| c.instruments.first())
            .and_then(get)
    }

    /// Create the producer half of the live input queue. The engine drains
    /// the consumer at each tick boundary.
    #[cfg(feature = "rtrb")]
    pub fn live_input_producer(&mut self) -> rtrb::Producer<LiveMessage> {
        let (producer, consumer) = message::live_input_channel();
        self.live_input = Some(consumer);
        producer
    }

    /// Render stereo output. Buffers must be the same length.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len());
        left.fill(0.0);
        right.fill(0.0);

        let mut pos = 0;
        while pos < left.len() {
            if self.tick_samples_done == 0 || self.tick_samples_total == 0 {
                self.begin_tick();
            }
            let remaining_tick = self.tick_samples_total - self.tick_samples_done;
            let run = (left.len() - pos).min(remaining_tick).min(MAX_BLOCK_SIZE);
            let end = pos + run;
            self.render_segment(run, pos, left, right);
            self.tick_samples_done += run;
            pos = end;
            if self.tick_samples_done >= self.tick_samples_total {
                self.finish_tick();
                self.tick_samples_done = 0;
                self.tick_samples_total = 0;
            }
        }
    }

    fn samples_per_tick(&mut self) -> usize {
        let exact =
            self.sample_rate * 60.0 / (self.tempo * TICKS_PER_BEAT as f64) + self.tick_remainder;
        let whole = (exact.floor() as usize).max(1);
        self.tick_remainder = (exact - whole as f64).max(0.0);
        whole
    }

    fn tick_ctx(&self) -> TickCtx {
        TickCtx {
            sample_rate: self.sample_rate,
            tick_seconds: self.tick_samples_total as f64 / self.sample_rate,
            tick_beats: 1.0 / TICKS_PER_BEAT as f64,
            tick_samples: self.tick_samples_total,
            tick_in_bar: (self.beat * PARTS_PER_BEAT + self.part) * TICKS_PER_PART + self.tick,
            parts_per_bar: self.song.parts_per_bar(),
        }
    }

    fn begin_tick(&mut self) {
        self.apply_mods();
        self.tick_samples_total = self.samples_per_tick();
        #[cfg(feature = "rtrb")]
        self.poll_live_input();
        self.schedule_tick();
    }

    fn apply_mods(&mut self) {
        if self.mods.is_empty() {
            return;
        }
        let pending: Vec<_> = self.mods.drain().collect();
        for (target, value) in pending {
            match target {
                ModTarget::Tempo => self.tempo = value.clamp(30.0, 320.0),
                ModTarget::MasterVolume => self.master_volume = value.clamp(0.0, 1.0) as f32,
                ModTarget::NextBar => {
                    self.next_bar_override =
                        Some((value as u32).min(self.song.bar_count.saturating_sub(1)));
                }
                ModTarget::InstrumentVolume { channel } => {
                    self.set_channel_override(channel, |s, v| s.volume_override = v, value, 0.0, 1.0)
                }
                ModTarget::Pan { channel } => {
                    self.set_channel_override(channel, |s, v| s.pan_override = v, value, -1.0, 1.0)
                }
                ModTarget::Reverb { channel } => {
                    self.set_channel_override(channel, |s, v| s.reverb_override = v, value, 0.0, 1.0)
                }
                ModTarget::Distortion { channel } => self.set_channel_override(
                    channel,
                    |s, v| s.distortion_override = v,
                    value,
                    0.0,
                    1.0,
                ),
                ModTarget::EchoSustain { channel } => self.set_channel_override(
                    channel,
                    |s, v| s.echo_sustain_override = v,
                    value,
                    0.0,
                    1.0,
                ),
            }
        }
    }

    fn set_channel_override(
        &mut self,
        channel: usize,
        set: impl Fn(&mut InstrumentState, Option<f64>),
        value: f64,
        lo: f64,
        hi: f64,
    ) {
        if let Some(c) = self.channels.get_mut(channel) {
            for state in &mut c.instruments {
                set(state, Some(value.clamp(lo, hi)));
            }
        }
    }

    #[cfg(feature = "rtrb")]
    fn poll_live_input(&mut self) {
        let Some(consumer) = &mut self.live_input else {
            return;
        };
        let sample_rate = self.sample_rate;
        let tick_seconds = self.tick_samples_total as f64 / self.sample_rate;
        while let Ok(message) = consumer.pop() {
            match message {
                LiveMessage::NoteOn { channel, pitch } => {
                    let Some((instrument, state)) =
                        current_instrument(&self.song, &mut self.channels, channel, self.bar)
                    else {
                        continue;
                    };
                    state.wake(instrument, sample_rate);
                    let mut tone = self.pool.checkout();
                    tone.source = ToneSource::LiveInput;
                    tone.pitches.push(pitch);
                    tone.note_id = crate::dsp::hash32(self.next_live_id);
                    self.next_live_id = self.next_live_id.wrapping_add(1);
                    if instrument.oscillator == OscillatorType::Supersaw {
                        crate::kernels::supersaw::init_phases(&mut tone);
                    }
                    state.active_tones.push(tone);
                }
                LiveMessage::NoteOff { channel, pitch } => {
                    let Some((instrument, state)) =
                        current_instrument(&self.song, &mut self.channels, channel, self.bar)
                    else {
                        continue;
                    };
                    let fade = release_fade_ticks(instrument, tick_seconds);
                    let mut index = 0;
                    while index < state.active_tones.len() {
                        let tone = &state.active_tones[index];
                        if tone.source == ToneSource::LiveInput && tone.primary_pitch() == pitch {
                            let tone = state.active_tones.swap_remove(index);
                            release_tone(tone, fade, &mut state.released_tones);
                        } else {
                            index += 1;
                        }
                    }
                }
                LiveMessage::AllNotesOff => {
                    for (channel, cstate) in
                        self.song.channels.iter().zip(self.channels.iter_mut())
                    {
                        for (instrument, state) in
                            channel.instruments.iter().zip(cstate.instruments.iter_mut())
                        {
                            let fade = release_fade_ticks(instrument, tick_seconds);
                            let mut index = 0;
                            while index < state.active_tones.len() {
                                if state.active_tones[index].source == ToneSource::LiveInput {
                                    let tone = state.active_tones.swap_remove(index);
                                    release_tone(tone, fade, &mut state.released_tones);
                                } else {
                                    index += 1;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// The per-tick scheduling pass: decide which tones exist and load
    /// their interpolation ramps for the tick about to render.
    fn schedule_tick(&mut self) {
        let ctx = self.tick_ctx();
        let playing = self.playing;
        let bar = self.bar;
        let Self {
            song,
            channels,
            pool,
            ..
        } = self;

        for (channel_index, (channel, cstate)) in
            song.channels.iter().zip(channels.iter_mut()).enumerate()
        {
            let pattern = channel.pattern_at_bar(bar);
            let current = pattern
                .map(|p| p.instrument.min(channel.instruments.len().saturating_sub(1)));

            // Anything not currently scheduled releases its note tones:
            // other instruments always, the current one too when the
            // transport is stopped (an empty bar has no current at all).
            for (index, state) in cstate.instruments.iter_mut().enumerate() {
                if (!playing || Some(index) != current) && !state.active_tones.is_empty() {
                    let instrument = &channel.instruments[index];
                    release_note_tones(state, release_fade_ticks(instrument, ctx.tick_seconds));
                }
            }

            if let (true, Some(index), Some(pattern)) = (playing, current, pattern) {
                let instrument = &channel.instruments[index];
                let state = &mut cstate.instruments[index];
                let part_in_bar = ctx.tick_in_bar / TICKS_PER_PART;
                match pattern.note_at(part_in_bar) {
                    Some(note) => {
                        state.wake(instrument, ctx.sample_rate);
                        schedule_note(
                            state,
                            pool,
                            instrument,
                            pattern,
                            note,
                            channel_index,
                            bar,
                            cstate.last_instrument == Some(index),
                            &ctx,
                        );
                        cstate.last_instrument = Some(index);
                    }
                    None => {
                        release_note_tones(
                            state,
                            release_fade_ticks(instrument, ctx.tick_seconds),
                        );
                    }
                }
            }

            // Per-tick ramps for live and released tones, and the effect
            // parameter glides, for every instrument still making sound.
            for (index, state) in cstate.instruments.iter_mut().enumerate() {
                let instrument = &channel.instruments[index];
                if !state.awake {
                    continue;
                }
                for tone in &mut state.active_tones {
                    if tone.source == ToneSource::LiveInput {
                        compute_live_tone(tone, instrument, &ctx);
                    }
                }
                for tone in &mut state.released_tones {
                    compute_released_tone(tone);
                }
                state.advance_params(instrument);
            }
        }
    }

    fn render_segment(&mut self, run: usize, pos: usize, left: &mut [f32], right: &mut [f32]) {
        let sample_rate = self.sample_rate;
        let samples_per_beat = self.sample_rate * 60.0 / self.tempo;
        let tick_len = self.tick_samples_total;
        let tick_offset = self.tick_samples_done;
        let out_left = &mut left[pos..pos + run];
        let out_right = &mut right[pos..pos + run];

        let Self {
            song,
            channels,
            scratch_mono,
            scratch_left,
            scratch_right,
            ..
        } = self;
        for (channel, cstate) in song.channels.iter().zip(channels.iter_mut()) {
            for (instrument, state) in
                channel.instruments.iter().zip(cstate.instruments.iter_mut())
            {
                if !state.awake {
                    continue;
                }
                state.render_run(
                    instrument,
                    sample_rate,
                    samples_per_beat,
                    tick_len,
                    tick_offset,
                    &mut scratch_mono[..run],
                    &mut scratch_left[..run],
                    &mut scratch_right[..run],
                    out_left,
                    out_right,
                );
            }
        }

        let master = self.master_volume;
        for (l, r) in out_left.iter_mut().zip(out_right.iter_mut()) {
            *l *= master;
            *r *= master;
        }
        self.limiter.process(out_left, out_right);
    }

    /// Advance clocks and the transport after a tick has fully rendered.
    fn finish_tick(&mut self) {
        let tick_seconds = self.tick_samples_total as f64 / self.sample_rate;
        let tempo = self.tempo;
        let Self {
            song,
            channels,
            pool,
            ..
        } = self;

        for (channel, cstate) in song.channels.iter().zip(channels.iter_mut()) {
            for (instrument, state) in
                channel.instruments.iter().zip(cstate.instruments.iter_mut())
            {
                for tone in &mut state.active_tones {
                    tone.envelopes.advance_tick(tick_seconds);
                    if tone.slide_ticks_done < tone.slide_ticks_total {
                        tone.slide_ticks_done += 1.0;
                    }
                }
                for index in (0..state.released_tones.len()).rev() {
                    let tone = &mut state.released_tones[index];
                    tone.envelopes.advance_tick(tick_seconds);
                    tone.ticks_since_released += 1;
                    if tone.ticks_since_released as f64 >= tone.release_ticks_total {
                        pool.give_back(state.released_tones.swap_remove(index));
                    }
                }

                if state.awake {
                    if state.has_tones() {
                        state.sleep_countdown = None;
                    } else {
                        match state.sleep_countdown {
                            None => {
                                state.sleep_countdown =
                                    Some(state.tail_ticks(instrument, tempo));
                            }
                            Some(0) => state.flush(),
                            Some(n) => state.sleep_countdown = Some(n - 1),
                        }
                    }
                }
            }
        }

        if !self.playing {
            return;
        }
        self.tick += 1;
        if self.tick < TICKS_PER_PART {
            return;
        }
        self.tick = 0;
        self.part += 1;
        if self.part < PARTS_PER_BEAT {
            return;
        }
        self.part = 0;
        self.beat += 1;
        if self.beat < self.song.beats_per_bar {
            return;
        }
        self.beat = 0;
        let next = self.next_bar_override.take().unwrap_or(self.bar + 1);
        self.bar = next;
        let loop_end = self.song.loop_start + self.song.loop_length;
        if self.bar >= self.song.bar_count || (self.loop_enabled && self.bar >= loop_end) {
            if self.loop_enabled {
                self.bar = self.song.loop_start.min(self.song.bar_count - 1);
            } else {
                self.playing = false;
            }
        }
    }
}

/// Stable identity for a note: one value per (channel, bar, start) triple,
/// so re-rendering reproduces every note-keyed random envelope exactly.
fn note_identity(channel: usize, bar: u32, start_part: u32) -> u32 {
    crate::dsp::hash32(
        (channel as u32)
            .wrapping_mul(0x9e37_79b9)
            .wrapping_add(bar.wrapping_mul(0x85eb_ca6b))
            .wrapping_add(start_part),
    )
}

fn key_to_hz(key: f64) -> f64 {
    440.0 * ((key - 69.0) / 12.0).exp2()
}

fn release_fade_ticks(instrument: &Instrument, tick_seconds: f64) -> f64 {
    (instrument.fade_out as f64 / tick_seconds.max(1e-9)).ceil().max(1.0)
}

fn release_tone(mut tone: Box<Tone>, fade_ticks: f64, released: &mut Vec<Box<Tone>>) {
    tone.release_level = tone.expression_end;
    tone.release_ticks_total = fade_ticks;
    tone.ticks_since_released = 0;
    freeze_filters(&mut tone);
    released.push(tone);
}

/// Release every note-driven tone; live tones stay until their note-off.
fn release_note_tones(state: &mut InstrumentState, fade_ticks: f64) {
    let mut index = 0;
    while index < state.active_tones.len() {
        if state.active_tones[index].source == ToneSource::Note {
            let tone = state.active_tones.swap_remove(index);
            release_tone(tone, fade_ticks, &mut state.released_tones);
        } else {
            index += 1;
        }
    }
}

/// Stop a tone's filter coefficients where they are: released tones are no
/// longer recomputed per tick, and a leftover gradient would keep
/// advancing past its intended endpoint every sample.
fn freeze_filters(tone: &mut Tone) {
    for index in 0..tone.note_filter_count {
        let section = &mut tone.note_filters[index];
        let held = FilterCoefficients {
            a1: section.a1,
            a2: section.a2,
            b0: section.b0,
            b1: section.b1,
            b2: section.b2,
        };
        section.load(&held);
    }
}

#[cfg(feature = "rtrb")]
fn current_instrument<'a>(
    song: &'a Song,
    channels: &'a mut [ChannelState],
    channel: usize,
    bar: u32,
) -> Option<(&'a Instrument, &'a mut InstrumentState)> {
    let song_channel = song.channels.get(channel)?;
    let cstate = channels.get_mut(channel)?;
    let index = song_channel
        .pattern_at_bar(bar)
        .map(|p| p.instrument)
        .unwrap_or(0)
        .min(song_channel.instruments.len().saturating_sub(1));
    Some((
        song_channel.instruments.get(index)?,
        cstate.instruments.get_mut(index)?,
    ))
}

/// Make sure the right tones exist for `note` this tick (creating,
/// adopting, or releasing as transitions demand), then load every active
/// note tone's ramps.
#[allow(clippy::too_many_arguments)]
fn schedule_note(
    state: &mut InstrumentState,
    pool: &mut TonePool,
    instrument: &Instrument,
    pattern: &Pattern,
    note: &Note,
    channel_index: usize,
    bar: u32,
    same_instrument_as_last: bool,
    ctx: &TickCtx,
) {
    let id = note_identity(channel_index, bar, note.start);
    let note_start_tick = note.start * TICKS_PER_PART;
    let ticks_into_note = ctx.tick_in_bar.saturating_sub(note_start_tick);

    let has_current = state
        .active_tones
        .iter()
        .any(|t| t.source == ToneSource::Note && t.note_id == id);

    if !has_current {
        // Collect the previous note's tones (if any) for possible adoption.
        let mut previous: Vec<Box<Tone>> = Vec::new();
        let mut index = 0;
        while index < state.active_tones.len() {
            if state.active_tones[index].source == ToneSource::Note {
                previous.push(state.active_tones.swap_remove(index));
            } else {
                index += 1;
            }
        }

        let adjacent = previous
            .iter()
            .any(|t| t.note_end_part == note.start)
            || (note.start == 0
                && note.continues_last_pattern
                && previous.iter().any(|t| t.note_end_part == ctx.parts_per_bar));
        let hand_off = note.start == 0 && note.continues_last_pattern;
        let seamless = !previous.is_empty()
            && same_instrument_as_last
            && adjacent
            && (instrument.transition.is_seamless() || hand_off);

        if seamless {
            let slide = instrument.transition.slides() && !hand_off;
            for (slot, mut tone) in previous.into_iter().enumerate() {
                if slot < wanted_tone_count(instrument, note) {
                    let old_pitch = tone.primary_pitch() as f64 + tone.last_interval;
                    adopt_tone(&mut tone, instrument, note, id, slot);
                    if slide {
                        tone.slide_interval = old_pitch - tone.primary_pitch() as f64;
                        tone.slide_ticks_total = SLIDE_TICKS;
                        tone.slide_ticks_done = 0.0;
                    } else if hand_off {
                        tone.slide_interval = 0.0;
                    }
                    state.active_tones.push(tone);
                } else {
                    release_tone(
                        tone,
                        release_fade_ticks(instrument, ctx.tick_seconds),
                        &mut state.released_tones,
                    );
                }
            }
        } else if !previous.is_empty() {
            let fade = if instrument.transition == crate::song::Transition::Interrupt {
                INTERRUPT_FADE_TICKS
            } else {
                release_fade_ticks(instrument, ctx.tick_seconds)
            };
            for tone in previous {
                release_tone(tone, fade, &mut state.released_tones);
            }
        }
    }

    // Create any tones the chord layout still calls for. Strummed chords
    // stagger their entries; everything else starts at once.
    match instrument.chord {
        ChordKind::Arpeggio => {
            let exists = state
                .active_tones
                .iter()
                .any(|t| t.source == ToneSource::Note && t.note_id == id);
            if !exists {
                let mut tone = pool.checkout();
                init_tone(&mut tone, instrument, note, id, None);
                state.active_tones.push(tone);
            }
        }
        ChordKind::Simultaneous | ChordKind::Strum => {
            for (slot, &pitch) in note.pitches.iter().enumerate() {
                let start_offset = if instrument.chord == ChordKind::Strum {
                    slot as u32 * instrument.strum_speed.max(1)
                } else {
                    0
                };
                if ticks_into_note < start_offset {
                    continue;
                }
                let exists = state.active_tones.iter().any(|t| {
                    t.source == ToneSource::Note
                        && t.note_id == id
                        && t.primary_pitch() == pitch
                });
                if !exists {
                    let mut tone = pool.checkout();
                    init_tone(&mut tone, instrument, note, id, Some(slot));
                    state.active_tones.push(tone);
                }
            }
        }
    }

    // Load this tick's ramps into every tone of the current note.
    let seamless_next = instrument.transition.is_seamless() && pattern.note_after(note).is_some();
    for tone in &mut state.active_tones {
        if tone.source == ToneSource::Note && tone.note_id == id {
            compute_note_tone(tone, instrument, note, seamless_next, ctx);
        }
    }
}

fn wanted_tone_count(instrument: &Instrument, note: &Note) -> usize {
    match instrument.chord {
        ChordKind::Arpeggio => 1,
        _ => note.pitches.len(),
    }
}

fn adopt_tone(tone: &mut Tone, instrument: &Instrument, note: &Note, id: u32, slot: usize) {
    tone.note_id = id;
    tone.note_end_part = note.end;
    tone.pitches.clear();
    match instrument.chord {
        ChordKind::Arpeggio => tone.pitches.extend_from_slice(&note.pitches),
        _ => tone
            .pitches
            .push(note.pitches.get(slot).copied().unwrap_or(note.pitches[0])),
    }
}

fn init_tone(
    tone: &mut Tone,
    instrument: &Instrument,
    note: &Note,
    id: u32,
    slot: Option<usize>,
) {
    tone.source = ToneSource::Note;
    tone.note_id = id;
    tone.note_end_part = note.end;
    match slot {
        None => tone.pitches.extend_from_slice(&note.pitches),
        Some(slot) => tone
            .pitches
            .push(note.pitches.get(slot).copied().unwrap_or(note.pitches[0])),
    }
    if instrument.oscillator == OscillatorType::Supersaw {
        crate::kernels::supersaw::init_phases(tone);
    }
}

/// Evaluate pins, envelopes, transitions, and filters for one tick of an
/// active note-driven tone.
fn compute_note_tone(
    tone: &mut Tone,
    instrument: &Instrument,
    note: &Note,
    seamless_next: bool,
    ctx: &TickCtx,
) {
    let note_start_tick = note.start * TICKS_PER_PART;
    let ticks_into = ctx.tick_in_bar as f64 - note_start_tick as f64;
    let part_pos_start = ticks_into / TICKS_PER_PART as f64;
    let part_pos_end = (ticks_into + 1.0) / TICKS_PER_PART as f64;
    let (interval_start, size_start) = note.pin_values_at(part_pos_start);
    let (interval_end, size_end) = note.pin_values_at(part_pos_end);
    tone.last_interval = interval_end;

    // Arpeggio: one pitch per window of ticks.
    let pitch = if instrument.chord == ChordKind::Arpeggio && tone.pitches.len() > 1 {
        let step =
            (tone.envelopes.note_ticks as u32 / instrument.arpeggio_speed.max(1)) as usize;
        tone.pitches[step % tone.pitches.len()]
    } else {
        tone.primary_pitch()
    } as f64;

    let size_scale = 1.0 / MAX_NOTE_SIZE as f64;
    let timing = EnvelopeTiming {
        tick_seconds: ctx.tick_seconds,
        tick_beats: ctx.tick_beats,
        note_size_start: size_start * size_scale,
        note_size_end: size_end * size_scale,
        pitch,
        note_id: tone.note_id,
    };
    tone.envelopes.compute(&instrument.envelopes, &timing);
    let env = tone.envelopes.values;

    let slide_start =
        tone.slide_interval * (1.0 - slide_ratio(tone.slide_ticks_done, tone.slide_ticks_total));
    let slide_end = tone.slide_interval
        * (1.0 - slide_ratio(tone.slide_ticks_done + 1.0, tone.slide_ticks_total));
    tone.freq_start = key_to_hz(pitch + interval_start + slide_start + env.pitch_shift_start);
    tone.freq_end = key_to_hz(pitch + interval_end + slide_end + env.pitch_shift_end);

    let fade_in = instrument.fade_in as f64;
    let fade_factor = |seconds: f64| {
        if fade_in > 0.0 {
            (seconds / fade_in).min(1.0)
        } else {
            1.0
        }
    };
    let mut expression_start =
        size_start * size_scale * env.note_volume_start * fade_factor(tone.envelopes.note_seconds);
    let mut expression_end = size_end * size_scale
        * env.note_volume_end
        * fade_factor(tone.envelopes.note_seconds + ctx.tick_seconds);

    // The very last tick of a note that won't hand its tone to a neighbor
    // ramps fully to silence to avoid a click at the cut.
    let note_end_tick = note.end * TICKS_PER_PART;
    if ctx.tick_in_bar + 1 >= note_end_tick && !seamless_next {
        expression_end = 0.0;
    }
    if tone.envelopes.note_ticks == 0.0 && tone.slide_ticks_total == 0.0 {
        // Fresh attack: ramp up from silence within the first tick.
        expression_start = 0.0;
    }
    tone.expression_start = expression_start;
    tone.expression_end = expression_end;

    tone.pulse_width_start =
        (instrument.pulse_width as f64 * env.pulse_width_mult_start).clamp(0.01, 0.5);
    tone.pulse_width_end =
        (instrument.pulse_width as f64 * env.pulse_width_mult_end).clamp(0.01, 0.5);
    tone.dynamism_start =
        (instrument.supersaw_dynamism as f64 * env.supersaw_dynamism_mult_start).clamp(0.0, 1.0);
    tone.dynamism_end =
        (instrument.supersaw_dynamism as f64 * env.supersaw_dynamism_mult_end).clamp(0.0, 1.0);

    load_note_filters(
        tone,
        instrument,
        ctx,
        env.note_filter_mult_start,
        env.note_filter_mult_end,
    );
}

/// Live tones have no note pins: full size, no bend, envelopes running.
fn compute_live_tone(tone: &mut Tone, instrument: &Instrument, ctx: &TickCtx) {
    let pitch = tone.primary_pitch() as f64;
    let timing = EnvelopeTiming {
        tick_seconds: ctx.tick_seconds,
        tick_beats: ctx.tick_beats,
        note_size_start: 1.0,
        note_size_end: 1.0,
        pitch,
        note_id: tone.note_id,
    };
    tone.envelopes.compute(&instrument.envelopes, &timing);
    let env = tone.envelopes.values;

    tone.freq_start = key_to_hz(pitch + env.pitch_shift_start);
    tone.freq_end = key_to_hz(pitch + env.pitch_shift_end);

    let fade_in = instrument.fade_in as f64;
    let fade_factor = |seconds: f64| {
        if fade_in > 0.0 {
            (seconds / fade_in).min(1.0)
        } else {
            1.0
        }
    };
    tone.expression_start = env.note_volume_start * fade_factor(tone.envelopes.note_seconds);
    tone.expression_end =
        env.note_volume_end * fade_factor(tone.envelopes.note_seconds + ctx.tick_seconds);
    if tone.envelopes.note_ticks == 0.0 {
        tone.expression_start = 0.0;
    }

    tone.pulse_width_start =
        (instrument.pulse_width as f64 * env.pulse_width_mult_start).clamp(0.01, 0.5);
    tone.pulse_width_end =
        (instrument.pulse_width as f64 * env.pulse_width_mult_end).clamp(0.01, 0.5);
    tone.dynamism_start =
        (instrument.supersaw_dynamism as f64 * env.supersaw_dynamism_mult_start).clamp(0.0, 1.0);
    tone.dynamism_end =
        (instrument.supersaw_dynamism as f64 * env.supersaw_dynamism_mult_end).clamp(0.0, 1.0);

    load_note_filters(
        tone,
        instrument,
        ctx,
        env.note_filter_mult_start,
        env.note_filter_mult_end,
    );
}

fn load_note_filters(
    tone: &mut Tone,
    instrument: &Instrument,
    ctx: &TickCtx,
    freq_mult_start: f64,
    freq_mult_end: f64,
) {
    if !instrument.effects.contains(EffectFlags::NOTE_FILTER) {
        tone.note_filter_count = 0;
        return;
    }
    let points = instrument.note_filter.active_points();
    tone.note_filter_count = points.len();
    for (section, point) in tone.note_filters.iter_mut().zip(points) {
        let start =
            filter::control_point_coefficients(point, ctx.sample_rate, freq_mult_start, 1.0);
        let end = filter::control_point_coefficients(point, ctx.sample_rate, freq_mult_end, 1.0);
        section.load_gradient(
            &start,
            &end,
            ctx.tick_samples,
            instrument_state::filter_interpolation_is_multiplicative(point.kind),
        );
    }
}

/// A released tone fades linearly from its captured level to silence.
fn compute_released_tone(tone: &mut Tone) {
    let total = tone.release_ticks_total.max(1.0);
    let t0 = (tone.ticks_since_released as f64 / total).min(1.0);
    let t1 = ((tone.ticks_since_released as f64 + 1.0) / total).min(1.0);
    tone.expression_start = tone.release_level * (1.0 - t0);
    tone.expression_end = tone.release_level * (1.0 - t1);
    tone.freq_start = tone.freq_end;
}
