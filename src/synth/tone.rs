use crate::dsp::delay::DelayLine;
use crate::dsp::envelope::EnvelopeComputer;
use crate::dsp::filter::{self, DynamicBiquad};
use crate::song::instrument::{FILTER_MAX_POINTS, OPERATOR_COUNT};
use crate::song::note::MAX_PITCHES;

/// Phase accumulators per tone: enough for the widest kernel (supersaw's
/// seven voices; FM uses four, unison uses two).
pub const MAX_TONE_PHASES: usize = 7;

/// Where a tone's pitch and timing come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToneSource {
    /// Driven by the note list.
    #[default]
    Note,
    /// Driven externally (keyboard-style input); behaves like an active
    /// tone but has no originating note.
    LiveInput,
}

/// Karplus-Strong state for one string of a picked-string tone.
#[derive(Debug, Clone)]
pub struct PickedString {
    pub delay_line: DelayLine,
    /// Current fractional loop length in samples.
    pub delay_length: f64,
    pub all_pass_input: f64,
    pub all_pass_output: f64,
    pub shelf_sample: f64,
    /// Samples of attack impulse still to inject.
    pub impulse_remaining: u32,
    /// Counter hashed for the impulse noise burst.
    pub impulse_counter: u32,
}

impl PickedString {
    pub fn new() -> Self {
        Self {
            delay_line: DelayLine::new(2048),
            delay_length: 0.0,
            all_pass_input: 0.0,
            all_pass_output: 0.0,
            shelf_sample: 0.0,
            impulse_remaining: 0,
            impulse_counter: 0,
        }
    }

    pub fn reset(&mut self) {
        self.delay_line.clear();
        self.delay_length = 0.0;
        self.all_pass_input = 0.0;
        self.all_pass_output = 0.0;
        self.shelf_sample = 0.0;
        self.impulse_remaining = 0;
        self.impulse_counter = 0;
    }
}

impl Default for PickedString {
    fn default() -> Self {
        Self::new()
    }
}

/// One sounding voice: oscillator phases, filter instances, envelope state,
/// and the per-run ramp targets the scheduler fills in before dispatching a
/// kernel.
///
/// Tones are pooled. Stale state leaking from a previous note through a
/// reused pool entry is the most audible class of bug this engine can have
/// (un-reset filter history can glitch or blow up), so allocation goes
/// through `TonePool::checkout`, which resets unconditionally.
#[derive(Debug, Clone, Default)]
pub struct Tone {
    pub source: ToneSource,
    pub pitches: Vec<i32>,
    /// End part of the originating note within its bar, for adjacency
    /// checks between consecutive notes.
    pub note_end_part: u32,
    /// Stable identity for note-keyed random envelopes.
    pub note_id: u32,

    // Persistent oscillator state.
    pub phases: [f64; MAX_TONE_PHASES],
    pub fm_prev_outputs: [f64; OPERATOR_COUNT],
    pub strings: Vec<PickedString>,
    /// One-pole damping history for the noise kernels.
    pub noise_sample: f64,
    /// Previous supersaw raw sample (kept across runs for the shape mix).
    pub supersaw_prev_sample: f64,

    // Note filter chain.
    pub note_filters: [DynamicBiquad; FILTER_MAX_POINTS],
    pub note_filter_count: usize,
    pub initial_filter_input: [f64; 2],

    pub envelopes: EnvelopeComputer,

    // Per-run ramp targets, recomputed by the scheduler every tick.
    pub freq_start: f64,
    pub freq_end: f64,
    pub expression_start: f64,
    pub expression_end: f64,
    pub pulse_width_start: f64,
    pub pulse_width_end: f64,
    pub dynamism_start: f64,
    pub dynamism_end: f64,

    // Transition bookkeeping.
    /// Semitone offset the pitch is sliding in from (0 when not sliding).
    pub slide_interval: f64,
    pub slide_ticks_total: f64,
    pub slide_ticks_done: f64,

    // Lifecycle.
    pub ticks_since_released: u32,
    /// Expression level captured at release; the tail fades from here.
    pub release_level: f64,
    /// Length of the release fade, in ticks.
    pub release_ticks_total: f64,
    /// Pin interval from the last computed tick, for slide hand-offs.
    pub last_interval: f64,
}

impl Tone {
    /// Zero every piece of state. Private on purpose: the pool calls this;
    /// nothing else should need to.
    fn reset(&mut self) {
        self.source = ToneSource::Note;
        self.pitches.clear();
        self.note_end_part = 0;
        self.note_id = 0;
        self.phases = [0.0; MAX_TONE_PHASES];
        self.fm_prev_outputs = [0.0; OPERATOR_COUNT];
        for string in &mut self.strings {
            string.reset();
        }
        self.noise_sample = 0.0;
        self.supersaw_prev_sample = 0.0;
        for filter in &mut self.note_filters {
            *filter = DynamicBiquad::default();
        }
        self.note_filter_count = 0;
        self.initial_filter_input = [0.0; 2];
        self.envelopes.reset();
        self.freq_start = 0.0;
        self.freq_end = 0.0;
        self.expression_start = 0.0;
        self.expression_end = 0.0;
        self.pulse_width_start = 0.0;
        self.pulse_width_end = 0.0;
        self.dynamism_start = 0.0;
        self.dynamism_end = 0.0;
        self.slide_interval = 0.0;
        self.slide_ticks_total = 0.0;
        self.slide_ticks_done = 0.0;
        self.ticks_since_released = 0;
        self.release_level = 0.0;
        self.release_ticks_total = 0.0;
        self.last_interval = 0.0;
    }

    /// Run one raw oscillator sample through the note filter chain,
    /// maintaining the chain's shared input history.
    #[inline]
    pub fn apply_note_filters(&mut self, raw: f64) -> f64 {
        let filtered = filter::apply_chain(
            &mut self.note_filters[..self.note_filter_count],
            raw,
            self.initial_filter_input[0],
            self.initial_filter_input[1],
        );
        self.initial_filter_input[1] = self.initial_filter_input[0];
        self.initial_filter_input[0] = raw;
        filtered
    }

    /// Post-run numerical hygiene for the note filter chain.
    pub fn sanitize_filters(&mut self) {
        let count = self.note_filter_count;
        filter::sanitize_chain(
            &mut self.note_filters[..count],
            &mut self.initial_filter_input,
        );
    }

    pub fn primary_pitch(&self) -> i32 {
        self.pitches.first().copied().unwrap_or(0)
    }
}

/// Free pool of tones. `checkout` is the only way to get a tone out, and
/// it always returns a fully reset instance, so the reset-on-reuse
/// invariant cannot be skipped at any call site.
#[derive(Debug, Default)]
pub struct TonePool {
    free: Vec<Box<Tone>>,
}

impl TonePool {
    pub fn with_capacity(count: usize) -> Self {
        let mut pool = Self {
            free: Vec::with_capacity(count),
        };
        for _ in 0..count {
            let mut tone = Box::<Tone>::default();
            tone.pitches.reserve(MAX_PITCHES);
            pool.free.push(tone);
        }
        pool
    }

    pub fn checkout(&mut self) -> Box<Tone> {
        let mut tone = self.free.pop().unwrap_or_default();
        tone.reset();
        tone
    }

    pub fn give_back(&mut self, tone: Box<Tone>) {
        self.free.push(tone);
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_resets_recycled_state() {
        let mut pool = TonePool::with_capacity(1);

        let mut tone = pool.checkout();
        tone.phases[0] = 0.7;
        tone.note_filters[0].output1 = 0.5;
        tone.note_filters[0].output2 = -0.25;
        tone.initial_filter_input = [0.1, 0.2];
        tone.envelopes.note_seconds = 3.0;
        tone.pitches.push(60);
        tone.strings.push(PickedString::new());
        tone.strings[0].delay_line.write(0.9);
        pool.give_back(tone);

        let tone = pool.checkout();
        assert_eq!(tone.phases, [0.0; MAX_TONE_PHASES]);
        assert_eq!(tone.note_filters[0].output1, 0.0);
        assert_eq!(tone.note_filters[0].output2, 0.0);
        assert_eq!(tone.initial_filter_input, [0.0; 2]);
        assert_eq!(tone.envelopes.note_seconds, 0.0);
        assert!(tone.pitches.is_empty());
        assert!(tone.strings[0].delay_line.is_silent());
    }

    #[test]
    fn pool_grows_on_demand() {
        let mut pool = TonePool::with_capacity(0);
        let a = pool.checkout();
        let b = pool.checkout();
        pool.give_back(a);
        pool.give_back(b);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn filter_helper_maintains_input_history() {
        let mut tone = Tone::default();
        tone.note_filter_count = 1;
        tone.note_filters[0].load(&crate::dsp::filter::FilterCoefficients::through());

        let out = tone.apply_note_filters(0.5);
        assert!((out - 0.5).abs() < 1e-12);
        assert_eq!(tone.initial_filter_input, [0.5, 0.0]);

        tone.apply_note_filters(0.25);
        assert_eq!(tone.initial_filter_input, [0.25, 0.5]);
    }
}
