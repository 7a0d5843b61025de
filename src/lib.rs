pub mod dsp;
pub mod effects; // Per-instrument post-processing pipeline
pub mod kernels; // Oscillator render kernels, one per instrument family
pub mod song; // Composition data model (read-only engine input)
pub mod synth; // Tones, runtime state, and the tick scheduler

pub use song::Song;
pub use synth::Synth;

/// Largest number of frames one render call is expected to request.
/// Scratch buffers are sized for this up front so the render path never
/// allocates.
pub const MAX_BLOCK_SIZE: usize = 2048;

/// Parts per beat: the resolution of note start/end times and pins.
pub const PARTS_PER_BEAT: u32 = 24;

/// Ticks per part: a tick is the finest unit at which envelopes, filters,
/// and modulation are re-evaluated.
pub const TICKS_PER_PART: u32 = 2;

pub const TICKS_PER_BEAT: u32 = PARTS_PER_BEAT * TICKS_PER_PART;
