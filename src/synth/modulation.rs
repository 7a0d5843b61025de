//! Runtime parameter modulation.
//!
//! Hosts poke values in at any time from any thread context; the engine
//! applies them at the next tick boundary so every parameter change rides
//! the same per-tick interpolation as everything else and no change can
//! land mid-tick. `NextBar` is the one discrete target: it queues a jump
//! that takes effect when the current bar ends.

/// What a modulation value applies to. Channel-scoped targets address the
/// channel's currently playing instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModTarget {
    /// Beats per minute (clamped to the song's valid range).
    Tempo,
    /// Master gain before the limiter, 0..=1.
    MasterVolume,
    /// Jump to this bar when the current bar finishes.
    NextBar,
    /// Per-channel mix volume override, 0..=1.
    InstrumentVolume { channel: usize },
    /// Per-channel pan override, -1..=1.
    Pan { channel: usize },
    /// Per-channel reverb send override, 0..=1.
    Reverb { channel: usize },
    /// Per-channel distortion override, 0..=1.
    Distortion { channel: usize },
    /// Per-channel echo feedback override, 0..=1.
    EchoSustain { channel: usize },
}

/// Pending modulation values, drained at each tick boundary.
#[derive(Debug, Default)]
pub struct ModulationState {
    pending: Vec<(ModTarget, f64)>,
}

impl ModulationState {
    /// Queue a value. A second value for the same target in the same tick
    /// replaces the first.
    pub fn queue(&mut self, target: ModTarget, value: f64) {
        if let Some(entry) = self.pending.iter_mut().find(|(t, _)| *t == target) {
            entry.1 = value;
        } else {
            self.pending.push((target, value));
        }
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, (ModTarget, f64)> {
        self.pending.drain(..)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
