//! Per-channel runtime state.
//!
//! A channel plays one pattern at a time, and each pattern names one of
//! the channel's instruments, but every instrument keeps its own state so
//! echo and reverb tails survive a pattern switching instruments mid-song.
//! Seamless transitions (continue/slide) only apply when consecutive notes
//! run on the same instrument; a pattern change to a different instrument
//! always releases the previous instrument's tones.

use crate::synth::instrument_state::InstrumentState;

pub struct ChannelState {
    pub instruments: Vec<InstrumentState>,
    /// Instrument index that most recently scheduled tones, for the
    /// same-instrument seamless rule.
    pub last_instrument: Option<usize>,
}

impl ChannelState {
    pub fn new(instrument_count: usize) -> Self {
        Self {
            instruments: (0..instrument_count.max(1))
                .map(|_| InstrumentState::new())
                .collect(),
            last_instrument: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_state_per_instrument() {
        let channel = ChannelState::new(3);
        assert_eq!(channel.instruments.len(), 3);
        assert!(channel.last_instrument.is_none());
    }

    #[test]
    fn empty_channel_still_gets_a_state() {
        let channel = ChannelState::new(0);
        assert_eq!(channel.instruments.len(), 1);
    }
}
