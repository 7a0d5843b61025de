//! Live note input over a wait-free ring buffer.
//!
//! A host (keyboard handler, MIDI thread) pushes messages through an
//! `rtrb` producer; the engine drains the consumer at each tick boundary
//! on the audio thread, so no locking ever happens on the render path.
//! Live tones play on the addressed channel's current instrument and
//! behave like ordinary tones, except no note drives them: they sustain
//! until the matching `NoteOff`.

/// Host-to-engine live input messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveMessage {
    NoteOn { channel: usize, pitch: i32 },
    NoteOff { channel: usize, pitch: i32 },
    /// Release every live tone on every channel.
    AllNotesOff,
}

/// Capacity of the live input ring. Far more than a burst of key events
/// between two ticks could ever need.
pub const LIVE_QUEUE_CAPACITY: usize = 256;

pub fn live_input_channel() -> (
    rtrb::Producer<LiveMessage>,
    rtrb::Consumer<LiveMessage>,
) {
    rtrb::RingBuffer::new(LIVE_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_cross_the_ring_in_order() {
        let (mut producer, mut consumer) = live_input_channel();
        producer
            .push(LiveMessage::NoteOn {
                channel: 0,
                pitch: 60,
            })
            .unwrap();
        producer
            .push(LiveMessage::NoteOff {
                channel: 0,
                pitch: 60,
            })
            .unwrap();

        assert_eq!(
            consumer.pop().unwrap(),
            LiveMessage::NoteOn {
                channel: 0,
                pitch: 60
            }
        );
        assert_eq!(
            consumer.pop().unwrap(),
            LiveMessage::NoteOff {
                channel: 0,
                pitch: 60
            }
        );
        assert!(consumer.pop().is_err());
    }
}
