//! Ring modulation: multiply the signal by a free-running carrier.

use crate::dsp::ramp::Ramp;
use crate::song::instrument::LfoWaveform;

#[derive(Debug, Clone, Default)]
pub struct RingMod {
    carrier_phase: f64,
}

#[inline]
fn carrier_sample(waveform: LfoWaveform, phase: f64) -> f64 {
    match waveform {
        LfoWaveform::Sine => (phase * std::f64::consts::TAU).sin(),
        LfoWaveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs().min(0.5),
        LfoWaveform::Saw => 2.0 * phase - 1.0,
        LfoWaveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
    }
}

impl RingMod {
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        waveform: LfoWaveform,
        hz_start: f64,
        hz_end: f64,
        wet_start: f64,
        wet_end: f64,
        sample_rate: f64,
        buffer: &mut [f32],
    ) {
        let run = buffer.len();
        let mut delta = Ramp::over(hz_start / sample_rate, hz_end / sample_rate, run);
        let mut wet = Ramp::over(wet_start, wet_end, run);
        let mut phase = self.carrier_phase;
        for sample in buffer.iter_mut() {
            let carrier = carrier_sample(waveform, phase);
            phase += delta.next();
            phase -= phase.floor();
            let mix = wet.next().clamp(0.0, 1.0);
            let dry = *sample as f64;
            *sample = (dry + (dry * carrier - dry) * mix) as f32;
        }
        self.carrier_phase = phase;
    }

    pub fn reset(&mut self) {
        self.carrier_phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_wet_is_transparent() {
        let mut ring = RingMod::default();
        let mut buffer = vec![0.5f32; 64];
        ring.process(LfoWaveform::Sine, 440.0, 440.0, 0.0, 0.0, 48_000.0, &mut buffer);
        assert!(buffer.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn full_wet_dc_input_reproduces_the_carrier() {
        let mut ring = RingMod::default();
        let mut buffer = vec![1.0f32; 480];
        ring.process(LfoWaveform::Square, 100.0, 100.0, 1.0, 1.0, 48_000.0, &mut buffer);
        // 100 Hz square at 48 kHz: 240 samples high, 240 low.
        assert!((buffer[10] - 1.0).abs() < 1e-6);
        assert!((buffer[300] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn carrier_phase_persists_across_runs() {
        let mut ring = RingMod::default();
        let mut first = vec![1.0f32; 100];
        let mut second = vec![1.0f32; 100];
        ring.process(LfoWaveform::Saw, 120.0, 120.0, 1.0, 1.0, 48_000.0, &mut first);
        ring.process(LfoWaveform::Saw, 120.0, 120.0, 1.0, 1.0, 48_000.0, &mut second);
        // The saw keeps rising across the boundary rather than restarting.
        assert!(second[0] > first[99]);
    }
}
