/*
Effects pipeline
================

Per-instrument post-processing. The execution order is fixed:

  distortion -> bitcrusher -> ring mod -> phaser -> EQ -> panning ->
  chorus -> echo -> reverb

Everything before panning is mono; panning converts to stereo; the rest
is stereo. Rather than branching on the enable bitmask per sample (or
generating code for each combination), the instrument state keeps a small
plan: a vector of stage tags rebuilt only when the bitmask changes. The
render loop walks the plan and runs each stage as a tight loop over the
whole buffer.

Panning is always in the plan even when the panning effect is disabled:
it is where mono becomes stereo, so it must always run (with a centered
pan when disabled). EQ likewise runs whenever the instrument has EQ
filter points, independent of the note-effect bitmask.
*/

pub mod bitcrusher;
pub mod chorus;
pub mod distortion;
pub mod echo;
pub mod panning;
pub mod phaser;
pub mod reverb;
pub mod ringmod;

use crate::song::instrument::{EffectFlags, Instrument};

/// One step of an instrument's effect plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectStage {
    Distortion,
    Bitcrusher,
    RingMod,
    Phaser,
    Eq,
    Panning,
    Chorus,
    Echo,
    Reverb,
}

/// Build the ordered stage list for an instrument's current settings.
pub fn build_plan(instrument: &Instrument, plan: &mut Vec<EffectStage>) {
    plan.clear();
    let flags = instrument.effects;
    if flags.contains(EffectFlags::DISTORTION) {
        plan.push(EffectStage::Distortion);
    }
    if flags.contains(EffectFlags::BITCRUSHER) {
        plan.push(EffectStage::Bitcrusher);
    }
    if flags.contains(EffectFlags::RING_MOD) {
        plan.push(EffectStage::RingMod);
    }
    if flags.contains(EffectFlags::PHASER) {
        plan.push(EffectStage::Phaser);
    }
    if !instrument.eq_filter.points.is_empty() {
        plan.push(EffectStage::Eq);
    }
    plan.push(EffectStage::Panning);
    if flags.contains(EffectFlags::CHORUS) {
        plan.push(EffectStage::Chorus);
    }
    if flags.contains(EffectFlags::ECHO) {
        plan.push(EffectStage::Echo);
    }
    if flags.contains(EffectFlags::REVERB) {
        plan.push(EffectStage::Reverb);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_flags_still_produce_panning() {
        let instrument = Instrument::chip(0);
        let mut plan = Vec::new();
        build_plan(&instrument, &mut plan);
        assert_eq!(plan, vec![EffectStage::Panning]);
    }

    #[test]
    fn stages_come_out_in_pipeline_order() {
        let mut instrument = Instrument::chip(0);
        instrument.effects = EffectFlags::REVERB
            | EffectFlags::DISTORTION
            | EffectFlags::CHORUS
            | EffectFlags::BITCRUSHER;
        instrument.eq_filter = crate::song::instrument::FilterSettings::low_pass(30, 7);
        let mut plan = Vec::new();
        build_plan(&instrument, &mut plan);
        assert_eq!(
            plan,
            vec![
                EffectStage::Distortion,
                EffectStage::Bitcrusher,
                EffectStage::Eq,
                EffectStage::Panning,
                EffectStage::Chorus,
                EffectStage::Reverb,
            ]
        );
    }

    #[test]
    fn rebuilding_reuses_the_allocation() {
        let mut instrument = Instrument::chip(0);
        instrument.effects = EffectFlags::ECHO;
        let mut plan = Vec::with_capacity(9);
        build_plan(&instrument, &mut plan);
        let capacity = plan.capacity();
        instrument.effects = EffectFlags::NONE;
        build_plan(&instrument, &mut plan);
        assert_eq!(plan.capacity(), capacity);
    }
}
