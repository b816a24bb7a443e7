//! Partial-update records for instruments.
//!
//! An editor transmits only the leaves it changed; each record mirrors its
//! target struct with every scalar wrapped in an `Option` and nested structs
//! as nested partials. The operator array is keyed by index on the wire.
//! `apply` reports whether the target actually changed, so callers can skip
//! undo entries for no-op updates.

use serde::{Deserialize, Serialize};

use crate::instrument::{FmOperator, FmParams, Instrument, InstrumentMacros, MacroSource};

/// Set `target` from `src` if present; returns true when the value changed.
fn set_field<T: PartialEq + Clone>(target: &mut T, src: &Option<T>) -> bool {
    match src {
        Some(v) if target != v => {
            *target = v.clone();
            true
        }
        _ => false,
    }
}

/// Partial update for one FM operator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FmOperatorUpdate {
    pub am: Option<u8>,
    pub ar: Option<u8>,
    pub dr: Option<u8>,
    pub mult: Option<u8>,
    pub rr: Option<u8>,
    pub sl: Option<u8>,
    pub tl: Option<u8>,
    pub ssg_env: Option<u8>,
    pub ksl: Option<u8>,
    pub ksr: Option<u8>,
    pub vib: Option<u8>,
}

impl FmOperatorUpdate {
    pub fn apply(&self, op: &mut FmOperator) -> bool {
        let mut changed = false;
        changed |= set_field(&mut op.am, &self.am);
        changed |= set_field(&mut op.ar, &self.ar);
        changed |= set_field(&mut op.dr, &self.dr);
        changed |= set_field(&mut op.mult, &self.mult);
        changed |= set_field(&mut op.rr, &self.rr);
        changed |= set_field(&mut op.sl, &self.sl);
        changed |= set_field(&mut op.tl, &self.tl);
        changed |= set_field(&mut op.ssg_env, &self.ssg_env);
        changed |= set_field(&mut op.ksl, &self.ksl);
        changed |= set_field(&mut op.ksr, &self.ksr);
        changed |= set_field(&mut op.vib, &self.vib);
        changed
    }
}

/// An operator partial tagged with the operator it targets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperatorUpdate {
    pub index: u8,
    pub op: FmOperatorUpdate,
}

/// Partial update for the FM parameter block.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FmParamsUpdate {
    pub preset: Option<u8>,
    pub alg: Option<u8>,
    pub fb: Option<u8>,
    pub fms: Option<u8>,
    pub ams: Option<u8>,
    pub fixed_drums: Option<bool>,
    pub kick_freq: Option<u16>,
    pub snare_hat_freq: Option<u16>,
    pub tom_top_freq: Option<u16>,
    #[serde(default)]
    pub ops: Vec<OperatorUpdate>,
}

impl FmParamsUpdate {
    pub fn apply(&self, fm: &mut FmParams) -> bool {
        let mut changed = false;
        changed |= set_field(&mut fm.preset, &self.preset);
        changed |= set_field(&mut fm.alg, &self.alg);
        changed |= set_field(&mut fm.fb, &self.fb);
        changed |= set_field(&mut fm.fms, &self.fms);
        changed |= set_field(&mut fm.ams, &self.ams);
        changed |= set_field(&mut fm.fixed_drums, &self.fixed_drums);
        changed |= set_field(&mut fm.kick_freq, &self.kick_freq);
        changed |= set_field(&mut fm.snare_hat_freq, &self.snare_hat_freq);
        changed |= set_field(&mut fm.tom_top_freq, &self.tom_top_freq);
        for entry in &self.ops {
            match fm.ops.get_mut(entry.index as usize) {
                Some(op) => changed |= entry.op.apply(op),
                None => log::warn!("operator update targets operator {} of 2", entry.index),
            }
        }
        changed
    }
}

/// Partial update for macro lanes. Lanes replace whole.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MacrosUpdate {
    pub vol: Option<MacroSource>,
    pub arp: Option<MacroSource>,
    pub arp_absolute: Option<bool>,
    pub alg: Option<MacroSource>,
    pub fb: Option<MacroSource>,
    pub fms: Option<MacroSource>,
    pub ams: Option<MacroSource>,
}

impl MacrosUpdate {
    pub fn apply(&self, macros: &mut InstrumentMacros) -> bool {
        let mut changed = false;
        changed |= set_field(&mut macros.vol, &self.vol);
        changed |= set_field(&mut macros.arp, &self.arp);
        changed |= set_field(&mut macros.arp_absolute, &self.arp_absolute);
        changed |= set_field(&mut macros.alg, &self.alg);
        changed |= set_field(&mut macros.fb, &self.fb);
        changed |= set_field(&mut macros.fms, &self.fms);
        changed |= set_field(&mut macros.ams, &self.ams);
        changed
    }
}

/// Partial update for a whole instrument.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentUpdate {
    pub name: Option<String>,
    pub fm: Option<FmParamsUpdate>,
    pub macros: Option<MacrosUpdate>,
}

impl InstrumentUpdate {
    pub fn apply(&self, ins: &mut Instrument) -> bool {
        let mut changed = false;
        if let Some(name) = &self.name {
            if ins.name.as_str() != name {
                ins.name.clear();
                let _ = ins.name.try_push_str(name);
                changed = true;
            }
        }
        if let Some(fm) = &self.fm {
            changed |= fm.apply(&mut ins.fm);
        }
        if let Some(macros) = &self.macros {
            changed |= macros.apply(&mut ins.macros);
        }
        changed
    }
}
