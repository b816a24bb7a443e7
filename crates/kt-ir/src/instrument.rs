//! Instrument definitions for the OPLL chip family.

use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};

/// One FM operator (modulator or carrier).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FmOperator {
    /// Amplitude modulation enable (0-1)
    pub am: u8,
    /// Attack rate (0-15)
    pub ar: u8,
    /// Decay rate (0-15)
    pub dr: u8,
    /// Frequency multiplier (0-15)
    pub mult: u8,
    /// Release rate (0-15)
    pub rr: u8,
    /// Sustain level (0-15)
    pub sl: u8,
    /// Total level (0-63 for the modulator, 0-15 for the carrier)
    pub tl: u8,
    /// Envelope type / sustain bit (bit 3 set = sustained tone)
    pub ssg_env: u8,
    /// Key scale level (0-3)
    pub ksl: u8,
    /// Key scale rate (0-1)
    pub ksr: u8,
    /// Vibrato enable (0-1)
    pub vib: u8,
}

/// FM parameters for one instrument.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FmParams {
    /// Built-in patch number; 0 = custom patch, 16 = compatibility drums.
    pub preset: u8,
    /// Sustain/algorithm bit mixed into the key-on register.
    pub alg: u8,
    /// Modulator feedback (0-7)
    pub fb: u8,
    /// Frequency (pitch) modulation sensitivity
    pub fms: u8,
    /// Amplitude modulation sensitivity
    pub ams: u8,
    /// Use the fixed drum frequencies below in drum mode.
    pub fixed_drums: bool,
    /// Kick channel frequency word (block<<9 | fnum)
    pub kick_freq: u16,
    /// Snare/hi-hat channel frequency word
    pub snare_hat_freq: u16,
    /// Tom/top channel frequency word
    pub tom_top_freq: u16,
    /// Modulator and carrier.
    pub ops: [FmOperator; 2],
}

/// A per-tick stream of parameter values driven by the sequencer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroSource {
    /// Values emitted one per tick.
    pub values: Vec<i32>,
    /// Index to jump back to after the last value.
    pub loop_pos: Option<u8>,
    /// Index the macro holds at until the note is released.
    pub release_pos: Option<u8>,
}

impl MacroSource {
    /// A macro that emits `values` once and ends.
    pub fn once(values: &[i32]) -> Self {
        Self {
            values: values.to_vec(),
            loop_pos: None,
            release_pos: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Macro lanes for one operator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorMacros {
    pub am: MacroSource,
    pub ar: MacroSource,
    pub dr: MacroSource,
    pub mult: MacroSource,
    pub rr: MacroSource,
    pub sl: MacroSource,
    pub tl: MacroSource,
    pub egt: MacroSource,
    pub ksl: MacroSource,
    pub ksr: MacroSource,
    pub vib: MacroSource,
}

/// All macro lanes of an instrument.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentMacros {
    pub vol: MacroSource,
    pub arp: MacroSource,
    /// Arpeggio values are absolute notes rather than offsets from the
    /// played note.
    pub arp_absolute: bool,
    pub alg: MacroSource,
    pub fb: MacroSource,
    pub fms: MacroSource,
    pub ams: MacroSource,
    pub ops: [OperatorMacros; 2],
}

/// An instrument definition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: ArrayString<32>,
    pub fm: FmParams,
    pub macros: InstrumentMacros,
}

impl Instrument {
    pub fn new(name: &str) -> Self {
        let mut ins = Self::default();
        let _ = ins.name.try_push_str(name);
        ins
    }
}
