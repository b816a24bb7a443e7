//! Per-channel state for the OPLL driver.

use kt_ir::FmParams;

use crate::macros::MacroRunner;

/// Envelope lifecycle of a voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Active,
    Releasing,
}

/// State of one FM channel.
#[derive(Clone, Debug)]
pub struct FmChannel {
    /// Final chip frequency after pitch adjustment.
    pub freq: i32,
    /// Logical frequency of the current note / arp / porta position.
    pub base_freq: i32,
    /// Effect pitch offset.
    pub pitch: i32,
    /// High byte of the last encoded frequency word.
    pub freq_h: u8,
    /// Low byte of the last encoded frequency word.
    pub freq_l: u8,
    pub note: i16,
    /// Instrument index on the song.
    pub ins: usize,
    pub ins_changed: bool,
    pub freq_changed: bool,
    pub key_on: bool,
    pub key_off: bool,
    pub in_porta: bool,
    pub porta_pause: bool,
    pub vol: i32,
    pub out_vol: i32,
    pub active: bool,
    /// Cached FM parameters, mutated by macros and effect commands.
    pub state: FmParams,
    /// Macro envelopes.
    pub std: MacroRunner,
}

impl Default for FmChannel {
    fn default() -> Self {
        Self {
            freq: 0,
            base_freq: 0,
            pitch: 0,
            freq_h: 0,
            freq_l: 0,
            note: 0,
            ins: 0,
            ins_changed: true,
            freq_changed: false,
            key_on: false,
            key_off: false,
            in_porta: false,
            porta_pause: false,
            vol: 15,
            out_vol: 15,
            active: false,
            state: FmParams::default(),
            std: MacroRunner::default(),
        }
    }
}

impl FmChannel {
    /// Where the voice sits in its envelope lifecycle. A released voice
    /// counts as releasing while any macro lane is still running.
    pub fn voice_state(&self) -> VoiceState {
        if self.active {
            VoiceState::Active
        } else if self.std.vol.has() || self.key_off {
            VoiceState::Releasing
        } else {
            VoiceState::Idle
        }
    }
}
