//! Chip driver core for the kilotone tracker.
//!
//! Translates high-level channel commands (note on/off, portamento,
//! instrument changes, macro envelopes, drum mode) into a coalesced stream
//! of register writes for an external sound-chip emulator, gated by the
//! chip's busy-cycle budget.

mod channel;
mod chip;
mod macros;
mod opll;
pub mod tuning;

pub use channel::{FmChannel, VoiceState};
pub use chip::{
    ChipCommand, LinearPitch, OpllEmulator, OpllVariant, PitchCalc, QueuedWrite, RegWrite,
};
pub use macros::{MacroLane, MacroRunner, OpMacroLanes};
pub use opll::{OpllDriver, CHANNELS, CYCLE_CHANNEL_MAP};
