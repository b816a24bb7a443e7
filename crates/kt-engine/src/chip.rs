//! Chip driver boundary types: emulator trait, command stream, register
//! write bookkeeping.

/// Variant selector passed to the emulator core on reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpllVariant {
    /// Stock YM2413
    #[default]
    Ym2413,
    /// YMF281 patch set
    Ymf281,
    /// YM2423 patch set
    Ym2423,
    /// VRC7 (DS1001)
    Ds1001,
}

/// The third-party emulator core the driver feeds.
///
/// `write` is split into an address phase (port 0) and a value phase
/// (port 1); the driver enforces the chip's minimum busy-cycle spacing
/// between phases. `clock` advances one internal cycle and accumulates the
/// current output into `out`; `cycles` exposes the internal cycle counter
/// used to map a cycle to its channel.
pub trait OpllEmulator {
    fn reset(&mut self, variant: OpllVariant);
    fn write(&mut self, port: u8, value: u8);
    fn clock(&mut self, out: &mut [i32; 2]);
    fn cycles(&self) -> usize;
}

/// Pitch adjustment capability supplied by the playback engine.
///
/// `base` is a logical frequency, `pitch` a signed effect offset, and
/// `octave_mul` the F-number granularity at that pitch
/// ([`crate::tuning::octave`]); the default scales the offset so one unit of
/// pitch moves the same musical distance in every block.
pub trait PitchCalc {
    fn calc_freq(&self, base: i32, pitch: i32, octave_mul: i32) -> i32;
}

/// Linear pitch: `base + pitch * octave_mul / 4`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinearPitch;

impl PitchCalc for LinearPitch {
    fn calc_freq(&self, base: i32, pitch: i32, octave_mul: i32) -> i32 {
        base + pitch * octave_mul / 4
    }
}

/// A register write queued for the emulator, performed in two phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueuedWrite {
    pub addr: u16,
    pub val: u8,
    /// False while the address phase is pending, true once it has been
    /// issued and the value phase is next.
    pub addr_or_val: bool,
}

impl QueuedWrite {
    pub fn new(addr: u16, val: u8) -> Self {
        Self {
            addr,
            val,
            addr_or_val: false,
        }
    }
}

/// A completed register write, teed to the dump log when enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegWrite {
    pub addr: u32,
    pub val: u16,
}

/// High-level channel intents consumed by [`crate::OpllDriver::dispatch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChipCommand {
    /// Key a note on. `None` retriggers the current note.
    NoteOn { chan: usize, note: Option<i16> },
    /// Key the note off.
    NoteOff { chan: usize },
    /// Key off and release macro envelopes.
    NoteOffEnv { chan: usize },
    /// Release macro envelopes without a key edge.
    EnvRelease { chan: usize },
    /// Set channel volume (0-15).
    Volume { chan: usize, vol: i32 },
    /// Query channel volume; dispatch returns it.
    GetVolume { chan: usize },
    /// Query the maximum volume; dispatch returns it.
    GetVolMax,
    /// Select an instrument; `force` re-uploads even if unchanged.
    Instrument { chan: usize, ins: usize, force: bool },
    /// Set the effect pitch offset.
    Pitch { chan: usize, pitch: i32 },
    /// Slide toward `target`; dispatch returns 2 on arrival, 1 otherwise.
    NotePorta { chan: usize, speed: i32, target: i16 },
    /// Change note without retriggering.
    Legato { chan: usize, note: i16 },
    /// Set modulator feedback.
    Feedback { chan: usize, fb: u8 },
    /// Set an operator's frequency multiplier.
    OpMult { chan: usize, op: usize, mult: u8 },
    /// Set an operator's total level.
    OpTl { chan: usize, op: usize, tl: u8 },
    /// Set attack rate; `op` of `None` targets both operators.
    OpAr { chan: usize, op: Option<usize>, ar: u8 },
    /// Toggle extended (proper) drum mode.
    ExtendedDrums { enable: bool },
    /// Mark the start/end of a portamento so arp macros leave the base
    /// frequency alone.
    PrePorta { chan: usize, porta: bool },
    /// Sequencer pre-note hook; no effect on this chip.
    PreNote { chan: usize },
}
