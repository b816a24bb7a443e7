//! OPLL-family chip driver.
//!
//! Translates the high-level channel command stream into a coalesced,
//! busy-cycle-gated stream of register writes for the emulator core. One
//! driver instance per chip; 9 tonal channels plus 2 extra logical channels
//! used by the extended drum mode.

use std::collections::VecDeque;

use kt_ir::{FmOperator, Instrument};

use crate::channel::FmChannel;
use crate::chip::{ChipCommand, OpllEmulator, OpllVariant, PitchCalc, QueuedWrite, RegWrite};
use crate::tuning::{encode_freq, note_freq, octave, FREQ_MAX};

/// Number of logical channels (9 tonal + 2 drum-mode extras).
pub const CHANNELS: usize = 11;

/// Maps the emulator's internal cycle counter to the channel producing
/// output on that cycle.
pub const CYCLE_CHANNEL_MAP: [u8; 18] = [8, 7, 6, 7, 8, 7, 8, 6, 0, 1, 2, 7, 8, 9, 3, 4, 5, 9];

/// Tonal-register slot used by each drum-mode channel.
const DRUM_SLOT: [u8; CHANNELS] = [0, 0, 0, 0, 0, 0, 6, 7, 8, 8, 7];

/// Busy cycles after the address phase of a write.
const ADDR_DELAY: i32 = 3;
/// Busy cycles after the value phase of a write.
const VALUE_DELAY: i32 = 21;

/// Emulator clocks per output sample for this chip family.
const CLOCKS_PER_SAMPLE: usize = 9;

/// Output scale applied to the summed per-cycle output.
const OUTPUT_SCALE: i32 = 50;

pub struct OpllDriver<E: OpllEmulator> {
    emu: E,
    variant: OpllVariant,
    chan: [FmChannel; CHANNELS],
    is_muted: [bool; CHANNELS],
    /// Register shadow of values wanted by the current tick; -1 = unset.
    pending_writes: [i16; 256],
    /// Register shadow of values last sent; -1 = unset.
    old_writes: [i16; 256],
    /// Values actually latched into the emulator.
    reg_pool: [u8; 256],
    writes: VecDeque<QueuedWrite>,
    delay: i32,
    drum_state: u8,
    drum_vol: [u8; 5],
    /// Compatibility drum mode (entered through preset 16).
    drums: bool,
    /// Extended drum mode (channels 9-10 live).
    proper_drums: bool,
    /// Whether this chip flavour supports extended drums at all.
    proper_drums_sys: bool,
    skip_register_writes: bool,
    dump_writes: bool,
    dump: Vec<RegWrite>,
    /// Channel whose custom patch currently occupies the chip's single
    /// user-patch memory; -1 when none.
    last_custom_memory: i32,
}

impl<E: OpllEmulator> OpllDriver<E> {
    pub fn new(emu: E, variant: OpllVariant) -> Self {
        let mut driver = Self {
            emu,
            variant,
            chan: std::array::from_fn(|_| FmChannel::default()),
            is_muted: [false; CHANNELS],
            pending_writes: [-1; 256],
            old_writes: [-1; 256],
            reg_pool: [0; 256],
            writes: VecDeque::new(),
            delay: 0,
            drum_state: 0,
            drum_vol: [0; 5],
            drums: false,
            proper_drums: false,
            proper_drums_sys: false,
            skip_register_writes: false,
            dump_writes: false,
            dump: Vec::new(),
            last_custom_memory: -1,
        };
        driver.reset();
        driver
    }

    /// Enable the extended drum system for this chip flavour.
    pub fn set_proper_drums(&mut self, enabled: bool) {
        self.proper_drums = enabled;
        self.proper_drums_sys = enabled;
    }

    pub fn set_skip_register_writes(&mut self, skip: bool) {
        self.skip_register_writes = skip;
    }

    pub fn set_dump_writes(&mut self, dump: bool) {
        self.dump_writes = dump;
    }

    /// Drain the register-write dump log.
    pub fn take_dump(&mut self) -> Vec<RegWrite> {
        std::mem::take(&mut self.dump)
    }

    pub fn mute_channel(&mut self, chan: usize, mute: bool) {
        if chan < CHANNELS {
            self.is_muted[chan] = mute;
        }
    }

    pub fn channel(&self, chan: usize) -> &FmChannel {
        &self.chan[chan]
    }

    pub fn register_pool(&self) -> &[u8; 256] {
        &self.reg_pool
    }

    pub fn emulator(&self) -> &E {
        &self.emu
    }

    /// Writes still waiting for the emulator.
    pub fn queued_writes(&self) -> usize {
        self.writes.len()
    }

    fn r_write(&mut self, addr: usize, val: u8) {
        if !self.skip_register_writes {
            self.pending_writes[addr] = val as i16;
        }
    }

    fn imm_write(&mut self, addr: u16, val: u8) {
        if self.skip_register_writes {
            return;
        }
        self.writes.push_back(QueuedWrite::new(addr, val));
        if self.dump_writes {
            self.dump.push(RegWrite {
                addr: addr as u32,
                val: val as u16,
            });
        }
    }

    /// Drum bitfield bit for a compatibility-mode note: kick, snare, tom,
    /// top, hi-hat; notes past the fifth slot select nothing.
    fn drum_bit(note: i16) -> u8 {
        0x10u8.checked_shr(note.rem_euclid(12) as u32).unwrap_or(0)
    }

    fn op_reg(op: &FmOperator) -> u8 {
        (op.am << 7) | (op.vib << 6) | ((op.ssg_env & 8) << 2) | (op.ksr << 4) | op.mult
    }

    fn mod_level_reg(&self, ch: usize) -> u8 {
        let op = &self.chan[ch].state.ops[0];
        (op.ksl << 6) | (op.tl & 63)
    }

    fn car_misc_reg(&self, ch: usize) -> u8 {
        let state = &self.chan[ch].state;
        (state.ops[1].ksl << 6) | ((state.fms & 1) << 4) | ((state.ams & 1) << 3) | state.fb
    }

    fn vol_reg(&self, ch: usize) -> u8 {
        let c = &self.chan[ch];
        let car_tl = c.state.ops[1].tl as i32;
        (((15 - c.out_vol * (15 - car_tl) / 15) & 15) as u8) | (c.state.preset << 4)
    }

    fn drum_level(&self, ch: usize) -> u8 {
        let c = &self.chan[ch];
        let car_tl = c.state.ops[1].tl as i32;
        ((15 - c.out_vol * (15 - car_tl) / 15) & 15) as u8
    }

    fn write_drum_volumes(&mut self) {
        let v = self.drum_vol;
        self.r_write(0x36, v[0]);
        self.r_write(0x37, v[1] | (v[4] << 4));
        self.r_write(0x38, v[3] | (v[2] << 4));
    }

    /// Upload the channel's custom patch into the chip's user-patch memory.
    fn write_custom_patch(&mut self, ch: usize) {
        let state = self.chan[ch].state.clone();
        let mod_ = &state.ops[0];
        let car = &state.ops[1];
        self.r_write(0x00, Self::op_reg(mod_));
        self.r_write(0x01, Self::op_reg(car));
        self.r_write(0x02, (mod_.ksl << 6) | (mod_.tl & 63));
        self.r_write(
            0x03,
            (car.ksl << 6) | ((state.fms & 1) << 4) | ((state.ams & 1) << 3) | state.fb,
        );
        self.r_write(0x04, (mod_.ar << 4) | mod_.dr);
        self.r_write(0x05, (car.ar << 4) | car.dr);
        self.r_write(0x06, (mod_.sl << 4) | mod_.rr);
        self.r_write(0x07, (car.sl << 4) | car.rr);
    }

    /// Setup writes for the compatibility drum mode.
    fn write_compat_drum_setup(&mut self) {
        self.imm_write(0x16, 0x20);
        self.imm_write(0x26, 0x05);
        self.imm_write(0x16, 0x20);
        self.imm_write(0x26, 0x05);
        self.imm_write(0x17, 0x50);
        self.imm_write(0x27, 0x05);
        self.imm_write(0x17, 0x50);
        self.imm_write(0x27, 0x05);
        self.imm_write(0x18, 0xc0);
        self.imm_write(0x28, 0x01);
    }

    /// Render `buf.len()` output samples, feeding queued register writes to
    /// the emulator under the busy-cycle budget.
    pub fn acquire(&mut self, buf: &mut [i16]) {
        for sample in buf.iter_mut() {
            let mut os = 0i32;
            for _ in 0..CLOCKS_PER_SAMPLE {
                if !self.writes.is_empty() {
                    self.delay -= 1;
                    if self.delay < 0 {
                        let w = self.writes.front_mut().expect("non-empty queue");
                        if w.addr_or_val {
                            let (addr, val) = (w.addr, w.val);
                            self.emu.write(1, val);
                            self.reg_pool[(addr & 0xff) as usize] = val;
                            self.writes.pop_front();
                            self.delay = VALUE_DELAY;
                        } else {
                            let addr = w.addr as u8;
                            w.addr_or_val = true;
                            self.emu.write(0, addr);
                            self.delay = ADDR_DELAY;
                        }
                    }
                }

                let mut o = [0i32; 2];
                self.emu.clock(&mut o);
                let next_out = CYCLE_CHANNEL_MAP[self.emu.cycles() % CYCLE_CHANNEL_MAP.len()] as usize;
                if (next_out >= 6 && self.proper_drums) || !self.is_muted[next_out] {
                    os += o[0] + o[1];
                }
            }
            os *= OUTPUT_SCALE;
            *sample = os.clamp(-32768, 32767) as i16;
        }
    }

    /// Advance one tracker tick: run macros, consume key edges, flush the
    /// register shadow, and re-encode changed frequencies.
    pub fn tick(&mut self, calc: &dyn PitchCalc) {
        for i in 0..CHANNELS {
            self.chan[i].std.next();

            if self.chan[i].std.vol.had {
                let macro_vol = self.chan[i].std.vol.val.min(15);
                self.chan[i].out_vol = self.chan[i].vol * macro_vol / 15;
                if i < 9 {
                    let reg = self.vol_reg(i);
                    self.r_write(0x30 + i, reg);
                }
            }

            if self.chan[i].std.arp.had {
                if !self.chan[i].in_porta {
                    let arp = self.chan[i].std.arp.val;
                    self.chan[i].base_freq = if self.chan[i].std.arp_absolute {
                        note_freq(arp as i16)
                    } else {
                        note_freq(self.chan[i].note + arp as i16)
                    };
                }
                self.chan[i].freq_changed = true;
            } else if self.chan[i].std.arp_absolute && self.chan[i].std.arp.finished {
                self.chan[i].base_freq = note_freq(self.chan[i].note);
                self.chan[i].freq_changed = true;
            }

            if self.chan[i].state.preset == 0 {
                if self.chan[i].std.alg.had {
                    self.chan[i].state.alg = self.chan[i].std.alg.val as u8;
                    self.chan[i].freq_changed = true;
                }
                if self.chan[i].std.fb.had {
                    self.chan[i].state.fb = (self.chan[i].std.fb.val & 7) as u8;
                    let reg = self.car_misc_reg(i);
                    self.r_write(0x03, reg);
                }
                if self.chan[i].std.fms.had {
                    self.chan[i].state.fms = (self.chan[i].std.fms.val & 1) as u8;
                    let reg = self.car_misc_reg(i);
                    self.r_write(0x03, reg);
                }
                if self.chan[i].std.ams.had {
                    self.chan[i].state.ams = (self.chan[i].std.ams.val & 1) as u8;
                    let reg = self.car_misc_reg(i);
                    self.r_write(0x03, reg);
                }

                for j in 0..2 {
                    self.tick_op_macros(i, j);
                }
            }

            if self.chan[i].key_on || self.chan[i].key_off {
                if i >= 6 && self.proper_drums {
                    self.drum_state &= !(0x10 >> (i - 6));
                    let state = self.drum_state;
                    self.imm_write(0x0e, 0x20 | state);
                } else if i >= 6 && self.drums {
                    self.drum_state &= !Self::drum_bit(self.chan[i].note);
                    let state = self.drum_state;
                    self.imm_write(0x0e, 0x20 | state);
                } else if i < 9 {
                    let val = self.chan[i].freq_h | if self.chan[i].state.alg != 0 { 0x20 } else { 0 };
                    self.imm_write(0x20 + i as u16, val);
                }
                self.chan[i].key_off = false;
            }
        }

        for i in 0..256 {
            if self.pending_writes[i] != self.old_writes[i] {
                self.imm_write(i as u16, (self.pending_writes[i] & 0xff) as u8);
                self.old_writes[i] = self.pending_writes[i];
            }
        }

        for i in 0..CHANNELS {
            if self.chan[i].freq_changed {
                let base = self.chan[i].base_freq;
                let mut freq = calc.calc_freq(base, self.chan[i].pitch, octave(base));
                if freq > FREQ_MAX {
                    freq = FREQ_MAX;
                }
                self.chan[i].freq = freq;
                let word = encode_freq(freq);
                self.chan[i].freq_l = (word & 0xff) as u8;
                if i >= 6 && self.proper_drums {
                    let slot = DRUM_SLOT[i] as u16;
                    self.imm_write(0x10 + slot, (word & 0xff) as u8);
                    self.imm_write(0x20 + slot, (word >> 8) as u8);
                } else if (i < 6 || !self.drums) && i < 9 {
                    self.imm_write(0x10 + i as u16, (word & 0xff) as u8);
                }
                self.chan[i].freq_h = (word >> 8) as u8;
            }

            if self.chan[i].key_on && i >= 6 && self.proper_drums {
                if !self.is_muted[i] {
                    self.drum_state |= 0x10 >> (i - 6);
                    let state = self.drum_state;
                    self.imm_write(0x0e, 0x20 | state);
                }
                self.chan[i].key_on = false;
            } else if self.chan[i].key_on && i >= 6 && self.drums {
                self.drum_state |= Self::drum_bit(self.chan[i].note);
                let state = self.drum_state;
                self.imm_write(0x0e, 0x20 | state);
                self.chan[i].key_on = false;
            } else if (self.chan[i].key_on || self.chan[i].freq_changed) && i < 9 {
                if !(i >= 6 && self.proper_drums) {
                    let val = self.chan[i].freq_h
                        | if self.chan[i].active { 0x10 } else { 0 }
                        | if self.chan[i].state.alg != 0 { 0x20 } else { 0 };
                    self.imm_write(0x20 + i as u16, val);
                }
                self.chan[i].key_on = false;
            }
            self.chan[i].freq_changed = false;
        }
    }

    fn tick_op_macros(&mut self, i: usize, j: usize) {
        let lanes = self.chan[i].std.ops[j].clone();

        if lanes.am.had {
            self.chan[i].state.ops[j].am = (lanes.am.val & 1) as u8;
            let reg = Self::op_reg(&self.chan[i].state.ops[j]);
            self.r_write(j, reg);
        }
        if lanes.ar.had {
            self.chan[i].state.ops[j].ar = (lanes.ar.val & 15) as u8;
            let op = self.chan[i].state.ops[j];
            self.r_write(0x04 + j, (op.ar << 4) | op.dr);
        }
        if lanes.dr.had {
            self.chan[i].state.ops[j].dr = (lanes.dr.val & 15) as u8;
            let op = self.chan[i].state.ops[j];
            self.r_write(0x04 + j, (op.ar << 4) | op.dr);
        }
        if lanes.mult.had {
            self.chan[i].state.ops[j].mult = (lanes.mult.val & 15) as u8;
            let reg = Self::op_reg(&self.chan[i].state.ops[j]);
            self.r_write(j, reg);
        }
        if lanes.rr.had {
            self.chan[i].state.ops[j].rr = (lanes.rr.val & 15) as u8;
            let op = self.chan[i].state.ops[j];
            self.r_write(0x06 + j, (op.sl << 4) | op.rr);
        }
        if lanes.sl.had {
            self.chan[i].state.ops[j].sl = (lanes.sl.val & 15) as u8;
            let op = self.chan[i].state.ops[j];
            self.r_write(0x06 + j, (op.sl << 4) | op.rr);
        }
        if lanes.tl.had {
            let ceiling: u8 = if j == 1 { 15 } else { 63 };
            self.chan[i].state.ops[j].tl = ceiling - lanes.tl.val.clamp(0, ceiling as i32) as u8;
            if j == 1 {
                if i < 9 {
                    let reg = self.vol_reg(i);
                    self.r_write(0x30 + i, reg);
                }
            } else {
                let reg = self.mod_level_reg(i);
                self.r_write(0x02, reg);
            }
        }
        if lanes.egt.had {
            self.chan[i].state.ops[j].ssg_env = if lanes.egt.val & 1 != 0 { 8 } else { 0 };
            let reg = Self::op_reg(&self.chan[i].state.ops[j]);
            self.r_write(j, reg);
        }
        if lanes.ksl.had {
            self.chan[i].state.ops[j].ksl = (lanes.ksl.val & 3) as u8;
            if j == 1 {
                let reg = self.car_misc_reg(i);
                self.r_write(0x03, reg);
            } else {
                let reg = self.mod_level_reg(i);
                self.r_write(0x02, reg);
            }
        }
        if lanes.ksr.had {
            self.chan[i].state.ops[j].ksr = (lanes.ksr.val & 1) as u8;
            let reg = Self::op_reg(&self.chan[i].state.ops[j]);
            self.r_write(j, reg);
        }
        if lanes.vib.had {
            self.chan[i].state.ops[j].vib = (lanes.vib.val & 1) as u8;
            let reg = Self::op_reg(&self.chan[i].state.ops[j]);
            self.r_write(j, reg);
        }
    }

    /// Apply one channel command. Returns 0 for commands aimed past the
    /// chip's live channels, 2 when a portamento reached its target, the
    /// queried value for getters, and 1 otherwise.
    pub fn dispatch(&mut self, c: ChipCommand, instruments: &[Instrument]) -> i32 {
        match c {
            ChipCommand::NoteOn { chan, note } => {
                if chan >= 9 && !self.proper_drums {
                    return 0;
                }
                let ins = instruments
                    .get(self.chan[chan].ins)
                    .cloned()
                    .unwrap_or_else(Instrument::default);
                if self.chan[chan].ins_changed {
                    self.chan[chan].state = ins.fm.clone();
                }

                self.chan[chan].std.init(&ins);
                if !self.chan[chan].std.vol.will() {
                    self.chan[chan].out_vol = self.chan[chan].vol;
                }

                if chan >= 6 && self.proper_drums {
                    self.chan[chan].ins_changed = false;
                    if let Some(n) = note {
                        let base = {
                            let state = &self.chan[chan].state;
                            if state.preset == 16 && state.fixed_drums {
                                let word = match chan {
                                    6 => state.kick_freq,
                                    7 | 10 => state.snare_hat_freq,
                                    _ => state.tom_top_freq,
                                };
                                ((word & 511) as i32) << ((word >> 9) & 7)
                            } else {
                                note_freq(n)
                            }
                        };
                        self.chan[chan].base_freq = base;
                        self.chan[chan].note = n;
                        self.chan[chan].freq_changed = true;
                    }
                    self.chan[chan].key_on = true;
                    self.chan[chan].active = true;
                    return 1;
                }

                if self.chan[chan].ins_changed {
                    if self.chan[chan].state.preset == 0 {
                        self.write_custom_patch(chan);
                        self.last_custom_memory = chan as i32;
                    }
                    if self.chan[chan].state.preset == 16 {
                        if chan >= 6 {
                            self.drums = true;
                            self.write_compat_drum_setup();
                        }
                    } else {
                        if chan >= 6 && self.drums {
                            self.drums = false;
                            self.imm_write(0x0e, 0);
                        }
                        if chan < 9 {
                            let reg = self.vol_reg(chan);
                            self.r_write(0x30 + chan, reg);
                        }
                    }
                }

                self.chan[chan].ins_changed = false;

                if let Some(n) = note {
                    self.chan[chan].base_freq = note_freq(n);
                    self.chan[chan].note = n;

                    if chan >= 6 && self.drums {
                        let slot = (self.chan[chan].note.rem_euclid(12) as usize).min(4);
                        self.drum_vol[slot] = self.drum_level(chan);
                        self.write_drum_volumes();
                    }
                    self.chan[chan].freq_changed = true;
                }
                self.chan[chan].key_on = true;
                self.chan[chan].active = true;
                1
            }
            ChipCommand::NoteOff { chan } => {
                if chan >= 9 && !self.proper_drums {
                    return 0;
                }
                self.chan[chan].key_off = true;
                self.chan[chan].key_on = false;
                self.chan[chan].active = false;
                1
            }
            ChipCommand::NoteOffEnv { chan } => {
                if chan >= 9 && !self.proper_drums {
                    return 0;
                }
                self.chan[chan].key_off = true;
                self.chan[chan].key_on = false;
                self.chan[chan].active = false;
                self.chan[chan].std.release();
                1
            }
            ChipCommand::EnvRelease { chan } => {
                if chan >= 9 && !self.proper_drums {
                    return 0;
                }
                self.chan[chan].std.release();
                1
            }
            ChipCommand::Volume { chan, vol } => {
                if chan >= 9 && !self.proper_drums {
                    return 0;
                }
                self.chan[chan].vol = vol;
                if !self.chan[chan].std.vol.has() {
                    self.chan[chan].out_vol = vol;
                }
                if chan >= 6 && self.proper_drums {
                    self.drum_vol[chan - 6] = (15 - self.chan[chan].out_vol).clamp(0, 15) as u8;
                    self.write_drum_volumes();
                } else if (chan < 6 || !self.drums) && chan < 9 {
                    let reg = self.vol_reg(chan);
                    self.r_write(0x30 + chan, reg);
                }
                1
            }
            ChipCommand::GetVolume { chan } => self.chan[chan].vol,
            ChipCommand::GetVolMax => 15,
            ChipCommand::Instrument { chan, ins, force } => {
                if self.chan[chan].ins != ins || force {
                    self.chan[chan].ins_changed = true;
                }
                self.chan[chan].ins = ins;
                1
            }
            ChipCommand::Pitch { chan, pitch } => {
                if chan >= 9 && !self.proper_drums {
                    return 0;
                }
                self.chan[chan].pitch = pitch;
                self.chan[chan].freq_changed = true;
                1
            }
            ChipCommand::NotePorta { chan, speed, target } => {
                if chan >= 9 && !self.proper_drums {
                    return 0;
                }
                let dest_freq = note_freq(target);
                let step = speed * octave(self.chan[chan].base_freq);
                let mut arrived = false;
                let new_freq = if dest_freq > self.chan[chan].base_freq {
                    let f = self.chan[chan].base_freq + step;
                    if f >= dest_freq {
                        arrived = true;
                        dest_freq
                    } else {
                        f
                    }
                } else {
                    let f = self.chan[chan].base_freq - step;
                    if f <= dest_freq {
                        arrived = true;
                        dest_freq
                    } else {
                        f
                    }
                };
                self.chan[chan].base_freq = new_freq;
                self.chan[chan].porta_pause = false;
                self.chan[chan].freq_changed = true;
                if arrived {
                    self.chan[chan].in_porta = false;
                    return 2;
                }
                1
            }
            ChipCommand::Legato { chan, note } => {
                if chan >= 9 && !self.proper_drums {
                    return 0;
                }
                self.chan[chan].base_freq = note_freq(note);
                self.chan[chan].note = note;
                self.chan[chan].freq_changed = true;
                1
            }
            ChipCommand::Feedback { chan, fb } => {
                if chan >= 9 && !self.proper_drums {
                    return 0;
                }
                self.chan[chan].state.fb = fb & 7;
                let reg = self.car_misc_reg(chan);
                self.r_write(0x03, reg);
                1
            }
            ChipCommand::OpMult { chan, op, mult } => {
                if chan >= 9 && !self.proper_drums {
                    return 0;
                }
                let op = op.min(1);
                self.chan[chan].state.ops[op].mult = mult & 15;
                let reg = Self::op_reg(&self.chan[chan].state.ops[op]);
                self.r_write(op, reg);
                1
            }
            ChipCommand::OpTl { chan, op, tl } => {
                if chan >= 9 && !self.proper_drums {
                    return 0;
                }
                if op == 0 {
                    self.chan[chan].state.ops[0].tl = tl & 63;
                    let reg = self.mod_level_reg(chan);
                    self.r_write(0x02, reg);
                } else {
                    self.chan[chan].state.ops[1].tl = tl & 15;
                    if chan < 9 {
                        let reg = self.vol_reg(chan);
                        self.r_write(0x30 + chan, reg);
                    }
                }
                1
            }
            ChipCommand::OpAr { chan, op, ar } => {
                if chan >= 9 && !self.proper_drums {
                    return 0;
                }
                match op {
                    None => {
                        self.chan[chan].state.ops[0].ar = ar & 15;
                        self.chan[chan].state.ops[1].ar = ar & 15;
                    }
                    Some(0) => self.chan[chan].state.ops[0].ar = ar & 15,
                    Some(_) => self.chan[chan].state.ops[1].ar = ar & 15,
                }
                let mod_ = self.chan[chan].state.ops[0];
                let car = self.chan[chan].state.ops[1];
                self.r_write(0x04, (mod_.ar << 4) | mod_.dr);
                self.r_write(0x05, (car.ar << 4) | car.dr);
                1
            }
            ChipCommand::ExtendedDrums { enable } => {
                if !self.proper_drums_sys || self.proper_drums == enable {
                    return 1;
                }
                if enable {
                    self.proper_drums = true;
                    self.imm_write(0x0e, 0x20);
                } else {
                    self.proper_drums = false;
                    self.imm_write(0x0e, 0x00);
                    self.drum_state = 0;
                }
                1
            }
            ChipCommand::PrePorta { chan, porta } => {
                if chan >= 9 && !self.proper_drums {
                    return 0;
                }
                self.chan[chan].in_porta = porta;
                1
            }
            ChipCommand::PreNote { .. } => 1,
        }
    }

    /// Re-emit the full instrument state. Invoked by the engine after a seek
    /// or register-dump resume.
    pub fn force_ins(&mut self) {
        for i in 0..9 {
            if self.chan[i].state.preset == 0 && i as i32 == self.last_custom_memory {
                self.write_custom_patch(i);
            }
            let reg = self.vol_reg(i);
            self.r_write(0x30 + i, reg);
            if !(i >= 6 && self.proper_drums) && self.chan[i].active {
                self.chan[i].key_on = true;
                self.chan[i].freq_changed = true;
                self.chan[i].ins_changed = true;
            }
        }
        if self.drums {
            self.write_compat_drum_setup();
        }
        self.drum_state = 0;
    }

    /// Reset the driver and emulator to power-on state.
    pub fn reset(&mut self) {
        self.writes.clear();
        self.reg_pool = [0; 256];
        self.emu.reset(self.variant);
        if self.dump_writes {
            self.dump.push(RegWrite {
                addr: 0xffff_ffff,
                val: 0,
            });
        }
        for ch in &mut self.chan {
            *ch = FmChannel::default();
        }
        self.pending_writes = [-1; 256];
        self.old_writes = [-1; 256];
        self.drum_state = 0;
        self.drum_vol = [0; 5];
        self.last_custom_memory = -1;
        self.delay = 0;
        self.drums = false;
        self.proper_drums = self.proper_drums_sys;
        if self.proper_drums {
            self.imm_write(0x0e, 0x20);
        }
    }
}
