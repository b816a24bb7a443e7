//! OPLL driver integration tests against a stub emulator core.

use kt_engine::tuning::{encode_freq, note_freq};
use kt_engine::{ChipCommand, LinearPitch, OpllDriver, OpllEmulator, OpllVariant};
use kt_ir::{Instrument, MacroSource};

/// Records every write with the clock index it arrived on.
#[derive(Default)]
struct StubEmu {
    writes: Vec<(usize, u8, u8)>,
    clocks: usize,
    resets: usize,
}

impl OpllEmulator for StubEmu {
    fn reset(&mut self, _variant: OpllVariant) {
        self.resets += 1;
    }

    fn write(&mut self, port: u8, value: u8) {
        self.writes.push((self.clocks, port, value));
    }

    fn clock(&mut self, out: &mut [i32; 2]) {
        self.clocks += 1;
        out[0] = 1;
        out[1] = 0;
    }

    fn cycles(&self) -> usize {
        self.clocks % 18
    }
}

fn driver() -> OpllDriver<StubEmu> {
    OpllDriver::new(StubEmu::default(), OpllVariant::Ym2413)
}

fn preset_instrument(preset: u8) -> Instrument {
    let mut ins = Instrument::new("test");
    ins.fm.preset = preset;
    ins
}

/// Pair up address/value phases from the stub log into completed writes.
fn completed_writes(emu: &StubEmu) -> Vec<(u8, u8)> {
    let mut out = Vec::new();
    let mut addr = None;
    for &(_, port, value) in &emu.writes {
        if port == 0 {
            addr = Some(value);
        } else if let Some(a) = addr.take() {
            out.push((a, value));
        }
    }
    out
}

/// Run enough samples to drain the write queue.
fn drain(d: &mut OpllDriver<StubEmu>) {
    let mut buf = [0i16; 256];
    while d.queued_writes() > 0 {
        d.acquire(&mut buf);
    }
}

#[test]
fn note_on_register_sequence() {
    let ins = vec![preset_instrument(1)];
    let mut d = driver();

    d.dispatch(ChipCommand::Instrument { chan: 0, ins: 0, force: false }, &ins);
    d.dispatch(ChipCommand::NoteOn { chan: 0, note: Some(57) }, &ins);
    d.tick(&LinearPitch);
    drain(&mut d);

    let word = encode_freq(note_freq(57));
    let expected = vec![
        // Key retrigger from the edge pass (frequency bytes still unset).
        (0x20, 0x00),
        // Volume nibble 0 (full volume), preset 1 in the high nibble.
        (0x30, 0x10),
        // Frequency low byte, then high byte with the key-on bit.
        (0x10, (word & 0xff) as u8),
        (0x20, (word >> 8) as u8 | 0x10),
    ];
    assert_eq!(completed_writes(d.emulator()), expected);
}

#[test]
fn write_phases_respect_busy_cycles() {
    let ins = vec![preset_instrument(1)];
    let mut d = driver();

    d.dispatch(ChipCommand::NoteOn { chan: 0, note: Some(60) }, &ins);
    d.tick(&LinearPitch);
    drain(&mut d);

    let writes = &d.emulator().writes;
    assert!(writes.len() >= 4);
    for pair in writes.windows(2) {
        let (t0, p0, _) = pair[0];
        let (t1, p1, _) = pair[1];
        match (p0, p1) {
            // Address -> value: at least the 3-cycle busy budget between.
            (0, 1) => assert!(t1 - t0 >= 4, "value phase too early: {} -> {}", t0, t1),
            // Value -> next address: at least the 21-cycle budget.
            (1, 0) => assert!(t1 - t0 >= 22, "next write too early: {} -> {}", t0, t1),
            _ => panic!("unpaired write phases: {:?}", pair),
        }
    }
}

#[test]
fn acquire_output_is_scaled_and_mutable() {
    let ins = vec![preset_instrument(1)];
    let mut d = driver();
    d.dispatch(ChipCommand::NoteOn { chan: 0, note: Some(60) }, &ins);
    d.tick(&LinearPitch);

    let mut buf = [0i16; 16];
    d.acquire(&mut buf);
    // Stub emits 1 per clock on every cycle: 9 per sample, scaled by 50.
    assert_eq!(buf[15], 450);

    for ch in 0..11 {
        d.mute_channel(ch, true);
    }
    d.acquire(&mut buf);
    assert_eq!(buf[0], 0);
}

#[test]
fn channels_past_nine_are_silent_noops() {
    let ins = vec![preset_instrument(1)];
    let mut d = driver();

    assert_eq!(d.dispatch(ChipCommand::NoteOn { chan: 9, note: Some(60) }, &ins), 0);
    assert_eq!(d.dispatch(ChipCommand::Volume { chan: 10, vol: 10 }, &ins), 0);
    assert_eq!(d.dispatch(ChipCommand::Pitch { chan: 9, pitch: 5 }, &ins), 0);

    d.set_proper_drums(true);
    d.reset();
    assert_eq!(d.dispatch(ChipCommand::NoteOn { chan: 9, note: Some(60) }, &ins), 1);
}

#[test]
fn get_volume_and_max() {
    let ins = vec![preset_instrument(1)];
    let mut d = driver();
    d.dispatch(ChipCommand::Volume { chan: 3, vol: 9 }, &ins);
    assert_eq!(d.dispatch(ChipCommand::GetVolume { chan: 3 }, &ins), 9);
    assert_eq!(d.dispatch(ChipCommand::GetVolMax, &ins), 15);
}

#[test]
fn porta_reports_arrival() {
    let ins = vec![preset_instrument(1)];
    let mut d = driver();
    d.dispatch(ChipCommand::NoteOn { chan: 0, note: Some(57) }, &ins);

    // A tiny step does not arrive; a huge one does and reports 2.
    assert_eq!(
        d.dispatch(ChipCommand::NotePorta { chan: 0, speed: 1, target: 69 }, &ins),
        1
    );
    assert_eq!(
        d.dispatch(ChipCommand::NotePorta { chan: 0, speed: 4096, target: 69 }, &ins),
        2
    );
    assert_eq!(d.channel(0).base_freq, note_freq(69));
    assert!(!d.channel(0).in_porta);
}

#[test]
fn porta_slides_downward_too() {
    let ins = vec![preset_instrument(1)];
    let mut d = driver();
    d.dispatch(ChipCommand::NoteOn { chan: 0, note: Some(69) }, &ins);
    let start = d.channel(0).base_freq;

    assert_eq!(
        d.dispatch(ChipCommand::NotePorta { chan: 0, speed: 1, target: 57 }, &ins),
        1
    );
    assert!(d.channel(0).base_freq < start);
    assert_eq!(
        d.dispatch(ChipCommand::NotePorta { chan: 0, speed: 4096, target: 57 }, &ins),
        2
    );
    assert_eq!(d.channel(0).base_freq, note_freq(57));
}

#[test]
fn custom_patch_uploads_on_note_on() {
    let mut ins = preset_instrument(0);
    ins.fm.fb = 5;
    ins.fm.ops[0].mult = 7;
    ins.fm.ops[0].tl = 20;
    ins.fm.ops[1].ar = 12;
    let bank = vec![ins];

    let mut d = driver();
    d.dispatch(ChipCommand::NoteOn { chan: 2, note: Some(60) }, &bank);
    d.tick(&LinearPitch);
    drain(&mut d);

    let pool = d.register_pool();
    assert_eq!(pool[0x00] & 15, 7); // modulator mult
    assert_eq!(pool[0x02] & 63, 20); // modulator tl
    assert_eq!(pool[0x03] & 7, 5); // feedback
    assert_eq!(pool[0x05] >> 4, 12); // carrier ar
}

#[test]
fn volume_macro_drives_volume_register() {
    let mut ins = preset_instrument(3);
    ins.macros.vol = MacroSource::once(&[15, 8]);
    let bank = vec![ins];

    let mut d = driver();
    d.dispatch(ChipCommand::NoteOn { chan: 1, note: Some(60) }, &bank);

    d.tick(&LinearPitch);
    drain(&mut d);
    assert_eq!(d.register_pool()[0x31], 0x30); // full volume, preset 3

    d.tick(&LinearPitch);
    drain(&mut d);
    // out_vol = 15*8/15 = 8 -> attenuation nibble 7.
    assert_eq!(d.register_pool()[0x31], 0x37);
}

#[test]
fn relative_arp_macro_offsets_base_freq() {
    let mut ins = preset_instrument(1);
    ins.macros.arp = MacroSource {
        values: vec![0, 3],
        loop_pos: Some(0),
        release_pos: None,
    };
    let bank = vec![ins];

    let mut d = driver();
    d.dispatch(ChipCommand::NoteOn { chan: 0, note: Some(60) }, &bank);
    d.tick(&LinearPitch);
    assert_eq!(d.channel(0).base_freq, note_freq(60));
    d.tick(&LinearPitch);
    assert_eq!(d.channel(0).base_freq, note_freq(63));
    d.tick(&LinearPitch);
    assert_eq!(d.channel(0).base_freq, note_freq(60));
}

#[test]
fn absolute_arp_restores_note_on_macro_end() {
    let mut ins = preset_instrument(1);
    ins.macros.arp = MacroSource::once(&[72]);
    ins.macros.arp_absolute = true;
    let bank = vec![ins];

    let mut d = driver();
    d.dispatch(ChipCommand::NoteOn { chan: 0, note: Some(60) }, &bank);
    d.tick(&LinearPitch);
    assert_eq!(d.channel(0).base_freq, note_freq(72));
    // Macro ended: base frequency returns to the played note.
    d.tick(&LinearPitch);
    assert_eq!(d.channel(0).base_freq, note_freq(60));
}

#[test]
fn arp_macro_leaves_porta_alone() {
    let mut ins = preset_instrument(1);
    ins.macros.arp = MacroSource {
        values: vec![12],
        loop_pos: Some(0),
        release_pos: None,
    };
    let bank = vec![ins];

    let mut d = driver();
    d.dispatch(ChipCommand::NoteOn { chan: 0, note: Some(60) }, &bank);
    d.dispatch(ChipCommand::PrePorta { chan: 0, porta: true }, &bank);
    let base = d.channel(0).base_freq;
    d.tick(&LinearPitch);
    assert_eq!(d.channel(0).base_freq, base);
}

#[test]
fn coalescing_skips_unchanged_registers() {
    let ins = vec![preset_instrument(1)];
    let mut d = driver();
    d.dispatch(ChipCommand::NoteOn { chan: 0, note: Some(60) }, &ins);
    d.tick(&LinearPitch);
    drain(&mut d);

    // Same volume again: the shadow already matches, nothing to send.
    d.dispatch(ChipCommand::Volume { chan: 0, vol: 15 }, &ins);
    d.tick(&LinearPitch);
    drain(&mut d);
    let vol_writes = completed_writes(d.emulator())
        .into_iter()
        .filter(|&(a, _)| a == 0x30)
        .count();
    assert_eq!(vol_writes, 1);
}

#[test]
fn force_ins_rekeys_active_channels() {
    let ins = vec![preset_instrument(1)];
    let mut d = driver();
    d.dispatch(ChipCommand::NoteOn { chan: 0, note: Some(57) }, &ins);
    d.tick(&LinearPitch);
    drain(&mut d);

    d.force_ins();
    d.tick(&LinearPitch);
    drain(&mut d);

    let word = encode_freq(note_freq(57));
    let keyons: Vec<_> = completed_writes(d.emulator())
        .into_iter()
        .filter(|&(a, v)| a == 0x20 && v == (word >> 8) as u8 | 0x10)
        .collect();
    assert_eq!(keyons.len(), 2);
}

#[test]
fn op_tl_command_updates_modulator_level() {
    let mut ins = preset_instrument(0);
    ins.fm.ops[0].tl = 10;
    let bank = vec![ins];

    let mut d = driver();
    d.dispatch(ChipCommand::NoteOn { chan: 0, note: Some(60) }, &bank);
    d.tick(&LinearPitch);
    drain(&mut d);
    assert_eq!(d.register_pool()[0x02] & 63, 10);

    d.dispatch(ChipCommand::OpTl { chan: 0, op: 0, tl: 33 }, &bank);
    d.tick(&LinearPitch);
    drain(&mut d);
    assert_eq!(d.register_pool()[0x02] & 63, 33);
}

#[test]
fn extended_drum_toggle_writes_mode_register() {
    let ins = vec![preset_instrument(1)];
    let mut d = driver();
    d.set_proper_drums(true);
    d.reset();
    drain(&mut d);

    d.dispatch(ChipCommand::ExtendedDrums { enable: false }, &ins);
    drain(&mut d);
    assert_eq!(d.register_pool()[0x0e], 0x00);

    d.dispatch(ChipCommand::ExtendedDrums { enable: true }, &ins);
    drain(&mut d);
    assert_eq!(d.register_pool()[0x0e], 0x20);
}

#[test]
fn drum_channel_key_on_sets_drum_bit() {
    let ins = vec![preset_instrument(1)];
    let mut d = driver();
    d.set_proper_drums(true);
    d.reset();
    drain(&mut d);

    d.dispatch(ChipCommand::NoteOn { chan: 6, note: Some(36) }, &ins);
    d.tick(&LinearPitch);
    drain(&mut d);
    // Channel 6 is the kick: bit 4 of the rhythm register.
    assert_eq!(d.register_pool()[0x0e] & 0x10, 0x10);

    d.dispatch(ChipCommand::NoteOff { chan: 6 }, &ins);
    d.tick(&LinearPitch);
    drain(&mut d);
    assert_eq!(d.register_pool()[0x0e] & 0x10, 0x00);
}

#[test]
fn dump_writes_tees_the_stream() {
    let ins = vec![preset_instrument(1)];
    let mut d = driver();
    d.set_dump_writes(true);
    d.dispatch(ChipCommand::NoteOn { chan: 0, note: Some(60) }, &ins);
    d.tick(&LinearPitch);

    let dump = d.take_dump();
    assert!(!dump.is_empty());
    assert!(dump.iter().any(|w| w.addr == 0x10));
    assert!(d.take_dump().is_empty());
}

#[test]
fn legato_changes_pitch_without_key_edge() {
    let ins = vec![preset_instrument(1)];
    let mut d = driver();
    d.dispatch(ChipCommand::NoteOn { chan: 0, note: Some(60) }, &ins);
    d.tick(&LinearPitch);
    drain(&mut d);

    d.dispatch(ChipCommand::Legato { chan: 0, note: 62 }, &ins);
    assert!(!d.channel(0).key_on);
    assert_eq!(d.channel(0).base_freq, note_freq(62));
}
