//! Per-tick macro envelopes.
//!
//! Each lane steps through an instrument's [`MacroSource`] one value per
//! tick. `had` reports that a value fired this tick, `finished` fires on the
//! tick after the last value, and a release point holds the lane until the
//! note is released.

use kt_ir::{Instrument, MacroSource};

/// Runtime state of one macro lane.
#[derive(Clone, Debug, Default)]
pub struct MacroLane {
    values: Vec<i32>,
    loop_pos: Option<usize>,
    release_pos: Option<usize>,
    pos: usize,
    released: bool,
    holding: bool,
    active: bool,
    will: bool,
    pending_finish: bool,
    /// Value produced by the most recent firing tick.
    pub val: i32,
    /// A value fired this tick.
    pub had: bool,
    /// The lane ran out this tick (fires once, the tick after the last value).
    pub finished: bool,
}

impl MacroLane {
    /// Arm the lane from an instrument macro. Called at note-on.
    pub fn init(&mut self, src: &MacroSource) {
        self.values = src.values.clone();
        self.loop_pos = src.loop_pos.map(|p| p as usize).filter(|&p| p < self.values.len());
        self.release_pos = src
            .release_pos
            .map(|p| p as usize)
            .filter(|&p| p < self.values.len());
        self.pos = 0;
        self.released = false;
        self.holding = false;
        self.active = !self.values.is_empty();
        self.will = self.active;
        self.pending_finish = false;
        self.had = false;
        self.finished = false;
    }

    /// The lane is still producing values.
    pub fn has(&self) -> bool {
        self.active
    }

    /// The instrument defines this lane at all.
    pub fn will(&self) -> bool {
        self.will
    }

    /// Step one tick.
    pub fn next(&mut self) {
        self.had = false;
        self.finished = false;
        if self.pending_finish {
            self.pending_finish = false;
            self.finished = true;
        }
        if !self.active || self.holding {
            return;
        }

        self.val = self.values[self.pos];
        self.had = true;

        if !self.released && self.release_pos == Some(self.pos) {
            self.holding = true;
            return;
        }

        if self.pos + 1 >= self.values.len() {
            match self.loop_pos {
                Some(lp) => self.pos = lp,
                None => {
                    self.active = false;
                    self.pending_finish = true;
                }
            }
        } else {
            self.pos += 1;
        }
    }

    /// Let the lane run past its release point.
    pub fn release(&mut self) {
        self.released = true;
        self.holding = false;
    }
}

/// Macro lanes for one operator.
#[derive(Clone, Debug, Default)]
pub struct OpMacroLanes {
    pub am: MacroLane,
    pub ar: MacroLane,
    pub dr: MacroLane,
    pub mult: MacroLane,
    pub rr: MacroLane,
    pub sl: MacroLane,
    pub tl: MacroLane,
    pub egt: MacroLane,
    pub ksl: MacroLane,
    pub ksr: MacroLane,
    pub vib: MacroLane,
}

impl OpMacroLanes {
    fn init(&mut self, src: &kt_ir::OperatorMacros) {
        self.am.init(&src.am);
        self.ar.init(&src.ar);
        self.dr.init(&src.dr);
        self.mult.init(&src.mult);
        self.rr.init(&src.rr);
        self.sl.init(&src.sl);
        self.tl.init(&src.tl);
        self.egt.init(&src.egt);
        self.ksl.init(&src.ksl);
        self.ksr.init(&src.ksr);
        self.vib.init(&src.vib);
    }

    fn next(&mut self) {
        self.am.next();
        self.ar.next();
        self.dr.next();
        self.mult.next();
        self.rr.next();
        self.sl.next();
        self.tl.next();
        self.egt.next();
        self.ksl.next();
        self.ksr.next();
        self.vib.next();
    }

    fn release(&mut self) {
        self.am.release();
        self.ar.release();
        self.dr.release();
        self.mult.release();
        self.rr.release();
        self.sl.release();
        self.tl.release();
        self.egt.release();
        self.ksl.release();
        self.ksr.release();
        self.vib.release();
    }
}

/// All macro lanes of one channel.
#[derive(Clone, Debug, Default)]
pub struct MacroRunner {
    pub vol: MacroLane,
    pub arp: MacroLane,
    /// Arp values are absolute notes rather than offsets.
    pub arp_absolute: bool,
    pub alg: MacroLane,
    pub fb: MacroLane,
    pub fms: MacroLane,
    pub ams: MacroLane,
    pub ops: [OpMacroLanes; 2],
}

impl MacroRunner {
    /// Arm every lane from the instrument. Called at note-on.
    pub fn init(&mut self, ins: &Instrument) {
        self.vol.init(&ins.macros.vol);
        self.arp.init(&ins.macros.arp);
        self.arp_absolute = ins.macros.arp_absolute;
        self.alg.init(&ins.macros.alg);
        self.fb.init(&ins.macros.fb);
        self.fms.init(&ins.macros.fms);
        self.ams.init(&ins.macros.ams);
        for (lane, src) in self.ops.iter_mut().zip(ins.macros.ops.iter()) {
            lane.init(src);
        }
    }

    /// Step every lane one tick.
    pub fn next(&mut self) {
        self.vol.next();
        self.arp.next();
        self.alg.next();
        self.fb.next();
        self.fms.next();
        self.ams.next();
        for lane in &mut self.ops {
            lane.next();
        }
    }

    /// Release every lane.
    pub fn release(&mut self) {
        self.vol.release();
        self.arp.release();
        self.alg.release();
        self.fb.release();
        self.fms.release();
        self.ams.release();
        for lane in &mut self.ops {
            lane.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lane(src: MacroSource) -> MacroLane {
        let mut lane = MacroLane::default();
        lane.init(&src);
        lane
    }

    #[test]
    fn steps_values_then_finishes() {
        let mut m = lane(MacroSource::once(&[15, 12, 8]));
        assert!(m.will());

        m.next();
        assert!(m.had);
        assert_eq!(m.val, 15);
        m.next();
        assert_eq!(m.val, 12);
        m.next();
        assert_eq!(m.val, 8);
        assert!(m.has());

        // The tick after the last value: no firing, finished set once.
        m.next();
        assert!(!m.had);
        assert!(m.finished);
        assert!(!m.has());
        m.next();
        assert!(!m.finished);
    }

    #[test]
    fn empty_lane_is_inert() {
        let mut m = lane(MacroSource::default());
        assert!(!m.will());
        m.next();
        assert!(!m.had);
        assert!(!m.finished);
    }

    #[test]
    fn loop_wraps() {
        let mut m = lane(MacroSource {
            values: vec![1, 2, 3],
            loop_pos: Some(1),
            release_pos: None,
        });
        let mut seen = Vec::new();
        for _ in 0..6 {
            m.next();
            seen.push(m.val);
        }
        assert_eq!(seen, vec![1, 2, 3, 2, 3, 2]);
        assert!(m.has());
    }

    #[test]
    fn release_point_holds_until_released() {
        let mut m = lane(MacroSource {
            values: vec![15, 10, 0],
            loop_pos: None,
            release_pos: Some(1),
        });
        m.next();
        assert_eq!(m.val, 15);
        m.next();
        assert_eq!(m.val, 10);
        // Holding: no further values fire.
        m.next();
        assert!(!m.had);
        m.next();
        assert!(!m.had);
        assert!(m.has());

        m.release();
        m.next();
        assert!(m.had);
        assert_eq!(m.val, 10);
        m.next();
        assert_eq!(m.val, 0);
        m.next();
        assert!(m.finished);
    }

    #[test]
    fn runner_inits_from_instrument() {
        let mut ins = Instrument::new("test");
        ins.macros.vol = MacroSource::once(&[15]);
        ins.macros.arp_absolute = true;

        let mut runner = MacroRunner::default();
        runner.init(&ins);
        assert!(runner.vol.will());
        assert!(!runner.arp.will());
        assert!(runner.arp_absolute);

        runner.next();
        assert!(runner.vol.had);
        assert_eq!(runner.vol.val, 15);
    }
}
