//! Song structure: orders grid, per-channel patterns, instruments.

use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};

use crate::instrument::Instrument;
use crate::pattern::Pattern;

/// Maximum number of channels a song can have.
pub const MAX_CHANS: usize = 32;

/// Maximum number of orders in the song sequence.
pub const MAX_ORDERS: usize = 256;

/// Maximum number of patterns per channel.
pub const MAX_PATTERNS: usize = 128;

/// Effect id for a position jump (loops the song at its target).
const EFFECT_POSITION_JUMP: i16 = 0x0b;

/// One channel's pattern storage. Patterns are created on first write and
/// never deleted; an absent slot reads as an empty pattern.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelData {
    /// Number of visible effect columns in the editor.
    pub effect_columns: u8,
    patterns: Vec<Option<Box<Pattern>>>,
}

impl Default for ChannelData {
    fn default() -> Self {
        Self {
            effect_columns: 1,
            patterns: vec![None; MAX_PATTERNS],
        }
    }
}

impl ChannelData {
    fn pattern(&self, index: usize) -> Option<&Pattern> {
        self.patterns.get(index)?.as_deref()
    }

    fn pattern_mut(&mut self, index: usize, create: bool) -> Option<&mut Pattern> {
        if index >= MAX_PATTERNS {
            return None;
        }
        let slot = &mut self.patterns[index];
        if slot.is_none() {
            if !create {
                return None;
            }
            *slot = Some(Box::new(Pattern::new()));
        }
        slot.as_deref_mut()
    }
}

/// Derived playback data recomputed by [`Song::walk_song`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SongWalk {
    /// Order the song loops back to.
    pub loop_order: usize,
    /// Row within that order.
    pub loop_row: usize,
    /// One past the last order that actually plays.
    pub loop_end: usize,
}

/// A complete song. Mutated only by commands and by snapshot load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Song {
    /// Song title
    pub name: ArrayString<32>,
    /// Orders grid, `ord[channel * MAX_ORDERS + order] -> pattern index`.
    orders: Vec<u8>,
    /// Number of orders currently in the sequence.
    orders_len: usize,
    /// Per-channel pattern storage.
    channels: Vec<ChannelData>,
    /// Instruments
    pub instruments: Vec<Instrument>,
    /// Derived loop data, recomputed after orders/pattern changes.
    #[serde(skip)]
    walk: SongWalk,
    /// Bumped whenever an instrument is edited; chip drivers poll this to
    /// refresh cached instrument state.
    #[serde(skip)]
    ins_generation: u64,
}

impl Default for Song {
    fn default() -> Self {
        Self::new()
    }
}

impl Song {
    /// Create an empty song with no orders.
    pub fn new() -> Self {
        Self {
            name: ArrayString::new(),
            orders: vec![0; MAX_CHANS * MAX_ORDERS],
            orders_len: 0,
            channels: (0..MAX_CHANS).map(|_| ChannelData::default()).collect(),
            instruments: Vec::new(),
            walk: SongWalk::default(),
            ins_generation: 0,
        }
    }

    /// Number of orders in the sequence.
    pub fn orders_len(&self) -> usize {
        self.orders_len
    }

    /// Read one cell of the orders grid.
    pub fn order_cell(&self, channel: usize, order: usize) -> u8 {
        debug_assert!(channel < MAX_CHANS);
        debug_assert!(order < MAX_ORDERS);
        self.orders[channel * MAX_ORDERS + order]
    }

    fn set_order_raw(&mut self, channel: usize, order: usize, pattern: u8) {
        self.orders[channel * MAX_ORDERS + order] = pattern;
    }

    /// Set one cell of the orders grid. Returns whether the value changed.
    pub fn set_order_cell(&mut self, channel: usize, order: usize, pattern: u8) -> bool {
        if channel >= MAX_CHANS || order >= MAX_ORDERS || pattern as usize >= MAX_PATTERNS {
            return false;
        }
        if self.order_cell(channel, order) == pattern {
            return false;
        }
        self.set_order_raw(channel, order, pattern);
        true
    }

    /// Lowest pattern index not referenced by this channel's orders.
    fn first_unused_pattern(&self, channel: usize) -> u8 {
        let mut used = [false; MAX_PATTERNS];
        for order in 0..self.orders_len {
            used[self.order_cell(channel, order) as usize] = true;
        }
        used.iter().position(|&u| !u).unwrap_or(0) as u8
    }

    fn insert_order_row(&mut self, where_: usize, values: &[u8]) {
        for channel in 0..MAX_CHANS {
            let mut i = self.orders_len;
            while i > where_ {
                let prev = self.order_cell(channel, i - 1);
                self.set_order_raw(channel, i, prev);
                i -= 1;
            }
            self.set_order_raw(channel, where_, values[channel]);
        }
        self.orders_len += 1;
    }

    /// Insert a new order at `where_`. With `duplicate_from`, the new order
    /// reuses that order's pattern indices; otherwise each channel gets its
    /// lowest unused pattern index.
    pub fn add_order(&mut self, duplicate_from: Option<usize>, where_: usize) -> bool {
        if self.orders_len >= MAX_ORDERS || where_ > self.orders_len {
            return false;
        }
        if let Some(from) = duplicate_from {
            if from >= self.orders_len {
                return false;
            }
        }
        let values: Vec<u8> = match duplicate_from {
            Some(from) => (0..MAX_CHANS).map(|c| self.order_cell(c, from)).collect(),
            None => (0..MAX_CHANS).map(|c| self.first_unused_pattern(c)).collect(),
        };
        self.insert_order_row(where_, &values);
        true
    }

    /// Insert a new order at `where_` whose patterns are fresh copies of the
    /// patterns `from` points at.
    pub fn deep_clone_order(&mut self, from: usize, where_: usize) -> bool {
        if self.orders_len >= MAX_ORDERS || where_ > self.orders_len || from >= self.orders_len {
            return false;
        }
        let src: Vec<u8> = (0..MAX_CHANS).map(|c| self.order_cell(c, from)).collect();
        let values: Vec<u8> = (0..MAX_CHANS).map(|c| self.first_unused_pattern(c)).collect();
        self.insert_order_row(where_, &values);
        for channel in 0..MAX_CHANS {
            let copied = self.channels[channel]
                .pattern(src[channel] as usize)
                .cloned();
            if let Some(src_pat) = copied {
                if let Some(dest) = self.channels[channel].pattern_mut(values[channel] as usize, true)
                {
                    src_pat.copy_on(dest);
                }
            }
        }
        true
    }

    /// Remove the order at `which`, shifting later orders down.
    pub fn delete_order(&mut self, which: usize) -> bool {
        if which >= self.orders_len {
            return false;
        }
        for channel in 0..MAX_CHANS {
            for i in which..self.orders_len - 1 {
                let next = self.order_cell(channel, i + 1);
                self.set_order_raw(channel, i, next);
            }
        }
        self.orders_len -= 1;
        true
    }

    /// Swap two orders. Reports true even when `a == b`.
    pub fn swap_orders(&mut self, a: usize, b: usize) -> bool {
        if a >= self.orders_len || b >= self.orders_len {
            return false;
        }
        for channel in 0..MAX_CHANS {
            let va = self.order_cell(channel, a);
            let vb = self.order_cell(channel, b);
            self.set_order_raw(channel, a, vb);
            self.set_order_raw(channel, b, va);
        }
        true
    }

    /// Read a pattern if it exists.
    pub fn pattern(&self, channel: usize, index: usize) -> Option<&Pattern> {
        self.channels.get(channel)?.pattern(index)
    }

    /// Get a pattern for writing, optionally creating it on first write.
    pub fn pattern_mut(&mut self, channel: usize, index: usize, create: bool) -> Option<&mut Pattern> {
        self.channels.get_mut(channel)?.pattern_mut(index, create)
    }

    pub fn instrument_at(&self, index: usize) -> Option<&Instrument> {
        self.instruments.get(index)
    }

    pub fn instrument_at_mut(&mut self, index: usize) -> Option<&mut Instrument> {
        self.instruments.get_mut(index)
    }

    /// Record that an instrument was edited. Chip drivers compare the
    /// generation counter against their cached state.
    pub fn notify_instrument_changed(&mut self, _index: usize) {
        self.ins_generation += 1;
    }

    pub fn ins_generation(&self) -> u64 {
        self.ins_generation
    }

    /// Derived loop data from the last walk.
    pub fn walk(&self) -> SongWalk {
        self.walk
    }

    /// Structural sanity of a deserialized song: every container sized the
    /// way the accessors assume.
    pub(crate) fn is_well_formed(&self) -> bool {
        self.orders.len() == MAX_CHANS * MAX_ORDERS
            && self.orders_len <= MAX_ORDERS
            && self.channels.len() == MAX_CHANS
            && self
                .channels
                .iter()
                .all(|c| c.patterns.len() == MAX_PATTERNS)
            && self.channels.iter().all(|c| {
                c.patterns
                    .iter()
                    .flatten()
                    .all(|p| p.is_well_formed())
            })
    }

    /// Recompute derived loop data. Must be called after any orders or
    /// pattern change, once per command exec/revert.
    pub fn walk_song(&mut self) {
        self.walk = SongWalk {
            loop_order: 0,
            loop_row: 0,
            loop_end: self.orders_len,
        };
        for order in 0..self.orders_len {
            for channel in 0..MAX_CHANS {
                let pattern_index = self.order_cell(channel, order) as usize;
                let Some(pattern) = self.channels[channel].pattern(pattern_index) else {
                    continue;
                };
                for row in 0..crate::pattern::PATTERN_ROWS {
                    let cells = pattern.row(row);
                    for effect in (4..cells.len()).step_by(2) {
                        if cells[effect] == EFFECT_POSITION_JUMP {
                            let target = cells[effect + 1].max(0) as usize;
                            self.walk.loop_order = target.min(self.orders_len.saturating_sub(1));
                            self.walk.loop_row = 0;
                            self.walk.loop_end = order + 1;
                            return;
                        }
                    }
                }
            }
        }
    }
}
