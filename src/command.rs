//! Reversible edit commands.
//!
//! Every mutation of the song goes through a command: the GUI builds one,
//! `exec` applies it and captures revert data, the undo stack stores it,
//! and the replication layer ships its wire form to remote peers. The wire
//! form is a map `{kind, data}` or `{kind, data, revert}` with integer
//! kinds; unknown kinds and malformed payloads deserialize to `None`.

use rmpv::Value;
use serde::{Deserialize, Serialize};

use kt_ir::{Instrument, InstrumentUpdate, MAX_CHANS, MAX_ORDERS, MAX_PATTERNS};
use kt_ir::{PATTERN_FIELDS, PATTERN_ROWS};

use crate::app::AppCore;

const KIND_ORDER_ADD: u64 = 0;
const KIND_ORDER_DELETE: u64 = 1;
const KIND_ORDER_SWAP: u64 = 2;
const KIND_ORDER_SET: u64 = 3;
const KIND_PATTERN_SET: u64 = 4;
const KIND_INSTRUMENT_UPDATE: u64 = 5;

/// Where a command originates from.
///
/// Commands may want to differentiate between local and remote origins: a
/// local user doing commands should move the cursor around, but remote
/// users seeing the same command should not have their cursor jump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

/// How much of an order to copy when duplicating it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CloneDepth {
    /// Reuse the source order's pattern indices.
    Shallow = 0,
    /// Copy the pattern contents into fresh slots.
    Deep = 1,
}

impl From<CloneDepth> for u8 {
    fn from(depth: CloneDepth) -> u8 {
        depth as u8
    }
}

impl TryFrom<u8> for CloneDepth {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Shallow),
            1 => Ok(Self::Deep),
            other => Err(format!("bad clone depth {}", other)),
        }
    }
}

/// One cell of the orders grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPattern {
    pub order: i32,
    pub channel: i32,
    pub pattern: i32,
}

/// One cell of one pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternEdit {
    pub channel: i32,
    pub pattern: i32,
    pub row: i32,
    pub field: i32,
    pub value: i16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAddData {
    pub duplicate_from: Option<i32>,
    #[serde(rename = "where")]
    pub where_: i32,
    pub depth: CloneDepth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDeleteData {
    pub which: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSwapData {
    pub a: i32,
    pub b: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSetData {
    pub entries: Vec<OrderPattern>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSetData {
    pub edits: Vec<PatternEdit>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentUpdateData {
    pub index: i32,
    pub update: InstrumentUpdate,
}

/// A reversible, serializable edit. Variants with revert data capture it
/// during `exec`; cloning deep-copies both halves.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    OrderAdd(OrderAddData),
    OrderDelete {
        data: OrderDeleteData,
        /// The deleted order's per-channel pattern indices.
        revert: Option<Vec<u8>>,
    },
    OrderSwap(OrderSwapData),
    OrderSet {
        data: OrderSetData,
        /// Prior values of the cells that actually changed.
        revert: Vec<OrderPattern>,
    },
    PatternSet {
        data: PatternSetData,
        /// Prior values of the cells that actually changed.
        revert: Vec<PatternEdit>,
    },
    InstrumentUpdate {
        data: InstrumentUpdateData,
        /// Pre-exec snapshot of the whole instrument.
        revert: Option<Box<Instrument>>,
    },
}

impl Command {
    pub fn order_add(duplicate_from: Option<i32>, where_: i32, depth: CloneDepth) -> Self {
        Self::OrderAdd(OrderAddData {
            duplicate_from,
            where_,
            depth,
        })
    }

    pub fn order_delete(which: i32) -> Self {
        Self::OrderDelete {
            data: OrderDeleteData { which },
            revert: None,
        }
    }

    pub fn order_swap(a: i32, b: i32) -> Self {
        Self::OrderSwap(OrderSwapData { a, b })
    }

    pub fn order_set(entries: Vec<OrderPattern>) -> Self {
        Self::OrderSet {
            data: OrderSetData { entries },
            revert: Vec::new(),
        }
    }

    pub fn pattern_set(edits: Vec<PatternEdit>) -> Self {
        Self::PatternSet {
            data: PatternSetData { edits },
            revert: Vec::new(),
        }
    }

    pub fn instrument_update(index: i32, update: InstrumentUpdate) -> Self {
        Self::InstrumentUpdate {
            data: InstrumentUpdateData { index, update },
            revert: None,
        }
    }

    /// Run the command. Used for redoing as well as initially doing.
    /// Returns whether the song actually changed; nothing is recorded on
    /// the undo stack otherwise.
    pub fn exec(&mut self, app: &mut AppCore, origin: Origin) -> bool {
        let modified = match self {
            Command::OrderAdd(data) => exec_order_add(data, app, origin),
            Command::OrderDelete { data, revert } => exec_order_delete(data, revert, app),
            Command::OrderSwap(data) => exec_order_swap(data, app, origin),
            Command::OrderSet { data, revert } => exec_order_set(data, revert, app),
            Command::PatternSet { data, revert } => exec_pattern_set(data, revert, app),
            Command::InstrumentUpdate { data, revert } => exec_instrument_update(data, revert, app),
        };
        if modified {
            app.modified = true;
        }
        modified
    }

    /// Undo the command by applying its captured revert data.
    pub fn revert(&mut self, app: &mut AppCore, origin: Origin) {
        match self {
            Command::OrderAdd(data) => {
                if data.where_ >= 0 && app.song.delete_order(data.where_ as usize) {
                    app.song.walk_song();
                    app.modified = true;
                }
            }
            Command::OrderDelete { data, revert } => {
                let Some(row) = revert else { return };
                let which = data.which.max(0) as usize;
                if app.song.add_order(None, which) {
                    for (channel, &pattern) in row.iter().enumerate() {
                        app.song.set_order_cell(channel, which, pattern);
                    }
                    app.song.walk_song();
                    app.modified = true;
                }
            }
            // Reverting has the exact same behaviour as execing for swaps.
            Command::OrderSwap(_) => {
                self.exec(app, origin);
            }
            Command::OrderSet { revert, .. } => {
                if revert.is_empty() {
                    return;
                }
                for entry in revert.iter().rev() {
                    app.song.set_order_cell(
                        entry.channel as usize,
                        entry.order as usize,
                        entry.pattern as u8,
                    );
                }
                app.song.walk_song();
                app.modified = true;
            }
            Command::PatternSet { revert, .. } => {
                if revert.is_empty() {
                    return;
                }
                for entry in revert.iter().rev() {
                    if let Some(pattern) = app.song.pattern_mut(
                        entry.channel as usize,
                        entry.pattern as usize,
                        true,
                    ) {
                        pattern.set_cell(entry.row as usize, entry.field as usize, entry.value);
                    }
                }
                app.song.walk_song();
                app.modified = true;
            }
            Command::InstrumentUpdate { data, revert } => {
                let Some(snapshot) = revert else { return };
                let index = data.index.max(0) as usize;
                if let Some(ins) = app.song.instrument_at_mut(index) {
                    *ins = (**snapshot).clone();
                    app.song.notify_instrument_changed(index);
                    app.modified = true;
                }
            }
        }
    }

    /// Pack into the wire form. `None` (logged) only if serialization of a
    /// payload fails.
    pub fn to_value(&self) -> Option<Value> {
        let packed = match self {
            Command::OrderAdd(data) => pack(KIND_ORDER_ADD, data, None::<&()>),
            Command::OrderDelete { data, revert } => {
                pack(KIND_ORDER_DELETE, data, revert.as_ref())
            }
            Command::OrderSwap(data) => pack(KIND_ORDER_SWAP, data, None::<&()>),
            Command::OrderSet { data, revert } => {
                pack(KIND_ORDER_SET, data, some_if_nonempty(revert))
            }
            Command::PatternSet { data, revert } => {
                pack(KIND_PATTERN_SET, data, some_if_nonempty(revert))
            }
            Command::InstrumentUpdate { data, revert } => {
                pack(KIND_INSTRUMENT_UPDATE, data, revert.as_ref())
            }
        };
        match packed {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("command serialize failed: {}", e);
                None
            }
        }
    }

    /// Decode the wire form. Unknown kinds and malformed payloads are soft
    /// errors: logged, `None`.
    pub fn from_value(value: &Value) -> Option<Command> {
        let untyped: UntypedPacked = match rmpv::ext::from_value(value.clone()) {
            Ok(untyped) => untyped,
            Err(e) => {
                log::error!("malformed command object: {}", e);
                return None;
            }
        };
        match untyped.kind {
            KIND_ORDER_ADD => {
                let (data, _) = unpack::<OrderAddData, ()>(value)?;
                Some(Command::OrderAdd(data))
            }
            KIND_ORDER_DELETE => {
                let (data, revert) = unpack::<OrderDeleteData, Vec<u8>>(value)?;
                Some(Command::OrderDelete { data, revert })
            }
            KIND_ORDER_SWAP => {
                let (data, _) = unpack::<OrderSwapData, ()>(value)?;
                Some(Command::OrderSwap(data))
            }
            KIND_ORDER_SET => {
                let (data, revert) = unpack::<OrderSetData, Vec<OrderPattern>>(value)?;
                Some(Command::OrderSet {
                    data,
                    revert: revert.unwrap_or_default(),
                })
            }
            KIND_PATTERN_SET => {
                let (data, revert) = unpack::<PatternSetData, Vec<PatternEdit>>(value)?;
                Some(Command::PatternSet {
                    data,
                    revert: revert.unwrap_or_default(),
                })
            }
            KIND_INSTRUMENT_UPDATE => {
                let (data, revert) = unpack::<InstrumentUpdateData, Box<Instrument>>(value)?;
                Some(Command::InstrumentUpdate { data, revert })
            }
            other => {
                log::error!("unknown command kind {}", other);
                None
            }
        }
    }
}

#[derive(Serialize)]
struct PackedRef<'a, D: Serialize, R: Serialize> {
    kind: u64,
    data: &'a D,
    #[serde(skip_serializing_if = "Option::is_none")]
    revert: Option<&'a R>,
}

#[derive(Deserialize)]
#[serde(bound(
    deserialize = "D: serde::de::DeserializeOwned, R: serde::de::DeserializeOwned"
))]
struct Packed<D, R> {
    #[allow(dead_code)]
    kind: u64,
    data: D,
    #[serde(default)]
    revert: Option<R>,
}

#[derive(Deserialize)]
struct UntypedPacked {
    kind: u64,
}

fn some_if_nonempty<T>(v: &Vec<T>) -> Option<&Vec<T>> {
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

fn pack<D: Serialize, R: Serialize>(
    kind: u64,
    data: &D,
    revert: Option<&R>,
) -> Result<Value, String> {
    rmpv::ext::to_value(PackedRef { kind, data, revert }).map_err(|e| e.to_string())
}

fn unpack<D, R>(value: &Value) -> Option<(D, Option<R>)>
where
    D: serde::de::DeserializeOwned,
    R: serde::de::DeserializeOwned,
{
    match rmpv::ext::from_value::<Packed<D, R>>(value.clone()) {
        Ok(packed) => Some((packed.data, packed.revert)),
        Err(e) => {
            log::error!("command payload type error: {}", e);
            None
        }
    }
}

fn checked_index(value: i32, bound: usize, what: &str) -> Option<usize> {
    if value >= 0 && (value as usize) < bound {
        Some(value as usize)
    } else {
        log::error!("{} {} out of bounds", what, value);
        None
    }
}

fn exec_order_add(data: &OrderAddData, app: &mut AppCore, origin: Origin) -> bool {
    if data.where_ < 0 {
        log::error!("order insert position {} out of bounds", data.where_);
        return false;
    }
    let where_ = data.where_ as usize;
    let duplicate_from = match data.duplicate_from {
        Some(v) if v < 0 => {
            log::error!("order duplicate source {} out of bounds", v);
            return false;
        }
        Some(v) => Some(v as usize),
        None => None,
    };

    let ok = match data.depth {
        CloneDepth::Shallow => app.song.add_order(duplicate_from, where_),
        CloneDepth::Deep => match duplicate_from {
            Some(from) => app.song.deep_clone_order(from, where_),
            None => {
                log::error!("trying to deep clone an order without a source");
                return false;
            }
        },
    };
    if !ok {
        log::error!("order insert at {} rejected", where_);
        return false;
    }
    if origin == Origin::Local {
        app.editor.pos.order = where_ as u16;
    }
    app.song.walk_song();
    true
}

fn exec_order_delete(data: &OrderDeleteData, revert: &mut Option<Vec<u8>>, app: &mut AppCore) -> bool {
    let Some(which) = checked_index(data.which, app.song.orders_len(), "order") else {
        return false;
    };
    let row: Vec<u8> = (0..MAX_CHANS).map(|c| app.song.order_cell(c, which)).collect();
    if !app.song.delete_order(which) {
        return false;
    }
    *revert = Some(row);
    app.song.walk_song();
    true
}

fn exec_order_swap(data: &OrderSwapData, app: &mut AppCore, origin: Origin) -> bool {
    let (Some(a), Some(b)) = (
        checked_index(data.a, app.song.orders_len(), "order"),
        checked_index(data.b, app.song.orders_len(), "order"),
    ) else {
        return false;
    };
    if !app.song.swap_orders(a, b) {
        return false;
    }
    if origin == Origin::Local {
        // Follow the selected order across the swap.
        if app.editor.pos.order == a as u16 {
            app.editor.pos.order = b as u16;
        } else if app.editor.pos.order == b as u16 {
            app.editor.pos.order = a as u16;
        }
    }
    app.song.walk_song();
    true
}

fn exec_order_set(data: &OrderSetData, revert: &mut Vec<OrderPattern>, app: &mut AppCore) -> bool {
    let mut changed = false;
    revert.clear();
    for entry in &data.entries {
        if entry.order < 0
            || entry.order >= MAX_ORDERS as i32
            || entry.channel < 0
            || entry.channel >= MAX_CHANS as i32
            || entry.pattern < 0
            || entry.pattern >= MAX_PATTERNS as i32
        {
            // Cells visited before the bad index stay applied.
            log::error!("orders edit got out-of-bounds data");
            if changed {
                app.song.walk_song();
            }
            return false;
        }
        let (order, channel) = (entry.order as usize, entry.channel as usize);
        let old = app.song.order_cell(channel, order);
        if old as i32 != entry.pattern {
            revert.push(OrderPattern {
                order: entry.order,
                channel: entry.channel,
                pattern: old as i32,
            });
            app.song.set_order_cell(channel, order, entry.pattern as u8);
            changed = true;
        }
    }
    if changed {
        app.song.walk_song();
    }
    changed
}

fn exec_pattern_set(data: &PatternSetData, revert: &mut Vec<PatternEdit>, app: &mut AppCore) -> bool {
    let mut changed = false;
    revert.clear();
    for edit in &data.edits {
        if edit.channel < 0
            || edit.channel >= MAX_CHANS as i32
            || edit.pattern < 0
            || edit.pattern >= MAX_PATTERNS as i32
            || edit.row < 0
            || edit.row >= PATTERN_ROWS as i32
            || edit.field < 0
            || edit.field >= PATTERN_FIELDS as i32
        {
            // Cells visited before the bad index stay applied.
            log::error!("pattern edit got out-of-bounds data");
            if changed {
                app.song.walk_song();
            }
            return false;
        }
        let Some(pattern) =
            app.song
                .pattern_mut(edit.channel as usize, edit.pattern as usize, true)
        else {
            return false;
        };
        let old = pattern.cell(edit.row as usize, edit.field as usize);
        if old != edit.value {
            pattern.set_cell(edit.row as usize, edit.field as usize, edit.value);
            revert.push(PatternEdit {
                value: old,
                ..*edit
            });
            changed = true;
        }
    }
    if changed {
        app.song.walk_song();
    }
    changed
}

fn exec_instrument_update(
    data: &InstrumentUpdateData,
    revert: &mut Option<Box<Instrument>>,
    app: &mut AppCore,
) -> bool {
    let Some(index) = checked_index(data.index, app.song.instruments.len(), "instrument") else {
        return false;
    };
    let snapshot = app.song.instruments[index].clone();
    let changed = data.update.apply(&mut app.song.instruments[index]);
    if changed {
        *revert = Some(Box::new(snapshot));
        app.song.notify_instrument_changed(index);
    }
    changed
}
