//! Core song model for the kilotone tracker.
//!
//! This crate defines the in-memory song: the orders grid, lazily-created
//! patterns, instruments and their partial-update records, plus the opaque
//! snapshot format the replication layer ships between peers. Commands (in
//! the application crate) are the only intended writers.

mod instrument;
mod partial;
mod pattern;
mod snapshot;
mod song;

pub use instrument::{FmOperator, FmParams, Instrument, InstrumentMacros, MacroSource, OperatorMacros};
pub use partial::{FmOperatorUpdate, FmParamsUpdate, InstrumentUpdate, MacrosUpdate, OperatorUpdate};
pub use pattern::{
    Pattern, CELL_EMPTY, FIELD_INSTRUMENT, FIELD_NOTE, FIELD_OCTAVE, FIELD_VOLUME, PATTERN_FIELDS,
    PATTERN_ROWS,
};
pub use snapshot::{load_song, save_song, SnapshotError};
pub use song::{ChannelData, Song, SongWalk, MAX_CHANS, MAX_ORDERS, MAX_PATTERNS};
