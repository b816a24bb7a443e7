//! Pattern data: a fixed-size grid of raw cell values.

use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};

/// Number of rows in every pattern.
pub const PATTERN_ROWS: usize = 256;

/// Number of fields per row: note, octave, instrument, volume, then
/// alternating effect id / effect value pairs.
pub const PATTERN_FIELDS: usize = 32;

/// Sentinel stored in a cell that holds no value.
pub const CELL_EMPTY: i16 = -1;

/// Field index of the note column.
pub const FIELD_NOTE: usize = 0;
/// Field index of the octave column.
pub const FIELD_OCTAVE: usize = 1;
/// Field index of the instrument column.
pub const FIELD_INSTRUMENT: usize = 2;
/// Field index of the volume column.
pub const FIELD_VOLUME: usize = 3;

/// One channel's pattern: a `PATTERN_ROWS x PATTERN_FIELDS` table of
/// 16-bit cells, stored row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Optional display name.
    pub name: ArrayString<32>,
    /// Cell data, `data[row * PATTERN_FIELDS + field]`.
    data: Vec<i16>,
}

impl Default for Pattern {
    fn default() -> Self {
        Self::new()
    }
}

impl Pattern {
    /// Create an empty pattern (every cell holds the sentinel).
    pub fn new() -> Self {
        Self {
            name: ArrayString::new(),
            data: vec![CELL_EMPTY; PATTERN_ROWS * PATTERN_FIELDS],
        }
    }

    /// Read a cell.
    pub fn cell(&self, row: usize, field: usize) -> i16 {
        debug_assert!(row < PATTERN_ROWS);
        debug_assert!(field < PATTERN_FIELDS);
        self.data[row * PATTERN_FIELDS + field]
    }

    /// Write a cell.
    pub fn set_cell(&mut self, row: usize, field: usize, value: i16) {
        debug_assert!(row < PATTERN_ROWS);
        debug_assert!(field < PATTERN_FIELDS);
        self.data[row * PATTERN_FIELDS + field] = value;
    }

    /// All fields of one row.
    pub fn row(&self, row: usize) -> &[i16] {
        let start = row * PATTERN_FIELDS;
        &self.data[start..start + PATTERN_FIELDS]
    }

    /// Copy this pattern's cells into `dest`, leaving `dest`'s name alone.
    pub fn copy_on(&self, dest: &mut Pattern) {
        dest.data.copy_from_slice(&self.data);
    }

    /// True if every cell is the sentinel.
    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&c| c == CELL_EMPTY)
    }

    /// The cell table has the size the accessors assume.
    pub(crate) fn is_well_formed(&self) -> bool {
        self.data.len() == PATTERN_ROWS * PATTERN_FIELDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pattern_is_empty() {
        let p = Pattern::new();
        assert!(p.is_empty());
        assert_eq!(p.cell(0, 0), CELL_EMPTY);
        assert_eq!(p.cell(PATTERN_ROWS - 1, PATTERN_FIELDS - 1), CELL_EMPTY);
    }

    #[test]
    fn cell_write_read() {
        let mut p = Pattern::new();
        p.set_cell(10, FIELD_NOTE, 60);
        p.set_cell(10, FIELD_VOLUME, 15);

        assert_eq!(p.cell(10, FIELD_NOTE), 60);
        assert_eq!(p.cell(10, FIELD_VOLUME), 15);
        assert_eq!(p.cell(10, FIELD_OCTAVE), CELL_EMPTY);
        assert!(!p.is_empty());
    }

    #[test]
    fn copy_on_copies_cells_not_name() {
        let mut src = Pattern::new();
        src.set_cell(0, 0, 42);
        let _ = src.name.try_push_str("source");

        let mut dest = Pattern::new();
        let _ = dest.name.try_push_str("dest");
        src.copy_on(&mut dest);

        assert_eq!(dest.cell(0, 0), 42);
        assert_eq!(dest.name.as_str(), "dest");
    }

    #[test]
    fn row_slice_has_all_fields() {
        let mut p = Pattern::new();
        p.set_cell(5, 3, 7);
        let row = p.row(5);
        assert_eq!(row.len(), PATTERN_FIELDS);
        assert_eq!(row[3], 7);
    }
}
