//! Editor cursor and selection state.

/// A point in the pattern editor: channel, sub-column within the channel,
/// and row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectionPoint {
    /// Channel.
    pub x_coarse: u8,
    /// Sub-column within the channel (note, instrument digits, effect
    /// digits).
    pub x_fine: u8,
    /// Row.
    pub y: u16,
}

/// Everything needed to restore where the user was: cursor, selection
/// endpoints, current order, and whether a half-entered digit is pending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CursorPosition {
    pub cursor: SelectionPoint,
    pub sel_start: SelectionPoint,
    pub sel_end: SelectionPoint,
    pub order: u16,
    pub half_digit: bool,
}

/// Pattern editor state.
#[derive(Clone, Debug)]
pub struct EditorState {
    pub pos: CursorPosition,
    pub base_octave: u8,
    /// Rows the cursor advances after data entry.
    pub step_size: u8,
    pub edit_mode: bool,
    pub selected_instrument: u8,
}

impl Default for EditorState {
    fn default() -> Self {
        Self {
            pos: CursorPosition::default(),
            base_octave: 4,
            step_size: 1,
            edit_mode: false,
            selected_instrument: 0,
        }
    }
}

impl EditorState {
    /// Move the cursor, wrapping within the pattern.
    pub fn move_cursor(&mut self, drow: i32, dchannel: i32, max_rows: u16, max_channels: u8) {
        if drow != 0 {
            let row = self.pos.cursor.y as i32 + drow;
            self.pos.cursor.y = row.rem_euclid(max_rows as i32) as u16;
        }
        if dchannel != 0 {
            let channel = self.pos.cursor.x_coarse as i32 + dchannel;
            self.pos.cursor.x_coarse = channel.rem_euclid(max_channels as i32) as u8;
        }
        self.pos.half_digit = false;
    }

    /// Advance cursor down by step_size (used after data entry).
    pub fn advance_by_step(&mut self, max_rows: u16) {
        self.move_cursor(self.step_size as i32, 0, max_rows, 1);
    }

    /// Extend (or start) the selection by moving the cursor with shift held.
    pub fn select_move(&mut self, drow: i32, dchannel: i32, max_rows: u16, max_channels: u8) {
        if self.pos.sel_start == self.pos.sel_end {
            self.pos.sel_start = self.pos.cursor;
        }
        if drow != 0 {
            let row = (self.pos.cursor.y as i32 + drow).clamp(0, max_rows as i32 - 1);
            self.pos.cursor.y = row as u16;
        }
        if dchannel != 0 {
            let channel =
                (self.pos.cursor.x_coarse as i32 + dchannel).clamp(0, max_channels as i32 - 1);
            self.pos.cursor.x_coarse = channel as u8;
        }
        self.pos.sel_end = self.pos.cursor;
    }

    /// Collapse the selection to the cursor.
    pub fn clear_selection(&mut self) {
        self.pos.sel_start = self.pos.cursor;
        self.pos.sel_end = self.pos.cursor;
    }
}
