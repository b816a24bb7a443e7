//! Undo/redo stack for song editing.

use std::collections::VecDeque;

use crate::command::Command;
use crate::ui::editor_state::CursorPosition;

/// A single undoable operation: the executed command plus the cursor
/// positions before and after it ran.
#[derive(Clone, Debug)]
pub struct UndoStep {
    pub command: Command,
    pub pos_pre: CursorPosition,
    pub pos_post: CursorPosition,
}

/// Bounded undo/redo stack.
///
/// `current_point` partitions the deque: everything before it is undoable,
/// everything at or after it is redoable. Steps returned by `undo`/`redo`
/// borrow the stack and are valid until the next `push` or `clear`; the
/// caller reverts or re-execs the command and restores the cursor.
#[derive(Default)]
pub struct UndoStack {
    entries: VecDeque<UndoStep>,
    current_point: usize,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an executed command. Discards the redo tail, then evicts from
    /// the front while over `max_steps`.
    pub fn push(&mut self, step: UndoStep, max_steps: usize) {
        self.entries.truncate(self.current_point);
        self.entries.push_back(step);
        self.current_point = self.entries.len();
        while self.entries.len() > max_steps {
            self.entries.pop_front();
            self.current_point = self.current_point.saturating_sub(1);
        }
    }

    /// Step back; the caller applies `command.revert` and restores
    /// `pos_pre`.
    pub fn undo(&mut self) -> Option<&UndoStep> {
        if self.current_point == 0 {
            return None;
        }
        self.current_point -= 1;
        Some(&self.entries[self.current_point])
    }

    /// Step forward; the caller applies `command.exec` and restores
    /// `pos_post`.
    pub fn redo(&mut self) -> Option<&UndoStep> {
        if self.current_point >= self.entries.len() {
            return None;
        }
        let step = &self.entries[self.current_point];
        self.current_point += 1;
        Some(step)
    }

    /// Empty the stack (on song load).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_point = 0;
    }

    pub fn can_undo(&self) -> bool {
        self.current_point > 0
    }

    pub fn can_redo(&self) -> bool {
        self.current_point < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_point(&self) -> usize {
        self.current_point
    }
}
