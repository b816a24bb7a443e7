//! kilotone — a collaborative multi-chip chiptune tracker.
//!
//! The root crate holds the session shell: the command model every edit
//! flows through, the undo stack, the cursor state, and the glue between
//! the GUI thread and the replication peers in `kt-net`.

pub mod app;
pub mod command;
pub mod ui;
