//! Application state and session wiring — no GUI dependency.
//!
//! `AppCore` is the GUI-thread-owned heart of the app: the song, the undo
//! stack, and the cursor. `Shell` wraps it with the task queue other
//! threads use to reach it and with the live replication session, if any.

use std::net::SocketAddr;
use std::sync::Arc;

use rmpv::Value;

use kt_ir::Song;
use kt_net::{NetClient, NetError, NetServer, SessionHost, SessionOptions, TaskFuture, TaskQueue};

use crate::command::{Command, Origin};
use crate::ui::editor_state::EditorState;
use crate::ui::undo::{UndoStack, UndoStep};

/// Default bound on the undo stack.
pub const MAX_UNDO_STEPS: usize = 128;

/// Song, undo stack, and editor cursor. Owned by the GUI thread; other
/// threads reach it only through [`GuiBridge`].
pub struct AppCore {
    pub song: Song,
    pub undo: UndoStack,
    pub editor: EditorState,
    pub modified: bool,
    pub max_undo_steps: usize,
}

impl Default for AppCore {
    fn default() -> Self {
        Self::new()
    }
}

impl AppCore {
    pub fn new() -> Self {
        Self {
            song: Song::new(),
            undo: UndoStack::new(),
            editor: EditorState::default(),
            modified: false,
            max_undo_steps: MAX_UNDO_STEPS,
        }
    }

    /// Execute a command against the song. Local commands that modified the
    /// song are recorded on the undo stack; remote ones are not, so undo
    /// only unwinds this user's edits. Returns the executed command when it
    /// modified the song (the caller replicates it).
    pub fn perform(&mut self, mut command: Command, origin: Origin) -> Option<Command> {
        let pos_pre = self.editor.pos;
        if !command.exec(self, origin) {
            return None;
        }
        if origin == Origin::Local {
            let step = UndoStep {
                command: command.clone(),
                pos_pre,
                pos_post: self.editor.pos,
            };
            let max = self.max_undo_steps;
            self.undo.push(step, max);
        }
        Some(command)
    }

    /// Undo the latest local command and restore the cursor.
    pub fn undo(&mut self) -> bool {
        let (mut command, pos) = match self.undo.undo() {
            Some(step) => (step.command.clone(), step.pos_pre),
            None => return false,
        };
        command.revert(self, Origin::Local);
        self.editor.pos = pos;
        true
    }

    /// Redo the latest undone command and restore the cursor.
    pub fn redo(&mut self) -> bool {
        let (mut command, pos) = match self.undo.redo() {
            Some(step) => (step.command.clone(), step.pos_post),
            None => return false,
        };
        command.exec(self, Origin::Local);
        self.editor.pos = pos;
        true
    }

    /// Deserialize and apply a command received from the network.
    pub fn apply_remote_value(&mut self, value: &Value) {
        match Command::from_value(value) {
            Some(command) => {
                self.perform(command, Origin::Remote);
            }
            None => log::error!("dropping malformed remote command"),
        }
    }

    /// Replace the song with a downloaded snapshot. On failure the session
    /// continues with the prior song.
    pub fn install_song(&mut self, bytes: &[u8]) -> bool {
        match kt_ir::load_song(bytes) {
            Ok(song) => {
                self.song = song;
                self.undo.clear();
                self.editor = EditorState::default();
                self.modified = false;
                true
            }
            Err(e) => {
                log::error!("error loading session song: {}", e);
                false
            }
        }
    }
}

/// Handle other threads use to run work on the GUI thread.
#[derive(Clone)]
pub struct GuiBridge {
    tasks: Arc<TaskQueue<AppCore>>,
}

impl GuiBridge {
    pub fn run_on_gui_thread<R, F>(&self, func: F) -> TaskFuture<R>
    where
        F: FnOnce(&mut AppCore) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.tasks.enqueue(func)
    }
}

/// The networking layer's view of this app.
struct ShellHost {
    gui: GuiBridge,
}

impl SessionHost for ShellHost {
    fn save_song(&self) -> TaskFuture<Vec<u8>> {
        self.gui.run_on_gui_thread(|core| kt_ir::save_song(&core.song))
    }

    fn apply_remote(&self, command: Value) -> TaskFuture<()> {
        self.gui
            .run_on_gui_thread(move |core| core.apply_remote_value(&command))
    }

    fn install_song(&self, bytes: Vec<u8>) -> TaskFuture<bool> {
        self.gui.run_on_gui_thread(move |core| core.install_song(&bytes))
    }
}

/// A live replication session, if any.
pub enum Session {
    Hosting(NetServer),
    Joined(NetClient),
}

/// The headless application shell: core state, the GUI task queue, and the
/// session.
pub struct Shell {
    pub core: AppCore,
    gui_tasks: Arc<TaskQueue<AppCore>>,
    pub session: Option<Session>,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    pub fn new() -> Self {
        Self {
            core: AppCore::new(),
            gui_tasks: Arc::new(TaskQueue::new()),
            session: None,
        }
    }

    pub fn bridge(&self) -> GuiBridge {
        GuiBridge {
            tasks: self.gui_tasks.clone(),
        }
    }

    fn session_host(&self) -> Arc<dyn SessionHost> {
        Arc::new(ShellHost { gui: self.bridge() })
    }

    /// Host a session on the configured port. Returns the bound address.
    pub fn host_session(&mut self, options: &SessionOptions) -> Result<SocketAddr, NetError> {
        let mut server = NetServer::new(self.session_host());
        let addr = server.start(options.host.port)?;
        self.session = Some(Session::Hosting(server));
        Ok(addr)
    }

    /// Join a session at the configured address and start downloading the
    /// song.
    pub fn join_session(&mut self, options: &SessionOptions) -> Result<(), NetError> {
        let mut client = NetClient::new(self.session_host());
        client.start(&options.connect.address)?;
        client.download_file_async();
        self.session = Some(Session::Joined(client));
        Ok(())
    }

    pub fn leave_session(&mut self) {
        self.session = None;
    }

    /// True while a joined session is still fetching the song.
    pub fn is_downloading_file(&self) -> bool {
        match &self.session {
            Some(Session::Joined(client)) => client.is_downloading_file(),
            _ => false,
        }
    }

    /// Run queued GUI-thread work. The event loop calls this every frame.
    pub fn pump(&mut self) {
        let tasks = self.gui_tasks.clone();
        tasks.process_tasks(&mut self.core);
    }

    /// Execute a local command and replicate it to the session.
    pub fn perform(&mut self, command: Command) -> bool {
        let Some(done) = self.core.perform(command, Origin::Local) else {
            return false;
        };
        if let Some(session) = &self.session {
            match done.to_value() {
                Some(value) => match session {
                    Session::Hosting(server) => server.broadcast_command_async(value),
                    Session::Joined(client) => client.send_command_async(value),
                },
                None => log::error!("command did not serialize; not replicated"),
            }
        }
        true
    }

    pub fn undo(&mut self) -> bool {
        self.core.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.core.redo()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CloneDepth;

    #[test]
    fn perform_records_undo_and_reports_command() {
        let mut core = AppCore::new();
        let done = core.perform(
            Command::order_add(None, 0, CloneDepth::Shallow),
            Origin::Local,
        );
        assert!(done.is_some());
        assert!(core.undo.can_undo());
        assert!(core.modified);
        assert_eq!(core.song.orders_len(), 1);
    }

    #[test]
    fn remote_commands_do_not_touch_undo() {
        let mut core = AppCore::new();
        core.perform(
            Command::order_add(None, 0, CloneDepth::Shallow),
            Origin::Remote,
        );
        assert_eq!(core.song.orders_len(), 1);
        assert!(!core.undo.can_undo());
    }

    #[test]
    fn failed_command_records_nothing() {
        let mut core = AppCore::new();
        // Nothing to delete on an empty song.
        let done = core.perform(Command::order_delete(0), Origin::Local);
        assert!(done.is_none());
        assert!(!core.undo.can_undo());
        assert!(!core.modified);
    }

    #[test]
    fn install_song_clears_undo() {
        let mut core = AppCore::new();
        core.perform(
            Command::order_add(None, 0, CloneDepth::Shallow),
            Origin::Local,
        );
        let bytes = kt_ir::save_song(&core.song);
        assert!(core.install_song(&bytes));
        assert!(!core.undo.can_undo());
        assert!(!core.modified);

        // Bad bytes keep the prior song.
        assert!(!core.install_song(b"garbage"));
        assert_eq!(core.song.orders_len(), 1);
    }

    #[test]
    fn local_order_add_moves_cursor_remote_does_not() {
        let mut core = AppCore::new();
        core.perform(
            Command::order_add(None, 0, CloneDepth::Shallow),
            Origin::Local,
        );
        core.perform(
            Command::order_add(None, 1, CloneDepth::Shallow),
            Origin::Local,
        );
        assert_eq!(core.editor.pos.order, 1);

        core.perform(
            Command::order_add(None, 2, CloneDepth::Shallow),
            Origin::Remote,
        );
        assert_eq!(core.editor.pos.order, 1);
    }
}
