//! Session server: the authoritative peer. Applies incoming commands to its
//! own song and re-broadcasts them to every other connected client.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::bounded;
use rmpv::Value;

use crate::message::{methods, ClientId, Frame, Request};
use crate::peer::{
    handle_request, spin_send_to, wait_or_stop, Dispatch, PeerCore, PeerCx, SessionHost,
};
use crate::socket::{MsgSocket, NetError};
use crate::task_queue::{oneshot, TaskQueue};

/// Net-thread state of the server. Only the net loop ever sees one.
pub struct ServerNetState {
    core: PeerCore,
    /// Every client that has ever sent us a frame. There is no explicit
    /// disconnect; stale entries just fail their sends.
    connected: HashSet<ClientId>,
    /// The client whose request is currently being handled; excluded from
    /// broadcasts so the originator does not get its own command back.
    current_client: Option<ClientId>,
}

impl PeerCx for ServerNetState {
    fn core(&mut self) -> &mut PeerCore {
        &mut self.core
    }
}

impl ServerNetState {
    /// Forward a command to every connected client except the originator.
    fn broadcast_command(&mut self, command: Value) {
        let targets: Vec<ClientId> = self
            .connected
            .iter()
            .filter(|id| Some(*id) != self.current_client.as_ref())
            .cloned()
            .collect();
        for target in targets {
            let Some(addr) = target.addr() else {
                log::warn!("client id does not map to an address; dropping broadcast");
                continue;
            };
            self.core.last_request_id += 1;
            let id = self.core.last_request_id;
            let frame = Frame::Request(Request {
                id,
                method: methods::EXEC_COMMAND.to_owned(),
                args: Value::Array(vec![command.clone()]),
            })
            .encode();
            if spin_send_to(&self.core.socket, &frame, addr, &self.core.stop) {
                // Register the id so the client's nil reply resolves cleanly;
                // nobody waits on the future.
                let (promise, _future) = oneshot();
                self.core.pending.insert(id, promise);
                log::info!("rpc: [{}] execCommand >> {}", id, addr);
            } else {
                log::warn!("dropping command broadcast to {}", addr);
            }
        }
    }
}

/// The server half of a replication session.
pub struct NetServer {
    host: Arc<dyn SessionHost>,
    tasks: Arc<TaskQueue<ServerNetState>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl NetServer {
    pub fn new(host: Arc<dyn SessionHost>) -> Self {
        Self {
            host,
            tasks: Arc::new(TaskQueue::new()),
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Bind and start serving on another thread. Returns the bound address
    /// (useful when `port` is 0).
    pub fn start(&mut self, port: u16) -> Result<SocketAddr, NetError> {
        assert!(self.thread.is_none(), "net server is already running");
        log::info!("starting net server on port {}", port);

        let (ready_tx, ready_rx) = bounded(1);
        let tasks = self.tasks.clone();
        let host = self.host.clone();
        let stop = self.stop.clone();
        self.thread = Some(std::thread::spawn(move || {
            run_net_thread(port, tasks, host, stop, ready_tx);
        }));

        match ready_rx.recv() {
            Ok(result) => result,
            Err(_) => Err(NetError::ThreadStart),
        }
    }

    /// Push a locally-performed command to every connected client.
    pub fn broadcast_command_async(&self, command: Value) {
        self.tasks.enqueue(move |state: &mut ServerNetState| {
            state.current_client = None;
            state.broadcast_command(command);
        });
    }

    /// Stop the net thread and resolve all outstanding futures empty.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for NetServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The server's method table: shared base, with command execution extended
/// to re-broadcast.
fn server_dispatch() -> Dispatch<ServerNetState> {
    let mut dispatch = Dispatch::base();
    dispatch.insert(methods::EXEC_COMMAND, |state: &mut ServerNetState, args| {
        let (command,): (Value,) = rmpv::ext::from_value(args).map_err(|e| e.to_string())?;
        let stop = state.core.stop.clone();
        wait_or_stop(state.core.host.apply_remote(command.clone()), &stop);
        state.broadcast_command(command);
        Ok(Value::Nil)
    });
    dispatch
}

fn run_net_thread(
    port: u16,
    tasks: Arc<TaskQueue<ServerNetState>>,
    host: Arc<dyn SessionHost>,
    stop: Arc<AtomicBool>,
    ready_tx: crossbeam_channel::Sender<Result<SocketAddr, NetError>>,
) {
    let socket = match MsgSocket::bind(&format!("0.0.0.0:{}", port)) {
        Ok(socket) => match socket.local_addr() {
            Ok(addr) => {
                let _ = ready_tx.send(Ok(addr));
                socket
            }
            Err(e) => {
                let _ = ready_tx.send(Err(NetError::Bind(e.to_string())));
                return;
            }
        },
        Err(e) => {
            log::error!("error binding session socket: {}", e);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let dispatch = server_dispatch();
    let mut state = ServerNetState {
        core: PeerCore::new(socket, host, stop.clone()),
        connected: HashSet::new(),
        current_client: None,
    };

    while !stop.load(Ordering::Relaxed) {
        std::thread::yield_now();

        tasks.process_tasks(&mut state);

        let Some((from, bytes)) = state.core.socket.try_recv() else {
            continue;
        };
        let client = ClientId::from_addr(from);
        if state.connected.insert(client.clone()) {
            log::info!("new session client: {}", from);
        }

        match Frame::decode(&bytes) {
            Ok(Frame::Request(request)) => {
                state.current_client = Some(client);
                let response = handle_request(&dispatch, &mut state, request);
                let frame = Frame::Response(response).encode();
                if !spin_send_to(&state.core.socket, &frame, from, &stop) {
                    break;
                }
                state.current_client = None;
            }
            Ok(Frame::Response(response)) => state.core.handle_response(response),
            Err(e) => log::error!("bad frame from {}: {}", from, e),
        }
    }

    state.core.drain_pending();
}
