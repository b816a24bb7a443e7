//! Session client: joins a hosted session, downloads the song, and relays
//! commands both ways.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::bounded;
use rmpv::Value;

use crate::message::{methods, Frame};
use crate::peer::{
    handle_request, spin_send, wait_or_stop, Dispatch, PeerCore, PeerCx, SessionHost,
};
use crate::socket::{MsgSocket, NetError};
use crate::task_queue::TaskQueue;

/// Net-thread state of the client. Only the net loop ever sees one.
pub struct ClientNetState {
    core: PeerCore,
}

impl PeerCx for ClientNetState {
    fn core(&mut self) -> &mut PeerCore {
        &mut self.core
    }
}

/// The client half of a replication session.
pub struct NetClient {
    host: Arc<dyn SessionHost>,
    tasks: Arc<TaskQueue<ClientNetState>>,
    worker_tasks: Arc<TaskQueue<()>>,
    stop: Arc<AtomicBool>,
    stop_worker: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    worker_thread: Option<JoinHandle<()>>,
    downloading_file: Arc<AtomicBool>,
}

impl NetClient {
    pub fn new(host: Arc<dyn SessionHost>) -> Self {
        Self {
            host,
            tasks: Arc::new(TaskQueue::new()),
            worker_tasks: Arc::new(TaskQueue::new()),
            stop: Arc::new(AtomicBool::new(false)),
            stop_worker: Arc::new(AtomicBool::new(false)),
            thread: None,
            worker_thread: None,
            downloading_file: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Connect to `address` (`host:port`) and start the net and worker
    /// threads.
    pub fn start(&mut self, address: &str) -> Result<(), NetError> {
        assert!(self.thread.is_none(), "net client is already running");
        log::info!("starting net client, connecting to {}", address);

        let (ready_tx, ready_rx) = bounded(1);
        let tasks = self.tasks.clone();
        let host = self.host.clone();
        let stop = self.stop.clone();
        let address = address.to_owned();
        self.thread = Some(std::thread::spawn(move || {
            run_net_thread(&address, tasks, host, stop, ready_tx);
        }));

        let worker_tasks = self.worker_tasks.clone();
        let stop_worker = self.stop_worker.clone();
        self.worker_thread = Some(std::thread::spawn(move || {
            while !stop_worker.load(Ordering::Relaxed) {
                std::thread::yield_now();
                worker_tasks.process_tasks(&mut ());
            }
        }));

        match ready_rx.recv() {
            Ok(result) => result,
            Err(_) => Err(NetError::ThreadStart),
        }
    }

    /// True while a snapshot download is in flight.
    pub fn is_downloading_file(&self) -> bool {
        self.downloading_file.load(Ordering::SeqCst)
    }

    /// Fetch the session song from the server and install it when it
    /// arrives. The blocking composition runs on the worker thread.
    pub fn download_file_async(&self) {
        if self.downloading_file.swap(true, Ordering::SeqCst) {
            log::warn!("already downloading the session file");
            return;
        }

        let rpc_future = self.tasks.enqueue(|state: &mut ClientNetState| {
            state.core.rpc_call(methods::GET_FILE, Value::Array(vec![]))
        });

        let host = self.host.clone();
        let downloading = self.downloading_file.clone();
        let stop_worker = self.stop_worker.clone();
        self.worker_tasks.enqueue(move |_| {
            let response = wait_or_stop(rpc_future, &stop_worker)
                .and_then(|inner| wait_or_stop(inner, &stop_worker))
                .unwrap_or_default();
            match response.decode::<Vec<u8>>() {
                Some(bytes) => {
                    if wait_or_stop(host.install_song(bytes), &stop_worker) == Some(false) {
                        log::error!("error loading the file fetched from the server");
                    }
                }
                None => log::error!("session file download failed"),
            }
            downloading.store(false, Ordering::SeqCst);
        });
    }

    /// Ship a serialized command to the server. Fire-and-forget.
    pub fn send_command_async(&self, command: Value) {
        self.tasks.enqueue(move |state: &mut ClientNetState| {
            let _ = state
                .core
                .rpc_call(methods::EXEC_COMMAND, Value::Array(vec![command]));
        });
    }

    /// Stop both threads and resolve all outstanding futures empty.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.stop_worker.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        if let Some(thread) = self.worker_thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for NetClient {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_net_thread(
    address: &str,
    tasks: Arc<TaskQueue<ClientNetState>>,
    host: Arc<dyn SessionHost>,
    stop: Arc<AtomicBool>,
    ready_tx: crossbeam_channel::Sender<Result<(), NetError>>,
) {
    // The socket lives on the net thread from birth.
    let socket = match MsgSocket::bind("0.0.0.0:0").and_then(|socket| {
        socket.connect(address)?;
        Ok(socket)
    }) {
        Ok(socket) => {
            let _ = ready_tx.send(Ok(()));
            socket
        }
        Err(e) => {
            log::error!("error connecting to session: {}", e);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let dispatch = Dispatch::base();
    let mut state = ClientNetState {
        core: PeerCore::new(socket, host, stop.clone()),
    };

    while !stop.load(Ordering::Relaxed) {
        std::thread::yield_now();

        tasks.process_tasks(&mut state);

        let Some((_from, bytes)) = state.core.socket.try_recv() else {
            continue;
        };
        match Frame::decode(&bytes) {
            Ok(Frame::Request(request)) => {
                let response = handle_request(&dispatch, &mut state, request);
                let frame = Frame::Response(response).encode();
                if !spin_send(&state.core.socket, &frame, &stop) {
                    break;
                }
            }
            Ok(Frame::Response(response)) => state.core.handle_response(response),
            Err(e) => log::error!("bad frame from server: {}", e),
        }
    }

    state.core.drain_pending();
}
