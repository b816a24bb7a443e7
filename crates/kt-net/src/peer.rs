//! Code shared by both replication peers: the method dispatch table, the
//! request handler, and the net-thread core state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rmpv::Value;

use crate::message::{methods, Frame, Request, Response, StatusCode};
use crate::socket::MsgSocket;
use crate::task_queue::{oneshot, FuturePoll, Promise, TaskFuture};

/// GUI-thread capability handed to the networking layer. Every handler that
/// needs the song goes through one of these; the implementation hops to the
/// GUI thread and the net thread blocks on the returned future.
pub trait SessionHost: Send + Sync {
    /// Serialize the current song to its opaque snapshot form.
    fn save_song(&self) -> TaskFuture<Vec<u8>>;
    /// Deserialize and apply a remote command.
    fn apply_remote(&self, command: Value) -> TaskFuture<()>;
    /// Install a downloaded snapshot; false if it failed to load.
    fn install_song(&self, bytes: Vec<u8>) -> TaskFuture<bool>;
}

/// Outcome of an RPC as seen by the caller. Empty when the peer was
/// stopped, the connection died, or the server reported an error status.
#[derive(Default)]
pub struct RpcResponse {
    pub message: Option<Response>,
}

impl RpcResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Deserialize the result payload. Type errors are soft: logged, `None`.
    pub fn decode<T: serde::de::DeserializeOwned>(self) -> Option<T> {
        let message = self.message?;
        if message.status != StatusCode::Ok {
            return None;
        }
        match rmpv::ext::from_value(message.result) {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("response payload type error: {}", e);
                None
            }
        }
    }
}

/// Block on a future from another thread, giving up when the stop flag is
/// raised so teardown can never wedge the net loop.
pub fn wait_or_stop<R>(future: TaskFuture<R>, stop: &AtomicBool) -> Option<R> {
    loop {
        match future.poll() {
            FuturePoll::Ready(value) => return Some(value),
            FuturePoll::Gone => return None,
            FuturePoll::Pending => {
                if stop.load(Ordering::Relaxed) {
                    return None;
                }
                std::thread::yield_now();
            }
        }
    }
}

/// Net-thread state common to both peers. Lives inside the net loop; tasks
/// enqueued from other threads receive it by `&mut`, which is the only way
/// in.
pub struct PeerCore {
    pub socket: MsgSocket,
    pub host: Arc<dyn SessionHost>,
    pub pending: HashMap<u64, Promise<RpcResponse>>,
    pub last_request_id: u64,
    pub stop: Arc<AtomicBool>,
}

impl PeerCore {
    pub fn new(socket: MsgSocket, host: Arc<dyn SessionHost>, stop: Arc<AtomicBool>) -> Self {
        Self {
            socket,
            host,
            pending: HashMap::new(),
            last_request_id: 0,
            stop,
        }
    }

    /// Issue a request on the connected socket. Spin-yields on a full send
    /// buffer; resolves empty immediately if the peer is stopped or the
    /// send fails.
    pub fn rpc_call(&mut self, method: &str, args: Value) -> TaskFuture<RpcResponse> {
        self.last_request_id += 1;
        let id = self.last_request_id;
        let frame = Frame::Request(Request {
            id,
            method: method.to_owned(),
            args,
        })
        .encode();

        loop {
            if self.stop.load(Ordering::Relaxed) {
                return TaskFuture::ready(RpcResponse::empty());
            }
            match self.socket.try_send(&frame) {
                Ok(true) => break,
                Ok(false) => std::thread::yield_now(),
                Err(e) => {
                    log::error!("rpc send failed: {}", e);
                    return TaskFuture::ready(RpcResponse::empty());
                }
            }
        }
        log::info!("rpc: [{}] {} >> remote", id, method);

        let (promise, future) = oneshot();
        self.pending.insert(id, promise);
        future
    }

    /// Fulfill the pending promise matching a received response.
    pub fn handle_response(&mut self, response: Response) {
        let id = response.id;
        let message = if response.status == StatusCode::Ok {
            Some(response)
        } else {
            log::error!(
                "rpc: [{}] remote reported E{} {}",
                id,
                response.status as u32,
                response.status.as_str()
            );
            None
        };
        match self.pending.remove(&id) {
            Some(promise) => {
                log::info!("rpc: [{}] remote >> resolved", id);
                promise.fulfill(RpcResponse { message });
            }
            None => log::error!("rpc: [{}] response for a request we never made", id),
        }
    }

    /// Resolve every outstanding request with an empty response.
    pub fn drain_pending(&mut self) {
        for (_, promise) in self.pending.drain() {
            promise.fulfill(RpcResponse::empty());
        }
    }
}

/// Access to the shared core from a peer's net-thread state.
pub trait PeerCx {
    fn core(&mut self) -> &mut PeerCore;
}

/// One RPC method handler: deserialize args, run, serialize the result.
pub type MethodFn<Cx> = fn(&mut Cx, Value) -> Result<Value, String>;

/// The static method table.
pub struct Dispatch<Cx> {
    methods: HashMap<&'static str, MethodFn<Cx>>,
}

impl<Cx: PeerCx> Dispatch<Cx> {
    /// The methods both peers serve.
    pub fn base() -> Self {
        let mut table: HashMap<&'static str, MethodFn<Cx>> = HashMap::new();
        table.insert(methods::GET_FILE, |cx, _args| {
            let core = cx.core();
            let stop = core.stop.clone();
            let bytes = wait_or_stop(core.host.save_song(), &stop).unwrap_or_default();
            rmpv::ext::to_value(bytes).map_err(|e| e.to_string())
        });
        table.insert(methods::EXEC_COMMAND, |cx, args| {
            let (command,): (Value,) = rmpv::ext::from_value(args).map_err(|e| e.to_string())?;
            let core = cx.core();
            let stop = core.stop.clone();
            wait_or_stop(core.host.apply_remote(command), &stop);
            Ok(Value::Nil)
        });
        Self { methods: table }
    }
}

impl<Cx> Dispatch<Cx> {
    /// Replace or add a method handler.
    pub fn insert(&mut self, name: &'static str, handler: MethodFn<Cx>) {
        self.methods.insert(name, handler);
    }
}

/// Look up and run the handler for an inbound request, composing the reply.
pub fn handle_request<Cx>(dispatch: &Dispatch<Cx>, cx: &mut Cx, request: Request) -> Response {
    log::info!("rpc: [{}] remote >> {}", request.id, request.method);
    match dispatch.methods.get(request.method.as_str()) {
        Some(handler) => match handler(cx, request.args) {
            Ok(result) => {
                log::info!("rpc: [{}] >> remote", request.id);
                Response::ok(request.id, result)
            }
            Err(e) => {
                log::error!("type error while handling {}: {}", request.method, e);
                Response::error(request.id, StatusCode::MethodWrongArgs)
            }
        },
        None => {
            log::error!("remote tried to call non-existent method {}", request.method);
            Response::error(request.id, StatusCode::MethodNotFound)
        }
    }
}

/// Send a frame to a specific address, spinning on a full buffer. False if
/// the peer stopped or the send errored; the caller drops the frame.
pub fn spin_send_to(
    socket: &MsgSocket,
    frame: &[u8],
    addr: std::net::SocketAddr,
    stop: &AtomicBool,
) -> bool {
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        match socket.try_send_to(frame, addr) {
            Ok(true) => return true,
            Ok(false) => std::thread::yield_now(),
            Err(e) => {
                log::warn!("send to {} failed: {}", addr, e);
                return false;
            }
        }
    }
}

/// As [`spin_send_to`], for the connected socket.
pub fn spin_send(socket: &MsgSocket, frame: &[u8], stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        match socket.try_send(frame) {
            Ok(true) => return true,
            Ok(false) => std::thread::yield_now(),
            Err(e) => {
                log::warn!("send failed: {}", e);
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_queue::TaskQueue;

    struct NullHost;

    impl SessionHost for NullHost {
        fn save_song(&self) -> TaskFuture<Vec<u8>> {
            TaskFuture::ready(vec![1, 2, 3])
        }
        fn apply_remote(&self, _command: Value) -> TaskFuture<()> {
            TaskFuture::ready(())
        }
        fn install_song(&self, _bytes: Vec<u8>) -> TaskFuture<bool> {
            TaskFuture::ready(true)
        }
    }

    struct TestCx {
        core: PeerCore,
    }

    impl PeerCx for TestCx {
        fn core(&mut self) -> &mut PeerCore {
            &mut self.core
        }
    }

    fn test_cx() -> TestCx {
        TestCx {
            core: PeerCore::new(
                MsgSocket::bind("127.0.0.1:0").unwrap(),
                Arc::new(NullHost),
                Arc::new(AtomicBool::new(false)),
            ),
        }
    }

    #[test]
    fn get_file_returns_snapshot_bytes() {
        let dispatch = Dispatch::base();
        let mut cx = test_cx();
        let response = handle_request(
            &dispatch,
            &mut cx,
            Request {
                id: 1,
                method: methods::GET_FILE.into(),
                args: Value::Array(vec![]),
            },
        );
        assert_eq!(response.status, StatusCode::Ok);
        assert_eq!(response.id, 1);
        let bytes: Vec<u8> = RpcResponse {
            message: Some(response),
        }
        .decode()
        .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn unknown_method_not_found() {
        let dispatch = Dispatch::base();
        let mut cx = test_cx();
        let response = handle_request(
            &dispatch,
            &mut cx,
            Request {
                id: 2,
                method: "frobnicate".into(),
                args: Value::Nil,
            },
        );
        assert_eq!(response.status, StatusCode::MethodNotFound);
        assert_eq!(response.result, Value::Nil);
    }

    #[test]
    fn bad_args_wrong_args() {
        let dispatch = Dispatch::base();
        let mut cx = test_cx();
        let response = handle_request(
            &dispatch,
            &mut cx,
            Request {
                id: 3,
                method: methods::EXEC_COMMAND.into(),
                // Not an argument array at all.
                args: Value::from(42),
            },
        );
        assert_eq!(response.status, StatusCode::MethodWrongArgs);
        assert_eq!(response.result, Value::Nil);
    }

    #[test]
    fn rpc_on_stopped_peer_resolves_empty_immediately() {
        let mut cx = test_cx();
        cx.core.stop.store(true, Ordering::Relaxed);
        let future = cx.core.rpc_call(methods::GET_FILE, Value::Array(vec![]));
        let response = future.wait().unwrap();
        assert!(response.message.is_none());
        assert!(cx.core.pending.is_empty());
    }

    #[test]
    fn drain_pending_resolves_empty() {
        let mut cx = test_cx();
        // Connect to ourselves so the send lands somewhere harmless.
        let addr = cx.core.socket.local_addr().unwrap();
        cx.core.socket.connect(&addr.to_string()).unwrap();

        let future = cx.core.rpc_call(methods::GET_FILE, Value::Array(vec![]));
        assert_eq!(cx.core.pending.len(), 1);
        cx.core.drain_pending();
        let response = future.wait().unwrap();
        assert!(response.message.is_none());
    }

    #[test]
    fn response_fulfills_matching_request() {
        let mut cx = test_cx();
        let addr = cx.core.socket.local_addr().unwrap();
        cx.core.socket.connect(&addr.to_string()).unwrap();

        let future = cx.core.rpc_call(methods::GET_FILE, Value::Array(vec![]));
        cx.core.handle_response(Response::ok(1, Value::from(5)));
        let response = future.wait().unwrap();
        assert_eq!(response.message.unwrap().result, Value::from(5));
    }

    #[test]
    fn error_status_resolves_to_empty_message() {
        let mut cx = test_cx();
        let addr = cx.core.socket.local_addr().unwrap();
        cx.core.socket.connect(&addr.to_string()).unwrap();

        let future = cx.core.rpc_call(methods::GET_FILE, Value::Array(vec![]));
        cx.core
            .handle_response(Response::error(1, StatusCode::MethodNotFound));
        assert!(future.wait().unwrap().message.is_none());
    }

    #[test]
    fn wait_or_stop_gives_up_on_stop() {
        let queue: TaskQueue<()> = TaskQueue::new();
        let future = queue.enqueue(|_| 1);
        let stop = AtomicBool::new(true);
        // Nobody ever drains the queue; the stop flag unblocks us.
        assert_eq!(wait_or_stop(future, &stop), None);
    }
}
