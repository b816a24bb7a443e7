//! Replication layer for the kilotone tracker.
//!
//! A symmetric request/response RPC over a message-oriented socket. Both
//! peers can originate requests; the server additionally re-broadcasts
//! command executions to every connected client except the origin. Each
//! peer runs its own net thread (socket + pending-request map) and drains a
//! task queue between non-blocking receives; GUI-touching work is funneled
//! through the [`SessionHost`] capability.

mod client;
mod message;
mod peer;
mod server;
mod session;
mod socket;
mod task_queue;

pub use client::NetClient;
pub use message::{methods, ClientId, Frame, MessageKind, Request, Response, StatusCode};
pub use peer::{RpcResponse, SessionHost};
pub use server::NetServer;
pub use session::{ConnectOptions, HostOptions, SessionOptions, DEFAULT_PORT};
pub use socket::{MsgSocket, NetError};
pub use task_queue::{oneshot, FuturePoll, Promise, TaskFuture, TaskQueue};
