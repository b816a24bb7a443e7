//! Non-blocking message socket for session traffic.
//!
//! UDP datagrams carry whole frames, so framing comes for free and the
//! sender address doubles as the client identity on the server side.
//! Sockets are created on the thread that will poll them.

use std::io;
use std::net::{SocketAddr, UdpSocket};

use thiserror::Error;

/// Buffer size for incoming frames; a frame (including a song snapshot)
/// must fit in one datagram.
const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Error type for session networking.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("failed to bind socket: {0}")]
    Bind(String),
    #[error("failed to set non-blocking: {0}")]
    NonBlocking(String),
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error("malformed frame: {0}")]
    Frame(String),
    #[error("net thread did not start")]
    ThreadStart,
}

/// A non-blocking datagram socket carrying one frame per message.
pub struct MsgSocket {
    socket: UdpSocket,
    recv_buf: Vec<u8>,
}

impl MsgSocket {
    /// Bind to an address such as `"127.0.0.1:7826"`; port 0 picks a free
    /// port.
    pub fn bind(addr: &str) -> Result<Self, NetError> {
        let parsed: SocketAddr = addr
            .parse()
            .map_err(|e| NetError::Bind(format!("invalid address '{}': {}", addr, e)))?;
        let socket = UdpSocket::bind(parsed).map_err(|e| NetError::Bind(e.to_string()))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| NetError::NonBlocking(e.to_string()))?;
        Ok(Self {
            socket,
            recv_buf: vec![0u8; RECV_BUFFER_SIZE],
        })
    }

    /// Set the default peer for `try_send`.
    pub fn connect(&self, peer: &str) -> Result<(), NetError> {
        let parsed: SocketAddr = peer
            .parse()
            .map_err(|e| NetError::Connect(format!("invalid peer '{}': {}", peer, e)))?;
        self.socket
            .connect(parsed)
            .map_err(|e| NetError::Connect(e.to_string()))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Send one frame to the connected peer. `Ok(false)` means the send
    /// would have blocked and should be retried.
    pub fn try_send(&self, frame: &[u8]) -> io::Result<bool> {
        match self.socket.send(frame) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Send one frame to a specific peer.
    pub fn try_send_to(&self, frame: &[u8], addr: SocketAddr) -> io::Result<bool> {
        match self.socket.send_to(frame, addr) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Receive one frame if any is waiting.
    pub fn try_recv(&mut self) -> Option<(SocketAddr, Vec<u8>)> {
        match self.socket.recv_from(&mut self.recv_buf) {
            Ok((len, from)) => Some((from, self.recv_buf[..len].to_vec())),
            Err(e) => {
                if e.kind() != io::ErrorKind::WouldBlock {
                    log::warn!("receive error: {}", e);
                }
                None
            }
        }
    }
}
