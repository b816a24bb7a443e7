//! Wire message grammar shared between client and server.
//!
//! Every frame is one MessagePack value: a 4-element array
//! `[kind, id, method-or-status, args-or-result]`. Nested records (command
//! payloads, method arguments) are maps tagged with field names; enums
//! travel as positive integers.

use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use rmpv::Value;

use crate::NetError;

/// RPC method names.
pub mod methods {
    /// Download the current song snapshot; client to server only.
    pub const GET_FILE: &str = "getFile";
    /// Apply a serialized command; both directions.
    pub const EXEC_COMMAND: &str = "execCommand";
}

/// Discriminant of the two frame shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Request = 0,
    Response = 1,
}

/// Outcome of a request, as reported in a response frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 0,
    MethodNotFound = 1,
    MethodWrongArgs = 2,
}

impl StatusCode {
    fn from_u64(v: u64) -> Option<Self> {
        match v {
            0 => Some(Self::Ok),
            1 => Some(Self::MethodNotFound),
            2 => Some(Self::MethodWrongArgs),
            _ => None,
        }
    }

    /// Friendly string for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "Ok",
            Self::MethodNotFound => "RPC method not found",
            Self::MethodWrongArgs => "Wrong arguments for RPC method",
        }
    }
}

/// An outbound or inbound RPC request.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub id: u64,
    pub method: String,
    /// Method arguments; an array, one element per parameter.
    pub args: Value,
}

/// A reply to a request. `result` is nil unless `status` is `Ok`.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub id: u64,
    pub status: StatusCode,
    pub result: Value,
}

impl Response {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            status: StatusCode::Ok,
            result,
        }
    }

    pub fn error(id: u64, status: StatusCode) -> Self {
        Self {
            id,
            status,
            result: Value::Nil,
        }
    }
}

/// A decoded frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Request(Request),
    Response(Response),
}

impl Frame {
    /// Pack into wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let value = match self {
            Frame::Request(req) => Value::Array(vec![
                Value::from(MessageKind::Request as u64),
                Value::from(req.id),
                Value::from(req.method.as_str()),
                req.args.clone(),
            ]),
            Frame::Response(resp) => Value::Array(vec![
                Value::from(MessageKind::Response as u64),
                Value::from(resp.id),
                Value::from(resp.status as u64),
                resp.result.clone(),
            ]),
        };
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        rmpv::encode::write_value(&mut out, &value).expect("encode into Vec");
        out
    }

    /// Parse wire bytes back into a frame.
    pub fn decode(mut bytes: &[u8]) -> Result<Frame, NetError> {
        let value = rmpv::decode::read_value(&mut bytes)
            .map_err(|e| NetError::Frame(e.to_string()))?;
        let Value::Array(mut fields) = value else {
            return Err(NetError::Frame("frame is not an array".into()));
        };
        if fields.len() != 4 {
            return Err(NetError::Frame(format!(
                "frame has {} fields, expected 4",
                fields.len()
            )));
        }
        let body = fields.pop().expect("4 fields");
        let head = fields.pop().expect("3 fields");
        let id = fields
            .pop()
            .expect("2 fields")
            .as_u64()
            .ok_or_else(|| NetError::Frame("message id is not an integer".into()))?;
        let kind = fields
            .pop()
            .expect("1 field")
            .as_u64()
            .ok_or_else(|| NetError::Frame("message kind is not an integer".into()))?;

        match kind {
            k if k == MessageKind::Request as u64 => {
                let method = head
                    .as_str()
                    .ok_or_else(|| NetError::Frame("method name is not a string".into()))?
                    .to_owned();
                Ok(Frame::Request(Request {
                    id,
                    method,
                    args: body,
                }))
            }
            k if k == MessageKind::Response as u64 => {
                let status = head
                    .as_u64()
                    .and_then(StatusCode::from_u64)
                    .ok_or_else(|| NetError::Frame("bad status code".into()))?;
                Ok(Frame::Response(Response {
                    id,
                    status,
                    result: body,
                }))
            }
            other => Err(NetError::Frame(format!("unknown message kind {}", other))),
        }
    }
}

/// Opaque identity of a connected client: the transport address rendered as
/// a byte string. Equality is byte-exact; hashing is bounded to the first
/// 16 bytes.
#[derive(Clone, Debug, Eq)]
pub struct ClientId {
    bytes: Vec<u8>,
}

impl ClientId {
    pub fn from_addr(addr: SocketAddr) -> Self {
        Self {
            bytes: addr.to_string().into_bytes(),
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The transport address this id encodes, if it parses back.
    pub fn addr(&self) -> Option<SocketAddr> {
        std::str::from_utf8(&self.bytes).ok()?.parse().ok()
    }
}

impl PartialEq for ClientId {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Hash for ClientId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let bound = self.bytes.len().min(16);
        state.write(&self.bytes[..bound]);
    }
}
