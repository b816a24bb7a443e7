//! Options for connecting to or hosting a session.

/// Default session port.
pub const DEFAULT_PORT: u16 = 7826;

/// Options for joining an existing session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    /// `host:port` of the session server.
    pub address: String,
}

/// Options for hosting a new session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostOptions {
    pub port: u16,
}

/// Options for connecting to a session, or hosting a new one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    pub connect: ConnectOptions,
    pub host: HostOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect: ConnectOptions {
                address: format!("127.0.0.1:{}", DEFAULT_PORT),
            },
            host: HostOptions { port: DEFAULT_PORT },
        }
    }
}
