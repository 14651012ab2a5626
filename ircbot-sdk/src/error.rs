//! Error types surfaced by the client engine.

use std::io;
use std::time::Duration;

/// Dialing the configured server failed.
///
/// Returned by [`Client::connect`](crate::client::Client::connect) and by the
/// read loop when its single automatic reconnect attempt fails.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("timed out after {timeout:?} dialing {addr}")]
    Timeout { addr: String, timeout: Duration },
    #[error("error dialing {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// A raw line could not be turned into an [`Event`](crate::event::Event).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    /// A `:source` prefix with no command after it.
    #[error("no command after prefix in {raw:?}")]
    MissingCode { raw: String },
}

/// Writing an outbound line failed.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("not connected")]
    NotConnected,
    #[error("write failed: {0}")]
    Io(#[from] io::Error),
}

/// A server entry failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{server}: server address not specified")]
    MissingAddress { server: String },
    #[error("{server}: server port not specified")]
    MissingPort { server: String },
    #[error("{server}: nickname {nick:?} is too short")]
    NickTooShort { server: String, nick: String },
}
