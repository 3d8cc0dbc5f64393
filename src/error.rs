//! Error types for webmail-bridge

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The server rejected the supplied credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Transport failure or timeout. The connection is no longer usable.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Session expired")]
    SessionNotFound,

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("{0}")]
    Send(String),

    /// The server answered a command with `NO` or `BAD`.
    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this failure means the underlying connection is dead and
    /// its session must not be handed out again.
    #[must_use]
    pub const fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
