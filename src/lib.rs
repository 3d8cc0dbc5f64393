//! Webmail session bridge
//!
//! Lets a browser mail client drive an arbitrary IMAP account through
//! stateless HTTP requests. Each login opens one long-lived IMAP
//! connection, kept in a [`SessionRegistry`] under an opaque
//! [`SessionId`]; requests borrow that connection under a per-session
//! lock, fetch the newest messages, and return them as
//! [`MessageSummary`] values. Sending goes through a separate, short-lived
//! SMTP connection opened with the session's credentials.
//!
//! [`http::router`] exposes the [`Bridge`] as JSON endpoints.

mod bridge;
mod config;
mod connection;
mod error;
mod folder;
pub mod http;
mod message;
mod outbound;
mod registry;

pub use bridge::Bridge;
pub use config::{BridgeConfig, Credentials, SmtpSecurity};
pub use connection::{Connector, ImapConnection, ImapConnector, MailboxConnection};
pub use error::{Error, Result};
pub use folder::{Folder, INBOX};
pub use message::{MessageSummary, PREVIEW_LEN, RawMessage, normalize};
pub use outbound::{
    DEFAULT_SMTP_PORT, Dispatcher, Endpoint, OutgoingMessage, SmtpDispatcher, derive_outbound_host,
};
pub use registry::{ConnectionGuard, Session, SessionId, SessionRegistry};
