//! Session bridge
//!
//! Stateless entry points for the web surface. Each call resolves the
//! session, takes its connection lock for the duration of one bounded
//! operation, and hands back normalized data.

use crate::config::{BridgeConfig, Credentials};
use crate::connection::{Connector, MailboxConnection};
use crate::error::{Error, Result};
use crate::folder::{Folder, INBOX};
use crate::message::{MessageSummary, normalize};
use crate::outbound::{Dispatcher, OutgoingMessage};
use crate::registry::{SessionId, SessionRegistry, with_timeout};
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, warn};

/// Ties the session registry to the outbound dispatcher.
pub struct Bridge<K: Connector, D: Dispatcher> {
    registry: SessionRegistry<K>,
    dispatcher: D,
    fetch_limit: usize,
    timeout: Duration,
}

impl<K: Connector, D: Dispatcher> Bridge<K, D> {
    #[must_use]
    pub fn new(connector: K, dispatcher: D, fetch_limit: usize, timeout: Duration) -> Self {
        Self {
            registry: SessionRegistry::new(connector, timeout),
            dispatcher,
            fetch_limit,
            timeout,
        }
    }

    /// Build a bridge with the limits from `config`.
    #[must_use]
    pub fn from_config(connector: K, dispatcher: D, config: &BridgeConfig) -> Self {
        Self::new(
            connector,
            dispatcher,
            config.fetch_limit,
            config.operation_timeout,
        )
    }

    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry<K> {
        &self.registry
    }

    #[must_use]
    pub const fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Log in and open a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] or [`Error::Network`] if the mailbox server
    /// rejects or cannot be reached.
    pub async fn connect(&self, credentials: Credentials) -> Result<(SessionId, Vec<Folder>)> {
        self.registry.create(credentials).await
    }

    /// The most recent messages of `folder` (INBOX when `None`),
    /// newest first.
    ///
    /// Messages that cannot be parsed are skipped. A dead connection
    /// invalidates the session; any other failure leaves it usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for unknown sessions, and the
    /// underlying protocol error if selection or fetching fails.
    pub async fn recent_messages(
        &self,
        session_id: &str,
        folder: Option<&str>,
    ) -> Result<Vec<MessageSummary>> {
        let folder = folder.filter(|f| !f.is_empty()).unwrap_or(INBOX);
        let session = self.registry.get(session_id)?;

        let result = {
            let mut connection = session.lock().await?;
            with_timeout(
                self.timeout,
                "fetch",
                fetch_window(&mut *connection, folder, self.fetch_limit),
            )
            .await
        };

        if let Err(e) = &result
            && e.is_connection_lost()
        {
            self.registry.invalidate(session_id);
        }
        result
    }

    /// Send a message with the session's credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for unknown sessions and
    /// [`Error::Send`] for any delivery failure.
    pub async fn send(&self, session_id: &str, message: &OutgoingMessage) -> Result<()> {
        let session = self.registry.get(session_id)?;
        with_timeout(
            self.timeout,
            "send",
            self.dispatcher.send(session.credentials(), message),
        )
        .await
        .map_err(|e| match e {
            Error::Send(_) => e,
            other => Error::Send(other.to_string()),
        })
    }

    /// Explicit logout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for unknown sessions.
    pub async fn logout(&self, session_id: &str) -> Result<()> {
        self.registry.remove(session_id).await
    }
}

/// Select `folder` and normalize its most recent window, newest first.
async fn fetch_window<C: MailboxConnection>(
    connection: &mut C,
    folder: &str,
    limit: usize,
) -> Result<Vec<MessageSummary>> {
    connection.select_folder(folder).await?;

    let mut messages = connection.fetch_recent(limit).await?;
    let mut summaries = Vec::with_capacity(limit);
    while let Some(raw) = messages.next().await {
        let raw = raw?;
        match normalize(&raw) {
            Ok(summary) => summaries.push(summary),
            Err(e) => warn!("Skipping message {} in {}: {}", raw.seq, folder, e),
        }
    }
    drop(messages);

    summaries.reverse();
    debug!("Fetched {} messages from {}", summaries.len(), folder);
    Ok(summaries)
}
