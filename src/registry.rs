//! In-memory session registry
//!
//! Maps opaque session identifiers to a live [`MailboxConnection`] and the
//! credentials that opened it. The map has its own lock, held only for
//! map operations; each session's connection sits behind a separate async
//! mutex so a slow fetch on one session never blocks lookups.

use crate::config::Credentials;
use crate::connection::{Connector, MailboxConnection};
use crate::error::{Error, Result};
use crate::folder::Folder;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque session token handed to the web client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One user's connection plus the credentials that opened it.
pub struct Session<C> {
    id: SessionId,
    credentials: Credentials,
    connection: Mutex<C>,
    defunct: AtomicBool,
}

impl<C: MailboxConnection> Session<C> {
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Whether the connection was found dead and the session dropped from
    /// the registry.
    #[must_use]
    pub fn is_defunct(&self) -> bool {
        self.defunct.load(Ordering::Acquire)
    }

    /// Take exclusive use of the connection.
    ///
    /// Waits for any in-flight operation on this session. The lock is
    /// released when the guard drops, on every exit path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if the session was invalidated
    /// while waiting.
    pub async fn lock(&self) -> Result<ConnectionGuard<'_, C>> {
        let guard = self.connection.lock().await;
        if self.is_defunct() {
            return Err(Error::SessionNotFound);
        }
        Ok(ConnectionGuard { guard })
    }
}

/// Exclusive access to one session's connection.
pub struct ConnectionGuard<'a, C> {
    guard: MutexGuard<'a, C>,
}

impl<C> Deref for ConnectionGuard<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.guard
    }
}

impl<C> DerefMut for ConnectionGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.guard
    }
}

/// Live sessions keyed by [`SessionId`].
pub struct SessionRegistry<K: Connector> {
    connector: K,
    timeout: Duration,
    sessions: RwLock<HashMap<SessionId, Arc<Session<K::Connection>>>>,
}

impl<K: Connector> SessionRegistry<K> {
    /// `timeout` bounds connection setup, folder listing and logout.
    #[must_use]
    pub fn new(connector: K, timeout: Duration) -> Self {
        Self {
            connector,
            timeout,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Connect with `credentials`, list folders, and register the session.
    ///
    /// Nothing is registered when any step fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] when the login is rejected and
    /// [`Error::Network`] when the server cannot be reached in time.
    pub async fn create(&self, credentials: Credentials) -> Result<(SessionId, Vec<Folder>)> {
        let mut connection =
            with_timeout(self.timeout, "connect", self.connector.connect(&credentials)).await?;

        let folders = match with_timeout(self.timeout, "list folders", connection.list_folders()).await
        {
            Ok(folders) => folders,
            Err(e) => {
                close_quietly(&mut connection, self.timeout).await;
                return Err(e);
            }
        };

        let id = self.insert(connection, credentials);
        info!("Session {} created with {} folders", id, folders.len());
        Ok((id, folders))
    }

    /// Store a connection under a fresh identifier.
    fn insert(&self, connection: K::Connection, credentials: Credentials) -> SessionId {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        loop {
            let id = SessionId::generate();
            if let Entry::Vacant(slot) = sessions.entry(id.clone()) {
                slot.insert(Arc::new(Session {
                    id: id.clone(),
                    credentials,
                    connection: Mutex::new(connection),
                    defunct: AtomicBool::new(false),
                }));
                return id;
            }
        }
    }

    /// Look up a live session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for unknown or removed ids; the
    /// caller must re-authenticate.
    pub fn get(&self, id: &str) -> Result<Arc<Session<K::Connection>>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .filter(|session| !session.is_defunct())
            .cloned()
            .ok_or(Error::SessionNotFound)
    }

    /// Log out and forget a session. Close failures are logged only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] when the id is not registered.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let session = self.take(id).ok_or(Error::SessionNotFound)?;
        let mut connection = session.connection.lock().await;
        close_quietly(&mut *connection, self.timeout).await;
        info!("Session {} closed", session.id);
        Ok(())
    }

    /// Forget a session whose connection is known to be dead. Anyone still
    /// waiting on its lock gets [`Error::SessionNotFound`].
    pub fn invalidate(&self, id: &str) {
        if let Some(session) = self.take(id) {
            warn!("Session {} invalidated after connection loss", session.id);
        }
    }

    fn take(&self, id: &str) -> Option<Arc<Session<K::Connection>>> {
        let session = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)?;
        session.defunct.store(true, Ordering::Release);
        Some(session)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run a network operation with an upper bound. Running out of time is a
/// [`Error::Network`] failure.
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    what: &str,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, operation)
        .await
        .unwrap_or_else(|_| Err(Error::Network(format!("{what} timed out after {limit:?}"))))
}

async fn close_quietly<C: MailboxConnection>(connection: &mut C, limit: Duration) {
    if let Err(e) = with_timeout(limit, "logout", connection.close()).await {
        debug!("Ignoring close failure: {}", e);
    }
}
