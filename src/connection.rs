//! Mailbox protocol connections
//!
//! [`MailboxConnection`] is one authenticated, stateful session against a
//! mailbox server and [`Connector`] opens them. The IMAP implementations
//! live here; the registry and bridge only see the traits, so tests can
//! drive them with in-memory fakes.

use crate::config::Credentials;
use crate::error::{Error, Result};
use crate::folder::Folder;
use crate::message::RawMessage;
use async_imap::Session;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use rustls::pki_types::ServerName;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info};

/// A TLS-wrapped IMAP session.
pub type ImapSession = Session<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;

/// One authenticated session against a mailbox server.
///
/// Implementations are single-flight: callers must not interleave
/// commands, which the registry guarantees by handing out the connection
/// behind a per-session lock.
pub trait MailboxConnection: Send + 'static {
    /// List every folder, in the order the server reports them.
    fn list_folders(&mut self) -> impl Future<Output = Result<Vec<Folder>>> + Send;

    /// Select a folder. Required before [`fetch_recent`](Self::fetch_recent).
    fn select_folder(&mut self, path: &str) -> impl Future<Output = Result<()>> + Send;

    /// Stream at most `limit` messages from the end of the selected
    /// folder, oldest of the window first.
    fn fetch_recent(
        &mut self,
        limit: usize,
    ) -> impl Future<Output = Result<BoxStream<'_, Result<RawMessage>>>> + Send;

    /// Log out and release the connection. Calling it again is a no-op.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Opens authenticated [`MailboxConnection`]s.
pub trait Connector: Send + Sync + 'static {
    type Connection: MailboxConnection;

    /// Complete the full handshake, including TLS and login.
    fn connect(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Self::Connection>> + Send;
}

/// Opens IMAP connections over TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImapConnector {
    accept_invalid_certs: bool,
}

impl ImapConnector {
    #[must_use]
    pub const fn new(accept_invalid_certs: bool) -> Self {
        Self {
            accept_invalid_certs,
        }
    }
}

impl Connector for ImapConnector {
    type Connection = ImapConnection;

    async fn connect(&self, credentials: &Credentials) -> Result<ImapConnection> {
        let session = open_session(credentials, self.accept_invalid_certs).await?;
        Ok(ImapConnection {
            session: Some(session),
            selected: None,
        })
    }
}

#[derive(Debug)]
struct Selected {
    path: String,
    exists: u32,
}

/// A live IMAP session plus the folder currently selected on it.
pub struct ImapConnection {
    session: Option<ImapSession>,
    selected: Option<Selected>,
}

impl ImapConnection {
    fn session(&mut self) -> Result<&mut ImapSession> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::Network("connection already closed".into()))
    }
}

impl MailboxConnection for ImapConnection {
    async fn list_folders(&mut self) -> Result<Vec<Folder>> {
        let session = self.session()?;
        let names: Vec<_> = session
            .list(Some(""), Some("*"))
            .await
            .map_err(|e| imap_error("List folders failed", e))?
            .try_collect()
            .await
            .map_err(|e| imap_error("List folders failed", e))?;

        Ok(names
            .iter()
            .map(|name| Folder::from_path(name.name(), name.delimiter()))
            .collect())
    }

    async fn select_folder(&mut self, path: &str) -> Result<()> {
        self.selected = None;
        let mailbox = self
            .session()?
            .select(path)
            .await
            .map_err(|e| imap_error(&format!("Failed to select {path}"), e))?;
        debug!("Selected {} ({} messages)", path, mailbox.exists);
        self.selected = Some(Selected {
            path: path.to_string(),
            exists: mailbox.exists,
        });
        Ok(())
    }

    async fn fetch_recent(&mut self, limit: usize) -> Result<BoxStream<'_, Result<RawMessage>>> {
        let selected = self
            .selected
            .as_ref()
            .ok_or_else(|| Error::Imap("No folder selected".into()))?;

        let Some(range) = recent_window(selected.exists, limit) else {
            return Ok(stream::empty().boxed());
        };
        info!("Fetching messages {} of {}", range, selected.path);

        let messages = self
            .session()?
            .fetch(&range, "(UID BODY.PEEK[])")
            .await
            .map_err(|e| imap_error("Fetch failed", e))?;

        Ok(messages
            .map(|item| {
                let fetch = item.map_err(|e| imap_error("Fetch error", e))?;
                let source = fetch.body().map(<[u8]>::to_vec).unwrap_or_default();
                Ok(RawMessage {
                    seq: fetch.message,
                    uid: fetch.uid,
                    source,
                })
            })
            .boxed())
    }

    async fn close(&mut self) -> Result<()> {
        self.selected = None;
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        session
            .logout()
            .await
            .map_err(|e| imap_error("Logout failed", e))
    }
}

/// Sequence range covering the last `limit` of `exists` messages.
fn recent_window(exists: u32, limit: usize) -> Option<String> {
    if exists == 0 || limit == 0 {
        return None;
    }
    let limit = u32::try_from(limit).unwrap_or(u32::MAX);
    let start = exists.saturating_sub(limit) + 1;
    Some(format!("{start}:{exists}"))
}

/// Sort an async-imap failure into the crate taxonomy. Transport failures
/// mean the connection is gone; anything else is the server refusing one
/// command.
fn imap_error(context: &str, e: async_imap::error::Error) -> Error {
    match e {
        async_imap::error::Error::Io(io) => Error::Network(format!("{context}: {io}")),
        async_imap::error::Error::ConnectionLost => {
            Error::Network(format!("{context}: connection lost"))
        }
        other => Error::Imap(format!("{context}: {other}")),
    }
}

/// Build a TLS connector, verifying against the Mozilla root set unless
/// asked to accept anything.
fn tls_connector(accept_invalid_certs: bool) -> Result<TlsConnector> {
    let builder =
        rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(e.to_string()))?;

    let config = if accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DangerousVerifier))
            .with_no_client_auth()
    } else {
        let roots = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Open a fresh TLS-wrapped IMAP session and log in.
///
/// With `credentials.secure` the TLS handshake happens right after the TCP
/// connect; otherwise the plain connection is upgraded with STARTTLS first.
async fn open_session(credentials: &Credentials, accept_invalid_certs: bool) -> Result<ImapSession> {
    let addr = format!("{}:{}", credentials.host, credentials.port);
    debug!("Connecting to IMAP server at {}", addr);

    let tcp_stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| Error::Network(format!("Cannot reach {addr}: {e}")))?;

    let tcp_stream = if credentials.secure {
        tcp_stream
    } else {
        let mut client = async_imap::Client::new(tcp_stream.compat());
        client
            .run_command_and_check_ok("STARTTLS", None)
            .await
            .map_err(|e| Error::Tls(format!("STARTTLS failed: {e}")))?;
        client.into_inner().into_inner()
    };

    let connector = tls_connector(accept_invalid_certs)?;
    let server_name = ServerName::try_from(credentials.host.clone())
        .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;

    let tls_stream = connector
        .connect(server_name, tcp_stream)
        .await
        .map_err(|e| Error::Tls(e.to_string()))?;

    let tls_client = async_imap::Client::new(tls_stream.compat());

    let session = tls_client
        .login(&credentials.username, &credentials.password)
        .await
        .map_err(|(e, _)| match e {
            async_imap::error::Error::No(msg) | async_imap::error::Error::Bad(msg) => {
                Error::Auth(msg)
            }
            other => imap_error("Login failed", other),
        })?;

    info!("Logged in to {} as {}", addr, credentials.username);
    Ok(session)
}

/// Certificate verifier that accepts all certificates
/// (for local bridges with self-signed certs).
#[derive(Debug)]
struct DangerousVerifier;

impl rustls::client::danger::ServerCertVerifier for DangerousVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
