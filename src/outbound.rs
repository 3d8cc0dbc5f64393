//! Outbound mail dispatch over SMTP
//!
//! Every send opens its own short-lived SMTP connection with the
//! credentials of the session that asked for it. Nothing here touches the
//! IMAP connection.

use crate::config::{Credentials, SmtpSecurity};
use crate::error::{Error, Result};
use lettre::message::{Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Port used when neither the session nor the process configures one.
pub const DEFAULT_SMTP_PORT: u16 = 465;

/// A message to submit for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// One or more comma-separated recipients.
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

/// Submits messages for delivery on behalf of a session.
pub trait Dispatcher: Send + Sync + 'static {
    fn send(
        &self,
        credentials: &Credentials,
        message: &OutgoingMessage,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Resolved outbound endpoint for one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub security: SmtpSecurity,
}

/// Guess the outbound host from the inbound one.
///
/// A leading `imap` label becomes `smtp` (`imap.example.com` ->
/// `smtp.example.com`). Hosts without that label are used unchanged, since
/// many providers serve both protocols from one name.
#[must_use]
pub fn derive_outbound_host(inbound: &str) -> String {
    match inbound.split_once('.') {
        Some((label, rest)) if label.eq_ignore_ascii_case("imap") => format!("smtp.{rest}"),
        _ => {
            warn!(
                "No 'imap' label in {}; using it as the outbound host",
                inbound
            );
            inbound.to_string()
        }
    }
}

/// SMTP dispatcher with optional process-wide outbound defaults.
#[derive(Debug, Clone)]
pub struct SmtpDispatcher {
    default_host: Option<String>,
    default_port: Option<u16>,
    timeout: Duration,
}

impl SmtpDispatcher {
    #[must_use]
    pub const fn new(
        default_host: Option<String>,
        default_port: Option<u16>,
        timeout: Duration,
    ) -> Self {
        Self {
            default_host,
            default_port,
            timeout,
        }
    }

    /// Work out where to send. Explicit session settings win over the
    /// process defaults, which win over derivation from the IMAP host.
    #[must_use]
    pub fn endpoint(&self, credentials: &Credentials) -> Endpoint {
        let host = credentials
            .smtp_host
            .clone()
            .or_else(|| self.default_host.clone())
            .unwrap_or_else(|| derive_outbound_host(&credentials.host));
        let port = credentials
            .smtp_port
            .or(self.default_port)
            .unwrap_or(DEFAULT_SMTP_PORT);
        let security = credentials
            .smtp_security
            .unwrap_or_else(|| SmtpSecurity::for_port(port));
        Endpoint {
            host,
            port,
            security,
        }
    }

    fn transport(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = match endpoint.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&endpoint.host)
                .map_err(|e| Error::Send(e.to_string()))?,
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&endpoint.host)
                    .map_err(|e| Error::Send(e.to_string()))?
            }
            SmtpSecurity::Plain => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&endpoint.host)
            }
        };

        Ok(builder
            .port(endpoint.port)
            .credentials(SmtpCredentials::new(
                credentials.username.clone(),
                credentials.password.clone(),
            ))
            .timeout(Some(self.timeout))
            .build())
    }
}

impl Dispatcher for SmtpDispatcher {
    async fn send(&self, credentials: &Credentials, message: &OutgoingMessage) -> Result<()> {
        let email = build_message(&credentials.username, message)?;
        let endpoint = self.endpoint(credentials);
        let transport = self.transport(&endpoint, credentials)?;

        info!(
            "Sending mail as {} via {}:{}",
            credentials.username, endpoint.host, endpoint.port
        );

        transport
            .send(email)
            .await
            .map_err(|e| Error::Send(e.to_string()))?;
        Ok(())
    }
}

/// Assemble the MIME message. The session user is the sender.
fn build_message(from: &str, message: &OutgoingMessage) -> Result<Message> {
    let sender: Mailbox = from
        .parse()
        .map_err(|e| Error::Send(format!("Invalid sender '{from}': {e}")))?;

    let mut builder = Message::builder()
        .from(sender)
        .subject(message.subject.as_str());

    let mut recipients = 0;
    for to in message.to.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let mailbox: Mailbox = to
            .parse()
            .map_err(|e| Error::Send(format!("Invalid recipient '{to}': {e}")))?;
        builder = builder.to(mailbox);
        recipients += 1;
    }
    if recipients == 0 {
        return Err(Error::Send("No recipients given".into()));
    }

    let built = match &message.html {
        Some(html) => builder.multipart(MultiPart::alternative_plain_html(
            message.text.clone(),
            html.clone(),
        )),
        None => builder.singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(message.text.clone()),
        ),
    };
    built.map_err(|e| Error::Send(e.to_string()))
}
