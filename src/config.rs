//! Connection credentials and process configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How the outbound channel is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Implicit TLS from the first byte (usually port 465).
    Tls,
    /// Plain connection upgraded with STARTTLS (usually port 587).
    StartTls,
    /// No encryption. Only used when asked for explicitly.
    Plain,
}

impl SmtpSecurity {
    /// The mode implied by a port when none was chosen explicitly.
    #[must_use]
    pub const fn for_port(port: u16) -> Self {
        if port == 587 { Self::StartTls } else { Self::Tls }
    }
}

impl FromStr for SmtpSecurity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tls" | "ssl" => Ok(Self::Tls),
            "starttls" => Ok(Self::StartTls),
            "plain" | "none" => Ok(Self::Plain),
            other => Err(Error::Config(format!("Unknown SMTP security mode: {other}"))),
        }
    }
}

/// Everything needed to open a mailbox connection, and later an outbound
/// channel, on behalf of one user.
///
/// Read-only once a session has been created from it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    /// Implicit TLS when `true`, STARTTLS upgrade otherwise.
    pub secure: bool,
    pub username: String,
    pub password: String,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_security: Option<SmtpSecurity>,
}

impl Credentials {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        secure: bool,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
            username: username.into(),
            password: password.into(),
            smtp_host: None,
            smtp_port: None,
            smtp_security: None,
        }
    }
}

// Hand-written so the password never reaches a log line.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_security", &self.smtp_security)
            .finish()
    }
}

/// Process-wide settings for the bridge server.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    /// Number of most recent messages returned per folder listing.
    pub fetch_limit: usize,
    /// Upper bound for any single network operation.
    pub operation_timeout: Duration,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub accept_invalid_certs: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            fetch_limit: 20,
            operation_timeout: Duration::from_secs(30),
            smtp_host: None,
            smtp_port: None,
            accept_invalid_certs: false,
        }
    }
}

impl BridgeConfig {
    /// Load bridge configuration from environment variables
    ///
    /// Reads from `.env` file if present. All variables are optional:
    /// - `BRIDGE_HOST` (default: `0.0.0.0`)
    /// - `PORT` (default: `3001`)
    /// - `FETCH_LIMIT` (default: `20`)
    /// - `OPERATION_TIMEOUT_SECS` (default: `30`)
    /// - `SMTP_HOST`, `SMTP_PORT` (outbound defaults for every session)
    /// - `ACCEPT_INVALID_CERTS` (default: `false`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let fetch_limit = parse_var(&lookup, "FETCH_LIMIT")?.unwrap_or(defaults.fetch_limit);
        if fetch_limit == 0 {
            return Err(Error::Config("FETCH_LIMIT must be at least 1".into()));
        }

        let timeout_secs: u64 = parse_var(&lookup, "OPERATION_TIMEOUT_SECS")?
            .unwrap_or(defaults.operation_timeout.as_secs());
        if timeout_secs == 0 {
            return Err(Error::Config("OPERATION_TIMEOUT_SECS must be at least 1".into()));
        }

        Ok(Self {
            host: lookup("BRIDGE_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT")?.unwrap_or(defaults.port),
            fetch_limit,
            operation_timeout: Duration::from_secs(timeout_secs),
            smtp_host: lookup("SMTP_HOST").filter(|h| !h.is_empty()),
            smtp_port: parse_var(&lookup, "SMTP_PORT")?,
            accept_invalid_certs: parse_flag(&lookup, "ACCEPT_INVALID_CERTS")?.unwrap_or(false),
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("Invalid {key}: {e}")))
        })
        .transpose()
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    lookup(key)
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(Error::Config(format!("Invalid {key}: {other}"))),
        })
        .transpose()
}
