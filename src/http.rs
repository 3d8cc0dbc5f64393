//! HTTP surface
//!
//! JSON endpoints consumed by the browser client:
//!
//! - `POST /api/connect` opens a session and lists folders
//! - `GET /api/emails` returns the newest messages of a folder
//! - `POST /api/send` submits a message with the session's credentials
//! - `POST /api/logout` closes the session

use crate::bridge::Bridge;
use crate::config::{Credentials, SmtpSecurity};
use crate::connection::Connector;
use crate::error::Error;
use crate::folder::Folder;
use crate::message::MessageSummary;
use crate::outbound::{Dispatcher, OutgoingMessage};
use crate::registry::SessionId;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Build the router serving `bridge`.
pub fn router<K: Connector, D: Dispatcher>(bridge: Arc<Bridge<K, D>>) -> Router {
    Router::new()
        .route("/api/connect", post(connect::<K, D>))
        .route("/api/emails", get(emails::<K, D>))
        .route("/api/send", post(send::<K, D>))
        .route("/api/logout", post(logout::<K, D>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(bridge)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub host: String,
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub port: u16,
    #[serde(default, deserialize_with = "flag_from_bool_or_string")]
    pub secure: bool,
    pub user: String,
    pub pass: String,
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default, deserialize_with = "optional_port")]
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub smtp_security: Option<SmtpSecurity>,
}

impl From<ConnectRequest> for Credentials {
    fn from(req: ConnectRequest) -> Self {
        Self {
            host: req.host.trim().to_string(),
            port: req.port,
            secure: req.secure,
            username: req.user,
            password: req.pass,
            smtp_host: req.smtp_host.filter(|h| !h.trim().is_empty()),
            smtp_port: req.smtp_port,
            smtp_security: req.smtp_security,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub session_id: SessionId,
    pub folders: Vec<Folder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailsQuery {
    pub session_id: Option<String>,
    pub folder: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default)]
    pub session_id: String,
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub html: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct Success {
    pub success: bool,
}

const SUCCESS: Success = Success { success: true };

/// Maps crate errors onto status codes with a `{error}` body.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::SessionNotFound | Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::Network(_) | Error::Tls(_) | Error::Io(_) => StatusCode::BAD_GATEWAY,
            Error::MalformedMessage(_) | Error::Send(_) | Error::Imap(_) | Error::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status != StatusCode::UNAUTHORIZED {
            warn!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn connect<K: Connector, D: Dispatcher>(
    State(bridge): State<Arc<Bridge<K, D>>>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let (session_id, folders) = bridge.connect(req.into()).await?;
    Ok(Json(ConnectResponse {
        session_id,
        folders,
    }))
}

async fn emails<K: Connector, D: Dispatcher>(
    State(bridge): State<Arc<Bridge<K, D>>>,
    Query(query): Query<EmailsQuery>,
) -> Result<Json<Vec<MessageSummary>>, ApiError> {
    let session_id = query.session_id.ok_or(Error::SessionNotFound)?;
    let messages = bridge
        .recent_messages(&session_id, query.folder.as_deref())
        .await?;
    Ok(Json(messages))
}

async fn send<K: Connector, D: Dispatcher>(
    State(bridge): State<Arc<Bridge<K, D>>>,
    Json(req): Json<SendRequest>,
) -> Result<Json<Success>, ApiError> {
    let message = OutgoingMessage {
        to: req.to,
        subject: req.subject,
        text: req.text,
        html: req.html.filter(|h| !h.is_empty()),
    };
    bridge.send(&req.session_id, &message).await?;
    Ok(Json(SUCCESS))
}

async fn logout<K: Connector, D: Dispatcher>(
    State(bridge): State<Arc<Bridge<K, D>>>,
    Json(req): Json<LogoutRequest>,
) -> Result<Json<Success>, ApiError> {
    bridge.logout(&req.session_id).await?;
    Ok(Json(SUCCESS))
}

/// Browser forms post the port as either `993` or `"993"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

fn parse_port(value: NumberOrString) -> Result<u16, String> {
    match value {
        NumberOrString::Number(n) => u16::try_from(n).map_err(|_| format!("port out of range: {n}")),
        NumberOrString::Text(s) => s
            .trim()
            .parse()
            .map_err(|e| format!("invalid port '{s}': {e}")),
    }
}

fn port_from_number_or_string<'de, D: Deserializer<'de>>(de: D) -> Result<u16, D::Error> {
    parse_port(NumberOrString::deserialize(de)?).map_err(serde::de::Error::custom)
}

fn optional_port<'de, D: Deserializer<'de>>(de: D) -> Result<Option<u16>, D::Error> {
    match Option::<NumberOrString>::deserialize(de)? {
        None => Ok(None),
        Some(NumberOrString::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(value) => parse_port(value).map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    Text(String),
}

fn flag_from_bool_or_string<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    match BoolOrString::deserialize(de)? {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::Text(s) => Ok(s.trim().eq_ignore_ascii_case("true")),
    }
}
