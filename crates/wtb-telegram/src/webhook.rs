//! Webhook ingress.
//!
//! Validates inbound Telegram updates and hands a [`RequestContext`] to the
//! dispatcher. This is the only place that turns outcomes into HTTP statuses.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode},
    routing::{any, get},
    Router,
};
use serde::Deserialize;

use wtb_core::{
    dispatch::Dispatcher,
    domain::{ChatId, ChatKind, RequestContext},
    errors::Error,
    security::secret_matches,
    Result,
};

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Clone)]
pub struct WebhookState {
    pub dispatcher: Arc<Dispatcher>,
    pub secret: Option<String>,
}

pub fn router(state: WebhookState, webhook_path: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(webhook_path, any(receive))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn receive(
    State(state): State<WebhookState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if method != Method::POST {
        return StatusCode::METHOD_NOT_ALLOWED;
    }
    if !is_json(&headers) {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE;
    }

    let Some(secret) = state.secret.as_deref() else {
        tracing::warn!("webhook secret not configured, ignoring update");
        return StatusCode::OK;
    };
    let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
    if !secret_matches(provided, secret) {
        tracing::warn!("webhook secret mismatch");
        return StatusCode::UNAUTHORIZED;
    }

    let ctx = match parse_update(&body) {
        Ok(Some(ctx)) => ctx,
        Ok(None) => {
            tracing::debug!("update without text message, ignoring");
            return StatusCode::OK;
        }
        Err(e) => {
            tracing::warn!(error = %e, "rejecting update");
            return StatusCode::BAD_REQUEST;
        }
    };

    let outcome = state.dispatcher.dispatch(&ctx).await;
    tracing::debug!(chat_id = ctx.chat_id.0, ?outcome, "update handled");
    StatusCode::OK
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("application/json"))
}

#[derive(Debug, Deserialize)]
struct Update {
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(rename = "type", default)]
    kind: String,
}

/// `Ok(None)` for well-formed updates that carry nothing to dispatch.
pub fn parse_update(body: &[u8]) -> Result<Option<RequestContext>> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(Error::Validation("empty body".into()));
    }
    let update: Update = serde_json::from_slice(body)?;

    let Some(message) = update.message else {
        return Ok(None);
    };
    let Some(text) = message.text.filter(|t| !t.trim().is_empty()) else {
        return Ok(None);
    };

    Ok(Some(RequestContext {
        chat_id: ChatId(message.chat.id),
        text,
        chat_kind: ChatKind::from_wire(&message.chat.kind),
    }))
}
