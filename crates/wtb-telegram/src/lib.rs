//! Telegram adapter.
//!
//! This crate implements the `wtb-core` MessagingPort over the Telegram Bot
//! API and hosts the webhook ingress that feeds the dispatcher.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use teloxide::types::ParseMode;

pub mod webhook;

use wtb_core::{
    config::Config,
    domain::ChatId,
    errors::Error,
    http::{HttpResponse, Method, RequestClient},
    ports::MessagingPort,
    retry::Retrier,
    Result,
};

const SERVICE: &str = "telegram";

#[derive(Clone, Debug)]
pub struct TelegramClient {
    http: RequestClient,
    api_base: String,
    token: String,
    retrier: Retrier,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: ChatId,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<ParseMode>,
}

#[derive(Debug, Serialize)]
struct LeaveChat {
    chat_id: ChatId,
}

/// Subset of the `getMe` user object.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str, http: RequestClient) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retrier: Retrier::default(),
        }
    }

    pub fn from_config(cfg: &Config, http: RequestClient) -> Self {
        Self::new(&cfg.telegram_api_base, &cfg.telegram_bot_token, http)
    }

    pub fn with_retrier(mut self, retrier: Retrier) -> Self {
        self.retrier = retrier;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    async fn call(&self, method: &'static str, payload: &impl Serialize) -> Result<Value> {
        let url = self.method_url(method);
        let body = serde_json::to_value(payload)?;

        let v = self
            .retrier
            .run(SERVICE, method, || {
                let (url, body) = (&url, &body);
                async move {
                    self.http
                        .request(Method::POST, url, Some(body), &[])
                        .await
                        .into_outcome(retry_after)
                }
            })
            .await?;

        let envelope: Envelope = serde_json::from_value(v).map_err(|e| Error::Upstream {
            service: SERVICE,
            status: None,
            detail: format!("{method}: unexpected payload: {e}"),
        })?;
        if !envelope.ok {
            return Err(Error::Upstream {
                service: SERVICE,
                status: None,
                detail: format!(
                    "{method}: {}",
                    envelope.description.as_deref().unwrap_or("ok=false")
                ),
            });
        }
        Ok(envelope.result)
    }

    pub async fn get_me(&self) -> Result<BotIdentity> {
        let v = self.call("getMe", &serde_json::json!({})).await?;
        serde_json::from_value(v).map_err(|e| Error::Upstream {
            service: SERVICE,
            status: None,
            detail: format!("getMe: unexpected payload: {e}"),
        })
    }
}

/// Telegram reports flood control in the body, not in a header.
fn retry_after(resp: &HttpResponse) -> Option<u64> {
    resp.body
        .as_ref()
        .and_then(|b| b.pointer("/parameters/retry_after"))
        .and_then(Value::as_u64)
}

#[async_trait]
impl MessagingPort for TelegramClient {
    async fn send_message(&self, chat_id: ChatId, text: &str, markdown: bool) -> Result<()> {
        let payload = SendMessage {
            chat_id,
            text,
            parse_mode: markdown.then_some(ParseMode::MarkdownV2),
        };
        self.call("sendMessage", &payload).await?;
        Ok(())
    }

    async fn leave_chat(&self, chat_id: ChatId) -> Result<()> {
        self.call("leaveChat", &LeaveChat { chat_id }).await?;
        tracing::info!(chat_id = chat_id.0, "left chat");
        Ok(())
    }
}
