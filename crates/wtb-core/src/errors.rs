use crate::domain::GroupId;

/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the dispatcher
/// can handle failures consistently (chat message vs. log-only detail).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required option is absent or unusable.
    #[error("config error: {0}")]
    Config(String),

    /// Bad user input (member id format, missing argument).
    #[error("invalid input: {0}")]
    Validation(String),

    /// Non-recoverable upstream failure, or a transient one after retries ran out.
    #[error("{service} request failed (status {}): {detail}", status.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()))]
    Upstream {
        service: &'static str,
        status: Option<u16>,
        detail: String,
    },

    #[error("member {member} is not in expected source group {group}")]
    PreconditionFailed { member: String, group: GroupId },

    #[error("mail error: {0}")]
    Mail(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
