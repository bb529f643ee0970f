use crate::domain::ChatId;

// ============== Authorization ==============

/// An empty allow-list authorizes nobody.
pub fn is_chat_allowed(chat_id: ChatId, allowed_chats: &[i64]) -> bool {
    if allowed_chats.is_empty() {
        return false;
    }
    allowed_chats.contains(&chat_id.0)
}

// ============== Webhook secret ==============

/// Compare the `X-Telegram-Bot-Api-Secret-Token` header against the
/// configured secret without short-circuiting on the first differing byte.
pub fn secret_matches(provided: Option<&str>, expected: &str) -> bool {
    let Some(provided) = provided else {
        return false;
    };
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    if a.len() != b.len() || b.is_empty() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
