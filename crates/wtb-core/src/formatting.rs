//! Formatting utilities (Telegram MarkdownV2 escaping, list rendering).

use chrono::{DateTime, TimeZone};

use crate::domain::{GroupId, MemberRecord};

/// Characters Telegram MarkdownV2 reserves outside of entities.
const MARKDOWN_V2_RESERVED: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Escape text for Telegram MarkdownV2 parse mode.
///
/// Single pass over the input, so backslashes inserted here are never escaped
/// again. Not idempotent: escape exactly once.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 4);
    for ch in text.chars() {
        if MARKDOWN_V2_RESERVED.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Render the `/list` summary as MarkdownV2.
///
/// Every piece of free text goes through [`escape_markdown_v2`]; the literal
/// markup (`*`, `\(`) is written pre-escaped.
pub fn format_open_applications<Tz>(
    members: &[MemberRecord],
    now: &DateTime<Tz>,
    webling_base_url: &str,
    open_group: GroupId,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut msg = format!("📋 *Offene Anträge* \\({}\\)\n\n", members.len());

    for member in members {
        let given = escape_markdown_v2(member.property("Vorname").unwrap_or("N/A"));
        let family = escape_markdown_v2(member.property("Name").unwrap_or("N/A"));
        let nickname = escape_markdown_v2(member.property("Rufname").unwrap_or("N/A"));
        let id = escape_markdown_v2(&member.id);
        msg.push_str(&format!(
            "👤 *{given} {family}*\n  Nickname: {nickname}\n  ID: {id}\n\n"
        ));
    }

    let stamp = escape_markdown_v2(&now.format("%d.%m.%Y %H:%M").to_string());
    msg.push_str(&format!("🕐 Stand: {stamp}\n"));

    let base = webling_base_url.trim_end_matches('/');
    msg.push_str(&escape_markdown_v2(&format!(
        "👉 {base}/admin#/members/membergroup/{open_group}"
    )));
    msg
}
