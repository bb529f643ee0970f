use std::{env, fs, path::Path, time::Duration};

use crate::{
    domain::{GroupId, MemberGroups},
    errors::Error,
    http::HttpConfig,
    ports::Mailbox,
    Result,
};

/// Typed configuration, read once at startup and passed down immutably.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_api_base: String,
    pub webhook_secret: Option<String>,
    pub allowed_chats: Vec<i64>,
    /// Default target chat of the scheduled open-applications report.
    pub report_chat: Option<i64>,

    // Optional integrations; handlers that need one short-circuit when absent.
    pub webling: Option<WeblingConfig>,
    pub smtp: Option<SmtpConfig>,

    pub welcome: WelcomeConfig,

    // Server
    pub bind_addr: String,
    pub webhook_path: String,

    // Outbound HTTP
    pub http: HttpConfig,
}

#[derive(Clone, Debug)]
pub struct WeblingConfig {
    pub base_url: String,
    pub api_key: String,
    pub groups: MemberGroups,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: Mailbox,
    pub cc: Option<Mailbox>,
    pub reply_to: Option<Mailbox>,
}

/// Texts for the welcome mail sent on `/accept`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WelcomeConfig {
    pub club_name: String,
    /// `(label, url)` pairs listed in the mail body.
    pub links: Vec<(String, String)>,
    /// Extra paragraph after the link list.
    pub footer: Option<String>,
}

impl Config {
    /// Load from the process environment, after merging a `.env` file from the
    /// working directory (existing variables win).
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;
        let telegram_api_base = get("TELEGRAM_API_BASE")
            .unwrap_or_else(|| "https://api.telegram.org".to_string())
            .trim_end_matches('/')
            .to_string();
        let webhook_secret = get("TELEGRAM_WEBHOOK_SECRET");
        if webhook_secret.is_none() {
            tracing::warn!("TELEGRAM_WEBHOOK_SECRET is not set; all webhook updates will be ignored");
        }
        let allowed_chats = parse_csv_i64(get("TELEGRAM_ALLOWED_CHATS"));
        if allowed_chats.is_empty() {
            tracing::warn!("TELEGRAM_ALLOWED_CHATS is empty; no chat is authorized");
        }

        let report_chat = get("TELEGRAM_CHAT_ID").and_then(|raw| match raw.trim().parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(value = %raw, "TELEGRAM_CHAT_ID is not numeric, ignoring");
                None
            }
        });

        let webling = load_webling(&get);
        let smtp = load_smtp(&get);

        let welcome = WelcomeConfig {
            club_name: get("CLUB_NAME").unwrap_or_else(|| "Dein Verein".to_string()),
            links: parse_links(get("WELCOME_LINKS")),
            footer: get("WELCOME_FOOTER").map(|s| s.trim().to_string()),
        };

        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let mut webhook_path = get("WEBHOOK_PATH").unwrap_or_else(|| "/telegram/webhook".to_string());
        if !webhook_path.starts_with('/') {
            webhook_path.insert(0, '/');
        }

        let defaults = HttpConfig::default();
        let http = HttpConfig {
            connect_timeout: get("HTTP_CONNECT_TIMEOUT_MS")
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
            timeout: get("HTTP_TIMEOUT_MS")
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
        };

        Ok(Self {
            telegram_bot_token,
            telegram_api_base,
            webhook_secret,
            allowed_chats,
            report_chat,
            webling,
            smtp,
            welcome,
            bind_addr,
            webhook_path,
            http,
        })
    }
}

const WEBLING_KEYS: &[&str] = &[
    "WEBLING_BASE_URL",
    "WEBLING_API_KEY",
    "WEBLING_MEMBER_GROUP_OPEN",
    "WEBLING_MEMBER_GROUP_ACCEPTED",
    "WEBLING_MEMBER_GROUP_DECLINED",
];

const SMTP_KEYS: &[&str] = &["SMTP_HOST", "SMTP_PORT", "SMTP_USER", "SMTP_PASS", "SMTP_FROM"];

/// All-or-nothing section: `None` when nothing is set, `None` plus a warning
/// when only part of it is.
fn section_complete(get: &impl Fn(&str) -> Option<String>, section: &str, keys: &[&str]) -> bool {
    let missing: Vec<&str> = keys.iter().copied().filter(|k| get(*k).is_none()).collect();
    if missing.is_empty() {
        return true;
    }
    if missing.len() < keys.len() {
        tracing::warn!(section, missing = ?missing, "incomplete configuration section, disabled");
    }
    false
}

fn load_webling(get: &impl Fn(&str) -> Option<String>) -> Option<WeblingConfig> {
    if !section_complete(get, "webling", WEBLING_KEYS) {
        return None;
    }

    let group = |key: &str| -> Option<GroupId> {
        let raw = get(key)?;
        match raw.trim().parse::<i64>() {
            Ok(n) => Some(GroupId(n)),
            Err(_) => {
                tracing::warn!(key, value = %raw, "group id is not numeric, webling disabled");
                None
            }
        }
    };

    Some(WeblingConfig {
        base_url: webling_base_url(&get("WEBLING_BASE_URL")?),
        api_key: get("WEBLING_API_KEY")?,
        groups: MemberGroups {
            open: group("WEBLING_MEMBER_GROUP_OPEN")?,
            accepted: group("WEBLING_MEMBER_GROUP_ACCEPTED")?,
            declined: group("WEBLING_MEMBER_GROUP_DECLINED")?,
        },
    })
}

/// The client appends `/api/1/` itself; accept URLs that already carry it.
fn webling_base_url(raw: &str) -> String {
    let url = raw.trim().trim_end_matches('/');
    url.strip_suffix("/api/1")
        .unwrap_or(url)
        .trim_end_matches('/')
        .to_string()
}

fn load_smtp(get: &impl Fn(&str) -> Option<String>) -> Option<SmtpConfig> {
    if !section_complete(get, "smtp", SMTP_KEYS) {
        return None;
    }

    let raw_port = get("SMTP_PORT")?;
    let Ok(port) = raw_port.trim().parse::<u16>() else {
        tracing::warn!(value = %raw_port, "SMTP_PORT is not a port number, mail disabled");
        return None;
    };

    let from_name = get("SMTP_FROM_NAME").or_else(|| get("CLUB_NAME"));
    let cc = get("SMTP_CC_EMAIL").map(|addr| Mailbox::new(addr, get("SMTP_CC_NAME")));
    let reply_to = get("SMTP_REPLYTO_EMAIL").map(|addr| Mailbox::new(addr, get("SMTP_REPLYTO_NAME")));

    Some(SmtpConfig {
        host: get("SMTP_HOST")?,
        port,
        username: get("SMTP_USER")?,
        password: get("SMTP_PASS")?,
        from: Mailbox::new(get("SMTP_FROM")?, from_name),
        cc,
        reply_to,
    })
}

pub fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<i64>() {
            Ok(n) => Some(n),
            Err(_) => {
                tracing::warn!(value = s, "ignoring non-numeric chat id");
                None
            }
        })
        .collect()
}

/// `Label|https://...,Other|https://...`
fn parse_links(v: Option<String>) -> Vec<(String, String)> {
    v.unwrap_or_default()
        .split(',')
        .filter_map(|entry| {
            let (label, url) = entry.split_once('|')?;
            let (label, url) = (label.trim(), url.trim());
            if label.is_empty() || url.is_empty() {
                return None;
            }
            Some((label.to_string(), url.to_string()))
        })
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
