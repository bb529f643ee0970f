/// A parsed inbound chat command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    List { quiet: bool },
    Accept(String),
    Decline(String),
    Help,
    Unknown(String),
}

impl Command {
    /// Split on the first whitespace; the leading token picks the command.
    ///
    /// Tokens are case-sensitive. Telegram may send `/cmd@botname args` in
    /// groups, so a `@...` suffix on the token is dropped.
    pub fn parse(text: &str) -> Self {
        let (token, arg) = split_command(text);

        if !token.starts_with('/') {
            return Self::Unknown(token.to_string());
        }
        let name = token.split('@').next().unwrap_or(token);

        match name {
            "/list" => Self::List {
                quiet: arg == "quiet",
            },
            "/accept" => Self::Accept(arg.to_string()),
            "/decline" => Self::Decline(arg.to_string()),
            "/help" => Self::Help,
            _ => Self::Unknown(token.to_string()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::List { .. } => "list",
            Self::Accept(_) => "accept",
            Self::Decline(_) => "decline",
            Self::Help => "help",
            Self::Unknown(_) => "unknown",
        }
    }
}

fn split_command(text: &str) -> (&str, &str) {
    let text = text.trim();
    match text.split_once(char::is_whitespace) {
        Some((token, rest)) => (token, rest.trim()),
        None => (text, ""),
    }
}
