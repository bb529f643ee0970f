use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};

use crate::{errors::Error, Result};

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

/// Telegram `chat.type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
    Unknown,
}

impl ChatKind {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "private" => Self::Private,
            "group" => Self::Group,
            "supergroup" => Self::Supergroup,
            "channel" => Self::Channel,
            _ => Self::Unknown,
        }
    }

    /// Chats the bot can be added to (and therefore leave).
    pub fn is_group_like(self) -> bool {
        matches!(self, Self::Group | Self::Supergroup | Self::Channel)
    }
}

/// One validated inbound event, produced by the webhook ingress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub chat_id: ChatId,
    pub text: String,
    pub chat_kind: ChatKind,
}

/// Webling membergroup id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Webling member id. Only digits; constructing one is the validation step.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberId(String);

impl MemberId {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::Validation("member id is empty".to_string()));
        }
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Validation(format!("member id is not numeric: {raw}")));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for MemberId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A member as fetched from Webling. Never cached.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemberRecord {
    pub id: String,
    pub parents: BTreeSet<GroupId>,
    pub properties: BTreeMap<String, String>,
}

impl MemberRecord {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn is_in(&self, group: GroupId) -> bool {
        self.parents.contains(&group)
    }
}

/// The three membergroups an application moves between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberGroups {
    pub open: GroupId,
    pub accepted: GroupId,
    pub declined: GroupId,
}
