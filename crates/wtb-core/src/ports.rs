use async_trait::async_trait;

use crate::{
    domain::{ChatId, GroupId, MemberId, MemberRecord},
    Result,
};

/// Hexagonal port for the chat platform.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Send `text` to a chat. With `markdown` set the text must already be
    /// MarkdownV2-escaped; implementations never escape on the caller's behalf.
    async fn send_message(&self, chat_id: ChatId, text: &str, markdown: bool) -> Result<()>;

    async fn leave_chat(&self, chat_id: ChatId) -> Result<()>;
}

/// Hexagonal port for the membership database.
#[async_trait]
pub trait MembershipPort: Send + Sync {
    async fn fetch_member(&self, id: &MemberId) -> Result<MemberRecord>;

    async fn fetch_members_in_group(&self, group: GroupId) -> Result<Vec<MemberId>>;

    async fn fetch_members(&self, ids: &[MemberId]) -> Result<Vec<MemberRecord>>;

    /// Move a member from `expected_current` into `target`, replacing all of
    /// its parent groups. Fails with [`crate::Error::PreconditionFailed`] and
    /// changes nothing when the member is not in `expected_current`.
    ///
    /// Returns the record as it was before the move.
    async fn move_member(
        &self,
        id: &MemberId,
        expected_current: GroupId,
        target: GroupId,
    ) -> Result<MemberRecord>;
}

/// Address plus optional display name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mailbox {
    pub address: String,
    pub name: Option<String>,
}

impl Mailbox {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: Mailbox,
    pub cc: Option<Mailbox>,
    pub reply_to: Option<Mailbox>,
    pub subject: String,
    pub body: String,
}

/// Transactional mail sender. Failures are reported, never retried.
#[async_trait]
pub trait MailPort: Send + Sync {
    async fn send_transactional_email(&self, mail: OutgoingMail) -> Result<()>;
}
