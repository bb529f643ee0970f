//! Command dispatcher: one inbound chat event in, at most one chat reply out.
//!
//! Parse → authorize → route → execute → report. Nothing here returns an
//! error to the caller; failures become chat messages (generic) and log lines
//! (detailed).

use std::sync::Arc;

use chrono::Local;

use crate::{
    command::Command,
    config::{Config, WelcomeConfig},
    domain::{ChatId, MemberGroups, MemberId, MemberRecord, RequestContext},
    errors::Error,
    formatting::format_open_applications,
    ports::{Mailbox, MailPort, MembershipPort, MessagingPort, OutgoingMail},
    security::is_chat_allowed,
    Result,
};

pub mod messages {
    pub const FAREWELL: &str = "Leaving.";
    pub const HELP: &str = "Benutze /accept <ID> oder /decline <ID>, um neue Mitglieder \
        anzunehmen oder abzulehnen und /list um die offenen Anträge aufzulisten.";
    pub const LIST_EMPTY: &str = "Keine offenen Anträge gefunden.";
    pub const LIST_FAILED: &str = "Die offenen Anträge konnten nicht abgerufen werden.";
    pub const ACCEPT_USAGE: &str = "Nutze zum Akzeptieren: /accept <id>";
    pub const DECLINE_USAGE: &str = "Nutze zum Ablehnen: /decline <id>";

    pub fn unknown(token: &str) -> String {
        format!("Unbekannter Befehl: {token}. /help zeigt die verfügbaren Befehle.")
    }

    pub fn invalid_id(raw: &str) -> String {
        format!("Ungültige ID: {raw}")
    }

    pub fn accepted_mail_sent(id: &str) -> String {
        format!("Mitglied {id} akzeptiert, E-Mail wurde versandt.")
    }

    pub fn accepted_mail_failed(id: &str) -> String {
        format!("Mitglied {id} akzeptiert, E-Mail-Versand ist gescheitert.")
    }

    pub fn accept_failed(id: &str) -> String {
        format!("Ein Fehler beim Akzeptieren von {id} ist aufgetreten.")
    }

    pub fn declined(id: &str) -> String {
        format!("Mitglied {id} abgelehnt.")
    }

    pub fn decline_failed(id: &str) -> String {
        format!("Ein Fehler beim Ablehnen von {id} ist aufgetreten.")
    }

    pub fn not_in_source_group(id: &str, group: &str) -> String {
        format!("Mitglied {id} ist nicht in der erwarteten Ausgangsgruppe (ID {group}).")
    }
}

/// What happened to an inbound event; only used for logging by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Unauthorized direct/unknown chat, nothing sent.
    Ignored,
    /// Unauthorized group-like chat, farewell sent and chat left.
    Left,
    /// Handler skipped because its configuration is missing.
    NotConfigured(&'static str),
    Handled(&'static str),
}

struct Membership {
    port: Arc<dyn MembershipPort>,
    groups: MemberGroups,
    base_url: String,
}

pub struct Dispatcher {
    messenger: Arc<dyn MessagingPort>,
    membership: Option<Membership>,
    mailer: Option<Arc<dyn MailPort>>,
    allowed_chats: Vec<i64>,
    report_chat: Option<ChatId>,
    welcome: WelcomeConfig,
    cc: Option<Mailbox>,
    reply_to: Option<Mailbox>,
}

impl Dispatcher {
    /// `membership` is only used when the Webling section is configured.
    pub fn new(
        cfg: &Config,
        messenger: Arc<dyn MessagingPort>,
        membership: Option<Arc<dyn MembershipPort>>,
        mailer: Option<Arc<dyn MailPort>>,
    ) -> Self {
        let membership = match (membership, &cfg.webling) {
            (Some(port), Some(w)) => Some(Membership {
                port,
                groups: w.groups,
                base_url: w.base_url.clone(),
            }),
            _ => None,
        };

        Self {
            messenger,
            membership,
            mailer,
            allowed_chats: cfg.allowed_chats.clone(),
            report_chat: cfg.report_chat.map(ChatId),
            welcome: cfg.welcome.clone(),
            cc: cfg.smtp.as_ref().and_then(|s| s.cc.clone()),
            reply_to: cfg.smtp.as_ref().and_then(|s| s.reply_to.clone()),
        }
    }

    pub async fn dispatch(&self, ctx: &RequestContext) -> DispatchOutcome {
        let command = Command::parse(&ctx.text);

        if !is_chat_allowed(ctx.chat_id, &self.allowed_chats) {
            if ctx.chat_kind.is_group_like() {
                tracing::info!(chat_id = ctx.chat_id.0, "unauthorized group chat, leaving");
                self.reply(ctx.chat_id, messages::FAREWELL).await;
                if let Err(e) = self.messenger.leave_chat(ctx.chat_id).await {
                    tracing::error!(chat_id = ctx.chat_id.0, error = %e, "leaveChat failed");
                }
                return DispatchOutcome::Left;
            }
            tracing::info!(chat_id = ctx.chat_id.0, "chat ignored");
            return DispatchOutcome::Ignored;
        }

        tracing::info!(chat_id = ctx.chat_id.0, command = command.name(), "dispatching");

        match command {
            Command::List { quiet } => self.handle_list(ctx.chat_id, quiet).await,
            Command::Accept(arg) => self.handle_accept(ctx.chat_id, &arg).await,
            Command::Decline(arg) => self.handle_decline(ctx.chat_id, &arg).await,
            Command::Help => {
                self.reply(ctx.chat_id, messages::HELP).await;
                DispatchOutcome::Handled("help")
            }
            Command::Unknown(token) => {
                self.reply(ctx.chat_id, &messages::unknown(&token)).await;
                DispatchOutcome::Handled("unknown")
            }
        }
    }

    /// Post the open-applications summary without an inbound command, to
    /// `chat` or else the configured report chat. The allow-list is not
    /// consulted.
    pub async fn report_open_applications(
        &self,
        chat: Option<ChatId>,
        quiet: bool,
    ) -> DispatchOutcome {
        let Some(chat_id) = chat.or(self.report_chat) else {
            tracing::warn!("no report chat given and TELEGRAM_CHAT_ID is not set");
            return DispatchOutcome::NotConfigured("report");
        };
        tracing::info!(chat_id = chat_id.0, quiet, "posting open-applications report");
        self.handle_list(chat_id, quiet).await
    }

    async fn handle_list(&self, chat_id: ChatId, quiet: bool) -> DispatchOutcome {
        let Some(m) = self.membership_or_log("list") else {
            return DispatchOutcome::NotConfigured("list");
        };

        let members = match self.open_applications(m).await {
            Ok(members) => members,
            Err(e) => {
                tracing::error!(error = %e, "listing open applications failed");
                self.reply(chat_id, messages::LIST_FAILED).await;
                return DispatchOutcome::Handled("list");
            }
        };

        if members.is_empty() {
            tracing::info!(quiet, "no open applications");
            if !quiet {
                self.reply(chat_id, messages::LIST_EMPTY).await;
            }
            return DispatchOutcome::Handled("list");
        }

        let text = format_open_applications(&members, &Local::now(), &m.base_url, m.groups.open);
        self.send(chat_id, &text, true).await;
        DispatchOutcome::Handled("list")
    }

    async fn open_applications(&self, m: &Membership) -> Result<Vec<MemberRecord>> {
        let ids = m.port.fetch_members_in_group(m.groups.open).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        m.port.fetch_members(&ids).await
    }

    async fn handle_accept(&self, chat_id: ChatId, raw: &str) -> DispatchOutcome {
        let Some(m) = self.membership_or_log("accept") else {
            return DispatchOutcome::NotConfigured("accept");
        };
        let Some(id) = self.validated_id(chat_id, raw, messages::ACCEPT_USAGE).await else {
            return DispatchOutcome::Handled("accept");
        };

        let record = match m.port.move_member(&id, m.groups.open, m.groups.accepted).await {
            Ok(record) => record,
            Err(e) => {
                self.report_move_failure(chat_id, &id, e, messages::accept_failed)
                    .await;
                return DispatchOutcome::Handled("accept");
            }
        };
        tracing::info!(member = %id, "member accepted");

        let text = match self.send_welcome_mail(&record).await {
            Ok(()) => messages::accepted_mail_sent(id.as_str()),
            Err(e) => {
                tracing::error!(member = %id, error = %e, "welcome mail failed");
                messages::accepted_mail_failed(id.as_str())
            }
        };
        self.reply(chat_id, &text).await;
        DispatchOutcome::Handled("accept")
    }

    async fn handle_decline(&self, chat_id: ChatId, raw: &str) -> DispatchOutcome {
        let Some(m) = self.membership_or_log("decline") else {
            return DispatchOutcome::NotConfigured("decline");
        };
        let Some(id) = self.validated_id(chat_id, raw, messages::DECLINE_USAGE).await else {
            return DispatchOutcome::Handled("decline");
        };

        match m.port.move_member(&id, m.groups.open, m.groups.declined).await {
            Ok(_) => {
                tracing::info!(member = %id, "member declined");
                self.reply(chat_id, &messages::declined(id.as_str())).await;
            }
            Err(e) => {
                self.report_move_failure(chat_id, &id, e, messages::decline_failed)
                    .await;
            }
        }
        DispatchOutcome::Handled("decline")
    }

    async fn send_welcome_mail(&self, record: &MemberRecord) -> Result<()> {
        let Some(mailer) = &self.mailer else {
            return Err(Error::Config("smtp is not configured".to_string()));
        };
        let mail = welcome_mail(record, &self.welcome, self.cc.clone(), self.reply_to.clone())?;
        mailer.send_transactional_email(mail).await
    }

    async fn report_move_failure(
        &self,
        chat_id: ChatId,
        id: &MemberId,
        err: Error,
        generic: fn(&str) -> String,
    ) {
        let text = match &err {
            Error::PreconditionFailed { group, .. } => {
                tracing::warn!(member = %id, %group, "member not in expected source group");
                messages::not_in_source_group(id.as_str(), &group.to_string())
            }
            _ => {
                tracing::error!(member = %id, error = %err, "moving member failed");
                generic(id.as_str())
            }
        };
        self.reply(chat_id, &text).await;
    }

    /// Empty → usage text, non-numeric → error text; both reply and yield `None`.
    async fn validated_id(&self, chat_id: ChatId, raw: &str, usage: &str) -> Option<MemberId> {
        if raw.is_empty() {
            self.reply(chat_id, usage).await;
            return None;
        }
        match MemberId::parse(raw) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::info!(error = %e, "rejected member id");
                self.reply(chat_id, &messages::invalid_id(raw)).await;
                None
            }
        }
    }

    fn membership_or_log(&self, command: &'static str) -> Option<&Membership> {
        if self.membership.is_none() {
            tracing::warn!(command, "webling is not configured, ignoring command");
        }
        self.membership.as_ref()
    }

    async fn reply(&self, chat_id: ChatId, text: &str) {
        self.send(chat_id, text, false).await;
    }

    async fn send(&self, chat_id: ChatId, text: &str, markdown: bool) {
        if let Err(e) = self.messenger.send_message(chat_id, text, markdown).await {
            tracing::error!(chat_id = chat_id.0, error = %e, "sending chat message failed");
        }
    }
}

/// Compose the welcome mail for a freshly accepted member.
///
/// Needs the `E-Mail` property; names fall back to sensible defaults.
pub fn welcome_mail(
    record: &MemberRecord,
    welcome: &WelcomeConfig,
    cc: Option<Mailbox>,
    reply_to: Option<Mailbox>,
) -> Result<OutgoingMail> {
    let address = record
        .property("E-Mail")
        .ok_or_else(|| Error::Mail(format!("member {} has no e-mail address", record.id)))?;

    let given = record.property("Vorname");
    let family = record.property("Name");
    let display = [given, family]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    let salutation = record.property("Anrede").unwrap_or("Hallo");
    let nickname = record.property("Rufname").or(given).unwrap_or_default();
    let greeting = format!("{salutation} {nickname}").trim().to_string();

    let club = &welcome.club_name;
    let mut body = format!(
        "{greeting},\n\nwillkommen im {club}! Schön, dass Du dabei bist!\n\n"
    );
    if !welcome.links.is_empty() {
        body.push_str("Hier sind die wichtigsten Links für dich:\n");
        for (label, url) in &welcome.links {
            body.push_str(&format!("- {label}: {url}\n"));
        }
        body.push('\n');
    }
    if let Some(footer) = &welcome.footer {
        body.push_str(footer);
        body.push('\n');
    }
    body.push_str(
        "Wir wünschen dir viel Spaß im Verein und hoffen, dass du dich gut einbringen kannst :-)\n\nDer Vorstand",
    );

    Ok(OutgoingMail {
        to: Mailbox::new(address, (!display.is_empty()).then_some(display)),
        cc,
        reply_to,
        subject: format!("Willkommen im {club}"),
        body,
    })
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{BTreeSet, HashMap},
        sync::Mutex,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::domain::{ChatKind, GroupId};

    const ADMIN_CHAT: i64 = -1001;
    const OPEN: GroupId = GroupId(1);
    const ACCEPTED: GroupId = GroupId(2);
    const DECLINED: GroupId = GroupId(3);

    #[derive(Default)]
    struct FakeMessenger {
        sent: Mutex<Vec<(i64, String, bool)>>,
        left: Mutex<Vec<i64>>,
    }

    impl FakeMessenger {
        fn texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, t, _)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        async fn send_message(&self, chat_id: ChatId, text: &str, markdown: bool) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((chat_id.0, text.to_string(), markdown));
            Ok(())
        }

        async fn leave_chat(&self, chat_id: ChatId) -> Result<()> {
            self.left.lock().unwrap().push(chat_id.0);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeMembership {
        members: HashMap<String, MemberRecord>,
        fail_listing: bool,
        calls: Mutex<usize>,
        moves: Mutex<Vec<(String, GroupId)>>,
    }

    impl FakeMembership {
        fn with(records: Vec<MemberRecord>) -> Self {
            Self {
                members: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }

        fn bump(&self) {
            *self.calls.lock().unwrap() += 1;
        }

        fn get(&self, id: &MemberId) -> Result<MemberRecord> {
            self.members.get(id.as_str()).cloned().ok_or(Error::Upstream {
                service: "webling",
                status: Some(404),
                detail: "not found".into(),
            })
        }
    }

    #[async_trait]
    impl MembershipPort for FakeMembership {
        async fn fetch_member(&self, id: &MemberId) -> Result<MemberRecord> {
            self.bump();
            self.get(id)
        }

        async fn fetch_members_in_group(&self, group: GroupId) -> Result<Vec<MemberId>> {
            self.bump();
            if self.fail_listing {
                return Err(Error::Upstream {
                    service: "webling",
                    status: Some(503),
                    detail: "down".into(),
                });
            }
            let mut ids: Vec<_> = self
                .members
                .values()
                .filter(|r| r.is_in(group))
                .map(|r| MemberId::parse(&r.id).unwrap())
                .collect();
            ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            Ok(ids)
        }

        async fn fetch_members(&self, ids: &[MemberId]) -> Result<Vec<MemberRecord>> {
            self.bump();
            ids.iter().map(|id| self.get(id)).collect()
        }

        async fn move_member(
            &self,
            id: &MemberId,
            expected_current: GroupId,
            target: GroupId,
        ) -> Result<MemberRecord> {
            self.bump();
            let record = self.get(id)?;
            if !record.is_in(expected_current) {
                return Err(Error::PreconditionFailed {
                    member: id.to_string(),
                    group: expected_current,
                });
            }
            self.moves.lock().unwrap().push((id.to_string(), target));
            Ok(record)
        }
    }

    #[derive(Default)]
    struct FakeMailer {
        fail: bool,
        sent: Mutex<Vec<OutgoingMail>>,
    }

    #[async_trait]
    impl MailPort for FakeMailer {
        async fn send_transactional_email(&self, mail: OutgoingMail) -> Result<()> {
            if self.fail {
                return Err(Error::Mail("relay refused".into()));
            }
            self.sent.lock().unwrap().push(mail);
            Ok(())
        }
    }

    fn applicant(id: &str, group: GroupId) -> MemberRecord {
        let mut properties = std::collections::BTreeMap::new();
        properties.insert("Vorname".to_string(), "Ada".to_string());
        properties.insert("Name".to_string(), "Lovelace".to_string());
        properties.insert("Rufname".to_string(), "Ada".to_string());
        properties.insert("Anrede".to_string(), "Liebe".to_string());
        properties.insert("E-Mail".to_string(), "ada@example.com".to_string());
        MemberRecord {
            id: id.to_string(),
            parents: BTreeSet::from([group]),
            properties,
        }
    }

    fn config(with_webling: bool) -> Config {
        let mut pairs = vec![
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("TELEGRAM_ALLOWED_CHATS", "-1001"),
            ("TELEGRAM_CHAT_ID", "-2002"),
            ("CLUB_NAME", "Testverein"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_PORT", "587"),
            ("SMTP_USER", "u"),
            ("SMTP_PASS", "p"),
            ("SMTP_FROM", "noreply@example.com"),
            ("SMTP_CC_EMAIL", "board@example.com"),
        ];
        if with_webling {
            pairs.extend([
                ("WEBLING_BASE_URL", "https://verein.webling.eu"),
                ("WEBLING_API_KEY", "k"),
                ("WEBLING_MEMBER_GROUP_OPEN", "1"),
                ("WEBLING_MEMBER_GROUP_ACCEPTED", "2"),
                ("WEBLING_MEMBER_GROUP_DECLINED", "3"),
            ]);
        }
        let map: HashMap<&str, &str> = pairs.into_iter().collect();
        Config::from_lookup(|k| map.get(k).map(|v| v.to_string())).unwrap()
    }

    struct Harness {
        messenger: Arc<FakeMessenger>,
        membership: Arc<FakeMembership>,
        mailer: Arc<FakeMailer>,
        dispatcher: Dispatcher,
    }

    fn harness(membership: FakeMembership, mailer: FakeMailer) -> Harness {
        let messenger = Arc::new(FakeMessenger::default());
        let membership = Arc::new(membership);
        let mailer = Arc::new(mailer);
        let dispatcher = Dispatcher::new(
            &config(true),
            messenger.clone(),
            Some(membership.clone() as Arc<dyn MembershipPort>),
            Some(mailer.clone() as Arc<dyn MailPort>),
        );
        Harness {
            messenger,
            membership,
            mailer,
            dispatcher,
        }
    }

    fn ctx(chat_id: i64, kind: ChatKind, text: &str) -> RequestContext {
        RequestContext {
            chat_id: ChatId(chat_id),
            text: text.to_string(),
            chat_kind: kind,
        }
    }

    async fn run(h: &Harness, text: &str) -> DispatchOutcome {
        h.dispatcher
            .dispatch(&ctx(ADMIN_CHAT, ChatKind::Supergroup, text))
            .await
    }

    #[tokio::test]
    async fn unknown_text_gets_one_acknowledgment_and_no_calls() {
        for text in ["hello", "/start", "/LIST", "list quiet"] {
            let h = harness(FakeMembership::default(), FakeMailer::default());
            assert_eq!(run(&h, text).await, DispatchOutcome::Handled("unknown"));
            let texts = h.messenger.texts();
            assert_eq!(texts.len(), 1, "{text}");
            assert!(texts[0].starts_with("Unbekannter Befehl"));
            assert_eq!(h.membership.calls(), 0);
            assert!(h.mailer.sent.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn non_digit_ids_are_rejected_without_membership_calls() {
        for text in ["/accept 4x2", "/decline abc", "/accept 1 2", "/decline -5"] {
            let h = harness(FakeMembership::default(), FakeMailer::default());
            run(&h, text).await;
            let texts = h.messenger.texts();
            assert_eq!(texts.len(), 1);
            assert!(texts[0].starts_with("Ungültige ID: "), "{text}: {texts:?}");
            assert_eq!(h.membership.calls(), 0);
        }
    }

    #[tokio::test]
    async fn missing_id_replies_with_usage() {
        let h = harness(FakeMembership::default(), FakeMailer::default());
        run(&h, "/accept").await;
        run(&h, "/decline   ").await;
        assert_eq!(
            h.messenger.texts(),
            vec![messages::ACCEPT_USAGE.to_string(), messages::DECLINE_USAGE.to_string()]
        );
        assert_eq!(h.membership.calls(), 0);
    }

    #[tokio::test]
    async fn empty_list_reports_once_unless_quiet() {
        let h = harness(FakeMembership::default(), FakeMailer::default());
        run(&h, "/list").await;
        assert_eq!(h.messenger.texts(), vec![messages::LIST_EMPTY.to_string()]);

        let h = harness(FakeMembership::default(), FakeMailer::default());
        assert_eq!(run(&h, "/list quiet").await, DispatchOutcome::Handled("list"));
        assert!(h.messenger.texts().is_empty());
    }

    #[tokio::test]
    async fn list_renders_markdown_summary() {
        let h = harness(
            FakeMembership::with(vec![applicant("7", OPEN), applicant("8", ACCEPTED)]),
            FakeMailer::default(),
        );
        run(&h, "/list quiet").await;

        let sent = h.messenger.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        let (chat, text, markdown) = &sent[0];
        assert_eq!(*chat, ADMIN_CHAT);
        assert!(*markdown);
        assert!(text.contains("\\(1\\)"));
        assert!(text.contains("ID: 7"));
        assert!(!text.contains("ID: 8"));
        assert!(text.contains("membergroup/1"));
    }

    #[tokio::test]
    async fn list_failure_is_reported_generically() {
        let membership = FakeMembership {
            fail_listing: true,
            ..Default::default()
        };
        let h = harness(membership, FakeMailer::default());
        run(&h, "/list quiet").await;
        assert_eq!(h.messenger.texts(), vec![messages::LIST_FAILED.to_string()]);
    }

    #[tokio::test]
    async fn accept_moves_and_mails() {
        let h = harness(
            FakeMembership::with(vec![applicant("42", OPEN)]),
            FakeMailer::default(),
        );
        run(&h, "/accept 42").await;

        assert_eq!(
            h.membership.moves.lock().unwrap().clone(),
            vec![("42".to_string(), ACCEPTED)]
        );
        assert_eq!(h.messenger.texts(), vec![messages::accepted_mail_sent("42")]);

        let mails = h.mailer.sent.lock().unwrap().clone();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].to.address, "ada@example.com");
        assert_eq!(mails[0].to.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(mails[0].cc.as_ref().map(|c| c.address.as_str()), Some("board@example.com"));
        assert_eq!(mails[0].subject, "Willkommen im Testverein");
        assert!(mails[0].body.starts_with("Liebe Ada,\n"));
    }

    #[tokio::test]
    async fn accept_reports_mail_failure_distinctly() {
        let mailer = FakeMailer {
            fail: true,
            ..Default::default()
        };
        let h = harness(FakeMembership::with(vec![applicant("42", OPEN)]), mailer);
        run(&h, "/accept 42").await;

        let texts = h.messenger.texts();
        assert_eq!(texts, vec![messages::accepted_mail_failed("42")]);
        assert_ne!(texts[0], messages::accepted_mail_sent("42"));
    }

    #[tokio::test]
    async fn accept_outside_open_group_is_refused_without_mail() {
        let h = harness(
            FakeMembership::with(vec![applicant("42", DECLINED)]),
            FakeMailer::default(),
        );
        run(&h, "/accept 42").await;

        assert!(h.membership.moves.lock().unwrap().is_empty());
        assert!(h.mailer.sent.lock().unwrap().is_empty());
        assert_eq!(
            h.messenger.texts(),
            vec![messages::not_in_source_group("42", "1")]
        );
    }

    #[tokio::test]
    async fn accept_upstream_failure_skips_mail() {
        let h = harness(FakeMembership::default(), FakeMailer::default());
        run(&h, "/accept 404").await;
        assert!(h.mailer.sent.lock().unwrap().is_empty());
        assert_eq!(h.messenger.texts(), vec![messages::accept_failed("404")]);
    }

    #[tokio::test]
    async fn decline_moves_without_mail() {
        let h = harness(
            FakeMembership::with(vec![applicant("9", OPEN)]),
            FakeMailer::default(),
        );
        run(&h, "/decline 9").await;

        assert_eq!(
            h.membership.moves.lock().unwrap().clone(),
            vec![("9".to_string(), DECLINED)]
        );
        assert!(h.mailer.sent.lock().unwrap().is_empty());
        assert_eq!(h.messenger.texts(), vec![messages::declined("9")]);
    }

    #[tokio::test]
    async fn decline_failure_is_reported() {
        let h = harness(FakeMembership::default(), FakeMailer::default());
        run(&h, "/decline 9").await;
        assert_eq!(h.messenger.texts(), vec![messages::decline_failed("9")]);
    }

    #[tokio::test]
    async fn help_has_no_side_effects() {
        let h = harness(FakeMembership::default(), FakeMailer::default());
        run(&h, "/help").await;
        assert_eq!(h.messenger.texts(), vec![messages::HELP.to_string()]);
        assert_eq!(h.membership.calls(), 0);
    }

    #[tokio::test]
    async fn unauthorized_group_gets_farewell_and_is_left() {
        let h = harness(FakeMembership::default(), FakeMailer::default());
        let out = h
            .dispatcher
            .dispatch(&ctx(-555, ChatKind::Group, "/list"))
            .await;

        assert_eq!(out, DispatchOutcome::Left);
        assert_eq!(h.messenger.texts(), vec![messages::FAREWELL.to_string()]);
        assert_eq!(h.messenger.left.lock().unwrap().clone(), vec![-555]);
        assert_eq!(h.membership.calls(), 0);
    }

    #[tokio::test]
    async fn unauthorized_private_chat_is_ignored_silently() {
        let h = harness(FakeMembership::default(), FakeMailer::default());
        for kind in [ChatKind::Private, ChatKind::Unknown] {
            let out = h.dispatcher.dispatch(&ctx(77, kind, "/accept 42")).await;
            assert_eq!(out, DispatchOutcome::Ignored);
        }
        assert!(h.messenger.texts().is_empty());
        assert!(h.messenger.left.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_webling_config_short_circuits() {
        let messenger = Arc::new(FakeMessenger::default());
        let membership = Arc::new(FakeMembership::with(vec![applicant("42", OPEN)]));
        let dispatcher = Dispatcher::new(
            &config(false),
            messenger.clone(),
            Some(membership.clone() as Arc<dyn MembershipPort>),
            None,
        );

        let out = dispatcher
            .dispatch(&ctx(ADMIN_CHAT, ChatKind::Group, "/accept 42"))
            .await;
        assert_eq!(out, DispatchOutcome::NotConfigured("accept"));
        assert!(messenger.texts().is_empty());
        assert_eq!(membership.calls(), 0);
    }

    #[tokio::test]
    async fn missing_mailer_still_accepts() {
        let messenger = Arc::new(FakeMessenger::default());
        let membership = Arc::new(FakeMembership::with(vec![applicant("42", OPEN)]));
        let dispatcher = Dispatcher::new(
            &config(true),
            messenger.clone(),
            Some(membership as Arc<dyn MembershipPort>),
            None,
        );

        dispatcher
            .dispatch(&ctx(ADMIN_CHAT, ChatKind::Group, "/accept 42"))
            .await;
        assert_eq!(messenger.texts(), vec![messages::accepted_mail_failed("42")]);
    }

    #[test]
    fn welcome_mail_requires_address_and_falls_back_on_names() {
        let welcome = WelcomeConfig {
            club_name: "Verein".into(),
            links: vec![("Discord".into(), "https://discord.gg/x".into())],
            footer: None,
        };

        let mut rec = applicant("1", OPEN);
        rec.properties.remove("Anrede");
        rec.properties.remove("Rufname");
        let mail = welcome_mail(&rec, &welcome, None, None).unwrap();
        assert!(mail.body.starts_with("Hallo Ada,\n"));
        assert!(mail.body.contains("- Discord: https://discord.gg/x\n"));
        assert!(mail.body.ends_with("Der Vorstand"));
        assert!(!mail.body.contains("\n\n\nWir"));

        rec.properties.remove("E-Mail");
        assert!(matches!(
            welcome_mail(&rec, &welcome, None, None),
            Err(Error::Mail(_))
        ));
    }

    #[test]
    fn welcome_footer_follows_links() {
        let welcome = WelcomeConfig {
            club_name: "Verein".into(),
            links: vec![("Discord".into(), "https://discord.gg/x".into())],
            footer: Some("Am besten, Du meldest Dich gleich im Discord an.".into()),
        };
        let mail = welcome_mail(&applicant("1", OPEN), &welcome, None, None).unwrap();
        assert!(mail.body.contains(
            "- Discord: https://discord.gg/x\n\nAm besten, Du meldest Dich gleich im Discord an.\nWir wünschen"
        ));
    }

    #[tokio::test]
    async fn report_goes_to_configured_chat() {
        let h = harness(
            FakeMembership::with(vec![applicant("7", OPEN)]),
            FakeMailer::default(),
        );
        assert_eq!(
            h.dispatcher.report_open_applications(None, true).await,
            DispatchOutcome::Handled("list")
        );

        let sent = h.messenger.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        let (chat, text, markdown) = &sent[0];
        assert_eq!(*chat, -2002);
        assert!(*markdown);
        assert!(text.contains("ID: 7"));
    }

    #[tokio::test]
    async fn quiet_empty_report_sends_nothing() {
        let h = harness(FakeMembership::default(), FakeMailer::default());
        h.dispatcher.report_open_applications(None, true).await;
        assert!(h.messenger.texts().is_empty());
        assert_eq!(h.membership.calls(), 1);

        h.dispatcher
            .report_open_applications(Some(ChatId(-3003)), false)
            .await;
        let sent = h.messenger.sent.lock().unwrap().clone();
        assert_eq!(sent, vec![(-3003, messages::LIST_EMPTY.to_string(), false)]);
    }

    #[tokio::test]
    async fn report_without_target_chat_is_skipped() {
        let messenger = Arc::new(FakeMessenger::default());
        let membership = Arc::new(FakeMembership::with(vec![applicant("7", OPEN)]));
        let mut cfg = config(true);
        cfg.report_chat = None;
        let dispatcher = Dispatcher::new(
            &cfg,
            messenger.clone(),
            Some(membership.clone() as Arc<dyn MembershipPort>),
            None,
        );
        assert_eq!(
            dispatcher.report_open_applications(None, false).await,
            DispatchOutcome::NotConfigured("report")
        );
        assert!(messenger.texts().is_empty());
        assert_eq!(membership.calls(), 0);
    }
}
