use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use wtb_core::{
    config::Config,
    dispatch::{DispatchOutcome, Dispatcher},
    domain::ChatId,
    http::RequestClient,
    ports::{MailPort, Mailbox, MembershipPort},
};
use wtb_mail::SmtpMailer;
use wtb_telegram::{
    webhook::{self, WebhookState},
    TelegramClient,
};
use wtb_webling::WeblingClient;

/// Telegram webhook bot for reviewing Webling membership applications.
#[derive(Parser, Debug)]
#[command(name = "wtb")]
struct Cli {
    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run the webhook server (default).
    Serve,
    /// Check the Webling credentials and list the configured groups.
    CheckWebling,
    /// Send a test mail through the configured SMTP relay.
    TestSmtp { recipient: String },
    /// Post the open-applications summary once (for cron/systemd timers).
    Report {
        /// Target chat; defaults to TELEGRAM_CHAT_ID.
        #[arg(long, allow_negative_numbers = true)]
        chat: Option<i64>,
        /// Send nothing when there are no open applications.
        #[arg(long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    wtb_core::logging::init("wtb")?;

    let cfg = Arc::new(Config::load()?);
    let http = RequestClient::new(cfg.http)?;

    match cli.command.unwrap_or(Cmd::Serve) {
        Cmd::Serve => serve(cfg, http).await,
        Cmd::CheckWebling => check_webling(&cfg, http).await,
        Cmd::TestSmtp { recipient } => test_smtp(&cfg, &recipient).await,
        Cmd::Report { chat, quiet } => report(&cfg, http, chat, quiet).await,
    }
}

async fn serve(cfg: Arc<Config>, http: RequestClient) -> anyhow::Result<()> {
    let telegram = Arc::new(TelegramClient::from_config(&cfg, http.clone()));
    match telegram.get_me().await {
        Ok(me) => tracing::info!(username = ?me.username, "bot identity confirmed"),
        Err(e) => tracing::warn!(error = %e, "getMe failed, continuing"),
    }

    let membership = cfg
        .webling
        .as_ref()
        .map(|w| Arc::new(WeblingClient::new(w, http.clone())) as Arc<dyn MembershipPort>);
    let mailer = match &cfg.smtp {
        Some(smtp) => Some(Arc::new(SmtpMailer::new(smtp)?) as Arc<dyn MailPort>),
        None => None,
    };
    if membership.is_none() {
        tracing::warn!("Webling not configured, membership commands are disabled");
    }
    if mailer.is_none() {
        tracing::warn!("SMTP not configured, welcome mails are disabled");
    }

    let dispatcher = Dispatcher::new(&cfg, telegram, membership, mailer);
    let app = webhook::router(
        WebhookState {
            dispatcher: Arc::new(dispatcher),
            secret: cfg.webhook_secret.clone(),
        },
        &cfg.webhook_path,
    );

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("bind {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, path = %cfg.webhook_path, "listening for webhook updates");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    tracing::info!("shut down");
    Ok(())
}

async fn report(
    cfg: &Config,
    http: RequestClient,
    chat: Option<i64>,
    quiet: bool,
) -> anyhow::Result<()> {
    let webling = cfg
        .webling
        .as_ref()
        .context("Webling is not configured (WEBLING_BASE_URL, WEBLING_API_KEY, WEBLING_MEMBER_GROUP_*)")?;
    let telegram = Arc::new(TelegramClient::from_config(cfg, http.clone()));
    let membership = Arc::new(WeblingClient::new(webling, http)) as Arc<dyn MembershipPort>;
    let dispatcher = Dispatcher::new(cfg, telegram, Some(membership), None);

    match dispatcher
        .report_open_applications(chat.map(ChatId), quiet)
        .await
    {
        DispatchOutcome::NotConfigured(_) => {
            anyhow::bail!("no target chat: pass --chat or set TELEGRAM_CHAT_ID")
        }
        outcome => {
            tracing::info!(?outcome, "report finished");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn check_webling(cfg: &Config, http: RequestClient) -> anyhow::Result<()> {
    let webling = cfg
        .webling
        .as_ref()
        .context("Webling is not configured (WEBLING_BASE_URL, WEBLING_API_KEY, WEBLING_MEMBER_GROUP_*)")?;
    let client = WeblingClient::new(webling, http);

    println!("Webling: {}", webling.base_url);
    let groups = [
        ("open", webling.groups.open),
        ("accepted", webling.groups.accepted),
        ("declined", webling.groups.declined),
    ];
    for (label, group) in groups {
        let ids = client
            .fetch_members_in_group(group)
            .await
            .with_context(|| format!("listing group {label} ({group})"))?;
        println!("  {label:<9} group {group}: {} member(s)", ids.len());
    }

    let open = client.fetch_members_in_group(webling.groups.open).await?;
    let sample: Vec<_> = open.into_iter().take(3).collect();
    for record in client.fetch_members(&sample).await? {
        println!(
            "  #{} {} {}",
            record.id,
            record.property("Vorname").unwrap_or("N/A"),
            record.property("Name").unwrap_or("N/A"),
        );
    }

    println!("Webling connection OK");
    Ok(())
}

async fn test_smtp(cfg: &Config, recipient: &str) -> anyhow::Result<()> {
    let smtp = cfg
        .smtp
        .as_ref()
        .context("SMTP is not configured (SMTP_HOST, SMTP_PORT, SMTP_USER, SMTP_PASS, SMTP_FROM)")?;
    let mailer = SmtpMailer::new(smtp)?;

    println!("SMTP: {}:{} as {}", smtp.host, smtp.port, smtp.username);
    mailer.test_connection().await?;
    println!("  connection and login OK");

    let mail = wtb_mail::probe_mail(Mailbox::new(recipient, None), &cfg.welcome.club_name);
    mailer.send_transactional_email(mail).await?;
    println!("  test mail sent to {recipient}");
    Ok(())
}
