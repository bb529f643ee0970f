//! SMTP adapter (lettre).
//!
//! Implements the `wtb-core` MailPort. One message per call, no retries.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox as LettreMailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use wtb_core::{
    config::SmtpConfig,
    errors::Error,
    ports::{MailPort, Mailbox, OutgoingMail},
    Result,
};

/// Port for SMTP over implicit TLS; everything else negotiates STARTTLS.
pub const IMPLICIT_TLS_PORT: u16 = 465;

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    host: String,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("host", &self.host)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> Result<Self> {
        let creds = Credentials::new(cfg.username.clone(), cfg.password.clone());
        let builder = if cfg.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
        }
        .map_err(|e| Error::Config(format!("smtp relay {}: {e}", cfg.host)))?;

        let transport = builder.port(cfg.port).credentials(creds).build();
        Ok(Self {
            transport,
            from: cfg.from.clone(),
            host: cfg.host.clone(),
        })
    }

    /// Connect, negotiate TLS and authenticate without sending anything.
    pub async fn test_connection(&self) -> Result<()> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::Mail(format!("{} rejected the connection", self.host))),
            Err(e) => Err(Error::Mail(format!("{}: {e}", self.host))),
        }
    }
}

#[async_trait]
impl MailPort for SmtpMailer {
    async fn send_transactional_email(&self, mail: OutgoingMail) -> Result<()> {
        let message = build_message(&self.from, &mail)?;
        match self.transport.send(message).await {
            Ok(resp) => {
                tracing::info!(to = %mail.to.address, code = %resp.code(), "mail sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(to = %mail.to.address, host = %self.host, error = %e, "mail send failed");
                Err(Error::Mail(e.to_string()))
            }
        }
    }
}

fn mailbox(m: &Mailbox) -> Result<LettreMailbox> {
    let address: Address = m
        .address
        .parse()
        .map_err(|e| Error::Mail(format!("invalid address {:?}: {e}", m.address)))?;
    Ok(LettreMailbox::new(m.name.clone(), address))
}

/// Plain-text UTF-8 message with optional Cc and Reply-To.
pub fn build_message(from: &Mailbox, mail: &OutgoingMail) -> Result<Message> {
    let mut builder = Message::builder()
        .from(mailbox(from)?)
        .to(mailbox(&mail.to)?)
        .subject(mail.subject.as_str())
        .header(ContentType::TEXT_PLAIN);
    if let Some(cc) = &mail.cc {
        builder = builder.cc(mailbox(cc)?);
    }
    if let Some(reply_to) = &mail.reply_to {
        builder = builder.reply_to(mailbox(reply_to)?);
    }
    builder
        .body(mail.body.clone())
        .map_err(|e| Error::Mail(e.to_string()))
}

/// Short message for checking the relay end to end.
pub fn probe_mail(to: Mailbox, club_name: &str) -> OutgoingMail {
    OutgoingMail {
        to,
        cc: None,
        reply_to: None,
        subject: format!("SMTP-Test {club_name}"),
        body: "Diese Nachricht bestätigt, dass der Mailversand funktioniert.\n".to_string(),
    }
}
