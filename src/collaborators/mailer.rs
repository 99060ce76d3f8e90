use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

/// A file attached to an outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
    pub attachments: Vec<EmailAttachment>,
}

impl OutgoingEmail {
    pub fn text(to: impl Into<String>, subject: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            text: text.into(),
            html: None,
            attachments: Vec::new(),
        }
    }
}

/// Delivers candidate notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Notifier for LogMailer {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        info!(
            to = %email.to,
            subject = %email.subject,
            attachments = email.attachments.len(),
            "Email not sent (log mailer)"
        );
        debug!("{}", email.text);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    StartTls,
    Tls,
    None,
}

impl TlsMode {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "tls" | "ssl" => TlsMode::Tls,
            "none" | "false" | "off" => TlsMode::None,
            _ => TlsMode::StartTls,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub server: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: TlsMode,
    pub from: String,
    pub timeout: Duration,
}

impl SmtpSettings {
    /// Read `SMTP_*` and `SENDER_EMAIL`. Returns `None` when `SMTP_SERVER`
    /// is not set.
    pub fn from_env(from_override: Option<&str>) -> Option<Self> {
        let server = std::env::var("SMTP_SERVER").ok().filter(|s| !s.trim().is_empty())?;
        let username = std::env::var("SMTP_USERNAME").ok();
        let from = from_override
            .map(str::to_string)
            .or_else(|| std::env::var("SENDER_EMAIL").ok())
            .or_else(|| username.clone())
            .unwrap_or_else(|| format!("no-reply@{}", server));
        Some(Self {
            port: std::env::var("SMTP_PORT").ok().and_then(|v| v.parse().ok()),
            password: std::env::var("SMTP_PASSWORD").ok(),
            tls: std::env::var("SMTP_TLS")
                .map(|v| TlsMode::parse(&v))
                .unwrap_or(TlsMode::StartTls),
            server,
            username,
            from,
            timeout: Duration::from_secs(30),
        })
    }
}

/// SMTP delivery through lettre.
pub struct SmtpMailer {
    settings: SmtpSettings,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings) -> Result<Self> {
        let mut builder = match settings.tls {
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.server),
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.server)?,
            TlsMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)?,
        };
        if let Some(port) = settings.port {
            builder = builder.port(port);
        }
        builder = builder.timeout(Some(settings.timeout));
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        let transport = builder.build();
        Ok(Self { settings, transport })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message> {
        let from: Mailbox = self
            .settings
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid sender address '{}': {}", self.settings.from, e))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid recipient address '{}': {}", email.to, e))?;

        let builder = Message::builder().from(from).to(to).subject(&email.subject);

        let text_part = SinglePart::builder()
            .header(ContentType::TEXT_PLAIN)
            .body(email.text.clone());
        let body = match &email.html {
            Some(html) => MultiPart::alternative().singlepart(text_part).singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(html.clone()),
            ),
            None => MultiPart::mixed().singlepart(text_part),
        };

        let message = if email.attachments.is_empty() {
            builder.multipart(body)?
        } else {
            let mut mixed = MultiPart::mixed().multipart(body);
            for attachment in &email.attachments {
                let content_type = ContentType::parse(&attachment.content_type)
                    .map_err(|e| anyhow::anyhow!("invalid content type '{}': {}", attachment.content_type, e))?;
                mixed = mixed.singlepart(
                    Attachment::new(attachment.filename.clone()).body(attachment.body.clone(), content_type),
                );
            }
            builder.multipart(mixed)?
        };
        Ok(message)
    }
}

#[async_trait]
impl Notifier for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let message = self.build_message(email)?;
        let response = self.transport.send(message).await?;
        if !response.is_positive() {
            anyhow::bail!("SMTP server returned {}", response.code());
        }
        info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}
