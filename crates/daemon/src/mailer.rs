//! Outgoing mail: the [`Mailer`] port, its SMTP implementation and the
//! messages the daemon sends (verification codes and backup notices).

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::backup::Owner;
use crate::config::MailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub filename: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub attachment: Option<MailAttachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<()>;
}

/// SMTP relay over implicit TLS. Without complete credentials every send
/// fails with a configuration error.
pub struct SmtpMailer {
    transport: Option<(AsyncSmtpTransport<Tokio1Executor>, Mailbox)>,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        if !config.is_complete() {
            return Ok(Self { transport: None });
        }
        let (Some(user), Some(pass), Some(from)) =
            (config.user.clone(), config.pass.clone(), config.from_address())
        else {
            return Ok(Self { transport: None });
        };
        let from: Mailbox = from
            .parse()
            .with_context(|| format!("invalid sender address {from}"))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .with_context(|| format!("configuring SMTP relay {}", config.smtp_host))?
            .port(config.smtp_port)
            .credentials(Credentials::new(user, pass))
            .build();
        Ok(Self {
            transport: Some((transport, from)),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        let Some((transport, from)) = &self.transport else {
            bail!("Email configuration is missing");
        };
        let to: Mailbox = mail
            .to
            .parse()
            .with_context(|| format!("invalid recipient {}", mail.to))?;

        let alternative = MultiPart::alternative_plain_html(mail.text, mail.html);
        let body = match &mail.attachment {
            Some(att) => {
                let bytes = tokio::fs::read(&att.path)
                    .await
                    .with_context(|| format!("reading attachment {}", att.path.display()))?;
                let kind = ContentType::parse(content_type_for(&att.path))
                    .map_err(|e| anyhow!("attachment content type: {e:?}"))?;
                let part: SinglePart = Attachment::new(att.filename.clone()).body(bytes, kind);
                MultiPart::mixed().multipart(alternative).singlepart(part)
            }
            None => alternative,
        };

        let message = Message::builder()
            .from(from.clone())
            .to(to)
            .subject(mail.subject)
            .multipart(body)
            .context("building message")?;
        transport.send(message).await.context("SMTP send")?;
        info!(to = %mail.to, "mail sent");
        Ok(())
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("zip") => "application/zip",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

/// What a verification code unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpMailKind {
    Create,
    Reset,
}

pub fn otp_mail(to: &str, name: &str, otp: &str, expires_minutes: i64, kind: OtpMailKind) -> OutgoingMail {
    let name = or_default(name, "there");
    let (subject, what) = match kind {
        OtpMailKind::Create => (
            "Your Student Management App verification code",
            "verification code",
        ),
        OtpMailKind::Reset => (
            "Your Student Management App password reset code",
            "password reset code",
        ),
    };
    let text = format!("Hello {name}, your {what} is {otp}. It expires in {expires_minutes} minutes.");
    let html = format!(
        "<p>Hello {}, your {what} is</p><p style=\"font-size:24px;letter-spacing:4px\"><strong>{otp}</strong></p><p>It expires in {expires_minutes} minutes.</p>",
        escape_html(name)
    );
    OutgoingMail {
        to: to.to_string(),
        subject: subject.to_string(),
        html,
        text,
        attachment: None,
    }
}

pub fn backup_mail(
    to: &str,
    owner: &Owner,
    stamp: &str,
    file_name: &str,
    path: &Path,
    tables: &[String],
) -> OutgoingMail {
    let name = or_default(&owner.name, "there");
    let subject = format!("{} monthly backup", or_default(&owner.institute_name, "Institute"));
    let text = format!(
        "Hello {name}, your backup for {} was created on {stamp}. The attached file is {file_name}.",
        or_default(&owner.institute_name, "your institute")
    );
    let items: String = tables
        .iter()
        .map(|t| format!("<li>{}</li>", escape_html(t)))
        .collect();
    let html = format!(
        "<p>Hello {},</p><p>Your monthly backup for <strong>{}</strong> was created on {stamp}.</p><p>Included tables:</p><ul>{items}</ul><p>The attached file is <code>{}</code>.</p>",
        escape_html(name),
        escape_html(or_default(&owner.institute_name, "your institute")),
        escape_html(file_name),
    );
    OutgoingMail {
        to: to.to_string(),
        subject,
        html,
        text,
        attachment: Some(MailAttachment {
            filename: file_name.to_string(),
            path: path.to_path_buf(),
        }),
    }
}
