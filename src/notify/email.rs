// src/notify/email.rs
use async_trait::async_trait;
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::DigestMailer;
use crate::config::EmailConfig;
use crate::digest::RenderedDigest;
use crate::error::DeliveryError;

pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// STARTTLS relay with optional credentials. `email.from` falls back to the SMTP user.
    pub fn from_config(cfg: &EmailConfig) -> Result<Self, DeliveryError> {
        let from_addr = cfg
            .from
            .clone()
            .or_else(|| cfg.smtp_user.clone())
            .ok_or_else(|| DeliveryError::Address("EMAIL_FROM missing".into()))?;
        let from: Mailbox = from_addr
            .parse()
            .map_err(|_| DeliveryError::Address(from_addr.clone()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?
            .port(cfg.smtp_port);
        if let (Some(user), Some(pass)) = (&cfg.smtp_user, &cfg.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }
}

/// Build the multipart (text + HTML) message. Split out so it can be tested
/// without a transport.
pub fn build_message(
    from: &Mailbox,
    digest: &RenderedDigest,
    recipients: &[String],
) -> Result<Message, DeliveryError> {
    if recipients.is_empty() {
        return Err(DeliveryError::NoRecipients);
    }
    let mut builder = Message::builder().from(from.clone()).subject(digest.subject.clone());
    for r in recipients {
        let mb: Mailbox = r.parse().map_err(|_| DeliveryError::Address(r.clone()))?;
        builder = builder.to(mb);
    }
    builder
        .multipart(MultiPart::alternative_plain_html(
            digest.text.clone(),
            digest.html.clone(),
        ))
        .map_err(|e| DeliveryError::Build(e.to_string()))
}

#[async_trait]
impl DigestMailer for SmtpMailer {
    async fn send(&self, digest: &RenderedDigest, recipients: &[String]) -> Result<(), DeliveryError> {
        let msg = build_message(&self.from, digest, recipients)?;
        self.mailer
            .send(msg)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        tracing::info!(
            target: "notify",
            run_id = %digest.run_id,
            recipients = recipients.len(),
            items = digest.item_ids.len(),
            "email sent"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest() -> RenderedDigest {
        RenderedDigest {
            run_id: "digest-2024-05-02-0930".into(),
            subject: "Trend Digest".into(),
            text: "plain".into(),
            html: "<p>html</p>".into(),
            item_ids: vec![],
        }
    }

    #[test]
    fn message_needs_valid_recipients() {
        let from: Mailbox = "Monitor <monitor@example.com>".parse().unwrap();
        assert!(matches!(
            build_message(&from, &digest(), &[]),
            Err(DeliveryError::NoRecipients)
        ));
        assert!(matches!(
            build_message(&from, &digest(), &["not an address".into()]),
            Err(DeliveryError::Address(_))
        ));
        let msg = build_message(&from, &digest(), &["a@x.io".into(), "b@y.io".into()]).unwrap();
        assert_eq!(msg.envelope().to().len(), 2);
    }

    #[test]
    fn from_is_required() {
        let cfg = EmailConfig::default();
        assert!(matches!(
            SmtpMailer::from_config(&cfg),
            Err(DeliveryError::Address(_))
        ));
    }
}
