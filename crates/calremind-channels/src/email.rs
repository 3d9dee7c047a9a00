use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::NotificationChannel;

/// Sends reminders to the configured address over STARTTLS SMTP.
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    mailbox: Mailbox,
}

impl EmailChannel {
    pub fn new(server: &str, port: u16, address: &str, password: &str) -> Result<Self> {
        let mailbox: Mailbox = address
            .parse()
            .with_context(|| format!("invalid email address {address:?}"))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)
            .with_context(|| format!("invalid smtp server {server:?}"))?
            .port(port)
            .credentials(Credentials::new(address.to_string(), password.to_string()))
            .build();
        Ok(Self { transport, mailbox })
    }
}

/// Plain-text message addressed from and to the same mailbox.
pub fn build_message(mailbox: &Mailbox, subject: &str, body: &str) -> Result<Message> {
    Message::builder()
        .from(mailbox.clone())
        .to(mailbox.clone())
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .context("failed to build email message")
}

#[async_trait::async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let message = build_message(&self.mailbox, subject, body)?;
        self.transport
            .send(message)
            .await
            .context("smtp send failed")?;
        Ok(())
    }
}
