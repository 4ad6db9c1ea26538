//! Email sender over SMTP, using lettre's async transport.

use async_trait::async_trait;
use lettre::message::{Mailbox, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{EmailSender, MailMessage, SenderError};

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailSender {
    pub fn new(config: &SmtpConfig) -> Result<Self, SenderError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        let from = config
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| SenderError::InvalidConfiguration(format!("from address: {e}")))?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, message: &MailMessage) -> Result<(), SenderError> {
        let to = format!("{} <{}>", message.to_name, message.to_address)
            .parse::<Mailbox>()
            .map_err(|e| SenderError::InvalidMessage(format!("to address: {e}")))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.subject)
            .header(header::ContentType::TEXT_HTML)
            .body(message.html_body.clone())
            .map_err(|e| SenderError::InvalidMessage(e.to_string()))?;

        self.transport.send(email).await?;
        Ok(())
    }
}
