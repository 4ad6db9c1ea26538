//! Sender capabilities: the dispatcher hands a fully composed message to an
//! `EmailSender` or `SmsSender`; transport, credentials, and retries are the
//! sender's concern.

pub mod smtp;
pub mod twilio;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SenderError {
    #[error("invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("failed to send notification: {0}")]
    SendFailed(String),
}

/// A composed email, ready to hand to a transport.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub to_name: String,
    pub to_address: String,
    pub subject: String,
    pub html_body: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), SenderError>;
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), SenderError>;
}
