//! SMS sender over the Twilio messages API: a form POST with basic auth,
//! success meaning any 2xx response.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{SenderError, SmsSender};

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

pub struct TwilioSmsSender {
    client: Client,
    config: TwilioConfig,
}

impl TwilioSmsSender {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(SEND_TIMEOUT)
                .build()
                .unwrap(), // Should not fail with default settings
            config,
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.config.account_sid
        )
    }
}

#[async_trait]
impl SmsSender for TwilioSmsSender {
    async fn send(&self, to: &str, body: &str) -> Result<(), SenderError> {
        let form = [
            ("To", to),
            ("From", self.config.from_number.as_str()),
            ("Body", body),
        ];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "twilio returned {status}: {error_body}"
            )));
        }
        Ok(())
    }
}
