//! Mail transports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url, header::AUTHORIZATION};
use tracing::info;

use crate::application::mail::{MailError, Mailer, OutgoingMail};
use crate::config::{MailSettings, MailTransport};
use crate::infra::error::InfraError;

/// Development transport: messages are written to the log and never leave
/// the process.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        info!(
            target = "quire::infra::mail",
            from = %mail.from,
            to = ?mail.to,
            subject = %mail.subject,
            body = %mail.body,
            "mail captured by log transport"
        );
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "log"
    }
}

/// Hands messages to an HTTP mail relay as a JSON document.
#[derive(Debug, Clone)]
pub struct WebhookMailer {
    client: Client,
    url: Url,
    token: Option<String>,
}

impl WebhookMailer {
    pub fn new(url: Url, token: Option<String>, timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("quire/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::mail(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, url, token })
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let mut request = self.client.post(self.url.clone()).json(&mail);
        if let Some(token) = self.token.as_ref() {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|err| MailError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "webhook"
    }
}

pub fn build_mailer(settings: &MailSettings) -> Result<Arc<dyn Mailer>, InfraError> {
    match &settings.transport {
        MailTransport::Log => Ok(Arc::new(LogMailer)),
        MailTransport::Webhook {
            url,
            token,
            timeout,
        } => Ok(Arc::new(WebhookMailer::new(
            url.clone(),
            token.clone(),
            *timeout,
        )?)),
    }
}
