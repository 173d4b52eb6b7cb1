use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{info_span, Instrument};
use url::Url;

use super::Notifier;
use crate::otp::CodeIntent;
use crate::APP_USER_AGENT;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RelayMessage<'a> {
    Code {
        to: &'a str,
        code: &'a str,
        magic_link: &'a str,
        intent: CodeIntent,
    },
    Welcome {
        to: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<&'a str>,
    },
}

/// POSTs each message as JSON to a relay. Any non-2xx answer is a delivery failure.
#[derive(Clone, Debug)]
pub struct WebhookNotifier {
    client: Client,
    endpoint: Url,
}

impl WebhookNotifier {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: Url) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build webhook client")?;
        Ok(Self { client, endpoint })
    }

    async fn post(&self, message: &RelayMessage<'_>) -> Result<()> {
        let span = info_span!("notify.webhook", http.url = %self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(message)
            .send()
            .instrument(span)
            .await
            .with_context(|| format!("failed to reach notification relay {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!(
                "notification relay {} answered {status}",
                self.endpoint
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_code(
        &self,
        identifier: &str,
        code: &str,
        magic_link: &str,
        intent: CodeIntent,
    ) -> Result<()> {
        self.post(&RelayMessage::Code {
            to: identifier,
            code,
            magic_link,
            intent,
        })
        .await
    }

    async fn send_welcome(&self, identifier: &str, name: Option<&str>) -> Result<()> {
        self.post(&RelayMessage::Welcome {
            to: identifier,
            name,
        })
        .await
    }
}
