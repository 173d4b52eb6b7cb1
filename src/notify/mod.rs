//! Delivery of verification codes and welcome messages.
//!
//! The core only decides *what* to send; a `Notifier` decides how. The default
//! `LogNotifier` writes to the log for local development, `WebhookNotifier`
//! hands each message to an HTTP relay (mail gateway, SMS bridge, ...).

mod webhook;

pub use webhook::WebhookNotifier;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::otp::CodeIntent;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a one-time code and its magic link to `identifier`.
    async fn send_code(
        &self,
        identifier: &str,
        code: &str,
        magic_link: &str,
        intent: CodeIntent,
    ) -> Result<()>;

    /// Tell a newly registered identifier that its account awaits approval.
    async fn send_welcome(&self, identifier: &str, name: Option<&str>) -> Result<()>;
}

/// Local dev notifier that logs instead of delivering.
///
/// Secrets are only emitted at DEBUG so production log levels never carry them.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_code(
        &self,
        identifier: &str,
        code: &str,
        magic_link: &str,
        intent: CodeIntent,
    ) -> Result<()> {
        info!(to = %identifier, intent = intent.as_str(), "verification code dispatched");
        debug!(to = %identifier, code = %code, magic_link = %magic_link, "verification code payload");
        Ok(())
    }

    async fn send_welcome(&self, identifier: &str, name: Option<&str>) -> Result<()> {
        info!(to = %identifier, name = name.unwrap_or_default(), "welcome message dispatched");
        Ok(())
    }
}
