//! Outbound email delivery abstraction.
//!
//! Auth flows hand fully rendered messages to a [`Notifier`] and move on:
//! delivery is best-effort, a failed send never unwinds a state change that
//! already committed, and `send` always resolves to an outcome instead of
//! propagating errors past this boundary.
//!
//! The default for local dev is [`LogNotifier`], which logs and reports
//! success. Production wires [`HttpNotifier`] at a mail-API endpoint.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};
use ulid::Ulid;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Result object for a delivery attempt; `send` never fails harder than this.
#[derive(Clone, Debug)]
pub struct SendOutcome {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl SendOutcome {
    fn delivered(message_id: String) -> Self {
        Self {
            success: true,
            message_id: Some(message_id),
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message, reporting success or failure in the outcome.
    async fn send(&self, message: &EmailMessage) -> SendOutcome;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &EmailMessage) -> SendOutcome {
        let message_id = Ulid::new().to_string();
        info!(
            to = %message.to,
            subject = %message.subject,
            message_id = %message_id,
            "email send stub"
        );
        debug!(text = %message.text, "email body");
        SendOutcome::delivered(message_id)
    }
}

#[derive(Debug, Deserialize)]
struct DeliveryResponse {
    #[serde(rename = "messageId")]
    message_id: Option<String>,
}

/// Delivers messages through an HTTP mail API endpoint.
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
    api_token: SecretString,
}

impl HttpNotifier {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(endpoint: String, api_token: SecretString) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(crate::APP_USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            endpoint,
            api_token,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, message: &EmailMessage) -> SendOutcome {
        let payload = json!({
            "to": message.to,
            "subject": message.subject,
            "html": message.html,
            "text": message.text,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_token.expose_secret())
            .json(&payload)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(to = %message.to, error = %err, "email delivery request failed");
                return SendOutcome::failed(err.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(to = %message.to, %status, "email delivery rejected");
            return SendOutcome::failed(format!("delivery endpoint returned {status}"));
        }

        let message_id = response
            .json::<DeliveryResponse>()
            .await
            .ok()
            .and_then(|body| body.message_id)
            .unwrap_or_else(|| Ulid::new().to_string());

        SendOutcome::delivered(message_id)
    }
}
