//! SMS gateway client used to tell users a seat opened up.
//!
//! Delivery is attempted once per call; nothing here retries or records
//! what was sent.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::users::PhoneKey;

/// Credentials and endpoint for the SMS gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    pub auth_id: String,
    pub auth_token: String,
    /// Number messages are sent from
    pub source_number: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    SmsConfig::DEFAULT_API_BASE.to_string()
}

impl SmsConfig {
    pub const DEFAULT_API_BASE: &'static str = "https://api.plivo.com/v1/Account/";

    /// Message endpoint for this account, `<api_base>/<auth_id>/Message/`.
    pub fn message_url(&self) -> Result<Url, NotifyError> {
        let mut base = self.api_base.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base)
            .and_then(|url| url.join(&format!("{}/Message/", self.auth_id)))
            .map_err(|e| NotifyError::InvalidUrl {
                message: e.to_string(),
            })
    }
}

/// Errors that can occur while sending a text.
#[derive(Debug, Error, Clone)]
pub enum NotifyError {
    /// Auth id, auth token or source number is empty
    #[error("SMS credentials are missing")]
    MissingCredentials,

    /// Network/HTTP request failed
    #[error("Network error: {message}")]
    Network { message: String },

    /// The configured endpoint is not a valid URL
    #[error("URL error: {message}")]
    InvalidUrl { message: String },
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Network {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    src: &'a str,
    dst: &'a str,
    text: &'a str,
}

/// Result of handing one message to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttempt {
    pub status: u16,
    pub body: String,
}

impl DeliveryAttempt {
    /// Returns true if the gateway accepted the message for delivery.
    pub fn accepted(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends text messages through the gateway.
pub struct SmsClient {
    client: Client,
    config: SmsConfig,
    message_url: Url,
}

impl SmsClient {
    /// Creates a client, rejecting incomplete credentials.
    pub fn new(config: SmsConfig) -> Result<Self, NotifyError> {
        if config.auth_id.trim().is_empty()
            || config.auth_token.trim().is_empty()
            || config.source_number.trim().is_empty()
        {
            return Err(NotifyError::MissingCredentials);
        }

        let message_url = config.message_url()?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NotifyError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            config,
            message_url,
        })
    }

    /// Sends `message` to `number`.
    ///
    /// A rejected message is not an error; check [`DeliveryAttempt::accepted`].
    pub async fn send_text(
        &self,
        number: &str,
        message: &str,
    ) -> Result<DeliveryAttempt, NotifyError> {
        let phone = PhoneKey::from_number(number);
        let request = MessageRequest {
            src: &self.config.source_number,
            dst: number,
            text: message,
        };

        let response = self
            .client
            .post(self.message_url.clone())
            .basic_auth(&self.config.auth_id, Some(&self.config.auth_token))
            .json(&request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(phone = %phone, status, error = %e, "Failed to read gateway response body");
                String::new()
            }
        };
        let attempt = DeliveryAttempt { status, body };

        if attempt.accepted() {
            info!(phone = %phone, status = attempt.status, "Text accepted by gateway");
        } else {
            warn!(
                phone = %phone,
                status = attempt.status,
                body = %attempt.body,
                "Text rejected by gateway"
            );
        }
        Ok(attempt)
    }
}
