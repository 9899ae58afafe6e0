//! Outbound email. Every message the engine sends goes through `EmailSender`.
//!
//! The HTTP backend talks to a transactional email API (JSON POST, bearer key).
//! Without credentials the service falls back to `LogEmailSender`.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod templates;

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Gave up after {retries} attempts")]
    Exhausted { retries: u32 },
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Returns whether the provider accepted the message.
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<bool, EmailError>;
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct HttpEmailSender {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpEmailSender {
    pub fn new(api_url: String, api_key: String, from: String) -> Result<Self, EmailError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            api_url,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    /// Retries on 429 and 5xx with exponential backoff.
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<bool, EmailError> {
        let body = SendRequest {
            from: &self.from,
            to,
            subject,
            html,
        };

        let mut last_error: Option<EmailError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // 500ms, 1s
                let delay = Duration::from_millis(500 * (1 << (attempt - 1)));
                warn!(
                    "Email send attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(&self.api_url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(EmailError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let text = response.text().await.unwrap_or_default();
                warn!("Email API returned {}: {}", status, text);
                last_error = Some(EmailError::Api {
                    status: status.as_u16(),
                    message: text,
                });
                continue;
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiErrorBody>(&text)
                    .map(|e| e.message)
                    .unwrap_or(text);
                return Err(EmailError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            debug!(to, subject, "Email accepted by provider");
            return Ok(true);
        }

        Err(last_error.unwrap_or(EmailError::Exhausted {
            retries: MAX_RETRIES,
        }))
    }
}

/// Dev backend: writes the message to the log and reports success.
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<bool, EmailError> {
        info!(to, subject, bytes = html.len(), "Email (not sent, no provider configured)");
        Ok(true)
    }
}
