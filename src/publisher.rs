//! Sends presence updates to the user settings endpoint.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::presence::{CustomStatus, SettingsPatch};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v9";
const SETTINGS_PATH: &str = "/users/@me/settings";

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to encode status: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Something that can show or clear a custom status.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes `status`, or clears the remote status when `None`.
    async fn publish(&self, status: Option<&CustomStatus>) -> Result<(), PublishError>;
}

/// PATCHes the settings endpoint with the account token.
pub struct HttpPublisher {
    http: Client,
    url: String,
    token: String,
}

impl HttpPublisher {
    pub fn new(
        api_base: &str,
        token: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, PublishError> {
        let mut builder =
            Client::builder().user_agent(format!("StatusMPRIS/{}", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            url: format!("{}{}", api_base.trim_end_matches('/'), SETTINGS_PATH),
            token: token.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, status: Option<&CustomStatus>) -> Result<(), PublishError> {
        debug!(url = %self.url, cleared = status.is_none(), "Updating custom status");

        let response = self
            .http
            .patch(&self.url)
            .header(reqwest::header::AUTHORIZATION, self.token.as_str())
            .json(&SettingsPatch { custom_status: status })
            .send()
            .await?;

        let code = response.status();
        if code.is_success() {
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(PublishError::Status {
                status: code.as_u16(),
                message,
            })
        }
    }
}

/// Prints each payload to stdout instead of sending it, only when it changes.
#[derive(Default)]
pub struct StdoutPublisher {
    last_output: Mutex<String>,
}

impl StdoutPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the JSON line to print, or `None` if it matches the previous one.
    pub fn render(&self, status: Option<&CustomStatus>) -> Result<Option<String>, PublishError> {
        let json_output = serde_json::to_string(&SettingsPatch { custom_status: status })?;
        let mut last = self.last_output.lock().unwrap_or_else(|e| e.into_inner());
        if *last == json_output {
            return Ok(None);
        }
        *last = json_output.clone();
        Ok(Some(json_output))
    }
}

#[async_trait]
impl Publisher for StdoutPublisher {
    async fn publish(&self, status: Option<&CustomStatus>) -> Result<(), PublishError> {
        if let Some(line) = self.render(status)? {
            println!("{}", line);
        }
        Ok(())
    }
}
