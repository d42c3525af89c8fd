// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SMS notifications through a Twilio-compatible messaging API.

use crate::config::SmsSettings;
use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// Accepted message as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentMessage {
    pub sid: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// SMS API client.
#[derive(Clone)]
pub struct SmsClient {
    http: reqwest::Client,
    settings: SmsSettings,
}

impl SmsClient {
    pub fn new(settings: SmsSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    /// Recipient used when a request does not name one.
    pub fn default_to(&self) -> Option<&str> {
        self.settings.default_to.as_deref()
    }

    /// Send `body` to `to` (E.164 number).
    pub async fn send(&self, to: &str, body: &str) -> Result<SentMessage, AppError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.settings.base_url, self.settings.account_sid
        );

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.settings.api_key_sid, Some(&self.settings.api_key_secret))
            .form(&[
                ("To", to),
                ("From", self.settings.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .map_err(|e| AppError::Messaging(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "SMS send failed");
            return Err(AppError::Messaging(format!("HTTP {}: {}", status, body)));
        }

        let sent: SentMessage = response
            .json()
            .await
            .map_err(|e| AppError::Messaging(format!("JSON parse error: {}", e)))?;

        tracing::info!(sid = %sent.sid, status = ?sent.status, "SMS sent");
        Ok(sent)
    }
}
