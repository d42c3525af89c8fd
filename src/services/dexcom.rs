// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Dexcom API client and token management.
//!
//! Handles:
//! - OAuth2 authorization-code exchange and token refresh
//! - The stored token singleton (one Dexcom account per deployment)
//! - Record endpoints (EGVs, events, alerts, calibrations)
//! - Rate limit and token error detection

use crate::error::AppError;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Keys the record list may appear under, depending on API version.
const RECORD_KEYS: &[&str] = &["records", "egvs", "events", "alerts", "calibrations"];

/// Dexcom API client.
#[derive(Clone)]
pub struct DexcomClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl DexcomClient {
    /// Create a new Dexcom client with OAuth credentials.
    pub fn new(
        base_url: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    /// Provider login page the user is redirected to.
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}/v2/oauth2/login?client_id={}&redirect_uri={}&response_type=code&scope=offline_access&state={}",
            self.base_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(state)
        )
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AppError> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    /// Refresh an expired access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(format!("{}/v2/oauth2/token", self.base_url))
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::DexcomApi(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Dexcom token request failed");
            // Keep invalid_grant visible so callers can detect revoked grants
            return Err(AppError::DexcomApi(format!(
                "Token request failed with status {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::DexcomApi(format!("Failed to parse token response: {}", e)))
    }

    /// Fetch one record category (`egvs`, `events`, `alerts`, `calibrations`).
    pub async fn get_records<T: DeserializeOwned>(
        &self,
        access_token: &str,
        kind: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<T>, AppError> {
        let url = format!("{}/v3/users/self/{}", self.base_url, kind);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("startDate", start_date), ("endDate", end_date)])
            .send()
            .await
            .map_err(|e| AppError::DexcomApi(e.to_string()))?;

        let body: serde_json::Value = self.check_response_json(response).await?;
        extract_records(kind, body)
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("Dexcom rate limit hit (429)");
                return Err(AppError::DexcomApi(AppError::DEXCOM_RATE_LIMIT.to_string()));
            }

            if status.as_u16() == 401 {
                return Err(AppError::DexcomApi(
                    AppError::DEXCOM_TOKEN_ERROR.to_string(),
                ));
            }

            return Err(AppError::DexcomApi(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::DexcomApi(format!("JSON parse error: {}", e)))
    }
}

/// Pull the record array out of a response envelope.
fn extract_records<T: DeserializeOwned>(
    kind: &str,
    mut body: serde_json::Value,
) -> Result<Vec<T>, AppError> {
    let records = RECORD_KEYS
        .iter()
        .find_map(|key| body.get_mut(*key).map(serde_json::Value::take))
        .ok_or_else(|| {
            AppError::DexcomApi(format!("Missing record list in {} response", kind))
        })?;

    serde_json::from_value(records)
        .map_err(|e| AppError::DexcomApi(format!("Malformed {} record: {}", kind, e)))
}

/// Token response from the Dexcom OAuth endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DexcomService - High-level service with token management
// ─────────────────────────────────────────────────────────────────────────────

use crate::db::FirestoreDb;
use crate::models::AccessToken;
use crate::time_utils::{format_utc_rfc3339, parse_rfc3339_utc};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Document ID of the token singleton.
pub const PROVIDER: &str = "dexcom";

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Cached access token with expiry information.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < expires_at,
            None => true,
        }
    }
}

/// High-level Dexcom service that manages the token lifecycle and API calls.
///
/// The cache mutex is held across a refresh, so concurrent requests wait for
/// one refresh instead of racing the provider with the same refresh token.
#[derive(Clone)]
pub struct DexcomService {
    client: DexcomClient,
    db: FirestoreDb,
    token_cache: Arc<Mutex<Option<CachedToken>>>,
}

impl DexcomService {
    pub fn new(client: DexcomClient, db: FirestoreDb) -> Self {
        Self {
            client,
            db,
            token_cache: Arc::new(Mutex::new(None)),
        }
    }

    pub fn authorize_url(&self, state: &str) -> String {
        self.client.authorize_url(state)
    }

    // ─── Token Management ────────────────────────────────────────────────────

    /// Get a usable access token, refreshing it if it is about to expire.
    pub async fn access_token(&self) -> Result<String, AppError> {
        let now = Utc::now();
        let mut cache = self.token_cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if cached.is_fresh(now) {
                return Ok(cached.access_token.clone());
            }
        }

        let stored = self
            .db
            .get_access_token(PROVIDER)
            .await?
            .ok_or(AppError::DexcomNotConnected)?;

        let candidate = CachedToken {
            access_token: stored.token.clone(),
            expires_at: parse_expiry(stored.expires_at.as_deref()),
        };

        if candidate.is_fresh(now) {
            *cache = Some(candidate.clone());
            return Ok(candidate.access_token);
        }

        let Some(refresh_token) = stored.refresh_token.as_deref() else {
            // Nothing to refresh with; let the API decide whether it still works
            return Ok(candidate.access_token);
        };

        tracing::info!("Dexcom access token expired, refreshing");

        let response = match self.client.refresh_token(refresh_token).await {
            Ok(response) => response,
            Err(e) if e.is_dexcom_token_error() => {
                // Another instance may have refreshed first and rotated the refresh token
                let latest = self.db.get_access_token(PROVIDER).await?;
                if let Some(latest) = latest.filter(|t| t.token != stored.token) {
                    tracing::info!("Refresh token race detected, using stored token");
                    let token = CachedToken {
                        access_token: latest.token,
                        expires_at: parse_expiry(latest.expires_at.as_deref()),
                    };
                    *cache = Some(token.clone());
                    return Ok(token.access_token);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let token = self.store_token(&response, stored.refresh_token.clone()).await?;
        *cache = Some(token.clone());

        tracing::info!("Dexcom token refreshed and cached");
        Ok(token.access_token)
    }

    /// Drop the cached token so the next call re-reads the store.
    pub async fn invalidate(&self) {
        *self.token_cache.lock().await = None;
    }

    async fn store_token(
        &self,
        response: &TokenResponse,
        previous_refresh: Option<String>,
    ) -> Result<CachedToken, AppError> {
        let expires_at = response.expires_at();
        let record = AccessToken::new(
            response.access_token.clone(),
            response.refresh_token.clone().or(previous_refresh),
            expires_at.map(format_utc_rfc3339),
        );
        self.db.set_access_token(PROVIDER, &record).await?;

        Ok(CachedToken {
            access_token: response.access_token.clone(),
            expires_at,
        })
    }

    // ─── OAuth Callback Handling ─────────────────────────────────────────────

    /// Exchange the authorization code and replace the stored token.
    pub async fn handle_oauth_callback(&self, code: &str) -> Result<(), AppError> {
        let response = self.client.exchange_code(code).await?;
        let token = self.store_token(&response, None).await?;
        *self.token_cache.lock().await = Some(token);

        tracing::info!(
            has_refresh = response.refresh_token.is_some(),
            "Dexcom OAuth callback handled, token stored"
        );
        Ok(())
    }

    // ─── API Wrappers ────────────────────────────────────────────────────────

    /// Fetch one record category with the current token.
    pub async fn get_records<T: DeserializeOwned>(
        &self,
        kind: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<T>, AppError> {
        let access_token = self.access_token().await?;
        let result = self
            .client
            .get_records(&access_token, kind, start_date, end_date)
            .await;

        if let Err(e) = &result {
            if e.is_dexcom_token_error() {
                self.invalidate().await;
            }
        }
        result
    }
}

fn parse_expiry(value: Option<&str>) -> Option<DateTime<Utc>> {
    value.and_then(parse_rfc3339_utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GlucoseReading;
    use serde_json::json;

    fn client() -> DexcomClient {
        DexcomClient::new(
            "https://sandbox-api.dexcom.com".to_string(),
            "client id".to_string(),
            "secret".to_string(),
            "http://localhost:8080/auth/dexcom/callback".to_string(),
        )
    }

    #[test]
    fn test_authorize_url_encodes_params() {
        let url = client().authorize_url("a|b|c");
        assert!(url.starts_with("https://sandbox-api.dexcom.com/v2/oauth2/login?"));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fauth%2Fdexcom%2Fcallback"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=offline_access"));
        assert!(url.contains("state=a%7Cb%7Cc"));
    }

    #[test]
    fn test_extract_records_accepts_envelope_aliases() {
        let body = json!({
            "recordType": "egv",
            "records": [{"systemTime": "2024-01-01T10:00:00", "displayTime": "2024-01-01T02:00:00", "value": 101}]
        });
        let records: Vec<GlucoseReading> = extract_records("egvs", body).unwrap();
        assert_eq!(records.len(), 1);

        let body = json!({"egvs": []});
        let records: Vec<GlucoseReading> = extract_records("egvs", body).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_extract_records_missing_key() {
        let err = extract_records::<GlucoseReading>("egvs", json!({"unexpected": []})).unwrap_err();
        assert!(matches!(err, AppError::DexcomApi(ref msg) if msg.contains("Missing record list")));
    }

    #[test]
    fn test_cached_token_freshness() {
        let now = Utc::now();
        let soon = CachedToken {
            access_token: "t".to_string(),
            expires_at: Some(now + Duration::seconds(60)),
        };
        assert!(!soon.is_fresh(now));

        let later = CachedToken {
            access_token: "t".to_string(),
            expires_at: Some(now + Duration::hours(2)),
        };
        assert!(later.is_fresh(now));

        let unknown = CachedToken {
            access_token: "t".to_string(),
            expires_at: None,
        };
        assert!(unknown.is_fresh(now));
    }
}
