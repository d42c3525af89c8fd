// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Dexcom OAuth connection routes.
//!
//! The `state` parameter is `base64url(username|timestamp_hex|hmac_hex)`,
//! signed with the OAuth state key and valid for ten minutes.

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::get,
    Extension, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

/// How long a signed state stays valid.
const STATE_MAX_AGE_MS: u128 = 10 * 60 * 1000;

/// Starting the flow requires a session; the provider calls back without one.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/dexcom", get(auth_start))
}

pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/dexcom/callback", get(auth_callback))
}

/// Start OAuth flow - redirect to the Dexcom login page.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Redirect> {
    let oauth_state = sign_state(&user.username, now_millis()?, &state.config.oauth_state_key)?;
    let auth_url = state.dexcom.authorize_url(&oauth_state);

    tracing::info!(
        username = %user.username,
        "Starting Dexcom OAuth flow"
    );

    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - verify state, exchange code, store the token.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect> {
    let frontend_url = &state.config.frontend_url;

    let signed = params
        .state
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("missing state".to_string()))?;
    let username = verify_state(signed, &state.config.oauth_state_key, now_millis()?)
        .ok_or_else(|| {
            tracing::warn!("Invalid, expired or tampered OAuth state parameter");
            AppError::BadRequest("invalid state".to_string())
        })?;

    // Check for OAuth errors
    if let Some(error) = params.error {
        tracing::warn!(error = %error, username = %username, "OAuth error from Dexcom");
        let redirect = format!(
            "{}/?dexcom=error&reason={}",
            frontend_url,
            urlencoding::encode(&error)
        );
        return Ok(Redirect::temporary(&redirect));
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing code".to_string()))?;

    tracing::info!(username = %username, "Exchanging Dexcom authorization code");
    state.dexcom.handle_oauth_callback(&code).await?;

    Ok(Redirect::temporary(&format!(
        "{}/?dexcom=connected",
        frontend_url
    )))
}

fn now_millis() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis())
}

fn mac_hex(payload: &str, secret: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Sign `username|timestamp_hex` and encode it for the URL.
pub fn sign_state(username: &str, timestamp_ms: u128, secret: &[u8]) -> Result<String> {
    let payload = format!("{}|{:x}", username, timestamp_ms);
    let signature = mac_hex(&payload, secret)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("HMAC init failed")))?;
    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Verify signature and age, returning the username the flow was started for.
pub fn verify_state(state: &str, secret: &[u8], now_ms: u128) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // Usernames cannot contain '|', so split from the right
    let mut parts = state_str.rsplitn(3, '|');
    let signature_hex = parts.next()?;
    let timestamp_hex = parts.next()?;
    let username = parts.next()?;

    let payload = format!("{}|{}", username, timestamp_hex);
    let expected = mac_hex(&payload, secret)?;
    if !bool::from(signature_hex.as_bytes().ct_eq(expected.as_bytes())) {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued_ms = u128::from_str_radix(timestamp_hex, 16).ok()?;
    if now_ms.saturating_sub(issued_ms) > STATE_MAX_AGE_MS || issued_ms > now_ms + 60_000 {
        return None;
    }

    Some(username.to_string())
}
