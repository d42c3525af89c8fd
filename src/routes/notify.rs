// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! On-demand SMS notification.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::services::messaging::SentMessage;
use crate::AppState;
use axum::{extract::State, routing::post, Extension, Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/notify", post(notify))
}

#[derive(Debug, Deserialize, Validate)]
pub struct NotifyRequest {
    /// Recipient; defaults to the configured number
    #[validate(length(min = 4, max = 20))]
    pub to: Option<String>,
    /// SMS segments concatenate up to 1600 characters
    #[validate(length(min = 1, max = 1600))]
    pub body: String,
}

async fn notify(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<NotifyRequest>,
) -> Result<Json<SentMessage>> {
    let sms = state
        .sms
        .as_ref()
        .ok_or(AppError::NotConfigured("SMS messaging"))?;

    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let to = request
        .to
        .as_deref()
        .or(sms.default_to())
        .ok_or_else(|| AppError::BadRequest("no recipient given and no default configured".to_string()))?;

    tracing::info!(username = %user.username, "Sending SMS notification");

    let sent = sms.send(to, &request.body).await?;
    Ok(Json(sent))
}
