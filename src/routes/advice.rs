// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! AI advice and chat.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/advice", get(get_advice))
        .route("/api/chat", post(chat))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AdviceResponse {
    pub response: String,
}

#[derive(Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(max = 4000))]
    pub message: String,
}

/// Suggestions from recent data.
async fn get_advice(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AdviceResponse>> {
    let response = state.advice.advise(&user.username, None).await?;
    Ok(Json(AdviceResponse { response }))
}

/// Answer a user message with recent data as context.
async fn chat(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<AdviceResponse>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let message = request.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("message must not be empty".to_string()));
    }

    let response = state.advice.advise(&user.username, Some(message)).await?;
    Ok(Json(AdviceResponse { response }))
}
