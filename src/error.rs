// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::services::llm::ChatMessage;
use crate::services::meal::MealAnalysisError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Dexcom account not connected")]
    DexcomNotConnected,

    #[error("Dexcom API error: {0}")]
    DexcomApi(String),

    #[error("Language model error: {0}")]
    Llm(String),

    #[error(transparent)]
    MealAnalysis(#[from] MealAnalysisError),

    #[error("Messaging API error: {0}")]
    Messaging(String),

    #[error("Service not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub const DEXCOM_RATE_LIMIT: &'static str = "Rate limit exceeded";
    pub const DEXCOM_TOKEN_ERROR: &'static str = "Token invalid or expired";

    /// Whether this error means the stored Dexcom token is no longer usable.
    pub fn is_dexcom_token_error(&self) -> bool {
        match self {
            AppError::DexcomNotConnected => true,
            AppError::DexcomApi(msg) => {
                msg == Self::DEXCOM_TOKEN_ERROR || msg.contains("invalid_grant")
            }
            _ => false,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    /// Raw model output that failed to decode
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<String>,
    /// Message history of a failed model exchange
    #[serde(skip_serializing_if = "Option::is_none")]
    messages: Option<Vec<ChatMessage>>,
}

impl ErrorResponse {
    fn new(error: &str, details: Option<String>) -> Self {
        Self {
            error: error.to_string(),
            details,
            raw: None,
            messages: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("unauthorized", None),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("not_found", Some(msg)),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("bad_request", Some(msg)),
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorResponse::new("conflict", Some(msg)),
            ),
            AppError::PayloadTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorResponse::new("payload_too_large", Some(msg)),
            ),
            AppError::DexcomNotConnected => (
                StatusCode::CONFLICT,
                ErrorResponse::new(
                    "dexcom_not_connected",
                    Some("Connect a Dexcom account via /auth/dexcom".to_string()),
                ),
            ),
            AppError::DexcomApi(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse::new("dexcom_error", Some(msg)),
            ),
            AppError::Llm(msg) => {
                tracing::error!(error = %msg, "Language model request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("llm_error", Some(msg)),
                )
            }
            AppError::MealAnalysis(err) => {
                tracing::error!(error = %err, "Meal analysis failed");
                let body = match err {
                    MealAnalysisError::Transport { message, history } => ErrorResponse {
                        messages: Some(history),
                        ..ErrorResponse::new("meal_transport_error", Some(message))
                    },
                    MealAnalysisError::Decode {
                        message,
                        raw,
                        history,
                    } => ErrorResponse {
                        raw: Some(raw),
                        messages: Some(history),
                        ..ErrorResponse::new("meal_decode_error", Some(message))
                    },
                };
                (StatusCode::INTERNAL_SERVER_ERROR, body)
            }
            AppError::Messaging(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse::new("messaging_error", Some(msg)),
            ),
            AppError::NotConfigured(what) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new("not_configured", Some(what.to_string())),
            ),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("database_error", None),
                )
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("internal_error", None),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
