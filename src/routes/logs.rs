// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Food and exercise log routes.

use crate::db::firestore::LogFilter;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{LogEntry, LogType};
use crate::time_utils::{format_utc_rfc3339, now_rfc3339, parse_rfc3339_utc};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use validator::Validate;

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 500;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/logs", get(list_logs).post(create_log))
        .route("/api/logs/{id}/star", post(star_log))
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(rename = "type")]
    log_type: Option<LogType>,
    starred: Option<bool>,
    limit: Option<u32>,
}

/// List the user's logs, newest first.
async fn list_logs(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<LogEntry>>> {
    let filter = LogFilter {
        log_type: query.log_type,
        starred: query.starred,
        limit: query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
    };

    let logs = state.db.list_logs(&user.username, &filter).await?;
    Ok(Json(logs))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLogRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(rename = "type")]
    pub log_type: LogType,
    /// Defaults to now
    pub timestamp: Option<String>,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl CreateLogRequest {
    /// Check the type-specific detail fields.
    fn check_details(&self) -> Result<()> {
        let number = |key: &str| match self.details.get(key) {
            None | Some(Value::Null) => Ok(()),
            Some(v) if v.as_f64().is_some_and(|n| n.is_finite() && n >= 0.0) => Ok(()),
            Some(_) => Err(AppError::BadRequest(format!(
                "{} must be a non-negative number",
                key
            ))),
        };

        match self.log_type {
            LogType::Food => number("total_carbs"),
            LogType::Exercise => {
                number("time_spent")?;
                match self.details.get("intensity_level") {
                    None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
                    Some(_) => Err(AppError::BadRequest(
                        "intensity_level must be a string".to_string(),
                    )),
                }
            }
        }
    }
}

/// Record a new log entry.
async fn create_log(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateLogRequest>,
) -> Result<(StatusCode, Json<LogEntry>)> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    request.check_details()?;

    let timestamp = match request.timestamp {
        Some(ts) => parse_rfc3339_utc(&ts)
            .map(format_utc_rfc3339)
            .ok_or_else(|| AppError::BadRequest("timestamp must be RFC 3339".to_string()))?,
        None => now_rfc3339(),
    };

    let entry = LogEntry {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.username.clone(),
        name: request.name,
        log_type: request.log_type,
        timestamp,
        starred: request.starred,
        details: Value::Object(request.details),
    };

    state.db.insert_log(&entry).await?;

    tracing::info!(
        username = %user.username,
        log_id = %entry.id,
        log_type = entry.log_type.as_str(),
        "Log entry created"
    );

    Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Deserialize, Default)]
struct StarRequest {
    /// Absent: toggle
    starred: Option<bool>,
}

/// Set or toggle the starred flag.
async fn star_log(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Option<Json<StarRequest>>,
) -> Result<Json<LogEntry>> {
    let Json(request) = body.unwrap_or_default();

    let entry = state
        .db
        .set_log_starred(&user.username, &id, request.starred)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Log {}", id)))?;

    Ok(Json(entry))
}
