// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device data routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Calibration, DexcomEvent, GlucoseAlert, GlucoseReading};
use crate::services::dexcom::PROVIDER;
use crate::services::{DateRange, FetchSummary};
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

/// API routes (require authentication).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/dexcom/fetch", post(fetch_device_data))
        .route("/api/readings", get(get_readings))
        .route("/api/events", get(get_events))
        .route("/api/alerts", get(get_alerts))
        .route("/api/calibrations", get(get_calibrations))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserResponse {
    pub username: String,
    pub created_at: String,
    pub dexcom_connected: bool,
}

/// Get current user profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>> {
    let profile = state
        .db
        .get_user(&user.username)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.username)))?;

    let dexcom_connected = state.db.get_access_token(PROVIDER).await?.is_some();

    Ok(Json(UserResponse {
        username: profile.username,
        created_at: profile.created_at,
        dexcom_connected,
    }))
}

// ─── Fetch ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct FetchQuery {
    /// Override of the configured start date (`YYYY-MM-DDThh:mm:ss`)
    start: Option<String>,
    /// Override of the configured end date
    end: Option<String>,
}

/// Pull all record categories from Dexcom and store them.
async fn fetch_device_data(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<FetchQuery>,
) -> Result<Json<FetchSummary>> {
    let range = DateRange::resolve(&state.config, query.start, query.end)?;

    tracing::info!(
        username = %user.username,
        start = %range.start,
        end = %range.end,
        "Device data fetch requested"
    );

    let summary = state.fetcher.fetch(&range).await?;
    Ok(Json(summary))
}

// ─── Stored Records ──────────────────────────────────────────

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<u32>,
}

impl LimitQuery {
    fn resolve(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// Stored records, newest first.
#[derive(Serialize)]
pub struct RecordsResponse<T> {
    pub count: usize,
    pub records: Vec<T>,
}

impl<T> From<Vec<T>> for RecordsResponse<T> {
    fn from(records: Vec<T>) -> Self {
        Self {
            count: records.len(),
            records,
        }
    }
}

async fn get_readings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<RecordsResponse<GlucoseReading>>> {
    let records = state.db.recent_readings(query.resolve()).await?;
    Ok(Json(records.into()))
}

async fn get_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<RecordsResponse<DexcomEvent>>> {
    let records = state.db.recent_events(query.resolve()).await?;
    Ok(Json(records.into()))
}

async fn get_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<RecordsResponse<GlucoseAlert>>> {
    let records = state.db.recent_alerts(query.resolve()).await?;
    Ok(Json(records.into()))
}

async fn get_calibrations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<RecordsResponse<Calibration>>> {
    let records = state.db.recent_calibrations(query.resolve()).await?;
    Ok(Json(records.into()))
}
