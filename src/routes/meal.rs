// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Meal photo upload.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::services::meal::{MealAnalysis, MealImage};
use crate::AppState;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use std::sync::Arc;

/// Multipart field carrying the image.
const FILE_FIELD: &str = "file";

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/analyze_image",
        post(analyze_image).layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD)),
    )
}

/// Estimate carbohydrates for an uploaded meal photo.
async fn analyze_image(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Json<MealAnalysis>> {
    let mut upload: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, bytes) = upload.unwrap_or_default();
    if bytes.len() > state.config.max_upload_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "image exceeds {} bytes",
            state.config.max_upload_bytes
        )));
    }
    let image = MealImage::from_upload(filename.as_deref(), bytes)?;

    tracing::info!(
        username = %user.username,
        mime = image.mime(),
        "Analyzing meal image"
    );

    let analysis = state.meal_analyzer.analyze(&image).await?;
    Ok(Json(analysis))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(err.body_text())
    }
}
