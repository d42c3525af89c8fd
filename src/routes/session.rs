// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Username/password accounts and session cookies.

use axum::{
    extract::{FromRequest, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::{Validate, ValidationError};

use crate::error::{AppError, Result};
use crate::middleware::auth::{clear_session_cookies, create_jwt, set_session_cookies};
use crate::models::User;
use crate::time_utils::now_rfc3339;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/user_register", post(register))
        .route("/api/user_login", post(login))
        .route("/api/user_signout", get(signout).post(signout))
}

/// Body accepted as either `application/json` or a urlencoded form.
pub struct FormOrJson<T>(pub T);

impl<S, T> FromRequest<S> for FormOrJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        if is_json {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            Ok(Self(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            Ok(Self(value))
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct Credentials {
    #[validate(length(min = 3, max = 64), custom(function = "validate_username"))]
    pub username: String,
    /// bcrypt only looks at the first 72 bytes
    #[validate(length(min = 8, max = 72))]
    pub password: String,
}

fn validate_username(username: &str) -> std::result::Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        Ok(())
    } else {
        Err(ValidationError::new("username_charset"))
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub username: String,
    pub created_at: String,
}

/// Create an account. Duplicate usernames are rejected.
async fn register(
    State(state): State<Arc<AppState>>,
    FormOrJson(creds): FormOrJson<Credentials>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    creds
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let username = creds.username.to_lowercase();
    let cost = state.config.password_hash_cost;
    let password = creds.password;

    // bcrypt is CPU-bound; keep it off the async workers
    let password_hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password hashing task failed: {}", e)))?
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password hashing failed: {}", e)))?;

    let user = User {
        username: username.clone(),
        password_hash,
        created_at: now_rfc3339(),
    };

    if !state.db.create_user(&user).await? {
        return Err(AppError::Conflict(format!("username {} is taken", username)));
    }

    tracing::info!(username = %username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            username: user.username,
            created_at: user.created_at,
        }),
    ))
}

/// Check credentials, set session cookies and redirect to the frontend.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    FormOrJson(creds): FormOrJson<Credentials>,
) -> Result<impl IntoResponse> {
    let secure = state.config.secure_cookies();
    let username = creds.username.to_lowercase();

    if !check_password(&state, &username, creds.password).await? {
        tracing::warn!(username = %username, "Login failed");
        let redirect = format!(
            "{}/login?error=invalid_credentials",
            state.config.frontend_url
        );
        return Ok((clear_session_cookies(jar, secure), Redirect::to(&redirect)));
    }

    let token = create_jwt(&username, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    tracing::info!(username = %username, "User logged in");

    let jar = set_session_cookies(jar, token, &username, secure);
    Ok((jar, Redirect::to(&state.config.frontend_url)))
}

/// Unknown users and wrong passwords are indistinguishable to the caller.
async fn check_password(state: &AppState, username: &str, password: String) -> Result<bool> {
    let Some(user) = state.db.get_user(username).await? else {
        return Ok(false);
    };

    let hash = user.password_hash;
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password verification task failed: {}", e)))
}

/// Clear session cookies.
async fn signout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    (
        clear_session_cookies(jar, state.config.secure_cookies()),
        StatusCode::NO_CONTENT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_credentials_validation() {
        assert!(creds("alice", "correct horse").validate().is_ok());
        assert!(creds("al", "correct horse").validate().is_err());
        assert!(creds("alice", "short").validate().is_err());
        assert!(creds("alice|admin", "correct horse").validate().is_err());
        assert!(creds("alice smith", "correct horse").validate().is_err());
    }
}
