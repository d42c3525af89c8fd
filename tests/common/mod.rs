// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use glucose_tracker::config::Config;
use glucose_tracker::db::FirestoreDb;
use glucose_tracker::middleware::auth::create_jwt;
use glucose_tracker::models::AccessToken;
use glucose_tracker::routes::create_router;
use glucose_tracker::services::dexcom::PROVIDER;
use glucose_tracker::AppState;
use serde_json::{json, Value};
use std::sync::Arc;

/// Username used for authenticated requests.
#[allow(dead_code)]
pub const TEST_USER: &str = "alice";

/// Multipart boundary used by `multipart_request`.
const BOUNDARY: &str = "glucose-test-boundary";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a test app with in-memory storage and the given config.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(config, FirestoreDb::new_in_memory()));
    (create_router(state.clone()), state)
}

/// Create a test app with default test config.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with_config(Config::test_default())
}

/// Test config pointing the LLM client at a mock server.
#[allow(dead_code)]
pub fn config_with_llm(base_url: String) -> Config {
    Config {
        llm_base_url: base_url,
        ..Config::test_default()
    }
}

/// Session JWT for `username`, signed with the test key.
#[allow(dead_code)]
pub fn session_token(username: &str) -> String {
    create_jwt(username, &Config::test_default().jwt_signing_key).unwrap()
}

/// `Authorization` header value for the test user.
#[allow(dead_code)]
pub fn bearer() -> String {
    format!("Bearer {}", session_token(TEST_USER))
}

/// Authenticated request with an optional JSON body.
#[allow(dead_code)]
pub fn authed_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, bearer());

    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Authenticated multipart upload with a single `file` field.
#[allow(dead_code)]
pub fn multipart_request(uri: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, bearer())
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// OpenAI-style chat completion response carrying `content`.
#[allow(dead_code)]
pub fn chat_completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1,
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

/// Store a Dexcom token that will not expire during the test.
#[allow(dead_code)]
pub async fn connect_dexcom(state: &AppState, token: &str) {
    let expires_at = chrono::Utc::now() + chrono::Duration::hours(2);
    let record = AccessToken::new(
        token.to_string(),
        Some("refresh-token".to_string()),
        Some(expires_at.to_rfc3339()),
    );
    state.db.set_access_token(PROVIDER, &record).await.unwrap();
}

/// All `Set-Cookie` header values of a response.
#[allow(dead_code)]
pub fn set_cookie_headers(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

/// The `Set-Cookie` value for `name`.
#[allow(dead_code)]
pub fn find_cookie(headers: &[String], name: &str) -> String {
    headers
        .iter()
        .find(|value| value.starts_with(&format!("{name}=")))
        .cloned()
        .unwrap_or_else(|| panic!("missing Set-Cookie header for {name}: {headers:?}"))
}
