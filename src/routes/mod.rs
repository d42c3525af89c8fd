// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP route handlers.

pub mod advice;
pub mod api;
pub mod auth;
pub mod logs;
pub mod meal;
pub mod notify;
pub mod session;

use crate::middleware::auth::require_auth;
use crate::AppState;
use axum::http::{header, Method};
use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct HealthResponse {
    pub status: String,
    pub build_id: String,
}

/// Health check response
async fn health_check() -> Json<HealthResponse> {
    let build_id = option_env!("BUILD_ID").unwrap_or("unknown").to_string();
    Json(HealthResponse {
        status: "ok".to_string(),
        build_id,
    })
}

/// One entry of the route listing.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RouteInfo {
    pub endpoint: &'static str,
    pub methods: &'static str,
    pub url: &'static str,
}

const fn route(endpoint: &'static str, methods: &'static str, url: &'static str) -> RouteInfo {
    RouteInfo {
        endpoint,
        methods,
        url,
    }
}

/// Every route the router serves. Keep in sync with `create_router`.
pub const ROUTES: &[RouteInfo] = &[
    route("health_check", "GET", "/health"),
    route("list_routes", "GET", "/api/"),
    route("auth_start", "GET", "/auth/dexcom"),
    route("auth_callback", "GET", "/auth/dexcom/callback"),
    route("register", "POST", "/api/user_register"),
    route("login", "POST", "/api/user_login"),
    route("signout", "GET, POST", "/api/user_signout"),
    route("get_me", "GET", "/api/me"),
    route("fetch_device_data", "POST", "/api/dexcom/fetch"),
    route("get_readings", "GET", "/api/readings"),
    route("get_events", "GET", "/api/events"),
    route("get_alerts", "GET", "/api/alerts"),
    route("get_calibrations", "GET", "/api/calibrations"),
    route("analyze_image", "POST", "/api/analyze_image"),
    route("get_advice", "GET", "/api/advice"),
    route("chat", "POST", "/api/chat"),
    route("list_logs", "GET", "/api/logs"),
    route("create_log", "POST", "/api/logs"),
    route("star_log", "POST", "/api/logs/{id}/star"),
    route("notify", "POST", "/api/notify"),
];

/// Self-describing route listing.
async fn list_routes() -> Json<&'static [RouteInfo]> {
    Json(ROUTES)
}

/// Build the complete router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer - allow requests from frontend URL and localhost (for dev)
    let frontend_url = state.config.frontend_url.clone();
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::predicate(
            move |origin: &axum::http::HeaderValue, _request_parts: &axum::http::request::Parts| {
                let origin_str = origin.to_str().unwrap_or("");
                origin_str == frontend_url
                    || origin_str.starts_with("http://localhost")
                    || origin_str.starts_with("http://127.0.0.1")
            },
        ))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/", get(list_routes))
        .merge(auth::public_routes())
        .merge(session::routes());

    // Protected routes (session required)
    let protected_routes = Router::new()
        .merge(auth::protected_routes())
        .merge(api::routes())
        .merge(meal::routes(state.config.max_upload_bytes))
        .merge(advice::routes())
        .merge(logs::routes())
        .merge(notify::routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn(
            crate::middleware::security::add_security_headers,
        ))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
