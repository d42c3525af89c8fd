// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Advice and chat tests against a mocked language model.

use axum::http::StatusCode;
use httpmock::prelude::*;
use serde_json::json;
use tower::ServiceExt;

mod common;

#[tokio::test]
async fn test_repeated_advice_is_served_from_cache() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("test-advice-model")
                .body_contains("none recorded");
            then.status(200)
                .json_body(common::chat_completion("Drink water and take a walk."));
        })
        .await;

    let (app, _) = common::create_test_app_with_config(common::config_with_llm(server.base_url()));

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(common::authed_request("GET", "/api/advice", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = common::body_json(response).await;
        assert_eq!(body, json!({"response": "Drink water and take a walk."}));
    }

    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_expired_advice_is_refetched() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200)
                .json_body(common::chat_completion("Have a snack."));
        })
        .await;

    let config = glucose_tracker::config::Config {
        advice_cache_ttl: std::time::Duration::from_millis(50),
        ..common::config_with_llm(server.base_url())
    };
    let (app, _) = common::create_test_app_with_config(config);

    let response = app
        .clone()
        .oneshot(common::authed_request("GET", "/api/advice", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    mock.assert_hits_async(1).await;

    tokio::time::sleep(std::time::Duration::from_millis(120)).await;

    let response = app
        .clone()
        .oneshot(common::authed_request("GET", "/api/advice", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["response"], "Have a snack.");

    mock.assert_hits_async(2).await;
}

#[tokio::test]
async fn test_new_log_invalidates_cached_advice() {
    let server = MockServer::start_async().await;
    // Newlines are escaped inside the JSON request body
    let without_log = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("food and exercise logs:\\n- none recorded");
            then.status(200).json_body(common::chat_completion("Noted."));
        })
        .await;
    let with_log = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("Spaghetti");
            then.status(200)
                .json_body(common::chat_completion("Watch for a late rise."));
        })
        .await;

    let (app, _) = common::create_test_app_with_config(common::config_with_llm(server.base_url()));

    let response = app
        .clone()
        .oneshot(common::authed_request("GET", "/api/advice", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(common::authed_request(
            "POST",
            "/api/logs",
            Some(json!({
                "name": "Spaghetti",
                "type": "food",
                "details": {"total_carbs": 80}
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(common::authed_request("GET", "/api/advice", None))
        .await
        .unwrap();
    let body = common::body_json(response).await;
    assert_eq!(body["response"], "Watch for a late rise.");

    with_log.assert_hits_async(1).await;
    without_log.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_chat_persists_conversation() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("Is pizza okay tonight?");
            then.status(200)
                .json_body(common::chat_completion("Pair it with a salad."));
        })
        .await;

    let (app, state) =
        common::create_test_app_with_config(common::config_with_llm(server.base_url()));

    let response = app
        .oneshot(common::authed_request(
            "POST",
            "/api/chat",
            Some(json!({"message": "  Is pizza okay tonight?  "})),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["response"], "Pair it with a salad.");
    mock.assert_hits_async(1).await;

    let conversations = state
        .db
        .recent_conversations(common::TEST_USER, 10)
        .await
        .unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(
        conversations[0].user_message.as_deref(),
        Some("Is pizza okay tonight?")
    );
    assert_eq!(conversations[0].ai_response, "Pair it with a salad.");
}

#[tokio::test]
async fn test_empty_chat_message_is_rejected() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(common::chat_completion("unused"));
        })
        .await;

    let (app, _) = common::create_test_app_with_config(common::config_with_llm(server.base_url()));

    for message in ["", "   \n"] {
        let response = app
            .clone()
            .oneshot(common::authed_request(
                "POST",
                "/api/chat",
                Some(json!({ "message": message })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_llm_failure_is_internal_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(503).body("overloaded");
        })
        .await;

    let (app, state) =
        common::create_test_app_with_config(common::config_with_llm(server.base_url()));

    let response = app
        .oneshot(common::authed_request("GET", "/api/advice", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "llm_error");
    assert!(state
        .db
        .recent_conversations(common::TEST_USER, 10)
        .await
        .unwrap()
        .is_empty());
}
