// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running.
//! Run with `FIRESTORE_EMULATOR_HOST` pointing at the emulator.
//!
//! The emulator keeps state across tests in one run, so every test uses
//! unique usernames and record IDs.

use glucose_tracker::db::firestore::LogFilter;
use glucose_tracker::db::collections;
use glucose_tracker::models::{
    AccessToken, Conversation, GlucoseReading, LogEntry, LogType, User,
};
use serde_json::json;

mod common;
use common::test_db;

/// Unique suffix for test isolation.
fn unique_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos()
        .to_string()
}

fn test_log(user_id: &str, name: &str, log_type: LogType, timestamp: &str) -> LogEntry {
    LogEntry {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        name: name.to_string(),
        log_type,
        timestamp: timestamp.to_string(),
        starred: false,
        details: json!({}),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// USER TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_user_creation_is_unique() {
    require_emulator!();

    let db = test_db().await;
    let username = format!("user{}", unique_id());

    // Initially, user should not exist
    assert!(db.get_user(&username).await.unwrap().is_none());

    let user = User {
        username: username.clone(),
        password_hash: "$2b$04$hash".to_string(),
        created_at: "2024-01-15T10:00:00Z".to_string(),
    };
    assert!(db.create_user(&user).await.unwrap());

    // Second registration with the same name is refused
    assert!(!db.create_user(&user).await.unwrap());

    let fetched = db.get_user(&username).await.unwrap().unwrap();
    assert_eq!(fetched.username, username);
    assert_eq!(fetched.password_hash, "$2b$04$hash");
}

#[tokio::test]
async fn test_concurrent_registration_keeps_first_hash() {
    require_emulator!();

    let db = test_db().await;
    let username = format!("race{}", unique_id());

    let attempts = (0..4).map(|i| {
        let db = db.clone();
        let user = User {
            username: username.clone(),
            password_hash: format!("hash-{}", i),
            created_at: "2024-01-15T10:00:00Z".to_string(),
        };
        async move { (db.create_user(&user).await.unwrap(), user.password_hash) }
    });
    let results = futures_util::future::join_all(attempts).await;

    let winners: Vec<_> = results.iter().filter(|(created, _)| *created).collect();
    assert_eq!(winners.len(), 1);

    let stored = db.get_user(&username).await.unwrap().unwrap();
    assert_eq!(stored.password_hash, winners[0].1);
}

// ═══════════════════════════════════════════════════════════════════════════
// TOKEN TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_access_token_is_replaced() {
    require_emulator!();

    let db = test_db().await;
    let provider = format!("provider{}", unique_id());

    let first = AccessToken::new("one".to_string(), Some("r1".to_string()), None);
    db.set_access_token(&provider, &first).await.unwrap();

    let second = AccessToken::new(
        "two".to_string(),
        Some("r2".to_string()),
        Some("2030-01-01T00:00:00Z".to_string()),
    );
    db.set_access_token(&provider, &second).await.unwrap();

    let stored = db.get_access_token(&provider).await.unwrap().unwrap();
    assert_eq!(stored.token, "two");
    assert_eq!(stored.refresh_token.as_deref(), Some("r2"));
    assert_eq!(stored.expires_at.as_deref(), Some("2030-01-01T00:00:00Z"));
}

// ═══════════════════════════════════════════════════════════════════════════
// DEVICE RECORD TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_device_records_upsert_idempotently() {
    require_emulator!();

    let db = test_db().await;
    let suffix = unique_id();

    // Far-future system time so these sort first among other tests' records
    let reading = GlucoseReading {
        record_id: Some(format!("egv-{}", suffix)),
        system_time: "2099-01-01T00:00:00".to_string(),
        display_time: "2098-12-31T16:00:00".to_string(),
        value: 101.0,
        trend: Some("flat".to_string()),
        trend_rate: None,
        unit: Some("mg/dL".to_string()),
    };

    let written = db
        .upsert_device_records(collections::GLUCOSE_READINGS, &[reading.clone(), reading.clone()])
        .await
        .unwrap();
    assert_eq!(written, 2);

    let recent = db.recent_readings(500).await.unwrap();
    let matching: Vec<_> = recent
        .iter()
        .filter(|r| r.record_id == reading.record_id)
        .collect();
    assert_eq!(matching.len(), 1, "same record ID must map to one document");
    assert_eq!(matching[0], &reading);
}

// ═══════════════════════════════════════════════════════════════════════════
// LOG TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_log_filters_and_ordering() {
    require_emulator!();

    let db = test_db().await;
    let user = format!("loguser{}", unique_id());

    let breakfast = test_log(&user, "Toast", LogType::Food, "2024-01-01T08:00:00Z");
    let run = test_log(&user, "Run", LogType::Exercise, "2024-01-01T09:00:00Z");
    let lunch = test_log(&user, "Salad", LogType::Food, "2024-01-01T12:00:00Z");
    for entry in [&breakfast, &run, &lunch] {
        db.insert_log(entry).await.unwrap();
    }

    let all = db
        .list_logs(
            &user,
            &LogFilter {
                limit: 10,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let names: Vec<_> = all.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, ["Salad", "Run", "Toast"]);

    let food = db
        .list_logs(
            &user,
            &LogFilter {
                log_type: Some(LogType::Food),
                limit: 10,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(food.len(), 2);

    let toggled = db
        .set_log_starred(&user, &run.id, None)
        .await
        .unwrap()
        .unwrap();
    assert!(toggled.starred);

    let starred = db
        .list_logs(
            &user,
            &LogFilter {
                starred: Some(true),
                limit: 10,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(starred.len(), 1);
    assert_eq!(starred[0].id, run.id);

    // Other users cannot modify the entry
    assert!(db
        .set_log_starred("someone-else", &run.id, Some(false))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_conversations_are_listed_newest_first() {
    require_emulator!();

    let db = test_db().await;
    let user = format!("chatuser{}", unique_id());

    for (i, timestamp) in ["2024-01-01T08:00:00Z", "2024-01-01T09:00:00Z"]
        .iter()
        .enumerate()
    {
        db.insert_conversation(&Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.clone(),
            timestamp: timestamp.to_string(),
            user_message: Some(format!("question {}", i)),
            ai_response: format!("answer {}", i),
        })
        .await
        .unwrap();
    }

    let conversations = db.recent_conversations(&user, 10).await.unwrap();
    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0].ai_response, "answer 1");
}
