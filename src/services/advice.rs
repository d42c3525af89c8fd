// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Lifestyle advice from recent readings, events and logs.
//!
//! The context block is rebuilt on every call; identical context (and user
//! message) for the same user within the TTL is answered from cache.

use crate::db::firestore::LogFilter;
use crate::db::FirestoreDb;
use crate::error::AppError;
use crate::models::{Conversation, DexcomEvent, GlucoseReading, LogEntry};
use crate::services::llm::{ChatMessage, ChatRequest, LlmClient};
use crate::time_utils::now_rfc3339;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

const ADVICE_TEMPERATURE: f64 = 0.7;
const ADVICE_MAX_TOKENS: u32 = 800;

const PERSONA_PROMPT: &str = "You are a supportive diabetes lifestyle coach. Using the \
person's recent glucose readings, device events and food and exercise logs, give short, \
practical suggestions about meals, activity and timing. Point out patterns you notice. \
Do not diagnose conditions or recommend medication or insulin doses; suggest talking to \
a clinician for anything medical.";

const DEFAULT_REQUEST: &str = "Based on this data, what should I keep in mind for the next few hours?";

#[derive(Clone)]
struct CachedAdvice {
    response: String,
    stored_at: Instant,
}

/// Generates and caches advice for a user.
#[derive(Clone)]
pub struct AdviceService {
    llm: LlmClient,
    db: FirestoreDb,
    model: String,
    context_size: u32,
    ttl: Duration,
    cache: Arc<DashMap<String, CachedAdvice>>,
}

impl AdviceService {
    pub fn new(
        llm: LlmClient,
        db: FirestoreDb,
        model: String,
        context_size: u32,
        ttl: Duration,
    ) -> Self {
        Self {
            llm,
            db,
            model,
            context_size,
            ttl,
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Advice for `user_id`, optionally answering a chat message.
    pub async fn advise(&self, user_id: &str, message: Option<&str>) -> Result<String, AppError> {
        let limit = self.context_size;
        let readings = self.db.recent_readings(limit).await?;
        let events = self.db.recent_events(limit).await?;
        let logs = self
            .db
            .list_logs(
                user_id,
                &LogFilter {
                    limit,
                    ..Default::default()
                },
            )
            .await?;

        let context = build_context(&readings, &events, &logs);
        let key = cache_key(user_id, &context, message);

        if let Some(hit) = self.lookup(&key) {
            tracing::debug!(user_id, "Advice cache hit");
            return Ok(hit);
        }

        let prompt = match message {
            Some(message) => format!("{}\n\nQuestion: {}", context, message),
            None => format!("{}\n\n{}", context, DEFAULT_REQUEST),
        };

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(PERSONA_PROMPT), ChatMessage::user(prompt)],
            temperature: ADVICE_TEMPERATURE,
            max_tokens: ADVICE_MAX_TOKENS,
            guided_json: None,
        };

        let response = self.llm.complete(&request).await?;

        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            timestamp: now_rfc3339(),
            user_message: message.map(str::to_string),
            ai_response: response.clone(),
        };
        if let Err(e) = self.db.insert_conversation(&conversation).await {
            tracing::warn!(error = %e, user_id, "Failed to store conversation, continuing anyway");
        }

        self.store(key, &response);

        tracing::info!(
            user_id,
            readings = readings.len(),
            events = events.len(),
            logs = logs.len(),
            chat = message.is_some(),
            "Advice generated"
        );

        Ok(response)
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let entry = self.cache.get(key)?;
        if entry.stored_at.elapsed() < self.ttl {
            Some(entry.response.clone())
        } else {
            None
        }
    }

    fn store(&self, key: String, response: &str) {
        let ttl = self.ttl;
        self.cache.retain(|_, cached| cached.stored_at.elapsed() < ttl);
        self.cache.insert(
            key,
            CachedAdvice {
                response: response.to_string(),
                stored_at: Instant::now(),
            },
        );
    }
}

/// Cache key: user plus a digest of everything the model sees.
pub fn cache_key(user_id: &str, context: &str, message: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(context.as_bytes());
    if let Some(message) = message {
        hasher.update([0u8]);
        hasher.update(message.as_bytes());
    }
    format!("{}:{}", user_id, hex::encode(hasher.finalize()))
}

/// Render recent data as a plain-text block, oldest first.
///
/// Inputs are newest first, as returned by the store.
pub fn build_context(
    readings: &[GlucoseReading],
    events: &[DexcomEvent],
    logs: &[LogEntry],
) -> String {
    let mut out = String::new();

    out.push_str("Recent glucose readings:\n");
    if readings.is_empty() {
        out.push_str("- none recorded\n");
    }
    for reading in readings.iter().rev() {
        let unit = reading.unit.as_deref().unwrap_or("mg/dL");
        let _ = write!(out, "- {}: {} {}", reading.display_time, reading.value, unit);
        if let Some(trend) = &reading.trend {
            let _ = write!(out, " ({})", trend);
        }
        out.push('\n');
    }

    out.push_str("\nRecent device events:\n");
    if events.is_empty() {
        out.push_str("- none recorded\n");
    }
    for event in events.iter().rev() {
        let _ = write!(out, "- {}: {}", event.display_time, event.event_type);
        if let Some(sub_type) = &event.event_sub_type {
            let _ = write!(out, " ({})", sub_type);
        }
        if let Some(value) = &event.value {
            let _ = write!(out, " {}", value);
            if let Some(unit) = &event.unit {
                let _ = write!(out, " {}", unit);
            }
        }
        out.push('\n');
    }

    out.push_str("\nRecent food and exercise logs:\n");
    if logs.is_empty() {
        out.push_str("- none recorded\n");
    }
    for log in logs.iter().rev() {
        let _ = writeln!(out, "- {}", log.describe());
    }

    out
}
