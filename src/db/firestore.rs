// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (login credentials)
//! - Tokens (Dexcom OAuth token singleton)
//! - Device records (readings, events, alerts, calibrations)
//! - Logs (food/exercise entries)
//! - Conversations (AI interaction audit trail)

use crate::db::memory::MemoryStore;
use crate::db::{collections, DocQuery, FieldValue};
use crate::error::AppError;
use crate::models::{
    AccessToken, Calibration, Conversation, DeviceRecord, DexcomEvent, GlucoseAlert,
    GlucoseReading, LogEntry, LogType, User,
};
use firestore::errors::{BackoffError, FirestoreError};
use futures_util::{stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

const MAX_CONCURRENT_DB_OPS: usize = 50;

/// Device records are ordered by the receiver's clock.
const DEVICE_ORDER_FIELD: &str = "system_time";

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    backend: Backend,
}

#[derive(Clone)]
enum Backend {
    Firestore(firestore::FirestoreDb),
    Memory(MemoryStore),
}

/// Filters for listing log entries.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub log_type: Option<LogType>,
    pub starred: Option<bool>,
    pub limit: u32,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Create an in-memory store (offline development and tests).
    pub fn new_in_memory() -> Self {
        Self {
            backend: Backend::Memory(MemoryStore::new()),
        }
    }

    // ─── Document Primitives ─────────────────────────────────────

    async fn put<T>(&self, collection: &str, doc_id: &str, obj: &T) -> Result<(), AppError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        match &self.backend {
            Backend::Firestore(client) => {
                let _: T = client
                    .fluent()
                    .update()
                    .in_col(collection)
                    .document_id(doc_id)
                    .object(obj)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
            Backend::Memory(store) => store.put(collection, doc_id, obj),
        }
    }

    async fn get<T>(&self, collection: &str, doc_id: &str) -> Result<Option<T>, AppError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collection)
                .obj()
                .one(doc_id)
                .await
                .map_err(|e| AppError::Database(e.to_string())),
            Backend::Memory(store) => store.get(collection, doc_id),
        }
    }

    async fn query<T>(&self, collection: &str, query: DocQuery) -> Result<Vec<T>, AppError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let client = match &self.backend {
            Backend::Firestore(client) => client,
            Backend::Memory(store) => return store.query(collection, &query),
        };

        let select = client.fluent().select().from(collection);

        let select = if query.filters.is_empty() {
            select
        } else {
            let filters = query.filters.clone();
            select.filter(move |q| {
                let conditions: Vec<_> = filters
                    .iter()
                    .map(|f| match &f.value {
                        FieldValue::Str(s) => q.field(f.field).eq(s.clone()),
                        FieldValue::Bool(b) => q.field(f.field).eq(*b),
                    })
                    .collect();
                q.for_all(conditions)
            })
        };

        let select = match query.order_by_desc {
            Some(field) => {
                select.order_by([(field, firestore::FirestoreQueryDirection::Descending)])
            }
            None => select,
        };

        let select = match query.limit {
            Some(limit) => select.limit(limit),
            None => select,
        };

        select
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by username.
    pub async fn get_user(&self, username: &str) -> Result<Option<User>, AppError> {
        self.get(collections::USERS, &user_doc_id(username)).await
    }

    /// Create a user. Returns `false` if the username is already taken.
    ///
    /// Create-only write: of two concurrent registrations for the same name,
    /// exactly one succeeds.
    pub async fn create_user(&self, user: &User) -> Result<bool, AppError> {
        let doc_id = user_doc_id(&user.username);
        match &self.backend {
            Backend::Firestore(client) => {
                let created = client
                    .fluent()
                    .insert()
                    .into(collections::USERS)
                    .document_id(&doc_id)
                    .object(user)
                    .execute::<User>()
                    .await;
                match created {
                    Ok(_) => Ok(true),
                    Err(FirestoreError::DataConflictError(_)) => Ok(false),
                    Err(e) => Err(AppError::Database(e.to_string())),
                }
            }
            Backend::Memory(store) => store.put_if_absent(collections::USERS, &doc_id, user),
        }
    }

    // ─── Token Operations ────────────────────────────────────────

    /// Get the stored access token for a provider.
    pub async fn get_access_token(&self, provider: &str) -> Result<Option<AccessToken>, AppError> {
        self.get(collections::TOKENS, provider).await
    }

    /// Replace the stored access token for a provider.
    pub async fn set_access_token(
        &self,
        provider: &str,
        token: &AccessToken,
    ) -> Result<(), AppError> {
        self.put(collections::TOKENS, provider, token).await
    }

    // ─── Device Record Operations ────────────────────────────────

    /// Upsert device records keyed by their derived document IDs.
    ///
    /// Uses concurrent writes with a limit to avoid overloading Firestore.
    /// Returns the number of records written.
    pub async fn upsert_device_records<T>(
        &self,
        collection: &str,
        records: &[T],
    ) -> Result<usize, AppError>
    where
        T: DeviceRecord + Serialize + DeserializeOwned + Send + Sync,
    {
        let docs: Vec<(String, &T)> = records
            .iter()
            .map(|record| (record.document_id(), record))
            .collect();

        let writes: Vec<_> = docs
            .into_iter()
            .map(|(doc_id, record)| async move { self.put(collection, &doc_id, record).await })
            .collect();

        stream::iter(writes)
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<(), AppError>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>, AppError>>()?;

        Ok(records.len())
    }

    async fn recent_device_records<T>(&self, collection: &str, limit: u32) -> Result<Vec<T>, AppError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        self.query(
            collection,
            DocQuery::new()
                .order_by_desc(DEVICE_ORDER_FIELD)
                .limit(limit),
        )
        .await
    }

    /// Most recent glucose readings, newest first.
    pub async fn recent_readings(&self, limit: u32) -> Result<Vec<GlucoseReading>, AppError> {
        self.recent_device_records(collections::GLUCOSE_READINGS, limit)
            .await
    }

    /// Most recent device events, newest first.
    pub async fn recent_events(&self, limit: u32) -> Result<Vec<DexcomEvent>, AppError> {
        self.recent_device_records(collections::DEXCOM_EVENTS, limit)
            .await
    }

    /// Most recent alerts, newest first.
    pub async fn recent_alerts(&self, limit: u32) -> Result<Vec<GlucoseAlert>, AppError> {
        self.recent_device_records(collections::GLUCOSE_ALERTS, limit)
            .await
    }

    /// Most recent calibrations, newest first.
    pub async fn recent_calibrations(&self, limit: u32) -> Result<Vec<Calibration>, AppError> {
        self.recent_device_records(collections::CALIBRATIONS, limit)
            .await
    }

    // ─── Log Operations ──────────────────────────────────────────

    /// Store a new log entry.
    pub async fn insert_log(&self, entry: &LogEntry) -> Result<(), AppError> {
        self.put(collections::LOGS, &entry.id, entry).await
    }

    /// Get a log entry by ID.
    pub async fn get_log(&self, id: &str) -> Result<Option<LogEntry>, AppError> {
        self.get(collections::LOGS, id).await
    }

    /// List a user's log entries, newest first.
    pub async fn list_logs(&self, user_id: &str, filter: &LogFilter) -> Result<Vec<LogEntry>, AppError> {
        let mut query = DocQuery::new().filter("user_id", FieldValue::Str(user_id.to_string()));
        if let Some(log_type) = filter.log_type {
            query = query.filter("type", FieldValue::Str(log_type.as_str().to_string()));
        }
        if let Some(starred) = filter.starred {
            query = query.filter("starred", FieldValue::Bool(starred));
        }

        self.query(
            collections::LOGS,
            query.order_by_desc("timestamp").limit(filter.limit),
        )
        .await
    }

    /// Set the starred flag on a user's log entry.
    ///
    /// `starred: None` toggles the current value. Returns `None` if the entry
    /// does not exist or belongs to someone else. The read and write run in
    /// one transaction so concurrent toggles are not lost.
    pub async fn set_log_starred(
        &self,
        user_id: &str,
        id: &str,
        starred: Option<bool>,
    ) -> Result<Option<LogEntry>, AppError> {
        let client = match &self.backend {
            Backend::Firestore(client) => client,
            Backend::Memory(store) => {
                return store.modify(collections::LOGS, id, |entry| {
                    apply_star(entry, user_id, starred)
                })
            }
        };

        let user_id = user_id.to_string();
        let id = id.to_string();

        client
            .run_transaction(|db, transaction| {
                let user_id = user_id.clone();
                let id = id.clone();

                Box::pin(async move {
                    // Reads through `db` register the document for conflict detection
                    let current: Option<LogEntry> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::LOGS)
                        .obj()
                        .one(&id)
                        .await
                        .map_err(BackoffError::permanent)?;

                    let Some(entry) = current.and_then(|entry| apply_star(entry, &user_id, starred))
                    else {
                        return Ok::<Option<LogEntry>, BackoffError<FirestoreError>>(None);
                    };

                    db.fluent()
                        .update()
                        .in_col(collections::LOGS)
                        .document_id(&id)
                        .object(&entry)
                        .add_to_transaction(transaction)
                        .map_err(BackoffError::permanent)?;

                    Ok(Some(entry))
                })
            })
            .await
            .map_err(|e| AppError::Database(format!("Star update failed: {}", e)))
    }

    // ─── Conversation Operations ─────────────────────────────────

    /// Append an AI interaction to the audit trail.
    pub async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), AppError> {
        self.put(collections::CONVERSATIONS, &conversation.id, conversation)
            .await
    }

    /// A user's most recent AI interactions, newest first.
    pub async fn recent_conversations(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<Conversation>, AppError> {
        self.query(
            collections::CONVERSATIONS,
            DocQuery::new()
                .filter("user_id", FieldValue::Str(user_id.to_string()))
                .order_by_desc("timestamp")
                .limit(limit),
        )
        .await
    }
}

/// New starred state for `entry`, or `None` if `user_id` does not own it.
fn apply_star(mut entry: LogEntry, user_id: &str, starred: Option<bool>) -> Option<LogEntry> {
    if entry.user_id != user_id {
        return None;
    }
    entry.starred = starred.unwrap_or(!entry.starred);
    Some(entry)
}

/// Usernames may contain characters Firestore forbids in document IDs.
fn user_doc_id(username: &str) -> String {
    urlencoding::encode(&username.to_lowercase()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(hash: &str) -> User {
        User {
            username: "alice".to_string(),
            password_hash: hash.to_string(),
            created_at: "2024-01-15T10:00:00Z".to_string(),
        }
    }

    fn log(id: &str) -> LogEntry {
        LogEntry {
            id: id.to_string(),
            user_id: "alice".to_string(),
            name: "Toast".to_string(),
            log_type: LogType::Food,
            timestamp: "2024-01-01T08:00:00Z".to_string(),
            starred: false,
            details: json!({}),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration_creates_one_account() {
        let db = FirestoreDb::new_in_memory();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                tokio::spawn(async move { db.create_user(&user(&format!("hash-{}", i))).await })
            })
            .collect();

        let mut winners = Vec::new();
        for (i, handle) in handles.into_iter().enumerate() {
            if handle.await.unwrap().unwrap() {
                winners.push(format!("hash-{}", i));
            }
        }
        assert_eq!(winners.len(), 1);

        let stored = db.get_user("alice").await.unwrap().unwrap();
        assert_eq!(stored.password_hash, winners[0]);
    }

    #[tokio::test]
    async fn test_duplicate_registration_keeps_original_hash() {
        let db = FirestoreDb::new_in_memory();
        assert!(db.create_user(&user("first")).await.unwrap());
        assert!(!db.create_user(&user("second")).await.unwrap());

        let stored = db.get_user("alice").await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "first");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_star_toggles_are_not_lost() {
        let db = FirestoreDb::new_in_memory();
        db.insert_log(&log("l1")).await.unwrap();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move { db.set_log_starred("alice", "l1", None).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_some());
        }

        // An even number of toggles lands back where it started
        let entry = db.get_log("l1").await.unwrap().unwrap();
        assert!(!entry.starred);
    }

    #[tokio::test]
    async fn test_star_requires_owner() {
        let db = FirestoreDb::new_in_memory();
        db.insert_log(&log("l1")).await.unwrap();

        assert!(db
            .set_log_starred("bob", "l1", Some(true))
            .await
            .unwrap()
            .is_none());
        assert!(!db.get_log("l1").await.unwrap().unwrap().starred);
    }

    #[tokio::test]
    async fn test_device_upsert_collapses_duplicate_ids() {
        let db = FirestoreDb::new_in_memory();
        let reading = GlucoseReading {
            record_id: Some("egv-1".to_string()),
            system_time: "2024-01-01T08:00:00".to_string(),
            display_time: "2024-01-01T00:00:00".to_string(),
            value: 110.0,
            trend: None,
            trend_rate: None,
            unit: None,
        };

        let written = db
            .upsert_device_records(collections::GLUCOSE_READINGS, &[reading.clone(), reading])
            .await
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(db.recent_readings(10).await.unwrap().len(), 1);
    }
}
