// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-local document store used for offline development and tests.
//!
//! Documents are kept as JSON values so the same serde representation used
//! for Firestore is exercised here.

use crate::db::DocQuery;
use crate::error::AppError;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory collections keyed by collection name, then document ID.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<DashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: Serialize>(&self, collection: &str, doc_id: &str, obj: &T) -> Result<(), AppError> {
        let value = serde_json::to_value(obj).map_err(|e| AppError::Database(e.to_string()))?;
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(doc_id.to_string(), value);
        Ok(())
    }

    /// Create-only write. Returns `false` if the document already exists.
    pub fn put_if_absent<T: Serialize>(
        &self,
        collection: &str,
        doc_id: &str,
        obj: &T,
    ) -> Result<bool, AppError> {
        let value = serde_json::to_value(obj).map_err(|e| AppError::Database(e.to_string()))?;
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        match docs.entry(doc_id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(true)
            }
        }
    }

    /// Read-modify-write under the collection lock.
    ///
    /// `update` returns the replacement document, or `None` to leave the
    /// stored one untouched.
    pub fn modify<T, F>(&self, collection: &str, doc_id: &str, update: F) -> Result<Option<T>, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> Option<T>,
    {
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(None);
        };
        let Some(stored) = docs.get_mut(doc_id) else {
            return Ok(None);
        };

        let current: T =
            serde_json::from_value(stored.clone()).map_err(|e| AppError::Database(e.to_string()))?;
        let Some(updated) = update(current) else {
            return Ok(None);
        };
        *stored = serde_json::to_value(&updated).map_err(|e| AppError::Database(e.to_string()))?;
        Ok(Some(updated))
    }

    pub fn get<T: DeserializeOwned>(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<T>, AppError> {
        let Some(docs) = self.collections.get(collection) else {
            return Ok(None);
        };
        let doc = docs
            .get(doc_id)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| AppError::Database(e.to_string()))
            })
            .transpose();
        doc
    }

    pub fn query<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: &DocQuery,
    ) -> Result<Vec<T>, AppError> {
        let mut matched: Vec<Value> = match self.collections.get(collection) {
            Some(docs) => docs
                .values()
                .filter(|doc| query.filters.iter().all(|f| doc.get(f.field) == Some(&f.value.to_json())))
                .cloned()
                .collect(),
            None => return Ok(Vec::new()),
        };

        if let Some(field) = query.order_by_desc {
            matched.sort_by(|a, b| compare_values(b.get(field), a.get(field)));
        }
        if let Some(limit) = query.limit {
            matched.truncate(limit as usize);
        }

        matched
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(|e| AppError::Database(e.to_string())))
            .collect()
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map_or(0, |docs| docs.len())
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}
