//! Database layer (Firestore, with an in-memory backend for tests).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const TOKENS: &str = "tokens";
    pub const GLUCOSE_READINGS: &str = "glucose_readings";
    pub const DEXCOM_EVENTS: &str = "dexcom_events";
    pub const GLUCOSE_ALERTS: &str = "glucose_alerts";
    pub const CALIBRATIONS: &str = "calibrations";
    pub const LOGS: &str = "logs";
    /// Audit trail of advice and chat exchanges
    pub const CONVERSATIONS: &str = "conversations";
}

/// Value of an equality filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Bool(bool),
}

impl FieldValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Str(s) => serde_json::Value::String(s.clone()),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
        }
    }
}

/// Equality filter on a top-level document field.
#[derive(Debug, Clone)]
pub struct FieldFilter {
    pub field: &'static str,
    pub value: FieldValue,
}

/// Query over a single collection: AND of equality filters, optional
/// descending order and limit.
#[derive(Debug, Clone, Default)]
pub struct DocQuery {
    pub filters: Vec<FieldFilter>,
    pub order_by_desc: Option<&'static str>,
    pub limit: Option<u32>,
}

impl DocQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: &'static str, value: FieldValue) -> Self {
        self.filters.push(FieldFilter { field, value });
        self
    }

    pub fn order_by_desc(mut self, field: &'static str) -> Self {
        self.order_by_desc = Some(field);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}
