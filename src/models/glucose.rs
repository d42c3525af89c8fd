// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Dexcom device records for storage and API.
//!
//! The Dexcom API returns camelCase fields; stored documents use snake_case.
//! Serde aliases accept both, so the same types decode upstream payloads and
//! Firestore documents.

use serde::{Deserialize, Deserializer, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A record that can be stored idempotently.
pub trait DeviceRecord {
    /// Document ID derived from the provider record ID, falling back to the
    /// record's system time. Re-fetching the same record overwrites it.
    fn document_id(&self) -> String;
}

fn derive_document_id(record_id: Option<&str>, system_time: &str) -> String {
    let key = record_id.filter(|id| !id.is_empty()).unwrap_or(system_time);
    urlencoding::encode(key).into_owned()
}

/// Estimated glucose value (EGV).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct GlucoseReading {
    #[serde(default, alias = "recordId")]
    pub record_id: Option<String>,
    #[serde(alias = "systemTime")]
    pub system_time: String,
    #[serde(alias = "displayTime")]
    pub display_time: String,
    /// Glucose value (mg/dL unless `unit` says otherwise)
    pub value: f64,
    /// Trend arrow (e.g. "flat", "singleUp")
    #[serde(default)]
    pub trend: Option<String>,
    #[serde(default, alias = "trendRate")]
    pub trend_rate: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl DeviceRecord for GlucoseReading {
    fn document_id(&self) -> String {
        derive_document_id(self.record_id.as_deref(), &self.system_time)
    }
}

/// User-entered event on the receiver (carbs, insulin, exercise, health).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct DexcomEvent {
    #[serde(default, alias = "recordId")]
    pub record_id: Option<String>,
    #[serde(alias = "systemTime")]
    pub system_time: String,
    #[serde(alias = "displayTime")]
    pub display_time: String,
    #[serde(alias = "eventType")]
    pub event_type: String,
    #[serde(default, alias = "eventSubType")]
    pub event_sub_type: Option<String>,
    /// Dexcom reports event values as strings ("25"); older payloads use numbers.
    #[serde(default, deserialize_with = "string_or_number")]
    pub value: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, alias = "eventStatus")]
    pub event_status: Option<String>,
}

impl DeviceRecord for DexcomEvent {
    fn document_id(&self) -> String {
        derive_document_id(self.record_id.as_deref(), &self.system_time)
    }
}

/// High/low/rise/fall alert raised by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct GlucoseAlert {
    #[serde(default, alias = "recordId", alias = "alertId")]
    pub alert_id: Option<String>,
    #[serde(alias = "systemTime")]
    pub system_time: String,
    #[serde(alias = "displayTime")]
    pub display_time: String,
    #[serde(alias = "alertName", alias = "alertType", alias = "alert_type")]
    pub alert_name: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, alias = "alertState", alias = "status")]
    pub alert_state: Option<String>,
}

impl DeviceRecord for GlucoseAlert {
    fn document_id(&self) -> String {
        // Alert IDs are not unique across alert types at the same instant.
        let key = match self.alert_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => format!("{}_{}", self.system_time, self.alert_name),
        };
        urlencoding::encode(&key).into_owned()
    }
}

/// Fingerstick calibration entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Calibration {
    #[serde(default, alias = "recordId")]
    pub record_id: Option<String>,
    #[serde(alias = "systemTime")]
    pub system_time: String,
    #[serde(alias = "displayTime")]
    pub display_time: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl DeviceRecord for Calibration {
    fn document_id(&self) -> String {
        derive_document_id(self.record_id.as_deref(), &self.system_time)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(s)) => Some(s),
        Some(Raw::Number(n)) => Some(n.to_string()),
        None => None,
    })
}
