// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Food and exercise log entries.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Kind of log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum LogType {
    Food,
    Exercise,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Food => "food",
            LogType::Exercise => "exercise",
        }
    }
}

/// Stored log entry in Firestore.
///
/// Only `starred` changes after creation; entries are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LogEntry {
    /// Entry ID (also used as document ID)
    pub id: String,
    /// Owner username
    pub user_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub log_type: LogType,
    /// When the food was eaten or the exercise happened (RFC 3339, UTC)
    pub timestamp: String,
    #[serde(default)]
    pub starred: bool,
    /// Type-specific details: `total_carbs` for food,
    /// `time_spent` and `intensity_level` for exercise.
    #[cfg_attr(feature = "binding-generation", ts(type = "Record<string, unknown>"))]
    pub details: serde_json::Value,
}

impl LogEntry {
    /// One-line description used in advice prompts.
    pub fn describe(&self) -> String {
        let details = &self.details;
        match self.log_type {
            LogType::Food => match details.get("total_carbs").and_then(|v| v.as_f64()) {
                Some(carbs) => format!("{}: ate {} ({carbs}g carbs)", self.timestamp, self.name),
                None => format!("{}: ate {}", self.timestamp, self.name),
            },
            LogType::Exercise => {
                let mut line = format!("{}: exercised ({})", self.timestamp, self.name);
                if let Some(minutes) = details.get("time_spent").and_then(|v| v.as_f64()) {
                    line.push_str(&format!(" for {minutes} minutes"));
                }
                if let Some(intensity) = details.get("intensity_level").and_then(|v| v.as_str()) {
                    line.push_str(&format!(", intensity {intensity}"));
                }
                line
            }
        }
    }
}
