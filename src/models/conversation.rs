// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Audit record of AI interactions.

use serde::{Deserialize, Serialize};

/// One advice or chat exchange. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Record ID (also used as document ID)
    pub id: String,
    pub user_id: String,
    pub timestamp: String,
    /// Absent for generated advice with no user prompt
    #[serde(default)]
    pub user_message: Option<String>,
    pub ai_response: String,
}
