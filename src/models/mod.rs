// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod conversation;
pub mod glucose;
pub mod log;
pub mod user;

pub use conversation::Conversation;
pub use glucose::{Calibration, DeviceRecord, DexcomEvent, GlucoseAlert, GlucoseReading};
pub use log::{LogEntry, LogType};
pub use user::{AccessToken, User};
