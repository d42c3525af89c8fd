// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod advice;
pub mod device_data;
pub mod dexcom;
pub mod llm;
pub mod meal;
pub mod messaging;

pub use advice::AdviceService;
pub use device_data::{DateRange, DeviceDataFetcher, FetchSummary};
pub use dexcom::{DexcomClient, DexcomService};
pub use llm::LlmClient;
pub use meal::{MealAnalyzer, MealImage};
pub use messaging::SmsClient;
