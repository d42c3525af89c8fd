// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Glucose tracker: Dexcom data, meal photo analysis and lifestyle advice
//!
//! This crate provides the backend API that pulls readings from Dexcom,
//! estimates meal carbohydrates with a hosted vision model, records food and
//! exercise logs, and generates advice from recent data.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use services::{
    AdviceService, DeviceDataFetcher, DexcomClient, DexcomService, LlmClient, MealAnalyzer,
    SmsClient,
};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub dexcom: DexcomService,
    pub fetcher: DeviceDataFetcher,
    pub meal_analyzer: MealAnalyzer,
    pub advice: AdviceService,
    /// Absent when SMS credentials are not configured
    pub sms: Option<SmsClient>,
}

impl AppState {
    /// Wire up all services from configuration.
    pub fn new(config: Config, db: FirestoreDb) -> Self {
        let dexcom = DexcomService::new(
            DexcomClient::new(
                config.dexcom_base_url.clone(),
                config.dexcom_client_id.clone(),
                config.dexcom_client_secret.clone(),
                config.dexcom_redirect_uri(),
            ),
            db.clone(),
        );

        let llm = LlmClient::new(config.llm_base_url.clone(), config.llm_api_key.clone());

        let meal_analyzer = MealAnalyzer::new(
            llm.clone(),
            config.vision_model.clone(),
            config.llm_guided_json,
            config.meal_extraction_attempts,
        );

        let advice = AdviceService::new(
            llm,
            db.clone(),
            config.advice_model.clone(),
            config.advice_context_size,
            config.advice_cache_ttl,
        );

        Self {
            fetcher: DeviceDataFetcher::new(dexcom.clone(), db.clone()),
            sms: config.sms.clone().map(SmsClient::new),
            config,
            db,
            dexcom,
            meal_analyzer,
            advice,
        }
    }
}
