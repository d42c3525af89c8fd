// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device data fetch cycle: pull each Dexcom record category for a date
//! range and upsert it into its collection.

use crate::config::{Config, DEXCOM_DATE_FORMAT};
use crate::db::{collections, FirestoreDb};
use crate::error::AppError;
use crate::models::{Calibration, DeviceRecord, DexcomEvent, GlucoseAlert, GlucoseReading};
use crate::services::DexcomService;
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Fetch window in Dexcom's date format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

impl DateRange {
    /// Configured default range, overridden by request parameters if given.
    pub fn resolve(
        config: &Config,
        start: Option<String>,
        end: Option<String>,
    ) -> Result<Self, AppError> {
        let start = start.unwrap_or_else(|| config.dexcom_start_date.clone());
        let end = end.unwrap_or_else(|| config.dexcom_end_date.clone());

        let parse = |name: &str, value: &str| {
            NaiveDateTime::parse_from_str(value, DEXCOM_DATE_FORMAT).map_err(|_| {
                AppError::BadRequest(format!("{} must be formatted as YYYY-MM-DDThh:mm:ss", name))
            })
        };

        if parse("start", &start)? >= parse("end", &end)? {
            return Err(AppError::BadRequest("start must be before end".to_string()));
        }

        Ok(Self { start, end })
    }
}

/// Records written per category by one fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct FetchSummary {
    pub readings: usize,
    pub events: usize,
    pub alerts: usize,
    pub calibrations: usize,
}

/// Fetches device records and stores them idempotently.
#[derive(Clone)]
pub struct DeviceDataFetcher {
    dexcom: DexcomService,
    db: FirestoreDb,
}

impl DeviceDataFetcher {
    pub fn new(dexcom: DexcomService, db: FirestoreDb) -> Self {
        Self { dexcom, db }
    }

    /// Fetch all four categories in order.
    ///
    /// The first failure aborts the cycle; categories already written stay
    /// written.
    pub async fn fetch(&self, range: &DateRange) -> Result<FetchSummary, AppError> {
        let summary = FetchSummary {
            readings: self
                .fetch_category::<GlucoseReading>("egvs", collections::GLUCOSE_READINGS, range)
                .await?,
            events: self
                .fetch_category::<DexcomEvent>("events", collections::DEXCOM_EVENTS, range)
                .await?,
            alerts: self
                .fetch_category::<GlucoseAlert>("alerts", collections::GLUCOSE_ALERTS, range)
                .await?,
            calibrations: self
                .fetch_category::<Calibration>("calibrations", collections::CALIBRATIONS, range)
                .await?,
        };

        tracing::info!(
            start = %range.start,
            end = %range.end,
            readings = summary.readings,
            events = summary.events,
            alerts = summary.alerts,
            calibrations = summary.calibrations,
            "Device data fetch complete"
        );

        Ok(summary)
    }

    async fn fetch_category<T>(
        &self,
        kind: &str,
        collection: &str,
        range: &DateRange,
    ) -> Result<usize, AppError>
    where
        T: DeviceRecord + Serialize + DeserializeOwned + Send + Sync,
    {
        let records: Vec<T> = self
            .dexcom
            .get_records(kind, &range.start, &range.end)
            .await
            .inspect_err(|e| tracing::warn!(kind, error = %e, "Dexcom fetch failed"))?;

        tracing::debug!(kind, count = records.len(), "Fetched Dexcom records");
        self.db.upsert_device_records(collection, &records).await
    }
}
