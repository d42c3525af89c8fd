// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! On a workstation the values usually come from a local `.env` file. When
//! `DEPLOY_PLATFORM` names a managed platform the process environment is the
//! only source, since the platform injects secrets as environment variables.

use std::env;
use std::time::Duration;

/// Dexcom API date format (`startDate`/`endDate` query parameters).
pub const DEXCOM_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const DEXCOM_SANDBOX_URL: &str = "https://sandbox-api.dexcom.com";
const DEXCOM_PRODUCTION_URL: &str = "https://api.dexcom.com";

/// Which document store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Firestore,
    /// Process-local store, for offline development and tests.
    Memory,
}

/// Credentials for the Twilio-compatible SMS API.
#[derive(Debug, Clone)]
pub struct SmsSettings {
    pub base_url: String,
    pub account_sid: String,
    pub api_key_sid: String,
    pub api_key_secret: String,
    pub from_number: String,
    pub default_to: Option<String>,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Server ---
    /// Frontend URL for redirects after login and OAuth
    pub frontend_url: String,
    /// Public base URL of this server (used to build the OAuth redirect URI)
    pub server_name: String,
    /// Server port
    pub port: u16,
    /// Deployment platform flag (`None` when running locally)
    pub deploy_platform: Option<String>,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,

    // --- Storage ---
    pub database_backend: DatabaseBackend,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,

    // --- Dexcom ---
    pub dexcom_client_id: String,
    pub dexcom_client_secret: String,
    /// API base URL (sandbox or production)
    pub dexcom_base_url: String,
    /// Default fetch window start (`YYYY-MM-DDThh:mm:ss`)
    pub dexcom_start_date: String,
    /// Default fetch window end (`YYYY-MM-DDThh:mm:ss`)
    pub dexcom_end_date: String,

    // --- Sessions ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for the OAuth state parameter
    pub oauth_state_key: Vec<u8>,
    /// bcrypt work factor
    pub password_hash_cost: u32,

    // --- Hosted language model ---
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub vision_model: String,
    pub advice_model: String,
    /// Whether the backing model accepts a `guided_json` schema
    pub llm_guided_json: bool,
    pub meal_extraction_attempts: u32,
    pub advice_context_size: u32,
    pub advice_cache_ttl: Duration,

    // --- Messaging ---
    pub sms: Option<SmsSettings>,
}

impl Config {
    /// Config for tests: in-memory storage and placeholder upstream URLs.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            server_name: "http://localhost:8080".to_string(),
            port: 8080,
            deploy_platform: None,
            max_upload_bytes: 16 * 1024 * 1024,
            database_backend: DatabaseBackend::Memory,
            gcp_project_id: "test-project".to_string(),
            dexcom_client_id: "test_client_id".to_string(),
            dexcom_client_secret: "test_secret".to_string(),
            dexcom_base_url: "http://127.0.0.1:9".to_string(),
            dexcom_start_date: "2024-01-01T00:00:00".to_string(),
            dexcom_end_date: "2024-01-02T00:00:00".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_oauth_state_key".to_vec(),
            password_hash_cost: 4,
            llm_base_url: "http://127.0.0.1:9".to_string(),
            llm_api_key: "test_llm_key".to_string(),
            vision_model: "test-vision-model".to_string(),
            advice_model: "test-advice-model".to_string(),
            llm_guided_json: true,
            meal_extraction_attempts: 2,
            advice_context_size: 24,
            advice_cache_ttl: Duration::from_secs(60),
            sms: None,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let deploy_platform = env::var("DEPLOY_PLATFORM").ok().filter(|v| !v.is_empty());
        if deploy_platform.is_none() {
            dotenvy::dotenv().ok(); // Load .env file if present
        }

        let dexcom_base_url = match env::var("DEXCOM_BASE_URL") {
            Ok(url) => url.trim_end_matches('/').to_string(),
            Err(_) if env_flag("DEXCOM_USE_SANDBOX", true) => DEXCOM_SANDBOX_URL.to_string(),
            Err(_) => DEXCOM_PRODUCTION_URL.to_string(),
        };

        let dexcom_start_date = env_or("DEXCOM_START_DATE", "2024-01-01T00:00:00");
        let dexcom_end_date = env_or("DEXCOM_END_DATE", "2024-01-02T00:00:00");
        check_dexcom_date("DEXCOM_START_DATE", &dexcom_start_date)?;
        check_dexcom_date("DEXCOM_END_DATE", &dexcom_end_date)?;

        let jwt_signing_key = required("JWT_SIGNING_KEY")?.into_bytes();
        let oauth_state_key = env::var("OAUTH_STATE_KEY")
            .map(String::into_bytes)
            .unwrap_or_else(|_| jwt_signing_key.clone());

        let database_backend = match env_or("DATABASE_BACKEND", "firestore").as_str() {
            "firestore" => DatabaseBackend::Firestore,
            "memory" => DatabaseBackend::Memory,
            _ => return Err(ConfigError::Invalid("DATABASE_BACKEND")),
        };

        Ok(Self {
            frontend_url: env_or("FRONTEND_URL", "http://localhost:5173"),
            server_name: env_or("SERVER_NAME", "http://localhost:8080")
                .trim_end_matches('/')
                .to_string(),
            port: env_parse("PORT", 8080),
            deploy_platform,
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", 16 * 1024 * 1024),

            database_backend,
            gcp_project_id: env_or("GCP_PROJECT_ID", "local-dev"),

            dexcom_client_id: required("DEXCOM_CLIENT_ID")?,
            dexcom_client_secret: required("DEXCOM_CLIENT_SECRET")?,
            dexcom_base_url,
            dexcom_start_date,
            dexcom_end_date,

            jwt_signing_key,
            oauth_state_key,
            password_hash_cost: env_parse("PASSWORD_HASH_COST", bcrypt::DEFAULT_COST),

            llm_base_url: env_or("LLM_BASE_URL", "https://api.hyperbolic.xyz/v1")
                .trim_end_matches('/')
                .to_string(),
            llm_api_key: required("LLM_API_KEY")?,
            vision_model: env_or("LLM_VISION_MODEL", "Qwen/Qwen2-VL-72B-Instruct"),
            advice_model: env_or("LLM_ADVICE_MODEL", "meta-llama/Meta-Llama-3.1-70B-Instruct"),
            llm_guided_json: env_flag("LLM_GUIDED_JSON", true),
            meal_extraction_attempts: env_parse("MEAL_EXTRACTION_ATTEMPTS", 2u32).max(1),
            advice_context_size: env_parse("ADVICE_CONTEXT_SIZE", 24),
            advice_cache_ttl: Duration::from_secs(env_parse("ADVICE_CACHE_TTL_SECS", 60)),

            sms: sms_from_env(),
        })
    }

    /// OAuth redirect URI registered with Dexcom.
    pub fn dexcom_redirect_uri(&self) -> String {
        format!("{}/auth/dexcom/callback", self.server_name)
    }

    /// Whether cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.frontend_url.starts_with("https://")
    }
}

/// SMS settings are optional; the notify route is disabled without them.
fn sms_from_env() -> Option<SmsSettings> {
    let account_sid = env::var("TWILIO_ACCOUNT_SID").ok()?;
    Some(SmsSettings {
        base_url: env_or("SMS_BASE_URL", "https://api.twilio.com")
            .trim_end_matches('/')
            .to_string(),
        api_key_sid: env::var("TWILIO_API_KEY_SID").unwrap_or_else(|_| account_sid.clone()),
        api_key_secret: env::var("TWILIO_API_KEY_SECRET").ok()?.trim().to_string(),
        from_number: env::var("SMS_FROM_NUMBER").ok()?,
        default_to: env::var("SMS_DEFAULT_TO").ok(),
        account_sid,
    })
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

fn check_dexcom_date(name: &'static str, value: &str) -> Result<(), ConfigError> {
    chrono::NaiveDateTime::parse_from_str(value, DEXCOM_DATE_FORMAT)
        .map(|_| ())
        .map_err(|_| ConfigError::Invalid(name))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
