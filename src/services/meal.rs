// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Meal photo analysis via a hosted vision model.
//!
//! Two rounds against the same conversation:
//! 1. Free-text breakdown of ingredients and carbohydrates.
//! 2. Extraction of `{meal_name, total_carbs}` as strict JSON from round 1.
//!
//! Round 2 output is validated; an invalid reply is sent back to the model
//! with a correction request, up to the configured number of attempts.
//! Transport failures are never retried.

use crate::error::AppError;
use crate::services::llm::{ChatMessage, ChatRequest, LlmClient};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// File extensions accepted for meal photos.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

const MAX_TOKENS: u32 = 2000;
const BREAKDOWN_TEMPERATURE: f64 = 0.2;
const EXTRACTION_TEMPERATURE: f64 = 0.0;

const BREAKDOWN_SYSTEM_PROMPT: &str = "You are a nutrition assistant. Answer in plain text \
using simple lists. Do not use markdown headers, bold text or tables.";

const BREAKDOWN_USER_PROMPT: &str = "Identify the meal in this image. List each visible \
ingredient with an estimated portion and its carbohydrate content in grams, then give the \
total carbohydrates for the whole meal.";

const EXTRACTION_SYSTEM_PROMPT: &str = "Respond with a single JSON object and nothing else. \
The object must have exactly two keys: \"meal_name\" (string) and \"total_carbs\" (number of \
grams). Do not include explanations, markdown or code fences.";

const EXTRACTION_USER_PROMPT: &str =
    "Using your analysis above, fill in the JSON object for this meal.";

/// An uploaded meal photo that passed basic validation.
#[derive(Debug, Clone)]
pub struct MealImage {
    mime: &'static str,
    bytes: Vec<u8>,
}

impl MealImage {
    /// Validate an upload. A missing or empty filename is the same as no file.
    pub fn from_upload(filename: Option<&str>, bytes: Vec<u8>) -> Result<Self, AppError> {
        let filename = filename.map(str::trim).unwrap_or_default();
        if filename.is_empty() || bytes.is_empty() {
            return Err(AppError::BadRequest("no file".to_string()));
        }

        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        let mime = match extension.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
            _ => {
                return Err(AppError::BadRequest(format!(
                    "unsupported file type; allowed: {}",
                    ALLOWED_EXTENSIONS.join(", ")
                )))
            }
        };

        Ok(Self { mime, bytes })
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    /// `data:<mime>;base64,<data>`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

/// Free-text output of the first round.
#[derive(Debug, Clone)]
pub struct MealBreakdown(pub String);

/// Validated output of the extraction round.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MealEstimate {
    pub meal_name: String,
    pub total_carbs: f64,
}

impl MealEstimate {
    /// Parse and validate model output. A fenced ```json block is unwrapped.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let estimate: MealEstimate = serde_json::from_str(strip_code_fence(raw))
            .map_err(|e| format!("not a valid meal JSON object: {}", e))?;

        if estimate.meal_name.trim().is_empty() {
            return Err("meal_name must be a non-empty string".to_string());
        }
        if !estimate.total_carbs.is_finite() || estimate.total_carbs < 0.0 {
            return Err("total_carbs must be a non-negative number".to_string());
        }

        Ok(estimate)
    }

    /// JSON schema handed to models that support constrained decoding.
    pub fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "meal_name": {"type": "string"},
                "total_carbs": {"type": "number", "minimum": 0}
            },
            "required": ["meal_name", "total_carbs"],
            "additionalProperties": false
        })
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim()
}

/// Result returned to the client.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MealAnalysis {
    pub meal_name: String,
    pub total_carbs: f64,
    /// Round-one breakdown the estimate was derived from
    pub reason: String,
}

/// Meal analysis failures. Both carry the message history so far.
#[derive(Debug, thiserror::Error)]
pub enum MealAnalysisError {
    #[error("meal analysis request failed: {message}")]
    Transport {
        message: String,
        history: Vec<ChatMessage>,
    },

    #[error("meal analysis output could not be decoded: {message}")]
    Decode {
        message: String,
        raw: String,
        history: Vec<ChatMessage>,
    },
}

/// Runs the two-round analysis against the configured vision model.
#[derive(Clone)]
pub struct MealAnalyzer {
    llm: LlmClient,
    model: String,
    guided_json: bool,
    extraction_attempts: u32,
}

impl MealAnalyzer {
    pub fn new(llm: LlmClient, model: String, guided_json: bool, extraction_attempts: u32) -> Self {
        Self {
            llm,
            model,
            guided_json,
            extraction_attempts: extraction_attempts.max(1),
        }
    }

    pub async fn analyze(&self, image: &MealImage) -> Result<MealAnalysis, MealAnalysisError> {
        let data_uri = image.data_uri();
        let mut history = vec![
            ChatMessage::system(BREAKDOWN_SYSTEM_PROMPT),
            ChatMessage::user_with_image(BREAKDOWN_USER_PROMPT, data_uri.as_str()),
        ];

        let breakdown = self.describe(&mut history).await?;

        history.push(ChatMessage::system(EXTRACTION_SYSTEM_PROMPT));
        history.push(ChatMessage::user_with_image(
            EXTRACTION_USER_PROMPT,
            data_uri.as_str(),
        ));

        let estimate = self.extract(&mut history).await?;

        tracing::info!(
            meal_name = %estimate.meal_name,
            total_carbs = estimate.total_carbs,
            "Meal analyzed"
        );

        Ok(MealAnalysis {
            meal_name: estimate.meal_name,
            total_carbs: estimate.total_carbs,
            reason: breakdown.0,
        })
    }

    /// Round one: free-text breakdown, appended to the history.
    async fn describe(
        &self,
        history: &mut Vec<ChatMessage>,
    ) -> Result<MealBreakdown, MealAnalysisError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: history.clone(),
            temperature: BREAKDOWN_TEMPERATURE,
            max_tokens: MAX_TOKENS,
            guided_json: None,
        };

        let text = self
            .llm
            .complete(&request)
            .await
            .map_err(|e| transport_error(e.to_string(), history))?;

        history.push(ChatMessage::assistant(text.as_str()));
        Ok(MealBreakdown(text))
    }

    /// Round two: schema extraction with bounded local re-extraction.
    async fn extract(
        &self,
        history: &mut Vec<ChatMessage>,
    ) -> Result<MealEstimate, MealAnalysisError> {
        let mut attempt = 1;
        loop {
            let request = ChatRequest {
                model: self.model.clone(),
                messages: history.clone(),
                temperature: EXTRACTION_TEMPERATURE,
                max_tokens: MAX_TOKENS,
                guided_json: self.guided_json.then(MealEstimate::schema),
            };

            let raw = self
                .llm
                .complete(&request)
                .await
                .map_err(|e| transport_error(e.to_string(), history))?;

            history.push(ChatMessage::assistant(raw.as_str()));

            let problem = match MealEstimate::parse(&raw) {
                Ok(estimate) => return Ok(estimate),
                Err(problem) => problem,
            };

            tracing::warn!(attempt, error = %problem, "Meal extraction output invalid");

            if attempt >= self.extraction_attempts {
                return Err(MealAnalysisError::Decode {
                    message: problem,
                    raw,
                    history: redact(history),
                });
            }

            history.push(ChatMessage::user(format!(
                "That reply was not valid ({}). Reply with only the JSON object \
                 {{\"meal_name\": string, \"total_carbs\": number}}.",
                problem
            )));
            attempt += 1;
        }
    }
}

fn transport_error(message: String, history: &[ChatMessage]) -> MealAnalysisError {
    MealAnalysisError::Transport {
        message,
        history: redact(history),
    }
}

fn redact(history: &[ChatMessage]) -> Vec<ChatMessage> {
    history.iter().map(ChatMessage::redacted).collect()
}
