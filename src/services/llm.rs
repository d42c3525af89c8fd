// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client for a hosted OpenAI-compatible chat completions API.
//!
//! Used by both the meal analyzer (vision model) and the advice generator
//! (text model). Model names and the endpoint come from configuration only.

use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a chat exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

/// Plain text, or a list of text and image parts (multimodal turns).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// User turn carrying instructions and an image (data URI or URL).
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }

    /// Copy with inline image payloads replaced by a placeholder, for
    /// histories echoed back in error responses.
    pub fn redacted(&self) -> Self {
        let content = match &self.content {
            MessageContent::Text(text) => MessageContent::Text(text.clone()),
            MessageContent::Parts(parts) => MessageContent::Parts(
                parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::ImageUrl { image_url } if image_url.url.starts_with("data:") => {
                            let prefix = image_url.url.split(',').next().unwrap_or("data:");
                            ContentPart::ImageUrl {
                                image_url: ImageUrl {
                                    url: format!("{},<redacted>", prefix),
                                },
                            }
                        }
                        other => other.clone(),
                    })
                    .collect(),
            ),
        };
        Self {
            role: self.role,
            content,
        }
    }
}

/// Chat completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    /// JSON schema for constrained decoding (vLLM-style `guided_json`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guided_json: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Errors talking to the hosted model.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        AppError::Llm(err.to_string())
    }
}

/// Chat completions client.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LlmClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    /// Send a chat request and return the first choice's text.
    pub async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            temperature = request.temperature,
            guided = request.guided_json.is_some(),
            "Sending chat completion request"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status, "Chat completion request rejected");
            return Err(LlmError::Status { status, body });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(format!("JSON parse error: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Malformed("no message content in response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_multimodal_message_shape() {
        let msg = ChatMessage::user_with_image("What is this?", "data:image/png;base64,AAAA");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "What is this?"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
                ]
            })
        );

        let decoded: ChatMessage = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_plain_message_shape() {
        let value = serde_json::to_value(ChatMessage::system("be brief")).unwrap();
        assert_eq!(value, json!({"role": "system", "content": "be brief"}));
    }

    #[test]
    fn test_redacted_strips_inline_image() {
        let msg = ChatMessage::user_with_image("describe", "data:image/jpeg;base64,/9j/4AAQ");
        let redacted = msg.redacted();
        let MessageContent::Parts(parts) = &redacted.content else {
            panic!("expected parts");
        };
        assert_eq!(
            parts[1],
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "data:image/jpeg;base64,<redacted>".to_string()
                }
            }
        );
        // Text untouched
        assert_eq!(
            parts[0],
            ContentPart::Text {
                text: "describe".to_string()
            }
        );
    }

    #[test]
    fn test_request_omits_absent_schema() {
        let request = ChatRequest {
            model: "m".to_string(),
            messages: vec![],
            temperature: 0.0,
            max_tokens: 10,
            guided_json: None,
        };
        let body = serde_json::to_string(&request).unwrap();
        assert!(body.contains("\"temperature\":0.0"));
        assert!(!body.contains("guided_json"));
    }
}
