//! services/api/src/adapters/extraction_llm.rs
//!
//! This module contains the adapter for the nameplate-extraction LLM.
//! It implements the `ExtractionService` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = "You are an expert HVAC technician who reads equipment nameplates. You MUST extract exact information and respond with ONLY valid JSON. Never use markdown formatting. Be precise and accurate.";

const USER_PROMPT_TEMPLATE: &str = r#"You are an expert HVAC technician with 20+ years of experience reading equipment nameplates and technical documentation. Extract PRECISE equipment information from the HVAC text data below.

Rules:
1. Read every word carefully.
2. Extract exact text matches. Do not paraphrase or summarize.

BRAND: the manufacturer, shortened to its brand (e.g. "GOODMAN MANUFACTURING CO" -> "GOODMAN"). Common brands: GOODMAN, LG, CARRIER, TRANE, LENNOX, RHEEM, YORK, DAIKIN, MITSUBISHI.
MODEL NUMBER: the complete alphanumeric code after "MODEL" (e.g. "MODEL CKJ60-1" -> "CKJ60-1").
SERIAL NUMBER: the complete number after "SERIAL NO.", "SERIAL NUMBER" or "S/N".
ADDITIONAL INFO: BTU ratings, voltage, electrical ratings (RLA, LRA, FLA), technology features (inverter, heat pump, high efficiency) and physical specifications (phase, HP), as one comma-separated string.

Respond with ONLY this JSON object, using null for anything you cannot find:
{"brand": "...", "model_number": "...", "serial_number": "...", "additional_info": "..."}

Text:
{text}"#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use hvac_consult_core::{
    domain::HvacInfo,
    ports::{Extraction, ExtractionService, PortError, PortResult},
};
use regex::Regex;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

/// Matches a reply wrapped in a markdown code fence, capturing the body.
const CODE_FENCE_PATTERN: &str = r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ExtractionService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiExtractionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
    code_fence: Regex,
}

impl OpenAiExtractionAdapter {
    /// Creates a new `OpenAiExtractionAdapter`.
    pub fn new(
        client: Client<OpenAIConfig>,
        model: String,
        timeout: Duration,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            client,
            model,
            timeout,
            code_fence: Regex::new(CODE_FENCE_PATTERN)?,
        })
    }
}

/// A non-empty string field. Any other shape counts as absent.
fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// `additional_info` often comes back as an object or a list; keep it as text.
fn additional_info(fields: &Map<String, Value>) -> Option<String> {
    match fields.get("additional_info") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Some(other) => Some(other.to_string()),
    }
}

/// Parses the model's reply, tolerating code fences and odd field shapes.
/// Anything that is not a JSON object is reported as a parse error rather
/// than a failure.
fn parse_reply(code_fence: &Regex, reply: &str) -> Extraction {
    let body = code_fence
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply)
        .trim();

    let fields = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(fields)) => fields,
        Ok(other) => {
            return Extraction {
                info: HvacInfo::default(),
                parse_error: Some(format!("Expected a JSON object, got: {}", other)),
            }
        }
        Err(e) => {
            return Extraction {
                info: HvacInfo::default(),
                parse_error: Some(format!("Failed to parse extraction response: {}", e)),
            }
        }
    };

    Extraction {
        info: HvacInfo {
            brand: string_field(&fields, "brand"),
            model_number: string_field(&fields, "model_number"),
            serial_number: string_field(&fields, "serial_number"),
            additional_info: additional_info(&fields),
        },
        parse_error: None,
    }
}

//=========================================================================================
// `ExtractionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ExtractionService for OpenAiExtractionAdapter {
    async fn extract_hvac_info(&self, text: &str) -> PortResult<Extraction> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(USER_PROMPT_TEMPLATE.replace("{text}", text))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.0)
            .max_tokens(500u32)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        debug!("Sending {} characters to extraction model", text.len());
        // Call the API with a deadline and map its error manually.
        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| PortError::Unexpected("Extraction LLM timed out".to_string()))?
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        // Extract the text content from the first choice in the response.
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Extraction LLM returned no text content.".to_string())
            })?;

        Ok(parse_reply(&self.code_fence, &content))
    }
}
