//! services/api/src/adapters/vision_ocr.rs
//!
//! This module contains the adapter for the Google Cloud Vision text detection API.
//! It implements the `OcrService` port from the `core` crate.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use hvac_consult_core::ports::{DetectedText, OcrService, PortError, PortResult};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const VISION_ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";

//=========================================================================================
// Response Shapes
//=========================================================================================

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    full_text_annotation: Option<FullTextAnnotation>,
    error: Option<VisionError>,
}

#[derive(Deserialize)]
struct FullTextAnnotation {
    #[serde(default)]
    text: String,
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    confidence: f32,
}

#[derive(Deserialize)]
struct VisionError {
    #[serde(default)]
    message: String,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `OcrService` using Google Cloud Vision `TEXT_DETECTION`.
#[derive(Clone)]
pub struct GoogleVisionOcrAdapter {
    http_client: reqwest::Client,
    api_key: String,
}

impl GoogleVisionOcrAdapter {
    /// Creates a new `GoogleVisionOcrAdapter` whose requests time out after `timeout`.
    pub fn new(api_key: String, timeout: Duration) -> PortResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Self {
            http_client,
            api_key,
        })
    }
}

fn into_detected_text(response: AnnotateResponse) -> PortResult<DetectedText> {
    let Some(first) = response.responses.into_iter().next() else {
        return Ok(DetectedText {
            text: String::new(),
            confidence: 0.0,
        });
    };
    if let Some(error) = first.error {
        return Err(PortError::Unexpected(format!("Vision API error: {}", error.message)));
    }
    Ok(match first.full_text_annotation {
        Some(annotation) => {
            let confidence = if annotation.text.is_empty() {
                0.0
            } else {
                annotation.pages.first().map(|p| p.confidence).unwrap_or(0.0)
            };
            DetectedText {
                text: annotation.text,
                confidence,
            }
        }
        None => DetectedText {
            text: String::new(),
            confidence: 0.0,
        },
    })
}

//=========================================================================================
// `OcrService` Trait Implementation
//=========================================================================================

#[async_trait]
impl OcrService for GoogleVisionOcrAdapter {
    async fn detect_text(&self, image: &[u8]) -> PortResult<DetectedText> {
        let payload = json!({
            "requests": [{
                "image": { "content": general_purpose::STANDARD.encode(image) },
                "features": [{ "type": "TEXT_DETECTION" }]
            }]
        });

        debug!("Sending {} bytes to Vision API", image.len());
        let response = self
            .http_client
            .post(VISION_ANNOTATE_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Vision API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Unexpected(format!(
                "API Error: {} - {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: AnnotateResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("Malformed Vision API response: {}", e)))?;
        into_detected_text(parsed)
    }
}
