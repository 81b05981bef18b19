//! crates/hvac_consult_core/src/domain.rs
//!
//! Defines the core data structures of a consultation: the aggregate record,
//! the quiz catalog, the photo category registry and the pricing estimate.
//! The serde derives describe the JSON shape used both on the wire and in
//! the document store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Consultation Aggregate
//=========================================================================================

/// The lifecycle status of a consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    Pending,
    AnswersSubmitted,
    EstimateReady,
    ImagesUploaded,
    /// Only ever set by an administrative action outside this service.
    Completed,
}

impl ConsultationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AnswersSubmitted => "answers_submitted",
            Self::EstimateReady => "estimate_ready",
            Self::ImagesUploaded => "images_uploaded",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The per-session record tracking answers, images, estimate and discount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consultation {
    pub id: Uuid,
    pub session_id: Uuid,
    pub status: ConsultationStatus,
    #[serde(default)]
    pub quiz_answers: BTreeMap<Uuid, QuizAnswer>,
    #[serde(default)]
    pub images: Vec<ConsultationImage>,
    #[serde(default)]
    pub total_discount: i64,
    #[serde(default)]
    pub completed_categories: Vec<String>,
    pub pricing_estimate: Option<PricingEstimate>,
    /// Write-once. Its presence blocks any further discount application.
    pub original_pricing_estimate: Option<PricingEstimate>,
    pub image_analysis: Option<ImageAnalysis>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped on every successful write.
    #[serde(default)]
    pub version: i64,
}

impl Consultation {
    /// Builds a fresh, empty consultation for a new session.
    pub fn new(session_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            session_id,
            status: ConsultationStatus::Pending,
            quiz_answers: BTreeMap::new(),
            images: Vec::new(),
            total_discount: 0,
            completed_categories: Vec::new(),
            pricing_estimate: None,
            original_pricing_estimate: None,
            image_analysis: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn has_image(&self, category: &str, sub_category: &str) -> bool {
        self.images
            .iter()
            .any(|img| img.category == category && img.sub_category == sub_category)
    }

    /// Completion flags derived from the record's contents rather than `status`,
    /// which a later estimate generation may overwrite.
    pub fn progress(&self) -> ProgressFlags {
        ProgressFlags {
            answers_submitted: !self.quiz_answers.is_empty(),
            estimate_generated: self.pricing_estimate.is_some(),
            images_uploaded: !self.images.is_empty(),
            discount_applied: self.original_pricing_estimate.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressFlags {
    pub answers_submitted: bool,
    pub estimate_generated: bool,
    pub images_uploaded: bool,
    pub discount_applied: bool,
}

/// A single stored photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationImage {
    pub image_number: u32,
    pub image_url: String,
    pub original_filename: Option<String>,
    pub category: String,
    pub sub_category: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub storage_key: String,
}

//=========================================================================================
// Quiz Catalog and Answers
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Text,
    Email,
    Tel,
    Number,
    Radio,
    Checkbox,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Email => "email",
            Self::Tel => "tel",
            Self::Number => "number",
            Self::Radio => "radio",
            Self::Checkbox => "checkbox",
        }
    }
}

impl FromStr for InputType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "email" => Ok(Self::Email),
            "tel" => Ok(Self::Tel),
            "number" => Ok(Self::Number),
            "radio" => Ok(Self::Radio),
            "checkbox" => Ok(Self::Checkbox),
            other => Err(format!("unknown input type '{}'", other)),
        }
    }
}

/// A quiz question. Seeded externally, read-only to the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub question_text: String,
    pub input_type: InputType,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub is_required: bool,
    pub order: i32,
}

/// A validated answer, shaped by the question's input type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Text(String),
    Number(f64),
    Choice(String),
    Choices(Vec<String>),
}

impl AnswerValue {
    /// A flat text rendering, used by the answer-driven pricing heuristics.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) | Self::Choice(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Choices(items) => items.join(", "),
        }
    }
}

/// An answer stored together with a snapshot of its question's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizAnswer {
    pub question_text: String,
    pub input_type: InputType,
    pub order: i32,
    pub answer: AnswerValue,
}

//=========================================================================================
// Image Category Registry
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubCategory {
    pub key: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tip: Option<String>,
}

/// A required photo category and the discount it earns once complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCategory {
    pub category: String,
    pub display_name: String,
    pub discount_amount: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub why_we_need_this: Option<String>,
    #[serde(default)]
    pub sub_categories: Vec<SubCategory>,
}

impl ImageCategory {
    pub fn has_sub_category(&self, key: &str) -> bool {
        self.sub_categories.iter().any(|sub| sub.key == key)
    }
}

//=========================================================================================
// Pricing Estimate
//=========================================================================================

/// One Good/Better/Best band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierEstimate {
    pub label: String,
    #[serde(rename = "minPrice")]
    pub min_price: i64,
    #[serde(rename = "maxPrice")]
    pub max_price: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierEstimates {
    pub good: TierEstimate,
    pub better: TierEstimate,
    pub best: TierEstimate,
}

impl TierEstimates {
    pub fn map_prices(&self, f: impl Fn(i64) -> i64) -> Self {
        let map = |tier: &TierEstimate| TierEstimate {
            label: tier.label.clone(),
            min_price: f(tier.min_price),
            max_price: f(tier.max_price),
        };
        Self {
            good: map(&self.good),
            better: map(&self.better),
            best: map(&self.best),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEstimate {
    pub estimates: TierEstimates,
    pub tonnage: f64,
    #[serde(rename = "systemCount")]
    pub system_count: u32,
    /// Set when the estimate is a degraded fallback or a discounted copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub generated_at: DateTime<Utc>,
}

//=========================================================================================
// Image Analysis
//=========================================================================================

/// Nameplate data extracted from OCR text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HvacInfo {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model_number: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub additional_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageOcrResult {
    pub image_number: u32,
    pub storage_key: String,
    pub success: bool,
    pub text_detected: String,
    pub confidence: f32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub combined_text: String,
    pub total_images_analyzed: usize,
    pub individual_results: Vec<ImageOcrResult>,
    pub hvac_info: HvacInfo,
    pub extraction_error: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}
