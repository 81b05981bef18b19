//! crates/hvac_consult_core/src/ports.rs
//!
//! Defines the service contracts (traits) the consultation workflow depends on.
//! These traits form the boundary of the hexagonal architecture, keeping the
//! core independent of the document store, object storage and the OCR / LLM
//! providers.

use crate::domain::{Consultation, HvacInfo, ImageCategory, Question};
use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflicting write: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Document Store Ports
//=========================================================================================

#[async_trait]
pub trait ConsultationStore: Send + Sync {
    /// Inserts a new record. Fails with `Conflict` if the session id is taken.
    async fn insert_consultation(&self, consultation: &Consultation) -> PortResult<()>;

    async fn get_consultation(&self, session_id: Uuid) -> PortResult<Consultation>;

    /// Replaces the stored record only if its version still equals
    /// `expected_version`. Returns `false` when another writer got there first.
    async fn replace_consultation(
        &self,
        consultation: &Consultation,
        expected_version: i64,
    ) -> PortResult<bool>;

    /// Returns a page of records, newest first.
    async fn list_consultations(&self, skip: usize, limit: usize) -> PortResult<Vec<Consultation>>;

    /// Removes a record. Fails with `NotFound` if there is none.
    async fn delete_consultation(&self, session_id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Returns every question ordered by its `order` field.
    async fn list_questions(&self) -> PortResult<Vec<Question>>;

    async fn insert_questions(&self, questions: &[Question]) -> PortResult<()>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn list_categories(&self) -> PortResult<Vec<ImageCategory>>;

    /// Replaces the category with the same key, or inserts it.
    /// Returns `true` when a new category was inserted.
    async fn upsert_category(&self, category: &ImageCategory) -> PortResult<bool>;
}

//=========================================================================================
// Object Storage Port
//=========================================================================================

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores the bytes under `key` and returns a public URL for them.
    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> PortResult<String>;

    async fn download(&self, key: &str) -> PortResult<Bytes>;

    async fn delete(&self, key: &str) -> PortResult<()>;
}

//=========================================================================================
// OCR and Extraction Ports
//=========================================================================================

/// Raw text found in an image. An empty `text` means nothing was detected.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedText {
    pub text: String,
    pub confidence: f32,
}

#[async_trait]
pub trait OcrService: Send + Sync {
    async fn detect_text(&self, image: &[u8]) -> PortResult<DetectedText>;
}

/// The outcome of a structured extraction. A reply that could not be parsed
/// yields empty `info` and a `parse_error` instead of a port failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub info: HvacInfo,
    pub parse_error: Option<String>,
}

#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Extracts nameplate data (brand, model, serial, extras) from OCR text.
    async fn extract_hvac_info(&self, text: &str) -> PortResult<Extraction>;
}
