//! crates/hvac_consult_core/src/error.rs
//!
//! The error taxonomy surfaced by the consultation workflow.

use crate::ports::PortError;

/// A rejected request. Every message names the offending field or value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required answer for question: {0}")]
    MissingAnswer(String),
    #[error("Invalid question ID: {0}")]
    UnknownQuestion(String),
    #[error("Answer for '{question}' {reason}")]
    InvalidAnswer { question: String, reason: String },
    #[error("Invalid options for '{question}': {options:?}")]
    InvalidOption { question: String, options: Vec<String> },
    #[error("Please submit consultation answers before uploading images (status is {0})")]
    PrematureUpload(String),
    #[error("Maximum {0} images allowed per consultation")]
    ImageLimit(usize),
    #[error("Invalid image category '{category}' / sub-category '{sub_category}'")]
    InvalidCategory { category: String, sub_category: String },
    #[error("An image for '{category}' / '{sub_category}' has already been uploaded")]
    DuplicateCategory { category: String, sub_category: String },
    #[error("Only image files are allowed (got '{0}')")]
    InvalidFileType(String),
    #[error("File is too large ({size} bytes, limit is {limit})")]
    FileTooLarge { size: usize, limit: usize },
    #[error("Quiz answers required for pricing estimate")]
    MissingAnswers,
    #[error("Cannot generate an estimate for a consultation in status {0}")]
    EstimateClosed(String),
    #[error("No pricing estimate exists for this consultation")]
    NoEstimate,
    #[error("No images found for this consultation")]
    NoImages,
    #[error("Consultation must have uploaded images before analysis (status is {0})")]
    PrematureAnalysis(String),
    #[error("Discount amount for '{category}' must not be negative (got {amount})")]
    NegativeDiscount { category: String, amount: i64 },
}

#[derive(Debug, thiserror::Error)]
pub enum ConsultError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Dependency failure: {0}")]
    Dependency(String),
}

impl From<PortError> for ConsultError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => Self::NotFound(what),
            PortError::Conflict(what) => Self::Conflict(what),
            PortError::Unexpected(what) => Self::Dependency(what),
        }
    }
}

pub type ConsultResult<T> = Result<T, ConsultError>;
