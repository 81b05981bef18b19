pub mod answers;
pub mod catalog;
pub mod discount;
pub mod domain;
pub mod error;
pub mod ports;
pub mod pricing;
pub mod service;

pub use domain::{
    AnswerValue, Consultation, ConsultationImage, ConsultationStatus, HvacInfo, ImageAnalysis,
    ImageCategory, InputType, PricingEstimate, Question, QuizAnswer, SubCategory,
};
pub use error::{ConsultError, ConsultResult, ValidationError};
pub use ports::{
    CategoryStore, ConsultationStore, DetectedText, Extraction, ExtractionService, ObjectStorage,
    OcrService, PortError, PortResult, QuestionStore,
};
pub use service::{ConsultationService, ImageUpload, Ports, WorkflowSettings};
