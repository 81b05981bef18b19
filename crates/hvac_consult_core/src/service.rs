//! crates/hvac_consult_core/src/service.rs
//!
//! The consultation workflow. Every operation a client can invoke lives here,
//! expressed against the ports so the same logic runs over PostgreSQL or the
//! in-memory store.
//!
//! Writes are compare-and-swap on the record's `version`: an operation loads
//! the record, validates the transition on that snapshot, applies it, and only
//! persists if nobody else wrote in between. Otherwise it reloads and tries
//! again, so the image cap and duplicate checks hold under concurrent uploads.

use crate::answers::{validate_answers, RawAnswers};
use crate::catalog::{default_categories, default_questions};
use crate::discount::{self, DiscountOutcome, DiscountPolicy, DiscountSummary};
use crate::domain::{
    Consultation, ConsultationImage, ConsultationStatus, ImageAnalysis, ImageCategory,
    ImageOcrResult, PricingEstimate, ProgressFlags, Question,
};
use crate::error::{ConsultError, ConsultResult, ValidationError};
use crate::ports::{
    CategoryStore, ConsultationStore, ExtractionService, ObjectStorage, OcrService, QuestionStore,
};
use crate::pricing::PricingTable;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

//=========================================================================================
// Settings, Inputs and Outputs
//=========================================================================================

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub max_images: usize,
    pub max_upload_bytes: usize,
    pub discount_policy: DiscountPolicy,
    /// Attempts per write before a lost version race becomes `Conflict`.
    /// Should exceed `max_images`, since each lost upload race means another
    /// upload was stored.
    pub max_write_attempts: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_images: 7,
            max_upload_bytes: 10 * 1024 * 1024,
            discount_policy: DiscountPolicy::default(),
            max_write_attempts: 10,
        }
    }
}

/// The collaborators the workflow talks to.
#[derive(Clone)]
pub struct Ports {
    pub consultations: Arc<dyn ConsultationStore>,
    pub questions: Arc<dyn QuestionStore>,
    pub categories: Arc<dyn CategoryStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub ocr: Arc<dyn OcrService>,
    pub extractor: Arc<dyn ExtractionService>,
}

/// A photo as received from the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub category: String,
    pub sub_category: String,
    pub original_filename: Option<String>,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub image_url: String,
    pub image_number: u32,
    pub completed_categories: Vec<String>,
    pub total_discount: i64,
    pub remaining_images: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationDetails {
    pub consultation: Consultation,
    pub discount: DiscountSummary,
    pub progress: ProgressFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedReport {
    pub inserted: usize,
    pub skipped: bool,
    pub message: String,
}

//=========================================================================================
// Upload Preconditions
//=========================================================================================

const UPLOADABLE: [ConsultationStatus; 3] = [
    ConsultationStatus::AnswersSubmitted,
    ConsultationStatus::EstimateReady,
    ConsultationStatus::ImagesUploaded,
];

const ANALYZABLE: [ConsultationStatus; 3] = [
    ConsultationStatus::ImagesUploaded,
    ConsultationStatus::EstimateReady,
    ConsultationStatus::Completed,
];

/// Checks every upload precondition against a snapshot of the record.
pub fn check_upload(
    consultation: &Consultation,
    registry: &[ImageCategory],
    upload: &ImageUpload,
    settings: &WorkflowSettings,
) -> Result<(), ValidationError> {
    if !UPLOADABLE.contains(&consultation.status) {
        return Err(ValidationError::PrematureUpload(consultation.status.to_string()));
    }
    if consultation.images.len() >= settings.max_images {
        return Err(ValidationError::ImageLimit(settings.max_images));
    }
    let known = registry
        .iter()
        .find(|cat| cat.category == upload.category)
        .is_some_and(|cat| cat.has_sub_category(&upload.sub_category));
    if !known {
        return Err(ValidationError::InvalidCategory {
            category: upload.category.clone(),
            sub_category: upload.sub_category.clone(),
        });
    }
    if consultation.has_image(&upload.category, &upload.sub_category) {
        return Err(ValidationError::DuplicateCategory {
            category: upload.category.clone(),
            sub_category: upload.sub_category.clone(),
        });
    }
    if !upload.content_type.starts_with("image/") {
        return Err(ValidationError::InvalidFileType(upload.content_type.clone()));
    }
    if upload.data.len() > settings.max_upload_bytes {
        return Err(ValidationError::FileTooLarge {
            size: upload.data.len(),
            limit: settings.max_upload_bytes,
        });
    }
    Ok(())
}

fn file_extension(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        _ => "img",
    }
}

//=========================================================================================
// The Service
//=========================================================================================

pub struct ConsultationService {
    ports: Ports,
    pricing: PricingTable,
    settings: WorkflowSettings,
}

impl ConsultationService {
    pub fn new(ports: Ports, pricing: PricingTable, settings: WorkflowSettings) -> Self {
        Self {
            ports,
            pricing,
            settings,
        }
    }

    /// Loads, mutates and conditionally replaces a record, retrying on
    /// version conflicts. `apply` runs against a fresh snapshot each attempt.
    async fn mutate<T, F>(&self, session_id: Uuid, mut apply: F) -> ConsultResult<(Consultation, T)>
    where
        F: FnMut(&mut Consultation) -> ConsultResult<T> + Send,
        T: Send,
    {
        let attempts = self.settings.max_write_attempts.max(1);
        for attempt in 1..=attempts {
            let mut consultation = self.ports.consultations.get_consultation(session_id).await?;
            let expected = consultation.version;
            let output = apply(&mut consultation)?;
            consultation.version = expected + 1;
            consultation.updated_at = Utc::now();
            if self
                .ports
                .consultations
                .replace_consultation(&consultation, expected)
                .await?
            {
                return Ok((consultation, output));
            }
            debug!(
                "Version conflict on session {} (attempt {}/{})",
                session_id, attempt, attempts
            );
        }
        Err(ConsultError::Conflict(format!(
            "Consultation {} is being modified concurrently, please retry",
            session_id
        )))
    }

    // --- Sessions ---

    pub async fn create_session(&self) -> ConsultResult<Consultation> {
        let consultation = Consultation::new(Uuid::new_v4());
        self.ports
            .consultations
            .insert_consultation(&consultation)
            .await?;
        info!("Created consultation session {}", consultation.session_id);
        Ok(consultation)
    }

    /// A page of consultations, newest first.
    pub async fn list_consultations(
        &self,
        skip: usize,
        limit: usize,
    ) -> ConsultResult<Vec<Consultation>> {
        Ok(self
            .ports
            .consultations
            .list_consultations(skip, limit)
            .await?)
    }

    pub async fn get_consultation(&self, session_id: Uuid) -> ConsultResult<Consultation> {
        Ok(self.ports.consultations.get_consultation(session_id).await?)
    }

    /// Deletes a consultation, then its stored photos. Returns how many
    /// photos the record referenced.
    pub async fn delete_consultation(&self, session_id: Uuid) -> ConsultResult<usize> {
        let consultation = self.ports.consultations.get_consultation(session_id).await?;
        self.ports
            .consultations
            .delete_consultation(session_id)
            .await?;
        for image in &consultation.images {
            if let Err(e) = self.ports.storage.delete(&image.storage_key).await {
                warn!("Failed to delete {} of session {}: {}", image.storage_key, session_id, e);
            }
        }
        info!(
            "Deleted consultation {} with {} images",
            session_id,
            consultation.images.len()
        );
        Ok(consultation.images.len())
    }

    pub async fn get_details(&self, session_id: Uuid) -> ConsultResult<ConsultationDetails> {
        let consultation = self.ports.consultations.get_consultation(session_id).await?;
        let registry = self.ports.categories.list_categories().await?;
        let discount = discount::summarize(&registry, &consultation.images);
        Ok(ConsultationDetails {
            progress: consultation.progress(),
            consultation,
            discount,
        })
    }

    // --- Quiz ---

    pub async fn list_questions(&self) -> ConsultResult<Vec<Question>> {
        Ok(self.ports.questions.list_questions().await?)
    }

    /// Inserts the default quiz, but only into an empty catalog.
    pub async fn seed_questions(&self) -> ConsultResult<SeedReport> {
        let existing = self.ports.questions.list_questions().await?;
        if !existing.is_empty() {
            return Ok(SeedReport {
                inserted: 0,
                skipped: true,
                message: format!(
                    "Questions already exist ({} questions found). Skipping seed operation.",
                    existing.len()
                ),
            });
        }
        let questions = default_questions();
        self.ports.questions.insert_questions(&questions).await?;
        info!("Seeded {} quiz questions", questions.len());
        Ok(SeedReport {
            inserted: questions.len(),
            skipped: false,
            message: format!("Successfully seeded {} questions", questions.len()),
        })
    }

    /// Validates and stores a full answer set, replacing any earlier one.
    pub async fn submit_answers(
        &self,
        session_id: Uuid,
        raw: &RawAnswers,
    ) -> ConsultResult<Consultation> {
        // Fail fast on unknown sessions before touching the catalog.
        self.ports.consultations.get_consultation(session_id).await?;
        let questions = self.ports.questions.list_questions().await?;
        let answers = validate_answers(&questions, raw)?;

        let (consultation, ()) = self
            .mutate(session_id, |c| {
                c.quiz_answers = answers.clone();
                c.status = ConsultationStatus::AnswersSubmitted;
                Ok(())
            })
            .await?;
        info!(
            "Stored {} answers for session {}",
            consultation.quiz_answers.len(),
            session_id
        );
        Ok(consultation)
    }

    // --- Categories ---

    pub async fn list_categories(&self) -> ConsultResult<Vec<ImageCategory>> {
        Ok(self.ports.categories.list_categories().await?)
    }

    /// Upserts the five default categories.
    pub async fn seed_categories(&self) -> ConsultResult<Vec<ImageCategory>> {
        let categories = default_categories();
        for category in &categories {
            self.ports.categories.upsert_category(category).await?;
        }
        info!("Seeded {} image categories", categories.len());
        Ok(categories)
    }

    /// Seeds the quiz and the category registry when either is empty.
    /// A registry that already has entries is left as the admin shaped it.
    pub async fn seed_defaults(&self) -> ConsultResult<()> {
        self.seed_questions().await?;
        if self.ports.categories.list_categories().await?.is_empty() {
            self.seed_categories().await?;
        }
        Ok(())
    }

    /// Replaces or inserts a category. The path key always wins over the body.
    pub async fn upsert_category(
        &self,
        key: &str,
        mut category: ImageCategory,
    ) -> ConsultResult<bool> {
        if category.discount_amount < 0 {
            return Err(ValidationError::NegativeDiscount {
                category: key.to_string(),
                amount: category.discount_amount,
            }
            .into());
        }
        category.category = key.to_string();
        let inserted = self.ports.categories.upsert_category(&category).await?;
        info!("Upserted image category '{}' (inserted: {})", key, inserted);
        Ok(inserted)
    }

    // --- Images ---

    pub async fn upload_image(
        &self,
        session_id: Uuid,
        upload: ImageUpload,
    ) -> ConsultResult<UploadReceipt> {
        let snapshot = self.ports.consultations.get_consultation(session_id).await?;
        let registry = self.ports.categories.list_categories().await?;
        check_upload(&snapshot, &registry, &upload, &self.settings)?;

        let storage_key = format!(
            "{}/{}/{}-{}.{}",
            snapshot.id,
            upload.category,
            upload.sub_category,
            Uuid::new_v4(),
            file_extension(&upload.content_type)
        );
        let image_url = self
            .ports
            .storage
            .upload(&storage_key, upload.data.clone(), &upload.content_type)
            .await?;

        let result = self
            .mutate(session_id, |c| {
                check_upload(c, &registry, &upload, &self.settings)?;
                let image_number = c.images.len() as u32 + 1;
                c.images.push(ConsultationImage {
                    image_number,
                    image_url: image_url.clone(),
                    original_filename: upload.original_filename.clone(),
                    category: upload.category.clone(),
                    sub_category: upload.sub_category.clone(),
                    content_type: upload.content_type.clone(),
                    created_at: Utc::now(),
                    storage_key: storage_key.clone(),
                });
                discount::recompute(c, &registry);
                if c.status != ConsultationStatus::EstimateReady {
                    c.status = ConsultationStatus::ImagesUploaded;
                }
                Ok(image_number)
            })
            .await;

        let (consultation, image_number) = match result {
            Ok(done) => done,
            Err(e) => {
                if let Err(cleanup) = self.ports.storage.delete(&storage_key).await {
                    warn!("Failed to delete orphaned upload {}: {}", storage_key, cleanup);
                }
                return Err(e);
            }
        };

        info!(
            "Session {} uploaded {}/{} (image {}, discount now {})",
            session_id,
            upload.category,
            upload.sub_category,
            image_number,
            consultation.total_discount
        );
        Ok(UploadReceipt {
            image_url,
            image_number,
            completed_categories: consultation.completed_categories.clone(),
            total_discount: consultation.total_discount,
            remaining_images: self
                .settings
                .max_images
                .saturating_sub(consultation.images.len()),
        })
    }

    // --- Estimate & Discount ---

    /// Prices the consultation from its quiz answers. The estimate itself
    /// never fails; only a missing session or missing answers do.
    pub async fn generate_estimate(&self, session_id: Uuid) -> ConsultResult<PricingEstimate> {
        let pricing = &self.pricing;
        let (_, estimate) = self
            .mutate(session_id, |c| {
                if c.status == ConsultationStatus::Completed {
                    return Err(ValidationError::EstimateClosed(c.status.to_string()).into());
                }
                if c.quiz_answers.is_empty() {
                    return Err(ValidationError::MissingAnswers.into());
                }
                if c.original_pricing_estimate.is_some() {
                    return Err(ConsultError::Conflict(
                        "Estimate is locked because a discount has been applied".to_string(),
                    ));
                }
                let estimate = pricing.estimate_from_answers(&c.quiz_answers);
                c.pricing_estimate = Some(estimate.clone());
                c.status = ConsultationStatus::EstimateReady;
                Ok(estimate)
            })
            .await?;
        info!(
            "Generated estimate for session {} ({} tons, {} systems)",
            session_id, estimate.tonnage, estimate.system_count
        );
        Ok(estimate)
    }

    pub async fn apply_discount_once(&self, session_id: Uuid) -> ConsultResult<DiscountOutcome> {
        let policy = self.settings.discount_policy;
        let (_, outcome) = self
            .mutate(session_id, |c| discount::apply_once(c, policy))
            .await?;
        if outcome.applied {
            info!("Applied ${} discount to session {}", outcome.discount, session_id);
        } else {
            info!("No discount earned yet for session {}", session_id);
        }
        Ok(outcome)
    }

    // --- Analysis ---

    /// OCRs every stored image in turn, extracts nameplate data from the
    /// combined text and stores the result on the consultation. A failure on
    /// one image is recorded in its result and does not fail the batch.
    pub async fn analyze_images(&self, session_id: Uuid) -> ConsultResult<ImageAnalysis> {
        let consultation = self.ports.consultations.get_consultation(session_id).await?;
        if !ANALYZABLE.contains(&consultation.status) {
            return Err(ValidationError::PrematureAnalysis(consultation.status.to_string()).into());
        }
        if consultation.images.is_empty() {
            return Err(ValidationError::NoImages.into());
        }

        let mut results = Vec::with_capacity(consultation.images.len());
        for image in &consultation.images {
            results.push(self.ocr_image(image).await);
        }

        let combined_text = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.text_detected.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let extraction = if combined_text.trim().is_empty() {
            Default::default()
        } else {
            self.ports.extractor.extract_hvac_info(&combined_text).await?
        };
        if let Some(e) = &extraction.parse_error {
            warn!("Extraction reply for session {} was not usable: {}", session_id, e);
        }

        let analysis = ImageAnalysis {
            combined_text,
            total_images_analyzed: results.len(),
            individual_results: results,
            hvac_info: extraction.info,
            extraction_error: extraction.parse_error,
            analyzed_at: Utc::now(),
        };
        self.mutate(session_id, |c| {
            c.image_analysis = Some(analysis.clone());
            Ok(())
        })
        .await?;
        info!(
            "Analyzed {} images for session {}",
            analysis.total_images_analyzed, session_id
        );
        Ok(analysis)
    }

    async fn ocr_image(&self, image: &ConsultationImage) -> ImageOcrResult {
        let failed = |error: String| ImageOcrResult {
            image_number: image.image_number,
            storage_key: image.storage_key.clone(),
            success: false,
            text_detected: String::new(),
            confidence: 0.0,
            error: Some(error),
        };

        let bytes = match self.ports.storage.download(&image.storage_key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not download {}: {}", image.storage_key, e);
                return failed(format!("Download failed: {}", e));
            }
        };
        match self.ports.ocr.detect_text(&bytes).await {
            Ok(detected) if !detected.text.trim().is_empty() => ImageOcrResult {
                image_number: image.image_number,
                storage_key: image.storage_key.clone(),
                success: true,
                text_detected: detected.text,
                confidence: detected.confidence,
                error: None,
            },
            Ok(_) => failed("No text found in image".to_string()),
            Err(e) => {
                warn!("OCR failed for {}: {}", image.storage_key, e);
                failed(e.to_string())
            }
        }
    }
}
