//! Shared fixtures for the integration tests: an in-memory workflow wired to
//! local file storage in a temporary directory, with scripted OCR and
//! extraction collaborators.

#![allow(dead_code)]

use api_lib::adapters::{InMemoryStore, LocalObjectStorage};
use api_lib::config::Config;
use api_lib::web::state::AppState;
use async_trait::async_trait;
use bytes::Bytes;
use hvac_consult_core::answers::RawAnswers;
use hvac_consult_core::domain::{Consultation, HvacInfo, InputType};
use hvac_consult_core::pricing::PricingTable;
use hvac_consult_core::{
    ConsultationService, ConsultationStore, DetectedText, Extraction, ExtractionService,
    ImageUpload, OcrService, PortError, PortResult, Ports, WorkflowSettings,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tracing::Level;

/// Every photo the default registry asks for, in registry order.
pub const ALL_SLOTS: [(&str, &str); 7] = [
    ("outdoor_unit", "big_picture"),
    ("outdoor_unit", "data_plate"),
    ("power_hub", "panel_cover"),
    ("power_hub", "inside_panel"),
    ("command_center", "main_thermostat"),
    ("indoor_system", "indoor_unit"),
    ("energy_bill", "recent_bill"),
];

//=========================================================================================
// Scripted Collaborators
//=========================================================================================

/// Reads the image bytes back as text. Images starting with `FAIL` make the
/// call fail and images starting with `BLANK` contain no text.
pub struct ScriptedOcr;

#[async_trait]
impl OcrService for ScriptedOcr {
    async fn detect_text(&self, image: &[u8]) -> PortResult<DetectedText> {
        if image.starts_with(b"FAIL") {
            return Err(PortError::Unexpected("Vision API error: Bad image data.".to_string()));
        }
        if image.starts_with(b"BLANK") {
            return Ok(DetectedText {
                text: String::new(),
                confidence: 0.0,
            });
        }
        Ok(DetectedText {
            text: String::from_utf8_lossy(image).into_owned(),
            confidence: 0.9,
        })
    }
}

/// Finds a brand when the text mentions GOODMAN and counts its invocations.
#[derive(Default)]
pub struct ScriptedExtractor {
    pub calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionService for ScriptedExtractor {
    async fn extract_hvac_info(&self, text: &str) -> PortResult<Extraction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let info = HvacInfo {
            brand: text.contains("GOODMAN").then(|| "GOODMAN".to_string()),
            model_number: text.contains("CKJ60-1").then(|| "CKJ60-1".to_string()),
            ..Default::default()
        };
        Ok(Extraction {
            info,
            parse_error: None,
        })
    }
}

/// A write made by someone else just before a forced version conflict.
pub type Interloper = Box<dyn Fn(&mut Consultation) + Send + Sync>;

/// Wraps the in-memory store and makes the next `replace_consultation` calls
/// lose their version race. Before each lost race the optional interloper
/// edits the stored record, as a competing writer would.
pub struct ContendedStore {
    inner: Arc<InMemoryStore>,
    lost_races: AtomicUsize,
    interloper: Mutex<Option<Interloper>>,
    pub replace_calls: AtomicUsize,
}

impl ContendedStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            lost_races: AtomicUsize::new(0),
            interloper: Mutex::new(None),
            replace_calls: AtomicUsize::new(0),
        }
    }

    pub fn lose_next(&self, races: usize) {
        self.lost_races.store(races, Ordering::SeqCst);
    }

    pub fn interfere_with(&self, interloper: Interloper) {
        *self.interloper.lock().unwrap() = Some(interloper);
    }

    pub fn replace_calls(&self) -> usize {
        self.replace_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConsultationStore for ContendedStore {
    async fn insert_consultation(&self, consultation: &Consultation) -> PortResult<()> {
        self.inner.insert_consultation(consultation).await
    }

    async fn get_consultation(&self, session_id: uuid::Uuid) -> PortResult<Consultation> {
        self.inner.get_consultation(session_id).await
    }

    async fn replace_consultation(
        &self,
        consultation: &Consultation,
        expected_version: i64,
    ) -> PortResult<bool> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        let lose = self
            .lost_races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !lose {
            return self
                .inner
                .replace_consultation(consultation, expected_version)
                .await;
        }
        // The competing write bumps the version whether or not it edits anything.
        let mut stored = self.inner.get_consultation(consultation.session_id).await?;
        {
            let interloper = self.interloper.lock().unwrap();
            if let Some(edit) = interloper.as_ref() {
                edit(&mut stored);
            }
        }
        let current = stored.version;
        stored.version += 1;
        self.inner.replace_consultation(&stored, current).await?;
        Ok(false)
    }

    async fn list_consultations(&self, skip: usize, limit: usize) -> PortResult<Vec<Consultation>> {
        self.inner.list_consultations(skip, limit).await
    }

    async fn delete_consultation(&self, session_id: uuid::Uuid) -> PortResult<()> {
        self.inner.delete_consultation(session_id).await
    }
}

//=========================================================================================
// Harness
//=========================================================================================

pub struct Harness {
    pub service: Arc<ConsultationService>,
    pub store: Arc<InMemoryStore>,
    pub storage: Arc<LocalObjectStorage>,
    pub extractor: Arc<ScriptedExtractor>,
    pub config: Arc<Config>,
    /// Keeps the upload directory alive for the lifetime of the harness.
    pub upload_dir: TempDir,
}

impl Harness {
    pub fn app_state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            service: self.service.clone(),
            config: self.config.clone(),
        })
    }
}

fn test_config(upload_dir: &TempDir, settings: &WorkflowSettings) -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: None,
        log_level: Level::INFO,
        upload_dir: upload_dir.path().to_path_buf(),
        public_base_url: "http://localhost:3000".to_string(),
        cors_origin: "*".to_string(),
        openai_api_key: "test-openai-key".to_string(),
        extraction_model: "gpt-4o".to_string(),
        google_vision_api_key: "test-vision-key".to_string(),
        max_images: settings.max_images,
        max_upload_bytes: settings.max_upload_bytes,
        external_timeout: Duration::from_secs(5),
        discount_lock_on_zero: settings.discount_policy.lock_on_zero,
        max_write_attempts: settings.max_write_attempts,
    }
}

/// A fully seeded workflow with default settings.
pub async fn harness() -> Harness {
    harness_with(WorkflowSettings::default()).await
}

pub async fn harness_with(settings: WorkflowSettings) -> Harness {
    harness_over(settings, |store| -> Arc<dyn ConsultationStore> { store }).await
}

/// A seeded workflow whose consultation records go through `wrap`.
pub async fn harness_over<F>(settings: WorkflowSettings, wrap: F) -> Harness
where
    F: FnOnce(Arc<InMemoryStore>) -> Arc<dyn ConsultationStore>,
{
    let upload_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let storage = Arc::new(LocalObjectStorage::new(
        upload_dir.path(),
        "http://localhost:3000",
    ));
    let extractor = Arc::new(ScriptedExtractor::default());
    let config = Arc::new(test_config(&upload_dir, &settings));

    let ports = Ports {
        consultations: wrap(store.clone()),
        questions: store.clone(),
        categories: store.clone(),
        storage: storage.clone(),
        ocr: Arc::new(ScriptedOcr),
        extractor: extractor.clone(),
    };
    let service = Arc::new(ConsultationService::new(
        ports,
        PricingTable::standard(),
        settings,
    ));
    service.seed_defaults().await.unwrap();

    Harness {
        service,
        store,
        storage,
        extractor,
        config,
        upload_dir,
    }
}

//=========================================================================================
// Request Builders
//=========================================================================================

/// A complete, valid answer set for the seeded quiz: 1,500 - 2,200 sq ft and one system.
pub async fn valid_answers(service: &ConsultationService) -> RawAnswers {
    let questions = service.list_questions().await.unwrap();
    questions
        .into_iter()
        .map(|q| {
            let text = q.question_text.to_lowercase();
            let first = q
                .options
                .as_ref()
                .and_then(|o| o.first())
                .cloned()
                .unwrap_or_default();
            let value = match q.input_type {
                InputType::Text => json!("Jane Doe"),
                InputType::Email => json!("jane@example.com"),
                InputType::Tel => json!("555-0100"),
                InputType::Number => json!(3),
                InputType::Radio if text.contains("square footage") => {
                    json!("1,500 - 2,200 sq ft")
                }
                InputType::Radio if text.contains("how many separate systems") => json!("1"),
                InputType::Radio => json!(first),
                InputType::Checkbox => json!([first]),
            };
            (q.id.to_string(), value)
        })
        .collect()
}

pub fn photo(category: &str, sub_category: &str, body: &'static [u8]) -> ImageUpload {
    ImageUpload {
        category: category.to_string(),
        sub_category: sub_category.to_string(),
        original_filename: Some(format!("{}.jpg", sub_category)),
        content_type: "image/jpeg".to_string(),
        data: Bytes::from_static(body),
    }
}

/// Creates a session and submits valid answers, returning its id.
pub async fn answered_session(service: &ConsultationService) -> uuid::Uuid {
    let session_id = service.create_session().await.unwrap().session_id;
    let answers = valid_answers(service).await;
    service.submit_answers(session_id, &answers).await.unwrap();
    session_id
}

/// A seeded workflow whose consultation writes can be made to lose races.
pub async fn contended_harness(settings: WorkflowSettings) -> (Harness, Arc<ContendedStore>) {
    let mut contended = None;
    let h = harness_over(settings, |store| -> Arc<dyn ConsultationStore> {
        let wrapped = Arc::new(ContendedStore::new(store));
        contended = Some(wrapped.clone());
        wrapped
    })
    .await;
    (h, contended.unwrap())
}
