//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the consultation workflow endpoints and the
//! master definition for the OpenAPI specification.

use crate::error::HttpError;
use crate::web::{admin, catalog};
use crate::web::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use hvac_consult_core::answers::RawAnswers;
use hvac_consult_core::discount::DiscountSummary;
use hvac_consult_core::domain::{
    Consultation, HvacInfo, ImageOcrResult, PricingEstimate, ProgressFlags,
};
use hvac_consult_core::ImageUpload;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_session_handler,
        submit_answers_handler,
        upload_image_handler,
        details_handler,
        generate_estimate_handler,
        apply_discount_handler,
        analyze_images_handler,
        health_handler,
        catalog::list_questions_handler,
        catalog::seed_questions_handler,
        catalog::list_categories_handler,
        catalog::seed_categories_handler,
        catalog::upsert_category_handler,
        admin::list_consultations_handler,
        admin::get_consultation_handler,
        admin::delete_consultation_handler,
    ),
    components(
        schemas(
            SessionResponse,
            AnswersResponse,
            UploadResponse,
            DetailsResponse,
            EstimateResponse,
            DiscountResponse,
            AnalysisResponse,
            AnalysisResults,
            catalog::SeedResponse,
            catalog::SeededCategoriesResponse,
            catalog::CategoryPayload,
            catalog::UpsertCategoryResponse,
            admin::ConsultationListResponse,
            admin::ConsultationResponse,
            admin::DeleteConsultationResponse,
        )
    ),
    tags(
        (name = "HVAC Consultation API", description = "Quiz, photo upload, estimate and discount endpoints for HVAC consultations.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The response payload sent after successfully creating a session.
#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub session_id: Uuid,
    #[schema(value_type = Object)]
    pub consultation: Consultation,
}

#[derive(Serialize, ToSchema)]
pub struct AnswersResponse {
    pub message: String,
    #[schema(value_type = Object)]
    pub consultation: Consultation,
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub image_url: String,
    pub image_number: u32,
    pub completed_categories: Vec<String>,
    pub total_discount: i64,
    pub remaining_images: usize,
}

#[derive(Serialize, ToSchema)]
pub struct DetailsResponse {
    #[schema(value_type = Object)]
    pub consultation: Consultation,
    #[schema(value_type = Object)]
    pub discount: DiscountSummary,
    #[schema(value_type = Object)]
    pub progress: ProgressFlags,
}

#[derive(Serialize, ToSchema)]
pub struct EstimateResponse {
    pub message: String,
    pub session_id: Uuid,
    #[schema(value_type = Object)]
    pub estimate: PricingEstimate,
}

#[derive(Serialize, ToSchema)]
pub struct DiscountResponse {
    pub message: String,
    pub applied: bool,
    pub discount: i64,
    #[schema(value_type = Object)]
    pub estimate: PricingEstimate,
    #[schema(value_type = Option<Object>)]
    pub original_estimate: Option<PricingEstimate>,
}

#[derive(Serialize, ToSchema)]
pub struct AnalysisResults {
    pub combined_text: String,
    pub total_images: usize,
    #[schema(value_type = Vec<Object>)]
    pub individual_results: Vec<ImageOcrResult>,
    #[schema(value_type = Object)]
    pub hvac_info: HvacInfo,
    pub extraction_error: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AnalysisResponse {
    pub message: String,
    pub session_id: Uuid,
    pub results: AnalysisResults,
}

//=========================================================================================
// Request Helpers
//=========================================================================================

/// An id that does not parse cannot name an existing consultation.
pub(crate) fn parse_session_id(raw: &str) -> Result<Uuid, HttpError> {
    Uuid::parse_str(raw).map_err(|_| {
        HttpError::new(
            StatusCode::NOT_FOUND,
            format!("Consultation {} not found", raw),
        )
    })
}

/// Reads the `category`, `sub_category` and `file` parts of an upload form.
async fn read_upload(mut multipart: Multipart) -> Result<ImageUpload, HttpError> {
    let mut category = None;
    let mut sub_category = None;
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HttpError::new(e.status(), format!("Failed to read multipart data: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("category") => {
                category = Some(field.text().await.map_err(|e| {
                    HttpError::bad_request(format!("Failed to read category: {}", e))
                })?)
            }
            Some("sub_category") => {
                sub_category = Some(field.text().await.map_err(|e| {
                    HttpError::bad_request(format!("Failed to read sub_category: {}", e))
                })?)
            }
            Some("file") => {
                let original_filename = field.file_name().map(str::to_string);
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(|e| {
                    HttpError::new(e.status(), format!("Failed to read file bytes: {}", e))
                })?;
                file = Some((original_filename, content_type, data));
            }
            _ => {}
        }
    }

    let (original_filename, content_type, data) =
        file.ok_or_else(|| HttpError::bad_request("Multipart form must include a file"))?;
    Ok(ImageUpload {
        category: category
            .ok_or_else(|| HttpError::bad_request("Multipart form must include a category"))?,
        sub_category: sub_category.ok_or_else(|| {
            HttpError::bad_request("Multipart form must include a sub_category")
        })?,
        original_filename,
        content_type,
        data,
    })
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Create a new consultation session.
#[utoipa::path(
    post,
    path = "/session",
    responses(
        (status = 201, description = "Session created successfully", body = SessionResponse),
        (status = 502, description = "The store could not be reached")
    )
)]
pub async fn create_session_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let consultation = app_state.service.create_session().await?;
    let response = SessionResponse {
        session_id: consultation.session_id,
        consultation,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Submit the full set of quiz answers, keyed by question id.
///
/// A new submission replaces any earlier one.
#[utoipa::path(
    post,
    path = "/consultation/{session_id}/submit-answers",
    request_body(content_type = "application/json", description = "A JSON object mapping question id to answer."),
    responses(
        (status = 200, description = "Answers stored", body = AnswersResponse),
        (status = 400, description = "An answer is missing or invalid"),
        (status = 404, description = "Consultation not found")
    ),
    params(("session_id" = Uuid, Path, description = "The consultation session id."))
)]
pub async fn submit_answers_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    payload: Result<Json<RawAnswers>, JsonRejection>,
) -> Result<Json<AnswersResponse>, HttpError> {
    let session_id = parse_session_id(&session_id)?;
    let Json(answers) = payload.map_err(|e| HttpError::bad_request(e.body_text()))?;
    let consultation = app_state.service.submit_answers(session_id, &answers).await?;
    Ok(Json(AnswersResponse {
        message: "Answers submitted successfully".to_string(),
        consultation,
    }))
}

/// Upload one categorized photo.
#[utoipa::path(
    post,
    path = "/consultation/{session_id}/images",
    request_body(content_type = "multipart/form-data", description = "Parts `category`, `sub_category` and `file`."),
    responses(
        (status = 200, description = "Image stored", body = UploadResponse),
        (status = 400, description = "The upload was rejected"),
        (status = 404, description = "Consultation not found"),
        (status = 409, description = "Concurrent modification, retry")
    ),
    params(("session_id" = Uuid, Path, description = "The consultation session id."))
)]
pub async fn upload_image_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, HttpError> {
    let session_id = parse_session_id(&session_id)?;
    let upload = read_upload(multipart).await?;
    let receipt = app_state.service.upload_image(session_id, upload).await?;
    Ok(Json(UploadResponse {
        message: "Image uploaded successfully".to_string(),
        image_url: receipt.image_url,
        image_number: receipt.image_number,
        completed_categories: receipt.completed_categories,
        total_discount: receipt.total_discount,
        remaining_images: receipt.remaining_images,
    }))
}

/// Fetch a consultation with its discount progress.
#[utoipa::path(
    get,
    path = "/consultation/{session_id}/details",
    responses(
        (status = 200, description = "The consultation", body = DetailsResponse),
        (status = 404, description = "Consultation not found")
    ),
    params(("session_id" = Uuid, Path, description = "The consultation session id."))
)]
pub async fn details_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<DetailsResponse>, HttpError> {
    let session_id = parse_session_id(&session_id)?;
    let details = app_state.service.get_details(session_id).await?;
    Ok(Json(DetailsResponse {
        consultation: details.consultation,
        discount: details.discount,
        progress: details.progress,
    }))
}

/// Generate the Good-Better-Best estimate from the stored quiz answers.
#[utoipa::path(
    post,
    path = "/consultation/{session_id}/generate-estimate",
    responses(
        (status = 200, description = "Estimate generated", body = EstimateResponse),
        (status = 400, description = "No quiz answers yet"),
        (status = 404, description = "Consultation not found"),
        (status = 409, description = "A discount has already been applied")
    ),
    params(("session_id" = Uuid, Path, description = "The consultation session id."))
)]
pub async fn generate_estimate_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<EstimateResponse>, HttpError> {
    let session_id = parse_session_id(&session_id)?;
    let estimate = app_state.service.generate_estimate(session_id).await?;
    Ok(Json(EstimateResponse {
        message: "Good-Better-Best pricing estimate generated successfully".to_string(),
        session_id,
        estimate,
    }))
}

/// Apply the earned photo discount to the estimate. Works once per consultation.
#[utoipa::path(
    post,
    path = "/consultation/{session_id}/apply-discount",
    responses(
        (status = 200, description = "Discount applied, or nothing earned yet", body = DiscountResponse),
        (status = 400, description = "No estimate yet"),
        (status = 404, description = "Consultation not found"),
        (status = 409, description = "The discount was already applied")
    ),
    params(("session_id" = Uuid, Path, description = "The consultation session id."))
)]
pub async fn apply_discount_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<DiscountResponse>, HttpError> {
    let session_id = parse_session_id(&session_id)?;
    let outcome = app_state.service.apply_discount_once(session_id).await?;
    let message = if outcome.applied {
        format!("Applied a ${} discount to the estimate", outcome.discount)
    } else {
        "No discount has been earned yet".to_string()
    };
    Ok(Json(DiscountResponse {
        message,
        applied: outcome.applied,
        discount: outcome.discount,
        estimate: outcome.estimate,
        original_estimate: outcome.original_estimate,
    }))
}

/// OCR every uploaded photo and extract the equipment nameplate details.
#[utoipa::path(
    post,
    path = "/consultation/{session_id}/analyze-all",
    responses(
        (status = 200, description = "Analysis completed", body = AnalysisResponse),
        (status = 400, description = "No images to analyze"),
        (status = 404, description = "Consultation not found"),
        (status = 502, description = "The extraction service failed")
    ),
    params(("session_id" = Uuid, Path, description = "The consultation session id."))
)]
pub async fn analyze_images_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<AnalysisResponse>, HttpError> {
    let session_id = parse_session_id(&session_id)?;
    let analysis = app_state.service.analyze_images(session_id).await?;
    Ok(Json(AnalysisResponse {
        message: "Analysis completed successfully".to_string(),
        session_id,
        results: AnalysisResults {
            combined_text: analysis.combined_text,
            total_images: analysis.total_images_analyzed,
            individual_results: analysis.individual_results,
            hvac_info: analysis.hvac_info,
            extraction_error: analysis.extraction_error,
        },
    }))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "The service is up"))
)]
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
