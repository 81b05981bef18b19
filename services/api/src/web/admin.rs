//! services/api/src/web/admin.rs
//!
//! Handlers for browsing and removing consultations.

use crate::error::HttpError;
use crate::web::rest::parse_session_id;
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use hvac_consult_core::domain::Consultation;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    /// Records to skip. Defaults to 0.
    pub skip: Option<usize>,
    /// Page size. Defaults to 100.
    pub limit: Option<usize>,
}

#[derive(Serialize, ToSchema)]
pub struct ConsultationListResponse {
    #[schema(value_type = Vec<Object>)]
    pub consultations: Vec<Consultation>,
    pub total: usize,
}

#[derive(Serialize, ToSchema)]
pub struct ConsultationResponse {
    #[schema(value_type = Object)]
    pub consultation: Consultation,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteConsultationResponse {
    pub message: String,
    pub consultation_id: Uuid,
    pub deleted_images: usize,
}

/// List consultations, newest first.
#[utoipa::path(
    get,
    path = "/admin/consultations",
    params(PageParams),
    responses((status = 200, description = "A page of consultations", body = ConsultationListResponse))
)]
pub async fn list_consultations_handler(
    State(app_state): State<Arc<AppState>>,
    Query(page): Query<PageParams>,
) -> Result<Json<ConsultationListResponse>, HttpError> {
    let consultations = app_state
        .service
        .list_consultations(
            page.skip.unwrap_or(0),
            page.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(ConsultationListResponse {
        total: consultations.len(),
        consultations,
    }))
}

/// Fetch one consultation as stored.
#[utoipa::path(
    get,
    path = "/admin/consultations/{session_id}",
    responses(
        (status = 200, description = "The consultation", body = ConsultationResponse),
        (status = 404, description = "Consultation not found")
    ),
    params(("session_id" = Uuid, Path, description = "The consultation session id."))
)]
pub async fn get_consultation_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<ConsultationResponse>, HttpError> {
    let session_id = parse_session_id(&session_id)?;
    let consultation = app_state.service.get_consultation(session_id).await?;
    Ok(Json(ConsultationResponse { consultation }))
}

/// Delete a consultation and its uploaded photos.
#[utoipa::path(
    delete,
    path = "/admin/consultations/{session_id}",
    responses(
        (status = 200, description = "Consultation deleted", body = DeleteConsultationResponse),
        (status = 404, description = "Consultation not found")
    ),
    params(("session_id" = Uuid, Path, description = "The consultation session id."))
)]
pub async fn delete_consultation_handler(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<DeleteConsultationResponse>, HttpError> {
    let session_id = parse_session_id(&session_id)?;
    let deleted_images = app_state.service.delete_consultation(session_id).await?;
    Ok(Json(DeleteConsultationResponse {
        message: "Consultation deleted successfully".to_string(),
        consultation_id: session_id,
        deleted_images,
    }))
}
