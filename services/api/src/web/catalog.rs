//! services/api/src/web/catalog.rs
//!
//! Handlers for the quiz question catalog and the image category registry.

use crate::error::HttpError;
use crate::web::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Json,
};
use hvac_consult_core::domain::{ImageCategory, Question, SubCategory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

//=========================================================================================
// Payloads
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct SeedResponse {
    pub message: String,
    pub inserted: usize,
    pub skipped: bool,
}

#[derive(Serialize, ToSchema)]
pub struct SeededCategoriesResponse {
    pub message: String,
    pub total_categories: usize,
    #[schema(value_type = Vec<Object>)]
    pub categories: Vec<ImageCategory>,
}

/// The body of a category upsert. The key in the path is authoritative.
#[derive(Deserialize, ToSchema)]
pub struct CategoryPayload {
    pub display_name: String,
    pub discount_amount: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub why_we_need_this: Option<String>,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub sub_categories: Vec<SubCategory>,
}

impl CategoryPayload {
    fn into_category(self, key: &str) -> ImageCategory {
        ImageCategory {
            category: key.to_string(),
            display_name: self.display_name,
            discount_amount: self.discount_amount,
            description: self.description,
            why_we_need_this: self.why_we_need_this,
            sub_categories: self.sub_categories,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UpsertCategoryResponse {
    pub message: String,
    pub category: String,
    pub upserted: bool,
}

//=========================================================================================
// Quiz Handlers
//=========================================================================================

/// List the quiz questions in display order.
#[utoipa::path(
    get,
    path = "/questions",
    responses((status = 200, description = "The questions, ordered by `order`"))
)]
pub async fn list_questions_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<Question>>, HttpError> {
    Ok(Json(app_state.service.list_questions().await?))
}

/// Seed the default quiz. Does nothing when questions already exist.
#[utoipa::path(
    post,
    path = "/questions/seed",
    responses((status = 200, description = "Seed result", body = SeedResponse))
)]
pub async fn seed_questions_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<SeedResponse>, HttpError> {
    let report = app_state.service.seed_questions().await?;
    Ok(Json(SeedResponse {
        message: report.message,
        inserted: report.inserted,
        skipped: report.skipped,
    }))
}

//=========================================================================================
// Category Handlers
//=========================================================================================

/// List the photo categories and the discount each one earns.
#[utoipa::path(
    get,
    path = "/hvac-categories",
    responses((status = 200, description = "The category registry"))
)]
pub async fn list_categories_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<ImageCategory>>, HttpError> {
    Ok(Json(app_state.service.list_categories().await?))
}

/// Upsert the default categories.
#[utoipa::path(
    post,
    path = "/hvac-categories/seed",
    responses((status = 200, description = "The seeded categories", body = SeededCategoriesResponse))
)]
pub async fn seed_categories_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<SeededCategoriesResponse>, HttpError> {
    let categories = app_state.service.seed_categories().await?;
    Ok(Json(SeededCategoriesResponse {
        message: "HVAC categories seeded successfully".to_string(),
        total_categories: categories.len(),
        categories,
    }))
}

/// Create or replace one category.
#[utoipa::path(
    put,
    path = "/admin/hvac-categories/{category}",
    request_body = CategoryPayload,
    responses(
        (status = 200, description = "Category stored", body = UpsertCategoryResponse),
        (status = 400, description = "Malformed body")
    ),
    params(("category" = String, Path, description = "The category key."))
)]
pub async fn upsert_category_handler(
    State(app_state): State<Arc<AppState>>,
    Path(category): Path<String>,
    payload: Result<Json<CategoryPayload>, JsonRejection>,
) -> Result<Json<UpsertCategoryResponse>, HttpError> {
    let Json(payload) = payload.map_err(|e| HttpError::bad_request(e.body_text()))?;
    let upserted = app_state
        .service
        .upsert_category(&category, payload.into_category(&category))
        .await?;
    Ok(Json(UpsertCategoryResponse {
        message: format!("HVAC category '{}' updated successfully", category),
        category,
        upserted,
    }))
}
