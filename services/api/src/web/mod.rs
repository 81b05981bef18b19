pub mod admin;
pub mod catalog;
pub mod rest;
pub mod state;

use crate::config::ConfigError;
use crate::error::ApiError;
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post, put},
    Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

pub use rest::ApiDoc;

/// Headroom for the multipart framing around the file part.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

fn cors_layer(origin: &str) -> Result<CorsLayer, ApiError> {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, ACCEPT]);
    if origin.trim() == "*" {
        return Ok(layer.allow_origin(Any));
    }
    let origin = origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Config(ConfigError::InvalidValue(
            "CORS_ORIGIN".to_string(),
            e.to_string(),
        ))
    })?;
    Ok(layer.allow_origin(origin).allow_credentials(true))
}

/// Builds the full application router: workflow routes, catalog routes,
/// uploaded files under `/uploads` and a liveness probe.
pub fn router(app_state: Arc<AppState>) -> Result<Router, ApiError> {
    let config = app_state.config.clone();

    let consultation_routes = Router::new()
        .route("/session", post(rest::create_session_handler))
        .route(
            "/consultation/{session_id}/submit-answers",
            post(rest::submit_answers_handler),
        )
        .route(
            "/consultation/{session_id}/images",
            post(rest::upload_image_handler),
        )
        .route(
            "/consultation/{session_id}/details",
            get(rest::details_handler),
        )
        .route(
            "/consultation/{session_id}/generate-estimate",
            post(rest::generate_estimate_handler),
        )
        .route(
            "/consultation/{session_id}/apply-discount",
            post(rest::apply_discount_handler),
        )
        .route(
            "/consultation/{session_id}/analyze-all",
            post(rest::analyze_images_handler),
        );

    let catalog_routes = Router::new()
        .route("/questions", get(catalog::list_questions_handler))
        .route("/questions/seed", post(catalog::seed_questions_handler))
        .route("/hvac-categories", get(catalog::list_categories_handler))
        .route(
            "/hvac-categories/seed",
            post(catalog::seed_categories_handler),
        )
        .route(
            "/admin/hvac-categories/{category}",
            put(catalog::upsert_category_handler),
        );

    let admin_routes = Router::new()
        .route(
            "/admin/consultations",
            get(admin::list_consultations_handler),
        )
        .route(
            "/admin/consultations/{session_id}",
            get(admin::get_consultation_handler).delete(admin::delete_consultation_handler),
        );

    Ok(Router::new()
        .merge(consultation_routes)
        .merge(catalog_routes)
        .merge(admin_routes)
        .route("/health", get(rest::health_handler))
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .layer(DefaultBodyLimit::max(
            config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
        ))
        .layer(cors_layer(&config.cors_origin)?)
        .with_state(app_state))
}
