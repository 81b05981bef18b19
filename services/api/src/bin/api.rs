//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        DbAdapter, GoogleVisionOcrAdapter, InMemoryStore, LocalObjectStorage,
        OpenAiExtractionAdapter,
    },
    config::Config,
    error::ApiError,
    web::{self, state::AppState, ApiDoc},
};
use async_openai::{config::OpenAIConfig, Client};
use hvac_consult_core::{
    discount::DiscountPolicy, pricing::PricingTable, CategoryStore, ConsultationService,
    ConsultationStore, Ports, QuestionStore, WorkflowSettings,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// The three store ports, backed by one adapter.
type Stores = (
    Arc<dyn ConsultationStore>,
    Arc<dyn QuestionStore>,
    Arc<dyn CategoryStore>,
);

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    let (consultations, questions, categories) = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            let stores: Stores = (db_adapter.clone(), db_adapter.clone(), db_adapter);
            stores
        }
        None => {
            warn!("DATABASE_URL is not set; consultations are kept in memory only.");
            let store = Arc::new(InMemoryStore::new());
            let stores: Stores = (store.clone(), store.clone(), store);
            stores
        }
    };

    // --- 3. Initialize Service Adapters ---
    tokio::fs::create_dir_all(&config.upload_dir).await?;
    let storage = Arc::new(LocalObjectStorage::new(
        config.upload_dir.clone(),
        config.public_base_url.clone(),
    ));

    let ocr = Arc::new(GoogleVisionOcrAdapter::new(
        config.google_vision_api_key.clone(),
        config.external_timeout,
    )?);

    let openai_config = OpenAIConfig::new().with_api_key(config.openai_api_key.as_str());
    let openai_client = Client::with_config(openai_config);
    let extractor = Arc::new(
        OpenAiExtractionAdapter::new(
            openai_client,
            config.extraction_model.clone(),
            config.external_timeout,
        )
        .map_err(|e| ApiError::Internal(e.to_string()))?,
    );

    // --- 4. Build the Workflow Service & Shared AppState ---
    let ports = Ports {
        consultations,
        questions,
        categories,
        storage,
        ocr,
        extractor,
    };
    let settings = WorkflowSettings {
        max_images: config.max_images,
        max_upload_bytes: config.max_upload_bytes,
        discount_policy: DiscountPolicy {
            lock_on_zero: config.discount_lock_on_zero,
        },
        max_write_attempts: config.max_write_attempts,
    };
    let service = Arc::new(ConsultationService::new(
        ports,
        PricingTable::standard(),
        settings,
    ));
    service.seed_defaults().await.map_err(|e| {
        ApiError::Internal(format!("Failed to seed the quiz and categories: {}", e))
    })?;
    info!("Quiz and category defaults are in place.");
    let app_state = Arc::new(AppState {
        service,
        config: config.clone(),
    });

    // --- 5. Create the Web Router ---
    // Merge the API router with the Swagger UI router for a complete application.
    let app = web::router(app_state)?
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for the shutdown signal: {}", e);
        }
        info!("Shutdown signal received.");
        signal_token.cancel();
    });

    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Server stopped.");
    Ok(())
}
