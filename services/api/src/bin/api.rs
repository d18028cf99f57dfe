//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{ConvertApiAdapter, DbAdapter, OpenAiCompletionAdapter},
    config::Config,
    error::ApiError,
    web::{
        auth::{login_handler, logout_handler, signup_handler},
        create_reviewer_handler, generate_handler, get_profile_handler, get_reviewer_handler,
        get_summary_handler, import_shared_handler, list_flashcards_handler, list_quiz_handler,
        list_reviewers_handler, list_user_flashcards_handler, require_auth, rest::ApiDoc,
        share_code_handler, state::AppState, update_profile_handler,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use study_companion_core::{ContentGenerator, PipelineSettings, ReviewerPipeline};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

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
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new()
        .with_api_key(config.llm_api_key.clone())
        .with_api_base(config.llm_base_url.clone());
    let llm_adapter = Arc::new(OpenAiCompletionAdapter::new(
        Client::with_config(openai_config),
        config.generation_model.clone(),
    ));

    let http_client = reqwest::Client::builder()
        .timeout(config.external_call_timeout)
        .build()?;
    let convert_adapter = Arc::new(ConvertApiAdapter::new(
        http_client,
        config.convert_api_url.clone(),
        config.convert_api_key.clone(),
    ));

    // --- 4. Build the Reviewer Pipeline ---
    let settings = PipelineSettings {
        call_timeout: config.external_call_timeout,
        duplication_policy: config.duplication_policy,
    };
    let pipeline = Arc::new(ReviewerPipeline::new(
        db_adapter.clone(),
        convert_adapter,
        ContentGenerator::new(llm_adapter, settings.call_timeout),
        settings,
    ));

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        accounts: db_adapter.clone(),
        store: db_adapter,
        pipeline,
        config: config.clone(),
    });

    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/reviewers",
            post(create_reviewer_handler).get(list_reviewers_handler),
        )
        .route("/reviewers/shared", post(import_shared_handler))
        .route("/reviewers/{id}", get(get_reviewer_handler))
        .route("/reviewers/{id}/flashcards", get(list_flashcards_handler))
        .route("/reviewers/{id}/quiz", get(list_quiz_handler))
        .route("/reviewers/{id}/summary", get(get_summary_handler))
        .route("/reviewers/{id}/generate", post(generate_handler))
        .route("/reviewers/{id}/share", get(share_code_handler))
        .route("/flashcards", get(list_user_flashcards_handler))
        .route("/profile", get(get_profile_handler).put(update_profile_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
