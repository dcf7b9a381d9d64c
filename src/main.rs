//! Essay Grader - handwritten essay transcription, correction and scoring server.

mod config;
mod correction;
mod detection;
mod error;
mod evaluation;
mod google_auth;
mod intake;
mod ocr;
mod openai;
mod pipeline;
mod prompts;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use config::AppConfig;
use error::EvaluateError;
use intake::UploadedImage;
use ocr::google_vision::GoogleVisionProvider;
use openai::OpenAiClient;
use pipeline::{EvaluationForm, Pipeline, ResponseEnvelope};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "essay_grader=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    info!("Scratch directory: {:?}", config.upload_dir);

    let http = reqwest::Client::new();

    let vision = GoogleVisionProvider::new(http.clone(), &config.vision)?;
    info!("Google Vision client initialized");

    let openai = OpenAiClient::new(http, &config.chat);
    info!("OpenAI client initialized (model: {})", openai.model());

    let state = AppState {
        pipeline: Arc::new(Pipeline::new(
            Arc::new(vision),
            Arc::new(openai),
            config.upload_dir.clone(),
        )),
    };

    let app = router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/evaluate", post(evaluate))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Transcribe the uploaded essay pages, correct and evaluate the essay.
async fn evaluate(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ResponseEnvelope>, EvaluateError> {
    // Non-multipart bodies still get the JSON error shape.
    let multipart = multipart.map_err(|e| EvaluateError::Multipart(e.body_text()))?;
    let form = read_form(multipart).await?;

    info!(
        "Received {} images (ai_detection={}, aux_prompt={})",
        form.images.len(),
        form.ai_detection,
        form.aux_prompt.is_some()
    );

    state.pipeline.run(form).await.map(Json)
}

/// Collect the multipart fields of an `/evaluate` request.
async fn read_form(mut multipart: Multipart) -> Result<EvaluationForm, EvaluateError> {
    let mut form = EvaluationForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("images") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(multipart_error)?;
                form.images.push(UploadedImage::new(filename, data));
            }
            Some("aux_prompt") => {
                let text = field
                    .text()
                    .await
                    .map_err(multipart_error)?;
                form.aux_prompt = Some(text);
            }
            Some("ai_detection") => {
                let text = field
                    .text()
                    .await
                    .map_err(multipart_error)?;
                form.ai_detection = text == "true";
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Oversized uploads are reported as 413, everything else as a malformed request.
fn multipart_error(err: MultipartError) -> EvaluateError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        EvaluateError::PayloadTooLarge(err.body_text())
    } else {
        EvaluateError::Multipart(err.body_text())
    }
}
