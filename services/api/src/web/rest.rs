//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::auth::{self, AuthResponse, Credentials, SignupRequest};
use crate::web::profile::{self, ProfileUpdateRequest, ProfileView};
use crate::web::state::AppState;
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use study_companion_core::domain::{
    ArtifactKind, Flashcard, QuizQuestion, Reviewer, SourceDocument, StudyInput,
};
use study_companion_core::extraction::ExtractionError;
use study_companion_core::pipeline::{
    ArtifactReport, CreateReviewerRequest, GenerateError, GenerationOutcome, PipelineFailure,
};
use study_companion_core::ports::PortError;
use study_companion_core::{queries, sharing};
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

type HandlerError = (StatusCode, String);

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        profile::get_profile_handler,
        profile::update_profile_handler,
        create_reviewer_handler,
        list_reviewers_handler,
        get_reviewer_handler,
        list_flashcards_handler,
        list_user_flashcards_handler,
        list_quiz_handler,
        get_summary_handler,
        generate_handler,
        share_code_handler,
        import_shared_handler,
    ),
    components(
        schemas(
            Credentials,
            SignupRequest,
            AuthResponse,
            ProfileView,
            ProfileUpdateRequest,
            CreateReviewerResponse,
            ExtractionFailureView,
            MissingArtifactView,
            ReviewerView,
            FlashcardView,
            QuizQuestionView,
            SummaryResponse,
            GenerateRequest,
            GenerateResponse,
            ShareCodeResponse,
            ImportSharedRequest,
        )
    ),
    tags(
        (
            name = "Study Companion API",
            description = "Reviewers, flashcards, quizzes and summaries built from study material."
        )
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ExtractionFailureView {
    file_name: String,
    reason: String,
}

#[derive(Serialize, ToSchema)]
pub struct MissingArtifactView {
    kind: String,
    reason: String,
}

/// The response payload sent after successfully creating a reviewer.
#[derive(Serialize, ToSchema)]
pub struct CreateReviewerResponse {
    reviewer_id: Uuid,
    flashcard_count: usize,
    quiz_question_count: usize,
    has_summary: bool,
    extraction_failures: Vec<ExtractionFailureView>,
    missing_artifacts: Vec<MissingArtifactView>,
}

#[derive(Serialize, ToSchema)]
pub struct ReviewerView {
    id: Uuid,
    name: String,
    owner_id: Uuid,
    created_at: Option<DateTime<Utc>>,
    card_color: String,
    ai_description: String,
}

impl From<Reviewer> for ReviewerView {
    fn from(r: Reviewer) -> Self {
        Self {
            id: r.id,
            name: r.name,
            owner_id: r.owner_id,
            created_at: r.created_at,
            card_color: r.card_color,
            ai_description: r.ai_description,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct FlashcardView {
    id: Uuid,
    reviewer_id: Uuid,
    front: String,
    back: String,
}

impl From<Flashcard> for FlashcardView {
    fn from(f: Flashcard) -> Self {
        Self {
            id: f.id,
            reviewer_id: f.reviewer_id,
            front: f.front,
            back: f.back,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct QuizQuestionView {
    id: Uuid,
    question: String,
    options: Vec<String>,
    answer: String,
}

impl From<QuizQuestion> for QuizQuestionView {
    fn from(q: QuizQuestion) -> Self {
        Self {
            id: q.id,
            question: q.question,
            options: q.options.to_vec(),
            answer: q.answer,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SummaryResponse {
    summary: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct GenerateRequest {
    /// `flashcards`, `quiz_questions` or `summary`.
    kind: String,
}

#[derive(Serialize, ToSchema)]
pub struct GenerateResponse {
    kind: String,
    /// `generated` or `already_present`.
    status: String,
    count: usize,
}

#[derive(Serialize, ToSchema)]
pub struct ShareCodeResponse {
    code: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ImportSharedRequest {
    code: String,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn internal(what: &str, e: impl std::fmt::Debug) -> HandlerError {
    error!("{}: {:?}", what, e);
    (StatusCode::INTERNAL_SERVER_ERROR, what.to_string())
}

fn bad_multipart(e: MultipartError) -> HandlerError {
    (
        StatusCode::BAD_REQUEST,
        format!("Failed to read multipart data: {}", e),
    )
}

fn parse_kind(value: &str) -> Result<ArtifactKind, HandlerError> {
    ArtifactKind::parse(value).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("'{}' is not flashcards, quiz_questions or summary", value),
        )
    })
}

/// Loads a reviewer and checks that `user_id` owns it.
async fn owned_reviewer(
    state: &AppState,
    reviewer_id: Uuid,
    user_id: Uuid,
) -> Result<Reviewer, HandlerError> {
    let reviewer = queries::fetch_reviewer_meta(
        state.store.as_ref(),
        reviewer_id,
        state.read_timeout(),
    )
    .await
    .map_err(|e| match e {
        PortError::NotFound(_) => (StatusCode::NOT_FOUND, "Reviewer not found".to_string()),
        other => internal("Failed to load reviewer", other),
    })?;
    if reviewer.owner_id != user_id {
        return Err((StatusCode::FORBIDDEN, "Reviewer belongs to another user".to_string()));
    }
    Ok(reviewer)
}

/// The fields of the reviewer upload form.
struct ReviewerForm {
    name: String,
    color: Option<String>,
    input: StudyInput,
    extra_artifacts: Vec<ArtifactKind>,
}

async fn read_reviewer_form(mut multipart: Multipart) -> Result<ReviewerForm, HandlerError> {
    let mut form = ReviewerForm {
        name: String::new(),
        color: None,
        input: StudyInput::default(),
        extra_artifacts: Vec::new(),
    };

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => form.name = field.text().await.map_err(bad_multipart)?,
            "color" => {
                let color = field.text().await.map_err(bad_multipart)?;
                if !color.trim().is_empty() {
                    form.color = Some(color);
                }
            }
            "text" => {
                let text = field.text().await.map_err(bad_multipart)?;
                if !text.trim().is_empty() {
                    form.input.plain_text = Some(text);
                }
            }
            "generate" => {
                let kind = field.text().await.map_err(bad_multipart)?;
                form.extra_artifacts.push(parse_kind(kind.trim())?);
            }
            "file" => {
                let file_name = field.file_name().unwrap_or("upload.pdf").to_string();
                let mime_type = field.content_type().unwrap_or("application/pdf").to_string();
                let data = field.bytes().await.map_err(bad_multipart)?;
                form.input.documents.push(SourceDocument {
                    file_name,
                    mime_type,
                    data,
                });
            }
            other => warn!("Ignoring unknown multipart field '{}'.", other),
        }
    }
    Ok(form)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Create a new reviewer from pasted text and/or uploaded documents.
///
/// Accepts a multipart/form-data request with `name`, optional `color`,
/// optional `text`, any number of `file` parts and optional repeated
/// `generate` fields naming extra artifact kinds.
#[utoipa::path(
    post,
    path = "/reviewers",
    request_body(
        content_type = "multipart/form-data",
        description = "Reviewer name, color and source material."
    ),
    responses(
        (status = 201, description = "Reviewer created", body = CreateReviewerResponse),
        (status = 400, description = "Invalid name, color or form"),
        (status = 401, description = "Not signed in"),
        (status = 422, description = "No text could be extracted from the input"),
        (status = 500, description = "Failed to create reviewer")
    )
)]
pub async fn create_reviewer_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let form = read_reviewer_form(multipart).await?;
    let request = CreateReviewerRequest {
        name: form.name,
        card_color: form.color,
        input: form.input,
        owner_id: user_id,
        extra_artifacts: form.extra_artifacts,
    };

    // The pipeline runs on its own task so a dropped connection cannot cut it short.
    let outcome = state
        .pipeline
        .spawn_create_reviewer(request)
        .await
        .map_err(|e| internal("Reviewer pipeline task failed", e))?;
    let created = outcome.map_err(|e| {
        match e.source {
            PipelineFailure::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            PipelineFailure::Extraction(ExtractionError::EmptyCorpus { failures }) => {
                warn!(
                    "No text extracted for user {}: {} failed document(s).",
                    user_id,
                    failures.len()
                );
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "No text could be extracted from the provided input".to_string(),
                )
            }
            other => {
                error!(
                    "Failed to create reviewer during {:?} (reviewer {:?}): {:?}",
                    e.stage, e.reviewer_id, other
                );
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create reviewer".to_string())
            }
        }
    })?;

    let missing_artifacts = created
        .artifacts
        .iter()
        .filter_map(|r| match r {
            ArtifactReport::Missing { kind, reason } => Some(MissingArtifactView {
                kind: kind.as_str().to_string(),
                reason: reason.clone(),
            }),
            ArtifactReport::Stored { .. } => None,
        })
        .collect();
    let response = CreateReviewerResponse {
        reviewer_id: created.reviewer.id,
        flashcard_count: created.stored_count(ArtifactKind::Flashcards),
        quiz_question_count: created.stored_count(ArtifactKind::QuizQuestions),
        has_summary: created.stored_count(ArtifactKind::Summary) > 0,
        extraction_failures: created
            .extraction_failures
            .into_iter()
            .map(|f| ExtractionFailureView {
                file_name: f.file_name,
                reason: f.reason,
            })
            .collect(),
        missing_artifacts,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// List the caller's reviewers, newest first.
#[utoipa::path(
    get,
    path = "/reviewers",
    responses(
        (status = 200, description = "The caller's reviewers", body = [ReviewerView]),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn list_reviewers_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let reviewers = queries::list_reviewers(
        state.store.as_ref(),
        user_id,
        state.read_timeout(),
    )
    .await
    .map_err(|e| internal("Failed to list reviewers", e))?;
    let views: Vec<ReviewerView> = reviewers.into_iter().map(ReviewerView::from).collect();
    Ok(Json(views))
}

#[utoipa::path(
    get,
    path = "/reviewers/{id}",
    params(("id" = Uuid, Path, description = "Reviewer id")),
    responses(
        (status = 200, description = "Reviewer metadata", body = ReviewerView),
        (status = 403, description = "Reviewer belongs to another user"),
        (status = 404, description = "Reviewer not found")
    )
)]
pub async fn get_reviewer_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(reviewer_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let reviewer = owned_reviewer(&state, reviewer_id, user_id).await?;
    Ok(Json(ReviewerView::from(reviewer)))
}

#[utoipa::path(
    get,
    path = "/reviewers/{id}/flashcards",
    params(("id" = Uuid, Path, description = "Reviewer id")),
    responses(
        (status = 200, description = "Flashcards of the reviewer", body = [FlashcardView]),
        (status = 404, description = "Reviewer not found")
    )
)]
pub async fn list_flashcards_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(reviewer_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    owned_reviewer(&state, reviewer_id, user_id).await?;
    let cards = queries::fetch_flashcards(
        state.store.as_ref(),
        reviewer_id,
        state.read_timeout(),
    )
    .await
    .map_err(|e| internal("Failed to load flashcards", e))?;
    let views: Vec<FlashcardView> = cards.into_iter().map(FlashcardView::from).collect();
    Ok(Json(views))
}

/// Every flashcard the caller owns, across reviewers.
#[utoipa::path(
    get,
    path = "/flashcards",
    responses(
        (status = 200, description = "All of the caller's flashcards", body = [FlashcardView]),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn list_user_flashcards_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let cards = queries::fetch_user_flashcards(
        state.store.as_ref(),
        user_id,
        state.read_timeout(),
    )
    .await
    .map_err(|e| internal("Failed to load flashcards", e))?;
    let views: Vec<FlashcardView> = cards.into_iter().map(FlashcardView::from).collect();
    Ok(Json(views))
}

#[utoipa::path(
    get,
    path = "/reviewers/{id}/quiz",
    params(("id" = Uuid, Path, description = "Reviewer id")),
    responses(
        (status = 200, description = "Quiz questions of the reviewer", body = [QuizQuestionView]),
        (status = 404, description = "Reviewer not found")
    )
)]
pub async fn list_quiz_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(reviewer_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    owned_reviewer(&state, reviewer_id, user_id).await?;
    let questions = queries::fetch_quiz_questions(
        state.store.as_ref(),
        reviewer_id,
        state.read_timeout(),
    )
    .await
    .map_err(|e| internal("Failed to load quiz questions", e))?;
    let views: Vec<QuizQuestionView> = questions.into_iter().map(QuizQuestionView::from).collect();
    Ok(Json(views))
}

/// The reviewer's summary; `null` when none was generated yet.
#[utoipa::path(
    get,
    path = "/reviewers/{id}/summary",
    params(("id" = Uuid, Path, description = "Reviewer id")),
    responses(
        (status = 200, description = "Summary text or null", body = SummaryResponse),
        (status = 404, description = "Reviewer not found")
    )
)]
pub async fn get_summary_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(reviewer_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    owned_reviewer(&state, reviewer_id, user_id).await?;
    let summary = queries::fetch_summary(
        state.store.as_ref(),
        reviewer_id,
        state.read_timeout(),
    )
    .await
    .map_err(|e| internal("Failed to load summary", e))?;
    Ok(Json(SummaryResponse { summary }))
}

/// Generate one artifact kind for a reviewer. Does nothing when that kind
/// already exists.
#[utoipa::path(
    post,
    path = "/reviewers/{id}/generate",
    params(("id" = Uuid, Path, description = "Reviewer id")),
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Artifacts present after the call", body = GenerateResponse),
        (status = 400, description = "Unknown artifact kind"),
        (status = 403, description = "Reviewer belongs to another user"),
        (status = 404, description = "Reviewer not found"),
        (status = 502, description = "The language model failed")
    )
)]
pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(reviewer_id): Path<Uuid>,
    Json(req): Json<GenerateRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let kind = parse_kind(req.kind.trim())?;
    let outcome = state
        .pipeline
        .generate_artifacts(reviewer_id, kind, user_id)
        .await
        .map_err(|e| match e {
            GenerateError::NotFound(_) => (StatusCode::NOT_FOUND, "Reviewer not found".to_string()),
            GenerateError::Unauthorized => {
                (StatusCode::FORBIDDEN, "Reviewer belongs to another user".to_string())
            }
            GenerateError::Generation(e) => {
                error!("Generating {} for reviewer {} failed: {:?}", kind.as_str(), reviewer_id, e);
                (StatusCode::BAD_GATEWAY, format!("Failed to generate {}", kind.as_str()))
            }
            GenerateError::Persistence(e) => internal("Failed to save generated artifacts", e),
        })?;

    let (status, count) = match outcome {
        GenerationOutcome::AlreadyPresent { count } => ("already_present", count),
        GenerationOutcome::Generated { count } => ("generated", count),
    };
    Ok(Json(GenerateResponse {
        kind: kind.as_str().to_string(),
        status: status.to_string(),
        count,
    }))
}

/// The code to render as a QR image for sharing a reviewer.
#[utoipa::path(
    get,
    path = "/reviewers/{id}/share",
    params(("id" = Uuid, Path, description = "Reviewer id")),
    responses(
        (status = 200, description = "Share code", body = ShareCodeResponse),
        (status = 403, description = "Reviewer belongs to another user"),
        (status = 404, description = "Reviewer not found")
    )
)]
pub async fn share_code_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(reviewer_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let reviewer = owned_reviewer(&state, reviewer_id, user_id).await?;
    Ok(Json(ShareCodeResponse {
        code: sharing::share_code_for(reviewer.id),
    }))
}

/// Copy a shared reviewer into the caller's library.
#[utoipa::path(
    post,
    path = "/reviewers/shared",
    request_body = ImportSharedRequest,
    responses(
        (status = 201, description = "The caller's copy", body = ReviewerView),
        (status = 400, description = "Invalid share code"),
        (status = 404, description = "Shared reviewer no longer exists"),
        (status = 500, description = "Failed to add reviewer")
    )
)]
pub async fn import_shared_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<ImportSharedRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let settings = state.pipeline.settings();
    let copy = sharing::import_shared_reviewer(
        state.store.as_ref(),
        &req.code,
        user_id,
        settings.duplication_policy,
        settings.call_timeout,
    )
    .await
    .map_err(|e| match e {
        sharing::ShareError::InvalidCode(_) => (StatusCode::BAD_REQUEST, e.to_string()),
        sharing::ShareError::NotFound => (StatusCode::NOT_FOUND, e.to_string()),
        sharing::ShareError::Failed(inner) => internal("Failed to add reviewer", inner),
    })?;
    info!("User {} imported reviewer {}.", user_id, copy.id);
    Ok((StatusCode::CREATED, Json(ReviewerView::from(copy))))
}
