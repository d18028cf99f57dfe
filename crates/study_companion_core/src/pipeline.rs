//! crates/study_companion_core/src/pipeline.rs
//!
//! The reviewer aggregate builder: extraction, description, persistence and
//! artifact generation run as one linear "create reviewer" operation.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{
    ArtifactBatch, ArtifactKind, BatchInsert, DuplicationPolicy, NewFlashcard, NewQuizQuestion,
    NewReviewer, NewSummary, Reviewer, StudyInput, DEFAULT_CARD_COLOR,
};
use crate::extraction::{extract_corpus, ExtractionError, ExtractionFailure};
use crate::generation::{ContentGenerator, GenerationError};
use crate::ports::{bounded, DocumentConversionService, PortError, StudyStore};

//=========================================================================================
// Settings, Stages and Errors
//=========================================================================================

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Deadline applied to every conversion, generation and store call.
    pub call_timeout: Duration,
    pub duplication_policy: DuplicationPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
            duplication_policy: DuplicationPolicy::MetadataOnly,
        }
    }
}

/// The states of `create_reviewer`, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Extracting,
    Describing,
    PersistingReviewer,
    GeneratingArtifacts,
    PersistingArtifacts,
    Done,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineFailure {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Persistence(#[from] PortError),
}

/// A failed `create_reviewer`, tagged with the stage that failed.
///
/// `reviewer_id` is set when the reviewer record was already written before
/// the failure.
#[derive(Debug, thiserror::Error)]
#[error("Failed to create reviewer during {stage:?}: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    pub reviewer_id: Option<Uuid>,
    pub source: PipelineFailure,
}

impl PipelineError {
    fn at(stage: Stage, reviewer_id: Option<Uuid>, source: impl Into<PipelineFailure>) -> Self {
        Self { stage, reviewer_id, source: source.into() }
    }
}

/// Errors from the explicit "Generate" command.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("Reviewer {0} not found")]
    NotFound(Uuid),
    #[error("Only the owner of a reviewer can generate its artifacts")]
    Unauthorized,
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Persistence(#[from] PortError),
}

//=========================================================================================
// Requests and Outcomes
//=========================================================================================

#[derive(Debug, Clone)]
pub struct CreateReviewerRequest {
    pub name: String,
    /// `#RRGGBB`; `None` picks the default card color.
    pub card_color: Option<String>,
    pub input: StudyInput,
    pub owner_id: Uuid,
    /// Kinds generated in addition to flashcards, which are always generated.
    pub extra_artifacts: Vec<ArtifactKind>,
}

/// How one artifact kind fared while building a reviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactReport {
    Stored { kind: ArtifactKind, count: usize },
    /// Generation failed. The reviewer exists without this kind; the
    /// "Generate" command can fill the gap later.
    Missing { kind: ArtifactKind, reason: String },
}

#[derive(Debug, Clone)]
pub struct ReviewerCreated {
    pub reviewer: Reviewer,
    pub extraction_failures: Vec<ExtractionFailure>,
    pub artifacts: Vec<ArtifactReport>,
}

impl ReviewerCreated {
    pub fn stored_count(&self, kind: ArtifactKind) -> usize {
        self.artifacts
            .iter()
            .find_map(|r| match r {
                ArtifactReport::Stored { kind: k, count } if *k == kind => Some(*count),
                _ => None,
            })
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Artifacts of this kind already existed; nothing was generated.
    AlreadyPresent { count: usize },
    Generated { count: usize },
}

//=========================================================================================
// The Pipeline
//=========================================================================================

type GateMap = HashMap<(Uuid, ArtifactKind), Arc<AsyncMutex<()>>>;

#[derive(Clone)]
pub struct ReviewerPipeline {
    store: Arc<dyn StudyStore>,
    converter: Arc<dyn DocumentConversionService>,
    generator: ContentGenerator,
    settings: PipelineSettings,
    /// One gate per (reviewer, kind) with a "Generate" command in flight.
    generation_gates: Arc<Mutex<GateMap>>,
}

impl ReviewerPipeline {
    pub fn new(
        store: Arc<dyn StudyStore>,
        converter: Arc<dyn DocumentConversionService>,
        generator: ContentGenerator,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            converter,
            generator,
            settings,
            generation_gates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs `create_reviewer` on its own task. Dropping the handle does not
    /// cancel it, so a caller that goes away still leaves a complete reviewer.
    pub fn spawn_create_reviewer(
        &self,
        request: CreateReviewerRequest,
    ) -> JoinHandle<Result<ReviewerCreated, PipelineError>> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.create_reviewer(request).await })
    }

    /// Builds a reviewer from raw input and returns it once every stage ran.
    ///
    /// Only validation, extraction, reviewer persistence and artifact
    /// persistence failures are returned as errors. A failed description
    /// degrades to an empty string and a failed generation leaves the
    /// reviewer without that artifact kind.
    pub async fn create_reviewer(
        &self,
        request: CreateReviewerRequest,
    ) -> Result<ReviewerCreated, PipelineError> {
        let mut stage = Stage::Idle;
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(PipelineError::at(
                stage,
                None,
                PipelineFailure::Validation("reviewer name must not be empty".to_string()),
            ));
        }
        let card_color = match request.card_color.as_deref() {
            None => DEFAULT_CARD_COLOR.to_string(),
            Some(c) if is_hex_color(c.trim()) => c.trim().to_string(),
            Some(c) => {
                return Err(PipelineError::at(
                    stage,
                    None,
                    PipelineFailure::Validation(format!("'{}' is not a #RRGGBB color", c)),
                ))
            }
        };

        advance(&mut stage, Stage::Extracting, request.owner_id);
        let extraction = extract_corpus(
            self.converter.as_ref(),
            &request.input,
            self.settings.call_timeout,
        )
        .await
        .map_err(|e| PipelineError::at(stage, None, e))?;

        advance(&mut stage, Stage::Describing, request.owner_id);
        let ai_description = match self.generator.description(&extraction.corpus).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Description generation failed, continuing without one: {}", e);
                String::new()
            }
        };

        advance(&mut stage, Stage::PersistingReviewer, request.owner_id);
        let new_reviewer = NewReviewer {
            name,
            source_text: extraction.corpus,
            owner_id: request.owner_id,
            created_at: Utc::now(),
            card_color,
            ai_description,
        };
        let reviewer = bounded(
            self.settings.call_timeout,
            "reviewer insert",
            self.store.create_reviewer(new_reviewer),
        )
        .await
        .map_err(|e| PipelineError::at(stage, None, e))?;
        info!("Created reviewer {} for user {}.", reviewer.id, reviewer.owner_id);

        advance(&mut stage, Stage::GeneratingArtifacts, request.owner_id);
        let mut kinds = vec![ArtifactKind::Flashcards];
        for kind in request.extra_artifacts {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        let mut batches = Vec::new();
        let mut artifacts = Vec::new();
        for kind in kinds {
            match self.generate_batch(kind, &reviewer).await {
                Ok(batch) => batches.push(batch),
                Err(e) => {
                    error!(
                        "Generating {} for reviewer {} failed: {}",
                        kind.as_str(),
                        reviewer.id,
                        e
                    );
                    artifacts.push(ArtifactReport::Missing { kind, reason: e.to_string() });
                }
            }
        }

        advance(&mut stage, Stage::PersistingArtifacts, request.owner_id);
        for batch in batches {
            let kind = batch.kind();
            let count = self
                .persist_batch(batch)
                .await
                .map_err(|e| PipelineError::at(stage, Some(reviewer.id), e))?;
            artifacts.push(ArtifactReport::Stored { kind, count });
        }

        advance(&mut stage, Stage::Done, request.owner_id);
        Ok(ReviewerCreated {
            reviewer,
            extraction_failures: extraction.failures,
            artifacts,
        })
    }

    /// The explicit, idempotent "Generate" command for one artifact kind.
    ///
    /// Returns `AlreadyPresent` without calling the model when the reviewer
    /// already has artifacts of that kind. Concurrent calls for the same
    /// reviewer and kind run one after another, and the store only writes
    /// the batch if no other writer got there first.
    pub async fn generate_artifacts(
        &self,
        reviewer_id: Uuid,
        kind: ArtifactKind,
        requester: Uuid,
    ) -> Result<GenerationOutcome, GenerateError> {
        let gate = self.gate_for(reviewer_id, kind);
        let outcome = {
            let _turn = gate.lock().await;
            self.generate_in_turn(reviewer_id, kind, requester).await
        };
        self.release_gate(reviewer_id, kind, gate);
        outcome
    }

    async fn generate_in_turn(
        &self,
        reviewer_id: Uuid,
        kind: ArtifactKind,
        requester: Uuid,
    ) -> Result<GenerationOutcome, GenerateError> {
        let timeout = self.settings.call_timeout;
        let reviewer = bounded(timeout, "reviewer lookup", self.store.get_reviewer(reviewer_id))
            .await
            .map_err(|e| match e {
                PortError::NotFound(_) => GenerateError::NotFound(reviewer_id),
                other => GenerateError::Persistence(other),
            })?;
        if reviewer.owner_id != requester {
            return Err(GenerateError::Unauthorized);
        }

        let existing = bounded(
            timeout,
            "artifact count",
            self.store.count_artifacts(reviewer_id, kind),
        )
        .await?;
        if existing > 0 {
            info!(
                "Reviewer {} already has {} {}; skipping generation.",
                reviewer_id,
                existing,
                kind.as_str()
            );
            return Ok(GenerationOutcome::AlreadyPresent { count: existing });
        }

        let batch = self.generate_batch(kind, &reviewer).await?;
        if batch.is_empty() {
            warn!("No valid {} were generated; nothing to store.", kind.as_str());
            return Ok(GenerationOutcome::Generated { count: 0 });
        }
        let inserted = bounded(
            timeout,
            "conditional batch insert",
            self.store.insert_batch_if_absent(reviewer_id, batch),
        )
        .await?;
        match inserted {
            BatchInsert::Inserted(count) => {
                info!("Stored {} {} for reviewer {}.", count, kind.as_str(), reviewer_id);
                Ok(GenerationOutcome::Generated { count })
            }
            BatchInsert::AlreadyPresent(count) => {
                info!(
                    "Another writer stored {} for reviewer {} first; discarding this batch.",
                    kind.as_str(),
                    reviewer_id
                );
                Ok(GenerationOutcome::AlreadyPresent { count })
            }
        }
    }

    fn gate_for(&self, reviewer_id: Uuid, kind: ArtifactKind) -> Arc<AsyncMutex<()>> {
        let mut gates = self.generation_gates.lock().unwrap_or_else(PoisonError::into_inner);
        gates.entry((reviewer_id, kind)).or_default().clone()
    }

    /// Drops the gate once no other call holds or waits on it.
    fn release_gate(&self, reviewer_id: Uuid, kind: ArtifactKind, gate: Arc<AsyncMutex<()>>) {
        let mut gates = self.generation_gates.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference lives in the map, the other is `gate`.
        if Arc::strong_count(&gate) <= 2 {
            gates.remove(&(reviewer_id, kind));
        }
    }

    async fn generate_batch(
        &self,
        kind: ArtifactKind,
        reviewer: &Reviewer,
    ) -> Result<ArtifactBatch, GenerationError> {
        let corpus = reviewer.source_text.as_str();
        let now = Utc::now();
        let batch = match kind {
            ArtifactKind::Flashcards => ArtifactBatch::Flashcards(
                self.generator
                    .flashcards(corpus)
                    .await?
                    .into_iter()
                    .map(|card| NewFlashcard {
                        front: card.question,
                        back: card.answer,
                        reviewer_id: reviewer.id,
                        owner_id: reviewer.owner_id,
                        created_at: now,
                    })
                    .collect(),
            ),
            ArtifactKind::QuizQuestions => ArtifactBatch::QuizQuestions(
                self.generator
                    .quiz_questions(corpus)
                    .await?
                    .into_iter()
                    .map(|q| NewQuizQuestion {
                        question: q.question,
                        options: q.options,
                        answer: q.answer,
                        reviewer_id: reviewer.id,
                        created_at: now,
                    })
                    .collect(),
            ),
            ArtifactKind::Summary => ArtifactBatch::Summary(NewSummary {
                reviewer_id: reviewer.id,
                summary_text: self.generator.summary(corpus).await?,
                created_at: now,
            }),
        };
        Ok(batch)
    }

    /// Writes one batch atomically. Empty batches are not sent to the store.
    async fn persist_batch(&self, batch: ArtifactBatch) -> Result<usize, PortError> {
        let count = batch.len();
        if count == 0 {
            warn!("No valid {} were generated; nothing to store.", batch.kind().as_str());
            return Ok(0);
        }
        let kind = batch.kind();
        bounded(
            self.settings.call_timeout,
            "artifact batch insert",
            self.store.insert_batch(batch),
        )
        .await?;
        info!("Stored {} {}.", count, kind.as_str());
        Ok(count)
    }
}

fn advance(stage: &mut Stage, next: Stage, owner_id: Uuid) {
    info!("create_reviewer for {}: {:?} -> {:?}", owner_id, stage, next);
    *stage = next;
}

/// `#RRGGBB`, case-insensitive.
pub fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}
