//! In-memory fakes of every port, shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use study_companion_core::domain::{
    ArtifactBatch, ArtifactFilter, ArtifactKind, BatchInsert, DuplicationPolicy, Flashcard,
    NewReviewer, QuizQuestion, Reviewer, SourceDocument, Summary,
};
use study_companion_core::generation::ContentGenerator;
use study_companion_core::pipeline::{PipelineSettings, ReviewerPipeline};
use study_companion_core::ports::{
    DocumentConversionService, LanguageModelService, OutputFormat, PortError, PortResult,
    StudyStore,
};

//=========================================================================================
// Store
//=========================================================================================

#[derive(Default)]
struct Tables {
    reviewers: Vec<Reviewer>,
    flashcards: Vec<Flashcard>,
    quiz_questions: Vec<QuizQuestion>,
    summaries: Vec<Summary>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    pub fail_reviewer_insert: AtomicBool,
    pub fail_batches: AtomicBool,
    pub slow_reads: AtomicBool,
    pub batch_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn reviewer_count(&self) -> usize {
        self.tables.lock().unwrap().reviewers.len()
    }

    pub fn flashcard_count(&self) -> usize {
        self.tables.lock().unwrap().flashcards.len()
    }

    pub fn quiz_count(&self) -> usize {
        self.tables.lock().unwrap().quiz_questions.len()
    }

    async fn maybe_stall(&self) {
        if self.slow_reads.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    pub fn seed_reviewer(&self, owner_id: Uuid, name: &str, text: &str) -> Reviewer {
        let reviewer = Reviewer {
            id: Uuid::new_v4(),
            name: name.to_string(),
            source_text: text.to_string(),
            owner_id,
            created_at: Some(Utc::now()),
            card_color: "#112233".to_string(),
            ai_description: "seeded".to_string(),
        };
        self.tables.lock().unwrap().reviewers.push(reviewer.clone());
        reviewer
    }
}

fn missing(id: Uuid) -> PortError {
    PortError::NotFound(format!("Reviewer {} not found", id))
}

fn has_reviewer(tables: &Tables, id: Uuid) -> bool {
    tables.reviewers.iter().any(|r| r.id == id)
}

fn count_of(tables: &Tables, reviewer_id: Uuid, kind: ArtifactKind) -> usize {
    match kind {
        ArtifactKind::Flashcards => {
            tables.flashcards.iter().filter(|c| c.reviewer_id == reviewer_id).count()
        }
        ArtifactKind::QuizQuestions => {
            tables.quiz_questions.iter().filter(|q| q.reviewer_id == reviewer_id).count()
        }
        ArtifactKind::Summary => {
            tables.summaries.iter().filter(|s| s.reviewer_id == reviewer_id).count()
        }
    }
}

/// Validates every foreign key first so a bad batch writes nothing.
fn write_batch(tables: &mut Tables, batch: ArtifactBatch) -> PortResult<()> {
    match batch {
        ArtifactBatch::Flashcards(cards) => {
            if let Some(bad) = cards.iter().find(|c| !has_reviewer(tables, c.reviewer_id)) {
                return Err(missing(bad.reviewer_id));
            }
            for c in cards {
                tables.flashcards.push(Flashcard {
                    id: Uuid::new_v4(),
                    front: c.front,
                    back: c.back,
                    reviewer_id: c.reviewer_id,
                    owner_id: c.owner_id,
                    created_at: c.created_at,
                });
            }
        }
        ArtifactBatch::QuizQuestions(questions) => {
            if let Some(bad) = questions.iter().find(|q| !has_reviewer(tables, q.reviewer_id)) {
                return Err(missing(bad.reviewer_id));
            }
            for q in questions {
                tables.quiz_questions.push(QuizQuestion {
                    id: Uuid::new_v4(),
                    question: q.question,
                    options: q.options,
                    answer: q.answer,
                    reviewer_id: q.reviewer_id,
                    created_at: q.created_at,
                });
            }
        }
        ArtifactBatch::Summary(s) => {
            if !has_reviewer(tables, s.reviewer_id) {
                return Err(missing(s.reviewer_id));
            }
            tables.summaries.push(Summary {
                id: Uuid::new_v4(),
                reviewer_id: s.reviewer_id,
                summary_text: s.summary_text,
                created_at: s.created_at,
            });
        }
    }
    Ok(())
}

#[async_trait]
impl StudyStore for MemoryStore {
    async fn create_reviewer(&self, r: NewReviewer) -> PortResult<Reviewer> {
        if self.fail_reviewer_insert.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("store offline".into()));
        }
        let reviewer = Reviewer {
            id: Uuid::new_v4(),
            name: r.name,
            source_text: r.source_text,
            owner_id: r.owner_id,
            created_at: Some(r.created_at),
            card_color: r.card_color,
            ai_description: r.ai_description,
        };
        self.tables.lock().unwrap().reviewers.push(reviewer.clone());
        Ok(reviewer)
    }

    async fn get_reviewer(&self, reviewer_id: Uuid) -> PortResult<Reviewer> {
        self.maybe_stall().await;
        let tables = self.tables.lock().unwrap();
        tables
            .reviewers
            .iter()
            .find(|r| r.id == reviewer_id)
            .cloned()
            .ok_or_else(|| missing(reviewer_id))
    }

    async fn reviewers_by_owner(&self, owner_id: Uuid) -> PortResult<Vec<Reviewer>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.reviewers.iter().filter(|r| r.owner_id == owner_id).cloned().collect())
    }

    async fn insert_batch(&self, batch: ArtifactBatch) -> PortResult<()> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("batch commit failed".into()));
        }
        write_batch(&mut self.tables.lock().unwrap(), batch)
    }

    async fn insert_batch_if_absent(
        &self,
        reviewer_id: Uuid,
        batch: ArtifactBatch,
    ) -> PortResult<BatchInsert> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("batch commit failed".into()));
        }
        let mut tables = self.tables.lock().unwrap();
        if !has_reviewer(&tables, reviewer_id) {
            return Err(missing(reviewer_id));
        }
        let existing = count_of(&tables, reviewer_id, batch.kind());
        if existing > 0 {
            return Ok(BatchInsert::AlreadyPresent(existing));
        }
        let count = batch.len();
        write_batch(&mut tables, batch)?;
        Ok(BatchInsert::Inserted(count))
    }

    async fn flashcards(&self, filter: ArtifactFilter) -> PortResult<Vec<Flashcard>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .flashcards
            .iter()
            .filter(|c| match filter {
                ArtifactFilter::Reviewer(id) => c.reviewer_id == id,
                ArtifactFilter::Owner(id) => c.owner_id == id,
            })
            .cloned()
            .collect())
    }

    async fn quiz_questions(&self, reviewer_id: Uuid) -> PortResult<Vec<QuizQuestion>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.quiz_questions.iter().filter(|q| q.reviewer_id == reviewer_id).cloned().collect())
    }

    async fn summary(&self, reviewer_id: Uuid) -> PortResult<Option<Summary>> {
        self.maybe_stall().await;
        let tables = self.tables.lock().unwrap();
        Ok(tables.summaries.iter().find(|s| s.reviewer_id == reviewer_id).cloned())
    }

    async fn count_artifacts(&self, reviewer_id: Uuid, kind: ArtifactKind) -> PortResult<usize> {
        Ok(count_of(&self.tables.lock().unwrap(), reviewer_id, kind))
    }

    async fn duplicate_reviewer(
        &self,
        source_id: Uuid,
        new_owner: Uuid,
        created_at: DateTime<Utc>,
        policy: DuplicationPolicy,
    ) -> PortResult<Reviewer> {
        let mut tables = self.tables.lock().unwrap();
        let source = tables
            .reviewers
            .iter()
            .find(|r| r.id == source_id)
            .cloned()
            .ok_or_else(|| missing(source_id))?;
        let copy = Reviewer {
            id: Uuid::new_v4(),
            owner_id: new_owner,
            created_at: Some(created_at),
            ..source
        };
        tables.reviewers.push(copy.clone());

        if policy == DuplicationPolicy::WithArtifacts {
            let cards: Vec<Flashcard> = tables
                .flashcards
                .iter()
                .filter(|c| c.reviewer_id == source_id)
                .map(|c| Flashcard {
                    id: Uuid::new_v4(),
                    reviewer_id: copy.id,
                    owner_id: new_owner,
                    ..c.clone()
                })
                .collect();
            let questions: Vec<QuizQuestion> = tables
                .quiz_questions
                .iter()
                .filter(|q| q.reviewer_id == source_id)
                .map(|q| QuizQuestion { id: Uuid::new_v4(), reviewer_id: copy.id, ..q.clone() })
                .collect();
            let summaries: Vec<Summary> = tables
                .summaries
                .iter()
                .filter(|s| s.reviewer_id == source_id)
                .map(|s| Summary { id: Uuid::new_v4(), reviewer_id: copy.id, ..s.clone() })
                .collect();
            tables.flashcards.extend(cards);
            tables.quiz_questions.extend(questions);
            tables.summaries.extend(summaries);
        }
        Ok(copy)
    }
}

//=========================================================================================
// Converter
//=========================================================================================

/// Returns the document bytes as text; any file named in `failing` errors.
#[derive(Default)]
pub struct FakeConverter {
    pub failing: Vec<String>,
}

#[async_trait]
impl DocumentConversionService for FakeConverter {
    async fn convert(&self, data: &[u8], file_name: &str, _mime: &str) -> PortResult<String> {
        if self.failing.iter().any(|f| f == file_name) {
            return Err(PortError::Unexpected(format!("cannot convert {}", file_name)));
        }
        Ok(String::from_utf8_lossy(data).into_owned())
    }
}

pub fn pdf(name: &str, text: &str) -> SourceDocument {
    SourceDocument {
        file_name: name.to_string(),
        mime_type: "application/pdf".to_string(),
        data: Bytes::from(text.to_string()),
    }
}

//=========================================================================================
// Language Model
//=========================================================================================

/// Which prompt a call belongs to, recognised by the prompt wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Flashcards,
    Quiz,
    Description,
    Summary,
}

fn task_of(prompt: &str) -> Task {
    if prompt.contains("\"flashcards\"") {
        Task::Flashcards
    } else if prompt.contains("quiz questions") {
        Task::Quiz
    } else if prompt.contains("brief description") {
        Task::Description
    } else {
        Task::Summary
    }
}

/// Replays a scripted reply per task. Unscripted tasks fail.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<HashMap<Task, Result<String, String>>>,
    delays: Mutex<HashMap<Task, Duration>>,
    calls: Mutex<Vec<(Task, OutputFormat, String)>>,
}

impl ScriptedModel {
    pub fn reply(self, task: Task, text: &str) -> Self {
        self.replies.lock().unwrap().insert(task, Ok(text.to_string()));
        self
    }

    pub fn fail(self, task: Task, reason: &str) -> Self {
        self.replies.lock().unwrap().insert(task, Err(reason.to_string()));
        self
    }

    /// Makes every reply for `task` arrive after `delay`.
    pub fn slow(self, task: Task, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(task, delay);
        self
    }

    pub fn calls_for(&self, task: Task) -> usize {
        self.calls.lock().unwrap().iter().filter(|(t, _, _)| *t == task).count()
    }

    pub fn prompts_for(&self, task: Task) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _, _)| *t == task)
            .map(|(_, _, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl LanguageModelService for ScriptedModel {
    async fn complete(&self, prompt: &str, format: OutputFormat) -> PortResult<String> {
        let task = task_of(prompt);
        self.calls.lock().unwrap().push((task, format, prompt.to_string()));
        let delay = self.delays.lock().unwrap().get(&task).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.replies.lock().unwrap().get(&task) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(reason)) => Err(PortError::Unexpected(reason.clone())),
            None => Err(PortError::Unexpected(format!("no reply scripted for {:?}", task))),
        }
    }
}

//=========================================================================================
// Wiring
//=========================================================================================

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub model: Arc<ScriptedModel>,
    pub pipeline: ReviewerPipeline,
}

pub fn harness(model: ScriptedModel, converter: FakeConverter) -> Harness {
    let store = Arc::new(MemoryStore::default());
    let model = Arc::new(model);
    let pipeline = pipeline_on(store.clone(), model.clone(), converter);
    Harness { store, model, pipeline }
}

/// A separate pipeline over existing ports, like a second server process.
pub fn pipeline_on(
    store: Arc<MemoryStore>,
    model: Arc<ScriptedModel>,
    converter: FakeConverter,
) -> ReviewerPipeline {
    let settings = PipelineSettings {
        call_timeout: Duration::from_secs(5),
        ..PipelineSettings::default()
    };
    ReviewerPipeline::new(
        store,
        Arc::new(converter),
        ContentGenerator::new(model, settings.call_timeout),
        settings,
    )
}
