//! crates/study_companion_core/src/generation.rs
//!
//! The content generation client. Builds task-specific prompts around a corpus,
//! sends them to the language model port, and turns the reply into study records.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::ports::{bounded, LanguageModelService, OutputFormat, PortError};

//=========================================================================================
// Prompts
//=========================================================================================

const FLASHCARDS_PROMPT: &str = r#"Create multiple flashcards consisting of a question and an answer based on the following content (5 minimum).

Respond with JSON only, in exactly this shape:
{"flashcards": [{"question": "...", "answer": "..."}]}

CONTENT:
{corpus}"#;

const QUIZ_PROMPT: &str = r#"Create multiple-choice quiz questions based on the following content (5 minimum).
Every question has exactly four options. The "answer" value must be copied character for character from one of the four options.

Respond with JSON only, in exactly this shape:
{"questions": [{"question": "...", "option1": "...", "option2": "...", "option3": "...", "option4": "...", "answer": "..."}]}

CONTENT:
{corpus}"#;

const DESCRIPTION_PROMPT: &str = "Please provide a brief description (2-3 sentences) summarizing the main topic and key points of the following text. Respond with plain text only.\n\n{corpus}";

const SUMMARY_PROMPT: &str = "Write a study summary of the following text for a student reviewing for an exam. Cover every key concept and definition in short paragraphs. Respond with plain text only, no markdown headings.\n\n{corpus}";

//=========================================================================================
// Types
//=========================================================================================

/// What the model is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Flashcards,
    QuizQuestions,
    /// A short, cosmetic description shown on the reviewer card.
    Description,
    Summary,
}

impl GenerationKind {
    fn prompt(&self, corpus: &str) -> String {
        let template = match self {
            GenerationKind::Flashcards => FLASHCARDS_PROMPT,
            GenerationKind::QuizQuestions => QUIZ_PROMPT,
            GenerationKind::Description => DESCRIPTION_PROMPT,
            GenerationKind::Summary => SUMMARY_PROMPT,
        };
        template.replace("{corpus}", corpus)
    }

    fn format(&self) -> OutputFormat {
        match self {
            GenerationKind::Flashcards | GenerationKind::QuizQuestions => OutputFormat::Json,
            GenerationKind::Description | GenerationKind::Summary => OutputFormat::PlainText,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFlashcard {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedQuizQuestion {
    pub question: String,
    pub options: [String; 4],
    pub answer: String,
}

/// The parsed reply for one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedContent {
    Flashcards(Vec<GeneratedFlashcard>),
    QuizQuestions(Vec<GeneratedQuizQuestion>),
    Text(String),
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Language model call failed: {0}")]
    Endpoint(#[from] PortError),
    #[error("Language model returned an empty response")]
    EmptyResponse,
    #[error("Language model response could not be parsed: {0}")]
    Malformed(String),
}

//=========================================================================================
// The Client
//=========================================================================================

/// Wraps a `LanguageModelService` with prompts and response parsing.
///
/// Each call hits the model exactly once; there is no retry. The number of
/// records returned is whatever survived validation, which may be fewer than
/// the prompt asks for, or none.
#[derive(Clone)]
pub struct ContentGenerator {
    model: Arc<dyn LanguageModelService>,
    call_timeout: Duration,
}

impl ContentGenerator {
    pub fn new(model: Arc<dyn LanguageModelService>, call_timeout: Duration) -> Self {
        Self { model, call_timeout }
    }

    pub async fn generate(
        &self,
        kind: GenerationKind,
        corpus: &str,
    ) -> Result<GeneratedContent, GenerationError> {
        let raw = self.complete(kind, corpus).await?;
        match kind {
            GenerationKind::Flashcards => parse_flashcards(&raw).map(GeneratedContent::Flashcards),
            GenerationKind::QuizQuestions => {
                parse_quiz_questions(&raw).map(GeneratedContent::QuizQuestions)
            }
            GenerationKind::Description | GenerationKind::Summary => {
                parse_text(&raw).map(GeneratedContent::Text)
            }
        }
    }

    pub async fn flashcards(
        &self,
        corpus: &str,
    ) -> Result<Vec<GeneratedFlashcard>, GenerationError> {
        let raw = self.complete(GenerationKind::Flashcards, corpus).await?;
        parse_flashcards(&raw)
    }

    pub async fn quiz_questions(
        &self,
        corpus: &str,
    ) -> Result<Vec<GeneratedQuizQuestion>, GenerationError> {
        let raw = self.complete(GenerationKind::QuizQuestions, corpus).await?;
        parse_quiz_questions(&raw)
    }

    pub async fn description(&self, corpus: &str) -> Result<String, GenerationError> {
        let raw = self.complete(GenerationKind::Description, corpus).await?;
        parse_text(&raw)
    }

    pub async fn summary(&self, corpus: &str) -> Result<String, GenerationError> {
        let raw = self.complete(GenerationKind::Summary, corpus).await?;
        parse_text(&raw)
    }

    async fn complete(
        &self,
        kind: GenerationKind,
        corpus: &str,
    ) -> Result<String, GenerationError> {
        let prompt = kind.prompt(corpus);
        debug!("Requesting {:?} for corpus of {} chars.", kind, corpus.len());
        let raw = bounded(
            self.call_timeout,
            "language model completion",
            self.model.complete(&prompt, kind.format()),
        )
        .await?;
        Ok(raw)
    }
}

//=========================================================================================
// Response Parsing
//=========================================================================================

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\s*```\s*$")
            .expect("code fence pattern is valid")
    })
}

/// Removes a surrounding markdown code fence, if there is one.
pub fn strip_code_fences(raw: &str) -> &str {
    match fence_regex().captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => raw.trim(),
    }
}

fn parse_text(raw: &str) -> Result<String, GenerationError> {
    let text = strip_code_fences(raw);
    if text.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(text.to_string())
}

/// Finds the list of candidate objects in a JSON reply.
///
/// Accepts a bare array, an object wrapping the array under any key, or a
/// single candidate object.
fn candidates(raw: &str) -> Result<Vec<Value>, GenerationError> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    let value: Value =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed(e.to_string()))?;
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(map) => {
            if map.contains_key("question") {
                return Ok(vec![Value::Object(map)]);
            }
            map.into_iter()
                .find_map(|(_, v)| match v {
                    Value::Array(items) => Some(items),
                    _ => None,
                })
                .ok_or_else(|| {
                    GenerationError::Malformed("JSON object holds no list of items".to_string())
                })
        }
        other => Err(GenerationError::Malformed(format!(
            "expected a JSON array or object, got {}",
            other
        ))),
    }
}

/// Reads a non-blank scalar field as text.
fn field_text(map: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match map.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

pub fn parse_flashcards(raw: &str) -> Result<Vec<GeneratedFlashcard>, GenerationError> {
    let mut cards = Vec::new();
    for candidate in candidates(raw)? {
        let parsed = candidate.as_object().and_then(|map| {
            Some(GeneratedFlashcard {
                question: field_text(map, "question")?,
                answer: field_text(map, "answer")?,
            })
        });
        match parsed {
            Some(card) => cards.push(card),
            None => warn!("Dropping invalid flashcard candidate: {}", candidate),
        }
    }
    Ok(cards)
}

pub fn parse_quiz_questions(raw: &str) -> Result<Vec<GeneratedQuizQuestion>, GenerationError> {
    let mut questions = Vec::new();
    for candidate in candidates(raw)? {
        let parsed = candidate.as_object().and_then(|map| {
            Some(GeneratedQuizQuestion {
                question: field_text(map, "question")?,
                options: [
                    field_text(map, "option1")?,
                    field_text(map, "option2")?,
                    field_text(map, "option3")?,
                    field_text(map, "option4")?,
                ],
                answer: field_text(map, "answer")?,
            })
        });
        match parsed {
            Some(q) if q.options.contains(&q.answer) => questions.push(q),
            Some(q) => warn!(
                "Dropping quiz question whose answer '{}' is not one of its options: {}",
                q.answer, q.question
            ),
            None => warn!("Dropping invalid quiz candidate: {}", candidate),
        }
    }
    Ok(questions)
}
