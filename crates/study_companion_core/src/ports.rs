//! crates/study_companion_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete store, conversion service and language model.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    ArtifactBatch, ArtifactFilter, ArtifactKind, BatchInsert, DuplicationPolicy, Flashcard,
    NewReviewer, ProfileDetails, QuizQuestion, Reviewer, Summary, User, UserCredentials,
    UserProfile,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Already exists: {0}")]
    Conflict(String),
    #[error("Timed out: {0}")]
    Timeout(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Runs a port call under a deadline. Expiry becomes `PortError::Timeout`.
pub async fn bounded<T, F>(limit: Duration, what: &str, call: F) -> PortResult<T>
where
    F: Future<Output = PortResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(PortError::Timeout(format!("{} exceeded {:?}", what, limit))),
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The document store holding reviewers and their generated artifacts.
#[async_trait]
pub trait StudyStore: Send + Sync {
    /// Single-document insert; the store assigns the identifier.
    async fn create_reviewer(&self, reviewer: NewReviewer) -> PortResult<Reviewer>;

    async fn get_reviewer(&self, reviewer_id: Uuid) -> PortResult<Reviewer>;

    /// Unordered. Callers sort.
    async fn reviewers_by_owner(&self, owner_id: Uuid) -> PortResult<Vec<Reviewer>>;

    /// Atomic multi-document insert: every record is written or none is.
    async fn insert_batch(&self, batch: ArtifactBatch) -> PortResult<()>;

    /// Inserts `batch` only when `reviewer_id` has no artifacts of the batch's
    /// kind yet. The check and the insert are one atomic step, so concurrent
    /// callers never both write.
    async fn insert_batch_if_absent(
        &self,
        reviewer_id: Uuid,
        batch: ArtifactBatch,
    ) -> PortResult<BatchInsert>;

    async fn flashcards(&self, filter: ArtifactFilter) -> PortResult<Vec<Flashcard>>;

    async fn quiz_questions(&self, reviewer_id: Uuid) -> PortResult<Vec<QuizQuestion>>;

    /// `Ok(None)` when the reviewer has no summary yet.
    async fn summary(&self, reviewer_id: Uuid) -> PortResult<Option<Summary>>;

    async fn count_artifacts(&self, reviewer_id: Uuid, kind: ArtifactKind) -> PortResult<usize>;

    /// Clones `source_id` under `new_owner` with a fresh id and timestamp.
    async fn duplicate_reviewer(
        &self,
        source_id: Uuid,
        new_owner: Uuid,
        created_at: DateTime<Utc>,
        policy: DuplicationPolicy,
    ) -> PortResult<Reviewer>;
}

/// Accounts and login sessions backing the identity provider.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// New users start with `is_first_run` set.
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        details: &ProfileDetails,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_profile(&self, user_id: Uuid) -> PortResult<UserProfile>;

    async fn update_profile(&self, user_id: Uuid, details: &ProfileDetails)
        -> PortResult<UserProfile>;

    /// Clears the first-run flag and returns whether it was still set.
    async fn take_first_run(&self, user_id: Uuid) -> PortResult<bool>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Returns the owning user of a live (unexpired) session.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}

#[async_trait]
pub trait DocumentConversionService: Send + Sync {
    /// Converts a binary document into plain text.
    async fn convert(&self, data: &[u8], file_name: &str, mime_type: &str) -> PortResult<String>;
}

/// The shape a language model is asked to answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    PlainText,
}

#[async_trait]
pub trait LanguageModelService: Send + Sync {
    /// Sends one prompt and returns the raw completion text.
    async fn complete(&self, prompt: &str, format: OutputFormat) -> PortResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_passes_through_fast_results() {
        let result = bounded(Duration::from_secs(1), "noop", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn bounded_turns_expiry_into_timeout() {
        let result: PortResult<()> = bounded(Duration::from_millis(10), "slow call", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        match result {
            Err(PortError::Timeout(msg)) => assert!(msg.contains("slow call")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
