//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `StudyStore` and `AccountStore` ports from the `core` crate. It handles all
//! interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use study_companion_core::domain::{
    ArtifactBatch, ArtifactFilter, ArtifactKind, BatchInsert, DuplicationPolicy, Flashcard,
    NewReviewer, ProfileDetails, QuizQuestion, Reviewer, Summary, User, UserCredentials,
    UserProfile,
};
use study_companion_core::ports::{AccountStore, PortError, PortResult, StudyStore};
use tracing::{debug, error};
use uuid::Uuid;

const FOREIGN_KEY_VIOLATION: &str = "23503";
const UNIQUE_VIOLATION: &str = "23505";

const REVIEWER_COLUMNS: &str =
    "id, name, source_text, owner_id, created_at, card_color, ai_description";
const PROFILE_COLUMNS: &str =
    "user_id, email, first_name, last_name, mobile_number, profile_picture, is_first_run";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the store ports on PostgreSQL.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    error!("Database error: {}", e);
    PortError::Unexpected(e.to_string())
}

/// Maps constraint violations on writes to the matching port error.
fn write_error(e: sqlx::Error, what: &str) -> PortError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) => {
            PortError::NotFound(format!("{} references a missing reviewer", what))
        }
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            PortError::Conflict(what.to_string())
        }
        _ => unexpected(e),
    }
}

fn reviewer_not_found(id: Uuid) -> PortError {
    PortError::NotFound(format!("Reviewer {} not found", id))
}

fn user_not_found(id: Uuid) -> PortError {
    PortError::NotFound(format!("User {} not found", id))
}

fn count_sql(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Flashcards => "SELECT COUNT(*) FROM flashcards WHERE reviewer_id = $1",
        ArtifactKind::QuizQuestions => "SELECT COUNT(*) FROM quiz_questions WHERE reviewer_id = $1",
        ArtifactKind::Summary => "SELECT COUNT(*) FROM summaries WHERE reviewer_id = $1",
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ReviewerRecord {
    id: Uuid,
    name: String,
    source_text: String,
    owner_id: Uuid,
    created_at: Option<DateTime<Utc>>,
    card_color: String,
    ai_description: String,
}
impl ReviewerRecord {
    fn to_domain(self) -> Reviewer {
        Reviewer {
            id: self.id,
            name: self.name,
            source_text: self.source_text,
            owner_id: self.owner_id,
            created_at: self.created_at,
            card_color: self.card_color,
            ai_description: self.ai_description,
        }
    }
}

#[derive(FromRow)]
struct FlashcardRecord {
    id: Uuid,
    reviewer_id: Uuid,
    owner_id: Uuid,
    front: String,
    back: String,
    created_at: DateTime<Utc>,
}
impl FlashcardRecord {
    fn to_domain(self) -> Flashcard {
        Flashcard {
            id: self.id,
            front: self.front,
            back: self.back,
            reviewer_id: self.reviewer_id,
            owner_id: self.owner_id,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct QuizQuestionRecord {
    id: Uuid,
    reviewer_id: Uuid,
    question: String,
    option1: String,
    option2: String,
    option3: String,
    option4: String,
    answer: String,
    created_at: DateTime<Utc>,
}
impl QuizQuestionRecord {
    fn to_domain(self) -> QuizQuestion {
        QuizQuestion {
            id: self.id,
            question: self.question,
            options: [self.option1, self.option2, self.option3, self.option4],
            answer: self.answer,
            reviewer_id: self.reviewer_id,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct SummaryRecord {
    id: Uuid,
    reviewer_id: Uuid,
    summary_text: String,
    created_at: DateTime<Utc>,
}
impl SummaryRecord {
    fn to_domain(self) -> Summary {
        Summary {
            id: self.id,
            reviewer_id: self.reviewer_id,
            summary_text: self.summary_text,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: Option<String>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            email: self.email,
        }
    }
}

#[derive(FromRow)]
struct ProfileRecord {
    user_id: Uuid,
    email: Option<String>,
    first_name: String,
    last_name: String,
    mobile_number: String,
    profile_picture: Option<String>,
    is_first_run: bool,
}
impl ProfileRecord {
    fn to_domain(self) -> UserProfile {
        UserProfile {
            user_id: self.user_id,
            email: self.email,
            details: ProfileDetails {
                first_name: self.first_name,
                last_name: self.last_name,
                mobile_number: self.mobile_number,
                profile_picture: self.profile_picture,
            },
            is_first_run: self.is_first_run,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}

//=========================================================================================
// Batch Writers (run inside one transaction)
//=========================================================================================

async fn write_batch(
    tx: &mut Transaction<'_, Postgres>,
    batch: ArtifactBatch,
) -> Result<(), sqlx::Error> {
    match batch {
        ArtifactBatch::Flashcards(cards) => {
            for card in cards {
                sqlx::query(
                    "INSERT INTO flashcards (reviewer_id, owner_id, front, back, created_at) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(card.reviewer_id)
                .bind(card.owner_id)
                .bind(card.front)
                .bind(card.back)
                .bind(card.created_at)
                .execute(&mut **tx)
                .await?;
            }
        }
        ArtifactBatch::QuizQuestions(questions) => {
            for q in questions {
                let [option1, option2, option3, option4] = q.options;
                sqlx::query(
                    "INSERT INTO quiz_questions (reviewer_id, question, option1, option2, option3, option4, answer, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                )
                .bind(q.reviewer_id)
                .bind(q.question)
                .bind(option1)
                .bind(option2)
                .bind(option3)
                .bind(option4)
                .bind(q.answer)
                .bind(q.created_at)
                .execute(&mut **tx)
                .await?;
            }
        }
        ArtifactBatch::Summary(summary) => {
            sqlx::query(
                "INSERT INTO summaries (reviewer_id, summary_text, created_at) VALUES ($1, $2, $3)",
            )
            .bind(summary.reviewer_id)
            .bind(summary.summary_text)
            .bind(summary.created_at)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

async fn copy_artifacts(
    tx: &mut Transaction<'_, Postgres>,
    source_id: Uuid,
    copy_id: Uuid,
    new_owner: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO flashcards (reviewer_id, owner_id, front, back, created_at) \
         SELECT $2, $3, front, back, created_at FROM flashcards WHERE reviewer_id = $1",
    )
    .bind(source_id)
    .bind(copy_id)
    .bind(new_owner)
    .execute(&mut **tx)
    .await?;
    sqlx::query(
        "INSERT INTO quiz_questions (reviewer_id, question, option1, option2, option3, option4, answer, created_at) \
         SELECT $2, question, option1, option2, option3, option4, answer, created_at FROM quiz_questions WHERE reviewer_id = $1",
    )
    .bind(source_id)
    .bind(copy_id)
    .execute(&mut **tx)
    .await?;
    sqlx::query(
        "INSERT INTO summaries (reviewer_id, summary_text, created_at) \
         SELECT $2, summary_text, created_at FROM summaries WHERE reviewer_id = $1",
    )
    .bind(source_id)
    .bind(copy_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

//=========================================================================================
// `StudyStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl StudyStore for DbAdapter {
    async fn create_reviewer(&self, reviewer: NewReviewer) -> PortResult<Reviewer> {
        let sql = format!(
            "INSERT INTO reviewers (name, source_text, owner_id, created_at, card_color, ai_description) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            REVIEWER_COLUMNS
        );
        let record = sqlx::query_as::<_, ReviewerRecord>(&sql)
            .bind(reviewer.name)
            .bind(reviewer.source_text)
            .bind(reviewer.owner_id)
            .bind(reviewer.created_at)
            .bind(reviewer.card_color)
            .bind(reviewer.ai_description)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_reviewer(&self, reviewer_id: Uuid) -> PortResult<Reviewer> {
        let sql = format!("SELECT {} FROM reviewers WHERE id = $1", REVIEWER_COLUMNS);
        sqlx::query_as::<_, ReviewerRecord>(&sql)
            .bind(reviewer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .map(ReviewerRecord::to_domain)
            .ok_or_else(|| reviewer_not_found(reviewer_id))
    }

    async fn reviewers_by_owner(&self, owner_id: Uuid) -> PortResult<Vec<Reviewer>> {
        let sql = format!("SELECT {} FROM reviewers WHERE owner_id = $1", REVIEWER_COLUMNS);
        let records = sqlx::query_as::<_, ReviewerRecord>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn insert_batch(&self, batch: ArtifactBatch) -> PortResult<()> {
        let kind = batch.kind();
        let count = batch.len();
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        // Dropping the transaction on error rolls every row back.
        write_batch(&mut tx, batch)
            .await
            .map_err(|e| write_error(e, kind.as_str()))?;
        tx.commit().await.map_err(unexpected)?;
        debug!("Committed batch of {} {}.", count, kind.as_str());
        Ok(())
    }

    async fn insert_batch_if_absent(
        &self,
        reviewer_id: Uuid,
        batch: ArtifactBatch,
    ) -> PortResult<BatchInsert> {
        let kind = batch.kind();
        let count = batch.len();
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        // The row lock serialises conditional writers for this reviewer.
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM reviewers WHERE id = $1 FOR UPDATE")
            .bind(reviewer_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| reviewer_not_found(reviewer_id))?;

        let existing: i64 = sqlx::query_scalar(count_sql(kind))
            .bind(reviewer_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;
        if existing > 0 {
            debug!("Reviewer {} already has {} {}.", reviewer_id, existing, kind.as_str());
            return Ok(BatchInsert::AlreadyPresent(existing as usize));
        }

        write_batch(&mut tx, batch)
            .await
            .map_err(|e| write_error(e, kind.as_str()))?;
        tx.commit().await.map_err(unexpected)?;
        debug!("Committed batch of {} {}.", count, kind.as_str());
        Ok(BatchInsert::Inserted(count))
    }

    async fn flashcards(&self, filter: ArtifactFilter) -> PortResult<Vec<Flashcard>> {
        let (sql, id) = match filter {
            ArtifactFilter::Reviewer(id) => (
                "SELECT id, reviewer_id, owner_id, front, back, created_at FROM flashcards WHERE reviewer_id = $1",
                id,
            ),
            ArtifactFilter::Owner(id) => (
                "SELECT id, reviewer_id, owner_id, front, back, created_at FROM flashcards WHERE owner_id = $1",
                id,
            ),
        };
        let records = sqlx::query_as::<_, FlashcardRecord>(sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn quiz_questions(&self, reviewer_id: Uuid) -> PortResult<Vec<QuizQuestion>> {
        let records = sqlx::query_as::<_, QuizQuestionRecord>(
            "SELECT id, reviewer_id, question, option1, option2, option3, option4, answer, created_at FROM quiz_questions WHERE reviewer_id = $1",
        )
        .bind(reviewer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn summary(&self, reviewer_id: Uuid) -> PortResult<Option<Summary>> {
        let record = sqlx::query_as::<_, SummaryRecord>(
            "SELECT id, reviewer_id, summary_text, created_at FROM summaries WHERE reviewer_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(reviewer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn count_artifacts(&self, reviewer_id: Uuid, kind: ArtifactKind) -> PortResult<usize> {
        let count: i64 = sqlx::query_scalar(count_sql(kind))
            .bind(reviewer_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(count.max(0) as usize)
    }

    async fn duplicate_reviewer(
        &self,
        source_id: Uuid,
        new_owner: Uuid,
        created_at: DateTime<Utc>,
        policy: DuplicationPolicy,
    ) -> PortResult<Reviewer> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let sql = format!(
            "INSERT INTO reviewers (name, source_text, owner_id, created_at, card_color, ai_description) \
             SELECT name, source_text, $2, $3, card_color, ai_description FROM reviewers WHERE id = $1 \
             RETURNING {}",
            REVIEWER_COLUMNS
        );
        let copy = sqlx::query_as::<_, ReviewerRecord>(&sql)
            .bind(source_id)
            .bind(new_owner)
            .bind(created_at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| reviewer_not_found(source_id))?
            .to_domain();

        if policy == DuplicationPolicy::WithArtifacts {
            copy_artifacts(&mut tx, source_id, copy.id, new_owner)
                .await
                .map_err(unexpected)?;
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(copy)
    }
}

//=========================================================================================
// `AccountStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AccountStore for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        details: &ProfileDetails,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (email, hashed_password, first_name, last_name, mobile_number, profile_picture) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING user_id, email",
        )
        .bind(email)
        .bind(hashed_password)
        .bind(&details.first_name)
        .bind(&details.last_name)
        .bind(&details.mobile_number)
        .bind(&details.profile_picture)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "email is already registered"))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1 AND hashed_password IS NOT NULL",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))?;
        Ok(UserCredentials {
            user_id: record.user_id,
            email: record.email,
            hashed_password: record.hashed_password,
        })
    }

    async fn get_profile(&self, user_id: Uuid) -> PortResult<UserProfile> {
        let sql = format!("SELECT {} FROM users WHERE user_id = $1", PROFILE_COLUMNS);
        sqlx::query_as::<_, ProfileRecord>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .map(ProfileRecord::to_domain)
            .ok_or_else(|| user_not_found(user_id))
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        details: &ProfileDetails,
    ) -> PortResult<UserProfile> {
        let sql = format!(
            "UPDATE users SET first_name = $2, last_name = $3, mobile_number = $4, profile_picture = $5 \
             WHERE user_id = $1 RETURNING {}",
            PROFILE_COLUMNS
        );
        sqlx::query_as::<_, ProfileRecord>(&sql)
            .bind(user_id)
            .bind(&details.first_name)
            .bind(&details.last_name)
            .bind(&details.mobile_number)
            .bind(&details.profile_picture)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .map(ProfileRecord::to_domain)
            .ok_or_else(|| user_not_found(user_id))
    }

    async fn take_first_run(&self, user_id: Uuid) -> PortResult<bool> {
        // Reads the flag and clears it in one statement.
        sqlx::query_scalar::<_, bool>(
            "WITH previous AS (SELECT is_first_run FROM users WHERE user_id = $1 FOR UPDATE) \
             UPDATE users SET is_first_run = FALSE WHERE user_id = $1 \
             RETURNING (SELECT is_first_run FROM previous)",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| user_not_found(user_id))
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}
