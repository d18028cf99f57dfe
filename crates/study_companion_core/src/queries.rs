//! crates/study_companion_core/src/queries.rs
//!
//! Read-side operations used by the study screens.

use std::cmp::Reverse;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{ArtifactFilter, Flashcard, QuizQuestion, Reviewer};
use crate::ports::{bounded, PortResult, StudyStore};

pub async fn fetch_reviewer_meta(
    store: &dyn StudyStore,
    reviewer_id: Uuid,
    call_timeout: Duration,
) -> PortResult<Reviewer> {
    bounded(call_timeout, "reviewer lookup", store.get_reviewer(reviewer_id)).await
}

/// The owner's reviewers, newest first. Undated records sort last.
pub async fn list_reviewers(
    store: &dyn StudyStore,
    owner_id: Uuid,
    call_timeout: Duration,
) -> PortResult<Vec<Reviewer>> {
    let mut reviewers =
        bounded(call_timeout, "reviewer listing", store.reviewers_by_owner(owner_id)).await?;
    sort_newest_first(&mut reviewers);
    Ok(reviewers)
}

pub fn sort_newest_first(reviewers: &mut [Reviewer]) {
    // `None < Some(_)`, so undated reviewers count as the earliest.
    reviewers.sort_by_key(|r| Reverse(r.created_at));
}

pub async fn fetch_flashcards(
    store: &dyn StudyStore,
    reviewer_id: Uuid,
    call_timeout: Duration,
) -> PortResult<Vec<Flashcard>> {
    let filter = ArtifactFilter::Reviewer(reviewer_id);
    bounded(call_timeout, "flashcard query", store.flashcards(filter)).await
}

pub async fn fetch_user_flashcards(
    store: &dyn StudyStore,
    owner_id: Uuid,
    call_timeout: Duration,
) -> PortResult<Vec<Flashcard>> {
    let filter = ArtifactFilter::Owner(owner_id);
    bounded(call_timeout, "flashcard query", store.flashcards(filter)).await
}

/// All quiz questions of a reviewer. Questions whose answer is not among
/// their options are returned as-is but logged.
pub async fn fetch_quiz_questions(
    store: &dyn StudyStore,
    reviewer_id: Uuid,
    call_timeout: Duration,
) -> PortResult<Vec<QuizQuestion>> {
    let questions =
        bounded(call_timeout, "quiz query", store.quiz_questions(reviewer_id)).await?;
    for q in questions.iter().filter(|q| !q.answer_is_an_option()) {
        warn!(
            "Quiz question {} of reviewer {} has an answer outside its options.",
            q.id, reviewer_id
        );
    }
    Ok(questions)
}

/// `Ok(None)` when no summary was generated for the reviewer.
pub async fn fetch_summary(
    store: &dyn StudyStore,
    reviewer_id: Uuid,
    call_timeout: Duration,
) -> PortResult<Option<String>> {
    let summary = bounded(call_timeout, "summary query", store.summary(reviewer_id)).await?;
    Ok(summary.map(|s| s.summary_text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn reviewer(name: &str, day: Option<u32>) -> Reviewer {
        Reviewer {
            id: Uuid::new_v4(),
            name: name.to_string(),
            source_text: String::new(),
            owner_id: Uuid::nil(),
            created_at: day.map(|d| Utc.with_ymd_and_hms(2025, 1, d, 0, 0, 0).unwrap()),
            card_color: "#C0A080".to_string(),
            ai_description: String::new(),
        }
    }

    #[test]
    fn newest_first_with_undated_last() {
        let mut list = vec![
            reviewer("old", Some(1)),
            reviewer("undated", None),
            reviewer("new", Some(9)),
            reviewer("mid", Some(5)),
        ];
        sort_newest_first(&mut list);
        let names: Vec<_> = list.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["new", "mid", "old", "undated"]);
    }
}
