//! crates/study_companion_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Card color used when the caller does not pick one.
pub const DEFAULT_CARD_COLOR: &str = "#C0A080";

/// A named study-set built from user-supplied source material.
#[derive(Debug, Clone, PartialEq)]
pub struct Reviewer {
    pub id: Uuid,
    pub name: String,
    pub source_text: String,
    pub owner_id: Uuid,
    /// Legacy records may carry no timestamp; listings treat them as the oldest.
    pub created_at: Option<DateTime<Utc>>,
    pub card_color: String,
    pub ai_description: String,
}

/// The fields of a reviewer before the store assigns its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReviewer {
    pub name: String,
    pub source_text: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub card_color: String,
    pub ai_description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flashcard {
    pub id: Uuid,
    pub front: String,
    pub back: String,
    pub reviewer_id: Uuid,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFlashcard {
    pub front: String,
    pub back: String,
    pub reviewer_id: Uuid,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A multiple-choice question. `answer` is expected to equal one of the options.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizQuestion {
    pub id: Uuid,
    pub question: String,
    pub options: [String; 4],
    pub answer: String,
    pub reviewer_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl QuizQuestion {
    pub fn answer_is_an_option(&self) -> bool {
        self.options.iter().any(|o| o == &self.answer)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewQuizQuestion {
    pub question: String,
    pub options: [String; 4],
    pub answer: String,
    pub reviewer_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub id: Uuid,
    pub reviewer_id: Uuid,
    pub summary_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSummary {
    pub reviewer_id: Uuid,
    pub summary_text: String,
    pub created_at: DateTime<Utc>,
}

/// The persisted study artifacts that hang off a reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Flashcards,
    QuizQuestions,
    Summary,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Flashcards => "flashcards",
            ArtifactKind::QuizQuestions => "quiz_questions",
            ArtifactKind::Summary => "summary",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "flashcards" => Some(ArtifactKind::Flashcards),
            "quiz" | "quiz_questions" => Some(ArtifactKind::QuizQuestions),
            "summary" => Some(ArtifactKind::Summary),
            _ => None,
        }
    }
}

/// A single atomic write of generated artifacts.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactBatch {
    Flashcards(Vec<NewFlashcard>),
    QuizQuestions(Vec<NewQuizQuestion>),
    Summary(NewSummary),
}

impl ArtifactBatch {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            ArtifactBatch::Flashcards(_) => ArtifactKind::Flashcards,
            ArtifactBatch::QuizQuestions(_) => ArtifactKind::QuizQuestions,
            ArtifactBatch::Summary(_) => ArtifactKind::Summary,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArtifactBatch::Flashcards(cards) => cards.len(),
            ArtifactBatch::QuizQuestions(questions) => questions.len(),
            ArtifactBatch::Summary(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a conditional batch insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchInsert {
    Inserted(usize),
    /// The reviewer already had this many artifacts of the kind; nothing was written.
    AlreadyPresent(usize),
}

/// The single field an artifact query filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFilter {
    Reviewer(Uuid),
    Owner(Uuid),
}

/// What happens to a reviewer's artifacts when it is duplicated for sharing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicationPolicy {
    /// Copy the reviewer record only. The new owner starts with no artifacts.
    #[default]
    MetadataOnly,
    /// Copy flashcards, quiz questions and summary along with the record.
    WithArtifacts,
}

/// One uploaded binary document awaiting text conversion.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

/// The raw material a reviewer is built from.
#[derive(Debug, Clone, Default)]
pub struct StudyInput {
    pub plain_text: Option<String>,
    pub documents: Vec<SourceDocument>,
}

/// A user account, as seen by the rest of the application.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// Only used internally for login/signup. Contains the password hash.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

/// The editable part of a user's profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDetails {
    pub first_name: String,
    pub last_name: String,
    pub mobile_number: String,
    /// Url of the profile picture; `None` shows the default avatar.
    pub profile_picture: Option<String>,
}

impl ProfileDetails {
    /// Trims every field and turns a blank picture url into `None`.
    pub fn normalized(self) -> Self {
        let picture = self.profile_picture.map(|p| p.trim().to_string());
        Self {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            mobile_number: self.mobile_number.trim().to_string(),
            profile_picture: picture.filter(|p| !p.is_empty()),
        }
    }

    /// Names of the required fields that are blank.
    pub fn missing_required(&self) -> Vec<&'static str> {
        [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("mobile_number", &self.mobile_number),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub details: ProfileDetails,
    /// Set until the first successful login after signup.
    pub is_first_run: bool,
}

/// A browser/mobile login session (auth cookie).
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_details_are_trimmed_and_checked() {
        let details = ProfileDetails {
            first_name: "  Ana ".into(),
            last_name: "   ".into(),
            mobile_number: "0917".into(),
            profile_picture: Some("  ".into()),
        }
        .normalized();
        assert_eq!(details.first_name, "Ana");
        assert_eq!(details.profile_picture, None);
        assert_eq!(details.missing_required(), vec!["last_name"]);
    }

    #[test]
    fn artifact_kind_parses_route_names() {
        assert_eq!(ArtifactKind::parse("Flashcards"), Some(ArtifactKind::Flashcards));
        assert_eq!(ArtifactKind::parse(" quiz "), Some(ArtifactKind::QuizQuestions));
        assert_eq!(ArtifactKind::parse("quiz_questions"), Some(ArtifactKind::QuizQuestions));
        assert_eq!(ArtifactKind::parse("summary"), Some(ArtifactKind::Summary));
        assert_eq!(ArtifactKind::parse("chat"), None);
    }

    #[test]
    fn answer_must_match_an_option_exactly() {
        let mut q = QuizQuestion {
            id: Uuid::new_v4(),
            question: "What is LIFO?".into(),
            options: [
                "Last In First Out".into(),
                "First In First Out".into(),
                "Least Input".into(),
                "None".into(),
            ],
            answer: "Last In First Out".into(),
            reviewer_id: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        assert!(q.answer_is_an_option());
        q.answer = "last in first out".into();
        assert!(!q.answer_is_an_option());
    }
}
