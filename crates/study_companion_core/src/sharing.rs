//! crates/study_companion_core/src/sharing.rs
//!
//! Share codes and the duplication flow that gives a second user their own
//! copy of a reviewer.

use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{DuplicationPolicy, Reviewer};
use crate::ports::{bounded, PortError, StudyStore};

const SHARE_URI_PREFIX: &str = "gabai://reviewer/";

#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("'{0}' is not a valid share code")]
    InvalidCode(String),
    #[error("The shared reviewer is no longer available")]
    NotFound,
    #[error("Failed to copy the shared reviewer: {0}")]
    Failed(PortError),
}

/// The code encoded into a reviewer's QR image.
pub fn share_code_for(reviewer_id: Uuid) -> String {
    format!("{}{}", SHARE_URI_PREFIX, reviewer_id)
}

/// Accepts a bare reviewer id or a `gabai://reviewer/<id>` uri.
pub fn parse_share_code(code: &str) -> Result<Uuid, ShareError> {
    let trimmed = code.trim();
    let id = trimmed.strip_prefix(SHARE_URI_PREFIX).unwrap_or(trimmed);
    Uuid::parse_str(id.trim_end_matches('/'))
        .map_err(|_| ShareError::InvalidCode(trimmed.to_string()))
}

/// Copies the reviewer behind `code` into `new_owner`'s library.
///
/// The copy gets a fresh id and timestamp. Whether flashcards, quiz questions
/// and the summary come along is decided by `policy`.
pub async fn import_shared_reviewer(
    store: &dyn StudyStore,
    code: &str,
    new_owner: Uuid,
    policy: DuplicationPolicy,
    call_timeout: Duration,
) -> Result<Reviewer, ShareError> {
    let source_id = parse_share_code(code)?;
    let copy = bounded(
        call_timeout,
        "reviewer duplication",
        store.duplicate_reviewer(source_id, new_owner, Utc::now(), policy),
    )
    .await
    .map_err(|e| match e {
        PortError::NotFound(_) => ShareError::NotFound,
        other => {
            warn!("Duplicating reviewer {} failed: {}", source_id, other);
            ShareError::Failed(other)
        }
    })?;
    info!(
        "Duplicated reviewer {} as {} for user {} ({:?}).",
        source_id, copy.id, new_owner, policy
    );
    Ok(copy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_codes_round_trip_through_the_uri_form() {
        let id = Uuid::new_v4();
        assert_eq!(parse_share_code(&share_code_for(id)).unwrap(), id);
    }

    #[test]
    fn bare_ids_with_whitespace_are_accepted() {
        let id = Uuid::new_v4();
        assert_eq!(parse_share_code(&format!("  {}\n", id)).unwrap(), id);
    }

    #[test]
    fn garbage_is_an_invalid_code() {
        assert!(matches!(
            parse_share_code("https://example.com/not-a-reviewer"),
            Err(ShareError::InvalidCode(_))
        ));
        assert!(matches!(parse_share_code(""), Err(ShareError::InvalidCode(_))));
    }
}
