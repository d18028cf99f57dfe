//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use std::sync::Arc;
use std::time::Duration;
use study_companion_core::pipeline::ReviewerPipeline;
use study_companion_core::ports::{AccountStore, StudyStore};

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountStore>,
    pub store: Arc<dyn StudyStore>,
    pub pipeline: Arc<ReviewerPipeline>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Deadline for the store reads behind the query endpoints.
    pub fn read_timeout(&self) -> Duration {
        self.pipeline.settings().call_timeout
    }
}
