pub mod domain;
pub mod extraction;
pub mod generation;
pub mod pipeline;
pub mod ports;
pub mod queries;
pub mod session;
pub mod sharing;
pub mod timer;

pub use domain::{
    ArtifactBatch, ArtifactFilter, ArtifactKind, AuthSession, BatchInsert, DuplicationPolicy,
    Flashcard, NewReviewer, ProfileDetails, QuizQuestion, Reviewer, SourceDocument, StudyInput,
    Summary, User, UserCredentials, UserProfile,
};
pub use generation::{ContentGenerator, GenerationKind};
pub use pipeline::{CreateReviewerRequest, PipelineSettings, ReviewerPipeline};
pub use ports::{
    AccountStore, DocumentConversionService, LanguageModelService, OutputFormat, PortError,
    PortResult, StudyStore,
};
pub use session::{QuizSession, StudyMode, StudySession, StudyStyle};
pub use timer::{StudyTimer, TimerPhase, TimerSnapshot};
