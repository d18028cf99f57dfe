pub mod auth;
pub mod middleware;
pub mod profile;
pub mod rest;
pub mod state;

pub use middleware::require_auth;
pub use profile::{get_profile_handler, update_profile_handler};
pub use rest::{
    create_reviewer_handler, generate_handler, get_reviewer_handler, get_summary_handler,
    import_shared_handler, list_flashcards_handler, list_quiz_handler, list_reviewers_handler,
    list_user_flashcards_handler, share_code_handler,
};
