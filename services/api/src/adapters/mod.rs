pub mod convert;
pub mod db;
pub mod llm;

pub use convert::ConvertApiAdapter;
pub use db::DbAdapter;
pub use llm::OpenAiCompletionAdapter;
