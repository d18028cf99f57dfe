//! services/api/src/adapters/llm.rs
//!
//! This module contains the adapter for the generation LLM.
//! It implements the `LanguageModelService` port from the `core` crate against any
//! endpoint speaking the OpenAI chat completions protocol (Gemini included).

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use study_companion_core::ports::{LanguageModelService, OutputFormat, PortError, PortResult};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `LanguageModelService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiCompletionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiCompletionAdapter {
    /// Creates a new `OpenAiCompletionAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `LanguageModelService` Trait Implementation
//=========================================================================================

#[async_trait]
impl LanguageModelService for OpenAiCompletionAdapter {
    async fn complete(&self, prompt: &str, format: OutputFormat) -> PortResult<String> {
        let messages = vec![ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into()];

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(messages).n(1);
        if format == OutputFormat::Json {
            args.response_format(ResponseFormat::JsonObject);
        }
        let request = args
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            PortError::Unexpected("Generation LLM returned no choices in its response.".to_string())
        })?;
        let content = choice.message.content.ok_or_else(|| {
            PortError::Unexpected("Generation LLM response contained no text content.".to_string())
        })?;
        debug!("Generation LLM answered with {} chars.", content.len());
        Ok(content)
    }
}
