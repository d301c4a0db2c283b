//! The AI assistant behind `/chat`, the Slack bot and the interactive CLI.

mod openai;
mod repl;

pub use openai::OpenAiAssistant;
pub use repl::{run_repl, HELP_TEXT};

use async_trait::async_trait;
use thiserror::Error;

/// System prompt that scopes the assistant to data engineering work.
pub const SYSTEM_PROMPT: &str = "You are a data pipeline debugging assistant specialized in \
helping data engineers optimize, debug, and monitor their data pipelines. You have expertise \
in tools like Airflow, Spark, Kafka, and various ETL processes.";

/// Shown to users when the upstream model cannot be reached.
pub const FALLBACK_REPLY: &str = "I'm having trouble connecting to the AI service. \
Please check your API key and internet connection.";

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("No API key configured for the AI service")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("AI service returned no choices")]
    EmptyResponse,
}

/// Something that can answer a user prompt.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn reply(&self, prompt: &str) -> Result<String, AssistantError>;
}

/// Ask the assistant, falling back to [`FALLBACK_REPLY`] on failure.
///
/// The second element is `false` when the fallback was used.
pub async fn reply_or_fallback(assistant: &dyn Assistant, prompt: &str) -> (String, bool) {
    match assistant.reply(prompt).await {
        Ok(reply) => (reply, true),
        Err(e) => {
            tracing::error!("Assistant request failed: {}", e);
            (FALLBACK_REPLY.to_string(), false)
        }
    }
}
