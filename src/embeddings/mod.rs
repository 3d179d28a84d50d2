// Embeddings module
// Turns search text into query vectors through an external provider


pub mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),

    #[error("Embedding request timed out")]
    Timeout,

    #[error("Embedding provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("Embedding provider returned an empty result")]
    EmptyResult,

    #[error("No API key configured (set {env_var} or embedding.api_key)")]
    MissingApiKey { env_var: String },
}

/// Source of query vectors
///
/// Implementations make exactly one provider call per invocation and never
/// retry; retry policy belongs to the caller.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Normalize query text before submission
///
/// Newlines are replaced by spaces, which some providers require for
/// consistent embeddings.
#[inline]
pub fn normalize_query_text(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}
