
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use super::{EmbeddingError, EmbeddingProvider, normalize_query_text};
use crate::config::EmbeddingConfig;

const EMBEDDINGS_PATH: &str = "v1/embeddings";
const MODELS_PATH: &str = "v1/models";

/// Client for OpenAI-compatible `/v1/embeddings` endpoints
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: Url,
    model: String,
    api_key: String,
    dimensions: Option<u32>,
    timeout: Duration,
    connect_timeout: Duration,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url.as_str())
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("dimensions", &self.dimensions)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    /// Build a client from configuration, resolving the API key from the
    /// environment when it is not set inline
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config
            .base_url()
            .context("Failed to parse embedding provider URL from config")?;

        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| EmbeddingError::MissingApiKey {
                env_var: config.api_key_env.clone(),
            })?;

        Ok(Self::from_parts(base_url, &config.model, api_key)
            .with_dimensions(config.dimensions)
            .with_timeouts(config.timeout(), config.connect_timeout()))
    }

    /// Build a client with default timeouts
    #[inline]
    pub fn from_parts(base_url: Url, model: &str, api_key: String) -> Self {
        let timeout = Duration::from_secs(crate::config::DEFAULT_EMBEDDING_TIMEOUT_SECS);
        let connect_timeout =
            Duration::from_secs(crate::config::DEFAULT_EMBEDDING_CONNECT_TIMEOUT_SECS);

        Self {
            base_url: with_trailing_slash(base_url),
            model: model.to_string(),
            api_key,
            dimensions: None,
            timeout,
            connect_timeout,
            agent: build_agent(timeout, connect_timeout),
        }
    }

    #[inline]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let connect_timeout = self.connect_timeout.min(timeout);
        self.with_timeouts(timeout, connect_timeout)
    }

    #[inline]
    pub fn with_timeouts(mut self, timeout: Duration, connect_timeout: Duration) -> Self {
        self.timeout = timeout;
        self.connect_timeout = connect_timeout;
        self.agent = build_agent(timeout, connect_timeout);
        self
    }

    #[inline]
    pub fn with_dimensions(mut self, dimensions: Option<u32>) -> Self {
        self.dimensions = dimensions;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check that the provider is reachable and accepts our credentials
    #[inline]
    pub fn ping(&self) -> Result<(), EmbeddingError> {
        let url = self.endpoint(MODELS_PATH)?;
        debug!("Pinging embedding provider at {}", url);

        let mut response = self
            .agent
            .get(url.as_str())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .call()
            .map_err(transport_error)?;

        let status = response.status();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(transport_error)?;

        if status.is_success() {
            debug!("Embedding provider ping successful");
            Ok(())
        } else {
            Err(status_error(status.as_u16(), &body))
        }
    }

    /// Generate an embedding for a single query, blocking the current thread
    #[inline]
    pub fn embed_blocking(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let input = normalize_query_text(text);
        debug!("Generating embedding for text (length: {})", input.len());

        let request = EmbedRequest {
            model: &self.model,
            input: &input,
            dimensions: self.dimensions,
        };
        let request_json = serde_json::to_string(&request).map_err(|e| {
            EmbeddingError::MalformedResponse(format!("Failed to serialize request: {}", e))
        })?;

        let url = self.endpoint(EMBEDDINGS_PATH)?;

        let mut response = self
            .agent
            .post(url.as_str())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send(&request_json)
            .map_err(|e| {
                error!("Embedding request to {} failed: {}", url, e);
                transport_error(e)
            })?;

        let status = response.status();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(transport_error)?;

        if !status.is_success() {
            let err = status_error(status.as_u16(), &body);
            warn!("{}", err);
            return Err(err);
        }

        let parsed: EmbedResponse = serde_json::from_str(&body)
            .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .filter(|embedding| !embedding.is_empty())
            .ok_or(EmbeddingError::EmptyResult)?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }

    fn endpoint(&self, path: &str) -> Result<Url, EmbeddingError> {
        self.base_url.join(path).map_err(|e| {
            EmbeddingError::Unavailable(format!("Failed to build {} URL: {}", path, e))
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let client = self.clone();
        let text = text.to_string();

        tokio::task::spawn_blocking(move || client.embed_blocking(&text))
            .await
            .map_err(|e| EmbeddingError::Unavailable(format!("Embedding task failed: {}", e)))?
    }
}

fn build_agent(timeout: Duration, connect_timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .timeout_connect(Some(connect_timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn transport_error(error: ureq::Error) -> EmbeddingError {
    match error {
        ureq::Error::Timeout(_) => EmbeddingError::Timeout,
        ureq::Error::Io(ref io) if io.kind() == std::io::ErrorKind::TimedOut => {
            EmbeddingError::Timeout
        }
        ureq::Error::StatusCode(status) => EmbeddingError::Status {
            status,
            message: format!("Unknown error (HTTP {})", status),
        },
        other => EmbeddingError::Unavailable(other.to_string()),
    }
}

fn status_error(status: u16, body: &str) -> EmbeddingError {
    let message = serde_json::from_str::<ErrorResponse>(body).map_or_else(
        |_| format!("Unknown error (HTTP {})", status),
        |response| response.error.message,
    );
    EmbeddingError::Status { status, message }
}
