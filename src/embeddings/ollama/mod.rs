#[cfg(test)]
mod tests;

use anyhow::{Context, Result, anyhow, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::RagError;
use crate::config::OllamaConfig;
use crate::embeddings::Embedder;

/// Output size of all-MiniLM-L6-v2
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
/// A failed request is reported, not repeated, unless a caller opts in
const DEFAULT_RETRY_ATTEMPTS: u32 = 1;

const TAGS_PATH: &str = "/api/tags";
const EMBED_PATH: &str = "/api/embed";

/// Blocking client for the Ollama embedding API
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: u32,
    embedding_dimension: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff_unit: Duration,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// A locally pulled model as listed by `/api/tags`
#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

/// What to do after a failed HTTP attempt
enum Attempt {
    Retry(anyhow::Error),
    GiveUp(anyhow::Error),
}

fn classify(error: ureq::Error) -> Attempt {
    match error {
        ureq::Error::StatusCode(status) if status >= 500 => {
            Attempt::Retry(anyhow!("Server error: HTTP {}", status))
        }
        ureq::Error::StatusCode(status) => Attempt::GiveUp(anyhow!("Client error: HTTP {}", status)),
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => Attempt::Retry(anyhow!("Transport error: {}", error)),
        other => Attempt::GiveUp(anyhow!("Non-retryable error: {}", other)),
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            batch_size: config.batch_size.max(1),
            embedding_dimension: config.embedding_dimension as usize,
            agent: build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff_unit: Duration::from_secs(1),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    /// Total attempts per request, at least one. Defaults to a single
    /// attempt so network faults surface immediately.
    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base delay between retries, doubled after each failed attempt
    #[inline]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Reachability plus model availability
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        self.validate_model().context("Model validation failed")?;

        info!("Ollama at {} is serving {}", self.base_url, self.model);
        Ok(())
    }

    /// Fail unless the configured model has been pulled
    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        let models = self.list_models().context("Failed to list models")?;

        if models.iter().any(|m| m.name == self.model) {
            debug!("Model {} is available", self.model);
            return Ok(());
        }

        let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        warn!("Model {} not found, available: {:?}", self.model, available);
        bail!(
            "Model '{}' is not available. Pull it with `ollama pull {}`. Available models: {:?}",
            self.model,
            self.model,
            available
        )
    }

    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let tags: TagsResponse = self.get_json(TAGS_PATH).context("Failed to fetch models")?;
        debug!("Ollama lists {} models", tags.models.len());
        Ok(tags.models)
    }

    /// Embed `texts` in requests of at most `batch_size` inputs, returning
    /// one vector per text in input order
    #[inline]
    pub fn generate_embeddings_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size as usize) {
            let request = EmbedRequest {
                model: &self.model,
                input: batch,
            };
            let response: EmbedResponse = self
                .post_json(EMBED_PATH, &request)
                .with_context(|| format!("Failed to embed batch of {} texts", batch.len()))?;

            self.check_embeddings(batch.len(), &response.embeddings)?;
            vectors.extend(response.embeddings);
        }

        debug!("Embedded {} texts with {}", vectors.len(), self.model);
        Ok(vectors)
    }

    fn check_embeddings(&self, expected: usize, embeddings: &[Vec<f32>]) -> Result<()> {
        if embeddings.len() != expected {
            bail!(
                "Ollama returned {} embeddings for {} inputs",
                embeddings.len(),
                expected
            );
        }

        if let Some(wrong) = embeddings.iter().find(|e| e.len() != self.embedding_dimension) {
            bail!(
                "Model '{}' returned {} dimensions, expected {}",
                self.model,
                wrong.len(),
                self.embedding_dimension
            );
        }

        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Failed to build URL for {}", path))
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        let body = self.with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;
        serde_json::from_str(&body).with_context(|| format!("Failed to parse response from {}", path))
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.endpoint(path)?;
        let payload = serde_json::to_string(body).context("Failed to serialize request")?;
        let response = self.with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&payload)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;
        serde_json::from_str(&response)
            .with_context(|| format!("Failed to parse response from {}", path))
    }

    /// `backoff_unit * 2^(attempt - 1)`, saturating instead of overflowing
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_unit.saturating_mul(factor)
    }

    /// Run `request` until it succeeds, fails permanently or runs out of
    /// attempts. Delays grow as `backoff_unit * 2^(attempt - 1)`.
    fn with_retry<F>(&self, mut request: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut attempt = 1;
        loop {
            let failure = match request() {
                Ok(body) => return Ok(body),
                Err(e) => classify(e),
            };

            match failure {
                Attempt::GiveUp(e) => {
                    warn!("{}, not retrying", e);
                    return Err(e);
                }
                Attempt::Retry(e) if attempt >= self.retry_attempts => {
                    error!(
                        "Request to {} failed after {} attempts: {}",
                        self.base_url, attempt, e
                    );
                    return Err(e);
                }
                Attempt::Retry(e) => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        "{} (attempt {}/{}), retrying in {:?}",
                        e, attempt, self.retry_attempts, delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl Embedder for OllamaClient {
    #[inline]
    fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    fn embed_documents(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        self.generate_embeddings_batch(texts)
            .map_err(|e| RagError::EmbeddingFailure(format!("{:#}", e)))
    }
}
