
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::RecallError;
use crate::chunking::{estimate_tokens, is_embeddable, truncate_to_limit};
use crate::config::Config;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Wrapper around an external embeddings endpoint.
///
/// Validates and truncates input before any network call, restores provider
/// response order, and throttles multi-batch requests. No caching: every
/// call is a live round-trip, since conversation content does not repeat.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    endpoint: Url,
    models_endpoint: Url,
    model: String,
    api_key: String,
    dimension: usize,
    batch_size: usize,
    batch_delay: Duration,
    min_embeddable_chars: usize,
    max_input_tokens: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// The provider tags each embedding with the position index of its input and
/// may list items in any order.
#[derive(Debug, Deserialize)]
struct EmbedItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedItem>,
}

impl EmbeddingClient {
    /// Build a client from config. Fails with a `Configuration` error when
    /// no credential is available, before any network attempt.
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.provider.resolve_api_key().ok_or_else(|| {
            RecallError::Configuration(
                "no embedding provider credential configured (set RECALL_API_KEY or [provider].api_key)"
                    .to_string(),
            )
        })?;

        let base_url = config
            .provider
            .endpoint_url()
            .context("Failed to parse provider base URL")?;
        let endpoint = base_url
            .join("/v1/embeddings")
            .context("Failed to build embeddings endpoint URL")?;
        let models_endpoint = base_url
            .join("/v1/models")
            .context("Failed to build models endpoint URL")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            endpoint,
            models_endpoint,
            model: config.provider.model.clone(),
            api_key,
            dimension: config.provider.dimension as usize,
            batch_size: config.provider.batch_size as usize,
            batch_delay: Duration::from_millis(config.provider.batch_delay_ms),
            min_embeddable_chars: config.chunking.min_embeddable_chars,
            max_input_tokens: config.provider.max_input_tokens,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Verify the provider is reachable and accepts the credential, before
    /// any indexing work starts.
    #[inline]
    pub async fn health_check(&self) -> Result<()> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.ping())
            .await
            .context("Health check task failed")?
    }

    /// Ping the provider's model listing endpoint.
    fn ping(&self) -> Result<()> {
        debug!("Pinging embedding provider at {}", self.models_endpoint);

        self.make_request_with_retry(|| {
            self.agent
                .get(self.models_endpoint.as_str())
                .header("Authorization", format!("Bearer {}", self.api_key))
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .context("Failed to reach embedding provider")?;

        debug!("Provider ping successful");
        Ok(())
    }

    /// Gate and truncate a single input. Exposed so pipeline stages can
    /// pre-flight text without constructing a request.
    #[inline]
    pub fn prepare_input(&self, text: &str) -> Result<String> {
        if !is_embeddable(text, self.min_embeddable_chars) {
            return Err(RecallError::Validation(format!(
                "text is blank or under {} characters",
                self.min_embeddable_chars
            ))
            .into());
        }

        let truncated = truncate_to_limit(text, self.max_input_tokens);
        if truncated.len() < text.len() {
            debug!(
                "Truncated oversized input from ~{} to ~{} tokens",
                estimate_tokens(text),
                estimate_tokens(&truncated)
            );
        }
        Ok(truncated)
    }

    /// Embed one text. Validation failures and missing credentials never
    /// reach the network.
    #[inline]
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = self.prepare_input(text)?;

        let mut vectors = self.request_embeddings(vec![input]).await?;
        vectors
            .pop()
            .ok_or_else(|| RecallError::Provider("provider returned no embedding".to_string()).into())
    }

    /// Embed several texts with one wire call, returning vectors in input
    /// order regardless of the order the provider lists them.
    #[inline]
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut inputs = Vec::with_capacity(texts.len());
        for (position, text) in texts.iter().enumerate() {
            let input = self
                .prepare_input(text)
                .with_context(|| format!("batch input {position} failed validation"))?;
            inputs.push(input);
        }

        self.request_embeddings(inputs).await
    }

    /// Embed a large set in sequential batches with a fixed inter-batch
    /// delay to respect provider rate limits. A failing batch aborts the
    /// remaining batches of this call; overall order is preserved.
    #[inline]
    pub async fn embed_batch_chunked(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Embedding {} texts in batches of {}",
            texts.len(),
            self.batch_size
        );

        let mut vectors = Vec::with_capacity(texts.len());
        let batches: Vec<&[String]> = texts.chunks(self.batch_size).collect();
        let batch_count = batches.len();

        for (batch_index, batch) in batches.into_iter().enumerate() {
            let batch_vectors = self
                .embed_batch(batch)
                .await
                .with_context(|| format!("batch {}/{} failed", batch_index + 1, batch_count))?;
            vectors.extend(batch_vectors);

            if batch_index + 1 < batch_count {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        Ok(vectors)
    }

    async fn request_embeddings(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.post_embeddings(&inputs))
            .await
            .context("Embedding request task failed")?
    }

    /// Blocking wire call; runs on the blocking thread pool.
    fn post_embeddings(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: inputs,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self.make_request_with_retry(|| {
            self.agent
                .post(self.endpoint.as_str())
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        parse_embed_response(&response_text, inputs.len(), self.dimension)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 || *status == 429 {
                                warn!(
                                    "Provider error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(RecallError::Provider(format!(
                                    "provider rejected request: HTTP {status}"
                                ))
                                .into());
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(
                            RecallError::Provider(format!("request failed: {error}")).into()
                        );
                    }

                    last_error = Some(RecallError::Provider(format!("request error: {error}")));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        std::thread::sleep(Duration::from_millis(delay_ms));
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.endpoint);

        Err(last_error
            .unwrap_or_else(|| RecallError::Provider("request failed after retries".to_string()))
            .into())
    }
}

/// Parse a provider response and restore input order.
///
/// Items arrive tagged with the position index of their input, in arbitrary
/// order; skipping the re-sort silently degrades ranking quality, so a
/// missing or duplicate index is treated as a malformed response.
fn parse_embed_response(
    response_text: &str,
    expected: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    let response: EmbedResponse = serde_json::from_str(response_text)
        .map_err(|e| RecallError::Provider(format!("malformed embedding response: {e}")))?;

    if response.data.len() != expected {
        return Err(RecallError::Provider(format!(
            "provider returned {} embeddings for {} inputs",
            response.data.len(),
            expected
        ))
        .into());
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in response.data {
        if item.index >= expected {
            return Err(RecallError::Provider(format!(
                "embedding index {} out of range for {} inputs",
                item.index, expected
            ))
            .into());
        }
        if item.embedding.len() != dimension {
            return Err(RecallError::Provider(format!(
                "embedding at index {} has dimension {} (expected {})",
                item.index,
                item.embedding.len(),
                dimension
            ))
            .into());
        }
        if slots[item.index].replace(item.embedding).is_some() {
            return Err(RecallError::Provider(format!(
                "duplicate embedding index {}",
                item.index
            ))
            .into());
        }
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.ok_or_else(|| {
                anyhow::Error::new(RecallError::Provider(
                    "embedding response missing an index".to_string(),
                ))
            })
        })
        .collect()
}
