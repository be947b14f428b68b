//! HTTP embedding providers with retry and fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    hash_embed, normalize, Embedder, EmbeddingConfig, EmbeddingProviderConfig, Error, Result,
};

/// Maximum retries per provider before fallback
const MAX_RETRIES: u32 = 2;

/// Delay between retries (doubles each time)
const RETRY_DELAY_MS: u64 = 500;

/// Per-request HTTP timeout
const HTTP_TIMEOUT_SECS: u64 = 60;

/// Model pulls download gigabytes; they get their own bound.
const PULL_TIMEOUT_SECS: u64 = 1800;

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct GeminiEmbedResponse {
    embedding: Option<GeminiEmbedding>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
    code: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbedResponse {
    data: Option<Vec<OpenAIEmbedding>>,
    error: Option<OpenAIError>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embedding: Option<Vec<f32>>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct OllamaVersionResponse {
    #[serde(default)]
    version: Option<String>,
}

// ============================================================================
// Embedding service
// ============================================================================

/// Service for generating text embeddings with multi-provider fallback.
///
/// Providers are tried in priority order. Every returned vector is
/// normalized and has exactly the configured dimension.
#[derive(Clone)]
pub struct EmbeddingService {
    inner: Arc<EmbeddingServiceInner>,
}

struct EmbeddingServiceInner {
    providers: Vec<EmbeddingProviderConfig>,
    dimension: usize,
    auto_pull: bool,
    client: Client,
}

impl EmbeddingService {
    /// Create a new embedding service from configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let mut providers = config.providers.clone();
        providers.sort_by_key(|p| p.priority);

        if providers.is_empty() {
            warn!(
                dimension = config.dimension,
                "No embedding providers configured - using hash-based placeholders"
            );
        } else {
            info!(
                providers = ?providers.iter().map(|p| &p.name).collect::<Vec<_>>(),
                dimension = config.dimension,
                "Embedding service initialized from config"
            );
        }

        Ok(Self {
            inner: Arc::new(EmbeddingServiceInner {
                providers,
                dimension: config.dimension,
                auto_pull: config.auto_pull,
                client,
            }),
        })
    }

    /// Check if real embedding providers are available.
    pub fn has_providers(&self) -> bool {
        !self.inner.providers.is_empty()
    }

    /// Embed one text, surfacing provider failures.
    ///
    /// The result is normalized and has the configured dimension.
    pub async fn try_embed(&self, text: &str) -> Result<Vec<f32>> {
        let dimension = self.inner.dimension;

        if self.inner.providers.is_empty() {
            return Ok(hash_embed(text, dimension));
        }

        let mut last_error = None;

        for provider in &self.inner.providers {
            if !provider.has_credentials() {
                debug!(provider = %provider.name, "Skipping provider without credentials");
                continue;
            }

            match self.try_provider(provider, text).await {
                Ok(mut embedding) if embedding.len() == dimension => {
                    normalize(&mut embedding);
                    return Ok(embedding);
                }
                Ok(embedding) => {
                    let e = Error::DimensionMismatch {
                        expected: dimension,
                        actual: embedding.len(),
                    };
                    warn!(
                        provider = %provider.name,
                        error = %e,
                        "Embedding provider returned wrong size, trying next"
                    );
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(
                        provider = %provider.name,
                        error = %e,
                        "Embedding provider failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(Error::AllProvidersFailed))
    }

    /// Ollama models that are configured but not pulled on their server.
    ///
    /// Hosted providers are not checked.
    pub async fn missing_models(&self) -> Result<Vec<String>> {
        let mut missing = Vec::new();

        for provider in self.inner.providers.iter().filter(|p| p.name == "ollama") {
            let url = format!("{}/api/tags", provider.base_url);
            let response = self
                .inner
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| Error::Internal(format!("Ollama tags request failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(Error::Provider(format!(
                    "Ollama tags returned HTTP {}",
                    response.status()
                )));
            }

            let tags: OllamaTagsResponse = response
                .json()
                .await
                .map_err(|e| Error::Internal(format!("Failed to parse Ollama tags: {}", e)))?;

            let latest = format!("{}:latest", provider.model);
            let pulled = tags
                .models
                .iter()
                .any(|m| m.name == provider.model || m.name == latest);
            if !pulled {
                missing.push(provider.model.clone());
            }
        }

        Ok(missing)
    }

    /// Version reported by the first Ollama provider, `None` when no Ollama
    /// provider is configured.
    ///
    /// Fails when the server cannot be reached.
    pub async fn ollama_version(&self) -> Result<Option<String>> {
        let Some(provider) = self.ollama_provider() else {
            return Ok(None);
        };

        let url = format!("{}/api/version", provider.base_url);
        let response = self
            .inner
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Could not connect to Ollama: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Provider(format!(
                "Ollama version returned HTTP {}",
                response.status()
            )));
        }

        let body: OllamaVersionResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Failed to parse Ollama version: {}", e)))?;

        Ok(Some(body.version.unwrap_or_else(|| "unknown".to_string())))
    }

    /// Download `model` on the first Ollama provider and wait until it is done.
    pub async fn pull_model(&self, model: &str) -> Result<()> {
        let provider = self
            .ollama_provider()
            .ok_or_else(|| Error::Internal("No Ollama provider configured".to_string()))?;

        info!(model = %model, "Pulling embedding model, this may take a while");
        let url = format!("{}/api/pull", provider.base_url);
        let response = self
            .inner
            .client
            .post(&url)
            .timeout(Duration::from_secs(PULL_TIMEOUT_SECS))
            .json(&json!({ "name": model, "stream": false }))
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Ollama pull request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Provider(format!(
                "Ollama pull of {} returned HTTP {}",
                model,
                response.status()
            )));
        }

        info!(model = %model, "Pulled embedding model");
        Ok(())
    }

    /// Startup check of the Ollama providers.
    ///
    /// Verifies the server answers, then pulls missing models when
    /// `auto_pull` is set. Returns the models that are still unavailable.
    pub async fn prepare_ollama(&self) -> Result<Vec<String>> {
        let Some(version) = self.ollama_version().await? else {
            return Ok(Vec::new());
        };
        info!(version = %version, "Ollama is running");

        let missing = self.missing_models().await?;
        if missing.is_empty() || !self.inner.auto_pull {
            return Ok(missing);
        }

        let mut unavailable = Vec::new();
        for model in missing {
            if let Err(e) = self.pull_model(&model).await {
                warn!(model = %model, error = %e, "Failed to pull embedding model");
                unavailable.push(model);
            }
        }
        Ok(unavailable)
    }

    fn ollama_provider(&self) -> Option<&EmbeddingProviderConfig> {
        self.inner.providers.iter().find(|p| p.name == "ollama")
    }

    /// Try a provider with retries.
    async fn try_provider(
        &self,
        provider: &EmbeddingProviderConfig,
        text: &str,
    ) -> Result<Vec<f32>> {
        let mut delay = Duration::from_millis(RETRY_DELAY_MS);

        for attempt in 0..MAX_RETRIES {
            match self.call_provider(provider, text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) => {
                    if Self::is_retryable(&e) && attempt < MAX_RETRIES - 1 {
                        debug!(
                            provider = %provider.name,
                            attempt,
                            delay_ms = delay.as_millis(),
                            "Retrying after error"
                        );
                        sleep(delay).await;
                        delay *= 2;
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Err(Error::Internal("Max retries exceeded".to_string()))
    }

    async fn call_provider(
        &self,
        provider: &EmbeddingProviderConfig,
        text: &str,
    ) -> Result<Vec<f32>> {
        match provider.name.as_str() {
            "gemini" => self.call_gemini(provider, text).await,
            "openai" => self.call_openai(provider, text).await,
            "ollama" => self.call_ollama(provider, text).await,
            _ => Err(Error::Internal(format!(
                "Unknown embedding provider: {}",
                provider.name
            ))),
        }
    }

    async fn call_gemini(
        &self,
        provider: &EmbeddingProviderConfig,
        text: &str,
    ) -> Result<Vec<f32>> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            provider.base_url, provider.model, provider.api_key
        );

        let body = json!({
            "model": format!("models/{}", provider.model),
            "content": {
                "parts": [{"text": text}]
            }
        });

        let response = self
            .inner
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        let resp: GeminiEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Failed to parse Gemini response: {}", e)))?;

        if let Some(error) = resp.error {
            return Err(Error::Provider(format!(
                "Gemini error ({}): {}",
                error.code.unwrap_or(status.as_u16() as i32),
                error.message
            )));
        }

        resp.embedding
            .map(|e| e.values)
            .ok_or_else(|| Error::Internal("No embedding in Gemini response".to_string()))
    }

    async fn call_openai(
        &self,
        provider: &EmbeddingProviderConfig,
        text: &str,
    ) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", provider.base_url);

        let mut body = json!({
            "model": provider.model,
            "input": text,
        });
        // Only the v3 models accept a requested output size.
        if provider.model.contains("text-embedding-3") {
            body["dimensions"] = json!(self.inner.dimension);
        }

        let response = self
            .inner
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", provider.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        let resp: OpenAIEmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Failed to parse OpenAI response: {}", e)))?;

        if let Some(error) = resp.error {
            return Err(Error::Provider(format!(
                "OpenAI error ({}): {}",
                status.as_u16(),
                error.message
            )));
        }

        resp.data
            .and_then(|d| d.into_iter().next())
            .map(|e| e.embedding)
            .ok_or_else(|| Error::Internal("No embedding in OpenAI response".to_string()))
    }

    async fn call_ollama(
        &self,
        provider: &EmbeddingProviderConfig,
        text: &str,
    ) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", provider.base_url);

        let body = json!({
            "model": provider.model,
            "prompt": text
        });

        let response = self
            .inner
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        let resp: OllamaEmbedResponse = response.json().await.map_err(|e| {
            Error::Internal(format!(
                "Failed to parse Ollama response ({}): {}",
                status.as_u16(),
                e
            ))
        })?;

        if let Some(error) = resp.error {
            return Err(Error::Provider(format!(
                "Ollama error ({}): {}",
                status.as_u16(),
                error
            )));
        }

        resp.embedding
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::Internal("No embedding in Ollama response".to_string()))
    }

    /// Check if an error is retryable (rate limit, temporary failure).
    fn is_retryable(error: &Error) -> bool {
        let msg = error.to_string().to_lowercase();
        msg.contains("rate")
            || msg.contains("limit")
            || msg.contains("429")
            || msg.contains("503")
            || msg.contains("timeout")
            || msg.contains("temporarily")
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    fn dimension(&self) -> usize {
        self.inner.dimension
    }

    fn providers(&self) -> Vec<String> {
        self.inner.providers.iter().map(|p| p.name.clone()).collect()
    }

    async fn embed(&self, text: &str) -> Vec<f32> {
        match self.try_embed(text).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "Embedding failed, using zero vector");
                vec![0.0; self.inner.dimension]
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
