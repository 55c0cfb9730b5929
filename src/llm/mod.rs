mod ollama;
mod openai;

use crate::columns::ParticipantColumns;
use async_trait::async_trait;
use std::time::Duration;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),
}

/// Request to generate a completion
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Instructions for the model
    pub system: String,
    /// The user prompt
    pub prompt: String,
    /// Maximum response length in tokens (provider-dependent)
    pub max_tokens: Option<u32>,
    /// Timeout for the request
    pub timeout: Duration,
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// The generated text
    pub text: String,
    pub metadata: ResponseMetadata,
}

/// Metadata about the LLM response
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// Name of the provider (e.g., "openai", "ollama")
    pub provider: String,
    /// Model name used
    pub model: String,
    /// Latency in milliseconds
    pub latency_ms: u64,
}

/// Trait that all LLM providers must implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

const COLUMN_MAPPING_SYSTEM_PROMPT: &str = "You map spreadsheet columns of a raffle participant list. \
    Answer with a single JSON object and nothing else. \
    Keys: \"name\", \"phone\", \"ticket\", \"assigned_prize\". \
    Each value is the exact header that holds that field, or null if no header fits.";

/// Manager for the configured LLM providers
pub struct LlmManager {
    pub providers: Vec<Box<dyn LlmProvider>>,
    timeout: Duration,
}

impl LlmManager {
    pub fn new(providers: Vec<Box<dyn LlmProvider>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    /// Ask the providers, in order, which header holds which participant field.
    ///
    /// The first provider that returns a parseable mapping wins. Headers the
    /// model invents are dropped by the caller when merging.
    pub async fn map_columns(&self, headers: &[String]) -> LlmResult<ParticipantColumns> {
        let prompt = serde_json::to_string(headers)
            .map_err(|e| LlmError::ParseError(e.to_string()))?;
        let request = GenerateRequest {
            system: COLUMN_MAPPING_SYSTEM_PROMPT.to_string(),
            prompt: format!("Headers: {}", prompt),
            max_tokens: Some(200),
            timeout: self.timeout,
        };

        let mut last_error = LlmError::ConfigError("No LLM providers configured".to_string());
        for provider in &self.providers {
            match provider.generate(request.clone()).await {
                Ok(response) => match parse_column_mapping(&response.text) {
                    Ok(columns) => {
                        tracing::info!(
                            "Column mapping from {} ({}, {}ms): {:?}",
                            response.metadata.provider,
                            response.metadata.model,
                            response.metadata.latency_ms,
                            columns
                        );
                        return Ok(columns);
                    }
                    Err(e) => {
                        tracing::warn!("Provider {} returned unusable mapping: {}", provider.name(), e);
                        last_error = e;
                    }
                },
                Err(e) => {
                    tracing::error!("Provider {} failed: {}", provider.name(), e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

/// Parse a model answer into a column mapping, tolerating code fences
pub fn parse_column_mapping(text: &str) -> LlmResult<ParticipantColumns> {
    let cleaned = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(cleaned).map_err(|e| LlmError::ParseError(e.to_string()))
}

/// Configuration for LLM providers
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI API key
    pub openai_api_key: Option<String>,
    /// OpenAI model to use
    pub openai_model: String,
    /// Ollama base URL
    pub ollama_base_url: Option<String>,
    /// Ollama model to use
    pub ollama_model: String,
    /// Timeout for one mapping request
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            ollama_base_url: None,
            ollama_model: "llama3.2".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

impl LlmConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let non_empty = |key: &str| {
            std::env::var(key).ok().and_then(|v| {
                let trimmed = v.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
        };
        let defaults = Self::default();

        Self {
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_model: non_empty("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            ollama_base_url: non_empty("OLLAMA_BASE_URL"),
            ollama_model: non_empty("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            timeout: non_empty("LLM_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Build an LlmManager with all configured providers
    pub fn build_manager(&self) -> LlmResult<LlmManager> {
        let mut providers: Vec<Box<dyn LlmProvider>> = Vec::new();

        if let Some(api_key) = &self.openai_api_key {
            providers.push(Box::new(OpenAiProvider::new(
                api_key.clone(),
                self.openai_model.clone(),
            )));
        }

        if let Some(base_url) = &self.ollama_base_url {
            providers.push(Box::new(OllamaProvider::new(
                base_url.clone(),
                self.ollama_model.clone(),
            )?));
        }

        if providers.is_empty() {
            return Err(LlmError::ConfigError(
                "No LLM providers configured. Set OPENAI_API_KEY or OLLAMA_BASE_URL".to_string(),
            ));
        }

        Ok(LlmManager::new(providers, self.timeout))
    }
}
