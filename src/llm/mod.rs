pub mod local;
pub mod providers;
pub mod registry;

pub use registry::{ProviderInfo, ProviderKind};

use crate::error::{Error, Result};
use crate::settings::Settings;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout for availability probes and model listing
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Generation parameters passed to every provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

impl GenerationOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_tokens: settings.generation.max_tokens,
            temperature: settings.generation.temperature,
        }
    }
}

/// Chat message for chat-style APIs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Optional system message followed by the user prompt
    pub fn conversation(prompt: &str, system_prompt: Option<&str>) -> Vec<Self> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
            messages.push(Self::system(system));
        }
        messages.push(Self::user(prompt));
        messages
    }
}

/// LLM response
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub tokens_used: Option<u32>,
}

/// Trait for LLM providers
#[async_trait]
pub trait LLM: Send + Sync {
    /// Raw text completion; every failure is reported as `Error::ProviderUnavailable`
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<LLMResponse>;

    /// Best-effort connectivity probe for status display
    async fn is_available(&self) -> bool;

    async fn list_models(&self) -> Vec<String>;

    fn provider_type(&self) -> ProviderKind;

    fn model(&self) -> &str;
}

/// Create the LLM for the active provider
pub fn create_llm(settings: &Settings) -> Result<Box<dyn LLM>> {
    create_llm_for(settings.llm_provider, settings)
}

/// Create the LLM for a specific provider using its section of the settings
pub fn create_llm_for(kind: ProviderKind, settings: &Settings) -> Result<Box<dyn LLM>> {
    let llm: Box<dyn LLM> = match kind {
        ProviderKind::Ollama => Box::new(local::OllamaProvider::new(
            &settings.ollama.base_url,
            &settings.ollama.model,
            settings.ollama.timeout_seconds,
        )?),
        ProviderKind::Vllm => Box::new(local::VllmProvider::new(settings.vllm.clone())?),
        ProviderKind::OpenAI => Box::new(providers::OpenAICompatibleProvider::new(
            ProviderKind::OpenAI,
            settings.openai.clone(),
        )?),
        ProviderKind::Groq => Box::new(providers::OpenAICompatibleProvider::new(
            ProviderKind::Groq,
            settings.groq.clone(),
        )?),
        ProviderKind::Anthropic => {
            Box::new(providers::AnthropicProvider::new(settings.anthropic.clone())?)
        }
        ProviderKind::HuggingFace => {
            Box::new(providers::HuggingFaceProvider::new(settings.huggingface.clone())?)
        }
    };
    Ok(llm)
}

/// Second Ollama adapter bound to the code model, when scripts should use it
pub fn create_code_llm(settings: &Settings) -> Result<Option<Box<dyn LLM>>> {
    let ollama = &settings.ollama;
    if settings.llm_provider != ProviderKind::Ollama
        || !ollama.use_code_model_for_scripts
        || ollama.code_model.trim().is_empty()
        || ollama.code_model == ollama.model
    {
        return Ok(None);
    }

    let llm = local::OllamaProvider::new(&ollama.base_url, &ollama.code_model, ollama.timeout_seconds)?;
    Ok(Some(Box::new(llm)))
}

pub(crate) fn http_client(kind: ProviderKind, timeout_seconds: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds.max(1)))
        .build()
        .map_err(|e| Error::Configuration(format!("failed to build HTTP client for {}: {}", kind, e)))
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Maps a transport failure to ProviderUnavailable with a readable reason
pub(crate) fn request_error(kind: ProviderKind, url: &str, err: reqwest::Error) -> Error {
    let reason = if err.is_timeout() {
        format!("request to {} timed out", url)
    } else if err.is_connect() {
        format!("could not connect to {}", url)
    } else {
        format!("request to {} failed: {}", url, err)
    };
    Error::provider(kind, reason)
}

/// Checks the status and decodes the body, mapping every failure to ProviderUnavailable
pub(crate) async fn read_json<T: DeserializeOwned>(
    kind: ProviderKind,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(status_error(kind, status, &text));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| Error::provider(kind, format!("malformed response: {}", e)))
}

pub(crate) fn status_error(kind: ProviderKind, status: StatusCode, body: &str) -> Error {
    let detail: String = body.chars().take(300).collect();
    match (status, kind.info().credential_env) {
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, Some(env)) => Error::provider(
            kind,
            format!("authentication failed ({}); check {}: {}", status, env, detail),
        ),
        _ => Error::provider(kind, format!("API error {}: {}", status, detail)),
    }
}
