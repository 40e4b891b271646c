use super::{
    http_client, join_url, read_json, request_error, status_error, ChatMessage, GenerationOptions,
    LLMResponse, ProviderKind, LLM, PROBE_TIMEOUT,
};
use crate::error::{Error, Result};
use crate::settings::{HostedSettings, HuggingFaceSettings};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

fn missing_credential(kind: ProviderKind) -> Error {
    let env = kind.info().credential_env.unwrap_or("API key");
    Error::provider(kind, format!("{} is not set", env))
}

fn first_choice(kind: ProviderKind, response: ChatCompletionResponse) -> Result<LLMResponse> {
    let tokens_used = response.usage.map(|u| u.total_tokens);
    let content = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| Error::provider(kind, "response contained no choices"))?;

    Ok(LLMResponse {
        content,
        tokens_used,
    })
}

fn sorted_ids(list: ModelList) -> Vec<String> {
    let mut ids: Vec<String> = list.data.into_iter().map(|m| m.id).collect();
    ids.sort();
    ids
}

fn suggested(kind: ProviderKind) -> Vec<String> {
    kind.info()
        .suggested_models
        .iter()
        .map(|m| m.to_string())
        .collect()
}

/// OpenAI and Groq: both speak the OpenAI chat completions API
pub struct OpenAICompatibleProvider {
    kind: ProviderKind,
    config: HostedSettings,
    client: reqwest::Client,
}

impl OpenAICompatibleProvider {
    pub fn new(kind: ProviderKind, config: HostedSettings) -> Result<Self> {
        let client = http_client(kind, config.timeout_seconds)?;
        Ok(Self {
            kind,
            config,
            client,
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| missing_credential(self.kind))
    }

    async fn fetch_models(&self) -> Result<Vec<String>> {
        let api_key = self.api_key()?;
        let url = join_url(&self.config.base_url, "models");
        let response = self
            .client
            .get(&url)
            .bearer_auth(api_key)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| request_error(self.kind, &url, e))?;
        let list: ModelList = read_json(self.kind, response).await?;
        Ok(sorted_ids(list))
    }
}

#[async_trait]
impl LLM for OpenAICompatibleProvider {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<LLMResponse> {
        let api_key = self.api_key()?;
        let url = join_url(&self.config.base_url, "chat/completions");

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: ChatMessage::conversation(prompt, system_prompt),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        debug!("Sending request to {} at {}", self.kind.info().display_name, url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(self.kind, &url, e))?;

        let completion: ChatCompletionResponse = read_json(self.kind, response).await?;
        first_choice(self.kind, completion)
    }

    async fn is_available(&self) -> bool {
        self.fetch_models().await.is_ok()
    }

    async fn list_models(&self) -> Vec<String> {
        match self.fetch_models().await {
            Ok(models) if !models.is_empty() => models,
            Ok(_) => suggested(self.kind),
            Err(e) => {
                debug!("Falling back to suggested models: {}", e);
                suggested(self.kind)
            }
        }
    }

    fn provider_type(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider
pub struct AnthropicProvider {
    config: HostedSettings,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(config: HostedSettings) -> Result<Self> {
        let client = http_client(ProviderKind::Anthropic, config.timeout_seconds)?;
        Ok(Self { config, client })
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| missing_credential(ProviderKind::Anthropic))
    }

    async fn fetch_models(&self) -> Result<Vec<String>> {
        let api_key = self.api_key()?;
        let url = join_url(&self.config.base_url, "v1/models");
        let response = self
            .client
            .get(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| request_error(ProviderKind::Anthropic, &url, e))?;
        let list: ModelList = read_json(ProviderKind::Anthropic, response).await?;
        Ok(sorted_ids(list))
    }
}

#[async_trait]
impl LLM for AnthropicProvider {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<LLMResponse> {
        let api_key = self.api_key()?;
        let url = join_url(&self.config.base_url, "v1/messages");

        let request = AnthropicRequest {
            model: &self.config.model,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            system: system_prompt.filter(|s| !s.trim().is_empty()),
            messages: vec![ChatMessage::user(prompt)],
        };

        debug!("Sending request to Anthropic at {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(ProviderKind::Anthropic, &url, e))?;

        let message: AnthropicResponse = read_json(ProviderKind::Anthropic, response).await?;

        let content = message
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(Error::provider(ProviderKind::Anthropic, "response contained no text"));
        }

        Ok(LLMResponse {
            content,
            tokens_used: message.usage.map(|u| u.input_tokens + u.output_tokens),
        })
    }

    async fn is_available(&self) -> bool {
        self.fetch_models().await.is_ok()
    }

    async fn list_models(&self) -> Vec<String> {
        match self.fetch_models().await {
            Ok(models) if !models.is_empty() => models,
            _ => suggested(ProviderKind::Anthropic),
        }
    }

    fn provider_type(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Hugging Face Inference provider (router chat completions with the legacy endpoint as fallback)
pub struct HuggingFaceProvider {
    config: HuggingFaceSettings,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct TextGenerationRequest {
    inputs: String,
    parameters: TextGenerationParameters,
}

#[derive(Debug, Serialize)]
struct TextGenerationParameters {
    max_new_tokens: u32,
    temperature: f32,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

impl HuggingFaceProvider {
    pub fn new(config: HuggingFaceSettings) -> Result<Self> {
        let client = http_client(ProviderKind::HuggingFace, config.timeout_seconds)?;
        Ok(Self { config, client })
    }

    fn api_token(&self) -> Result<&str> {
        if !self.config.use_inference_api {
            return Err(Error::provider(
                ProviderKind::HuggingFace,
                "local transformers inference is not supported; set huggingface.use_inference_api \
                 to true or serve the model with the vllm provider",
            ));
        }
        self.config
            .api_token
            .as_deref()
            .ok_or_else(|| missing_credential(ProviderKind::HuggingFace))
    }

    /// The router picks a backend when the model id carries no ":provider" suffix
    fn routed_model(&self) -> String {
        if self.config.model_id.contains(':') {
            self.config.model_id.clone()
        } else {
            format!("{}:fastest", self.config.model_id)
        }
    }

    async fn generate_legacy(
        &self,
        token: &str,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<LLMResponse> {
        let url = join_url(
            &self.config.router_url,
            &format!("hf-inference/models/{}", self.config.model_id),
        );
        let inputs = match system_prompt.filter(|s| !s.trim().is_empty()) {
            Some(system) => format!("{}\n\n{}", system, prompt),
            None => prompt.to_string(),
        };
        let request = TextGenerationRequest {
            inputs,
            parameters: TextGenerationParameters {
                max_new_tokens: options.max_tokens,
                temperature: options.temperature,
                return_full_text: false,
            },
        };

        debug!("Sending request to Hugging Face legacy endpoint {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(ProviderKind::HuggingFace, &url, e))?;

        let generated: Vec<GeneratedText> = read_json(ProviderKind::HuggingFace, response).await?;
        generated
            .into_iter()
            .next()
            .map(|g| LLMResponse {
                content: g.generated_text,
                tokens_used: None,
            })
            .ok_or_else(|| Error::provider(ProviderKind::HuggingFace, "response contained no text"))
    }

    async fn fetch_models(&self) -> Result<Vec<String>> {
        let token = self.api_token()?;
        let url = join_url(&self.config.router_url, "v1/models");
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| request_error(ProviderKind::HuggingFace, &url, e))?;
        let list: ModelList = read_json(ProviderKind::HuggingFace, response).await?;
        Ok(sorted_ids(list))
    }
}

#[async_trait]
impl LLM for HuggingFaceProvider {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<LLMResponse> {
        let token = self.api_token()?;
        let url = join_url(&self.config.router_url, "v1/chat/completions");
        let model = self.routed_model();

        let request = ChatCompletionRequest {
            model: &model,
            messages: ChatMessage::conversation(prompt, system_prompt),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        debug!("Sending request to Hugging Face router for {}", model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(ProviderKind::HuggingFace, &url, e))?;

        let status = response.status();
        if status.is_success() {
            let completion: ChatCompletionResponse =
                read_json(ProviderKind::HuggingFace, response).await?;
            return first_choice(ProviderKind::HuggingFace, completion);
        }

        let body = response.text().await.unwrap_or_default();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(status_error(ProviderKind::HuggingFace, status, &body));
        }

        warn!(
            "Hugging Face router returned {} for {}, trying the legacy inference endpoint",
            status, model
        );
        self.generate_legacy(token, prompt, system_prompt, options).await
    }

    async fn is_available(&self) -> bool {
        self.fetch_models().await.is_ok()
    }

    async fn list_models(&self) -> Vec<String> {
        match self.fetch_models().await {
            Ok(models) if !models.is_empty() => models,
            _ => suggested(ProviderKind::HuggingFace),
        }
    }

    fn provider_type(&self) -> ProviderKind {
        ProviderKind::HuggingFace
    }

    fn model(&self) -> &str {
        &self.config.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    #[tokio::test]
    async fn test_missing_key_is_provider_unavailable() {
        let settings = Settings::default();
        let provider =
            OpenAICompatibleProvider::new(ProviderKind::OpenAI, settings.openai.clone()).unwrap();

        let err = provider
            .generate("prompt", None, &GenerationOptions::default())
            .await
            .unwrap_err();
        match err {
            Error::ProviderUnavailable { provider, message } => {
                assert_eq!(provider, ProviderKind::OpenAI);
                assert!(message.contains("OPENAI_API_KEY"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!provider.is_available().await);
    }

    #[test]
    fn test_routed_model_suffix() {
        let mut config = Settings::default().huggingface;
        config.model_id = "org/model".to_string();
        let provider = HuggingFaceProvider::new(config.clone()).unwrap();
        assert_eq!(provider.routed_model(), "org/model:fastest");

        config.model_id = "org/model:together".to_string();
        let provider = HuggingFaceProvider::new(config).unwrap();
        assert_eq!(provider.routed_model(), "org/model:together");
    }

    #[tokio::test]
    async fn test_local_huggingface_mode_is_rejected() {
        let mut config = Settings::default().huggingface;
        config.use_inference_api = false;
        config.api_token = Some("hf_x".to_string());
        let provider = HuggingFaceProvider::new(config).unwrap();

        let result = provider
            .generate("prompt", None, &GenerationOptions::default())
            .await;
        assert!(matches!(result, Err(Error::ProviderUnavailable { .. })));
    }
}
