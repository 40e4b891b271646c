use super::{
    http_client, join_url, read_json, request_error, GenerationOptions, LLMResponse, ProviderKind,
    LLM, PROBE_TIMEOUT,
};
use crate::error::{Error, Result};
use crate::settings::VllmSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::OnceCell;
use tracing::{debug, info};

const OLLAMA_CONTEXT_WINDOW: u32 = 4096;
const VLLM_TOP_P: f32 = 0.95;
const ENGINE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Ollama daemon provider
pub struct OllamaProvider {
    base_url: String,
    model: String,
    timeout_seconds: u64,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_ctx: u32,
    num_predict: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str, timeout_seconds: u64) -> Result<Self> {
        let client = http_client(ProviderKind::Ollama, timeout_seconds)?;
        Ok(Self {
            base_url: base_url.to_string(),
            model: model.to_string(),
            timeout_seconds,
            client,
        })
    }

    async fn tags(&self) -> Result<Vec<String>> {
        let url = join_url(&self.base_url, "api/tags");
        let response = self
            .client
            .get(&url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| request_error(ProviderKind::Ollama, &url, e))?;
        let tags: OllamaTags = read_json(ProviderKind::Ollama, response).await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl LLM for OllamaProvider {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<LLMResponse> {
        let url = join_url(&self.base_url, "api/generate");
        let request = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            system: system_prompt.filter(|s| !s.trim().is_empty()),
            options: OllamaOptions {
                num_ctx: OLLAMA_CONTEXT_WINDOW,
                num_predict: options.max_tokens,
                temperature: options.temperature,
            },
        };

        debug!("Sending request to Ollama at {} (model {})", url, self.model);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::provider(
                        ProviderKind::Ollama,
                        format!(
                            "request timed out after {}s; try a smaller model or raise ollama.timeout_seconds",
                            self.timeout_seconds
                        ),
                    )
                } else {
                    request_error(ProviderKind::Ollama, &url, e)
                }
            })?;

        let generated: OllamaGenerateResponse = read_json(ProviderKind::Ollama, response).await?;
        let tokens_used = match (generated.prompt_eval_count, generated.eval_count) {
            (None, None) => None,
            (prompt_tokens, output_tokens) => {
                Some(prompt_tokens.unwrap_or(0) + output_tokens.unwrap_or(0))
            }
        };

        Ok(LLMResponse {
            content: generated.response,
            tokens_used,
        })
    }

    async fn is_available(&self) -> bool {
        let base_name = self.model.split(':').next().unwrap_or(&self.model);
        match self.tags().await {
            Ok(names) => names.iter().any(|name| name.contains(base_name)),
            Err(_) => false,
        }
    }

    async fn list_models(&self) -> Vec<String> {
        self.tags().await.unwrap_or_default()
    }

    fn provider_type(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// A vLLM OpenAI-compatible server started by this process
struct LocalEngine {
    base_url: String,
    /// Killed when the provider is dropped
    _child: Mutex<Child>,
}

/// vLLM provider: an existing server, or a local engine started on first use
pub struct VllmProvider {
    config: VllmSettings,
    client: reqwest::Client,
    engine: OnceCell<LocalEngine>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: String,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
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

impl VllmProvider {
    pub fn new(config: VllmSettings) -> Result<Self> {
        let client = http_client(ProviderKind::Vllm, config.timeout_seconds)?;
        Ok(Self {
            config,
            client,
            engine: OnceCell::new(),
        })
    }

    fn format_prompt(prompt: &str, system_prompt: Option<&str>) -> String {
        match system_prompt.filter(|s| !s.trim().is_empty()) {
            Some(system) => format!("{}\n\n{}", system, prompt),
            None => prompt.to_string(),
        }
    }

    fn engine_args(&self) -> Vec<String> {
        let config = &self.config;
        let mut args = vec![
            "-m".to_string(),
            "vllm.entrypoints.openai.api_server".to_string(),
            "--model".to_string(),
            config.model.clone(),
            "--host".to_string(),
            "127.0.0.1".to_string(),
            "--port".to_string(),
            config.local_port.to_string(),
            "--tensor-parallel-size".to_string(),
            config.tensor_parallel_size.to_string(),
            "--gpu-memory-utilization".to_string(),
            config.gpu_memory_utilization.to_string(),
            "--dtype".to_string(),
            config.dtype.clone(),
        ];
        if let Some(max_len) = config.max_model_len {
            args.push("--max-model-len".to_string());
            args.push(max_len.to_string());
        }
        if let Some(quantization) = config.quantization.as_deref().filter(|q| !q.is_empty()) {
            args.push("--quantization".to_string());
            args.push(quantization.to_string());
        }
        args
    }

    /// Starts the engine and waits until it serves `/v1/models`; model loading can take minutes
    async fn start_engine(&self) -> Result<LocalEngine> {
        info!(
            "🚀 Starting local vLLM engine for {} on port {}",
            self.config.model, self.config.local_port
        );

        let mut child = Command::new(&self.config.python_bin)
            .args(self.engine_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::provider(
                    ProviderKind::Vllm,
                    format!(
                        "failed to start '{}' ({}); install vLLM or set vllm.use_server",
                        self.config.python_bin, e
                    ),
                )
            })?;

        let base_url = format!("http://127.0.0.1:{}", self.config.local_port);
        loop {
            let exited = child
                .try_wait()
                .map_err(|e| Error::provider(ProviderKind::Vllm, e.to_string()))?;
            if let Some(status) = exited {
                return Err(Error::provider(
                    ProviderKind::Vllm,
                    format!("local engine exited during startup ({})", status),
                ));
            }

            if self.fetch_models(&base_url).await.is_ok() {
                break;
            }
            tokio::time::sleep(ENGINE_POLL_INTERVAL).await;
        }

        info!("✅ Local vLLM engine ready at {}", base_url);
        Ok(LocalEngine {
            base_url,
            _child: Mutex::new(child),
        })
    }

    async fn base_url(&self) -> Result<String> {
        if self.config.use_server {
            return Ok(self.config.server_url.clone());
        }
        let engine = self.engine.get_or_try_init(|| self.start_engine()).await?;
        Ok(engine.base_url.clone())
    }

    /// Server URL when one is already reachable without starting anything
    fn running_url(&self) -> Option<String> {
        if self.config.use_server {
            Some(self.config.server_url.clone())
        } else {
            self.engine.get().map(|e| e.base_url.clone())
        }
    }

    async fn fetch_models(&self, base_url: &str) -> Result<Vec<String>> {
        let url = join_url(base_url, "v1/models");
        let response = self
            .client
            .get(&url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| request_error(ProviderKind::Vllm, &url, e))?;
        let list: ModelList = read_json(ProviderKind::Vllm, response).await?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    async fn vllm_installed(&self) -> bool {
        Command::new(&self.config.python_bin)
            .args(["-c", "import vllm"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl LLM for VllmProvider {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<LLMResponse> {
        let base_url = self.base_url().await?;
        let url = join_url(&base_url, "v1/completions");

        let request = CompletionRequest {
            model: &self.config.model,
            prompt: Self::format_prompt(prompt, system_prompt),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: VLLM_TOP_P,
        };

        debug!("Sending request to vLLM at {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_error(ProviderKind::Vllm, &url, e))?;

        let completion: CompletionResponse = read_json(ProviderKind::Vllm, response).await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| Error::provider(ProviderKind::Vllm, "response contained no choices"))?;

        Ok(LLMResponse {
            content,
            tokens_used: completion.usage.map(|u| u.total_tokens),
        })
    }

    async fn is_available(&self) -> bool {
        match self.running_url() {
            Some(url) => self.fetch_models(&url).await.is_ok(),
            None => self.vllm_installed().await,
        }
    }

    async fn list_models(&self) -> Vec<String> {
        if let Some(url) = self.running_url() {
            if let Ok(models) = self.fetch_models(&url).await {
                if !models.is_empty() {
                    return models;
                }
            }
        }

        let mut models = vec![self.config.model.clone()];
        models.extend(
            ProviderKind::Vllm
                .info()
                .suggested_models
                .iter()
                .filter(|m| **m != self.config.model)
                .map(|m| m.to_string()),
        );
        models
    }

    fn provider_type(&self) -> ProviderKind {
        ProviderKind::Vllm
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    #[test]
    fn test_engine_args_include_optional_flags() {
        let mut config = Settings::default().vllm;
        config.max_model_len = Some(8192);
        config.quantization = Some("awq".to_string());
        let provider = VllmProvider::new(config).unwrap();

        let args = provider.engine_args();
        let joined = args.join(" ");
        assert!(joined.contains("--model meta-llama/Llama-3.1-8B-Instruct"));
        assert!(joined.contains("--max-model-len 8192"));
        assert!(joined.contains("--quantization awq"));
    }

    #[test]
    fn test_format_prompt() {
        assert_eq!(VllmProvider::format_prompt("p", Some("s")), "s\n\np");
        assert_eq!(VllmProvider::format_prompt("p", None), "p");
    }

    #[tokio::test]
    async fn test_missing_python_is_provider_unavailable() {
        let mut config = Settings::default().vllm;
        config.python_bin = "req2test-no-such-python".to_string();
        let provider = VllmProvider::new(config).unwrap();

        let result = provider
            .generate("prompt", None, &GenerationOptions::default())
            .await;
        assert!(matches!(result, Err(Error::ProviderUnavailable { .. })));
        assert!(!provider.is_available().await);
    }
}
