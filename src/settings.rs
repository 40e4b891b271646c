use crate::error::{Error, Result};
use crate::export::ExportFormat;
use crate::llm::ProviderKind;
use crate::prompts::PromptOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// User settings: active provider, per-provider connection parameters and generation toggles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Provider used for generation
    pub llm_provider: ProviderKind,

    pub ollama: OllamaSettings,

    pub vllm: VllmSettings,

    pub openai: HostedSettings,

    pub groq: HostedSettings,

    pub anthropic: HostedSettings,

    pub huggingface: HuggingFaceSettings,

    /// Test generation options
    pub generation: GenerationSettings,

    /// Format used when none is given on export
    pub default_export_format: ExportFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaSettings {
    /// Ollama daemon address
    pub base_url: String,

    /// Model for manual tests and Gherkin
    pub model: String,

    /// Model for Selenium/Playwright code
    pub code_model: String,

    /// Route automation scripts to `code_model`
    pub use_code_model_for_scripts: bool,

    /// Request timeout in seconds (local models can be slow)
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VllmSettings {
    pub model: String,

    /// Talk to a running OpenAI-compatible server instead of starting a local engine
    pub use_server: bool,

    pub server_url: String,

    /// Number of GPUs for tensor parallelism
    pub tensor_parallel_size: u32,

    /// Fraction of GPU memory the engine may take (0-1]
    pub gpu_memory_utilization: f32,

    /// Maximum sequence length, model default when unset
    #[serde(default)]
    pub max_model_len: Option<u32>,

    /// auto, float16, bfloat16 or float32
    pub dtype: String,

    /// awq, gptq, squeezellm, or unset
    #[serde(default)]
    pub quantization: Option<String>,

    pub timeout_seconds: u64,

    /// Python interpreter used to start the local engine
    pub python_bin: String,

    /// Port for the local engine
    pub local_port: u16,
}

/// Settings for OpenAI, Groq and Anthropic
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct HostedSettings {
    pub model: String,

    /// API base URL
    pub base_url: String,

    pub timeout_seconds: u64,

    /// Filled from the environment at load time, never persisted
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HuggingFaceSettings {
    pub model_id: String,

    /// Use the hosted Inference API instead of local inference
    pub use_inference_api: bool,

    /// Inference router base URL
    pub router_url: String,

    pub timeout_seconds: u64,

    /// Filled from HF_API_TOKEN at load time, never persisted
    #[serde(default)]
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationSettings {
    pub include_edge_cases: bool,
    pub include_negative_tests: bool,
    pub include_boundary_tests: bool,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm_provider: ProviderKind::Ollama,
            ollama: OllamaSettings::default(),
            vllm: VllmSettings::default(),
            openai: HostedSettings::new(ProviderKind::OpenAI, "https://api.openai.com/v1"),
            groq: HostedSettings::new(ProviderKind::Groq, "https://api.groq.com/openai/v1"),
            anthropic: HostedSettings::new(ProviderKind::Anthropic, "https://api.anthropic.com"),
            huggingface: HuggingFaceSettings::default(),
            generation: GenerationSettings::default(),
            default_export_format: ExportFormat::Excel,
        }
    }
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: ProviderKind::Ollama.info().default_model.to_string(),
            code_model: "codellama:7b".to_string(),
            use_code_model_for_scripts: true,
            timeout_seconds: 600,
        }
    }
}

impl Default for VllmSettings {
    fn default() -> Self {
        Self {
            model: ProviderKind::Vllm.info().default_model.to_string(),
            use_server: false,
            server_url: "http://localhost:8000".to_string(),
            tensor_parallel_size: 1,
            gpu_memory_utilization: 0.9,
            max_model_len: None,
            dtype: "auto".to_string(),
            quantization: None,
            timeout_seconds: 600,
            python_bin: "python3".to_string(),
            local_port: 8011,
        }
    }
}

impl Default for HuggingFaceSettings {
    fn default() -> Self {
        Self {
            model_id: ProviderKind::HuggingFace.info().default_model.to_string(),
            use_inference_api: true,
            router_url: "https://router.huggingface.co".to_string(),
            timeout_seconds: 180,
            api_token: None,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            include_edge_cases: true,
            include_negative_tests: true,
            include_boundary_tests: true,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

impl GenerationSettings {
    pub fn prompt_options(&self) -> PromptOptions {
        PromptOptions {
            include_edge_cases: self.include_edge_cases,
            include_negative_tests: self.include_negative_tests,
            include_boundary_tests: self.include_boundary_tests,
        }
    }
}

impl HostedSettings {
    fn new(kind: ProviderKind, base_url: &str) -> Self {
        Self {
            model: kind.info().default_model.to_string(),
            base_url: base_url.to_string(),
            timeout_seconds: 180,
            api_key: None,
        }
    }
}

impl fmt::Debug for HostedSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedSettings")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Debug for HuggingFaceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HuggingFaceSettings")
            .field("model_id", &self.model_id)
            .field("use_inference_api", &self.use_inference_api)
            .field("router_url", &self.router_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Field names treated as credentials; they never reach disk
pub fn is_credential_key(key: &str) -> bool {
    let key = key.to_lowercase();
    key.ends_with("_key") || key.ends_with("_token")
}

/// Overlays `patch` onto `base`, descending into objects
fn merge_json(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Removes credential-shaped fields at any depth, returning how many were dropped
pub fn strip_credentials(value: &mut Value) -> usize {
    match value {
        Value::Object(map) => {
            let before = map.len();
            map.retain(|key, _| !is_credential_key(key));
            let mut removed = before - map.len();
            for nested in map.values_mut() {
                removed += strip_credentials(nested);
            }
            removed
        }
        Value::Array(items) => items.iter_mut().map(strip_credentials).sum(),
        _ => 0,
    }
}

impl Settings {
    /// Builds settings from a possibly partial JSON document.
    ///
    /// Missing keys, including keys missing inside a provider section, keep
    /// their default values.
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;
        merge_json(&mut merged, value);
        serde_json::from_value(merged)
    }

    /// Model name of the active provider
    pub fn active_model(&self) -> &str {
        match self.llm_provider {
            ProviderKind::Ollama => &self.ollama.model,
            ProviderKind::Vllm => &self.vllm.model,
            ProviderKind::OpenAI => &self.openai.model,
            ProviderKind::Groq => &self.groq.model,
            ProviderKind::Anthropic => &self.anthropic.model,
            ProviderKind::HuggingFace => &self.huggingface.model_id,
        }
    }

    pub fn set_active_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        match self.llm_provider {
            ProviderKind::Ollama => self.ollama.model = model,
            ProviderKind::Vllm => self.vllm.model = model,
            ProviderKind::OpenAI => self.openai.model = model,
            ProviderKind::Groq => self.groq.model = model,
            ProviderKind::Anthropic => self.anthropic.model = model,
            ProviderKind::HuggingFace => self.huggingface.model_id = model,
        }
    }

    /// Reads API keys from the process environment
    pub fn apply_env_credentials(&mut self) {
        self.apply_credentials_from(|name| std::env::var(name).ok());
    }

    /// Reads API keys through `lookup`; blank values count as missing
    pub fn apply_credentials_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |kind: ProviderKind| {
            kind.info()
                .credential_env
                .and_then(|name| lookup(name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        self.openai.api_key = read(ProviderKind::OpenAI);
        self.groq.api_key = read(ProviderKind::Groq);
        self.anthropic.api_key = read(ProviderKind::Anthropic);
        self.huggingface.api_token = read(ProviderKind::HuggingFace);
    }

    /// Whether the active provider has what it needs to authenticate
    pub fn has_credentials(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::Ollama | ProviderKind::Vllm => true,
            ProviderKind::OpenAI => self.openai.api_key.is_some(),
            ProviderKind::Groq => self.groq.api_key.is_some(),
            ProviderKind::Anthropic => self.anthropic.api_key.is_some(),
            ProviderKind::HuggingFace => {
                !self.huggingface.use_inference_api || self.huggingface.api_token.is_some()
            }
        }
    }

    /// JSON form written to disk, credentials removed
    pub fn to_persisted_json(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| Error::persistence("Failed to serialize settings", e))?;
        strip_credentials(&mut value);
        Ok(value)
    }

    /// Sets a dotted key such as `ollama.base_url`; the value is parsed as JSON when possible
    pub fn set_value(&mut self, key: &str, raw: &str) -> Result<()> {
        if key.split('.').any(is_credential_key) {
            return Err(Error::Configuration(format!(
                "'{}' is a credential; set it through the environment instead",
                key
            )));
        }

        let mut root = serde_json::to_value(&*self)
            .map_err(|e| Error::Configuration(e.to_string()))?;

        let mut slot = &mut root;
        for part in key.split('.') {
            slot = slot
                .get_mut(part)
                .ok_or_else(|| Error::Configuration(format!("unknown setting: {}", key)))?;
        }

        let expects_string = slot.is_string();
        let parsed = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        *slot = match parsed {
            Value::Number(n) if expects_string => Value::String(n.to_string()),
            Value::Bool(b) if expects_string => Value::String(b.to_string()),
            other => other,
        };

        let updated: Settings = serde_json::from_value(root)
            .map_err(|e| Error::Configuration(format!("invalid value for {}: {}", key, e)))?;
        updated.validate()?;

        // Keep in-memory credentials; they are not part of the JSON round trip
        let credentials = (
            self.openai.api_key.take(),
            self.groq.api_key.take(),
            self.anthropic.api_key.take(),
            self.huggingface.api_token.take(),
        );
        *self = updated;
        self.openai.api_key = credentials.0;
        self.groq.api_key = credentials.1;
        self.anthropic.api_key = credentials.2;
        self.huggingface.api_token = credentials.3;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let urls = [
            ("ollama.base_url", &self.ollama.base_url),
            ("vllm.server_url", &self.vllm.server_url),
            ("openai.base_url", &self.openai.base_url),
            ("groq.base_url", &self.groq.base_url),
            ("anthropic.base_url", &self.anthropic.base_url),
            ("huggingface.router_url", &self.huggingface.router_url),
        ];
        for (name, url) in urls {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Configuration(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }

        if !(self.vllm.gpu_memory_utilization > 0.0 && self.vllm.gpu_memory_utilization <= 1.0) {
            return Err(Error::Configuration(
                "vllm.gpu_memory_utilization must be in (0, 1]".to_string(),
            ));
        }

        if self.vllm.tensor_parallel_size == 0 {
            return Err(Error::Configuration(
                "vllm.tensor_parallel_size must be at least 1".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(Error::Configuration(
                "generation.temperature must be between 0 and 2".to_string(),
            ));
        }

        if self.generation.max_tokens == 0 {
            return Err(Error::Configuration(
                "generation.max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.active_model().trim().is_empty() {
            return Err(Error::Configuration(format!(
                "no model configured for {}",
                self.llm_provider
            )));
        }

        Ok(())
    }
}
