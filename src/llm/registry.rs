use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// LLM provider types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    Vllm,
    OpenAI,
    Groq,
    Anthropic,
    HuggingFace,
}

/// Static description of a provider
#[derive(Debug, Clone, Copy)]
pub struct ProviderInfo {
    pub kind: ProviderKind,
    pub display_name: &'static str,
    pub default_model: &'static str,

    /// Settings keys this provider reads
    pub connection_fields: &'static [&'static str],

    /// Environment variable holding the credential, for hosted providers
    pub credential_env: Option<&'static str>,

    /// Models offered when the provider cannot list its own
    pub suggested_models: &'static [&'static str],
}

const PROVIDERS: [ProviderInfo; 6] = [
    ProviderInfo {
        kind: ProviderKind::Ollama,
        display_name: "Ollama (Local)",
        default_model: "qwen2.5:7b",
        connection_fields: &["base_url", "model", "code_model", "use_code_model_for_scripts", "timeout_seconds"],
        credential_env: None,
        suggested_models: &[
            "qwen2.5:7b",
            "llama3.1:8b",
            "mistral:latest",
            "codellama:7b",
            "deepseek-coder:6.7b",
        ],
    },
    ProviderInfo {
        kind: ProviderKind::Vllm,
        display_name: "vLLM (High-Performance Local)",
        default_model: "meta-llama/Llama-3.1-8B-Instruct",
        connection_fields: &[
            "model",
            "use_server",
            "server_url",
            "tensor_parallel_size",
            "gpu_memory_utilization",
            "max_model_len",
            "dtype",
            "quantization",
            "timeout_seconds",
        ],
        credential_env: None,
        suggested_models: &[
            "meta-llama/Llama-3.1-8B-Instruct",
            "mistralai/Mistral-7B-Instruct-v0.3",
            "Qwen/Qwen2.5-7B-Instruct",
        ],
    },
    ProviderInfo {
        kind: ProviderKind::OpenAI,
        display_name: "OpenAI",
        default_model: "gpt-4",
        connection_fields: &["model", "base_url", "timeout_seconds"],
        credential_env: Some("OPENAI_API_KEY"),
        suggested_models: &["gpt-4", "gpt-4-turbo", "gpt-4o", "gpt-4o-mini", "gpt-3.5-turbo"],
    },
    ProviderInfo {
        kind: ProviderKind::Groq,
        display_name: "Groq",
        default_model: "llama-3.1-70b-versatile",
        connection_fields: &["model", "base_url", "timeout_seconds"],
        credential_env: Some("GROQ_API_KEY"),
        suggested_models: &[
            "llama-3.1-70b-versatile",
            "llama-3.1-8b-instant",
            "mixtral-8x7b-32768",
            "gemma2-9b-it",
        ],
    },
    ProviderInfo {
        kind: ProviderKind::Anthropic,
        display_name: "Anthropic",
        default_model: "claude-3-sonnet-20240229",
        connection_fields: &["model", "base_url", "timeout_seconds"],
        credential_env: Some("ANTHROPIC_API_KEY"),
        suggested_models: &[
            "claude-3-sonnet-20240229",
            "claude-3-opus-20240229",
            "claude-3-haiku-20240307",
        ],
    },
    ProviderInfo {
        kind: ProviderKind::HuggingFace,
        display_name: "Hugging Face",
        default_model: "meta-llama/Llama-3.1-8B-Instruct",
        connection_fields: &["model_id", "use_inference_api", "router_url", "timeout_seconds"],
        credential_env: Some("HF_API_TOKEN"),
        suggested_models: &[
            "meta-llama/Llama-3.1-8B-Instruct",
            "mistralai/Mistral-7B-Instruct-v0.2",
            "Qwen/Qwen2.5-7B-Instruct",
        ],
    },
];

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::Ollama,
        ProviderKind::Vllm,
        ProviderKind::OpenAI,
        ProviderKind::Groq,
        ProviderKind::Anthropic,
        ProviderKind::HuggingFace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Vllm => "vllm",
            Self::OpenAI => "openai",
            Self::Groq => "groq",
            Self::Anthropic => "anthropic",
            Self::HuggingFace => "huggingface",
        }
    }

    pub fn info(&self) -> &'static ProviderInfo {
        let index = Self::ALL.iter().position(|k| k == self).unwrap_or(0);
        &PROVIDERS[index]
    }

    /// Providers that run on the local machine and need no credential
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Ollama | Self::Vllm)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "vllm" => Ok(Self::Vllm),
            "openai" => Ok(Self::OpenAI),
            "groq" => Ok(Self::Groq),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            other => Err(format!(
                "unknown provider '{}', expected one of: {}",
                other,
                Self::ALL.map(|k| k.as_str()).join(", ")
            )),
        }
    }
}

/// All registered providers in display order
pub fn providers() -> &'static [ProviderInfo] {
    &PROVIDERS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_aligned_with_kinds() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.info().kind, kind);
        }
        assert_eq!(providers().len(), ProviderKind::ALL.len());
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("Groq".parse::<ProviderKind>(), Ok(ProviderKind::Groq));
        assert_eq!("hf".parse::<ProviderKind>(), Ok(ProviderKind::HuggingFace));
        let err = "gemini".parse::<ProviderKind>().unwrap_err();
        assert!(err.contains("ollama"));
    }

    #[test]
    fn test_hosted_providers_name_credentials() {
        assert_eq!(ProviderKind::OpenAI.info().credential_env, Some("OPENAI_API_KEY"));
        assert_eq!(ProviderKind::HuggingFace.info().credential_env, Some("HF_API_TOKEN"));
        assert!(ProviderKind::Ollama.info().credential_env.is_none());
    }
}
