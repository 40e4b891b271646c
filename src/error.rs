use crate::llm::ProviderKind;
use crate::models::ArtifactType;

/// Result type for req2test operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types surfaced by the generation pipeline and its stores
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Connection refusal, auth failure, timeout or malformed response from an LLM backend
    #[error("Provider not available ({provider}): {message}")]
    ProviderUnavailable {
        provider: ProviderKind,
        message: String,
    },

    /// LLM output did not match the expected structure for one artifact type
    #[error("Could not parse {artifact} output: {message}")]
    GenerationParse {
        artifact: ArtifactType,
        message: String,
    },

    #[error("Document error: {0}")]
    DocumentParse(String),

    #[error("Storage error: {0}")]
    Persistence(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn provider(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider,
            message: message.into(),
        }
    }

    pub fn parse(artifact: ArtifactType, message: impl Into<String>) -> Self {
        Self::GenerationParse {
            artifact,
            message: message.into(),
        }
    }

    pub fn persistence(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Persistence(format!("{}: {}", context, err))
    }

    pub fn export(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Export(format!("{}: {}", context, err))
    }

    /// Message shown to the user, with the recovery hint for this kind of failure
    pub fn user_message(&self) -> String {
        match self {
            Self::ProviderUnavailable { provider, message } => format!(
                "{} is not reachable ({}). Check the provider settings and credentials, then try again.",
                provider.info().display_name,
                message
            ),
            Self::GenerationParse { artifact, message } => format!(
                "The model returned unusable {} output ({}). Other artifacts were kept; regenerate to retry.",
                artifact.display_name(),
                message
            ),
            Self::DocumentParse(message) => {
                format!("{}. Please upload a TXT, PDF or DOCX document.", message)
            }
            Self::Persistence(message) => format!(
                "{}. Changes are kept for this session but may not be saved.",
                message
            ),
            Self::Export(message) => format!(
                "{}. Generated tests are still available for another export.",
                message
            ),
            Self::Configuration(message) => message.clone(),
        }
    }
}
