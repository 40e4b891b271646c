use super::write_atomic_async;
use crate::error::{Error, Result};
use crate::settings::{strip_credentials, Settings};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Single JSON settings document; credentials come from the environment only
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads settings, falling back to defaults when the file does not exist.
    ///
    /// Credential fields found in the file are ignored; API keys are then read
    /// from the environment.
    pub async fn load(&self) -> Result<Settings> {
        let mut settings = match fs::read_to_string(&self.path).await {
            Ok(content) => Self::parse(&content)
                .map_err(|e| Error::persistence(&format!("Invalid settings file {}", self.path.display()), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}, using defaults", self.path.display());
                Settings::default()
            }
            Err(e) => {
                return Err(Error::persistence(
                    &format!("Cannot read {}", self.path.display()),
                    e,
                ))
            }
        };

        settings.apply_env_credentials();
        Ok(settings)
    }

    fn parse(content: &str) -> std::result::Result<Settings, serde_json::Error> {
        let mut value: Value = serde_json::from_str(content)?;
        let removed = strip_credentials(&mut value);
        if removed > 0 {
            warn!("Ignored {} credential field(s) in the settings file", removed);
        }
        Settings::from_json(value)
    }

    /// Writes settings with every `*_key`/`*_token` field removed
    pub async fn save(&self, settings: &Settings) -> Result<()> {
        let value = settings.to_persisted_json()?;
        let json = serde_json::to_vec_pretty(&value)
            .map_err(|e| Error::persistence("Failed to serialize settings", e))?;

        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "settings.json".to_string());

        write_atomic_async(dir, name, json, true)
            .await
            .map_err(|e| Error::persistence(&format!("Cannot write {}", self.path.display()), e))?;

        info!("💾 Settings saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        let settings = store.load().await.unwrap();
        assert_eq!(settings.llm_provider, Settings::default().llm_provider);
    }

    #[tokio::test]
    async fn test_save_strips_credentials() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));

        let mut settings = Settings::default();
        settings.llm_provider = ProviderKind::Groq;
        settings.groq.api_key = Some("gsk-secret".to_string());
        store.save(&settings).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("gsk-secret"));
        assert!(!raw.contains("api_key"));
        assert!(raw.contains("\"groq\""));
    }

    #[tokio::test]
    async fn test_load_ignores_persisted_credentials() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"llm_provider": "anthropic", "anthropic": {"model": "claude-3-haiku-20240307", "base_url": "https://api.anthropic.com", "timeout_seconds": 60, "api_key": "sk-from-disk"}}"#,
        )
        .unwrap();

        let settings = SettingsStore::parse(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(settings.llm_provider, ProviderKind::Anthropic);
        assert_eq!(settings.anthropic.model, "claude-3-haiku-20240307");
        assert!(settings.anthropic.api_key.is_none());
    }

    #[tokio::test]
    async fn test_load_partial_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"llm_provider": "ollama", "ollama": {"model": "llama3.1:8b"}}"#).unwrap();

        let settings = SettingsStore::new(path).load().await.unwrap();
        assert_eq!(settings.llm_provider, ProviderKind::Ollama);
        assert_eq!(settings.ollama.model, "llama3.1:8b");
        assert_eq!(settings.ollama.base_url, "http://localhost:11434");
        assert_eq!(settings.vllm, Settings::default().vllm);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = SettingsStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }
}
