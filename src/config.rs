use crate::error::{Error, Result};
use crate::export::ExportFormat;
use crate::prompts::PromptLimits;
use crate::storage::DataPaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration for req2test
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Where settings, clients, exports and history live
    pub storage: StorageConfig,

    /// Log output
    pub logging: LoggingConfig,

    /// Export defaults
    pub export: ExportConfig,

    /// Character limits applied when building prompts
    pub prompts: PromptLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Data root; `~/.req2test` when unset
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    /// Overrides the format from the user settings when set
    pub default_format: Option<ExportFormat>,

    /// Export directory; `<data_dir>/exports` when unset
    pub export_dir: Option<PathBuf>,

    /// Format of the manual test file inside ZIP bundles
    pub bundle_format: ExportFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_format: None,
            export_dir: None,
            bundle_format: ExportFormat::Excel,
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Candidate config files, in search order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("req2test.toml"),
            PathBuf::from("config/req2test.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("req2test").join("config.toml"));
        }
        paths
    }

    /// Load configuration from the first readable search path, then apply
    /// environment overrides. Falls back to defaults when no file parses.
    pub fn load() -> Self {
        for path in Self::search_paths() {
            if let Ok(config_str) = std::fs::read_to_string(&path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(mut config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path.display());
                        config.apply_env();
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config: Config = toml::from_str(&config_str).map_err(|e| {
            Error::Configuration(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.apply_env();
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Defaults with environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("REQ2TEST_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(level) = lookup("REQ2TEST_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            self.logging.level = level.trim().to_lowercase();
        }

        if let Some(dir) = lookup("REQ2TEST_EXPORT_DIR").filter(|v| !v.trim().is_empty()) {
            self.export.export_dir = Some(PathBuf::from(dir));
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("cannot serialize config: {}", e)))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::persistence(&format!("Cannot create {}", parent.display()), e))?;
        }
        std::fs::write(path, config_str)
            .map_err(|e| Error::persistence(&format!("Cannot write {}", path.display()), e))?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(Error::Configuration(format!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            )));
        }

        let limits = &self.prompts;
        if limits.max_requirement_chars == 0 || limits.max_script_requirement_chars == 0 {
            return Err(Error::Configuration(
                "prompt requirement limits must be greater than 0".to_string(),
            ));
        }

        if self.export.bundle_format == ExportFormat::Zip {
            return Err(Error::Configuration(
                "export.bundle_format cannot be zip".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolved data layout
    pub fn data_paths(&self) -> DataPaths {
        let root = self
            .storage
            .data_dir
            .clone()
            .unwrap_or_else(DataPaths::default_root);
        let mut paths = DataPaths::new(root);
        if let Some(dir) = &self.export.export_dir {
            paths.exports_dir = dir.clone();
        }
        paths
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        let paths = self.data_paths();
        format!(
            "req2test Configuration:\n\
            - Data Directory: {}\n\
            - Export Directory: {}\n\
            - Log Level: {}\n\
            - Default Export Format: {}\n\
            - Requirement Prompt Limit: {} chars\n\
            - Client Context Limit: {} chars",
            paths.root.display(),
            paths.exports_dir.display(),
            self.logging.level,
            self.export
                .default_format
                .map(|f| f.to_string())
                .unwrap_or_else(|| "from settings".to_string()),
            self.prompts.max_requirement_chars,
            self.prompts.max_context_chars
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage.data_dir = Some(dir.into());
        self
    }

    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.export.export_dir = Some(dir.into());
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_default_format(mut self, format: ExportFormat) -> Self {
        self.config.export.default_format = Some(format);
        self
    }

    pub fn with_prompt_limits(mut self, limits: PromptLimits) -> Self {
        self.config.prompts = limits;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.prompts.max_requirement_chars, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_data_dir("/tmp/r2t")
            .with_export_dir("/tmp/out")
            .with_log_level("debug")
            .build();

        let paths = config.data_paths();
        assert_eq!(paths.root, PathBuf::from("/tmp/r2t"));
        assert_eq!(paths.settings_file, PathBuf::from("/tmp/r2t/settings.json"));
        assert_eq!(paths.exports_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            "[logging]\nlevel = \"warn\"\n\n[prompts]\nmax_context_chars = 200\n",
        )
        .unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.prompts.max_context_chars, 200);
        assert_eq!(config.prompts.max_requirement_chars, 3000);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            "REQ2TEST_DATA_DIR" => Some("/srv/req2test".to_string()),
            "REQ2TEST_LOG_LEVEL" => Some("DEBUG".to_string()),
            _ => None,
        });
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/srv/req2test")));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.export.export_dir, None);
    }

    #[test]
    fn test_config_validation() {
        let config = ConfigBuilder::new().with_log_level("loud").build();
        assert!(config.validate().is_err());
    }
}
