use crate::config::Config;
use crate::error::{Error, Result};
use crate::export::{ExportFormat, ExportHandler};
use crate::generator::{GenerationProgress, GenerationRequest, TestGenerator};
use crate::llm::{create_code_llm, create_llm, GenerationOptions};
use crate::models::{ArtifactType, ClientContext, GenerationRecord, Requirement, TestSuite};
use crate::prompts::PromptBuilder;
use crate::settings::Settings;
use crate::storage::{ClientStore, DataPaths, HistoryStore, SettingsStore};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Everything one user session works with: settings, stores, the selected
/// client and the latest result set.
///
/// Storage failures while opening or recording history are collected as
/// warnings; the session keeps working from memory.
pub struct Session {
    config: Config,
    paths: DataPaths,
    settings: Settings,
    settings_store: SettingsStore,
    clients: ClientStore,
    history: Option<HistoryStore>,
    exporter: ExportHandler,
    client: Option<ClientContext>,
    last_request: Option<GenerationRequest>,
    last_result: Option<TestSuite>,
    warnings: Vec<String>,
}

impl Session {
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let paths = config.data_paths();
        let mut warnings = Vec::new();

        if let Err(e) = paths.ensure().await {
            warn!("{}", e);
            warnings.push(e.user_message());
        }

        let settings_store = SettingsStore::new(&paths.settings_file);
        let settings = match settings_store.load().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Using default settings: {}", e);
                warnings.push(e.user_message());
                let mut settings = Settings::default();
                settings.apply_env_credentials();
                settings
            }
        };

        let history = match HistoryStore::open(&paths.history_db) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!("History disabled: {}", e);
                warnings.push(e.user_message());
                None
            }
        };

        let exporter = ExportHandler::new(&paths.exports_dir).with_bundle_format(config.export.bundle_format);

        info!(
            "📁 Session opened at {} (provider: {})",
            paths.root.display(),
            settings.llm_provider
        );

        Ok(Self {
            clients: ClientStore::new(&paths.clients_dir),
            config,
            paths,
            settings,
            settings_store,
            history,
            exporter,
            client: None,
            last_request: None,
            last_result: None,
            warnings,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// In-memory changes apply immediately; call `save_settings` to persist them
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub async fn save_settings(&mut self) -> Result<()> {
        self.settings.validate()?;
        self.settings_store.save(&self.settings).await
    }

    pub fn clients(&self) -> &ClientStore {
        &self.clients
    }

    /// Selects a client by id or name for the following generations
    pub async fn select_client(&mut self, id_or_name: &str) -> Result<&ClientContext> {
        let client = self
            .clients
            .find(id_or_name)
            .await?
            .ok_or_else(|| Error::Persistence(format!("no client matches '{}'", id_or_name)))?;
        info!("👤 Selected client {} ({})", client.name, client.id);
        Ok(&*self.client.insert(client))
    }

    pub fn clear_client(&mut self) {
        self.client = None;
    }

    pub fn client(&self) -> Option<&ClientContext> {
        self.client.as_ref()
    }

    /// Generator wired to the active provider, with the code model when configured
    pub fn build_generator(&self) -> Result<TestGenerator> {
        let llm = Arc::from(create_llm(&self.settings)?);
        let code_llm = create_code_llm(&self.settings)?.map(Arc::from);

        Ok(TestGenerator::new(llm)
            .with_code_llm(code_llm)
            .with_prompt_builder(PromptBuilder::new(self.config.prompts.clone()))
            .with_generation_options(GenerationOptions::from_settings(&self.settings)))
    }

    /// Request for `requirement` using the selected client and the settings' coverage toggles
    pub fn request_for(&self, requirement: Requirement, artifacts: &[ArtifactType]) -> GenerationRequest {
        GenerationRequest::new(requirement)
            .with_client(self.client.clone())
            .with_artifacts(artifacts.iter().copied())
            .with_options(self.settings.generation.prompt_options())
    }

    pub async fn generate(
        &mut self,
        requirement: Requirement,
        artifacts: &[ArtifactType],
        progress: Option<mpsc::UnboundedSender<GenerationProgress>>,
    ) -> Result<&TestSuite> {
        let mut generator = self.build_generator()?;
        if let Some(sender) = progress {
            generator = generator.with_progress(sender);
        }
        let request = self.request_for(requirement, artifacts);
        self.generate_with(&generator, request).await
    }

    /// Runs `request` on `generator`, keeps the result and appends a history record
    pub async fn generate_with(
        &mut self,
        generator: &TestGenerator,
        request: GenerationRequest,
    ) -> Result<&TestSuite> {
        let suite = generator.generate(&request).await?;

        let model = format!("{}/{}", self.settings.llm_provider, self.settings.active_model());
        let record = GenerationRecord::from_suite(&suite, model);
        let appended = match &self.history {
            Some(history) => history.append(&record).map(|_| ()),
            None => Ok(()),
        };
        if let Err(e) = appended {
            self.push_warning(e);
        }

        self.last_request = Some(request);
        Ok(&*self.last_result.insert(suite))
    }

    /// Adds gap-filling tests to the latest result set and returns how many were added
    pub async fn enhance_last(&mut self, generator: &TestGenerator) -> Result<usize> {
        let (request, suite) = match (&self.last_request, &mut self.last_result) {
            (Some(request), Some(suite)) => (request, suite),
            _ => {
                return Err(Error::DocumentParse(
                    "generate tests before asking for more".to_string(),
                ))
            }
        };

        let added = generator.enhance_tests(&suite.manual_tests, request).await?;
        let count = added.len();
        suite.manual_tests.extend(added);
        Ok(count)
    }

    pub fn last_result(&self) -> Option<&TestSuite> {
        self.last_result.as_ref()
    }

    /// Format used when the caller does not pick one
    pub fn default_export_format(&self) -> ExportFormat {
        self.config
            .export
            .default_format
            .unwrap_or(self.settings.default_export_format)
    }

    fn result_to_export(&self) -> Result<&TestSuite> {
        self.last_result
            .as_ref()
            .ok_or_else(|| Error::Export("nothing to export: no generation has run".to_string()))
    }

    pub async fn export_last(&self, format: Option<ExportFormat>) -> Result<PathBuf> {
        let format = format.unwrap_or_else(|| self.default_export_format());
        let suite = self.result_to_export()?;
        self.exporter.export(suite, format, &Local::now()).await
    }

    pub async fn export_scripts(&self, artifact: ArtifactType) -> Result<Vec<PathBuf>> {
        let suite = self.result_to_export()?;
        self.exporter.export_scripts(suite, artifact, &Local::now()).await
    }

    /// Newest records first; empty when history is unavailable
    pub fn history(&self, client_id: Option<&str>, limit: usize) -> Result<Vec<GenerationRecord>> {
        match &self.history {
            Some(history) => history.list(client_id, limit),
            None => Ok(Vec::new()),
        }
    }

    fn push_warning(&mut self, err: Error) {
        warn!("{}", err);
        self.warnings.push(err.user_message());
    }

    /// Drains the non-fatal warnings collected so far
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}
