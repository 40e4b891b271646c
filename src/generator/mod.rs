pub mod parsing;

pub use parsing::{
    extract_json, format_test_id, link_related_tests, parse_manual_tests, parse_scripts,
    ParsedManualTests,
};

use crate::error::{Error, Result};
use crate::llm::{GenerationOptions, LLM};
use crate::models::{
    ArtifactFailure, ArtifactType, AutomationScript, ClientContext, ManualTestCase, Requirement,
    TestSuite,
};
use crate::prompts::{PromptBuilder, PromptOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One generation request: a requirement, an optional client, and the artifacts to produce
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub requirement: Requirement,
    pub client: Option<ClientContext>,

    /// Requested artifact types; manual tests are always produced
    pub artifacts: Vec<ArtifactType>,

    pub options: PromptOptions,
}

impl GenerationRequest {
    pub fn new(requirement: Requirement) -> Self {
        Self {
            requirement,
            client: None,
            artifacts: vec![ArtifactType::Manual],
            options: PromptOptions::default(),
        }
    }

    pub fn with_client(mut self, client: Option<ClientContext>) -> Self {
        self.client = client;
        self
    }

    pub fn with_artifact(mut self, artifact: ArtifactType) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn with_artifacts(mut self, artifacts: impl IntoIterator<Item = ArtifactType>) -> Self {
        self.artifacts.extend(artifacts);
        self
    }

    pub fn with_options(mut self, options: PromptOptions) -> Self {
        self.options = options;
        self
    }

    /// Manual first, then the selected script types in fixed order
    pub fn planned_artifacts(&self) -> Vec<ArtifactType> {
        ArtifactType::ALL
            .into_iter()
            .filter(|artifact| *artifact == ArtifactType::Manual || self.artifacts.contains(artifact))
            .collect()
    }
}

/// Progress event emitted while a request runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationProgress {
    /// Artifact type being worked on, or "complete"
    pub stage: String,
    pub step: usize,
    pub total_steps: usize,

    /// Overall progress in 0.0..=1.0
    pub progress: f32,
    pub message: String,
    pub completed: bool,
    pub error: Option<String>,
}

/// Runs the per-artifact LLM calls for a request and assembles the result set
pub struct TestGenerator {
    llm: Arc<dyn LLM>,
    code_llm: Option<Arc<dyn LLM>>,
    prompts: PromptBuilder,
    options: GenerationOptions,
    progress: Option<mpsc::UnboundedSender<GenerationProgress>>,
}

impl TestGenerator {
    pub fn new(llm: Arc<dyn LLM>) -> Self {
        Self {
            llm,
            code_llm: None,
            prompts: PromptBuilder::default(),
            options: GenerationOptions::default(),
            progress: None,
        }
    }

    /// Adapter used for Selenium and Playwright prompts
    pub fn with_code_llm(mut self, code_llm: Option<Arc<dyn LLM>>) -> Self {
        self.code_llm = code_llm;
        self
    }

    pub fn with_prompt_builder(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_generation_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<GenerationProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    fn report(&self, progress: GenerationProgress) {
        if let Some(sender) = &self.progress {
            // A dropped receiver only means nobody is watching
            let _ = sender.send(progress);
        }
    }

    fn llm_for(&self, artifact: ArtifactType) -> &Arc<dyn LLM> {
        match (artifact, &self.code_llm) {
            (ArtifactType::Selenium | ArtifactType::Playwright, Some(code_llm)) => code_llm,
            _ => &self.llm,
        }
    }

    /// Generates every planned artifact type in order.
    ///
    /// A failing artifact type is recorded on the suite and the remaining types
    /// still run. Blank requirements are rejected before any LLM call.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<TestSuite> {
        let requirement = &request.requirement;
        if requirement.is_blank() {
            return Err(Error::DocumentParse(format!(
                "{} has no requirement text",
                requirement.filename
            )));
        }

        let plan = request.planned_artifacts();
        let total_steps = plan.len();
        let started = Instant::now();

        let mut suite = TestSuite::new(requirement.display_name(), &requirement.filename);
        suite.description = format!("Test suite generated from {}", requirement.filename);
        if let Some(client) = &request.client {
            suite.client_id = Some(client.id.clone());
            suite.client_name = Some(client.name.clone());
        }

        info!(
            "🚀 Generating {} artifact type(s) for {} with {}",
            total_steps,
            requirement.filename,
            self.llm.model()
        );

        let mut id_map: HashMap<String, String> = HashMap::new();
        let mut scripts: Vec<AutomationScript> = Vec::new();

        for (index, artifact) in plan.into_iter().enumerate() {
            self.report(GenerationProgress {
                stage: artifact.to_string(),
                step: index + 1,
                total_steps,
                progress: index as f32 / total_steps as f32,
                message: format!(
                    "🤖 Generating {} with {}",
                    artifact.display_name(),
                    self.llm_for(artifact).model()
                ),
                completed: false,
                error: None,
            });

            let outcome = match artifact {
                ArtifactType::Manual => self.generate_manual(request).await.map(|parsed| {
                    let count = parsed.tests.len();
                    id_map = parsed.id_map;
                    suite.manual_tests = parsed.tests;
                    count
                }),
                other => self.generate_scripts(other, request).await.map(|generated| {
                    let count = generated.len();
                    scripts.extend(generated);
                    count
                }),
            };

            let (message, error) = match outcome {
                Ok(count) => {
                    suite.completed.push(artifact);
                    info!("✅ Generated {} {}", count, artifact.display_name());
                    (format!("✅ Generated {} {}", count, artifact.display_name()), None)
                }
                Err(e) => {
                    warn!("❌ {} generation failed: {}", artifact, e);
                    suite.failures.push(ArtifactFailure {
                        artifact,
                        message: e.to_string(),
                    });
                    (format!("⚠️ {} failed", artifact.display_name()), Some(e.to_string()))
                }
            };

            self.report(GenerationProgress {
                stage: artifact.to_string(),
                step: index + 1,
                total_steps,
                progress: ((index + 1) as f32 / total_steps as f32).min(0.99),
                message,
                completed: false,
                error,
            });
        }

        link_related_tests(&mut scripts, &suite.manual_tests, &id_map);
        suite.scripts = scripts;

        let summary = suite.summary();
        info!(
            "📊 Generation finished in {:.1}s: {} manual tests, {} scenarios, {} Selenium, {} Playwright, {} failed",
            started.elapsed().as_secs_f32(),
            summary.manual_tests,
            summary.gherkin_scenarios,
            summary.selenium_tests,
            summary.playwright_tests,
            suite.failures.len()
        );

        self.report(GenerationProgress {
            stage: "complete".to_string(),
            step: total_steps,
            total_steps,
            progress: 1.0,
            message: format!("🎉 Complete! {} items generated", summary.total()),
            completed: true,
            error: None,
        });

        Ok(suite)
    }

    async fn generate_manual(&self, request: &GenerationRequest) -> Result<ParsedManualTests> {
        let prompt = self.prompts.manual_tests(
            &request.requirement.content,
            request.client.as_ref(),
            &request.options,
        );
        let response = self
            .llm
            .generate(&prompt, Some(self.prompts.system_prompt()), &self.options)
            .await?;
        debug!("Manual test response: {} chars", response.content.len());
        parse_manual_tests(&response.content, "test_cases", 1)
    }

    async fn generate_scripts(
        &self,
        artifact: ArtifactType,
        request: &GenerationRequest,
    ) -> Result<Vec<AutomationScript>> {
        let prompt = self.prompts.for_artifact(
            artifact,
            &request.requirement.content,
            request.client.as_ref(),
            &request.options,
        );
        let response = self
            .llm_for(artifact)
            .generate(&prompt, Some(self.prompts.system_prompt()), &self.options)
            .await?;
        debug!("{} response: {} chars", artifact, response.content.len());
        parse_scripts(&response.content, artifact)
    }

    /// Asks the model for tests the current list does not cover.
    ///
    /// Returned tests are numbered after the highest existing `TC_NNN` id.
    pub async fn enhance_tests(
        &self,
        current: &[ManualTestCase],
        request: &GenerationRequest,
    ) -> Result<Vec<ManualTestCase>> {
        if request.requirement.is_blank() {
            return Err(Error::DocumentParse(format!(
                "{} has no requirement text",
                request.requirement.filename
            )));
        }

        let first_number = next_test_number(current);
        let prompt = self.prompts.enhancement(current, &request.requirement.content);
        info!("🔍 Looking for gaps in {} existing tests", current.len());

        let response = self
            .llm
            .generate(&prompt, Some(self.prompts.system_prompt()), &self.options)
            .await?;
        let parsed = parse_manual_tests(&response.content, "additional_tests", first_number)?;

        info!("✅ Added {} tests", parsed.tests.len());
        Ok(parsed.tests)
    }
}

/// One past the highest `TC_NNN` number in use
fn next_test_number(tests: &[ManualTestCase]) -> usize {
    tests
        .iter()
        .filter_map(|t| t.test_id.strip_prefix("TC_")?.parse::<usize>().ok())
        .max()
        .unwrap_or(tests.len())
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planned_artifacts_manual_first() {
        let request = GenerationRequest::new(Requirement::from_text("req")).with_artifacts([
            ArtifactType::Playwright,
            ArtifactType::Gherkin,
            ArtifactType::Playwright,
        ]);
        assert_eq!(
            request.planned_artifacts(),
            vec![ArtifactType::Manual, ArtifactType::Gherkin, ArtifactType::Playwright]
        );

        let manual_only = GenerationRequest {
            artifacts: vec![],
            ..GenerationRequest::new(Requirement::from_text("req"))
        };
        assert_eq!(manual_only.planned_artifacts(), vec![ArtifactType::Manual]);
    }

    #[test]
    fn test_next_test_number() {
        assert_eq!(next_test_number(&[]), 1);
        let tests = vec![
            ManualTestCase::new("TC_001", "a"),
            ManualTestCase::new("TC_007", "b"),
            ManualTestCase::new("custom", "c"),
        ];
        assert_eq!(next_test_number(&tests), 8);
        assert_eq!(next_test_number(&[ManualTestCase::new("X", "x")]), 2);
    }
}
