/// req2test - requirements to test cases
///
/// Turns a requirements document into manual test cases, Gherkin features and
/// Selenium/Playwright scripts with a local or hosted LLM, then exports the
/// result set to Excel, CSV, Markdown or a ZIP bundle.

pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod generator;
pub mod llm;
pub mod models;
pub mod prompts;
pub mod session;
pub mod settings;
pub mod storage;

// Re-export main types for easy access
pub use crate::config::{Config, ConfigBuilder};
pub use crate::document::DocumentParser;
pub use crate::error::{Error, Result};
pub use crate::export::{ExportFormat, ExportHandler};
pub use crate::generator::{GenerationProgress, GenerationRequest, TestGenerator};
pub use crate::llm::{create_llm, GenerationOptions, ProviderKind, LLM};
pub use crate::models::{
    ArtifactType, AutomationScript, ClientContext, ManualTestCase, Requirement, TestSuite,
};
pub use crate::prompts::{PromptBuilder, PromptOptions};
pub use crate::session::Session;
pub use crate::settings::Settings;
