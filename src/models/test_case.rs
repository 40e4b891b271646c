use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Artifact types produced by a generation request, in pipeline order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    Manual,
    Gherkin,
    Selenium,
    Playwright,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 4] = [
        ArtifactType::Manual,
        ArtifactType::Gherkin,
        ArtifactType::Selenium,
        ArtifactType::Playwright,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Gherkin => "gherkin",
            Self::Selenium => "selenium",
            Self::Playwright => "playwright",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Manual => "manual test cases",
            Self::Gherkin => "Gherkin features",
            Self::Selenium => "Selenium scripts",
            Self::Playwright => "Playwright specs",
        }
    }

    /// File extension for script artifacts; manual tests are exported through a chosen format
    pub fn script_extension(&self) -> Option<&'static str> {
        match self {
            Self::Manual => None,
            Self::Gherkin => Some("feature"),
            Self::Selenium => Some("py"),
            Self::Playwright => Some("spec.js"),
        }
    }

    /// Directory used inside ZIP bundles
    pub fn bundle_dir(&self) -> &'static str {
        match self {
            Self::Manual => "manual_tests",
            Self::Gherkin => "gherkin",
            Self::Selenium => "selenium",
            Self::Playwright => "playwright",
        }
    }

    /// Label used in export filenames
    pub fn export_label(&self) -> &'static str {
        match self {
            Self::Manual => "ManualTests",
            Self::Gherkin => "Gherkin",
            Self::Selenium => "Selenium",
            Self::Playwright => "Playwright",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "gherkin" | "bdd" => Ok(Self::Gherkin),
            "selenium" => Ok(Self::Selenium),
            "playwright" => Ok(Self::Playwright),
            other => Err(format!("unknown artifact type: {}", other)),
        }
    }
}

/// Test priority; values outside High/Medium/Low are clamped while parsing model output
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    /// Accepts the usual spellings models produce ("high", "P1", "Critical", ...)
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "high" | "h" | "p1" | "p0" | "critical" | "blocker" => Some(Self::High),
            "medium" | "med" | "m" | "p2" | "normal" | "major" => Some(Self::Medium),
            "low" | "l" | "p3" | "p4" | "minor" | "trivial" => Some(Self::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(s).ok_or_else(|| format!("unknown priority: {}", s))
    }
}

/// Execution status of a manual test
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TestStatus {
    #[default]
    New,
    #[serde(rename = "In Progress")]
    InProgress,
    Passed,
    Failed,
    Blocked,
    Skipped,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::InProgress => "In Progress",
            Self::Passed => "Passed",
            Self::Failed => "Failed",
            Self::Blocked => "Blocked",
            Self::Skipped => "Skipped",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories the prompts ask for
pub const KNOWN_CATEGORIES: [&str; 11] = [
    "Functional",
    "UI",
    "Integration",
    "Regression",
    "Smoke",
    "Security",
    "Performance",
    "Usability",
    "Edge Case",
    "Negative",
    "Boundary",
];

/// Canonical spelling for known categories; anything else is kept as the model wrote it
pub fn normalize_category(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "Functional".to_string();
    }

    let folded = trimmed.to_lowercase().replace(['-', '_'], " ");
    KNOWN_CATEGORIES
        .iter()
        .find(|known| known.to_lowercase() == folded)
        .map(|known| known.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// A single step of a manual test
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TestStep {
    pub step_number: u32,
    pub action: String,
    #[serde(default)]
    pub test_data: String,
    #[serde(default)]
    pub expected_result: String,
}

impl TestStep {
    /// One-line form used in tabular exports
    pub fn summary_line(&self) -> String {
        if self.test_data.is_empty() {
            format!("{}. {}", self.step_number, self.action)
        } else {
            format!("{}. {} [Data: {}]", self.step_number, self.action, self.test_data)
        }
    }

    pub fn to_text(&self) -> String {
        let mut text = format!("Step {}: {}", self.step_number, self.action);
        if !self.test_data.is_empty() {
            text.push_str(&format!("\n   Test Data: {}", self.test_data));
        }
        if !self.expected_result.is_empty() {
            text.push_str(&format!("\n   Expected: {}", self.expected_result));
        }
        text
    }
}

/// A manual test case
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManualTestCase {
    /// Sequential identifier (TC_001, TC_002, ...)
    pub test_id: String,
    pub test_name: String,
    pub description: String,
    #[serde(default)]
    pub preconditions: Vec<String>,
    #[serde(default)]
    pub test_steps: Vec<TestStep>,
    #[serde(default)]
    pub expected_results: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    pub category: String,
    #[serde(default)]
    pub status: TestStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

impl ManualTestCase {
    pub fn new(test_id: impl Into<String>, test_name: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            test_name: test_name.into(),
            description: String::new(),
            preconditions: Vec::new(),
            test_steps: Vec::new(),
            expected_results: Vec::new(),
            priority: Priority::default(),
            category: "Functional".to_string(),
            status: TestStatus::default(),
            tags: Vec::new(),
            notes: String::new(),
        }
    }

    pub fn steps_text(&self) -> String {
        self.test_steps
            .iter()
            .map(TestStep::summary_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn expected_results_text(&self) -> String {
        self.expected_results
            .iter()
            .enumerate()
            .map(|(i, result)| format!("{}. {}", i + 1, result))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn preconditions_text(&self) -> String {
        self.preconditions
            .iter()
            .map(|p| format!("- {}", p))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tags_text(&self) -> String {
        self.tags.join(", ")
    }

    pub fn to_text(&self) -> String {
        let rule = "=".repeat(60);
        let mut lines = vec![
            rule.clone(),
            format!("TEST CASE: {}", self.test_id),
            rule.clone(),
            format!("TEST NAME: {}", self.test_name),
            String::new(),
            "DESCRIPTION:".to_string(),
            format!("  {}", self.description),
            String::new(),
            format!("PRIORITY: {}", self.priority),
            format!("CATEGORY: {}", self.category),
            format!("STATUS: {}", self.status),
        ];

        if !self.tags.is_empty() {
            lines.push(format!("TAGS: {}", self.tags_text()));
        }

        lines.push(String::new());
        lines.push("PRECONDITIONS:".to_string());
        lines.extend(self.preconditions.iter().map(|p| format!("  - {}", p)));

        lines.push(String::new());
        lines.push("TEST STEPS:".to_string());
        lines.extend(self.test_steps.iter().map(|s| format!("  {}", s.to_text())));

        lines.push(String::new());
        lines.push("EXPECTED RESULTS:".to_string());
        lines.extend(
            self.expected_results
                .iter()
                .enumerate()
                .map(|(i, r)| format!("  {}. {}", i + 1, r)),
        );

        if !self.notes.is_empty() {
            lines.push(String::new());
            lines.push(format!("NOTES: {}", self.notes));
        }

        lines.push(rule);
        lines.join("\n")
    }
}

/// A generated automation artifact (feature file, Selenium test, Playwright spec)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutomationScript {
    pub script_type: ArtifactType,
    pub filename: String,
    pub content: String,
    #[serde(default)]
    pub related_test_ids: Vec<String>,
    #[serde(default)]
    pub feature_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scenario_count: u32,
}

impl AutomationScript {
    /// Filename with the extension expected for this script type
    pub fn normalized_filename(&self) -> String {
        let base = if self.filename.trim().is_empty() {
            format!("{}_test", self.script_type.as_str())
        } else {
            self.filename.trim().to_string()
        };

        match self.script_type {
            ArtifactType::Playwright => {
                if base.ends_with(".spec.js") {
                    base
                } else if let Some(stem) = base.strip_suffix(".js") {
                    format!("{}.spec.js", stem)
                } else {
                    format!("{}.spec.js", base)
                }
            }
            other => match other.script_extension() {
                Some(ext) if !base.ends_with(&format!(".{}", ext)) => format!("{}.{}", base, ext),
                _ => base,
            },
        }
    }
}

/// An artifact type that failed during a generation request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactFailure {
    pub artifact: ArtifactType,
    pub message: String,
}

/// Counts per artifact type
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuiteSummary {
    pub manual_tests: usize,
    pub gherkin_scenarios: usize,
    pub selenium_tests: usize,
    pub playwright_tests: usize,
}

impl SuiteSummary {
    pub fn total(&self) -> usize {
        self.manual_tests + self.gherkin_scenarios + self.selenium_tests + self.playwright_tests
    }
}

/// Result set of one generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuite {
    pub name: String,
    pub description: String,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub requirement_source: String,
    pub generated_at: DateTime<Local>,

    /// Manual tests in the order the model returned them
    pub manual_tests: Vec<ManualTestCase>,

    /// Scripts in artifact order, then model order
    pub scripts: Vec<AutomationScript>,

    /// Artifact types that finished successfully
    pub completed: Vec<ArtifactType>,

    /// Artifact types that failed, with the reason
    pub failures: Vec<ArtifactFailure>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>, requirement_source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            client_id: None,
            client_name: None,
            requirement_source: requirement_source.into(),
            generated_at: Local::now(),
            manual_tests: Vec::new(),
            scripts: Vec::new(),
            completed: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn scripts_of(&self, script_type: ArtifactType) -> impl Iterator<Item = &AutomationScript> {
        self.scripts
            .iter()
            .filter(move |s| s.script_type == script_type)
    }

    pub fn summary(&self) -> SuiteSummary {
        SuiteSummary {
            manual_tests: self.manual_tests.len(),
            gherkin_scenarios: self
                .scripts_of(ArtifactType::Gherkin)
                .map(|s| s.scenario_count as usize)
                .sum(),
            selenium_tests: self.scripts_of(ArtifactType::Selenium).count(),
            playwright_tests: self.scripts_of(ArtifactType::Playwright).count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.manual_tests.is_empty() && self.scripts.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn failed_artifacts(&self) -> Vec<ArtifactType> {
        self.failures.iter().map(|f| f.artifact).collect()
    }

    pub fn count_for(&self, artifact: ArtifactType) -> usize {
        match artifact {
            ArtifactType::Manual => self.manual_tests.len(),
            other => self.scripts_of(other).count(),
        }
    }
}
