use crate::error::{Error, Result};
use crate::models::{ArtifactType, ManualTestCase, Priority, TestSuite};
use crate::storage::write_atomic_async;
use chrono::{DateTime, Local};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Column order shared by the Excel and CSV exports
pub const MANUAL_TEST_HEADERS: [&str; 10] = [
    "Test ID",
    "Test Name",
    "Description",
    "Preconditions",
    "Test Steps",
    "Expected Results",
    "Priority",
    "Status",
    "Category",
    "Tags",
];

const COLUMN_WIDTHS: [f64; 10] = [10.0, 35.0, 40.0, 30.0, 50.0, 40.0, 10.0, 12.0, 15.0, 20.0];
const PRIORITY_COLUMN: usize = 6;
const MAX_NAME_PART: usize = 50;

/// Output format for manual tests (ZIP bundles everything)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Excel,
    Csv,
    Markdown,
    Zip,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excel => "excel",
            Self::Csv => "csv",
            Self::Markdown => "markdown",
            Self::Zip => "zip",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Excel => "xlsx",
            Self::Csv => "csv",
            Self::Markdown => "md",
            Self::Zip => "zip",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "excel" | "xlsx" => Ok(Self::Excel),
            "csv" => Ok(Self::Csv),
            "markdown" | "md" => Ok(Self::Markdown),
            "zip" => Ok(Self::Zip),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

/// Strips reserved characters, turns spaces into underscores and caps the length
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') && !c.is_control())
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    let trimmed: String = cleaned
        .trim_matches(|c| c == '.' || c == '_')
        .chars()
        .take(MAX_NAME_PART)
        .collect();

    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed
    }
}

/// One row of the tabular exports, in `MANUAL_TEST_HEADERS` order
pub fn manual_test_row(test: &ManualTestCase) -> [String; 10] {
    [
        test.test_id.clone(),
        test.test_name.clone(),
        test.description.clone(),
        test.preconditions_text(),
        test.steps_text(),
        test.expected_results_text(),
        test.priority.to_string(),
        test.status.to_string(),
        test.category.clone(),
        test.tags_text(),
    ]
}

fn xlsx_error(err: rust_xlsxwriter::XlsxError) -> Error {
    Error::export("Excel export failed", err)
}

fn zip_error(err: impl fmt::Display) -> Error {
    Error::export("ZIP bundle failed", err)
}

/// Serializes result sets and writes them into the export directory
#[derive(Debug, Clone)]
pub struct ExportHandler {
    export_dir: PathBuf,

    /// Format of the manual test file placed inside ZIP bundles
    bundle_format: ExportFormat,
}

impl ExportHandler {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            bundle_format: ExportFormat::Excel,
        }
    }

    pub fn with_bundle_format(mut self, format: ExportFormat) -> Self {
        if format != ExportFormat::Zip {
            self.bundle_format = format;
        }
        self
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// `{client}_{requirement}_{label}_{timestamp}.{ext}`
    pub fn export_filename(
        suite: &TestSuite,
        label: &str,
        extension: &str,
        timestamp: &DateTime<Local>,
    ) -> String {
        let client = suite.client_name.as_deref().unwrap_or("NoClient");
        let requirement = Path::new(&suite.requirement_source)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "Tests".to_string());

        format!(
            "{}_{}_{}_{}.{}",
            sanitize_filename(client),
            sanitize_filename(&requirement),
            label,
            timestamp.format("%Y%m%d_%H%M%S"),
            extension
        )
    }

    /// Renders a result set to bytes without touching the disk
    pub fn render(&self, suite: &TestSuite, format: ExportFormat, timestamp: &DateTime<Local>) -> Result<Vec<u8>> {
        match format {
            ExportFormat::Excel => self.to_excel(suite),
            ExportFormat::Csv => self.to_csv(suite),
            ExportFormat::Markdown => Ok(self.to_markdown(suite).into_bytes()),
            ExportFormat::Zip => self.to_zip(suite, timestamp),
        }
    }

    /// Writes one export file and returns its path.
    ///
    /// Never overwrites an existing file; nothing is left behind on failure.
    pub async fn export(
        &self,
        suite: &TestSuite,
        format: ExportFormat,
        timestamp: &DateTime<Local>,
    ) -> Result<PathBuf> {
        match format {
            ExportFormat::Zip if suite.is_empty() => {
                return Err(Error::Export("nothing to export: the result set is empty".to_string()))
            }
            ExportFormat::Excel | ExportFormat::Csv | ExportFormat::Markdown
                if suite.manual_tests.is_empty() =>
            {
                return Err(Error::Export(
                    "nothing to export: no manual test cases were generated".to_string(),
                ))
            }
            _ => {}
        }

        let label = match format {
            ExportFormat::Zip => "TestSuite",
            _ => ArtifactType::Manual.export_label(),
        };
        let filename = Self::export_filename(suite, label, format.extension(), timestamp);
        let bytes = self.render(suite, format, timestamp)?;

        let path = write_atomic_async(self.export_dir.clone(), filename.clone(), bytes, false)
            .await
            .map_err(|e| Error::export(&format!("cannot write {}", filename), e))?;

        info!("💾 Exported {} to {}", format, path.display());
        Ok(path)
    }

    /// Writes each script of one type as its own file
    pub async fn export_scripts(
        &self,
        suite: &TestSuite,
        artifact: ArtifactType,
        timestamp: &DateTime<Local>,
    ) -> Result<Vec<PathBuf>> {
        let files = Self::script_files(suite, artifact);
        if files.is_empty() {
            return Err(Error::Export(format!(
                "nothing to export: no {} were generated",
                artifact.display_name()
            )));
        }

        let extension = artifact.script_extension().unwrap_or("txt");
        let mut used = HashSet::new();
        let targets: Vec<(String, String)> = files
            .into_iter()
            .map(|(script_name, content)| {
                let stem = script_name
                    .strip_suffix(&format!(".{}", extension))
                    .unwrap_or(&script_name);
                let label = format!("{}_{}", artifact.export_label(), sanitize_filename(stem));
                let filename = Self::export_filename(suite, &label, extension, timestamp);
                (unique_name(filename, &mut used), content)
            })
            .collect();

        let mut paths = Vec::with_capacity(targets.len());
        for (filename, content) in targets {
            match write_atomic_async(self.export_dir.clone(), filename.clone(), content.into_bytes(), false).await {
                Ok(path) => paths.push(path),
                Err(e) => {
                    for written in &paths {
                        if let Err(remove_err) = tokio::fs::remove_file(written).await {
                            warn!("Could not remove {}: {}", written.display(), remove_err);
                        }
                    }
                    return Err(Error::export(&format!("cannot write {}", filename), e));
                }
            }
        }

        info!("💾 Exported {} {} file(s)", paths.len(), artifact);
        Ok(paths)
    }

    /// `(filename, content)` for every script of one type.
    ///
    /// Repeated filenames get a `_2`, `_3`, ... suffix.
    pub fn script_files(suite: &TestSuite, artifact: ArtifactType) -> Vec<(String, String)> {
        let mut used = HashSet::new();
        suite
            .scripts_of(artifact)
            .map(|script| {
                let name = unique_name(script.normalized_filename(), &mut used);
                (name, script.content.clone())
            })
            .collect()
    }

    pub fn to_csv(&self, suite: &TestSuite) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(MANUAL_TEST_HEADERS)
            .map_err(|e| Error::export("CSV export failed", e))?;
        for test in &suite.manual_tests {
            writer
                .write_record(manual_test_row(test))
                .map_err(|e| Error::export("CSV export failed", e))?;
        }
        writer
            .into_inner()
            .map_err(|e| Error::export("CSV export failed", e))
    }

    pub fn to_excel(&self, suite: &TestSuite) -> Result<Vec<u8>> {
        let header = Format::new()
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(Color::RGB(0x4472C4))
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_text_wrap()
            .set_border(FormatBorder::Thin);
        let cell = Format::new()
            .set_align(FormatAlign::Top)
            .set_text_wrap()
            .set_border(FormatBorder::Thin);

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Manual Test Cases").map_err(xlsx_error)?;

        for (col, (title, width)) in MANUAL_TEST_HEADERS.iter().zip(COLUMN_WIDTHS).enumerate() {
            let col = col as u16;
            sheet
                .write_string_with_format(0, col, *title, &header)
                .map_err(xlsx_error)?;
            sheet.set_column_width(col, width).map_err(xlsx_error)?;
        }

        for (index, test) in suite.manual_tests.iter().enumerate() {
            let row = index as u32 + 1;
            for (col, value) in manual_test_row(test).iter().enumerate() {
                let format = if col == PRIORITY_COLUMN {
                    cell.clone().set_background_color(priority_fill(test.priority))
                } else {
                    cell.clone()
                };
                sheet
                    .write_string_with_format(row, col as u16, value, &format)
                    .map_err(xlsx_error)?;
            }
        }

        sheet.set_freeze_panes(1, 0).map_err(xlsx_error)?;
        sheet
            .autofilter(
                0,
                0,
                suite.manual_tests.len() as u32,
                (MANUAL_TEST_HEADERS.len() - 1) as u16,
            )
            .map_err(xlsx_error)?;

        workbook.save_to_buffer().map_err(xlsx_error)
    }

    pub fn to_markdown(&self, suite: &TestSuite) -> String {
        let mut lines = vec![
            format!("# Test Suite: {}", suite.name),
            String::new(),
            format!("**Client:** {}", suite.client_name.as_deref().unwrap_or("N/A")),
            format!("**Source:** {}", suite.requirement_source),
            format!("**Generated:** {}", suite.generated_at.format("%Y-%m-%d %H:%M:%S")),
            format!("**Total Tests:** {}", suite.manual_tests.len()),
            String::new(),
            "---".to_string(),
            String::new(),
            "## Summary".to_string(),
            String::new(),
            "| Priority | Count |".to_string(),
            "|----------|-------|".to_string(),
        ];

        for priority in Priority::ALL {
            let count = suite
                .manual_tests
                .iter()
                .filter(|t| t.priority == priority)
                .count();
            lines.push(format!("| {} | {} |", priority, count));
        }

        lines.extend([
            String::new(),
            "---".to_string(),
            String::new(),
            "## Test Cases".to_string(),
            String::new(),
        ]);

        for test in &suite.manual_tests {
            lines.push(format!("### {}: {}", test.test_id, test.test_name));
            lines.push(String::new());
            lines.push(format!(
                "**Priority:** {} | **Category:** {} | **Status:** {}",
                test.priority, test.category, test.status
            ));
            lines.push(String::new());
            lines.push(format!("**Description:** {}", test.description));
            lines.push(String::new());

            if !test.preconditions.is_empty() {
                lines.push("**Preconditions:**".to_string());
                lines.extend(test.preconditions.iter().map(|p| format!("- {}", p)));
                lines.push(String::new());
            }

            lines.push("**Test Steps:**".to_string());
            lines.push(String::new());
            lines.push("| Step | Action | Test Data | Expected Result |".to_string());
            lines.push("|------|--------|-----------|-----------------|".to_string());
            for step in &test.test_steps {
                lines.push(format!(
                    "| {} | {} | {} | {} |",
                    step.step_number,
                    table_cell(&step.action),
                    table_cell(&step.test_data),
                    table_cell(&step.expected_result)
                ));
            }
            lines.push(String::new());

            if !test.expected_results.is_empty() {
                lines.push("**Expected Results:**".to_string());
                lines.push(test.expected_results_text());
                lines.push(String::new());
            }

            if !test.tags.is_empty() {
                lines.push(format!("**Tags:** {}", test.tags_text()));
                lines.push(String::new());
            }

            lines.push("---".to_string());
            lines.push(String::new());
        }

        lines.join("\n")
    }

    /// Manual export plus every script, grouped by type, with a README
    pub fn to_zip(&self, suite: &TestSuite, timestamp: &DateTime<Local>) -> Result<Vec<u8>> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));

        if !suite.manual_tests.is_empty() {
            let format = self.bundle_format;
            let name = Self::export_filename(
                suite,
                ArtifactType::Manual.export_label(),
                format.extension(),
                timestamp,
            );
            let bytes = self.render(suite, format, timestamp)?;
            writer
                .start_file(format!("{}/{}", ArtifactType::Manual.bundle_dir(), name), entry_options())
                .map_err(zip_error)?;
            writer.write_all(&bytes).map_err(zip_error)?;
        }

        for artifact in [ArtifactType::Gherkin, ArtifactType::Selenium, ArtifactType::Playwright] {
            for (name, content) in Self::script_files(suite, artifact) {
                writer
                    .start_file(format!("{}/{}", artifact.bundle_dir(), name), entry_options())
                    .map_err(zip_error)?;
                writer.write_all(content.as_bytes()).map_err(zip_error)?;
            }
        }

        writer.start_file("README.md", entry_options()).map_err(zip_error)?;
        writer
            .write_all(Self::readme(suite).as_bytes())
            .map_err(zip_error)?;

        Ok(writer.finish().map_err(zip_error)?.into_inner())
    }

    pub fn readme(suite: &TestSuite) -> String {
        let summary = suite.summary();
        let mut lines = vec![
            format!("# {}", suite.name),
            String::new(),
            format!("Generated: {}", suite.generated_at.format("%Y-%m-%d %H:%M:%S")),
            format!("Client: {}", suite.client_name.as_deref().unwrap_or("N/A")),
            format!("Source: {}", suite.requirement_source),
            String::new(),
            "## Contents".to_string(),
            String::new(),
            format!("- **Manual Tests:** {} test cases", summary.manual_tests),
            format!("- **Gherkin Scenarios:** {} scenarios", summary.gherkin_scenarios),
            format!("- **Selenium Tests:** {} scripts", summary.selenium_tests),
            format!("- **Playwright Tests:** {} specs", summary.playwright_tests),
        ];

        if !suite.failures.is_empty() {
            lines.push(String::new());
            lines.push("## Not Generated".to_string());
            lines.push(String::new());
            for failure in &suite.failures {
                lines.push(format!("- {}: {}", failure.artifact.display_name(), failure.message));
            }
        }

        lines.extend(
            [
                "",
                "## Usage",
                "",
                "```",
                "behave gherkin/",
                "pytest selenium/",
                "npx playwright test playwright/",
                "```",
            ]
            .iter()
            .map(|s| s.to_string()),
        );

        lines.join("\n")
    }
}

/// Returns `name`, or `name` with a counter before its extension when already taken
fn unique_name(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }

    let (stem, extension) = match name.find('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name.as_str(), ""),
    };
    let mut counter = 2;
    loop {
        let candidate = format!("{}_{}{}", stem, counter, extension);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

fn entry_options() -> zip::write::SimpleFileOptions {
    zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated)
}

fn priority_fill(priority: Priority) -> Color {
    match priority {
        Priority::High => Color::RGB(0xFFCDD2),
        Priority::Medium => Color::RGB(0xFFF9C4),
        Priority::Low => Color::RGB(0xC8E6C9),
    }
}

/// Keeps pipes and newlines from breaking a Markdown table row
fn table_cell(text: &str) -> String {
    if text.trim().is_empty() {
        return "-".to_string();
    }
    text.replace('|', "\\|").replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AutomationScript, TestStep};
    use chrono::TimeZone;
    use std::io::Read;
    use tempfile::TempDir;

    fn sample_suite() -> TestSuite {
        let mut suite = TestSuite::new("Login", "login requirements.txt");
        suite.client_name = Some("Acme Corp".to_string());

        let mut first = ManualTestCase::new("TC_001", "Valid login");
        first.priority = Priority::High;
        first.test_steps = vec![TestStep {
            step_number: 1,
            action: "Enter | credentials".to_string(),
            test_data: "alice".to_string(),
            expected_result: String::new(),
        }];
        suite.manual_tests.push(first);
        suite.manual_tests.push(ManualTestCase::new("TC_002", "Locked account"));

        suite.scripts.push(AutomationScript {
            script_type: ArtifactType::Gherkin,
            filename: "login".to_string(),
            content: "Feature: Login\n  Scenario: ok".to_string(),
            related_test_ids: vec!["TC_001".to_string()],
            feature_name: "Login".to_string(),
            description: String::new(),
            scenario_count: 1,
        });
        suite
    }

    fn timestamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Acme Corp: <EU>"), "Acme_Corp__EU");
        assert_eq!(sanitize_filename(" ../ "), "unnamed");
        assert_eq!(sanitize_filename(&"x".repeat(80)).len(), 50);
    }

    #[test]
    fn test_export_filename_convention() {
        let suite = sample_suite();
        let name = ExportHandler::export_filename(&suite, "ManualTests", "csv", &timestamp());
        assert_eq!(name, "Acme_Corp_login_requirements_ManualTests_20240309_140507.csv");

        let anonymous = TestSuite::new("x", "");
        let name = ExportHandler::export_filename(&anonymous, "TestSuite", "zip", &timestamp());
        assert_eq!(name, "NoClient_Tests_TestSuite_20240309_140507.zip");
    }

    #[test]
    fn test_markdown_escapes_table_cells() {
        let handler = ExportHandler::new("unused");
        let markdown = handler.to_markdown(&sample_suite());
        assert!(markdown.contains("| High | 1 |"));
        assert!(markdown.contains("| Medium | 1 |"));
        assert!(markdown.contains("| 1 | Enter \\| credentials | alice | - |"));
        assert!(markdown.contains("### TC_002: Locked account"));
    }

    #[test]
    fn test_excel_renders_workbook() {
        let handler = ExportHandler::new("unused");
        let bytes = handler.to_excel(&sample_suite()).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn test_zip_layout() {
        let handler = ExportHandler::new("unused").with_bundle_format(ExportFormat::Csv);
        let bytes = handler.to_zip(&sample_suite(), &timestamp()).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert!(names.contains(&"manual_tests/Acme_Corp_login_requirements_ManualTests_20240309_140507.csv".to_string()));
        assert!(names.contains(&"gherkin/login.feature".to_string()));
        assert!(names.contains(&"README.md".to_string()));

        let mut readme = String::new();
        archive.by_name("README.md").unwrap().read_to_string(&mut readme).unwrap();
        assert!(readme.contains("- **Gherkin Scenarios:** 1 scenarios"));
    }

    #[tokio::test]
    async fn test_export_refuses_empty_suite() {
        let dir = TempDir::new().unwrap();
        let handler = ExportHandler::new(dir.path());
        let empty = TestSuite::new("Empty", "empty.txt");

        for format in [ExportFormat::Excel, ExportFormat::Csv, ExportFormat::Markdown, ExportFormat::Zip] {
            let err = handler.export(&empty, format, &timestamp()).await.unwrap_err();
            assert!(matches!(err, Error::Export(_)), "{} should fail", format);
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_export_scripts_one_file_each() {
        let dir = TempDir::new().unwrap();
        let handler = ExportHandler::new(dir.path());
        let paths = handler
            .export_scripts(&sample_suite(), ArtifactType::Gherkin, &timestamp())
            .await
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0]
            .to_string_lossy()
            .ends_with("Acme_Corp_login_requirements_Gherkin_login_20240309_140507.feature"));

        let err = handler
            .export_scripts(&sample_suite(), ArtifactType::Selenium, &timestamp())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Export(_)));
    }

    fn unnamed_gherkin(content: &str) -> AutomationScript {
        AutomationScript {
            script_type: ArtifactType::Gherkin,
            filename: String::new(),
            content: content.to_string(),
            related_test_ids: Vec::new(),
            feature_name: String::new(),
            description: String::new(),
            scenario_count: 1,
        }
    }

    #[test]
    fn test_zip_keeps_scripts_with_the_same_name() {
        let mut suite = sample_suite();
        suite.scripts.push(unnamed_gherkin("Feature: A\n  Scenario: a"));
        suite.scripts.push(unnamed_gherkin("Feature: B\n  Scenario: b"));

        let handler = ExportHandler::new("unused");
        let bytes = handler.to_zip(&suite, &timestamp()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();

        let mut second = String::new();
        archive
            .by_name("gherkin/gherkin_test_2.feature")
            .unwrap()
            .read_to_string(&mut second)
            .unwrap();
        assert!(second.starts_with("Feature: B"));
        assert!(archive.by_name("gherkin/gherkin_test.feature").is_ok());
        assert!(archive.by_name("gherkin/login.feature").is_ok());
    }

    #[tokio::test]
    async fn test_export_scripts_with_the_same_name() {
        let dir = TempDir::new().unwrap();
        let handler = ExportHandler::new(dir.path());
        let mut suite = sample_suite();
        suite.scripts.clear();
        suite.scripts.push(unnamed_gherkin("Feature: A\n  Scenario: a"));
        suite.scripts.push(unnamed_gherkin("Feature: B\n  Scenario: b"));

        let paths = handler
            .export_scripts(&suite, ArtifactType::Gherkin, &timestamp())
            .await
            .unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[1]
            .to_string_lossy()
            .ends_with("Acme_Corp_login_requirements_Gherkin_gherkin_test_20240309_140507_2.feature"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_export_scripts_removes_written_files_on_failure() {
        let dir = TempDir::new().unwrap();
        let handler = ExportHandler::new(dir.path());
        let mut suite = sample_suite();
        suite.scripts.clear();
        suite.scripts.push(unnamed_gherkin("Feature: A\n  Scenario: a"));
        suite.scripts.push(unnamed_gherkin("Feature: B\n  Scenario: b"));

        let blocker = dir
            .path()
            .join("Acme_Corp_login_requirements_Gherkin_gherkin_test_20240309_140507_2.feature");
        std::fs::write(&blocker, "keep me").unwrap();

        let err = handler
            .export_scripts(&suite, ArtifactType::Gherkin, &timestamp())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Export(_)));

        let remaining: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(remaining.len(), 1);
        assert_eq!(std::fs::read_to_string(&blocker).unwrap(), "keep me");
    }

    #[test]
    fn test_export_format_from_str() {
        assert_eq!("XLSX".parse::<ExportFormat>().unwrap(), ExportFormat::Excel);
        assert_eq!("md".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }
}
