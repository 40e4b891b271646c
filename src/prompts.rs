use crate::models::{ArtifactType, ClientContext, ManualTestCase};
use serde::{Deserialize, Serialize};

/// System prompt shared by every generation stage
pub const SYSTEM_PROMPT: &str = "You are an expert QA Engineer. Generate comprehensive test cases in valid JSON format.
Always include: positive tests, negative tests, edge cases, and boundary tests.
Assign priority (High/Medium/Low) based on business impact.";

const MANUAL_TEST_TEMPLATE: &str = r#"Generate manual test cases for these requirements:

{requirements}
{client_context}

Return ONLY valid JSON in this exact format:
{
  "test_cases": [
    {
      "test_id": "TC_001",
      "test_name": "Brief descriptive name",
      "description": "What this test verifies",
      "preconditions": ["condition1", "condition2"],
      "test_steps": [
        {"step_number": 1, "action": "Do something", "test_data": "data", "expected_result": "Result"}
      ],
      "expected_results": ["Final outcome 1", "Final outcome 2"],
      "priority": "High",
      "category": "Functional",
      "tags": ["tag1", "tag2"]
    }
  ]
}

Generate 5-10 test cases covering:
{additional_instructions}

Return ONLY the JSON, no other text."#;

const GHERKIN_TEMPLATE: &str = r#"Write Gherkin feature files for these requirements:

{requirements}
{client_context}

Return ONLY valid JSON:
{
  "feature_files": [
    {
      "filename": "feature_name.feature",
      "feature_name": "Feature Name",
      "content": "Feature: Name\n  Scenario: Test\n    Given...\n    When...\n    Then...",
      "scenario_count": 3,
      "related_test_ids": ["TC_001"]
    }
  ]
}

Use Given/When/Then steps and Scenario Outline with Examples for data-driven cases.
Return ONLY the JSON, no other text."#;

const SELENIUM_TEMPLATE: &str = r#"Generate Selenium Python tests for these requirements:

{requirements}
{client_context}

Return ONLY valid JSON:
{
  "scripts": [
    {
      "filename": "test_feature.py",
      "content": "import pytest\nfrom selenium import webdriver\n\nclass TestFeature:\n    def test_case(self):\n        pass",
      "related_test_ids": ["TC_001"],
      "description": "Feature tests"
    }
  ]
}

Use pytest, explicit waits, Page Object Model. Return ONLY JSON."#;

const PLAYWRIGHT_TEMPLATE: &str = r#"Generate Playwright JavaScript tests for these requirements:

{requirements}
{client_context}

Return ONLY valid JSON:
{
  "scripts": [
    {
      "filename": "feature.spec.js",
      "content": "const { test, expect } = require('@playwright/test');\n\ntest('test name', async ({ page }) => {\n  // test code\n});",
      "related_test_ids": ["TC_001"],
      "description": "Feature tests"
    }
  ]
}

Use @playwright/test, async/await, proper locators. Return ONLY JSON."#;

const ENHANCE_TEMPLATE: &str = r#"Add missing test cases to this list:

{current_tests}

Requirements: {requirements}

Add ONLY new tests not already covered. Return JSON:
{
  "additional_tests": [
    {"test_id": "TC_NEW", "test_name": "...", "description": "...", "preconditions": [], "test_steps": [], "expected_results": [], "priority": "Medium", "category": "Edge Case", "tags": []}
  ]
}

Return ONLY JSON."#;

/// Coverage toggles for the manual test prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptOptions {
    pub include_edge_cases: bool,
    pub include_negative_tests: bool,
    pub include_boundary_tests: bool,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            include_edge_cases: true,
            include_negative_tests: true,
            include_boundary_tests: true,
        }
    }
}

/// Character limits applied before text is placed into a prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PromptLimits {
    /// Requirement text in the manual test prompt
    pub max_requirement_chars: usize,

    /// Requirement text in Gherkin/Selenium/Playwright prompts
    pub max_script_requirement_chars: usize,

    /// Rendered client context
    pub max_context_chars: usize,

    /// Existing test list in the enhancement prompt
    pub max_enhancement_tests_chars: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            max_requirement_chars: 3000,
            max_script_requirement_chars: 2000,
            max_context_chars: 1000,
            max_enhancement_tests_chars: 1500,
        }
    }
}

/// Renders stage prompts from requirement text and client context
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    limits: PromptLimits,
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

impl PromptBuilder {
    pub fn new(limits: PromptLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &PromptLimits {
        &self.limits
    }

    pub fn system_prompt(&self) -> &'static str {
        SYSTEM_PROMPT
    }

    /// Empty when no client is selected or the client has nothing to say
    fn client_section(&self, client: Option<&ClientContext>) -> String {
        let text = match client {
            Some(client) => client.context_text(),
            None => return String::new(),
        };
        if text.trim().is_empty() {
            return String::new();
        }
        format!(
            "\nClient context:\n{}\n",
            truncate_chars(&text, self.limits.max_context_chars)
        )
    }

    fn coverage_instructions(options: &PromptOptions) -> String {
        let mut instructions = vec!["- Positive/functional tests"];
        if options.include_negative_tests {
            instructions.push("- Negative tests (invalid inputs, errors)");
        }
        if options.include_edge_cases {
            instructions.push("- Edge cases");
        }
        if options.include_boundary_tests {
            instructions.push("- Boundary value tests");
        }
        instructions.join("\n")
    }

    pub fn manual_tests(
        &self,
        requirement: &str,
        client: Option<&ClientContext>,
        options: &PromptOptions,
    ) -> String {
        MANUAL_TEST_TEMPLATE
            .replace(
                "{requirements}",
                truncate_chars(requirement.trim(), self.limits.max_requirement_chars),
            )
            .replace("{client_context}", &self.client_section(client))
            .replace(
                "{additional_instructions}",
                &Self::coverage_instructions(options),
            )
    }

    fn script_prompt(&self, template: &str, requirement: &str, client: Option<&ClientContext>) -> String {
        template
            .replace(
                "{requirements}",
                truncate_chars(requirement.trim(), self.limits.max_script_requirement_chars),
            )
            .replace("{client_context}", &self.client_section(client))
    }

    pub fn gherkin(&self, requirement: &str, client: Option<&ClientContext>) -> String {
        self.script_prompt(GHERKIN_TEMPLATE, requirement, client)
    }

    pub fn selenium(&self, requirement: &str, client: Option<&ClientContext>) -> String {
        self.script_prompt(SELENIUM_TEMPLATE, requirement, client)
    }

    pub fn playwright(&self, requirement: &str, client: Option<&ClientContext>) -> String {
        self.script_prompt(PLAYWRIGHT_TEMPLATE, requirement, client)
    }

    /// Prompt for one artifact type
    pub fn for_artifact(
        &self,
        artifact: ArtifactType,
        requirement: &str,
        client: Option<&ClientContext>,
        options: &PromptOptions,
    ) -> String {
        match artifact {
            ArtifactType::Manual => self.manual_tests(requirement, client, options),
            ArtifactType::Gherkin => self.gherkin(requirement, client),
            ArtifactType::Selenium => self.selenium(requirement, client),
            ArtifactType::Playwright => self.playwright(requirement, client),
        }
    }

    /// Asks for tests that the current list does not cover yet
    pub fn enhancement(&self, current_tests: &[ManualTestCase], requirement: &str) -> String {
        let listing = current_tests
            .iter()
            .map(|t| format!("- {}: {} ({}, {})", t.test_id, t.test_name, t.category, t.priority))
            .collect::<Vec<_>>()
            .join("\n");

        ENHANCE_TEMPLATE
            .replace(
                "{current_tests}",
                truncate_chars(&listing, self.limits.max_enhancement_tests_chars),
            )
            .replace(
                "{requirements}",
                truncate_chars(requirement.trim(), self.limits.max_context_chars),
            )
    }
}
