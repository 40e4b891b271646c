use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAX_REFERENCE_DOCUMENTS: usize = 5;
const DOCUMENT_PREVIEW_CHARS: usize = 500;

/// Rule groups a client can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Navigation,
    Thumb,
    Business,
    BestPractice,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Navigation => "navigation",
            Self::Thumb => "thumb",
            Self::Business => "business",
            Self::BestPractice => "best_practice",
        };
        f.write_str(name)
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "navigation" | "nav" => Ok(Self::Navigation),
            "thumb" | "thumb_rule" | "convention" => Ok(Self::Thumb),
            "business" => Ok(Self::Business),
            "best_practice" | "best_practices" | "practice" => Ok(Self::BestPractice),
            other => Err(format!("unknown rule kind: {}", other)),
        }
    }
}

/// Reference document attached to a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientDocument {
    pub filename: String,
    pub file_type: String,
    pub content: String,
    pub uploaded_at: DateTime<Local>,
}

/// Project-specific rules injected into prompts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientContext {
    /// Short generated identifier, also the storage key
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub project_description: String,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub test_environment: String,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,

    /// Ordered navigation paths, e.g. "Login -> Dashboard"
    #[serde(default)]
    pub navigation_rules: Vec<String>,
    #[serde(default)]
    pub thumb_rules: Vec<String>,
    #[serde(default)]
    pub business_rules: Vec<String>,
    #[serde(default)]
    pub best_practices: Vec<String>,
    #[serde(default)]
    pub documents: Vec<ClientDocument>,
}

impl ClientContext {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Local::now();
        Self {
            id: String::new(),
            name: name.into(),
            project_name: String::new(),
            project_description: String::new(),
            tech_stack: Vec::new(),
            test_environment: String::new(),
            created_at: now,
            updated_at: now,
            navigation_rules: Vec::new(),
            thumb_rules: Vec::new(),
            business_rules: Vec::new(),
            best_practices: Vec::new(),
            documents: Vec::new(),
        }
    }

    pub fn with_project(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.project_name = name.into();
        self.project_description = description.into();
        self
    }

    pub fn with_rule(mut self, kind: RuleKind, rule: impl Into<String>) -> Self {
        self.add_rule(kind, rule);
        self
    }

    pub fn rules(&self, kind: RuleKind) -> &[String] {
        match kind {
            RuleKind::Navigation => &self.navigation_rules,
            RuleKind::Thumb => &self.thumb_rules,
            RuleKind::Business => &self.business_rules,
            RuleKind::BestPractice => &self.best_practices,
        }
    }

    fn rules_mut(&mut self, kind: RuleKind) -> &mut Vec<String> {
        match kind {
            RuleKind::Navigation => &mut self.navigation_rules,
            RuleKind::Thumb => &mut self.thumb_rules,
            RuleKind::Business => &mut self.business_rules,
            RuleKind::BestPractice => &mut self.best_practices,
        }
    }

    /// Appends a trimmed rule; blank and repeated rules are ignored
    pub fn add_rule(&mut self, kind: RuleKind, rule: impl Into<String>) -> bool {
        let rule = rule.into();
        let rule = rule.trim();
        if rule.is_empty() {
            return false;
        }
        let rules = self.rules_mut(kind);
        if rules.iter().any(|existing| existing == rule) {
            return false;
        }
        rules.push(rule.to_string());
        true
    }

    pub fn remove_rule(&mut self, kind: RuleKind, index: usize) -> Option<String> {
        let rules = self.rules_mut(kind);
        (index < rules.len()).then(|| rules.remove(index))
    }

    /// Drops blank rules and surrounding whitespace
    pub fn normalize_rules(&mut self) {
        for kind in [
            RuleKind::Navigation,
            RuleKind::Thumb,
            RuleKind::Business,
            RuleKind::BestPractice,
        ] {
            let rules = self.rules_mut(kind);
            *rules = rules
                .iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect();
        }
    }

    /// Context block for prompts; empty sections are left out
    pub fn context_text(&self) -> String {
        let mut sections: Vec<String> = Vec::new();

        if !self.project_name.is_empty() || !self.project_description.is_empty() {
            sections.push(format!("## Project: {}", self.project_name));
            if !self.project_description.is_empty() {
                sections.push(self.project_description.clone());
            }
        }

        if !self.tech_stack.is_empty() {
            sections.push(format!("\n## Technology Stack\n{}", self.tech_stack.join(", ")));
        }

        if !self.test_environment.is_empty() {
            sections.push(format!("\n## Test Environment\n{}", self.test_environment));
        }

        let rule_sections = [
            ("Navigation Rules", &self.navigation_rules),
            ("Thumb Rules (Testing Conventions)", &self.thumb_rules),
            ("Business Rules", &self.business_rules),
            ("Best Practices", &self.best_practices),
        ];
        for (title, rules) in rule_sections {
            if rules.is_empty() {
                continue;
            }
            sections.push(format!("\n## {}", title));
            sections.extend(rules.iter().map(|rule| format!("- {}", rule)));
        }

        if !self.documents.is_empty() {
            sections.push("\n## Reference Documents".to_string());
            for doc in self.documents.iter().take(MAX_REFERENCE_DOCUMENTS) {
                sections.push(format!("\n### {}", doc.filename));
                let preview: String = doc.content.chars().take(DOCUMENT_PREVIEW_CHARS).collect();
                if doc.content.chars().count() > DOCUMENT_PREVIEW_CHARS {
                    sections.push(format!("{}...", preview));
                } else {
                    sections.push(preview);
                }
            }
        }

        sections.join("\n")
    }

    pub fn rules_summary(&self) -> String {
        let mut summary = Vec::new();
        if !self.navigation_rules.is_empty() {
            summary.push(format!("Navigation: {} rules", self.navigation_rules.len()));
        }
        if !self.thumb_rules.is_empty() {
            summary.push(format!("Thumb Rules: {} rules", self.thumb_rules.len()));
        }
        if !self.business_rules.is_empty() {
            summary.push(format!("Business: {} rules", self.business_rules.len()));
        }
        if !self.best_practices.is_empty() {
            summary.push(format!("Best Practices: {} items", self.best_practices.len()));
        }
        if !self.documents.is_empty() {
            summary.push(format!("Documents: {} files", self.documents.len()));
        }

        if summary.is_empty() {
            "No rules configured".to_string()
        } else {
            summary.join(" | ")
        }
    }
}
