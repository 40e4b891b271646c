use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parsed requirements document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Requirement {
    /// Original filename as uploaded
    pub filename: String,

    /// Extracted plain text
    pub content: String,

    /// Lowercase source extension (txt, pdf, docx, ...)
    pub file_type: String,

    pub word_count: usize,

    /// Page count for paginated sources
    pub page_count: Option<usize>,
}

/// Summary statistics for display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequirementStats {
    pub characters: usize,
    pub words: usize,
    pub lines: usize,
    pub pages: Option<usize>,
}

impl Requirement {
    pub fn new(filename: impl Into<String>, content: impl Into<String>, file_type: impl Into<String>) -> Self {
        let content = content.into();
        let word_count = content.split_whitespace().count();
        Self {
            filename: filename.into(),
            content,
            file_type: file_type.into(),
            word_count,
            page_count: None,
        }
    }

    /// Requirement typed or pasted directly rather than uploaded
    pub fn from_text(content: impl Into<String>) -> Self {
        Self::new("requirements.txt", content, "txt")
    }

    pub fn with_page_count(mut self, pages: usize) -> Self {
        self.page_count = Some(pages);
        self
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Filename without extension, used in export names
    pub fn stem(&self) -> String {
        Path::new(&self.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.filename.clone())
    }

    /// "user_login-flow.docx" -> "User Login Flow"
    pub fn display_name(&self) -> String {
        self.stem()
            .replace(['_', '-'], " ")
            .split_whitespace()
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => {
                        first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                    }
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn preview(&self, max_chars: usize) -> String {
        if self.content.chars().count() <= max_chars {
            return self.content.clone();
        }
        let cut: String = self.content.chars().take(max_chars).collect();
        format!("{}...", cut)
    }

    pub fn stats(&self) -> RequirementStats {
        RequirementStats {
            characters: self.content.chars().count(),
            words: self.word_count,
            lines: self.content.lines().count(),
            pages: self.page_count,
        }
    }
}
