use super::{ArtifactType, TestSuite};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One completed generation request, as kept in the history store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRecord {
    /// Row id assigned by the store; `None` until appended
    pub id: Option<i64>,
    pub generated_at: DateTime<Local>,
    pub client_id: Option<String>,
    pub requirement_filename: String,

    /// Produced item count per artifact type
    pub counts: BTreeMap<ArtifactType, usize>,

    /// Artifact types that were requested but failed
    pub failed: Vec<ArtifactType>,

    /// `provider/model` that produced the result
    pub model: String,
}

impl GenerationRecord {
    pub fn from_suite(suite: &TestSuite, model: impl Into<String>) -> Self {
        let counts = suite
            .completed
            .iter()
            .map(|artifact| (*artifact, suite.count_for(*artifact)))
            .collect();

        Self {
            id: None,
            generated_at: suite.generated_at,
            client_id: suite.client_id.clone(),
            requirement_filename: suite.requirement_source.clone(),
            counts,
            failed: suite.failed_artifacts(),
            model: model.into(),
        }
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArtifactFailure, ManualTestCase};

    #[test]
    fn test_from_suite_counts_completed_only() {
        let mut suite = TestSuite::new("Login", "login.txt");
        suite.manual_tests.push(ManualTestCase::new("TC_001", "Valid login"));
        suite.completed.push(ArtifactType::Manual);
        suite.failures.push(ArtifactFailure {
            artifact: ArtifactType::Gherkin,
            message: "bad JSON".to_string(),
        });

        let record = GenerationRecord::from_suite(&suite, "ollama/qwen2.5:7b");
        assert_eq!(record.counts.get(&ArtifactType::Manual), Some(&1));
        assert!(!record.counts.contains_key(&ArtifactType::Gherkin));
        assert_eq!(record.failed, vec![ArtifactType::Gherkin]);
        assert_eq!(record.total(), 1);
    }
}
