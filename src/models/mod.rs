pub mod client;
pub mod history;
pub mod requirement;
pub mod test_case;

pub use client::{ClientContext, ClientDocument, RuleKind};
pub use history::GenerationRecord;
pub use requirement::{Requirement, RequirementStats};
pub use test_case::{
    normalize_category, ArtifactFailure, ArtifactType, AutomationScript, ManualTestCase,
    Priority, SuiteSummary, TestStatus, TestStep, TestSuite, KNOWN_CATEGORIES,
};
