use async_trait::async_trait;
use chrono::{Local, TimeZone};
use req2test::llm::{create_llm_for, LLMResponse};
use req2test::models::{ClientDocument, RuleKind};
use req2test::storage::{ClientStore, HistoryStore, SettingsStore};
use req2test::{
    ArtifactType, ClientContext, ConfigBuilder, DocumentParser, Error, ExportFormat,
    ExportHandler, GenerationOptions, GenerationRequest, ProviderKind, Requirement, Result,
    Session, Settings, TestGenerator, LLM,
};
use std::io::{Cursor, Read, Write};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

const REQUIREMENT: &str = "Users log in with email and password. \
After three failed attempts the account is locked for 15 minutes.";

const MANUAL_RESPONSE: &str = r#"Here are the tests:
```json
{
  "test_cases": [
    {"test_id": "LOGIN-7", "test_name": "Valid login", "priority": "High", "category": "functional",
     "test_steps": [{"action": "Enter valid credentials", "expected_result": "Dashboard shown"}],
     "expected_results": ["User is on the dashboard"]},
    {"test_id": "LOGIN-8", "test_name": "Wrong password", "priority": "urgent", "category": "Negative",
     "test_steps": ["Enter a wrong password"]},
    {"test_id": "LOGIN-9", "test_name": "Account lockout", "priority": "Medium", "category": "Security"},
    {"test_id": "LOGIN-10", "test_name": "Empty email", "priority": "Low", "category": "Edge Case"},
    {"test_id": "LOGIN-11", "test_name": "Lock expires after 15 minutes", "priority": "Medium", "category": "Boundary"}
  ]
}
```"#;

const TRUNCATED_GHERKIN: &str =
    r#"{"feature_files": [{"filename": "login.feature", "content": "Feature: Login\n  Scenario: Valid login\n    Given a registered user\n    When the user sub"#;

const SELENIUM_RESPONSE: &str = r#"{"scripts": [{"filename": "test_login", "content": "import pytest\nfrom selenium import webdriver\n\ndef test_valid_login():\n    pass\n", "related_test_ids": ["LOGIN-7", "LOGIN-99"]}]}"#;

const ENHANCE_RESPONSE: &str = r#"{"additional_tests": [
    {"test_id": "TC_NEW", "test_name": "Password with unicode", "category": "Edge Case"},
    {"test_id": "TC_NEW", "test_name": "Login during lockout", "category": "Negative"}
]}"#;

/// Answers according to the first line of the prompt and records every prompt
#[derive(Default)]
struct ScriptedLlm {
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLM for ScriptedLlm {
    async fn generate(
        &self,
        prompt: &str,
        _system_prompt: Option<&str>,
        _options: &GenerationOptions,
    ) -> Result<LLMResponse> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let content = if prompt.starts_with("Generate manual test cases") {
            MANUAL_RESPONSE
        } else if prompt.starts_with("Write Gherkin") {
            TRUNCATED_GHERKIN
        } else if prompt.starts_with("Generate Selenium") {
            SELENIUM_RESPONSE
        } else if prompt.starts_with("Add missing test cases") {
            ENHANCE_RESPONSE
        } else {
            return Err(Error::provider(ProviderKind::Ollama, "connection refused"));
        };

        Ok(LLMResponse {
            content: content.to_string(),
            tokens_used: None,
        })
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn list_models(&self) -> Vec<String> {
        vec!["scripted".to_string()]
    }

    fn provider_type(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

fn generator(llm: &Arc<ScriptedLlm>) -> TestGenerator {
    TestGenerator::new(llm.clone())
}

fn requirement() -> Requirement {
    Requirement::new("login_requirements.txt", REQUIREMENT, "txt")
}

fn unreachable_settings() -> Settings {
    let mut settings = Settings::default();
    settings.ollama.base_url = "http://127.0.0.1:1".to_string();
    settings.ollama.timeout_seconds = 5;
    settings.vllm.use_server = true;
    settings.vllm.server_url = "http://127.0.0.1:1".to_string();
    settings.vllm.timeout_seconds = 5;
    for hosted in [&mut settings.openai, &mut settings.groq, &mut settings.anthropic] {
        hosted.base_url = "http://127.0.0.1:1".to_string();
        hosted.api_key = Some("dummy-key".to_string());
        hosted.timeout_seconds = 5;
    }
    settings.huggingface.router_url = "http://127.0.0.1:1".to_string();
    settings.huggingface.api_token = Some("hf_dummy".to_string());
    settings.huggingface.timeout_seconds = 5;
    settings
}

#[tokio::test]
async fn test_every_provider_reports_unreachable_endpoint() {
    let settings = unreachable_settings();
    let options = GenerationOptions::default();

    for kind in ProviderKind::ALL {
        let llm = create_llm_for(kind, &settings).unwrap();
        let err = llm.generate("ping", None, &options).await.unwrap_err();
        match err {
            Error::ProviderUnavailable { provider, .. } => assert_eq!(provider, kind),
            other => panic!("{} returned {:?}", kind, other),
        }
        assert!(!llm.is_available().await);
    }
}

#[tokio::test]
async fn test_vllm_local_mode_without_engine_is_unavailable() {
    let mut settings = Settings::default();
    settings.vllm.use_server = false;
    settings.vllm.python_bin = "/nonexistent/python-for-req2test".to_string();

    let llm = create_llm_for(ProviderKind::Vllm, &settings).unwrap();
    let err = llm
        .generate("ping", None, &GenerationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ProviderUnavailable {
            provider: ProviderKind::Vllm,
            ..
        }
    ));
}

#[tokio::test]
async fn test_hosted_provider_without_key_is_unavailable() {
    let mut settings = unreachable_settings();
    settings.groq.api_key = None;

    let llm = create_llm_for(ProviderKind::Groq, &settings).unwrap();
    let err = llm
        .generate("ping", None, &GenerationOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("GROQ_API_KEY"));
}

#[tokio::test]
async fn test_partial_failure_keeps_successful_artifacts() {
    let llm = Arc::new(ScriptedLlm::default());
    let request = GenerationRequest::new(requirement()).with_artifacts([
        ArtifactType::Gherkin,
        ArtifactType::Selenium,
        ArtifactType::Playwright,
    ]);

    let suite = assert_ok!(generator(&llm).generate(&request).await);

    let ids: Vec<&str> = suite.manual_tests.iter().map(|t| t.test_id.as_str()).collect();
    assert_eq!(ids, ["TC_001", "TC_002", "TC_003", "TC_004", "TC_005"]);
    assert_eq!(suite.manual_tests[1].priority.to_string(), "Medium");
    assert_eq!(suite.manual_tests[0].category, "Functional");

    assert_eq!(suite.completed, vec![ArtifactType::Manual, ArtifactType::Selenium]);
    assert_eq!(
        suite.failed_artifacts(),
        vec![ArtifactType::Gherkin, ArtifactType::Playwright]
    );
    assert!(suite.is_partial());

    let selenium: Vec<_> = suite.scripts_of(ArtifactType::Selenium).collect();
    assert_eq!(selenium.len(), 1);
    assert_eq!(selenium[0].filename, "test_login.py");
    assert_eq!(selenium[0].related_test_ids, vec!["TC_001".to_string()]);

    // Manual always runs first
    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 4);
    assert!(prompts[0].starts_with("Generate manual test cases"));
}

#[tokio::test]
async fn test_empty_requirement_makes_no_call() {
    let llm = Arc::new(ScriptedLlm::default());
    let request = GenerationRequest::new(Requirement::new("blank.txt", "  \n\t ", "txt"));

    let err = assert_err!(generator(&llm).generate(&request).await);
    assert!(matches!(err, Error::DocumentParse(_)));
    assert!(llm.prompts().is_empty());
}

#[tokio::test]
async fn test_client_rules_reach_the_prompt() {
    let llm = Arc::new(ScriptedLlm::default());
    let client = ClientContext::new("Acme")
        .with_rule(RuleKind::Navigation, "Login -> Dashboard")
        .with_rule(RuleKind::Business, "Locked accounts email the owner");

    let with_client = GenerationRequest::new(requirement()).with_client(Some(client));
    generator(&llm).generate(&with_client).await.unwrap();

    let without_client = GenerationRequest::new(requirement());
    generator(&llm).generate(&without_client).await.unwrap();

    let prompts = llm.prompts();
    assert!(prompts[0].contains("Login -> Dashboard"));
    assert!(prompts[0].contains("Locked accounts email the owner"));
    assert!(!prompts[1].contains("Client context"));
}

#[tokio::test]
async fn test_enhancement_continues_numbering() {
    let llm = Arc::new(ScriptedLlm::default());
    let request = GenerationRequest::new(requirement());
    let generator = generator(&llm);

    let suite = generator.generate(&request).await.unwrap();
    let added = generator
        .enhance_tests(&suite.manual_tests, &request)
        .await
        .unwrap();

    let ids: Vec<&str> = added.iter().map(|t| t.test_id.as_str()).collect();
    assert_eq!(ids, ["TC_006", "TC_007"]);
}

#[tokio::test]
async fn test_progress_events_end_with_completion() {
    let llm = Arc::new(ScriptedLlm::default());
    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    let generator = generator(&llm).with_progress(sender);

    let request = GenerationRequest::new(requirement()).with_artifact(ArtifactType::Playwright);
    generator.generate(&request).await.unwrap();
    drop(generator);

    let mut events = Vec::new();
    while let Some(event) = receiver.recv().await {
        events.push(event);
    }
    assert_eq!(events.len(), 5);
    assert!(events.iter().any(|e| e.error.is_some()));
    let last = events.last().unwrap();
    assert!(last.completed);
    assert_eq!(last.progress, 1.0);
}

#[tokio::test]
async fn test_csv_export_reads_back() {
    let llm = Arc::new(ScriptedLlm::default());
    let suite = generator(&llm)
        .generate(&GenerationRequest::new(requirement()))
        .await
        .unwrap();

    let dir = TempDir::new().unwrap();
    let handler = ExportHandler::new(dir.path());
    let timestamp = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
    let path = handler.export(&suite, ExportFormat::Csv, &timestamp).await.unwrap();

    assert_eq!(
        path.file_name().unwrap().to_string_lossy(),
        "NoClient_login_requirements_ManualTests_20240309_140507.csv"
    );

    let mut reader = csv::Reader::from_path(&path).unwrap();
    assert_eq!(reader.headers().unwrap().len(), 10);
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), suite.manual_tests.len());
    for (row, test) in rows.iter().zip(&suite.manual_tests) {
        assert_eq!(&row[0], test.test_id);
        assert_eq!(&row[1], test.test_name);
        assert_eq!(&row[6], test.priority.to_string());
        assert_eq!(&row[8], test.category);
    }
    assert_eq!(&rows[0][1], "Valid login");
    assert_eq!(&rows[0][8], "Functional");
    assert_eq!(&rows[1][6], "Medium");
    assert_eq!(&rows[4][8], "Boundary");
}

#[tokio::test]
async fn test_exports_never_overwrite() {
    let llm = Arc::new(ScriptedLlm::default());
    let suite = generator(&llm)
        .generate(&GenerationRequest::new(requirement()))
        .await
        .unwrap();

    let dir = TempDir::new().unwrap();
    let handler = ExportHandler::new(dir.path());
    let first = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
    let second = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 8).unwrap();

    let a = handler.export(&suite, ExportFormat::Markdown, &first).await.unwrap();
    let b = handler.export(&suite, ExportFormat::Markdown, &second).await.unwrap();
    assert_ne!(a, b);

    let again = handler.export(&suite, ExportFormat::Markdown, &first).await;
    assert!(matches!(again, Err(Error::Export(_))));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[tokio::test]
async fn test_zip_bundle_contains_every_artifact() {
    let llm = Arc::new(ScriptedLlm::default());
    let request = GenerationRequest::new(requirement()).with_artifact(ArtifactType::Selenium);
    let suite = generator(&llm).generate(&request).await.unwrap();

    let dir = TempDir::new().unwrap();
    let handler = ExportHandler::new(dir.path()).with_bundle_format(ExportFormat::Csv);
    let path = handler
        .export(&suite, ExportFormat::Zip, &Local::now())
        .await
        .unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    assert!(names.iter().any(|n| n.starts_with("manual_tests/") && n.ends_with(".csv")));
    assert!(names.contains(&"selenium/test_login.py".to_string()));
    assert!(names.contains(&"README.md".to_string()));

    let mut readme = String::new();
    archive
        .by_name("README.md")
        .unwrap()
        .read_to_string(&mut readme)
        .unwrap();
    assert!(readme.contains("login_requirements.txt"));
}

#[tokio::test]
async fn test_empty_result_is_not_exported() {
    let llm = Arc::new(ScriptedLlm::default());
    // Only the failing Playwright branch besides manual; drop the manual tests afterwards
    let request = GenerationRequest::new(requirement()).with_artifact(ArtifactType::Playwright);
    let mut suite = generator(&llm).generate(&request).await.unwrap();
    suite.manual_tests.clear();

    let dir = TempDir::new().unwrap();
    let handler = ExportHandler::new(dir.path());
    for format in [ExportFormat::Excel, ExportFormat::Csv, ExportFormat::Markdown, ExportFormat::Zip] {
        let result = handler.export(&suite, format, &Local::now()).await;
        assert!(matches!(result, Err(Error::Export(_))), "{} exported", format);
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_settings_never_persist_credentials() {
    let dir = TempDir::new().unwrap();
    let store = SettingsStore::new(dir.path().join("settings.json"));

    let mut settings = Settings::default();
    settings.llm_provider = ProviderKind::OpenAI;
    settings.openai.model = "gpt-4o-mini".to_string();
    settings.openai.api_key = Some("sk-test-secret".to_string());
    settings.huggingface.api_token = Some("hf_secret".to_string());
    store.save(&settings).await.unwrap();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert!(!raw.contains("sk-test-secret"));
    assert!(!raw.contains("hf_secret"));
    assert!(!raw.contains("api_token"));

    let loaded = store.load().await.unwrap();
    assert_eq!(loaded.llm_provider, ProviderKind::OpenAI);
    assert_eq!(loaded.openai.model, "gpt-4o-mini");
}

#[tokio::test]
async fn test_client_store_lifecycle() {
    let dir = TempDir::new().unwrap();
    let store = ClientStore::new(dir.path());

    let mut acme = store
        .create(ClientContext::new("Acme").with_project("Shop", "Online store"))
        .await
        .unwrap();
    store.create(ClientContext::new("Globex")).await.unwrap();

    acme.add_rule(RuleKind::Thumb, "Every test names its data set");
    store.update(&mut acme).await.unwrap();

    let found = store.find("acme").await.unwrap().unwrap();
    assert_eq!(found.id, acme.id);
    assert_eq!(found.thumb_rules.len(), 1);

    let document = ClientDocument {
        filename: "glossary.txt".to_string(),
        file_type: "txt".to_string(),
        content: "SKU: stock keeping unit".to_string(),
        uploaded_at: Local::now(),
    };
    store.add_document(&acme.id, document).await.unwrap();

    // A corrupt file does not hide the others
    std::fs::write(dir.path().join("broken.json"), "{ nope").unwrap();
    let names: Vec<String> = store.list().await.unwrap().into_iter().map(|c| c.name).collect();
    assert_eq!(names, ["Acme", "Globex"]);

    assert!(store.delete(&acme.id).await.unwrap());
    assert!(store.get(&acme.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_history_is_append_only_and_filtered() {
    let dir = TempDir::new().unwrap();
    let history = HistoryStore::open(&dir.path().join("history.db")).unwrap();

    let llm = Arc::new(ScriptedLlm::default());
    let mut suite = generator(&llm)
        .generate(&GenerationRequest::new(requirement()).with_artifact(ArtifactType::Gherkin))
        .await
        .unwrap();
    history
        .append(&req2test::models::GenerationRecord::from_suite(&suite, "ollama/scripted"))
        .unwrap();

    suite.client_id = Some("acme0001".to_string());
    history
        .append(&req2test::models::GenerationRecord::from_suite(&suite, "ollama/scripted"))
        .unwrap();

    let all = history.list(None, 10).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].client_id.as_deref(), Some("acme0001"));
    assert_eq!(all[1].failed, vec![ArtifactType::Gherkin]);
    assert_eq!(all[1].total(), 5);
    assert_eq!(history.list(Some("acme0001"), 10).unwrap().len(), 1);
}

#[tokio::test]
async fn test_session_records_history_and_exports() {
    let dir = TempDir::new().unwrap();
    let config = ConfigBuilder::new().with_data_dir(dir.path()).build();
    let mut session = Session::open(config).await.unwrap();

    assert!(matches!(
        session.export_last(None).await,
        Err(Error::Export(_))
    ));

    let llm = Arc::new(ScriptedLlm::default());
    let generator = generator(&llm);
    let request = session.request_for(requirement(), &[ArtifactType::Selenium]);
    let suite = session.generate_with(&generator, request).await.unwrap();
    assert_eq!(suite.manual_tests.len(), 5);

    let added = session.enhance_last(&generator).await.unwrap();
    assert_eq!(added, 2);
    assert_eq!(session.last_result().unwrap().manual_tests.len(), 7);

    let path = session.export_last(Some(ExportFormat::Excel)).await.unwrap();
    assert!(path.starts_with(dir.path().join("exports")));
    let scripts = session.export_scripts(ArtifactType::Selenium).await.unwrap();
    assert_eq!(scripts.len(), 1);

    let history = session.history(None, 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].model, "ollama/qwen2.5:7b");
    assert!(session.take_warnings().is_empty());
}

#[tokio::test]
async fn test_docx_requirement_is_parsed() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Login requirements</w:t></w:r></w:p>
    <w:p><w:r><w:t xml:space="preserve">Users must </w:t></w:r><w:r><w:t>verify their email.</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(xml.as_bytes()).unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let requirement = DocumentParser::new().parse_bytes("signup.docx", &bytes).unwrap();
    assert_eq!(requirement.file_type, "docx");
    assert!(requirement.content.contains("Login requirements"));
    assert!(requirement.content.contains("Users must verify their email."));

    let err = DocumentParser::new()
        .parse_bytes("notes.rtf", b"{\\rtf1}")
        .unwrap_err();
    assert!(matches!(err, Error::DocumentParse(_)));
}
