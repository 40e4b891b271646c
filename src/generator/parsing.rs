use crate::error::{Error, Result};
use crate::models::{
    normalize_category, ArtifactType, AutomationScript, ManualTestCase, Priority, TestStep,
};
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Sequential manual test identifier
pub fn format_test_id(number: usize) -> String {
    format!("TC_{:03}", number)
}

/// Pulls the JSON object out of a model response.
///
/// Tries a fenced ```json block first, then the outermost `{...}` span, then
/// the whole response.
pub fn extract_json(response: &str) -> Option<Value> {
    let text = response.trim();

    if let Ok(re) = Regex::new(r"```(?:json|JSON)?\s*(\{[\s\S]*?\})\s*```") {
        for caps in re.captures_iter(text) {
            if let Ok(value) = serde_json::from_str::<Value>(&caps[1]) {
                if value.is_object() {
                    return Some(value);
                }
            }
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                if value.is_object() {
                    return Some(value);
                }
            }
        }
    }

    serde_json::from_str::<Value>(text)
        .ok()
        .filter(Value::is_object)
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let s = s.trim().to_string();
            (!s.is_empty()).then_some(s)
        }
        other => Some(other.to_string()),
    }
}

/// Strings, numbers and booleans are all accepted as text
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Array(_) | Value::Object(_) => Err(D::Error::custom("expected text")),
        other => Ok(value_to_text(other).unwrap_or_default()),
    }
}

/// A list of strings, or a single string standing in for a one-item list
fn string_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.into_iter().filter_map(value_to_text).collect()),
        Value::Object(_) => Err(D::Error::custom("expected a list of strings")),
        other => Ok(value_to_text(other).into_iter().collect()),
    }
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default, deserialize_with = "lenient_string")]
    step_number: String,
    #[serde(default, alias = "step", deserialize_with = "lenient_string")]
    action: String,
    #[serde(default, alias = "data", deserialize_with = "lenient_string")]
    test_data: String,
    #[serde(default, alias = "expected", deserialize_with = "lenient_string")]
    expected_result: String,
}

/// Steps arrive as objects, plain strings, or one block of text
fn step_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<TestStep>, D::Error> {
    let items = match Value::deserialize(deserializer)? {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        Value::String(text) => text
            .lines()
            .map(|line| Value::String(line.to_string()))
            .collect(),
        _ => return Err(D::Error::custom("expected a list of steps")),
    };

    let mut steps = Vec::with_capacity(items.len());
    for item in items {
        let position = steps.len() as u32 + 1;
        match item {
            Value::Object(_) => {
                let raw: RawStep = serde_json::from_value(item).map_err(D::Error::custom)?;
                if raw.action.is_empty() && raw.expected_result.is_empty() {
                    continue;
                }
                steps.push(TestStep {
                    step_number: raw.step_number.parse().unwrap_or(position),
                    action: raw.action,
                    test_data: raw.test_data,
                    expected_result: raw.expected_result,
                });
            }
            other => {
                if let Some(action) = value_to_text(other) {
                    steps.push(TestStep {
                        step_number: position,
                        action,
                        ..Default::default()
                    });
                }
            }
        }
    }
    Ok(steps)
}

#[derive(Debug, Deserialize)]
struct RawTestCase {
    #[serde(default, alias = "id", deserialize_with = "lenient_string")]
    test_id: String,
    #[serde(default, alias = "name", alias = "title", deserialize_with = "lenient_string")]
    test_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    description: String,
    #[serde(default, deserialize_with = "string_list")]
    preconditions: Vec<String>,
    #[serde(default, alias = "steps", deserialize_with = "step_list")]
    test_steps: Vec<TestStep>,
    #[serde(default, alias = "expected_result", deserialize_with = "string_list")]
    expected_results: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    priority: String,
    #[serde(default, alias = "type", deserialize_with = "lenient_string")]
    category: String,
    #[serde(default, deserialize_with = "string_list")]
    tags: Vec<String>,
}

impl RawTestCase {
    fn is_blank(&self) -> bool {
        self.test_name.is_empty() && self.description.is_empty() && self.test_steps.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct RawScript {
    #[serde(default, alias = "file", deserialize_with = "lenient_string")]
    filename: String,
    #[serde(default, alias = "code", deserialize_with = "lenient_string")]
    content: String,
    #[serde(default, deserialize_with = "string_list")]
    related_test_ids: Vec<String>,
    #[serde(default, alias = "feature", deserialize_with = "lenient_string")]
    feature_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    scenario_count: String,
}

/// Manual tests with fresh ids, plus the model's id → new id mapping
#[derive(Debug, Clone, Default)]
pub struct ParsedManualTests {
    pub tests: Vec<ManualTestCase>,
    pub id_map: HashMap<String, String>,
}

/// Parses a manual test payload stored under `key` (`test_cases` or `additional_tests`).
///
/// Tests keep the model's order and are renumbered from `first_number`.
pub fn parse_manual_tests(response: &str, key: &str, first_number: usize) -> Result<ParsedManualTests> {
    let artifact = ArtifactType::Manual;
    let value = extract_json(response)
        .ok_or_else(|| Error::parse(artifact, "no JSON object found in the response"))?;

    let items = value
        .get(key)
        .or_else(|| value.get("test_cases"))
        .cloned()
        .ok_or_else(|| Error::parse(artifact, format!("missing \"{}\" list", key)))?;
    if !items.is_array() {
        return Err(Error::parse(artifact, format!("\"{}\" is not a list", key)));
    }

    let raw: Vec<RawTestCase> = serde_json::from_value(items)
        .map_err(|e| Error::parse(artifact, format!("invalid test case: {}", e)))?;
    let raw: Vec<RawTestCase> = raw.into_iter().filter(|t| !t.is_blank()).collect();
    if raw.is_empty() {
        return Err(Error::parse(artifact, "the response contained no test cases"));
    }

    let mut parsed = ParsedManualTests::default();
    for (offset, raw) in raw.into_iter().enumerate() {
        let test_id = format_test_id(first_number + offset);
        if !raw.test_id.is_empty() {
            parsed
                .id_map
                .entry(raw.test_id.clone())
                .or_insert_with(|| test_id.clone());
        }

        let priority = Priority::parse_lenient(&raw.priority).unwrap_or_else(|| {
            if !raw.priority.is_empty() {
                warn!("Unknown priority '{}' on {}, using Medium", raw.priority, test_id);
            }
            Priority::Medium
        });

        let test_name = if raw.test_name.is_empty() {
            "Unnamed Test".to_string()
        } else {
            raw.test_name
        };

        let mut test = ManualTestCase::new(test_id, test_name);
        test.description = raw.description;
        test.preconditions = raw.preconditions;
        test.test_steps = raw.test_steps;
        test.expected_results = raw.expected_results;
        test.priority = priority;
        test.category = normalize_category(&raw.category);
        test.tags = raw.tags;
        parsed.tests.push(test);
    }

    debug!(
        "Parsed {} manual tests ({} model ids mapped)",
        parsed.tests.len(),
        parsed.id_map.len()
    );
    Ok(parsed)
}

/// Parses automation scripts of one type, falling back to raw text extraction
pub fn parse_scripts(response: &str, artifact: ArtifactType) -> Result<Vec<AutomationScript>> {
    let from_json = extract_json(response).and_then(|value| {
        let items = ["feature_files", "scripts"]
            .iter()
            .find_map(|key| value.get(*key))
            .cloned()?;
        match serde_json::from_value::<Vec<RawScript>>(items) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!("Invalid {} script list: {}", artifact, e);
                None
            }
        }
    });

    let mut scripts: Vec<AutomationScript> = from_json
        .unwrap_or_default()
        .into_iter()
        .filter(|raw| !raw.content.is_empty())
        .map(|raw| script_from_raw(raw, artifact))
        .collect();

    if scripts.is_empty() && !opens_script_payload(response) {
        scripts = match artifact {
            ArtifactType::Gherkin => raw_gherkin(response),
            ArtifactType::Selenium | ArtifactType::Playwright => raw_code_blocks(response, artifact),
            ArtifactType::Manual => Vec::new(),
        };
        if !scripts.is_empty() {
            warn!(
                "Recovered {} {} from unstructured output",
                scripts.len(),
                artifact.display_name()
            );
        }
    }

    if scripts.is_empty() {
        return Err(Error::parse(artifact, "the response contained no usable scripts"));
    }
    Ok(scripts)
}

/// True when the response starts a `feature_files`/`scripts` JSON object.
///
/// Such a response that failed to parse is malformed JSON, and its string
/// literals must not be mistaken for raw feature files or code.
fn opens_script_payload(response: &str) -> bool {
    match Regex::new(r#"\{\s*"(?:feature_files|scripts)"\s*:"#) {
        Ok(re) => re.is_match(response),
        Err(_) => false,
    }
}

fn script_from_raw(raw: RawScript, artifact: ArtifactType) -> AutomationScript {
    let feature_name = if raw.feature_name.is_empty() {
        raw.description.clone()
    } else {
        raw.feature_name
    };

    let scenario_count = match artifact {
        ArtifactType::Gherkin => raw
            .scenario_count
            .parse::<u32>()
            .ok()
            .filter(|count| *count > 0)
            .unwrap_or_else(|| count_scenarios(&raw.content)),
        _ => 0,
    };

    let mut script = AutomationScript {
        script_type: artifact,
        filename: raw.filename,
        content: raw.content,
        related_test_ids: raw.related_test_ids,
        feature_name,
        description: raw.description,
        scenario_count,
    };
    script.filename = script.normalized_filename();
    script
}

pub fn count_scenarios(content: &str) -> u32 {
    match Regex::new(r"Scenario(?:\s+Outline)?:") {
        Ok(re) => re.find_iter(content).count() as u32,
        Err(_) => 0,
    }
}

fn feature_filename(feature_name: &str) -> String {
    let stem: String = feature_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .take(50)
        .collect();
    format!("{}.feature", stem)
}

/// `Feature:` blocks that contain at least one scenario
fn raw_gherkin(response: &str) -> Vec<AutomationScript> {
    let mut blocks: Vec<&str> = Vec::new();
    let mut rest = response;
    while let Some(start) = rest.find("Feature:") {
        let block = &rest[start..];
        let end = block[1..]
            .find("\nFeature:")
            .map(|i| i + 1)
            .unwrap_or(block.len());
        blocks.push(&block[..end]);
        rest = &block[end..];
    }

    blocks
        .into_iter()
        .map(|block| block.trim().trim_end_matches("```").trim())
        .filter(|content| content.contains("Scenario"))
        .enumerate()
        .map(|(i, content)| {
            let feature_name = content
                .lines()
                .next()
                .and_then(|line| line.strip_prefix("Feature:"))
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Feature {}", i + 1));

            AutomationScript {
                script_type: ArtifactType::Gherkin,
                filename: feature_filename(&feature_name),
                content: content.to_string(),
                related_test_ids: Vec::new(),
                scenario_count: count_scenarios(content),
                feature_name,
                description: String::new(),
            }
        })
        .collect()
}

/// Fenced code blocks that look like tests for the given framework
fn raw_code_blocks(response: &str, artifact: ArtifactType) -> Vec<AutomationScript> {
    let (pattern, indicators, extension): (&str, &[&str], &str) = match artifact {
        ArtifactType::Selenium => (
            r"(?is)```(?:python|py)?[ \t]*\n(.*?)```",
            &["import", "def test_", "class Test", "selenium", "webdriver"],
            "py",
        ),
        _ => (
            r"(?is)```(?:javascript|js|typescript|ts)?[ \t]*\n(.*?)```",
            &["test(", "expect(", "page.", "playwright", "require(", "import "],
            "spec.js",
        ),
    };

    let Ok(re) = Regex::new(pattern) else {
        return Vec::new();
    };

    re.captures_iter(response)
        .map(|caps| caps[1].trim().to_string())
        .filter(|code| !code.is_empty() && indicators.iter().any(|i| code.contains(i)))
        .enumerate()
        .map(|(i, content)| AutomationScript {
            script_type: artifact,
            filename: format!("test_generated_{}.{}", i + 1, extension),
            content,
            related_test_ids: Vec::new(),
            feature_name: format!("Generated {} test {}", artifact.display_name(), i + 1),
            description: String::new(),
            scenario_count: 0,
        })
        .collect()
}

/// Points script `related_test_ids` at the final manual test ids.
///
/// Model ids go through `id_map`, ids that match no manual test are dropped,
/// and scripts left without links are matched on test names appearing in the
/// script text.
pub fn link_related_tests(
    scripts: &mut [AutomationScript],
    tests: &[ManualTestCase],
    id_map: &HashMap<String, String>,
) {
    let known: HashSet<&str> = tests.iter().map(|t| t.test_id.as_str()).collect();

    for script in scripts.iter_mut() {
        let mut linked: Vec<String> = Vec::new();
        for id in &script.related_test_ids {
            let candidate = id_map.get(id.trim()).map(String::as_str).unwrap_or(id.trim());
            if known.contains(candidate) && !linked.iter().any(|l| l == candidate) {
                linked.push(candidate.to_string());
            }
        }

        if linked.is_empty() {
            let haystack = format!("{}\n{}", script.feature_name, script.content).to_lowercase();
            linked = tests
                .iter()
                .filter(|t| {
                    let name = t.test_name.trim().to_lowercase();
                    name.chars().count() >= 4 && haystack.contains(&name)
                })
                .map(|t| t.test_id.clone())
                .collect();
        }

        script.related_test_ids = linked;
    }
}
