//! Rendering of [`Results`] for humans and machines.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PreflightError, Result};
use crate::results::{CheckResult, Results};

/// Name reported as the producer of a results document.
pub const TEST_LIBRARY_NAME: &str = "preflight";

/// Renders results into a document with a fixed file extension.
pub trait ResponseFormatter: Send + Sync {
    fn name(&self) -> &'static str;

    fn file_extension(&self) -> &'static str;

    fn format(&self, results: &Results) -> Result<String>;
}

/// Look up a formatter by name (`json` or `text`).
pub fn formatter_for(name: &str) -> Result<Box<dyn ResponseFormatter>> {
    match name {
        "json" => Ok(Box::new(JsonFormatter)),
        "text" => Ok(Box::new(TextFormatter)),
        other => Err(PreflightError::Config(format!(
            "unknown response format {other}; expected json or text"
        ))),
    }
}

/// `results.<ext>` for the given formatter.
pub fn results_filename(formatter: &dyn ResponseFormatter) -> String {
    format!("results.{}", formatter.file_extension())
}

/// Write a formatted report into `artifacts_dir`, creating it if needed.
pub fn write_results(
    artifacts_dir: &Path,
    formatter: &dyn ResponseFormatter,
    document: &str,
) -> Result<PathBuf> {
    std::fs::create_dir_all(artifacts_dir).map_err(|e| {
        PreflightError::io(
            format!("could not create artifacts directory {}", artifacts_dir.display()),
            e,
        )
    })?;
    let path = artifacts_dir.join(results_filename(formatter));
    std::fs::write(&path, document)
        .map_err(|e| PreflightError::io(format!("could not write {}", path.display()), e))?;
    debug!(path = %path.display(), "wrote results artifact");
    Ok(path)
}

// ---------------------------------------------------------------------------
// json
// ---------------------------------------------------------------------------

pub struct JsonFormatter;

#[derive(Serialize)]
struct UserResponse<'a> {
    image: &'a str,
    passed: bool,
    test_library: TestLibrary,
    results: ResultsReport<'a>,
}

#[derive(Serialize)]
struct TestLibrary {
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ResultsReport<'a> {
    passed: Vec<ResultEntry<'a>>,
    failed: Vec<ResultEntry<'a>>,
    errors: Vec<ResultEntry<'a>>,
}

#[derive(Serialize)]
struct ResultEntry<'a> {
    name: &'a str,
    elapsed_time: u64,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    help: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    knowledgebase_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    check_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostic: Option<&'a str>,
}

impl<'a> ResultEntry<'a> {
    // Passing checks carry no remediation fields.
    fn from_result(result: &'a CheckResult) -> Self {
        let remediation = !result.passed();
        Self {
            name: &result.name,
            elapsed_time: result.elapsed.as_millis() as u64,
            description: &result.metadata.description,
            help: remediation.then_some(result.help.message.as_str()),
            suggestion: remediation.then_some(result.help.suggestion.as_str()),
            knowledgebase_url: remediation.then_some(result.metadata.knowledge_base_url.as_str()),
            check_url: remediation.then_some(result.metadata.check_url.as_str()),
            diagnostic: result.diagnostic(),
        }
    }
}

impl ResponseFormatter for JsonFormatter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn file_extension(&self) -> &'static str {
        "json"
    }

    fn format(&self, results: &Results) -> Result<String> {
        let response = UserResponse {
            image: &results.image,
            passed: results.passed_overall(),
            test_library: TestLibrary {
                name: TEST_LIBRARY_NAME,
                version: env!("CARGO_PKG_VERSION"),
            },
            results: ResultsReport {
                passed: results.passed().map(ResultEntry::from_result).collect(),
                failed: results.failed().map(ResultEntry::from_result).collect(),
                errors: results.errored().map(ResultEntry::from_result).collect(),
            },
        };
        serde_json::to_string_pretty(&response)
            .map_err(|e| PreflightError::parse("could not encode results as json", e))
    }
}

// ---------------------------------------------------------------------------
// text
// ---------------------------------------------------------------------------

pub struct TextFormatter;

impl ResponseFormatter for TextFormatter {
    fn name(&self) -> &'static str {
        "text"
    }

    fn file_extension(&self) -> &'static str {
        "txt"
    }

    fn format(&self, results: &Results) -> Result<String> {
        let mut out = String::new();
        for result in results.passed() {
            out.push_str(&format!("PASSED  {}\n", result.name));
        }
        for result in results.failed() {
            out.push_str(&format!("FAILED  {}\n", result.name));
            out.push_str(&format!("        Suggestion: {}\n", result.help.suggestion));
        }
        for result in results.errored() {
            out.push_str(&format!("ERRORED {}\n", result.name));
            if let Some(diagnostic) = result.diagnostic() {
                out.push_str(&format!("        Error: {diagnostic}\n"));
            }
        }
        let verdict = if results.passed_overall() { "PASSED" } else { "FAILED" };
        out.push_str(&format!("\nPreflight result: {verdict}\n"));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::results::test_support::result;
    use crate::results::CheckStatus;
    use tempfile::tempdir;

    fn sample() -> Results {
        Results::from_entries(
            "quay.io/ns/app:1.0",
            vec![
                result("has-license", CheckStatus::Passed),
                result("max-layers", CheckStatus::Failed),
                result(
                    "has-unique-tag",
                    CheckStatus::Errored {
                        message: "unauthorized".to_string(),
                    },
                ),
            ],
        )
    }

    #[test]
    fn test_unknown_formatter() {
        let err = formatter_for("xml").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_json_document_shape() {
        let document = formatter_for("json").unwrap().format(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&document).unwrap();

        assert_eq!(value["image"], "quay.io/ns/app:1.0");
        assert_eq!(value["passed"], false);
        assert_eq!(value["test_library"]["name"], "preflight");
        assert_eq!(value["results"]["passed"][0]["name"], "has-license");
        assert!(value["results"]["passed"][0].get("suggestion").is_none());
        assert_eq!(value["results"]["failed"][0]["suggestion"], "max-layers suggestion");
        assert_eq!(value["results"]["failed"][0]["elapsed_time"], 5);
        assert_eq!(value["results"]["errors"][0]["diagnostic"], "unauthorized");
    }

    #[test]
    fn test_text_report() {
        let text = TextFormatter.format(&sample()).unwrap();
        assert!(text.contains("PASSED  has-license"));
        assert!(text.contains("FAILED  max-layers"));
        assert!(text.contains("Error: unauthorized"));
        assert!(text.ends_with("Preflight result: FAILED\n"));

        let passing = Results::from_entries("img", vec![result("a", CheckStatus::Passed)]);
        assert!(TextFormatter
            .format(&passing)
            .unwrap()
            .ends_with("Preflight result: PASSED\n"));
    }

    #[test]
    fn test_write_results_creates_artifacts_dir() {
        let dir = tempdir().unwrap();
        let artifacts = dir.path().join("artifacts");
        let formatter = formatter_for("text").unwrap();

        let path = write_results(&artifacts, formatter.as_ref(), "PASSED\n").unwrap();
        assert_eq!(path, artifacts.join("results.txt"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "PASSED\n");
    }
}
