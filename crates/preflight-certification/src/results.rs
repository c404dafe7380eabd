//! Check outcomes and their ordered aggregate.

use serde::Serialize;
use std::time::Duration;

use crate::check::{CheckHelp, CheckMetadata};

/// Verdict of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed,
    /// The check could not reach a verdict.
    Errored { message: String },
}

/// Outcome of one check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    #[serde(flatten)]
    pub status: CheckStatus,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    pub metadata: CheckMetadata,
    pub help: CheckHelp,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Passed
    }

    /// Diagnostic text for errored checks.
    pub fn diagnostic(&self) -> Option<&str> {
        match &self.status {
            CheckStatus::Errored { message } => Some(message),
            _ => None,
        }
    }
}

/// Ordered outcomes of a certification run, in the policy's declared order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Results {
    pub image: String,
    entries: Vec<CheckResult>,
}

impl Results {
    pub(crate) fn from_entries(image: impl Into<String>, entries: Vec<CheckResult>) -> Self {
        Self {
            image: image.into(),
            entries,
        }
    }

    /// All outcomes in policy order.
    pub fn entries(&self) -> &[CheckResult] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.entries.iter().find(|r| r.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn passed(&self) -> impl Iterator<Item = &CheckResult> {
        self.entries.iter().filter(|r| r.status == CheckStatus::Passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CheckResult> {
        self.entries.iter().filter(|r| r.status == CheckStatus::Failed)
    }

    pub fn errored(&self) -> impl Iterator<Item = &CheckResult> {
        self.entries
            .iter()
            .filter(|r| matches!(r.status, CheckStatus::Errored { .. }))
    }

    /// Logical AND of every recorded outcome.
    pub fn passed_overall(&self) -> bool {
        self.entries.iter().all(CheckResult::passed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::result;
    use super::*;

    #[test]
    fn test_passed_overall_requires_every_check() {
        let results = Results::from_entries(
            "img",
            vec![
                result("a", CheckStatus::Passed),
                result("b", CheckStatus::Passed),
            ],
        );
        assert!(results.passed_overall());

        let results = Results::from_entries(
            "img",
            vec![
                result("a", CheckStatus::Passed),
                result(
                    "b",
                    CheckStatus::Errored {
                        message: "boom".to_string(),
                    },
                ),
            ],
        );
        assert!(!results.passed_overall());
        assert_eq!(results.errored().count(), 1);
        assert_eq!(results.get("b").and_then(CheckResult::diagnostic), Some("boom"));
    }

    #[test]
    fn test_partition_preserves_order() {
        let results = Results::from_entries(
            "img",
            vec![
                result("c", CheckStatus::Failed),
                result("a", CheckStatus::Passed),
                result("b", CheckStatus::Failed),
            ],
        );
        assert_eq!(results.names(), vec!["c", "a", "b"]);
        let failed: Vec<_> = results.failed().map(|r| r.name.as_str()).collect();
        assert_eq!(failed, vec!["c", "b"]);
    }

    #[test]
    fn test_empty_results_pass() {
        let results = Results::from_entries("img", Vec::new());
        assert!(results.is_empty());
        assert!(results.passed_overall());
    }
}
