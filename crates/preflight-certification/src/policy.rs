//! Policy identifiers and the policy → checklist table.
//!
//! The table is a `static` and never mutated. Check instances are built on
//! demand by a [`CheckFactory`], so configuration flows in explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::check::Check;
use crate::error::{PreflightError, Result};

/// Artifact class a certification run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    Operator,
    Container,
    Root,
    Scratch,
}

impl Policy {
    pub const ALL: [Policy; 4] = [
        Policy::Operator,
        Policy::Container,
        Policy::Root,
        Policy::Scratch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Operator => "operator",
            Policy::Container => "container",
            Policy::Root => "root",
            Policy::Scratch => "scratch",
        }
    }
}

impl FromStr for Policy {
    type Err = PreflightError;

    /// Case-sensitive.
    fn from_str(s: &str) -> Result<Self> {
        Policy::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| PreflightError::UnknownPolicy {
                policy: s.to_string(),
            })
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a built-in check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckId {
    ScorecardBasicSpec,
    ScorecardOlmSuite,
    DeployableByOlm,
    ValidateOperatorBundle,
    HasLicense,
    HasUniqueTag,
    MaxLayers,
    HasNoProhibitedPackages,
    HasRequiredLabels,
    RunAsNonRoot,
    HasModifiedFiles,
    BasedOnUbi,
}

impl CheckId {
    pub fn name(&self) -> &'static str {
        match self {
            CheckId::ScorecardBasicSpec => "scorecard-basic-spec",
            CheckId::ScorecardOlmSuite => "scorecard-olm-suite",
            CheckId::DeployableByOlm => "deployable-by-olm",
            CheckId::ValidateOperatorBundle => "validate-operator-bundle",
            CheckId::HasLicense => "has-license",
            CheckId::HasUniqueTag => "has-unique-tag",
            CheckId::MaxLayers => "max-layers",
            CheckId::HasNoProhibitedPackages => "has-no-prohibited-packages",
            CheckId::HasRequiredLabels => "has-required-labels",
            CheckId::RunAsNonRoot => "run-as-non-root",
            CheckId::HasModifiedFiles => "has-modified-files",
            CheckId::BasedOnUbi => "based-on-ubi",
        }
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

use CheckId::*;

/// Policy → ordered checklist. Order determines report order.
static POLICY_TABLE: [(Policy, &[CheckId]); 4] = [
    (
        Policy::Operator,
        &[
            ScorecardBasicSpec,
            ScorecardOlmSuite,
            DeployableByOlm,
            ValidateOperatorBundle,
        ],
    ),
    (
        Policy::Container,
        &[
            HasLicense,
            HasUniqueTag,
            MaxLayers,
            HasNoProhibitedPackages,
            HasRequiredLabels,
            RunAsNonRoot,
            HasModifiedFiles,
            BasedOnUbi,
        ],
    ),
    (
        Policy::Root,
        &[
            HasLicense,
            HasUniqueTag,
            MaxLayers,
            HasNoProhibitedPackages,
            HasRequiredLabels,
            HasModifiedFiles,
        ],
    ),
    (
        Policy::Scratch,
        &[
            HasLicense,
            HasUniqueTag,
            MaxLayers,
            HasRequiredLabels,
            RunAsNonRoot,
        ],
    ),
];

/// Ordered check identities for a policy identifier.
pub fn checks_for(policy: &str) -> Result<&'static [CheckId]> {
    let policy: Policy = policy.parse()?;
    POLICY_TABLE
        .iter()
        .find(|(p, _)| *p == policy)
        .map(|(_, checks)| *checks)
        .ok_or_else(|| PreflightError::UnknownPolicy {
            policy: policy.to_string(),
        })
}

/// Ordered check names for a policy identifier.
pub fn check_names_for(policy: &str) -> Result<Vec<&'static str>> {
    Ok(checks_for(policy)?.iter().map(CheckId::name).collect())
}

/// Builds a configured check instance for a check identity.
pub trait CheckFactory: Send + Sync {
    fn build(&self, id: CheckId) -> Box<dyn Check>;
}

/// Resolves policy identifiers to ready-to-run checks.
#[derive(Clone)]
pub struct PolicyRegistry {
    factory: Arc<dyn CheckFactory>,
}

impl PolicyRegistry {
    pub fn new(factory: Arc<dyn CheckFactory>) -> Self {
        Self { factory }
    }

    /// Ordered, configured checks for `policy`. Unknown identifiers yield
    /// [`PreflightError::UnknownPolicy`] and no checks.
    pub fn resolve_checks(&self, policy: &str) -> Result<Vec<Box<dyn Check>>> {
        Ok(checks_for(policy)?
            .iter()
            .map(|id| self.factory.build(*id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashSet;

    #[test]
    fn test_operator_checks() {
        assert_eq!(
            check_names_for("operator").unwrap(),
            vec![
                "scorecard-basic-spec",
                "scorecard-olm-suite",
                "deployable-by-olm",
                "validate-operator-bundle",
            ]
        );
    }

    #[test]
    fn test_container_checks() {
        assert_eq!(
            check_names_for("container").unwrap(),
            vec![
                "has-license",
                "has-unique-tag",
                "max-layers",
                "has-no-prohibited-packages",
                "has-required-labels",
                "run-as-non-root",
                "has-modified-files",
                "based-on-ubi",
            ]
        );
    }

    #[test]
    fn test_root_checks() {
        assert_eq!(
            check_names_for("root").unwrap(),
            vec![
                "has-license",
                "has-unique-tag",
                "max-layers",
                "has-no-prohibited-packages",
                "has-required-labels",
                "has-modified-files",
            ]
        );
    }

    #[test]
    fn test_scratch_checks() {
        assert_eq!(
            check_names_for("scratch").unwrap(),
            vec![
                "has-license",
                "has-unique-tag",
                "max-layers",
                "has-required-labels",
                "run-as-non-root",
            ]
        );
    }

    #[test]
    fn test_unknown_policy() {
        let err = check_names_for("bogus").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.to_string(), "provided policy bogus is unknown");
    }

    #[test]
    fn test_policy_names_are_case_sensitive() {
        assert!("Operator".parse::<Policy>().is_err());
        assert_eq!("operator".parse::<Policy>().unwrap(), Policy::Operator);
    }

    #[test]
    fn test_names_unique_within_each_policy() {
        for policy in Policy::ALL {
            let names = check_names_for(policy.as_str()).unwrap();
            let unique: HashSet<_> = names.iter().collect();
            assert_eq!(unique.len(), names.len(), "duplicate check in {policy}");
        }
    }
}
