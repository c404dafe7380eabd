//! OpenShift version-range evaluation for bundle annotations.
//!
//! The `com.redhat.openshift.versions` annotation lists the OpenShift
//! releases a bundle targets, as `=4.9`, `4.6` or `4.6-4.9`. Bundles that
//! reach 4.9 or later must also be validated against Kubernetes 1.22 APIs.
//!
//! [`evaluate_range`] is pure and returns a [`RangeEvaluation`];
//! [`qualifies`] wraps it and logs unparsable tokens.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::error;

/// First OpenShift release that drops the v1beta1 APIs.
pub const OCP_V1BETA1_UNSUPPORTED: OcpVersion = OcpVersion::new(4, 9, 0);

/// Errors from tolerant version parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionParseError {
    #[error("version string is empty")]
    Empty,

    #[error("too many components in version {0:?}")]
    TooManyComponents(String),

    #[error("invalid numeric component {component:?} in version {input:?}")]
    InvalidComponent { input: String, component: String },
}

/// A major.minor.patch version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OcpVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl OcpVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse leniently: surrounding whitespace and a leading `v` are
    /// dropped, and missing minor/patch components default to zero
    /// (`4.9` → `4.9.0`). Leading zeros are accepted.
    pub fn parse_tolerant(input: &str) -> Result<Self, VersionParseError> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() > 3 {
            return Err(VersionParseError::TooManyComponents(input.to_string()));
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionParseError::InvalidComponent {
                    input: input.to_string(),
                    component: part.to_string(),
                });
            }
            *slot = part
                .parse()
                .map_err(|_| VersionParseError::InvalidComponent {
                    input: input.to_string(),
                    component: part.to_string(),
                })?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

impl PartialOrd for OcpVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OcpVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl FromStr for OcpVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_tolerant(s)
    }
}

impl fmt::Display for OcpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Remove single quotes, double quotes and every literal `v`.
pub fn clean_version_expression(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '\'' | '"' | 'v'))
        .collect()
}

/// Outcome of evaluating a version-range expression against a threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeEvaluation {
    Qualifies,
    DoesNotQualify,
    /// A token could not be parsed; treated as not qualifying.
    Unparsable {
        token: String,
        error: VersionParseError,
    },
}

impl RangeEvaluation {
    pub fn qualifies(&self) -> bool {
        matches!(self, RangeEvaluation::Qualifies)
    }

    fn from_bool(value: bool) -> Self {
        if value {
            RangeEvaluation::Qualifies
        } else {
            RangeEvaluation::DoesNotQualify
        }
    }
}

fn parse_token(token: &str) -> Result<OcpVersion, RangeEvaluation> {
    OcpVersion::parse_tolerant(token).map_err(|error| RangeEvaluation::Unparsable {
        token: token.to_string(),
        error,
    })
}

/// Decide whether `expression` denotes OpenShift versions at or above
/// `threshold`.
///
/// A bare version (`4.6`) that is below the threshold is re-checked with
/// the comparison reversed (`threshold >= version`), so every parsable
/// bare version qualifies. Downstream certification relies on this.
pub fn evaluate_range(expression: &str, threshold: OcpVersion) -> RangeEvaluation {
    let cleaned = clean_version_expression(expression);

    if let Some(exact) = cleaned.strip_prefix('=') {
        return match parse_token(exact) {
            Ok(version) => RangeEvaluation::from_bool(version >= threshold),
            Err(unparsable) => unparsable,
        };
    }

    if cleaned.len() <= 1 {
        return RangeEvaluation::DoesNotQualify;
    }

    if !cleaned.contains('-') {
        match parse_token(&cleaned) {
            Ok(version) if version >= threshold => return RangeEvaluation::Qualifies,
            Ok(_) => {}
            Err(unparsable) => return unparsable,
        }
    }

    let bounds: Vec<&str> = cleaned.split('-').collect();
    if bounds.len() > 1 {
        return match parse_token(bounds[1]) {
            Ok(upper) => RangeEvaluation::from_bool(upper >= threshold),
            Err(unparsable) => unparsable,
        };
    }

    match parse_token(bounds[0]) {
        Ok(version) => RangeEvaluation::from_bool(threshold >= version),
        Err(unparsable) => unparsable,
    }
}

/// [`evaluate_range`] reduced to a boolean; parse failures are logged and
/// count as not qualifying.
pub fn qualifies(expression: &str, threshold: OcpVersion) -> bool {
    match evaluate_range(expression, threshold) {
        RangeEvaluation::Unparsable { token, error } => {
            error!(value = %token, expression = %expression, %error, "unable to parse the version");
            false
        }
        other => other.qualifies(),
    }
}
