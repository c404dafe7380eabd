//! Operator bundle validation.
//!
//! Builds the `operator-sdk bundle validate` options from the bundle's
//! annotations and delegates to an [`OperatorSdk`] engine.

use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, trace};

use crate::bundle::{annotations_path, read_annotations, Annotations, VERSIONS_ANNOTATION};
use crate::context::RunContext;
use crate::error::{PreflightError, Result};
use crate::operator_sdk::{BundleValidateOptions, BundleValidateReport, OperatorSdk};
use crate::version::{qualifies, OCP_V1BETA1_UNSUPPORTED};

/// Optional validator value enabled for bundles targeting OpenShift 4.9+.
pub const K8S_VERSION_KEY: &str = "k8s-version";
pub const K8S_VERSION_FOR_OCP_49: &str = "1.22";

/// Build validator options for a bundle with the given annotations.
pub fn validate_options(annotations: &Annotations) -> BundleValidateOptions {
    let mut optional_values = BTreeMap::new();

    if let Some(versions) = annotations.get(VERSIONS_ANNOTATION) {
        if qualifies(versions, OCP_V1BETA1_UNSUPPORTED) {
            debug!("OpenShift 4.9 detected in annotations. Running with additional checks enabled.");
            optional_values.insert(
                K8S_VERSION_KEY.to_string(),
                K8S_VERSION_FOR_OCP_49.to_string(),
            );
        }
    }

    BundleValidateOptions {
        selector: vec!["community".to_string(), "operatorhub".to_string()],
        verbose: true,
        container_engine: "none".to_string(),
        output_format: "json-alpha1".to_string(),
        optional_values,
    }
}

/// Validate the extracted bundle at `bundle_path`.
///
/// The engine's report is returned unchanged.
pub async fn validate_bundle(
    ctx: &RunContext,
    engine: &dyn OperatorSdk,
    bundle_path: &Path,
) -> Result<BundleValidateReport> {
    trace!("reading annotations file from the bundle");
    debug!(dir = %bundle_path.display(), "image extraction directory");

    let annotations = read_annotations(&annotations_path(bundle_path)).map_err(|e| match e {
        PreflightError::Io { source, .. } => {
            PreflightError::io("could not open annotations.yaml", source)
        }
        PreflightError::Parse { message, .. } => PreflightError::parse(
            "unable to get annotations.yaml from the bundle",
            message,
        ),
        other => other,
    })?;

    let opts = validate_options(&annotations);

    if let Some(err) = ctx.err() {
        return Err(err);
    }
    tokio::select! {
        err = ctx.done() => Err(err),
        report = engine.bundle_validate(bundle_path, &opts) => {
            report.map_err(|e| PreflightError::external("operator-sdk bundle validate failed", &e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(versions: &str) -> Annotations {
        let mut annotations = Annotations::new();
        annotations.insert(VERSIONS_ANNOTATION.to_string(), versions.to_string());
        annotations
    }

    #[test]
    fn test_fixed_options() {
        let opts = validate_options(&Annotations::new());
        assert_eq!(opts.selector, vec!["community", "operatorhub"]);
        assert!(opts.verbose);
        assert_eq!(opts.container_engine, "none");
        assert_eq!(opts.output_format, "json-alpha1");
        assert!(opts.optional_values.is_empty());
    }

    #[test]
    fn test_k8s_version_added_for_49_and_later() {
        let opts = validate_options(&annotations("=4.10"));
        assert_eq!(
            opts.optional_values.get(K8S_VERSION_KEY).map(String::as_str),
            Some("1.22")
        );
    }

    #[test]
    fn test_k8s_version_absent_below_49() {
        let opts = validate_options(&annotations("=4.8"));
        assert!(opts.optional_values.is_empty());
    }

    #[test]
    fn test_unparsable_versions_do_not_abort() {
        let opts = validate_options(&annotations("=banana"));
        assert!(opts.optional_values.is_empty());
        assert_eq!(opts.output_format, "json-alpha1");
    }
}
