//! Checks of the operator policy. All delegate to an [`OperatorSdk`].

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::bundle::{annotations_path, read_annotations, supported_install_modes, PACKAGE_ANNOTATION};
use crate::check::{Check, CheckHelp, CheckLevel, CheckMetadata, ImageUnderTest};
use crate::checks::{help, metadata};
use crate::context::RunContext;
use crate::operator_sdk::{OperatorSdk, RunBundleOptions, ScorecardOptions};
use crate::policy::CheckId;
use crate::validate::validate_bundle;

/// Cluster settings shared by the checks that talk to a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTarget {
    pub namespace: String,
    pub service_account: String,
    pub kubeconfig: Option<String>,
    pub wait_time: Duration,
}

// ---------------------------------------------------------------------------
// scorecard-basic-spec / scorecard-olm-suite
// ---------------------------------------------------------------------------

pub struct ScorecardCheck {
    id: CheckId,
    selector: &'static str,
    sdk: Arc<dyn OperatorSdk>,
    target: ClusterTarget,
}

pub fn scorecard_basic_spec(sdk: Arc<dyn OperatorSdk>, target: ClusterTarget) -> Box<dyn Check> {
    Box::new(ScorecardCheck {
        id: CheckId::ScorecardBasicSpec,
        selector: "test=basic-check-spec-test",
        sdk,
        target,
    })
}

pub fn scorecard_olm_suite(sdk: Arc<dyn OperatorSdk>, target: ClusterTarget) -> Box<dyn Check> {
    Box::new(ScorecardCheck {
        id: CheckId::ScorecardOlmSuite,
        selector: "suite=olm",
        sdk,
        target,
    })
}

#[async_trait]
impl Check for ScorecardCheck {
    fn name(&self) -> &str {
        self.id.name()
    }

    async fn validate(&self, _ctx: &RunContext, image: &ImageUnderTest) -> anyhow::Result<bool> {
        let opts = ScorecardOptions {
            selector: self.selector.to_string(),
            namespace: self.target.namespace.clone(),
            service_account: self.target.service_account.clone(),
            kubeconfig: self.target.kubeconfig.clone(),
            wait_time: self.target.wait_time,
        };
        let report = self.sdk.scorecard(&image.reference, &opts).await?;

        let mut passed = true;
        for result in report.non_passing() {
            info!(test = %result.name, state = %result.state, log = %result.log, "scorecard test did not pass");
            passed = false;
        }
        Ok(passed)
    }

    fn metadata(&self) -> CheckMetadata {
        match self.id {
            CheckId::ScorecardOlmSuite => metadata(
                "Check that an operator passes the OLM suite of the operator-sdk scorecard.",
                CheckLevel::Best,
            ),
            _ => metadata(
                "Check to make sure that all CRs have a spec block.",
                CheckLevel::Best,
            ),
        }
    }

    fn help(&self) -> CheckHelp {
        match self.id {
            CheckId::ScorecardOlmSuite => help(
                "Check ScorecardOlmSuiteCheck encountered an error. Please review the artifacts/operator_bundle_scorecard_OlmSuiteCheck.json file for more information.",
                "See scorecard output for details, artifacts/operator_bundle_scorecard_OlmSuiteCheck.json",
            ),
            _ => help(
                "Check ScorecardBasicSpecCheck encountered an error. Please review the artifacts/operator_bundle_scorecard_BasicSpecCheck.json file for more information.",
                "Make sure that all CRs have a spec block",
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// deployable-by-olm
// ---------------------------------------------------------------------------

pub struct DeployableByOlmCheck {
    sdk: Arc<dyn OperatorSdk>,
    target: ClusterTarget,
    index_image: Option<String>,
}

pub fn deployable_by_olm(
    sdk: Arc<dyn OperatorSdk>,
    target: ClusterTarget,
    index_image: Option<String>,
) -> Box<dyn Check> {
    Box::new(DeployableByOlmCheck {
        sdk,
        target,
        index_image,
    })
}

/// Pick the install mode to deploy with, preferring the widest scope.
pub fn preferred_install_mode(modes: &BTreeMap<String, bool>, namespace: &str) -> Option<String> {
    if modes.contains_key("AllNamespaces") {
        Some("AllNamespaces".to_string())
    } else if modes.contains_key("OwnNamespace") {
        Some("OwnNamespace".to_string())
    } else if modes.contains_key("SingleNamespace") {
        Some(format!("SingleNamespace={namespace}"))
    } else {
        None
    }
}

#[async_trait]
impl Check for DeployableByOlmCheck {
    fn name(&self) -> &str {
        CheckId::DeployableByOlm.name()
    }

    async fn validate(&self, _ctx: &RunContext, image: &ImageUnderTest) -> anyhow::Result<bool> {
        let annotations = read_annotations(&annotations_path(&image.root))?;
        let package = annotations
            .get(PACKAGE_ANNOTATION)
            .ok_or_else(|| anyhow::anyhow!("bundle annotations do not name a package"))?;

        let modes = supported_install_modes(&image.root)?;
        let Some(install_mode) = preferred_install_mode(&modes, &self.target.namespace) else {
            info!(?modes, "bundle supports no install mode usable for deployment");
            return Ok(false);
        };
        debug!(%package, %install_mode, "deploying bundle through OLM");

        let opts = RunBundleOptions {
            namespace: self.target.namespace.clone(),
            install_mode,
            index_image: self.index_image.clone(),
            service_account: self.target.service_account.clone(),
            kubeconfig: self.target.kubeconfig.clone(),
            timeout: self.target.wait_time,
        };
        let report = self.sdk.run_bundle(&image.reference, &opts).await?;
        if !report.succeeded {
            info!(stderr = %report.stderr.trim(), "operator-sdk run bundle failed");
        }

        if let Err(e) = self
            .sdk
            .cleanup(package, &self.target.namespace, self.target.kubeconfig.as_deref())
            .await
        {
            warn!(%package, error = %e, "unable to clean up deployed bundle");
        }

        Ok(report.succeeded)
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Checking if the operator could be deployed by OLM",
            CheckLevel::Best,
        )
    }

    fn help(&self) -> CheckHelp {
        help(
            "It is required that your operator could be deployed by OLM",
            "Follow the guidelines on the operator-sdk website to learn how to package your operator https://sdk.operatorframework.io/docs/olm-integration/cli-overview/",
        )
    }
}

// ---------------------------------------------------------------------------
// validate-operator-bundle
// ---------------------------------------------------------------------------

pub struct ValidateOperatorBundleCheck {
    sdk: Arc<dyn OperatorSdk>,
}

pub fn validate_operator_bundle(sdk: Arc<dyn OperatorSdk>) -> Box<dyn Check> {
    Box::new(ValidateOperatorBundleCheck { sdk })
}

#[async_trait]
impl Check for ValidateOperatorBundleCheck {
    fn name(&self) -> &str {
        CheckId::ValidateOperatorBundle.name()
    }

    async fn validate(&self, ctx: &RunContext, image: &ImageUnderTest) -> anyhow::Result<bool> {
        let report = validate_bundle(ctx, self.sdk.as_ref(), &image.root).await?;

        let mut passed = report.passed;
        for output in report.errors() {
            info!(message = %output.message, "bundle validation error");
            passed = false;
        }
        Ok(passed)
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Validating Bundle image that checks if it can validate the content and format of the operator bundle",
            CheckLevel::Best,
        )
    }

    fn help(&self) -> CheckHelp {
        help(
            "Check ValidateOperatorBundle encountered an error. Please review the preflight.log file for more information.",
            "Valid bundles are defined by bundle spec, so make sure that this bundle conforms to that spec. More Information: https://github.com/operator-framework/operator-registry/blob/master/docs/design/operator-bundle.md",
        )
    }
}
