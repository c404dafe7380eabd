//! Built-in checks and the factory that configures them.

pub mod container;
pub mod operator;

use std::sync::Arc;

use crate::check::{Check, CheckHelp, CheckLevel, CheckMetadata};
use crate::config::CertificationConfig;
use crate::error::{PreflightError, Result};
use crate::operator_sdk::{OperatorSdk, OperatorSdkCli};
use crate::policy::{CheckFactory, CheckId};
use crate::pyxis::{CertificationApi, PyxisClient};
use crate::registry::{DockerConfig, HttpRegistryClient, RegistryClient};
use crate::rpm::{PackageInspector, RpmCli};

use operator::ClusterTarget;

const KNOWLEDGE_BASE_URL: &str =
    "https://access.redhat.com/documentation/en-us/red_hat_software_certification";
const CHECK_URL: &str =
    "https://access.redhat.com/documentation/en-us/red_hat_software_certification/8.45/html/red_hat_openshift_software_certification_policy_guide";

pub(crate) fn metadata(description: &str, level: CheckLevel) -> CheckMetadata {
    CheckMetadata {
        description: description.to_string(),
        level,
        knowledge_base_url: KNOWLEDGE_BASE_URL.to_string(),
        check_url: CHECK_URL.to_string(),
    }
}

pub(crate) fn help(message: &str, suggestion: &str) -> CheckHelp {
    CheckHelp {
        message: message.to_string(),
        suggestion: suggestion.to_string(),
    }
}

/// External systems the built-in checks call into.
#[derive(Clone)]
pub struct Collaborators {
    pub operator_sdk: Arc<dyn OperatorSdk>,
    pub registry: Arc<dyn RegistryClient>,
    pub certification_api: Arc<dyn CertificationApi>,
    pub packages: Arc<dyn PackageInspector>,
}

impl Collaborators {
    /// Real clients: the `operator-sdk` and `rpm` binaries, the registry v2
    /// API and Pyxis.
    pub fn from_config(config: &CertificationConfig) -> Result<Self> {
        let credentials = match &config.docker_config {
            Some(path) => DockerConfig::load(path)?,
            None => DockerConfig::default(),
        };
        let registry = HttpRegistryClient::new(credentials)
            .map_err(|e| PreflightError::external("could not build registry client", &e))?;
        let pyxis = PyxisClient::new(&config.pyxis_host, &config.pyxis_api_token)
            .map_err(|e| PreflightError::external("could not build pyxis client", &e))?;

        Ok(Self {
            operator_sdk: Arc::new(OperatorSdkCli::default()),
            registry: Arc::new(registry),
            certification_api: Arc::new(pyxis),
            packages: Arc::new(RpmCli::default()),
        })
    }
}

/// [`CheckFactory`] for the built-in checks.
pub struct DefaultCheckFactory {
    collaborators: Collaborators,
    target: ClusterTarget,
    index_image: Option<String>,
}

impl DefaultCheckFactory {
    pub fn new(config: &CertificationConfig, collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            target: ClusterTarget {
                namespace: config.namespace.clone(),
                service_account: config.service_account.clone(),
                kubeconfig: config.kubeconfig.clone(),
                wait_time: config.scorecard_wait_time(),
            },
            index_image: config.index_image.clone(),
        }
    }
}

impl CheckFactory for DefaultCheckFactory {
    fn build(&self, id: CheckId) -> Box<dyn Check> {
        let c = &self.collaborators;
        match id {
            CheckId::ScorecardBasicSpec => {
                operator::scorecard_basic_spec(c.operator_sdk.clone(), self.target.clone())
            }
            CheckId::ScorecardOlmSuite => {
                operator::scorecard_olm_suite(c.operator_sdk.clone(), self.target.clone())
            }
            CheckId::DeployableByOlm => operator::deployable_by_olm(
                c.operator_sdk.clone(),
                self.target.clone(),
                self.index_image.clone(),
            ),
            CheckId::ValidateOperatorBundle => {
                operator::validate_operator_bundle(c.operator_sdk.clone())
            }
            CheckId::HasLicense => container::has_license(),
            CheckId::HasUniqueTag => container::has_unique_tag(c.registry.clone()),
            CheckId::MaxLayers => container::max_layers(),
            CheckId::HasNoProhibitedPackages => {
                container::has_no_prohibited_packages(c.packages.clone())
            }
            CheckId::HasRequiredLabels => container::has_required_labels(),
            CheckId::RunAsNonRoot => container::run_as_non_root(),
            CheckId::HasModifiedFiles => container::has_modified_files(c.packages.clone()),
            CheckId::BasedOnUbi => container::based_on_ubi(c.certification_api.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes;
    use crate::policy::{check_names_for, Policy, PolicyRegistry};

    #[test]
    fn test_built_checks_carry_table_names() {
        let factory = DefaultCheckFactory::new(
            &CertificationConfig::default(),
            fakes::collaborators(),
        );
        let registry = PolicyRegistry::new(Arc::new(factory));

        for policy in Policy::ALL {
            let checks = registry.resolve_checks(policy.as_str()).unwrap();
            let names: Vec<&str> = checks.iter().map(|c| c.name()).collect();
            assert_eq!(names, check_names_for(policy.as_str()).unwrap());
        }
    }

    #[test]
    fn test_resolve_unknown_policy_returns_no_checks() {
        let factory = DefaultCheckFactory::new(
            &CertificationConfig::default(),
            fakes::collaborators(),
        );
        let registry = PolicyRegistry::new(Arc::new(factory));
        assert!(registry.resolve_checks("bogus").is_err());
    }
}
