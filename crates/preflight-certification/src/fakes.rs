//! In-memory collaborator fakes (testing only)
//!
//! Provide `FakeOperatorSdk`, `FakeRegistry`, `FakeCertificationApi` and
//! `FakePackageInspector`, which satisfy the collaborator traits without
//! spawning processes or touching the network.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::checks::Collaborators;
use crate::operator_sdk::{
    BundleValidateOptions, BundleValidateReport, CommandReport, OperatorSdk, RunBundleOptions,
    ScorecardOptions, ScorecardReport, ScorecardResult, ScorecardTest, ScorecardTestStatus,
};
use crate::pyxis::{CertificationApi, CertifiedImage};
use crate::registry::{ImageReference, RegistryClient};
use crate::rpm::{ModifiedFile, PackageInspector};

/// Fakes for every collaborator, all in their passing configuration.
pub fn collaborators() -> Collaborators {
    Collaborators {
        operator_sdk: Arc::new(FakeOperatorSdk::default()),
        registry: Arc::new(FakeRegistry::with_tags(&["latest", "1.0"])),
        certification_api: Arc::new(FakeCertificationApi::accept_all()),
        packages: Arc::new(FakePackageInspector::new(&[], vec![])),
    }
}

// ---------------------------------------------------------------------------
// FakeOperatorSdk
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SdkState {
    validate_report: BundleValidateReport,
    validate_calls: Vec<BundleValidateOptions>,
    scorecard_state: String,
    scorecard_selectors: Vec<String>,
    run_bundle_succeeds: bool,
    run_bundle_calls: Vec<RunBundleOptions>,
    cleaned: Vec<String>,
}

/// Records every call and answers with configurable reports.
#[derive(Debug)]
pub struct FakeOperatorSdk {
    state: Mutex<SdkState>,
}

impl Default for FakeOperatorSdk {
    fn default() -> Self {
        Self {
            state: Mutex::new(SdkState {
                validate_report: BundleValidateReport {
                    passed: true,
                    outputs: Vec::new(),
                },
                validate_calls: Vec::new(),
                scorecard_state: "pass".to_string(),
                scorecard_selectors: Vec::new(),
                run_bundle_succeeds: true,
                run_bundle_calls: Vec::new(),
                cleaned: Vec::new(),
            }),
        }
    }
}

impl FakeOperatorSdk {
    pub fn set_validate_report(&self, report: BundleValidateReport) {
        self.state.lock().unwrap().validate_report = report;
    }

    pub fn set_scorecard_state(&self, state: &str) {
        self.state.lock().unwrap().scorecard_state = state.to_string();
    }

    pub fn set_run_bundle_succeeds(&self, succeeds: bool) {
        self.state.lock().unwrap().run_bundle_succeeds = succeeds;
    }

    pub fn last_validate_options(&self) -> Option<BundleValidateOptions> {
        self.state.lock().unwrap().validate_calls.last().cloned()
    }

    pub fn scorecard_selectors(&self) -> Vec<String> {
        self.state.lock().unwrap().scorecard_selectors.clone()
    }

    pub fn run_bundle_calls(&self) -> Vec<RunBundleOptions> {
        self.state.lock().unwrap().run_bundle_calls.clone()
    }

    pub fn cleaned_packages(&self) -> Vec<String> {
        self.state.lock().unwrap().cleaned.clone()
    }
}

#[async_trait]
impl OperatorSdk for FakeOperatorSdk {
    async fn bundle_validate(
        &self,
        _image_path: &Path,
        opts: &BundleValidateOptions,
    ) -> anyhow::Result<BundleValidateReport> {
        let mut state = self.state.lock().unwrap();
        state.validate_calls.push(opts.clone());
        Ok(state.validate_report.clone())
    }

    async fn scorecard(
        &self,
        _image: &str,
        opts: &ScorecardOptions,
    ) -> anyhow::Result<ScorecardReport> {
        let mut state = self.state.lock().unwrap();
        state.scorecard_selectors.push(opts.selector.clone());
        Ok(ScorecardReport {
            items: vec![ScorecardTest {
                status: ScorecardTestStatus {
                    results: vec![ScorecardResult {
                        name: opts.selector.clone(),
                        state: state.scorecard_state.clone(),
                        log: String::new(),
                    }],
                },
            }],
        })
    }

    async fn run_bundle(
        &self,
        _image: &str,
        opts: &RunBundleOptions,
    ) -> anyhow::Result<CommandReport> {
        let mut state = self.state.lock().unwrap();
        state.run_bundle_calls.push(opts.clone());
        Ok(CommandReport {
            succeeded: state.run_bundle_succeeds,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    async fn cleanup(
        &self,
        package: &str,
        _namespace: &str,
        _kubeconfig: Option<&str>,
    ) -> anyhow::Result<()> {
        self.state.lock().unwrap().cleaned.push(package.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeRegistry
// ---------------------------------------------------------------------------

/// Returns a fixed tag list, or a fixed error.
#[derive(Debug, Clone)]
pub struct FakeRegistry {
    tags: Result<Vec<String>, String>,
}

impl FakeRegistry {
    pub fn with_tags(tags: &[&str]) -> Self {
        Self {
            tags: Ok(tags.iter().map(|t| t.to_string()).collect()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            tags: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn list_tags(&self, _image: &ImageReference) -> anyhow::Result<Vec<String>> {
        self.tags.clone().map_err(|e| anyhow::anyhow!(e))
    }
}

// ---------------------------------------------------------------------------
// FakeCertificationApi
// ---------------------------------------------------------------------------

/// Knows a fixed set of certified top layers.
#[derive(Debug, Clone)]
pub struct FakeCertificationApi {
    certified_layers: Option<Vec<String>>,
}

impl FakeCertificationApi {
    pub fn with_layers(layers: &[&str]) -> Self {
        Self {
            certified_layers: Some(layers.iter().map(|l| l.to_string()).collect()),
        }
    }

    /// Treats every layer as certified.
    pub fn accept_all() -> Self {
        Self {
            certified_layers: None,
        }
    }
}

#[async_trait]
impl CertificationApi for FakeCertificationApi {
    async fn certified_images_containing_layers(
        &self,
        layer_ids: &[String],
    ) -> anyhow::Result<Vec<CertifiedImage>> {
        Ok(layer_ids
            .iter()
            .filter(|layer| match &self.certified_layers {
                Some(known) => known.contains(layer),
                None => true,
            })
            .map(|layer| CertifiedImage {
                id: format!("image-{layer}"),
                uncompressed_top_layer_id: Some(layer.clone()),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// FakePackageInspector
// ---------------------------------------------------------------------------

/// Reports a fixed package list and modified-file list.
#[derive(Debug, Clone)]
pub struct FakePackageInspector {
    packages: Vec<String>,
    modified: Vec<ModifiedFile>,
}

impl FakePackageInspector {
    pub fn new(packages: &[&str], modified: Vec<ModifiedFile>) -> Self {
        Self {
            packages: packages.iter().map(|p| p.to_string()).collect(),
            modified,
        }
    }
}

#[async_trait]
impl PackageInspector for FakePackageInspector {
    async fn installed_packages(&self, _root: &Path) -> anyhow::Result<Vec<String>> {
        Ok(self.packages.clone())
    }

    async fn modified_files(&self, _root: &Path) -> anyhow::Result<Vec<ModifiedFile>> {
        Ok(self.modified.clone())
    }
}
