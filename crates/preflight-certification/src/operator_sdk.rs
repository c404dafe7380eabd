//! operator-sdk collaborator: bundle validation, scorecard, OLM deployment.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::exec::run_command;

/// Options for `operator-sdk bundle validate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BundleValidateOptions {
    pub selector: Vec<String>,
    pub verbose: bool,
    pub container_engine: String,
    pub output_format: String,
    pub optional_values: BTreeMap<String, String>,
}

/// One diagnostic emitted by the bundle validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorOutput {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// `json-alpha1` bundle validation report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleValidateReport {
    pub passed: bool,
    #[serde(default)]
    pub outputs: Vec<ValidatorOutput>,
}

impl BundleValidateReport {
    pub fn errors(&self) -> impl Iterator<Item = &ValidatorOutput> {
        self.outputs.iter().filter(|o| o.kind == "error")
    }
}

/// Options for `operator-sdk scorecard`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScorecardOptions {
    pub selector: String,
    pub namespace: String,
    pub service_account: String,
    pub kubeconfig: Option<String>,
    pub wait_time: Duration,
}

/// `operator-sdk scorecard --output json` (v1alpha3 TestList).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScorecardReport {
    #[serde(default)]
    pub items: Vec<ScorecardTest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScorecardTest {
    #[serde(default)]
    pub status: ScorecardTestStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScorecardTestStatus {
    #[serde(default)]
    pub results: Vec<ScorecardResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScorecardResult {
    pub name: String,
    pub state: String,
    #[serde(default)]
    pub log: String,
}

impl ScorecardReport {
    /// Results whose state is anything other than `pass`.
    pub fn non_passing(&self) -> impl Iterator<Item = &ScorecardResult> {
        self.items
            .iter()
            .flat_map(|item| item.status.results.iter())
            .filter(|r| r.state != "pass")
    }
}

/// Options for `operator-sdk run bundle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunBundleOptions {
    pub namespace: String,
    pub install_mode: String,
    pub index_image: Option<String>,
    pub service_account: String,
    pub kubeconfig: Option<String>,
    pub timeout: Duration,
}

/// Outcome of an operator-sdk command that reports only success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub succeeded: bool,
    pub stdout: String,
    pub stderr: String,
}

/// The operator-sdk engine the operator policy's checks delegate to.
#[async_trait]
pub trait OperatorSdk: Send + Sync {
    async fn bundle_validate(
        &self,
        image_path: &Path,
        opts: &BundleValidateOptions,
    ) -> anyhow::Result<BundleValidateReport>;

    async fn scorecard(&self, image: &str, opts: &ScorecardOptions)
        -> anyhow::Result<ScorecardReport>;

    async fn run_bundle(&self, image: &str, opts: &RunBundleOptions)
        -> anyhow::Result<CommandReport>;

    async fn cleanup(
        &self,
        package: &str,
        namespace: &str,
        kubeconfig: Option<&str>,
    ) -> anyhow::Result<()>;
}

/// [`OperatorSdk`] backed by the `operator-sdk` binary.
#[derive(Debug, Clone)]
pub struct OperatorSdkCli {
    binary: String,
    timeout: Duration,
}

impl Default for OperatorSdkCli {
    fn default() -> Self {
        Self::new("operator-sdk")
    }
}

impl OperatorSdkCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: Duration::from_secs(600),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub(crate) fn bundle_validate_args(image_path: &Path, opts: &BundleValidateOptions) -> Vec<String> {
    let mut args = vec![
        "bundle".to_string(),
        "validate".to_string(),
        image_path.to_string_lossy().to_string(),
    ];
    if !opts.container_engine.is_empty() {
        args.push("--image-builder".to_string());
        args.push(opts.container_engine.clone());
    }
    for selector in &opts.selector {
        args.push("--select-optional".to_string());
        args.push(format!("name={selector}"));
    }
    for (key, value) in &opts.optional_values {
        args.push(format!("--optional-values={key}={value}"));
    }
    if opts.verbose {
        args.push("--verbose".to_string());
    }
    if !opts.output_format.is_empty() {
        args.push("--output".to_string());
        args.push(opts.output_format.clone());
    }
    args
}

fn kubeconfig_args(args: &mut Vec<String>, kubeconfig: Option<&str>) {
    if let Some(path) = kubeconfig {
        args.push("--kubeconfig".to_string());
        args.push(path.to_string());
    }
}

#[async_trait]
impl OperatorSdk for OperatorSdkCli {
    async fn bundle_validate(
        &self,
        image_path: &Path,
        opts: &BundleValidateOptions,
    ) -> anyhow::Result<BundleValidateReport> {
        let args = bundle_validate_args(image_path, opts);
        let output = run_command(&self.binary, &args, self.timeout).await?;
        debug!(exit_code = output.exit_code, "operator-sdk bundle validate finished");

        // A failed validation still prints the report and exits non-zero.
        serde_json::from_str(&output.stdout).map_err(|e| {
            anyhow::anyhow!(
                "unable to parse bundle validate output: {}; stderr: {}",
                e,
                output.stderr.trim()
            )
        })
    }

    async fn scorecard(
        &self,
        image: &str,
        opts: &ScorecardOptions,
    ) -> anyhow::Result<ScorecardReport> {
        let mut args = vec![
            "scorecard".to_string(),
            image.to_string(),
            format!("--selector={}", opts.selector),
            "--namespace".to_string(),
            opts.namespace.clone(),
            "--service-account".to_string(),
            opts.service_account.clone(),
            format!("--wait-time={}s", opts.wait_time.as_secs()),
            "--output".to_string(),
            "json".to_string(),
        ];
        kubeconfig_args(&mut args, opts.kubeconfig.as_deref());

        let timeout = opts.wait_time + Duration::from_secs(30);
        let output = run_command(&self.binary, &args, timeout).await?;
        serde_json::from_str(&output.stdout).map_err(|e| {
            anyhow::anyhow!(
                "unable to parse scorecard output: {}; stderr: {}",
                e,
                output.stderr.trim()
            )
        })
    }

    async fn run_bundle(
        &self,
        image: &str,
        opts: &RunBundleOptions,
    ) -> anyhow::Result<CommandReport> {
        let mut args = vec![
            "run".to_string(),
            "bundle".to_string(),
            image.to_string(),
            "--namespace".to_string(),
            opts.namespace.clone(),
            "--install-mode".to_string(),
            opts.install_mode.clone(),
            "--service-account".to_string(),
            opts.service_account.clone(),
            format!("--timeout={}s", opts.timeout.as_secs()),
        ];
        if let Some(index) = &opts.index_image {
            args.push("--index-image".to_string());
            args.push(index.clone());
        }
        kubeconfig_args(&mut args, opts.kubeconfig.as_deref());

        let output = run_command(&self.binary, &args, opts.timeout + Duration::from_secs(30)).await?;
        Ok(CommandReport {
            succeeded: output.success(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn cleanup(
        &self,
        package: &str,
        namespace: &str,
        kubeconfig: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut args = vec![
            "cleanup".to_string(),
            package.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
        ];
        kubeconfig_args(&mut args, kubeconfig);

        let output = run_command(&self.binary, &args, self.timeout).await?;
        if !output.success() {
            warn!(package, stderr = %output.stderr.trim(), "operator-sdk cleanup failed");
            anyhow::bail!("operator-sdk cleanup exited with code {}", output.exit_code);
        }
        Ok(())
    }
}
