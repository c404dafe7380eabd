//! Check contract and the artifact checks run against.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::context::RunContext;
use crate::error::{PreflightError, Result};

/// Severity of a check within its policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckLevel {
    Best,
    Better,
    Good,
    Optional,
}

/// Descriptive metadata reported alongside a check outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckMetadata {
    pub description: String,
    pub level: CheckLevel,
    pub knowledge_base_url: String,
    pub check_url: String,
}

/// Remediation guidance shown when a check fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckHelp {
    pub message: String,
    pub suggestion: String,
}

/// A named compliance test.
///
/// `validate` returns `Ok(true)` for pass, `Ok(false)` for fail, and `Err`
/// when the check could not reach a verdict. None of these abort a run.
#[async_trait]
pub trait Check: Send + Sync {
    /// Unique name within a policy.
    fn name(&self) -> &str;

    /// Evaluate the check against the artifact.
    async fn validate(&self, ctx: &RunContext, image: &ImageUnderTest) -> anyhow::Result<bool>;

    fn metadata(&self) -> CheckMetadata;

    fn help(&self) -> CheckHelp;
}

/// OCI image configuration, reduced to what checks read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default)]
    pub config: ContainerConfig,
    #[serde(default)]
    pub rootfs: RootFs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(rename = "User", default)]
    pub user: Option<String>,
    #[serde(rename = "Labels", default)]
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFs {
    #[serde(default)]
    pub diff_ids: Vec<String>,
}

impl ImageConfig {
    pub fn user(&self) -> &str {
        self.config.user.as_deref().unwrap_or("")
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.config
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }

    /// Uncompressed layer digests, base layer first.
    pub fn layers(&self) -> &[String] {
        &self.rootfs.diff_ids
    }
}

/// An extracted container image or operator bundle.
#[derive(Debug, Clone)]
pub struct ImageUnderTest {
    /// Image reference as given by the user (`registry/repo:tag`).
    pub reference: String,
    /// Root of the extracted filesystem (bundle content for bundles).
    pub root: PathBuf,
    pub config: ImageConfig,
    pub is_bundle: bool,
}

impl ImageUnderTest {
    /// Load from an extraction directory.
    ///
    /// `config.json` is optional. The filesystem root is `<dir>/rootfs` when
    /// that directory exists, otherwise `dir` itself.
    pub fn load(reference: impl Into<String>, dir: &Path, is_bundle: bool) -> Result<Self> {
        let config_path = dir.join("config.json");
        let config = match std::fs::read(&config_path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                PreflightError::parse(format!("malformed image config {}", config_path.display()), e)
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ImageConfig::default(),
            Err(e) => {
                return Err(PreflightError::io(
                    format!("could not read {}", config_path.display()),
                    e,
                ))
            }
        };

        let rootfs = dir.join("rootfs");
        let root = if rootfs.is_dir() {
            rootfs
        } else {
            dir.to_path_buf()
        };

        Ok(Self {
            reference: reference.into(),
            root,
            config,
            is_bundle,
        })
    }
}
