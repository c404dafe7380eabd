//! Run configuration: defaults, optional YAML file, `PFLT_` environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{PreflightError, Result};
use crate::policy::Policy;
use crate::pyxis::DEFAULT_PYXIS_HOST;

pub const ENV_PREFIX: &str = "PFLT_";
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";
pub const DEFAULT_SCORECARD_WAIT_TIME_SECS: u64 = 240;
pub const DEFAULT_LOG_FILE: &str = "preflight.log";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
pub const DEFAULT_RESPONSE_FORMAT: &str = "json";

/// Configuration for one certification run. Immutable once handed to the
/// engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CertificationConfig {
    pub image: String,
    pub policy: String,
    pub namespace: String,
    #[serde(alias = "serviceaccount")]
    pub service_account: String,
    pub kubeconfig: Option<String>,
    pub scorecard_wait_time: u64,
    #[serde(alias = "indeximage")]
    pub index_image: Option<String>,
    #[serde(alias = "dockerconfig")]
    pub docker_config: Option<PathBuf>,
    pub pyxis_host: String,
    pub pyxis_api_token: String,
    #[serde(alias = "artifacts")]
    pub artifacts_dir: PathBuf,
    #[serde(alias = "logfile")]
    pub log_file: PathBuf,
    #[serde(alias = "loglevel")]
    pub log_level: String,
    pub response_format: String,
}

impl Default for CertificationConfig {
    fn default() -> Self {
        Self {
            image: String::new(),
            policy: String::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            service_account: DEFAULT_SERVICE_ACCOUNT.to_string(),
            kubeconfig: None,
            scorecard_wait_time: DEFAULT_SCORECARD_WAIT_TIME_SECS,
            index_image: None,
            docker_config: None,
            pyxis_host: DEFAULT_PYXIS_HOST.to_string(),
            pyxis_api_token: String::new(),
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            response_format: DEFAULT_RESPONSE_FORMAT.to_string(),
        }
    }
}

impl CertificationConfig {
    /// Defaults, overlaid by a config file, overlaid by `PFLT_*` variables.
    ///
    /// With `file == None`, `config.yaml` in the working directory is used
    /// if present. An explicitly named file must exist.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!("config file not found, proceeding without it");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PreflightError::io(format!("could not read config file {}", path.display()), e)
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| PreflightError::parse("malformed config file", e))
    }

    /// Overlay values from `PFLT_*` variables resolved through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("NAMESPACE") {
            self.namespace = v;
        }
        if let Some(v) = var("SERVICEACCOUNT") {
            self.service_account = v;
        }
        if let Some(v) = var("KUBECONFIG") {
            self.kubeconfig = Some(v);
        }
        if let Some(v) = var("SCORECARD_WAIT_TIME") {
            self.scorecard_wait_time = v.trim().parse().map_err(|_| {
                PreflightError::Config(format!("{ENV_PREFIX}SCORECARD_WAIT_TIME must be seconds, got {v:?}"))
            })?;
        }
        if let Some(v) = var("INDEXIMAGE") {
            self.index_image = Some(v);
        }
        if let Some(v) = var("DOCKERCONFIG") {
            self.docker_config = Some(PathBuf::from(v));
        }
        if let Some(v) = var("PYXIS_HOST") {
            self.pyxis_host = v;
        }
        if let Some(v) = var("PYXIS_API_TOKEN") {
            self.pyxis_api_token = v;
        }
        if let Some(v) = var("ARTIFACTS") {
            self.artifacts_dir = PathBuf::from(v);
        }
        if let Some(v) = var("LOGFILE") {
            self.log_file = PathBuf::from(v);
        }
        if let Some(v) = var("LOGLEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    /// Whether the configured policy certifies an operator bundle rather
    /// than a container image.
    pub fn is_bundle(&self) -> bool {
        self.policy == Policy::Operator.as_str()
    }

    pub fn scorecard_wait_time(&self) -> Duration {
        Duration::from_secs(self.scorecard_wait_time)
    }
}
