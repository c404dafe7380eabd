//! Operator bundle metadata: annotations, CSV location, install modes.
//!
//! Bundle layout:
//!
//! ```text
//! <bundle>/metadata/annotations.yaml
//! <bundle>/manifests/<name>.clusterserviceversion.yaml
//! ```

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::error::{PreflightError, Result};

/// Annotation carrying the supported OpenShift version range.
pub const VERSIONS_ANNOTATION: &str = "com.redhat.openshift.versions";

/// Annotation carrying the bundle's package name.
pub const PACKAGE_ANNOTATION: &str = "operators.operatorframework.io.bundle.package.v1";

const CSV_SUFFIX: &str = ".clusterserviceversion.yaml";

/// Bundle annotations, key → value.
pub type Annotations = BTreeMap<String, String>;

/// Path of the annotations file inside an extracted bundle.
pub fn annotations_path(bundle_dir: &Path) -> PathBuf {
    bundle_dir.join("metadata").join("annotations.yaml")
}

#[derive(Debug, Deserialize)]
struct BundleMetadata {
    #[serde(default, alias = "Annotations")]
    annotations: Option<Annotations>,
}

/// Read and parse an annotations file.
pub fn read_annotations(path: &Path) -> Result<Annotations> {
    trace!("reading annotations file from the bundle");
    let mut file = std::fs::File::open(path).map_err(|e| {
        PreflightError::io(format!("could not open {}", path.display()), e)
    })?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents).map_err(|e| {
        PreflightError::io(
            "fail to read metadata/annotation.yaml file in bundle",
            e,
        )
    })?;
    extract_annotations(&contents)
}

/// Parse annotations from raw YAML bytes.
///
/// Plain scalars keep their spelling (`4.10` stays `4.10`); nested values
/// are rejected.
pub fn extract_annotations(bytes: &[u8]) -> Result<Annotations> {
    if bytes.is_empty() {
        return Err(PreflightError::EmptyAnnotations);
    }

    let metadata: BundleMetadata = serde_yaml::from_slice(bytes).map_err(|e| {
        PreflightError::parse("metadata/annotations.yaml found but is malformed", e)
    })?;
    Ok(metadata.annotations.unwrap_or_default())
}

/// Find the single `manifests/*.clusterserviceversion.yaml` in a bundle.
pub fn locate_csv(bundle_dir: &Path) -> Result<PathBuf> {
    trace!("reading clusterserviceversion file from the bundle");
    debug!(dir = %bundle_dir.display(), "mounted directory");

    let manifests = bundle_dir.join("manifests");
    let mut matches = Vec::new();
    match std::fs::read_dir(&manifests) {
        Ok(entries) => {
            for entry in entries {
                let entry = entry.map_err(|e| {
                    PreflightError::io(format!("could not list {}", manifests.display()), e)
                })?;
                if entry.file_name().to_string_lossy().ends_with(CSV_SUFFIX) {
                    matches.push(entry.path());
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(PreflightError::io(
                format!("could not list {}", manifests.display()),
                e,
            ))
        }
    }

    match matches.len() {
        0 => Err(PreflightError::CsvNotFound {
            dir: bundle_dir.to_path_buf(),
        }),
        1 => {
            let path = matches.remove(0);
            debug!(path = %path.display(), "located csv file");
            Ok(path)
        }
        count => Err(PreflightError::AmbiguousCsv {
            dir: bundle_dir.to_path_buf(),
            count,
        }),
    }
}

/// The parts of a ClusterServiceVersion this crate reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterServiceVersion {
    #[serde(default, deserialize_with = "null_as_default")]
    pub spec: ClusterServiceVersionSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterServiceVersionSpec {
    #[serde(default, rename = "installModes", deserialize_with = "null_as_default")]
    pub install_modes: Vec<InstallMode>,
}

// `key:` with no value is YAML null.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct InstallMode {
    #[serde(rename = "type")]
    pub mode_type: String,
    #[serde(default)]
    pub supported: bool,
}

/// Supported install modes of a CSV.
///
/// Only modes with `supported: true` appear; a missing key means the mode
/// is not supported.
pub fn extract_install_modes(csv_bytes: &[u8]) -> Result<BTreeMap<String, bool>> {
    let csv: ClusterServiceVersion = serde_yaml::from_slice(csv_bytes)
        .map_err(|e| PreflightError::parse("malformed CSV detected", e))?;

    Ok(csv
        .spec
        .install_modes
        .into_iter()
        .filter(|mode| mode.supported)
        .map(|mode| (mode.mode_type, true))
        .collect())
}

/// Locate the bundle's CSV and return its supported install modes.
pub fn supported_install_modes(bundle_dir: &Path) -> Result<BTreeMap<String, bool>> {
    let csv_path = locate_csv(bundle_dir)?;
    let bytes = std::fs::read(&csv_path).map_err(|e| {
        PreflightError::io(format!("could not read CSV {}", csv_path.display()), e)
    })?;
    extract_install_modes(&bytes)
}
