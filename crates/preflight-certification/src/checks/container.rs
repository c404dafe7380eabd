//! Checks of the container, root and scratch policies.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::check::{Check, CheckHelp, CheckLevel, CheckMetadata, ImageUnderTest};
use crate::checks::{help, metadata};
use crate::context::RunContext;
use crate::policy::CheckId;
use crate::pyxis::CertificationApi;
use crate::registry::{ImageReference, RegistryClient};
use crate::rpm::PackageInspector;

/// Maximum number of layers a certified image may have.
pub const MAX_LAYERS: usize = 40;

/// Labels every certified image must carry.
pub const REQUIRED_LABELS: [&str; 6] = [
    "name",
    "vendor",
    "version",
    "release",
    "summary",
    "description",
];

/// Packages that must not be installed; entries ending in `*` are prefixes.
pub const PROHIBITED_PACKAGES: &[&str] = &[
    "grub",
    "grub2",
    "kernel",
    "kernel-core",
    "kernel-debug",
    "kernel-debug-core",
    "kernel-debug-modules",
    "kernel-debug-modules-extra",
    "kernel-debug-devel",
    "kernel-devel",
    "kernel-doc",
    "kernel-modules",
    "kernel-modules-extra",
    "kernel-tools",
    "kernel-tools-libs",
    "kmod-kvdo",
    "kpatch*",
    "linux-firmware",
];

pub fn is_prohibited(package: &str) -> bool {
    PROHIBITED_PACKAGES.iter().any(|entry| match entry.strip_suffix('*') {
        Some(prefix) => package.starts_with(prefix),
        None => package == *entry,
    })
}

// ---------------------------------------------------------------------------
// has-license
// ---------------------------------------------------------------------------

pub struct HasLicenseCheck;

pub fn has_license() -> Box<dyn Check> {
    Box::new(HasLicenseCheck)
}

fn has_any_file(dir: &Path) -> anyhow::Result<bool> {
    match std::fs::read_dir(dir) {
        Ok(entries) => {
            for entry in entries {
                if entry?.file_type()?.is_file() {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Check for HasLicenseCheck {
    fn name(&self) -> &str {
        CheckId::HasLicense.name()
    }

    async fn validate(&self, _ctx: &RunContext, image: &ImageUnderTest) -> anyhow::Result<bool> {
        let licenses = image.root.join("licenses");
        let found = has_any_file(&licenses)?;
        debug!(dir = %licenses.display(), found, "license directory inspected");
        Ok(found)
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Checking if terms and conditions applicable to the software including open source licensing information are present.",
            CheckLevel::Best,
        )
    }

    fn help(&self) -> CheckHelp {
        help(
            "Check HasLicense encountered an error. Please review the preflight.log file for more information.",
            "Create a directory named /licenses and include all relevant licensing and/or terms and conditions as text file(s) in that directory.",
        )
    }
}

// ---------------------------------------------------------------------------
// has-unique-tag
// ---------------------------------------------------------------------------

pub struct HasUniqueTagCheck {
    registry: Arc<dyn RegistryClient>,
}

pub fn has_unique_tag(registry: Arc<dyn RegistryClient>) -> Box<dyn Check> {
    Box::new(HasUniqueTagCheck { registry })
}

#[async_trait]
impl Check for HasUniqueTagCheck {
    fn name(&self) -> &str {
        CheckId::HasUniqueTag.name()
    }

    async fn validate(&self, _ctx: &RunContext, image: &ImageUnderTest) -> anyhow::Result<bool> {
        let reference = ImageReference::parse(&image.reference)?;
        let tags = self.registry.list_tags(&reference).await?;
        debug!(repository = %reference.repository, ?tags, "repository tags");
        Ok(tags.iter().any(|tag| tag != "latest"))
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Checking if container has a tag other than 'latest', so that the image can be uniquely identified.",
            CheckLevel::Best,
        )
    }

    fn help(&self) -> CheckHelp {
        help(
            "Check HasUniqueTag encountered an error. Please review the preflight.log file for more information.",
            "Add a tag to your image. Consider using Semantic Versioning. https://semver.org/",
        )
    }
}

// ---------------------------------------------------------------------------
// max-layers
// ---------------------------------------------------------------------------

pub struct MaxLayersCheck;

pub fn max_layers() -> Box<dyn Check> {
    Box::new(MaxLayersCheck)
}

#[async_trait]
impl Check for MaxLayersCheck {
    fn name(&self) -> &str {
        CheckId::MaxLayers.name()
    }

    async fn validate(&self, _ctx: &RunContext, image: &ImageUnderTest) -> anyhow::Result<bool> {
        let count = image.config.layers().len();
        debug!(layers = count, max = MAX_LAYERS, "layer count");
        Ok(count <= MAX_LAYERS)
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Checking if container has less than 40 layers.  Too many layers within the container images can degrade container performance.",
            CheckLevel::Better,
        )
    }

    fn help(&self) -> CheckHelp {
        help(
            "Check MaxLayers encountered an error. Please review the preflight.log file for more information.",
            "Optimize your Dockerfile to consolidate and minimize the number of layers. Each RUN command will produce a new layer. Try combining RUN commands using && where possible.",
        )
    }
}

// ---------------------------------------------------------------------------
// has-no-prohibited-packages
// ---------------------------------------------------------------------------

pub struct HasNoProhibitedPackagesCheck {
    packages: Arc<dyn PackageInspector>,
}

pub fn has_no_prohibited_packages(packages: Arc<dyn PackageInspector>) -> Box<dyn Check> {
    Box::new(HasNoProhibitedPackagesCheck { packages })
}

#[async_trait]
impl Check for HasNoProhibitedPackagesCheck {
    fn name(&self) -> &str {
        CheckId::HasNoProhibitedPackages.name()
    }

    async fn validate(&self, _ctx: &RunContext, image: &ImageUnderTest) -> anyhow::Result<bool> {
        let installed = self.packages.installed_packages(&image.root).await?;
        let prohibited: Vec<&String> = installed.iter().filter(|p| is_prohibited(p)).collect();
        if !prohibited.is_empty() {
            warn!(?prohibited, "found prohibited packages");
        }
        Ok(prohibited.is_empty())
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Checks to ensure that the image in use does not include prohibited packages, such as Red Hat Enterprise Linux (RHEL) kernel packages.",
            CheckLevel::Best,
        )
    }

    fn help(&self) -> CheckHelp {
        help(
            "Check HasNoProhibitedPackages encountered an error. Please review the preflight.log file for more information.",
            "Remove any RHEL packages that are not distributable outside of UBI",
        )
    }
}

// ---------------------------------------------------------------------------
// has-required-labels
// ---------------------------------------------------------------------------

pub struct HasRequiredLabelsCheck;

pub fn has_required_labels() -> Box<dyn Check> {
    Box::new(HasRequiredLabelsCheck)
}

#[async_trait]
impl Check for HasRequiredLabelsCheck {
    fn name(&self) -> &str {
        CheckId::HasRequiredLabels.name()
    }

    async fn validate(&self, _ctx: &RunContext, image: &ImageUnderTest) -> anyhow::Result<bool> {
        let missing: Vec<&str> = REQUIRED_LABELS
            .iter()
            .copied()
            .filter(|label| image.config.label(label).map_or(true, str::is_empty))
            .collect();
        if !missing.is_empty() {
            info!(?missing, "expected labels are missing");
        }
        Ok(missing.is_empty())
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Checking if the required labels (name, vendor, version, release, summary, description) are present in the container metadata.",
            CheckLevel::Good,
        )
    }

    fn help(&self) -> CheckHelp {
        help(
            "Check HasRequiredLabels encountered an error. Please review the preflight.log file for more information.",
            "Add the following labels to your Dockerfile or Containerfile: name, vendor, version, release, summary, description",
        )
    }
}

// ---------------------------------------------------------------------------
// run-as-non-root
// ---------------------------------------------------------------------------

pub struct RunAsNonRootCheck;

pub fn run_as_non_root() -> Box<dyn Check> {
    Box::new(RunAsNonRootCheck)
}

/// Whether a `User` config value names a non-root identity.
pub fn is_non_root_user(user: &str) -> bool {
    let name = user.split(':').next().unwrap_or("").trim();
    if name.is_empty() || name == "root" {
        return false;
    }
    match name.parse::<u64>() {
        Ok(uid) => uid != 0,
        Err(_) => true,
    }
}

#[async_trait]
impl Check for RunAsNonRootCheck {
    fn name(&self) -> &str {
        CheckId::RunAsNonRoot.name()
    }

    async fn validate(&self, _ctx: &RunContext, image: &ImageUnderTest) -> anyhow::Result<bool> {
        let user = image.config.user();
        let non_root = is_non_root_user(user);
        if !non_root {
            info!(user, "image runs as root or does not set a user");
        }
        Ok(non_root)
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Checking if container runs as the root user because a container that does not specify a non-root user will fail the automatic certification, and will be subject to a manual review before the container can be approved for publication",
            CheckLevel::Best,
        )
    }

    fn help(&self) -> CheckHelp {
        help(
            "Check RunAsNonRoot encountered an error. Please review the preflight.log file for more information.",
            "Indicate a specific USER in the dockerfile or containerfile",
        )
    }
}

// ---------------------------------------------------------------------------
// has-modified-files
// ---------------------------------------------------------------------------

pub struct HasModifiedFilesCheck {
    packages: Arc<dyn PackageInspector>,
}

pub fn has_modified_files(packages: Arc<dyn PackageInspector>) -> Box<dyn Check> {
    Box::new(HasModifiedFilesCheck { packages })
}

#[async_trait]
impl Check for HasModifiedFilesCheck {
    fn name(&self) -> &str {
        CheckId::HasModifiedFiles.name()
    }

    async fn validate(&self, _ctx: &RunContext, image: &ImageUnderTest) -> anyhow::Result<bool> {
        let modified = self.packages.modified_files(&image.root).await?;
        let offending: Vec<&str> = modified
            .iter()
            .filter(|f| !f.is_config && f.content_changed())
            .map(|f| f.path.as_str())
            .collect();
        if !offending.is_empty() {
            warn!(files = ?offending, "package-owned files were modified");
        }
        Ok(offending.is_empty())
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Checks that no files installed via RPM in the base Red Hat layer have been modified",
            CheckLevel::Best,
        )
    }

    fn help(&self) -> CheckHelp {
        help(
            "Check HasModifiedFiles encountered an error. Please review the preflight.log file for more information.",
            "Do not modify any files installed by RPM in the base Red Hat layer",
        )
    }
}

// ---------------------------------------------------------------------------
// based-on-ubi
// ---------------------------------------------------------------------------

pub struct BasedOnUbiCheck {
    api: Arc<dyn CertificationApi>,
}

pub fn based_on_ubi(api: Arc<dyn CertificationApi>) -> Box<dyn Check> {
    Box::new(BasedOnUbiCheck { api })
}

#[async_trait]
impl Check for BasedOnUbiCheck {
    fn name(&self) -> &str {
        CheckId::BasedOnUbi.name()
    }

    async fn validate(&self, _ctx: &RunContext, image: &ImageUnderTest) -> anyhow::Result<bool> {
        let layers = image.config.layers();
        if layers.is_empty() {
            warn!("image config lists no layers; cannot determine base image");
            return Ok(false);
        }
        let certified = self.api.certified_images_containing_layers(layers).await?;
        debug!(matches = certified.len(), "certified images sharing a layer");
        Ok(!certified.is_empty())
    }

    fn metadata(&self) -> CheckMetadata {
        metadata(
            "Checking if the container's base image is based upon the Red Hat Universal Base Image (UBI)",
            CheckLevel::Best,
        )
    }

    fn help(&self) -> CheckHelp {
        help(
            "Check BasedOnUbi encountered an error. Please review the preflight.log file for more information.",
            "Change the FROM directive in your Dockerfile or Containerfile to FROM registry.access.redhat.com/ubi8/ubi",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{ContainerConfig, ImageConfig, RootFs};
    use crate::fakes::{FakeCertificationApi, FakePackageInspector, FakeRegistry};
    use crate::rpm::ModifiedFile;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn image_with(root: &Path, config: ImageConfig) -> ImageUnderTest {
        ImageUnderTest {
            reference: "quay.io/ns/app:1.0".to_string(),
            root: root.to_path_buf(),
            config,
            is_bundle: false,
        }
    }

    fn config_with_user(user: &str) -> ImageConfig {
        ImageConfig {
            config: ContainerConfig {
                user: Some(user.to_string()),
                labels: None,
            },
            rootfs: RootFs::default(),
        }
    }

    #[tokio::test]
    async fn test_has_license() {
        let dir = tempdir().unwrap();
        let ctx = RunContext::background();
        let image = image_with(dir.path(), ImageConfig::default());
        assert!(!has_license().validate(&ctx, &image).await.unwrap());

        std::fs::create_dir(dir.path().join("licenses")).unwrap();
        assert!(!has_license().validate(&ctx, &image).await.unwrap());

        std::fs::write(dir.path().join("licenses/LICENSE"), "Apache-2.0").unwrap();
        assert!(has_license().validate(&ctx, &image).await.unwrap());
    }

    #[tokio::test]
    async fn test_has_unique_tag() {
        let dir = tempdir().unwrap();
        let ctx = RunContext::background();
        let image = image_with(dir.path(), ImageConfig::default());

        let only_latest = has_unique_tag(Arc::new(FakeRegistry::with_tags(&["latest"])));
        assert!(!only_latest.validate(&ctx, &image).await.unwrap());

        let versioned = has_unique_tag(Arc::new(FakeRegistry::with_tags(&["latest", "1.0"])));
        assert!(versioned.validate(&ctx, &image).await.unwrap());

        let failing = has_unique_tag(Arc::new(FakeRegistry::failing("unauthorized")));
        assert!(failing.validate(&ctx, &image).await.is_err());
    }

    #[tokio::test]
    async fn test_max_layers() {
        let dir = tempdir().unwrap();
        let ctx = RunContext::background();
        let mut config = ImageConfig::default();
        config.rootfs.diff_ids = (0..MAX_LAYERS).map(|i| format!("sha256:{i}")).collect();
        assert!(max_layers()
            .validate(&ctx, &image_with(dir.path(), config.clone()))
            .await
            .unwrap());

        config.rootfs.diff_ids.push("sha256:extra".to_string());
        assert!(!max_layers()
            .validate(&ctx, &image_with(dir.path(), config))
            .await
            .unwrap());
    }

    #[test]
    fn test_prohibited_packages() {
        assert!(is_prohibited("kernel-core"));
        assert!(is_prohibited("kpatch-patch-4_18_0"));
        assert!(is_prohibited("grub2"));
        assert!(!is_prohibited("kernel-headers"));
        assert!(!is_prohibited("bash"));
    }

    #[tokio::test]
    async fn test_has_no_prohibited_packages() {
        let dir = tempdir().unwrap();
        let ctx = RunContext::background();
        let image = image_with(dir.path(), ImageConfig::default());

        let clean = has_no_prohibited_packages(Arc::new(FakePackageInspector::new(
            &["bash", "glibc"],
            vec![],
        )));
        assert!(clean.validate(&ctx, &image).await.unwrap());

        let dirty = has_no_prohibited_packages(Arc::new(FakePackageInspector::new(
            &["bash", "kernel"],
            vec![],
        )));
        assert!(!dirty.validate(&ctx, &image).await.unwrap());
    }

    #[tokio::test]
    async fn test_has_required_labels() {
        let dir = tempdir().unwrap();
        let ctx = RunContext::background();
        let mut labels: BTreeMap<String, String> = REQUIRED_LABELS
            .iter()
            .map(|l| (l.to_string(), "value".to_string()))
            .collect();
        let mut config = ImageConfig::default();
        config.config.labels = Some(labels.clone());
        assert!(has_required_labels()
            .validate(&ctx, &image_with(dir.path(), config.clone()))
            .await
            .unwrap());

        labels.insert("vendor".to_string(), String::new());
        config.config.labels = Some(labels);
        assert!(!has_required_labels()
            .validate(&ctx, &image_with(dir.path(), config))
            .await
            .unwrap());
    }

    #[test]
    fn test_non_root_user() {
        assert!(is_non_root_user("1001"));
        assert!(is_non_root_user("app"));
        assert!(is_non_root_user("1001:0"));
        assert!(!is_non_root_user(""));
        assert!(!is_non_root_user("root"));
        assert!(!is_non_root_user("0"));
        assert!(!is_non_root_user("0:0"));
        assert!(!is_non_root_user("root:root"));
    }

    #[tokio::test]
    async fn test_run_as_non_root() {
        let dir = tempdir().unwrap();
        let ctx = RunContext::background();
        assert!(run_as_non_root()
            .validate(&ctx, &image_with(dir.path(), config_with_user("1001")))
            .await
            .unwrap());
        assert!(!run_as_non_root()
            .validate(&ctx, &image_with(dir.path(), ImageConfig::default()))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_has_modified_files_ignores_config_files() {
        let dir = tempdir().unwrap();
        let ctx = RunContext::background();
        let image = image_with(dir.path(), ImageConfig::default());

        let config_only = has_modified_files(Arc::new(FakePackageInspector::new(
            &[],
            vec![ModifiedFile {
                path: "/etc/yum.conf".to_string(),
                flags: "S.5....T.".to_string(),
                is_config: true,
            }],
        )));
        assert!(config_only.validate(&ctx, &image).await.unwrap());

        let binary = has_modified_files(Arc::new(FakePackageInspector::new(
            &[],
            vec![ModifiedFile {
                path: "/usr/bin/ls".to_string(),
                flags: "S.5....T.".to_string(),
                is_config: false,
            }],
        )));
        assert!(!binary.validate(&ctx, &image).await.unwrap());
    }

    #[tokio::test]
    async fn test_based_on_ubi() {
        let dir = tempdir().unwrap();
        let ctx = RunContext::background();
        let mut config = ImageConfig::default();
        config.rootfs.diff_ids = vec!["sha256:ubi".to_string(), "sha256:app".to_string()];
        let image = image_with(dir.path(), config);

        let api = Arc::new(FakeCertificationApi::with_layers(&["sha256:ubi"]));
        assert!(based_on_ubi(api.clone()).validate(&ctx, &image).await.unwrap());

        let unknown = Arc::new(FakeCertificationApi::with_layers(&["sha256:other"]));
        assert!(!based_on_ubi(unknown).validate(&ctx, &image).await.unwrap());

        let no_layers = image_with(dir.path(), ImageConfig::default());
        assert!(!based_on_ubi(api).validate(&ctx, &no_layers).await.unwrap());
    }
}
