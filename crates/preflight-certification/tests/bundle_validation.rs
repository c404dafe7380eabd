//! Bundle validation from an on-disk bundle through to the validator call.

use std::path::Path;

use preflight_certification::bundle::{annotations_path, supported_install_modes};
use preflight_certification::fakes::FakeOperatorSdk;
use preflight_certification::validate::K8S_VERSION_KEY;
use preflight_certification::{validate_bundle, ErrorKind, PreflightError, RunContext};

fn write_bundle(root: &Path, versions: &str) {
    std::fs::create_dir_all(root.join("metadata")).unwrap();
    std::fs::create_dir_all(root.join("manifests")).unwrap();
    std::fs::write(
        annotations_path(root),
        format!(
            "annotations:\n  operators.operatorframework.io.bundle.package.v1: etcd\n  com.redhat.openshift.versions: {versions}\n"
        ),
    )
    .unwrap();
    std::fs::write(
        root.join("manifests/etcd.v0.9.4.clusterserviceversion.yaml"),
        "kind: ClusterServiceVersion\nspec:\n  installModes:\n    - type: AllNamespaces\n      supported: true\n    - type: OwnNamespace\n      supported: false\n",
    )
    .unwrap();
}

#[tokio::test]
async fn test_ocp_410_bundle_gets_k8s_version() {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(dir.path(), "\"=4.10\"");
    let sdk = FakeOperatorSdk::default();

    let report = validate_bundle(&RunContext::background(), &sdk, dir.path())
        .await
        .unwrap();
    assert!(report.passed);

    let opts = sdk.last_validate_options().unwrap();
    assert_eq!(
        opts.optional_values.get(K8S_VERSION_KEY).map(String::as_str),
        Some("1.22")
    );
    assert_eq!(opts.selector, vec!["community", "operatorhub"]);
}

#[tokio::test]
async fn test_ocp_48_bundle_has_no_k8s_version() {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(dir.path(), "\"=4.8\"");
    let sdk = FakeOperatorSdk::default();

    validate_bundle(&RunContext::background(), &sdk, dir.path())
        .await
        .unwrap();
    let opts = sdk.last_validate_options().unwrap();
    assert!(!opts.optional_values.contains_key(K8S_VERSION_KEY));
}

#[tokio::test]
async fn test_range_bundle_gets_k8s_version() {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(dir.path(), "'v4.6-v4.9'");
    let sdk = FakeOperatorSdk::default();

    validate_bundle(&RunContext::background(), &sdk, dir.path())
        .await
        .unwrap();
    let opts = sdk.last_validate_options().unwrap();
    assert!(opts.optional_values.contains_key(K8S_VERSION_KEY));
}

#[tokio::test]
async fn test_missing_annotations_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let sdk = FakeOperatorSdk::default();

    let err = validate_bundle(&RunContext::background(), &sdk, dir.path())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(sdk.last_validate_options().is_none());
}

#[tokio::test]
async fn test_empty_annotations_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("metadata")).unwrap();
    std::fs::write(annotations_path(dir.path()), "").unwrap();

    let err = validate_bundle(&RunContext::background(), &FakeOperatorSdk::default(), dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, PreflightError::EmptyAnnotations));
}

#[tokio::test]
async fn test_cancelled_context_skips_validator() {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(dir.path(), "\"=4.10\"");
    let sdk = FakeOperatorSdk::default();
    let (ctx, handle) = RunContext::with_cancel();
    handle.cancel();

    let err = validate_bundle(&ctx, &sdk, dir.path()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(sdk.last_validate_options().is_none());
}

#[test]
fn test_install_modes_from_bundle() {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(dir.path(), "\"=4.10\"");

    let modes = supported_install_modes(dir.path()).unwrap();
    assert_eq!(modes.len(), 1);
    assert_eq!(modes.get("AllNamespaces"), Some(&true));
}
