//! End-to-end engine runs against extracted images on disk, with in-memory
//! collaborators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use preflight_certification::fakes::{self, FakeRegistry};
use preflight_certification::{
    CancelHandle, CertificationConfig, Check, CheckEngine, CheckFactory, CheckHelp, CheckId,
    CheckLevel, CheckMetadata, CheckStatus, ErrorKind, ImageUnderTest, PolicyEngine,
    PreflightError, RunContext,
};
use tempfile::TempDir;

const CONFIG_JSON: &str = r#"{
  "config": {
    "User": "1001",
    "Labels": {
      "name": "app",
      "vendor": "Example",
      "version": "1.0",
      "release": "1",
      "summary": "An app",
      "description": "An example application"
    }
  },
  "rootfs": { "diff_ids": ["sha256:ubi", "sha256:app"] }
}"#;

fn extracted_image() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.json"), CONFIG_JSON).unwrap();
    std::fs::create_dir_all(dir.path().join("rootfs/licenses")).unwrap();
    std::fs::write(dir.path().join("rootfs/licenses/LICENSE"), "Apache-2.0").unwrap();
    dir
}

fn config(policy: &str) -> CertificationConfig {
    CertificationConfig {
        image: "quay.io/example/app:1.0".to_string(),
        policy: policy.to_string(),
        ..CertificationConfig::default()
    }
}

#[tokio::test]
async fn test_container_policy_passes_with_compliant_image() {
    let dir = extracted_image();
    let config = config("container");
    let image = ImageUnderTest::load(&config.image, dir.path(), false).unwrap();

    let mut engine = PolicyEngine::for_config(&config, image, fakes::collaborators());
    engine.execute_checks(&RunContext::background()).await.unwrap();

    let results = engine.results();
    assert_eq!(
        results.names(),
        vec![
            "has-license",
            "has-unique-tag",
            "max-layers",
            "has-no-prohibited-packages",
            "has-required-labels",
            "run-as-non-root",
            "has-modified-files",
            "based-on-ubi",
        ]
    );
    assert!(results.passed_overall(), "{:?}", results.entries());
}

#[tokio::test]
async fn test_errored_check_does_not_abort_run() {
    let dir = extracted_image();
    let config = config("root");
    let image = ImageUnderTest::load(&config.image, dir.path(), false).unwrap();

    let mut collaborators = fakes::collaborators();
    collaborators.registry = Arc::new(FakeRegistry::failing("401 unauthorized"));

    let mut engine = PolicyEngine::for_config(&config, image, collaborators);
    engine.execute_checks(&RunContext::background()).await.unwrap();

    let results = engine.results();
    assert_eq!(results.len(), 6);
    let tag = results.get("has-unique-tag").unwrap();
    assert!(matches!(tag.status, CheckStatus::Errored { .. }));
    assert!(tag.diagnostic().unwrap().contains("401 unauthorized"));
    assert_eq!(results.errored().count(), 1);
    assert_eq!(results.passed().count(), 5);
    assert!(!results.passed_overall());
}

#[tokio::test]
async fn test_unknown_policy_fails_before_running() {
    let dir = extracted_image();
    let config = config("Container");
    let image = ImageUnderTest::load(&config.image, dir.path(), false).unwrap();

    let mut engine = PolicyEngine::for_config(&config, image, fakes::collaborators());
    let err = engine
        .execute_checks(&RunContext::background())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Infra);
    assert!(engine.results().is_empty());
}

// ---------------------------------------------------------------------------
// Interruption
// ---------------------------------------------------------------------------

/// Passes immediately, except `max-layers`, which cancels the run (when a
/// handle is given) and never finishes.
struct Stalling {
    id: CheckId,
    cancel: Option<CancelHandle>,
}

#[async_trait]
impl Check for Stalling {
    fn name(&self) -> &str {
        self.id.name()
    }

    async fn validate(&self, _ctx: &RunContext, _image: &ImageUnderTest) -> anyhow::Result<bool> {
        if self.id != CheckId::MaxLayers {
            return Ok(true);
        }
        if let Some(handle) = &self.cancel {
            handle.cancel();
        }
        std::future::pending::<()>().await;
        Ok(true)
    }

    fn metadata(&self) -> CheckMetadata {
        CheckMetadata {
            description: "stalls".to_string(),
            level: CheckLevel::Optional,
            knowledge_base_url: String::new(),
            check_url: String::new(),
        }
    }

    fn help(&self) -> CheckHelp {
        CheckHelp {
            message: String::new(),
            suggestion: String::new(),
        }
    }
}

struct StallingFactory {
    cancel: Option<CancelHandle>,
}

impl CheckFactory for StallingFactory {
    fn build(&self, id: CheckId) -> Box<dyn Check> {
        Box::new(Stalling {
            id,
            cancel: self.cancel.clone(),
        })
    }
}

#[tokio::test]
async fn test_cancellation_keeps_completed_checks_only() {
    let dir = extracted_image();
    let image = ImageUnderTest::load("quay.io/example/app:1.0", dir.path(), false).unwrap();
    let (ctx, handle) = RunContext::with_cancel();

    let factory = StallingFactory {
        cancel: Some(handle),
    };
    let mut engine = PolicyEngine::new("container", image, Arc::new(factory));
    let err = engine.execute_checks(&ctx).await.unwrap_err();

    assert!(matches!(err, PreflightError::Cancelled));
    assert_eq!(engine.results().names(), vec!["has-license", "has-unique-tag"]);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_interrupts_stalled_check() {
    let dir = extracted_image();
    let image = ImageUnderTest::load("quay.io/example/app:1.0", dir.path(), false).unwrap();
    let ctx = RunContext::background().with_timeout(Duration::from_secs(5));

    let mut engine = PolicyEngine::new("scratch", image, Arc::new(StallingFactory { cancel: None }));
    let err = engine.execute_checks(&ctx).await.unwrap_err();

    assert!(matches!(err, PreflightError::DeadlineExceeded));
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(engine.results().len(), 2);
}
