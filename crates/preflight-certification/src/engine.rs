//! Check execution.
//!
//! [`PolicyEngine`] resolves a policy's checklist and runs it sequentially
//! against one [`ImageUnderTest`]. A check's verdict or error is recorded as a
//! [`CheckResult`]; only failures that stop checks from running at all are
//! returned from [`CheckEngine::execute_checks`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::check::{Check, ImageUnderTest};
use crate::checks::{Collaborators, DefaultCheckFactory};
use crate::config::CertificationConfig;
use crate::context::RunContext;
use crate::error::{PreflightError, Result};
use crate::policy::{CheckFactory, PolicyRegistry};
use crate::results::{CheckResult, CheckStatus, Results};

/// Runs a certification policy and holds its outcome.
#[async_trait]
pub trait CheckEngine: Send {
    /// Run every check of the configured policy.
    ///
    /// On cancellation no further check is started and the cancellation
    /// error is returned; checks completed so far stay in [`Self::results`].
    async fn execute_checks(&mut self, ctx: &RunContext) -> Result<()>;

    /// Outcomes of the checks that completed, in policy order.
    fn results(&self) -> Results;
}

pub struct PolicyEngine {
    policy: String,
    image: ImageUnderTest,
    registry: PolicyRegistry,
    entries: Vec<CheckResult>,
}

impl PolicyEngine {
    pub fn new(policy: impl Into<String>, image: ImageUnderTest, factory: Arc<dyn CheckFactory>) -> Self {
        Self {
            policy: policy.into(),
            image,
            registry: PolicyRegistry::new(factory),
            entries: Vec::new(),
        }
    }

    /// Engine for `config.policy` with the built-in checks.
    pub fn for_config(
        config: &CertificationConfig,
        image: ImageUnderTest,
        collaborators: Collaborators,
    ) -> Self {
        let factory = DefaultCheckFactory::new(config, collaborators);
        Self::new(config.policy.clone(), image, Arc::new(factory))
    }

    pub fn policy(&self) -> &str {
        &self.policy
    }

    async fn run_check(&self, ctx: &RunContext, check: &dyn Check) -> Result<CheckResult> {
        let name = check.name().to_string();
        debug!(check = %name, "running check");
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            err = ctx.done() => return Err(err),
            outcome = check.validate(ctx, &self.image) => outcome,
        };
        let elapsed = started.elapsed();

        let status = match outcome {
            Ok(true) => {
                info!(check = %name, elapsed_ms = elapsed.as_millis() as u64, "check passed");
                CheckStatus::Passed
            }
            Ok(false) => {
                info!(check = %name, elapsed_ms = elapsed.as_millis() as u64, "check failed");
                CheckStatus::Failed
            }
            Err(e) => {
                warn!(check = %name, error = %format!("{e:#}"), "check errored");
                CheckStatus::Errored {
                    message: format!("{e:#}"),
                }
            }
        };

        Ok(CheckResult {
            name,
            status,
            elapsed,
            metadata: check.metadata(),
            help: check.help(),
        })
    }
}

#[async_trait]
impl CheckEngine for PolicyEngine {
    async fn execute_checks(&mut self, ctx: &RunContext) -> Result<()> {
        self.entries.clear();

        let checks = self
            .registry
            .resolve_checks(&self.policy)
            .map_err(|e| PreflightError::Infra(e.to_string()))?;
        info!(policy = %self.policy, image = %self.image.reference, checks = checks.len(), "target image");

        for check in &checks {
            if let Some(err) = ctx.err() {
                warn!(policy = %self.policy, completed = self.entries.len(), "run interrupted");
                return Err(err);
            }
            match self.run_check(ctx, check.as_ref()).await {
                Ok(result) => self.entries.push(result),
                Err(err) => {
                    warn!(check = %check.name(), completed = self.entries.len(), "run interrupted");
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    fn results(&self) -> Results {
        Results::from_entries(self.image.reference.clone(), self.entries.clone())
    }
}
