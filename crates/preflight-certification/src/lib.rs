//! Preflight certification library
//!
//! Selects a policy's checklist, runs it against an extracted container
//! image or operator bundle, and aggregates the outcomes.
//!
//! ## Key Components
//!
//! - `PolicyRegistry`: policy → ordered checks
//! - `PolicyEngine`: runs the checks and records `Results`
//! - `validate_bundle`: operator bundle validation with version-aware options
//! - `bundle`: annotations, CSV location and install modes

pub mod bundle;
pub mod check;
pub mod checks;
pub mod config;
pub mod context;
pub mod engine;
mod error;
mod exec;
pub mod fakes;
pub mod formatters;
pub mod operator_sdk;
pub mod policy;
pub mod pyxis;
pub mod registry;
pub mod results;
pub mod rpm;
pub mod telemetry;
pub mod validate;
pub mod version;

pub use check::{Check, CheckHelp, CheckLevel, CheckMetadata, ImageUnderTest};
pub use checks::{Collaborators, DefaultCheckFactory};
pub use config::CertificationConfig;
pub use context::{CancelHandle, RunContext};
pub use engine::{CheckEngine, PolicyEngine};
pub use error::{ErrorKind, PreflightError, Result};
pub use formatters::{formatter_for, write_results, ResponseFormatter};
pub use policy::{check_names_for, checks_for, CheckFactory, CheckId, Policy, PolicyRegistry};
pub use results::{CheckResult, CheckStatus, Results};
pub use telemetry::init_tracing;
pub use validate::validate_bundle;
pub use version::{qualifies, OcpVersion, OCP_V1BETA1_UNSUPPORTED};
