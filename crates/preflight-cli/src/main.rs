//! Preflight - container and operator bundle certification
//!
//! ## Commands
//!
//! - `check container`: run the container, root or scratch policy
//! - `check operator`: run the operator policy against a bundle
//! - `list-checks`: show the ordered checks of one or every policy

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use preflight_certification::{
    check_names_for, formatter_for, init_tracing, write_results, CertificationConfig, CheckEngine,
    Collaborators, ImageUnderTest, Policy, PolicyEngine, Results, RunContext,
};

#[derive(Parser)]
#[command(name = "preflight")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Certify container images and operator bundles", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (defaults to ./config.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a certification policy
    Check {
        #[command(subcommand)]
        target: CheckTarget,
    },

    /// List the checks of a policy, in execution order
    ListChecks {
        /// Policy to list (all policies if omitted)
        #[arg(long)]
        policy: Option<String>,
    },
}

/// Flags shared by every check target.
#[derive(clap::Args, Debug, Clone, Default)]
struct OutputArgs {
    /// Report format: json or text
    #[arg(long)]
    format: Option<String>,

    /// Directory receiving results and logs
    #[arg(long, env = "PFLT_ARTIFACTS")]
    artifacts: Option<PathBuf>,
}

#[derive(Subcommand)]
enum CheckTarget {
    /// Certify an extracted container image
    Container {
        /// Image reference (registry/repository:tag)
        image: String,

        /// Directory holding the extracted image (config.json and rootfs/)
        #[arg(long)]
        image_dir: PathBuf,

        /// Policy to apply
        #[arg(long, default_value = "container", value_parser = ["container", "root", "scratch"])]
        policy: String,

        /// Docker config.json with registry credentials
        #[arg(long, env = "PFLT_DOCKERCONFIG")]
        docker_config: Option<PathBuf>,

        /// Pyxis API token
        #[arg(long, env = "PFLT_PYXIS_API_TOKEN", hide_env_values = true)]
        pyxis_api_token: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Certify an extracted operator bundle
    Operator {
        /// Bundle image reference
        image: String,

        /// Directory holding the extracted bundle (metadata/ and manifests/)
        #[arg(long)]
        bundle_dir: PathBuf,

        /// Namespace for scorecard and deployment
        #[arg(long, env = "PFLT_NAMESPACE")]
        namespace: Option<String>,

        /// Service account for scorecard and deployment
        #[arg(long, env = "PFLT_SERVICEACCOUNT")]
        service_account: Option<String>,

        /// Kubeconfig for the target cluster
        #[arg(long, env = "KUBECONFIG")]
        kubeconfig: Option<String>,

        /// Index image to deploy the bundle from
        #[arg(long, env = "PFLT_INDEXIMAGE")]
        index_image: Option<String>,

        /// Scorecard wait time in seconds
        #[arg(long)]
        scorecard_wait_time: Option<u64>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

impl OutputArgs {
    fn apply(self, config: &mut CertificationConfig) {
        if let Some(format) = self.format {
            config.response_format = format;
        }
        if let Some(artifacts) = self.artifacts {
            config.artifacts_dir = artifacts;
        }
    }
}

impl CheckTarget {
    /// Overlay flags on the file/env configuration; returns the extraction
    /// directory.
    fn apply(self, config: &mut CertificationConfig) -> PathBuf {
        match self {
            CheckTarget::Container {
                image,
                image_dir,
                policy,
                docker_config,
                pyxis_api_token,
                output,
            } => {
                config.image = image;
                config.policy = policy;
                if docker_config.is_some() {
                    config.docker_config = docker_config;
                }
                if let Some(token) = pyxis_api_token {
                    config.pyxis_api_token = token;
                }
                output.apply(config);
                image_dir
            }
            CheckTarget::Operator {
                image,
                bundle_dir,
                namespace,
                service_account,
                kubeconfig,
                index_image,
                scorecard_wait_time,
                output,
            } => {
                config.image = image;
                config.policy = Policy::Operator.as_str().to_string();
                if let Some(namespace) = namespace {
                    config.namespace = namespace;
                }
                if let Some(service_account) = service_account {
                    config.service_account = service_account;
                }
                if kubeconfig.is_some() {
                    config.kubeconfig = kubeconfig;
                }
                if index_image.is_some() {
                    config.index_image = index_image;
                }
                if let Some(secs) = scorecard_wait_time {
                    config.scorecard_wait_time = secs;
                }
                output.apply(config);
                bundle_dir
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        CertificationConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::ListChecks { policy } => {
            init_tracing(cli.json, if cli.verbose { "debug" } else { "warn" }, None)?;
            cmd_list_checks(policy.as_deref())
        }
        Commands::Check { target } => {
            let dir = target.apply(&mut config);
            let level = if cli.verbose {
                "debug".to_string()
            } else {
                config.log_level.clone()
            };
            std::fs::create_dir_all(&config.artifacts_dir).with_context(|| {
                format!("Failed to create {}", config.artifacts_dir.display())
            })?;
            let log_file = config.artifacts_dir.join(&config.log_file);
            init_tracing(cli.json, &level, Some(&log_file))?;

            let (ctx, cancel) = RunContext::with_cancel();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, abandoning the running check");
                    cancel.cancel();
                }
            });

            let collaborators =
                Collaborators::from_config(&config).context("Failed to initialise clients")?;
            cmd_check(&config, &dir, collaborators, &ctx).await
        }
    }
}

fn cmd_list_checks(policy: Option<&str>) -> Result<()> {
    let policies: Vec<String> = match policy {
        Some(name) => vec![name.to_string()],
        None => Policy::ALL.iter().map(|p| p.as_str().to_string()).collect(),
    };

    for name in policies {
        let checks = check_names_for(&name)?;
        println!("{name}:");
        for check in checks {
            println!("  {check}");
        }
    }
    Ok(())
}

async fn cmd_check(
    config: &CertificationConfig,
    dir: &Path,
    collaborators: Collaborators,
    ctx: &RunContext,
) -> Result<()> {
    let results = run_checks(config, dir, collaborators, ctx).await?;
    if results.passed_overall() {
        println!("\n✓ Preflight certification passed");
        Ok(())
    } else {
        anyhow::bail!("Preflight certification failed")
    }
}

/// Run the configured policy, then print and store the report.
async fn run_checks(
    config: &CertificationConfig,
    dir: &Path,
    collaborators: Collaborators,
    ctx: &RunContext,
) -> Result<Results> {
    let formatter = formatter_for(&config.response_format)?;
    let image = ImageUnderTest::load(config.image.clone(), dir, config.is_bundle())
        .with_context(|| format!("Failed to load image from {}", dir.display()))?;

    let mut engine = PolicyEngine::for_config(config, image, collaborators);
    let outcome = engine.execute_checks(ctx).await;
    let results = engine.results();

    let document = formatter.format(&results)?;
    println!("{document}");
    let path = write_results(&config.artifacts_dir, formatter.as_ref(), &document)?;
    info!(path = %path.display(), "results written");

    outcome.context("Certification run did not complete")?;
    Ok(results)
}
