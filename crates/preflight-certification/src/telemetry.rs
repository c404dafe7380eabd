//! Tracing initialisation for preflight binaries.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::{PreflightError, Result};

/// Initialise the global tracing subscriber.
///
/// * `json` emits newline-delimited JSON on stderr.
/// * `level` is the filter used when `RUST_LOG` is not set.
/// * `log_file`, when given, receives a plain-text copy of every event. The
///   file is truncated.
pub fn init_tracing(json: bool, level: &str, log_file: Option<&Path>) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path).map_err(|e| {
                PreflightError::io(format!("could not open log file {}", path.display()), e)
            })?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    let stderr_layer = if json {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_twice_is_harmless() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("preflight.log");
        init_tracing(false, "debug", Some(&log)).unwrap();
        init_tracing(true, "info", None).unwrap();
        assert!(log.exists());
    }

    #[test]
    fn test_unwritable_log_file() {
        let dir = tempdir().unwrap();
        let err = init_tracing(false, "info", Some(&dir.path().join("missing/preflight.log")))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
    }
}
