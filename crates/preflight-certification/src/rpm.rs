//! Installed-package inspection of an extracted root filesystem.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::exec::run_command;

/// A package-owned file whose on-disk state differs from the package db.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifiedFile {
    pub path: String,
    /// `rpm -V` attribute flags, e.g. `S.5....T.`, or `missing`.
    pub flags: String,
    pub is_config: bool,
}

impl ModifiedFile {
    /// Content changed (digest mismatch) or file removed.
    pub fn content_changed(&self) -> bool {
        self.flags == "missing" || self.flags.chars().nth(2) == Some('5')
    }
}

#[async_trait]
pub trait PackageInspector: Send + Sync {
    /// Names of installed packages.
    async fn installed_packages(&self, root: &Path) -> anyhow::Result<Vec<String>>;

    /// Package-owned files that were altered after installation.
    async fn modified_files(&self, root: &Path) -> anyhow::Result<Vec<ModifiedFile>>;
}

/// [`PackageInspector`] backed by `rpm --root`.
#[derive(Debug, Clone)]
pub struct RpmCli {
    binary: String,
    timeout: Duration,
}

impl Default for RpmCli {
    fn default() -> Self {
        Self {
            binary: "rpm".to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

fn root_args(root: &Path) -> Vec<String> {
    vec!["--root".to_string(), root.to_string_lossy().to_string()]
}

#[async_trait]
impl PackageInspector for RpmCli {
    async fn installed_packages(&self, root: &Path) -> anyhow::Result<Vec<String>> {
        let mut args = root_args(root);
        args.extend(["-qa".to_string(), "--qf".to_string(), "%{NAME}\\n".to_string()]);

        let output = run_command(&self.binary, &args, self.timeout).await?;
        if !output.success() {
            anyhow::bail!(
                "rpm query exited with code {}: {}",
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn modified_files(&self, root: &Path) -> anyhow::Result<Vec<ModifiedFile>> {
        let mut args = root_args(root);
        args.extend(["-Va".to_string(), "--nodeps".to_string(), "--noscripts".to_string()]);

        // rpm -V exits non-zero whenever it finds differences.
        let output = run_command(&self.binary, &args, self.timeout).await?;
        let files = parse_verify_output(&output.stdout);
        if !output.success() && files.is_empty() {
            anyhow::bail!(
                "rpm verify exited with code {}: {}",
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(files)
    }
}

/// Parse `rpm -V` lines: `<flags> [<attr>] <path>`.
pub(crate) fn parse_verify_output(stdout: &str) -> Vec<ModifiedFile> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let flags = fields.next()?;
            let rest: Vec<&str> = fields.collect();
            let (attr, path) = match rest.as_slice() {
                [path] => (None, *path),
                [attr, path] => (Some(*attr), *path),
                _ => return None,
            };
            if !path.starts_with('/') {
                return None;
            }
            Some(ModifiedFile {
                path: path.to_string(),
                flags: flags.to_string(),
                is_config: attr == Some("c"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verify_output() {
        let files = parse_verify_output(
            "S.5....T.  c /etc/yum.conf\n.M.......    /usr/bin/ping\nmissing     /usr/share/doc/README\nS.5....T.    /usr/lib64/libfoo.so\n",
        );
        assert_eq!(files.len(), 4);
        assert!(files[0].is_config);
        assert!(files[0].content_changed());
        assert!(!files[1].content_changed());
        assert!(files[2].content_changed());
        assert_eq!(files[3].path, "/usr/lib64/libfoo.so");
        assert!(!files[3].is_config);
    }

    #[test]
    fn test_parse_ignores_noise() {
        assert!(parse_verify_output("error: db5 error\n\n").is_empty());
    }

    #[tokio::test]
    async fn test_failed_verify_is_error() {
        let rpm = RpmCli {
            binary: "false".to_string(),
            timeout: Duration::from_secs(10),
        };
        let err = rpm
            .modified_files(Path::new("/nonexistent-root"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rpm verify exited with code 1"));
    }

    #[tokio::test]
    async fn test_clean_verify_reports_nothing() {
        let rpm = RpmCli {
            binary: "true".to_string(),
            timeout: Duration::from_secs(10),
        };
        assert!(rpm
            .modified_files(Path::new("/nonexistent-root"))
            .await
            .unwrap()
            .is_empty());
    }
}
