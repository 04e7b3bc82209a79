//! Preconditions for a run: external binaries and a writable output directory.
//!
//! Each check degrades on its own to `ok: false` with a reason; deciding that a
//! run is blocked is the controller's job.

mod probe;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::config::{AppConfig, BinaryRequirement};

pub const CHECK_BROWSER_DRIVER: &str = "runtime-browser-driver";
pub const CHECK_DOCUMENT_RENDERER: &str = "document-renderer";
pub const CHECK_OUTPUT_DIR: &str = "output-directory-writable";

/// Where a passing check found its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Path,
    Fallback,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub ok: bool,
    pub detail: String,
    pub resolved_path: Option<PathBuf>,
    pub resolution: Option<Resolution>,
}

impl CheckResult {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self {
            ok: true,
            detail: detail.into(),
            resolved_path: None,
            resolution: None,
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: detail.into(),
            resolved_path: None,
            resolution: None,
        }
    }

    pub fn with_path(mut self, path: PathBuf, resolution: Resolution) -> Self {
        self.resolved_path = Some(path);
        self.resolution = Some(resolution);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvironmentReport {
    pub checks: BTreeMap<String, CheckResult>,
}

impl EnvironmentReport {
    pub fn all_ok(&self) -> bool {
        self.checks.values().all(|c| c.ok)
    }

    /// Names of failed checks, in stable order.
    pub fn failed(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|(_, c)| !c.ok)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.checks.get(name)
    }
}

/// `<binary> --version` output, or `None` when the binary is missing or silent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub check: String,
    pub binary: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EnvironmentValidator {
    browser_driver: BinaryRequirement,
    document_renderer: BinaryRequirement,
    output_dir: PathBuf,
    version_timeout: Duration,
}

impl EnvironmentValidator {
    pub fn new(
        browser_driver: BinaryRequirement,
        document_renderer: BinaryRequirement,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            browser_driver,
            document_renderer,
            output_dir: output_dir.into(),
            version_timeout: Duration::from_millis(5_000),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        let mut v = Self::new(
            cfg.environment.browser_driver.clone(),
            cfg.environment.document_renderer.clone(),
            cfg.output_dir(),
        );
        v.version_timeout = Duration::from_millis(cfg.environment.version_probe_timeout_ms);
        v
    }

    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }

    /// Runs every check. Never fails as a whole.
    pub fn check(&self) -> EnvironmentReport {
        let mut checks = BTreeMap::new();
        checks.insert(
            CHECK_BROWSER_DRIVER.to_string(),
            probe::resolve_binary(&self.browser_driver),
        );
        checks.insert(
            CHECK_DOCUMENT_RENDERER.to_string(),
            probe::resolve_binary(&self.document_renderer),
        );
        checks.insert(
            CHECK_OUTPUT_DIR.to_string(),
            probe::check_writable_dir(&self.output_dir),
        );

        let report = EnvironmentReport { checks };
        for (name, c) in &report.checks {
            if c.ok {
                tracing::debug!(check = %name, detail = %c.detail, "environment check passed");
            } else {
                tracing::warn!(check = %name, detail = %c.detail, "environment check failed");
            }
        }
        report
    }

    /// `check()` on a blocking thread, for callers on the async runtime.
    pub async fn check_async(&self) -> EnvironmentReport {
        let this = self.clone();
        match tokio::task::spawn_blocking(move || this.check()).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "environment check task failed");
                let mut checks = BTreeMap::new();
                for name in [CHECK_BROWSER_DRIVER, CHECK_DOCUMENT_RENDERER, CHECK_OUTPUT_DIR] {
                    checks.insert(
                        name.to_string(),
                        CheckResult::fail(format!("check did not complete: {e}")),
                    );
                }
                EnvironmentReport { checks }
            }
        }
    }

    /// Version banners of the resolved binaries, each bounded by the probe timeout.
    pub async fn probe_versions(&self, report: &EnvironmentReport) -> Vec<VersionInfo> {
        let mut out = Vec::new();
        for (check, req) in [
            (CHECK_BROWSER_DRIVER, &self.browser_driver),
            (CHECK_DOCUMENT_RENDERER, &self.document_renderer),
        ] {
            let version = match report.get(check).and_then(probe::binary_path_for) {
                Some(path) => probe::version_line(&path, self.version_timeout).await,
                None => None,
            };
            out.push(VersionInfo {
                check: check.to_string(),
                binary: req.name.clone(),
                version,
            });
        }
        out
    }
}
