use recon_core::api::{AppConfig, CliError, ControllerError, EnvironmentReport, EnvironmentValidator, VersionInfo};
use serde::Serialize;

use super::cli::CheckArgs;

#[derive(Debug, Serialize)]
struct CheckOutput<'a> {
    ok: bool,
    checks: &'a EnvironmentReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    versions: Option<&'a [VersionInfo]>,
}

/// Exit 0 when every check passes; otherwise an environment error.
pub async fn check_cmd(args: CheckArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let validator = EnvironmentValidator::from_config(cfg);
    let report = validator.check_async().await;
    let versions = if args.versions {
        Some(validator.probe_versions(&report).await)
    } else {
        None
    };

    if args.json {
        let out = CheckOutput {
            ok: report.all_ok(),
            checks: &report,
            versions: versions.as_deref(),
        };
        let text = serde_json::to_string_pretty(&out).map_err(|e| CliError::Command(e.to_string()))?;
        println!("{text}");
    } else {
        print!("{}", render_report(&report, versions.as_deref()));
    }

    if report.all_ok() {
        Ok(0)
    } else {
        Err(ControllerError::EnvironmentBlocked {
            failed: report.failed(),
        }
        .into())
    }
}

pub fn render_report(report: &EnvironmentReport, versions: Option<&[VersionInfo]>) -> String {
    let width = report.checks.keys().map(String::len).max().unwrap_or(0);
    let mut out = String::new();
    for (name, check) in &report.checks {
        let mark = if check.ok { "ok  " } else { "FAIL" };
        out.push_str(&format!("[{mark}] {name:<width$}  {}\n", check.detail));
    }
    if let Some(versions) = versions {
        out.push('\n');
        for v in versions {
            let version = v.version.as_deref().unwrap_or("not found");
            out.push_str(&format!("{}: {version}\n", v.binary));
        }
    }
    out
}
