use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::{CheckResult, Resolution};
use crate::config::BinaryRequirement;

/// PATH lookup first, then the fixed fallback location.
pub(crate) fn resolve_binary(req: &BinaryRequirement) -> CheckResult {
    match which::which(&req.name) {
        Ok(path) => {
            return CheckResult::pass(format!("`{}` found on PATH", req.name))
                .with_path(path, Resolution::Path);
        }
        Err(e) => tracing::debug!(binary = %req.name, error = %e, "not on PATH"),
    }

    if let Some(fallback) = req.fallback.as_deref() {
        if is_executable_file(fallback) {
            return CheckResult::pass(format!(
                "`{}` found at fixed location {}",
                req.name,
                fallback.display()
            ))
            .with_path(fallback.to_path_buf(), Resolution::Fallback);
        }
    }

    let detail = match req.fallback.as_deref() {
        Some(fallback) => format!(
            "`{}` not found on PATH or at {}",
            req.name,
            fallback.display()
        ),
        None => format!("`{}` not found on PATH", req.name),
    };
    CheckResult::fail(detail)
}

fn is_executable_file(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Creates `dir` if needed, then proves it writable with a zero-byte scratch
/// file that is removed again. Existing content is never touched.
pub(crate) fn check_writable_dir(dir: &Path) -> CheckResult {
    match std::fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => {
            return CheckResult::fail(format!("{} exists but is not a directory", dir.display()));
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            if let Err(e) = std::fs::create_dir_all(dir) {
                return CheckResult::fail(describe_io("cannot create", dir, &e));
            }
            tracing::info!(dir = %dir.display(), "created output directory");
        }
        Err(e) => return CheckResult::fail(describe_io("cannot inspect", dir, &e)),
    }

    let probe = tempfile::Builder::new()
        .prefix(".recon-write-probe.")
        .tempfile_in(dir);
    match probe {
        Ok(file) => {
            if let Err(e) = file.close() {
                tracing::warn!(dir = %dir.display(), error = %e, "write probe cleanup failed");
            }
            CheckResult::pass(format!("{} is writable", dir.display()))
                .with_path(dir.to_path_buf(), Resolution::Directory)
        }
        Err(e) => CheckResult::fail(describe_io("cannot write to", dir, &e)),
    }
}

fn describe_io(action: &str, dir: &Path, e: &std::io::Error) -> String {
    match e.kind() {
        ErrorKind::PermissionDenied => {
            format!("permission denied: {action} {}", dir.display())
        }
        _ => format!("{action} {}: {e}", dir.display()),
    }
}

/// Runs `<binary> --version` and returns the first non-empty output line.
pub(crate) async fn version_line(binary: &Path, timeout: Duration) -> Option<String> {
    let mut child = Command::new(binary)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| tracing::debug!(binary = %binary.display(), error = %e, "version probe spawn failed"))
        .ok()?;

    let mut stdout = child.stdout.take()?;
    let mut stderr = child.stderr.take()?;
    let collect = async {
        let mut out = String::new();
        let mut err = String::new();
        let _ = tokio::join!(stdout.read_to_string(&mut out), stderr.read_to_string(&mut err));
        let _ = child.wait().await;
        first_line(&out).or_else(|| first_line(&err))
    };

    match tokio::time::timeout(timeout, collect).await {
        Ok(line) => line,
        Err(_) => {
            tracing::warn!(binary = %binary.display(), "version probe timed out");
            None
        }
    }
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

pub(crate) fn binary_path_for(result: &CheckResult) -> Option<PathBuf> {
    match result.resolution {
        Some(Resolution::Path) | Some(Resolution::Fallback) => result.resolved_path.clone(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_names_both_locations() {
        let req = BinaryRequirement {
            name: "recon-definitely-missing-binary".into(),
            fallback: Some(PathBuf::from("/nonexistent/recon-bin")),
        };
        let res = resolve_binary(&req);
        assert!(!res.ok);
        assert!(res.detail.contains("not found on PATH or at /nonexistent/recon-bin"));
        assert_eq!(res.resolved_path, None);
    }

    #[cfg(unix)]
    #[test]
    fn fallback_is_used_when_not_on_path() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("fake-driver");
        std::fs::write(&bin, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let req = BinaryRequirement {
            name: "recon-definitely-missing-binary".into(),
            fallback: Some(bin.clone()),
        };
        let res = resolve_binary(&req);
        assert!(res.ok);
        assert_eq!(res.resolution, Some(Resolution::Fallback));
        assert_eq!(res.resolved_path, Some(bin));
    }

    #[test]
    fn missing_output_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("data");
        let res = check_writable_dir(&out);
        assert!(res.ok, "{}", res.detail);
        assert!(out.is_dir());
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn file_in_place_of_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("data");
        std::fs::write(&out, b"x").unwrap();
        let res = check_writable_dir(&out);
        assert!(!res.ok);
        assert!(res.detail.contains("not a directory"));
    }

    #[test]
    fn first_line_skips_blank_lines() {
        assert_eq!(first_line("\n  \nChromeDriver 120.0\nmore"), Some("ChromeDriver 120.0".into()));
        assert_eq!(first_line(""), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn version_line_reports_some_output() {
        // Shells either print a version banner or reject the flag on stderr.
        let line = version_line(Path::new("/bin/sh"), Duration::from_secs(5)).await;
        assert!(line.is_some());
    }

    #[tokio::test]
    async fn version_line_of_missing_binary_is_none() {
        let line = version_line(Path::new("/nonexistent/recon-bin"), Duration::from_secs(1)).await;
        assert_eq!(line, None);
    }
}
