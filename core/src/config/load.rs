use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default panel data directory: ~/.recon-panel
pub fn get_panel_data_dir() -> anyhow::Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".recon-panel"))
        .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))
}

/// Loads the panel config. An explicit path wins; otherwise
/// `~/.recon-panel/config.toml`, then `./recon-panel.toml`, then defaults.
pub fn load_default(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    let mut cfg = match explicit {
        Some(path) => load_file(path)?,
        None => {
            let home_config = get_panel_data_dir().ok().map(|d| d.join("config.toml"));
            let local_config = Path::new("recon-panel.toml");
            match home_config.filter(|p| p.exists()) {
                Some(p) => load_file(&p)?,
                None if local_config.exists() => load_file(local_config)?,
                None => AppConfig::default(),
            }
        }
    };

    if cfg.logging.file
        && cfg
            .logging
            .directory
            .as_deref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
    {
        if let Ok(dir) = get_panel_data_dir() {
            cfg.logging.directory = Some(dir.join("logs").to_string_lossy().to_string());
        }
    }

    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn load_file(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("read {} failed: {e}", path.display()))?;
    toml::from_str::<AppConfig>(&s)
        .map_err(|e| anyhow::anyhow!("parse {} failed: {e}", path.display()))
}

fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Ok(v) = std::env::var("RECON_PANEL_PIPELINE_ROOT") {
        if !v.trim().is_empty() {
            cfg.pipeline.root = PathBuf::from(v);
        }
    }
    if let Ok(v) = std::env::var("RECON_PANEL_PROGRAM") {
        if !v.trim().is_empty() {
            cfg.pipeline.program = v;
        }
    }
    if let Ok(v) = std::env::var("RECON_PANEL_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.logging.level = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel.toml");
        std::fs::write(&path, "[pipeline]\nprogram = \"python3\"\n").unwrap();
        let cfg = load_default(Some(&path)).unwrap();
        assert_eq!(cfg.pipeline.program, "python3");
    }

    #[test]
    fn malformed_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel.toml");
        std::fs::write(&path, "[pipeline\nprogram = 1").unwrap();
        let err = load_default(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }
}
