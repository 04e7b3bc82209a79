use recon_core::api::{AppConfig, CliError, ConfigStore, PatchMode};

use super::cli::SettingsCommand;

pub fn settings_cmd(cmd: SettingsCommand, cfg: &AppConfig) -> Result<i32, CliError> {
    let store = ConfigStore::from_config(cfg);
    match cmd {
        SettingsCommand::Show => {
            let doc = store.load()?;
            print!("{}", doc.raw());
            Ok(0)
        }
        SettingsCommand::Validate { file } => {
            let path = file.unwrap_or_else(|| store.path().to_path_buf());
            let text = std::fs::read_to_string(&path)?;
            ConfigStore::validate_text(&text)?;
            println!("{}: valid YAML", path.display());
            Ok(0)
        }
        SettingsCommand::Save { file } => {
            let text = std::fs::read_to_string(&file)?;
            let mut ctl = recon_plugins::factory::build_controller(cfg);
            ctl.save_settings_text(&text)?;
            println!("{}", ctl.status());
            Ok(0)
        }
        SettingsCommand::SetTargets { targets } => {
            let outcome = store.apply_targets(&targets)?;
            let how = match outcome.mode {
                PatchMode::Unchanged => "unchanged",
                PatchMode::Surgical => "updated in place",
                PatchMode::Merged => "updated (file re-serialized, comments dropped)",
            };
            let saved = outcome
                .document
                .targets(store.target_path())
                .unwrap_or_default();
            println!(
                "{} {how}: {} = [{}]",
                store.path().display(),
                store.target_path(),
                saved.join(", ")
            );
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::api::{ErrorKind, SettingsError};

    fn cfg_for(dir: &std::path::Path) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.pipeline.root = dir.to_path_buf();
        cfg
    }

    #[test]
    fn set_targets_patches_the_pipeline_settings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.yaml"),
            "ScraperSettings:\n  usernames: [a, b]  # accounts\n",
        )
        .unwrap();
        let code = settings_cmd(
            SettingsCommand::SetTargets {
                targets: vec!["c".into(), "d".into()],
            },
            &cfg_for(dir.path()),
        )
        .unwrap();
        assert_eq!(code, 0);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("settings.yaml")).unwrap(),
            "ScraperSettings:\n  usernames: [c, d]  # accounts\n"
        );
    }

    #[tokio::test]
    async fn save_replaces_settings_with_the_edited_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("settings.yaml");
        std::fs::write(&settings, "ScraperSettings:\n  usernames: [a]\n").unwrap();
        let edited = dir.path().join("edited.yaml");
        std::fs::write(&edited, "# tuned\nScraperSettings:\n  usernames: [b]\n").unwrap();

        let code = settings_cmd(SettingsCommand::Save { file: edited }, &cfg_for(dir.path())).unwrap();
        assert_eq!(code, 0);
        assert_eq!(
            std::fs::read_to_string(&settings).unwrap(),
            "# tuned\nScraperSettings:\n  usernames: [b]\n"
        );
    }

    #[tokio::test]
    async fn save_rejects_invalid_yaml_and_keeps_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = dir.path().join("settings.yaml");
        std::fs::write(&settings, "ScraperSettings:\n  usernames: [a]  # keep\n").unwrap();
        let before = std::fs::read(&settings).unwrap();
        let edited = dir.path().join("edited.yaml");
        std::fs::write(&edited, "ScraperSettings:\n  usernames: [b\n").unwrap();

        let err = settings_cmd(SettingsCommand::Save { file: edited }, &cfg_for(dir.path()))
            .unwrap_err();
        match err {
            CliError::Controller(ce) => assert_eq!(ce.kind(), ErrorKind::Parse),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(std::fs::read(&settings).unwrap(), before);
    }

    #[test]
    fn validate_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "a: [1, 2\n").unwrap();
        let err = settings_cmd(SettingsCommand::Validate { file: Some(bad) }, &cfg_for(dir.path()))
            .unwrap_err();
        assert!(matches!(err, CliError::Settings(SettingsError::Parse { .. })));
    }
}
