use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "recon-panel", version, about = "Local control panel for the threadsrecon pipeline")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Panel config (TOML). Defaults to ~/.recon-panel/config.toml, then ./recon-panel.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Pipeline root, overriding `[pipeline].root`.
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CheckArgs {
    /// Also report `--version` output of the resolved binaries.
    #[arg(long)]
    pub versions: bool,

    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// all, scrape (or collect), analyze, visualize, report
    pub stage: String,

    /// Target account; repeat or separate with commas. Replaces the saved list.
    #[arg(short = 't', long = "target", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub targets: Vec<String>,

    #[arg(long, conflicts_with = "no_headless")]
    pub headless: bool,

    #[arg(long)]
    pub no_headless: bool,
}

impl RunArgs {
    /// Explicit flag, else the configured default.
    pub fn headless(&self, default: bool) -> bool {
        if self.headless {
            true
        } else if self.no_headless {
            false
        } else {
            default
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ArtifactsArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PreviewArgs {
    /// Artifact path, absolute or relative to the pipeline root.
    pub path: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCommand {
    /// Print the pipeline settings file.
    Show,
    /// Check that a settings file (default: the pipeline's) is valid YAML.
    Validate {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Replace the pipeline settings with an edited copy. Invalid YAML is
    /// rejected and the current file is left as it is.
    Save {
        #[arg(long)]
        file: PathBuf,
    },
    /// Replace the target list, leaving the rest of the file untouched.
    SetTargets {
        #[arg(required = true, value_delimiter = ',')]
        targets: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the environment checks.
    Check(CheckArgs),
    /// Run one pipeline stage and stream its output. Ctrl-C cancels the stage.
    Run(RunArgs),
    /// List pipeline output.
    Artifacts(ArtifactsArgs),
    /// Show one artifact.
    Preview(PreviewArgs),
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Interactive panel (the default).
    Tui,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_collects_comma_and_repeated_targets() {
        let args = Args::parse_from([
            "recon-panel",
            "run",
            "scrape",
            "-t",
            "alice,bob",
            "--target",
            "carol",
            "--no-headless",
        ]);
        match args.command {
            Some(Commands::Run(run)) => {
                assert_eq!(run.stage, "scrape");
                assert_eq!(run.targets, vec!["alice", "bob", "carol"]);
                assert!(!run.headless(true));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn headless_defaults_to_config() {
        let args = Args::parse_from(["recon-panel", "run", "analyze"]);
        let Some(Commands::Run(run)) = args.command else {
            panic!("expected run");
        };
        assert!(run.headless(true));
        assert!(!run.headless(false));
    }

    #[test]
    fn conflicting_headless_flags_are_rejected() {
        assert!(Args::try_parse_from(["recon-panel", "run", "all", "--headless", "--no-headless"]).is_err());
    }

    #[test]
    fn settings_save_requires_a_file() {
        let args = Args::parse_from(["recon-panel", "settings", "save", "--file", "edited.yaml"]);
        match args.command {
            Some(Commands::Settings(SettingsCommand::Save { file })) => {
                assert_eq!(file, PathBuf::from("edited.yaml"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Args::try_parse_from(["recon-panel", "settings", "save"]).is_err());
    }

    #[test]
    fn no_subcommand_is_allowed() {
        let args = Args::parse_from(["recon-panel", "--root", "/srv/threadsrecon"]);
        assert!(args.command.is_none());
        assert_eq!(args.root, Some(PathBuf::from("/srv/threadsrecon")));
    }
}
