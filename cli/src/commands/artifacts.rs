use recon_core::api::{
    AppConfig, ArtifactIndex, ArtifactRepository, Category, CliError, ControllerError, Preview,
};

use super::cli::{ArtifactsArgs, PreviewArgs};

pub fn artifacts_cmd(args: ArtifactsArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let mut repo = ArtifactRepository::from_config(cfg);
    let index = repo.refresh().map_err(ControllerError::from)?;
    if args.json {
        let text =
            serde_json::to_string_pretty(index).map_err(|e| CliError::Command(e.to_string()))?;
        println!("{text}");
    } else {
        print!("{}", render_index(index));
    }
    Ok(0)
}

pub fn render_index(index: &ArtifactIndex) -> String {
    if index.is_empty() {
        return format!(
            "No data yet under {}. Run a stage to produce output.\n",
            index.base_dir.display()
        );
    }
    let mut out = String::new();
    for category in Category::ALL {
        let entries = index.category(category);
        if entries.is_empty() {
            continue;
        }
        out.push_str(&format!("{category}:\n"));
        for e in entries {
            out.push_str(&format!("  {:<48} {:>10}\n", e.display, human_size(e.size_bytes)));
        }
    }
    out
}

pub fn preview_cmd(args: PreviewArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let repo = ArtifactRepository::from_config(cfg);
    let preview = repo.preview(&args.path).map_err(ControllerError::from)?;
    match preview {
        Preview::Structured { value, .. } => {
            let text =
                serde_json::to_string_pretty(&value).map_err(|e| CliError::Command(e.to_string()))?;
            println!("{text}");
        }
        Preview::Binary { bytes, meta } => {
            println!(
                "{} ({}, {}); open it with an external viewer:\n{}",
                meta.category,
                meta.media_type,
                human_size(bytes.len() as u64),
                meta.path.display()
            );
        }
    }
    Ok(0)
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::api::{ArtifactLayout, ArtifactsConfig};

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KiB");
        assert_eq!(human_size(5 * 1024 * 1024 + 1024 * 512), "5.5 MiB");
    }

    #[test]
    fn empty_index_says_no_data_yet() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo =
            ArtifactRepository::new(ArtifactLayout::new(dir.path(), &ArtifactsConfig::default()), 1024);
        let text = render_index(repo.refresh().unwrap());
        assert!(text.starts_with("No data yet"));
    }

    #[test]
    fn listing_groups_by_category() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data/reports")).unwrap();
        std::fs::write(dir.path().join("data/profiles.json"), "{}").unwrap();
        std::fs::write(dir.path().join("data/reports/report.pdf"), b"%PDF-1.4").unwrap();
        let mut repo =
            ArtifactRepository::new(ArtifactLayout::new(dir.path(), &ArtifactsConfig::default()), 1024);
        let text = render_index(repo.refresh().unwrap());
        let headings: Vec<&str> = text.lines().filter(|l| !l.starts_with(' ')).collect();
        assert_eq!(headings, vec!["structured-data:", "document:"]);
        assert!(text.contains("data/reports/report.pdf"));
    }
}
