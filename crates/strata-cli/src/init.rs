use std::path::Path;

use anyhow::{Context, Result, bail};
use strata_config::{AppConfig, CONFIG_FILE_NAMES};
use tracing::info;

/// Write `strata.yml` with default settings into `dir` and create the
/// versions directory it points at. Refuses to overwrite an existing config.
pub fn run(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    if let Some(existing) = CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
    {
        bail!("{} already exists", existing.display());
    }

    let config = AppConfig::default();
    let versions = dir.join(&config.migrations.directory);
    std::fs::create_dir_all(&versions)
        .with_context(|| format!("failed to create {}", versions.display()))?;

    let config_path = dir.join(CONFIG_FILE_NAMES[0]);
    let yaml = serde_yaml::to_string(&config).context("failed to serialize config")?;
    std::fs::write(&config_path, &yaml)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    info!("config written to {}", config_path.display());
    println!();
    println!("  Config written to {}", config_path.display());
    println!("  Revisions go in {}", versions.display());
    println!("  Run `strata revision -m \"initial schema\"` to create the first one.");
    println!();

    Ok(())
}
