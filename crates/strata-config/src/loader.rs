use std::path::{Path, PathBuf};

use strata_common::{Error, Result};
use tracing::{debug, info};

use crate::model::{AppConfig, LogFormat};

/// File names looked for when no config path is given, in order.
pub const CONFIG_FILE_NAMES: [&str; 3] = ["strata.yml", "strata.yaml", "strata.toml"];

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Loads `AppConfig` from a file, then applies `STRATA_*` overrides.
///
/// Relative paths in a config file are resolved against the file's
/// directory; relative paths from the environment against the working
/// directory.
pub struct ConfigLoader {
    cwd: PathBuf,
    env: EnvLookup,
}

impl ConfigLoader {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            env: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Replace the environment lookup.
    pub fn with_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.env = Box::new(lookup);
        self
    }

    /// First known config file in the working directory.
    pub fn discover(&self) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| self.cwd.join(name))
            .find(|p| p.is_file())
    }

    /// Load `path`, or a discovered file, or defaults when there is neither.
    pub fn load(&self, path: Option<&Path>) -> Result<AppConfig> {
        let path = match path {
            Some(p) => {
                let p = self.absolute(p);
                if !p.is_file() {
                    return Err(Error::Config(format!(
                        "config file {} not found",
                        p.display()
                    )));
                }
                Some(p)
            }
            None => self.discover(),
        };

        let mut config = match &path {
            Some(p) => {
                info!("loading config from {}", p.display());
                let mut config = Self::read_file(p)?;
                let base = p.parent().unwrap_or(&self.cwd).to_path_buf();
                resolve(&mut config.database.path, &base);
                resolve(&mut config.migrations.directory, &base);
                config
            }
            None => {
                debug!("no config file found, using defaults");
                let mut config = AppConfig::default();
                resolve(&mut config.database.path, &self.cwd);
                resolve(&mut config.migrations.directory, &self.cwd);
                config
            }
        };

        self.apply_env(&mut config)?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let parsed = match ext {
            "yml" | "yaml" => {
                serde_yaml::from_str(&contents).map_err(|e| format!("YAML parse error: {e}"))
            }
            "toml" => toml::from_str(&contents).map_err(|e| format!("TOML parse error: {e}")),
            "json" => serde_json::from_str(&contents).map_err(|e| format!("JSON parse error: {e}")),
            other => Err(format!("unsupported config extension: {other}")),
        };
        parsed.map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    fn apply_env(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(path) = (self.env)("STRATA_DATABASE_PATH") {
            config.database.path = self.absolute(Path::new(&path));
        }
        if let Some(dir) = (self.env)("STRATA_MIGRATIONS_DIR") {
            config.migrations.directory = self.absolute(Path::new(&dir));
        }
        if let Some(table) = (self.env)("STRATA_VERSION_TABLE") {
            config.migrations.version_table = table;
        }
        if let Some(level) = (self.env)("STRATA_LOG_LEVEL") {
            config.log.level = level;
        }
        if let Some(format) = (self.env)("STRATA_LOG_FORMAT") {
            config.log.format = format
                .parse::<LogFormat>()
                .map_err(|e| Error::Config(format!("STRATA_LOG_FORMAT: {e}")))?;
        }
        Ok(())
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

fn resolve(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}
