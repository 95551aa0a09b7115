use std::path::{Path, PathBuf};

use bruttus_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Builds an [`AppConfig`] from defaults, an optional YAML file, a `.env`
/// file and the process environment, in that order of precedence (last wins).
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit config file. Unlike the default location, an explicit
    /// path that does not exist is an error.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// `~/.bruttus/config.yml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".bruttus").join("config.yml"))
    }

    /// The YAML file [`Self::load`] reads, if any.
    pub fn source(&self) -> Option<PathBuf> {
        match &self.path {
            Some(path) => Some(path.clone()),
            None => Self::default_path().filter(|path| path.is_file()),
        }
    }

    pub fn load(&self) -> Result<AppConfig> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::Config(format!("failed to read .env: {e}"))),
        }

        let mut config = self.load_file()?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load only the YAML layer (defaults when no file is present).
    pub fn load_file(&self) -> Result<AppConfig> {
        match &self.path {
            Some(path) => {
                if !path.is_file() {
                    return Err(Error::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                read_yaml(path)
            }
            None => match Self::default_path() {
                Some(path) if path.is_file() => read_yaml(&path),
                _ => {
                    debug!("no config file found, using defaults");
                    Ok(AppConfig::default())
                }
            },
        }
    }
}

fn read_yaml(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    let config: AppConfig = serde_yaml::from_str(&contents)
        .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))?;
    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Overlay environment values onto `config`. `lookup` is injected so callers
/// (and tests) decide where values come from.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(key) = non_blank(GEMINI_API_KEY_ENV) {
        config.providers.gemini.api_key = Some(key);
    }
    if let Some(key) = non_blank(OPENAI_API_KEY_ENV) {
        config.providers.openai.api_key = Some(key);
    }
    if let Some(model) = non_blank("BRUTTUS_GEMINI_MODEL") {
        config.providers.gemini.model = model;
    }
    if let Some(model) = non_blank("BRUTTUS_OPENAI_MODEL") {
        config.providers.openai.model = model;
    }
    if let Some(ms) = non_blank("BRUTTUS_COOLDOWN_MS").and_then(|v| v.trim().parse().ok()) {
        config.dispatcher.cooldown_ms = ms;
    }
    if let Some(level) = non_blank("BRUTTUS_LOG_LEVEL") {
        config.log_level = Some(level);
    }
}
