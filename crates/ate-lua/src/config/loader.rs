//! Configuration loader with hierarchical merging.
//!
//! # Load Order
//!
//! 1. Default values
//! 2. Global config (`~/.ate/config.toml`)
//! 3. Project config (`.ate/config.toml`)
//! 4. Environment variables (`ATE_*`)
//!
//! Each layer overrides the previous.

use super::{default_config_path, AteConfig, ConfigError, CONFIG_FILE, PROJECT_CONFIG_DIR};
use std::path::{Path, PathBuf};
use tracing::debug;

macro_rules! parse_env_bool {
    ($field:expr, $var:literal) => {
        if let Ok(val) = std::env::var($var) {
            $field = parse_bool(&val)
                .ok_or_else(|| ConfigError::invalid_env_var($var, "expected bool"))?;
        }
    };
}

/// Configuration loader with builder pattern.
///
/// ```
/// use ate_lua::config::{AteConfig, ConfigLoader};
///
/// let config = ConfigLoader::new()
///     .skip_global_config()
///     .skip_project_config()
///     .skip_env_vars()
///     .load()
///     .expect("defaults always load");
/// assert_eq!(config, AteConfig::default());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    global_config_path: Option<PathBuf>,
    project_root: Option<PathBuf>,
    skip_env: bool,
    skip_global: bool,
    skip_project: bool,
}

impl ConfigLoader {
    /// Creates a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom global config path.
    #[must_use]
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Sets the project root; its config is `<root>/.ate/config.toml`.
    #[must_use]
    pub fn with_project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    /// Skips environment variable loading.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Skips global config loading.
    #[must_use]
    pub fn skip_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    /// Skips project config loading.
    #[must_use]
    pub fn skip_project_config(mut self) -> Self {
        self.skip_project = true;
        self
    }

    /// Loads and merges configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a config file exists but cannot be read or
    /// parsed, or an environment variable has an invalid value. Missing files
    /// are ignored.
    pub fn load(&self) -> Result<AteConfig, ConfigError> {
        let mut config = AteConfig::default();

        if !self.skip_global {
            let global_path = self
                .global_config_path
                .clone()
                .unwrap_or_else(default_config_path);
            if let Some(global) = load_file(&global_path)? {
                debug!(path = %global_path.display(), "Loaded global config");
                config.merge(&global);
            }
        }

        if !self.skip_project {
            if let Some(ref root) = self.project_root {
                let path = root.join(PROJECT_CONFIG_DIR).join(CONFIG_FILE);
                if let Some(project) = load_file(&path)? {
                    debug!(path = %path.display(), "Loaded project config");
                    config.merge(&project);
                }
            }
        }

        if !self.skip_env {
            apply_env_vars(&mut config)?;
        }

        Ok(config)
    }
}

fn load_file(path: &Path) -> Result<Option<AteConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let config = AteConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;
    Ok(Some(config))
}

fn apply_env_vars(config: &mut AteConfig) -> Result<(), ConfigError> {
    parse_env_bool!(config.debug, "ATE_DEBUG");
    parse_env_bool!(
        config.runtime.cancel_subscriptions_on_shutdown,
        "ATE_CANCEL_ON_SHUTDOWN"
    );

    if let Ok(val) = std::env::var("ATE_CALL_TIMEOUT_MS") {
        let ms: u64 = val
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid_env_var("ATE_CALL_TIMEOUT_MS", "expected milliseconds"))?;
        config.runtime.call_timeout_ms = (ms > 0).then_some(ms);
    }

    if let Ok(val) = std::env::var("ATE_APPS_DIR") {
        config.apps.dir = Some(PathBuf::from(val));
    }

    if let Ok(val) = std::env::var("ATE_LOG_LEVEL") {
        config.logging.level = val;
    }

    Ok(())
}

/// Accepts "true", "false", "1", "0", "yes", "no", "on", "off" (any case).
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
