//! Layered configuration for ate hosts.
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌────────────────────────────────────────┐
//! │  1. Environment Variables (ATE_*)      │
//! ├────────────────────────────────────────┤
//! │  2. Project Config (.ate/config.toml)  │
//! ├────────────────────────────────────────┤
//! │  3. Global Config (~/.ate/config.toml) │
//! ├────────────────────────────────────────┤
//! │  4. Default Values                     │
//! └────────────────────────────────────────┘
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `ATE_DEBUG` | `debug` | bool |
//! | `ATE_CALL_TIMEOUT_MS` | `runtime.call_timeout_ms` | u64 (0 disables) |
//! | `ATE_CANCEL_ON_SHUTDOWN` | `runtime.cancel_subscriptions_on_shutdown` | bool |
//! | `ATE_APPS_DIR` | `apps.dir` | PathBuf |
//! | `ATE_LOG_LEVEL` | `logging.level` | String |
//!
//! # Example Configuration
//!
//! ```toml
//! debug = false
//!
//! [runtime]
//! call_timeout_ms = 5000
//! cancel_subscriptions_on_shutdown = true
//!
//! [apps]
//! dir = "/srv/ate/apps"
//!
//! [logging]
//! level = "info"
//! ```

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::{AppsConfig, AteConfig, LoggingConfig, RuntimeConfig};

/// Default global config directory.
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".ate")
}

/// Default global config file path.
pub fn default_config_path() -> std::path::PathBuf {
    default_config_dir().join(CONFIG_FILE)
}

/// Project config directory name.
pub const PROJECT_CONFIG_DIR: &str = ".ate";

/// Config file name, in both the global and project directories.
pub const CONFIG_FILE: &str = "config.toml";
