//! Configuration types.
//!
//! All types implement [`Default`]; every field is optional in TOML.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure, after merging all layers.
///
/// ```
/// use ate_lua::config::AteConfig;
///
/// let config = AteConfig::default();
/// assert!(!config.debug);
/// assert!(config.runtime.cancel_subscriptions_on_shutdown);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AteConfig {
    /// Enable debug logging.
    pub debug: bool,

    /// Script runtime behavior.
    pub runtime: RuntimeConfig,

    /// Application script location.
    pub apps: AppsConfig,

    /// Log output.
    pub logging: LoggingConfig,
}

impl AteConfig {
    /// Deserializes from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Serializes to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Merges another config into this one.
    ///
    /// Values from `other` override values in `self` only if they
    /// differ from the default.
    pub fn merge(&mut self, other: &Self) {
        if other.debug {
            self.debug = true;
        }
        self.runtime.merge(&other.runtime);
        self.apps.merge(&other.apps);
        self.logging.merge(&other.logging);
    }
}

/// Settings applied to every script runtime a manager creates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Deadline for a single guarded operation, in milliseconds.
    ///
    /// `None` lets script code run for as long as it wants.
    pub call_timeout_ms: Option<u64>,

    /// Whether shutting down or removing a runtime cancels the event
    /// subscriptions its scripts created.
    ///
    /// With `false`, forwarding continues until the bus closes each channel,
    /// and deliveries into the stopped runtime are dropped.
    pub cancel_subscriptions_on_shutdown: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: None,
            cancel_subscriptions_on_shutdown: true,
        }
    }
}

impl RuntimeConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();
        if other.call_timeout_ms.is_some() {
            self.call_timeout_ms = other.call_timeout_ms;
        }
        if other.cancel_subscriptions_on_shutdown != default.cancel_subscriptions_on_shutdown {
            self.cancel_subscriptions_on_shutdown = other.cancel_subscriptions_on_shutdown;
        }
    }
}

/// Where application scripts live.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppsConfig {
    /// Directory containing one subdirectory of `*.lua` files per app.
    pub dir: Option<PathBuf>,
}

impl AppsConfig {
    fn merge(&mut self, other: &Self) {
        if other.dir.is_some() {
            self.dir.clone_from(&other.dir);
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when neither flags nor `RUST_LOG` are set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

impl LoggingConfig {
    fn merge(&mut self, other: &Self) {
        if other.level != Self::default().level {
            self.level.clone_from(&other.level);
        }
    }
}
