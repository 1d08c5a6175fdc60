use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_HISTORY_LIMIT: u32 = 20;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PLACEHOLDER_IMAGE: &str =
    "https://via.placeholder.com/120x120/e0e0e0/666666?text=No+Image";
pub const DEFAULT_CURRENCY: &str = "RM";

pub const ENV_BASE_URL: &str = "DIALSMART_BASE_URL";
pub const ENV_HISTORY_LIMIT: &str = "DIALSMART_HISTORY_LIMIT";
pub const ENV_TIMEOUT_SECS: &str = "DIALSMART_TIMEOUT_SECS";

/// Values read from the process environment. Unparseable numbers are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EnvSettings {
    pub base_url: Option<String>,
    pub history_limit: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl EnvSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            base_url: lookup(ENV_BASE_URL).filter(|s| !s.trim().is_empty()),
            history_limit: lookup(ENV_HISTORY_LIMIT).and_then(|s| s.trim().parse().ok()),
            timeout_secs: lookup(ENV_TIMEOUT_SECS).and_then(|s| s.trim().parse().ok()),
        }
    }
}

/// Per-invocation overrides, typically from command line flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SettingsOverrides {
    pub base_url: Option<String>,
    pub history_limit: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub placeholder_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WidgetSettings {
    pub base_url: String,
    pub history_limit: u32,
    pub timeout_secs: u64,
    pub placeholder_image: String,
    pub currency: String,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            placeholder_image: DEFAULT_PLACEHOLDER_IMAGE.into(),
            currency: DEFAULT_CURRENCY.into(),
        }
    }
}

impl WidgetSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub fn resolve_widget_settings(env: &EnvSettings, request: &SettingsOverrides) -> WidgetSettings {
    let defaults = WidgetSettings::default();
    WidgetSettings {
        base_url: request
            .base_url
            .clone()
            .or_else(|| env.base_url.clone())
            .unwrap_or(defaults.base_url),
        history_limit: request
            .history_limit
            .or(env.history_limit)
            .unwrap_or(defaults.history_limit),
        timeout_secs: request
            .timeout_secs
            .or(env.timeout_secs)
            .unwrap_or(defaults.timeout_secs),
        placeholder_image: request
            .placeholder_image
            .clone()
            .unwrap_or(defaults.placeholder_image),
        currency: defaults.currency,
    }
}
