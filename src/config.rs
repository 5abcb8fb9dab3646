//! Agent configuration from the environment.

use std::str::FromStr;
use std::time::Duration;

use crate::bus::{port_for_channel, DEFAULT_ACK_TIMEOUT};
use crate::runtime::{
    OrchestratorSettings, DEFAULT_DEBOUNCE, DEFAULT_SOURCE_EXTENSION, DEFAULT_SOURCE_ROOT,
};

pub const DEFAULT_CHANNEL: &str = "xlivepreview-exchange";
pub const DEFAULT_BUILD_TOOL: &str = "swift";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub channel: String,
    pub port: Option<u16>,
    pub build_tool: String,
    pub source_root: String,
    pub source_extension: String,
    pub debounce: Duration,
    pub ack_timeout: Duration,
    /// `None` keeps every cached preview set.
    pub cache_capacity: Option<usize>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            port: None,
            build_tool: DEFAULT_BUILD_TOOL.to_string(),
            source_root: DEFAULT_SOURCE_ROOT.to_string(),
            source_extension: DEFAULT_SOURCE_EXTENSION.to_string(),
            debounce: DEFAULT_DEBOUNCE,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            cache_capacity: None,
        }
    }
}

impl AgentConfig {
    /// Load `.env` if present, then read `LIVEPREVIEW_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, fallback: String| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(fallback)
        };

        Ok(Self {
            channel: text("LIVEPREVIEW_CHANNEL", defaults.channel),
            port: parse_optional(&lookup, "LIVEPREVIEW_PORT")?,
            build_tool: text("LIVEPREVIEW_BUILD_TOOL", defaults.build_tool),
            source_root: text("LIVEPREVIEW_SOURCE_ROOT", defaults.source_root),
            source_extension: text("LIVEPREVIEW_SOURCE_EXT", defaults.source_extension)
                .trim_start_matches('.')
                .to_string(),
            debounce: parse_optional(&lookup, "LIVEPREVIEW_DEBOUNCE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.debounce),
            ack_timeout: parse_optional(&lookup, "LIVEPREVIEW_ACK_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.ack_timeout),
            cache_capacity: parse_optional::<usize, _>(&lookup, "LIVEPREVIEW_CACHE_CAPACITY")?
                .filter(|capacity| *capacity > 0),
        })
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| port_for_channel(&self.channel))
    }

    pub fn orchestrator_settings(&self, tool_path: impl Into<std::path::PathBuf>) -> OrchestratorSettings {
        OrchestratorSettings {
            tool_path: tool_path.into(),
            source_root_marker: self.source_root.clone(),
            source_extension: self.source_extension.clone(),
            debounce: self.debounce,
            cache_capacity: self.cache_capacity,
        }
    }
}

fn parse_optional<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        })
}
