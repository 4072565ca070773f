//! Engine configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lpml::ParseOptions;
use crate::tools::InterruptPrecedence;

/// Errors loading an [`EngineConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that was read
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// Config file is not valid JSON for this schema
    #[error("invalid config {path}: {source}")]
    Invalid {
        /// Path that was read
        path: String,
        /// Parser error
        #[source]
        source: serde_json::Error,
    },
    /// Config document is not valid JSON for this schema
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tunables for parsing and tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long to wait for the render surface to answer a capture request
    #[serde(with = "duration_ms")]
    pub screenshot_timeout: Duration,
    /// Pause between the preview settling and asking for a capture
    #[serde(with = "duration_ms")]
    pub settle_delay: Duration,
    /// Which interrupt wins when a response contains several
    pub interrupt_precedence: InterruptPrecedence,
    /// How agent responses are parsed
    pub parse: ParseOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            screenshot_timeout: Duration::from_secs(8),
            settle_delay: Duration::from_millis(500),
            interrupt_precedence: InterruptPrecedence::default(),
            parse: ParseOptions::agent(),
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Invalid {
            path: display,
            source,
        })
    }

    /// Parse a JSON config document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Helper for serializing Duration as milliseconds
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
