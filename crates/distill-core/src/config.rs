//! Generation settings.
//!
//! Every tunable the pipeline uses lives here so the front end can persist it
//! and tests can shrink timeouts or chunk sizes.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default local model server endpoint (Ollama generate API).
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/api/generate";

/// Default model name.
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Settings for the generation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// URL of the streaming generate endpoint
    pub endpoint: String,
    /// Model name sent with every request
    pub model: String,
    /// Hard timeout for one request, including reading the stream
    pub request_timeout_secs: u64,
    /// Prompts longer than this (in characters) are truncated before sending
    pub max_prompt_chars: usize,
    /// Extra attempts after a transient network failure
    pub transport_retries: u32,
    /// Documents longer than this (in characters) are chunked
    pub chunk_threshold: usize,
    /// Target maximum chunk length in characters
    pub max_chunk_size: usize,
    /// Characters carried from the end of one chunk into the next
    pub chunk_overlap: usize,
    /// Extra quiz attempts after invalid output
    pub quiz_max_retries: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout_secs: 120,
            max_prompt_chars: 8_000,
            transport_retries: 2,
            chunk_threshold: 6_000,
            max_chunk_size: 6_000,
            chunk_overlap: 500,
            quiz_max_retries: 2,
        }
    }
}

impl GenerationSettings {
    /// Load settings from a JSON file, falling back to defaults.
    ///
    /// A missing file is normal on first run. An unreadable or malformed file
    /// is logged and ignored so a bad edit never blocks generation.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path)
            .context("Failed to read settings file")
            .and_then(|raw| serde_json::from_str(&raw).context("Failed to parse settings file"))
        {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Using default settings");
                Self::default()
            }
        }
    }

    /// Write settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create settings directory")?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).context("Failed to write settings file")?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
