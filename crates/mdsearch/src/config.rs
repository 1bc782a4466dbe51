//! Search defaults loaded from a JSON config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const DEFAULT_LIMIT: usize = 200;
pub const MAX_LIMIT: usize = 1000;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchConfig {
    /// Limit used when a request does not set one.
    pub default_limit: usize,
    /// Upper clamp for caller limits.
    pub max_limit: usize,
    pub default_timeout_ms: u64,
    /// Scopes used when a query names no paths. Empty means the whole
    /// indexed volume.
    pub default_scopes: Vec<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            default_scopes: Vec::new(),
        }
    }
}

impl SearchConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&data)?;
        log::debug!("loaded search config from {}", path.display());
        Ok(config)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Resolves a caller limit: default when absent, then clamped into
    /// `1..=max_limit`.
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        let ceiling = self.max_limit.max(1);
        requested.unwrap_or(self.default_limit).clamp(1, ceiling)
    }
}
