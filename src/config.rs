//! Server configuration module.
//!
//! Handles loading, validating, and merging the `config.toml` file. Stock
//! defaults are the base layer; the user's file only needs the keys it wants
//! to override. A missing file means "all defaults".
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! images_dir = "images"               # Source images, stored as <identifier>.<ext>
//! cache_dir = "iiifCache"             # Rendered responses
//! base_url = "http://localhost:8080"  # Public URL used in info.json @id
//!
//! [server]
//! bind = "0.0.0.0"
//! port = 8080
//! # workers = 4                       # Request threads (omit for auto = CPU cores)
//!
//! [tools]
//! convert = "convert"                 # ImageMagick transform binary
//! identify = "identify"               # ImageMagick probe binary
//! probe = "identify"                  # "identify" or "native"
//! timeout_secs = 30                   # Hard limit per external process
//! # memory_limit = "256MiB"           # Passed as -limit memory
//!
//! [cache]
//! enabled = true
//! ```
//!
//! ## Environment
//!
//! `CONVERT_MEM_LIMIT`, when set and non-empty, overrides `tools.memory_limit`.
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::ProbeMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `tools.memory_limit`.
pub const MEMORY_LIMIT_ENV: &str = "CONVERT_MEM_LIMIT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration loaded from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Directory holding the source images.
    pub images_dir: String,
    /// Directory holding rendered responses.
    pub cache_dir: String,
    /// Scheme and authority clients use to reach this server.
    pub base_url: String,
    pub server: ServerSection,
    pub tools: ToolsConfig,
    pub cache: CacheConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            images_dir: "images".to_string(),
            cache_dir: "iiifCache".to_string(),
            base_url: "http://localhost:8080".to_string(),
            server: ServerSection::default(),
            tools: ToolsConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port must be non-zero".into(),
            ));
        }
        if self.server.workers == Some(0) {
            return Err(ConfigError::Validation(
                "server.workers must be at least 1".into(),
            ));
        }
        if self.tools.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "tools.timeout_secs must be non-zero".into(),
            ));
        }
        if self.tools.convert.trim().is_empty() || self.tools.identify.trim().is_empty() {
            return Err(ConfigError::Validation(
                "tools.convert and tools.identify must not be empty".into(),
            ));
        }
        if let Some(limit) = &self.tools.memory_limit
            && (limit.is_empty() || !limit.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            return Err(ConfigError::Validation(format!(
                "tools.memory_limit must be alphanumeric (e.g. \"256MiB\"), got {limit:?}"
            )));
        }
        Ok(())
    }

    pub fn images_path(&self) -> PathBuf {
        PathBuf::from(&self.images_dir)
    }

    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(&self.cache_dir)
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,
    /// Number of request-handling threads.
    /// When absent or null, defaults to the number of CPU cores.
    pub workers: Option<usize>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            workers: None,
        }
    }
}

impl ServerSection {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Resolve the effective request thread count.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `n`; request threads mostly wait on subprocesses, so
///   more than the core count is allowed
pub fn effective_threads(config: &ServerSection) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.workers.unwrap_or(cores)
}

/// External tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    pub convert: String,
    pub identify: String,
    /// How source dimensions are read.
    pub probe: ProbeMode,
    /// Kill an external process after this many seconds.
    pub timeout_secs: u64,
    /// ImageMagick `-limit memory` value.
    pub memory_limit: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            convert: "convert".to_string(),
            identify: "identify".to_string(),
            probe: ProbeMode::default(),
            timeout_secs: 30,
            memory_limit: None,
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ServerConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, apply the memory-limit
/// override, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
    memory_limit_env: Option<String>,
) -> Result<ServerConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let mut config: ServerConfig = merged.try_into()?;
    if let Some(limit) = memory_limit_env.filter(|v| !v.is_empty()) {
        config.tools.memory_limit = Some(limit);
    }
    config.validate()?;
    Ok(config)
}

/// Load config from the TOML file at `path`.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// applies `CONVERT_MEM_LIMIT`, and validates the result.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay, std::env::var(MEMORY_LIMIT_ENV).ok())
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# IIIF Server Configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Source images, stored flat as <identifier>.<ext>
# (jpg, tif, png, gif, jp2, pdf or webp).
images_dir = "images"

# Rendered responses, one file per request. Never evicted; delete the
# directory to clear it.
cache_dir = "iiifCache"

# Scheme and authority clients use to reach this server.
# Used to build the @id of info.json documents.
base_url = "http://localhost:8080"

# ---------------------------------------------------------------------------
# HTTP listener
# ---------------------------------------------------------------------------
[server]
bind = "0.0.0.0"
port = 8080

# Request-handling threads.
# Omit or comment out to auto-detect (= number of CPU cores).
# workers = 4

# ---------------------------------------------------------------------------
# External tools (ImageMagick)
# ---------------------------------------------------------------------------
[tools]
convert = "convert"
identify = "identify"

# How source dimensions are read: "identify" spawns ImageMagick,
# "native" reads the file header in-process (jpg, png, tif, gif, webp only).
probe = "identify"

# Kill convert/identify after this many seconds.
timeout_secs = 30

# ImageMagick memory ceiling, passed as `-limit memory <value>`.
# The CONVERT_MEM_LIMIT environment variable overrides this.
# memory_limit = "256MiB"

# ---------------------------------------------------------------------------
# Response cache
# ---------------------------------------------------------------------------
[cache]
# When false, every request is rendered. Concurrent identical requests
# still share one render.
enabled = true
"##
}
