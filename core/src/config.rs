//! Engine configuration
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. `sandscript.toml` in the working directory, or the file named by
//!    `SANDSCRIPT_CONFIG_PATH` (required when set)
//! 3. `SANDSCRIPT_*` environment variables, e.g. `SANDSCRIPT_TIMEOUT_MS`
//! 4. `USE_QUICKJS=false`, which selects the in-process backend
//!
//! A `.env` file is read into the environment first.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::host::isolate::WORKER_STACK_SIZE;
use crate::host::BackendKind;

pub const DEFAULT_CONFIG_FILE: &str = "sandscript.toml";
pub const CONFIG_PATH_ENV: &str = "SANDSCRIPT_CONFIG_PATH";
pub const ENV_PREFIX: &str = "SANDSCRIPT";
pub const LEGACY_BACKEND_ENV: &str = "USE_QUICKJS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: BackendKind,
    /// Run deadline in milliseconds; 0 disables it
    pub timeout_ms: u64,
    /// Compiled units kept by the engine's cache
    pub max_cached_units: usize,
    /// Route the builtin `console` through `tracing`
    pub console_passthrough: bool,
    /// Stack size of each isolate worker thread, in bytes
    pub isolate_stack_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Isolate,
            timeout_ms: 60_000,
            max_cached_units: 256,
            console_passthrough: false,
            isolate_stack_bytes: WORKER_STACK_SIZE,
        }
    }
}

impl EngineConfig {
    /// Load from the default sources
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let explicit = std::env::var(CONFIG_PATH_ENV).ok();
        let path = explicit.clone().unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
        let legacy = std::env::var(LEGACY_BACKEND_ENV).ok();
        Self::load_from(Some(Path::new(&path)), explicit.is_some(), legacy.as_deref())
    }

    /// Load with an explicit file and legacy flag value, environment included
    pub fn load_from(file: Option<&Path>, required: bool, legacy_flag: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Self::defaults()?;
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(required));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));
        if legacy_selects_in_process(legacy_flag) {
            builder = builder.set_override("backend", BackendKind::InProcess.as_str())?;
        }
        let config: EngineConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Parse TOML text over the defaults
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = Self::defaults()?
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let defaults = EngineConfig::default();
        Ok(Config::builder()
            .set_default("backend", defaults.backend.as_str())?
            .set_default("timeout_ms", defaults.timeout_ms)?
            .set_default("max_cached_units", defaults.max_cached_units as u64)?
            .set_default("console_passthrough", defaults.console_passthrough)?
            .set_default("isolate_stack_bytes", defaults.isolate_stack_bytes as u64)?)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

fn legacy_selects_in_process(flag: Option<&str>) -> bool {
    matches!(flag.map(|f| f.trim().to_ascii_lowercase()).as_deref(), Some("false" | "0" | "no"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_toml_overrides() {
        let config = EngineConfig::from_toml("backend = \"in_process\"\ntimeout_ms = 0").unwrap();
        assert_eq!(config.backend, BackendKind::InProcess);
        assert_eq!(config.timeout(), None);
        assert_eq!(config.max_cached_units, 256);
        assert_eq!(config.isolate_stack_bytes, WORKER_STACK_SIZE);
    }

    #[test]
    fn test_isolate_stack_override() {
        let config = EngineConfig::from_toml("isolate_stack_bytes = 8388608").unwrap();
        assert_eq!(config.isolate_stack_bytes, 8 * 1024 * 1024);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(EngineConfig::from_toml("backend = \"wasm\"").is_err());
    }

    #[test]
    fn test_legacy_flag() {
        assert!(legacy_selects_in_process(Some("false")));
        assert!(legacy_selects_in_process(Some(" FALSE ")));
        assert!(!legacy_selects_in_process(Some("true")));
        assert!(!legacy_selects_in_process(None));
    }

    #[test]
    fn test_missing_optional_file_is_fine() {
        let config = EngineConfig::load_from(Some(Path::new("does-not-exist.toml")), false, Some("false")).unwrap();
        assert_eq!(config.backend, BackendKind::InProcess);
    }
}
