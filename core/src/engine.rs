//! Engine setup
//!
//! An [`Engine`] pairs a configuration with a backend and a compilation
//! cache. Most callers use the process-wide engine behind
//! [`default_engine`], configured once through [`EngineBuilder::install`]
//! or lazily from the environment.
//!
//! ```rust,ignore
//! use sandscript_core::engine::EngineBuilder;
//! use sandscript_core::host::BackendKind;
//!
//! EngineBuilder::new()
//!     .backend(BackendKind::InProcess)
//!     .timeout_ms(5_000)
//!     .install()?;
//! ```

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, Context as _, Result};

use crate::compiler::{CompilationUnit, UnitCache};
use crate::config::EngineConfig;
use crate::errors::InvalidCodeError;
use crate::host::{Backend, BackendKind, InProcessBackend, IsolateBackend};

static DEFAULT_ENGINE: OnceLock<Engine> = OnceLock::new();

pub struct Engine {
    config: EngineConfig,
    backend: Arc<dyn Backend>,
    cache: UnitCache,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let backend: Arc<dyn Backend> = match config.backend {
            BackendKind::Isolate => Arc::new(IsolateBackend::new().with_stack_size(config.isolate_stack_bytes)),
            BackendKind::InProcess => Arc::new(InProcessBackend::new()),
        };
        Self::with_backend(config, backend)
    }

    /// Engine running on a caller-supplied backend
    pub fn with_backend(config: EngineConfig, backend: Arc<dyn Backend>) -> Self {
        let cache = UnitCache::new(config.max_cached_units);
        Self { config, backend, cache }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn cache(&self) -> &UnitCache {
        &self.cache
    }

    /// Compile through the cache
    pub fn compile(&self, source: &str) -> Result<Arc<CompilationUnit>, InvalidCodeError> {
        self.cache.get_or_compile(source)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("backend", &self.backend.kind())
            .field("cached_units", &self.cache.len())
            .finish()
    }
}

/// Overrides applied on top of the loaded configuration
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Use this configuration instead of loading one
    pub config: Option<EngineConfig>,
    /// Config file to load (overrides `SANDSCRIPT_CONFIG_PATH`)
    pub config_path: Option<PathBuf>,
    pub backend: Option<BackendKind>,
    pub timeout_ms: Option<u64>,
    pub max_cached_units: Option<usize>,
    pub console_passthrough: Option<bool>,
    pub isolate_stack_bytes: Option<usize>,
}

pub struct EngineBuilder {
    options: EngineOptions,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            options: EngineOptions::default(),
        }
    }

    /// Start from an explicit configuration, skipping files and environment
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.options.config = Some(config);
        self
    }

    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.options.backend = Some(backend);
        self
    }

    /// Run deadline; 0 disables it
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.options.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn max_cached_units(mut self, units: usize) -> Self {
        self.options.max_cached_units = Some(units);
        self
    }

    pub fn console_passthrough(mut self, enabled: bool) -> Self {
        self.options.console_passthrough = Some(enabled);
        self
    }

    /// Stack size of each isolate worker thread
    pub fn isolate_stack_bytes(mut self, bytes: usize) -> Self {
        self.options.isolate_stack_bytes = Some(bytes);
        self
    }

    pub fn build(self) -> Result<Engine> {
        build_engine(self.options)
    }

    /// Build and make this the process-wide engine
    pub fn install(self) -> Result<&'static Engine> {
        let engine = self.build()?;
        DEFAULT_ENGINE
            .set(engine)
            .map_err(|_| anyhow!("Default engine already initialized"))?;
        default_engine_ref().ok_or_else(|| anyhow!("Default engine missing after install"))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn build_engine(options: EngineOptions) -> Result<Engine> {
    let mut config = match (options.config, options.config_path) {
        (Some(config), _) => config,
        (None, Some(path)) => {
            let legacy = std::env::var(crate::config::LEGACY_BACKEND_ENV).ok();
            EngineConfig::load_from(Some(&path), true, legacy.as_deref())
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?
        }
        (None, None) => EngineConfig::load().context("Failed to load configuration")?,
    };

    if let Some(backend) = options.backend {
        config.backend = backend;
    }
    if let Some(timeout_ms) = options.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(units) = options.max_cached_units {
        config.max_cached_units = units;
    }
    if let Some(enabled) = options.console_passthrough {
        config.console_passthrough = enabled;
    }
    if let Some(bytes) = options.isolate_stack_bytes {
        config.isolate_stack_bytes = bytes;
    }

    tracing::debug!(backend = %config.backend, timeout_ms = config.timeout_ms, "engine configured");
    Ok(Engine::new(config))
}

fn default_engine_ref() -> Option<&'static Engine> {
    DEFAULT_ENGINE.get()
}

/// The process-wide engine, loaded from the environment on first use
pub fn default_engine() -> &'static Engine {
    DEFAULT_ENGINE.get_or_init(|| match EngineConfig::load() {
        Ok(config) => Engine::new(config),
        Err(err) => {
            tracing::warn!(error = %err, "invalid engine configuration, using defaults");
            Engine::new(EngineConfig::default())
        }
    })
}

pub fn is_initialized() -> bool {
    DEFAULT_ENGINE.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_explicit_config() {
        let engine = EngineBuilder::new()
            .config(EngineConfig::default())
            .backend(BackendKind::InProcess)
            .timeout_ms(0)
            .max_cached_units(2)
            .build()
            .unwrap();
        assert_eq!(engine.backend().kind(), BackendKind::InProcess);
        assert_eq!(engine.config().timeout(), None);
        assert_eq!(engine.config().max_cached_units, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_isolate_stack_size_from_builder() {
        let engine = EngineBuilder::new()
            .config(EngineConfig::default())
            .isolate_stack_bytes(16 * 1024 * 1024)
            .build()
            .unwrap();
        assert_eq!(engine.config().isolate_stack_bytes, 16 * 1024 * 1024);
        let source = "function depth(n) {\n  return n === 0 ? 0 : 1 + depth(n - 1)\n}\nreturn depth(50)";
        let outcome = engine
            .execute(&crate::runtime::Context::new(), source, None, None)
            .await
            .unwrap();
        assert_eq!(outcome.return_value().and_then(|v| v.as_f64()), Some(50.0));
    }

    #[test]
    fn test_compile_goes_through_cache() {
        let engine = Engine::new(EngineConfig::default());
        let first = engine.compile("return 1").unwrap();
        let second = engine.compile("return 1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.cache().len(), 1);
    }

    #[test]
    fn test_missing_config_path_fails() {
        let result = EngineBuilder::new().config_path("/nonexistent/sandscript.toml").build();
        assert!(result.is_err());
    }
}
