//! The load-time interceptor.
//!
//! Per unit: read the source, look for the marker, and either step aside or
//! check the cache, rewrite, compile with the host and write the artifact.
//! The cache hash covers the tool magic as well as the source, so a new tool
//! version misses on every unit, and artifacts the host wrote without the
//! interceptor never validate here (nor ours on the host path).

use std::{fs, path::Path, sync::Arc};

use crate::{
    compiled::Rewriter,
    config::InterceptorConfig,
    error::LoadError,
    loader::{
        UnitLoader,
        cache::{self, FLAG_CHECK_SOURCE, FLAG_HASH_BASED},
        chain::{LoadOutcome, LoadedUnit},
        has_marker,
        host::HostCompiler,
    },
};

/// Terminal state of one intercepted load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intercepted {
    /// No marker; the unit belongs to the next loader.
    PassThrough,
    CacheHit(Vec<u8>),
    /// Rewritten and compiled; the artifact was written unless disabled.
    Compiled(Vec<u8>),
}

/// Routes marked units through the static engine before the host compiler.
pub struct PrefabInterceptor {
    config: InterceptorConfig,
    host: Arc<dyn HostCompiler>,
    rewriter: Rewriter,
}

impl std::fmt::Debug for PrefabInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefabInterceptor")
            .field("config", &self.config)
            .field("cache_tag", &self.host.cache_tag())
            .finish_non_exhaustive()
    }
}

impl PrefabInterceptor {
    pub fn new(config: InterceptorConfig, host: Arc<dyn HostCompiler>) -> Self {
        let rewriter = Rewriter::new(config.library_module.clone());
        Self { config, host, rewriter }
    }

    #[must_use]
    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    /// Validity hash of `source` as this interceptor computes it.
    #[must_use]
    pub fn source_hash(&self, source: &[u8]) -> [u8; 8] {
        let mut input = Vec::with_capacity(self.config.tool_magic.len() + source.len());
        input.extend_from_slice(&self.config.tool_magic);
        input.extend_from_slice(source);
        cache::source_hash(&self.host.format_magic(), &input)
    }

    /// Runs the per-unit state machine on `path`.
    pub fn intercept(&self, path: &Path) -> Result<Intercepted, LoadError> {
        let source = fs::read(path).map_err(|error| LoadError::io(path, &error))?;
        if !has_marker(&source, &self.config.marker) {
            tracing::trace!(path = %path.display(), "pass_through");
            return Ok(Intercepted::PassThrough);
        }

        let magic = self.host.format_magic();
        let hash = self.source_hash(&source);
        let artifact = cache::cache_path(path, &self.config.cache_dir, self.host.cache_tag());
        match cache::read(&artifact, &magic, &hash) {
            Ok(payload) => {
                tracing::debug!(path = %path.display(), "cache_hit");
                return Ok(Intercepted::CacheHit(payload));
            }
            Err(reason) => tracing::debug!(path = %path.display(), %reason, "cache_miss"),
        }

        let text = std::str::from_utf8(&source).map_err(|error| LoadError::Decode {
            path: path.to_owned(),
            message: error.to_string(),
        })?;
        let rewritten = self.rewriter.rewrite(text).map_err(|error| LoadError::Transform {
            path: path.to_owned(),
            error,
        })?;
        let payload = self.host.compile(rewritten.as_bytes(), path)?;

        if self.config.write_cache {
            let bytes = cache::encode(&magic, FLAG_HASH_BASED | FLAG_CHECK_SOURCE, &hash, &payload);
            match cache::write_atomic(&artifact, &bytes) {
                Ok(()) => tracing::debug!(path = %artifact.display(), "cache_write"),
                Err(error) => tracing::warn!(path = %artifact.display(), %error, "cache_write failed"),
            }
        }
        Ok(Intercepted::Compiled(payload))
    }
}

impl UnitLoader for PrefabInterceptor {
    fn name(&self) -> &str {
        "prefab-interceptor"
    }

    fn is_interceptor(&self) -> bool {
        true
    }

    fn load(&self, path: &Path) -> Result<Option<LoadedUnit>, LoadError> {
        if path.extension().is_none_or(|ext| ext != "py") || !path.is_file() {
            return Ok(None);
        }
        let (outcome, payload) = match self.intercept(path)? {
            Intercepted::PassThrough => return Ok(None),
            Intercepted::CacheHit(payload) => (LoadOutcome::CacheHit, payload),
            Intercepted::Compiled(payload) => (LoadOutcome::Compiled, payload),
        };
        Ok(Some(LoadedUnit {
            path: path.to_owned(),
            loader: self.name().to_owned(),
            outcome,
            payload,
        }))
    }
}
