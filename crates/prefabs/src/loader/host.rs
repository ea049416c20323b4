//! The host compiler seam and the host's own path-based loader.

use std::{fs, path::Path, sync::Arc};

use crate::{
    error::LoadError,
    loader::{
        UnitLoader,
        cache::{self, FLAG_CHECK_SOURCE, FLAG_HASH_BASED},
        chain::{LoadOutcome, LoadedUnit},
    },
};

/// Turns (possibly rewritten) source into the payload stored in artifacts.
pub trait HostCompiler: Send + Sync {
    /// Identifies the artifact format; artifacts with another magic are stale.
    fn format_magic(&self) -> [u8; 4];

    /// Infix of artifact file names, e.g. `cpython-312`.
    fn cache_tag(&self) -> &str;

    fn compile(&self, source: &[u8], path: &Path) -> Result<Vec<u8>, LoadError>;
}

/// Stores the source text itself as the payload.
#[derive(Debug, Clone)]
pub struct SourceHost {
    magic: [u8; 4],
    tag: String,
}

impl Default for SourceHost {
    fn default() -> Self {
        Self::new(*b"PFB\n", "prefabs")
    }
}

impl SourceHost {
    pub fn new(magic: [u8; 4], tag: impl Into<String>) -> Self {
        Self { magic, tag: tag.into() }
    }
}

impl HostCompiler for SourceHost {
    fn format_magic(&self) -> [u8; 4] {
        self.magic
    }

    fn cache_tag(&self) -> &str {
        &self.tag
    }

    fn compile(&self, source: &[u8], _path: &Path) -> Result<Vec<u8>, LoadError> {
        Ok(source.to_vec())
    }
}

/// The host's ordinary loader for `.py` files, with hash-validated caching
/// over the raw source.
pub struct HostLoader {
    host: Arc<dyn HostCompiler>,
    cache_dir: String,
    write_cache: bool,
}

impl std::fmt::Debug for HostLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostLoader")
            .field("cache_tag", &self.host.cache_tag())
            .field("cache_dir", &self.cache_dir)
            .field("write_cache", &self.write_cache)
            .finish_non_exhaustive()
    }
}

impl HostLoader {
    pub fn new(host: Arc<dyn HostCompiler>) -> Self {
        Self {
            host,
            cache_dir: "__pycache__".to_owned(),
            write_cache: true,
        }
    }

    #[must_use]
    pub fn cache_dir(mut self, cache_dir: impl Into<String>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    #[must_use]
    pub fn write_cache(mut self, write_cache: bool) -> Self {
        self.write_cache = write_cache;
        self
    }

    #[must_use]
    pub fn host(&self) -> &Arc<dyn HostCompiler> {
        &self.host
    }
}

impl UnitLoader for HostLoader {
    fn name(&self) -> &str {
        "host"
    }

    fn is_path_based(&self) -> bool {
        true
    }

    fn load(&self, path: &Path) -> Result<Option<LoadedUnit>, LoadError> {
        if path.extension().is_none_or(|ext| ext != "py") || !path.is_file() {
            return Ok(None);
        }
        let source = fs::read(path).map_err(|error| LoadError::io(path, &error))?;
        let magic = self.host.format_magic();
        let hash = cache::source_hash(&magic, &source);
        let artifact = cache::cache_path(path, &self.cache_dir, self.host.cache_tag());

        match cache::read(&artifact, &magic, &hash) {
            Ok(payload) => {
                tracing::trace!(path = %path.display(), "host cache hit");
                return Ok(Some(LoadedUnit {
                    path: path.to_owned(),
                    loader: self.name().to_owned(),
                    outcome: LoadOutcome::CacheHit,
                    payload,
                }));
            }
            Err(reason) => tracing::trace!(path = %path.display(), %reason, "host cache miss"),
        }

        let payload = self.host.compile(&source, path)?;
        if self.write_cache {
            let bytes = cache::encode(&magic, FLAG_HASH_BASED | FLAG_CHECK_SOURCE, &hash, &payload);
            if let Err(error) = cache::write_atomic(&artifact, &bytes) {
                tracing::warn!(path = %artifact.display(), %error, "could not write cache artifact");
            }
        }
        Ok(Some(LoadedUnit {
            path: path.to_owned(),
            loader: self.name().to_owned(),
            outcome: LoadOutcome::Compiled,
            payload,
        }))
    }
}
