//! The ordered list of active unit loaders.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError},
};

use crate::{
    error::LoadError,
    loader::{
        interceptor::PrefabInterceptor,
        host::{HostLoader, SourceHost},
    },
};

/// How a loader produced a unit's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    CacheHit,
    Compiled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedUnit {
    pub path: PathBuf,
    /// Name of the loader that claimed the unit.
    pub loader: String,
    pub outcome: LoadOutcome,
    pub payload: Vec<u8>,
}

/// One entry of a [`LoaderChain`].
pub trait UnitLoader: Send + Sync {
    fn name(&self) -> &str;

    /// Loads units straight from the filesystem, like the host's own loader.
    fn is_path_based(&self) -> bool {
        false
    }

    fn is_interceptor(&self) -> bool {
        false
    }

    /// Loads `path`, or returns `None` to leave it to the next loader.
    fn load(&self, path: &Path) -> Result<Option<LoadedUnit>, LoadError>;
}

/// Loaders are asked in order; the first to claim a unit loads it.
///
/// Activation and deactivation are meant to nest like scopes. The chain is
/// not built for independent threads racing to activate.
#[derive(Default)]
pub struct LoaderChain {
    loaders: Mutex<Vec<Arc<dyn UnitLoader>>>,
}

impl std::fmt::Debug for LoaderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

static GLOBAL: LazyLock<LoaderChain> =
    LazyLock::new(|| LoaderChain::with_loaders(vec![Arc::new(HostLoader::new(Arc::new(SourceHost::default())))]));

impl LoaderChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loaders(loaders: Vec<Arc<dyn UnitLoader>>) -> Self {
        Self {
            loaders: Mutex::new(loaders),
        }
    }

    /// The process-wide chain, holding a host loader over [`SourceHost`].
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Arc<dyn UnitLoader>>> {
        self.loaders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, loader: Arc<dyn UnitLoader>) {
        self.entries().push(loader);
    }

    /// Loader names, in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries().iter().map(|loader| loader.name().to_owned()).collect()
    }

    #[must_use]
    pub fn has_interceptor(&self) -> bool {
        self.entries().iter().any(|loader| loader.is_interceptor())
    }

    /// Inserts `interceptor` just before the first path-based loader, or at
    /// the end if there is none. Returns `false`, changing nothing, when an
    /// interceptor is already active.
    pub fn insert_interceptor(&self, interceptor: Arc<PrefabInterceptor>) -> bool {
        let mut loaders = self.entries();
        if loaders.iter().any(|loader| loader.is_interceptor()) {
            return false;
        }
        let index = loaders.iter().position(|loader| loader.is_path_based()).unwrap_or(loaders.len());
        loaders.insert(index, interceptor);
        tracing::debug!(index, "inserted prefab interceptor");
        true
    }

    /// Removes the active interceptor. Returns `false` when there is none.
    pub fn remove_interceptor(&self) -> bool {
        let mut loaders = self.entries();
        let before = loaders.len();
        loaders.retain(|loader| !loader.is_interceptor());
        let removed = loaders.len() != before;
        if removed {
            tracing::debug!("removed prefab interceptor");
        }
        removed
    }

    /// Activates `interceptor` until the returned guard drops.
    ///
    /// A scope opened while an interceptor is already active leaves it in
    /// place on exit, so nested scopes compose.
    pub fn scope(&self, interceptor: Arc<PrefabInterceptor>) -> InterceptorScope<'_> {
        let inserted = self.insert_interceptor(interceptor);
        InterceptorScope { chain: self, inserted }
    }

    /// Loads `path` with the first loader that claims it.
    pub fn load(&self, path: &Path) -> Result<LoadedUnit, LoadError> {
        let loaders: Vec<Arc<dyn UnitLoader>> = self.entries().clone();
        for loader in loaders {
            if let Some(unit) = loader.load(path)? {
                return Ok(unit);
            }
        }
        Err(LoadError::NotFound { path: path.to_owned() })
    }
}

/// Keeps an interceptor active on a [`LoaderChain`] while alive.
#[derive(Debug)]
#[must_use = "the interceptor is removed when the scope is dropped"]
pub struct InterceptorScope<'a> {
    chain: &'a LoaderChain,
    inserted: bool,
}

impl InterceptorScope<'_> {
    /// Whether this scope did the activation and will undo it.
    #[must_use]
    pub fn is_owner(&self) -> bool {
        self.inserted
    }
}

impl Drop for InterceptorScope<'_> {
    fn drop(&mut self) {
        if self.inserted {
            self.chain.remove_interceptor();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::InterceptorConfig, loader::host::HostCompiler};

    struct Named(&'static str);

    impl UnitLoader for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn load(&self, _path: &Path) -> Result<Option<LoadedUnit>, LoadError> {
            Ok(None)
        }
    }

    fn interceptor() -> Arc<PrefabInterceptor> {
        let host: Arc<dyn HostCompiler> = Arc::new(SourceHost::default());
        Arc::new(PrefabInterceptor::new(InterceptorConfig::default(), host))
    }

    fn chain() -> LoaderChain {
        LoaderChain::with_loaders(vec![
            Arc::new(Named("builtin")),
            Arc::new(HostLoader::new(Arc::new(SourceHost::default()))),
        ])
    }

    #[test]
    fn interceptor_goes_before_the_path_loader() {
        let chain = chain();
        assert!(chain.insert_interceptor(interceptor()));
        assert_eq!(chain.names(), ["builtin", "prefab-interceptor", "host"]);
        assert!(!chain.insert_interceptor(interceptor()));
        assert_eq!(chain.names().len(), 3);
        assert!(chain.remove_interceptor());
        assert!(!chain.remove_interceptor());
        assert_eq!(chain.names(), ["builtin", "host"]);
    }

    #[test]
    fn nested_scopes() {
        let chain = chain();
        {
            let outer = chain.scope(interceptor());
            assert!(outer.is_owner());
            {
                let inner = chain.scope(interceptor());
                assert!(!inner.is_owner());
            }
            assert!(chain.has_interceptor());
        }
        assert!(!chain.has_interceptor());
    }

    #[test]
    fn unclaimed_units() {
        let chain = LoaderChain::new();
        assert!(matches!(chain.load(Path::new("missing.py")), Err(LoadError::NotFound { .. })));
    }
}
