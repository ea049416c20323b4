//! Load-time interception of compilation units.
//!
//! A [`LoaderChain`] asks its loaders in order. The host's own
//! [`HostLoader`] compiles `.py` files and caches the result under a hash
//! of the raw source. A [`PrefabInterceptor`], placed in front of it, claims
//! only units that carry the opt-in marker, rewrites them with the static
//! engine and caches them under a hash that also covers the tool magic.

mod cache;
mod chain;
mod host;
mod interceptor;
mod marker;

pub use cache::{FLAG_CHECK_SOURCE, FLAG_HASH_BASED, HEADER_LEN, cache_path, encode, source_hash};
pub use chain::{InterceptorScope, LoadOutcome, LoadedUnit, LoaderChain, UnitLoader};
pub use host::{HostCompiler, HostLoader, SourceHost};
pub use interceptor::{Intercepted, PrefabInterceptor};
pub use marker::has_marker;
