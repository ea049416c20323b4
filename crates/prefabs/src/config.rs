//! Interceptor configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Comment line that opts a compilation unit into static processing.
pub const DEFAULT_MARKER: &str = "# COMPILE_PREFABS";
/// Tool version folded into every cache-validity hash.
pub const PREFAB_MAGIC_BYTES: &[u8] = b"PREFAB_CLASSES_v0.9.3";
/// Setting this to a non-empty value disables artifact writes.
pub const DONT_WRITE_CACHE_ENV: &str = "PREFABS_DONT_WRITE_CACHE";

/// Settings of a [`PrefabInterceptor`](crate::loader::PrefabInterceptor).
///
/// Every field has a default, so a JSON document only needs the keys it
/// changes:
///
/// ```
/// let config = prefabs::InterceptorConfig::from_json(r#"{"write_cache": false}"#).unwrap();
/// assert_eq!(config.marker, "# COMPILE_PREFABS");
/// assert!(!config.write_cache);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    pub marker: String,
    /// Bumping this invalidates every artifact the interceptor wrote.
    #[serde(with = "magic")]
    pub tool_magic: Vec<u8>,
    pub write_cache: bool,
    /// Directory, next to each unit, that holds its artifacts.
    pub cache_dir: String,
    /// Module whose now-unused imports are dropped from rewritten units.
    pub library_module: String,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_owned(),
            tool_magic: PREFAB_MAGIC_BYTES.to_vec(),
            write_cache: true,
            cache_dir: "__pycache__".to_owned(),
            library_module: crate::names::LIBRARY_MODULE.to_owned(),
        }
    }
}

impl InterceptorConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, crate::LoadError> {
        let text = std::fs::read_to_string(path).map_err(|error| crate::LoadError::io(path, &error))?;
        Self::from_json(&text).map_err(|error| crate::LoadError::Config {
            path: path.to_owned(),
            message: error.to_string(),
        })
    }

    /// Applies `PREFABS_DONT_WRITE_CACHE` from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies environment overrides read through `lookup`.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if lookup(DONT_WRITE_CACHE_ENV).is_some_and(|value| !value.is_empty()) {
            self.write_cache = false;
        }
        self
    }

    #[must_use]
    pub fn tool_magic(mut self, magic: impl Into<Vec<u8>>) -> Self {
        self.tool_magic = magic.into();
        self
    }
}

/// The tool magic reads and writes as text when it is valid UTF-8.
mod magic {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(magic: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(magic) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => serializer.serialize_bytes(magic),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Magic {
        Text(String),
        Bytes(Vec<u8>),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        Ok(match Magic::deserialize(deserializer)? {
            Magic::Text(text) => text.into_bytes(),
            Magic::Bytes(bytes) => bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_disables_writes() {
        let config = InterceptorConfig::default().with_overrides_from(|key| (key == DONT_WRITE_CACHE_ENV).then(|| "1".to_owned()));
        assert!(!config.write_cache);
        let config = InterceptorConfig::default().with_overrides_from(|_| Some(String::new()));
        assert!(config.write_cache);
    }

    #[test]
    fn magic_round_trips_as_text() {
        let json = serde_json::to_string(&InterceptorConfig::default()).unwrap();
        assert!(json.contains(r#""tool_magic":"PREFAB_CLASSES_v0.9.3""#));
        assert_eq!(InterceptorConfig::from_json(&json).unwrap(), InterceptorConfig::default());
    }

    #[test]
    fn magic_accepts_byte_arrays() {
        let config = InterceptorConfig::from_json(r#"{"tool_magic": [1, 2, 3]}"#).unwrap();
        assert_eq!(config.tool_magic, [1, 2, 3]);
    }
}
