//! Storage configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_POOL_CHUNK_SIZE, DEFAULT_TUPLES_PER_TILE_GROUP, MAX_TUPLES_PER_TILE_GROUP,
    MIN_POOL_CHUNK_SIZE,
};
use crate::error::{StrataError, StrataResult};
use crate::memory::HeapBackend;

/// Configuration for tile storage.
///
/// # Example
///
/// ```rust
/// use strata_common::config::StorageConfig;
///
/// let config = StorageConfig::default().with_tuples_per_tile_group(64);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.tuples_per_tile_group, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Number of tuple slots in every tile group a table allocates.
    pub tuples_per_tile_group: usize,

    /// Size of each chunk the variable-length pool requests from the backend.
    pub pool_chunk_size: usize,

    /// Upper bound on bytes the heap backend hands out. `None` means unbounded.
    pub backend_limit_bytes: Option<usize>,

    /// Whether foreign tile streams are decoded with full header validation.
    pub validate_headers: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            tuples_per_tile_group: DEFAULT_TUPLES_PER_TILE_GROUP,
            pool_chunk_size: DEFAULT_POOL_CHUNK_SIZE,
            backend_limit_bytes: None,
            validate_headers: true,
        }
    }
}

impl StorageConfig {
    /// Creates a new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a small configuration for testing.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            tuples_per_tile_group: 8,
            pool_chunk_size: MIN_POOL_CHUNK_SIZE,
            ..Default::default()
        }
    }

    /// Sets the number of slots per tile group.
    #[must_use]
    pub fn with_tuples_per_tile_group(mut self, tuples: usize) -> Self {
        self.tuples_per_tile_group = tuples;
        self
    }

    /// Sets the pool chunk size.
    #[must_use]
    pub fn with_pool_chunk_size(mut self, size: usize) -> Self {
        self.pool_chunk_size = size;
        self
    }

    /// Sets the backend byte limit.
    #[must_use]
    pub fn with_backend_limit(mut self, limit: Option<usize>) -> Self {
        self.backend_limit_bytes = limit;
        self
    }

    /// Enables or disables header validation for foreign streams.
    #[must_use]
    pub fn with_header_validation(mut self, enabled: bool) -> Self {
        self.validate_headers = enabled;
        self
    }

    /// Heap backend honouring `backend_limit_bytes`.
    #[must_use]
    pub fn heap_backend(&self) -> HeapBackend {
        HeapBackend::from_limit(self.backend_limit_bytes)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> StrataResult<()> {
        if self.tuples_per_tile_group == 0 {
            return Err(StrataError::invalid_config(
                "tuples_per_tile_group must be greater than zero",
            ));
        }

        if self.tuples_per_tile_group > MAX_TUPLES_PER_TILE_GROUP {
            return Err(StrataError::invalid_config(format!(
                "tuples_per_tile_group must be at most {}",
                MAX_TUPLES_PER_TILE_GROUP
            )));
        }

        if self.pool_chunk_size < MIN_POOL_CHUNK_SIZE {
            return Err(StrataError::invalid_config(format!(
                "pool_chunk_size must be at least {} bytes",
                MIN_POOL_CHUNK_SIZE
            )));
        }

        if self.backend_limit_bytes == Some(0) {
            return Err(StrataError::invalid_config(
                "backend_limit_bytes must be greater than zero when set",
            ));
        }

        Ok(())
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> StrataResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| StrataError::invalid_config(format!("failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a TOML file.
    pub fn from_file(path: &Path) -> StrataResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Converts the configuration to a TOML string.
    pub fn to_toml(&self) -> StrataResult<String> {
        toml::to_string_pretty(self).map_err(|e| {
            StrataError::invalid_config(format!("failed to serialize configuration: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = StorageConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tuples_per_tile_group, DEFAULT_TUPLES_PER_TILE_GROUP);
        assert!(config.validate_headers);
        assert!(StorageConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = StorageConfig::default().with_tuples_per_tile_group(0);
        assert!(config.validate().is_err());

        let config = StorageConfig::default().with_pool_chunk_size(16);
        assert!(config.validate().is_err());

        let config = StorageConfig::default().with_backend_limit(Some(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = StorageConfig::from_toml_str("tuples_per_tile_group = 32\n").unwrap();
        assert_eq!(config.tuples_per_tile_group, 32);
        assert_eq!(config.pool_chunk_size, DEFAULT_POOL_CHUNK_SIZE);
        assert_eq!(config.backend_limit_bytes, None);
    }

    #[test]
    fn test_toml_roundtrip_through_file() {
        let config = StorageConfig::default()
            .with_tuples_per_tile_group(128)
            .with_backend_limit(Some(1 << 20))
            .with_header_validation(false);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml().unwrap().as_bytes()).unwrap();

        let loaded = StorageConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = StorageConfig::from_toml_str("tuples_per_tile_group = \"many\"").unwrap_err();
        assert!(matches!(err, StrataError::InvalidConfig { .. }));
    }

    #[test]
    fn test_heap_backend_uses_limit() {
        let config = StorageConfig::default().with_backend_limit(Some(4096));
        assert_eq!(config.heap_backend().limit(), Some(4096));
        assert_eq!(StorageConfig::default().heap_backend().limit(), None);
    }
}
