//! Feed cache configuration
//!
//! Configuration is loaded from environment variables with defaults that
//! work out of the box for local development.

use std::path::PathBuf;

use url::Url;

use crate::ConfigError;

/// Which persistence backend stores the cached feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// One JSON document on disk.
    #[default]
    JsonFile,
    /// Linked cache and image records in an LMDB environment.
    Lmdb,
}

impl StoreBackend {
    /// Parse the value of `FEEDCACHE_BACKEND`.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "json" | "file" => Ok(Self::JsonFile),
            "lmdb" => Ok(Self::Lmdb),
            other => Err(ConfigError::InvalidValue {
                field: "FEEDCACHE_BACKEND".to_string(),
                value: other.to_string(),
                reason: "expected json or lmdb".to_string(),
            }),
        }
    }

    /// Default on-disk location for this backend.
    pub fn default_store_path(&self) -> PathBuf {
        let base = std::env::temp_dir().join("feedcache");
        match self {
            Self::JsonFile => base.join("feed-store.json"),
            Self::Lmdb => base.join("lmdb"),
        }
    }
}

/// Feed cache configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedCacheConfig {
    /// Persistence backend.
    pub backend: StoreBackend,

    /// File path (JSON backend) or environment directory (LMDB backend).
    pub store_path: PathBuf,

    /// Maximum LMDB map size in megabytes.
    pub lmdb_map_size_mb: usize,

    /// Endpoint the remote loader fetches the feed from.
    pub remote_url: Option<Url>,
}

impl Default for FeedCacheConfig {
    fn default() -> Self {
        let backend = StoreBackend::default();
        Self {
            backend,
            store_path: backend.default_store_path(),
            lmdb_map_size_mb: 10,
            remote_url: None,
        }
    }
}

impl FeedCacheConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create FeedCacheConfig from environment variables.
    ///
    /// Environment variables:
    /// - `FEEDCACHE_BACKEND`: "json" or "lmdb" (default: json)
    /// - `FEEDCACHE_STORE_PATH`: store file or directory (default: under the temp dir)
    /// - `FEEDCACHE_LMDB_MAP_SIZE_MB`: LMDB map size (default: 10)
    /// - `FEEDCACHE_REMOTE_URL`: feed endpoint (default: unset)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    ///
    /// `from_env` delegates here; tests pass a map instead of mutating the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("FEEDCACHE_BACKEND") {
            Some(value) => StoreBackend::parse(&value)?,
            None => StoreBackend::default(),
        };

        let store_path = lookup("FEEDCACHE_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| backend.default_store_path());

        let lmdb_map_size_mb = match lookup("FEEDCACHE_LMDB_MAP_SIZE_MB") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "FEEDCACHE_LMDB_MAP_SIZE_MB".to_string(),
                value: value.clone(),
                reason: "expected a positive integer".to_string(),
            })?,
            None => 10,
        };

        let remote_url = match lookup("FEEDCACHE_REMOTE_URL") {
            Some(value) => Some(Url::parse(value.trim()).map_err(|e| {
                ConfigError::InvalidValue {
                    field: "FEEDCACHE_REMOTE_URL".to_string(),
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };

        let config = Self {
            backend,
            store_path,
            lmdb_map_size_mb,
            remote_url,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the backend, resetting the store path to that backend's default.
    pub fn with_backend(mut self, backend: StoreBackend) -> Self {
        self.backend = backend;
        self.store_path = backend.default_store_path();
        self
    }

    /// Set the store path.
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    /// Set the LMDB map size.
    pub fn with_lmdb_map_size_mb(mut self, size: usize) -> Self {
        self.lmdb_map_size_mb = size;
        self
    }

    /// Set the remote feed endpoint.
    pub fn with_remote_url(mut self, url: Url) -> Self {
        self.remote_url = Some(url);
        self
    }

    /// Check the config for values no backend can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "FEEDCACHE_STORE_PATH".to_string(),
            });
        }
        if self.backend == StoreBackend::Lmdb && self.lmdb_map_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "FEEDCACHE_LMDB_MAP_SIZE_MB".to_string(),
                value: "0".to_string(),
                reason: "map size must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
