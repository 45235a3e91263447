//! Global configuration options.

use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options for the crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with
/// [`global_config_mut`].
///
/// ## Validate On Construction
/// > default: `true`
///
/// Whether [`CompressedSparseMatrix`](crate::matrix::sparse::CompressedSparseMatrix)
/// and related constructors validate their inputs (monotonic `indptr`,
/// ascending in-bounds indices) by default. Trusted producers that have
/// already validated their data can opt out per-construction regardless of
/// this default.
///
/// ## Default Chunk Cache Size
/// > default: `64 MiB`
///
/// The cache budget, in bytes, used by [`CustomChunkedMatrix`](crate::chunked::CustomChunkedMatrix)
/// extractors that don't specify one explicitly.
///
/// ## Concurrency Chunk Threshold
/// > default: `4`
///
/// Below this many chunks or independent extractors, [`apply`](crate::apply::apply)-driven
/// traversal and chunked extraction run single-threaded; at or above it,
/// work is split across [`concurrency::recommended_concurrency`](crate::concurrency::recommended_concurrency)
/// threads.
#[derive(Debug)]
pub struct Config {
    validate_on_construction: bool,
    default_chunk_cache_size_bytes: u64,
    concurrency_chunk_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            validate_on_construction: true,
            default_chunk_cache_size_bytes: 64 * 1024 * 1024,
            concurrency_chunk_threshold: 4,
        }
    }
}

impl Config {
    /// Get the [validate on construction](#validate-on-construction) configuration.
    #[must_use]
    pub fn validate_on_construction(&self) -> bool {
        self.validate_on_construction
    }

    /// Set the [validate on construction](#validate-on-construction) configuration.
    pub fn set_validate_on_construction(&mut self, validate: bool) {
        self.validate_on_construction = validate;
    }

    /// Get the [default chunk cache size](#default-chunk-cache-size) configuration, in bytes.
    #[must_use]
    pub fn default_chunk_cache_size_bytes(&self) -> u64 {
        self.default_chunk_cache_size_bytes
    }

    /// Set the [default chunk cache size](#default-chunk-cache-size) configuration, in bytes.
    pub fn set_default_chunk_cache_size_bytes(&mut self, size_bytes: u64) {
        self.default_chunk_cache_size_bytes = size_bytes;
    }

    /// Get the [concurrency chunk threshold](#concurrency-chunk-threshold) configuration.
    #[must_use]
    pub fn concurrency_chunk_threshold(&self) -> usize {
        self.concurrency_chunk_threshold
    }

    /// Set the [concurrency chunk threshold](#concurrency-chunk-threshold) configuration.
    pub fn set_concurrency_chunk_threshold(&mut self, threshold: usize) {
        self.concurrency_chunk_threshold = threshold;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global configuration.
///
/// # Panics
/// Panics if the underlying lock has been poisoned.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap()
}

/// Returns a mutable reference to the global configuration.
///
/// # Panics
/// Panics if the underlying lock has been poisoned.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validate_on_construction() {
        assert!(global_config().validate_on_construction());
        global_config_mut().set_validate_on_construction(false);
        assert!(!global_config().validate_on_construction());
        global_config_mut().set_validate_on_construction(true);
    }
}
