/// Default upper bound on features per block
pub const DEFAULT_MAX_BLOCK_FEATURES: usize = 20_000;

/// Default number of records between progress reports and cancellation checks
pub const DEFAULT_PROGRESS_INTERVAL: usize = 10_000;

/// Default number of decoded blocks kept per open track
pub const DEFAULT_CACHE_BLOCKS: usize = 100;

/// Tuning for bulk imports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportConfig {
    /// Upper bound on features per block; bounds the memory needed to load any one block
    pub max_block_features: usize,
    pub progress_interval: usize,
}

impl ImportConfig {
    pub fn new() -> Self {
        Self {
            max_block_features: DEFAULT_MAX_BLOCK_FEATURES,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Values below 1 are raised to 1
    pub fn with_max_block_features(mut self, max_block_features: usize) -> Self {
        self.max_block_features = max_block_features.max(1);
        self
    }

    pub fn with_progress_interval(mut self, progress_interval: usize) -> Self {
        self.progress_interval = progress_interval.max(1);
        self
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Tuning for the read side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub cache_blocks: usize,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self {
            cache_blocks: DEFAULT_CACHE_BLOCKS,
        }
    }

    /// A capacity of 0 disables caching
    pub fn with_cache_blocks(mut self, cache_blocks: usize) -> Self {
        self.cache_blocks = cache_blocks;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = ImportConfig::default()
            .with_max_block_features(0)
            .with_progress_interval(500);
        assert_eq!(config.max_block_features, 1);
        assert_eq!(config.progress_interval, 500);
        assert_eq!(ImportConfig::new().max_block_features, 20_000);
        assert_eq!(StoreConfig::default().with_cache_blocks(0).cache_blocks, 0);
    }
}
