use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pool::DEFAULT_BUCKET_SIZES;

/// Configuration for a frame-deferred buffer pool.
///
/// The deferral and cull constants are workload-dependent tuning knobs,
/// not correctness parameters, so they are configuration rather than
/// hardcoded values. The one correctness requirement is
/// `num_safe_frames >= 1`: a freed buffer must wait at least one frame
/// boundary before the GPU is guaranteed done with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Frames a freed buffer waits before becoming reusable (default: 3)
    pub num_safe_frames: u32,

    /// Unused age, in frames, after which an available buffer is
    /// destroyed to reclaim memory (default: 10)
    pub cull_after_frames: u64,

    /// Maximum buffers destroyed per frame advance, bounding cull work
    /// so a mass release cannot hitch a frame (default: 100)
    pub max_drains_per_frame: usize,

    /// Ascending size-class thresholds in bytes. Requests round up to
    /// the smallest bucket that fits; larger requests bypass the pool.
    pub bucket_sizes: Vec<u32>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_safe_frames: 3,
            cull_after_frames: 10,
            max_drains_per_frame: 100,
            bucket_sizes: DEFAULT_BUCKET_SIZES.to_vec(),
        }
    }
}

impl PoolConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.num_safe_frames == 0 {
            return Err(Error::InvalidConfig(
                "num_safe_frames must be at least 1".to_string(),
            ));
        }

        if self.bucket_sizes.is_empty() {
            return Err(Error::InvalidConfig(
                "bucket_sizes must not be empty".to_string(),
            ));
        }

        for pair in self.bucket_sizes.windows(2) {
            if pair[0] >= pair[1] {
                return Err(Error::InvalidConfig(format!(
                    "bucket_sizes must be strictly increasing ({} then {})",
                    pair[0], pair[1]
                )));
            }
        }

        if self.bucket_sizes[0] == 0 {
            return Err(Error::InvalidConfig(
                "bucket sizes must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Largest pooled request size in bytes.
    #[inline]
    pub fn max_bucket_size(&self) -> u32 {
        *self.bucket_sizes.last().unwrap_or(&0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_safe_frames, 3);
        assert_eq!(config.cull_after_frames, 10);
        assert_eq!(config.max_drains_per_frame, 100);
        assert_eq!(config.max_bucket_size(), 1_048_576);
    }

    #[test]
    fn test_zero_safe_frames_rejected() {
        let config = PoolConfig {
            num_safe_frames: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_buckets_rejected() {
        let config = PoolConfig {
            bucket_sizes: vec![],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_non_increasing_buckets_rejected() {
        let config = PoolConfig {
            bucket_sizes: vec![64, 128, 128, 256],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = PoolConfig {
            bucket_sizes: vec![256, 128],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_bucket_rejected() {
        let config = PoolConfig {
            bucket_sizes: vec![0, 64],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_custom_table() {
        let config = PoolConfig {
            bucket_sizes: vec![64, 128, 256, 512],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.max_bucket_size(), 512);
    }
}
