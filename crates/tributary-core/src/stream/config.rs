//! Stream configuration types.
//!
//! This module defines configuration types for the batcher and the merger.

use std::time::Duration;

use crate::error::ConfigError;

/// Default number of items per batch.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Default number of inputs a single merge forwarder waits on.
pub const DEFAULT_FAN_IN_WIDTH: usize = 10;

/// Default capacity of every channel the merger creates.
///
/// One slot is the closest tokio gets to an unbuffered hand-off.
pub const DEFAULT_MERGE_BUFFER: usize = 1;

// ---------------------------------------------------------------------------
// BatchConfig
// ---------------------------------------------------------------------------

/// Configuration for a batcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum items per batch. Zero falls back to [`DEFAULT_BATCH_SIZE`].
    pub size: usize,

    /// Maximum time a partial batch may linger.
    ///
    /// `None` or a zero duration disables the time bound.
    pub wait_limit: Option<Duration>,
}

impl BatchConfig {
    /// Creates a configuration with the given batch size and no time bound.
    #[must_use]
    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            wait_limit: None,
        }
    }

    /// Creates a builder for custom configuration.
    #[must_use]
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::default()
    }

    /// Returns the batch size actually used.
    #[must_use]
    pub fn effective_size(&self) -> usize {
        if self.size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            self.size
        }
    }

    /// Returns the wait limit actually used, if the time bound is enabled.
    #[must_use]
    pub fn effective_wait_limit(&self) -> Option<Duration> {
        self.wait_limit.filter(|limit| !limit.is_zero())
    }
}

/// Builder for `BatchConfig`.
#[derive(Debug, Default)]
pub struct BatchConfigBuilder {
    size: Option<usize>,
    wait_limit: Option<Duration>,
}

impl BatchConfigBuilder {
    /// Sets the maximum batch size.
    #[must_use]
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the wait limit.
    #[must_use]
    pub fn wait_limit(mut self, limit: Duration) -> Self {
        self.wait_limit = Some(limit);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> BatchConfig {
        BatchConfig {
            size: self.size.unwrap_or(DEFAULT_BATCH_SIZE),
            wait_limit: self.wait_limit,
        }
    }
}

// ---------------------------------------------------------------------------
// MergeConfig
// ---------------------------------------------------------------------------

/// Configuration for a merger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConfig {
    /// Maximum number of inputs a single forwarder task waits on.
    ///
    /// Larger fan-ins are split into buckets of this width and merged
    /// recursively.
    pub fan_in_width: usize,

    /// Capacity of the output channel and of every intermediate channel.
    pub buffer_size: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            fan_in_width: DEFAULT_FAN_IN_WIDTH,
            buffer_size: DEFAULT_MERGE_BUFFER,
        }
    }
}

impl MergeConfig {
    /// Creates a builder for custom configuration.
    #[must_use]
    pub fn builder() -> MergeConfigBuilder {
        MergeConfigBuilder::default()
    }
}

/// Builder for `MergeConfig`.
#[derive(Debug, Default)]
pub struct MergeConfigBuilder {
    fan_in_width: Option<usize>,
    buffer_size: Option<usize>,
}

impl MergeConfigBuilder {
    /// Sets the fan-in width.
    #[must_use]
    pub fn fan_in_width(mut self, width: usize) -> Self {
        self.fan_in_width = Some(width);
        self
    }

    /// Sets the channel capacity.
    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidFanInWidth`] if the width is below 2 and
    /// [`ConfigError::ZeroBuffer`] if the buffer size is zero.
    pub fn build(self) -> Result<MergeConfig, ConfigError> {
        let fan_in_width = self.fan_in_width.unwrap_or(DEFAULT_FAN_IN_WIDTH);
        if fan_in_width < 2 {
            return Err(ConfigError::InvalidFanInWidth(fan_in_width));
        }
        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_MERGE_BUFFER);
        if buffer_size == 0 {
            return Err(ConfigError::ZeroBuffer);
        }
        Ok(MergeConfig {
            fan_in_width,
            buffer_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_config_defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.effective_size(), DEFAULT_BATCH_SIZE);
        assert_eq!(config.effective_wait_limit(), None);
    }

    #[test]
    fn test_batch_config_zero_wait_limit_disables_timer() {
        let config = BatchConfig::builder()
            .size(8)
            .wait_limit(Duration::ZERO)
            .build();
        assert_eq!(config.effective_size(), 8);
        assert_eq!(config.effective_wait_limit(), None);
    }

    #[test]
    fn test_batch_config_builder() {
        let config = BatchConfig::builder()
            .size(5)
            .wait_limit(Duration::from_secs(60))
            .build();
        assert_eq!(config.effective_size(), 5);
        assert_eq!(config.effective_wait_limit(), Some(Duration::from_secs(60)));

        assert_eq!(BatchConfig::builder().size(0).build().effective_size(), 64);
    }

    #[test]
    fn test_merge_config_default() {
        let config = MergeConfig::default();
        assert_eq!(config.fan_in_width, 10);
        assert_eq!(config.buffer_size, 1);
        assert_eq!(MergeConfig::builder().build(), Ok(config));
    }

    #[test]
    fn test_merge_config_rejects_invalid_values() {
        assert_eq!(
            MergeConfig::builder().fan_in_width(1).build(),
            Err(ConfigError::InvalidFanInWidth(1))
        );
        assert_eq!(
            MergeConfig::builder().buffer_size(0).build(),
            Err(ConfigError::ZeroBuffer)
        );
        let config = MergeConfig::builder()
            .fan_in_width(2)
            .buffer_size(16)
            .build()
            .unwrap();
        assert_eq!(config.fan_in_width, 2);
        assert_eq!(config.buffer_size, 16);
    }
}
