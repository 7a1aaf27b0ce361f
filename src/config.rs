//! Server Configuration
//!
//! [`Config`] is the immutable record the binary builds once at startup
//! and hands to the engine, the connection pipeline and the accept loop.
//! There is no reload: changing a value means restarting the server.

use std::time::Duration;
use thiserror::Error;

/// Errors found by [`Config::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("shard count must be at least 1")]
    NoShards,

    #[error("sweep interval must be greater than zero")]
    ZeroSweepInterval,

    #[error("shard queue depth must be at least 1")]
    ZeroQueueDepth,

    #[error("low watermark ({low}) must be below high watermark ({high})")]
    Watermarks { low: usize, high: usize },

    #[error("maximum bulk length must be at least 1 byte")]
    ZeroMaxBulk,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Number of keyspace partitions, each with its own executor
    pub shards: usize,
    /// Interval between active expiry sweeps
    pub sweep_interval: Duration,
    /// Outbound bytes at which a connection stops reading requests
    pub write_high_watermark: usize,
    /// Outbound bytes below which a paused connection resumes
    pub write_low_watermark: usize,
    /// Jobs a shard queue holds before senders wait
    pub shard_queue_depth: usize,
    /// Largest bulk string a client may send
    pub max_bulk: usize,
    /// Tokio worker threads for I/O (None = one per core)
    pub io_threads: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: crate::DEFAULT_PORT,
            shards: 16,
            sweep_interval: Duration::from_millis(100),
            write_high_watermark: 1024 * 1024,
            write_low_watermark: 256 * 1024,
            shard_queue_depth: 256,
            max_bulk: crate::protocol::MAX_BULK_SIZE,
            io_threads: None,
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shards == 0 {
            return Err(ConfigError::NoShards);
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroSweepInterval);
        }
        if self.shard_queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        if self.write_low_watermark >= self.write_high_watermark {
            return Err(ConfigError::Watermarks {
                low: self.write_low_watermark,
                high: self.write_high_watermark,
            });
        }
        if self.max_bulk == 0 {
            return Err(ConfigError::ZeroMaxBulk);
        }
        Ok(())
    }

    /// Name/value pairs exposed through `CONFIG GET`.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("bind", self.host.clone()),
            ("port", self.port.to_string()),
            ("shards", self.shards.to_string()),
            ("sweep-interval-ms", self.sweep_interval.as_millis().to_string()),
            ("write-high-watermark", self.write_high_watermark.to_string()),
            ("write-low-watermark", self.write_low_watermark.to_string()),
            ("shard-queue-depth", self.shard_queue_depth.to_string()),
            ("proto-max-bulk-len", self.max_bulk.to_string()),
            (
                "io-threads",
                self.io_threads.map(|n| n.to_string()).unwrap_or_else(|| "0".to_string()),
            ),
            ("databases", "1".to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.bind_address(), "127.0.0.1:6379");
        assert_eq!(config.shards, 16);
        assert_eq!(config.sweep_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_rejects_zero_shards() {
        let config = Config {
            shards: 0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoShards));
    }

    #[test]
    fn test_rejects_inverted_watermarks() {
        let config = Config {
            write_high_watermark: 100,
            write_low_watermark: 100,
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Watermarks { low: 100, high: 100 })
        );
    }

    #[test]
    fn test_rejects_zero_interval_and_depth() {
        let config = Config {
            sweep_interval: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroSweepInterval));

        let config = Config {
            shard_queue_depth: 0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroQueueDepth));
    }

    #[test]
    fn test_entries_cover_port() {
        let config = Config::default();
        assert!(config
            .entries()
            .iter()
            .any(|(name, value)| *name == "port" && value == "6379"));
    }
}
