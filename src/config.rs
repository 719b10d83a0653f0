//! Configuration for FrostKV
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};

/// Main configuration for a FrostKV server instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all collections
    pub data_dir: PathBuf,

    /// Default maximum items per segment for collections created over the wire
    pub default_max_items_per_segment: usize,

    /// Default segment file size in bytes for collections created over the wire
    pub default_segment_capacity_bytes: u64,

    /// Default number of versions retained per collection
    pub default_max_versions_to_keep: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address; port 0 lets the OS choose
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    // -------------------------------------------------------------------------
    // Feed Configuration
    // -------------------------------------------------------------------------
    /// Capacity of the bounded queue between the socket reader and the
    /// feeder thread; the reader blocks when full
    pub feed_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./frostkv_data"),
            default_max_items_per_segment: 1_000_000,
            default_segment_capacity_bytes: 1 << 30, // 1 GiB
            default_max_versions_to_keep: 3,
            listen_addr: "127.0.0.1:9450".to_string(),
            max_connections: 1024,
            feed_queue_capacity: 1_000_000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the root data directory
    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    /// Set the default maximum items per segment
    pub fn default_max_items_per_segment(mut self, count: usize) -> Self {
        self.config.default_max_items_per_segment = count;
        self
    }

    /// Set the default segment file size in bytes
    pub fn default_segment_capacity_bytes(mut self, bytes: u64) -> Self {
        self.config.default_segment_capacity_bytes = bytes;
        self
    }

    /// Set the default number of retained versions
    pub fn default_max_versions_to_keep(mut self, count: usize) -> Self {
        self.config.default_max_versions_to_keep = count;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr<S: Into<String>>(mut self, addr: S) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the feed queue capacity
    pub fn feed_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.feed_queue_capacity = capacity;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
