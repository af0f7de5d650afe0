//! Configuration for the slot table and the decision log.
//!
//! These are plain serde structs with workable defaults. Loading them from
//! files or the environment is a concern of the embedding application, not
//! of this crate.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Requested size of one named allocator block.
///
/// Blocks are laid out left-to-right in declaration order; the table's
/// capacity is the sum of the block sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpec {
    /// Block name, unique within the table.
    pub name: String,
    /// Number of slots reserved for this block.
    pub size: u32,
}

impl BlockSpec {
    pub fn new(name: impl Into<String>, size: u32) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Configuration of the durable decision log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Path of the SQLite database file holding the decision log.
    pub db_path: PathBuf,
    /// Maximum decisions per flushed sub-batch; reaching this size in the
    /// buffer also triggers a flush.
    pub batch_size: usize,
    /// Flush interval: a non-empty buffer older than this is flushed even
    /// if it has not reached `batch_size`.
    pub write_frequency: Duration,
    /// Number of background writer workers committing sub-batches.
    pub writer_threads: usize,
    /// Window size used when reading the log back in ascending batches.
    pub read_batch: u64,
}

impl LogConfig {
    /// Log configuration rooted at the given database path.
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("quarry.db"),
            batch_size: 64,
            write_frequency: Duration::from_millis(200),
            writer_threads: 2,
            read_batch: 256,
        }
    }
}

/// Top-level store configuration: block layout plus log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Ordered block layout of the slot table.
    pub blocks: Vec<BlockSpec>,
    /// Block used for records that do not name one.
    pub default_block: String,
    /// Decision log settings.
    pub log: LogConfig,
}

impl StoreConfig {
    /// Store configuration with the default block layout, logging to the
    /// given database path.
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        Self {
            log: LogConfig::at(db_path),
            ..Self::default()
        }
    }

    /// Total capacity implied by the block layout.
    pub fn capacity(&self) -> u32 {
        self.blocks.iter().map(|b| b.size).sum()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            blocks: vec![BlockSpec::new("data", 1024), BlockSpec::new("system", 128)],
            default_block: "data".to_string(),
            log: LogConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_has_two_blocks() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.blocks.len(), 2);
        assert_eq!(cfg.capacity(), 1024 + 128);
        assert_eq!(cfg.default_block, "data");
    }

    #[test]
    fn config_at_overrides_only_the_path() {
        let cfg = StoreConfig::at("/tmp/test-quarry.db");
        assert_eq!(cfg.log.db_path, PathBuf::from("/tmp/test-quarry.db"));
        assert_eq!(cfg.log.batch_size, LogConfig::default().batch_size);
    }

    #[test]
    fn log_config_serde_round_trip() {
        let cfg = LogConfig {
            db_path: PathBuf::from("x.db"),
            batch_size: 8,
            write_frequency: Duration::from_millis(50),
            writer_threads: 1,
            read_batch: 16,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let restored: LogConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.batch_size, 8);
        assert_eq!(restored.write_frequency, Duration::from_millis(50));
    }
}
