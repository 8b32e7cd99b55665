//! Tree configuration and durability options
//!
//! One `TreeConfig` is handed to every tree at construction or parse time.
//! It is plain data (serde) so it can be stored next to a tree file.

use crate::{Result, TreeError};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Smallest legal B-tree degree
pub const MIN_DEGREE: usize = 2;

/// What `insert` does when the key is already present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DuplicatePolicy {
    /// Overwrite the stored value and hand the old one back.
    ///
    /// The node keeps its node pointer, so a serialized file only changes
    /// in that record's payload.
    #[default]
    Replace,

    /// Refuse the insert with `TreeError::DuplicateKey`; the tree is untouched.
    Reject,
}

/// Durability of `serialize`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SyncMode {
    /// fsync the tree file and its directory before returning (default)
    #[default]
    Immediate,

    /// Leave the data in the OS buffers (tests, benchmarks)
    NoSync,
}

impl SyncMode {
    /// Should serialize fsync before returning?
    pub fn requires_sync(&self) -> bool {
        matches!(self, Self::Immediate)
    }
}

/// Configuration shared by all tree variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Duplicate-key policy for insert
    pub duplicates: DuplicatePolicy,

    /// Minimum degree `t` of the B-tree variant (ignored by binary variants)
    ///
    /// A node holds between `t - 1` and `2t - 1` keys.
    pub degree: usize,

    /// Durability of serialize
    pub sync: SyncMode,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            duplicates: DuplicatePolicy::default(),
            degree: MIN_DEGREE,
            sync: SyncMode::default(),
        }
    }
}

impl TreeConfig {
    /// Fastest settings, no fsync
    pub fn for_testing() -> Self {
        Self {
            sync: SyncMode::NoSync,
            ..Default::default()
        }
    }

    /// Wide B-tree nodes for large sequential loads
    pub fn for_bulk_load() -> Self {
        Self {
            degree: 64,
            ..Default::default()
        }
    }

    pub fn with_degree(mut self, degree: usize) -> Self {
        self.degree = degree;
        self
    }

    pub fn with_duplicates(mut self, duplicates: DuplicatePolicy) -> Self {
        self.duplicates = duplicates;
        self
    }

    pub fn with_sync(mut self, sync: SyncMode) -> Self {
        self.sync = sync;
        self
    }

    /// Reject settings no tree can run with
    pub fn validate(&self) -> Result<()> {
        if self.degree < MIN_DEGREE {
            return Err(TreeError::InvalidArgument(format!(
                "B-tree degree must be >= {}, got {}",
                MIN_DEGREE, self.degree
            )));
        }
        // Key counts are stored as i32 in the B-tree header.
        if self.degree > (i32::MAX as usize) / 2 {
            return Err(TreeError::InvalidArgument(format!(
                "B-tree degree {} is too large",
                self.degree
            )));
        }
        Ok(())
    }

    /// Read a config previously written by `save`
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: TreeConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut writer = BufWriter::new(file);
        let json = serde_json::to_string_pretty(self)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        if self.sync.requires_sync() {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}
