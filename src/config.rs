//! Replica configuration, read from TOML.
//!
//! ```toml
//! checkpoint_interval = 50
//! data_dir = "/var/lib/catalog"
//! repair_denormalized_after_batch = true
//! yield_between_checkpoints = true
//!
//! [relink_policy_full]
//! clear_existing = true
//!
//! [relink_policy_incremental]
//! clear_existing = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::batch::{BatchOptions, DEFAULT_CHECKPOINT_INTERVAL};
use crate::error::ReplicaError;
use crate::link::RelinkPolicy;
use crate::store::FileEntityStore;
use crate::sync::SyncType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaConfig {
    /// Records between durable commits.
    pub checkpoint_interval: usize,
    /// Directory of the file-backed store.
    pub data_dir: Option<PathBuf>,
    pub relink_policy_full: RelinkPolicy,
    pub relink_policy_incremental: RelinkPolicy,
    pub repair_denormalized_after_batch: bool,
    pub yield_between_checkpoints: bool,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            data_dir: None,
            relink_policy_full: RelinkPolicy::FULL_REBUILD,
            relink_policy_incremental: RelinkPolicy::ADDITIVE,
            repair_denormalized_after_batch: true,
            yield_between_checkpoints: true,
        }
    }
}

impl ReplicaConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ReplicaError> {
        let config: ReplicaConfig =
            toml::from_str(contents).map_err(|e| ReplicaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplicaError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| ReplicaError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ReplicaError> {
        if self.checkpoint_interval == 0 {
            return Err(ReplicaError::Config(
                "checkpoint_interval must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Batch settings for one kind of sync cycle.
    pub fn batch_options(&self, sync_type: SyncType) -> BatchOptions {
        let relink_policy = match sync_type {
            SyncType::Full => self.relink_policy_full,
            SyncType::Incremental => self.relink_policy_incremental,
        };
        BatchOptions {
            checkpoint_interval: self.checkpoint_interval,
            relink_policy,
            repair_denormalized: self.repair_denormalized_after_batch,
            yield_between_checkpoints: self.yield_between_checkpoints,
        }
    }

    /// Open the file-backed store under `data_dir`.
    pub fn open_store(&self) -> Result<FileEntityStore, ReplicaError> {
        let dir = self
            .data_dir
            .as_ref()
            .ok_or_else(|| ReplicaError::Config("data_dir is not set".into()))?;
        Ok(FileEntityStore::open(dir)?)
    }
}
