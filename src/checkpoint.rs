//! Durable checkpoints of pipeline positions.
//!
//! [`DataPipeline::state_dict`] captures where a pipeline is; this module
//! writes such state dicts to disk so a training job can resume its data
//! stream after a crash or preemption.
//!
//! # Features
//!
//! - **Step-indexed files** - One file per `(pipeline_id, step)`, newest step wins
//! - **Transparent recovery** - [`CheckpointManager::restore_latest`] reloads a pipeline in one call
//! - **Retention** - Only the newest `max_checkpoints` files are kept
//! - **State verification** - Checksums ensure checkpoint integrity
//!
//! # Usage
//!
//! ```no_run
//! use datapipe::checkpoint::{CheckpointConfig, CheckpointManager};
//! use datapipe::{read_sequence, Data};
//! use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let manager = CheckpointManager::new(CheckpointConfig {
//!     enabled: true,
//!     directory: "./checkpoints".into(),
//!     auto_recover: true,
//!     max_checkpoints: Some(3),
//! })?;
//!
//! let mut pipeline = read_sequence((0..1000).map(Data::from).collect())
//!     .shuffle_with_seed(64, 7, true, true)
//!     .and_return()?;
//!
//! let mut step = manager.restore_latest("train", &mut pipeline)?.unwrap_or(0);
//! while let Some(_example) = pipeline.next()? {
//!     step += 1;
//!     if step % 100 == 0 {
//!         manager.save("train", step, &pipeline.state_dict()?)?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::pipeline::{DataPipeline, StateDict};
use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, create_dir_all, read_dir, remove_file};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Configuration for checkpoint behavior.
#[derive(Clone, Debug)]
pub struct CheckpointConfig {
    /// Enable or disable checkpointing.
    pub enabled: bool,
    /// Directory where checkpoint files are stored.
    pub directory: PathBuf,
    /// Let [`CheckpointManager::restore_latest`] reload the newest checkpoint.
    pub auto_recover: bool,
    /// Maximum number of checkpoints to retain per pipeline (oldest are deleted first).
    /// None means keep all checkpoints.
    pub max_checkpoints: Option<usize>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from("./datapipe_checkpoints"),
            auto_recover: true,
            max_checkpoints: Some(10),
        }
    }
}

/// A saved pipeline position, as stored on disk.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CheckpointState {
    /// Caller-chosen name of the pipeline.
    pub pipeline_id: String,
    /// Caller-chosen progress counter, usually the training step.
    pub step: u64,
    /// Timestamp when the checkpoint was created (milliseconds since epoch).
    pub timestamp: u64,
    /// SHA-256 checksum of the encoded state dict.
    pub checksum: String,
    /// The pipeline state dict.
    pub state: StateDict,
}

/// Manages checkpoint creation, persistence, and recovery.
pub struct CheckpointManager {
    config: CheckpointConfig,
}

impl CheckpointManager {
    /// Create a new checkpoint manager with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint directory cannot be created.
    pub fn new(config: CheckpointConfig) -> Result<Self> {
        if config.enabled {
            // Ensure the checkpoint directory exists
            create_dir_all(&config.directory).context("Failed to create checkpoint directory")?;
        }
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    /// Save a checkpoint to disk, then prune old ones.
    ///
    /// # Errors
    ///
    /// Returns an error if checkpointing is disabled or the file cannot be written.
    pub fn save(&self, pipeline_id: &str, step: u64, state: &StateDict) -> Result<PathBuf> {
        if !self.config.enabled {
            bail!("Checkpointing is disabled in the checkpoint configuration");
        }

        let checkpoint = CheckpointState {
            pipeline_id: pipeline_id.to_string(),
            step,
            timestamp: current_timestamp_ms(),
            checksum: compute_checksum(&encode_state(state)?),
            state: state.clone(),
        };

        let path = self.config.directory.join(checkpoint_file_name(pipeline_id, step));

        let encoded = postcard::to_allocvec(&checkpoint)
            .map_err(|e| anyhow!("Failed to serialize checkpoint: {e}"))?;

        let mut file = File::create(&path).context("Failed to create checkpoint file")?;
        file.write_all(&encoded)
            .context("Failed to write checkpoint")?;
        file.sync_all()
            .context("Failed to sync checkpoint to disk")?;

        debug!(pipeline_id, step, path = %path.display(), "checkpoint saved");

        // Clean up old checkpoints if needed
        self.cleanup_old_checkpoints(pipeline_id)?;

        Ok(path)
    }

    /// Find the checkpoint with the highest step for a given pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint directory cannot be read.
    pub fn find_latest(&self, pipeline_id: &str) -> Result<Option<PathBuf>> {
        if !self.config.enabled || !self.config.directory.exists() {
            return Ok(None);
        }

        Ok(self.list_checkpoints(pipeline_id)?.pop().map(|(_, path)| path))
    }

    /// Load and verify a checkpoint from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint file cannot be read or if the checksum verification fails.
    pub fn load(&self, path: &Path) -> Result<CheckpointState> {
        let mut file = File::open(path).context("Failed to open checkpoint file")?;
        let mut encoded = Vec::new();
        file.read_to_end(&mut encoded)
            .context("Failed to read checkpoint")?;

        let checkpoint: CheckpointState = postcard::from_bytes(&encoded)
            .map_err(|e| anyhow!("Failed to deserialize checkpoint: {e}"))?;

        // Verify checksum
        let computed_checksum = compute_checksum(&encode_state(&checkpoint.state)?);
        if computed_checksum != checkpoint.checksum {
            bail!("Checkpoint integrity check failed: checksum mismatch");
        }

        Ok(checkpoint)
    }

    /// Reload the newest checkpoint of `pipeline_id` into `pipeline`.
    ///
    /// Returns the restored step, or `None` if recovery is off or nothing was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be loaded or does not match the pipeline.
    pub fn restore_latest(&self, pipeline_id: &str, pipeline: &mut DataPipeline) -> Result<Option<u64>> {
        if !self.config.auto_recover {
            return Ok(None);
        }
        let Some(path) = self.find_latest(pipeline_id)? else {
            return Ok(None);
        };

        let checkpoint = self.load(&path)?;
        pipeline
            .load_state_dict(&checkpoint.state, true)
            .with_context(|| format!("Failed to restore pipeline from {}", path.display()))?;

        debug!(pipeline_id, step = checkpoint.step, "pipeline restored from checkpoint");
        Ok(Some(checkpoint.step))
    }

    /// Delete all checkpoints for a given pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint directory cannot be read.
    pub fn clear(&self, pipeline_id: &str) -> Result<()> {
        if !self.config.directory.exists() {
            return Ok(());
        }
        for (_, path) in self.list_checkpoints(pipeline_id)? {
            remove_file(path).ok();
        }
        Ok(())
    }

    /// Delete old checkpoints beyond the retention limit.
    fn cleanup_old_checkpoints(&self, pipeline_id: &str) -> Result<()> {
        let Some(max_checkpoints) = self.config.max_checkpoints else {
            return Ok(());
        };

        let checkpoints = self.list_checkpoints(pipeline_id)?;
        if checkpoints.len() <= max_checkpoints {
            return Ok(());
        }

        // Delete oldest checkpoints
        let to_delete = checkpoints.len() - max_checkpoints;
        for (_, path) in checkpoints.into_iter().take(to_delete) {
            remove_file(path).ok(); // Ignore errors
        }

        Ok(())
    }

    /// The checkpoint files of `pipeline_id`, sorted by ascending step.
    fn list_checkpoints(&self, pipeline_id: &str) -> Result<Vec<(u64, PathBuf)>> {
        let prefix = format!("checkpoint_{pipeline_id}_");
        let mut checkpoints: Vec<(u64, PathBuf)> = read_dir(&self.config.directory)
            .context("Failed to read checkpoint directory")?
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name();
                let step = name
                    .to_str()?
                    .strip_prefix(&prefix)?
                    .strip_suffix(".bin")?
                    .parse::<u64>()
                    .ok()?;
                Some((step, entry.path()))
            })
            .collect();

        checkpoints.sort_by_key(|(step, _)| *step);
        Ok(checkpoints)
    }
}

fn checkpoint_file_name(pipeline_id: &str, step: u64) -> String {
    format!("checkpoint_{pipeline_id}_{step}.bin")
}

fn encode_state(state: &StateDict) -> Result<Vec<u8>> {
    postcard::to_allocvec(state).map_err(|e| anyhow!("Failed to serialize state dict: {e}"))
}

/// Compute SHA-256 checksum of data.
#[must_use]
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Get current timestamp in milliseconds since epoch.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
