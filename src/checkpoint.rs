//! # Checkpoint Module
//!
//! Durable snapshots of the exploration state for crash-safe restarts.
//!
//! A checkpoint is the pair of the visited set (unordered) and the pending
//! backlog (ordered), serialized as one JSON document so an operator can
//! inspect or hand-edit it between runs. Saves are atomic: the document is
//! written to a temporary sibling file and renamed over the target, so a
//! crash mid-write never corrupts the previous checkpoint.
//!
//! Identifiers that were in flight when the process died are not recorded
//! anywhere; if they were marked visited before the last save they are
//! simply never revisited. At-least-once re-dispatch across a crash is the
//! accepted trade-off.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::HarvestError;

/// A persisted snapshot of `{visited, pending}`.
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    /// Identifiers already dispatched, in no particular order.
    pub visited: Vec<String>,
    /// Identifiers awaiting dispatch, in dispatch order.
    pub pending: Vec<String>,
}

/// Reads and writes [`Checkpoint`] documents at a fixed path.
///
/// Written by the scheduler only; no other component touches the file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        CheckpointStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the last saved checkpoint. `Ok(None)` means no prior run has
    /// saved one; an unreadable or undecodable file is an error the caller
    /// decides how to handle.
    pub fn load(&self) -> Result<Option<Checkpoint>, HarvestError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(HarvestError::Checkpoint(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        let checkpoint = serde_json::from_slice::<Checkpoint>(&bytes).map_err(|e| {
            HarvestError::Checkpoint(format!(
                "failed to decode {}: {}",
                self.path.display(),
                e
            ))
        })?;
        info!(
            "Loaded checkpoint from {} with {} visited and {} pending identifiers",
            self.path.display(),
            checkpoint.visited.len(),
            checkpoint.pending.len()
        );
        Ok(Some(checkpoint))
    }

    /// Persists a checkpoint atomically (write to a `.tmp` sibling, then
    /// rename over the target).
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), HarvestError> {
        let encoded = serde_json::to_vec_pretty(checkpoint)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, encoded).map_err(|e| {
            HarvestError::Checkpoint(format!(
                "failed to write temporary file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            HarvestError::Checkpoint(format!(
                "failed to rename {} into place: {}",
                tmp_path.display(),
                e
            ))
        })?;
        Ok(())
    }
}
