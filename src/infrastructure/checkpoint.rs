//! Checkpoint persistence for resumable index runs
//!
//! Rewritten after each completed file, so a restarted run resumes from
//! the recorded phase and file position instead of redoing finished work.
//! Uses the same atomic temp-then-rename write as the manifest.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::Result;
use crate::infrastructure::manifest::atomic_write_json;

/// Pipeline phase an index run is in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IndexPhase {
    Discovery,
    Diff,
    Chunking,
    Embedding,
    Upsert,
    Deletion,
    Complete,
}

impl IndexPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexPhase::Discovery => "discovery",
            IndexPhase::Diff => "diff",
            IndexPhase::Chunking => "chunking",
            IndexPhase::Embedding => "embedding",
            IndexPhase::Upsert => "upsert",
            IndexPhase::Deletion => "deletion",
            IndexPhase::Complete => "complete",
        }
    }
}

impl std::fmt::Display for IndexPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress counters carried in the checkpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointCounters {
    pub files_discovered: u64,
    pub files_processed: u64,
    pub chunks_embedded: u64,
    pub points_upserted: u64,
    pub files_deleted: u64,
    pub errors: u64,
}

/// On-disk progress record for one index run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub run_id: Uuid,
    pub phase: IndexPhase,
    pub last_file: Option<String>,
    pub counters: CheckpointCounters,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            phase: IndexPhase::Discovery,
            last_file: None,
            counters: CheckpointCounters::default(),
            updated_at: Utc::now(),
        }
    }

    /// Record completion of one file in a phase
    pub fn advance(&mut self, phase: IndexPhase, last_file: Option<String>) {
        self.phase = phase;
        if last_file.is_some() {
            self.last_file = last_file;
        }
        self.updated_at = Utc::now();
    }
}

/// Loads and saves the checkpoint file
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The last written checkpoint, or `None` for a fresh start.
    /// An unreadable checkpoint is treated as absent; the run restarts
    /// from scratch rather than aborting.
    pub fn load(&self) -> Option<Checkpoint> {
        let bytes = std::fs::read(&self.path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(checkpoint) => Some(checkpoint),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "discarding unreadable checkpoint");
                None
            }
        }
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        atomic_write_json(&self.path, checkpoint)
    }

    /// Remove the checkpoint after a completed run
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_clear_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        assert!(store.load().is_none());

        let mut checkpoint = Checkpoint::new(Uuid::new_v8([1u8; 16]));
        checkpoint.advance(IndexPhase::Embedding, Some("src/lib.rs".to_string()));
        checkpoint.counters.files_processed = 12;
        store.save(&checkpoint).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.phase, IndexPhase::Embedding);
        assert_eq!(loaded.last_file.as_deref(), Some("src/lib.rs"));
        assert_eq!(loaded.counters.files_processed, 12);

        store.clear().unwrap();
        assert!(store.load().is_none());
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn corrupt_checkpoints_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = CheckpointStore::new(&path);
        assert!(store.load().is_none());
    }
}
