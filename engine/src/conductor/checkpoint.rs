//! Checkpoint Store
//!
//! One pretty-printed JSON file per session under the checkpoint directory.
//! Saves are atomic (temp file in the same directory, then rename) and
//! last-write-wins. Loads never fail: a missing, unreadable or corrupt
//! checkpoint yields a fresh state for the session.

use sdk::EngineError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::session::file_stem;
use crate::state::ContractState;

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `session_id`
    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(session_id)))
    }

    /// Atomically replace the checkpoint for `state.session_id`.
    pub fn save(&self, state: &ContractState) -> Result<PathBuf, EngineError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            EngineError::Checkpoint(format!(
                "Failed to create checkpoint directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| EngineError::Checkpoint(format!("Failed to serialize state: {}", e)))?;

        let path = self.path_for(&state.session_id);
        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| EngineError::Checkpoint(format!("Failed to create temp file: {}", e)))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| EngineError::Checkpoint(format!("Failed to write checkpoint: {}", e)))?;
        tmp.persist(&path).map_err(|e| {
            EngineError::Checkpoint(format!("Failed to replace {}: {}", path.display(), e.error))
        })?;

        info!(
            session_id = %state.session_id,
            versions = state.versions.len(),
            "Checkpoint saved to {}",
            path.display()
        );
        Ok(path)
    }

    /// Stored state for `session_id`, or a fresh one.
    pub fn load(&self, session_id: &str) -> ContractState {
        let path = self.path_for(session_id);

        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(session_id, "No checkpoint, starting fresh");
                return ContractState::new(session_id);
            }
            Err(e) => {
                warn!("Failed to read checkpoint {}: {}", path.display(), e);
                return ContractState::new(session_id);
            }
        };

        match serde_json::from_str::<ContractState>(&raw) {
            Ok(state) if state.session_id == session_id => state,
            Ok(state) => {
                warn!(
                    expected = session_id,
                    found = %state.session_id,
                    "Checkpoint belongs to another session, starting fresh"
                );
                ContractState::new(session_id)
            }
            Err(e) => {
                warn!("Corrupt checkpoint {}: {}", path.display(), e);
                ContractState::new(session_id)
            }
        }
    }

    /// Whether a checkpoint file exists for `session_id`
    pub fn exists(&self, session_id: &str) -> bool {
        self.path_for(session_id).exists()
    }
}
