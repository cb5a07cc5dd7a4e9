// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shutdown snapshot: a single JSON file capturing what the agent was
//! doing at the moment it stopped. Purely informational — nothing reads
//! it back to resume work, it exists so an operator (or a support
//! ticket) can see what was in flight at shutdown.

use agent_core::{ExecutionId, JobId, SessionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::SnapshotError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub execution_id: ExecutionId,
    pub status: SessionStatus,
    pub step_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingJobRecord {
    pub job_id: JobId,
    pub execution_id: Option<ExecutionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub shutdown_reason: String,
    pub active_sessions: Vec<SessionRecord>,
    pub pending_jobs: Vec<PendingJobRecord>,
    pub last_checkpoints: HashMap<String, serde_json::Value>,
}

impl Snapshot {
    pub fn new(timestamp: DateTime<Utc>, shutdown_reason: impl Into<String>) -> Self {
        Self {
            timestamp,
            shutdown_reason: shutdown_reason.into(),
            active_sessions: Vec::new(),
            pending_jobs: Vec::new(),
            last_checkpoints: HashMap::new(),
        }
    }

    /// Write the snapshot atomically: serialize to a temp file in the
    /// same directory, then rename into place.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Load a previously written snapshot, if present. A missing file is
    /// not an error — there was nothing in flight at the last shutdown,
    /// or this is the first run.
    pub fn load(path: &Path) -> Result<Option<Self>, SnapshotError> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_atomic_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/snapshot.json");

        let mut snapshot = Snapshot::new(Utc::now(), "sigterm");
        snapshot.active_sessions.push(SessionRecord {
            execution_id: ExecutionId::new("exec-1"),
            status: SessionStatus::Running,
            step_count: 3,
        });
        snapshot.pending_jobs.push(PendingJobRecord {
            job_id: JobId::new("job-1"),
            execution_id: None,
        });
        snapshot
            .last_checkpoints
            .insert("trace_upload".into(), serde_json::json!({"bytes": 1024}));

        snapshot.save(&path).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let loaded = Snapshot::load(&path).unwrap().unwrap();
        assert_eq!(loaded.shutdown_reason, "sigterm");
        assert_eq!(loaded.active_sessions.len(), 1);
        assert_eq!(loaded.pending_jobs[0].job_id, JobId::new("job-1"));
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(Snapshot::load(&path).unwrap().is_none());
    }
}
