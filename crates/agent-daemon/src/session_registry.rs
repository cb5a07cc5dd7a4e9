// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory tracker of the latest known status and step count per
//! execution, updated as the session HTTP handlers publish updates.
//! Exists only to populate the shutdown snapshot's active-session list
//! (§4.E handler 9) — the durable record of a session lives with the
//! control plane the Batch Writer forwards to, not here.

use agent_core::{ExecutionId, SessionStatus};
use agent_storage::SessionRecord;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<ExecutionId, (SessionStatus, u64)>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a status transition. A terminal status drops the entry
    /// rather than keeping it around — it's no longer "active".
    pub fn record_status(&self, execution_id: ExecutionId, status: SessionStatus) {
        let mut guard = self.sessions.lock();
        if status.is_terminal() {
            guard.remove(&execution_id);
            return;
        }
        guard
            .entry(execution_id)
            .or_insert((SessionStatus::Initialising, 0))
            .0 = status;
    }

    pub fn record_step_count(&self, execution_id: ExecutionId, step_count: u64) {
        self.sessions
            .lock()
            .entry(execution_id)
            .or_insert((SessionStatus::Running, 0))
            .1 = step_count;
    }

    /// Point-in-time read of every session not yet in a terminal state.
    pub fn active_sessions(&self) -> Vec<SessionRecord> {
        self.sessions
            .lock()
            .iter()
            .map(|(execution_id, (status, step_count))| SessionRecord {
                execution_id: execution_id.clone(),
                status: *status,
                step_count: *step_count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_drops_the_entry() {
        let registry = SessionRegistry::new();
        let execution_id = ExecutionId::new("exec-1");
        registry.record_status(execution_id.clone(), SessionStatus::Running);
        registry.record_step_count(execution_id.clone(), 4);
        assert_eq!(registry.active_sessions().len(), 1);

        registry.record_status(execution_id, SessionStatus::Passed);
        assert!(registry.active_sessions().is_empty());
    }

    #[test]
    fn step_count_is_tracked_per_execution() {
        let registry = SessionRegistry::new();
        let execution_id = ExecutionId::new("exec-1");
        registry.record_status(execution_id.clone(), SessionStatus::Running);
        registry.record_step_count(execution_id.clone(), 7);

        let sessions = registry.active_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].step_count, 7);
        assert_eq!(sessions[0].status, SessionStatus::Running);
    }
}
