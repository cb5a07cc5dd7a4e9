// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session: the outward-facing record of a Job's lifecycle, published to
//! the control plane as it mutates.

use crate::id::ExecutionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initialising,
    Running,
    Passed,
    Failed,
    Aborted,
    NotExecuted,
    Cancelled,
    TimedOut,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Passed
                | SessionStatus::Failed
                | SessionStatus::Aborted
                | SessionStatus::NotExecuted
                | SessionStatus::Cancelled
                | SessionStatus::TimedOut
        )
    }

    /// Whether `next` is a legal successor of `self` in the state chain
    /// used to validate the end-to-end scenarios in the spec's testable
    /// properties section. Any non-terminal status may re-publish itself
    /// (e.g. step-count updates during `running`).
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (a, b) if *a == b => true,
            (Initialising, Running) => true,
            (Initialising, _) | (Running, _) if next.is_terminal() => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub kind: String,
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub execution_id: ExecutionId,
    pub status: SessionStatus,
    pub step_count: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub artifacts: Vec<ArtifactRef>,
    pub message: Option<String>,
    pub artifacts_incomplete: bool,
}

impl Session {
    pub fn new(execution_id: ExecutionId, now: DateTime<Utc>) -> Self {
        Self {
            execution_id,
            status: SessionStatus::Initialising,
            step_count: 0,
            started_at: now,
            ended_at: None,
            artifacts: Vec::new(),
            message: None,
            artifacts_incomplete: false,
        }
    }

    pub fn transition(&mut self, next: SessionStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.ended_at = Some(now);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialising_to_running_to_passed_is_legal() {
        let mut s = Session::new(ExecutionId::generate(), Utc::now());
        assert!(s.transition(SessionStatus::Running, Utc::now()));
        assert!(s.transition(SessionStatus::Passed, Utc::now()));
        assert!(s.status.is_terminal());
        assert!(s.ended_at.is_some());
    }

    #[test]
    fn terminal_status_cannot_move_again() {
        let mut s = Session::new(ExecutionId::generate(), Utc::now());
        assert!(s.transition(SessionStatus::Failed, Utc::now()));
        assert!(!s.transition(SessionStatus::Passed, Utc::now()));
    }
}
