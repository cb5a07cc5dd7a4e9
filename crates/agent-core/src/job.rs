// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job: one requested test execution, and the descriptor used to spawn its driver.

use crate::id::JobId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Case,
    Plan,
}

/// Opaque routing metadata carried alongside a job; never interpreted by the
/// core, only forwarded to egress and logging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingTags {
    pub org_id: Option<String>,
    pub project_id: Option<String>,
    pub app_id: Option<String>,
}

/// Everything needed to spawn the driver subprocess for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverInvocation {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
    /// Files to write atomically into `working_dir` before spawn: (relative path, contents).
    pub input_files: Vec<(PathBuf, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTerminalState {
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub kind: JobKind,
    pub invocation: DriverInvocation,
    pub timeout: Duration,
    pub routing: RoutingTags,
    /// Groups jobs originating from the same test plan. When a job in a
    /// plan ends in `failed` or `timed_out`, the orchestrator cascades
    /// `CancelReason::PrerequisiteFailed` to its still-pending siblings.
    #[serde(default)]
    pub plan_id: Option<String>,
    /// Pin the worker to a specific browser build/image tag. `None` lets
    /// the pool launch whatever version the backend defaults to.
    #[serde(default)]
    pub worker_version: Option<String>,
}

impl Job {
    /// A timeout of zero is rejected at enqueue time (§8 boundary behaviour).
    pub fn validate(&self) -> Result<(), JobValidationError> {
        if self.timeout.is_zero() {
            return Err(JobValidationError::ZeroTimeout);
        }
        if self.invocation.command.trim().is_empty() {
            return Err(JobValidationError::EmptyCommand);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobValidationError {
    #[error("job timeout must be greater than zero")]
    ZeroTimeout,
    #[error("driver command must not be empty")]
    EmptyCommand,
}

/// Diagnostic summary attached to a Job's terminal publish. Supplements the
/// bare terminal status with the information an operator needs to triage
/// a failure without re-running the job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOutcome {
    pub exit_code: Option<i32>,
    pub message: Option<String>,
    pub artifacts_incomplete: bool,
    pub signalled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation() -> DriverInvocation {
        DriverInvocation {
            command: "driver".into(),
            args: vec![],
            working_dir: PathBuf::from("/tmp/job"),
            env: HashMap::new(),
            input_files: vec![],
        }
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let job = Job {
            job_id: JobId::generate(),
            kind: JobKind::Case,
            invocation: invocation(),
            timeout: Duration::from_secs(0),
            routing: RoutingTags::default(),
            plan_id: None,
            worker_version: None,
        };
        assert!(matches!(job.validate(), Err(JobValidationError::ZeroTimeout)));
    }

    #[test]
    fn well_formed_job_validates() {
        let job = Job {
            job_id: JobId::generate(),
            kind: JobKind::Plan,
            invocation: invocation(),
            timeout: Duration::from_secs(60),
            routing: RoutingTags::default(),
            plan_id: None,
            worker_version: None,
        };
        assert!(job.validate().is_ok());
    }
}
