// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use agent_core::ErrorCategory;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("intake queue is full")]
    QueueFull,
    #[error("job failed validation: {0}")]
    Validation(String),
    #[error("pool error: {0}")]
    Pool(#[from] agent_pool::PoolError),
    #[error("spawn error: {0}")]
    Spawn(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            OrchestratorError::QueueFull => ErrorCategory::Capacity,
            OrchestratorError::Validation(_) => ErrorCategory::Validation,
            OrchestratorError::Pool(agent_pool::PoolError::Exhausted) => ErrorCategory::Capacity,
            OrchestratorError::Pool(agent_pool::PoolError::Timeout) => ErrorCategory::Capacity,
            OrchestratorError::Pool(agent_pool::PoolError::Unavailable) => ErrorCategory::Capacity,
            OrchestratorError::Pool(_) => ErrorCategory::Fatal,
            OrchestratorError::Spawn(_) => ErrorCategory::DriverFailure,
            OrchestratorError::Internal(_) => ErrorCategory::Fatal,
        }
    }
}
