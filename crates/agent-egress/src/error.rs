// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use agent_core::ErrorCategory;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EgressError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("endpoint rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("circuit open for {endpoint}")]
    CircuitOpen { endpoint: String },
    #[error("upload io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EgressError {
    /// Maps this error onto the shared §7 taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            EgressError::Transport(_) => ErrorCategory::Transient,
            EgressError::Rejected { status, .. } if (400..500).contains(status) => {
                ErrorCategory::Validation
            }
            EgressError::Rejected { .. } => ErrorCategory::Transient,
            EgressError::CircuitOpen { .. } => ErrorCategory::CircuitOpen,
            EgressError::Io(_) => ErrorCategory::Transient,
        }
    }

    /// Non-retryable response classes per §6: 400, 401, 403, 404, 422.
    pub fn is_retryable(&self) -> bool {
        match self {
            EgressError::Rejected { status, .. } => {
                !matches!(status, 400 | 401 | 403 | 404 | 422)
            }
            EgressError::Transport(_) | EgressError::Io(_) => true,
            EgressError::CircuitOpen { .. } => false,
        }
    }
}
