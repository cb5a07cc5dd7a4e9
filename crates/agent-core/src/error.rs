// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The error taxonomy every component translates into at its boundary.
//! Internal error types stay local to their crate; only [`ErrorCategory`]
//! crosses crate lines, so the HTTP layer never has to know about
//! bollard, reqwest, or nix error variants.

use serde::{Deserialize, Serialize};

/// §7 error taxonomy. Each component-local error maps into exactly one
/// of these at its boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Capacity,
    Transient,
    CircuitOpen,
    DriverFailure,
    ArtifactIncomplete,
    Fatal,
}

impl ErrorCategory {
    /// HTTP status this category surfaces as, per §7.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCategory::Validation => 400,
            ErrorCategory::Capacity => 429,
            ErrorCategory::Transient => 502,
            ErrorCategory::CircuitOpen => 503,
            ErrorCategory::DriverFailure => 500,
            ErrorCategory::ArtifactIncomplete => 200,
            ErrorCategory::Fatal => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Transient)
    }
}

/// A taxonomy-classified error carrying the stable `code` and human
/// `message` every HTTP error envelope requires (§6).
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct TaxonomyError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
}

impl TaxonomyError {
    pub fn new(category: ErrorCategory, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Fatal, "internal_error", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_open_maps_to_503() {
        assert_eq!(ErrorCategory::CircuitOpen.http_status(), 503);
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(ErrorCategory::Transient.is_retryable());
        assert!(!ErrorCategory::Validation.is_retryable());
        assert!(!ErrorCategory::DriverFailure.is_retryable());
    }
}
