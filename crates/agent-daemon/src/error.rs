// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The HTTP-boundary error envelope (§6/§7): every handler error becomes
//! a [`agent_core::TaxonomyError`] serialized as `{category, code,
//! message}` with the matching status code.

use agent_core::{ErrorCategory, TaxonomyError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug)]
pub struct ApiError(pub TaxonomyError);

impl ApiError {
    pub fn new(category: ErrorCategory, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self(TaxonomyError::new(category, code, message))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, "invalid_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, "not_found", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.category.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

impl From<agent_engine::OrchestratorError> for ApiError {
    fn from(e: agent_engine::OrchestratorError) -> Self {
        let category = e.category();
        Self(TaxonomyError::new(category, code_for(category), e.to_string()))
    }
}

impl From<agent_egress::EgressError> for ApiError {
    fn from(e: agent_egress::EgressError) -> Self {
        let category = e.category();
        Self(TaxonomyError::new(category, code_for(category), e.to_string()))
    }
}

fn code_for(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Validation => "validation_error",
        ErrorCategory::Capacity => "capacity_exceeded",
        ErrorCategory::Transient => "transient_upstream_error",
        ErrorCategory::CircuitOpen => "circuit_open",
        ErrorCategory::DriverFailure => "driver_failure",
        ErrorCategory::ArtifactIncomplete => "artifact_incomplete",
        ErrorCategory::Fatal => "internal_error",
    }
}
