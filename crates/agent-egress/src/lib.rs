// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! agent-egress: batched session writes, streaming artifact upload, and
//! the circuit breakers guarding both.

pub mod batch;
pub mod circuit_breaker;
pub mod error;
pub mod retry;
pub mod transport;
pub mod uploader;

pub use batch::{BatchConfig, BatchWriter, SessionUpdate};
pub use circuit_breaker::CircuitBreakerRegistry;
pub use error::EgressError;
pub use retry::{backoff_delay, retry_with_backoff, BackoffConfig};
pub use transport::{ByteStream, EgressTransport, ReqwestTransport};
pub use uploader::{ArtifactUploader, UploadMetadata};

#[cfg(any(test, feature = "test-support"))]
pub use transport::fake::FakeTransport;
