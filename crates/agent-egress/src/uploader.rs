// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ArtifactUploader: streams a file to its upload endpoint without
//! buffering it whole, deleting it from disk on success and retaining it
//! for the shutdown snapshot on failure.

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::error::EgressError;
use crate::retry::{retry_with_backoff, BackoffConfig};
use crate::transport::EgressTransport;
use agent_core::{ArtifactBlob, Clock};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct UploadMetadata {
    pub execution_id: String,
    pub kind: String,
}

pub struct ArtifactUploader<T, C> {
    transport: Arc<T>,
    breaker: Arc<CircuitBreakerRegistry<C>>,
    endpoint_base: String,
    backoff: BackoffConfig,
}

impl<T: EgressTransport, C: Clock> ArtifactUploader<T, C> {
    pub fn new(
        transport: Arc<T>,
        breaker: Arc<CircuitBreakerRegistry<C>>,
        endpoint_base: impl Into<String>,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            transport,
            breaker,
            endpoint_base: endpoint_base.into(),
            backoff,
        }
    }

    /// Upload `blob`, deleting the local file on success. On failure the
    /// file is left in place for the next shutdown snapshot to reference.
    pub async fn upload(&self, blob: &ArtifactBlob, metadata: UploadMetadata) -> Result<(), EgressError> {
        let url = format!("{}/{}", self.endpoint_base, metadata.execution_id);
        let content_length = blob.size_bytes;
        let path = blob.path.clone();

        let result = self
            .breaker
            .call(&url, || {
                let path = path.clone();
                let url = url.clone();
                let transport = self.transport.clone();
                let backoff = self.backoff;
                async move {
                    retry_with_backoff(
                        &backoff,
                        || {
                            let path = path.clone();
                            let url = url.clone();
                            let transport = transport.clone();
                            async move { upload_once(&*transport, &url, &path, content_length).await }
                        },
                        |e: &EgressError| e.is_retryable(),
                    )
                    .await
                }
            })
            .await;

        match &result {
            Ok(()) => {
                if let Err(e) = tokio::fs::remove_file(&blob.path).await {
                    warn!(error = %e, path = %blob.path.display(), "uploaded artifact but failed to remove local copy");
                } else {
                    info!(path = %blob.path.display(), "uploaded artifact and removed local copy");
                }
            }
            Err(e) => {
                warn!(error = %e, path = %blob.path.display(), "artifact upload failed, retaining local copy");
            }
        }

        result
    }
}

async fn upload_once<T: EgressTransport>(
    transport: &T,
    url: &str,
    path: &std::path::Path,
    content_length: u64,
) -> Result<(), EgressError> {
    let file = tokio::fs::File::open(path).await?;
    let boxed: crate::transport::ByteStream = Box::pin(ReaderStream::new(file));

    let (status, body) = transport
        .put_stream(url, boxed, content_length, Duration::from_secs(120))
        .await?;
    if status >= 400 {
        return Err(EgressError::Rejected { status, body });
    }
    Ok(())
}
