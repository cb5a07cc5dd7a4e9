// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ArtifactBlob: a file produced by the driver, owned by the filesystem
//! until the egress pipeline uploads and deletes it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Video,
    Trace,
    Screenshot,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Video => "video",
            ArtifactKind::Trace => "trace",
            ArtifactKind::Screenshot => "screenshot",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactBlob {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl ArtifactBlob {
    pub fn new(kind: ArtifactKind, path: PathBuf, size_bytes: u64) -> Self {
        Self { kind, path, size_bytes }
    }

    /// Files at or above this size are uploaded in chunks rather than a
    /// single request (§4.C.2).
    pub const CHUNK_THRESHOLD_BYTES: u64 = 5 * 1024 * 1024;
    pub const CHUNK_SIZE_BYTES: u64 = 10 * 1024 * 1024;

    pub fn needs_chunking(&self) -> bool {
        self.size_bytes >= Self::CHUNK_THRESHOLD_BYTES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_file_does_not_need_chunking() {
        let blob = ArtifactBlob::new(ArtifactKind::Screenshot, "/tmp/a.png".into(), 1024);
        assert!(!blob.needs_chunking());
    }

    #[test]
    fn large_file_needs_chunking() {
        let blob = ArtifactBlob::new(ArtifactKind::Video, "/tmp/v.webm".into(), 6 * 1024 * 1024);
        assert!(blob.needs_chunking());
    }
}
