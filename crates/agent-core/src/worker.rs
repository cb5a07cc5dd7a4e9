// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Worker record: one browser instance owned exclusively by the pool.

use crate::id::WorkerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Browser engine a [`Worker`] wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    Chromium,
    Firefox,
    Webkit,
}

impl WorkerKind {
    /// All kinds, in the pre-warm mix order (chromium:firefox:webkit).
    pub const ALL: [WorkerKind; 3] = [WorkerKind::Chromium, WorkerKind::Firefox, WorkerKind::Webkit];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Chromium => "chromium",
            WorkerKind::Firefox => "firefox",
            WorkerKind::Webkit => "webkit",
        }
    }
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a `Worker`'s browser actually lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerTransport {
    /// A per-worker container, addressed by id plus its CDP/WebDriver RPC URL.
    Container { container_id: String, rpc_url: String },
    /// An in-process handle (no container involved).
    InProcess { control_url: String },
}

/// Lifecycle status of a [`Worker`]. See pool state machine in the design notes:
/// `NEW -> READY -> LEASED -> READY (on release)`, any of `READY|LEASED -> DESTROYING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    New,
    Ready,
    Leased,
    Destroying,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub worker_id: WorkerId,
    pub kind: WorkerKind,
    pub version: String,
    pub transport: WorkerTransport,
    pub status: WorkerStatus,
    pub last_used: DateTime<Utc>,
    pub healthy: bool,
}

impl Worker {
    pub fn new(kind: WorkerKind, version: impl Into<String>, transport: WorkerTransport, now: DateTime<Utc>) -> Self {
        Self {
            worker_id: WorkerId::generate(),
            kind,
            version: version.into(),
            transport,
            status: WorkerStatus::New,
            last_used: now,
            healthy: true,
        }
    }

    pub fn in_use(&self) -> bool {
        self.status == WorkerStatus::Leased
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_worker_is_not_in_use() {
        let w = Worker::new(
            WorkerKind::Chromium,
            "120.0",
            WorkerTransport::InProcess { control_url: "inproc://1".into() },
            Utc::now(),
        );
        assert!(!w.in_use());
        assert!(w.healthy);
    }

    #[test]
    fn kind_display_matches_wire_form() {
        assert_eq!(WorkerKind::Firefox.to_string(), "firefox");
    }
}
