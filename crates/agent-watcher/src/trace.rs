// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parses the NDJSON network log inside a trace archive's
//! `0-trace.network` entry.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One decoded line of the driver's network log. Shape is intentionally
/// loose (`serde_json::Value` payload) since the driver's schema is
/// opaque to this codebase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub line_no: usize,
    pub payload: serde_json::Value,
}

/// Lazily decode `path` as NDJSON, one [`TraceRecord`] per well-formed
/// line. Malformed lines are skipped with a log entry rather than
/// aborting the whole trace.
pub async fn parse_ndjson_trace(path: &Path) -> Result<Vec<TraceRecord>, TraceError> {
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut records = Vec::new();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(payload) => records.push(TraceRecord { line_no, payload }),
            Err(e) => {
                warn!(line_no, error = %e, "skipping malformed trace line");
            }
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn skips_malformed_lines_and_keeps_valid_ones() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0-trace.network");
        tokio::fs::write(&path, "{\"url\":\"a\"}\nnot json\n{\"url\":\"b\"}\n\n")
            .await
            .unwrap();

        let records = parse_ndjson_trace(&path).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line_no, 1);
        assert_eq!(records[1].line_no, 3);
    }
}
