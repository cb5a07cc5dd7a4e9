// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem-visible completion: a driver writes an artifact
//! asynchronously and the core has no in-band "I'm done" signal, so
//! completion is inferred from two consecutive identical size samples.

use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("{kind} never appeared at {path}")]
    NotFound { kind: String, path: String },
    #[error("{kind} at {path} did not stabilise after {tries} tries")]
    NotStable { kind: String, path: String, tries: u32 },
}

/// Poll `path` every `interval` up to `max_tries` times; succeed once two
/// consecutive samples report the same file size. The file may not exist
/// yet at the first poll — that's tracked separately from "exists but
/// still growing" so callers get `NotFound` vs `NotStable`.
pub async fn wait_stable(
    path: &Path,
    max_tries: u32,
    interval: Duration,
    kind_tag: &str,
) -> Result<(), WatchError> {
    let mut last_size: Option<u64> = None;
    let mut ever_seen = false;

    for _ in 0..max_tries {
        match tokio::fs::metadata(path).await {
            Ok(meta) => {
                ever_seen = true;
                let size = meta.len();
                if Some(size) == last_size {
                    return Ok(());
                }
                last_size = Some(size);
            }
            Err(_) => {
                last_size = None;
            }
        }
        tokio::time::sleep(interval).await;
    }

    if ever_seen {
        Err(WatchError::NotStable {
            kind: kind_tag.to_string(),
            path: path.display().to_string(),
            tries: max_tries,
        })
    } else {
        Err(WatchError::NotFound {
            kind: kind_tag.to_string(),
            path: path.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[tokio::test]
    async fn stable_file_resolves_ok() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("video.webm");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(b"hello").unwrap();
        }
        let result = wait_stable(&path, 5, Duration::from_millis(5), "video").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn missing_file_reports_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("never.webm");
        let result = wait_stable(&path, 3, Duration::from_millis(5), "video").await;
        assert!(matches!(result, Err(WatchError::NotFound { .. })));
    }

    #[tokio::test]
    async fn growing_file_reports_not_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.zip");
        std::fs::write(&path, b"a").unwrap();

        let watch = tokio::spawn({
            let path = path.clone();
            async move { wait_stable(&path, 4, Duration::from_millis(20), "trace").await }
        });

        for i in 0..5 {
            tokio::time::sleep(Duration::from_millis(15)).await;
            std::fs::write(&path, vec![b'a'; 10 + i]).unwrap();
        }

        let result = watch.await.unwrap();
        assert!(matches!(result, Err(WatchError::NotStable { .. })));
    }
}
