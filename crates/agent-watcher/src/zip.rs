// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Zip extraction for trace archives, run on a blocking thread since the
//! `zip` crate is synchronous.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZipError {
    #[error("corrupt archive: {0}")]
    Corrupt(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("join error: {0}")]
    Join(String),
}

/// Extract `archive` into `dest`, creating directories as needed.
/// `extract(zip(dir)) == dir` is expected to round-trip for any tree
/// under the configured size budget.
pub async fn extract_zip(archive: PathBuf, dest: PathBuf) -> Result<(), ZipError> {
    tokio::task::spawn_blocking(move || extract_zip_blocking(&archive, &dest))
        .await
        .map_err(|e| ZipError::Join(e.to_string()))?
}

fn extract_zip_blocking(archive: &Path, dest: &Path) -> Result<(), ZipError> {
    let file = fs::File::open(archive)?;
    let mut zip = ::zip::ZipArchive::new(file).map_err(|e| ZipError::Corrupt(e.to_string()))?;

    fs::create_dir_all(dest)?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| ZipError::Corrupt(e.to_string()))?;
        let Some(relative) = entry.enclosed_name().map(|p| p.to_owned()) else {
            return Err(ZipError::Corrupt(format!(
                "unsafe path in archive entry {i}"
            )));
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = fs::File::create(&out_path)?;
        io::copy(&mut entry, &mut out_file)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut writer = ::zip::ZipWriter::new(file);
        let options: ::zip::write::FileOptions<()> = ::zip::write::FileOptions::default();
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn round_trips_a_flat_archive() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("trace.zip");
        write_zip(&archive, &[("0-trace.network", b"{\"a\":1}\n")]);

        let dest = dir.path().join("out");
        extract_zip(archive, dest.clone()).await.unwrap();

        let contents = fs::read_to_string(dest.join("0-trace.network")).unwrap();
        assert_eq!(contents, "{\"a\":1}\n");
    }

    #[tokio::test]
    async fn corrupt_archive_reports_corrupt() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("bad.zip");
        fs::write(&archive, b"not a zip").unwrap();
        let result = extract_zip(archive, dir.path().join("out")).await;
        assert!(matches!(result, Err(ZipError::Corrupt(_))));
    }
}
