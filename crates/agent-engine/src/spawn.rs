// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driver subprocess spawning. The child is wrapped in `setsid` so it
//! becomes the leader of its own process group — this workspace forbids
//! `unsafe_code`, so process-group creation goes through the `setsid(1)`
//! utility instead of a `pre_exec` hook.

use agent_core::DriverInvocation;
use std::path::Path;
use thiserror::Error;
use tokio::process::{Child, Command};

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to write input file {path}: {source}")]
    InputFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn driver: {0}")]
    Spawn(std::io::Error),
}

/// Write `invocation.input_files` atomically (temp file + rename) into
/// the working directory before the driver is spawned (§4.D step 3).
pub async fn write_input_files(invocation: &DriverInvocation) -> Result<(), SpawnError> {
    for (relative, contents) in &invocation.input_files {
        let dest = invocation.working_dir.join(relative);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| SpawnError::InputFile {
                path: dest.display().to_string(),
                source: e,
            })?;
        }
        let tmp = tmp_path_for(&dest);
        tokio::fs::write(&tmp, contents).await.map_err(|e| SpawnError::InputFile {
            path: tmp.display().to_string(),
            source: e,
        })?;
        tokio::fs::rename(&tmp, &dest).await.map_err(|e| SpawnError::InputFile {
            path: dest.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}

fn tmp_path_for(dest: &Path) -> std::path::PathBuf {
    let file_name = dest
        .file_name()
        .map(|n| format!(".{}.tmp-{}", n.to_string_lossy(), uuid::Uuid::new_v4()))
        .unwrap_or_else(|| format!(".tmp-{}", uuid::Uuid::new_v4()));
    dest.with_file_name(file_name)
}

/// Spawn the driver under `setsid` so its pid is also its process group
/// id, piping stdout/stderr for line-by-line consumption.
pub fn spawn_driver(invocation: &DriverInvocation) -> Result<Child, SpawnError> {
    let mut command = Command::new("setsid");
    command
        .arg(&invocation.command)
        .args(&invocation.args)
        .current_dir(&invocation.working_dir)
        .envs(&invocation.env)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    command.spawn().map_err(SpawnError::Spawn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn input_files_are_written_atomically() {
        let dir = tempdir().unwrap();
        let invocation = DriverInvocation {
            command: "true".into(),
            args: vec![],
            working_dir: dir.path().to_path_buf(),
            env: HashMap::new(),
            input_files: vec![("config.json".into(), "{\"a\":1}".into())],
        };

        write_input_files(&invocation).await.unwrap();

        let contents = tokio::fs::read_to_string(dir.path().join("config.json")).await.unwrap();
        assert_eq!(contents, "{\"a\":1}");
        // No stray temp files left behind.
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = vec![];
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["config.json"]);
    }

    #[tokio::test]
    async fn nested_input_file_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let invocation = DriverInvocation {
            command: "true".into(),
            args: vec![],
            working_dir: dir.path().to_path_buf(),
            env: HashMap::new(),
            input_files: vec![("nested/env.json".into(), "{}".into())],
        };

        write_input_files(&invocation).await.unwrap();
        assert!(dir.path().join("nested/env.json").exists());
    }
}
