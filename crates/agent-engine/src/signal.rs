// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deliver SIGINT then SIGKILL to a driver's process group (§4.D step 7,
//! §5 Cancellation).

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::time::Duration;
use tokio::process::Child;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationPath {
    ExitedCleanly,
    KilledAfterSigint,
    KilledAfterSigkill,
}

/// Send SIGINT to the driver's process group; if it's still alive after
/// `grace`, escalate to SIGKILL. Returns which path actually finished it.
pub async fn terminate_process_group(
    child: &mut Child,
    grace: Duration,
) -> std::io::Result<TerminationPath> {
    let Some(pid) = child.id() else {
        // Already reaped.
        return Ok(TerminationPath::ExitedCleanly);
    };
    let pgid = Pid::from_raw(pid as i32);

    if let Err(e) = killpg(pgid, Signal::SIGINT) {
        debug!(error = %e, pid, "SIGINT delivery failed, process likely already gone");
    }

    let waited = tokio::time::timeout(grace, child.wait()).await;
    match waited {
        Ok(Ok(_status)) => Ok(TerminationPath::KilledAfterSigint),
        Ok(Err(e)) => Err(e),
        Err(_elapsed) => {
            warn!(pid, "driver still alive after grace period, escalating to SIGKILL");
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                debug!(error = %e, pid, "SIGKILL delivery failed, process likely already gone");
            }
            child.wait().await?;
            Ok(TerminationPath::KilledAfterSigkill)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[tokio::test]
    async fn sigint_reaps_a_sleeping_child_within_grace() {
        let mut child = Command::new("setsid")
            .arg("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        let path = terminate_process_group(&mut child, Duration::from_secs(2)).await.unwrap();
        assert_eq!(path, TerminationPath::KilledAfterSigint);
    }

    #[tokio::test]
    async fn sigkill_escalation_for_a_trap_ignoring_child() {
        let mut child = Command::new("setsid")
            .arg("sh")
            .arg("-c")
            .arg("trap '' INT; sleep 30")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        let path = terminate_process_group(&mut child, Duration::from_millis(200)).await.unwrap();
        assert_eq!(path, TerminationPath::KilledAfterSigkill);
    }
}
