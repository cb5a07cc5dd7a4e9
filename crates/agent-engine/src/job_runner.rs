// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runs a single job to completion (§4.D per-job sequence).

use crate::spawn::{spawn_driver, write_input_files};
use crate::signal::{terminate_process_group, TerminationPath};
use agent_core::{
    ArtifactBlob, ArtifactKind, Clock, ExecutionId, Job, Session, SessionStatus, Worker, WorkerKind,
};
use agent_egress::{BatchWriter, EgressTransport, SessionUpdate, UploadMetadata};
use agent_pool::{WorkerBackend, WorkerPool};
use agent_watcher::{extract_zip, parse_ndjson_trace, wait_stable};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

/// Lines containing this marker (case sensitive) are treated as an
/// in-band error signal from the driver (§4.D step 5).
const ERROR_MARKER: &str = "ERROR:";
const SIGNAL_GRACE: Duration = Duration::from_secs(5);
const ARTIFACT_WAIT_TRIES: u32 = 10;
const ARTIFACT_WAIT_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    UserStop,
    Shutdown,
    PrerequisiteFailed,
}

pub struct JobRunner<B, T, C> {
    pool: Arc<WorkerPool<B, C>>,
    uploader: Arc<agent_egress::ArtifactUploader<T, C>>,
    batch: Arc<BatchWriter<T, C>>,
    clock: C,
}

impl<B, T, C> JobRunner<B, T, C>
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    pub fn new(
        pool: Arc<WorkerPool<B, C>>,
        uploader: Arc<agent_egress::ArtifactUploader<T, C>>,
        batch: Arc<BatchWriter<T, C>>,
        clock: C,
    ) -> Self {
        Self { pool, uploader, batch, clock }
    }

    /// Run `job` to its terminal status, publishing every transition
    /// through the batch writer. `cancel_rx` carries at most one
    /// [`CancelReason`] from the orchestrator's cancellation registry.
    /// Returns the terminal [`SessionStatus`] so the orchestrator can
    /// cascade a plan-level failure to this job's siblings.
    pub async fn run(
        &self,
        job: Job,
        execution_id: ExecutionId,
        worker_kind: WorkerKind,
        mut cancel_rx: watch::Receiver<Option<CancelReason>>,
    ) -> SessionStatus {
        let mut session = Session::new(execution_id.clone(), self.clock.now());
        self.publish(&session);

        if let Some(reason) = *cancel_rx.borrow() {
            let status = status_for_early_cancel(reason);
            session.transition(status, self.clock.now());
            self.publish(&session);
            return status;
        }

        let worker = match self
            .pool
            .acquire(worker_kind, job.worker_version.as_deref(), job.timeout)
            .await
        {
            Ok(worker) => worker,
            Err(e) => {
                warn!(error = %e, job_id = %job.job_id, "worker acquire failed");
                session.message = Some(format!("no_worker: {e}"));
                session.transition(SessionStatus::Failed, self.clock.now());
                self.publish(&session);
                return SessionStatus::Failed;
            }
        };

        session.transition(SessionStatus::Running, self.clock.now());
        self.publish(&session);

        let outcome = self.run_with_worker(&job, &worker, &mut cancel_rx).await;
        if outcome_killed_worker(&outcome) {
            self.pool.discard(worker).await;
        } else {
            self.pool.release(worker).await;
        }

        self.finalize(&mut session, outcome).await;
        self.publish(&session);
        session.status
    }

    async fn run_with_worker(
        &self,
        job: &Job,
        _worker: &Worker,
        cancel_rx: &mut watch::Receiver<Option<CancelReason>>,
    ) -> RunOutcome {
        if let Err(e) = write_input_files(&job.invocation).await {
            return RunOutcome::SpawnFailed(e.to_string());
        }

        let mut child = match spawn_driver(&job.invocation) {
            Ok(child) => child,
            Err(e) => return RunOutcome::SpawnFailed(e.to_string()),
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (error_tx, mut error_rx) = tokio::sync::mpsc::channel::<String>(1);

        if let Some(stdout) = stdout {
            spawn_line_reader(stdout, error_tx.clone());
        }
        if let Some(stderr) = stderr {
            spawn_line_reader(stderr, error_tx.clone());
        }
        drop(error_tx);

        let mut detected_error: Option<String> = None;
        let deadline = tokio::time::sleep(job.timeout);
        tokio::pin!(deadline);

        let termination = loop {
            tokio::select! {
                biased;
                line = error_rx.recv() => {
                    if let Some(line) = line {
                        if detected_error.is_none() {
                            detected_error = Some(line);
                        }
                    }
                }
                status = child.wait() => {
                    let status = status.unwrap_or_else(|_| std::process::ExitStatus::default());
                    break DriverExit::Exited(status);
                }
                _ = cancel_rx.changed() => {
                    let reason = *cancel_rx.borrow();
                    if let Some(reason) = reason {
                        let path = terminate_process_group(&mut child, SIGNAL_GRACE).await;
                        break DriverExit::Signalled(reason, path);
                    }
                }
                _ = &mut deadline => {
                    let path = terminate_process_group(&mut child, SIGNAL_GRACE).await;
                    break DriverExit::TimedOut(path);
                }
            }
        };

        while error_rx.recv().await.is_some() {}

        RunOutcome::Finished {
            termination,
            detected_error,
            job: job.clone(),
        }
    }

    async fn finalize(&self, session: &mut Session, outcome: RunOutcome) {
        let now = self.clock.now();
        match outcome {
            RunOutcome::SpawnFailed(message) => {
                session.message = Some(message);
                session.transition(SessionStatus::Failed, now);
            }
            RunOutcome::Finished { termination, detected_error, job, .. } => {
                let status = match &termination {
                    DriverExit::Exited(status) if status.success() => SessionStatus::Passed,
                    DriverExit::Exited(_) => SessionStatus::Failed,
                    DriverExit::Signalled(CancelReason::PrerequisiteFailed, _) => SessionStatus::NotExecuted,
                    DriverExit::Signalled(CancelReason::UserStop, _) => SessionStatus::Aborted,
                    DriverExit::Signalled(CancelReason::Shutdown, _) => SessionStatus::Aborted,
                    DriverExit::TimedOut(_) => SessionStatus::TimedOut,
                };
                if let Some(message) = detected_error {
                    session.message.get_or_insert(message);
                }
                if matches!(&termination, DriverExit::Signalled(CancelReason::UserStop, _)) {
                    session.message = Some("User Stopped Session".to_string());
                }
                session.transition(status, now);

                self.collect_artifacts(&job, session).await;
            }
        }
    }

    async fn collect_artifacts(&self, job: &Job, session: &mut Session) {
        let out_dir = job.invocation.working_dir.clone();
        let mut incomplete = false;

        let trace_path = out_dir.join("trace.zip");
        if wait_stable(&trace_path, ARTIFACT_WAIT_TRIES, ARTIFACT_WAIT_INTERVAL, "trace")
            .await
            .is_ok()
        {
            self.handle_trace(job, &trace_path, session).await;
        } else if trace_path.exists() {
            incomplete = true;
        }

        let video_path = out_dir.join("video.webm");
        if wait_stable(&video_path, ARTIFACT_WAIT_TRIES, ARTIFACT_WAIT_INTERVAL, "video")
            .await
            .is_ok()
        {
            self.upload_blob(session, ArtifactKind::Video, video_path).await;
        } else if video_path.exists() {
            incomplete = true;
        }

        session.artifacts_incomplete = incomplete;
    }

    async fn handle_trace(&self, _job: &Job, trace_path: &PathBuf, session: &mut Session) {
        let extract_dir = trace_path.with_extension("extracted");
        if extract_zip(trace_path.clone(), extract_dir.clone()).await.is_err() {
            session.artifacts_incomplete = true;
            return;
        }
        let network_log = extract_dir.join("0-trace.network");
        if let Ok(records) = parse_ndjson_trace(&network_log).await {
            info!(count = records.len(), "parsed network log from trace archive");
        }
        self.upload_blob(session, ArtifactKind::Trace, trace_path.clone()).await;
    }

    async fn upload_blob(&self, session: &mut Session, kind: ArtifactKind, path: PathBuf) {
        let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
        let blob = ArtifactBlob::new(kind, path, size);
        let metadata = UploadMetadata {
            execution_id: session.execution_id.as_str().to_string(),
            kind: kind.as_str().to_string(),
        };
        if self.uploader.upload(&blob, metadata).await.is_ok() {
            session.artifacts.push(agent_core::session::ArtifactRef {
                kind: kind.as_str().to_string(),
                uri: format!("uploaded:{}", blob.path.display()),
            });
        } else {
            session.artifacts_incomplete = true;
        }
    }

    fn publish(&self, session: &Session) {
        let critical = session.status.is_terminal();
        self.batch.add(SessionUpdate {
            execution_id: session.execution_id.clone(),
            payload: serde_json::to_value(session).unwrap_or(serde_json::Value::Null),
            critical,
        });
    }
}

enum DriverExit {
    Exited(std::process::ExitStatus),
    Signalled(CancelReason, TerminationPath),
    TimedOut(TerminationPath),
}

enum RunOutcome {
    SpawnFailed(String),
    Finished {
        termination: DriverExit,
        detected_error: Option<String>,
        job: Job,
    },
}

/// A job cancelled before it ever acquired a worker is `not_executed`
/// when the cancellation carries a prerequisite-failure reason — the
/// orchestrator uses this for a job whose plan sibling already failed —
/// and plain `cancelled` for every other reason (§4.D tie-breaks).
fn status_for_early_cancel(reason: CancelReason) -> SessionStatus {
    match reason {
        CancelReason::PrerequisiteFailed => SessionStatus::NotExecuted,
        CancelReason::UserStop | CancelReason::Shutdown => SessionStatus::Cancelled,
    }
}

/// A worker that had to be SIGKILLed is never handed back to the pool —
/// it may have left the browser process, profile directory, or CDP
/// socket in an unknown state.
fn outcome_killed_worker(outcome: &RunOutcome) -> bool {
    matches!(
        outcome,
        RunOutcome::Finished {
            termination: DriverExit::Signalled(_, TerminationPath::KilledAfterSigkill)
                | DriverExit::TimedOut(TerminationPath::KilledAfterSigkill),
            ..
        }
    )
}

fn spawn_line_reader<R>(reader: R, error_tx: tokio::sync::mpsc::Sender<String>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.contains(ERROR_MARKER) {
                let _ = error_tx.send(line).await;
            }
        }
    });
}
