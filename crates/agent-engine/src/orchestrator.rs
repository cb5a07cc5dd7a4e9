// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator: intake queue, worker-loop parallelism, cancellation
//! registry.

use crate::error::OrchestratorError;
use crate::job_runner::{CancelReason, JobRunner};
use agent_core::{Clock, ExecutionId, Job, SessionStatus, WorkerKind};
use agent_egress::{ArtifactUploader, BatchWriter, EgressTransport};
use agent_pool::{WorkerBackend, WorkerPool};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;

struct QueuedJob {
    job: Job,
    execution_id: ExecutionId,
    worker_kind: WorkerKind,
    cancel_rx: watch::Receiver<Option<CancelReason>>,
}

struct Registration {
    sender: watch::Sender<Option<CancelReason>>,
    plan_id: Option<String>,
}

/// Tracks the cancellation sender for every job that has been enqueued
/// but not yet finished, keyed by the execution id assigned at intake,
/// plus the plan it belongs to so a sibling failure can be cascaded.
#[derive(Default)]
struct CancelRegistry {
    senders: Mutex<HashMap<ExecutionId, Registration>>,
}

impl CancelRegistry {
    fn register(
        &self,
        execution_id: ExecutionId,
        plan_id: Option<String>,
    ) -> watch::Receiver<Option<CancelReason>> {
        let (tx, rx) = watch::channel(None);
        self.senders.lock().insert(execution_id, Registration { sender: tx, plan_id });
        rx
    }

    fn forget(&self, execution_id: &ExecutionId) {
        self.senders.lock().remove(execution_id);
    }

    /// Returns true if a matching in-flight job was found and signalled.
    fn signal(&self, execution_id: &ExecutionId, reason: CancelReason) -> bool {
        if let Some(registration) = self.senders.lock().get(execution_id) {
            let _ = registration.sender.send(Some(reason));
            true
        } else {
            false
        }
    }

    fn ids(&self) -> Vec<ExecutionId> {
        self.senders.lock().keys().cloned().collect()
    }

    /// Signal every still-tracked job sharing `plan_id`, excluding
    /// `failed_execution_id` itself, with `PrerequisiteFailed`.
    fn cascade_plan_failure(&self, plan_id: &str, failed_execution_id: &ExecutionId) {
        let guard = self.senders.lock();
        for (execution_id, registration) in guard.iter() {
            if execution_id == failed_execution_id {
                continue;
            }
            if registration.plan_id.as_deref() == Some(plan_id) {
                let _ = registration.sender.send(Some(CancelReason::PrerequisiteFailed));
            }
        }
    }
}

pub struct Orchestrator<B, T, C> {
    runner: Arc<JobRunner<B, T, C>>,
    intake_tx: Mutex<Option<mpsc::Sender<QueuedJob>>>,
    intake_rx: Mutex<Option<mpsc::Receiver<QueuedJob>>>,
    cancel_registry: Arc<CancelRegistry>,
    queue_size: usize,
}

impl<B, T, C> Orchestrator<B, T, C>
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    pub fn new(
        pool: Arc<WorkerPool<B, C>>,
        uploader: Arc<ArtifactUploader<T, C>>,
        batch: Arc<BatchWriter<T, C>>,
        clock: C,
        queue_size: usize,
    ) -> Arc<Self> {
        let (intake_tx, intake_rx) = mpsc::channel(queue_size);
        Arc::new(Self {
            runner: Arc::new(JobRunner::new(pool, uploader, batch, clock)),
            intake_tx: Mutex::new(Some(intake_tx)),
            intake_rx: Mutex::new(Some(intake_rx)),
            cancel_registry: Arc::new(CancelRegistry::default()),
            queue_size,
        })
    }

    /// Validate, assign an [`ExecutionId`], and admit `job` to the intake
    /// queue. Returns [`OrchestratorError::QueueFull`] immediately rather
    /// than blocking the caller when the queue is saturated.
    pub fn enqueue(&self, job: Job, worker_kind: WorkerKind) -> Result<ExecutionId, OrchestratorError> {
        job.validate().map_err(|e| OrchestratorError::Validation(e.to_string()))?;

        let execution_id = ExecutionId::generate();
        let cancel_rx = self.cancel_registry.register(execution_id.clone(), job.plan_id.clone());

        let queued = QueuedJob {
            job,
            execution_id: execution_id.clone(),
            worker_kind,
            cancel_rx,
        };

        let send_result = {
            let guard = self.intake_tx.lock();
            match guard.as_ref() {
                Some(tx) => tx.try_send(queued),
                None => {
                    self.cancel_registry.forget(&execution_id);
                    return Err(OrchestratorError::Internal("intake queue closed".into()));
                }
            }
        };

        match send_result {
            Ok(()) => Ok(execution_id),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.cancel_registry.forget(&execution_id);
                Err(OrchestratorError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.cancel_registry.forget(&execution_id);
                Err(OrchestratorError::Internal("intake queue closed".into()))
            }
        }
    }

    /// Signal cancellation for an in-flight or still-queued job. Returns
    /// `true` if a matching execution was found.
    pub fn cancel(&self, execution_id: &ExecutionId, reason: CancelReason) -> bool {
        self.cancel_registry.signal(execution_id, reason)
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    /// Execution ids currently enqueued or running, for the shutdown
    /// snapshot (§4.E handler 9). Purely a point-in-time read.
    pub fn in_flight_execution_ids(&self) -> Vec<ExecutionId> {
        self.cancel_registry.ids()
    }

    /// Spawn `parallelism` worker-loop tasks draining the intake queue.
    /// Each loop runs until the intake channel is closed.
    pub fn spawn_workers(self: &Arc<Self>, parallelism: usize) -> Vec<tokio::task::JoinHandle<()>> {
        let Some(intake_rx) = self.intake_rx.lock().take() else {
            info!("spawn_workers called more than once, ignoring");
            return Vec::new();
        };
        let intake_rx = Arc::new(tokio::sync::Mutex::new(intake_rx));

        (0..parallelism.max(1))
            .map(|worker_index| {
                let orchestrator = self.clone();
                let intake_rx = intake_rx.clone();
                tokio::spawn(async move {
                    loop {
                        let queued = {
                            let mut rx = intake_rx.lock().await;
                            rx.recv().await
                        };
                        let Some(queued) = queued else {
                            info!(worker_index, "intake queue closed, worker loop exiting");
                            break;
                        };
                        info!(
                            worker_index,
                            execution_id = %queued.execution_id,
                            "picked up job"
                        );
                        let plan_id = queued.job.plan_id.clone();
                        let status = orchestrator
                            .runner
                            .run(queued.job, queued.execution_id.clone(), queued.worker_kind, queued.cancel_rx)
                            .await;
                        if let Some(plan_id) = plan_id {
                            if matches!(status, SessionStatus::Failed | SessionStatus::TimedOut) {
                                orchestrator
                                    .cancel_registry
                                    .cascade_plan_failure(&plan_id, &queued.execution_id);
                            }
                        }
                        orchestrator.cancel_registry.forget(&queued.execution_id);
                    }
                })
            })
            .collect()
    }

    /// Close the intake channel so worker loops drain remaining queued
    /// jobs and exit once empty. Further `enqueue` calls fail.
    pub fn stop_intake(&self) {
        self.intake_tx.lock().take();
        info!("intake closed, worker loops will drain and exit");
    }
}
