// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graceful Shutdown Coordinator (§4.E): handlers registered in startup
//! order run in LIFO order on shutdown, each bounded by a per-handler
//! deadline. `shutdown()` is idempotent.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
pub type Handler = Box<dyn Fn() -> HandlerFuture + Send + Sync>;

struct Registered {
    name: String,
    handler: Handler,
}

/// Owns the ordered list of shutdown handlers and runs them exactly once.
pub struct ShutdownCoordinator {
    handlers: Mutex<Vec<Registered>>,
    per_handler_deadline: Duration,
    started: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(per_handler_deadline: Duration) -> Arc<Self> {
        Arc::new(Self {
            handlers: Mutex::new(Vec::new()),
            per_handler_deadline,
            started: AtomicBool::new(false),
        })
    }

    /// Append a handler. Handlers run in the reverse of registration
    /// order (LIFO) when `shutdown` runs.
    pub fn register(&self, name: impl Into<String>, handler: Handler) {
        self.handlers.lock().push(Registered { name: name.into(), handler });
    }

    /// Install SIGTERM/SIGINT handlers that call [`Self::shutdown`] once.
    /// Returns the task so the caller can await it alongside the server
    /// future.
    pub fn listen_for_signals(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };
            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "failed to install SIGINT handler");
                    return;
                }
            };
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM"),
                _ = sigint.recv() => info!("received SIGINT"),
            }
            coordinator.shutdown().await;
        })
    }

    /// Run every registered handler in LIFO order, one at a time. A
    /// second call after the first completes returns immediately.
    pub async fn shutdown(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let handlers = std::mem::take(&mut *self.handlers.lock());
        for registered in handlers.into_iter().rev() {
            let name = registered.name;
            info!(handler = %name, "running shutdown handler");
            let result = tokio::time::timeout(self.per_handler_deadline, (registered.handler)()).await;
            match result {
                Ok(Ok(())) => info!(handler = %name, "shutdown handler completed"),
                Ok(Err(message)) => warn!(handler = %name, error = %message, "shutdown handler returned an error"),
                Err(_) => warn!(handler = %name, deadline_secs = self.per_handler_deadline.as_secs(), "shutdown handler exceeded its deadline, abandoning"),
            }
        }
        info!("graceful shutdown complete");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}
