// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process [`WorkerBackend`]: launches a `chromiumoxide` browser
//! directly in this process, no container involved. Only Chromium is
//! supported in-process; Firefox/Webkit requests are rejected.

use crate::backend::{BackendError, WorkerBackend};
use agent_core::{Worker, WorkerKind, WorkerTransport};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

struct Handle {
    browser: Browser,
    _event_loop: JoinHandle<()>,
}

/// Keeps the live `Browser` handles keyed by the control URL stashed in
/// each [`Worker`]'s [`WorkerTransport::InProcess`], since `Worker` itself
/// must stay `Serialize`/`Clone` for egress and snapshot purposes.
pub struct InProcessBackend {
    handles: Arc<Mutex<HashMap<String, Handle>>>,
    headless: bool,
}

impl InProcessBackend {
    pub fn new(headless: bool) -> Self {
        Self {
            handles: Arc::new(Mutex::new(HashMap::new())),
            headless,
        }
    }
}

#[async_trait]
impl WorkerBackend for InProcessBackend {
    async fn launch(&self, kind: WorkerKind, version: Option<&str>) -> Result<Worker, BackendError> {
        if kind != WorkerKind::Chromium {
            return Err(BackendError::LaunchFailed(format!(
                "in-process backend only supports chromium, got {kind}"
            )));
        }
        if version.is_some() {
            return Err(BackendError::LaunchFailed(
                "in-process backend does not support pinning a browser version".into(),
            ));
        }

        let mut builder = BrowserConfig::builder();
        if !self.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(BackendError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BackendError::LaunchFailed(e.to_string()))?;

        let event_loop = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let control_url = format!("inproc://{}", uuid::Uuid::new_v4());
        self.handles.lock().insert(
            control_url.clone(),
            Handle {
                browser,
                _event_loop: event_loop,
            },
        );

        let transport = WorkerTransport::InProcess { control_url };
        Ok(Worker::new(kind, "chromiumoxide", transport, chrono::Utc::now()))
    }

    async fn health_check(&self, worker: &Worker) -> Result<bool, BackendError> {
        let WorkerTransport::InProcess { control_url } = &worker.transport else {
            return Err(BackendError::HealthCheckFailed(
                "worker is not in-process".into(),
            ));
        };
        let guard = self.handles.lock();
        let Some(handle) = guard.get(control_url) else {
            return Ok(false);
        };
        Ok(!handle.browser.is_closed())
    }

    async fn reset(&self, worker: &Worker) -> Result<(), BackendError> {
        let WorkerTransport::InProcess { control_url } = &worker.transport else {
            return Err(BackendError::DestroyFailed("worker is not in-process".into()));
        };
        let pages = {
            let guard = self.handles.lock();
            let Some(handle) = guard.get(control_url) else {
                return Ok(());
            };
            handle.browser.pages().await.unwrap_or_default()
        };
        for page in pages {
            let _ = page.goto("about:blank").await;
        }
        Ok(())
    }

    async fn destroy(&self, worker: Worker) -> Result<(), BackendError> {
        let WorkerTransport::InProcess { control_url } = &worker.transport else {
            return Err(BackendError::DestroyFailed("worker is not in-process".into()));
        };
        if let Some(mut handle) = self.handles.lock().remove(control_url) {
            handle
                .browser
                .close()
                .await
                .map_err(|e| BackendError::DestroyFailed(e.to_string()))?;
        }
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }
}
