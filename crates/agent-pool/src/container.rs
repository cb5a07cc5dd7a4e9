// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container-backed [`WorkerBackend`]: one Docker container per browser
//! instance, reached over the local Docker daemon via `bollard`.

use crate::backend::{BackendError, WorkerBackend};
use agent_core::{Worker, WorkerKind, WorkerTransport};
use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::Docker;
use chromiumoxide::browser::Browser;
use futures::StreamExt;
use std::collections::HashMap;

/// The browser image used per worker kind. Callers may override via
/// [`ContainerBackend::with_images`].
fn default_image(kind: WorkerKind) -> &'static str {
    match kind {
        WorkerKind::Chromium => "browserless/chrome:latest",
        WorkerKind::Firefox => "browserless/firefox:latest",
        WorkerKind::Webkit => "browserless/webkit:latest",
    }
}

pub struct ContainerBackend {
    docker: Docker,
    images: HashMap<WorkerKind, String>,
    rpc_port: u16,
}

impl ContainerBackend {
    /// Connect to the local Docker daemon using its default socket.
    /// Never fails at construction — connectivity is probed lazily via
    /// [`WorkerBackend::is_available`] so the pool can fall back to
    /// degraded mode instead of aborting startup.
    pub fn connect_local(rpc_port: u16) -> Result<Self, BackendError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(Self {
            docker,
            images: HashMap::new(),
            rpc_port,
        })
    }

    pub fn with_images(mut self, images: HashMap<WorkerKind, String>) -> Self {
        self.images = images;
        self
    }

    /// Resolve the image to launch. A requested `version` overrides the
    /// configured image's tag (e.g. `browserless/chrome:119.0`); `None`
    /// launches whatever tag [`ContainerBackend::with_images`]/the default
    /// configured for `kind`.
    fn image_for(&self, kind: WorkerKind, version: Option<&str>) -> String {
        let configured = self
            .images
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| default_image(kind).to_string());
        match version {
            Some(version) => {
                let repo = configured.split(':').next().unwrap_or(&configured);
                format!("{repo}:{version}")
            }
            None => configured,
        }
    }
}

#[async_trait]
impl WorkerBackend for ContainerBackend {
    async fn launch(&self, kind: WorkerKind, version: Option<&str>) -> Result<Worker, BackendError> {
        let image = self.image_for(kind, version);
        let name = format!("agent-worker-{}-{}", kind.as_str(), uuid::Uuid::new_v4());
        let config = ContainerConfig {
            image: Some(image),
            exposed_ports: Some(HashMap::from([(
                format!("{}/tcp", self.rpc_port),
                HashMap::new(),
            )])),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| BackendError::LaunchFailed(e.to_string()))?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| BackendError::LaunchFailed(e.to_string()))?;

        let inspect = self
            .docker
            .inspect_container(&created.id, None)
            .await
            .map_err(|e| BackendError::LaunchFailed(e.to_string()))?;
        let ip = inspect
            .network_settings
            .and_then(|n| n.ip_address)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "127.0.0.1".to_string());

        let transport = WorkerTransport::Container {
            container_id: created.id,
            rpc_url: format!("ws://{ip}:{}", self.rpc_port),
        };
        Ok(Worker::new(
            kind,
            version.unwrap_or("latest"),
            transport,
            chrono::Utc::now(),
        ))
    }

    async fn health_check(&self, worker: &Worker) -> Result<bool, BackendError> {
        let WorkerTransport::Container { container_id, .. } = &worker.transport else {
            return Err(BackendError::HealthCheckFailed(
                "worker is not container-backed".into(),
            ));
        };
        match self.docker.inspect_container(container_id, None).await {
            Ok(inspect) => Ok(inspect
                .state
                .and_then(|s| s.running)
                .unwrap_or(false)),
            Err(e) => Err(BackendError::HealthCheckFailed(e.to_string())),
        }
    }

    async fn reset(&self, worker: &Worker) -> Result<(), BackendError> {
        let WorkerTransport::Container { rpc_url, .. } = &worker.transport else {
            return Err(BackendError::ResetFailed(
                "worker is not container-backed".into(),
            ));
        };

        let (browser, mut handler) = Browser::connect(rpc_url)
            .await
            .map_err(|e| BackendError::ResetFailed(e.to_string()))?;
        let event_loop = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let pages = browser.pages().await.unwrap_or_default();
        for page in pages {
            let _ = page.goto("about:blank").await;
        }
        event_loop.abort();
        Ok(())
    }

    async fn destroy(&self, worker: Worker) -> Result<(), BackendError> {
        let WorkerTransport::Container { container_id, .. } = &worker.transport else {
            return Err(BackendError::DestroyFailed(
                "worker is not container-backed".into(),
            ));
        };
        let _ = self
            .docker
            .stop_container(container_id, Some(StopContainerOptions { t: 5 }))
            .await;
        self.docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| BackendError::DestroyFailed(e.to_string()))
    }

    async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}
