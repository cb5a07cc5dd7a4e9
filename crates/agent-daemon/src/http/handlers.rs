// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin HTTP handlers (§6): parse the request, call into `agent-engine`
//! or `agent-egress`, map the result to the `{category, code, message}`
//! envelope. No handler contains driver or egress policy itself — that
//! lives in the crates doing the work.

use crate::error::ApiError;
use crate::state::AppState;
use agent_core::session::ArtifactRef;
use agent_core::{
    ArtifactBlob, ArtifactKind, Clock, DriverInvocation, ExecutionId, Job, JobId, JobKind, RoutingTags,
    SessionStatus, WorkerKind,
};
use agent_egress::{EgressTransport, SessionUpdate, UploadMetadata};
use agent_pool::WorkerBackend;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub input_files: Vec<(PathBuf, String)>,
    pub timeout_secs: u64,
    pub kind: JobKind,
    pub worker_kind: WorkerKind,
    #[serde(default)]
    pub routing: RoutingTags,
    #[serde(default)]
    pub plan_id: Option<String>,
    /// Pin the job's worker to a specific browser build/image tag.
    #[serde(default)]
    pub worker_version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub execution_id: ExecutionId,
}

pub async fn start<B, T, C>(
    State(state): State<AppState<B, T, C>>,
    Json(request): Json<StartRequest>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError>
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    let job = Job {
        job_id: JobId::generate(),
        kind: request.kind,
        invocation: DriverInvocation {
            command: request.command,
            args: request.args,
            working_dir: request.working_dir,
            env: request.env,
            input_files: request.input_files,
        },
        timeout: Duration::from_secs(request.timeout_secs),
        routing: request.routing,
        plan_id: request.plan_id,
        worker_version: request.worker_version,
    };

    let execution_id = state.orchestrator.enqueue(job, request.worker_kind)?;
    info!(%execution_id, "accepted job");
    Ok((StatusCode::ACCEPTED, Json(StartResponse { execution_id })))
}

#[derive(Debug, Serialize)]
pub struct PoolStatsBody {
    pub available: usize,
    pub in_use: usize,
    pub degraded: bool,
    pub by_kind: HashMap<String, (usize, usize)>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub pool: PoolStatsBody,
}

pub async fn status<B, T, C>(State(state): State<AppState<B, T, C>>) -> Json<StatusResponse>
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    let stats = state.pool.stats();
    let by_kind = stats.by_kind.into_iter().map(|(k, v)| (k.as_str().to_string(), v)).collect();
    Json(StatusResponse {
        status: if stats.degraded { "degraded" } else { "ok" },
        uptime_secs: state.started_at.elapsed().as_secs(),
        pool: PoolStatsBody {
            available: stats.available,
            in_use: stats.in_use,
            degraded: stats.degraded,
            by_kind,
        },
    })
}

fn execution_id_from_body(value: &serde_json::Value) -> Result<ExecutionId, ApiError> {
    value
        .get("execution_id")
        .and_then(|v| v.as_str())
        .map(ExecutionId::new)
        .ok_or_else(|| ApiError::validation("request body is missing execution_id"))
}

/// Shared by the insert and update session routes — both are forwarded
/// to the Batch Writer verbatim; the control plane treats them as an
/// upsert (§8 "re-delivering the same Session update must be safe").
pub async fn upsert_session<B, T, C>(
    State(state): State<AppState<B, T, C>>,
    Json(body): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError>
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    let execution_id = execution_id_from_body(&body)?;
    if let Some(status) = body.get("status").and_then(|v| serde_json::from_value::<SessionStatus>(v.clone()).ok()) {
        state.sessions.record_status(execution_id.clone(), status);
    }
    if let Some(step_count) = body.get("step_count").and_then(|v| v.as_u64()) {
        state.sessions.record_step_count(execution_id.clone(), step_count);
    }
    state.batch.add(SessionUpdate {
        execution_id,
        payload: body,
        critical: false,
    });
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: SessionStatus,
    #[serde(default)]
    pub message: Option<String>,
}

pub async fn update_status<B, T, C>(
    State(state): State<AppState<B, T, C>>,
    Path(execution_id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<StatusCode, ApiError>
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    let critical = request.status.is_terminal();
    let execution_id = ExecutionId::new(execution_id);
    state.sessions.record_status(execution_id.clone(), request.status);
    state.batch.add(SessionUpdate {
        execution_id,
        payload: serde_json::json!({ "status": request.status, "message": request.message }),
        critical,
    });
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct UpdateStepCountRequest {
    pub step_count: u64,
}

pub async fn update_stepcount<B, T, C>(
    State(state): State<AppState<B, T, C>>,
    Path(execution_id): Path<String>,
    Json(request): Json<UpdateStepCountRequest>,
) -> Result<StatusCode, ApiError>
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    let execution_id = ExecutionId::new(execution_id);
    state.sessions.record_step_count(execution_id.clone(), request.step_count);
    state.batch.add(SessionUpdate {
        execution_id,
        payload: serde_json::json!({ "step_count": request.step_count }),
        critical: false,
    });
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct UploadScreenshotsRequest {
    pub screenshots: Vec<ArtifactRef>,
}

pub async fn upload_screenshots<B, T, C>(
    State(state): State<AppState<B, T, C>>,
    Path(execution_id): Path<String>,
    Json(request): Json<UploadScreenshotsRequest>,
) -> Result<StatusCode, ApiError>
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    state.batch.add(SessionUpdate {
        execution_id: ExecutionId::new(execution_id),
        payload: serde_json::json!({ "screenshots": request.screenshots }),
        critical: false,
    });
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct TakeScreenshotRequest {
    /// Path the driver recorded it as, used only to name the local file.
    pub path: String,
    pub data_base64: String,
}

pub async fn take_screenshot<B, T, C>(
    State(state): State<AppState<B, T, C>>,
    Path(execution_id): Path<String>,
    Json(request): Json<TakeScreenshotRequest>,
) -> Result<StatusCode, ApiError>
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(request.data_base64)
        .map_err(|e| ApiError::validation(format!("invalid base64 screenshot data: {e}")))?;

    let file_name = PathBuf::from(&request.path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "screenshot.png".to_string());
    let dest_dir = state.artifacts_dir.join(&execution_id);
    tokio::fs::create_dir_all(&dest_dir)
        .await
        .map_err(|e| ApiError::new(agent_core::ErrorCategory::Fatal, "io_error", e.to_string()))?;
    let dest_path = dest_dir.join(file_name);
    tokio::fs::write(&dest_path, &bytes)
        .await
        .map_err(|e| ApiError::new(agent_core::ErrorCategory::Fatal, "io_error", e.to_string()))?;

    let blob = ArtifactBlob::new(ArtifactKind::Screenshot, dest_path, bytes.len() as u64);
    state
        .uploader
        .upload(&blob, UploadMetadata { execution_id, kind: ArtifactKind::Screenshot.as_str().into() })
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn upload_video<B, T, C>(
    State(state): State<AppState<B, T, C>>,
    Path(execution_id): Path<String>,
    mut multipart: Multipart,
) -> Result<StatusCode, ApiError>
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    let mut video_bytes = None;
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::validation(format!("malformed multipart body: {e}")))?;
        let Some(field) = field else { break };
        if field.name() == Some("video") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::validation(format!("failed reading video field: {e}")))?;
            video_bytes = Some(bytes);
        }
    }
    let bytes = video_bytes.ok_or_else(|| ApiError::validation("multipart body is missing a `video` field"))?;

    let dest_dir = state.artifacts_dir.join(&execution_id);
    tokio::fs::create_dir_all(&dest_dir)
        .await
        .map_err(|e| ApiError::new(agent_core::ErrorCategory::Fatal, "io_error", e.to_string()))?;
    let dest_path = dest_dir.join("video.webm");
    tokio::fs::write(&dest_path, &bytes)
        .await
        .map_err(|e| ApiError::new(agent_core::ErrorCategory::Fatal, "io_error", e.to_string()))?;

    let blob = ArtifactBlob::new(ArtifactKind::Video, dest_path, bytes.len() as u64);
    state
        .uploader
        .upload(&blob, UploadMetadata { execution_id, kind: ArtifactKind::Video.as_str().into() })
        .await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct NetworkLogsRequest {
    pub execution_id: String,
    pub trace_archive_path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct NetworkLogsResponse {
    pub records: usize,
}

pub async fn network_logs<B, T, C>(
    State(state): State<AppState<B, T, C>>,
    Json(request): Json<NetworkLogsRequest>,
) -> Result<Json<NetworkLogsResponse>, ApiError>
where
    B: WorkerBackend,
    T: EgressTransport,
    C: Clock,
{
    let extract_dir = state.artifacts_dir.join(&request.execution_id).join("trace");
    agent_watcher::extract_zip(request.trace_archive_path.clone(), extract_dir.clone())
        .await
        .map_err(|e| ApiError::new(agent_core::ErrorCategory::ArtifactIncomplete, "trace_extract_failed", e.to_string()))?;

    let network_file = extract_dir.join("0-trace.network");
    let records = agent_watcher::parse_ndjson_trace(&network_file)
        .await
        .map_err(|e| ApiError::new(agent_core::ErrorCategory::ArtifactIncomplete, "trace_parse_failed", e.to_string()))?;

    let size_bytes = tokio::fs::metadata(&request.trace_archive_path).await.map(|m| m.len()).unwrap_or(0);
    let blob = ArtifactBlob::new(ArtifactKind::Trace, request.trace_archive_path, size_bytes);
    if let Err(e) = state
        .uploader
        .upload(&blob, UploadMetadata { execution_id: request.execution_id, kind: ArtifactKind::Trace.as_str().into() })
        .await
    {
        warn!(error = %e, "trace upload failed, network log records still extracted locally");
    }

    Ok(Json(NetworkLogsResponse { records: records.len() }))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found("no route matches this path")
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{CircuitConfig, FakeClock, RoutingTags};
    use agent_egress::{ArtifactUploader, BackoffConfig, BatchConfig, BatchWriter, CircuitBreakerRegistry, FakeTransport};
    use agent_pool::{FakeBackend, PoolConfig, WorkerPool};
    use std::io::Write;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    type TestState = AppState<FakeBackend, FakeTransport, FakeClock>;

    async fn build_app_state() -> (TestState, Arc<FakeTransport>, TempDir) {
        let backend = Arc::new(FakeBackend::new());
        let pool = WorkerPool::new(
            backend,
            FakeClock::default(),
            PoolConfig {
                max_size: 4,
                pre_warm: 0,
                pre_warm_mix: (1, 0, 0),
                stale_after: Duration::from_secs(300),
                sweep_interval: Duration::from_secs(60),
            },
        )
        .await
        .unwrap();

        let transport = Arc::new(FakeTransport::new());
        let breaker = Arc::new(CircuitBreakerRegistry::new(FakeClock::default(), CircuitConfig::default()));
        let batch = Arc::new(BatchWriter::start(
            transport.clone(),
            breaker.clone(),
            "http://ctrl/sessions",
            BatchConfig {
                flush_interval: Duration::from_millis(20),
                ..BatchConfig::default()
            },
            FakeClock::default(),
        ));
        let uploader = Arc::new(ArtifactUploader::new(
            transport.clone(),
            breaker,
            "http://ctrl/artifacts",
            BackoffConfig::default(),
        ));
        let orchestrator = agent_engine::Orchestrator::new(pool.clone(), uploader.clone(), batch.clone(), FakeClock::default(), 8);

        let dir = tempdir().unwrap();
        let state = AppState {
            orchestrator,
            pool,
            uploader,
            batch,
            sessions: crate::session_registry::SessionRegistry::new(),
            clock: FakeClock::default(),
            artifacts_dir: dir.path().to_path_buf(),
            started_at: std::time::Instant::now(),
        };
        (state, transport, dir)
    }

    fn start_request() -> StartRequest {
        StartRequest {
            command: "true".into(),
            args: vec![],
            working_dir: PathBuf::from("/tmp/job"),
            env: HashMap::new(),
            input_files: vec![],
            timeout_secs: 30,
            kind: JobKind::Case,
            worker_kind: WorkerKind::Chromium,
            routing: RoutingTags::default(),
            plan_id: None,
            worker_version: None,
        }
    }

    #[tokio::test]
    async fn start_enqueues_job_and_returns_execution_id() {
        let (state, _transport, _dir) = build_app_state().await;
        let (status, Json(body)) = start(State(state), Json(start_request())).await.unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(!body.execution_id.as_str().is_empty());
    }

    #[tokio::test]
    async fn start_rejects_zero_timeout() {
        let (state, _transport, _dir) = build_app_state().await;
        let mut request = start_request();
        request.timeout_secs = 0;
        let err = start(State(state), Json(request)).await.unwrap_err();
        assert_eq!(err.0.category, agent_core::ErrorCategory::Validation);
    }

    #[tokio::test]
    async fn status_reports_pool_stats() {
        let (state, _transport, _dir) = build_app_state().await;
        let Json(body) = status(State(state)).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.pool.in_use, 0);
    }

    #[tokio::test]
    async fn upsert_session_forwards_execution_id_to_batch() {
        let (state, transport, _dir) = build_app_state().await;
        let body = serde_json::json!({ "execution_id": "exec-1", "step_count": 3 });
        let result = upsert_session(State(state.clone()), Json(body)).await;
        assert_eq!(result.unwrap(), StatusCode::ACCEPTED);

        state.batch.close().await;
        let calls = transport.calls();
        assert!(calls.iter().any(|c| c.url.contains("exec-1")));
    }

    #[tokio::test]
    async fn upsert_session_without_execution_id_is_validation_error() {
        let (state, _transport, _dir) = build_app_state().await;
        let body = serde_json::json!({ "step_count": 3 });
        let err = upsert_session(State(state), Json(body)).await.unwrap_err();
        assert_eq!(err.0.category, agent_core::ErrorCategory::Validation);
    }

    #[tokio::test]
    async fn update_status_marks_terminal_transitions_critical() {
        let (state, transport, _dir) = build_app_state().await;
        let result = update_status(
            State(state.clone()),
            Path("exec-2".to_string()),
            Json(UpdateStatusRequest { status: SessionStatus::Passed, message: None }),
        )
        .await;
        assert_eq!(result.unwrap(), StatusCode::ACCEPTED);

        state.batch.close().await;
        let calls = transport.calls();
        assert!(!calls.is_empty());
    }

    #[tokio::test]
    async fn update_stepcount_forwards_payload() {
        let (state, _transport, _dir) = build_app_state().await;
        let result = update_stepcount(
            State(state),
            Path("exec-3".to_string()),
            Json(UpdateStepCountRequest { step_count: 42 }),
        )
        .await;
        assert_eq!(result.unwrap(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn running_session_is_tracked_until_terminal() {
        let (state, _transport, _dir) = build_app_state().await;
        update_status(
            State(state.clone()),
            Path("exec-5".to_string()),
            Json(UpdateStatusRequest { status: SessionStatus::Running, message: None }),
        )
        .await
        .unwrap();
        update_stepcount(
            State(state.clone()),
            Path("exec-5".to_string()),
            Json(UpdateStepCountRequest { step_count: 3 }),
        )
        .await
        .unwrap();

        let active = state.sessions.active_sessions();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].execution_id, ExecutionId::new("exec-5"));
        assert_eq!(active[0].step_count, 3);

        update_status(
            State(state.clone()),
            Path("exec-5".to_string()),
            Json(UpdateStatusRequest { status: SessionStatus::Passed, message: None }),
        )
        .await
        .unwrap();
        assert!(state.sessions.active_sessions().is_empty());
    }

    #[tokio::test]
    async fn upload_screenshots_forwards_payload() {
        let (state, _transport, _dir) = build_app_state().await;
        let result = upload_screenshots(
            State(state),
            Path("exec-4".to_string()),
            Json(UploadScreenshotsRequest {
                screenshots: vec![ArtifactRef { kind: "screenshot".into(), uri: "file:///a.png".into() }],
            }),
        )
        .await;
        assert_eq!(result.unwrap(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn take_screenshot_writes_file_and_uploads() {
        let (state, _transport, dir) = build_app_state().await;
        use base64::Engine;
        let data = base64::engine::general_purpose::STANDARD.encode(b"not really a png");

        let result = take_screenshot(
            State(state),
            Path("exec-5".to_string()),
            Json(TakeScreenshotRequest { path: "step-1.png".into(), data_base64: data }),
        )
        .await;
        assert_eq!(result.unwrap(), StatusCode::ACCEPTED);
        // Upload succeeds against the fake transport and removes the local copy.
        assert!(!dir.path().join("exec-5").join("step-1.png").exists());
    }

    #[tokio::test]
    async fn take_screenshot_rejects_invalid_base64() {
        let (state, _transport, _dir) = build_app_state().await;
        let result = take_screenshot(
            State(state),
            Path("exec-6".to_string()),
            Json(TakeScreenshotRequest { path: "step-1.png".into(), data_base64: "not-base64!!".into() }),
        )
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.0.category, agent_core::ErrorCategory::Validation);
    }

    fn write_zip(path: &std::path::Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = ::zip::ZipWriter::new(file);
        let options: ::zip::write::FileOptions<()> = ::zip::write::FileOptions::default();
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn network_logs_extracts_and_counts_records() {
        let (state, _transport, dir) = build_app_state().await;
        let archive_path = dir.path().join("trace.zip");
        write_zip(
            &archive_path,
            &[("0-trace.network", b"{\"url\":\"a\"}\nnot json\n{\"url\":\"b\"}\n")],
        );

        let result = network_logs(
            State(state),
            Json(NetworkLogsRequest {
                execution_id: "exec-7".to_string(),
                trace_archive_path: archive_path,
            }),
        )
        .await;

        let Json(body) = result.unwrap();
        assert_eq!(body.records, 2);
    }

    #[tokio::test]
    async fn network_logs_reports_corrupt_archive_as_artifact_incomplete() {
        let (state, _transport, dir) = build_app_state().await;
        let archive_path = dir.path().join("bad.zip");
        tokio::fs::write(&archive_path, b"not a zip").await.unwrap();

        let err = network_logs(
            State(state),
            Json(NetworkLogsRequest {
                execution_id: "exec-8".to_string(),
                trace_archive_path: archive_path,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0.category, agent_core::ErrorCategory::ArtifactIncomplete);
    }

    #[tokio::test]
    async fn not_found_is_validation_category() {
        let err = not_found().await;
        assert_eq!(err.0.category, agent_core::ErrorCategory::Validation);
    }
}
