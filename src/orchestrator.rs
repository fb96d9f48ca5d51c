use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{Instant, sleep};
use uuid::Uuid;

use crate::comfy::{ComfyClient, WebSocketChannel};
use crate::error::GenError;
use crate::fetch::fetch;
use crate::lifecycle::ServerLifecycle;
use crate::locator::{ArtifactSource, locate};
use crate::tracker::{ProgressSink, ProgressTracker, Strategy, TrackerConfig, TrackerState};
use crate::workflow::{GenerationParams, JobDescriptor, Preset, constraints};

/// Everything one generation run needs besides the server connection.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub preset: Preset,
    pub params: GenerationParams,
    /// Destination file. `None` leaves a local artifact in place and saves a
    /// downloaded one under its server filename in the working directory.
    pub output: Option<PathBuf>,
    pub tracker: TrackerConfig,
    /// Open the push channel before submitting.
    pub push: bool,
    pub restart_server: bool,
    pub stop_after: bool,
}

/// Structured record of a finished run, printed with `--json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub job_id: String,
    pub client_id: String,
    pub preset: Preset,
    pub seed: u64,
    pub strategy: Strategy,
    pub state_transitions: Vec<TrackerState>,
    pub polls: u32,
    pub source: ArtifactSource,
    pub artifact: PathBuf,
    pub bytes: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// Drives a job from parameters to an artifact on disk.
pub struct Generator<L> {
    client: ComfyClient,
    lifecycle: L,
    /// The server's output directory, when it is on this machine.
    output_dir: Option<PathBuf>,
    ready_timeout: Duration,
}

impl<L: ServerLifecycle> Generator<L> {
    pub fn new(client: ComfyClient, lifecycle: L, output_dir: Option<PathBuf>) -> Self {
        Self {
            client,
            lifecycle,
            output_dir,
            ready_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn client(&self) -> &ComfyClient {
        &self.client
    }

    /// Validate, build, submit, track, locate and fetch.
    ///
    /// With `stop_after` the server is stopped whatever the outcome.
    pub async fn run(
        &self,
        request: &GenerationRequest,
        sink: &impl ProgressSink,
    ) -> Result<RunRecord, GenError> {
        constraints::check(request.preset, &request.params)?;
        let descriptor = request.preset.build(&request.params)?;
        tracing::debug!(preset = %request.preset, nodes = descriptor.len(), "job graph built");

        if request.restart_server {
            self.restart().await?;
        }

        let result = self.submit_and_collect(request, &descriptor, sink).await;

        if request.stop_after {
            if let Err(e) = self.lifecycle.stop().await {
                tracing::warn!(error = %e, "failed to stop server after run");
            }
        }
        result
    }

    async fn submit_and_collect(
        &self,
        request: &GenerationRequest,
        descriptor: &JobDescriptor,
        sink: &impl ProgressSink,
    ) -> Result<RunRecord, GenError> {
        let started_at = Utc::now();
        let client_id = Uuid::new_v4().to_string();

        let channel = if request.push {
            match WebSocketChannel::connect(&self.client.ws_url(&client_id)).await {
                Ok(channel) => Some(channel),
                Err(e) => {
                    tracing::warn!(error = %e, "push channel unavailable; will poll");
                    None
                }
            }
        } else {
            None
        };

        let handle = self
            .client
            .submit(descriptor, &client_id)
            .await
            .map_err(GenError::from_submission)?;
        tracing::info!(prompt_id = %handle.id, queue_number = handle.queue_number, "job submitted");

        let report = ProgressTracker::new(&self.client, sink, request.tracker)
            .track(&handle, channel)
            .await;
        tracing::info!(
            prompt_id = %handle.id,
            polls = report.polls,
            strategy = ?report.strategy,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "tracking finished"
        );
        let outputs = report.outputs()?;

        let source = locate(
            outputs,
            self.output_dir.as_deref(),
            request.preset.filename_prefix(),
            request.preset.extensions(),
            started_at.into(),
        )?;
        let (artifact, bytes) = self.deliver(&source, request.output.as_deref()).await?;

        let completed_at = Utc::now();
        Ok(RunRecord {
            job_id: handle.id,
            client_id,
            preset: request.preset,
            seed: request.params.seed,
            strategy: report.strategy,
            state_transitions: report.transitions.clone(),
            polls: report.polls,
            source,
            artifact,
            bytes,
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds(),
        })
    }

    async fn deliver(
        &self,
        source: &ArtifactSource,
        output: Option<&Path>,
    ) -> Result<(PathBuf, u64), GenError> {
        let dest = match (output, source) {
            (Some(dest), _) => dest.to_path_buf(),
            (None, ArtifactSource::Local(path)) => {
                let bytes = tokio::fs::metadata(path).await?.len();
                return Ok((path.clone(), bytes));
            }
            (None, ArtifactSource::Remote(reference)) => PathBuf::from(&reference.filename),
        };
        let bytes = fetch(&self.client, source, &dest).await?;
        Ok((dest, bytes))
    }

    async fn restart(&self) -> Result<(), GenError> {
        if !self.lifecycle.can_start() {
            return Err(GenError::Lifecycle(
                "cannot restart: no launch command configured under [server]; server left running"
                    .into(),
            ));
        }
        tracing::info!("restarting server");
        self.lifecycle.stop().await?;
        self.lifecycle.start().await?;
        self.wait_ready().await
    }

    /// Polls `/system_stats` until the server answers.
    async fn wait_ready(&self) -> Result<(), GenError> {
        let deadline = Instant::now() + self.ready_timeout;
        loop {
            match self.client.system_stats().await {
                Ok(_) => return Ok(()),
                Err(e) if Instant::now() >= deadline => {
                    return Err(GenError::Lifecycle(format!(
                        "server not ready after {}s: {e}",
                        self.ready_timeout.as_secs()
                    )));
                }
                Err(e) => tracing::debug!(error = %e, "server not ready yet"),
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}
