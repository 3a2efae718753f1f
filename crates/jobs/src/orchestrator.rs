//! Job orchestration: accepts render requests, runs each one in its own task,
//! and answers status queries without ever waiting on a render.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use vidlayer_common::config::AppConfig;
use vidlayer_common::error::VidlayerError;
use vidlayer_render_engine::{
    build_render_spec, EncodeSettings, EngineError, FontResolver, GraphCompiler, MediaEngine,
    MissingAssetPolicy, ProgressCallback, StreamLabel,
};
use vidlayer_timeline::{AssetRegistry, OverlayDescriptor, ValidationIssue};

use crate::job::{FailureKind, JobFailure, JobId, JobRecord, JobSnapshot, JobState};

/// A render request: main video, ordered overlays, and uploaded assets.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub main_video: PathBuf,
    pub overlays: Vec<OverlayDescriptor>,
    pub assets: AssetRegistry,
}

impl RenderRequest {
    pub fn new(
        main_video: impl Into<PathBuf>,
        overlays: Vec<OverlayDescriptor>,
        assets: AssetRegistry,
    ) -> Self {
        Self {
            main_video: main_video.into(),
            overlays,
            assets,
        }
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Each job writes `<output_dir>/<job_id>.<container>`.
    pub output_dir: PathBuf,
    pub container: String,
    pub encode: EncodeSettings,
    pub missing_assets: MissingAssetPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

impl OrchestratorConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            container: config.engine.container.clone(),
            encode: EncodeSettings::from(&config.engine),
            missing_assets: MissingAssetPolicy::default(),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_missing_asset_policy(mut self, policy: MissingAssetPolicy) -> Self {
        self.missing_assets = policy;
        self
    }
}

/// Rejection at submission time. No job exists afterwards.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmitError {
    #[error("overlay {index}: {issue}")]
    Validation { index: usize, issue: ValidationIssue },

    #[error("main video path is empty")]
    MissingMainVideo,

    #[error("jobs can only be submitted from inside a Tokio runtime")]
    NoRuntime,
}

/// Why a job has no result to hand out.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResultError {
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job is still {state}")]
    NotReady { state: JobState },

    #[error("job failed ({kind}): {detail}")]
    Failed { kind: FailureKind, detail: String },
}

impl From<SubmitError> for VidlayerError {
    fn from(err: SubmitError) -> Self {
        VidlayerError::job(err.to_string())
    }
}

impl From<ResultError> for VidlayerError {
    fn from(err: ResultError) -> Self {
        VidlayerError::job(err.to_string())
    }
}

/// Owns the job table and runs jobs on the ambient Tokio runtime.
///
/// Cloning is cheap; clones share the same table.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    engine: Arc<dyn MediaEngine>,
    fonts: Arc<dyn FontResolver>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        fonts: Arc<dyn FontResolver>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: RwLock::new(HashMap::new()),
                engine,
                fonts,
                config,
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Validate `request`, register a `Pending` job, and start it.
    ///
    /// Returns as soon as the job is registered.
    pub fn submit(&self, request: RenderRequest) -> Result<JobId, SubmitError> {
        if request.main_video.as_os_str().is_empty() {
            return Err(SubmitError::MissingMainVideo);
        }
        for (index, overlay) in request.overlays.iter().enumerate() {
            overlay
                .validate()
                .map_err(|issue| SubmitError::Validation { index, issue })?;
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SubmitError::NoRuntime)?;

        let id = JobId::new();
        let record = JobRecord::new(id, request.main_video.clone(), request.overlays.len());
        self.inner.jobs.write().insert(id, record);

        tracing::info!(
            job_id = %id,
            main_video = %request.main_video.display(),
            overlays = request.overlays.len(),
            assets = request.assets.len(),
            "Job submitted"
        );

        let inner = Arc::clone(&self.inner);
        runtime.spawn(inner.execute(id, request));
        Ok(id)
    }

    /// Snapshot of a job, or `None` if the id is unknown.
    pub fn status(&self, id: JobId) -> Option<JobSnapshot> {
        self.inner.jobs.read().get(&id).map(JobRecord::snapshot)
    }

    /// Output location of a completed job.
    pub fn result(&self, id: JobId) -> Result<PathBuf, ResultError> {
        let jobs = self.inner.jobs.read();
        let record = jobs.get(&id).ok_or(ResultError::NotFound(id))?;
        match record.state() {
            JobState::Completed { output } => Ok(output.clone()),
            JobState::Failed { error } => Err(ResultError::Failed {
                kind: error.kind,
                detail: error.detail.clone(),
            }),
            state => Err(ResultError::NotReady {
                state: state.clone(),
            }),
        }
    }

    /// All known jobs, oldest first.
    pub fn jobs(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<JobSnapshot> = self
            .inner
            .jobs
            .read()
            .values()
            .map(JobRecord::snapshot)
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        jobs
    }

    /// Poll until the job reaches a terminal state. `None` for unknown ids.
    pub async fn wait(&self, id: JobId, poll_interval: Duration) -> Option<JobSnapshot> {
        loop {
            let snapshot = self.status(id)?;
            if snapshot.state.is_terminal() {
                return Some(snapshot);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

impl Inner {
    fn output_path(&self, id: JobId) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{id}.{}", self.config.container))
    }

    async fn execute(self: Arc<Self>, id: JobId, request: RenderRequest) {
        self.update(id, |job| job.start());
        tracing::info!(job_id = %id, "Job processing");

        // A panic anywhere in the pipeline surfaces here as a JoinError.
        let pipeline = tokio::spawn(Arc::clone(&self).run_pipeline(id, request));
        let outcome = match pipeline.await {
            Ok(outcome) => outcome,
            Err(err) => Err(JobFailure::new(FailureKind::Panicked, join_error_detail(err))),
        };

        match outcome {
            Ok(output) => {
                tracing::info!(job_id = %id, output = %output.display(), "Job completed");
                self.update(id, |job| job.complete(output));
            }
            Err(failure) => {
                tracing::warn!(
                    job_id = %id,
                    kind = %failure.kind,
                    detail = %failure.detail,
                    "Job failed"
                );
                discard_partial_output(&self.output_path(id)).await;
                self.update(id, |job| job.fail(failure));
            }
        }
    }

    async fn run_pipeline(
        self: Arc<Self>,
        id: JobId,
        request: RenderRequest,
    ) -> Result<PathBuf, JobFailure> {
        let compiled = GraphCompiler::new(self.fonts.as_ref())
            .with_missing_asset_policy(self.config.missing_assets)
            .compile(StreamLabel::BASE, &request.overlays, &request.assets)
            .map_err(|e| JobFailure::new(FailureKind::Compile, e.to_string()))?;

        for skipped in &compiled.skipped {
            tracing::warn!(
                job_id = %id,
                index = skipped.index,
                asset_key = %skipped.asset_key,
                "Overlay skipped: asset not uploaded"
            );
        }

        let output = self.output_path(id);
        ensure_output_dir(&self.config.output_dir)
            .await
            .map_err(|e| JobFailure::new(FailureKind::Io, e.to_string()))?;

        let spec = build_render_spec(
            &request.main_video,
            &compiled.graph,
            &output,
            &self.config.encode,
        );
        tracing::debug!(
            job_id = %id,
            nodes = compiled.graph.nodes.len(),
            inputs = spec.input_count(),
            engine = self.engine.name(),
            "Render command built"
        );

        let progress_sink = Arc::clone(&self);
        let progress: ProgressCallback = Box::new(move |p| {
            progress_sink.update_progress(id, p.out_time_secs);
        });

        self.engine
            .render(&spec, Some(progress))
            .await
            .map_err(engine_failure)?;
        Ok(output)
    }

    fn update<F>(&self, id: JobId, transition: F)
    where
        F: FnOnce(&mut JobRecord) -> Result<(), crate::job::TransitionError>,
    {
        let mut jobs = self.jobs.write();
        let Some(job) = jobs.get_mut(&id) else {
            tracing::warn!(job_id = %id, "Update for unknown job");
            return;
        };
        if let Err(err) = transition(job) {
            tracing::warn!(job_id = %id, error = %err, "Rejected job transition");
        }
    }

    fn update_progress(&self, id: JobId, out_time_secs: f64) {
        if let Some(job) = self.jobs.write().get_mut(&id) {
            job.record_progress(out_time_secs);
        }
    }
}

async fn ensure_output_dir(dir: &Path) -> std::io::Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir).await
}

/// Remove whatever a failed render left at `path`.
async fn discard_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(
            path = %path.display(),
            error = %err,
            "Could not remove partial output"
        ),
    }
}

fn engine_failure(err: EngineError) -> JobFailure {
    let kind = match &err {
        EngineError::Timeout { .. } => FailureKind::Timeout,
        EngineError::Io(_) => FailureKind::Io,
        EngineError::Spawn { .. } | EngineError::Failed { .. } => FailureKind::Engine,
    };
    JobFailure::new(kind, err.diagnostic())
}

fn join_error_detail(err: tokio::task::JoinError) -> String {
    if err.is_cancelled() {
        return "render task was cancelled".to_string();
    }
    let panic = err.into_panic();
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("render task panicked: {message}")
}
