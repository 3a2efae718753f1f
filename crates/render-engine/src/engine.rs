//! External media engine execution.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use vidlayer_common::config::EngineConfig;
use vidlayer_common::error::VidlayerError;

use crate::command::RenderSpec;

/// Progress callback for engine runs.
pub type ProgressCallback = Box<dyn Fn(RenderProgress) + Send + Sync>;

/// Engine progress report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderProgress {
    /// Media time written to the output so far.
    pub out_time_secs: f64,

    /// Wall-clock time since the engine started.
    pub elapsed_secs: f64,

    /// The engine reported its final progress block.
    pub complete: bool,
}

/// Errors from running the external engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to start {}: {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        source: std::io::Error,
    },

    #[error("Render timed out after {}s", after.as_secs_f64())]
    Timeout { after: Duration },

    #[error("Engine exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Human-readable failure detail. For a failed run this is the engine's
    /// own diagnostic output when it produced any.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Failed { status, stderr } if stderr.is_empty() => {
                format!("Engine exited with {status} and no diagnostic output")
            }
            Self::Failed { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<EngineError> for VidlayerError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Io(e) => VidlayerError::Io(e),
            other => VidlayerError::render(other.diagnostic()),
        }
    }
}

/// Trait for media engines that execute a [`RenderSpec`].
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Run the render to completion. `Ok` means the output file was written.
    async fn render(
        &self,
        spec: &RenderSpec,
        progress: Option<ProgressCallback>,
    ) -> Result<(), EngineError>;

    /// Check if this engine is available on the system.
    fn is_available(&self) -> bool;

    /// Engine name.
    fn name(&self) -> &str;
}

/// ffmpeg run as a child process.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl FfmpegEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.binary.clone()).with_timeout(config.timeout())
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn run(
        &self,
        spec: &RenderSpec,
        progress: Option<&ProgressCallback>,
    ) -> Result<(), EngineError> {
        let args = spec.args();
        tracing::debug!(binary = %self.binary.display(), args = ?args, "Running engine");

        let start = Instant::now();
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        tracing::info!(
            pid = child.id(),
            inputs = spec.input_count(),
            output = %spec.output_path.display(),
            "Engine process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("engine stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("engine stderr was not captured"))?;

        // Drain stderr concurrently so the engine never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read engine stderr: {err}>"),
            }
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut latest = ProgressState::default();
        let mut last_progress_secs = 0.0f64;
        let mut last_progress_wall = Instant::now();
        while let Some(line) = lines.next_line().await? {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            latest.update(key, value);
            if key != "progress" {
                continue;
            }

            if latest.out_time_secs > last_progress_secs + 0.001 {
                last_progress_secs = latest.out_time_secs;
                last_progress_wall = Instant::now();
            }
            if let Some(cb) = progress {
                cb(latest.report(start.elapsed()));
            }
            if last_progress_wall.elapsed().as_secs() >= 10 {
                tracing::warn!(
                    out_time_secs = latest.out_time_secs,
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "No engine progress advancement for 10s"
                );
                last_progress_wall = Instant::now();
            }
        }

        let status = child.wait().await?;
        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            tracing::warn!(
                %status,
                elapsed_secs = start.elapsed().as_secs_f64(),
                "Engine run failed"
            );
            return Err(EngineError::Failed {
                status: status.to_string(),
                stderr: stderr_output.trim().to_string(),
            });
        }

        tracing::info!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            out_time_secs = latest.out_time_secs,
            "Engine run finished"
        );
        Ok(())
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn render(
        &self,
        spec: &RenderSpec,
        progress: Option<ProgressCallback>,
    ) -> Result<(), EngineError> {
        let run = self.run(spec, progress.as_ref());
        match self.timeout {
            // Dropping the run future drops the child, which kills it.
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(timeout_secs = limit.as_secs_f64(), "Engine run timed out");
                    Err(EngineError::Timeout { after: limit })
                }
            },
            None => run.await,
        }
    }

    fn is_available(&self) -> bool {
        std::process::Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Accumulates ffmpeg's `-progress` key/value blocks.
#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // out_time_ms is microseconds despite its name.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    fn report(&self, elapsed: Duration) -> RenderProgress {
        RenderProgress {
            out_time_secs: self.out_time_secs,
            elapsed_secs: elapsed.as_secs_f64(),
            complete: self.complete,
        }
    }
}
