//! Job records and their lifecycle.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Stage a failed job broke at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Compile,
    Engine,
    Timeout,
    Io,
    Panicked,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::Engine => "engine",
            Self::Timeout => "timeout",
            Self::Io => "io",
            Self::Panicked => "panicked",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    /// Human-readable detail; the engine's diagnostic output for engine failures.
    pub detail: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure: {}", self.kind, self.detail)
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    /// Accepted, execution not yet started.
    Pending,
    /// Compiling or rendering.
    Processing,
    /// Output written.
    Completed { output: PathBuf },
    Failed { error: JobFailure },
}

impl JobState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    /// Completed and Failed are final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A state change the lifecycle does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: &'static str,
    pub to: &'static str,
}

/// Point-in-time copy of a job, handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: JobId,
    #[serde(flatten)]
    pub state: JobState,
    pub main_video: PathBuf,
    pub overlays: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Latest media time reported by the engine, in seconds.
    pub progress_secs: Option<f64>,
}

impl JobSnapshot {
    /// Wall-clock processing time, once the job has finished.
    pub fn elapsed_secs(&self) -> Option<f64> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        Some((finished - started).num_milliseconds() as f64 / 1000.0)
    }
}

/// Mutable job record, owned by the orchestrator's job table.
#[derive(Debug, Clone)]
pub struct JobRecord {
    snapshot: JobSnapshot,
}

impl JobRecord {
    /// New record in `Pending`.
    pub fn new(id: JobId, main_video: PathBuf, overlays: usize) -> Self {
        Self {
            snapshot: JobSnapshot {
                id,
                state: JobState::Pending,
                main_video,
                overlays,
                created_at: Utc::now(),
                started_at: None,
                finished_at: None,
                progress_secs: None,
            },
        }
    }

    pub fn id(&self) -> JobId {
        self.snapshot.id
    }

    pub fn state(&self) -> &JobState {
        &self.snapshot.state
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.snapshot.clone()
    }

    /// Pending -> Processing.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.check(matches!(self.snapshot.state, JobState::Pending), "processing")?;
        self.snapshot.state = JobState::Processing;
        self.snapshot.started_at = Some(Utc::now());
        Ok(())
    }

    /// Processing -> Completed.
    pub fn complete(&mut self, output: PathBuf) -> Result<(), TransitionError> {
        self.check(matches!(self.snapshot.state, JobState::Processing), "completed")?;
        self.snapshot.state = JobState::Completed { output };
        self.snapshot.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Pending or Processing -> Failed.
    pub fn fail(&mut self, error: JobFailure) -> Result<(), TransitionError> {
        self.check(!self.snapshot.state.is_terminal(), "failed")?;
        self.snapshot.state = JobState::Failed { error };
        self.snapshot.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Record engine progress. Ignored outside `Processing`.
    pub fn record_progress(&mut self, out_time_secs: f64) {
        if matches!(self.snapshot.state, JobState::Processing) {
            self.snapshot.progress_secs = Some(out_time_secs);
        }
    }

    fn check(&self, allowed: bool, to: &'static str) -> Result<(), TransitionError> {
        if allowed {
            Ok(())
        } else {
            Err(TransitionError {
                from: self.snapshot.state.name(),
                to,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(JobId::new(), PathBuf::from("main.mp4"), 2)
    }

    #[test]
    fn test_happy_path_lifecycle() {
        let mut job = record();
        assert_eq!(job.state(), &JobState::Pending);
        assert!(job.snapshot().started_at.is_none());

        job.start().unwrap();
        assert_eq!(job.state(), &JobState::Processing);
        job.record_progress(1.25);

        job.complete(PathBuf::from("out/x.mp4")).unwrap();
        let snap = job.snapshot();
        assert_eq!(
            snap.state,
            JobState::Completed {
                output: PathBuf::from("out/x.mp4")
            }
        );
        assert_eq!(snap.progress_secs, Some(1.25));
        assert!(snap.finished_at.is_some());
        assert!(snap.elapsed_secs().unwrap() >= 0.0);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = record();
        job.start().unwrap();
        job.fail(JobFailure::new(FailureKind::Engine, "boom")).unwrap();

        let before = job.snapshot();
        assert!(job.complete(PathBuf::from("late.mp4")).is_err());
        assert!(job.start().is_err());
        let err = job
            .fail(JobFailure::new(FailureKind::Io, "again"))
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError {
                from: "failed",
                to: "failed"
            }
        );
        job.record_progress(9.0);
        assert_eq!(job.snapshot(), before);
    }

    #[test]
    fn test_complete_requires_processing() {
        let mut job = record();
        assert!(job.complete(PathBuf::from("x.mp4")).is_err());
        job.record_progress(3.0);
        assert!(job.snapshot().progress_secs.is_none());
        // A pending job may fail directly.
        assert!(job
            .fail(JobFailure::new(FailureKind::Panicked, "worker died"))
            .is_ok());
    }

    #[test]
    fn test_job_id_parse_and_display() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn test_snapshot_serializes_state_inline() {
        let mut job = record();
        job.start().unwrap();
        job.fail(JobFailure::new(FailureKind::Timeout, "took too long"))
            .unwrap();
        let json = serde_json::to_value(job.snapshot()).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["error"]["kind"], "timeout");
        assert!(json["createdAt"].is_string());
        assert_eq!(json["overlays"], 2);
    }
}
