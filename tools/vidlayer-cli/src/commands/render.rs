//! Submit a render job and follow it to completion.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use vidlayer_common::config::AppConfig;
use vidlayer_jobs::{JobState, Orchestrator, OrchestratorConfig, RenderRequest};
use vidlayer_render_engine::{FfmpegEngine, MediaEngine, SystemFontResolver};

pub async fn run(
    config: &AppConfig,
    video: PathBuf,
    timeline: PathBuf,
    assets: Vec<PathBuf>,
    poll_ms: u64,
) -> anyhow::Result<()> {
    println!("Rendering: {}", video.display());

    if !video.exists() {
        anyhow::bail!("Main video not found: {}", video.display());
    }
    let (overlays, registry) = super::load_inputs(&timeline, &assets)?;

    let engine = FfmpegEngine::from_config(&config.engine);
    if !engine.is_available() {
        anyhow::bail!(
            "{} is not available; install ffmpeg or set engine.binary in the config",
            engine.binary().display()
        );
    }

    println!("  Overlays: {}", overlays.len());
    println!("  Assets: {}", registry.len());
    println!("  Output dir: {}", config.output_dir.display());

    let orchestrator = Orchestrator::new(
        Arc::new(engine),
        Arc::new(SystemFontResolver::new()),
        OrchestratorConfig::from_app_config(config),
    );
    let id = orchestrator.submit(RenderRequest::new(video, overlays, registry))?;
    println!("  Job: {id}");

    let poll = Duration::from_millis(poll_ms.max(10));
    let mut last_state = "";
    loop {
        let Some(snapshot) = orchestrator.status(id) else {
            anyhow::bail!("Job {id} disappeared");
        };

        if snapshot.state.name() != last_state {
            last_state = snapshot.state.name();
            println!("\n  State: {last_state}");
        }
        if let Some(secs) = snapshot.progress_secs {
            report_progress(&mut std::io::stdout(), secs)?;
        }

        match &snapshot.state {
            JobState::Completed { output } => {
                let elapsed = snapshot.elapsed_secs().unwrap_or_default();
                println!("\nRender complete in {elapsed:.1}s: {}", output.display());
                return Ok(());
            }
            JobState::Failed { error } => {
                println!("\nRender failed ({}):", error.kind);
                for line in error.detail.lines() {
                    println!("  {line}");
                }
                anyhow::bail!("render job {id} failed");
            }
            JobState::Pending | JobState::Processing => {}
        }
        tokio::time::sleep(poll).await;
    }
}

/// Rewrite the progress line in place. The line has no newline, so it is
/// flushed explicitly.
fn report_progress(out: &mut impl Write, secs: f64) -> std::io::Result<()> {
    write!(out, "\r  Progress: {secs:.1}s rendered  ")?;
    out.flush()
}
