//! Compile a timeline and print the engine command without running it.

use std::path::PathBuf;

use serde::Serialize;
use vidlayer_common::config::AppConfig;
use vidlayer_render_engine::{
    build_render_spec, EncodeSettings, GraphCompiler, RenderSpec, SkippedOverlay, StreamGraph,
    StreamLabel, SystemFontResolver,
};

#[derive(Serialize)]
struct Plan<'a> {
    graph: &'a StreamGraph,
    skipped: &'a [SkippedOverlay],
    command: &'a RenderSpec,
}

pub fn run(
    config: &AppConfig,
    video: PathBuf,
    timeline: PathBuf,
    assets: Vec<PathBuf>,
    output: PathBuf,
    json: bool,
) -> anyhow::Result<()> {
    let (overlays, registry) = super::load_inputs(&timeline, &assets)?;

    let fonts = SystemFontResolver::new();
    let compiled = GraphCompiler::new(&fonts).compile(StreamLabel::BASE, &overlays, &registry)?;

    let spec = build_render_spec(
        &video,
        &compiled.graph,
        &output,
        &EncodeSettings::from(&config.engine),
    );

    if json {
        let plan = Plan {
            graph: &compiled.graph,
            skipped: &compiled.skipped,
            command: &spec,
        };
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    for skipped in &compiled.skipped {
        println!(
            "# overlay {} skipped: asset {:?} not provided",
            skipped.index, skipped.asset_key
        );
    }

    if !compiled.graph.is_empty() {
        println!("# filtergraph ({} nodes)", compiled.graph.nodes.len());
        for node in &compiled.graph.nodes {
            println!("#   {node}");
        }
    }
    println!("{}", spec.command_line(&config.engine.binary));
    Ok(())
}
