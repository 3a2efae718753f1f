//! Validate a timeline file.

use std::path::PathBuf;

use vidlayer_timeline::{load_timeline, OverlayContent};

pub fn run(timeline: PathBuf) -> anyhow::Result<()> {
    println!("Validating timeline: {}", timeline.display());

    let overlays =
        load_timeline(&timeline).map_err(|e| anyhow::anyhow!("Invalid timeline: {e}"))?;

    println!("  Overlays: {}", overlays.len());
    for (index, overlay) in overlays.iter().enumerate() {
        let detail = match &overlay.content {
            OverlayContent::Text(text) => format!(
                "{:?} ({}, {}pt, {})",
                text.text, text.font_family, text.font_size, text.color
            ),
            OverlayContent::Image(media) | OverlayContent::Video(media) => {
                format!("{} [{}]", media.asset_key, media.filter.as_str())
            }
        };
        println!(
            "  {index:>3}. {:<5} {:>7.2}s - {:<7.2}s at ({}, {}) x{}  {detail}",
            overlay.kind().as_str(),
            overlay.window.start_secs,
            overlay.window.end_secs,
            overlay.position.x,
            overlay.position.y,
            overlay.scale,
        );
    }

    let assets: Vec<&str> = overlays.iter().filter_map(|o| o.asset_key()).collect();
    if !assets.is_empty() {
        println!("\nAssets referenced:");
        for key in assets {
            println!("  - {key}");
        }
    }

    println!("\nTimeline is valid.");
    Ok(())
}
