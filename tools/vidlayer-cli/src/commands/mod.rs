pub mod check;
pub mod plan;
pub mod render;
pub mod validate;

use std::path::{Path, PathBuf};

use vidlayer_timeline::{load_timeline, AssetRegistry, OverlayDescriptor};

/// Load a timeline and the asset files it may reference.
pub(crate) fn load_inputs(
    timeline: &Path,
    assets: &[PathBuf],
) -> anyhow::Result<(Vec<OverlayDescriptor>, AssetRegistry)> {
    let overlays = load_timeline(timeline)?;
    let registry = AssetRegistry::from_files(assets);

    let missing = registry.missing_files();
    if !missing.is_empty() {
        let list: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
        anyhow::bail!("Asset files not found: {}", list.join(", "));
    }
    Ok((overlays, registry))
}
