//! Check engine and font availability.

use vidlayer_common::config::{config_file_path, AppConfig};
use vidlayer_render_engine::{FfmpegEngine, FontResolver, MediaEngine, SystemFontResolver};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("vidlayer System Check");
    println!("{}", "=".repeat(50));

    println!("Config file: {}", config_file_path().display());
    println!("Output dir: {}", config.output_dir.display());

    let engine = FfmpegEngine::from_config(&config.engine);
    let engine_ok = engine.is_available();
    if engine_ok {
        println!("[OK] Engine: {}", engine.binary().display());
    } else {
        println!(
            "[FAIL] Engine: {} not found or not runnable",
            engine.binary().display()
        );
    }
    match engine.timeout() {
        Some(limit) => println!("     Render timeout: {}s", limit.as_secs()),
        None => println!("     Render timeout: none"),
    }

    println!();
    let fonts = SystemFontResolver::new();
    for family in SystemFontResolver::known_families() {
        match fonts.resolve(family) {
            Some(path) => println!("[OK] Font {family}: {}", path.display()),
            None => println!("[WARN] Font {family}: not found, engine default will be used"),
        }
    }

    println!();
    if engine_ok {
        println!("vidlayer is ready.");
    } else {
        println!("The render engine is missing. Install ffmpeg or set engine.binary.");
    }

    Ok(())
}
