//! Render command assembly.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vidlayer_common::config::EngineConfig;

use crate::compiler::StreamGraph;

/// Main-input audio. The trailing `?` keeps a silent main video renderable.
pub const MAIN_AUDIO_SELECTOR: &str = "0:a?";

/// Fixed output encode parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub pixel_format: String,
    pub preset: String,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for EncodeSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            video_codec: config.video_codec.clone(),
            pixel_format: config.pixel_format.clone(),
            preset: config.preset.clone(),
        }
    }
}

/// A fully specified engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSpec {
    /// Main video first, then the graph's extra inputs.
    pub inputs: Vec<PathBuf>,
    pub filter_complex: Option<String>,
    pub video_map: String,
    pub audio_map: Option<String>,
    pub encode: EncodeSettings,
    pub output_path: PathBuf,
}

impl RenderSpec {
    /// Engine argv, excluding the binary.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error", "-nostats"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push("-progress".into());
        args.push("pipe:1".into());

        for input in &self.inputs {
            args.push("-i".into());
            args.push(input.clone().into_os_string());
        }

        if let Some(graph) = &self.filter_complex {
            args.push("-filter_complex".into());
            args.push(graph.into());
        }

        args.push("-map".into());
        args.push((&self.video_map).into());
        if let Some(audio) = &self.audio_map {
            args.push("-map".into());
            args.push(audio.into());
        }

        args.push("-c:v".into());
        args.push((&self.encode.video_codec).into());
        args.push("-pix_fmt".into());
        args.push((&self.encode.pixel_format).into());
        args.push("-preset".into());
        args.push((&self.encode.preset).into());

        args.push(self.output_path.clone().into_os_string());
        args
    }

    /// Printable shell-style command line, for logs and dry runs.
    pub fn command_line(&self, binary: &Path) -> String {
        std::iter::once(binary.as_os_str().to_owned())
            .chain(self.args())
            .map(|arg| shell_quote(&arg.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Number of engine inputs.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }
}

/// Assemble the invocation for `graph` over `main_video`.
pub fn build_render_spec(
    main_video: &Path,
    graph: &StreamGraph,
    output_path: &Path,
    encode: &EncodeSettings,
) -> RenderSpec {
    let mut inputs = Vec::with_capacity(graph.extra_inputs.len() + 1);
    inputs.push(main_video.to_path_buf());
    inputs.extend(graph.extra_inputs.iter().cloned());

    RenderSpec {
        inputs,
        filter_complex: graph.filter_complex(),
        video_map: graph.final_stream.map_selector(),
        audio_map: Some(MAIN_AUDIO_SELECTOR.to_string()),
        encode: encode.clone(),
        output_path: output_path.to_path_buf(),
    }
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
