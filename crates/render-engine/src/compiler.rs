//! Overlay timeline to filtergraph compiler.
//!
//! Overlays are folded left to right over a cursor stream that starts at the
//! main video. Each overlay consumes the cursor and produces the next one, so
//! a later overlay always composites on top of every earlier one.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vidlayer_common::error::VidlayerError;
use vidlayer_timeline::{
    ActiveWindow, AssetRegistry, MediaOverlay, OverlayContent, OverlayDescriptor, Position,
    TextOverlay, ValidationIssue, VisualFilter,
};

use crate::fonts::FontResolver;
use crate::graph::{format_number, serialize_chain, Filter, FilterNode, StreamLabel};

/// Sepia colour-channel matrix (rr, rg, rb, gr, gg, gb, br, bg, bb).
const SEPIA_MATRIX: [(&str, f64); 9] = [
    ("rr", 0.393),
    ("rg", 0.769),
    ("rb", 0.189),
    ("gr", 0.349),
    ("gg", 0.686),
    ("gb", 0.168),
    ("br", 0.272),
    ("bg", 0.534),
    ("bb", 0.131),
];

/// What to do with an image/video overlay whose asset key is not registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingAssetPolicy {
    /// Drop the overlay and keep compiling. The rest of the graph is
    /// identical to compiling the list without it.
    #[default]
    Skip,
    /// Fail compilation.
    Reject,
}

/// Compiled filtergraph plus the extra inputs it references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamGraph {
    /// Non-main inputs; position `k` is engine input `k + 1`.
    pub extra_inputs: Vec<PathBuf>,
    /// Nodes in evaluation order.
    pub nodes: Vec<FilterNode>,
    /// Stream carrying the fully composited video.
    pub final_stream: StreamLabel,
}

impl StreamGraph {
    /// A graph with no overlays: the base stream passes straight through.
    pub fn passthrough(base: StreamLabel) -> Self {
        Self {
            extra_inputs: Vec::new(),
            nodes: Vec::new(),
            final_stream: base,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The `-filter_complex` description, or `None` when there are no nodes.
    pub fn filter_complex(&self) -> Option<String> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(serialize_chain(&self.nodes))
        }
    }

    /// Verify every consumed stream is defined before use and that the final
    /// stream is the last one produced.
    pub fn check_references(&self, base: &StreamLabel) -> Result<(), String> {
        let mut defined: Vec<&StreamLabel> = vec![base];
        for (i, node) in self.nodes.iter().enumerate() {
            for input in &node.inputs {
                let known = match input {
                    StreamLabel::Input { index } => {
                        *index >= 1 && *index <= self.extra_inputs.len()
                            || defined.contains(&input)
                    }
                    StreamLabel::Named(_) => defined.contains(&input),
                };
                if !known {
                    return Err(format!("node {i} consumes undefined stream [{input}]"));
                }
            }
            if defined.contains(&&node.output) {
                return Err(format!("node {i} redefines stream [{}]", node.output));
            }
            defined.push(&node.output);
        }

        let expected = self.nodes.last().map(|n| &n.output).unwrap_or(base);
        if &self.final_stream != expected {
            return Err(format!(
                "final stream [{}] is not the last produced stream [{expected}]",
                self.final_stream
            ));
        }
        Ok(())
    }
}

/// An overlay dropped under [`MissingAssetPolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedOverlay {
    /// Position in the submitted overlay list.
    pub index: usize,
    pub asset_key: String,
}

/// Result of compiling a timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledTimeline {
    pub graph: StreamGraph,
    pub skipped: Vec<SkippedOverlay>,
}

/// Compilation failure. No partial graph is ever returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("overlay {index}: {issue}")]
    Invalid { index: usize, issue: ValidationIssue },

    #[error("overlay {index}: asset {asset_key:?} was not uploaded")]
    AssetMissing { index: usize, asset_key: String },
}

impl From<CompileError> for VidlayerError {
    fn from(err: CompileError) -> Self {
        VidlayerError::compile(err.to_string())
    }
}

/// Compiles overlay timelines into filtergraphs.
pub struct GraphCompiler<'a> {
    fonts: &'a dyn FontResolver,
    missing_assets: MissingAssetPolicy,
}

impl<'a> GraphCompiler<'a> {
    pub fn new(fonts: &'a dyn FontResolver) -> Self {
        Self {
            fonts,
            missing_assets: MissingAssetPolicy::default(),
        }
    }

    pub fn with_missing_asset_policy(mut self, policy: MissingAssetPolicy) -> Self {
        self.missing_assets = policy;
        self
    }

    /// Compile `overlays` on top of `base`.
    ///
    /// Every descriptor is validated before any node is emitted.
    pub fn compile(
        &self,
        base: StreamLabel,
        overlays: &[OverlayDescriptor],
        assets: &AssetRegistry,
    ) -> Result<CompiledTimeline, CompileError> {
        for (index, overlay) in overlays.iter().enumerate() {
            overlay
                .validate()
                .map_err(|issue| CompileError::Invalid { index, issue })?;
        }

        let mut fold = Fold::new(base);
        let mut skipped = Vec::new();

        for (index, overlay) in overlays.iter().enumerate() {
            match &overlay.content {
                OverlayContent::Text(text) => {
                    let font = self.fonts.resolve(&text.font_family);
                    fold.draw_text(text, overlay, font);
                }
                OverlayContent::Image(media) | OverlayContent::Video(media) => {
                    let Some(path) = assets.resolve(&media.asset_key) else {
                        match self.missing_assets {
                            MissingAssetPolicy::Skip => {
                                tracing::warn!(
                                    index,
                                    asset_key = %media.asset_key,
                                    "Skipping overlay with missing asset"
                                );
                                skipped.push(SkippedOverlay {
                                    index,
                                    asset_key: media.asset_key.clone(),
                                });
                                continue;
                            }
                            MissingAssetPolicy::Reject => {
                                return Err(CompileError::AssetMissing {
                                    index,
                                    asset_key: media.asset_key.clone(),
                                });
                            }
                        }
                    };
                    fold.composite_media(media, overlay, path.to_path_buf());
                }
            }
        }

        let graph = fold.finish();
        tracing::debug!(
            overlays = overlays.len(),
            skipped = skipped.len(),
            nodes = graph.nodes.len(),
            inputs = graph.extra_inputs.len(),
            "Compiled overlay graph"
        );
        Ok(CompiledTimeline { graph, skipped })
    }
}

/// Left-fold state: the cursor stream plus everything emitted so far.
struct Fold {
    current: StreamLabel,
    extra_inputs: Vec<PathBuf>,
    nodes: Vec<FilterNode>,
    /// Overlays emitted so far; numbers intermediate labels.
    emitted: usize,
}

impl Fold {
    fn new(base: StreamLabel) -> Self {
        Self {
            current: base,
            extra_inputs: Vec::new(),
            nodes: Vec::new(),
            emitted: 0,
        }
    }

    fn next_input_index(&self) -> usize {
        self.extra_inputs.len() + 1
    }

    fn draw_text(&mut self, text: &TextOverlay, overlay: &OverlayDescriptor, font: Option<PathBuf>) {
        let step = self.emitted;
        let Position { x, y } = overlay.position;

        let mut filter = Filter::new("drawtext").literal("text", &text.text);
        if let Some(font) = font {
            filter = filter.literal("fontfile", font.to_string_lossy());
        }
        let filter = filter
            .raw("x", x)
            .raw("y", y)
            .raw("fontsize", text.effective_font_size(overlay.scale))
            .literal("fontcolor", &text.color)
            .raw("expansion", "none")
            .expr("enable", enable_expr(&overlay.window));

        self.advance(filter, vec![self.current.clone()], step);
    }

    fn composite_media(&mut self, media: &MediaOverlay, overlay: &OverlayDescriptor, path: PathBuf) {
        let step = self.emitted;
        let source = StreamLabel::input(self.next_input_index());
        self.extra_inputs.push(path);

        let scaled = StreamLabel::named(format!("scaled_{step}"));
        let filtered = StreamLabel::named(format!("filtered_{step}"));

        self.nodes.push(FilterNode::new(
            vec![source],
            Filter::new("scale")
                .positional(format!("iw*{}", format_number(overlay.scale)))
                .positional(-1),
            scaled.clone(),
        ));
        self.nodes.push(FilterNode::new(
            vec![scaled],
            visual_filter(media.filter),
            filtered.clone(),
        ));

        let Position { x, y } = overlay.position;
        let composite = Filter::new("overlay")
            .raw("x", x)
            .raw("y", y)
            .expr("enable", enable_expr(&overlay.window));
        self.advance(composite, vec![self.current.clone(), filtered], step);
    }

    fn advance(&mut self, filter: Filter, inputs: Vec<StreamLabel>, step: usize) {
        let output = StreamLabel::named(format!("v{step}"));
        self.nodes
            .push(FilterNode::new(inputs, filter, output.clone()));
        self.current = output;
        self.emitted += 1;
    }

    fn finish(self) -> StreamGraph {
        StreamGraph {
            extra_inputs: self.extra_inputs,
            nodes: self.nodes,
            final_stream: self.current,
        }
    }
}

/// Inclusive time gate evaluated per output frame.
fn enable_expr(window: &ActiveWindow) -> String {
    format!(
        "between(t,{},{})",
        format_number(window.start_secs),
        format_number(window.end_secs)
    )
}

fn visual_filter(filter: VisualFilter) -> Filter {
    match filter {
        VisualFilter::None => Filter::new("null"),
        VisualFilter::Grayscale => Filter::new("hue").raw("s", 0),
        VisualFilter::Sepia => SEPIA_MATRIX
            .iter()
            .fold(Filter::new("colorchannelmixer"), |f, (key, value)| {
                f.raw(key, value)
            }),
        VisualFilter::Invert => Filter::new("negate"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::{NoFonts, StaticFontResolver};
    use crate::graph::tests::parsed_option;
    use proptest::prelude::*;
    use vidlayer_timeline::OverlayKind;

    fn window(start: f64, end: f64) -> ActiveWindow {
        ActiveWindow::new(start, end).unwrap()
    }

    fn assets() -> AssetRegistry {
        [
            ("logo.png", "/up/logo.png"),
            ("pip.mp4", "/up/pip.mp4"),
        ]
        .into_iter()
        .collect()
    }

    fn compile(overlays: &[OverlayDescriptor]) -> CompiledTimeline {
        GraphCompiler::new(&NoFonts)
            .compile(StreamLabel::BASE, overlays, &assets())
            .unwrap()
    }

    #[test]
    fn test_empty_timeline_passes_base_through() {
        let compiled = compile(&[]);
        assert_eq!(compiled.graph, StreamGraph::passthrough(StreamLabel::BASE));
        assert!(compiled.graph.filter_complex().is_none());
        assert!(compiled.skipped.is_empty());
    }

    #[test]
    fn test_text_overlay_node() {
        let fonts = StaticFontResolver::new().with_font("Impact", "/fonts/impact.ttf");
        let overlay = OverlayDescriptor::text("Hello", 10, 20, window(1.0, 3.0)).with_scale(1.5);
        let compiled = GraphCompiler::new(&fonts)
            .compile(StreamLabel::BASE, &[overlay], &AssetRegistry::new())
            .unwrap();

        assert_eq!(
            compiled.graph.filter_complex().unwrap(),
            "[0:v]drawtext=text=Hello:fontfile=/fonts/impact.ttf:x=10:y=20:fontsize=60:\
             fontcolor=white:expansion=none:enable='between(t,1,3)'[v0]"
        );
        assert_eq!(compiled.graph.final_stream, StreamLabel::named("v0"));
        assert!(compiled.graph.extra_inputs.is_empty());
    }

    #[test]
    fn test_text_without_font_omits_fontfile() {
        let overlay = OverlayDescriptor::text("Hi", 0, 0, window(0.0, 1.0));
        let graph = compile(&[overlay]).graph;
        let expr = graph.filter_complex().unwrap();
        assert!(!expr.contains("fontfile"));
        assert!(expr.starts_with("[0:v]drawtext=text=Hi:x=0:y=0:"));
    }

    #[test]
    fn test_text_escaping_round_trips() {
        let overlay = OverlayDescriptor::text("a:b's", 10, 20, window(1.0, 3.0));
        let graph = compile(&[overlay]).graph;
        let node = graph.nodes[0].to_string();
        assert_eq!(parsed_option(&node, "text").as_deref(), Some("a:b's"));
    }

    #[test]
    fn test_windows_font_path_is_escaped() {
        let fonts = StaticFontResolver::new().with_font("Impact", r"C:\Windows\Fonts\impact.ttf");
        let overlay = OverlayDescriptor::text("x", 0, 0, window(0.0, 1.0));
        let graph = GraphCompiler::new(&fonts)
            .compile(StreamLabel::BASE, &[overlay], &AssetRegistry::new())
            .unwrap()
            .graph;
        let node = graph.nodes[0].to_string();
        assert_eq!(
            parsed_option(&node, "fontfile").as_deref(),
            Some(r"C:\Windows\Fonts\impact.ttf")
        );
    }

    #[test]
    fn test_image_overlay_nodes() {
        let overlay = OverlayDescriptor::image("logo.png", 5, 6, window(0.5, 2.0))
            .with_scale(0.5)
            .with_filter(VisualFilter::Grayscale);
        let graph = compile(&[overlay]).graph;

        assert_eq!(graph.extra_inputs, vec![PathBuf::from("/up/logo.png")]);
        let rendered: Vec<String> = graph.nodes.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "[1:v]scale=iw*0.5:-1[scaled_0]".to_string(),
                "[scaled_0]hue=s=0[filtered_0]".to_string(),
                "[0:v][filtered_0]overlay=x=5:y=6:enable='between(t,0.5,2)'[v0]".to_string(),
            ]
        );
        assert_eq!(graph.final_stream, StreamLabel::named("v0"));
    }

    #[test]
    fn test_visual_filters() {
        assert_eq!(visual_filter(VisualFilter::None).to_string(), "null");
        assert_eq!(visual_filter(VisualFilter::Invert).to_string(), "negate");
        assert_eq!(
            visual_filter(VisualFilter::Sepia).to_string(),
            "colorchannelmixer=rr=0.393:rg=0.769:rb=0.189:gr=0.349:gg=0.686:gb=0.168:\
             br=0.272:bg=0.534:bb=0.131"
        );
    }

    #[test]
    fn test_mixed_timeline_chains_in_order() {
        let overlays = vec![
            OverlayDescriptor::video("pip.mp4", 0, 0, window(0.0, 5.0)),
            OverlayDescriptor::text("Title", 10, 10, window(1.0, 2.0)),
            OverlayDescriptor::image("logo.png", 100, 100, window(0.0, 10.0)),
        ];
        let graph = compile(&overlays).graph;

        assert_eq!(
            graph.extra_inputs,
            vec![PathBuf::from("/up/pip.mp4"), PathBuf::from("/up/logo.png")]
        );
        assert_eq!(graph.nodes.len(), 7);
        // text consumes the video composite's output
        assert_eq!(graph.nodes[3].inputs, vec![StreamLabel::named("v0")]);
        // second media input uses engine input 2
        assert_eq!(graph.nodes[4].inputs, vec![StreamLabel::input(2)]);
        assert_eq!(
            graph.nodes[6].inputs,
            vec![StreamLabel::named("v1"), StreamLabel::named("filtered_2")]
        );
        assert_eq!(graph.final_stream, StreamLabel::named("v2"));
        assert!(graph.check_references(&StreamLabel::BASE).is_ok());
    }

    #[test]
    fn test_later_overlay_consumes_earlier_output() {
        let a = OverlayDescriptor::image("logo.png", 0, 0, window(0.0, 4.0));
        let b = OverlayDescriptor::image("pip.mp4", 0, 0, window(2.0, 6.0));
        let graph = compile(&[a, b]).graph;

        let a_out = &graph.nodes[2].output;
        let b_composite = &graph.nodes[5];
        assert_eq!(b_composite.filter.name, "overlay");
        assert_eq!(&b_composite.inputs[0], a_out);
    }

    #[test]
    fn test_missing_asset_is_skipped() {
        let with_missing = vec![
            OverlayDescriptor::text("A", 0, 0, window(0.0, 1.0)),
            OverlayDescriptor::image("ghost.png", 0, 0, window(0.0, 1.0)),
            OverlayDescriptor::image("logo.png", 1, 1, window(0.0, 1.0)),
        ];
        let without = vec![with_missing[0].clone(), with_missing[2].clone()];

        let compiled = compile(&with_missing);
        assert_eq!(compiled.graph, compile(&without).graph);
        assert_eq!(
            compiled.skipped,
            vec![SkippedOverlay {
                index: 1,
                asset_key: "ghost.png".into()
            }]
        );
    }

    #[test]
    fn test_missing_asset_reject_policy() {
        let overlays = vec![OverlayDescriptor::video("ghost.mp4", 0, 0, window(0.0, 1.0))];
        let err = GraphCompiler::new(&NoFonts)
            .with_missing_asset_policy(MissingAssetPolicy::Reject)
            .compile(StreamLabel::BASE, &overlays, &assets())
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::AssetMissing {
                index: 0,
                asset_key: "ghost.mp4".into()
            }
        );
        let err: VidlayerError = err.into();
        assert!(matches!(err, VidlayerError::Compile { .. }));
    }

    #[test]
    fn test_invalid_descriptor_fails_whole_compile() {
        let overlays = vec![
            OverlayDescriptor::text("fine", 0, 0, window(0.0, 1.0)),
            OverlayDescriptor::image("logo.png", 0, 0, window(0.0, 1.0)).with_scale(-1.0),
        ];
        let err = GraphCompiler::new(&NoFonts)
            .compile(StreamLabel::BASE, &overlays, &assets())
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::Invalid {
                index: 1,
                issue: ValidationIssue::InvalidScale(-1.0)
            }
        );
    }

    #[test]
    fn test_check_references_catches_undefined_stream() {
        let graph = StreamGraph {
            extra_inputs: Vec::new(),
            nodes: vec![FilterNode::new(
                vec![StreamLabel::named("nowhere")],
                Filter::new("null"),
                StreamLabel::named("v0"),
            )],
            final_stream: StreamLabel::named("v0"),
        };
        assert!(graph.check_references(&StreamLabel::BASE).is_err());
    }

    fn overlay_strategy() -> impl Strategy<Value = OverlayDescriptor> {
        let kind = prop_oneof![
            Just(OverlayKind::Text),
            Just(OverlayKind::Image),
            Just(OverlayKind::Video)
        ];
        let key = prop_oneof![Just("logo.png"), Just("pip.mp4"), Just("ghost.png")];
        let filter = prop_oneof![
            Just(VisualFilter::None),
            Just(VisualFilter::Grayscale),
            Just(VisualFilter::Sepia),
            Just(VisualFilter::Invert)
        ];
        (
            kind,
            key,
            filter,
            "[ -~]{1,16}",
            -500i32..2000,
            -500i32..2000,
            0.0f64..30.0,
            0.0f64..30.0,
            0.1f64..4.0,
        )
            .prop_map(|(kind, key, filter, text, x, y, a, b, scale)| {
                let w = window(a.min(b), a.max(b));
                let overlay = match kind {
                    OverlayKind::Text => OverlayDescriptor::text(text, x, y, w),
                    OverlayKind::Image => OverlayDescriptor::image(key, x, y, w),
                    OverlayKind::Video => OverlayDescriptor::video(key, x, y, w),
                };
                overlay.with_scale(scale).with_filter(filter)
            })
    }

    proptest! {
        #[test]
        fn prop_compile_is_deterministic(overlays in prop::collection::vec(overlay_strategy(), 0..8)) {
            let first = compile(&overlays);
            let second = compile(&overlays);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_graph_is_linear_and_well_referenced(overlays in prop::collection::vec(overlay_strategy(), 0..8)) {
            let graph = compile(&overlays).graph;
            prop_assert!(graph.check_references(&StreamLabel::BASE).is_ok());

            // Each composite or draw node consumes the previous cursor.
            let mut cursor = StreamLabel::BASE;
            for node in &graph.nodes {
                if matches!(node.filter.name.as_str(), "drawtext" | "overlay") {
                    prop_assert_eq!(&node.inputs[0], &cursor);
                    cursor = node.output.clone();
                }
            }
            prop_assert_eq!(cursor, graph.final_stream);
        }

        #[test]
        fn prop_skipping_equals_removal(overlays in prop::collection::vec(overlay_strategy(), 0..8)) {
            let registry = assets();
            let kept: Vec<OverlayDescriptor> = overlays
                .iter()
                .filter(|o| o.asset_key().map_or(true, |k| registry.contains(k)))
                .cloned()
                .collect();
            let full = compile(&overlays);
            prop_assert_eq!(full.skipped.len(), overlays.len() - kept.len());
            prop_assert_eq!(full.graph, compile(&kept).graph);
        }
    }
}
