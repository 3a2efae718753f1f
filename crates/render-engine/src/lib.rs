//! vidlayer Render Engine
//!
//! Turns an overlay timeline into a single ffmpeg invocation and runs it.
//!
//! # Pipeline Architecture
//!
//! ```text
//! main.mp4 [0:v] ──┐
//!                  ├── drawtext (text overlay 0)          ──> [v0]
//!                  │
//! logo.png [1:v] ──┼── scale ─> colour filter ─> overlay  ──> [v1]
//!                  │
//! clip.mp4 [2:v] ──┴── scale ─> colour filter ─> overlay  ──> [v2]
//!                                                              │
//! main.mp4 [0:a?] ─────────────────────────────────────────────┤
//!                                                              ▼
//!                                                    Encode (H.264) ─> <job>.mp4
//! ```
//!
//! - [`compiler`] folds overlays, in order, into a linear [`StreamGraph`].
//! - [`graph`] holds the node types and the one place filtergraph escaping
//!   happens.
//! - [`command`] assembles inputs, graph, stream maps, and encode settings.
//! - [`engine`] runs the external engine and captures its diagnostics.
//! - [`fonts`] resolves logical font families to files on the host.

pub mod command;
pub mod compiler;
pub mod engine;
pub mod fonts;
pub mod graph;

pub use command::*;
pub use compiler::*;
pub use engine::*;
pub use fonts::*;
pub use graph::*;
