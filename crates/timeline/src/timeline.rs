//! Timeline wire format.
//!
//! A timeline is a JSON array of overlay records:
//!
//! ```json
//! [
//!   {"type": "text", "content": "Hello", "x": 10, "y": 20,
//!    "start_time": 1.0, "end_time": 3.0, "fontsize": 48, "color": "#E0FFD6"},
//!   {"type": "image", "content": "logo.png", "x": 0, "y": 0, "scale": 0.5,
//!    "start_time": 0.0, "end_time": 5.0, "filter": "grayscale"}
//! ]
//! ```
//!
//! Records are deserialized loosely and then converted into typed
//! [`OverlayDescriptor`]s; every malformed record is reported with its index.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vidlayer_common::error::VidlayerError;

use crate::overlay::{
    ActiveWindow, MediaOverlay, OverlayContent, OverlayDescriptor, OverlayKind, Position,
    TextOverlay, ValidationIssue, VisualFilter, DEFAULT_FONT_FAMILY, DEFAULT_FONT_SIZE,
    DEFAULT_TEXT_COLOR,
};

/// One overlay record exactly as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOverlay {
    #[serde(rename = "type")]
    pub kind: String,

    /// Text for `text` overlays, asset key for `image`/`video` overlays.
    #[serde(default)]
    pub content: Option<String>,

    pub x: f64,
    pub y: f64,

    #[serde(default = "default_scale")]
    pub scale: f64,

    pub start_time: f64,
    pub end_time: f64,

    #[serde(default = "default_font_size")]
    pub fontsize: i64,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default = "default_filter")]
    pub filter: String,

    #[serde(default = "default_font")]
    pub font: String,
}

fn default_scale() -> f64 {
    1.0
}

fn default_font_size() -> i64 {
    DEFAULT_FONT_SIZE as i64
}

fn default_color() -> String {
    DEFAULT_TEXT_COLOR.to_string()
}

fn default_filter() -> String {
    VisualFilter::None.as_str().to_string()
}

fn default_font() -> String {
    DEFAULT_FONT_FAMILY.to_string()
}

impl TryFrom<RawOverlay> for OverlayDescriptor {
    type Error = ValidationIssue;

    fn try_from(raw: RawOverlay) -> Result<Self, Self::Error> {
        let kind =
            OverlayKind::parse(&raw.kind).ok_or_else(|| ValidationIssue::UnknownKind(raw.kind))?;

        let position = pixel_position(raw.x, raw.y)?;
        let window = ActiveWindow::new(raw.start_time, raw.end_time)?;

        let content = raw
            .content
            .filter(|c| !c.is_empty())
            .ok_or(ValidationIssue::MissingContent { kind })?;

        let content = match kind {
            OverlayKind::Text => {
                let font_size = u32::try_from(raw.fontsize)
                    .ok()
                    .filter(|size| *size > 0)
                    .ok_or(ValidationIssue::InvalidFontSize(raw.fontsize))?;
                OverlayContent::Text(TextOverlay {
                    text: content,
                    font_size,
                    color: raw.color,
                    font_family: raw.font,
                })
            }
            OverlayKind::Image | OverlayKind::Video => {
                let filter = VisualFilter::parse(&raw.filter)
                    .ok_or_else(|| ValidationIssue::UnknownFilter(raw.filter.clone()))?;
                let media = MediaOverlay {
                    asset_key: content,
                    filter,
                };
                if kind == OverlayKind::Image {
                    OverlayContent::Image(media)
                } else {
                    OverlayContent::Video(media)
                }
            }
        };

        let descriptor = OverlayDescriptor {
            position,
            scale: raw.scale,
            window,
            content,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}

/// Fractional coordinates are truncated toward zero.
fn pixel_position(x: f64, y: f64) -> Result<Position, ValidationIssue> {
    let in_range = |v: f64| v.is_finite() && v >= i32::MIN as f64 && v <= i32::MAX as f64;
    if !in_range(x) || !in_range(y) {
        return Err(ValidationIssue::InvalidPosition { x, y });
    }
    Ok(Position::new(x.trunc() as i32, y.trunc() as i32))
}

/// Errors produced while reading a timeline.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("Failed to read timeline {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Timeline is not valid JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("overlay {index}: {issue}")]
    Invalid { index: usize, issue: ValidationIssue },
}

impl From<TimelineError> for VidlayerError {
    fn from(err: TimelineError) -> Self {
        match err {
            TimelineError::ReadError { source, .. } => VidlayerError::Io(source),
            other => VidlayerError::timeline(other.to_string()),
        }
    }
}

/// Parse and validate a JSON timeline.
pub fn parse_timeline(json: &str) -> Result<Vec<OverlayDescriptor>, TimelineError> {
    let raw: Vec<RawOverlay> = serde_json::from_str(json)?;
    raw.into_iter()
        .enumerate()
        .map(|(index, record)| {
            OverlayDescriptor::try_from(record)
                .map_err(|issue| TimelineError::Invalid { index, issue })
        })
        .collect()
}

/// Read, parse, and validate a timeline file.
pub fn load_timeline(path: &Path) -> Result<Vec<OverlayDescriptor>, TimelineError> {
    let json = std::fs::read_to_string(path).map_err(|source| TimelineError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    parse_timeline(&json)
}
