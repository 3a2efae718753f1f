//! Overlay descriptor types.
//!
//! An overlay is a timed visual element composited onto the main video.
//! Descriptors are always well-formed once constructed through
//! [`crate::timeline::parse_timeline`]; hand-built descriptors can be checked
//! with [`OverlayDescriptor::validate`].

use serde::{Deserialize, Serialize};

/// Default font size for text overlays, before scaling.
pub const DEFAULT_FONT_SIZE: u32 = 40;

/// Default text colour.
pub const DEFAULT_TEXT_COLOR: &str = "white";

/// Default logical font family.
pub const DEFAULT_FONT_FAMILY: &str = "Impact";

/// Overlay kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    Text,
    Image,
    Video,
}

impl OverlayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Parse a wire-format kind name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

/// Colour treatment applied to image and video overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualFilter {
    #[default]
    None,
    Grayscale,
    Sepia,
    Invert,
}

impl VisualFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Grayscale => "grayscale",
            Self::Sepia => "sepia",
            Self::Invert => "invert",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "grayscale" => Some(Self::Grayscale),
            "sepia" => Some(Self::Sepia),
            "invert" => Some(Self::Invert),
            _ => None,
        }
    }
}

/// Top-left placement in output pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Inclusive time interval during which an overlay is visible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActiveWindow {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl ActiveWindow {
    /// Create a window, rejecting non-finite bounds and `start > end`.
    pub fn new(start_secs: f64, end_secs: f64) -> Result<Self, ValidationIssue> {
        let window = Self {
            start_secs,
            end_secs,
        };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), ValidationIssue> {
        if !self.start_secs.is_finite()
            || !self.end_secs.is_finite()
            || self.start_secs > self.end_secs
        {
            return Err(ValidationIssue::InvalidWindow {
                start: self.start_secs,
                end: self.end_secs,
            });
        }
        Ok(())
    }

    /// Whether `t` lies in the window. Both bounds are inclusive.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start_secs && t <= self.end_secs
    }
}

/// Burned-in text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    /// Literal text to draw. Never pre-escaped.
    pub text: String,
    /// Font size before scaling.
    pub font_size: u32,
    /// Named colour or hex colour.
    pub color: String,
    /// Logical font family, resolved to a file by the renderer.
    pub font_family: String,
}

impl TextOverlay {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font_size: DEFAULT_FONT_SIZE,
            color: DEFAULT_TEXT_COLOR.to_string(),
            font_family: DEFAULT_FONT_FAMILY.to_string(),
        }
    }

    /// Font size after applying the overlay scale, truncated, never below 1.
    pub fn effective_font_size(&self, scale: f64) -> u32 {
        ((self.font_size as f64 * scale) as u32).max(1)
    }
}

/// Image or video clip drawn from the asset registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaOverlay {
    /// Key into the asset registry.
    pub asset_key: String,
    pub filter: VisualFilter,
}

impl MediaOverlay {
    pub fn new(asset_key: impl Into<String>) -> Self {
        Self {
            asset_key: asset_key.into(),
            filter: VisualFilter::None,
        }
    }
}

/// Kind-specific overlay payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayContent {
    Text(TextOverlay),
    Image(MediaOverlay),
    Video(MediaOverlay),
}

/// One item of the overlay timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayDescriptor {
    pub position: Position,
    /// Multiplies font size for text, source width for image and video.
    pub scale: f64,
    pub window: ActiveWindow,
    pub content: OverlayContent,
}

impl OverlayDescriptor {
    fn with_content(content: OverlayContent, x: i32, y: i32, window: ActiveWindow) -> Self {
        Self {
            position: Position::new(x, y),
            scale: 1.0,
            window,
            content,
        }
    }

    pub fn text(text: impl Into<String>, x: i32, y: i32, window: ActiveWindow) -> Self {
        Self::with_content(OverlayContent::Text(TextOverlay::new(text)), x, y, window)
    }

    pub fn image(asset_key: impl Into<String>, x: i32, y: i32, window: ActiveWindow) -> Self {
        Self::with_content(
            OverlayContent::Image(MediaOverlay::new(asset_key)),
            x,
            y,
            window,
        )
    }

    pub fn video(asset_key: impl Into<String>, x: i32, y: i32, window: ActiveWindow) -> Self {
        Self::with_content(
            OverlayContent::Video(MediaOverlay::new(asset_key)),
            x,
            y,
            window,
        )
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Set the visual filter. Ignored for text overlays.
    pub fn with_filter(mut self, filter: VisualFilter) -> Self {
        if let OverlayContent::Image(media) | OverlayContent::Video(media) = &mut self.content {
            media.filter = filter;
        }
        self
    }

    pub fn kind(&self) -> OverlayKind {
        match self.content {
            OverlayContent::Text(_) => OverlayKind::Text,
            OverlayContent::Image(_) => OverlayKind::Image,
            OverlayContent::Video(_) => OverlayKind::Video,
        }
    }

    /// Asset key for image and video overlays.
    pub fn asset_key(&self) -> Option<&str> {
        match &self.content {
            OverlayContent::Text(_) => None,
            OverlayContent::Image(media) | OverlayContent::Video(media) => {
                Some(media.asset_key.as_str())
            }
        }
    }

    /// Check every field invariant of the descriptor.
    pub fn validate(&self) -> Result<(), ValidationIssue> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(ValidationIssue::InvalidScale(self.scale));
        }
        self.window.validate()?;

        match &self.content {
            OverlayContent::Text(text) => {
                if text.text.is_empty() {
                    return Err(ValidationIssue::MissingContent {
                        kind: OverlayKind::Text,
                    });
                }
                if text.font_size == 0 {
                    return Err(ValidationIssue::InvalidFontSize(0));
                }
                if !is_valid_color(&text.color) {
                    return Err(ValidationIssue::InvalidColor(text.color.clone()));
                }
                if text.font_family.trim().is_empty() {
                    return Err(ValidationIssue::MissingFontFamily);
                }
            }
            OverlayContent::Image(media) | OverlayContent::Video(media) => {
                if media.asset_key.trim().is_empty() {
                    return Err(ValidationIssue::MissingContent { kind: self.kind() });
                }
            }
        }
        Ok(())
    }
}

/// Reason a single overlay descriptor is malformed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationIssue {
    #[error("unrecognized overlay kind {0:?}")]
    UnknownKind(String),

    #[error("unrecognized visual filter {0:?}")]
    UnknownFilter(String),

    #[error("{} overlay is missing its content", kind.as_str())]
    MissingContent { kind: OverlayKind },

    #[error("scale must be a positive finite number, got {0}")]
    InvalidScale(f64),

    #[error("invalid active window [{start}, {end}]")]
    InvalidWindow { start: f64, end: f64 },

    #[error("font size must be positive, got {0}")]
    InvalidFontSize(i64),

    #[error("invalid colour {0:?}")]
    InvalidColor(String),

    #[error("font family is empty")]
    MissingFontFamily,

    #[error("position ({x}, {y}) is out of range")]
    InvalidPosition { x: f64, y: f64 },
}

/// Accepts named colours (`white`, `DarkRed`), `#RRGGBB[AA]` and
/// `0xRRGGBB[AA]`, each optionally followed by `@alpha`.
pub fn is_valid_color(color: &str) -> bool {
    let (base, alpha) = match color.split_once('@') {
        Some((base, alpha)) => (base, Some(alpha)),
        None => (color, None),
    };

    let base_ok = if let Some(hex) = base.strip_prefix('#').or_else(|| base.strip_prefix("0x")) {
        matches!(hex.len(), 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit())
    } else {
        !base.is_empty() && base.len() <= 32 && base.chars().all(|c| c.is_ascii_alphabetic())
    };

    let alpha_ok = match alpha {
        None => true,
        Some(a) => a
            .parse::<f64>()
            .map(|v| (0.0..=1.0).contains(&v))
            .unwrap_or(false),
    };

    base_ok && alpha_ok
}
