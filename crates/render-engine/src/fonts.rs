//! Font resolution for text overlays.
//!
//! Logical family names map to candidate file names; candidates are looked up
//! in the host platform's font directories. A missing font is never an error:
//! the drawtext node is emitted without a `fontfile` and ffmpeg falls back to
//! its default.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Resolves a logical font family to a font file.
pub trait FontResolver: Send + Sync {
    fn resolve(&self, family: &str) -> Option<PathBuf>;
}

/// Family name to candidate file names, searched in order.
const FONT_TABLE: &[(&str, &[&str])] = &[
    ("Impact", &["impact.ttf", "Impact.ttf"]),
    ("Arial", &["arial.ttf", "Arial.ttf"]),
    ("Courier", &["cour.ttf", "Courier New.ttf"]),
    ("Georgia", &["georgia.ttf", "Georgia.ttf"]),
    ("Verdana", &["verdana.ttf", "Verdana.ttf"]),
];

/// Family used for names missing from the table.
const FALLBACK_FAMILY: &str = "Arial";

/// Host platform, selecting search directories and the last-resort font.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Windows,
    MacOs,
    Linux,
}

impl HostPlatform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// Directories searched for table candidates, in priority order.
    pub fn font_dirs(&self) -> Vec<PathBuf> {
        let home = std::env::var("HOME").ok().map(PathBuf::from);
        match self {
            Self::Windows => vec![PathBuf::from("C:/Windows/Fonts")],
            Self::MacOs => {
                let mut dirs = vec![
                    PathBuf::from("/Library/Fonts"),
                    PathBuf::from("/System/Library/Fonts"),
                    PathBuf::from("/System/Library/Fonts/Supplemental"),
                ];
                if let Some(home) = home {
                    dirs.push(home.join("Library").join("Fonts"));
                }
                dirs
            }
            Self::Linux => {
                let mut dirs = vec![
                    PathBuf::from("/usr/share/fonts/truetype/msttcorefonts"),
                    PathBuf::from("/usr/share/fonts/TTF"),
                    PathBuf::from("/usr/share/fonts/truetype"),
                    PathBuf::from("/usr/local/share/fonts"),
                ];
                if let Some(home) = home {
                    dirs.push(home.join(".local").join("share").join("fonts"));
                    dirs.push(home.join(".fonts"));
                }
                dirs
            }
        }
    }

    /// Font used when no table candidate exists.
    pub fn fallback_font(&self) -> PathBuf {
        match self {
            Self::Windows => PathBuf::from("C:/Windows/Fonts/arial.ttf"),
            Self::MacOs => PathBuf::from("/System/Library/Fonts/Helvetica.ttc"),
            Self::Linux => PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"),
        }
    }
}

fn is_file(path: &Path) -> bool {
    path.is_file()
}

/// Table-driven resolver against the host's installed fonts.
#[derive(Debug, Clone)]
pub struct SystemFontResolver {
    search_dirs: Vec<PathBuf>,
    fallback: Option<PathBuf>,
    probe: fn(&Path) -> bool,
}

impl Default for SystemFontResolver {
    fn default() -> Self {
        Self::for_platform(HostPlatform::current())
    }
}

impl SystemFontResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_platform(platform: HostPlatform) -> Self {
        Self {
            search_dirs: platform.font_dirs(),
            fallback: Some(platform.fallback_font()),
            probe: is_file,
        }
    }

    /// Replace the search directories.
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    pub fn with_fallback(mut self, fallback: Option<PathBuf>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Replace the existence check (used by tests).
    pub fn with_probe(mut self, probe: fn(&Path) -> bool) -> Self {
        self.probe = probe;
        self
    }

    /// Candidate file names for a family. Matching is case-insensitive.
    pub fn candidates(family: &str) -> &'static [&'static str] {
        let lookup = |name: &str| {
            FONT_TABLE
                .iter()
                .find(|(known, _)| known.eq_ignore_ascii_case(name))
                .map(|(_, files)| *files)
        };
        lookup(family)
            .or_else(|| lookup(FALLBACK_FAMILY))
            .unwrap_or(&[])
    }

    /// Logical families the table knows about.
    pub fn known_families() -> impl Iterator<Item = &'static str> {
        FONT_TABLE.iter().map(|(family, _)| *family)
    }
}

impl FontResolver for SystemFontResolver {
    fn resolve(&self, family: &str) -> Option<PathBuf> {
        let candidates = Self::candidates(family);
        for dir in &self.search_dirs {
            for file in candidates {
                let path = dir.join(file);
                if (self.probe)(&path) {
                    return Some(path);
                }
            }
        }

        let fallback = self.fallback.as_ref().filter(|path| (self.probe)(path));
        if fallback.is_none() {
            tracing::debug!(family, "No font file found");
        }
        fallback.cloned()
    }
}

/// Fixed family-to-file mapping.
#[derive(Debug, Clone, Default)]
pub struct StaticFontResolver {
    fonts: BTreeMap<String, PathBuf>,
}

impl StaticFontResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(mut self, family: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.fonts.insert(family.into(), path.into());
        self
    }
}

impl FontResolver for StaticFontResolver {
    fn resolve(&self, family: &str) -> Option<PathBuf> {
        self.fonts.get(family).cloned()
    }
}

/// Resolver that never finds a font.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFonts;

impl FontResolver for NoFonts {
    fn resolve(&self, _family: &str) -> Option<PathBuf> {
        None
    }
}
