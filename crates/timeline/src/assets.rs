//! Asset registry: uploaded asset keys to local file locations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Maps asset keys (the `content` of image/video overlays) to files on disk.
///
/// Populated before compilation and treated as immutable for the duration of
/// one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRegistry {
    entries: BTreeMap<String, PathBuf>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry keyed by each file's name.
    ///
    /// Later paths with the same file name replace earlier ones.
    pub fn from_files<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut registry = Self::new();
        for path in paths {
            let path = path.as_ref();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                registry.insert(name, path);
            }
        }
        registry
    }

    /// Register `key`, returning the previously registered path if any.
    pub fn insert(&mut self, key: impl Into<String>, path: impl Into<PathBuf>) -> Option<PathBuf> {
        self.entries.insert(key.into(), path.into())
    }

    pub fn resolve(&self, key: &str) -> Option<&Path> {
        self.entries.get(key).map(PathBuf::as_path)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered paths that do not exist on disk.
    pub fn missing_files(&self) -> Vec<&Path> {
        self.entries
            .values()
            .filter(|path| !path.exists())
            .map(PathBuf::as_path)
            .collect()
    }
}

impl<K: Into<String>, P: Into<PathBuf>> FromIterator<(K, P)> for AssetRegistry {
    fn from_iter<T: IntoIterator<Item = (K, P)>>(iter: T) -> Self {
        let mut registry = Self::new();
        for (key, path) in iter {
            registry.insert(key, path);
        }
        registry
    }
}
