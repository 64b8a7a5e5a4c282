//! Where resource bytes come from.
//!
//! A [`ResourceSource`] only fetches bytes. It is called from preloader
//! worker threads as well as the tick thread, so implementations must be
//! `Send + Sync` and must not touch any component state.

use std::path::PathBuf;

use dashmap::DashMap;

use crate::error::ResourceError;

/// Byte provider for resource paths.
pub trait ResourceSource: Send + Sync + std::fmt::Debug {
    /// Fetch the bytes stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotFound`] if nothing is stored at `path`.
    fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError>;
}

/// In-memory source, used by tools and tests.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: DashMap<String, Vec<u8>>,
}

impl MemorySource {
    /// An empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` at `path`, replacing any previous content.
    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), bytes.into());
    }

    /// Remove the content at `path`.
    pub fn remove(&self, path: &str) -> bool {
        self.files.remove(path).is_some()
    }
}

impl ResourceSource for MemorySource {
    fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        self.files
            .get(path)
            .map(|bytes| bytes.clone())
            .ok_or_else(|| ResourceError::NotFound(path.to_string()))
    }
}

/// Source rooted at a directory of built resources. Resource path
/// `/levels/a.collectionc` maps to `<root>/levels/a.collectionc`.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    /// A source reading below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceSource for DirSource {
    fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        let relative = path.trim_start_matches('/');
        if relative.split('/').any(|part| part == "..") {
            return Err(ResourceError::NotFound(path.to_string()));
        }
        std::fs::read(self.root.join(relative)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ResourceError::NotFound(path.to_string()),
            _ => ResourceError::Io {
                path: path.to_string(),
                message: e.to_string(),
            },
        })
    }
}
