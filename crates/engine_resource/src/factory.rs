//! The reference-counted resource store.
//!
//! [`ResourceFactory`] is the sole owner of resource data. Acquiring a path
//! that is already resident bumps its reference count; the first acquire
//! fetches the bytes from the [`ResourceSource`] and runs the loader for the
//! path's extension. Releasing the last reference destroys the resource and
//! releases everything it acquired while it was created.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use engine_component::NameHash;
use tracing::{debug, warn};

use crate::error::ResourceError;
use crate::handle::{ResourceData, ResourceHandle};
use crate::loader::{ResourceLoader, extension_of};
use crate::source::ResourceSource;

/// Default upper bound on resident resources.
pub const DEFAULT_MAX_RESOURCES: usize = 1024;

struct Entry {
    path: String,
    data: ResourceData,
    ref_count: usize,
    dependencies: Vec<ResourceHandle>,
}

/// Snapshot of a resident resource, see [`ResourceFactory::find_by_hash`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// The resource path.
    pub path: String,
    /// Hash of the path.
    pub path_hash: NameHash,
    /// Current reference count.
    pub ref_count: usize,
}

/// Reference-counted store of typed resources.
pub struct ResourceFactory {
    source: Arc<dyn ResourceSource>,
    loaders: HashMap<&'static str, Arc<dyn ResourceLoader>>,
    entries: DashMap<NameHash, Entry>,
    /// Paths whose loader is currently running, for loop detection.
    creating: DashSet<NameHash>,
    max_resources: usize,
}

impl ResourceFactory {
    /// A store reading from `source` with no loaders registered.
    #[must_use]
    pub fn new(source: Arc<dyn ResourceSource>) -> Self {
        Self {
            source,
            loaders: HashMap::new(),
            entries: DashMap::new(),
            creating: DashSet::new(),
            max_resources: DEFAULT_MAX_RESOURCES,
        }
    }

    /// Limit the number of resident resources.
    #[must_use]
    pub fn with_max_resources(mut self, max_resources: usize) -> Self {
        self.max_resources = max_resources;
        self
    }

    /// Register a loader for its extension, replacing any previous one.
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.register(loader);
        self
    }

    /// Register a loader for its extension, replacing any previous one.
    pub fn register(&mut self, loader: Arc<dyn ResourceLoader>) {
        self.loaders.insert(loader.extension(), loader);
    }

    /// The byte source backing this store.
    #[must_use]
    pub fn source(&self) -> Arc<dyn ResourceSource> {
        Arc::clone(&self.source)
    }

    /// The loader responsible for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::MissingExtension`] or
    /// [`ResourceError::UnknownType`].
    pub fn loader_for(&self, path: &str) -> Result<Arc<dyn ResourceLoader>, ResourceError> {
        let extension =
            extension_of(path).ok_or_else(|| ResourceError::MissingExtension(path.to_string()))?;
        self.loaders
            .get(extension)
            .cloned()
            .ok_or_else(|| ResourceError::UnknownType {
                path: path.to_string(),
                extension: extension.to_string(),
            })
    }

    /// Take a reference to the resource at `path`, loading it if needed.
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] if the resource is not resident and cannot
    /// be read or created.
    pub fn acquire(&self, path: &str) -> Result<ResourceHandle, ResourceError> {
        if let Some(handle) = self.try_acquire_resident(path) {
            return Ok(handle);
        }
        self.loader_for(path)?;
        let bytes = self.source.read(path)?;
        self.acquire_with_bytes(path, &bytes)
    }

    /// Take a reference to the resource at `path`, creating it from `bytes`
    /// if it is not already resident. Used by the preloader, which fetches
    /// bytes off the tick thread.
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] if creation fails.
    pub fn acquire_with_bytes(&self, path: &str, bytes: &[u8]) -> Result<ResourceHandle, ResourceError> {
        if let Some(handle) = self.try_acquire_resident(path) {
            return Ok(handle);
        }
        let loader = self.loader_for(path)?;
        if self.entries.len() >= self.max_resources {
            return Err(ResourceError::OutOfResources(self.max_resources));
        }

        let path_hash = NameHash::of(path);
        if !self.creating.insert(path_hash) {
            return Err(ResourceError::Loop(path.to_string()));
        }
        let created = loader.create(self, path, bytes);
        self.creating.remove(&path_hash);

        let loaded = created?;
        debug!(
            path,
            dependencies = loaded.dependencies.len(),
            "resource created"
        );
        let data = Arc::clone(&loaded.data);
        self.entries.insert(
            path_hash,
            Entry {
                path: path.to_string(),
                data: loaded.data,
                ref_count: 1,
                dependencies: loaded.dependencies,
            },
        );
        Ok(ResourceHandle::new(path_hash, data))
    }

    fn try_acquire_resident(&self, path: &str) -> Option<ResourceHandle> {
        let path_hash = NameHash::of(path);
        let mut entry = self.entries.get_mut(&path_hash)?;
        entry.ref_count += 1;
        Some(ResourceHandle::new(path_hash, Arc::clone(&entry.data)))
    }

    /// Give back one reference. The last release destroys the resource and
    /// releases its dependencies.
    pub fn release(&self, handle: ResourceHandle) {
        let path_hash = handle.path_hash();
        let destroyed = {
            let Some(mut entry) = self.entries.get_mut(&path_hash) else {
                warn!(%path_hash, "released a resource that is not resident");
                return;
            };
            entry.ref_count -= 1;
            entry.ref_count == 0
        };
        if !destroyed {
            return;
        }
        if let Some((_, entry)) = self.entries.remove(&path_hash) {
            debug!(path = entry.path, "resource destroyed");
            for dependency in entry.dependencies {
                self.release(dependency);
            }
        }
    }

    /// Release every handle in `handles`.
    pub fn release_all(&self, handles: impl IntoIterator<Item = ResourceHandle>) {
        for handle in handles {
            self.release(handle);
        }
    }

    /// Look up a resident resource by path hash.
    #[must_use]
    pub fn find_by_hash(&self, path_hash: NameHash) -> Option<ResourceDescriptor> {
        self.entries.get(&path_hash).map(|entry| ResourceDescriptor {
            path: entry.path.clone(),
            path_hash,
            ref_count: entry.ref_count,
        })
    }

    /// Current reference count of `path`, 0 if it is not resident.
    #[must_use]
    pub fn ref_count(&self, path: &str) -> usize {
        self.find_by_hash(NameHash::of(path))
            .map_or(0, |descriptor| descriptor.ref_count)
    }

    /// Returns `true` if `path` is resident.
    #[must_use]
    pub fn is_resident(&self, path: &str) -> bool {
        self.entries.contains_key(&NameHash::of(path))
    }

    /// Number of resident resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no further resource can be created.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_resources
    }
}

impl std::fmt::Debug for ResourceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceFactory")
            .field("source", &self.source)
            .field("loaders", &self.loaders.keys().collect::<Vec<_>>())
            .field("resident", &self.entries.len())
            .field("max_resources", &self.max_resources)
            .finish()
    }
}
