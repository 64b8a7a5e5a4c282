//! Resource handles.

use std::any::Any;
use std::sync::Arc;

use engine_component::NameHash;

/// Type-erased resource data as stored by the factory.
pub type ResourceData = Arc<dyn Any + Send + Sync>;

/// One counted reference to a resource.
///
/// Every handle returned by [`ResourceFactory::acquire`](crate::ResourceFactory::acquire)
/// accounts for exactly one reference and must be given back through
/// [`ResourceFactory::release`](crate::ResourceFactory::release). Handles are
/// deliberately not `Clone`: taking another reference goes through the store.
pub struct ResourceHandle {
    path_hash: NameHash,
    data: ResourceData,
}

impl ResourceHandle {
    pub(crate) fn new(path_hash: NameHash, data: ResourceData) -> Self {
        Self { path_hash, data }
    }

    /// Hash of the resource path.
    #[must_use]
    pub fn path_hash(&self) -> NameHash {
        self.path_hash
    }

    /// Borrow the resource as `T`, if it is one.
    #[must_use]
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// Share the resource as `T`, if it is one. The returned `Arc` does not
    /// count as a store reference.
    #[must_use]
    pub fn shared<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.data).downcast::<T>().ok()
    }

    /// Returns `true` if both handles reference the same resource.
    #[must_use]
    pub fn same_resource(&self, other: &ResourceHandle) -> bool {
        self.path_hash == other.path_hash
    }
}

impl std::fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("path_hash", &self.path_hash)
            .finish_non_exhaustive()
    }
}
