//! Resource loaders.
//!
//! A [`ResourceLoader`] turns the bytes of one resource type (selected by
//! file extension) into a live resource. Loaders receive the store itself so
//! composite resources can acquire the resources they reference; those
//! references are returned as [`LoadedResource::dependencies`] and released by
//! the store when the composite is destroyed.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::ResourceError;
use crate::factory::ResourceFactory;
use crate::handle::{ResourceData, ResourceHandle};

/// A freshly created resource and the references it holds.
pub struct LoadedResource {
    /// The resource value.
    pub data: ResourceData,
    /// References acquired while creating the resource.
    pub dependencies: Vec<ResourceHandle>,
}

impl LoadedResource {
    /// Wrap a value with no dependencies.
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            data: Arc::new(value),
            dependencies: Vec::new(),
        }
    }

    /// Attach the references acquired while creating the value.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<ResourceHandle>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

impl std::fmt::Debug for LoadedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedResource")
            .field("dependencies", &self.dependencies.len())
            .finish_non_exhaustive()
    }
}

/// Creates resources of one type.
pub trait ResourceLoader: Send + Sync {
    /// File extension handled by this loader, without the dot.
    fn extension(&self) -> &'static str;

    /// Paths this resource will acquire when created, read from its raw
    /// bytes. The preloader fetches them ahead of time. Must not fail: return
    /// what can be determined and let [`ResourceLoader::create`] report errors.
    fn preload_hints(&self, _path: &str, _bytes: &[u8]) -> Vec<String> {
        Vec::new()
    }

    /// Build the resource.
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] if the bytes are malformed or a dependency
    /// cannot be acquired. On error the loader must already have released any
    /// dependency it acquired.
    fn create(
        &self,
        store: &ResourceFactory,
        path: &str,
        bytes: &[u8],
    ) -> Result<LoadedResource, ResourceError>;
}

/// Decode a descriptor in either its built (MessagePack) or authored (JSON)
/// form. Authored descriptors are recognised by a leading `{`.
///
/// # Errors
///
/// Returns [`ResourceError::Format`] if neither form decodes.
pub fn decode_descriptor<T: DeserializeOwned>(path: &str, bytes: &[u8]) -> Result<T, ResourceError> {
    let authored = bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{');
    let decoded = if authored {
        serde_json::from_slice(bytes).map_err(|e| e.to_string())
    } else {
        rmp_serde::from_slice(bytes).map_err(|e| e.to_string())
    };
    decoded.map_err(|message| ResourceError::Format {
        path: path.to_string(),
        message,
    })
}

/// Loader for plain descriptor resources that reference nothing else.
pub struct DescriptorLoader<T> {
    extension: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DescriptorLoader<T> {
    /// A loader decoding `T` from files with `extension`.
    #[must_use]
    pub const fn new(extension: &'static str) -> Self {
        Self {
            extension,
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned + Any + Send + Sync> ResourceLoader for DescriptorLoader<T> {
    fn extension(&self) -> &'static str {
        self.extension
    }

    fn create(
        &self,
        _store: &ResourceFactory,
        path: &str,
        bytes: &[u8],
    ) -> Result<LoadedResource, ResourceError> {
        decode_descriptor::<T>(path, bytes).map(LoadedResource::new)
    }
}

/// Extension of the last path segment, without the dot.
#[must_use]
pub fn extension_of(path: &str) -> Option<&str> {
    let file = path.rsplit('/').next()?;
    file.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Desc {
        name: String,
        count: u32,
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("/a/b.collectionc"), Some("collectionc"));
        assert_eq!(extension_of("/a.dir/b"), None);
        assert_eq!(extension_of("/a/b."), None);
    }

    #[test]
    fn test_decode_authored_and_built_forms() {
        let authored = br#"  {"name": "a", "count": 2}"#;
        let from_json: Desc = decode_descriptor("/a.desc", authored).unwrap();

        let built = rmp_serde::to_vec_named(&from_json).unwrap();
        let from_rmp: Desc = decode_descriptor("/a.desc", &built).unwrap();

        assert_eq!(from_json, from_rmp);
    }

    #[test]
    fn test_decode_reports_path() {
        let err = decode_descriptor::<Desc>("/bad.desc", b"{ not json").unwrap_err();
        assert!(matches!(err, ResourceError::Format { ref path, .. } if path == "/bad.desc"));
    }
}
