//! Resource types read by collection proxies and factories.
//!
//! | extension | descriptor | acquires on creation |
//! |---|---|---|
//! | `collectionc` | [`CollectionDesc`] | every instance prototype |
//! | `goc` | [`PrototypeDesc`] | every component resource |
//! | `collectionproxyc` | [`CollectionProxyDesc`] | nothing |
//! | `collectionfactoryc` | [`CollectionFactoryDesc`] | the template's prototypes, unless loaded dynamically |
//!
//! All descriptors are produced by the build step as MessagePack; hand-written
//! JSON is accepted as well.

use std::collections::HashSet;
use std::sync::Arc;

use engine_math::Transform;
use engine_resource::{
    DescriptorLoader, LoadedResource, ResourceError, ResourceFactory, ResourceHandle,
    ResourceLoader, decode_descriptor,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Extension of built collections.
pub const COLLECTION_EXT: &str = "collectionc";
/// Extension of built instance prototypes.
pub const PROTOTYPE_EXT: &str = "goc";
/// Extension of collection proxy components.
pub const COLLECTION_PROXY_EXT: &str = "collectionproxyc";
/// Extension of collection factory components.
pub const COLLECTION_FACTORY_EXT: &str = "collectionfactoryc";

/// One instance declared by a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDesc {
    /// Instance id, e.g. `/player`.
    pub id: String,
    /// Path of the instance prototype. Empty for an instance without
    /// components.
    #[serde(default)]
    pub prototype: String,
    /// Transform relative to the collection root.
    #[serde(default)]
    pub transform: Transform,
    /// Property overrides for this instance, a JSON object.
    #[serde(default)]
    pub properties: Option<Value>,
}

/// A collection template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDesc {
    /// Collection name. Also names the collection's message socket.
    pub name: String,
    /// Per-collection component limit, lowering the configured world
    /// capacities.
    #[serde(default)]
    pub max_components: Option<u32>,
    /// Instances, in spawn order.
    #[serde(default)]
    pub instances: Vec<InstanceDesc>,
}

impl CollectionDesc {
    /// Distinct non-empty prototype paths, in first-use order.
    #[must_use]
    pub fn prototype_paths(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.instances
            .iter()
            .filter(|instance| !instance.prototype.is_empty())
            .filter(|instance| seen.insert(instance.prototype.as_str()))
            .map(|instance| instance.prototype.clone())
            .collect()
    }
}

/// A component declared by a prototype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentDesc {
    /// A collection proxy, `resource` is a `.collectionproxyc`.
    CollectionProxy {
        /// Component id on the instance.
        id: String,
        /// Component resource path.
        resource: String,
    },
    /// A collection factory, `resource` is a `.collectionfactoryc`.
    CollectionFactory {
        /// Component id on the instance.
        id: String,
        /// Component resource path.
        resource: String,
    },
}

impl ComponentDesc {
    /// Component id on the instance.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::CollectionProxy { id, .. } | Self::CollectionFactory { id, .. } => id,
        }
    }

    /// Component resource path.
    #[must_use]
    pub fn resource(&self) -> &str {
        match self {
            Self::CollectionProxy { resource, .. } | Self::CollectionFactory { resource, .. } => {
                resource
            }
        }
    }
}

/// An instance prototype.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrototypeDesc {
    /// Components created on every instance of this prototype.
    #[serde(default)]
    pub components: Vec<ComponentDesc>,
    /// Default properties, a JSON object.
    #[serde(default)]
    pub properties: Option<Value>,
}

/// A collection proxy component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionProxyDesc {
    /// Path of the proxied collection.
    pub collection: String,
    /// Whether the collection path may be replaced at runtime.
    #[serde(default)]
    pub exclude: bool,
}

/// A collection factory component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionFactoryDesc {
    /// Path of the collection template.
    pub prototype: String,
    /// Load the template's prototypes on request instead of with the factory.
    #[serde(default)]
    pub load_dynamically: bool,
    /// Whether the template may be replaced at runtime.
    #[serde(default)]
    pub dynamic_prototype: bool,
}

/// A loaded `.collectionc`.
#[derive(Debug)]
pub struct CollectionResource {
    /// The collection template.
    pub desc: CollectionDesc,
}

/// A loaded `.goc`.
#[derive(Debug)]
pub struct PrototypeResource {
    /// The prototype.
    pub desc: PrototypeDesc,
}

/// A loaded `.collectionfactoryc`.
#[derive(Debug)]
pub struct CollectionFactoryResource {
    /// Path of this resource.
    pub path: String,
    /// The factory descriptor.
    pub desc: CollectionFactoryDesc,
    /// The template the factory spawns.
    pub collection: Arc<CollectionDesc>,
}

impl CollectionFactoryResource {
    /// Returns `true` if the template's prototypes are loaded on request.
    #[must_use]
    pub fn loads_dynamically(&self) -> bool {
        self.desc.load_dynamically
    }
}

/// Acquire every path, releasing what was acquired if one fails.
///
/// # Errors
///
/// Returns the first acquisition error.
pub fn acquire_all(
    store: &ResourceFactory,
    paths: impl IntoIterator<Item = impl AsRef<str>>,
) -> Result<Vec<ResourceHandle>, ResourceError> {
    let mut acquired = Vec::new();
    for path in paths {
        match store.acquire(path.as_ref()) {
            Ok(handle) => acquired.push(handle),
            Err(e) => {
                store.release_all(acquired);
                return Err(e);
            }
        }
    }
    Ok(acquired)
}

struct CollectionLoader;

impl ResourceLoader for CollectionLoader {
    fn extension(&self) -> &'static str {
        COLLECTION_EXT
    }

    fn preload_hints(&self, path: &str, bytes: &[u8]) -> Vec<String> {
        decode_descriptor::<CollectionDesc>(path, bytes)
            .map(|desc| desc.prototype_paths())
            .unwrap_or_default()
    }

    fn create(
        &self,
        store: &ResourceFactory,
        path: &str,
        bytes: &[u8],
    ) -> Result<LoadedResource, ResourceError> {
        let desc: CollectionDesc = decode_descriptor(path, bytes)?;
        let prototypes = acquire_all(store, desc.prototype_paths())?;
        Ok(LoadedResource::new(CollectionResource { desc }).with_dependencies(prototypes))
    }
}

struct PrototypeLoader;

impl ResourceLoader for PrototypeLoader {
    fn extension(&self) -> &'static str {
        PROTOTYPE_EXT
    }

    fn preload_hints(&self, path: &str, bytes: &[u8]) -> Vec<String> {
        decode_descriptor::<PrototypeDesc>(path, bytes)
            .map(|desc| {
                desc.components
                    .iter()
                    .map(|component| component.resource().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn create(
        &self,
        store: &ResourceFactory,
        path: &str,
        bytes: &[u8],
    ) -> Result<LoadedResource, ResourceError> {
        let desc: PrototypeDesc = decode_descriptor(path, bytes)?;
        let components = acquire_all(store, desc.components.iter().map(ComponentDesc::resource))?;
        Ok(LoadedResource::new(PrototypeResource { desc }).with_dependencies(components))
    }
}

struct CollectionFactoryLoader;

impl ResourceLoader for CollectionFactoryLoader {
    fn extension(&self) -> &'static str {
        COLLECTION_FACTORY_EXT
    }

    fn preload_hints(&self, path: &str, bytes: &[u8]) -> Vec<String> {
        match decode_descriptor::<CollectionFactoryDesc>(path, bytes) {
            Ok(desc) if !desc.load_dynamically => vec![desc.prototype],
            _ => Vec::new(),
        }
    }

    fn create(
        &self,
        store: &ResourceFactory,
        path: &str,
        bytes: &[u8],
    ) -> Result<LoadedResource, ResourceError> {
        let desc: CollectionFactoryDesc = decode_descriptor(path, bytes)?;
        let (resource, prototypes) = load_template(store, path, desc)?;
        Ok(LoadedResource::new(resource).with_dependencies(prototypes))
    }
}

/// Read the template named by `desc` and, unless it loads dynamically,
/// acquire its prototypes.
///
/// # Errors
///
/// Returns the error of reading the template or acquiring a prototype.
pub fn load_template(
    store: &ResourceFactory,
    path: &str,
    desc: CollectionFactoryDesc,
) -> Result<(CollectionFactoryResource, Vec<ResourceHandle>), ResourceError> {
    // The template is read as a plain descriptor: acquiring it as a
    // collection resource would pull in every prototype.
    let template_bytes = store.source().read(&desc.prototype)?;
    let collection: CollectionDesc = decode_descriptor(&desc.prototype, &template_bytes)?;
    let prototypes = if desc.load_dynamically {
        Vec::new()
    } else {
        acquire_all(store, collection.prototype_paths())?
    };
    let resource = CollectionFactoryResource {
        path: path.to_string(),
        desc,
        collection: Arc::new(collection),
    };
    Ok((resource, prototypes))
}

/// Register the loaders for every resource type in this module.
#[must_use]
pub fn register_loaders(store: ResourceFactory) -> ResourceFactory {
    store
        .with_loader(Arc::new(CollectionLoader))
        .with_loader(Arc::new(PrototypeLoader))
        .with_loader(Arc::new(DescriptorLoader::<CollectionProxyDesc>::new(
            COLLECTION_PROXY_EXT,
        )))
        .with_loader(Arc::new(CollectionFactoryLoader))
}
