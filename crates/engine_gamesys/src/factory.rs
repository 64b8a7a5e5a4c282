//! Collection factory components.
//!
//! A factory spawns every instance of a collection template into the
//! collection that owns it. Templates that load dynamically keep their
//! prototypes out of memory until [`CollectionFactoryWorld::load`] preloads
//! and caches them; other templates had their prototypes acquired with the
//! factory resource, and loading them only reports completion.
//!
//! Load completion is always delivered from [`CollectionFactoryWorld::update`],
//! even when nothing had to be loaded.

use std::collections::HashMap;
use std::sync::Arc;

use engine_component::{ComponentPool, Entity, Handle, NameHash, PoolError};
use engine_math::Transform;
use engine_message::Url;
use engine_resource::{PreloadResult, Preloader, ResourceError, ResourceFactory, ResourceHandle};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::collection::SpawnTarget;
use crate::completion::{Completion, LoadOutcome};
use crate::config::COLLECTION_FACTORY_MAX_COUNT_KEY;
use crate::context::GamesysContext;
use crate::error::GamesysError;
use crate::resources::{
    CollectionFactoryDesc, CollectionFactoryResource, acquire_all, load_template,
};

/// Notification name used when logging factory completions.
const FACTORY_LOADED: &str = "collectionfactory_loaded";

/// Load state reported by [`CollectionFactoryWorld::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryStatus {
    /// Nothing loaded through this factory.
    Unloaded,
    /// A load is in flight.
    Loading,
    /// The template's prototypes are available.
    Loaded,
}

/// Prototypes held on behalf of the effective template.
enum PrototypeCache {
    Empty,
    /// Loaded, the prototypes are held by the template resource itself.
    Resident,
    /// Loaded dynamically, one reference per distinct prototype.
    Cached(Vec<ResourceHandle>),
}

/// A template set at runtime, owned by the component.
struct CustomTemplate {
    template: Arc<CollectionFactoryResource>,
    prototypes: Vec<ResourceHandle>,
}

struct FactoryLoad {
    /// `None` when nothing has to be loaded.
    preloader: Option<Box<dyn Preloader>>,
    completion: Completion,
}

struct CollectionFactory {
    resource: ResourceHandle,
    default_template: Arc<CollectionFactoryResource>,
    custom: Option<CustomTemplate>,
    url: Url,
    cache: PrototypeCache,
    load: Option<FactoryLoad>,
}

impl CollectionFactory {
    fn template(&self) -> &Arc<CollectionFactoryResource> {
        self.custom
            .as_ref()
            .map_or(&self.default_template, |custom| &custom.template)
    }

    fn status(&self) -> FactoryStatus {
        if self.load.is_some() {
            FactoryStatus::Loading
        } else if matches!(self.cache, PrototypeCache::Empty) {
            FactoryStatus::Unloaded
        } else {
            FactoryStatus::Loaded
        }
    }

    fn release_cache(&mut self, store: &ResourceFactory) {
        if let PrototypeCache::Cached(handles) = std::mem::replace(&mut self.cache, PrototypeCache::Empty) {
            store.release_all(handles);
        }
    }
}

fn factory_mut(
    factories: &mut ComponentPool<CollectionFactory>,
    handle: Handle,
) -> Result<&mut CollectionFactory, GamesysError> {
    factories
        .get_mut(handle)
        .ok_or(GamesysError::StaleHandle(handle))
}

/// Shallow-merge two property objects, `overrides` winning. A non-object
/// override replaces the base entirely.
#[must_use]
pub fn merge_properties(base: Option<&Value>, overrides: Option<&Value>) -> Option<Value> {
    match (base, overrides) {
        (Some(Value::Object(base)), Some(Value::Object(overrides))) => {
            let mut merged = base.clone();
            for (key, value) in overrides {
                merged.insert(key.clone(), value.clone());
            }
            Some(Value::Object(merged))
        }
        (_, Some(overrides)) => Some(overrides.clone()),
        (base, None) => base.cloned(),
    }
}

/// One instance of a [`SpawnPlan`].
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSpawn {
    /// Hash of the instance id in the template.
    pub template_id: NameHash,
    /// Runtime instance id.
    pub id: String,
    /// Prototype path.
    pub prototype: String,
    /// World transform.
    pub transform: Transform,
    /// Template properties merged with the caller's overrides.
    pub properties: Option<Value>,
}

/// Every instance one spawn request creates, resolved against the template.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnPlan {
    /// Instances in template order.
    pub instances: Vec<InstanceSpawn>,
}

impl SpawnPlan {
    /// Create every instance in `target`. If one fails, the instances already
    /// created are despawned and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first [`SpawnTarget::spawn_instance`] error.
    pub fn execute(self, target: &mut dyn SpawnTarget) -> Result<HashMap<NameHash, Entity>, GamesysError> {
        let mut spawned = HashMap::with_capacity(self.instances.len());
        for instance in self.instances {
            match target.spawn_instance(
                &instance.id,
                &instance.prototype,
                instance.transform,
                instance.properties,
            ) {
                Ok(entity) => {
                    spawned.insert(instance.template_id, entity);
                }
                Err(e) => {
                    warn!(id = instance.id, error = %e, "spawn failed, removing spawned instances");
                    for entity in spawned.into_values() {
                        target.despawn(entity);
                    }
                    return Err(e);
                }
            }
        }
        Ok(spawned)
    }
}

/// The collection factories of one collection.
pub struct CollectionFactoryWorld {
    ctx: GamesysContext,
    factories: ComponentPool<CollectionFactory>,
    spawn_count: u64,
}

impl CollectionFactoryWorld {
    /// An empty world holding at most `capacity` factories.
    #[must_use]
    pub fn new(ctx: GamesysContext, capacity: usize) -> Self {
        debug!(capacity, "collection factory world created");
        Self {
            ctx,
            factories: ComponentPool::with_capacity(capacity),
            spawn_count: 0,
        }
    }

    /// Maximum number of factories.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.factories.capacity()
    }

    /// Number of live factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if the world has no factories.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Create a factory for the `.collectionfactoryc` resource `resource`.
    /// The world takes over the resource reference.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::BufferFull`] if the world is full, or
    /// [`ResourceError::WrongType`] if `resource` is not a collection factory.
    pub fn create(&mut self, resource: ResourceHandle, url: Url) -> Result<Handle, GamesysError> {
        let Some(template) = resource.shared::<CollectionFactoryResource>() else {
            let path = self
                .ctx
                .resources
                .find_by_hash(resource.path_hash())
                .map_or_else(|| resource.path_hash().to_string(), |d| d.path);
            self.ctx.resources.release(resource);
            return Err(ResourceError::WrongType {
                path,
                expected: "collection factory",
            }
            .into());
        };
        if self.factories.remaining() == 0 {
            self.ctx.resources.release(resource);
            let err = GamesysError::BufferFull {
                kind: "Collection factory",
                capacity: self.factories.capacity(),
                config_key: COLLECTION_FACTORY_MAX_COUNT_KEY,
            };
            error!("{err}");
            return Err(err);
        }
        self.factories
            .insert(CollectionFactory {
                resource,
                default_template: template,
                custom: None,
                url,
                cache: PrototypeCache::Empty,
                load: None,
            })
            .map_err(|e| match e {
                PoolError::Full { capacity } => GamesysError::BufferFull {
                    kind: "Collection factory",
                    capacity,
                    config_key: COLLECTION_FACTORY_MAX_COUNT_KEY,
                },
                PoolError::Stale(handle) => GamesysError::StaleHandle(handle),
            })
    }

    /// Destroy a factory, cancelling an in-flight load and releasing every
    /// prototype and template it holds.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::StaleHandle`] if the factory does not exist.
    pub fn destroy(&mut self, handle: Handle) -> Result<(), GamesysError> {
        let factory = self
            .factories
            .remove(handle)
            .map_err(|_| GamesysError::StaleHandle(handle))?;
        self.teardown(factory);
        Ok(())
    }

    fn teardown(&self, mut factory: CollectionFactory) {
        // Drop the preloader first so its references go before ours.
        factory.load = None;
        factory.release_cache(&self.ctx.resources);
        if let Some(custom) = factory.custom.take() {
            self.ctx.resources.release_all(custom.prototypes);
        }
        self.ctx.resources.release(factory.resource);
    }

    /// Load the template's prototypes. `completion` is delivered by a later
    /// [`CollectionFactoryWorld::update`], also when nothing had to be loaded.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::CurrentlyLoading`] if a load is in flight, or
    /// the preloader creation error.
    pub fn load(&mut self, handle: Handle, completion: Completion) -> Result<(), GamesysError> {
        let factory = factory_mut(&mut self.factories, handle)?;
        if factory.load.is_some() {
            warn!(path = factory.template().path, "collection factory is already loading");
            return Err(GamesysError::CurrentlyLoading);
        }

        let template = factory.template();
        let preloader = if template.loads_dynamically() && matches!(factory.cache, PrototypeCache::Empty) {
            let paths = template.collection.prototype_paths();
            debug!(path = template.path, prototypes = paths.len(), "collection factory load started");
            Some(self.ctx.preloaders.create(&self.ctx.resources, paths)?)
        } else {
            None
        };
        factory.load = Some(FactoryLoad {
            preloader,
            completion,
        });
        Ok(())
    }

    /// Release dynamically loaded prototypes.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::CurrentlyLoading`] if a load is in flight.
    pub fn unload(&mut self, handle: Handle) -> Result<(), GamesysError> {
        let factory = factory_mut(&mut self.factories, handle)?;
        if factory.load.is_some() {
            warn!(path = factory.template().path, "collection factory cannot be unloaded while loading");
            return Err(GamesysError::CurrentlyLoading);
        }
        factory.release_cache(&self.ctx.resources);
        Ok(())
    }

    /// Load state of a factory.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::StaleHandle`] if the factory does not exist.
    pub fn status(&self, handle: Handle) -> Result<FactoryStatus, GamesysError> {
        self.factories
            .get(handle)
            .map(CollectionFactory::status)
            .ok_or(GamesysError::StaleHandle(handle))
    }

    /// Path of the effective template: the factory resource, or the
    /// collection set through [`CollectionFactoryWorld::set_prototype`].
    #[must_use]
    pub fn template_path(&self, handle: Handle) -> Option<&str> {
        self.factories
            .get(handle)
            .map(|factory| factory.template().desc.prototype.as_str())
    }

    /// Address of a factory.
    #[must_use]
    pub fn url(&self, handle: Handle) -> Option<Url> {
        self.factories.get(handle).map(|factory| factory.url)
    }

    /// The factory addressed by `url`'s instance and component ids.
    #[must_use]
    pub fn find(&self, url: &Url) -> Option<Handle> {
        self.factories
            .iter()
            .find(|(_, factory)| factory.url.same_target(url))
            .map(|(handle, _)| handle)
    }

    /// Advance in-flight loads in slot order and deliver their completions.
    pub fn update(&mut self) {
        let budget = self.ctx.config.preload_budget();
        for (_, factory) in self.factories.iter_mut() {
            let Some(mut load) = factory.load.take() else {
                continue;
            };
            let template = Arc::clone(factory.template());

            let success = match load.preloader.as_mut() {
                None => {
                    if matches!(factory.cache, PrototypeCache::Empty) {
                        factory.cache = PrototypeCache::Resident;
                    }
                    true
                }
                Some(preloader) => {
                    let mut cached = None;
                    let mut on_complete = |store: &ResourceFactory| -> Result<(), ResourceError> {
                        cached = Some(acquire_all(store, template.collection.prototype_paths())?);
                        Ok(())
                    };
                    match preloader.poll(&mut on_complete, budget) {
                        PreloadResult::Pending => {
                            factory.load = Some(load);
                            continue;
                        }
                        PreloadResult::Ok => match cached {
                            Some(handles) => {
                                factory.cache = PrototypeCache::Cached(handles);
                                true
                            }
                            None => false,
                        },
                        PreloadResult::Error(e) => {
                            warn!(path = template.path, error = %e, "collection factory could not load its prototypes");
                            false
                        }
                    }
                }
            };

            // The preloader's references go once the cache holds its own.
            load.preloader = None;
            debug!(path = template.path, success, "collection factory load finished");
            let outcome = LoadOutcome {
                path: template.path.clone(),
                success,
            };
            load.completion.deliver(&self.ctx.bus, FACTORY_LOADED, &outcome);
        }
    }

    /// Resolve a spawn request against the effective template. A dynamic
    /// template that is not loaded is loaded synchronously first.
    ///
    /// `overrides` maps template instance ids to property objects merged over
    /// the template's own properties.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::CurrentlyLoading`] while a load is in flight,
    /// or the error of loading the prototypes.
    pub fn spawn_plan(
        &mut self,
        handle: Handle,
        root: &Transform,
        overrides: &HashMap<NameHash, Value>,
    ) -> Result<SpawnPlan, GamesysError> {
        let factory = factory_mut(&mut self.factories, handle)?;
        if factory.load.is_some() {
            warn!(path = factory.template().path, "collection factory cannot spawn while loading");
            return Err(GamesysError::CurrentlyLoading);
        }
        let template = Arc::clone(factory.template());
        if template.loads_dynamically() && matches!(factory.cache, PrototypeCache::Empty) {
            warn!(path = template.path, "collection factory is not loaded, loading synchronously");
            let handles = acquire_all(&self.ctx.resources, template.collection.prototype_paths())?;
            factory.cache = PrototypeCache::Cached(handles);
        }

        let prefix = format!("/collection{}", self.spawn_count);
        self.spawn_count += 1;
        let instances = template
            .collection
            .instances
            .iter()
            .map(|instance| {
                let template_id = NameHash::of(&instance.id);
                InstanceSpawn {
                    template_id,
                    id: format!("{prefix}{}", instance.id),
                    prototype: instance.prototype.clone(),
                    transform: root.compose(&instance.transform),
                    properties: merge_properties(instance.properties.as_ref(), overrides.get(&template_id)),
                }
            })
            .collect();
        Ok(SpawnPlan { instances })
    }

    /// Spawn the effective template into `target`, which must not own this
    /// world. Collections spawning into themselves use
    /// [`CollectionFactoryWorld::spawn_plan`] and [`SpawnPlan::execute`].
    ///
    /// Returns the runtime entity of every template instance, keyed by the
    /// hash of its template id. Either every instance is spawned or none is.
    ///
    /// # Errors
    ///
    /// See [`CollectionFactoryWorld::spawn_plan`] and [`SpawnPlan::execute`].
    pub fn spawn(
        &mut self,
        handle: Handle,
        target: &mut dyn SpawnTarget,
        root: &Transform,
        overrides: &HashMap<NameHash, Value>,
    ) -> Result<HashMap<NameHash, Entity>, GamesysError> {
        self.spawn_plan(handle, root, overrides)?.execute(target)
    }

    /// Replace the effective template with the collection at `path`. `None`,
    /// or the authored template path, restores the authored template.
    ///
    /// The new template is loaded before the previous custom template and any
    /// cached prototypes are released.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::NotDynamicPrototype`],
    /// [`GamesysError::CurrentlyLoading`] or the error of loading the new
    /// template, in which case the previous template stays in place.
    pub fn set_prototype(&mut self, handle: Handle, path: Option<&str>) -> Result<(), GamesysError> {
        let factory = factory_mut(&mut self.factories, handle)?;
        let authored = &factory.default_template.desc;
        if !authored.dynamic_prototype {
            return Err(GamesysError::NotDynamicPrototype);
        }
        if factory.load.is_some() {
            return Err(GamesysError::CurrentlyLoading);
        }

        let requested = path.filter(|path| *path != authored.prototype);
        if requested.is_none() && factory.custom.is_none() {
            return Ok(());
        }

        let custom = match requested {
            None => None,
            Some(path) => {
                let desc = CollectionFactoryDesc {
                    prototype: path.to_string(),
                    load_dynamically: authored.load_dynamically,
                    dynamic_prototype: true,
                };
                let (template, prototypes) = load_template(&self.ctx.resources, path, desc)?;
                Some(CustomTemplate {
                    template: Arc::new(template),
                    prototypes,
                })
            }
        };

        factory.release_cache(&self.ctx.resources);
        let previous = std::mem::replace(&mut factory.custom, custom);
        if let Some(previous) = previous {
            self.ctx.resources.release_all(previous.prototypes);
        }
        debug!(template = factory.template().desc.prototype, "collection factory prototype set");
        Ok(())
    }

    /// Tear the world down, releasing every factory.
    pub fn delete_world(self) {
        drop(self);
    }
}

impl Drop for CollectionFactoryWorld {
    fn drop(&mut self) {
        let handles = self.factories.handles();
        let count = handles.len();
        for handle in handles {
            if let Ok(factory) = self.factories.remove(handle) {
                self.teardown(factory);
            }
        }
        info!(factories = count, "collection factory world deleted");
    }
}

impl std::fmt::Debug for CollectionFactoryWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionFactoryWorld")
            .field("len", &self.factories.len())
            .field("capacity", &self.factories.capacity())
            .field("spawn_count", &self.spawn_count)
            .finish()
    }
}
