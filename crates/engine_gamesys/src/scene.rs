//! Live collections.
//!
//! A [`GameCollection`] is the runtime form of a `.collectionc`: its
//! instances, the proxy and factory components those instances carry, and
//! the message socket the components are addressed through. Collections
//! loaded by a proxy are game collections too, so proxies nest.

use std::collections::HashMap;

use engine_component::{Entity, EntityAllocator, Handle, NameHash};
use engine_math::Transform;
use engine_message::{SocketId, Url};
use engine_resource::{ResourceError, ResourceHandle};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collection::{
    Collection, CollectionBuilder, InputAction, InputResult, SpawnTarget, UpdateContext,
};
use crate::config::GamesysConfig;
use crate::context::GamesysContext;
use crate::error::GamesysError;
use crate::factory::{CollectionFactoryWorld, merge_properties};
use crate::proxy::CollectionProxyWorld;
use crate::resources::{CollectionResource, ComponentDesc, PrototypeResource};

#[derive(Debug, Clone, Copy)]
enum ComponentRef {
    Proxy(Handle),
    Factory(Handle),
}

struct Instance {
    id: String,
    prototype: Option<ResourceHandle>,
    transform: Transform,
    properties: Option<Value>,
    components: Vec<ComponentRef>,
}

/// A live collection with its proxy and factory worlds.
pub struct GameCollection {
    name: String,
    ctx: GamesysContext,
    resource: Option<ResourceHandle>,
    socket: SocketId,
    entities: EntityAllocator,
    instances: HashMap<Entity, Instance>,
    ids: HashMap<NameHash, Entity>,
    proxies: CollectionProxyWorld,
    factories: CollectionFactoryWorld,
    initialized: bool,
}

impl GameCollection {
    /// Instantiate the collection at `path`, spawning every instance it
    /// declares.
    ///
    /// # Errors
    ///
    /// Returns the error of acquiring the collection, registering its socket
    /// or spawning an instance. Everything created so far is released.
    pub fn new(ctx: GamesysContext, path: &str) -> Result<Self, GamesysError> {
        let resource = ctx.resources.acquire(path)?;
        let Some(desc) = resource.get::<CollectionResource>().map(|c| c.desc.clone()) else {
            ctx.resources.release(resource);
            return Err(ResourceError::WrongType {
                path: path.to_string(),
                expected: "collection",
            }
            .into());
        };

        // Sockets are named after the collection; the suffix lets one
        // collection be loaded by several proxies.
        let socket_name = format!("{}#{}", desc.name, Uuid::new_v4().simple());
        let socket = match ctx.bus.new_socket(&socket_name) {
            Ok(socket) => socket,
            Err(e) => {
                ctx.resources.release(resource);
                return Err(e.into());
            }
        };

        let proxy_capacity = GamesysConfig::world_capacity(ctx.config.collection_proxy.max_count, desc.max_components);
        let factory_capacity =
            GamesysConfig::world_capacity(ctx.config.collectionfactory.max_count, desc.max_components);
        let mut collection = Self {
            name: desc.name.clone(),
            proxies: CollectionProxyWorld::new(ctx.clone(), proxy_capacity),
            factories: CollectionFactoryWorld::new(ctx.clone(), factory_capacity),
            ctx,
            resource: Some(resource),
            socket,
            entities: EntityAllocator::new(),
            instances: HashMap::new(),
            ids: HashMap::new(),
            initialized: false,
        };

        for instance in desc.instances {
            collection.spawn_instance(
                &instance.id,
                &instance.prototype,
                instance.transform,
                instance.properties,
            )?;
        }
        info!(
            collection = collection.name,
            path,
            instances = collection.instances.len(),
            "collection created"
        );
        Ok(collection)
    }

    /// Socket the collection's components are addressed through.
    #[must_use]
    pub fn socket(&self) -> SocketId {
        self.socket
    }

    /// The collection's proxies.
    #[must_use]
    pub fn proxies(&self) -> &CollectionProxyWorld {
        &self.proxies
    }

    /// Mutable access to the collection's proxies.
    pub fn proxies_mut(&mut self) -> &mut CollectionProxyWorld {
        &mut self.proxies
    }

    /// The collection's factories.
    #[must_use]
    pub fn factories(&self) -> &CollectionFactoryWorld {
        &self.factories
    }

    /// Mutable access to the collection's factories.
    pub fn factories_mut(&mut self) -> &mut CollectionFactoryWorld {
        &mut self.factories
    }

    /// Address of component `component` on instance `instance`.
    #[must_use]
    pub fn component_url(&self, instance: &str, component: &str) -> Url {
        Url::new(self.socket, NameHash::of(instance), NameHash::of(component))
    }

    /// Number of live instances.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// The instance with id `id`.
    #[must_use]
    pub fn instance(&self, id: &str) -> Option<Entity> {
        self.ids.get(&NameHash::of(id)).copied()
    }

    /// Transform of an instance.
    #[must_use]
    pub fn transform(&self, entity: Entity) -> Option<Transform> {
        self.instances.get(&entity).map(|instance| instance.transform)
    }

    /// Properties of an instance, prototype defaults included.
    #[must_use]
    pub fn properties(&self, entity: Entity) -> Option<&Value> {
        self.instances
            .get(&entity)
            .and_then(|instance| instance.properties.as_ref())
    }

    /// Spawn the template of `factory` into this collection.
    ///
    /// # Errors
    ///
    /// See [`CollectionFactoryWorld::spawn`].
    pub fn spawn_from(
        &mut self,
        factory: Handle,
        root: &Transform,
        overrides: &HashMap<NameHash, Value>,
    ) -> Result<HashMap<NameHash, Entity>, GamesysError> {
        let plan = self.factories.spawn_plan(factory, root, overrides)?;
        plan.execute(self)
    }

    fn create_component(&mut self, desc: &ComponentDesc, url: Url) -> Result<ComponentRef, GamesysError> {
        let resource = self.ctx.resources.acquire(desc.resource())?;
        match desc {
            ComponentDesc::CollectionProxy { .. } => {
                let handle = self.proxies.create(resource, url)?;
                self.proxies.add_to_update(handle)?;
                Ok(ComponentRef::Proxy(handle))
            }
            ComponentDesc::CollectionFactory { .. } => {
                Ok(ComponentRef::Factory(self.factories.create(resource, url)?))
            }
        }
    }

    fn destroy_components(&mut self, components: &[ComponentRef]) {
        for component in components {
            let result = match *component {
                ComponentRef::Proxy(handle) => self.proxies.destroy(handle),
                ComponentRef::Factory(handle) => self.factories.destroy(handle),
            };
            if let Err(e) = result {
                warn!(collection = self.name, error = %e, "component could not be destroyed");
            }
        }
    }

    fn dispatch_messages(&mut self) {
        for message in self.ctx.bus.drain(self.socket) {
            let Some(proxy) = self.proxies.find(&message.receiver) else {
                debug!(
                    collection = self.name,
                    message = message.display_name(),
                    receiver = %message.receiver,
                    "message has no receiver"
                );
                continue;
            };
            if let Err(e) = self.proxies.on_message(proxy, &message) {
                warn!(collection = self.name, error = %e, "malformed message");
            }
        }
    }
}

impl SpawnTarget for GameCollection {
    fn spawn_instance(
        &mut self,
        id: &str,
        prototype: &str,
        transform: Transform,
        properties: Option<Value>,
    ) -> Result<Entity, GamesysError> {
        let id_hash = NameHash::of(id);
        if self.ids.contains_key(&id_hash) {
            return Err(GamesysError::InstanceExists(id.to_string()));
        }

        let (prototype, desc) = if prototype.is_empty() {
            (None, None)
        } else {
            let handle = self.ctx.resources.acquire(prototype)?;
            let Some(desc) = handle.get::<PrototypeResource>().map(|p| p.desc.clone()) else {
                self.ctx.resources.release(handle);
                return Err(ResourceError::WrongType {
                    path: prototype.to_string(),
                    expected: "prototype",
                }
                .into());
            };
            (Some(handle), Some(desc))
        };

        let mut components = Vec::new();
        let mut merged = properties;
        if let Some(desc) = desc {
            merged = merge_properties(desc.properties.as_ref(), merged.as_ref());
            for component in &desc.components {
                let url = Url::new(self.socket, id_hash, NameHash::of(component.id()));
                match self.create_component(component, url) {
                    Ok(created) => components.push(created),
                    Err(e) => {
                        self.destroy_components(&components);
                        if let Some(handle) = prototype {
                            self.ctx.resources.release(handle);
                        }
                        return Err(e);
                    }
                }
            }
        }

        let entity = self.entities.allocate();
        self.ids.insert(id_hash, entity);
        self.instances.insert(
            entity,
            Instance {
                id: id.to_string(),
                prototype,
                transform,
                properties: merged,
                components,
            },
        );
        debug!(collection = self.name, id, %entity, "instance spawned");
        Ok(entity)
    }

    fn despawn(&mut self, entity: Entity) {
        let Some(instance) = self.instances.remove(&entity) else {
            return;
        };
        self.ids.remove(&NameHash::of(&instance.id));
        self.destroy_components(&instance.components);
        if let Some(handle) = instance.prototype {
            self.ctx.resources.release(handle);
        }
        debug!(collection = self.name, id = instance.id, "instance despawned");
    }
}

impl Collection for GameCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        debug!(collection = self.name, "collection initialized");
    }

    fn finalize(&mut self) {
        for handle in self.proxies.handles() {
            if self.proxies.is_initialized(handle) {
                if let Err(e) = self.proxies.finalize(handle) {
                    warn!(collection = self.name, error = %e, "child collection could not be finalized");
                }
            }
        }
        self.initialized = false;
        debug!(collection = self.name, "collection finalized");
    }

    /// Components update before the collection's messages are dispatched,
    /// so a request handled in one update completes in the next.
    fn update(&mut self, ctx: &UpdateContext) -> bool {
        let ok = self.proxies.update(ctx);
        self.factories.update();
        self.dispatch_messages();
        ok
    }

    fn render(&mut self) -> bool {
        self.proxies.render()
    }

    fn post_update(&mut self) -> bool {
        self.proxies.post_update()
    }

    fn dispatch_input(&mut self, action: &InputAction) -> InputResult {
        self.proxies.dispatch_input(action)
    }

    fn socket(&self) -> Option<SocketId> {
        Some(self.socket)
    }
}

impl Drop for GameCollection {
    fn drop(&mut self) {
        let entities: Vec<Entity> = self.instances.keys().copied().collect();
        for entity in entities {
            self.despawn(entity);
        }
        if let Some(resource) = self.resource.take() {
            self.ctx.resources.release(resource);
        }
        self.ctx.bus.delete_socket(self.socket);
        info!(collection = self.name, "collection deleted");
    }
}

impl std::fmt::Debug for GameCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameCollection")
            .field("name", &self.name)
            .field("socket", &self.socket)
            .field("instances", &self.instances.len())
            .field("proxies", &self.proxies)
            .field("factories", &self.factories)
            .finish_non_exhaustive()
    }
}

/// Builds [`GameCollection`]s. The default builder of
/// [`GamesysContext::new`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GameCollectionBuilder;

impl CollectionBuilder for GameCollectionBuilder {
    fn build(&self, ctx: &GamesysContext, path: &str) -> Result<Box<dyn Collection>, GamesysError> {
        Ok(Box::new(GameCollection::new(ctx.clone(), path)?))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use engine_math::Vec3;
    use engine_message::{Message, SetTimeStep, ids};
    use serde_json::json;

    use super::*;
    use crate::Completion;
    use crate::proxy::TimeStepMode;
    use crate::testing::{Probe, ProbeBuilder, context, source};

    const DT: f32 = 1.0 / 60.0;

    fn main_collection() -> (GamesysContext, GameCollection) {
        let ctx = context(GamesysConfig::default());
        let collection = GameCollection::new(ctx.clone(), "/main.collectionc").unwrap();
        (ctx, collection)
    }

    #[test]
    fn test_instances_create_components() {
        let (ctx, collection) = main_collection();
        assert_eq!(collection.name(), "main");
        assert_eq!(collection.instance_count(), 1);
        assert_eq!(collection.proxies().len(), 1);
        assert_eq!(collection.factories().len(), 1);
        assert!(ctx.bus.is_socket_valid(collection.socket()));

        let url = collection.component_url("/loader", "proxy");
        assert!(collection.proxies().find(&url).is_some());
        assert!(collection.factories().find(&url).is_none());
    }

    #[test]
    fn test_messages_load_and_unload_child() {
        let (ctx, mut collection) = main_collection();
        let script = ctx.bus.new_socket("script").unwrap();
        let requester = Url::new(script, NameHash::of("/script"), NameHash::EMPTY);
        let proxy_url = collection.component_url("/loader", "proxy");
        let proxy = collection.proxies().find(&proxy_url).unwrap();

        ctx.bus.post(Message::new(requester, proxy_url, ids::LOAD)).unwrap();
        assert!(collection.update(&UpdateContext::new(DT, 0)));
        assert!(collection.proxies().is_loaded(proxy));
        let replies = ctx.bus.drain(script);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].is(ids::PROXY_LOADED));
        // The child collection spawned its three instances.
        assert!(ctx.resources.is_resident("/enemy.goc"));

        ctx.bus.post(Message::new(requester, proxy_url, ids::UNLOAD)).unwrap();
        collection.update(&UpdateContext::new(DT, 1));
        assert!(!collection.proxies().is_loaded(proxy));
        assert!(!ctx.resources.is_resident("/enemy.goc"));
        assert_eq!(ctx.bus.pending(script), 0);

        collection.update(&UpdateContext::new(DT, 2));
        let replies = ctx.bus.drain(script);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].is(ids::PROXY_UNLOADED));
    }

    #[test]
    fn test_unroutable_messages_are_dropped() {
        let (ctx, mut collection) = main_collection();
        let sender = collection.component_url("/nobody", "");
        let receiver = collection.component_url("/missing", "proxy");
        ctx.bus.post(Message::new(sender, receiver, ids::LOAD)).unwrap();
        assert!(collection.update(&UpdateContext::new(DT, 0)));
        assert_eq!(ctx.bus.pending(collection.socket()), 0);
    }

    #[test]
    fn test_factory_spawns_into_collection() {
        let (_ctx, mut collection) = main_collection();
        let factory = collection
            .factories()
            .find(&collection.component_url("/loader", "factory"))
            .unwrap();
        let root = Transform::from_position(Vec3::new(0.0, 5.0, 0.0));

        let spawned = collection.spawn_from(factory, &root, &HashMap::new()).unwrap();
        assert_eq!(spawned.len(), 3);
        assert_eq!(collection.instance_count(), 4);

        let enemy = collection.instance("/collection0/a").unwrap();
        assert_eq!(spawned[&NameHash::of("/a")], enemy);
        assert_eq!(
            collection.properties(enemy),
            Some(&json!({ "hp": 10, "speed": 1, "team": "red" }))
        );
        let tree = collection.instance("/collection0/b").unwrap();
        assert_eq!(collection.transform(tree).unwrap().position, Vec3::new(2.0, 5.0, 0.0));

        collection.spawn_from(factory, &root, &HashMap::new()).unwrap();
        assert!(collection.instance("/collection1/c").is_some());
        assert_eq!(collection.instance_count(), 7);
    }

    #[test]
    fn test_duplicate_instance_id() {
        let (_ctx, mut collection) = main_collection();
        let result = collection.spawn_instance("/loader", "/tree.goc", Transform::IDENTITY, None);
        assert!(matches!(result, Err(GamesysError::InstanceExists(id)) if id == "/loader"));
        assert_eq!(collection.instance_count(), 1);
    }

    #[test]
    fn test_drop_releases_everything() {
        let (ctx, mut collection) = main_collection();
        let proxy = collection
            .proxies()
            .find(&collection.component_url("/loader", "proxy"))
            .unwrap();
        collection.proxies_mut().load(proxy, Completion::Discard).unwrap();
        collection.proxies_mut().enable(proxy).unwrap();
        let factory = collection
            .factories()
            .find(&collection.component_url("/loader", "factory"))
            .unwrap();
        collection.spawn_from(factory, &Transform::IDENTITY, &HashMap::new()).unwrap();
        collection.update(&UpdateContext::new(DT, 0));
        let socket = collection.socket();

        drop(collection);
        assert_eq!(ctx.resources.resource_count(), 0);
        assert!(!ctx.bus.is_socket_valid(socket));
    }

    /// Builds game collections, except for `/level.collectionc` which is
    /// recorded by a probe.
    struct NestedBuilder {
        probe: ProbeBuilder,
    }

    impl CollectionBuilder for NestedBuilder {
        fn build(&self, ctx: &GamesysContext, path: &str) -> Result<Box<dyn Collection>, GamesysError> {
            if path == "/level.collectionc" {
                self.probe.build(ctx, path)
            } else {
                GameCollectionBuilder.build(ctx, path)
            }
        }
    }

    #[test]
    fn test_nested_time_steps_compose() {
        const STEP: f32 = 0.5;
        let source = source();
        source.insert(
            "/outer.collectionc",
            r#"{ "name": "outer", "instances": [ { "id": "/holder", "prototype": "/holder.goc" } ] }"#,
        );
        source.insert(
            "/holder.goc",
            r#"{ "components": [
                { "type": "collection_proxy", "id": "proxy", "resource": "/main.collectionproxyc" }
            ] }"#,
        );
        source.insert("/main.collectionproxyc", r#"{ "collection": "/main.collectionc" }"#);
        let probe = Probe::default();
        let ctx = GamesysContext::new(Arc::new(source), GamesysConfig::default()).with_builder(Arc::new(
            NestedBuilder {
                probe: ProbeBuilder::new(probe.clone()),
            },
        ));

        let mut root = GameCollection::new(ctx.clone(), "/outer.collectionc").unwrap();
        let outer = root.proxies().find(&root.component_url("/holder", "proxy")).unwrap();
        assert_eq!(root.proxies().child_socket(outer), None);
        root.proxies_mut().load(outer, Completion::Discard).unwrap();
        root.proxies_mut().enable(outer).unwrap();

        // The nested proxy is addressed through the child's own socket.
        let middle = root.proxies().child_socket(outer).unwrap();
        assert_ne!(middle, root.socket());
        let script = ctx.bus.new_socket("script").unwrap();
        let requester = Url::new(script, NameHash::of("/script"), NameHash::EMPTY);
        let inner = Url::new(middle, NameHash::of("/loader"), NameHash::of("proxy"));
        let discrete_half = SetTimeStep { factor: 0.5, mode: 1 };
        ctx.bus.post(Message::new(requester, inner, ids::LOAD)).unwrap();
        ctx.bus.post(Message::new(requester, inner, ids::ENABLE)).unwrap();
        ctx.bus
            .post(Message::with_payload(requester, inner, ids::SET_TIME_STEP, &discrete_half).unwrap())
            .unwrap();

        assert!(root.update(&UpdateContext::new(STEP, 0)));
        assert!(ctx.bus.drain(script).iter().any(|reply| reply.is(ids::PROXY_LOADED)));
        assert_eq!(probe.inits(), 1);
        assert!(probe.updates().is_empty());

        root.proxies_mut().set_time_step(outer, 0.5, TimeStepMode::Discrete).unwrap();
        for frame in 1..=8 {
            assert!(root.update(&UpdateContext::new(STEP, frame)));
        }
        let updates = probe.updates();
        assert_eq!(updates.iter().map(|ctx| ctx.frame).collect::<Vec<_>>(), vec![4, 8]);
        assert!(updates.iter().all(|ctx| ctx.time_scale == 0.25 && ctx.dt == STEP));

        drop(root);
        assert_eq!(probe.live(), 0);
        assert_eq!(ctx.resources.resource_count(), 0);
    }

    #[test]
    fn test_component_limit_of_collection() {
        let source = source();
        source.insert(
            "/tight.collectionc",
            r#"{ "name": "tight", "max_components": 1, "instances": [
                { "id": "/one", "prototype": "/loader.goc" },
                { "id": "/two", "prototype": "/loader.goc" }
            ] }"#,
        );
        let ctx = GamesysContext::new(Arc::new(source), GamesysConfig::default());

        let err = GameCollection::new(ctx.clone(), "/tight.collectionc").unwrap_err();
        assert!(matches!(err, GamesysError::BufferFull { .. }));
        assert_eq!(ctx.resources.resource_count(), 0);
    }
}
