//! Shared fixtures for the unit tests of this crate.

use std::sync::{Arc, Mutex, MutexGuard};

use engine_component::NameHash;
use engine_message::{SocketId, Url};
use engine_resource::{
    MemorySource, PreloadComplete, PreloadResult, Preloader, PreloaderFactory, ResourceError,
    ResourceFactory, ResourceHandle,
};

use crate::collection::{Collection, CollectionBuilder, InputAction, InputResult, UpdateContext};
use crate::config::GamesysConfig;
use crate::context::GamesysContext;
use crate::error::GamesysError;
use crate::resources::CollectionResource;

/// Resources used across the tests.
///
/// `/level.collectionc` spawns three prototypes, `/main.collectionc` holds one
/// instance carrying a proxy onto `/level.collectionc` and a factory spawning
/// it.
pub(crate) fn source() -> MemorySource {
    let source = MemorySource::new();
    source.insert(
        "/main.collectionc",
        r#"{ "name": "main", "instances": [ { "id": "/loader", "prototype": "/loader.goc" } ] }"#,
    );
    source.insert(
        "/loader.goc",
        r#"{ "components": [
            { "type": "collection_proxy", "id": "proxy", "resource": "/level.collectionproxyc" },
            { "type": "collection_factory", "id": "factory", "resource": "/spawner.collectionfactoryc" }
        ] }"#,
    );
    source.insert(
        "/level.collectionc",
        r#"{ "name": "level", "instances": [
            { "id": "/a", "prototype": "/enemy.goc", "properties": { "hp": 10, "team": "red" } },
            { "id": "/b", "prototype": "/tree.goc", "transform": { "position": [2.0, 0.0, 0.0] } },
            { "id": "/c", "prototype": "/rock.goc" }
        ] }"#,
    );
    source.insert(
        "/alt.collectionc",
        r#"{ "name": "alt", "instances": [ { "id": "/x", "prototype": "/enemy.goc" } ] }"#,
    );
    source.insert("/enemy.goc", r#"{ "properties": { "hp": 5, "speed": 1 } }"#);
    source.insert("/tree.goc", "{}");
    source.insert("/rock.goc", "{}");
    source.insert("/level.collectionproxyc", r#"{ "collection": "/level.collectionc" }"#);
    source.insert(
        "/excl.collectionproxyc",
        r#"{ "collection": "/level.collectionc", "exclude": true }"#,
    );
    source.insert("/broken.collectionproxyc", r#"{ "collection": "/missing.collectionc" }"#);
    source.insert(
        "/spawner.collectionfactoryc",
        r#"{ "prototype": "/level.collectionc", "load_dynamically": true, "dynamic_prototype": true }"#,
    );
    source.insert("/static.collectionfactoryc", r#"{ "prototype": "/level.collectionc" }"#);
    source.insert(
        "/fixed.collectionfactoryc",
        r#"{ "prototype": "/level.collectionc", "load_dynamically": true }"#,
    );
    source
}

/// A context over [`source`].
pub(crate) fn context(config: GamesysConfig) -> GamesysContext {
    GamesysContext::new(Arc::new(source()), config)
}

/// Address of component `component` on instance `instance`.
pub(crate) fn proxy_url(socket: SocketId, instance: &str, component: &str) -> Url {
    Url::new(socket, NameHash::of(instance), NameHash::of(component))
}

#[derive(Debug, Default)]
struct ProbeState {
    updates: Vec<UpdateContext>,
    inits: usize,
    finals: usize,
    renders: usize,
    post_updates: usize,
    live: usize,
    consume_input: bool,
}

/// Shared view of what the probe collections saw.
#[derive(Debug, Clone, Default)]
pub(crate) struct Probe(Arc<Mutex<ProbeState>>);

impl Probe {
    fn state(&self) -> MutexGuard<'_, ProbeState> {
        self.0.lock().unwrap()
    }

    pub(crate) fn updates(&self) -> Vec<UpdateContext> {
        self.state().updates.clone()
    }

    pub(crate) fn inits(&self) -> usize {
        self.state().inits
    }

    pub(crate) fn finals(&self) -> usize {
        self.state().finals
    }

    pub(crate) fn renders(&self) -> usize {
        self.state().renders
    }

    pub(crate) fn post_updates(&self) -> usize {
        self.state().post_updates
    }

    /// Number of probe collections alive.
    pub(crate) fn live(&self) -> usize {
        self.state().live
    }

    pub(crate) fn set_consume_input(&self, consume: bool) {
        self.state().consume_input = consume;
    }
}

/// A collection that records every pass into its probe.
struct ProbeCollection {
    name: String,
    probe: Probe,
    store: Arc<ResourceFactory>,
    resource: Option<ResourceHandle>,
}

impl Collection for ProbeCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self) {
        self.probe.state().inits += 1;
    }

    fn finalize(&mut self) {
        self.probe.state().finals += 1;
    }

    fn update(&mut self, ctx: &UpdateContext) -> bool {
        self.probe.state().updates.push(*ctx);
        true
    }

    fn render(&mut self) -> bool {
        self.probe.state().renders += 1;
        true
    }

    fn post_update(&mut self) -> bool {
        self.probe.state().post_updates += 1;
        true
    }

    fn dispatch_input(&mut self, _action: &InputAction) -> InputResult {
        if self.probe.state().consume_input {
            InputResult::Consumed
        } else {
            InputResult::Ignored
        }
    }
}

impl Drop for ProbeCollection {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.store.release(resource);
        }
        self.probe.state().live -= 1;
    }
}

/// Builds [`ProbeCollection`]s holding a reference to their collection
/// resource.
pub(crate) struct ProbeBuilder {
    probe: Probe,
}

impl ProbeBuilder {
    pub(crate) fn new(probe: Probe) -> Self {
        Self { probe }
    }
}

impl CollectionBuilder for ProbeBuilder {
    fn build(&self, ctx: &GamesysContext, path: &str) -> Result<Box<dyn Collection>, GamesysError> {
        let resource = ctx.resources.acquire(path)?;
        let Some(collection) = resource.get::<CollectionResource>() else {
            ctx.resources.release(resource);
            return Err(ResourceError::WrongType {
                path: path.to_string(),
                expected: "collection",
            }
            .into());
        };
        let name = collection.desc.name.clone();
        self.probe.state().live += 1;
        Ok(Box::new(ProbeCollection {
            name,
            probe: self.probe.clone(),
            store: Arc::clone(&ctx.resources),
            resource: Some(resource),
        }))
    }
}

/// Preloader that resolves on its `polls`-th poll without loading anything
/// itself.
struct ScriptedPreloader {
    store: Arc<ResourceFactory>,
    polls_left: usize,
    result: Option<PreloadResult>,
}

impl Preloader for ScriptedPreloader {
    fn poll(
        &mut self,
        on_complete: &mut PreloadComplete<'_>,
        _budget: std::time::Duration,
    ) -> PreloadResult {
        if let Some(result) = &self.result {
            return result.clone();
        }
        if self.polls_left > 1 {
            self.polls_left -= 1;
            return PreloadResult::Pending;
        }
        let result = match on_complete(&self.store) {
            Ok(()) => PreloadResult::Ok,
            Err(e) => PreloadResult::Error(e),
        };
        self.result = Some(result.clone());
        result
    }
}

pub(crate) struct ScriptedPreloaderFactory {
    polls: usize,
    created: Mutex<Vec<Vec<String>>>,
}

impl ScriptedPreloaderFactory {
    pub(crate) fn new(polls: usize) -> Self {
        Self {
            polls,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Path lists of every preloader created so far.
    pub(crate) fn created(&self) -> Vec<Vec<String>> {
        self.created.lock().unwrap().clone()
    }
}

impl PreloaderFactory for ScriptedPreloaderFactory {
    fn create(
        &self,
        store: &Arc<ResourceFactory>,
        paths: Vec<String>,
    ) -> Result<Box<dyn Preloader>, ResourceError> {
        self.created.lock().unwrap().push(paths);
        Ok(Box::new(ScriptedPreloader {
            store: Arc::clone(store),
            polls_left: self.polls,
            result: None,
        }))
    }
}
