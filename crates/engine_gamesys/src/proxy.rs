//! Collection proxy components.
//!
//! A proxy owns an entire child collection. Loading instantiates the
//! collection (synchronously or through a preloader polled each tick), and
//! once it is loaded and enabled the proxy drives the child's update, render
//! and post-update passes with its own time step.
//!
//! Enable and disable take effect at the start of the next update of the
//! proxy world, never inside the call that requested them. Unload
//! notifications are delivered by the next update as well.

use std::sync::Arc;

use engine_component::{ComponentPool, Handle, NameHash, PoolError};
use engine_message::{SocketId, Url, ids};
use engine_resource::{
    PreloadResult, Preloader, ResourceError, ResourceFactory, ResourceHandle,
};
use tracing::{debug, error, info, warn};

use crate::collection::{Collection, InputAction, InputResult, UpdateContext};
use crate::completion::{Completion, LoadOutcome};
use crate::config::COLLECTION_PROXY_MAX_COUNT_KEY;
use crate::context::GamesysContext;
use crate::error::GamesysError;
use crate::resources::CollectionProxyDesc;

/// How a proxy advances its child's time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeStepMode {
    /// The child advances by the scaled parent delta every tick.
    #[default]
    Continuous,
    /// Scaled time accumulates and the child advances in whole parent-sized
    /// steps.
    Discrete,
}

impl TryFrom<u32> for TimeStepMode {
    type Error = GamesysError;

    fn try_from(mode: u32) -> Result<Self, Self::Error> {
        match mode {
            0 => Ok(Self::Continuous),
            1 => Ok(Self::Discrete),
            other => Err(GamesysError::InvalidTimeStepMode(other)),
        }
    }
}

/// Enabled state of a loaded proxy, including transitions not yet applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    /// Not updated.
    #[default]
    Disabled,
    /// Enabled from the next update on.
    PendingEnable,
    /// Updated every tick.
    Enabled,
    /// Disabled from the next update on.
    PendingDisable,
}

impl Activation {
    /// Returns `true` if the proxy counts as enabled for enable/disable
    /// requests.
    #[must_use]
    pub fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled | Self::PendingDisable)
    }

    fn reconcile(self) -> Self {
        match self {
            Self::PendingEnable => Self::Enabled,
            Self::PendingDisable => Self::Disabled,
            settled => settled,
        }
    }
}

/// Time-step virtualization state of one proxy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStep {
    /// Scaling factor, never negative.
    pub factor: f32,
    /// Stepping mode.
    pub mode: TimeStepMode,
    accumulated: f32,
}

impl Default for TimeStep {
    fn default() -> Self {
        Self {
            factor: 1.0,
            mode: TimeStepMode::Continuous,
            accumulated: 0.0,
        }
    }
}

impl TimeStep {
    /// Scaled time not yet handed to the child.
    #[must_use]
    pub fn accumulated(&self) -> f32 {
        self.accumulated
    }

    /// The child's update context for one parent tick, or `None` if the
    /// child should not be updated this tick.
    fn warp(&mut self, parent: &UpdateContext) -> Option<UpdateContext> {
        let warped_dt = parent.dt * self.factor;
        let mut child = UpdateContext {
            dt: warped_dt,
            time_scale: parent.time_scale * self.factor,
            frame: parent.frame,
        };
        match self.mode {
            TimeStepMode::Continuous => {
                self.accumulated = 0.0;
                Some(child)
            }
            TimeStepMode::Discrete => {
                self.accumulated += warped_dt;
                if self.accumulated >= parent.dt {
                    self.accumulated -= parent.dt;
                    child.dt = parent.dt;
                    Some(child)
                } else {
                    None
                }
            }
        }
    }
}

struct PendingLoad {
    path: String,
    preloader: Box<dyn Preloader>,
    completion: Completion,
}

struct CollectionProxy {
    resource: ResourceHandle,
    desc: Arc<CollectionProxyDesc>,
    url: Url,
    collection: Option<Box<dyn Collection>>,
    path_override: Option<String>,
    initialized: bool,
    activation: Activation,
    time_step: TimeStep,
    load: Option<PendingLoad>,
    unloaded: Vec<Completion>,
    added_to_update: bool,
}

impl CollectionProxy {
    fn collection_path(&self) -> &str {
        self.path_override.as_deref().unwrap_or(&self.desc.collection)
    }

    fn ensure_can_load(&self) -> Result<(), GamesysError> {
        if self.collection.is_some() {
            return Err(GamesysError::AlreadyLoaded);
        }
        if self.load.is_some() {
            return Err(GamesysError::CurrentlyLoading);
        }
        Ok(())
    }

    fn loaded_collection(&mut self) -> Result<&mut Box<dyn Collection>, GamesysError> {
        self.collection.as_mut().ok_or(GamesysError::NotLoaded)
    }

    /// Finalize and drop the child collection.
    fn release_collection(&mut self) {
        if let Some(mut collection) = self.collection.take() {
            if self.initialized {
                collection.finalize();
            }
        }
        self.initialized = false;
        self.activation = Activation::Disabled;
        self.time_step.accumulated = 0.0;
    }
}

fn proxy_mut(
    proxies: &mut ComponentPool<CollectionProxy>,
    handle: Handle,
) -> Result<&mut CollectionProxy, GamesysError> {
    proxies
        .get_mut(handle)
        .ok_or(GamesysError::StaleHandle(handle))
}

fn build_failure(error: GamesysError) -> ResourceError {
    match error {
        GamesysError::Resource(e) => e,
        other => ResourceError::Completion(other.to_string()),
    }
}

/// The collection proxies of one collection.
pub struct CollectionProxyWorld {
    ctx: GamesysContext,
    proxies: ComponentPool<CollectionProxy>,
}

impl CollectionProxyWorld {
    /// An empty world holding at most `capacity` proxies.
    #[must_use]
    pub fn new(ctx: GamesysContext, capacity: usize) -> Self {
        debug!(capacity, "collection proxy world created");
        Self {
            ctx,
            proxies: ComponentPool::with_capacity(capacity),
        }
    }

    /// Maximum number of proxies.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.proxies.capacity()
    }

    /// Number of live proxies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Returns `true` if the world has no proxies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Handles of every proxy, in slot order.
    #[must_use]
    pub fn handles(&self) -> Vec<Handle> {
        self.proxies.handles()
    }

    /// Create a proxy for the `.collectionproxyc` resource `resource`,
    /// addressed as `url`. The world takes over the resource reference.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::BufferFull`] if the world is full, or
    /// [`ResourceError::WrongType`] if `resource` is not a collection proxy.
    pub fn create(&mut self, resource: ResourceHandle, url: Url) -> Result<Handle, GamesysError> {
        let Some(desc) = resource.shared::<CollectionProxyDesc>() else {
            let path = self
                .ctx
                .resources
                .find_by_hash(resource.path_hash())
                .map_or_else(|| resource.path_hash().to_string(), |d| d.path);
            self.ctx.resources.release(resource);
            return Err(ResourceError::WrongType {
                path,
                expected: "collection proxy",
            }
            .into());
        };
        if self.proxies.remaining() == 0 {
            self.ctx.resources.release(resource);
            let err = GamesysError::BufferFull {
                kind: "Collection proxy",
                capacity: self.proxies.capacity(),
                config_key: COLLECTION_PROXY_MAX_COUNT_KEY,
            };
            error!("{err}");
            return Err(err);
        }
        let proxy = CollectionProxy {
            resource,
            desc,
            url,
            collection: None,
            path_override: None,
            initialized: false,
            activation: Activation::Disabled,
            time_step: TimeStep::default(),
            load: None,
            unloaded: Vec::new(),
            added_to_update: false,
        };
        self.proxies
            .insert(proxy)
            .map_err(|e| match e {
                PoolError::Full { capacity } => GamesysError::BufferFull {
                    kind: "Collection proxy",
                    capacity,
                    config_key: COLLECTION_PROXY_MAX_COUNT_KEY,
                },
                PoolError::Stale(handle) => GamesysError::StaleHandle(handle),
            })
    }

    /// Destroy a proxy. An in-flight load is cancelled and a loaded child
    /// collection is finalized and released.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::StaleHandle`] if the proxy does not exist.
    pub fn destroy(&mut self, handle: Handle) -> Result<(), GamesysError> {
        let proxy = self
            .proxies
            .remove(handle)
            .map_err(|_| GamesysError::StaleHandle(handle))?;
        self.teardown(proxy);
        Ok(())
    }

    fn teardown(&self, mut proxy: CollectionProxy) {
        if let Some(load) = proxy.load.take() {
            debug!(path = load.path, "load cancelled");
        }
        proxy.release_collection();
        self.ctx.resources.release(proxy.resource);
    }

    /// Include the proxy in [`CollectionProxyWorld::update`].
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::StaleHandle`] if the proxy does not exist.
    pub fn add_to_update(&mut self, handle: Handle) -> Result<(), GamesysError> {
        proxy_mut(&mut self.proxies, handle)?.added_to_update = true;
        Ok(())
    }

    /// Load the child collection now. `completion` is delivered before this
    /// call returns, with the outcome of the load.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::AlreadyLoaded`] or
    /// [`GamesysError::CurrentlyLoading`] without touching `completion`, or
    /// the load error after delivering a failed outcome.
    pub fn load(&mut self, handle: Handle, completion: Completion) -> Result<(), GamesysError> {
        let proxy = proxy_mut(&mut self.proxies, handle)?;
        proxy.ensure_can_load()?;
        let path = proxy.collection_path().to_string();

        match self.ctx.builder.build(&self.ctx, &path) {
            Ok(collection) => {
                proxy.collection = Some(collection);
                debug!(path, "collection loaded");
                completion.deliver(&self.ctx.bus, ids::PROXY_LOADED, &LoadOutcome::succeeded(path));
                Ok(())
            }
            Err(e) => {
                warn!(path, error = %e, "the collection could not be loaded");
                completion.deliver(&self.ctx.bus, ids::PROXY_LOADED, &LoadOutcome::failed(path));
                Err(e)
            }
        }
    }

    /// Start loading the child collection through a preloader. The load is
    /// advanced, and `completion` delivered, by later calls to
    /// [`CollectionProxyWorld::update`].
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::AlreadyLoaded`],
    /// [`GamesysError::CurrentlyLoading`] or the preloader creation error.
    pub fn async_load(&mut self, handle: Handle, completion: Completion) -> Result<(), GamesysError> {
        let proxy = proxy_mut(&mut self.proxies, handle)?;
        proxy.ensure_can_load()?;
        let path = proxy.collection_path().to_string();

        let preloader = self
            .ctx
            .preloaders
            .create(&self.ctx.resources, vec![path.clone()])?;
        debug!(path, "async load started");
        proxy.load = Some(PendingLoad {
            path,
            preloader,
            completion,
        });
        Ok(())
    }

    /// Release the child collection. `completion` is delivered by the next
    /// call to [`CollectionProxyWorld::update`].
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::CurrentlyLoading`] if a load is in flight and
    /// [`GamesysError::NotLoaded`] if nothing is loaded.
    pub fn unload(&mut self, handle: Handle, completion: Completion) -> Result<(), GamesysError> {
        let proxy = proxy_mut(&mut self.proxies, handle)?;
        if proxy.collection.is_none() {
            return Err(if proxy.load.is_some() {
                GamesysError::CurrentlyLoading
            } else {
                GamesysError::NotLoaded
            });
        }
        proxy.release_collection();
        proxy.unloaded.push(completion);
        debug!(path = proxy.collection_path(), "collection unloaded");
        Ok(())
    }

    /// Run the child collection's init pass.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::NotLoaded`] or
    /// [`GamesysError::AlreadyInitialized`].
    pub fn init(&mut self, handle: Handle) -> Result<(), GamesysError> {
        let proxy = proxy_mut(&mut self.proxies, handle)?;
        if proxy.initialized {
            proxy.loaded_collection()?;
            return Err(GamesysError::AlreadyInitialized);
        }
        proxy.loaded_collection()?.init();
        proxy.initialized = true;
        Ok(())
    }

    /// Run the child collection's final pass.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::NotInitialized`] unless the collection is
    /// loaded and initialized.
    pub fn finalize(&mut self, handle: Handle) -> Result<(), GamesysError> {
        let proxy = proxy_mut(&mut self.proxies, handle)?;
        if !proxy.initialized {
            return Err(GamesysError::NotInitialized);
        }
        proxy.loaded_collection()?.finalize();
        proxy.initialized = false;
        Ok(())
    }

    /// Enable the child collection from the next update on, initializing it
    /// now if needed.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::NotLoaded`] or [`GamesysError::AlreadyEnabled`].
    pub fn enable(&mut self, handle: Handle) -> Result<(), GamesysError> {
        let proxy = proxy_mut(&mut self.proxies, handle)?;
        let Some(collection) = proxy.collection.as_mut() else {
            return Err(GamesysError::NotLoaded);
        };
        if proxy.activation != Activation::Disabled {
            return Err(GamesysError::AlreadyEnabled);
        }
        if !proxy.initialized {
            collection.init();
            proxy.initialized = true;
        }
        proxy.activation = Activation::PendingEnable;
        Ok(())
    }

    /// Disable the child collection from the next update on.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::NotEnabled`] unless the proxy is enabled.
    pub fn disable(&mut self, handle: Handle) -> Result<(), GamesysError> {
        let proxy = proxy_mut(&mut self.proxies, handle)?;
        if proxy.activation != Activation::Enabled {
            return Err(GamesysError::NotEnabled);
        }
        proxy.activation = Activation::PendingDisable;
        Ok(())
    }

    /// Set the time-step factor and mode. Negative factors are clamped to 0.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::StaleHandle`] if the proxy does not exist.
    pub fn set_time_step(&mut self, handle: Handle, factor: f32, mode: TimeStepMode) -> Result<(), GamesysError> {
        let proxy = proxy_mut(&mut self.proxies, handle)?;
        proxy.time_step.factor = factor.max(0.0);
        proxy.time_step.mode = mode;
        Ok(())
    }

    /// Restore factor 1 and continuous stepping.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::StaleHandle`] if the proxy does not exist.
    pub fn reset_time_step(&mut self, handle: Handle) -> Result<(), GamesysError> {
        self.set_time_step(handle, 1.0, TimeStepMode::Continuous)
    }

    /// Replace the collection an excludable proxy loads. `None`, or the
    /// authored path, restores the authored collection.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::CurrentlyLoading`],
    /// [`GamesysError::AlreadyLoaded`] or [`GamesysError::NotExcluded`].
    pub fn set_collection_path(&mut self, handle: Handle, path: Option<&str>) -> Result<(), GamesysError> {
        let proxy = proxy_mut(&mut self.proxies, handle)?;
        if proxy.load.is_some() {
            return Err(GamesysError::CurrentlyLoading);
        }
        if proxy.collection.is_some() {
            return Err(GamesysError::AlreadyLoaded);
        }
        if !proxy.desc.exclude {
            return Err(GamesysError::NotExcluded);
        }
        proxy.path_override = path
            .filter(|path| *path != proxy.desc.collection)
            .map(str::to_string);
        Ok(())
    }

    /// Advance every proxy added to the update, in slot order: poll in-flight
    /// loads, apply pending enable/disable, update enabled children and
    /// deliver unload notifications from the previous tick.
    ///
    /// Returns `false` if any child update failed.
    pub fn update(&mut self, parent: &UpdateContext) -> bool {
        let budget = self.ctx.config.preload_budget();
        let ctx = &self.ctx;
        let mut ok = true;

        for (_, proxy) in self.proxies.iter_mut() {
            if !proxy.added_to_update {
                continue;
            }

            if let Some(mut load) = proxy.load.take() {
                let mut built = None;
                let path = load.path.as_str();
                let mut on_complete = |_: &ResourceFactory| -> Result<(), ResourceError> {
                    let collection = ctx.builder.build(ctx, path).map_err(build_failure)?;
                    built = Some(collection);
                    Ok(())
                };
                match load.preloader.poll(&mut on_complete, budget) {
                    PreloadResult::Pending => proxy.load = Some(load),
                    result => {
                        drop(load.preloader);
                        let success = result == PreloadResult::Ok && built.is_some();
                        if success {
                            debug!(path = load.path, "collection loaded");
                            proxy.collection = built;
                        } else {
                            warn!(path = load.path, ?result, "the collection could not be loaded");
                        }
                        let outcome = LoadOutcome {
                            path: load.path,
                            success,
                        };
                        load.completion.deliver(&ctx.bus, ids::PROXY_LOADED, &outcome);
                    }
                }
            }

            if let Some(collection) = proxy.collection.as_mut() {
                proxy.activation = proxy.activation.reconcile();
                if proxy.activation == Activation::Enabled {
                    if let Some(child) = proxy.time_step.warp(parent) {
                        ok &= collection.update(&child);
                    }
                } else {
                    proxy.time_step.accumulated = 0.0;
                }
            }

            if !proxy.unloaded.is_empty() {
                let outcome = LoadOutcome::succeeded(proxy.collection_path());
                for completion in proxy.unloaded.drain(..) {
                    completion.deliver(&ctx.bus, ids::PROXY_UNLOADED, &outcome);
                }
            }
        }
        ok
    }

    /// Render every loaded child collection.
    pub fn render(&mut self) -> bool {
        let mut ok = true;
        for (_, proxy) in self.proxies.iter_mut() {
            if let Some(collection) = proxy.collection.as_mut() {
                ok &= collection.render();
            }
        }
        ok
    }

    /// Post-update every loaded and enabled child collection.
    pub fn post_update(&mut self) -> bool {
        let mut ok = true;
        for (_, proxy) in self.proxies.iter_mut() {
            if proxy.activation == Activation::Enabled {
                if let Some(collection) = proxy.collection.as_mut() {
                    ok &= collection.post_update();
                }
            }
        }
        ok
    }

    /// Offer an input action to one proxy's child collection.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::StaleHandle`] if the proxy does not exist.
    pub fn on_input(&mut self, handle: Handle, action: &InputAction) -> Result<InputResult, GamesysError> {
        let proxy = proxy_mut(&mut self.proxies, handle)?;
        if proxy.activation != Activation::Enabled {
            return Ok(InputResult::Ignored);
        }
        Ok(proxy
            .collection
            .as_mut()
            .map_or(InputResult::Ignored, |collection| collection.dispatch_input(action)))
    }

    /// Offer an input action to every enabled child in slot order, stopping
    /// at the first that consumes it.
    pub fn dispatch_input(&mut self, action: &InputAction) -> InputResult {
        for handle in self.proxies.handles() {
            if let Ok(InputResult::Consumed) = self.on_input(handle, action) {
                return InputResult::Consumed;
            }
        }
        InputResult::Ignored
    }

    /// The proxy addressed by `url`'s instance and component ids.
    #[must_use]
    pub fn find(&self, url: &Url) -> Option<Handle> {
        self.proxies
            .iter()
            .find(|(_, proxy)| proxy.url.same_target(url))
            .map(|(handle, _)| handle)
    }

    /// Path hash of the proxy resource of component `component` on instance
    /// `instance`.
    #[must_use]
    pub fn url_hash_of(&self, instance: NameHash, component: NameHash) -> Option<NameHash> {
        self.proxies
            .iter()
            .find(|(_, proxy)| proxy.url.path == instance && proxy.url.fragment == component)
            .map(|(_, proxy)| proxy.resource.path_hash())
    }

    /// Address of a proxy.
    #[must_use]
    pub fn url(&self, handle: Handle) -> Option<Url> {
        self.proxies.get(handle).map(|proxy| proxy.url)
    }

    /// Returns `true` if the proxy's child collection is loaded.
    #[must_use]
    pub fn is_loaded(&self, handle: Handle) -> bool {
        self.proxies
            .get(handle)
            .is_some_and(|proxy| proxy.collection.is_some())
    }

    /// Socket of the loaded child collection, for addressing the components
    /// inside it.
    #[must_use]
    pub fn child_socket(&self, handle: Handle) -> Option<SocketId> {
        self.proxies
            .get(handle)
            .and_then(|proxy| proxy.collection.as_ref())
            .and_then(|collection| collection.socket())
    }

    /// Returns `true` if an async load is in flight.
    #[must_use]
    pub fn is_loading(&self, handle: Handle) -> bool {
        self.proxies
            .get(handle)
            .is_some_and(|proxy| proxy.load.is_some())
    }

    /// Returns `true` if the child collection has been initialized.
    #[must_use]
    pub fn is_initialized(&self, handle: Handle) -> bool {
        self.proxies.get(handle).is_some_and(|proxy| proxy.initialized)
    }

    /// Returns `true` if the child collection is updated by the proxy world.
    #[must_use]
    pub fn is_enabled(&self, handle: Handle) -> bool {
        self.activation(handle) == Some(Activation::Enabled)
    }

    /// Enabled state including pending transitions.
    #[must_use]
    pub fn activation(&self, handle: Handle) -> Option<Activation> {
        self.proxies.get(handle).map(|proxy| proxy.activation)
    }

    /// Time-step state.
    #[must_use]
    pub fn time_step(&self, handle: Handle) -> Option<TimeStep> {
        self.proxies.get(handle).map(|proxy| proxy.time_step)
    }

    /// Path the proxy loads.
    #[must_use]
    pub fn collection_path(&self, handle: Handle) -> Option<&str> {
        self.proxies.get(handle).map(CollectionProxy::collection_path)
    }

    /// Tear the world down, finalizing and releasing every child collection.
    pub fn delete_world(self) {
        drop(self);
    }
}

impl Drop for CollectionProxyWorld {
    fn drop(&mut self) {
        let handles = self.proxies.handles();
        let count = handles.len();
        for handle in handles {
            if let Ok(proxy) = self.proxies.remove(handle) {
                self.teardown(proxy);
            }
        }
        info!(proxies = count, "collection proxy world deleted");
    }
}

impl std::fmt::Debug for CollectionProxyWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionProxyWorld")
            .field("len", &self.proxies.len())
            .field("capacity", &self.proxies.capacity())
            .finish()
    }
}
