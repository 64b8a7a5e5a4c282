//! Explicit subsystem context.
//!
//! Everything the component worlds share is reached through one
//! [`GamesysContext`], created at engine start-up and cloned into every
//! world. Dropping the last clone tears the shared state down.

use std::sync::Arc;

use engine_message::MessageBus;
use engine_resource::{DefaultPreloaderFactory, PreloaderFactory, ResourceFactory, ResourceSource};

use crate::collection::CollectionBuilder;
use crate::config::GamesysConfig;
use crate::resources::register_loaders;
use crate::scene::GameCollectionBuilder;

/// Shared services of the proxy and factory worlds.
#[derive(Clone)]
pub struct GamesysContext {
    /// Resource store.
    pub resources: Arc<ResourceFactory>,
    /// Message transport.
    pub bus: Arc<MessageBus>,
    /// World capacities and budgets.
    pub config: GamesysConfig,
    /// Creates preloaders for async loads.
    pub preloaders: Arc<dyn PreloaderFactory>,
    /// Instantiates loaded collections.
    pub builder: Arc<dyn CollectionBuilder>,
}

impl GamesysContext {
    /// A context over `source` with this crate's loaders, incremental
    /// preloading and [`GameCollection`](crate::GameCollection) children.
    #[must_use]
    pub fn new(source: Arc<dyn ResourceSource>, config: GamesysConfig) -> Self {
        Self {
            resources: Arc::new(register_loaders(ResourceFactory::new(source))),
            bus: Arc::new(MessageBus::new()),
            config,
            preloaders: Arc::new(DefaultPreloaderFactory::incremental()),
            builder: Arc::new(GameCollectionBuilder),
        }
    }

    /// Replace the preloader factory.
    #[must_use]
    pub fn with_preloaders(mut self, preloaders: Arc<dyn PreloaderFactory>) -> Self {
        self.preloaders = preloaders;
        self
    }

    /// Replace the collection builder.
    #[must_use]
    pub fn with_builder(mut self, builder: Arc<dyn CollectionBuilder>) -> Self {
        self.builder = builder;
        self
    }
}

impl std::fmt::Debug for GamesysContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GamesysContext")
            .field("resources", &self.resources)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
