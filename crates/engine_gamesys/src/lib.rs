//! # engine_gamesys
//!
//! Runtime loading and spawning of collections.
//!
//! This crate provides:
//!
//! - [`proxy`]: collection proxies: load, enable and time-step a child
//!   collection.
//! - [`factory`]: collection factories: spawn a collection template into
//!   the owning collection.
//! - [`protocol`]: the message surface of the proxies.
//! - [`scene`]: [`GameCollection`], the live collection both kinds of
//!   component live in.
//! - [`resources`]: collection, prototype and component descriptors and
//!   their loaders.
//! - [`frame`]: a fixed-rate [`FrameLoop`] for a root collection.
//! - [`config`] / [`context`]: capacities, budgets and the shared
//!   [`GamesysContext`].

pub mod collection;
pub mod completion;
pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod frame;
pub mod protocol;
pub mod proxy;
pub mod resources;
pub mod scene;

#[cfg(test)]
mod testing;

pub use collection::{
    Collection, CollectionBuilder, InputAction, InputResult, SpawnTarget, UpdateContext,
};
pub use completion::{Completion, CompletionCallback, LoadOutcome};
pub use config::GamesysConfig;
pub use context::GamesysContext;
pub use error::{CallbackError, GamesysError};
pub use factory::{CollectionFactoryWorld, FactoryStatus, InstanceSpawn, SpawnPlan, merge_properties};
pub use frame::{FrameLoop, TickConfig};
pub use protocol::ProxyRequest;
pub use proxy::{Activation, CollectionProxyWorld, TimeStep, TimeStepMode};
pub use scene::{GameCollection, GameCollectionBuilder};
