//! Subsystem error types.
//!
//! Every rejected operation maps to its own variant so direct callers can
//! tell a full pool from an invalid transition or a failed resource load.

use engine_component::Handle;
use engine_message::MessageError;
use engine_resource::ResourceError;

/// Errors returned by the proxy and factory worlds.
#[derive(Debug, thiserror::Error)]
pub enum GamesysError {
    /// The component world has no free slot.
    #[error("{kind} could not be created since the buffer is full ({capacity}), tweak \"{config_key}\" in the config file")]
    BufferFull {
        /// Component kind, for the log line.
        kind: &'static str,
        /// Capacity of the world.
        capacity: usize,
        /// Configuration key that controls the capacity.
        config_key: &'static str,
    },

    /// The collection is already loaded.
    #[error("collection is already loaded")]
    AlreadyLoaded,

    /// The collection has not been loaded.
    #[error("collection is not loaded")]
    NotLoaded,

    /// A load is in flight.
    #[error("a load is already in progress")]
    CurrentlyLoading,

    /// The collection has already been initialized.
    #[error("collection is already initialized")]
    AlreadyInitialized,

    /// The collection has not been initialized.
    #[error("collection is not initialized")]
    NotInitialized,

    /// The collection is already enabled or about to be.
    #[error("collection is already enabled")]
    AlreadyEnabled,

    /// The collection is not enabled.
    #[error("collection is not enabled")]
    NotEnabled,

    /// The proxy was not authored as excludable, so its path is fixed.
    #[error("collection proxy is not excluded, its collection cannot be changed")]
    NotExcluded,

    /// The factory was not authored with a dynamic prototype.
    #[error("collection factory does not have a dynamic prototype")]
    NotDynamicPrototype,

    /// Unknown time-step mode.
    #[error("invalid time step mode {0}")]
    InvalidTimeStepMode(u32),

    /// The component handle no longer refers to a live component.
    #[error("component handle {0} is stale")]
    StaleHandle(Handle),

    /// An instance with this id already exists in the collection.
    #[error("instance '{0}' already exists")]
    InstanceExists(String),

    /// A resource could not be acquired.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A message could not be posted or decoded.
    #[error(transparent)]
    Message(#[from] MessageError),
}

/// Returned by a completion callback that could not run, e.g. because the
/// object it reports to is gone.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("completion callback failed: {0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    /// A callback error with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
