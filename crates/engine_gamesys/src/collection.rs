//! The collection interface driven by proxies and targeted by factories.
//!
//! A proxy only ever sees a `Box<dyn Collection>`: it does not know whether
//! the child is a [`GameCollection`](crate::GameCollection) with its own
//! proxies or a test double counting its updates.

use engine_component::{Entity, NameHash};
use engine_math::Transform;
use engine_message::SocketId;
use serde_json::Value;

use crate::context::GamesysContext;
use crate::error::GamesysError;

/// Per-tick timing handed to a collection's update pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateContext {
    /// Simulated seconds to advance.
    pub dt: f32,
    /// Accumulated time scale, the product of every enclosing proxy's factor.
    pub time_scale: f32,
    /// Frame counter of the outermost loop.
    pub frame: u64,
}

impl UpdateContext {
    /// Unscaled context for a root collection.
    #[must_use]
    pub fn new(dt: f32, frame: u64) -> Self {
        Self {
            dt,
            time_scale: 1.0,
            frame,
        }
    }
}

/// An input action routed through the collection hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct InputAction {
    /// Hashed action name.
    pub action_id: NameHash,
    /// Analog value, 1.0 for digital input.
    pub value: f32,
    /// The action went down this frame.
    pub pressed: bool,
    /// The action went up this frame.
    pub released: bool,
}

impl InputAction {
    /// A digital press of `action`.
    #[must_use]
    pub fn pressed(action: &str) -> Self {
        Self {
            action_id: NameHash::of(action),
            value: 1.0,
            pressed: true,
            released: false,
        }
    }
}

/// Whether an input action should keep propagating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputResult {
    /// Not handled, pass it on.
    Ignored,
    /// Handled, stop propagation.
    Consumed,
}

/// A live collection.
pub trait Collection {
    /// The collection name.
    fn name(&self) -> &str;

    /// Run the init pass.
    fn init(&mut self);

    /// Run the final pass.
    fn finalize(&mut self);

    /// Advance the collection. Returns `false` if any component failed.
    fn update(&mut self, ctx: &UpdateContext) -> bool;

    /// Submit render work.
    fn render(&mut self) -> bool;

    /// Run the post-update pass.
    fn post_update(&mut self) -> bool;

    /// Offer an input action to the collection.
    fn dispatch_input(&mut self, action: &InputAction) -> InputResult;

    /// Socket the collection's components receive messages on, if it has
    /// one.
    fn socket(&self) -> Option<SocketId> {
        None
    }
}

/// Instantiates collections from collection resources. The proxy world
/// asks the builder of its context whenever a load resolves.
pub trait CollectionBuilder: Send + Sync {
    /// Instantiate the collection stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`GamesysError`] if the resource cannot be acquired or the
    /// collection cannot be populated.
    fn build(&self, ctx: &GamesysContext, path: &str) -> Result<Box<dyn Collection>, GamesysError>;
}

/// A collection that factories can spawn instances into.
pub trait SpawnTarget {
    /// Create an instance of `prototype` with id `id`.
    ///
    /// # Errors
    ///
    /// Returns [`GamesysError::InstanceExists`] if the id is taken, or the
    /// error of the prototype's resources or components.
    fn spawn_instance(
        &mut self,
        id: &str,
        prototype: &str,
        transform: Transform,
        properties: Option<Value>,
    ) -> Result<Entity, GamesysError>;

    /// Destroy an instance created by [`SpawnTarget::spawn_instance`].
    fn despawn(&mut self, entity: Entity);
}
