//! # engine_message
//!
//! In-process message transport used by component lifecycle requests and
//! their completion notifications.
//!
//! This crate provides:
//!
//! - [`address`]: [`Url`] endpoint addresses.
//! - [`ids`]: well-known message names.
//! - [`messages`]: the [`Message`] envelope and payload types.
//! - [`codec`]: MessagePack payload helpers.
//! - [`bus`]: the [`MessageBus`] socket registry and queues.
//! - [`error`]: message-layer error types.

pub mod address;
pub mod bus;
pub mod codec;
pub mod error;
pub mod ids;
pub mod messages;

pub use address::{SocketId, Url};
pub use bus::MessageBus;
pub use codec::{decode, encode};
pub use error::MessageError;
pub use messages::{Message, SetTimeStep};
