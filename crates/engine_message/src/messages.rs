//! Message envelope and payload types.
//!
//! A [`Message`] carries its routing metadata (sender, receiver, id) in the
//! envelope and an optional MessagePack payload. Most lifecycle messages have
//! no payload at all.

use engine_component::NameHash;
use serde::{Deserialize, Serialize};

use crate::address::Url;
use crate::error::MessageError;
use crate::ids;

/// A posted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who posted the message. Replies and notifications go here.
    pub sender: Url,
    /// The addressed component.
    pub receiver: Url,
    /// Hash of the message name, see [`ids`].
    pub id: NameHash,
    /// MessagePack-encoded payload, empty for payload-less messages.
    pub payload: Vec<u8>,
}

impl Message {
    /// A message without payload.
    #[must_use]
    pub fn new(sender: Url, receiver: Url, name: &str) -> Self {
        Self {
            sender,
            receiver,
            id: ids::message_id(name),
            payload: Vec::new(),
        }
    }

    /// A message with an encoded payload.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Encode`] if the payload cannot be encoded.
    pub fn with_payload<T: Serialize>(
        sender: Url,
        receiver: Url,
        name: &str,
        payload: &T,
    ) -> Result<Self, MessageError> {
        Ok(Self {
            sender,
            receiver,
            id: ids::message_id(name),
            payload: crate::codec::encode(payload)?,
        })
    }

    /// Returns `true` if this message has the given name.
    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.id == ids::message_id(name)
    }

    /// Human-readable name for logging, falling back to the hash.
    #[must_use]
    pub fn display_name(&self) -> String {
        ids::message_name(self.id).map_or_else(|| self.id.to_string(), str::to_string)
    }
}

/// Payload of [`ids::SET_TIME_STEP`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetTimeStep {
    /// Time-step scaling factor.
    pub factor: f32,
    /// `0` for continuous, `1` for discrete stepping.
    pub mode: u32,
}
