//! Message addresses.
//!
//! A [`Url`] names a component the same way the runtime routes to it: the
//! socket of the collection that owns it, the id of the owning instance and
//! the id of the component on that instance.

use engine_component::NameHash;
use serde::{Deserialize, Serialize};

/// Id of a message socket, the hash of the socket's name.
pub type SocketId = NameHash;

/// Address of a message endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Url {
    /// Socket of the owning collection.
    pub socket: SocketId,
    /// Id of the owning instance, [`NameHash::EMPTY`] for the collection itself.
    pub path: NameHash,
    /// Id of the component on the instance, [`NameHash::EMPTY`] for the
    /// instance itself.
    pub fragment: NameHash,
}

impl Url {
    /// Address of a component.
    #[must_use]
    pub const fn new(socket: SocketId, path: NameHash, fragment: NameHash) -> Self {
        Self {
            socket,
            path,
            fragment,
        }
    }

    /// Address of a whole socket with no instance or component part.
    #[must_use]
    pub const fn socket_only(socket: SocketId) -> Self {
        Self {
            socket,
            path: NameHash::EMPTY,
            fragment: NameHash::EMPTY,
        }
    }

    /// Returns `true` if `other` addresses the same instance and component,
    /// ignoring the socket.
    #[must_use]
    pub fn same_target(&self, other: &Url) -> bool {
        self.path == other.path && self.fragment == other.fragment
    }
}

impl std::fmt::Display for Url {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}#{}", self.socket, self.path, self.fragment)
    }
}
