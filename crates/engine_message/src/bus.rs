//! In-process message bus.
//!
//! Every collection owns one named socket. Posting appends to the receiver
//! socket's queue; the owning collection drains its queue at well-defined
//! points of its tick, so a post never runs the receiver inline.

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::address::{SocketId, Url};
use crate::error::MessageError;
use crate::messages::Message;

#[derive(Debug)]
struct Socket {
    name: String,
    queue: Vec<Message>,
}

/// The set of live sockets and their pending messages.
#[derive(Debug, Default)]
pub struct MessageBus {
    sockets: DashMap<SocketId, Socket>,
}

impl MessageBus {
    /// Create a bus without sockets.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sockets: DashMap::new(),
        }
    }

    /// Create a socket named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::SocketExists`] if the name is taken.
    pub fn new_socket(&self, name: &str) -> Result<SocketId, MessageError> {
        let id = SocketId::of(name);
        match self.sockets.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(MessageError::SocketExists(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Socket {
                    name: name.to_string(),
                    queue: Vec::new(),
                });
                debug!(socket = name, "socket created");
                Ok(id)
            }
        }
    }

    /// Delete a socket. Messages still queued on it are dropped.
    pub fn delete_socket(&self, id: SocketId) {
        if let Some((_, socket)) = self.sockets.remove(&id) {
            if !socket.queue.is_empty() {
                warn!(
                    socket = socket.name,
                    dropped = socket.queue.len(),
                    "socket deleted with pending messages"
                );
            }
            debug!(socket = socket.name, "socket deleted");
        }
    }

    /// Returns `true` if the socket exists.
    #[must_use]
    pub fn is_socket_valid(&self, id: SocketId) -> bool {
        self.sockets.contains_key(&id)
    }

    /// Name of a live socket.
    #[must_use]
    pub fn socket_name(&self, id: SocketId) -> Option<String> {
        self.sockets.get(&id).map(|socket| socket.name.clone())
    }

    /// Queue `message` on its receiver's socket.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::InvalidSocket`] if the receiver socket does not
    /// exist.
    pub fn post(&self, message: Message) -> Result<(), MessageError> {
        let socket_id = message.receiver.socket;
        let mut socket = self
            .sockets
            .get_mut(&socket_id)
            .ok_or(MessageError::InvalidSocket(socket_id))?;
        debug!(
            socket = socket.name,
            message = message.display_name(),
            "message posted"
        );
        socket.queue.push(message);
        Ok(())
    }

    /// Post a payload-less message from `sender` to `receiver`.
    ///
    /// # Errors
    ///
    /// See [`MessageBus::post`].
    pub fn post_notification(&self, sender: Url, receiver: Url, name: &str) -> Result<(), MessageError> {
        self.post(Message::new(sender, receiver, name))
    }

    /// Take every message queued on a socket, oldest first.
    ///
    /// Messages posted while the caller handles the returned batch land in
    /// the queue for the next drain.
    #[must_use]
    pub fn drain(&self, id: SocketId) -> Vec<Message> {
        self.sockets
            .get_mut(&id)
            .map(|mut socket| std::mem::take(&mut socket.queue))
            .unwrap_or_default()
    }

    /// Number of messages waiting on a socket.
    #[must_use]
    pub fn pending(&self, id: SocketId) -> usize {
        self.sockets.get(&id).map_or(0, |socket| socket.queue.len())
    }
}
