//! Well-known message names.
//!
//! Messages are identified on the wire by the [`NameHash`] of their name.
//! The names are part of the external contract with scripts, so they are
//! spelled exactly as scripts post them.

use engine_component::NameHash;

// ── Proxy lifecycle requests ────────────────────────────────────────────────

/// Synchronously load the proxy's collection.
pub const LOAD: &str = "load";

/// Start loading the proxy's collection in the background.
pub const ASYNC_LOAD: &str = "async_load";

/// Release the proxy's collection.
pub const UNLOAD: &str = "unload";

/// Run the collection's init pass.
pub const INIT: &str = "init";

/// Run the collection's final pass.
pub const FINAL: &str = "final";

/// Enable the collection (initializing it first if needed).
pub const ENABLE: &str = "enable";

/// Disable the collection.
pub const DISABLE: &str = "disable";

/// Change the time-step factor and mode. Payload: [`SetTimeStep`](crate::messages::SetTimeStep).
pub const SET_TIME_STEP: &str = "set_time_step";

/// Restore factor 1 and continuous mode.
pub const RESET_TIME_STEP: &str = "reset_time_step";

// ── Notifications ───────────────────────────────────────────────────────────

/// Posted to the load requester when the collection has loaded.
pub const PROXY_LOADED: &str = "proxy_loaded";

/// Posted to the unload requester on the tick after the collection was unloaded.
pub const PROXY_UNLOADED: &str = "proxy_unloaded";

/// Hash of a message name.
#[must_use]
pub const fn message_id(name: &str) -> NameHash {
    NameHash::of(name)
}

/// Reverse lookup of a well-known message id, for logging.
#[must_use]
pub fn message_name(id: NameHash) -> Option<&'static str> {
    [
        LOAD,
        ASYNC_LOAD,
        UNLOAD,
        INIT,
        FINAL,
        ENABLE,
        DISABLE,
        SET_TIME_STEP,
        RESET_TIME_STEP,
        PROXY_LOADED,
        PROXY_UNLOADED,
    ]
    .into_iter()
    .find(|name| message_id(name) == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_are_distinct() {
        assert_ne!(message_id(LOAD), message_id(ASYNC_LOAD));
        assert_ne!(message_id(PROXY_LOADED), message_id(PROXY_UNLOADED));
    }

    #[test]
    fn test_reverse_lookup() {
        assert_eq!(message_name(message_id(SET_TIME_STEP)), Some(SET_TIME_STEP));
        assert_eq!(message_name(message_id("jump")), None);
    }
}
