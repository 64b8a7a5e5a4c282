//! Load and unload completion delivery.
//!
//! A request either carries a callback or came in as a message with a reply
//! address. Both are stored as one [`Completion`] and delivered through
//! [`Completion::deliver`], so the state machines never branch on how a
//! request was made.

use engine_message::{MessageBus, Url};
use tracing::warn;

use crate::error::CallbackError;

/// What a completion reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    /// The path that was loaded or unloaded.
    pub path: String,
    /// Whether the operation succeeded.
    pub success: bool,
}

impl LoadOutcome {
    /// A successful outcome for `path`.
    #[must_use]
    pub fn succeeded(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            success: true,
        }
    }

    /// A failed outcome for `path`.
    #[must_use]
    pub fn failed(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            success: false,
        }
    }
}

/// Callback run when a request completes.
pub type CompletionCallback = Box<dyn FnOnce(&LoadOutcome) -> Result<(), CallbackError>>;

/// Where to report the completion of a request.
pub enum Completion {
    /// Call back into the requester.
    Callback(CompletionCallback),
    /// Post a notification from `component` to `requester`. Only successful
    /// outcomes are posted; failures are logged.
    Message {
        /// Sender of the request.
        requester: Url,
        /// The component that handled the request.
        component: Url,
    },
    /// Nobody is waiting.
    Discard,
}

impl Completion {
    /// Wrap a closure.
    pub fn callback(f: impl FnOnce(&LoadOutcome) -> Result<(), CallbackError> + 'static) -> Self {
        Self::Callback(Box::new(f))
    }

    /// Reply to a message sent by `requester` to `component`.
    #[must_use]
    pub fn reply(requester: Url, component: Url) -> Self {
        Self::Message {
            requester,
            component,
        }
    }

    /// Report `outcome`. Failures to deliver are logged, never returned.
    pub fn deliver(self, bus: &MessageBus, notification: &str, outcome: &LoadOutcome) {
        match self {
            Self::Callback(callback) => {
                if let Err(error) = callback(outcome) {
                    warn!(path = outcome.path, %error, "completion callback failed");
                }
            }
            Self::Message {
                requester,
                component,
            } => {
                if !outcome.success {
                    warn!(
                        path = outcome.path,
                        notification, "request failed, no notification posted"
                    );
                    return;
                }
                if let Err(error) = bus.post_notification(component, requester, notification) {
                    warn!(notification, %requester, %error, "notification could not be posted");
                }
            }
            Self::Discard => {}
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("Completion::Callback"),
            Self::Message {
                requester,
                component,
            } => f
                .debug_struct("Completion::Message")
                .field("requester", requester)
                .field("component", component)
                .finish(),
            Self::Discard => f.write_str("Completion::Discard"),
        }
    }
}
