//! Message surface of the proxy world.
//!
//! Scripts drive proxies by posting messages to them. Each message decodes
//! to a [`ProxyRequest`] that runs through the same operation as a direct
//! call; load and unload requests reply to the sender with the matching
//! notification.

use engine_component::Handle;
use engine_message::{Message, MessageError, SetTimeStep, ids};
use tracing::{debug, warn};

use crate::completion::Completion;
use crate::error::GamesysError;
use crate::proxy::{CollectionProxyWorld, TimeStepMode};

/// A lifecycle request addressed to a proxy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProxyRequest {
    /// `load`: load the child collection now.
    Load,
    /// `async_load`: load the child collection through a preloader.
    AsyncLoad,
    /// `unload`: release the child collection.
    Unload,
    /// `init`: run the child's init pass.
    Init,
    /// `final`: run the child's final pass.
    Final,
    /// `enable`: start updating the child.
    Enable,
    /// `disable`: stop updating the child.
    Disable,
    /// `set_time_step`: scale the child's time. `mode` is 0 for continuous
    /// and 1 for discrete stepping.
    SetTimeStep { factor: f32, mode: u32 },
    /// `reset_time_step`: restore unscaled continuous time.
    ResetTimeStep,
}

impl ProxyRequest {
    /// Decode a posted message. Messages that are not proxy requests give
    /// `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::MissingPayload`] or [`MessageError::Decode`]
    /// for a malformed `set_time_step`.
    pub fn from_message(message: &Message) -> Result<Option<Self>, MessageError> {
        let request = if message.is(ids::LOAD) {
            Self::Load
        } else if message.is(ids::ASYNC_LOAD) {
            Self::AsyncLoad
        } else if message.is(ids::UNLOAD) {
            Self::Unload
        } else if message.is(ids::INIT) {
            Self::Init
        } else if message.is(ids::FINAL) {
            Self::Final
        } else if message.is(ids::ENABLE) {
            Self::Enable
        } else if message.is(ids::DISABLE) {
            Self::Disable
        } else if message.is(ids::SET_TIME_STEP) {
            if message.payload.is_empty() {
                return Err(MessageError::MissingPayload(ids::SET_TIME_STEP));
            }
            let SetTimeStep { factor, mode } = engine_message::decode(&message.payload)?;
            Self::SetTimeStep { factor, mode }
        } else if message.is(ids::RESET_TIME_STEP) {
            Self::ResetTimeStep
        } else {
            return Ok(None);
        };
        Ok(Some(request))
    }

    /// Whether the requester is told when the request completes.
    #[must_use]
    pub fn replies(self) -> bool {
        matches!(self, Self::Load | Self::AsyncLoad | Self::Unload)
    }
}

impl CollectionProxyWorld {
    /// Run `request` on a proxy. `completion` is only used by load and
    /// unload requests.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying operation.
    pub fn request(
        &mut self,
        handle: Handle,
        request: ProxyRequest,
        completion: Completion,
    ) -> Result<(), GamesysError> {
        match request {
            ProxyRequest::Load => self.load(handle, completion),
            ProxyRequest::AsyncLoad => self.async_load(handle, completion),
            ProxyRequest::Unload => self.unload(handle, completion),
            ProxyRequest::Init => self.init(handle),
            ProxyRequest::Final => self.finalize(handle),
            ProxyRequest::Enable => self.enable(handle),
            ProxyRequest::Disable => self.disable(handle),
            ProxyRequest::SetTimeStep { factor, mode } => {
                self.set_time_step(handle, factor, TimeStepMode::try_from(mode)?)
            }
            ProxyRequest::ResetTimeStep => self.reset_time_step(handle),
        }
    }

    /// Handle a message posted to a proxy.
    ///
    /// Rejected requests are logged and dropped, the way a script sees them;
    /// only malformed messages are returned as errors.
    ///
    /// # Errors
    ///
    /// Returns the decode error of a malformed request.
    pub fn on_message(&mut self, handle: Handle, message: &Message) -> Result<(), MessageError> {
        let Some(request) = ProxyRequest::from_message(message)? else {
            debug!(message = message.display_name(), "message ignored by collection proxy");
            return Ok(());
        };
        let completion = if request.replies() {
            Completion::reply(message.sender, message.receiver)
        } else {
            Completion::Discard
        };
        if let Err(e) = self.request(handle, request, completion) {
            warn!(
                message = message.display_name(),
                receiver = %message.receiver,
                error = %e,
                "collection proxy request failed"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use engine_component::NameHash;
    use engine_message::Url;

    use super::*;
    use crate::collection::UpdateContext;
    use crate::config::GamesysConfig;
    use crate::proxy::Activation;
    use crate::testing::{Probe, ProbeBuilder, context, proxy_url};

    #[test]
    fn test_decode_requests() {
        let url = Url::socket_only(NameHash::of("main"));
        let decode = |name: &str| ProxyRequest::from_message(&Message::new(url, url, name)).unwrap();
        assert_eq!(decode(ids::LOAD), Some(ProxyRequest::Load));
        assert_eq!(decode(ids::ASYNC_LOAD), Some(ProxyRequest::AsyncLoad));
        assert_eq!(decode(ids::FINAL), Some(ProxyRequest::Final));
        assert_eq!(decode(ids::RESET_TIME_STEP), Some(ProxyRequest::ResetTimeStep));
        assert_eq!(decode("jump"), None);

        let message = Message::with_payload(url, url, ids::SET_TIME_STEP, &SetTimeStep { factor: 0.5, mode: 1 }).unwrap();
        assert_eq!(
            ProxyRequest::from_message(&message).unwrap(),
            Some(ProxyRequest::SetTimeStep { factor: 0.5, mode: 1 })
        );
    }

    #[test]
    fn test_set_time_step_without_payload() {
        let url = Url::socket_only(NameHash::of("main"));
        let message = Message::new(url, url, ids::SET_TIME_STEP);
        assert!(matches!(
            ProxyRequest::from_message(&message),
            Err(MessageError::MissingPayload(_))
        ));
    }

    #[test]
    fn test_messages_drive_proxy() {
        let probe = Probe::default();
        let ctx = context(GamesysConfig::default()).with_builder(Arc::new(ProbeBuilder::new(probe.clone())));
        let socket = ctx.bus.new_socket("main").unwrap();
        let mut world = CollectionProxyWorld::new(ctx.clone(), 4);
        let receiver = proxy_url(socket, "/loader", "proxy");
        let requester = proxy_url(socket, "/script", "");
        let resource = ctx.resources.acquire("/level.collectionproxyc").unwrap();
        let proxy = world.create(resource, receiver).unwrap();
        world.add_to_update(proxy).unwrap();

        world.on_message(proxy, &Message::new(requester, receiver, ids::LOAD)).unwrap();
        let replies = ctx.bus.drain(socket);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].is(ids::PROXY_LOADED));
        assert_eq!(replies[0].receiver, requester);

        world.on_message(proxy, &Message::new(requester, receiver, ids::ENABLE)).unwrap();
        assert_eq!(probe.inits(), 1);
        assert_eq!(world.activation(proxy), Some(Activation::PendingEnable));

        let step = SetTimeStep { factor: 2.0, mode: 0 };
        let message = Message::with_payload(requester, receiver, ids::SET_TIME_STEP, &step).unwrap();
        world.on_message(proxy, &message).unwrap();
        world.update(&UpdateContext::new(0.5, 0));
        assert_eq!(probe.updates()[0].dt, 1.0);

        // Rejected requests are dropped without an error or a reply.
        world.on_message(proxy, &Message::new(requester, receiver, ids::LOAD)).unwrap();
        let bad_mode = SetTimeStep { factor: 1.0, mode: 7 };
        let message = Message::with_payload(requester, receiver, ids::SET_TIME_STEP, &bad_mode).unwrap();
        world.on_message(proxy, &message).unwrap();
        assert_eq!(ctx.bus.pending(socket), 0);
        assert_eq!(world.time_step(proxy).unwrap().factor, 2.0);

        world.on_message(proxy, &Message::new(requester, receiver, ids::UNLOAD)).unwrap();
        assert_eq!(ctx.bus.pending(socket), 0);
        world.update(&UpdateContext::new(0.5, 1));
        let replies = ctx.bus.drain(socket);
        assert_eq!(replies.len(), 1);
        assert!(replies[0].is(ids::PROXY_UNLOADED));
    }
}
