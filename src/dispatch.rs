//! Application dispatch (§4.7).
//!
//! Reserved types (`HANDSHAKE`, `PEER_LIST`, `NETWORK_UPDATE`) never reach
//! this registry — the peer node handles them inline. Everything else
//! (`MESSAGE`, `PEST_ALERT`, collaborator-registered types) is looked up
//! by `message_type` and invoked at most once per `message_id` (dedup
//! happens one layer up, in the node's `SeenSet`).
//!
//! Grounded on the teacher's event/command split
//! (`freeq-sdk/src/event.rs` + `freeq-sdk/src/client.rs`): there, the SDK
//! hands the UI layer an `mpsc::Receiver<Event>`; here, collaborators
//! register a closure directly since handlers must run inline and
//! return quickly (§5: "Protocol handlers are CPU-only and
//! non-suspending").

use std::collections::HashMap;
use std::sync::Arc;

use crate::message::{message_type, Message};

/// A registered handler. Boxed so the registry can hold handlers of
/// different closure types for different message types.
pub type Handler = Arc<dyn Fn(Message) + Send + Sync>;

/// `message_type` → handler. Registering the same type twice replaces
/// the previous handler; that is not an error (spec.md §2: "pluggable
/// handlers").
#[derive(Default)]
pub struct Dispatch {
    handlers: HashMap<String, Handler>,
}

impl Dispatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserved types (`HANDSHAKE`/`PEER_LIST`/`NETWORK_UPDATE`) are handled
    /// internally by the peer node and never reach this registry, so a
    /// handler registered for one would simply never fire; reject it here
    /// rather than let it sit dead.
    pub fn on<F>(&mut self, message_type: impl Into<String>, handler: F)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let message_type = message_type.into();
        if message_type::is_reserved(&message_type) {
            tracing::warn!(
                %message_type,
                "refusing to register a handler for a reserved message type; it is handled internally and would never be dispatched here"
            );
            return;
        }
        self.handlers.insert(message_type, Arc::new(handler));
    }

    /// Invoke the handler registered for `message.message_type`, if any.
    /// An unregistered type is logged and dropped — not an error.
    pub fn dispatch(&self, message: Message) {
        match self.handlers.get(&message.message_type) {
            Some(handler) => handler(message),
            None => {
                tracing::debug!(
                    message_type = %message.message_type,
                    message_id = %message.message_id,
                    "no handler registered for message type, dropping"
                );
            }
        }
    }

    pub fn has_handler(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::message_type;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample() -> Message {
        Message::new(
            "peerA".to_string(),
            None,
            message_type::MESSAGE,
            serde_json::Map::new(),
        )
    }

    #[test]
    fn dispatches_to_registered_handler() {
        let mut d = Dispatch::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        d.on(message_type::MESSAGE, move |_m| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        d.dispatch(sample());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_type_is_dropped_without_panic() {
        let d = Dispatch::new();
        d.dispatch(sample());
    }

    #[test]
    fn registering_a_reserved_type_is_refused() {
        let mut d = Dispatch::new();
        d.on(message_type::HANDSHAKE, |_| panic!("should never be invoked"));
        assert!(!d.has_handler(message_type::HANDSHAKE));
    }

    #[test]
    fn re_registering_replaces_the_handler() {
        let mut d = Dispatch::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c1 = calls.clone();
        d.on(message_type::MESSAGE, move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = calls.clone();
        d.on(message_type::MESSAGE, move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        });
        d.dispatch(sample());
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }
}
