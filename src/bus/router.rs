use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::envelope::decode_payload;
use super::event_types::{EventKind, EventPayload};

type Handler = Arc<dyn Fn(&serde_json::Value) -> bool + Send + Sync>;

/// Per-kind dispatch table. One handler per kind; registering again replaces
/// the previous handler.
#[derive(Clone, Default)]
pub struct EventRouter {
    handlers: Arc<RwLock<HashMap<EventKind, Handler>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<P, F>(&self, handler: F)
    where
        P: EventPayload,
        F: Fn(P) + Send + Sync + 'static,
    {
        let erased: Handler = Arc::new(move |raw: &serde_json::Value| {
            match decode_payload::<P>(raw) {
                Ok(payload) => {
                    handler(payload);
                    true
                }
                Err(e) => {
                    tracing::debug!("dropping {} payload with unexpected shape: {e}", P::KIND);
                    false
                }
            }
        });
        let mut guard = self.handlers.write().expect("event router lock poisoned");
        if guard.insert(P::KIND, erased).is_some() {
            tracing::trace!("replaced handler for {}", P::KIND);
        }
    }

    /// Invoke the handler for `kind` synchronously. Returns whether a handler
    /// ran; a missing handler or a payload of the wrong shape is a no-op.
    pub fn dispatch(&self, kind: EventKind, payload: &serde_json::Value) -> bool {
        // Clone out of the lock so a handler may register other handlers.
        let handler = {
            let guard = self.handlers.read().expect("event router lock poisoned");
            guard.get(&kind).cloned()
        };
        match handler {
            Some(handler) => handler(payload),
            None => false,
        }
    }
}
