use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::ack::AckTable;
use super::envelope::Envelope;
use super::error::BusError;
use super::event_types::{EventKind, EventPayload, IsAgentLaunched};
use super::router::EventRouter;
use super::transport::Transport;

pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Which side of the channel this process is. Only the agent answers
/// liveness probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusRole {
    Agent,
    Client,
}

pub struct EventBus {
    transport: Arc<dyn Transport>,
    role: BusRole,
    router: EventRouter,
    acks: AckTable,
    ack_timeout: Duration,
    runtime: Handle,
}

impl EventBus {
    /// Must be called from within a Tokio runtime; acknowledgment timers and
    /// the receive loop are spawned on it.
    pub fn new(transport: Arc<dyn Transport>, role: BusRole) -> Result<Self, BusError> {
        let runtime = Handle::try_current().map_err(|e| BusError::Runtime(e.to_string()))?;
        Ok(Self {
            transport,
            role,
            router: EventRouter::new(),
            acks: AckTable::new(),
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            runtime,
        })
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    pub fn role(&self) -> BusRole {
        self.role
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn pending_acks(&self) -> usize {
        self.acks.len()
    }

    /// Register the handler for `P`'s kind, replacing any previous one.
    pub fn on<P, F>(&self, handler: F)
    where
        P: EventPayload,
        F: Fn(P) + Send + Sync + 'static,
    {
        self.router.on::<P, F>(handler);
    }

    /// Fire-and-forget publish. Returns the envelope's correlation id.
    pub fn publish<P: EventPayload>(&self, payload: &P) -> Result<Uuid, BusError> {
        let envelope = Envelope::new(Uuid::new_v4(), payload, false)?;
        self.send_envelope(&envelope)?;
        tracing::trace!("published {} {}", envelope.kind, envelope.id);
        Ok(envelope.id)
    }

    /// Publish asking for an acknowledgment. `on_result` runs exactly once:
    /// with `Ok` when the first acknowledgment arrives, or with an error on
    /// timeout or when the envelope could not be sent.
    pub fn publish_with_ack<P, F>(&self, payload: &P, on_result: F) -> Uuid
    where
        P: EventPayload,
        F: FnOnce(Result<(), BusError>) + Send + 'static,
    {
        let id = Uuid::new_v4();
        let envelope = match Envelope::new(id, payload, true) {
            Ok(envelope) => envelope,
            Err(e) => {
                on_result(Err(e));
                return id;
            }
        };

        // Register before sending so a fast reply finds its entry.
        self.acks
            .register(&self.runtime, id, self.ack_timeout, Box::new(on_result));
        if let Err(e) = self.send_envelope(&envelope) {
            tracing::warn!("failed to publish {}: {e}", envelope.kind);
            self.acks.fail(id, e);
        }
        id
    }

    /// Async form of [`EventBus::publish_with_ack`].
    pub async fn request<P: EventPayload>(&self, payload: &P) -> Result<(), BusError> {
        let (tx, rx) = oneshot::channel();
        self.publish_with_ack(payload, move |result| {
            let _ = tx.send(result);
        });
        rx.await
            .map_err(|_| BusError::Runtime("acknowledgment callback dropped".into()))?
    }

    /// Liveness probe: true iff some agent acknowledged within the timeout.
    pub async fn is_agent_launched(&self) -> bool {
        match self.request(&IsAgentLaunched {}).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("agent liveness probe failed: {e}");
                false
            }
        }
    }

    /// Handle one raw message from the transport.
    pub fn on_receive(&self, raw: &str) {
        let envelope = match Envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::trace!("dropping undecodable envelope: {e}");
                return;
            }
        };

        if envelope.is_acknowledgment() {
            if !self.acks.resolve(envelope.id) {
                tracing::trace!("ignoring acknowledgment for unknown id {}", envelope.id);
            }
            return;
        }

        let should_ack = match envelope.kind {
            EventKind::IsAgentLaunched => self.role == BusRole::Agent,
            _ => envelope.wants_ack,
        };
        if should_ack {
            if let Err(e) = self.send_envelope(&Envelope::acknowledgment(envelope.id)) {
                tracing::warn!("failed to acknowledge {}: {e}", envelope.id);
            }
        }

        if !self.router.dispatch(envelope.kind, &envelope.payload) {
            tracing::trace!("no handler ran for {}", envelope.kind);
        }
    }

    /// Spawn the receive loop feeding [`EventBus::on_receive`]. The
    /// subscription is taken before this returns, so nothing sent afterwards
    /// is missed.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.transport.subscribe();
        let bus = Arc::clone(self);
        self.runtime.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(raw) => bus.on_receive(&raw),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("event bus receiver lagged, dropped {n} messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("event bus transport closed");
                        break;
                    }
                }
            }
        })
    }

    fn send_envelope(&self, envelope: &Envelope) -> Result<(), BusError> {
        self.transport.send(envelope.encode()?)
    }
}
