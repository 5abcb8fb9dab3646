//! Cross-process event bus between the agent and its clients.
//!
//! The bus provides:
//! - Typed envelopes with a wire discriminant per payload shape
//! - Fire-and-forget publish
//! - Request/acknowledgment with a per-request deadline
//! - Per-kind handler dispatch on the receiving side
//!
//! # Architecture
//!
//! Envelopes flow from publisher → Transport → EventBus → EventRouter:
//! - `Transport`: best-effort broadcast of encoded envelopes to every other
//!   endpoint on the channel (loopback socket or in-process hub)
//! - `EventBus`: encodes/decodes envelopes, answers acknowledgment requests,
//!   correlates replies with pending requests
//! - `EventRouter`: one handler per event kind, last registration wins

mod ack;
mod envelope;
mod error;
mod event_bus;
mod event_types;
mod router;
mod transport;

pub use ack::{AckCallback, AckTable};
pub use envelope::Envelope;
pub use error::BusError;
pub use event_bus::{BusRole, EventBus, DEFAULT_ACK_TIMEOUT};
pub use event_types::*;
pub use router::EventRouter;
pub use transport::{
    port_for_channel, LinkRole, LocalEndpoint, LocalHub, SocketTransport, Transport,
};
