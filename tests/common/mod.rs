//! Common test utilities for bus integration tests.

#![allow(dead_code)]

pub mod mock_transport;

use std::net::{Ipv4Addr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use livepreview_lib::bus::{BusRole, EventBus, LocalHub};

pub use mock_transport::MockTransport;

pub const SHORT_ACK_TIMEOUT: Duration = Duration::from_millis(150);

/// A started bus attached to `hub`.
pub fn local_bus(hub: &LocalHub, role: BusRole) -> Arc<EventBus> {
    let bus = EventBus::new(Arc::new(hub.endpoint()), role)
        .expect("bus needs a runtime")
        .with_ack_timeout(SHORT_ACK_TIMEOUT);
    let bus = Arc::new(bus);
    bus.start();
    bus
}

/// A loopback port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}
