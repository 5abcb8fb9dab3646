//! Mock transport for exercising acknowledgment edge cases.

use std::sync::Mutex;

use tokio::sync::broadcast;

use livepreview_lib::bus::{BusError, Envelope, Transport};

/// Records what is sent, delivers nothing, and can be told to refuse sends.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<String>>,
    refuse: Mutex<Option<String>>,
    inbound: Mutex<Option<broadcast::Sender<String>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail with `message`.
    pub fn refuse_sends(&self, message: impl Into<String>) {
        *self.refuse.lock().unwrap() = Some(message.into());
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|raw| Envelope::decode(raw).ok())
            .collect()
    }

    /// Hand `raw` to the bus as if another process had sent it.
    pub fn deliver(&self, raw: &str) {
        if let Some(tx) = self.inbound.lock().unwrap().as_ref() {
            let _ = tx.send(raw.to_string());
        }
    }
}

impl Transport for MockTransport {
    fn send(&self, raw: String) -> Result<(), BusError> {
        if let Some(message) = self.refuse.lock().unwrap().clone() {
            return Err(BusError::Transport(message));
        }
        self.sent.lock().unwrap().push(raw);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        let mut guard = self.inbound.lock().unwrap();
        guard
            .get_or_insert_with(|| broadcast::channel(64).0)
            .subscribe()
    }
}
