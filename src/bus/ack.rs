use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::runtime::Handle;
use uuid::Uuid;

use super::error::BusError;

pub type AckCallback = Box<dyn FnOnce(Result<(), BusError>) + Send + 'static>;

struct PendingAck {
    // Taken once, on removal.
    callback: Mutex<AckCallback>,
    deadline: Instant,
}

/// Outstanding acknowledgment requests keyed by correlation id.
///
/// Whichever of [`AckTable::resolve`] and the deadline timer removes the
/// entry first runs its callback; the other finds nothing and does nothing.
#[derive(Clone, Default)]
pub struct AckTable {
    pending: Arc<DashMap<Uuid, PendingAck>>,
}

impl AckTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `id` and arm its deadline timer on `runtime`.
    /// A second registration for a live id fails the new callback instead of
    /// replacing the first.
    pub fn register(&self, runtime: &Handle, id: Uuid, timeout: Duration, callback: AckCallback) {
        let rejected = match self.pending.entry(id) {
            Entry::Occupied(_) => Some(callback),
            Entry::Vacant(slot) => {
                slot.insert(PendingAck {
                    callback: Mutex::new(callback),
                    deadline: Instant::now() + timeout,
                });
                None
            }
        };
        if let Some(callback) = rejected {
            callback(Err(BusError::Encode(format!(
                "acknowledgment already pending for {id}"
            ))));
            return;
        }

        let table = self.clone();
        runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if table.complete(id, Err(BusError::AckTimeout(timeout))) {
                tracing::debug!("acknowledgment for {id} timed out");
            }
        });
    }

    /// Resolve `id` successfully. Returns false for unknown ids, which covers
    /// both duplicates and acknowledgments arriving after the timeout.
    pub fn resolve(&self, id: Uuid) -> bool {
        self.complete(id, Ok(()))
    }

    /// Fail `id` early, e.g. when the request could not be sent.
    pub fn fail(&self, id: Uuid, error: BusError) -> bool {
        self.complete(id, Err(error))
    }

    pub fn is_pending(&self, id: &Uuid) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn deadline(&self, id: &Uuid) -> Option<Instant> {
        self.pending.get(id).map(|entry| entry.deadline)
    }

    fn complete(&self, id: Uuid, result: Result<(), BusError>) -> bool {
        // The callback runs after the shard lock is released.
        match self.pending.remove(&id) {
            Some((_, entry)) => {
                let callback = entry
                    .callback
                    .into_inner()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                callback(result);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<Result<(), BusError>>>>, AckCallback) {
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = results.clone();
        let callback: AckCallback = Box::new(move |result| sink.lock().unwrap().push(result));
        (results, callback)
    }

    #[tokio::test]
    async fn resolve_fires_once_and_disarms_timeout() {
        let table = AckTable::new();
        let id = Uuid::new_v4();
        let (results, callback) = recorder();
        table.register(&Handle::current(), id, Duration::from_millis(30), callback);
        assert!(table.is_pending(&id));
        assert!(table.deadline(&id).is_some());

        assert!(table.resolve(id));
        assert!(!table.resolve(id));
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(*results.lock().unwrap(), vec![Ok(())]);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn timeout_fires_once_and_late_ack_is_ignored() {
        let table = AckTable::new();
        let id = Uuid::new_v4();
        let (results, callback) = recorder();
        table.register(&Handle::current(), id, Duration::from_millis(20), callback);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!table.resolve(id));

        let results = results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(BusError::AckTimeout(_))));
    }

    #[tokio::test]
    async fn duplicate_registration_fails_new_callback_only() {
        let table = AckTable::new();
        let id = Uuid::new_v4();
        let (first, callback) = recorder();
        table.register(&Handle::current(), id, Duration::from_secs(5), callback);
        let (second, callback) = recorder();
        table.register(&Handle::current(), id, Duration::from_secs(5), callback);

        assert_eq!(second.lock().unwrap().len(), 1);
        assert!(first.lock().unwrap().is_empty());
        assert!(table.resolve(id));
        assert_eq!(*first.lock().unwrap(), vec![Ok(())]);
    }
}
