//! The pending table (C3): correlates an outstanding client write with the
//! commit notification that will eventually (or never) arrive for it.
//!
//! The table holds the lock only long enough to mutate the map; it is never
//! held across a channel send, so the ready-drain task (C4) and HTTP handler
//! tasks (C5) never block on each other beyond a single map operation.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Outcome delivered to a waiting client once its proposal commits.
#[derive(Debug, Clone)]
pub enum ApplyResult {
    Ok,
    Err(String),
}

/// `id -> completion slot` map. An id is present iff a client awaits its
/// commit and no commit has yet been delivered for it.
#[derive(Default)]
pub struct PendingTable {
    slots: Mutex<HashMap<String, oneshot::Sender<ApplyResult>>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id`, returning the receiver half the caller should await.
    pub fn register(&self, id: String) -> oneshot::Receiver<ApplyResult> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(id, tx);
        rx
    }

    /// Delivers `result` to the waiter for `id`, if one is still registered.
    /// A waiter that has already timed out and dropped its receiver is
    /// silently ignored — the entry is already committed regardless.
    pub fn complete(&self, id: &str, result: ApplyResult) {
        let sender = self.slots.lock().remove(id);
        if let Some(sender) = sender {
            let _ = sender.send(result);
        }
    }

    /// Removes `id` without signalling anyone, used on client-side timeout.
    /// Best-effort: a concurrent commit may have already removed it.
    pub fn evict(&self, id: &str) {
        self.slots.lock().remove(id);
    }

    /// Number of proposals currently awaiting commit.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_complete_wakes_waiter() {
        let table = PendingTable::new();
        let rx = table.register("abc".to_string());
        assert_eq!(table.len(), 1);

        table.complete("abc", ApplyResult::Ok);
        assert_eq!(table.len(), 0);

        match rx.await.unwrap() {
            ApplyResult::Ok => {}
            ApplyResult::Err(e) => panic!("unexpected error result: {e}"),
        }
    }

    #[tokio::test]
    async fn register_then_evict_drops_silently() {
        let table = PendingTable::new();
        let rx = table.register("abc".to_string());
        table.evict("abc");
        assert!(table.is_empty());
        assert!(rx.await.is_err());
    }

    #[test]
    fn complete_on_unknown_id_is_noop() {
        let table = PendingTable::new();
        table.complete("never-registered", ApplyResult::Ok);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn double_complete_second_call_is_noop() {
        let table = PendingTable::new();
        let rx = table.register("abc".to_string());
        table.complete("abc", ApplyResult::Ok);
        // Second complete for the same id: nothing registered anymore.
        table.complete("abc", ApplyResult::Err("late".to_string()));
        match rx.await.unwrap() {
            ApplyResult::Ok => {}
            ApplyResult::Err(e) => panic!("unexpected error result: {e}"),
        }
    }
}
