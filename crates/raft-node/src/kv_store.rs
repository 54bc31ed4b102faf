//! The replicated state machine (C1): an append-only list of opaque byte
//! payloads, applied one per committed normal log entry, in commit order.

use parking_lot::RwLock;

/// Concurrent-safe, in-memory append log of applied payloads.
#[derive(Default)]
pub struct KvStore {
    entries: RwLock<Vec<Vec<u8>>>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a defensive copy of `payload` to the tail. Zero-length
    /// payloads are permitted.
    pub fn apply(&self, payload: &[u8]) {
        self.entries.write().push(payload.to_vec());
    }

    /// Current number of applied entries.
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn apply_then_count() {
        let store = KvStore::new();
        assert_eq!(store.count(), 0);
        store.apply(b"hello");
        store.apply(b"");
        store.apply(b"world");
        assert_eq!(store.count(), 3);
    }

    #[test]
    fn apply_copies_caller_buffer() {
        let store = KvStore::new();
        let mut buf = b"mutate-me".to_vec();
        store.apply(&buf);
        buf[0] = b'X';
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn concurrent_apply_is_serialized() {
        let store = Arc::new(KvStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    store.apply(b"x");
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.count(), 400);
    }
}
