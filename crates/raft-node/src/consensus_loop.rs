//! The consensus loop (C4): the single point of contact with the consensus
//! engine. All entry points that touch the engine — the 100ms ticker, the
//! bounded proposal forwarder, and inbound peer steps from C5 — lock the
//! same engine handle, mutate it, and drain every available Ready batch
//! before releasing the lock. This keeps "a single logical actor owns all
//! engine interaction" true even though raft-rs's `RawNode` itself has no
//! internal synchronization (SPEC_FULL.md §4.4, §5).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use raft::prelude::{ConfChange, EntryType, Message};
use protobuf::Message as ProtoMessage;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};

use crate::consensus::{ConsensusEngine, EngineError, EngineStatus, ReadyBatch};
use crate::kv_store::KvStore;
use crate::pending::{ApplyResult, PendingTable};
use crate::transport::PeerTransport;

/// Bound on the propose channel (§5): HTTP handlers never block on it.
pub const PROPOSE_CHANNEL_CAPACITY: usize = 1024;

/// Wire shape of a log entry's data field for normal entries (§3, §6):
/// `{"id": "...", "payload": "<base64>"}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    #[serde(with = "base64_payload")]
    pub payload: Vec<u8>,
}

mod base64_payload {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Shared context the ready-drain logic needs on every invocation,
/// regardless of which task triggered it.
#[derive(Clone)]
pub struct ConsensusContext {
    pub kv_store: Arc<KvStore>,
    pub pending: Arc<PendingTable>,
    pub transport: Arc<PeerTransport>,
    pub leader_hint: Arc<AtomicU64>,
}

pub type EngineHandle = Arc<Mutex<Box<dyn ConsensusEngine>>>;

/// Handle returned to the rest of the node: the engine lock (for `/raft`
/// and `/status`), and the propose channel sender (for `/op`).
pub struct Consensus {
    engine: EngineHandle,
    ctx: ConsensusContext,
    propose_tx: mpsc::Sender<Vec<u8>>,
}

impl Consensus {
    pub fn spawn(
        engine: Box<dyn ConsensusEngine>,
        ctx: ConsensusContext,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let engine: EngineHandle = Arc::new(Mutex::new(engine));
        let (propose_tx, propose_rx) = mpsc::channel(PROPOSE_CHANNEL_CAPACITY);

        spawn_ticker(engine.clone(), ctx.clone(), shutdown.clone());
        spawn_forwarder(engine.clone(), ctx.clone(), propose_rx, shutdown);

        Self {
            engine,
            ctx,
            propose_tx,
        }
    }

    pub fn propose_sender(&self) -> mpsc::Sender<Vec<u8>> {
        self.propose_tx.clone()
    }

    pub fn leader_hint(&self) -> Arc<AtomicU64> {
        self.ctx.leader_hint.clone()
    }

    /// Delivers an inbound peer message (§4.5 `POST /raft`).
    pub async fn step(&self, msg: Message) -> Result<(), EngineError> {
        let mut guard = self.engine.lock().await;
        guard.step(msg)?;
        drain(guard.as_mut(), &self.ctx).await;
        Ok(())
    }

    /// Synchronous status snapshot (§4.5 `GET /status`). Also refreshes the
    /// leader hint, matching the Go original's `handleStatus`.
    pub async fn status(&self) -> EngineStatus {
        let status = self.engine.lock().await.status();
        if status.leader_id != 0 {
            self.ctx.leader_hint.store(status.leader_id, Ordering::Release);
        }
        status
    }
}

fn spawn_ticker(engine: EngineHandle, ctx: ConsensusContext, mut shutdown: watch::Receiver<bool>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let mut guard = engine.lock().await;
                    guard.tick();
                    drain(guard.as_mut(), &ctx).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("ticker task stopping");
                        break;
                    }
                }
            }
        }
    });
}

fn spawn_forwarder(
    engine: EngineHandle,
    ctx: ConsensusContext,
    mut propose_rx: mpsc::Receiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = propose_rx.recv() => {
                    match received {
                        Some(data) => {
                            let mut guard = engine.lock().await;
                            if let Err(e) = guard.propose(data) {
                                tracing::warn!(error = %e, "propose failed, client will time out");
                            }
                            drain(guard.as_mut(), &ctx).await;
                        }
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("proposal forwarder task stopping");
                        break;
                    }
                }
            }
        }
    });
}

/// Drains every Ready batch currently available, applying each in full
/// (§4.4 steps 1-7) before asking the engine for the next one.
async fn drain(engine: &mut dyn ConsensusEngine, ctx: &ConsensusContext) {
    while engine.has_ready() {
        let Some(batch) = engine.ready() else {
            break;
        };
        apply_ready_batch(engine, batch, ctx).await;
        engine.advance();
    }
}

async fn apply_ready_batch(
    engine: &mut dyn ConsensusEngine,
    batch: ReadyBatch,
    ctx: &ConsensusContext,
) {
    tracing::debug!(
        entries = batch.entries.len(),
        committed = batch.committed_entries.len(),
        messages = batch.messages.len(),
        "draining ready batch"
    );

    if let Some(soft_state) = &batch.soft_state {
        if soft_state.leader_id != 0 {
            ctx.leader_hint.store(soft_state.leader_id, Ordering::Release);
        }
    }

    if !batch.messages.is_empty() {
        ctx.transport.send(batch.messages).await;
    }

    for entry in batch.committed_entries {
        match entry.get_entry_type() {
            EntryType::EntryConfChange | EntryType::EntryConfChangeV2 => {
                if entry.data.is_empty() {
                    continue;
                }
                match ConfChange::parse_from_bytes(&entry.data) {
                    Ok(cc) => {
                        if let Err(e) = engine.apply_conf_change(cc) {
                            tracing::error!(error = %e, "failed to apply committed conf change");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "malformed committed conf change, skipping");
                    }
                }
            }
            EntryType::EntryNormal => {
                if entry.data.is_empty() {
                    // No-op barrier entry from a leader transition.
                    continue;
                }
                match serde_json::from_slice::<Proposal>(&entry.data) {
                    Ok(proposal) => {
                        ctx.kv_store.apply(&proposal.payload);
                        ctx.pending.complete(&proposal.id, ApplyResult::Ok);
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            index = entry.index,
                            "malformed committed proposal, skipping"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeerDirectory;
    use crate::consensus::fake::FakeEngine;
    use raft::prelude::{Entry, SoftState};

    fn ctx() -> ConsensusContext {
        ConsensusContext {
            kv_store: Arc::new(KvStore::new()),
            pending: Arc::new(PendingTable::new()),
            transport: Arc::new(PeerTransport::new(1, Arc::new(PeerDirectory::default())).unwrap()),
            leader_hint: Arc::new(AtomicU64::new(0)),
        }
    }

    fn normal_entry(data: Vec<u8>) -> Entry {
        let mut entry = Entry::default();
        entry.set_entry_type(EntryType::EntryNormal);
        entry.data = data.into();
        entry
    }

    #[tokio::test]
    async fn committed_normal_entry_applies_before_notifying_pending() {
        let ctx = ctx();
        let rx = ctx.pending.register("req-1".to_string());

        let proposal = Proposal {
            id: "req-1".to_string(),
            payload: b"hello".to_vec(),
        };
        let data = serde_json::to_vec(&proposal).unwrap();

        let mut batch = ReadyBatch::default();
        batch.committed_entries.push(normal_entry(data));

        let mut engine = FakeEngine::default();
        apply_ready_batch(&mut engine, batch, &ctx).await;

        assert_eq!(ctx.kv_store.count(), 1);
        match rx.await.unwrap() {
            ApplyResult::Ok => {}
            ApplyResult::Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[tokio::test]
    async fn empty_data_normal_entry_is_skipped() {
        let ctx = ctx();
        let mut batch = ReadyBatch::default();
        batch.committed_entries.push(normal_entry(Vec::new()));

        let mut engine = FakeEngine::default();
        apply_ready_batch(&mut engine, batch, &ctx).await;

        assert_eq!(ctx.kv_store.count(), 0);
    }

    #[tokio::test]
    async fn malformed_proposal_json_is_skipped_without_panicking() {
        let ctx = ctx();
        let mut batch = ReadyBatch::default();
        batch.committed_entries.push(normal_entry(b"not json".to_vec()));

        let mut engine = FakeEngine::default();
        apply_ready_batch(&mut engine, batch, &ctx).await;

        assert_eq!(ctx.kv_store.count(), 0);
    }

    #[tokio::test]
    async fn soft_state_updates_leader_hint() {
        let ctx = ctx();
        let mut batch = ReadyBatch::default();
        let mut ss = SoftState::default();
        ss.leader_id = 7;
        batch.soft_state = Some(ss);

        let mut engine = FakeEngine::default();
        apply_ready_batch(&mut engine, batch, &ctx).await;

        assert_eq!(ctx.leader_hint.load(Ordering::Acquire), 7);
    }
}
