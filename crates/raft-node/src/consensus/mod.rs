//! The consensus engine contract (C4, §4.2): a black-box Ready/Advance
//! collaborator. This module defines the trait only; [`raft_engine`] adapts
//! a real implementation to it.

pub mod raft_engine;

use raft::prelude::{ConfChange, Entry, HardState, Message, Snapshot, SoftState};

/// Everything the host must do before calling [`ConsensusEngine::advance`]
/// once per batch.
#[derive(Default)]
pub struct ReadyBatch {
    pub entries: Vec<Entry>,
    pub hard_state: Option<HardState>,
    pub snapshot: Option<Snapshot>,
    pub soft_state: Option<SoftState>,
    pub messages: Vec<Message>,
    pub committed_entries: Vec<Entry>,
}

/// Synchronous snapshot of engine status (§4.5 `/status`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub leader_id: u64,
    pub term: u64,
    pub commit: u64,
}

/// Errors surfaced by the engine adapter's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("propose rejected: {0}")]
    Propose(String),
    #[error("step rejected: {0}")]
    Step(String),
    #[error("conf change rejected: {0}")]
    ApplyConfChange(String),
}

/// The Ready/Advance consensus engine contract from SPEC_FULL.md §4.2.
///
/// Held behind a single `tokio::sync::Mutex` inside the consensus loop
/// (C4) as `Box<dyn ConsensusEngine>` — every entry point that can touch
/// the engine (the ticker, the proposal forwarder, and inbound `/raft`
/// steps from C5) locks the same instance, so "a single logical actor
/// owns all engine interaction" holds even though `raft-rs`'s `RawNode`
/// has no internal synchronization of its own.
pub trait ConsensusEngine: Send {
    /// Advance logical time by one step. Invoked at a fixed 100ms cadence.
    fn tick(&mut self);

    /// Offer a log entry for replication. May fail if not leader or the
    /// engine's internal queue is full; the engine may still commit it
    /// after internally forwarding to the leader.
    fn propose(&mut self, data: Vec<u8>) -> Result<(), EngineError>;

    /// Deliver an inbound peer message.
    fn step(&mut self, msg: Message) -> Result<(), EngineError>;

    /// Acknowledge a committed membership change.
    fn apply_conf_change(&mut self, cc: ConfChange) -> Result<(), EngineError>;

    /// True if a Ready batch is available without blocking.
    fn has_ready(&self) -> bool;

    /// Produce the next Ready batch, if any. Persisting entries/hard-state
    /// before acting on `messages` is the caller's responsibility (§4.4).
    fn ready(&mut self) -> Option<ReadyBatch>;

    /// Signal that the last Ready batch returned by [`Self::ready`] has
    /// been fully processed. Must be called exactly once per Ready.
    fn advance(&mut self);

    /// Synchronous snapshot of leader, term, commit index.
    fn status(&self) -> EngineStatus;
}
