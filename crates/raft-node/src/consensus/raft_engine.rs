//! Adapts `tikv/raft-rs`'s `RawNode`/`MemStorage` to the [`ConsensusEngine`]
//! contract (SPEC_FULL.md §4.2). Any mature Ready/Advance implementation
//! would plug in the same way; this one was chosen because it is the
//! consensus library actually used for this role in a real production Rust
//! codebase (see DESIGN.md).

use raft::prelude::{ConfChange, ConfState, Message};
use raft::storage::MemStorage;
use raft::{Config as RaftConfig, RawNode};

use super::{ConsensusEngine, EngineError, EngineStatus, ReadyBatch};
use crate::config::NodeConfig;
use crate::observability::logging::engine_logger;

pub struct RaftEngine {
    raw_node: RawNode<MemStorage>,
}

impl RaftEngine {
    /// Bootstraps a single-shot cluster membership from `config.initial_peer_ids`.
    /// There is no separate "join an existing cluster" flow in scope
    /// (SPEC_FULL.md §1 Non-goals); membership only changes thereafter via
    /// committed conf-change entries.
    pub fn new(config: &NodeConfig) -> Result<Self, EngineError> {
        let raft_config = RaftConfig {
            id: config.id,
            election_tick: config.election_tick,
            heartbeat_tick: config.heartbeat_tick,
            max_size_per_msg: config.max_size_per_msg,
            max_inflight_msgs: config.max_inflight_msgs,
            check_quorum: true,
            pre_vote: true,
            ..Default::default()
        };

        let mut conf_state = ConfState::default();
        conf_state.voters = config.initial_peer_ids.clone();
        let storage = MemStorage::new_with_conf_state(conf_state);

        let logger = engine_logger();
        let raw_node = RawNode::new(&raft_config, storage, &logger)
            .map_err(|e| EngineError::Step(format!("failed to construct raft node: {e}")))?;

        Ok(Self { raw_node })
    }
}

impl ConsensusEngine for RaftEngine {
    fn tick(&mut self) {
        self.raw_node.tick();
    }

    fn propose(&mut self, data: Vec<u8>) -> Result<(), EngineError> {
        self.raw_node
            .propose(vec![], data)
            .map_err(|e| EngineError::Propose(e.to_string()))
    }

    fn step(&mut self, msg: Message) -> Result<(), EngineError> {
        self.raw_node
            .step(msg)
            .map_err(|e| EngineError::Step(e.to_string()))
    }

    fn apply_conf_change(&mut self, cc: ConfChange) -> Result<(), EngineError> {
        self.raw_node
            .apply_conf_change(&cc)
            .map(|_| ())
            .map_err(|e| EngineError::ApplyConfChange(e.to_string()))
    }

    fn has_ready(&self) -> bool {
        self.raw_node.has_ready()
    }

    fn ready(&mut self) -> Option<ReadyBatch> {
        if !self.raw_node.has_ready() {
            return None;
        }

        let mut ready = self.raw_node.ready();

        let entries = ready.entries().to_vec();
        let hard_state = ready.hs().cloned();
        let snapshot = if ready.snapshot().is_empty() {
            None
        } else {
            Some(ready.snapshot().clone())
        };
        let soft_state = ready.ss().cloned();

        let mut messages = ready.take_messages();
        let mut committed_entries = ready.take_committed_entries();

        // Persist before handing messages to the transport, per
        // SPEC_FULL.md §4.4 step 5. Errors against in-memory storage are
        // not expected; logged and otherwise treated as already applied,
        // preserving the "loop does not halt" failure policy of §7.
        if !ready.snapshot().is_empty() {
            if let Err(e) = self
                .raw_node
                .mut_store()
                .wl()
                .apply_snapshot(ready.snapshot().clone())
            {
                tracing::error!(error = %e, "failed to apply snapshot to in-memory storage");
            }
        }
        if !ready.entries().is_empty() {
            if let Err(e) = self.raw_node.mut_store().wl().append(ready.entries()) {
                tracing::error!(error = %e, "failed to append entries to in-memory storage");
            }
        }
        if let Some(hs) = ready.hs() {
            self.raw_node.mut_store().wl().set_hardstate(hs.clone());
        }

        let mut light_ready = self.raw_node.advance(ready);
        messages.extend(light_ready.take_messages());
        committed_entries.extend(light_ready.take_committed_entries());

        Some(ReadyBatch {
            entries,
            hard_state,
            snapshot,
            soft_state,
            messages,
            committed_entries,
        })
    }

    fn advance(&mut self) {
        self.raw_node.advance_apply();
    }

    fn status(&self) -> EngineStatus {
        let status = self.raw_node.status();
        EngineStatus {
            leader_id: status.ss.leader_id,
            term: status.hs.term,
            commit: status.hs.commit,
        }
    }
}
