//! # Raft Node
//!
//! A replicated state-machine server: an external Ready/Advance consensus
//! engine replicates opaque byte payloads across a small fixed cluster, and
//! this crate supplies everything around it — the proposal pipeline, commit
//! demultiplexing, leader-aware client routing, peer transport, and the HTTP
//! surface clients and peers talk to.
//!
//! ```text
//!        client                        peer nodes
//!          │                                │
//!          ▼                                ▼
//!   POST /op (C5)                    POST /raft (C5)
//!          │                                │
//!          ▼                                ▼
//!  pending table (C3) ◄──── consensus loop (C4) ────► peer transport (C2)
//!          ▲                      │      ▲
//!          │                      ▼      │
//!          └──────────────── kv store (C1)
//! ```

pub mod config;
pub mod consensus;
pub mod consensus_loop;
pub mod kv_store;
pub mod observability;
pub mod pending;
pub mod transport;

pub mod api;
