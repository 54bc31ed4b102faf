//! Peer transport (C2): best-effort delivery of outbound consensus messages
//! to the rest of the cluster over HTTP.

use std::sync::Arc;
use std::time::Duration;

use protobuf::Message as ProtoMessage;
use raft::prelude::Message;
use reqwest::Client;

use crate::config::PeerDirectory;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to build http client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

/// Sends marshalled consensus messages to peer `/raft` endpoints. Delivery
/// is best-effort: every failure mode (missing peer, marshal error,
/// network error, non-2xx response) is logged and otherwise ignored —
/// retries are the engine's responsibility (§4.3).
pub struct PeerTransport {
    local_id: u64,
    client: Client,
    peers: Arc<PeerDirectory>,
}

impl PeerTransport {
    pub fn new(local_id: u64, peers: Arc<PeerDirectory>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(32)
            .user_agent(concat!("raft-node/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            local_id,
            client,
            peers,
        })
    }

    fn is_self(&self, to: u64) -> bool {
        to == self.local_id
    }

    pub async fn send(&self, messages: Vec<Message>) {
        for msg in messages {
            if self.is_self(msg.to) {
                continue;
            }
            self.send_one(msg).await;
        }
    }

    async fn send_one(&self, msg: Message) {
        let to = msg.to;
        let Some(url) = self.peers.advertise_url(to) else {
            tracing::warn!(peer = to, "no address for peer, dropping message");
            return;
        };

        let bytes = match msg.write_to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(peer = to, error = %e, "failed to marshal consensus message");
                return;
            }
        };

        let endpoint = format!("{url}/raft");
        match self
            .client
            .post(&endpoint)
            .header("content-type", "application/protobuf")
            .body(bytes)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                tracing::warn!(peer = to, status = %resp.status(), "peer rejected message");
            }
            Err(e) => {
                tracing::warn!(peer = to, error = %e, "failed to deliver message to peer");
            }
        }
    }
}
