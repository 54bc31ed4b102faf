//! Node assembly (C6) and configuration (C11): CLI parsing, peer-spec
//! grammar, address normalization, and the immutable [`NodeConfig`] built
//! from them.

use std::collections::HashMap;

use crate::observability::logging::LogFormat;

/// Fatal, startup-time configuration problems. Reported once and exit 1;
/// never surfaced past `main`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("node id must be non-zero")]
    InvalidId,
    #[error("malformed peer spec entry {0:?}: expected ID=ADDR")]
    MalformedPeerSpec(String),
    #[error("malformed peer id in entry {0:?}: {1}")]
    InvalidPeerId(String, std::num::ParseIntError),
    #[error("empty advertise address")]
    EmptyAddress,
}

/// `peer id -> advertise URL`. Always contains the local node's own id.
#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    entries: HashMap<u64, String>,
}

impl PeerDirectory {
    pub fn advertise_url(&self, id: u64) -> Option<&str> {
        self.entries.get(&id).map(String::as_str)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.keys().copied()
    }

    fn insert(&mut self, id: u64, advertise_url: String) {
        self.entries.insert(id, advertise_url);
    }
}

/// Immutable runtime configuration for the node binary, constructed once
/// by [`NodeConfig::build`] from parsed CLI arguments.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub id: u64,
    pub listen_addr: String,
    pub advertise_addr: String,
    pub peers: PeerDirectory,
    pub initial_peer_ids: Vec<u64>,
    pub log_level: String,
    pub log_format: LogFormat,

    // Consensus tuning fixed by SPEC_FULL.md §4.2; not independently
    // configurable from the CLI, kept here so the rest of the crate reads
    // them from one place.
    pub election_tick: usize,
    pub heartbeat_tick: usize,
    pub max_size_per_msg: u64,
    pub max_inflight_msgs: usize,
}

impl NodeConfig {
    pub fn build(
        id: u64,
        addr: &str,
        peers_spec: &str,
        log_level: String,
        log_format: LogFormat,
    ) -> Result<Self, ConfigError> {
        if id == 0 {
            return Err(ConfigError::InvalidId);
        }

        let (listen_addr, advertise_addr) = normalize_addr(addr)?;
        let mut peers = parse_peers(peers_spec)?;

        if !peers.contains(id) {
            peers.insert(id, advertise_addr.clone());
        }
        let mut initial_peer_ids: Vec<u64> = peers.ids().collect();
        initial_peer_ids.sort_unstable();

        Ok(Self {
            id,
            listen_addr,
            advertise_addr,
            peers,
            initial_peer_ids,
            log_level,
            log_format,
            election_tick: 10,
            heartbeat_tick: 1,
            max_size_per_msg: 1 << 20,
            max_inflight_msgs: 256,
        })
    }
}

/// `http://host:port` -> listen=`host:port`, advertise=full URL.
/// bare `host:port` -> listen as-is, advertise=`http://host:port`.
fn normalize_addr(raw: &str) -> Result<(String, String), ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::EmptyAddress);
    }
    if raw.contains("://") {
        let host = raw
            .split("://")
            .nth(1)
            .map(|rest| rest.split(['/', '?']).next().unwrap_or(rest))
            .unwrap_or(raw)
            .to_string();
        Ok((host, raw.to_string()))
    } else {
        Ok((raw.to_string(), format!("http://{raw}")))
    }
}

/// Comma-separated `ID=ADDR`; `ADDR` optionally carries its own scheme,
/// defaulting to `http://`.
fn parse_peers(spec: &str) -> Result<PeerDirectory, ConfigError> {
    let mut peers = PeerDirectory::default();
    for entry in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (id_str, addr) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedPeerSpec(entry.to_string()))?;
        let id: u64 = id_str
            .parse()
            .map_err(|e| ConfigError::InvalidPeerId(entry.to_string(), e))?;
        let advertise = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        };
        peers.insert(id, advertise);
    }
    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_addr_with_scheme() {
        let (listen, advertise) = normalize_addr("http://127.0.0.1:9001").unwrap();
        assert_eq!(listen, "127.0.0.1:9001");
        assert_eq!(advertise, "http://127.0.0.1:9001");
    }

    #[test]
    fn normalize_addr_bare_host_port() {
        let (listen, advertise) = normalize_addr("127.0.0.1:9001").unwrap();
        assert_eq!(listen, "127.0.0.1:9001");
        assert_eq!(advertise, "http://127.0.0.1:9001");
    }

    #[test]
    fn parse_peers_grammar() {
        let peers = parse_peers("1=http://127.0.0.1:9001,2=127.0.0.1:9002").unwrap();
        assert_eq!(peers.advertise_url(1), Some("http://127.0.0.1:9001"));
        assert_eq!(peers.advertise_url(2), Some("http://127.0.0.1:9002"));
    }

    #[test]
    fn parse_peers_rejects_missing_equals() {
        let err = parse_peers("1-http://127.0.0.1:9001").unwrap_err();
        assert!(matches!(err, ConfigError::MalformedPeerSpec(_)));
    }

    #[test]
    fn build_inserts_self_into_directory() {
        let cfg = NodeConfig::build(
            1,
            "http://127.0.0.1:9001",
            "",
            "info".to_string(),
            LogFormat::Pretty,
        )
        .unwrap();
        assert_eq!(cfg.peers.advertise_url(1), Some("http://127.0.0.1:9001"));
        assert_eq!(cfg.initial_peer_ids, vec![1]);
    }

    #[test]
    fn build_rejects_zero_id() {
        let err = NodeConfig::build(
            0,
            "http://127.0.0.1:9001",
            "",
            "info".to_string(),
            LogFormat::Pretty,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidId));
    }
}
