//! Cluster handshake
//!
//! Confirms the shape of the static cluster before the service port opens
//! up. Every clustered database's peer list is checked against every peer:
//! each peer must list the same database with an identical multiset of
//! URLs. No data moves here, only the descriptor.
//!
//! Peers that cannot be reached are retried with exponential backoff,
//! indefinitely: a cluster usually starts as a group, and the members come
//! up in arbitrary order. A peer that answers with a different descriptor
//! is fatal: two nodes with diverging views of the namespace must not
//! serve.

use std::collections::BTreeMap;
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use crate::config::DEFAULT_MAX_FRAME_BYTES;
use crate::context::ServerContext;
use crate::error::{KvdbError, Result};
use crate::protocol::{codec, read_frame, write_frame, Command, Message};

/// First retry delay for an unreachable peer
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Retry delay ceiling
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Connect / read / write timeout for one probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Probe every peer of every clustered database until all confirm.
/// Returns an error only on a descriptor mismatch; unreachable peers are
/// retried forever.
pub fn confirm(ctx: &ServerContext) -> Result<()> {
    let descriptor = ctx.cluster_descriptor();
    if descriptor.is_empty() {
        tracing::info!("no clustered databases, cluster trivially confirmed");
        return Ok(());
    }

    for (db, urls) in &descriptor {
        for url in urls {
            confirm_peer(db, urls, url)?;
            tracing::info!(db = %db, peer = %url, "peer confirmed");
        }
    }
    tracing::info!("cluster confirmed");
    Ok(())
}

fn confirm_peer(db: &str, urls: &[String], url: &str) -> Result<()> {
    let mut backoff = BACKOFF_BASE;
    loop {
        match probe(url) {
            Ok(remote) => return check_descriptor(db, urls, url, &remote),
            Err(e) => {
                tracing::warn!(
                    db = %db,
                    peer = %url,
                    error = %e,
                    retry_in = ?backoff,
                    "peer not reachable yet"
                );
                thread::sleep(backoff);
                backoff = (backoff * 2).min(BACKOFF_CAP);
            }
        }
    }
}

/// The peer must know the database and agree on its peer list,
/// order-insensitively.
fn check_descriptor(
    db: &str,
    urls: &[String],
    peer: &str,
    remote: &BTreeMap<String, Vec<String>>,
) -> Result<()> {
    let remote_urls = remote.get(db).ok_or_else(|| {
        KvdbError::ClusterMismatch(format!("peer {} does not list database {}", peer, db))
    })?;

    if !same_multiset(urls, remote_urls) {
        return Err(KvdbError::ClusterMismatch(format!(
            "peer {} lists {:?} for database {}, expected {:?}",
            peer, remote_urls, db, urls
        )));
    }
    Ok(())
}

fn same_multiset(a: &[String], b: &[String]) -> bool {
    let mut a: Vec<&String> = a.iter().collect();
    let mut b: Vec<&String> = b.iter().collect();
    a.sort();
    b.sort();
    a == b
}

/// One `cluster_info` round-trip against a peer.
pub fn probe(url: &str) -> Result<BTreeMap<String, Vec<String>>> {
    let addr = url
        .to_socket_addrs()
        .map_err(|e| KvdbError::Internal(format!("cannot resolve {}: {}", url, e)))?
        .next()
        .ok_or_else(|| KvdbError::Internal(format!("{} resolves to nothing", url)))?;

    let mut stream = TcpStream::connect_timeout(&addr, PROBE_TIMEOUT)?;
    stream.set_read_timeout(Some(PROBE_TIMEOUT))?;
    stream.set_write_timeout(Some(PROBE_TIMEOUT))?;
    stream.set_nodelay(true)?;

    let request = Message::request(0, Command::cluster_info());
    write_frame(&mut stream, &codec::encode_message(&request))?;

    let payload = read_frame(&mut stream, DEFAULT_MAX_FRAME_BYTES)?
        .ok_or_else(|| KvdbError::Decode("peer closed before responding".to_string()))?;
    let message = codec::decode_message(&payload)?;
    let response = message
        .as_response()
        .ok_or_else(|| KvdbError::Decode("peer sent a request back".to_string()))?;

    if !response.is_success() {
        return Err(KvdbError::Internal(format!(
            "peer refused cluster_info: {}",
            response.message
        )));
    }
    let blob = response
        .result
        .first()
        .and_then(|entry| entry.as_deref())
        .ok_or_else(|| KvdbError::Decode("cluster_info response carries no descriptor".to_string()))?;
    codec::decode_cluster_info(blob)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn multiset_comparison_ignores_order() {
        assert!(same_multiset(&s(&["a:1", "b:2"]), &s(&["b:2", "a:1"])));
        assert!(!same_multiset(&s(&["a:1"]), &s(&["a:1", "a:1"])));
        assert!(!same_multiset(&s(&["a:1", "b:2"]), &s(&["a:1", "c:3"])));
    }

    #[test]
    fn descriptor_check_flags_unknown_db_and_divergence() {
        let mut remote = BTreeMap::new();
        remote.insert("t".to_string(), s(&["a:1", "b:2"]));

        assert!(check_descriptor("t", &s(&["b:2", "a:1"]), "a:1", &remote).is_ok());
        assert!(check_descriptor("other", &s(&["a:1"]), "a:1", &remote).is_err());
        assert!(check_descriptor("t", &s(&["a:1", "c:3"]), "a:1", &remote).is_err());
    }
}
