//! Partial-key fetch orchestration: fans a request out to every configured
//! key server, verifies what comes back, and stops as soon as a
//! cryptographic threshold of servers has answered.
//!
//! The fan-out uses a `futures::stream::FuturesUnordered` over per-server
//! tasks, cancelled in bulk once enough of them have answered; there is no
//! automatic retry of a failed or cancelled server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use base64::Engine;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use seal_core::full_id::create_full_id;
use seal_core::key_server::{KeyServer, KeyType};
use seal_crypto::curve::{Scalar, G1, G2};
use seal_crypto::ibe;

use crate::collaborators::{CertificateBody, FetchKeyRequestBody, KeyServerTransport};
use crate::error::ClientError;
use crate::session::{SessionKey, WalletVerifier};

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// `(fullId, serverObjectId) -> verified partial key`. Shared across every
/// `fetch_keys` call made through the same `SealClient`; cache reads and
/// writes are independent per key and commute.
#[derive(Default)]
pub struct KeyCache {
    inner: Mutex<HashMap<(String, [u8; 32]), G1>>,
}

impl KeyCache {
    pub fn new() -> Self {
        KeyCache::default()
    }

    pub fn get(&self, full_id_hex: &str, server_object_id: &[u8; 32]) -> Option<G1> {
        self.inner
            .lock()
            .expect("key cache mutex is never held across a panic point")
            .get(&(full_id_hex.to_string(), *server_object_id))
            .copied()
    }

    fn insert(&self, full_id_hex: String, server_object_id: [u8; 32], key: G1) {
        self.inner
            .lock()
            .expect("key cache mutex is never held across a panic point")
            .insert((full_id_hex, server_object_id), key);
    }

    pub fn contains(&self, full_id_hex: &str, server_object_id: &[u8; 32]) -> bool {
        self.get(full_id_hex, server_object_id).is_some()
    }
}

/// ElGamal-on-G1 decryption: `m = c2 - c1 * sk`.
fn elgamal_decrypt(sk: &Scalar, c1: &G1, c2: &G1) -> G1 {
    c2.sub(&c1.mul(sk))
}

fn error_kind_tag(err: &ClientError) -> String {
    match err {
        ClientError::Server(e) => format!("server:{:?}", e.kind),
        ClientError::Transport(_) => "transport".to_string(),
        ClientError::Core(_) => "core".to_string(),
        other => format!("{other:?}"),
    }
}

/// The error kind most frequently observed across tried servers, ties
/// broken by first-seen.
fn majority_error(errors: Vec<ClientError>) -> ClientError {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for err in &errors {
        *counts.entry(error_kind_tag(err)).or_insert(0) += 1;
    }

    let mut best_tag: Option<String> = None;
    let mut best_count = 0usize;
    for err in &errors {
        let tag = error_kind_tag(err);
        let count = counts[&tag];
        if count > best_count {
            best_count = count;
            best_tag = Some(tag);
        }
    }

    let best_tag = best_tag.expect("errors is non-empty when called");
    errors
        .into_iter()
        .find(|e| error_kind_tag(e) == best_tag)
        .expect("best_tag was derived from this list")
}

struct ServerOutcome {
    server_object_id: [u8; 32],
    result: Result<HashMap<String, G1>, ClientError>,
}

/// Fetches partial keys for `ids` from the client's configured key servers
/// until `threshold` of them have answered for every id, inserting
/// verified keys into `cache` as they arrive.
#[allow(clippy::too_many_arguments)]
pub async fn fetch_keys(
    ids: &[Vec<u8>],
    tx_bytes: &[u8],
    session_key: &mut SessionKey,
    wallet_verifier: &dyn WalletVerifier,
    threshold: u8,
    servers: &[KeyServer],
    cache: &KeyCache,
    transport: &(dyn KeyServerTransport + Send + Sync),
) -> Result<(), ClientError> {
    let threshold = threshold as usize;
    if threshold == 0 || threshold > servers.len() {
        return Err(ClientError::Core(seal_core::SealError::InvalidThreshold {
            threshold,
            n: servers.len(),
        }));
    }

    let full_ids: Vec<String> = ids
        .iter()
        .map(|id| hex::encode(create_full_id(session_key.package_id(), id)))
        .collect();

    let completed_count = servers
        .iter()
        .filter(|s| full_ids.iter().all(|fid| cache.contains(fid, &s.object_id)))
        .count();
    if completed_count >= threshold {
        return Ok(());
    }

    for server in servers {
        if server.key_type != KeyType::BonehFranklinBLS12381 {
            return Err(ClientError::Core(seal_core::SealError::InvalidKeyServer {
                object_id: hex::encode(server.object_id),
            }));
        }
    }

    let certificate = session_key.get_certificate(wallet_verifier).await?;
    let request_params = session_key.create_request_params(tx_bytes)?;
    let eg_sk = Scalar::from_bytes(&request_params.decryption_key)?;
    let eg_pk = G1::generator().mul(&eg_sk);
    let eg_vk = G2::generator().mul(&eg_sk);

    let ptb_offset = 1.min(tx_bytes.len());
    let body = FetchKeyRequestBody {
        ptb: B64.encode(&tx_bytes[ptb_offset..]),
        enc_key: B64.encode(eg_pk.to_bytes()),
        enc_verification_key: B64.encode(eg_vk.to_bytes()),
        request_signature: B64.encode(&request_params.request_signature),
        certificate: CertificateBody {
            user: format!("0x{}", hex::encode(certificate.user)),
            session_vk: B64.encode(certificate.session_verify_key),
            creation_time: certificate.creation_time.timestamp_millis(),
            ttl_min: certificate.ttl_min,
            signature: B64.encode(&certificate.signature),
        },
    };

    let cancel = CancellationToken::new();
    let completed = AtomicUsize::new(completed_count);
    let errors: Mutex<Vec<ClientError>> = Mutex::new(Vec::new());

    let remaining_servers: Vec<&KeyServer> = servers
        .iter()
        .filter(|s| !full_ids.iter().all(|fid| cache.contains(fid, &s.object_id)))
        .collect();
    let mut remaining = remaining_servers.len();

    let mut tasks = FuturesUnordered::new();
    for server in remaining_servers {
        let cancel_token = cancel.clone();
        let full_ids = full_ids.clone();
        let body_ref = &body;
        let eg_sk_ref = &eg_sk;
        tasks.push(async move {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => ServerOutcome {
                    server_object_id: server.object_id,
                    result: Err(ClientError::Aborted),
                },
                outcome = run_one_server(server, &full_ids, body_ref, eg_sk_ref, transport) => ServerOutcome {
                    server_object_id: server.object_id,
                    result: outcome,
                },
            }
        });
    }

    while let Some(outcome) = tasks.next().await {
        match outcome.result {
            Ok(keys) => {
                let matched_all = full_ids.iter().all(|fid| keys.contains_key(fid));
                for (full_id_hex, key) in keys {
                    cache.insert(full_id_hex, outcome.server_object_id, key);
                }
                remaining -= 1;
                if matched_all {
                    let now_completed = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if now_completed >= threshold {
                        cancel.cancel();
                    }
                }
            }
            Err(ClientError::Aborted) => {
                // Cancellation is not a protocol failure; does not count
                // against the error budget.
            }
            Err(err) => {
                remaining -= 1;
                debug!(
                    target: "seal_client::fetch",
                    server = %hex::encode(outcome.server_object_id),
                    error = %err,
                    "key server request failed"
                );
                let completed_now = completed.load(Ordering::SeqCst);
                errors
                    .lock()
                    .expect("errors mutex is never held across a panic point")
                    .push(err);
                if remaining + completed_now < threshold {
                    cancel.cancel();
                }
            }
        }
    }

    if completed.load(Ordering::SeqCst) >= threshold {
        Ok(())
    } else {
        let errors = errors.into_inner().expect("no panics while holding the lock");
        if errors.is_empty() {
            Err(ClientError::InsufficientShares { required: threshold })
        } else {
            Err(majority_error(errors))
        }
    }
}

async fn run_one_server(
    server: &KeyServer,
    full_ids: &[String],
    body: &FetchKeyRequestBody,
    eg_sk: &Scalar,
    transport: &(dyn KeyServerTransport + Send + Sync),
) -> Result<HashMap<String, G1>, ClientError> {
    let request_id = Uuid::new_v4().to_string();
    let response = transport.fetch_key(&server.url, &request_id, body).await?;

    let mut verified = HashMap::new();
    for entry in response.decryption_keys {
        if !full_ids.contains(&entry.id) {
            continue;
        }

        let (c1_bytes, c2_bytes) = match (
            B64.decode(&entry.encrypted_key[0]),
            B64.decode(&entry.encrypted_key[1]),
        ) {
            (Ok(a), Ok(b)) => (a, b),
            _ => {
                warn!(target: "seal_client::fetch", server = %server.name, "dropping malformed encrypted_key");
                continue;
            }
        };
        let id_bytes = match hex::decode(&entry.id) {
            Ok(b) => b,
            Err(_) => continue,
        };

        let (c1, c2) = match (G1::from_bytes(&c1_bytes), G1::from_bytes(&c2_bytes)) {
            (Ok(a), Ok(b)) => (a, b),
            _ => {
                warn!(target: "seal_client::fetch", server = %server.name, "dropping key with non-canonical point encoding");
                continue;
            }
        };

        let point = elgamal_decrypt(eg_sk, &c1, &c2);
        if !ibe::verify_user_secret_key(&point, &id_bytes, &server.pk) {
            warn!(target: "seal_client::fetch", server = %server.name, id = %entry.id, "dropping partial key that failed verification");
            continue;
        }
        verified.insert(entry.id, point);
    }

    Ok(verified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_error_breaks_ties_by_first_seen() {
        let a = ClientError::Transport("a".into());
        let b = ClientError::UserError("b".into());
        let c = ClientError::Transport("c".into());
        let picked = majority_error(vec![a, b, c]);
        assert!(matches!(picked, ClientError::Transport(ref s) if s == "a"));
    }

    #[test]
    fn key_cache_insert_and_contains_round_trip() {
        let cache = KeyCache::new();
        let id = "deadbeef".to_string();
        let server = [1u8; 32];
        assert!(!cache.contains(&id, &server));

        let point = G1::generator();
        cache.insert(id.clone(), server, point);
        assert!(cache.contains(&id, &server));
        assert_eq!(cache.get(&id, &server), Some(point));
    }
}
