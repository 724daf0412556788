//! `SealClient`: the top-level handle an application holds for the
//! lifetime of its key-server configuration.
//!
//! A handle that resolves and caches the configured key-server list once,
//! then serves every subsequent `encrypt`/`decrypt`/`fetch_keys` call from
//! that cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use tokio::sync::OnceCell;
use tracing::info;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

use seal_core::envelope::{EncryptedObject, EncryptedShares, ServiceEntry};
use seal_core::full_id::create_full_id;
use seal_core::key_server::{verify_proof_of_possession, KeyServer};

use seal_crypto::dem::{self, Ciphertext};
use seal_crypto::ibe;
use seal_crypto::kdf::{derive_key, KeyPurpose};
use seal_crypto::threshold::{self, Share};

use crate::collaborators::{KeyServerTransport, LedgerClient, ReqwestKeyServerTransport};
use crate::error::ClientError;
use crate::fetch::{fetch_keys, KeyCache};
use crate::session::{SessionKey, WalletVerifier};

/// DEM mode a caller may request at `encrypt` time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DemType {
    AesGcm256,
    Hmac256Ctr,
    Plain,
}

/// Configuration surface for a `SealClient`. No config file or environment
/// parsing in scope — this is a library, not a daemon.
pub struct SealClientOptions {
    pub ledger_client: Arc<dyn LedgerClient>,
    pub server_object_ids: Vec<[u8; 32]>,
    pub verify_key_servers: bool,
    pub timeout_ms: u32,
}

impl SealClientOptions {
    pub fn new(ledger_client: Arc<dyn LedgerClient>, server_object_ids: Vec<[u8; 32]>) -> Self {
        SealClientOptions {
            ledger_client,
            server_object_ids,
            verify_key_servers: true,
            timeout_ms: 10_000,
        }
    }
}

pub struct EncryptArgs {
    pub threshold: u8,
    pub package_id: [u8; 32],
    pub id: Vec<u8>,
    pub data: Vec<u8>,
    pub aad: Option<Vec<u8>>,
    pub dem_type: DemType,
}

pub struct EncryptResult {
    pub encrypted_object: Vec<u8>,
    pub key: [u8; 32],
}

pub struct DecryptArgs<'a> {
    pub data: &'a [u8],
    pub session_key: &'a mut SessionKey,
    pub wallet_verifier: &'a dyn WalletVerifier,
    pub tx_bytes: &'a [u8],
}

/// Owns the resolved `KeyServer` list (lazily fetched once per client) and
/// the `KeyCache` of verified partial keys. Every other piece of state
/// lives on the caller-owned `SessionKey`.
pub struct SealClient {
    options: SealClientOptions,
    servers: OnceCell<Vec<KeyServer>>,
    cache: KeyCache,
    transport: Arc<dyn KeyServerTransport + Send + Sync>,
}

impl SealClient {
    pub fn new(options: SealClientOptions) -> Self {
        let transport = Arc::new(ReqwestKeyServerTransport::new(Duration::from_millis(
            options.timeout_ms as u64,
        )));
        SealClient::with_transport(options, transport)
    }

    /// Same as [`SealClient::new`] but with an injected transport — the
    /// seam integration tests use to swap in an in-process fake key
    /// server.
    pub fn with_transport(
        options: SealClientOptions,
        transport: Arc<dyn KeyServerTransport + Send + Sync>,
    ) -> Self {
        SealClient {
            options,
            servers: OnceCell::new(),
            cache: KeyCache::new(),
            transport,
        }
    }

    /// Resolves the configured `serverObjectIds` through the injected
    /// `LedgerClient`, verifying each server's proof-of-possession unless
    /// the caller opted out. Only the first caller pays the resolution
    /// cost; concurrent callers share the same in-flight future.
    pub async fn servers(&self) -> Result<&[KeyServer], ClientError> {
        let servers = self
            .servers
            .get_or_try_init(|| async {
                let resolved = self
                    .options
                    .ledger_client
                    .resolve_key_servers(&self.options.server_object_ids)
                    .await?;

                if self.options.verify_key_servers {
                    for server in &resolved {
                        let service = self.transport.get_service(&server.url).await?;
                        let pop_bytes = B64
                            .decode(&service.pop)
                            .map_err(|e| ClientError::Transport(e.to_string()))?;
                        let pop = seal_crypto::curve::G1::from_bytes(&pop_bytes)
                            .map_err(seal_core::SealError::from)?;
                        verify_proof_of_possession(&server.pk, &server.object_id, &pop)?;
                    }
                }

                info!(
                    target: "seal_client::client",
                    count = resolved.len(),
                    "resolved key servers"
                );
                Ok::<_, ClientError>(resolved)
            })
            .await?;
        Ok(servers.as_slice())
    }

    /// Splits a fresh symmetric key, IBE-encapsulates each share,
    /// DEM-encrypts the payload, and emits the envelope.
    pub async fn encrypt(&self, args: EncryptArgs) -> Result<EncryptResult, ClientError> {
        let servers = self.servers().await?;
        let n = servers.len();
        let threshold = args.threshold as usize;
        if threshold == 0 || threshold > n {
            return Err(ClientError::Core(seal_core::SealError::InvalidThreshold {
                threshold,
                n,
            }));
        }

        let base_key = dem::generate_key();
        let shares = threshold::split(&base_key, n, threshold).map_err(seal_core::SealError::from)?;
        let full_id = create_full_id(&args.package_id, &args.id);

        let recipients: Vec<ibe::Recipient<'_>> = servers
            .iter()
            .zip(shares.iter())
            .map(|(server, share)| ibe::Recipient {
                public_key: server.pk,
                message: &share.bytes,
                info: std::slice::from_ref(&share.index),
            })
            .collect();

        let randomness_key = derive_key(KeyPurpose::EncryptedRandomness, &base_key)
            .map_err(seal_core::SealError::from)?;
        let batched = ibe::encrypt_batched(&full_id, &recipients, &randomness_key);

        let dem_key =
            derive_key(KeyPurpose::Dem, &base_key).map_err(seal_core::SealError::from)?;
        let ciphertext = match args.dem_type {
            DemType::AesGcm256 => {
                dem::aes_256_gcm_encrypt(&dem_key, &args.data, args.aad.as_deref())
                    .map_err(seal_core::SealError::from)?
            }
            DemType::Hmac256Ctr => {
                dem::hmac_256_ctr_encrypt(&dem_key, &args.data, args.aad.as_deref())
                    .map_err(seal_core::SealError::from)?
            }
            DemType::Plain => Ciphertext::Plain,
        };

        let services: Vec<ServiceEntry> = servers
            .iter()
            .zip(shares.iter())
            .map(|(server, share)| ServiceEntry {
                object_id: server.object_id,
                share_index: share.index,
            })
            .collect();

        let envelope = EncryptedObject {
            version: seal_core::envelope::CURRENT_VERSION,
            package_id: args.package_id,
            id: args.id,
            services,
            threshold: args.threshold,
            encrypted_shares: EncryptedShares::BonehFranklinBLS12381 {
                nonce: batched.nonce,
                encrypted_shares: batched.encrypted_shares,
                encrypted_randomness: batched.encrypted_randomness,
            },
            ciphertext,
        };

        Ok(EncryptResult {
            encrypted_object: envelope.to_bytes(),
            key: base_key,
        })
    }

    /// Fetches and caches partial keys for `ids` without decrypting
    /// anything.
    pub async fn fetch_keys(
        &self,
        ids: &[Vec<u8>],
        tx_bytes: &[u8],
        session_key: &mut SessionKey,
        wallet_verifier: &dyn WalletVerifier,
        threshold: u8,
    ) -> Result<(), ClientError> {
        let servers = self.servers().await?;
        fetch_keys(
            ids,
            tx_bytes,
            session_key,
            wallet_verifier,
            threshold,
            servers,
            &self.cache,
            &self.transport,
        )
        .await
    }

    /// Parses the envelope, reconciles its server set against this
    /// client's configuration, fetches until threshold, IBE-decapsulates,
    /// Shamir-combines, derives the DEM key, and decrypts.
    pub async fn decrypt(&self, args: DecryptArgs<'_>) -> Result<Vec<u8>, ClientError> {
        let envelope = EncryptedObject::from_bytes(args.data).map_err(ClientError::Core)?;
        let servers = self.servers().await?;
        reconcile_key_servers(servers, &envelope.services)?;

        if envelope.package_id != *args.session_key.package_id() {
            return Err(ClientError::UserError(
                "envelope packageId does not match this session key's packageId".to_string(),
            ));
        }

        let full_id = create_full_id(&envelope.package_id, &envelope.id);
        let full_id_hex = hex::encode(&full_id);

        self.fetch_keys(
            &[envelope.id.clone()],
            args.tx_bytes,
            args.session_key,
            args.wallet_verifier,
            envelope.threshold,
        )
        .await?;

        let (nonce, encrypted_shares) = match &envelope.encrypted_shares {
            EncryptedShares::BonehFranklinBLS12381 {
                nonce,
                encrypted_shares,
                ..
            } => (nonce, encrypted_shares),
        };

        let mut recovered: HashMap<u8, Share> = HashMap::new();
        for (entry, ciphertext) in envelope.services.iter().zip(encrypted_shares.iter()) {
            if recovered.contains_key(&entry.share_index) {
                continue;
            }
            if let Some(user_secret_key) = self.cache.get(&full_id_hex, &entry.object_id) {
                let bytes = ibe::decrypt(
                    nonce,
                    &user_secret_key,
                    ciphertext,
                    std::slice::from_ref(&entry.share_index),
                );
                recovered.insert(
                    entry.share_index,
                    Share {
                        index: entry.share_index,
                        bytes,
                    },
                );
            }
        }

        let shares: Vec<Share> = recovered.into_values().collect();
        if shares.len() < envelope.threshold as usize {
            return Err(ClientError::InsufficientShares {
                required: envelope.threshold as usize,
            });
        }

        let base_key = threshold::combine(&shares, envelope.threshold as usize)
            .map_err(seal_core::SealError::from)?;
        let dem_key =
            derive_key(KeyPurpose::Dem, &base_key).map_err(seal_core::SealError::from)?;

        match &envelope.ciphertext {
            Ciphertext::Aes256Gcm { .. } => dem::aes_256_gcm_decrypt(&dem_key, &envelope.ciphertext)
                .map_err(|e| ClientError::Core(seal_core::SealError::from(e))),
            Ciphertext::Hmac256Ctr { .. } => {
                dem::hmac_256_ctr_decrypt(&dem_key, &envelope.ciphertext)
                    .map_err(|e| ClientError::Core(seal_core::SealError::from(e)))
            }
            Ciphertext::Plain => Ok(dem_key.to_vec()),
        }
    }
}

/// The client's configured server set must be the exact same multiset
/// (object id plus repeat count) as the envelope's `services` entries,
/// ignoring share-index/order.
fn reconcile_key_servers(
    configured: &[KeyServer],
    services: &[ServiceEntry],
) -> Result<(), ClientError> {
    let mut configured_counts: HashMap<[u8; 32], usize> = HashMap::new();
    for server in configured {
        *configured_counts.entry(server.object_id).or_insert(0) += 1;
    }

    let mut envelope_counts: HashMap<[u8; 32], usize> = HashMap::new();
    for entry in services {
        *envelope_counts.entry(entry.object_id).or_insert(0) += 1;
    }

    if configured_counts == envelope_counts {
        Ok(())
    } else {
        Err(ClientError::InconsistentKeyServers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seal_crypto::curve::G2;

    fn server(object_id: [u8; 32]) -> KeyServer {
        KeyServer {
            object_id,
            name: "test".to_string(),
            url: "https://example.test".to_string(),
            key_type: seal_core::key_server::KeyType::BonehFranklinBLS12381,
            pk: G2::generator(),
        }
    }

    fn entry(object_id: [u8; 32]) -> ServiceEntry {
        ServiceEntry {
            object_id,
            share_index: 1,
        }
    }

    /// client {A, A, B}, envelope {A, B, B} -> InconsistentKeyServers.
    #[test]
    fn reconcile_rejects_mismatched_multiset() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let configured = vec![server(a), server(a), server(b)];
        let services = vec![entry(a), entry(b), entry(b)];
        assert!(matches!(
            reconcile_key_servers(&configured, &services),
            Err(ClientError::InconsistentKeyServers)
        ));
    }

    /// client {A, A, B}, envelope {A, A, B} -> proceeds.
    #[test]
    fn reconcile_accepts_matching_multiset() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let configured = vec![server(a), server(a), server(b)];
        let services = vec![entry(a), entry(a), entry(b)];
        assert!(reconcile_key_servers(&configured, &services).is_ok());
    }

    #[test]
    fn reconcile_ignores_share_index_and_order() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        let configured = vec![server(a), server(b)];
        let services = vec![
            ServiceEntry { object_id: b, share_index: 7 },
            ServiceEntry { object_id: a, share_index: 3 },
        ];
        assert!(reconcile_key_servers(&configured, &services).is_ok());
    }
}
