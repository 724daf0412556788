//! Session-key lifecycle: ephemeral signing keypair, wallet-signed
//! certificate issuance, and per-request ElGamal key generation.
//!
//! Expiry follows a "timestamp + ttl with a skew tolerance" check, run
//! synchronously at the point `create_request_params` is called rather
//! than through a polled background task.

use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use seal_crypto::curve::{Scalar, G1, G2};

use crate::error::ClientError;

const MIN_TTL_MIN: u8 = 1;
const MAX_TTL_MIN: u8 = 10;
const EXPIRY_SKEW_MS: i64 = 10_000;

/// Wallet signing capability, injected so the library stays agnostic of any
/// particular wallet ceremony.
#[async_trait::async_trait]
pub trait Signer: Send + Sync {
    async fn sign_personal_message(&self, message: &[u8]) -> Result<Vec<u8>, ClientError>;
}

/// External verifier for wallet personal-message signatures. Taken as an
/// injected collaborator rather than a concrete network client so the
/// library does not hard-code any particular ledger network's endpoint.
#[async_trait::async_trait]
pub trait WalletVerifier: Send + Sync {
    async fn verify_personal_message_signature(
        &self,
        message: &[u8],
        signature: &[u8],
        address: &[u8; 32],
    ) -> Result<(), ClientError>;
}

/// A structured witness that a wallet has authorized the ephemeral
/// session-signing key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    pub user: [u8; 32],
    pub session_verify_key: [u8; 32],
    pub creation_time: DateTime<Utc>,
    pub ttl_min: u8,
    pub signature: Vec<u8>,
}

/// ElGamal-on-G1 request parameters handed to each key server along with
/// the certificate.
pub struct RequestParams {
    pub decryption_key: [u8; 32],
    pub request_signature: Vec<u8>,
}

/// Per-application session: one ephemeral Ed25519 keypair, authorized once
/// by a wallet signature, shareable across many `fetch_keys` calls.
pub struct SessionKey {
    address: [u8; 32],
    package_id: [u8; 32],
    creation_time: DateTime<Utc>,
    ttl_min: u8,
    signing_key: SigningKey,
    personal_message_signature: Option<Vec<u8>>,
    signer: Option<Arc<dyn Signer>>,
}

impl SessionKey {
    pub fn new(
        address: [u8; 32],
        package_id: [u8; 32],
        ttl_min: u8,
        signer: Option<Arc<dyn Signer>>,
    ) -> Result<Self, ClientError> {
        if !(MIN_TTL_MIN..=MAX_TTL_MIN).contains(&ttl_min) {
            return Err(ClientError::UserError(format!(
                "ttlMin must be in [{MIN_TTL_MIN}, {MAX_TTL_MIN}], got {ttl_min}"
            )));
        }

        Ok(SessionKey {
            address,
            package_id,
            creation_time: current_time(),
            ttl_min,
            signing_key: SigningKey::generate(&mut OsRng),
            personal_message_signature: None,
            signer,
        })
    }

    pub fn package_id(&self) -> &[u8; 32] {
        &self.package_id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    fn expires_at(&self) -> DateTime<Utc> {
        self.creation_time + chrono::Duration::minutes(self.ttl_min as i64)
    }

    pub fn is_expired(&self) -> bool {
        current_time() + chrono::Duration::milliseconds(EXPIRY_SKEW_MS) > self.expires_at()
    }

    /// The deterministic UTF-8 bytes a wallet is asked to sign. The exact
    /// text is part of the wire contract with wallets — any change to the
    /// format breaks signature verification on the server side.
    pub fn personal_message(&self) -> Vec<u8> {
        let verify_key_b64 =
            base64::engine::general_purpose::STANDARD.encode(self.verifying_key().to_bytes());
        let timestamp = self.creation_time.format("%Y-%m-%d %H:%M:%S");
        format!(
            "Accessing keys of package 0x{} for {} mins from {} UTC, session key {}",
            hex::encode(self.package_id),
            self.ttl_min,
            timestamp,
            verify_key_b64,
        )
        .into_bytes()
    }

    pub async fn set_personal_message_signature(
        &mut self,
        signature: Vec<u8>,
        verifier: &dyn WalletVerifier,
    ) -> Result<(), ClientError> {
        let message = self.personal_message();
        verifier
            .verify_personal_message_signature(&message, &signature, &self.address)
            .await
            .map_err(|_| ClientError::InvalidPersonalMessageSignature)?;
        self.personal_message_signature = Some(signature);
        Ok(())
    }

    pub async fn get_certificate(
        &mut self,
        verifier: &dyn WalletVerifier,
    ) -> Result<Certificate, ClientError> {
        if self.personal_message_signature.is_none() {
            let signer = self
                .signer
                .clone()
                .ok_or_else(|| ClientError::UserError("no signer configured for session key and no personal message signature set".into()))?;
            let message = self.personal_message();
            let signature = signer.sign_personal_message(&message).await?;
            verifier
                .verify_personal_message_signature(&message, &signature, &self.address)
                .await
                .map_err(|_| ClientError::InvalidPersonalMessageSignature)?;
            self.personal_message_signature = Some(signature);
        }

        Ok(Certificate {
            user: self.address,
            session_verify_key: self.verifying_key().to_bytes(),
            creation_time: self.creation_time,
            ttl_min: self.ttl_min,
            signature: self
                .personal_message_signature
                .clone()
                .expect("just set above"),
        })
    }

    /// Builds an ElGamal-on-G1 keypair plus a signature over the canonical
    /// request message, failing fast if the session has expired.
    pub fn create_request_params(&self, ptb_bytes: &[u8]) -> Result<RequestParams, ClientError> {
        if self.is_expired() {
            return Err(ClientError::ExpiredSessionKey);
        }

        let eg_sk = Scalar::random();
        let eg_pk = G1::generator().mul(&eg_sk);
        let eg_vk = G2::generator().mul(&eg_sk);

        let mut message = Vec::new();
        // The leading byte is the chain's intent-message tag and is not
        // signed by this inner request signature.
        message.extend_from_slice(ptb_bytes.get(1..).unwrap_or(&[]));
        message.extend_from_slice(&eg_pk.to_bytes());
        message.extend_from_slice(&eg_vk.to_bytes());

        let signature: Signature = self.signing_key.sign(&message);

        Ok(RequestParams {
            decryption_key: eg_sk.to_bytes(),
            request_signature: signature.to_bytes().to_vec(),
        })
    }
}

fn current_time() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AcceptAllVerifier;

    #[async_trait::async_trait]
    impl WalletVerifier for AcceptAllVerifier {
        async fn verify_personal_message_signature(
            &self,
            _message: &[u8],
            _signature: &[u8],
            _address: &[u8; 32],
        ) -> Result<(), ClientError> {
            Ok(())
        }
    }

    struct RejectAllVerifier;

    #[async_trait::async_trait]
    impl WalletVerifier for RejectAllVerifier {
        async fn verify_personal_message_signature(
            &self,
            _message: &[u8],
            _signature: &[u8],
            _address: &[u8; 32],
        ) -> Result<(), ClientError> {
            Err(ClientError::InvalidPersonalMessageSignature)
        }
    }

    #[test]
    fn rejects_ttl_out_of_range() {
        assert!(SessionKey::new([1u8; 32], [2u8; 32], 0, None).is_err());
        assert!(SessionKey::new([1u8; 32], [2u8; 32], 11, None).is_err());
        assert!(SessionKey::new([1u8; 32], [2u8; 32], 10, None).is_ok());
    }

    #[test]
    fn personal_message_is_well_formed_utf8() {
        let session = SessionKey::new([0u8; 32], [7u8; 32], 5, None).unwrap();
        let message = String::from_utf8(session.personal_message()).unwrap();
        assert!(message.starts_with("Accessing keys of package 0x"));
        assert!(message.contains("for 5 mins from"));
        assert!(message.contains("UTC, session key "));
    }

    #[tokio::test]
    async fn set_personal_message_signature_rejects_invalid_signature() {
        let mut session = SessionKey::new([1u8; 32], [2u8; 32], 5, None).unwrap();
        let result = session
            .set_personal_message_signature(vec![0u8; 64], &RejectAllVerifier)
            .await;
        assert!(matches!(
            result,
            Err(ClientError::InvalidPersonalMessageSignature)
        ));
    }

    #[tokio::test]
    async fn get_certificate_is_idempotent_after_authorization() {
        let mut session = SessionKey::new([1u8; 32], [2u8; 32], 5, None).unwrap();
        session
            .set_personal_message_signature(vec![1u8; 64], &AcceptAllVerifier)
            .await
            .unwrap();

        let first = session.get_certificate(&AcceptAllVerifier).await.unwrap();
        let second = session.get_certificate(&AcceptAllVerifier).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn create_request_params_fails_when_expired() {
        let mut session = SessionKey::new([1u8; 32], [2u8; 32], 1, None).unwrap();
        session.creation_time = Utc::now() - chrono::Duration::minutes(60);
        assert!(matches!(
            session.create_request_params(&[0u8, 1, 2, 3]),
            Err(ClientError::ExpiredSessionKey)
        ));
    }

    #[test]
    fn create_request_params_succeeds_when_fresh() {
        let session = SessionKey::new([1u8; 32], [2u8; 32], 5, None).unwrap();
        let params = session.create_request_params(&[0u8, 1, 2, 3]).unwrap();
        assert_eq!(params.decryption_key.len(), 32);
        assert_eq!(params.request_signature.len(), 64);
    }
}
