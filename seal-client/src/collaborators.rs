//! External collaborators the core consumes but does not implement: the
//! ledger query interface, and the key-server HTTP transport.
//! `WalletVerifier` lives in `session.rs` since it is scoped entirely to
//! session authorization.
//!
//! The default key-server transport is plain `reqwest` over a bare REST
//! endpoint rather than any RPC framework.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use seal_core::key_server::KeyServer;

use crate::error::{ClientError, ServerError, ServerErrorKind};

pub const SDK_TYPE: &str = "rust";
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolves key-server descriptors from the ledger. Decoding the raw
/// on-chain object representation is the ledger client's own concern; this
/// trait's contract starts one level up, at the already-typed `KeyServer`
/// the rest of the client operates on.
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
    async fn resolve_key_servers(
        &self,
        object_ids: &[[u8; 32]],
    ) -> Result<Vec<KeyServer>, ClientError>;
}

#[derive(Serialize)]
pub struct FetchKeyRequestBody {
    pub ptb: String,
    pub enc_key: String,
    pub enc_verification_key: String,
    pub request_signature: String,
    pub certificate: CertificateBody,
}

#[derive(Serialize)]
pub struct CertificateBody {
    pub user: String,
    pub session_vk: String,
    pub creation_time: i64,
    pub ttl_min: u8,
    pub signature: String,
}

#[derive(Deserialize)]
pub struct FetchKeyResponseBody {
    pub decryption_keys: Vec<DecryptionKeyEntry>,
}

#[derive(Deserialize)]
pub struct DecryptionKeyEntry {
    pub id: String,
    pub encrypted_key: [String; 2],
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
pub struct ServiceInfo {
    pub service_id: String,
    pub pop: String,
}

/// Transport boundary for `POST {url}/v1/fetch_key`, injected so the fetch
/// orchestrator in `fetch.rs` is testable without a live key server.
#[async_trait::async_trait]
pub trait KeyServerTransport: Send + Sync {
    async fn fetch_key(
        &self,
        url: &str,
        request_id: &str,
        body: &FetchKeyRequestBody,
    ) -> Result<FetchKeyResponseBody, ClientError>;

    /// `GET {url}/v1/service`, used for the optional proof-of-possession
    /// verification path.
    async fn get_service(&self, url: &str) -> Result<ServiceInfo, ClientError>;
}

pub struct ReqwestKeyServerTransport {
    client: reqwest::Client,
}

impl ReqwestKeyServerTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is static and always valid");
        ReqwestKeyServerTransport { client }
    }
}

#[async_trait::async_trait]
impl KeyServerTransport for ReqwestKeyServerTransport {
    async fn fetch_key(
        &self,
        url: &str,
        request_id: &str,
        body: &FetchKeyRequestBody,
    ) -> Result<FetchKeyResponseBody, ClientError> {
        let response = self
            .client
            .post(format!("{url}/v1/fetch_key"))
            .header("Content-Type", "application/json")
            .header("Request-Id", request_id)
            .header("Client-Sdk-Type", SDK_TYPE)
            .header("Client-Sdk-Version", SDK_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let request_id = request_id.to_string();
            let error_kind = response
                .json::<ErrorBody>()
                .await
                .map(|b| ServerErrorKind::from_wire(&b.error))
                .unwrap_or_else(|_| ServerErrorKind::GeneralError("unparseable error body".into()));
            return Err(ClientError::Server(ServerError {
                kind: error_kind,
                status: status.as_u16(),
                request_id,
            }));
        }

        response
            .json::<FetchKeyResponseBody>()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn get_service(&self, url: &str) -> Result<ServiceInfo, ClientError> {
        self.client
            .get(format!("{url}/v1/service"))
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?
            .json::<ServiceInfo>()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}
