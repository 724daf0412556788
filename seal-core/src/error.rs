use thiserror::Error;

use seal_crypto::CryptoError;

/// Caller-facing taxonomy for the core crate. Transport and server-side
/// errors live in `seal-client` since they depend on an HTTP response; this
/// crate only needs the codec- and descriptor-level kinds.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum SealError {
    #[error("packageId is malformed or zero")]
    InvalidPackage,

    #[error("threshold {threshold} is out of range for {n} servers")]
    InvalidThreshold { threshold: usize, n: usize },

    #[error("envelope failed to parse: {0}")]
    InvalidCiphertext(String),

    #[error("unsupported DEM/KEM/version: {0}")]
    UnsupportedFeature(String),

    #[error("key server {object_id} is not resolvable, has the wrong keyType, or failed proof-of-possession")]
    InvalidKeyServer { object_id: String },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
