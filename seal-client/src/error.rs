use thiserror::Error;

use seal_core::SealError;

/// Errors returned by a key server's `/v1/fetch_key` endpoint, mapped from
/// its JSON `{ "error": "..." }` body.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ServerErrorKind {
    #[error("invalid PTB")]
    InvalidPTB,
    #[error("invalid package")]
    InvalidPackage,
    #[error("old package version")]
    OldPackageVersion,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid session signature")]
    InvalidSessionSignature,
    #[error("no access")]
    NoAccess,
    #[error("invalid certificate")]
    InvalidCertificate,
    #[error("internal error (retryable)")]
    InternalError,
    #[error("server error: {0}")]
    GeneralError(String),
}

impl ServerErrorKind {
    /// Maps a key server's `error` field to a typed kind, falling back to
    /// `GeneralError` for anything unrecognized rather than failing parse.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "InvalidPTB" => ServerErrorKind::InvalidPTB,
            "InvalidPackage" => ServerErrorKind::InvalidPackage,
            "OldPackageVersion" => ServerErrorKind::OldPackageVersion,
            "InvalidSignature" => ServerErrorKind::InvalidSignature,
            "InvalidSessionSignature" => ServerErrorKind::InvalidSessionSignature,
            "NoAccess" => ServerErrorKind::NoAccess,
            "InvalidCertificate" => ServerErrorKind::InvalidCertificate,
            "InternalError" => ServerErrorKind::InternalError,
            other => ServerErrorKind::GeneralError(other.to_string()),
        }
    }
}

/// A server error carrying the originating request id for cross-system
/// correlation.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("server error ({request_id}, HTTP {status}): {kind}")]
pub struct ServerError {
    pub kind: ServerErrorKind,
    pub status: u16,
    pub request_id: String,
}

/// Full error taxonomy for `seal-client`, folding in `seal-core`'s
/// codec/descriptor errors and `seal-crypto`'s leaf errors.
#[derive(Debug, Error, Clone)]
pub enum ClientError {
    #[error(transparent)]
    Core(#[from] SealError),

    #[error("{0}")]
    UserError(String),

    #[error("session key has expired")]
    ExpiredSessionKey,

    #[error("personal message signature did not verify")]
    InvalidPersonalMessageSignature,

    #[error("envelope's key-server set is not a subset-with-equal-count of the configured servers")]
    InconsistentKeyServers,

    #[error("fewer than {required} usable shares were recovered for this identity")]
    InsufficientShares { required: usize },

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("request to key server timed out or failed: {0}")]
    Transport(String),

    #[error("request was cancelled")]
    Aborted,
}

impl PartialEq for ClientError {
    fn eq(&self, other: &Self) -> bool {
        format!("{self:?}") == format!("{other:?}")
    }
}
