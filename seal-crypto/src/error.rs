use thiserror::Error;

/// Failures surfaced by the curve, KDF/MAC, DEM, IBE and threshold layers.
///
/// These are leaf errors: callers in `seal-core`/`seal-client` fold them
/// into the broader `SealError` taxonomy rather than matching on them
/// directly.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum CryptoError {
    #[error("curve point is not canonically encoded or not in the prime-order subgroup")]
    InvalidPoint,

    #[error("scalar is not a canonical field element")]
    InvalidScalar,

    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("authentication tag did not verify")]
    TagMismatch,

    #[error("threshold must be in [1, n], got threshold={threshold} n={n}")]
    InvalidThreshold { threshold: usize, n: usize },

    #[error("combine requires at least {required} shares, got {got}")]
    InsufficientShares { required: usize, got: usize },

    #[error("share indices must be unique, duplicate index {0}")]
    DuplicateShareIndex(u8),

    #[error("ciphertext is not of the variant this operation expects")]
    WrongCiphertextVariant,
}
