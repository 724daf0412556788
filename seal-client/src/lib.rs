//! Session lifecycle, certificate issuance, and partial-key fetch
//! orchestration for policy-gated identity-based decryption.
//!
//! This crate owns every async/HTTP/wallet-facing surface of the
//! protocol; `seal-core` below it is synchronous and has no knowledge of
//! sessions or transport.

pub mod client;
pub mod collaborators;
pub mod error;
pub mod fetch;
pub mod session;

pub use client::{DecryptArgs, DemType, EncryptArgs, EncryptResult, SealClient, SealClientOptions};
pub use error::{ClientError, ServerError, ServerErrorKind};
pub use fetch::KeyCache;
pub use session::{Certificate, RequestParams, SessionKey, Signer, WalletVerifier};
