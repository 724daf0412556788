//! Identity-based encryption, key derivation, data encapsulation, and
//! threshold secret sharing over BLS12-381.
//!
//! This crate has no knowledge of sessions, HTTP, or the wire envelope —
//! those live in `seal-core` and `seal-client`. Everything here is a pure,
//! synchronous function over bytes and curve points.

pub mod curve;
pub mod dem;
pub mod error;
pub mod ibe;
pub mod kdf;
pub mod threshold;

pub use error::CryptoError;
