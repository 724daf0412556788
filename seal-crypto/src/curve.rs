//! Thin wrappers over `fastcrypto`'s BLS12-381 group elements giving the
//! rest of the crate a single, canonical-encoding-only surface for scalars
//! and curve points.
//!
//! Every `from_bytes` here rejects non-canonical or non-subgroup encodings
//! (`CryptoError::InvalidPoint`/`InvalidScalar`) instead of silently
//! accepting them, matching `ToFromByteArray`'s own fallible contract.

use fastcrypto::groups::bls12381::{G1Element, G2Element, GTElement, Scalar as FastScalar};
use fastcrypto::groups::{
    GroupElement as FcGroupElement, HashToGroupElement, Pairing, Scalar as FcScalar,
};
use fastcrypto::traits::ToFromByteArray;
use rand::rngs::OsRng;

use crate::error::CryptoError;

pub const SCALAR_BYTES: usize = 32;
pub const G1_BYTES: usize = 48;
pub const G2_BYTES: usize = 96;
pub const GT_BYTES: usize = 576;

/// The domain-separation tag used for hashing full identities into G1.
///
/// Folded directly into the hashed message (see `full_id.rs`) rather than
/// passed to the hasher, since `HashToGroupElement` fixes its own RFC 9380
/// suite and DST internally and takes no caller-supplied DST.
pub const IBE_DST: &[u8] = b"SUI-SEAL-IBE-BLS12381-00";

#[derive(Copy, Clone, Debug)]
pub struct Scalar(pub(crate) FastScalar);

impl Scalar {
    pub fn random() -> Self {
        Scalar(FastScalar::rand(&mut OsRng))
    }

    pub fn to_bytes(&self) -> [u8; SCALAR_BYTES] {
        self.0.to_byte_array()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; SCALAR_BYTES] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidLength {
                    expected: SCALAR_BYTES,
                    actual: bytes.len(),
                })?;
        FastScalar::from_byte_array(&arr)
            .map(Scalar)
            .map_err(|_| CryptoError::InvalidScalar)
    }
}

impl From<u64> for Scalar {
    /// Builds the scalar field element `value` by doubling-and-adding the
    /// field's multiplicative identity, avoiding any assumption about a
    /// library-provided integer conversion.
    fn from(value: u64) -> Self {
        let one = FastScalar::generator();
        let mut acc = FastScalar::zero();
        for i in (0..64).rev() {
            acc = acc + acc;
            if (value >> i) & 1 == 1 {
                acc = acc + one;
            }
        }
        Scalar(acc)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct G1(pub(crate) G1Element);

impl G1 {
    pub fn generator() -> Self {
        G1(G1Element::generator())
    }

    /// Hashes a full-identity byte string (already carrying its own
    /// domain-separation prefix, see `full_id.rs`) to a point in G1.
    pub fn hash_to_curve(msg: &[u8]) -> Self {
        G1(G1Element::hash_to_group_element(msg))
    }

    pub fn mul(&self, s: &Scalar) -> Self {
        G1(self.0 * s.0)
    }

    pub fn add(&self, other: &G1) -> Self {
        G1(self.0 + other.0)
    }

    pub fn sub(&self, other: &G1) -> Self {
        G1(self.0 - other.0)
    }

    pub fn to_bytes(&self) -> [u8; G1_BYTES] {
        self.0.to_byte_array()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; G1_BYTES] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidLength {
                    expected: G1_BYTES,
                    actual: bytes.len(),
                })?;
        G1Element::from_byte_array(&arr)
            .map(G1)
            .map_err(|_| CryptoError::InvalidPoint)
    }

    pub fn pairing(&self, other: &G2) -> GTElement {
        self.0.pairing(&other.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct G2(pub(crate) G2Element);

impl G2 {
    pub fn generator() -> Self {
        G2(G2Element::generator())
    }

    pub fn mul(&self, s: &Scalar) -> Self {
        G2(self.0 * s.0)
    }

    pub fn to_bytes(&self) -> [u8; G2_BYTES] {
        self.0.to_byte_array()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; G2_BYTES] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidLength {
                    expected: G2_BYTES,
                    actual: bytes.len(),
                })?;
        G2Element::from_byte_array(&arr)
            .map(G2)
            .map_err(|_| CryptoError::InvalidPoint)
    }
}

/// Canonical 576-byte encoding of a GT element, exposed for the KDF's
/// coefficient-block permutation.
pub fn gt_to_bytes(gt: &GTElement) -> [u8; GT_BYTES] {
    gt.to_byte_array()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trips() {
        let s = Scalar::random();
        let bytes = s.to_bytes();
        let back = Scalar::from_bytes(&bytes).unwrap();
        assert_eq!(s.to_bytes(), back.to_bytes());
    }

    #[test]
    fn g1_add_sub_are_inverses() {
        let a = G1::generator().mul(&Scalar::random());
        let b = G1::generator().mul(&Scalar::random());
        assert_eq!(a.add(&b).sub(&b), a);
    }

    #[test]
    fn g1_round_trips() {
        let p = G1::generator().mul(&Scalar::random());
        let bytes = p.to_bytes();
        assert_eq!(G1::from_bytes(&bytes).unwrap(), p);
    }

    #[test]
    fn g2_round_trips() {
        let p = G2::generator().mul(&Scalar::random());
        let bytes = p.to_bytes();
        assert_eq!(G2::from_bytes(&bytes).unwrap(), p);
    }

    #[test]
    fn g1_from_bytes_rejects_garbage() {
        let garbage = [0xffu8; G1_BYTES];
        assert!(matches!(
            G1::from_bytes(&garbage),
            Err(CryptoError::InvalidPoint)
        ));
    }

    #[test]
    fn hash_to_curve_is_deterministic() {
        let a = G1::hash_to_curve(b"same input");
        let b = G1::hash_to_curve(b"same input");
        assert_eq!(a, b);
        let c = G1::hash_to_curve(b"different input");
        assert_ne!(a, c);
    }

    /// Regression vector over a zero packageId and a fixed 4-byte innerId,
    /// hashed through the full-ID construction.
    #[test]
    fn hash_to_curve_regression_vector() {
        let package_id = [0u8; 32];
        let inner_id = [0x01u8, 0x02, 0x03, 0x04];
        let mut full_id = Vec::new();
        full_id.push(IBE_DST.len() as u8);
        full_id.extend_from_slice(IBE_DST);
        full_id.extend_from_slice(&package_id);
        full_id.extend_from_slice(&inner_id);

        let point = G1::hash_to_curve(&full_id);
        let expected =
            hex::decode("b32685b6ffd1f373faf3abb10c05772e033f75da8af729c3611d81aea845670db48ceadd0132d3a667dbbaa36acefac7")
                .unwrap();
        assert_eq!(point.to_bytes().to_vec(), expected);
    }
}
