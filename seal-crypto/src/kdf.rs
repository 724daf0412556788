//! Key derivation built on HKDF-SHA3-256 and HMAC-SHA3-256.

use fastcrypto::groups::bls12381::GTElement;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha3::Sha3_256;

use crate::curve::{gt_to_bytes, GT_BYTES};
use crate::error::CryptoError;

type HmacSha3 = Hmac<Sha3_256>;

const GT_BLOCK_SIZE: usize = GT_BYTES / 6;
/// Maps GT coefficient block `i` (pairing-library order) onto the byte
/// position the on-chain verifier expects it at.
const GT_BLOCK_PERMUTATION: [usize; 6] = [0, 2, 4, 1, 3, 5];

/// Sub-key purposes derived from the freshly generated DEM root key.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeyPurpose {
    EncryptedRandomness,
    Dem,
}

impl KeyPurpose {
    fn domain_byte(self) -> u8 {
        match self {
            KeyPurpose::EncryptedRandomness => 0,
            KeyPurpose::Dem => 1,
        }
    }
}

/// Harmonizes a pairing result's serialization with the on-chain
/// verifier's coefficient layout, then runs HKDF-SHA3-256 over it.
pub fn kdf(input: &GTElement, info: &[u8]) -> [u8; 32] {
    let serialized = gt_to_bytes(input);
    let mut permuted = [0u8; GT_BYTES];
    for (dst_block, &src_block) in GT_BLOCK_PERMUTATION.iter().enumerate() {
        let src = &serialized[src_block * GT_BLOCK_SIZE..(src_block + 1) * GT_BLOCK_SIZE];
        permuted[dst_block * GT_BLOCK_SIZE..(dst_block + 1) * GT_BLOCK_SIZE].copy_from_slice(src);
    }

    let hk = Hkdf::<Sha3_256>::new(None, &permuted);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .expect("32 is a valid HKDF-SHA3-256 output length");
    okm
}

/// Derives a 32-byte sub-purpose key from a base key via
/// HMAC-SHA3-256(base_key, [purpose_byte]).
pub fn derive_key(purpose: KeyPurpose, base_key: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
    let mut mac =
        HmacSha3::new_from_slice(base_key).map_err(|_| CryptoError::InvalidLength {
            expected: 32,
            actual: base_key.len(),
        })?;
    mac.update(&[purpose.domain_byte()]);
    let out = mac.finalize().into_bytes();
    let mut result = [0u8; 32];
    result.copy_from_slice(&out);
    Ok(result)
}
