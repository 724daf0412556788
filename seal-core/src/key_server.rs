//! Key-server descriptors and the proof-of-possession check the client runs
//! against them before trusting a published public key.

use seal_crypto::curve::{G1, G2};

use crate::error::SealError;
use crate::full_id::DST_POP;

pub const OBJECT_ID_BYTES: usize = 32;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeyType {
    BonehFranklinBLS12381,
}

/// A key server resolved from the on-chain object at `object_id`. Cached for
/// the lifetime of the owning `SealClient`.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyServer {
    pub object_id: [u8; OBJECT_ID_BYTES],
    pub name: String,
    pub url: String,
    pub key_type: KeyType,
    pub pk: G2,
}

/// Verifies `msg = DST_POP || serverPk(96) || serverObjectId(32)` against the
/// server's published short signature, proving the server controls the
/// secret key behind `pk`.
pub fn verify_proof_of_possession(
    pk: &G2,
    object_id: &[u8; OBJECT_ID_BYTES],
    pop_signature: &G1,
) -> Result<(), SealError> {
    let mut msg = Vec::with_capacity(DST_POP.len() + 96 + OBJECT_ID_BYTES);
    msg.extend_from_slice(DST_POP);
    msg.extend_from_slice(&pk.to_bytes());
    msg.extend_from_slice(object_id);

    let lhs = pop_signature.pairing(&G2::generator());
    let id_point = G1::hash_to_curve(&msg);
    let rhs = id_point.pairing(pk);

    if seal_crypto::curve::gt_to_bytes(&lhs) == seal_crypto::curve::gt_to_bytes(&rhs) {
        Ok(())
    } else {
        Err(SealError::InvalidKeyServer {
            object_id: hex::encode(object_id),
        })
    }
}
