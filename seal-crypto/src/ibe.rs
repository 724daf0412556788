//! Boneh–Franklin identity-based encryption over BLS12-381, batched so one
//! shared random scalar spans every recipient server.

use subtle::ConstantTimeEq;

use crate::curve::{G1, G2};
use crate::error::CryptoError;
use crate::kdf::kdf;

/// A single server's contribution to a batched encapsulation: the secret
/// share being sealed to it, and the KDF `info` tag bound to that share
/// (the share's positional index).
pub struct Recipient<'a> {
    pub public_key: G2,
    pub message: &'a [u8; 32],
    pub info: &'a [u8],
}

pub struct BatchedEncryption {
    pub nonce: G2,
    pub encrypted_shares: Vec<[u8; 32]>,
    pub encrypted_randomness: [u8; 32],
}

/// Samples one random scalar `r` and seals `recipients[i].message` to
/// `recipients[i].public_key` under the shared identity point
/// `hash_to_curve(id_bytes) * r`.
pub fn encrypt_batched(
    id_bytes: &[u8],
    recipients: &[Recipient<'_>],
    randomness_key: &[u8; 32],
) -> BatchedEncryption {
    let r = crate::curve::Scalar::random();
    let nonce = G2::generator().mul(&r);
    let gid = G1::hash_to_curve(id_bytes).mul(&r);

    let encrypted_shares = recipients
        .iter()
        .map(|recipient| {
            let k = gid.pairing(&recipient.public_key);
            let mask = kdf(&k, recipient.info);
            xor32(recipient.message, &mask)
        })
        .collect();

    let encrypted_randomness = xor32(randomness_key, &r.to_bytes());

    BatchedEncryption {
        nonce,
        encrypted_shares,
        encrypted_randomness,
    }
}

/// Recovers one server's share from its user secret key.
pub fn decrypt(
    nonce: &G2,
    user_secret_key: &G1,
    ciphertext: &[u8; 32],
    info: &[u8],
) -> [u8; 32] {
    let k = user_secret_key.pairing(nonce);
    let mask = kdf(&k, info);
    xor32(ciphertext, &mask)
}

/// `e(usk, g2) == e(H(fullId), serverPk)`.
pub fn verify_user_secret_key(usk: &G1, full_id: &[u8], server_pk: &G2) -> bool {
    let lhs = usk.pairing(&G2::generator());
    let id_point = G1::hash_to_curve(full_id);
    let rhs = id_point.pairing(server_pk);

    let lhs_bytes = crate::curve::gt_to_bytes(&lhs);
    let rhs_bytes = crate::curve::gt_to_bytes(&rhs);
    bool::from(lhs_bytes.ct_eq(&rhs_bytes))
}

/// Generates a server master keypair: `(sk, pk = g2 * sk)`.
///
/// Used by callers that stand up their own test/demo key servers; real
/// deployments source `pk` from the ledger record instead.
pub fn generate_key_pair() -> (crate::curve::Scalar, G2) {
    let sk = crate::curve::Scalar::random();
    let pk = G2::generator().mul(&sk);
    (sk, pk)
}

/// Extracts a user secret key for `full_id` from a server's master secret
/// key: `usk = H(fullId) * sk`.
pub fn extract(master_sk: &crate::curve::Scalar, full_id: &[u8]) -> G1 {
    G1::hash_to_curve(full_id).mul(master_sk)
}

fn xor32(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_id(package_id: &[u8; 32], inner_id: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.push(crate::curve::IBE_DST.len() as u8);
        v.extend_from_slice(crate::curve::IBE_DST);
        v.extend_from_slice(package_id);
        v.extend_from_slice(inner_id);
        v
    }

    #[test]
    fn batched_encrypt_decrypt_round_trips_for_every_server() {
        let (sk_a, pk_a) = generate_key_pair();
        let (sk_b, pk_b) = generate_key_pair();
        let id = full_id(&[0u8; 32], b"\x01\x02\x03\x04");

        let share_a = [1u8; 32];
        let share_b = [2u8; 32];
        let randomness_key = [7u8; 32];

        let enc = encrypt_batched(
            &id,
            &[
                Recipient { public_key: pk_a, message: &share_a, info: &[1] },
                Recipient { public_key: pk_b, message: &share_b, info: &[2] },
            ],
            &randomness_key,
        );

        let usk_a = extract(&sk_a, &id);
        let usk_b = extract(&sk_b, &id);

        let recovered_a = decrypt(&enc.nonce, &usk_a, &enc.encrypted_shares[0], &[1]);
        let recovered_b = decrypt(&enc.nonce, &usk_b, &enc.encrypted_shares[1], &[2]);

        assert_eq!(recovered_a, share_a);
        assert_eq!(recovered_b, share_b);
    }

    #[test]
    fn verify_user_secret_key_accepts_valid_and_rejects_tampered() {
        let (sk, pk) = generate_key_pair();
        let id = full_id(&[0u8; 32], b"\x01\x02\x03\x04");
        let usk = extract(&sk, &id);

        assert!(verify_user_secret_key(&usk, &id, &pk));

        let mut bad_id = id.clone();
        *bad_id.last_mut().unwrap() ^= 0xff;
        assert!(!verify_user_secret_key(&usk, &bad_id, &pk));

        let (_, other_pk) = generate_key_pair();
        assert!(!verify_user_secret_key(&usk, &id, &other_pk));
    }

    #[test]
    fn decrypting_with_wrong_server_key_yields_garbage() {
        let (sk_a, pk_a) = generate_key_pair();
        let (sk_wrong, _pk_wrong) = generate_key_pair();
        let id = full_id(&[0u8; 32], b"\x01\x02\x03\x04");

        let share = [9u8; 32];
        let enc = encrypt_batched(
            &id,
            &[Recipient { public_key: pk_a, message: &share, info: &[1] }],
            &[3u8; 32],
        );

        let usk_wrong = extract(&sk_wrong, &id);
        let garbage = decrypt(&enc.nonce, &usk_wrong, &enc.encrypted_shares[0], &[1]);
        assert_ne!(garbage, share);
        let _ = sk_a;
    }
}
