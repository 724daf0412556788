//! Data-encapsulation mechanisms: authenticated symmetric encryption of the
//! payload under the key recovered from the threshold layer.
//!
//! `Aes256Gcm` reuses a single fixed 96-bit IV across every message. That is
//! only safe because every message is encrypted under an independently
//! random key (`deriveKey(Dem, freshBaseKey)`; see `seal-crypto::kdf`) — no
//! key is ever reused across two ciphertexts. If that invariant ever
//! changes, the IV must become per-message random too.

use hmac::{Hmac, Mac};
use ring::aead::{self, BoundKey, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey};
use sha3::Sha3_256;

use crate::error::CryptoError;

type HmacSha3 = Hmac<Sha3_256>;

const FIXED_NONCE: [u8; 12] = [
    0x8a, 0x37, 0x99, 0xfd, 0xc6, 0x2e, 0x79, 0xdb, 0xa0, 0x80, 0x59, 0x07,
];
const CTR_BLOCK_SIZE: usize = 32;

/// Wire-level ciphertext variants, one per DEM mode.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Ciphertext {
    Aes256Gcm {
        blob: Vec<u8>,
        aad: Option<Vec<u8>>,
    },
    Hmac256Ctr {
        blob: Vec<u8>,
        mac: [u8; 32],
        aad: Option<Vec<u8>>,
    },
    Plain,
}

struct FixedNonce(Option<[u8; 12]>);

impl NonceSequence for FixedNonce {
    fn advance(&mut self) -> Result<Nonce, ring::error::Unspecified> {
        let bytes = self.0.take().ok_or(ring::error::Unspecified)?;
        Ok(Nonce::assume_unique_for_key(bytes))
    }
}

pub fn generate_key() -> [u8; 32] {
    use rand::RngCore;
    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

pub fn aes_256_gcm_encrypt(
    key: &[u8; 32],
    plaintext: &[u8],
    aad: Option<&[u8]>,
) -> Result<Ciphertext, CryptoError> {
    let unbound = UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::InvalidLength { expected: 32, actual: key.len() })?;
    let mut sealing = SealingKey::new(unbound, FixedNonce(Some(FIXED_NONCE)));

    let mut in_out = plaintext.to_vec();
    sealing
        .seal_in_place_append_tag(aead::Aad::from(aad.unwrap_or(&[])), &mut in_out)
        .map_err(|_| CryptoError::TagMismatch)?;

    Ok(Ciphertext::Aes256Gcm {
        blob: in_out,
        aad: aad.map(|a| a.to_vec()),
    })
}

pub fn aes_256_gcm_decrypt(key: &[u8; 32], ct: &Ciphertext) -> Result<Vec<u8>, CryptoError> {
    let (blob, aad) = match ct {
        Ciphertext::Aes256Gcm { blob, aad } => (blob, aad),
        _ => return Err(CryptoError::WrongCiphertextVariant),
    };

    let unbound = UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::InvalidLength { expected: 32, actual: key.len() })?;
    let mut opening = OpeningKey::new(unbound, FixedNonce(Some(FIXED_NONCE)));

    let mut in_out = blob.clone();
    let plaintext = opening
        .open_in_place(
            aead::Aad::from(aad.as_deref().unwrap_or(&[])),
            &mut in_out,
        )
        .map_err(|_| CryptoError::TagMismatch)?;

    Ok(plaintext.to_vec())
}

/// Deterministic authenticated encryption: HMAC-SHA3-256 as a counter-mode
/// keystream, with a separate HMAC-SHA3-256 MAC over `len(aad) || aad ||
/// ciphertext`.
pub fn hmac_256_ctr_encrypt(
    key: &[u8; 32],
    plaintext: &[u8],
    aad: Option<&[u8]>,
) -> Result<Ciphertext, CryptoError> {
    let ek = derive_sub_key(key, 1)?;
    let mk = derive_sub_key(key, 2)?;

    let blob = apply_keystream(&ek, plaintext)?;
    let mac = compute_mac(&mk, aad.unwrap_or(&[]), &blob)?;

    Ok(Ciphertext::Hmac256Ctr {
        blob,
        mac,
        aad: aad.map(|a| a.to_vec()),
    })
}

pub fn hmac_256_ctr_decrypt(key: &[u8; 32], ct: &Ciphertext) -> Result<Vec<u8>, CryptoError> {
    let (blob, mac, aad) = match ct {
        Ciphertext::Hmac256Ctr { blob, mac, aad } => (blob, mac, aad),
        _ => return Err(CryptoError::WrongCiphertextVariant),
    };

    let mk = derive_sub_key(key, 2)?;
    let expected_mac = compute_mac(&mk, aad.as_deref().unwrap_or(&[]), blob)?;
    if !bool::from(subtle::ConstantTimeEq::ct_eq(&expected_mac[..], &mac[..])) {
        return Err(CryptoError::TagMismatch);
    }

    let ek = derive_sub_key(key, 1)?;
    apply_keystream(&ek, blob)
}

fn derive_sub_key(key: &[u8; 32], domain_byte: u8) -> Result<[u8; 32], CryptoError> {
    let mut mac = HmacSha3::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidLength { expected: 32, actual: key.len() })?;
    mac.update(&[domain_byte]);
    let out = mac.finalize().into_bytes();
    let mut result = [0u8; 32];
    result.copy_from_slice(&out);
    Ok(result)
}

fn apply_keystream(ek: &[u8; 32], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut out = Vec::with_capacity(data.len());
    for (block_index, chunk) in data.chunks(CTR_BLOCK_SIZE).enumerate() {
        let mut mac = HmacSha3::new_from_slice(ek)
            .map_err(|_| CryptoError::InvalidLength { expected: 32, actual: ek.len() })?;
        mac.update(&(block_index as u64).to_le_bytes());
        let mask = mac.finalize().into_bytes();
        for (b, m) in chunk.iter().zip(mask.iter()) {
            out.push(b ^ m);
        }
    }
    Ok(out)
}

fn compute_mac(mk: &[u8; 32], aad: &[u8], ciphertext: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut mac = HmacSha3::new_from_slice(mk)
        .map_err(|_| CryptoError::InvalidLength { expected: 32, actual: mk.len() })?;
    mac.update(&(aad.len() as u64).to_le_bytes());
    mac.update(aad);
    mac.update(ciphertext);
    let out = mac.finalize().into_bytes();
    let mut result = [0u8; 32];
    result.copy_from_slice(&out);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes_gcm_round_trips() {
        let key = generate_key();
        let aad = b"context".to_vec();
        let ct = aes_256_gcm_encrypt(&key, b"hello seal", Some(&aad)).unwrap();
        let pt = aes_256_gcm_decrypt(&key, &ct).unwrap();
        assert_eq!(pt, b"hello seal");
    }

    #[test]
    fn aes_gcm_tamper_detected() {
        let key = generate_key();
        let mut ct = aes_256_gcm_encrypt(&key, b"hello seal", None).unwrap();
        if let Ciphertext::Aes256Gcm { blob, .. } = &mut ct {
            blob[0] ^= 0xff;
        }
        assert!(aes_256_gcm_decrypt(&key, &ct).is_err());
    }

    #[test]
    fn hmac_ctr_round_trips() {
        let key = generate_key();
        let aad = b"ctx".to_vec();
        let ct = hmac_256_ctr_encrypt(&key, b"the message", Some(&aad)).unwrap();
        let pt = hmac_256_ctr_decrypt(&key, &ct).unwrap();
        assert_eq!(pt, b"the message");
    }

    #[test]
    fn hmac_ctr_aad_swap_fails_mac() {
        let key = generate_key();
        let ct = hmac_256_ctr_encrypt(&key, b"the message", Some(b"aad-a")).unwrap();
        let (blob, mac) = match &ct {
            Ciphertext::Hmac256Ctr { blob, mac, .. } => (blob.clone(), *mac),
            _ => unreachable!(),
        };
        let swapped = Ciphertext::Hmac256Ctr {
            blob,
            mac,
            aad: Some(b"aad-b".to_vec()),
        };
        assert!(matches!(
            hmac_256_ctr_decrypt(&key, &swapped),
            Err(CryptoError::TagMismatch)
        ));
    }

    /// Known-answer vector for the Hmac256Ctr mode.
    #[test]
    fn hmac_ctr_regression_vector() {
        let key: [u8; 32] = hex::decode(
            "5bfdfd7c814903f1311bebacfffa3c001cbeb1cbb3275baa9aafe21fadd9f396",
        )
        .unwrap()
        .try_into()
        .unwrap();
        let aad = b"Mark Twain";
        let plaintext = b"The difference between a Miracle and a Fact is exactly the \
difference between a mermaid and a seal.";

        let ct = hmac_256_ctr_encrypt(&key, plaintext, Some(aad)).unwrap();
        let (blob, mac) = match &ct {
            Ciphertext::Hmac256Ctr { blob, mac, .. } => (blob.clone(), *mac),
            _ => unreachable!(),
        };

        let expected_blob = hex::decode(
            "b0c4eee6fbd97a2fb86bbd1e0dafa47d2ce5c9e8975a50c2d9eae02ebede8fee6b6434e68584be475b89089fce4c451cbd4c0d6e00dbcae1241abaf237df2eccdd86b890d35e4e8ae9418386012891d8413483d64179ce1d7fe69ad25d546495df54a1",
        )
        .unwrap();
        let expected_mac = hex::decode(
            "5de3ffdd9d7a258e651ebdba7d80839df2e19ea40cd35b6e1b06375181a0c2f2",
        )
        .unwrap();

        assert_eq!(blob, expected_blob);
        assert_eq!(&mac[..], &expected_mac[..]);

        let pt = hmac_256_ctr_decrypt(&key, &ct).unwrap();
        assert_eq!(pt, plaintext);
    }
}
