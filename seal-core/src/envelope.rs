//! The on-wire `EncryptedObject` envelope: canonical little-endian binary
//! encoding, one discriminator byte per tagged union.
//!
//! Tagged unions are modeled as Rust enums matched exhaustively rather than
//! dispatched through a trait object.

use std::io::{Cursor, Read, Write};

use seal_crypto::curve::{G2, G2_BYTES};
use seal_crypto::dem::Ciphertext;

use crate::encoding::{
    decode_bytes, decode_option, decode_vec, encode_bytes, encode_option, encode_vec, Decodable,
    DecodeError, Encodable,
};
use crate::error::SealError;
use crate::key_server::OBJECT_ID_BYTES;

pub const CURRENT_VERSION: u8 = 0;

/// One server's slot in the envelope: its ledger object id and the
/// positional share index it was encrypted under. Duplicates are permitted
/// — a server may hold more than one share.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ServiceEntry {
    pub object_id: [u8; OBJECT_ID_BYTES],
    pub share_index: u8,
}

impl Encodable for ServiceEntry {
    fn consensus_encode(&self, writer: &mut impl Write) -> std::io::Result<()> {
        self.object_id.consensus_encode(writer)?;
        self.share_index.consensus_encode(writer)
    }
}

impl Decodable for ServiceEntry {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        Ok(ServiceEntry {
            object_id: Decodable::consensus_decode(reader)?,
            share_index: Decodable::consensus_decode(reader)?,
        })
    }
}

/// The only KEM variant this version of the protocol knows about. Kept as
/// a single-armed enum (rather than a bare struct) so adding a second KEM
/// later is a non-breaking enum variant addition, matching the
/// `ciphertext` tagged union right below it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EncryptedShares {
    BonehFranklinBLS12381 {
        nonce: G2,
        encrypted_shares: Vec<[u8; 32]>,
        encrypted_randomness: [u8; 32],
    },
}

impl Encodable for EncryptedShares {
    fn consensus_encode(&self, writer: &mut impl Write) -> std::io::Result<()> {
        match self {
            EncryptedShares::BonehFranklinBLS12381 {
                nonce,
                encrypted_shares,
                encrypted_randomness,
            } => {
                0u8.consensus_encode(writer)?;
                nonce.to_bytes().consensus_encode(writer)?;
                encode_vec(
                    &encrypted_shares
                        .iter()
                        .map(|s| FixedBlock(*s))
                        .collect::<Vec<_>>(),
                    writer,
                )?;
                encrypted_randomness.consensus_encode(writer)
            }
        }
    }
}

impl Decodable for EncryptedShares {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        match u8::consensus_decode(reader)? {
            0 => {
                let nonce_bytes: [u8; G2_BYTES] = Decodable::consensus_decode(reader)?;
                let nonce = G2::from_bytes(&nonce_bytes)?;
                let encrypted_shares: Vec<FixedBlock> = decode_vec(reader)?;
                let encrypted_randomness: [u8; 32] = Decodable::consensus_decode(reader)?;
                Ok(EncryptedShares::BonehFranklinBLS12381 {
                    nonce,
                    encrypted_shares: encrypted_shares.into_iter().map(|b| b.0).collect(),
                    encrypted_randomness,
                })
            }
            other => Err(DecodeError::UnknownVariant(other)),
        }
    }
}

/// Newtype so `[u8; 32]` share blocks get an `Encodable`/`Decodable` impl
/// distinct from the generic fixed-array impl's use as raw id/key bytes
/// elsewhere — purely a naming convenience, same representation.
#[derive(Clone, Copy)]
struct FixedBlock([u8; 32]);

impl Encodable for FixedBlock {
    fn consensus_encode(&self, writer: &mut impl Write) -> std::io::Result<()> {
        self.0.consensus_encode(writer)
    }
}

impl Decodable for FixedBlock {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        Ok(FixedBlock(Decodable::consensus_decode(reader)?))
    }
}

impl Encodable for Ciphertext {
    fn consensus_encode(&self, writer: &mut impl Write) -> std::io::Result<()> {
        match self {
            Ciphertext::Aes256Gcm { blob, aad } => {
                0u8.consensus_encode(writer)?;
                encode_bytes(blob, writer)?;
                encode_option(aad.as_deref(), writer)
            }
            Ciphertext::Hmac256Ctr { blob, mac, aad } => {
                1u8.consensus_encode(writer)?;
                encode_bytes(blob, writer)?;
                mac.consensus_encode(writer)?;
                encode_option(aad.as_deref(), writer)
            }
            Ciphertext::Plain => 2u8.consensus_encode(writer),
        }
    }
}

impl Decodable for Ciphertext {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        match u8::consensus_decode(reader)? {
            0 => Ok(Ciphertext::Aes256Gcm {
                blob: decode_bytes(reader)?,
                aad: decode_option(reader)?,
            }),
            1 => {
                let blob = decode_bytes(reader)?;
                let mac: [u8; 32] = Decodable::consensus_decode(reader)?;
                let aad = decode_option(reader)?;
                Ok(Ciphertext::Hmac256Ctr { blob, mac, aad })
            }
            2 => Ok(Ciphertext::Plain),
            other => Err(DecodeError::UnknownVariant(other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EncryptedObject {
    pub version: u8,
    pub package_id: [u8; 32],
    pub id: Vec<u8>,
    pub services: Vec<ServiceEntry>,
    pub threshold: u8,
    pub encrypted_shares: EncryptedShares,
    pub ciphertext: Ciphertext,
}

impl EncryptedObject {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.version.consensus_encode(&mut out).expect("Vec write cannot fail");
        self.package_id.consensus_encode(&mut out).expect("Vec write cannot fail");
        encode_bytes(&self.id, &mut out).expect("Vec write cannot fail");
        encode_vec(&self.services, &mut out).expect("Vec write cannot fail");
        self.threshold.consensus_encode(&mut out).expect("Vec write cannot fail");
        self.encrypted_shares.consensus_encode(&mut out).expect("Vec write cannot fail");
        self.ciphertext.consensus_encode(&mut out).expect("Vec write cannot fail");
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SealError> {
        let mut cursor = Cursor::new(bytes);

        let version = u8::consensus_decode(&mut cursor)
            .map_err(|e| SealError::InvalidCiphertext(e.to_string()))?;
        if version != CURRENT_VERSION {
            return Err(SealError::UnsupportedFeature(format!(
                "envelope version {version}"
            )));
        }

        let package_id: [u8; 32] = Decodable::consensus_decode(&mut cursor)
            .map_err(|e| SealError::InvalidCiphertext(e.to_string()))?;
        let id = decode_bytes(&mut cursor).map_err(|e| SealError::InvalidCiphertext(e.to_string()))?;
        let services: Vec<ServiceEntry> =
            decode_vec(&mut cursor).map_err(|e| SealError::InvalidCiphertext(e.to_string()))?;
        let threshold =
            u8::consensus_decode(&mut cursor).map_err(|e| SealError::InvalidCiphertext(e.to_string()))?;
        let encrypted_shares = EncryptedShares::consensus_decode(&mut cursor)
            .map_err(|e| SealError::InvalidCiphertext(e.to_string()))?;
        let ciphertext = Ciphertext::consensus_decode(&mut cursor)
            .map_err(|e| SealError::InvalidCiphertext(e.to_string()))?;

        let mut trailing = Vec::new();
        cursor
            .read_to_end(&mut trailing)
            .map_err(|e| SealError::InvalidCiphertext(e.to_string()))?;
        if !trailing.is_empty() {
            return Err(SealError::InvalidCiphertext(
                "trailing bytes after ciphertext".to_string(),
            ));
        }

        let share_count = match &encrypted_shares {
            EncryptedShares::BonehFranklinBLS12381 {
                encrypted_shares, ..
            } => encrypted_shares.len(),
        };
        if share_count != services.len() {
            return Err(SealError::InvalidCiphertext(format!(
                "services has {} entries but encryptedShares has {}",
                services.len(),
                share_count
            )));
        }

        if threshold == 0 || threshold as usize > services.len() {
            return Err(SealError::InvalidThreshold {
                threshold: threshold as usize,
                n: services.len(),
            });
        }

        Ok(EncryptedObject {
            version,
            package_id,
            id,
            services,
            threshold,
            encrypted_shares,
            ciphertext,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seal_crypto::curve::Scalar;

    fn sample(n: usize, threshold: u8) -> EncryptedObject {
        let nonce = G2::generator().mul(&Scalar::random());
        EncryptedObject {
            version: CURRENT_VERSION,
            package_id: [3u8; 32],
            id: b"\x01\x02\x03\x04".to_vec(),
            services: (0..n)
                .map(|i| ServiceEntry {
                    object_id: [i as u8; 32],
                    share_index: (i + 1) as u8,
                })
                .collect(),
            threshold,
            encrypted_shares: EncryptedShares::BonehFranklinBLS12381 {
                nonce,
                encrypted_shares: (0..n).map(|i| [i as u8; 32]).collect(),
                encrypted_randomness: [9u8; 32],
            },
            ciphertext: Ciphertext::Aes256Gcm {
                blob: b"ciphertext blob".to_vec(),
                aad: Some(b"aad".to_vec()),
            },
        }
    }

    #[test]
    fn round_trips_exactly() {
        let env = sample(3, 2);
        let bytes = env.to_bytes();
        let parsed = EncryptedObject::from_bytes(&bytes).unwrap();
        assert_eq!(env, parsed);
    }

    #[test]
    fn round_trips_plain_ciphertext_and_threshold_one() {
        let mut env = sample(3, 1);
        env.ciphertext = Ciphertext::Plain;
        let bytes = env.to_bytes();
        let parsed = EncryptedObject::from_bytes(&bytes).unwrap();
        assert_eq!(env, parsed);
    }

    #[test]
    fn round_trips_hmac_ctr_ciphertext() {
        let mut env = sample(2, 2);
        env.ciphertext = Ciphertext::Hmac256Ctr {
            blob: b"blob".to_vec(),
            mac: [1u8; 32],
            aad: None,
        };
        let bytes = env.to_bytes();
        let parsed = EncryptedObject::from_bytes(&bytes).unwrap();
        assert_eq!(env, parsed);
    }

    #[test]
    fn mismatched_share_count_fails_parsing() {
        let mut env = sample(3, 2);
        if let EncryptedShares::BonehFranklinBLS12381 {
            encrypted_shares, ..
        } = &mut env.encrypted_shares
        {
            encrypted_shares.pop();
        }
        let bytes = env.to_bytes();
        assert!(matches!(
            EncryptedObject::from_bytes(&bytes),
            Err(SealError::InvalidCiphertext(_))
        ));
    }

    #[test]
    fn zero_threshold_fails_parsing() {
        let mut env = sample(3, 2);
        env.threshold = 0;
        let bytes = env.to_bytes();
        assert!(matches!(
            EncryptedObject::from_bytes(&bytes),
            Err(SealError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn threshold_above_service_count_fails_parsing() {
        let mut env = sample(2, 2);
        env.threshold = 3;
        let bytes = env.to_bytes();
        assert!(matches!(
            EncryptedObject::from_bytes(&bytes),
            Err(SealError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn unknown_version_fails_parsing() {
        let env = sample(1, 1);
        let mut bytes = env.to_bytes();
        bytes[0] = 99;
        assert!(matches!(
            EncryptedObject::from_bytes(&bytes),
            Err(SealError::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn non_canonical_g2_bytes_in_nonce_fail_parsing() {
        let env = sample(1, 1);
        let mut bytes = env.to_bytes();
        // The G2 nonce follows version(1) + packageId(32) + id len-prefix(4) +
        // id(4) + services len-prefix(4) + services(33) + threshold(1) +
        // discriminator(1).
        let nonce_offset = 1 + 32 + 4 + 4 + 4 + 33 + 1 + 1;
        for b in &mut bytes[nonce_offset..nonce_offset + G2_BYTES] {
            *b = 0xff;
        }
        assert!(matches!(
            EncryptedObject::from_bytes(&bytes),
            Err(SealError::InvalidCiphertext(_))
        ));
    }

    #[test]
    fn truncated_input_fails_parsing() {
        let env = sample(2, 2);
        let bytes = env.to_bytes();
        let truncated = &bytes[..bytes.len() / 2];
        assert!(EncryptedObject::from_bytes(truncated).is_err());
    }
}
