//! Full-identity construction: the contract between this client and the
//! on-chain verifier for what bytes get hashed into the IBE identity point.

pub use seal_crypto::curve::IBE_DST as DST;

/// Domain-separation tag for key-server proof-of-possession, distinct from
/// the identity-hashing DST above.
pub const DST_POP: &[u8] = b"SUI-SEAL-IBE-BLS12381-POP-00";

pub const PACKAGE_ID_BYTES: usize = 32;

/// `len(DST) || DST || packageId(32) || innerId(var)`.
///
/// The leading length byte is part of the wire contract: it lets the
/// on-chain verifier locate the end of the DST without needing to know it
/// out of band.
pub fn create_full_id(package_id: &[u8; PACKAGE_ID_BYTES], inner_id: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + DST.len() + PACKAGE_ID_BYTES + inner_id.len());
    out.push(DST.len() as u8);
    out.extend_from_slice(DST);
    out.extend_from_slice(package_id);
    out.extend_from_slice(inner_id);
    out
}

/// Lower-hex rendering used as the stable string key for the key cache.
pub fn full_id_hex(package_id: &[u8; PACKAGE_ID_BYTES], inner_id: &[u8]) -> String {
    hex::encode(create_full_id(package_id, inner_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_id_layout_matches_contract() {
        let package_id = [0u8; 32];
        let inner_id = [0x01, 0x02, 0x03, 0x04];
        let full = create_full_id(&package_id, &inner_id);

        assert_eq!(full[0] as usize, DST.len());
        assert_eq!(&full[1..1 + DST.len()], DST);
        assert_eq!(&full[1 + DST.len()..1 + DST.len() + 32], &package_id);
        assert_eq!(&full[1 + DST.len() + 32..], &inner_id);
    }

    #[test]
    fn distinct_inner_ids_yield_distinct_full_ids() {
        let package_id = [1u8; 32];
        let a = create_full_id(&package_id, b"alice");
        let b = create_full_id(&package_id, b"bob");
        assert_ne!(a, b);
    }
}
