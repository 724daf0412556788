//! Shamir secret sharing of the 32-byte DEM root key, with a
//! cryptographically-degenerate `t = 1` fast path: a single share simply
//! carries the secret in the clear rather than running interpolation over a
//! degree-zero polynomial.

use rand::RngCore;

use crate::error::CryptoError;

pub const SECRET_BYTES: usize = 32;

/// One recipient's share: a 1-based positional index and the share bytes
/// for that index (one byte of Shamir share per byte of the secret).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Share {
    pub index: u8,
    pub bytes: [u8; SECRET_BYTES],
}

pub fn split(
    secret: &[u8; SECRET_BYTES],
    n: usize,
    t: usize,
) -> Result<Vec<Share>, CryptoError> {
    if t == 0 || t > n || n > 255 {
        return Err(CryptoError::InvalidThreshold { threshold: t, n });
    }

    if t == 1 {
        return Ok((1..=n as u8)
            .map(|index| Share { index, bytes: *secret })
            .collect());
    }

    // Degree-(t-1) polynomial per secret byte; constant term is the
    // secret byte, remaining coefficients are random.
    let mut coefficients = vec![[0u8; SECRET_BYTES]; t];
    coefficients[0] = *secret;
    for coeff in coefficients.iter_mut().skip(1) {
        rand::rngs::OsRng.fill_bytes(coeff);
    }

    let shares = (1..=n as u8)
        .map(|index| {
            let x = index;
            let mut bytes = [0u8; SECRET_BYTES];
            for byte_pos in 0..SECRET_BYTES {
                // Horner's method in GF(256).
                let mut y = 0u8;
                for coeff in coefficients.iter().rev() {
                    y = gf256_add(gf256_mul(y, x), coeff[byte_pos]);
                }
                bytes[byte_pos] = y;
            }
            Share { index, bytes }
        })
        .collect();

    Ok(shares)
}

pub fn combine(shares: &[Share], t: usize) -> Result<[u8; SECRET_BYTES], CryptoError> {
    if shares.len() < t {
        return Err(CryptoError::InsufficientShares {
            required: t,
            got: shares.len(),
        });
    }

    let mut seen = std::collections::HashSet::new();
    for share in shares {
        if !seen.insert(share.index) {
            return Err(CryptoError::DuplicateShareIndex(share.index));
        }
    }

    if t == 1 {
        return Ok(shares[0].bytes);
    }

    let used = &shares[..t];
    let mut secret = [0u8; SECRET_BYTES];
    for byte_pos in 0..SECRET_BYTES {
        let mut acc = 0u8;
        for (i, share_i) in used.iter().enumerate() {
            let mut lagrange_coeff = 1u8;
            for (j, share_j) in used.iter().enumerate() {
                if i == j {
                    continue;
                }
                // lagrange_coeff *= x_j / (x_j - x_i), evaluated at x = 0.
                let numerator = share_j.index;
                let denominator = gf256_add(share_j.index, share_i.index);
                lagrange_coeff = gf256_mul(lagrange_coeff, gf256_div(numerator, denominator));
            }
            acc = gf256_add(acc, gf256_mul(lagrange_coeff, share_i.bytes[byte_pos]));
        }
        secret[byte_pos] = acc;
    }

    Ok(secret)
}

fn gf256_add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// AES's field: GF(2^8) modulo the irreducible polynomial x^8+x^4+x^3+x+1.
fn gf256_mul(mut a: u8, mut b: u8) -> u8 {
    let mut result = 0u8;
    for _ in 0..8 {
        if b & 1 != 0 {
            result ^= a;
        }
        let high_bit_set = a & 0x80 != 0;
        a <<= 1;
        if high_bit_set {
            a ^= 0x1b;
        }
        b >>= 1;
    }
    result
}

fn gf256_inv(a: u8) -> u8 {
    // GF(2^8)* has order 255, so a^254 == a^-1 for a != 0.
    let mut result = 1u8;
    let mut base = a;
    let mut exp = 254u8;
    while exp > 0 {
        if exp & 1 != 0 {
            result = gf256_mul(result, base);
        }
        base = gf256_mul(base, base);
        exp >>= 1;
    }
    result
}

fn gf256_div(a: u8, b: u8) -> u8 {
    gf256_mul(a, gf256_inv(b))
}
