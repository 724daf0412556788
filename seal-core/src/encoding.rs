//! A small canonical little-endian binary codec: `Encodable`/`Decodable`
//! traits implemented by hand for every wire type rather than through a
//! derive macro.

use std::io::{self, Read, Write};

use thiserror::Error;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    Eof,
    #[error("unknown discriminator {0}")]
    UnknownVariant(u8),
    #[error("length {0} exceeds the codec's sanity bound")]
    LengthOutOfBounds(u32),
    #[error(transparent)]
    Crypto(#[from] seal_crypto::CryptoError),
}

impl From<io::Error> for DecodeError {
    fn from(_: io::Error) -> Self {
        DecodeError::Eof
    }
}

/// Vectors longer than this are rejected at decode time rather than trusted
/// to allocate; generous relative to any real server list or payload.
const MAX_VEC_LEN: u32 = 1 << 24;

pub trait Encodable {
    fn consensus_encode(&self, writer: &mut impl Write) -> io::Result<()>;

    fn consensus_encode_to_vec(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.consensus_encode(&mut out)
            .expect("writing to a Vec<u8> cannot fail");
        out
    }
}

pub trait Decodable: Sized {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, DecodeError>;
}

impl Encodable for u8 {
    fn consensus_encode(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&[*self])
    }
}

impl Decodable for u8 {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        Ok(buf[0])
    }
}

impl Encodable for u32 {
    fn consensus_encode(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&self.to_le_bytes())
    }
}

impl Decodable for u32 {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
}

impl<const N: usize> Encodable for [u8; N] {
    fn consensus_encode(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(self)
    }
}

impl<const N: usize> Decodable for [u8; N] {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let mut buf = [0u8; N];
        reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Length-prefixed (u32 LE count) byte blob — the canonical convention this
/// codec uses for every variable-length field.
pub fn encode_bytes(bytes: &[u8], writer: &mut impl Write) -> io::Result<()> {
    (bytes.len() as u32).consensus_encode(writer)?;
    writer.write_all(bytes)
}

pub fn decode_bytes(reader: &mut impl Read) -> Result<Vec<u8>, DecodeError> {
    let len = u32::consensus_decode(reader)?;
    if len > MAX_VEC_LEN {
        return Err(DecodeError::LengthOutOfBounds(len));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn encode_vec<T: Encodable>(items: &[T], writer: &mut impl Write) -> io::Result<()> {
    (items.len() as u32).consensus_encode(writer)?;
    for item in items {
        item.consensus_encode(writer)?;
    }
    Ok(())
}

pub fn decode_vec<T: Decodable>(reader: &mut impl Read) -> Result<Vec<T>, DecodeError> {
    let len = u32::consensus_decode(reader)?;
    if len > MAX_VEC_LEN {
        return Err(DecodeError::LengthOutOfBounds(len));
    }
    (0..len).map(|_| T::consensus_decode(reader)).collect()
}

pub fn encode_option(bytes: Option<&[u8]>, writer: &mut impl Write) -> io::Result<()> {
    match bytes {
        Some(b) => {
            1u8.consensus_encode(writer)?;
            encode_bytes(b, writer)
        }
        None => 0u8.consensus_encode(writer),
    }
}

pub fn decode_option(reader: &mut impl Read) -> Result<Option<Vec<u8>>, DecodeError> {
    match u8::consensus_decode(reader)? {
        0 => Ok(None),
        1 => Ok(Some(decode_bytes(reader)?)),
        other => Err(DecodeError::UnknownVariant(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_round_trip() {
        let mut buf = Vec::new();
        encode_bytes(b"hello", &mut buf).unwrap();
        let mut cursor = io::Cursor::new(buf);
        assert_eq!(decode_bytes(&mut cursor).unwrap(), b"hello");
    }

    #[test]
    fn option_round_trips_both_variants() {
        let mut buf = Vec::new();
        encode_option(Some(b"aad"), &mut buf).unwrap();
        let mut cursor = io::Cursor::new(buf);
        assert_eq!(decode_option(&mut cursor).unwrap(), Some(b"aad".to_vec()));

        let mut buf = Vec::new();
        encode_option(None, &mut buf).unwrap();
        let mut cursor = io::Cursor::new(buf);
        assert_eq!(decode_option(&mut cursor).unwrap(), None);
    }
}
