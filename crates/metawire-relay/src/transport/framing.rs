//! Container framing (panic-free).
//!
//! Layout: `0x0D 0xA4` magic, payload length as 3-byte little endian, then
//! the encoded envelope.
//!
//! Parsing rules:
//! - Never index (`buf[0]`); always use `Buf` and `remaining()` checks.
//! - Never `unwrap()` / `expect()` / `panic!()` in production paths.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use metawire_core::error::{MetaWireError, Result};

pub const CONTAINER_MAGIC: [u8; 2] = [0x0D, 0xA4];
pub const CONTAINER_HEADER_LEN: usize = 5;
/// Largest payload the 3-byte length can describe.
pub const MAX_CONTAINER_PAYLOAD: usize = 0xFF_FFFF;

/// Frame one encoded envelope. Fails when the container would exceed `max_len`.
pub fn encode_container(payload: &[u8], max_len: usize) -> Result<Bytes> {
    let total = CONTAINER_HEADER_LEN + payload.len();
    if payload.len() > MAX_CONTAINER_PAYLOAD || total > max_len {
        return Err(MetaWireError::PayloadTooLarge(format!(
            "container of {total} bytes exceeds limit of {max_len}"
        )));
    }
    let len = payload.len() as u32;
    let mut buf = BytesMut::with_capacity(total);
    buf.put_slice(&CONTAINER_MAGIC);
    buf.put_u8((len & 0xff) as u8);
    buf.put_u8(((len >> 8) & 0xff) as u8);
    buf.put_u8(((len >> 16) & 0xff) as u8);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Read one container off the front of `buf`, leaving the rest in place.
pub fn decode_container(buf: &mut Bytes) -> Result<Bytes> {
    if buf.remaining() < CONTAINER_HEADER_LEN {
        return Err(MetaWireError::TruncatedInput(format!(
            "container header needs {CONTAINER_HEADER_LEN} bytes, have {}",
            buf.remaining()
        )));
    }

    let magic = [buf.get_u8(), buf.get_u8()];
    if magic != CONTAINER_MAGIC {
        return Err(MetaWireError::MalformedTag(format!(
            "bad container magic {:02x}{:02x}",
            magic[0], magic[1]
        )));
    }

    let b0 = buf.get_u8() as usize;
    let b1 = buf.get_u8() as usize;
    let b2 = buf.get_u8() as usize;
    let len = b0 | (b1 << 8) | (b2 << 16);

    if buf.remaining() < len {
        return Err(MetaWireError::TruncatedInput(format!(
            "container declares {len} bytes, have {}",
            buf.remaining()
        )));
    }

    Ok(buf.split_to(len))
}

/// Split a datagram into its containers (usually exactly one).
pub fn decode_containers(mut buf: Bytes) -> Result<Vec<Bytes>> {
    let mut out = Vec::new();
    while buf.has_remaining() {
        out.push(decode_container(&mut buf)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use metawire_core::error::ErrorKind;

    #[test]
    fn header_layout() {
        let framed = encode_container(&[1, 2, 3], 100).unwrap();
        assert_eq!(framed.as_ref(), &[0x0d, 0xa4, 0x03, 0x00, 0x00, 1, 2, 3]);

        let big = vec![0u8; 0x1_0203];
        let framed = encode_container(&big, usize::MAX).unwrap();
        assert_eq!(&framed[..5], &[0x0d, 0xa4, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn size_limit_is_enforced() {
        let err = encode_container(&[0u8; 10], 14).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PayloadTooLarge);
        assert!(encode_container(&[0u8; 10], 15).is_ok());
    }

    #[test]
    fn decode_checks_magic_and_length() {
        let mut short = Bytes::from_static(&[0x0d, 0xa4, 0x01]);
        assert_eq!(decode_container(&mut short).unwrap_err().kind(), ErrorKind::TruncatedInput);

        let mut magic = Bytes::from_static(&[0x0d, 0xa5, 0x00, 0x00, 0x00]);
        assert_eq!(decode_container(&mut magic).unwrap_err().kind(), ErrorKind::MalformedTag);

        let mut cut = Bytes::from_static(&[0x0d, 0xa4, 0x04, 0x00, 0x00, 1, 2]);
        assert_eq!(decode_container(&mut cut).unwrap_err().kind(), ErrorKind::TruncatedInput);
    }

    #[test]
    fn back_to_back_containers() {
        let mut joined = BytesMut::new();
        joined.put_slice(&encode_container(b"ab", 64).unwrap());
        joined.put_slice(&encode_container(b"", 64).unwrap());
        joined.put_slice(&encode_container(b"xyz", 64).unwrap());
        let parts = decode_containers(joined.freeze()).unwrap();
        assert_eq!(
            parts,
            vec![Bytes::from_static(b"ab"), Bytes::new(), Bytes::from_static(b"xyz")]
        );
    }
}
