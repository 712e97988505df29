//! Payload frame: length and CRC32 in front of the encoded value.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, VarpackError};

use super::EntryKey;

/// Len (4) + CRC (4)
pub(crate) const FRAME_HEADER_SIZE: usize = 8;

pub(crate) fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_u32_le(payload.len() as u32);
    buf.put_u32_le(crc32fast::hash(payload));
    buf.put_slice(payload);
    buf.freeze()
}

/// Payload slice of a frame read back from an entry's pages
///
/// Zeroed pages decode to an empty payload.
pub(crate) fn decode_frame(bytes: &[u8], key: EntryKey) -> Result<&[u8]> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(VarpackError::Format(format!(
            "entry {} holds {} bytes, too short for a frame header",
            key,
            bytes.len()
        )));
    }

    let mut header = &bytes[..FRAME_HEADER_SIZE];
    let len = header.get_u32_le() as usize;
    let expected = header.get_u32_le();

    let body = &bytes[FRAME_HEADER_SIZE..];
    if len > body.len() {
        return Err(VarpackError::Format(format!(
            "entry {} frame claims {} bytes, pages hold {}",
            key,
            len,
            body.len()
        )));
    }

    let payload = &body[..len];
    let actual = crc32fast::hash(payload);
    if actual != expected {
        return Err(VarpackError::Checksum {
            key,
            expected,
            actual,
        });
    }

    Ok(payload)
}
