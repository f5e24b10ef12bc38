// ASF object header layout

use crate::asf::guid::Guid;
use crate::chunk::{ChunkHeader, ChunkLayout};
use crate::error::{Result, TagError};
use crate::utils::io::read_le_u64;
use std::io::Read;

/// GUID + u64 little-endian size
pub const OBJECT_HEADER_LEN: u64 = 24;

/// Every ASF object: 16-byte GUID, then a u64 size that includes those
/// 24 header bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsfLayout;

impl ChunkLayout for AsfLayout {
    type Id = Guid;

    fn read_header<R: Read>(
        &self,
        reader: &mut R,
        offset: u64,
        remaining: u64,
    ) -> Result<Option<ChunkHeader<Guid>>> {
        if remaining < OBJECT_HEADER_LEN {
            return Err(TagError::malformed(
                offset,
                format!("{} trailing bytes cannot hold an object header", remaining),
            ));
        }

        let mut raw = vec![0u8; OBJECT_HEADER_LEN as usize];
        reader
            .read_exact(&mut raw)
            .map_err(|e| TagError::from_read(e, offset, "object header"))?;

        let mut id = [0u8; 16];
        id.copy_from_slice(&raw[..16]);
        let id = Guid::from_bytes(id);
        let length = read_le_u64(&mut &raw[16..])?;

        if length < OBJECT_HEADER_LEN {
            return Err(TagError::malformed(
                offset,
                format!("object {} declares length {}", id, length),
            ));
        }

        Ok(Some(ChunkHeader {
            id,
            declared_length: length,
            header_len: OBJECT_HEADER_LEN,
            payload_len: length - OBJECT_HEADER_LEN,
            raw,
        }))
    }

    fn encode_header(&self, id: &Guid, payload_len: u64) -> Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(OBJECT_HEADER_LEN as usize);
        raw.extend_from_slice(id.as_bytes());
        raw.extend_from_slice(&(payload_len + OBJECT_HEADER_LEN).to_le_bytes());
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_includes_header() {
        let chunk = AsfLayout.encode_chunk(&Guid::PADDING, &[0; 6]).unwrap();
        assert_eq!(chunk.len(), 30);
        assert_eq!(&chunk[16..24], &30u64.to_le_bytes());

        let header = AsfLayout
            .read_header(&mut chunk.as_slice(), 0, 30)
            .unwrap()
            .unwrap();
        assert_eq!(header.id, Guid::PADDING);
        assert_eq!(header.payload_len, 6);
        assert_eq!(header.raw, chunk[..24]);
    }

    #[test]
    fn test_placeholder_object_is_valid() {
        let chunk = AsfLayout.encode_chunk(&Guid::PADDING, &[]).unwrap();
        let header = AsfLayout
            .read_header(&mut chunk.as_slice(), 0, 24)
            .unwrap()
            .unwrap();
        assert!(header.is_placeholder());
    }

    #[test]
    fn test_undersized_length_is_malformed() {
        let mut chunk = AsfLayout.encode_chunk(&Guid::PADDING, &[]).unwrap();
        chunk[16] = 10;
        let err = AsfLayout
            .read_header(&mut chunk.as_slice(), 500, 24)
            .unwrap_err();
        assert!(matches!(err, TagError::MalformedContainer { offset: 500, .. }));
    }
}
