// FLAC metadata block layout

use crate::chunk::{ChunkHeader, ChunkLayout};
use crate::error::{Result, TagError};
use std::fmt;
use std::io::Read;

/// FLAC file signature
pub const FLAC_SIGNATURE: &[u8; 4] = b"fLaC";

/// Block header: last-block flag, 7-bit type, 24-bit big-endian length
pub const BLOCK_HEADER_LEN: u64 = 4;

/// Largest payload a 24-bit length can describe
pub const MAX_BLOCK_LEN: u64 = 0x00FF_FFFF;

const LAST_BLOCK_FLAG: u8 = 0x80;

/// FLAC metadata block types
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    CueSheet,
    Picture,
    Reserved(u8),
}

impl BlockType {
    pub fn from_byte(byte: u8) -> Self {
        match byte & 0x7F {
            0 => BlockType::StreamInfo,
            1 => BlockType::Padding,
            2 => BlockType::Application,
            3 => BlockType::SeekTable,
            4 => BlockType::VorbisComment,
            5 => BlockType::CueSheet,
            6 => BlockType::Picture,
            other => BlockType::Reserved(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            BlockType::StreamInfo => 0,
            BlockType::Padding => 1,
            BlockType::Application => 2,
            BlockType::SeekTable => 3,
            BlockType::VorbisComment => 4,
            BlockType::CueSheet => 5,
            BlockType::Picture => 6,
            BlockType::Reserved(other) => *other,
        }
    }
}

impl fmt::Debug for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::StreamInfo => f.write_str("STREAMINFO"),
            BlockType::Padding => f.write_str("PADDING"),
            BlockType::Application => f.write_str("APPLICATION"),
            BlockType::SeekTable => f.write_str("SEEKTABLE"),
            BlockType::VorbisComment => f.write_str("VORBIS_COMMENT"),
            BlockType::CueSheet => f.write_str("CUESHEET"),
            BlockType::Picture => f.write_str("PICTURE"),
            BlockType::Reserved(other) => write!(f, "RESERVED({})", other),
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The length field excludes the 4-byte header. Type 127 is forbidden.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlacLayout;

impl ChunkLayout for FlacLayout {
    type Id = BlockType;

    fn read_header<R: Read>(
        &self,
        reader: &mut R,
        offset: u64,
        remaining: u64,
    ) -> Result<Option<ChunkHeader<BlockType>>> {
        if remaining < BLOCK_HEADER_LEN {
            return Err(TagError::malformed(
                offset,
                format!("{} trailing bytes cannot hold a block header", remaining),
            ));
        }
        let mut raw = [0u8; 4];
        reader
            .read_exact(&mut raw)
            .map_err(|e| TagError::from_read(e, offset, "block header"))?;

        if raw[0] & 0x7F == 0x7F {
            return Err(TagError::malformed(offset, "invalid metadata block type 127"));
        }
        let length = u64::from(u32::from_be_bytes([0, raw[1], raw[2], raw[3]]));

        Ok(Some(ChunkHeader {
            id: BlockType::from_byte(raw[0]),
            declared_length: length,
            header_len: BLOCK_HEADER_LEN,
            payload_len: length,
            raw: raw.to_vec(),
        }))
    }

    fn encode_header(&self, id: &BlockType, payload_len: u64) -> Result<Vec<u8>> {
        if payload_len > MAX_BLOCK_LEN {
            return Err(TagError::InvalidFieldValue(format!(
                "{} block of {} bytes exceeds the 24-bit length field",
                id, payload_len
            )));
        }
        let length = (payload_len as u32).to_be_bytes();
        Ok(vec![id.as_byte(), length[1], length[2], length[3]])
    }
}

/// Length of the metadata block list that follows the signature, found by
/// walking headers up to the one carrying the last-block flag
pub fn metadata_len(data: &[u8]) -> Result<usize> {
    let start = FLAC_SIGNATURE.len();
    let mut pos = start;
    loop {
        if pos + BLOCK_HEADER_LEN as usize > data.len() {
            return Err(TagError::malformed(
                pos as u64,
                "metadata blocks end without a last-block flag",
            ));
        }
        let flags = data[pos];
        let length = u32::from_be_bytes([0, data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let end = pos + BLOCK_HEADER_LEN as usize + length;
        if end > data.len() {
            return Err(TagError::malformed(
                pos as u64,
                format!("block declares {} bytes past the end of the file", end - data.len()),
            ));
        }
        pos = end;
        if flags & LAST_BLOCK_FLAG != 0 {
            return Ok(pos - start);
        }
    }
}

/// Clear the last-block flag everywhere except on the final block
pub fn normalize_last_flag(blocks: &mut [u8]) {
    let mut pos = 0usize;
    let mut last = None;
    while pos + BLOCK_HEADER_LEN as usize <= blocks.len() {
        blocks[pos] &= !LAST_BLOCK_FLAG;
        last = Some(pos);
        let length =
            u32::from_be_bytes([0, blocks[pos + 1], blocks[pos + 2], blocks[pos + 3]]) as usize;
        pos += BLOCK_HEADER_LEN as usize + length;
    }
    if let Some(last) = last {
        blocks[last] |= LAST_BLOCK_FLAG;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let raw = [0x84u8, 0x00, 0x01, 0x00];
        let header = FlacLayout
            .read_header(&mut raw.as_slice(), 4, 300)
            .unwrap()
            .unwrap();
        assert_eq!(header.id, BlockType::VorbisComment);
        assert_eq!(header.payload_len, 256);
        assert_eq!(header.total_len(), 260);
        assert_eq!(header.raw, raw);

        assert_eq!(
            FlacLayout.encode_header(&BlockType::VorbisComment, 256).unwrap(),
            vec![0x04, 0x00, 0x01, 0x00]
        );
        assert!(FlacLayout
            .encode_header(&BlockType::Picture, MAX_BLOCK_LEN + 1)
            .is_err());
    }

    #[test]
    fn test_reserved_and_invalid_types() {
        assert_eq!(BlockType::from_byte(9), BlockType::Reserved(9));
        assert_eq!(BlockType::Reserved(9).as_byte(), 9);
        let raw = [0xFFu8, 0, 0, 0];
        assert!(matches!(
            FlacLayout.read_header(&mut raw.as_slice(), 42, 10),
            Err(TagError::MalformedContainer { offset: 42, .. })
        ));
    }

    #[test]
    fn test_metadata_len_and_last_flag() {
        let mut file = FLAC_SIGNATURE.to_vec();
        file.extend_from_slice(&[0x00, 0, 0, 2, 1, 2]);
        file.extend_from_slice(&[0x81, 0, 0, 1, 0]);
        file.extend_from_slice(&[0xFF, 0xF8]);
        assert_eq!(metadata_len(&file).unwrap(), 11);

        let mut blocks = vec![0x80, 0, 0, 0, 0x01, 0, 0, 1, 0];
        normalize_last_flag(&mut blocks);
        assert_eq!(blocks[0], 0x00);
        assert_eq!(blocks[4], 0x81);

        assert!(metadata_len(&file[..8]).is_err());
    }
}
