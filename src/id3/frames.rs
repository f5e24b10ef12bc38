// ID3v2 frame identifiers and the frame header layout

use crate::chunk::{ChunkHeader, ChunkLayout};
use crate::error::{Result, TagError};
use crate::utils::io::{decode_synchsafe, encode_synchsafe};
use std::fmt;
use std::io::Read;

/// Frame header: 4-character id, u32 size (synchsafe in 2.4), two flag bytes
pub const FRAME_HEADER_LEN: u64 = 10;

/// Four-character frame id, upper-case letters and digits
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub [u8; 4]);

impl FrameId {
    pub const TXXX: FrameId = FrameId(*b"TXXX");
    pub const COMM: FrameId = FrameId(*b"COMM");
    pub const USLT: FrameId = FrameId(*b"USLT");
    pub const UFID: FrameId = FrameId(*b"UFID");
    pub const APIC: FrameId = FrameId(*b"APIC");
    pub const TCON: FrameId = FrameId(*b"TCON");
    pub const TDRC: FrameId = FrameId(*b"TDRC");
    pub const TYER: FrameId = FrameId(*b"TYER");
    /// Pseudo id of the tag itself, parent of every frame
    pub const TAG: FrameId = FrameId(*b"ID3\0");

    pub fn parse(id: &str) -> Option<Self> {
        let bytes: [u8; 4] = id.as_bytes().try_into().ok()?;
        let frame = FrameId(bytes);
        frame.is_valid().then_some(frame)
    }

    pub fn is_valid(&self) -> bool {
        self.0
            .iter()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    }

    /// Text information frames, other than the user-defined TXXX
    pub fn is_text(&self) -> bool {
        self.0[0] == b'T' && *self != FrameId::TXXX
    }

    pub fn as_str(&self) -> &str {
        // only ever built from ASCII
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.as_str())
    }
}

/// Frame flag bits that make the payload unreadable without extra
/// processing; such frames are kept opaque.
pub fn is_transformed(version: u8, flags: u16) -> bool {
    let format = (flags & 0xFF) as u8;
    match version {
        3 => format & 0xE0 != 0,
        _ => format & 0x4F != 0,
    }
}

/// Frame layout of an ID3v2.3 or 2.4 tag. A zero byte where an id should
/// start is padding, which ends the frame list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Id3Layout {
    pub version: u8,
}

impl Id3Layout {
    pub fn new(version: u8) -> Self {
        Id3Layout { version }
    }

    fn encode_size(&self, size: u64) -> Result<[u8; 4]> {
        let size = u32::try_from(size)
            .map_err(|_| TagError::InvalidFieldValue(format!("frame of {} bytes", size)))?;
        if self.version >= 4 {
            encode_synchsafe(size).ok_or_else(|| {
                TagError::InvalidFieldValue(format!("frame of {} bytes exceeds 28 bits", size))
            })
        } else {
            Ok(size.to_be_bytes())
        }
    }

    /// Complete frame with explicit flags
    pub fn encode_frame(&self, id: &FrameId, flags: u16, payload: &[u8]) -> Result<Vec<u8>> {
        let mut frame = Vec::with_capacity(payload.len() + FRAME_HEADER_LEN as usize);
        frame.extend_from_slice(&id.0);
        frame.extend_from_slice(&self.encode_size(payload.len() as u64)?);
        frame.extend_from_slice(&flags.to_be_bytes());
        frame.extend_from_slice(payload);
        Ok(frame)
    }
}

impl ChunkLayout for Id3Layout {
    type Id = FrameId;

    fn read_header<R: Read>(
        &self,
        reader: &mut R,
        offset: u64,
        remaining: u64,
    ) -> Result<Option<ChunkHeader<FrameId>>> {
        if remaining < FRAME_HEADER_LEN {
            return Ok(None);
        }
        let mut raw = [0u8; FRAME_HEADER_LEN as usize];
        reader
            .read_exact(&mut raw)
            .map_err(|e| TagError::from_read(e, offset, "frame header"))?;
        if raw[0] == 0 {
            return Ok(None);
        }

        let id = FrameId([raw[0], raw[1], raw[2], raw[3]]);
        if !id.is_valid() {
            return Err(TagError::malformed(
                offset,
                format!("invalid frame id {:?}", String::from_utf8_lossy(&raw[..4])),
            ));
        }
        let size_bytes = [raw[4], raw[5], raw[6], raw[7]];
        let size = if self.version >= 4 {
            decode_synchsafe(size_bytes)
        } else {
            u32::from_be_bytes(size_bytes)
        };

        Ok(Some(ChunkHeader {
            id,
            declared_length: u64::from(size),
            header_len: FRAME_HEADER_LEN,
            payload_len: u64::from(size),
            raw: raw.to_vec(),
        }))
    }

    fn encode_header(&self, id: &FrameId, payload_len: u64) -> Result<Vec<u8>> {
        let mut raw = id.0.to_vec();
        raw.extend_from_slice(&self.encode_size(payload_len)?);
        raw.extend_from_slice(&[0, 0]);
        Ok(raw)
    }
}

/// Frame flags as stored in the raw header
pub fn header_flags(raw: &[u8]) -> u16 {
    match raw {
        [.., a, b] if raw.len() == FRAME_HEADER_LEN as usize => u16::from_be_bytes([*a, *b]),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v24_synchsafe_size() {
        let frame = Id3Layout::new(4)
            .encode_frame(&FrameId(*b"TIT2"), 0, &[0u8; 200])
            .unwrap();
        assert_eq!(&frame[4..8], &[0, 0, 1, 0x48]);
        let header = Id3Layout::new(4)
            .read_header(&mut frame.as_slice(), 10, frame.len() as u64)
            .unwrap()
            .unwrap();
        assert_eq!(header.payload_len, 200);

        let frame = Id3Layout::new(3)
            .encode_frame(&FrameId(*b"TIT2"), 0, &[0u8; 200])
            .unwrap();
        assert_eq!(&frame[4..8], &[0, 0, 0, 200]);
    }

    #[test]
    fn test_padding_ends_frame_list() {
        let padding = [0u8; 32];
        assert!(Id3Layout::new(3)
            .read_header(&mut padding.as_slice(), 0, 32)
            .unwrap()
            .is_none());
        assert!(Id3Layout::new(3)
            .read_header(&mut &padding[..4], 0, 4)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_garbage_id_is_malformed() {
        let raw = *b"ti!2\0\0\0\x01\0\0x";
        assert!(matches!(
            Id3Layout::new(3).read_header(&mut raw.as_slice(), 20, 11),
            Err(TagError::MalformedContainer { offset: 20, .. })
        ));
    }

    #[test]
    fn test_transformed_flags() {
        assert!(is_transformed(3, 0x0080));
        assert!(!is_transformed(3, 0x4000));
        assert!(is_transformed(4, 0x0001));
        assert!(!is_transformed(4, 0x4000));
        assert_eq!(header_flags(b"TIT2\0\0\0\x01\x40\x02"), 0x4002);
    }

    #[test]
    fn test_frame_kinds() {
        assert!(FrameId(*b"TIT2").is_text());
        assert!(!FrameId::TXXX.is_text());
        assert_eq!(FrameId::parse("APIC"), Some(FrameId::APIC));
        assert_eq!(FrameId::parse("apic"), None);
    }
}
