// VORBIS_COMMENT block
//
// vendor length u32 LE, vendor, comment count u32 LE, then per comment a
// u32 LE length and `NAME=value` in UTF-8. Names are case-insensitive and
// are normalised to upper case on read.

use crate::chunk::{ChunkReader, ChunkSource};
use crate::error::{Result, TagError};
use crate::flac::metadata::BlockType;
use crate::flac::{FlacFormat, FlacTag};
use crate::tag::{TagField, TagFormat};
use crate::utils::encoding::TextEncoding;
use crate::utils::io::{read_bytes, read_le_u32, CountingReader};
use tracing::warn;

/// Vendor string written when a file had no comment block
pub const DEFAULT_VENDOR: &str = concat!("oxitag ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VorbisComment {
    pub vendor: String,
    pub comments: Vec<(String, Vec<u8>)>,
}

impl VorbisComment {
    pub fn decode(payload: &[u8], offset: u64) -> Result<Self> {
        let mut reader = CountingReader::with_origin(payload, offset);

        let vendor_len = read_le_u32(&mut reader)
            .map_err(|e| TagError::from_read(e, offset, "vendor length"))?;
        let vendor = read_bytes(&mut reader, u64::from(vendor_len))
            .map_err(|e| TagError::from_read(e, offset + 4, "vendor string"))?;
        let count_at = reader.position();
        let count = read_le_u32(&mut reader)
            .map_err(|e| TagError::from_read(e, count_at, "comment count"))?;

        let mut comments = Vec::new();
        for _ in 0..count {
            let at = reader.position();
            let len = read_le_u32(&mut reader)
                .map_err(|e| TagError::from_read(e, at, "comment length"))?;
            let raw = read_bytes(&mut reader, u64::from(len))
                .map_err(|e| TagError::from_read(e, at, "comment"))?;

            match raw.iter().position(|&b| b == b'=') {
                Some(split) => {
                    let name = String::from_utf8_lossy(&raw[..split]).to_ascii_uppercase();
                    comments.push((name, raw[split + 1..].to_vec()));
                }
                None => warn!(offset = at, "skipping comment without '='"),
            }
        }

        Ok(VorbisComment {
            vendor: String::from_utf8_lossy(&vendor).into_owned(),
            comments,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = |n: usize| {
            u32::try_from(n).map_err(|_| TagError::InvalidFieldValue("comment too long".into()))
        };

        let mut payload = Vec::new();
        payload.extend_from_slice(&len(self.vendor.len())?.to_le_bytes());
        payload.extend_from_slice(self.vendor.as_bytes());
        payload.extend_from_slice(&len(self.comments.len())?.to_le_bytes());
        for (name, value) in &self.comments {
            if name.is_empty() || name.contains('=') || !name.is_ascii() {
                return Err(TagError::InvalidFieldValue(format!(
                    "{:?} is not a valid comment name",
                    name
                )));
            }
            payload.extend_from_slice(&len(name.len() + 1 + value.len())?.to_le_bytes());
            payload.extend_from_slice(name.as_bytes());
            payload.push(b'=');
            payload.extend_from_slice(value);
        }
        Ok(payload)
    }
}

pub struct VorbisCommentReader;

impl ChunkReader<BlockType, FlacTag> for VorbisCommentReader {
    fn can_read(&self, id: &BlockType) -> bool {
        *id == BlockType::VorbisComment
    }

    fn read(&self, chunk: ChunkSource<'_, BlockType>, tag: &mut FlacTag) -> Result<()> {
        let comment = VorbisComment::decode(chunk.payload, chunk.offset)?;
        for (name, value) in comment.comments {
            let text = String::from_utf8_lossy(&value);
            let common = FlacFormat::is_common_id(&name);
            tag.add_field(TagField::text(name, &text, TextEncoding::Utf8).with_common(common));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_normalises_names() {
        let comment = VorbisComment {
            vendor: "reference libFLAC 1.4.3".into(),
            comments: vec![
                ("title".into(), b"Song".to_vec()),
                ("Artist".into(), "Sigur Rós".as_bytes().to_vec()),
            ],
        };
        let decoded = VorbisComment::decode(&comment.encode().unwrap(), 0).unwrap();
        assert_eq!(decoded.vendor, "reference libFLAC 1.4.3");
        assert_eq!(decoded.comments[0], ("TITLE".to_string(), b"Song".to_vec()));
        assert_eq!(decoded.comments[1].0, "ARTIST");
    }

    #[test]
    fn test_value_may_contain_equals() {
        let comment = VorbisComment {
            vendor: String::new(),
            comments: vec![("COMMENT".into(), b"a=b".to_vec())],
        };
        let decoded = VorbisComment::decode(&comment.encode().unwrap(), 0).unwrap();
        assert_eq!(decoded.comments[0].1, b"a=b");
    }

    #[test]
    fn test_truncated_comment_is_malformed() {
        let comment = VorbisComment {
            vendor: "v".into(),
            comments: vec![("TITLE".into(), b"Song".to_vec())],
        };
        let mut payload = comment.encode().unwrap();
        payload.truncate(payload.len() - 2);
        assert!(matches!(
            VorbisComment::decode(&payload, 10),
            Err(TagError::MalformedContainer { offset: 19, .. })
        ));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let comment = VorbisComment {
            vendor: String::new(),
            comments: vec![("A=B".into(), Vec::new())],
        };
        assert!(comment.encode().is_err());
    }
}
