// Reverse-DNS (`----`) items
//
// ---- [ mean: 4 zero bytes + issuer ] [ name: 4 zero bytes + descriptor ]
//      [ data: optional ]
//
// An item without a `data` atom is how an empty value is stored.

use crate::chunk::ChunkLayout;
use crate::error::{Result, TagError};
use crate::mp4::atom::{child_atoms, DataAtom, Fourcc, Mp4Layout};
use crate::tag::TagField;
use crate::utils::encoding::{decode_text, encode_text, TextEncoding};

pub const ITUNES_ISSUER: &str = "com.apple.iTunes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseDnsField {
    pub issuer: String,
    pub descriptor: String,
    pub content: String,
    pub data_type: u32,
}

impl ReverseDnsField {
    pub fn new(issuer: &str, descriptor: &str, content: &str) -> Self {
        ReverseDnsField {
            issuer: issuer.to_string(),
            descriptor: descriptor.to_string(),
            content: content.to_string(),
            data_type: DataAtom::UTF8,
        }
    }

    /// Lookup key; two fields with the same issuer and descriptor share it
    pub fn key(&self) -> String {
        format!("{}:{}", self.issuer, self.descriptor)
    }

    /// Whether a field id names a reverse-DNS item
    pub fn is_key(id: &str) -> bool {
        id.contains(':')
    }

    /// Decode the payload of a `----` atom starting at absolute `offset`
    pub fn decode(payload: &[u8], offset: u64) -> Result<Self> {
        let mut issuer = None;
        let mut descriptor = None;
        let mut data = None;

        for atom in child_atoms(payload, offset)? {
            let text = || -> Result<String> {
                if atom.payload.len() < 4 {
                    return Err(TagError::malformed(
                        atom.offset,
                        format!("{} atom shorter than its flags", atom.id),
                    ));
                }
                Ok(decode_text(&atom.payload[4..], TextEncoding::Utf8))
            };
            match atom.id {
                Fourcc::MEAN => issuer = Some(text()?),
                Fourcc::NAME => descriptor = Some(text()?),
                Fourcc::DATA if data.is_none() => data = Some(DataAtom::parse(&atom)?),
                _ => {}
            }
        }

        let (Some(issuer), Some(descriptor)) = (issuer, descriptor) else {
            return Err(TagError::malformed(
                offset,
                "reverse-DNS item without mean and name atoms",
            ));
        };
        let (content, data_type) = match data {
            Some(data) => {
                let encoding = if data.data_type == DataAtom::UTF16 {
                    TextEncoding::Utf16BE
                } else {
                    TextEncoding::Utf8
                };
                (decode_text(&data.value, encoding), data.data_type)
            }
            None => (String::new(), DataAtom::UTF8),
        };

        Ok(ReverseDnsField {
            issuer,
            descriptor,
            content,
            data_type,
        })
    }

    /// Complete `----` atom
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut mean = vec![0u8; 4];
        mean.extend(encode_text(&self.issuer, TextEncoding::Utf8));
        let mut name = vec![0u8; 4];
        name.extend(encode_text(&self.descriptor, TextEncoding::Utf8));

        let mut payload = Mp4Layout.encode_chunk(&Fourcc::MEAN, &mean)?;
        payload.extend(Mp4Layout.encode_chunk(&Fourcc::NAME, &name)?);
        if !self.content.is_empty() {
            let value = if self.data_type == DataAtom::UTF16 {
                encode_text(&self.content, TextEncoding::Utf16BE)
            } else {
                encode_text(&self.content, TextEncoding::Utf8)
            };
            payload.extend(DataAtom::new(self.data_type, value).encode()?);
        }
        Mp4Layout.encode_chunk(&Fourcc::FREEFORM, &payload)
    }

    pub fn to_field(&self) -> TagField {
        TagField::text(self.key(), &self.content, TextEncoding::Utf8).with_data_type(self.data_type)
    }

    pub fn from_field(field: &TagField) -> Result<Self> {
        let (issuer, descriptor) = field.id().split_once(':').ok_or_else(|| {
            TagError::InvalidFieldValue(format!("{} is not an issuer:descriptor key", field.id()))
        })?;
        let content = field.content().ok_or_else(|| {
            TagError::InvalidFieldValue(format!("reverse-DNS field {} must be text", field.id()))
        })?;
        let data_type = match field.data_type() {
            DataAtom::UTF16 => DataAtom::UTF16,
            _ => DataAtom::UTF8,
        };
        Ok(ReverseDnsField {
            issuer: issuer.to_string(),
            descriptor: descriptor.to_string(),
            content,
            data_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let field = ReverseDnsField::new(ITUNES_ISSUER, "ISRC", "USRC17607839");
        let atom = field.encode().unwrap();
        assert_eq!(&atom[4..8], b"----");
        let decoded = ReverseDnsField::decode(&atom[8..], 8).unwrap();
        assert_eq!(decoded, field);
        assert_eq!(decoded.key(), "com.apple.iTunes:ISRC");
    }

    #[test]
    fn test_empty_content_has_no_data_atom() {
        let field = ReverseDnsField::new(ITUNES_ISSUER, "MOOD", "");
        let atom = field.encode().unwrap();

        let mean_len = 8 + 4 + ITUNES_ISSUER.len();
        let name_len = 8 + 4 + "MOOD".len();
        assert_eq!(atom.len(), 8 + mean_len + name_len);
        assert_eq!(&atom[..4], &((8 + mean_len + name_len) as u32).to_be_bytes());

        let decoded = ReverseDnsField::decode(&atom[8..], 8).unwrap();
        assert_eq!(decoded.content, "");
        assert_eq!(decoded.to_field().content().as_deref(), Some(""));
    }

    #[test]
    fn test_missing_name_is_malformed() {
        let mut mean = vec![0u8; 4];
        mean.extend_from_slice(b"org.example");
        let payload = Mp4Layout.encode_chunk(&Fourcc::MEAN, &mean).unwrap();
        assert!(matches!(
            ReverseDnsField::decode(&payload, 100),
            Err(TagError::MalformedContainer { offset: 100, .. })
        ));
    }

    #[test]
    fn test_from_field() {
        let field = TagField::text("org.example:Mood", "calm", TextEncoding::Utf8);
        let parsed = ReverseDnsField::from_field(&field).unwrap();
        assert_eq!(parsed.issuer, "org.example");
        assert_eq!(parsed.descriptor, "Mood");
        assert!(ReverseDnsField::from_field(&TagField::text("nope", "x", TextEncoding::Utf8)).is_err());
    }
}
