// ASF attribute values and their tag field form

use crate::error::{Result, TagError};
use crate::tag::{Artwork, TagField};
use crate::utils::encoding::{decode_text, encode_text, split_terminated, trim_terminator, TextEncoding};
use crate::utils::io::{read_le_u16, read_le_u32, read_le_u64};
use tracing::warn;

pub const TYPE_STRING: u16 = 0;
pub const TYPE_BYTES: u16 = 1;
pub const TYPE_BOOL: u16 = 2;
pub const TYPE_DWORD: u16 = 3;
pub const TYPE_QWORD: u16 = 4;
pub const TYPE_WORD: u16 = 5;
pub const TYPE_GUID: u16 = 6;

pub const PICTURE_ATTRIBUTE: &str = "WM/Picture";

/// Which object an attribute is stored in. BOOL values are four bytes wide
/// in the extended content description and two bytes in the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeContainer {
    ExtendedContent,
    Library,
}

/// One name/value record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value_type: u16,
    /// Value bytes exactly as stored
    pub value: Vec<u8>,
    pub language: u16,
    pub stream: u16,
}

impl Attribute {
    /// Library records bound to a stream or language are not tag data
    pub fn is_bound(&self) -> bool {
        self.language != 0 || self.stream != 0
    }

    /// Turn a stored record into a tag field
    pub fn to_field(&self, container: AttributeContainer, read_artwork: bool) -> Result<TagField> {
        let data_type = self.value_type as u32;
        let field = match self.value_type {
            TYPE_STRING => {
                let text = decode_text(
                    trim_terminator(&self.value, TextEncoding::Utf16LE),
                    TextEncoding::Utf16LE,
                );
                TagField::text(&self.name, &text, TextEncoding::Utf16LE)
            }
            TYPE_BYTES if self.name == PICTURE_ATTRIBUTE && read_artwork => {
                TagField::picture(&self.name, decode_picture(&self.value)?)
            }
            TYPE_BYTES | TYPE_GUID => TagField::binary(&self.name, self.value.clone()),
            TYPE_BOOL | TYPE_DWORD | TYPE_QWORD | TYPE_WORD => {
                let number = self.decode_number(container)?;
                TagField::text(&self.name, &number.to_string(), TextEncoding::Utf16LE)
            }
            other => {
                warn!(name = %self.name, value_type = other, "keeping attribute of unknown type as bytes");
                TagField::binary(&self.name, self.value.clone())
            }
        };
        Ok(field.with_data_type(data_type))
    }

    fn decode_number(&self, container: AttributeContainer) -> Result<u64> {
        let mut value = self.value.as_slice();
        let number = match (self.value_type, container) {
            (TYPE_BOOL, AttributeContainer::ExtendedContent) | (TYPE_DWORD, _) => {
                read_le_u32(&mut value).map(u64::from)
            }
            (TYPE_BOOL, AttributeContainer::Library) | (TYPE_WORD, _) => {
                read_le_u16(&mut value).map(u64::from)
            }
            _ => read_le_u64(&mut value),
        };
        number.map_err(|_| {
            TagError::InvalidFieldValue(format!(
                "attribute {} is too short for type {}",
                self.name, self.value_type
            ))
        })
    }

    /// Build the record for a tag field, validating numeric content
    pub fn from_field(field: &TagField, container: AttributeContainer) -> Result<Self> {
        let (value_type, value) = if let Some(artwork) = field.artwork() {
            (TYPE_BYTES, encode_picture(artwork)?)
        } else if field.is_binary() {
            let value_type = match field.data_type() as u16 {
                TYPE_GUID => TYPE_GUID,
                _ => TYPE_BYTES,
            };
            (value_type, field.raw().to_vec())
        } else {
            let text = field.content().unwrap_or_default();
            let value_type = field.data_type() as u16;
            let value = match (value_type, container) {
                (TYPE_BOOL, AttributeContainer::ExtendedContent) | (TYPE_DWORD, _) => {
                    (parse_number::<u32>(field, &text)?).to_le_bytes().to_vec()
                }
                (TYPE_BOOL, AttributeContainer::Library) | (TYPE_WORD, _) => {
                    (parse_number::<u16>(field, &text)?).to_le_bytes().to_vec()
                }
                (TYPE_QWORD, _) => (parse_number::<u64>(field, &text)?).to_le_bytes().to_vec(),
                _ => {
                    let mut value = encode_text(&text, TextEncoding::Utf16LE);
                    value.extend_from_slice(&[0, 0]);
                    return Ok(Attribute::new(field.id(), TYPE_STRING, value));
                }
            };
            (value_type, value)
        };
        Ok(Attribute::new(field.id(), value_type, value))
    }

    pub fn new(name: &str, value_type: u16, value: Vec<u8>) -> Self {
        Attribute {
            name: name.to_string(),
            value_type,
            value,
            language: 0,
            stream: 0,
        }
    }

    /// Name as UTF-16LE with terminator
    pub fn encoded_name(&self) -> Vec<u8> {
        let mut name = encode_text(&self.name, TextEncoding::Utf16LE);
        name.extend_from_slice(&[0, 0]);
        name
    }
}

fn parse_number<T: std::str::FromStr>(field: &TagField, text: &str) -> Result<T> {
    text.trim().parse::<T>().map_err(|_| {
        TagError::InvalidFieldValue(format!(
            "{} needs a number of type {}, got {:?}",
            field.id(),
            field.data_type(),
            text
        ))
    })
}

/// Decode a WM/Picture value: type u8, u32 LE data length, mime and
/// description as terminated UTF-16LE, then the image bytes.
pub fn decode_picture(value: &[u8]) -> Result<Artwork> {
    let mut cursor = value;
    let picture_type = crate::utils::io::read_u8(&mut cursor)
        .map_err(|e| TagError::from_read(e, 0, "WM/Picture"))?;
    let data_len = read_le_u32(&mut cursor)
        .map_err(|e| TagError::from_read(e, 1, "WM/Picture"))? as usize;

    let (mime, rest) = split_terminated(cursor, TextEncoding::Utf16LE);
    let (description, rest) = split_terminated(rest, TextEncoding::Utf16LE);
    if data_len > rest.len() {
        return Err(TagError::malformed(
            (value.len() - rest.len()) as u64,
            format!(
                "WM/Picture declares {} data bytes, {} remain",
                data_len,
                rest.len()
            ),
        ));
    }

    let mut artwork = Artwork::new(
        rest[..data_len].to_vec(),
        decode_text(mime, TextEncoding::Utf16LE),
        decode_text(description, TextEncoding::Utf16LE),
    );
    artwork.picture_type = picture_type as u32;
    if artwork.kind().is_none() {
        warn!(picture_type, "unrecognised picture type in WM/Picture");
    }
    Ok(artwork)
}

pub fn encode_picture(artwork: &Artwork) -> Result<Vec<u8>> {
    let picture_type = u8::try_from(artwork.picture_type).map_err(|_| {
        TagError::InvalidFieldValue(format!("picture type {} does not fit WM/Picture", artwork.picture_type))
    })?;
    let data_len = u32::try_from(artwork.data.len())
        .map_err(|_| TagError::InvalidFieldValue("picture larger than 4 GiB".into()))?;

    let mut value = vec![picture_type];
    value.extend_from_slice(&data_len.to_le_bytes());
    value.extend(encode_text(&artwork.mime_type, TextEncoding::Utf16LE));
    value.extend_from_slice(&[0, 0]);
    value.extend(encode_text(&artwork.description, TextEncoding::Utf16LE));
    value.extend_from_slice(&[0, 0]);
    value.extend_from_slice(&artwork.data);
    Ok(value)
}
