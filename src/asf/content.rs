// Content description and extended content description objects

use crate::asf::attribute::{Attribute, AttributeContainer};
use crate::asf::guid::Guid;
use crate::asf::{AsfFormat, AsfTag};
use crate::chunk::{ChunkReader, ChunkSource};
use crate::error::{Result, TagError};
use crate::tag::{TagField, TagFormat};
use crate::utils::encoding::{decode_text, encode_text, trim_terminator, TextEncoding};
use crate::utils::io::{read_bytes, read_le_u16, CountingReader};
use std::io::{self, Read};

/// Attribute names stored in the content description object, in wire order
pub const CONTENT_DESCRIPTION_NAMES: [&str; 5] =
    ["Title", "Author", "Copyright", "Description", "Rating"];

pub fn is_content_description_name(name: &str) -> bool {
    CONTENT_DESCRIPTION_NAMES.contains(&name)
}

/// Five u16 byte lengths, then the five UTF-16LE strings they describe
pub fn decode_content_description(payload: &[u8], offset: u64) -> Result<[String; 5]> {
    let mut reader = CountingReader::with_origin(payload, offset);
    let mut lengths = [0u16; 5];
    for length in lengths.iter_mut() {
        *length = read_le_u16(&mut reader)
            .map_err(|e| TagError::from_read(e, offset, "content description lengths"))?;
    }

    let mut values: [String; 5] = Default::default();
    for (value, length) in values.iter_mut().zip(lengths) {
        let start = reader.position();
        let raw = read_bytes(&mut reader, length as u64)
            .map_err(|e| TagError::from_read(e, start, "content description string"))?;
        *value = decode_text(
            trim_terminator(&raw, TextEncoding::Utf16LE),
            TextEncoding::Utf16LE,
        );
    }
    Ok(values)
}

pub fn encode_content_description(values: &[String; 5]) -> Result<Vec<u8>> {
    let encoded: Vec<Vec<u8>> = values
        .iter()
        .map(|value| {
            if value.is_empty() {
                Vec::new()
            } else {
                let mut raw = encode_text(value, TextEncoding::Utf16LE);
                raw.extend_from_slice(&[0, 0]);
                raw
            }
        })
        .collect();

    let mut payload = Vec::new();
    for (raw, name) in encoded.iter().zip(CONTENT_DESCRIPTION_NAMES) {
        let length = u16::try_from(raw.len()).map_err(|_| {
            TagError::InvalidFieldValue(format!("{} is too long for the content description", name))
        })?;
        payload.extend_from_slice(&length.to_le_bytes());
    }
    for raw in encoded {
        payload.extend(raw);
    }
    Ok(payload)
}

/// Fills title, author, copyright, description and rating
pub struct ContentDescriptionReader;

impl ChunkReader<Guid, AsfTag> for ContentDescriptionReader {
    fn can_read(&self, id: &Guid) -> bool {
        *id == Guid::CONTENT_DESCRIPTION
    }

    fn read(&self, chunk: ChunkSource<'_, Guid>, tag: &mut AsfTag) -> Result<()> {
        let values = decode_content_description(chunk.payload, chunk.offset)?;
        for (name, value) in CONTENT_DESCRIPTION_NAMES.iter().zip(values) {
            if value.is_empty() {
                continue;
            }
            // a repeated object (single-occurrence disabled) overrides the earlier one
            tag.set_field(
                TagField::text(*name, &value, TextEncoding::Utf16LE)
                    .with_common(AsfFormat::is_common_id(name)),
            );
        }
        Ok(())
    }
}

/// u16 record count; each record is u16 name length, name, u16 value type,
/// u16 value length, value
pub fn decode_extended_content(payload: &[u8], offset: u64) -> Result<Vec<Attribute>> {
    let mut reader = CountingReader::with_origin(payload, offset);
    let count = read_le_u16(&mut reader)
        .map_err(|e| TagError::from_read(e, offset, "descriptor count"))?;

    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let start = reader.position();
        let attribute = read_descriptor(&mut reader)
            .map_err(|e| TagError::from_read(e, start, "content descriptor"))?;
        attributes.push(attribute);
    }
    Ok(attributes)
}

fn read_descriptor<R: Read>(reader: &mut R) -> io::Result<Attribute> {
    let name_len = read_le_u16(reader)?;
    let name = read_bytes(reader, name_len as u64)?;
    let value_type = read_le_u16(reader)?;
    let value_len = read_le_u16(reader)?;
    let value = read_bytes(reader, value_len as u64)?;
    let name = decode_text(
        trim_terminator(&name, TextEncoding::Utf16LE),
        TextEncoding::Utf16LE,
    );
    Ok(Attribute::new(&name, value_type, value))
}

pub fn encode_extended_content(attributes: &[Attribute]) -> Result<Vec<u8>> {
    let count = u16::try_from(attributes.len()).map_err(|_| {
        TagError::InvalidFieldValue("more than 65535 extended content descriptors".into())
    })?;
    let mut payload = count.to_le_bytes().to_vec();
    for attribute in attributes {
        let name = attribute.encoded_name();
        let too_long =
            || TagError::InvalidFieldValue(format!("{} does not fit a content descriptor", attribute.name));
        let name_len = u16::try_from(name.len()).map_err(|_| too_long())?;
        let value_len = u16::try_from(attribute.value.len()).map_err(|_| too_long())?;

        payload.extend_from_slice(&name_len.to_le_bytes());
        payload.extend(name);
        payload.extend_from_slice(&attribute.value_type.to_le_bytes());
        payload.extend_from_slice(&value_len.to_le_bytes());
        payload.extend_from_slice(&attribute.value);
    }
    Ok(payload)
}

pub struct ExtendedContentReader {
    pub read_artwork: bool,
}

impl ChunkReader<Guid, AsfTag> for ExtendedContentReader {
    fn can_read(&self, id: &Guid) -> bool {
        *id == Guid::EXTENDED_CONTENT_DESCRIPTION
    }

    fn read(&self, chunk: ChunkSource<'_, Guid>, tag: &mut AsfTag) -> Result<()> {
        for attribute in decode_extended_content(chunk.payload, chunk.offset)? {
            let common = AsfFormat::is_common_id(&attribute.name);
            let field = attribute.to_field(AttributeContainer::ExtendedContent, self.read_artwork)?;
            tag.add_field(field.with_common(common));
        }
        Ok(())
    }
}
