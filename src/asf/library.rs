// Metadata library object
//
// Records: u16 language index, u16 stream number, u16 name length,
// u16 value type, u32 value length, name, value. Only records bound to
// neither a stream nor a language are tag data; the rest pass through.

use crate::asf::attribute::{Attribute, AttributeContainer};
use crate::asf::guid::Guid;
use crate::asf::layout::AsfLayout;
use crate::asf::{AsfFormat, AsfTag};
use crate::chunk::{ChunkLayout, ChunkModifier, ChunkReader, ChunkSource, ModificationResult};
use crate::error::{Result, TagError};
use crate::tag::TagFormat;
use crate::utils::encoding::{decode_text, trim_terminator, TextEncoding};
use crate::utils::io::{read_bytes, read_le_u16, read_le_u32, CountingReader};
use std::io::{self, Read};
use tracing::debug;

pub fn decode_library(payload: &[u8], offset: u64) -> Result<Vec<Attribute>> {
    let mut reader = CountingReader::with_origin(payload, offset);
    let count = read_le_u16(&mut reader)
        .map_err(|e| TagError::from_read(e, offset, "library record count"))?;

    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let start = reader.position();
        let attribute = read_record(&mut reader)
            .map_err(|e| TagError::from_read(e, start, "library record"))?;
        attributes.push(attribute);
    }
    Ok(attributes)
}

fn read_record<R: Read>(reader: &mut R) -> io::Result<Attribute> {
    let language = read_le_u16(reader)?;
    let stream = read_le_u16(reader)?;
    let name_len = read_le_u16(reader)?;
    let value_type = read_le_u16(reader)?;
    let value_len = read_le_u32(reader)?;
    let name = read_bytes(reader, name_len as u64)?;
    let value = read_bytes(reader, value_len as u64)?;

    let name = decode_text(
        trim_terminator(&name, TextEncoding::Utf16LE),
        TextEncoding::Utf16LE,
    );
    Ok(Attribute {
        name,
        value_type,
        value,
        language,
        stream,
    })
}

pub fn encode_library(attributes: &[Attribute]) -> Result<Vec<u8>> {
    let count = u16::try_from(attributes.len())
        .map_err(|_| TagError::InvalidFieldValue("more than 65535 library records".into()))?;
    let mut payload = count.to_le_bytes().to_vec();
    for attribute in attributes {
        let name = attribute.encoded_name();
        let name_len = u16::try_from(name.len()).map_err(|_| {
            TagError::InvalidFieldValue(format!("attribute name {} is too long", attribute.name))
        })?;
        let value_len = u32::try_from(attribute.value.len()).map_err(|_| {
            TagError::InvalidFieldValue(format!("{} is larger than 4 GiB", attribute.name))
        })?;

        payload.extend_from_slice(&attribute.language.to_le_bytes());
        payload.extend_from_slice(&attribute.stream.to_le_bytes());
        payload.extend_from_slice(&name_len.to_le_bytes());
        payload.extend_from_slice(&attribute.value_type.to_le_bytes());
        payload.extend_from_slice(&value_len.to_le_bytes());
        payload.extend(name);
        payload.extend_from_slice(&attribute.value);
    }
    Ok(payload)
}

pub struct LibraryReader {
    pub read_artwork: bool,
}

impl ChunkReader<Guid, AsfTag> for LibraryReader {
    fn can_read(&self, id: &Guid) -> bool {
        *id == Guid::METADATA_LIBRARY
    }

    fn read(&self, chunk: ChunkSource<'_, Guid>, tag: &mut AsfTag) -> Result<()> {
        for attribute in decode_library(chunk.payload, chunk.offset)? {
            if attribute.is_bound() {
                debug!(name = %attribute.name, stream = attribute.stream, "skipping stream-bound record");
                continue;
            }
            let common = AsfFormat::is_common_id(&attribute.name);
            let field = attribute.to_field(AttributeContainer::Library, self.read_artwork)?;
            tag.add_field(field.with_common(common));
        }
        Ok(())
    }
}

/// Replaces the unbound records of the library with `attributes`, keeping
/// bound ones in front. The object is dropped when nothing remains and
/// created when it is missing but needed.
pub struct LibraryModifier {
    attributes: Vec<Attribute>,
}

impl LibraryModifier {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        LibraryModifier { attributes }
    }
}

impl ChunkModifier<Guid> for LibraryModifier {
    fn is_applicable(&self, id: &Guid) -> bool {
        *id == Guid::METADATA_LIBRARY
    }

    fn modify(
        &mut self,
        source: Option<ChunkSource<'_, Guid>>,
        dest: &mut Vec<u8>,
    ) -> Result<ModificationResult<Guid>> {
        let mut records: Vec<Attribute> = match &source {
            Some(source) => decode_library(source.payload, source.offset)?
                .into_iter()
                .filter(Attribute::is_bound)
                .collect(),
            None => Vec::new(),
        };
        records.append(&mut self.attributes);

        let old_len = source.map(|s| s.total_len() as i64);
        if records.is_empty() {
            return Ok(match old_len {
                Some(old_len) => ModificationResult::new(-1, -old_len, None),
                None => ModificationResult::unchanged(None),
            });
        }

        let chunk = AsfLayout.encode_chunk(&Guid::METADATA_LIBRARY, &encode_library(&records)?)?;
        dest.extend_from_slice(&chunk);
        let new_len = chunk.len() as i64;
        Ok(match old_len {
            Some(old_len) => {
                ModificationResult::new(0, new_len - old_len, Some(Guid::METADATA_LIBRARY))
            }
            None => ModificationResult::new(1, new_len, Some(Guid::METADATA_LIBRARY)),
        })
    }
}
