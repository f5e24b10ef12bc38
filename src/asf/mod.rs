// ASF (Windows Media) metadata handling module
//
// The header object is a container of GUID-tagged objects. Tag data lives in
// three of them:
// - Content Description: title, author, copyright, description, rating
// - Extended Content Description: named attributes up to 64 KiB
// - Metadata Library (inside the Header Extension): everything else
//
// Everything after the header object (data, indexes) is copied untouched.

pub mod attribute;
pub mod content;
pub mod extension;
pub mod guid;
pub mod layout;
pub mod library;

pub use guid::Guid;
pub use layout::AsfLayout;

use crate::asf::attribute::{Attribute, AttributeContainer, TYPE_GUID};
use crate::asf::content::{
    encode_content_description, encode_extended_content, is_content_description_name,
    ContentDescriptionReader, ExtendedContentReader, CONTENT_DESCRIPTION_NAMES,
};
use crate::asf::extension::{HeaderExtensionModifier, HeaderExtensionReader};
use crate::asf::library::{LibraryModifier, LibraryReader};
use crate::chunk::{
    rewrite_slice, scan_children, sync_chunks, ChunkInfo, ChunkLayout, ContainerReader, Modifiers,
};
use crate::config::ReadOptions;
use crate::error::{Result, TagError};
use crate::field_mapping::FieldKey;
use crate::tag::{Tag, TagFormat};
use crate::utils::encoding::TextEncoding;
use std::collections::HashMap;
use tracing::debug;

/// Header object: GUID + u64 size + u32 child count + two reserved bytes
pub const HEADER_OBJECT_PREAMBLE: usize = 30;

/// Largest value the extended content description can hold
const MAX_DESCRIPTOR_VALUE: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AsfFormat;

impl TagFormat for AsfFormat {
    const NAME: &'static str = "ASF";

    fn field_id(key: FieldKey) -> Option<&'static str> {
        let id = match key {
            FieldKey::Title => "Title",
            FieldKey::Artist => "Author",
            FieldKey::Album => "WM/AlbumTitle",
            FieldKey::AlbumArtist => "WM/AlbumArtist",
            FieldKey::Year => "WM/Year",
            FieldKey::Track => "WM/TrackNumber",
            FieldKey::Disc => "WM/PartOfSet",
            FieldKey::Genre => "WM/Genre",
            FieldKey::Comment => "Description",
            FieldKey::Composer => "WM/Composer",
            FieldKey::Lyrics => "WM/Lyrics",
            FieldKey::Copyright => "Copyright",
            FieldKey::Encoder => "WM/EncodedBy",
            FieldKey::Isrc => "WM/ISRC",
            FieldKey::MusicBrainzTrackId => "MusicBrainz/Track Id",
            FieldKey::Cover => attribute::PICTURE_ATTRIBUTE,
        };
        Some(id)
    }

    fn artwork_id() -> &'static str {
        attribute::PICTURE_ATTRIBUTE
    }

    fn text_encoding() -> TextEncoding {
        TextEncoding::Utf16LE
    }
}

pub type AsfTag = Tag<AsfFormat>;

/// Fixed fields of the top-level header object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderObject {
    pub size: u64,
    pub child_count: u32,
    pub reserved: [u8; 2],
}

impl HeaderObject {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_OBJECT_PREAMBLE || data[..16] != Guid::HEADER.as_bytes()[..] {
            return Err(TagError::UnknownFormat);
        }
        let mut size = [0u8; 8];
        size.copy_from_slice(&data[16..24]);
        let size = u64::from_le_bytes(size);
        if size < HEADER_OBJECT_PREAMBLE as u64 || size > data.len() as u64 {
            return Err(TagError::malformed(
                16,
                format!("header object size {} outside 30..={}", size, data.len()),
            ));
        }
        let mut count = [0u8; 4];
        count.copy_from_slice(&data[24..28]);
        Ok(HeaderObject {
            size,
            child_count: u32::from_le_bytes(count),
            reserved: [data[28], data[29]],
        })
    }

    fn encode(&self) -> Vec<u8> {
        let mut raw = Guid::HEADER.as_bytes().to_vec();
        raw.extend_from_slice(&self.size.to_le_bytes());
        raw.extend_from_slice(&self.child_count.to_le_bytes());
        raw.extend_from_slice(&self.reserved);
        raw
    }
}

fn header_payload<'a>(data: &'a [u8], header: &HeaderObject) -> &'a [u8] {
    &data[HEADER_OBJECT_PREAMBLE..header.size as usize]
}

/// Read the tag from a complete ASF file image
pub fn read(data: &[u8], options: &ReadOptions) -> Result<AsfTag> {
    let header = HeaderObject::parse(data)?;

    let extension = ContainerReader::new(AsfLayout)
        .single_occurrence(options.is_single_occurrence())
        .with_reader(LibraryReader {
            read_artwork: options.reads_artwork(),
        });
    let reader = ContainerReader::new(AsfLayout)
        .single_occurrence(options.is_single_occurrence())
        .with_reader(ContentDescriptionReader)
        .with_reader(ExtendedContentReader {
            read_artwork: options.reads_artwork(),
        })
        .with_reader(HeaderExtensionReader::new(extension));

    let mut tag = AsfTag::new();
    let children = reader.read_slice(
        header_payload(data, &header),
        HEADER_OBJECT_PREAMBLE as u64,
        &mut tag,
    )?;
    if children.len() != header.child_count as usize {
        debug!(
            declared = header.child_count,
            found = children.len(),
            "header object child count disagrees with its contents"
        );
    }
    Ok(tag)
}

/// Objects directly inside the header object
pub fn chunks(data: &[u8]) -> Result<Vec<ChunkInfo<Guid>>> {
    let header = HeaderObject::parse(data)?;
    scan_children(
        AsfLayout,
        header_payload(data, &header),
        HEADER_OBJECT_PREAMBLE as u64,
    )
}

/// Which object each field of the tag goes to
#[derive(Debug, Default)]
struct Routing {
    content: [String; 5],
    extended: Vec<Attribute>,
    library: Vec<Attribute>,
}

impl Routing {
    fn plan(tag: &AsfTag) -> Result<Self> {
        let mut routing = Routing::default();
        let mut seen: HashMap<&str, usize> = HashMap::new();

        for field in tag.fields() {
            let occurrence = seen.entry(field.id()).or_default();
            *occurrence += 1;
            let first = *occurrence == 1;

            if first && !field.is_binary() && is_content_description_name(field.id()) {
                let text = field.content().unwrap_or_default();
                // u16 byte length including the terminator
                if (text.encode_utf16().count() + 1) * 2 <= MAX_DESCRIPTOR_VALUE {
                    if let Some(slot) = CONTENT_DESCRIPTION_NAMES
                        .iter()
                        .position(|name| *name == field.id())
                    {
                        routing.content[slot] = text;
                        continue;
                    }
                }
            }

            let attribute = Attribute::from_field(field, AttributeContainer::ExtendedContent)?;
            if first && attribute.value.len() <= MAX_DESCRIPTOR_VALUE && attribute.value_type != TYPE_GUID {
                routing.extended.push(attribute);
            } else {
                routing
                    .library
                    .push(Attribute::from_field(field, AttributeContainer::Library)?);
            }
        }
        Ok(routing)
    }
}

/// Rewrite the header object of `data` so it stores `tag`, returning the new
/// file image
pub fn write(data: &[u8], tag: &AsfTag) -> Result<Vec<u8>> {
    let header = HeaderObject::parse(data)?;
    let payload = header_payload(data, &header);
    let routing = Routing::plan(tag)?;

    let existing: Vec<Guid> = scan_children(AsfLayout, payload, HEADER_OBJECT_PREAMBLE as u64)?
        .into_iter()
        .map(|child| child.id)
        .collect();

    let mut desired = Vec::new();
    if routing.content.iter().any(|value| !value.is_empty()) {
        desired.push((
            Guid::CONTENT_DESCRIPTION,
            AsfLayout.encode_chunk(
                &Guid::CONTENT_DESCRIPTION,
                &encode_content_description(&routing.content)?,
            )?,
        ));
    }
    if !routing.extended.is_empty() {
        desired.push((
            Guid::EXTENDED_CONTENT_DESCRIPTION,
            AsfLayout.encode_chunk(
                &Guid::EXTENDED_CONTENT_DESCRIPTION,
                &encode_extended_content(&routing.extended)?,
            )?,
        ));
    }

    let mut modifiers: Modifiers<'_, Guid> = sync_chunks(&existing, desired, |id| {
        *id == Guid::CONTENT_DESCRIPTION || *id == Guid::EXTENDED_CONTENT_DESCRIPTION
    });
    modifiers.push(Box::new(HeaderExtensionModifier::new(vec![Box::new(
        LibraryModifier::new(routing.library),
    )])));

    let mut children = Vec::new();
    let result = rewrite_slice(
        &AsfLayout,
        payload,
        HEADER_OBJECT_PREAMBLE as u64,
        Guid::HEADER,
        modifiers,
        &mut children,
    )?;

    let size = result
        .apply_to(header.size)
        .ok_or_else(|| TagError::malformed(16, "header object size underflow"))?;
    let child_count = i64::from(header.child_count) + i64::from(result.chunk_count_difference());
    let child_count = u32::try_from(child_count)
        .map_err(|_| TagError::malformed(24, format!("header object child count {}", child_count)))?;
    debug!(size, child_count, "rewrote header object");

    let new_header = HeaderObject {
        size,
        child_count,
        reserved: header.reserved,
    };
    let mut out = new_header.encode();
    out.extend_from_slice(&children);
    out.extend_from_slice(&data[header.size as usize..]);
    patch_file_size(&mut out, &new_header)?;
    Ok(out)
}

/// The file properties object records the total file size at payload offset 16
fn patch_file_size(file: &mut [u8], header: &HeaderObject) -> Result<()> {
    let file_len = file.len() as u64;
    let children = scan_children(
        AsfLayout,
        &file[HEADER_OBJECT_PREAMBLE..header.size as usize],
        HEADER_OBJECT_PREAMBLE as u64,
    )?;
    if let Some(properties) = children
        .iter()
        .find(|child| child.id == Guid::FILE_PROPERTIES && child.length >= 24 + 24)
    {
        let at = properties.offset as usize + 24 + 16;
        file[at..at + 8].copy_from_slice(&file_len.to_le_bytes());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asf::content::decode_content_description;
    use crate::asf::extension::extension_children;
    use crate::tag::Artwork;

    fn file_properties(file_size: u64) -> Vec<u8> {
        let mut payload = vec![0u8; 16];
        payload.extend_from_slice(&file_size.to_le_bytes());
        payload.extend_from_slice(&[0u8; 56]);
        AsfLayout.encode_chunk(&Guid::FILE_PROPERTIES, &payload).unwrap()
    }

    fn asf_file(children: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = children.concat();
        let mut file = HeaderObject {
            size: (HEADER_OBJECT_PREAMBLE + body.len()) as u64,
            child_count: children.len() as u32,
            reserved: [1, 2],
        }
        .encode();
        file.extend(body);
        file.extend(AsfLayout.encode_chunk(&Guid::DATA, &[0xAB; 26]).unwrap());
        file
    }

    #[test]
    fn test_write_then_read() {
        let unknown = AsfLayout
            .encode_chunk(&Guid::STREAM_PROPERTIES, &[7u8; 40])
            .unwrap();
        let file = asf_file(&[file_properties(0), unknown.clone()]);

        let mut tag = AsfTag::new();
        tag.set(FieldKey::Title, "Song").unwrap();
        tag.set(FieldKey::Album, "Record").unwrap();
        tag.add(FieldKey::Genre, "Rock").unwrap();
        tag.add(FieldKey::Genre, "Pop").unwrap();
        tag.add_field(
            tag.create_artwork_field(Artwork::from_image(vec![0x89, b'P', b'N', b'G', 0, 1]))
                .unwrap(),
        );

        let written = write(&file, &tag).unwrap();
        let header = HeaderObject::parse(&written).unwrap();
        assert_eq!(header.child_count, 5);
        assert_eq!(header.reserved, [1, 2]);
        assert_eq!(&written[70..78], &(written.len() as u64).to_le_bytes());
        assert!(written.ends_with(&AsfLayout.encode_chunk(&Guid::DATA, &[0xAB; 26]).unwrap()));

        let ids: Vec<Guid> = chunks(&written).unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(
            ids,
            vec![
                Guid::FILE_PROPERTIES,
                Guid::STREAM_PROPERTIES,
                Guid::CONTENT_DESCRIPTION,
                Guid::EXTENDED_CONTENT_DESCRIPTION,
                Guid::HEADER_EXTENSION,
            ]
        );

        let read_back = read(&written, &ReadOptions::default()).unwrap();
        assert_eq!(read_back.get_first(FieldKey::Title), "Song");
        assert_eq!(read_back.get_first(FieldKey::Album), "Record");
        assert_eq!(read_back.get_all(FieldKey::Genre), vec!["Rock", "Pop"]);
        assert_eq!(read_back.artwork().len(), 1);
        assert!(read_back.get_first_by_id("Title").unwrap().is_common());
    }

    #[test]
    fn test_second_title_goes_to_library() {
        let file = asf_file(&[file_properties(0)]);
        let mut tag = AsfTag::new();
        tag.add(FieldKey::Title, "One").unwrap();
        tag.add(FieldKey::Title, "Two").unwrap();

        let written = write(&file, &tag).unwrap();
        let children = chunks(&written).unwrap();
        let description = children
            .iter()
            .find(|c| c.id == Guid::CONTENT_DESCRIPTION)
            .unwrap();
        let start = description.offset as usize + 24;
        let end = description.offset as usize + description.length as usize;
        assert_eq!(
            decode_content_description(&written[start..end], start as u64).unwrap()[0],
            "One"
        );

        let extension = children
            .iter()
            .find(|c| c.id == Guid::HEADER_EXTENSION)
            .unwrap();
        let start = extension.offset as usize + 24;
        let end = extension.offset as usize + extension.length as usize;
        assert!(extension_children(&written[start..end], start as u64).is_ok());

        let read_back = read(&written, &ReadOptions::default()).unwrap();
        assert_eq!(read_back.get_all(FieldKey::Title), vec!["One", "Two"]);
    }

    #[test]
    fn test_empty_tag_removes_objects() {
        let mut tag = AsfTag::new();
        tag.set(FieldKey::Artist, "Someone").unwrap();
        tag.set(FieldKey::Year, "1999").unwrap();
        let file = write(&asf_file(&[file_properties(0)]), &tag).unwrap();

        let cleared = write(&file, &AsfTag::new()).unwrap();
        let ids: Vec<Guid> = chunks(&cleared).unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![Guid::FILE_PROPERTIES]);
        assert_eq!(HeaderObject::parse(&cleared).unwrap().child_count, 1);
        assert!(read(&cleared, &ReadOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_not_asf() {
        assert!(matches!(
            read(b"fLaC and more bytes than thirty in total", &ReadOptions::default()),
            Err(TagError::UnknownFormat)
        ));
    }
}
