// ilst items: decoding into fields and rendering back

use crate::chunk::{ChunkLayout, ChunkReader, ChunkSource, ContainerReader, NestedContainer};
use crate::error::{Result, TagError};
use crate::field_mapping::parse_number_pair;
use crate::mp4::atom::{child_atoms, Atom, DataAtom, Fourcc, Mp4Layout};
use crate::mp4::freeform::ReverseDnsField;
use crate::mp4::genre::LegacyGenreField;
use crate::mp4::{Mp4Format, Mp4Tag};
use crate::tag::{Artwork, TagField, TagFormat};
use crate::utils::encoding::{decode_text, encode_text, TextEncoding};
use std::collections::HashMap;
use tracing::debug;

/// Data type of fields holding an undecoded item payload
pub const RAW_ITEM: u32 = u32::MAX;

/// Integer items stored in a single byte
const BYTE_INTEGERS: [Fourcc; 7] = [
    Fourcc(*b"cpil"),
    Fourcc(*b"pgap"),
    Fourcc(*b"pcst"),
    Fourcc(*b"hdvd"),
    Fourcc(*b"stik"),
    Fourcc(*b"rtng"),
    Fourcc(*b"shwm"),
];

fn integer_width(id: Fourcc) -> Option<usize> {
    if id == Fourcc::TMPO {
        Some(2)
    } else if BYTE_INTEGERS.contains(&id) {
        Some(1)
    } else {
        None
    }
}

/// Byte length of the number pair value in `trkn`/`disk`
fn pair_width(id: Fourcc) -> Option<usize> {
    match id {
        Fourcc::TRKN => Some(8),
        Fourcc::DISK => Some(6),
        _ => None,
    }
}

/// Item kept byte for byte; rendering regenerates the same header around it
fn raw_field(id: Fourcc, payload: &[u8]) -> TagField {
    TagField::binary(id.to_id(), payload.to_vec()).with_data_type(RAW_ITEM)
}

fn mime_for(data_type: u32, value: &[u8]) -> String {
    match data_type {
        DataAtom::JPEG => "image/jpeg".to_string(),
        DataAtom::PNG => "image/png".to_string(),
        DataAtom::BMP => "image/bmp".to_string(),
        _ => crate::tag::artwork::sniff_mime_type(value)
            .unwrap_or("image/jpeg")
            .to_string(),
    }
}

fn decode_data(id: Fourcc, data: DataAtom, read_artwork: bool) -> Option<TagField> {
    let name = id.to_id();
    match id {
        Fourcc::GNRE => {
            if data.data_type != DataAtom::IMPLICIT || data.value.len() != 2 {
                return None;
            }
            Some(LegacyGenreField::decode(u16::from_be_bytes([data.value[0], data.value[1]])).to_field())
        }
        Fourcc::TRKN | Fourcc::DISK => {
            if data.data_type != DataAtom::IMPLICIT || Some(data.value.len()) != pair_width(id) {
                return None;
            }
            let number = u16::from_be_bytes([data.value[2], data.value[3]]);
            let total = u16::from_be_bytes([data.value[4], data.value[5]]);
            let text = crate::field_mapping::format_number_pair(number, total);
            Some(TagField::text(name, &text, TextEncoding::Utf8))
        }
        Fourcc::COVR => {
            if !read_artwork {
                return None;
            }
            let mime_type = mime_for(data.data_type, &data.value);
            let artwork = Artwork::new(data.value, mime_type, String::new());
            Some(TagField::picture(name, artwork).with_data_type(data.data_type))
        }
        _ => match data.data_type {
            DataAtom::UTF8 => Some(
                TagField::text(name, &decode_text(&data.value, TextEncoding::Utf8), TextEncoding::Utf8)
                    .with_data_type(DataAtom::UTF8),
            ),
            DataAtom::UTF16 => Some(
                TagField::text(
                    name,
                    &decode_text(&data.value, TextEncoding::Utf16BE),
                    TextEncoding::Utf16BE,
                )
                .with_data_type(DataAtom::UTF16),
            ),
            DataAtom::INTEGER if integer_width(id) == Some(data.value.len()) => {
                let number = data
                    .value
                    .iter()
                    .fold(0i64, |acc, &b| (acc << 8) | i64::from(b));
                // sign-extend from the stored width
                let shift = 64 - 8 * data.value.len() as u32;
                let number = (number << shift) >> shift;
                Some(
                    TagField::text(name, &number.to_string(), TextEncoding::Utf8)
                        .with_data_type(DataAtom::INTEGER),
                )
            }
            _ => None,
        },
    }
}

/// Decode one ilst item into fields. Anything that is not a well-formed
/// list of understood `data` atoms is kept as a raw item.
pub fn decode_item(item: &Atom<'_>, read_artwork: bool) -> Result<Vec<TagField>> {
    if item.id == Fourcc::FREEFORM {
        return Ok(vec![ReverseDnsField::decode(item.payload, item.offset)?.to_field()]);
    }

    let raw = || raw_field(item.id, item.payload);

    let children = match child_atoms(item.payload, item.offset) {
        Ok(children) => children,
        Err(err) => {
            debug!(item = %item.id, %err, "item payload is not an atom list");
            return Ok(vec![raw()]);
        }
    };
    if children.is_empty() || children.iter().any(|child| child.id != Fourcc::DATA) {
        debug!(item = %item.id, "keeping item without plain data atoms as raw");
        return Ok(vec![raw()]);
    }

    let mut fields = Vec::with_capacity(children.len());
    for child in &children {
        match decode_data(item.id, DataAtom::parse(child)?, read_artwork) {
            Some(field) => fields.push(field),
            None => {
                debug!(item = %item.id, "keeping item with undecoded data as raw");
                return Ok(vec![raw()]);
            }
        }
    }
    Ok(fields)
}

/// Reads every child of `ilst`; items repeat legitimately
pub struct ItemReader {
    read_artwork: bool,
}

impl ChunkReader<Fourcc, Mp4Tag> for ItemReader {
    fn can_read(&self, _id: &Fourcc) -> bool {
        true
    }

    fn read(&self, chunk: ChunkSource<'_, Fourcc>, tag: &mut Mp4Tag) -> Result<()> {
        let item = Atom {
            id: *chunk.id(),
            offset: chunk.offset,
            payload: chunk.payload,
        };
        for field in decode_item(&item, self.read_artwork)? {
            let common = Mp4Format::is_common_id(field.id());
            tag.add_field(field.with_common(common));
        }
        Ok(())
    }
}

/// Reader for the `ilst` container; unlike the levels above it, items may repeat
pub fn ilst_reader<'r>(read_artwork: bool) -> NestedContainer<'r, Mp4Layout, Mp4Tag> {
    NestedContainer::new(
        Fourcc::ILST,
        ContainerReader::new(Mp4Layout)
            .single_occurrence(false)
            .with_reader(ItemReader { read_artwork }),
    )
}

fn invalid(field: &TagField, why: &str) -> TagError {
    TagError::InvalidFieldValue(format!("{}: {}", field.id(), why))
}

fn encode_data(id: Fourcc, field: &TagField) -> Result<DataAtom> {
    if let Some(artwork) = field.artwork() {
        let data_type = match artwork.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => DataAtom::JPEG,
            "image/png" => DataAtom::PNG,
            "image/bmp" => DataAtom::BMP,
            _ => DataAtom::IMPLICIT,
        };
        return Ok(DataAtom::new(data_type, artwork.data.clone()));
    }

    if id == Fourcc::GNRE {
        return Ok(DataAtom::new(
            DataAtom::IMPLICIT,
            LegacyGenreField::from_field(field).encode(),
        ));
    }

    if field.is_binary() {
        return Ok(DataAtom::new(field.data_type(), field.raw().to_vec()));
    }

    let text = field.content().unwrap_or_default();
    if let Some(width) = pair_width(id) {
        let (number, total) =
            parse_number_pair(&text).ok_or_else(|| invalid(field, "expected N or N/TOTAL"))?;
        let mut value = vec![0u8; width];
        value[2..4].copy_from_slice(&number.to_be_bytes());
        value[4..6].copy_from_slice(&total.unwrap_or(0).to_be_bytes());
        return Ok(DataAtom::new(DataAtom::IMPLICIT, value));
    }

    match field.data_type() {
        DataAtom::INTEGER => {
            let number: i64 = text
                .trim()
                .parse()
                .map_err(|_| invalid(field, "expected an integer"))?;
            let width = integer_width(id).unwrap_or(4);
            let bytes = number.to_be_bytes();
            Ok(DataAtom::new(DataAtom::INTEGER, bytes[8 - width..].to_vec()))
        }
        DataAtom::UTF16 => Ok(DataAtom::new(
            DataAtom::UTF16,
            encode_text(&text, TextEncoding::Utf16BE),
        )),
        _ => Ok(DataAtom::new(
            DataAtom::UTF8,
            encode_text(&text, TextEncoding::Utf8),
        )),
    }
}

/// Render the ilst payload for `tag`.
///
/// Values sharing an item id are grouped into one item as consecutive
/// `data` atoms, at the position of the first. Raw and reverse-DNS items
/// are written one atom per field.
pub fn render_ilst(tag: &Mp4Tag) -> Result<Vec<u8>> {
    let mut items: Vec<(Fourcc, Vec<u8>)> = Vec::new();
    let mut grouped: HashMap<Fourcc, usize> = HashMap::new();

    for field in tag.fields() {
        if ReverseDnsField::is_key(field.id()) {
            let atom = ReverseDnsField::from_field(field)?.encode()?;
            items.push((Fourcc::FREEFORM, atom[8..].to_vec()));
            continue;
        }

        let id = Fourcc::from_id(field.id())
            .ok_or_else(|| invalid(field, "item ids are four Latin-1 characters"))?;

        if field.is_binary() && field.data_type() == RAW_ITEM && field.artwork().is_none() {
            items.push((id, field.raw().to_vec()));
            continue;
        }

        let data = encode_data(id, field)?.encode()?;
        match grouped.get(&id) {
            Some(&index) => items[index].1.extend(data),
            None => {
                grouped.insert(id, items.len());
                items.push((id, data));
            }
        }
    }

    let mut ilst = Vec::new();
    for (id, payload) in items {
        ilst.extend(Mp4Layout.encode_chunk(&id, &payload)?);
    }
    Ok(ilst)
}
