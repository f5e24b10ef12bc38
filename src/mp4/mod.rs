// MP4/M4A metadata handling module
//
// iTunes-style metadata lives in moov/udta/meta/ilst; each ilst child is
// one item holding one or more `data` atoms. Writing re-renders ilst and
// lets the nested container modifiers carry the size change up to moov.
// When moov sits before mdat, the chunk offset tables then have to move
// by the same amount.

pub mod atom;
pub mod freeform;
pub mod genre;
pub mod item;

pub use atom::{Fourcc, Mp4Layout};

use crate::chunk::{
    rewrite_slice, scan_children, ChunkInfo, ChunkLayout, ChunkModifier, ContainerModifier,
    ContainerReader, NestedContainer, RemoveChunk, ReplaceChunk,
};
use crate::config::ReadOptions;
use crate::error::{Result, TagError};
use crate::field_mapping::{parse_number_pair, FieldKey};
use crate::mp4::atom::{child_atoms, DataAtom};
use crate::mp4::freeform::ReverseDnsField;
use crate::mp4::genre::LegacyGenreField;
use crate::mp4::item::{ilst_reader, render_ilst};
use crate::tag::{Artwork, Tag, TagField, TagFormat};
use crate::utils::encoding::TextEncoding;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mp4Format;

impl TagFormat for Mp4Format {
    const NAME: &'static str = "MP4";

    fn field_id(key: FieldKey) -> Option<&'static str> {
        let id = match key {
            FieldKey::Title => "©nam",
            FieldKey::Artist => "©ART",
            FieldKey::Album => "©alb",
            FieldKey::AlbumArtist => "aART",
            FieldKey::Year => "©day",
            FieldKey::Track => "trkn",
            FieldKey::Disc => "disk",
            FieldKey::Genre => "©gen",
            FieldKey::Comment => "©cmt",
            FieldKey::Composer => "©wrt",
            FieldKey::Lyrics => "©lyr",
            FieldKey::Copyright => "cprt",
            FieldKey::Encoder => "©too",
            FieldKey::Isrc => "com.apple.iTunes:ISRC",
            FieldKey::MusicBrainzTrackId => "com.apple.iTunes:MusicBrainz Track Id",
            FieldKey::Cover => "covr",
        };
        Some(id)
    }

    fn artwork_id() -> &'static str {
        "covr"
    }

    fn fallback_ids(key: FieldKey) -> &'static [&'static str] {
        match key {
            FieldKey::Genre => &["gnre"],
            _ => &[],
        }
    }

    fn create_text_field(key: FieldKey, id: &str, value: &str) -> Result<TagField> {
        let common = key.is_common();
        match key {
            FieldKey::Track | FieldKey::Disc => {
                if parse_number_pair(value).is_none() {
                    return Err(TagError::InvalidFieldValue(format!(
                        "{} expects N or N/TOTAL, got {:?}",
                        key, value
                    )));
                }
                Ok(TagField::text(id, value.trim(), TextEncoding::Utf8).with_common(common))
            }
            // names in the legacy table are stored as `gnre`, anything else as free text
            FieldKey::Genre if LegacyGenreField::is_valid_genre(value) => {
                Ok(LegacyGenreField::from_value(value).to_field().with_common(common))
            }
            _ => Ok(TagField::text(id, value, TextEncoding::Utf8)
                .with_data_type(DataAtom::UTF8)
                .with_common(common)),
        }
    }

    fn create_artwork_field(artwork: Artwork) -> Result<TagField> {
        artwork.validate()?;
        if artwork.is_linked() {
            return Err(TagError::InvalidFieldValue(
                "covr cannot store linked images".into(),
            ));
        }
        let data_type = match artwork.mime_type.as_str() {
            "image/png" => DataAtom::PNG,
            "image/bmp" => DataAtom::BMP,
            _ => DataAtom::JPEG,
        };
        Ok(TagField::picture(Self::artwork_id(), artwork).with_data_type(data_type))
    }
}

pub type Mp4Tag = Tag<Mp4Format>;

/// `meta` is a full box (4 bytes of version and flags) in iTunes files but
/// a plain container in QuickTime ones, where `hdlr` follows immediately.
fn meta_preamble(payload: &[u8]) -> usize {
    if payload.len() >= 8 && &payload[4..8] == b"hdlr" {
        0
    } else {
        4
    }
}

/// Payload of a new `meta`: version/flags plus an `mdir` handler
fn meta_template() -> Result<Vec<u8>> {
    let mut hdlr = vec![0u8; 8];
    hdlr.extend_from_slice(b"mdir");
    hdlr.extend_from_slice(b"appl");
    hdlr.extend_from_slice(&[0u8; 9]);

    let mut meta = vec![0u8; 4];
    meta.extend(Mp4Layout.encode_chunk(&Fourcc::HDLR, &hdlr)?);
    Ok(meta)
}

fn check_signature(data: &[u8]) -> Result<()> {
    if data.len() >= 8 && &data[4..8] == b"ftyp" {
        Ok(())
    } else {
        Err(TagError::UnknownFormat)
    }
}

/// Read the tag from a complete MP4 file image
pub fn read(data: &[u8], options: &ReadOptions) -> Result<Mp4Tag> {
    check_signature(data)?;
    let single = options.is_single_occurrence();

    let meta = ContainerReader::new(Mp4Layout)
        .single_occurrence(single)
        .with_reader(ilst_reader(options.reads_artwork()));
    let udta = ContainerReader::new(Mp4Layout)
        .single_occurrence(single)
        .with_reader(NestedContainer::new(Fourcc::META, meta).with_preamble(meta_preamble));
    let moov = ContainerReader::new(Mp4Layout)
        .single_occurrence(single)
        .with_reader(NestedContainer::new(Fourcc::UDTA, udta));
    let file = ContainerReader::new(Mp4Layout)
        .single_occurrence(single)
        .with_reader(NestedContainer::new(Fourcc::MOOV, moov));

    let mut tag = Mp4Tag::new();
    file.read_slice(data, 0, &mut tag)?;
    Ok(tag)
}

/// Top-level atoms of the file
pub fn chunks(data: &[u8]) -> Result<Vec<ChunkInfo<Fourcc>>> {
    check_signature(data)?;
    scan_children(Mp4Layout, data, 0)
}

/// Rewrite `data` so its ilst stores `tag`, returning the new file image
pub fn write(data: &[u8], tag: &Mp4Tag) -> Result<Vec<u8>> {
    let top = chunks(data)?;
    let moov = top
        .iter()
        .find(|atom| atom.id == Fourcc::MOOV)
        .ok_or_else(|| TagError::Unsupported("file has no moov atom".into()))?;
    let moov_first = top
        .iter()
        .find(|atom| atom.id == Fourcc::MDAT)
        .is_some_and(|mdat| moov.offset < mdat.offset);

    let ilst: Box<dyn ChunkModifier<Fourcc>> = if tag.is_empty() {
        Box::new(RemoveChunk::new(Fourcc::ILST))
    } else {
        Box::new(ReplaceChunk::encoded(
            &Mp4Layout,
            Fourcc::ILST,
            &render_ilst(tag)?,
        )?)
    };
    let meta = ContainerModifier::new(Mp4Layout, Fourcc::META, vec![ilst])
        .with_preamble(meta_preamble)
        .synthesize_with(meta_template()?);
    let udta =
        ContainerModifier::new(Mp4Layout, Fourcc::UDTA, vec![Box::new(meta)]).synthesize_with(Vec::new());
    let moov_modifier = ContainerModifier::new(Mp4Layout, Fourcc::MOOV, vec![Box::new(udta)]);

    let mut out = Vec::with_capacity(data.len());
    let result = rewrite_slice(
        &Mp4Layout,
        data,
        0,
        Fourcc::FILE,
        vec![Box::new(moov_modifier)],
        &mut out,
    )?;

    let delta = result.byte_difference();
    debug!(delta, moov_first, "rewrote moov");
    if delta != 0 && moov_first {
        shift_moov_offsets(&mut out, delta)?;
    }
    Ok(out)
}

fn shift_moov_offsets(file: &mut [u8], delta: i64) -> Result<()> {
    let range = child_atoms(file, 0)?
        .into_iter()
        .find(|atom| atom.id == Fourcc::MOOV)
        .map(|atom| (atom.offset, atom.payload.len()));
    if let Some((offset, len)) = range {
        let start = offset as usize;
        shift_chunk_offsets(&mut file[start..start + len], offset, delta)?;
    }
    Ok(())
}

/// Walk trak/mdia/minf/stbl below `payload` and move every `stco`/`co64` entry
fn shift_chunk_offsets(payload: &mut [u8], origin: u64, delta: i64) -> Result<()> {
    let children: Vec<(Fourcc, u64, usize)> = child_atoms(payload, origin)?
        .into_iter()
        .map(|atom| (atom.id, atom.offset, atom.payload.len()))
        .collect();

    for (id, offset, len) in children {
        let start = (offset - origin) as usize;
        let body = &mut payload[start..start + len];
        match id {
            Fourcc::TRAK | Fourcc::MDIA | Fourcc::MINF | Fourcc::STBL => {
                shift_chunk_offsets(body, offset, delta)?
            }
            Fourcc::STCO => shift_table(body, offset, delta, 4)?,
            Fourcc::CO64 => shift_table(body, offset, delta, 8)?,
            _ => {}
        }
    }
    Ok(())
}

fn shift_table(body: &mut [u8], offset: u64, delta: i64, width: usize) -> Result<()> {
    if body.len() < 8 {
        return Err(TagError::malformed(offset, "chunk offset table without entry count"));
    }
    let count = u32::from_be_bytes([body[4], body[5], body[6], body[7]]) as usize;
    let fits = count
        .checked_mul(width)
        .and_then(|n| n.checked_add(8))
        .is_some_and(|n| n <= body.len());
    if !fits {
        return Err(TagError::malformed(
            offset,
            format!("{} chunk offsets do not fit in {} bytes", count, body.len()),
        ));
    }

    for entry in body[8..8 + count * width].chunks_exact_mut(width) {
        if width == 4 {
            let old = u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]);
            let new = u32::try_from(i64::from(old) + delta).map_err(|_| {
                TagError::Unsupported(format!("chunk offset {} cannot move by {} in stco", old, delta))
            })?;
            entry.copy_from_slice(&new.to_be_bytes());
        } else {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(entry);
            let old = u64::from_be_bytes(raw);
            let new = old
                .checked_add_signed(delta)
                .ok_or_else(|| TagError::malformed(offset, "co64 entry moved below zero"))?;
            entry.copy_from_slice(&new.to_be_bytes());
        }
    }
    Ok(())
}
