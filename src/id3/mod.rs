// ID3 metadata handling module
//
// An ID3v2 tag sits at the start of the file: a 10-byte header, an optional
// extended header, a frame list and padding. Without one, an ID3v1 trailer
// is read instead. Writing always produces ID3v2, keeping the version of an
// existing tag and creating 2.4 otherwise.

pub mod frames;
pub mod v1;
pub mod v2;

pub use frames::{FrameId, Id3Layout};
pub use v1::Id3v1Tag;
pub use v2::Id3v2Header;

use crate::chunk::{rewrite_slice, scan_children, sync_chunks, ChunkInfo, ContainerReader};
use crate::config::ReadOptions;
use crate::error::{Result, TagError};
use crate::field_mapping::{parse_number_pair, FieldKey};
use crate::genre::genre_name;
use crate::id3::v2::{
    render_frames, FrameReader, TextFrameReader, FLAG_EXTENDED_HEADER, TAG_HEADER_LEN,
};
use crate::tag::{Tag, TagField, TagFormat};
use tracing::debug;

/// Version used for tags created from scratch
pub const DEFAULT_VERSION: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Id3Format;

impl TagFormat for Id3Format {
    const NAME: &'static str = "ID3v2";

    fn field_id(key: FieldKey) -> Option<&'static str> {
        let id = match key {
            FieldKey::Title => "TIT2",
            FieldKey::Artist => "TPE1",
            FieldKey::Album => "TALB",
            FieldKey::AlbumArtist => "TPE2",
            FieldKey::Year => "TDRC",
            FieldKey::Track => "TRCK",
            FieldKey::Disc => "TPOS",
            FieldKey::Genre => "TCON",
            FieldKey::Comment => "COMM",
            FieldKey::Composer => "TCOM",
            FieldKey::Lyrics => "USLT",
            FieldKey::Copyright => "TCOP",
            FieldKey::Encoder => "TSSE",
            FieldKey::Isrc => "TSRC",
            FieldKey::MusicBrainzTrackId => "UFID:http://musicbrainz.org",
            FieldKey::Cover => "APIC",
        };
        Some(id)
    }

    fn artwork_id() -> &'static str {
        "APIC"
    }

    fn fallback_ids(key: FieldKey) -> &'static [&'static str] {
        match key {
            FieldKey::Year => &["TYER"],
            _ => &[],
        }
    }

    fn create_text_field(key: FieldKey, id: &str, value: &str) -> Result<TagField> {
        let common = key.is_common();
        let value = match key {
            FieldKey::Track | FieldKey::Disc => {
                if parse_number_pair(value).is_none() {
                    return Err(TagError::InvalidFieldValue(format!(
                        "{} expects N or N/TOTAL, got {:?}",
                        key, value
                    )));
                }
                value.trim().to_string()
            }
            // bare legacy ids are stored by name
            FieldKey::Genre => match value.trim().parse::<u16>().ok().and_then(genre_name) {
                Some(name) => name.to_string(),
                None => value.to_string(),
            },
            _ => value.to_string(),
        };
        Ok(TagField::text(id, &value, Self::text_encoding()).with_common(common))
    }
}

pub type Id3Tag = Tag<Id3Format>;

fn frame_reader(version: u8, options: &ReadOptions) -> ContainerReader<'static, Id3Layout, Id3Tag> {
    ContainerReader::new(Id3Layout::new(version))
        .single_occurrence(options.is_single_occurrence())
        .with_reader(TextFrameReader { version })
        .with_reader(FrameReader {
            version,
            read_artwork: options.reads_artwork(),
        })
}

/// Header, offset of the first frame, and the frame list with its padding
fn frame_region(data: &[u8]) -> Result<Option<(Id3v2Header, usize, &[u8])>> {
    let Some(header) = Id3v2Header::parse(data)? else {
        return Ok(None);
    };
    let body = &data[TAG_HEADER_LEN..TAG_HEADER_LEN + header.size as usize];
    let start = TAG_HEADER_LEN + header.extended_header_len(body)?;
    Ok(Some((header, start, &data[start..TAG_HEADER_LEN + header.size as usize])))
}

/// Read the ID3v2 tag, falling back to an ID3v1 trailer
pub fn read(data: &[u8], options: &ReadOptions) -> Result<Id3Tag> {
    let mut tag = Id3Tag::new();
    match frame_region(data)? {
        Some((header, start, frames)) => {
            frame_reader(header.version, options).read_slice(frames, start as u64, &mut tag)?;
        }
        None => {
            if let Some(trailer) = Id3v1Tag::parse(data) {
                debug!("no ID3v2 tag, using the ID3v1 trailer");
                trailer.apply_to(&mut tag)?;
            }
        }
    }
    Ok(tag)
}

/// Frames of the ID3v2 tag; empty when the file has none
pub fn chunks(data: &[u8]) -> Result<Vec<ChunkInfo<FrameId>>> {
    match frame_region(data)? {
        Some((header, start, frames)) => scan_children(header.layout(), frames, start as u64),
        None => Ok(Vec::new()),
    }
}

/// Rewrite the ID3v2 tag of `data` so it stores `tag`, returning the new
/// file image. Frames are updated in place; padding is kept after them.
pub fn write(data: &[u8], tag: &Id3Tag) -> Result<Vec<u8>> {
    let Some((mut header, start, frames)) = frame_region(data)? else {
        return create(data, tag);
    };
    let old_len = header.total_len();
    let layout = header.layout();
    let children = scan_children(layout, frames, start as u64)?;
    let existing: Vec<FrameId> = children.iter().map(|c| c.id).collect();
    let desired = render_frames(tag, layout)?;
    let modifiers = sync_chunks(&existing, desired, |_| true);

    let mut rewritten = Vec::with_capacity(frames.len());
    let result = rewrite_slice(
        &layout,
        frames,
        start as u64,
        FrameId::TAG,
        modifiers,
        &mut rewritten,
    )?;
    debug!(
        byte_difference = result.byte_difference(),
        frames = children.len() as i64 + i64::from(result.chunk_count_difference()),
        "rewrote ID3v2 frames"
    );

    // the extended header may carry a CRC of the old frames, so it is dropped
    if header.flags & FLAG_EXTENDED_HEADER != 0 {
        debug!("dropping ID3v2 extended header");
        header.flags &= !FLAG_EXTENDED_HEADER;
    }
    header.size = u32::try_from(rewritten.len())
        .map_err(|_| TagError::InvalidFieldValue("ID3v2 tag too large".into()))?;

    let mut out = header.encode()?;
    out.extend(rewritten);
    out.extend_from_slice(&data[old_len..]);
    Ok(out)
}

/// Prepend a new tag; an empty tag leaves the file untouched
fn create(data: &[u8], tag: &Id3Tag) -> Result<Vec<u8>> {
    if tag.is_empty() {
        return Ok(data.to_vec());
    }
    let mut header = Id3v2Header::new(DEFAULT_VERSION);
    let frames: Vec<u8> = render_frames(tag, header.layout())?
        .into_iter()
        .flat_map(|(_, frame)| frame)
        .collect();
    header.size = u32::try_from(frames.len())
        .map_err(|_| TagError::InvalidFieldValue("ID3v2 tag too large".into()))?;

    let mut out = header.encode()?;
    out.extend(frames);
    out.extend_from_slice(data);
    Ok(out)
}
