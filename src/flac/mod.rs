// FLAC metadata handling module
//
// After the `fLaC` signature comes a flat list of metadata blocks, the last
// one flagged in its header. Tag data is one VORBIS_COMMENT block plus any
// number of PICTURE blocks; everything else passes through untouched.

pub mod metadata;
pub mod picture;
pub mod vorbis;

pub use metadata::{BlockType, FlacLayout, FLAC_SIGNATURE};
pub use vorbis::VorbisComment;

use crate::chunk::{
    rewrite_slice, scan_children, sync_chunks, ChunkInfo, ChunkLayout, ChunkReader, ChunkSource,
    ContainerReader,
};
use crate::config::ReadOptions;
use crate::error::{Result, TagError};
use crate::field_mapping::FieldKey;
use crate::flac::metadata::{metadata_len, normalize_last_flag, BLOCK_HEADER_LEN};
use crate::flac::picture::{decode_picture, encode_picture};
use crate::flac::vorbis::{VorbisCommentReader, DEFAULT_VENDOR};
use crate::tag::{Tag, TagField, TagFormat};
use crate::utils::encoding::{encode_text, TextEncoding};
use tracing::debug;

/// Field id of artwork; also the name Ogg files use for pictures in comments
pub const PICTURE_FIELD: &str = "METADATA_BLOCK_PICTURE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlacFormat;

impl TagFormat for FlacFormat {
    const NAME: &'static str = "FLAC";

    fn field_id(key: FieldKey) -> Option<&'static str> {
        let id = match key {
            FieldKey::Title => "TITLE",
            FieldKey::Artist => "ARTIST",
            FieldKey::Album => "ALBUM",
            FieldKey::AlbumArtist => "ALBUMARTIST",
            FieldKey::Year => "DATE",
            FieldKey::Track => "TRACKNUMBER",
            FieldKey::Disc => "DISCNUMBER",
            FieldKey::Genre => "GENRE",
            FieldKey::Comment => "COMMENT",
            FieldKey::Composer => "COMPOSER",
            FieldKey::Lyrics => "LYRICS",
            FieldKey::Copyright => "COPYRIGHT",
            FieldKey::Encoder => "ENCODER",
            FieldKey::Isrc => "ISRC",
            FieldKey::MusicBrainzTrackId => "MUSICBRAINZ_TRACKID",
            FieldKey::Cover => PICTURE_FIELD,
        };
        Some(id)
    }

    fn artwork_id() -> &'static str {
        PICTURE_FIELD
    }

    fn fallback_ids(key: FieldKey) -> &'static [&'static str] {
        match key {
            FieldKey::Comment => &["DESCRIPTION"],
            FieldKey::Lyrics => &["UNSYNCEDLYRICS"],
            _ => &[],
        }
    }
}

pub type FlacTag = Tag<FlacFormat>;

/// Decodes PICTURE blocks, or keeps them as raw fields when artwork is skipped
pub struct PictureReader {
    read_artwork: bool,
}

impl ChunkReader<BlockType, FlacTag> for PictureReader {
    fn can_read(&self, id: &BlockType) -> bool {
        *id == BlockType::Picture
    }

    fn read(&self, chunk: ChunkSource<'_, BlockType>, tag: &mut FlacTag) -> Result<()> {
        let field = if self.read_artwork {
            TagField::picture(PICTURE_FIELD, decode_picture(chunk.payload, chunk.offset)?)
        } else {
            TagField::binary(PICTURE_FIELD, chunk.payload.to_vec())
        };
        tag.add_field(field);
        Ok(())
    }

    fn allows_repeats(&self) -> bool {
        true
    }
}

fn check_signature(data: &[u8]) -> Result<()> {
    if data.starts_with(FLAC_SIGNATURE) {
        Ok(())
    } else {
        Err(TagError::UnknownFormat)
    }
}

/// The metadata block list, without the signature
fn blocks(data: &[u8]) -> Result<&[u8]> {
    check_signature(data)?;
    let len = metadata_len(data)?;
    Ok(&data[FLAC_SIGNATURE.len()..FLAC_SIGNATURE.len() + len])
}

/// Read the tag from a complete FLAC file image
pub fn read(data: &[u8], options: &ReadOptions) -> Result<FlacTag> {
    let reader = ContainerReader::new(FlacLayout)
        .single_occurrence(options.is_single_occurrence())
        .with_reader(VorbisCommentReader)
        .with_reader(PictureReader {
            read_artwork: options.reads_artwork(),
        });

    let mut tag = FlacTag::new();
    reader.read_slice(blocks(data)?, FLAC_SIGNATURE.len() as u64, &mut tag)?;
    Ok(tag)
}

/// Metadata blocks of the file
pub fn chunks(data: &[u8]) -> Result<Vec<ChunkInfo<BlockType>>> {
    scan_children(FlacLayout, blocks(data)?, FLAC_SIGNATURE.len() as u64)
}

/// Vendor string of the first comment block, if there is one
fn existing_vendor(blocks: &[u8], children: &[ChunkInfo<BlockType>]) -> Result<Option<String>> {
    let origin = FLAC_SIGNATURE.len() as u64;
    let Some(block) = children.iter().find(|c| c.id == BlockType::VorbisComment) else {
        return Ok(None);
    };
    let start = (block.offset - origin + BLOCK_HEADER_LEN) as usize;
    let end = (block.offset - origin + block.length) as usize;
    let comment = VorbisComment::decode(&blocks[start..end], block.offset + BLOCK_HEADER_LEN)?;
    Ok(Some(comment.vendor))
}

/// Rewrite the metadata blocks of `data` so they store `tag`, returning the
/// new file image
pub fn write(data: &[u8], tag: &FlacTag) -> Result<Vec<u8>> {
    let region = blocks(data)?;
    let origin = FLAC_SIGNATURE.len() as u64;
    let children = scan_children(FlacLayout, region, origin)?;
    let vendor = existing_vendor(region, &children)?;

    let mut comment = VorbisComment {
        vendor: vendor.clone().unwrap_or_else(|| DEFAULT_VENDOR.to_string()),
        comments: Vec::new(),
    };
    let mut pictures = Vec::new();
    for field in tag.fields() {
        if let Some(artwork) = field.artwork() {
            pictures.push(encode_picture(artwork)?);
        } else if field.id() == PICTURE_FIELD && field.is_binary() {
            pictures.push(field.raw().to_vec());
        } else {
            let value = match field.content() {
                Some(text) => encode_text(&text, TextEncoding::Utf8),
                None => field.raw().to_vec(),
            };
            comment.comments.push((field.id().to_ascii_uppercase(), value));
        }
    }

    let mut desired = Vec::new();
    if !comment.comments.is_empty() || vendor.is_some() {
        desired.push((
            BlockType::VorbisComment,
            FlacLayout.encode_chunk(&BlockType::VorbisComment, &comment.encode()?)?,
        ));
    }
    for picture in pictures {
        desired.push((
            BlockType::Picture,
            FlacLayout.encode_chunk(&BlockType::Picture, &picture)?,
        ));
    }

    let existing: Vec<BlockType> = children.iter().map(|c| c.id).collect();
    let modifiers = sync_chunks(&existing, desired, |id| {
        matches!(id, BlockType::VorbisComment | BlockType::Picture)
    });

    let mut rewritten = Vec::with_capacity(region.len());
    let result = rewrite_slice(
        &FlacLayout,
        region,
        origin,
        BlockType::StreamInfo,
        modifiers,
        &mut rewritten,
    )?;
    normalize_last_flag(&mut rewritten);
    debug!(
        byte_difference = result.byte_difference(),
        blocks = children.len() as i64 + i64::from(result.chunk_count_difference()),
        "rewrote metadata blocks"
    );

    let mut out = Vec::with_capacity(data.len() + rewritten.len());
    out.extend_from_slice(FLAC_SIGNATURE);
    out.extend(rewritten);
    out.extend_from_slice(&data[FLAC_SIGNATURE.len() + region.len()..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Artwork;

    fn block(id: BlockType, payload: &[u8]) -> Vec<u8> {
        FlacLayout.encode_chunk(&id, payload).unwrap()
    }

    fn flac_file(extra: &[Vec<u8>]) -> Vec<u8> {
        let mut blocks = block(BlockType::StreamInfo, &[0x11; 34]);
        for b in extra {
            blocks.extend_from_slice(b);
        }
        blocks.extend(block(BlockType::Padding, &[0; 16]));
        normalize_last_flag(&mut blocks);

        let mut file = FLAC_SIGNATURE.to_vec();
        file.extend(blocks);
        file.extend_from_slice(&[0xFF, 0xF8, 0x69, 0x08]);
        file
    }

    fn comment_block(vendor: &str, comments: &[(&str, &str)]) -> Vec<u8> {
        let comment = VorbisComment {
            vendor: vendor.into(),
            comments: comments
                .iter()
                .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                .collect(),
        };
        block(BlockType::VorbisComment, &comment.encode().unwrap())
    }

    #[test]
    fn test_read_comments_and_pictures() {
        let artwork = Artwork::new(vec![9; 10], "image/png".into(), String::new());
        let file = flac_file(&[
            comment_block("libFLAC", &[("TITLE", "Song"), ("ARTIST", "A"), ("ARTIST", "B")]),
            block(BlockType::Picture, &encode_picture(&artwork).unwrap()),
            block(BlockType::Picture, &encode_picture(&artwork).unwrap()),
        ]);

        let tag = read(&file, &ReadOptions::default()).unwrap();
        assert_eq!(tag.get_first(FieldKey::Title), "Song");
        assert_eq!(tag.get_all(FieldKey::Artist), vec!["A", "B"]);
        assert_eq!(tag.artwork().len(), 2);
        assert!(tag.get_first_by_id("TITLE").unwrap().is_common());

        let raw = read(&file, &ReadOptions::new().read_artwork(false)).unwrap();
        assert!(raw.artwork().is_empty());
        assert_eq!(raw.get_fields(PICTURE_FIELD).count(), 2);
        assert_eq!(write(&file, &raw).unwrap(), file);
    }

    #[test]
    fn test_unchanged_write_is_identical() {
        let file = flac_file(&[
            block(BlockType::SeekTable, &[0xAA; 18]),
            comment_block("libFLAC", &[("TITLE", "Song")]),
            block(BlockType::Reserved(42), &[1, 2, 3]),
        ]);
        let tag = read(&file, &ReadOptions::default()).unwrap();
        assert_eq!(write(&file, &tag).unwrap(), file);
    }

    #[test]
    fn test_write_keeps_vendor_and_moves_last_flag() {
        let file = flac_file(&[comment_block("libFLAC 1.4", &[("TITLE", "Old")])]);
        let mut tag = read(&file, &ReadOptions::default()).unwrap();
        tag.set(FieldKey::Title, "New").unwrap();
        tag.add_field(
            tag.create_artwork_field(Artwork::from_image(vec![0xFF, 0xD8, 0xFF, 0xE0]))
                .unwrap(),
        );

        let written = write(&file, &tag).unwrap();
        assert!(written.ends_with(&[0xFF, 0xF8, 0x69, 0x08]));

        let ids: Vec<BlockType> = chunks(&written).unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(
            ids,
            vec![
                BlockType::StreamInfo,
                BlockType::VorbisComment,
                BlockType::Padding,
                BlockType::Picture,
            ]
        );
        let region = blocks(&written).unwrap();
        let last = chunks(&written).unwrap().pop().unwrap();
        assert_eq!(region[(last.offset - 4) as usize] & 0x80, 0x80);
        assert_eq!(region[0] & 0x80, 0);

        let children = chunks(&written).unwrap();
        assert_eq!(
            existing_vendor(region, &children).unwrap().as_deref(),
            Some("libFLAC 1.4")
        );
        let read_back = read(&written, &ReadOptions::default()).unwrap();
        assert_eq!(read_back.get_first(FieldKey::Title), "New");
        assert_eq!(read_back.artwork()[0].mime_type, "image/jpeg");
    }

    #[test]
    fn test_new_comment_block_gets_default_vendor() {
        let file = flac_file(&[]);
        let mut tag = FlacTag::new();
        tag.set(FieldKey::Comment, "hello").unwrap();
        let written = write(&file, &tag).unwrap();

        let region = blocks(&written).unwrap();
        let children = chunks(&written).unwrap();
        assert_eq!(
            existing_vendor(region, &children).unwrap().as_deref(),
            Some(DEFAULT_VENDOR)
        );
        assert_eq!(
            read(&written, &ReadOptions::default()).unwrap().get_first(FieldKey::Comment),
            "hello"
        );
    }

    #[test]
    fn test_second_comment_block_skipped_by_default() {
        let file = flac_file(&[
            comment_block("v", &[("TITLE", "First")]),
            comment_block("v", &[("TITLE", "Second")]),
        ]);
        let tag = read(&file, &ReadOptions::default()).unwrap();
        assert_eq!(tag.get_all(FieldKey::Title), vec!["First"]);

        let tag = read(&file, &ReadOptions::new().single_occurrence(false)).unwrap();
        assert_eq!(tag.get_all(FieldKey::Title), vec!["First", "Second"]);
    }

    #[test]
    fn test_truncated_block_list() {
        let mut file = FLAC_SIGNATURE.to_vec();
        file.extend_from_slice(&[0x00, 0x00, 0x00, 0x22]);
        assert!(matches!(
            read(&file, &ReadOptions::default()),
            Err(TagError::MalformedContainer { offset: 4, .. })
        ));
        assert!(matches!(
            read(b"OggS", &ReadOptions::default()),
            Err(TagError::UnknownFormat)
        ));
    }
}
