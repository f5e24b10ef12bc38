//! oxitag - byte-exact tag readers and rewriters for audio containers
//!
//! Every supported family (ASF, MP4, FLAC, ID3) is modelled as a tree of
//! length-prefixed chunks. Reading walks the tree with registered chunk
//! readers; writing streams it through chunk modifiers so that everything
//! the tag does not own is copied byte for byte.

pub mod asf;
pub mod chunk;
pub mod config;
pub mod error;
pub mod field_mapping;
pub mod flac;
pub mod genre;
pub mod id3;
pub mod mp4;
pub mod tag;
pub mod utils;

pub use config::ReadOptions;
pub use error::{Result, TagError};
pub use field_mapping::FieldKey;
pub use tag::{Artwork, Tag, TagField, TagFormat};

use crate::asf::AsfTag;
use crate::chunk::ChunkInfo;
use crate::flac::FlacTag;
use crate::id3::Id3Tag;
use crate::mp4::Mp4Tag;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Container family of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Asf,
    Mp4,
    Flac,
    /// MPEG audio with ID3v2 and/or ID3v1 tags
    Id3,
}

impl FileType {
    /// Identify the family from the first bytes of a file
    pub fn detect(data: &[u8]) -> Result<Self> {
        if data.len() >= 16 && data[..16] == asf::Guid::HEADER.as_bytes()[..] {
            return Ok(FileType::Asf);
        }
        if data.len() >= 8 && &data[4..8] == b"ftyp" {
            return Ok(FileType::Mp4);
        }
        if data.starts_with(flac::FLAC_SIGNATURE) {
            return Ok(FileType::Flac);
        }
        if data.starts_with(b"ID3") || is_mpeg_sync(data) {
            return Ok(FileType::Id3);
        }
        Err(TagError::UnknownFormat)
    }

    pub fn name(&self) -> &'static str {
        match self {
            FileType::Asf => "asf",
            FileType::Mp4 => "mp4",
            FileType::Flac => "flac",
            FileType::Id3 => "id3",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 11-bit MPEG audio frame sync
fn is_mpeg_sync(data: &[u8]) -> bool {
    matches!(data, [0xFF, second, ..] if second & 0xE0 == 0xE0)
}

/// A tag of any supported family
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyTag {
    Asf(AsfTag),
    Mp4(Mp4Tag),
    Flac(FlacTag),
    Id3(Id3Tag),
}

macro_rules! dispatch {
    ($self:expr, $tag:ident => $body:expr) => {
        match $self {
            AnyTag::Asf($tag) => $body,
            AnyTag::Mp4($tag) => $body,
            AnyTag::Flac($tag) => $body,
            AnyTag::Id3($tag) => $body,
        }
    };
}

impl AnyTag {
    /// Empty tag of the given family
    pub fn new(file_type: FileType) -> Self {
        match file_type {
            FileType::Asf => AnyTag::Asf(AsfTag::new()),
            FileType::Mp4 => AnyTag::Mp4(Mp4Tag::new()),
            FileType::Flac => AnyTag::Flac(FlacTag::new()),
            FileType::Id3 => AnyTag::Id3(Id3Tag::new()),
        }
    }

    pub fn file_type(&self) -> FileType {
        match self {
            AnyTag::Asf(_) => FileType::Asf,
            AnyTag::Mp4(_) => FileType::Mp4,
            AnyTag::Flac(_) => FileType::Flac,
            AnyTag::Id3(_) => FileType::Id3,
        }
    }

    /// Family name as used in errors
    pub fn format_name(&self) -> &'static str {
        match self {
            AnyTag::Asf(_) => asf::AsfFormat::NAME,
            AnyTag::Mp4(_) => mp4::Mp4Format::NAME,
            AnyTag::Flac(_) => flac::FlacFormat::NAME,
            AnyTag::Id3(_) => id3::Id3Format::NAME,
        }
    }

    pub fn get_first(&self, key: FieldKey) -> String {
        dispatch!(self, tag => tag.get_first(key))
    }

    pub fn get_all(&self, key: FieldKey) -> Vec<String> {
        dispatch!(self, tag => tag.get_all(key))
    }

    pub fn has_field(&self, key: FieldKey) -> bool {
        dispatch!(self, tag => tag.has_field(key))
    }

    /// Replace every value of `key`
    pub fn set(&mut self, key: FieldKey, value: &str) -> Result<()> {
        dispatch!(self, tag => tag.set(key, value))
    }

    /// Append a value of `key`
    pub fn add(&mut self, key: FieldKey, value: &str) -> Result<()> {
        dispatch!(self, tag => tag.add(key, value))
    }

    pub fn delete(&mut self, key: FieldKey) -> Result<()> {
        dispatch!(self, tag => tag.delete_field(key))
    }

    /// Replace all artwork with `artwork`
    pub fn set_artwork(&mut self, artwork: Artwork) -> Result<()> {
        dispatch!(self, tag => {
            let field = tag.create_artwork_field(artwork)?;
            tag.set_field(field);
            Ok(())
        })
    }

    pub fn artwork(&self) -> Vec<&Artwork> {
        dispatch!(self, tag => tag.artwork())
    }

    /// Generic key a native field id maps onto, if any
    pub fn field_key(&self, id: &str) -> Option<FieldKey> {
        match self {
            AnyTag::Asf(_) => asf::AsfFormat::field_key(id),
            AnyTag::Mp4(_) => mp4::Mp4Format::field_key(id),
            AnyTag::Flac(_) => flac::FlacFormat::field_key(id),
            AnyTag::Id3(_) => id3::Id3Format::field_key(id),
        }
    }

    pub fn fields(&self) -> &[TagField] {
        dispatch!(self, tag => tag.fields())
    }

    pub fn len(&self) -> usize {
        dispatch!(self, tag => tag.len())
    }

    pub fn is_empty(&self) -> bool {
        dispatch!(self, tag => tag.is_empty())
    }
}

/// Read the tag of a complete file image
pub fn read_from_slice(data: &[u8], options: &ReadOptions) -> Result<AnyTag> {
    let file_type = FileType::detect(data)?;
    debug!(%file_type, bytes = data.len(), "reading tag");
    Ok(match file_type {
        FileType::Asf => AnyTag::Asf(asf::read(data, options)?),
        FileType::Mp4 => AnyTag::Mp4(mp4::read(data, options)?),
        FileType::Flac => AnyTag::Flac(flac::read(data, options)?),
        FileType::Id3 => AnyTag::Id3(id3::read(data, options)?),
    })
}

/// New file image with `tag` stored in `data`; the tag must belong to the
/// file's family
pub fn write_to_vec(data: &[u8], tag: &AnyTag) -> Result<Vec<u8>> {
    let file_type = FileType::detect(data)?;
    match (file_type, tag) {
        (FileType::Asf, AnyTag::Asf(tag)) => asf::write(data, tag),
        (FileType::Mp4, AnyTag::Mp4(tag)) => mp4::write(data, tag),
        (FileType::Flac, AnyTag::Flac(tag)) => flac::write(data, tag),
        (FileType::Id3, AnyTag::Id3(tag)) => id3::write(data, tag),
        (file_type, tag) => Err(TagError::Unsupported(format!(
            "writing a {} tag into a {} file",
            tag.format_name(),
            file_type
        ))),
    }
}

/// Top-level chunks of a file image, ids rendered as text
pub fn list_chunks(data: &[u8]) -> Result<Vec<ChunkInfo<String>>> {
    fn named<I: fmt::Display>(chunks: Vec<ChunkInfo<I>>) -> Vec<ChunkInfo<String>> {
        chunks
            .into_iter()
            .map(|chunk| ChunkInfo {
                id: chunk.id.to_string(),
                offset: chunk.offset,
                length: chunk.length,
                handled: chunk.handled,
            })
            .collect()
    }

    Ok(match FileType::detect(data)? {
        FileType::Asf => named(asf::chunks(data)?),
        FileType::Mp4 => named(mp4::chunks(data)?),
        FileType::Flac => named(flac::chunks(data)?),
        FileType::Id3 => named(id3::chunks(data)?),
    })
}

/// Audio file on disk
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub path: PathBuf,
    pub file_type: FileType,
}

impl AudioFile {
    /// Open a file and detect its family
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = fs::read(&path)?;
        let file_type = FileType::detect(&data)?;
        Ok(AudioFile { path, file_type })
    }

    pub fn read_tag(&self, options: &ReadOptions) -> Result<AnyTag> {
        read_from_slice(&fs::read(&self.path)?, options)
    }

    /// Store `tag`, replacing the file with the rewritten image
    pub fn write_tag(&self, tag: &AnyTag) -> Result<()> {
        let data = fs::read(&self.path)?;
        let rewritten = write_to_vec(&data, tag)?;
        debug!(
            path = %self.path.display(),
            before = data.len(),
            after = rewritten.len(),
            "writing file"
        );
        fs::write(&self.path, rewritten)?;
        Ok(())
    }

    pub fn chunks(&self) -> Result<Vec<ChunkInfo<String>>> {
        list_chunks(&fs::read(&self.path)?)
    }
}
