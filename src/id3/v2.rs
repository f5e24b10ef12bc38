// ID3v2 tag header and frame content codecs

use crate::chunk::{ChunkReader, ChunkSource};
use crate::error::{Result, TagError};
use crate::genre::genre_name;
use crate::id3::frames::{header_flags, is_transformed, FrameId, Id3Layout};
use crate::id3::{Id3Format, Id3Tag};
use crate::tag::{Artwork, TagField, TagFormat};
use crate::utils::encoding::{decode_text, encode_text, split_terminated, trim_terminator, TextEncoding};
use crate::utils::io::{decode_synchsafe, encode_synchsafe};
use std::collections::HashMap;
use tracing::warn;

pub const TAG_HEADER_LEN: usize = 10;

const FLAG_UNSYNCHRONISATION: u8 = 0x80;
pub(crate) const FLAG_EXTENDED_HEADER: u8 = 0x40;
const FLAG_FOOTER: u8 = 0x10;

/// Language written into COMM/USLT frames that did not come with one
const DEFAULT_LANGUAGE: [u8; 3] = *b"eng";

/// "ID3", version, revision, flags, synchsafe size of everything after the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Id3v2Header {
    pub version: u8,
    pub revision: u8,
    pub flags: u8,
    pub size: u32,
}

impl Id3v2Header {
    /// Header for a tag created from scratch
    pub fn new(version: u8) -> Self {
        Id3v2Header {
            version,
            revision: 0,
            flags: 0,
            size: 0,
        }
    }

    /// `None` when `data` does not start with an ID3v2 tag
    pub fn parse(data: &[u8]) -> Result<Option<Self>> {
        if !data.starts_with(b"ID3") {
            return Ok(None);
        }
        if data.len() < TAG_HEADER_LEN {
            return Err(TagError::malformed(0, "truncated ID3v2 header"));
        }
        let header = Id3v2Header {
            version: data[3],
            revision: data[4],
            flags: data[5],
            size: decode_synchsafe([data[6], data[7], data[8], data[9]]),
        };

        match header.version {
            3 | 4 => {}
            2 => return Err(TagError::Unsupported("ID3v2.2 tags".into())),
            other => return Err(TagError::Unsupported(format!("ID3v2.{} tags", other))),
        }
        if header.flags & FLAG_UNSYNCHRONISATION != 0 {
            return Err(TagError::Unsupported("unsynchronised ID3v2 tags".into()));
        }
        if header.total_len() > data.len() {
            return Err(TagError::malformed(
                6,
                format!(
                    "tag declares {} bytes but the file has {}",
                    header.total_len(),
                    data.len()
                ),
            ));
        }
        Ok(Some(header))
    }

    /// Header, body and footer
    pub fn total_len(&self) -> usize {
        let footer = if self.version >= 4 && self.flags & FLAG_FOOTER != 0 {
            TAG_HEADER_LEN
        } else {
            0
        };
        TAG_HEADER_LEN + self.size as usize + footer
    }

    pub fn layout(&self) -> Id3Layout {
        Id3Layout::new(self.version)
    }

    /// Bytes taken by the extended header at the start of `body`
    pub fn extended_header_len(&self, body: &[u8]) -> Result<usize> {
        if self.flags & FLAG_EXTENDED_HEADER == 0 {
            return Ok(0);
        }
        if body.len() < 4 {
            return Err(TagError::malformed(
                TAG_HEADER_LEN as u64,
                "truncated extended header",
            ));
        }
        let size = [body[0], body[1], body[2], body[3]];
        // 2.3 excludes the size field itself, 2.4 includes it
        let len = if self.version >= 4 {
            decode_synchsafe(size) as usize
        } else {
            u32::from_be_bytes(size) as usize + 4
        };
        if len > body.len() {
            return Err(TagError::malformed(
                TAG_HEADER_LEN as u64,
                format!("extended header of {} bytes in a {} byte tag", len, body.len()),
            ));
        }
        Ok(len)
    }

    /// The footer is not rewritten, so its flag is cleared
    pub fn encode(&self) -> Result<Vec<u8>> {
        let size = encode_synchsafe(self.size).ok_or_else(|| {
            TagError::InvalidFieldValue(format!("tag of {} bytes exceeds 28 bits", self.size))
        })?;
        let mut raw = b"ID3".to_vec();
        raw.extend_from_slice(&[self.version, self.revision, self.flags & !FLAG_FOOTER]);
        raw.extend_from_slice(&size);
        Ok(raw)
    }
}

/// Encoding byte plus NUL-separated values
pub fn decode_text_values(body: &[u8]) -> (TextEncoding, Vec<String>) {
    let Some((&first, rest)) = body.split_first() else {
        return (TextEncoding::Iso8859_1, Vec::new());
    };
    let encoding = TextEncoding::from_byte(first);
    let mut rest = trim_terminator(rest, encoding);
    let mut values = Vec::new();
    loop {
        let (value, tail) = split_terminated(rest, encoding);
        values.push(decode_text(value, encoding));
        if value.len() == rest.len() {
            break;
        }
        rest = tail;
    }
    (encoding, values)
}

/// Numeric references outside the table decode to empty content
fn lookup_genre(reference: &str, original: &str) -> String {
    if !reference.bytes().all(|b| b.is_ascii_digit()) || reference.is_empty() {
        return original.to_string();
    }
    match reference.parse::<u16>().ok().and_then(genre_name) {
        Some(name) => name.to_string(),
        None => {
            warn!(genre = original, "TCON references no known genre");
            String::new()
        }
    }
}

/// Resolve legacy TCON forms: "(17)", "(17)Refinement", "17", "(RX)", "(CR)"
pub fn resolve_content_type(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(rest) = trimmed.strip_prefix("((") {
        return format!("({}", rest);
    }
    if let Some(inner) = trimmed.strip_prefix('(') {
        if let Some((reference, refinement)) = inner.split_once(')') {
            if !refinement.is_empty() {
                return refinement.to_string();
            }
            return match reference {
                "RX" => "Remix".to_string(),
                "CR" => "Cover".to_string(),
                number => lookup_genre(number, value),
            };
        }
    }
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return lookup_genre(trimmed, value);
    }
    value.to_string()
}

/// Bounds-checked reads over a frame body
struct Body<'a> {
    data: &'a [u8],
    offset: u64,
    id: FrameId,
}

impl<'a> Body<'a> {
    fn short(&self) -> TagError {
        TagError::malformed(self.offset, format!("{} frame is truncated", self.id))
    }

    fn split(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.data.len() < len {
            return Err(self.short());
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    fn encoding(&mut self) -> Result<TextEncoding> {
        Ok(TextEncoding::from_byte(self.split(1)?[0]))
    }

    fn terminated(&mut self, encoding: TextEncoding) -> String {
        let (text, rest) = split_terminated(self.data, encoding);
        self.data = rest;
        decode_text(text, encoding)
    }

    fn rest(&self, encoding: TextEncoding) -> String {
        decode_text(trim_terminator(self.data, encoding), encoding)
    }
}

/// COMM/USLT language packed into a field's data type
fn language_code(language: &[u8]) -> u32 {
    match language {
        [a, b, c] => u32::from_be_bytes([0, *a, *b, *c]),
        _ => 0,
    }
}

fn language_bytes(code: u32) -> [u8; 3] {
    let [_, a, b, c] = code.to_be_bytes();
    if code == 0 {
        DEFAULT_LANGUAGE
    } else {
        [a, b, c]
    }
}

fn keyed_id(id: FrameId, key: &str) -> String {
    if key.is_empty() {
        id.to_string()
    } else {
        format!("{}:{}", id, key)
    }
}

/// Frame kept as bytes; its flags ride along in the data type
fn opaque_field(chunk: &ChunkSource<'_, FrameId>) -> TagField {
    TagField::binary(chunk.id().as_str(), chunk.payload.to_vec())
        .with_data_type(u32::from(header_flags(&chunk.header.raw)))
}

fn decode_picture(body: &mut Body<'_>) -> Result<Artwork> {
    let encoding = body.encoding()?;
    let mime_type = body.terminated(TextEncoding::Iso8859_1);
    let picture_type = body.split(1)?[0];
    let description = body.terminated(encoding);

    let mut artwork = Artwork::new(body.data.to_vec(), mime_type, description);
    artwork.picture_type = u32::from(picture_type);
    if artwork.kind().is_none() {
        warn!(picture_type, "unrecognised picture type in APIC frame");
    }
    Ok(artwork)
}

/// T*** frames other than TXXX; a repeated frame is excess
pub struct TextFrameReader {
    pub version: u8,
}

impl ChunkReader<FrameId, Id3Tag> for TextFrameReader {
    fn can_read(&self, id: &FrameId) -> bool {
        id.is_text()
    }

    fn read(&self, chunk: ChunkSource<'_, FrameId>, tag: &mut Id3Tag) -> Result<()> {
        let id = *chunk.id();
        if is_transformed(self.version, header_flags(&chunk.header.raw)) {
            tag.add_field(opaque_field(&chunk));
            return Ok(());
        }

        let (encoding, values) = decode_text_values(chunk.payload);
        let common = Id3Format::is_common_id(id.as_str());
        for value in values {
            let value = if id == FrameId::TCON {
                resolve_content_type(&value)
            } else {
                value
            };
            tag.add_field(TagField::text(id.as_str(), &value, encoding).with_common(common));
        }
        Ok(())
    }
}

/// Every other frame. Comments, pictures and user-defined frames repeat
/// legitimately; frames without a codec are kept opaque.
pub struct FrameReader {
    pub version: u8,
    pub read_artwork: bool,
}

impl FrameReader {
    fn decode(&self, chunk: &ChunkSource<'_, FrameId>) -> Result<TagField> {
        let id = *chunk.id();
        let mut body = Body {
            data: chunk.payload,
            offset: chunk.offset,
            id,
        };

        let field = match id {
            FrameId::TXXX => {
                let encoding = body.encoding()?;
                let description = body.terminated(encoding);
                TagField::text(keyed_id(id, &description), &body.rest(encoding), encoding)
            }
            FrameId::COMM | FrameId::USLT => {
                let encoding = body.encoding()?;
                let language = language_code(body.split(3)?);
                let description = body.terminated(encoding);
                TagField::text(keyed_id(id, &description), &body.rest(encoding), encoding)
                    .with_data_type(language)
            }
            FrameId::UFID => {
                let owner = body.terminated(TextEncoding::Iso8859_1);
                let identifier = decode_text(body.data, TextEncoding::Iso8859_1);
                TagField::text(keyed_id(id, &owner), &identifier, TextEncoding::Iso8859_1)
            }
            FrameId::APIC if self.read_artwork => {
                TagField::picture(id.as_str(), decode_picture(&mut body)?)
            }
            _ => return Ok(opaque_field(chunk)),
        };
        let common = Id3Format::is_common_id(field.id());
        Ok(field.with_common(common))
    }
}

impl ChunkReader<FrameId, Id3Tag> for FrameReader {
    fn can_read(&self, _id: &FrameId) -> bool {
        true
    }

    fn read(&self, chunk: ChunkSource<'_, FrameId>, tag: &mut Id3Tag) -> Result<()> {
        let field = if is_transformed(self.version, header_flags(&chunk.header.raw)) {
            opaque_field(&chunk)
        } else {
            self.decode(&chunk)?
        };
        tag.add_field(field);
        Ok(())
    }

    fn allows_repeats(&self) -> bool {
        true
    }
}

/// Encoding actually written for a value: 2.3 only knows Latin-1 and
/// UTF-16 with BOM, and Latin-1 is kept only when it can hold the text.
fn writable_encoding(encoding: TextEncoding, version: u8, texts: &[&str]) -> TextEncoding {
    let latin1 = texts
        .iter()
        .all(|text| text.chars().all(|c| (c as u32) < 0x100));
    match encoding {
        TextEncoding::Iso8859_1 if latin1 => TextEncoding::Iso8859_1,
        TextEncoding::Utf16 => TextEncoding::Utf16,
        TextEncoding::Utf16BE if version >= 4 => TextEncoding::Utf16BE,
        _ if version >= 4 => TextEncoding::Utf8,
        _ => TextEncoding::Utf16,
    }
}

fn terminator(encoding: TextEncoding) -> &'static [u8] {
    &[0, 0][..encoding.terminator_len()]
}

/// Year frame name differs between the two versions
fn frame_for_version(id: FrameId, version: u8) -> FrameId {
    match id {
        FrameId::TDRC if version < 4 => FrameId::TYER,
        FrameId::TYER if version >= 4 => FrameId::TDRC,
        other => other,
    }
}

fn invalid(field: &TagField, why: &str) -> TagError {
    TagError::InvalidFieldValue(format!("{}: {}", field.id(), why))
}

fn encode_keyed(field: &TagField, id: FrameId, key: &str, version: u8) -> Result<Vec<u8>> {
    let text = field.content().unwrap_or_default();
    let encoding = writable_encoding(field.encoding(), version, &[key, &text]);

    let mut body = vec![encoding as u8];
    if id == FrameId::COMM || id == FrameId::USLT {
        body.extend_from_slice(&language_bytes(field.data_type()));
    }
    body.extend(encode_text(key, encoding));
    body.extend_from_slice(terminator(encoding));
    body.extend(encode_text(&text, encoding));
    Ok(body)
}

fn encode_picture(artwork: &Artwork, version: u8) -> Result<Vec<u8>> {
    let picture_type = u8::try_from(artwork.picture_type).map_err(|_| {
        TagError::InvalidFieldValue(format!("picture type {} does not fit APIC", artwork.picture_type))
    })?;
    let encoding = writable_encoding(TextEncoding::Iso8859_1, version, &[&artwork.description]);

    let mut body = vec![encoding as u8];
    body.extend(encode_text(&artwork.mime_type, TextEncoding::Iso8859_1));
    body.push(0);
    body.push(picture_type);
    body.extend(encode_text(&artwork.description, encoding));
    body.extend_from_slice(terminator(encoding));
    body.extend_from_slice(&artwork.data);
    Ok(body)
}

fn encode_text_frame(encoding: TextEncoding, values: &[String], version: u8) -> Vec<u8> {
    let texts: Vec<&str> = values.iter().map(String::as_str).collect();
    let encoding = writable_encoding(encoding, version, &texts);
    let mut body = vec![encoding as u8];
    for (index, value) in values.iter().enumerate() {
        if index > 0 {
            body.extend_from_slice(terminator(encoding));
        }
        body.extend(encode_text(value, encoding));
    }
    body
}

enum Pending {
    Text {
        encoding: TextEncoding,
        values: Vec<String>,
    },
    Frame(Vec<u8>),
}

/// Encode the tag as complete frames, in field order.
///
/// Values of one text frame are joined into a single NUL-separated frame
/// at the position of the first.
pub fn render_frames(tag: &Id3Tag, layout: Id3Layout) -> Result<Vec<(FrameId, Vec<u8>)>> {
    let version = layout.version;
    let mut pending: Vec<(FrameId, Pending)> = Vec::new();
    let mut text_frames: HashMap<FrameId, usize> = HashMap::new();

    for field in tag.fields() {
        let (name, key) = match field.id().split_once(':') {
            Some((name, key)) => (name, Some(key)),
            None => (field.id(), None),
        };
        let id = FrameId::parse(name)
            .map(|id| frame_for_version(id, version))
            .ok_or_else(|| invalid(field, "not an ID3v2 frame id"))?;

        if let Some(artwork) = field.artwork() {
            pending.push((id, Pending::Frame(encode_picture(artwork, version)?)));
            continue;
        }
        if field.is_binary() {
            let flags = u16::try_from(field.data_type()).unwrap_or(0);
            pending.push((id, Pending::Frame(layout.encode_frame(&id, flags, field.raw())?)));
            continue;
        }

        let body = match id {
            FrameId::TXXX | FrameId::COMM | FrameId::USLT => {
                encode_keyed(field, id, key.unwrap_or_default(), version)?
            }
            FrameId::UFID => {
                let owner = key.ok_or_else(|| invalid(field, "UFID needs an owner"))?;
                let mut body = encode_text(owner, TextEncoding::Iso8859_1);
                body.push(0);
                body.extend(encode_text(
                    &field.content().unwrap_or_default(),
                    TextEncoding::Iso8859_1,
                ));
                body
            }
            id if id.is_text() => {
                let value = field.content().unwrap_or_default();
                match text_frames.get(&id) {
                    Some(&index) => {
                        if let Pending::Text { values, .. } = &mut pending[index].1 {
                            values.push(value);
                        }
                    }
                    None => {
                        text_frames.insert(id, pending.len());
                        pending.push((
                            id,
                            Pending::Text {
                                encoding: field.encoding(),
                                values: vec![value],
                            },
                        ));
                    }
                }
                continue;
            }
            _ => return Err(invalid(field, "frame has no text form")),
        };
        pending.push((id, Pending::Frame(layout.encode_frame(&id, 0, &body)?)));
    }

    pending
        .into_iter()
        .map(|(id, item)| {
            let frame = match item {
                Pending::Frame(frame) => frame,
                Pending::Text { encoding, values } => {
                    layout.encode_frame(&id, 0, &encode_text_frame(encoding, &values, version))?
                }
            };
            Ok((id, frame))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ContainerReader;
    use crate::field_mapping::FieldKey;

    fn read_frames(frames: &[u8], version: u8) -> Id3Tag {
        let mut tag = Id3Tag::new();
        ContainerReader::new(Id3Layout::new(version))
            .with_reader(TextFrameReader { version })
            .with_reader(FrameReader {
                version,
                read_artwork: true,
            })
            .read_slice(frames, 10, &mut tag)
            .unwrap();
        tag
    }

    fn frame(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        Id3Layout::new(4).encode_frame(&FrameId(*id), 0, body).unwrap()
    }

    #[test]
    fn test_multi_value_text_frame() {
        let frames = frame(b"TPE1", b"\x03One\0Two\0");
        let tag = read_frames(&frames, 4);
        assert_eq!(tag.get_all(FieldKey::Artist), vec!["One", "Two"]);

        let rendered = render_frames(&tag, Id3Layout::new(4)).unwrap();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].1, frame(b"TPE1", b"\x03One\0Two"));
    }

    #[test]
    fn test_content_type_forms() {
        assert_eq!(resolve_content_type("(17)"), "Rock");
        assert_eq!(resolve_content_type("17"), "Rock");
        assert_eq!(resolve_content_type("(4)Eurodisco"), "Eurodisco");
        assert_eq!(resolve_content_type("(RX)"), "Remix");
        assert_eq!(resolve_content_type("((Weird)"), "(Weird)");
        assert_eq!(resolve_content_type("Shoegaze"), "Shoegaze");
        assert_eq!(resolve_content_type("(999)"), "");
        assert_eq!(resolve_content_type("200"), "");
        assert_eq!(resolve_content_type("(XY)"), "(XY)");
    }

    #[test]
    fn test_unmapped_genre_reference_reads_empty() {
        let frames = frame(b"TCON", b"\x00(200)\0");
        let tag = read_frames(&frames, 4);
        assert!(tag.has_field(FieldKey::Genre));
        assert_eq!(tag.get_first(FieldKey::Genre), "");
    }

    #[test]
    fn test_comment_keeps_language_and_description() {
        let frames = frame(b"COMM", b"\0deuNote\0Hallo");
        let tag = read_frames(&frames, 4);
        let field = tag.get_first_by_id("COMM:Note").unwrap();
        assert_eq!(field.content().as_deref(), Some("Hallo"));

        let rendered = render_frames(&tag, Id3Layout::new(4)).unwrap();
        assert_eq!(rendered[0].1, frames);
    }

    #[test]
    fn test_picture_frame() {
        let mut body = b"\0image/png\0\x04back\0".to_vec();
        body.extend_from_slice(&[1, 2, 3]);
        let frames = frame(b"APIC", &body);
        let tag = read_frames(&frames, 4);
        let artwork = tag.artwork()[0];
        assert_eq!(artwork.picture_type, 4);
        assert_eq!(artwork.description, "back");
        assert_eq!(artwork.data, vec![1, 2, 3]);
        assert_eq!(render_frames(&tag, Id3Layout::new(4)).unwrap()[0].1, frames);
    }

    #[test]
    fn test_opaque_frames_keep_flags() {
        let frames = Id3Layout::new(4)
            .encode_frame(&FrameId(*b"PRIV"), 0x4000, b"owner\0data")
            .unwrap();
        let tag = read_frames(&frames, 4);
        assert!(tag.fields()[0].is_binary());
        assert_eq!(render_frames(&tag, Id3Layout::new(4)).unwrap()[0].1, frames);
    }

    #[test]
    fn test_v23_upgrades_utf8_and_renames_year() {
        let mut tag = Id3Tag::new();
        tag.set(FieldKey::Title, "Naïve").unwrap();
        tag.set(FieldKey::Year, "1999").unwrap();

        let rendered = render_frames(&tag, Id3Layout::new(3)).unwrap();
        assert_eq!(rendered[0].1[10], TextEncoding::Utf16 as u8);
        assert_eq!(rendered[1].0, FrameId::TYER);

        let back = read_frames(&rendered.concat_frames(), 3);
        assert_eq!(back.get_first(FieldKey::Title), "Naïve");
        assert_eq!(back.get_first(FieldKey::Year), "1999");
    }

    #[test]
    fn test_truncated_comment_is_malformed() {
        let frames = frame(b"COMM", b"\0de");
        let mut tag = Id3Tag::new();
        let result = ContainerReader::new(Id3Layout::new(4))
            .with_reader(FrameReader {
                version: 4,
                read_artwork: true,
            })
            .read_slice(&frames, 10, &mut tag);
        assert!(matches!(
            result,
            Err(TagError::MalformedContainer { offset: 20, .. })
        ));
    }

    #[test]
    fn test_unknown_field_id_rejected() {
        let mut tag = Id3Tag::new();
        tag.add_field(TagField::text("title", "x", TextEncoding::Utf8));
        assert!(render_frames(&tag, Id3Layout::new(4)).is_err());
    }

    trait ConcatFrames {
        fn concat_frames(&self) -> Vec<u8>;
    }

    impl ConcatFrames for Vec<(FrameId, Vec<u8>)> {
        fn concat_frames(&self) -> Vec<u8> {
            self.iter().flat_map(|(_, frame)| frame.clone()).collect()
        }
    }
}
