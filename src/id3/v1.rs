// ID3v1 trailer
//
// Last 128 bytes of the file: "TAG", title(30), artist(30), album(30),
// year(4), comment(30), genre(1). In v1.1 a zero at comment[28] makes
// comment[29] the track number. Read-only; tags are written as ID3v2.

use crate::error::Result;
use crate::field_mapping::FieldKey;
use crate::genre::genre_name;
use crate::id3::Id3Tag;
use crate::utils::encoding::{decode_text, TextEncoding};
use tracing::warn;

pub const TAG_SIZE: usize = 128;
const TAG_ID: &[u8; 3] = b"TAG";
/// Genre byte meaning "no genre"
const NO_GENRE: u8 = 255;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Id3v1Tag {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: String,
    pub comment: String,
    pub track: Option<u8>,
    pub genre: Option<u8>,
}

impl Id3v1Tag {
    /// Trailer at the end of `data`, if there is one
    pub fn parse(data: &[u8]) -> Option<Self> {
        let start = data.len().checked_sub(TAG_SIZE)?;
        let trailer = &data[start..];
        if !trailer.starts_with(TAG_ID) {
            return None;
        }

        let (comment, track) = if trailer[125] == 0 && trailer[126] != 0 {
            (text(&trailer[97..125]), Some(trailer[126]))
        } else {
            (text(&trailer[97..127]), None)
        };

        Some(Id3v1Tag {
            title: text(&trailer[3..33]),
            artist: text(&trailer[33..63]),
            album: text(&trailer[63..93]),
            year: text(&trailer[93..97]),
            comment,
            track,
            genre: (trailer[127] != NO_GENRE).then_some(trailer[127]),
        })
    }

    /// Genre name, warning when the byte is outside the table
    pub fn genre_name(&self) -> Option<&'static str> {
        let id = self.genre?;
        let name = genre_name(u16::from(id));
        if name.is_none() {
            warn!(genre = id, "ID3v1 genre byte has no name");
        }
        name
    }

    /// Copy the non-empty values into `tag`
    pub fn apply_to(&self, tag: &mut Id3Tag) -> Result<()> {
        let track = self.track.map(|n| n.to_string()).unwrap_or_default();
        let values = [
            (FieldKey::Title, self.title.as_str()),
            (FieldKey::Artist, self.artist.as_str()),
            (FieldKey::Album, self.album.as_str()),
            (FieldKey::Year, self.year.as_str()),
            (FieldKey::Comment, self.comment.as_str()),
            (FieldKey::Track, track.as_str()),
            (FieldKey::Genre, self.genre_name().unwrap_or_default()),
        ];
        for (key, value) in values {
            if !value.is_empty() {
                let field = tag.create_field(key, value)?;
                tag.add_field(field);
            }
        }
        Ok(())
    }
}

/// NUL-padded Latin-1, trimmed
fn text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    decode_text(&bytes[..end], TextEncoding::Iso8859_1)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trailer(comment: &[u8], track: Option<u8>, genre: u8) -> Vec<u8> {
        let mut raw = vec![0u8; TAG_SIZE];
        raw[..3].copy_from_slice(TAG_ID);
        raw[3..7].copy_from_slice(b"Song");
        raw[33..39].copy_from_slice(b"Artist");
        raw[63..68].copy_from_slice(b"Alb\xe9m");
        raw[93..97].copy_from_slice(b"1987");
        raw[97..97 + comment.len()].copy_from_slice(comment);
        if let Some(track) = track {
            raw[126] = track;
        }
        raw[127] = genre;
        raw
    }

    #[test]
    fn test_v11_track() {
        let mut data = vec![0xFF; 64];
        data.extend(trailer(b"nice", Some(7), 17));

        let tag = Id3v1Tag::parse(&data).unwrap();
        assert_eq!(tag.title, "Song");
        assert_eq!(tag.album, "Albém");
        assert_eq!(tag.comment, "nice");
        assert_eq!(tag.track, Some(7));
        assert_eq!(tag.genre_name(), Some("Rock"));
    }

    #[test]
    fn test_v10_full_comment() {
        let tag = Id3v1Tag::parse(&trailer(&[b'c'; 30], None, NO_GENRE)).unwrap();
        assert_eq!(tag.comment.len(), 30);
        assert_eq!(tag.track, None);
        assert_eq!(tag.genre, None);
    }

    #[test]
    fn test_absent_or_short() {
        assert!(Id3v1Tag::parse(&[0; 127]).is_none());
        assert!(Id3v1Tag::parse(&[0; 200]).is_none());
    }

    #[test]
    fn test_apply_to_tag() {
        let mut tag = Id3Tag::new();
        Id3v1Tag::parse(&trailer(b"", Some(3), 200))
            .unwrap()
            .apply_to(&mut tag)
            .unwrap();
        assert_eq!(tag.get_first(FieldKey::Title), "Song");
        assert_eq!(tag.get_first(FieldKey::Year), "1987");
        assert_eq!(tag.get_first(FieldKey::Track), "3");
        assert!(!tag.has_field(FieldKey::Genre));
        assert!(!tag.has_field(FieldKey::Comment));
    }
}
