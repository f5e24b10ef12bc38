// Generic field keys
//
// Each container family names its fields differently:
// - ASF: attribute names (Title, Author, WM/AlbumTitle, ...)
// - MP4: iTunes atoms (©nam, ©ART, ©alb, ...) and reverse-DNS names
// - FLAC: Vorbis Comment keys (TITLE, ARTIST, ALBUM, ...)
// - ID3v2: Frame IDs (TIT2, TPE1, TALB, ...)
//
// `FieldKey` is the format-independent name; every `TagFormat` maps it to
// its own field id or rejects it.

use std::fmt;
use std::str::FromStr;

/// Format-independent metadata field identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Title,
    Artist,
    Album,
    AlbumArtist,
    Year,
    Track,
    Disc,
    Genre,
    Comment,
    Composer,
    Lyrics,
    Copyright,
    Encoder,
    Isrc,
    MusicBrainzTrackId,
    /// Artwork pseudo-key, see [`crate::tag::Tag::create_artwork_field`]
    Cover,
}

impl FieldKey {
    pub const ALL: [FieldKey; 16] = [
        FieldKey::Title,
        FieldKey::Artist,
        FieldKey::Album,
        FieldKey::AlbumArtist,
        FieldKey::Year,
        FieldKey::Track,
        FieldKey::Disc,
        FieldKey::Genre,
        FieldKey::Comment,
        FieldKey::Composer,
        FieldKey::Lyrics,
        FieldKey::Copyright,
        FieldKey::Encoder,
        FieldKey::Isrc,
        FieldKey::MusicBrainzTrackId,
        FieldKey::Cover,
    ];

    /// Get key name (lowercase)
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::Title => "title",
            FieldKey::Artist => "artist",
            FieldKey::Album => "album",
            FieldKey::AlbumArtist => "album_artist",
            FieldKey::Year => "year",
            FieldKey::Track => "track",
            FieldKey::Disc => "disc",
            FieldKey::Genre => "genre",
            FieldKey::Comment => "comment",
            FieldKey::Composer => "composer",
            FieldKey::Lyrics => "lyrics",
            FieldKey::Copyright => "copyright",
            FieldKey::Encoder => "encoder",
            FieldKey::Isrc => "isrc",
            FieldKey::MusicBrainzTrackId => "musicbrainz_track_id",
            FieldKey::Cover => "cover",
        }
    }

    /// The classic ID3v1-era fields every format carries
    pub fn is_common(&self) -> bool {
        matches!(
            self,
            FieldKey::Title
                | FieldKey::Artist
                | FieldKey::Album
                | FieldKey::Year
                | FieldKey::Track
                | FieldKey::Genre
                | FieldKey::Comment
        )
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "title" => Ok(FieldKey::Title),
            "artist" => Ok(FieldKey::Artist),
            "album" => Ok(FieldKey::Album),
            "album_artist" | "albumartist" => Ok(FieldKey::AlbumArtist),
            "year" | "date" => Ok(FieldKey::Year),
            "track" | "tracknumber" => Ok(FieldKey::Track),
            "disc" | "discnumber" => Ok(FieldKey::Disc),
            "genre" => Ok(FieldKey::Genre),
            "comment" => Ok(FieldKey::Comment),
            "composer" => Ok(FieldKey::Composer),
            "lyrics" => Ok(FieldKey::Lyrics),
            "copyright" => Ok(FieldKey::Copyright),
            "encoder" | "encoded_by" => Ok(FieldKey::Encoder),
            "isrc" => Ok(FieldKey::Isrc),
            "musicbrainz_track_id" => Ok(FieldKey::MusicBrainzTrackId),
            "cover" | "artwork" => Ok(FieldKey::Cover),
            _ => Err(format!("unknown field key: {}", s)),
        }
    }
}

/// Parse "3" or "3/12" into a number and an optional total
pub fn parse_number_pair(value: &str) -> Option<(u16, Option<u16>)> {
    let mut parts = value.trim().splitn(2, '/');
    let number = parts.next()?.trim().parse::<u16>().ok()?;
    let total = match parts.next() {
        Some(total) if !total.trim().is_empty() => Some(total.trim().parse::<u16>().ok()?),
        _ => None,
    };
    Some((number, total))
}

/// Inverse of [`parse_number_pair`]; a zero total is omitted
pub fn format_number_pair(number: u16, total: u16) -> String {
    if total == 0 {
        number.to_string()
    } else {
        format!("{}/{}", number, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_key_parsing() {
        assert_eq!("title".parse::<FieldKey>(), Ok(FieldKey::Title));
        assert_eq!("TITLE".parse::<FieldKey>(), Ok(FieldKey::Title));
        assert_eq!("Album Artist".parse::<FieldKey>(), Ok(FieldKey::AlbumArtist));
        assert!("unknown".parse::<FieldKey>().is_err());

        for key in FieldKey::ALL {
            assert_eq!(key.as_str().parse::<FieldKey>(), Ok(key));
        }
    }

    #[test]
    fn test_common_keys() {
        assert!(FieldKey::Title.is_common());
        assert!(FieldKey::Genre.is_common());
        assert!(!FieldKey::Composer.is_common());
        assert!(!FieldKey::Cover.is_common());
    }

    #[test]
    fn test_number_pairs() {
        assert_eq!(parse_number_pair("1/10"), Some((1, Some(10))));
        assert_eq!(parse_number_pair(" 5 "), Some((5, None)));
        assert_eq!(parse_number_pair("5/"), Some((5, None)));
        assert_eq!(parse_number_pair("x/3"), None);
        assert_eq!(format_number_pair(3, 12), "3/12");
        assert_eq!(format_number_pair(3, 0), "3");
    }
}
