// Legacy numeric genre (`gnre`)
//
// The atom stores a u16 that is the legacy table index plus one. Building
// the field from a user value and decoding it from a file share one bound,
// ids 0..=125, but treat ids outside it differently: the former falls back
// to id 1, the latter keeps the number and leaves the display value empty.

use crate::genre::{genre_id, genre_name, MAX_STANDARD_GENRE_ID};
use crate::mp4::atom::Fourcc;
use crate::tag::TagField;
use crate::utils::encoding::TextEncoding;
use tracing::warn;

/// Stored value used when a user value cannot be resolved
const FALLBACK_STORED_ID: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyGenreField {
    stored: u16,
    content: Option<String>,
}

impl LegacyGenreField {
    /// Whether `value` can be written as a `gnre` atom rather than free text
    pub fn is_valid_genre(value: &str) -> bool {
        match value.trim().parse::<i64>() {
            Ok(id) => (0..=i64::from(MAX_STANDARD_GENRE_ID)).contains(&id),
            Err(_) => genre_id(value).is_some_and(|id| id <= MAX_STANDARD_GENRE_ID),
        }
    }

    /// Build from a legacy id ("17") or a display name ("Rock").
    ///
    /// Numbers outside the standard range and unknown names fall back to
    /// stored id 1.
    pub fn from_value(value: &str) -> Self {
        let stored = match value.trim().parse::<i64>() {
            Ok(id) if (0..=i64::from(MAX_STANDARD_GENRE_ID)).contains(&id) => id as u16 + 1,
            Ok(_) => FALLBACK_STORED_ID,
            Err(_) => match genre_id(value) {
                Some(id) if id <= MAX_STANDARD_GENRE_ID => id + 1,
                _ => FALLBACK_STORED_ID,
            },
        };
        Self::resolve(stored)
    }

    /// Decode the stored value of an existing atom
    pub fn decode(stored: u16) -> Self {
        let field = Self::resolve(stored);
        if field.content.is_none() {
            warn!(stored, "gnre atom references no known genre");
        }
        field
    }

    /// Only ids within the standard range resolve to a name
    fn resolve(stored: u16) -> Self {
        let content = stored
            .checked_sub(1)
            .filter(|id| *id <= MAX_STANDARD_GENRE_ID)
            .and_then(genre_name)
            .map(str::to_string);
        LegacyGenreField { stored, content }
    }

    pub fn stored_id(&self) -> u16 {
        self.stored
    }

    /// Display name, `None` when the stored id is not in the table
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Resolved genres become text fields with the stored id as data type;
    /// unresolved ones keep the raw number as a binary field.
    pub fn to_field(&self) -> TagField {
        let id = Fourcc::GNRE.to_id();
        match &self.content {
            Some(name) => {
                TagField::text(id, name, TextEncoding::Utf8).with_data_type(u32::from(self.stored))
            }
            None => TagField::binary(id, self.stored.to_be_bytes().to_vec()),
        }
    }

    pub fn from_field(field: &TagField) -> Self {
        if field.is_binary() {
            let raw = field.raw();
            if raw.len() >= 2 {
                return Self::resolve(u16::from_be_bytes([raw[0], raw[1]]));
            }
            return Self::from_value("");
        }
        let content = field.content().unwrap_or_default();
        let stored = u16::try_from(field.data_type()).unwrap_or(0);
        match Self::resolve(stored).content {
            Some(name) if name == content => Self::resolve(stored),
            _ => Self::from_value(&content),
        }
    }

    /// Value bytes of the `data` atom
    pub fn encode(&self) -> Vec<u8> {
        self.stored.to_be_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_numeric_value() {
        let field = LegacyGenreField::from_value("0");
        assert_eq!(field.stored_id(), 1);
        assert_eq!(field.content(), Some("Blues"));

        assert_eq!(LegacyGenreField::from_value("17").stored_id(), 18);
        assert_eq!(LegacyGenreField::from_value("125").stored_id(), 126);
    }

    #[test]
    fn test_unresolvable_values_fall_back() {
        assert_eq!(LegacyGenreField::from_value("126").stored_id(), 1);
        assert_eq!(LegacyGenreField::from_value("-1").stored_id(), 1);
        assert_eq!(LegacyGenreField::from_value("Vaporwave").stored_id(), 1);
        // named, but outside the standard range
        assert_eq!(LegacyGenreField::from_value("Psybient").stored_id(), 1);
        assert_eq!(LegacyGenreField::from_value("rock").stored_id(), 18);
    }

    #[test]
    fn test_decode_out_of_range_keeps_number() {
        let field = LegacyGenreField::decode(500);
        assert_eq!(field.stored_id(), 500);
        assert_eq!(field.content(), None);

        let tag_field = field.to_field();
        assert!(tag_field.is_binary());
        assert_eq!(tag_field.content(), None);
        assert_eq!(LegacyGenreField::from_field(&tag_field).encode(), vec![0x01, 0xF4]);

        assert_eq!(LegacyGenreField::decode(0).content(), None);
    }

    #[test]
    fn test_decode_uses_the_construct_bound() {
        // index 149 has a name in the extended table, but is out of range here
        assert_eq!(LegacyGenreField::from_value("149").stored_id(), 1);
        let decoded = LegacyGenreField::decode(150);
        assert_eq!(decoded.content(), None);
        assert!(decoded.to_field().is_binary());

        let again = LegacyGenreField::from_field(&decoded.to_field());
        assert_eq!(again.stored_id(), 150);
        assert_eq!(again.content(), None);

        assert_eq!(LegacyGenreField::decode(126).content(), Some("Dance Hall"));
        assert_eq!(LegacyGenreField::decode(127).content(), None);
    }

    #[test]
    fn test_valid_genre_check() {
        assert!(LegacyGenreField::is_valid_genre("Rock"));
        assert!(LegacyGenreField::is_valid_genre("0"));
        assert!(!LegacyGenreField::is_valid_genre("126"));
        assert!(!LegacyGenreField::is_valid_genre("Synthwave"));
    }
}
