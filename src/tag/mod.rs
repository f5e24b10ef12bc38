// Generic multi-valued tag field store
//
// A `Tag<F>` is an ordered list of `TagField`s. Several fields may share an
// id (multiple comments, several artists); insertion order is kept so the
// writers reproduce it. Each container family implements `TagFormat` to map
// generic `FieldKey`s onto its own ids and to build fields in its own shape.

pub mod artwork;

pub use artwork::{Artwork, PictureType};

use crate::error::{Result, TagError};
use crate::field_mapping::FieldKey;
use crate::utils::encoding::{decode_text, encode_text, TextEncoding};
use std::fmt;
use std::marker::PhantomData;

/// One stored value under a format-specific id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagField {
    id: String,
    raw: Vec<u8>,
    binary: bool,
    common: bool,
    encoding: TextEncoding,
    /// Format-specific type code (MP4 `data` class, ASF value type)
    data_type: u32,
    artwork: Option<Artwork>,
}

impl TagField {
    /// Text field; `value` is stored in `encoding`
    pub fn text(id: impl Into<String>, value: &str, encoding: TextEncoding) -> Self {
        TagField {
            id: id.into(),
            raw: encode_text(value, encoding),
            binary: false,
            common: false,
            encoding,
            data_type: 0,
            artwork: None,
        }
    }

    /// Field whose bytes are kept as they are and never charset-decoded
    pub fn binary(id: impl Into<String>, raw: Vec<u8>) -> Self {
        TagField {
            id: id.into(),
            raw,
            binary: true,
            common: false,
            encoding: TextEncoding::Utf8,
            data_type: 0,
            artwork: None,
        }
    }

    pub fn picture(id: impl Into<String>, artwork: Artwork) -> Self {
        TagField {
            id: id.into(),
            raw: artwork.data.clone(),
            binary: true,
            common: false,
            encoding: TextEncoding::Utf8,
            data_type: 0,
            artwork: Some(artwork),
        }
    }

    pub fn with_data_type(mut self, data_type: u32) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_common(mut self, common: bool) -> Self {
        self.common = common;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    pub fn is_common(&self) -> bool {
        self.common
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub fn data_type(&self) -> u32 {
        self.data_type
    }

    pub fn artwork(&self) -> Option<&Artwork> {
        self.artwork.as_ref()
    }

    /// Decoded text, or `None` for binary fields
    pub fn content(&self) -> Option<String> {
        if self.binary {
            None
        } else {
            Some(decode_text(&self.raw, self.encoding))
        }
    }
}

impl fmt::Display for TagField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.content() {
            Some(text) => f.write_str(&text),
            None => write!(f, "<{} bytes>", self.raw.len()),
        }
    }
}

/// Per-family field naming and construction rules
pub trait TagFormat {
    /// Human-readable family name used in errors
    const NAME: &'static str;

    /// The family's id for a generic key, `None` when it has no mapping
    fn field_id(key: FieldKey) -> Option<&'static str>;

    /// Id used for artwork fields
    fn artwork_id() -> &'static str;

    /// Further ids that also hold values for `key`
    fn fallback_ids(_key: FieldKey) -> &'static [&'static str] {
        &[]
    }

    fn text_encoding() -> TextEncoding {
        TextEncoding::Utf8
    }

    /// Generic key that maps onto `id`, if any
    fn field_key(id: &str) -> Option<FieldKey> {
        FieldKey::ALL.into_iter().find(|key| {
            Self::field_id(*key) == Some(id) || Self::fallback_ids(*key).contains(&id)
        })
    }

    /// Whether `id` stores one of the classic common fields
    fn is_common_id(id: &str) -> bool {
        Self::field_key(id).is_some_and(|key| key.is_common())
    }

    fn create_text_field(key: FieldKey, id: &str, value: &str) -> Result<TagField> {
        Ok(TagField::text(id, value, Self::text_encoding()).with_common(key.is_common()))
    }

    fn create_artwork_field(artwork: Artwork) -> Result<TagField> {
        artwork.validate()?;
        Ok(TagField::picture(Self::artwork_id(), artwork))
    }
}

/// Ordered multimap of fields for one container family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag<F: TagFormat> {
    fields: Vec<TagField>,
    format: PhantomData<F>,
}

impl<F: TagFormat> Default for Tag<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: TagFormat> Tag<F> {
    pub fn new() -> Self {
        Tag {
            fields: Vec::new(),
            format: PhantomData,
        }
    }

    fn id_for(key: FieldKey) -> Result<&'static str> {
        F::field_id(key).ok_or_else(|| TagError::UnsupportedKey {
            key: key.to_string(),
            format: F::NAME,
        })
    }

    fn ids_for(key: FieldKey) -> Vec<&'static str> {
        F::field_id(key)
            .into_iter()
            .chain(F::fallback_ids(key).iter().copied())
            .collect()
    }

    fn fields_for(&self, key: FieldKey) -> impl Iterator<Item = &TagField> {
        let ids = Self::ids_for(key);
        self.fields
            .iter()
            .filter(move |f| ids.iter().any(|id| f.id == *id))
    }

    /// Build a field for `key` without storing it
    pub fn create_field(&self, key: FieldKey, value: &str) -> Result<TagField> {
        if key == FieldKey::Cover {
            return Err(TagError::InvalidFieldValue(
                "artwork needs create_artwork_field".into(),
            ));
        }
        let id = Self::id_for(key)?;
        F::create_text_field(key, id, value)
    }

    pub fn create_artwork_field(&self, artwork: Artwork) -> Result<TagField> {
        F::create_artwork_field(artwork)
    }

    /// Append a field after any existing ones with the same id
    pub fn add_field(&mut self, field: TagField) {
        self.fields.push(field);
    }

    /// Replace every field with this id by `field`, keeping the position of the first
    pub fn set_field(&mut self, field: TagField) {
        match self.fields.iter().position(|f| f.id == field.id) {
            Some(index) => {
                let id = field.id.clone();
                self.fields[index] = field;
                let mut seen = 0usize;
                self.fields.retain(|f| {
                    if f.id != id {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.fields.push(field),
        }
    }

    /// Create and set a text value in one step, dropping values stored
    /// under the key's other ids
    pub fn set(&mut self, key: FieldKey, value: &str) -> Result<()> {
        let field = self.create_field(key, value)?;
        let ids = Self::ids_for(key);
        self.fields
            .retain(|f| f.id == field.id || !ids.iter().any(|id| f.id == *id));
        self.set_field(field);
        Ok(())
    }

    /// Create and append a text value in one step
    pub fn add(&mut self, key: FieldKey, value: &str) -> Result<()> {
        let field = self.create_field(key, value)?;
        self.add_field(field);
        Ok(())
    }

    /// First text value for `key`, or an empty string
    pub fn get_first(&self, key: FieldKey) -> String {
        self.fields_for(key)
            .find_map(TagField::content)
            .unwrap_or_default()
    }

    /// All text values for `key` in insertion order
    pub fn get_all(&self, key: FieldKey) -> Vec<String> {
        self.fields_for(key).filter_map(TagField::content).collect()
    }

    pub fn get_first_by_id(&self, id: &str) -> Option<&TagField> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn get_fields<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a TagField> + 'a {
        self.fields.iter().filter(move |f| f.id == id)
    }

    pub fn fields(&self) -> &[TagField] {
        &self.fields
    }

    pub fn has_field(&self, key: FieldKey) -> bool {
        self.fields_for(key).next().is_some()
    }

    /// Remove every field stored under `key`
    pub fn delete_field(&mut self, key: FieldKey) -> Result<()> {
        Self::id_for(key)?;
        for id in Self::ids_for(key) {
            self.delete_field_id(id);
        }
        Ok(())
    }

    pub fn delete_field_id(&mut self, id: &str) {
        self.fields.retain(|f| f.id != id);
    }

    pub fn artwork(&self) -> Vec<&Artwork> {
        self.fields.iter().filter_map(TagField::artwork).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Plain;

    impl TagFormat for Plain {
        const NAME: &'static str = "plain";

        fn field_id(key: FieldKey) -> Option<&'static str> {
            match key {
                FieldKey::Title => Some("TITLE"),
                FieldKey::Comment => Some("COMMENT"),
                FieldKey::Cover => Some("PIC"),
                _ => None,
            }
        }

        fn artwork_id() -> &'static str {
            "PIC"
        }
    }

    #[test]
    fn test_unsupported_key() {
        let tag = Tag::<Plain>::new();
        match tag.create_field(FieldKey::Composer, "x") {
            Err(TagError::UnsupportedKey { key, format }) => {
                assert_eq!(key, "composer");
                assert_eq!(format, "plain");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_multi_value_order_and_delete() {
        let mut tag = Tag::<Plain>::new();
        tag.add(FieldKey::Comment, "one").unwrap();
        tag.add(FieldKey::Title, "song").unwrap();
        tag.add(FieldKey::Comment, "two").unwrap();

        assert_eq!(tag.get_first(FieldKey::Comment), "one");
        assert_eq!(tag.get_all(FieldKey::Comment), vec!["one", "two"]);
        assert!(tag.get_first_by_id("TITLE").unwrap().is_common());

        tag.delete_field(FieldKey::Comment).unwrap();
        assert_eq!(tag.get_first(FieldKey::Comment), "");
        assert_eq!(tag.len(), 1);
    }

    #[test]
    fn test_set_field_keeps_first_position() {
        let mut tag = Tag::<Plain>::new();
        tag.add(FieldKey::Comment, "a").unwrap();
        tag.add(FieldKey::Title, "t").unwrap();
        tag.add(FieldKey::Comment, "b").unwrap();
        tag.set(FieldKey::Comment, "c").unwrap();

        let ids: Vec<&str> = tag.fields().iter().map(TagField::id).collect();
        assert_eq!(ids, vec!["COMMENT", "TITLE"]);
        assert_eq!(tag.get_all(FieldKey::Comment), vec!["c"]);
    }

    #[test]
    fn test_binary_field_has_no_content() {
        let field = TagField::binary("RAW", vec![0, 1, 2]);
        assert_eq!(field.content(), None);
        assert_eq!(field.to_string(), "<3 bytes>");
        assert!(!field.is_empty());
    }

    #[test]
    fn test_artwork_field() {
        let mut tag = Tag::<Plain>::new();
        assert!(tag.create_field(FieldKey::Cover, "x").is_err());

        let mut bad = Artwork::from_image(vec![0xFF, 0xD8, 0xFF, 0xE0]);
        bad.picture_type = 99;
        assert!(matches!(
            tag.create_artwork_field(bad),
            Err(TagError::InvalidFieldValue(_))
        ));

        let field = tag
            .create_artwork_field(Artwork::from_image(vec![0xFF, 0xD8, 0xFF, 0xE0]))
            .unwrap();
        tag.add_field(field);
        assert!(tag.has_field(FieldKey::Cover));
        assert_eq!(tag.artwork()[0].mime_type, "image/jpeg");
    }
}
