// Encoding utilities

use encoding_rs::{UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};

/// Text encoding types
///
/// The discriminants match the ID3v2 encoding byte. The other formats pick a
/// fixed encoding: UTF-8 for MP4 and vorbis comments, UTF-16LE for ASF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    Iso8859_1 = 0,
    /// UTF-16 with byte order mark
    Utf16 = 1,
    Utf16BE = 2,
    #[default]
    Utf8 = 3,
    /// UTF-16LE without byte order mark
    Utf16LE = 4,
}

impl TextEncoding {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => TextEncoding::Iso8859_1,
            1 => TextEncoding::Utf16,
            2 => TextEncoding::Utf16BE,
            3 => TextEncoding::Utf8,
            _ => TextEncoding::Iso8859_1,
        }
    }

    /// Width of the NUL terminator in this encoding
    pub fn terminator_len(&self) -> usize {
        match self {
            TextEncoding::Iso8859_1 | TextEncoding::Utf8 => 1,
            _ => 2,
        }
    }

    pub fn decode(&self, data: &[u8]) -> String {
        decode_text(data, *self)
    }

    pub fn encode(&self, text: &str) -> Vec<u8> {
        encode_text(text, *self)
    }
}

/// Decode text with specified encoding
pub fn decode_text(data: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Iso8859_1 => WINDOWS_1252.decode(data).0.to_string(),
        TextEncoding::Utf16 => {
            // Detect BOM
            if data.len() >= 2 {
                if data[0..2] == [0xFF, 0xFE] {
                    UTF_16LE.decode_without_bom_handling(&data[2..]).0.to_string()
                } else if data[0..2] == [0xFE, 0xFF] {
                    UTF_16BE.decode_without_bom_handling(&data[2..]).0.to_string()
                } else {
                    UTF_16LE.decode_without_bom_handling(data).0.to_string()
                }
            } else {
                String::new()
            }
        }
        TextEncoding::Utf16BE => UTF_16BE.decode_without_bom_handling(data).0.to_string(),
        TextEncoding::Utf16LE => UTF_16LE.decode_without_bom_handling(data).0.to_string(),
        TextEncoding::Utf8 => UTF_8.decode_without_bom_handling(data).0.to_string(),
    }
}

/// Encode text with specified encoding
///
/// encoding_rs only encodes to UTF-8 and legacy single-byte charsets, so the
/// UTF-16 variants are produced from `encode_utf16` directly.
pub fn encode_text(text: &str, encoding: TextEncoding) -> Vec<u8> {
    match encoding {
        TextEncoding::Iso8859_1 => WINDOWS_1252.encode(text).0.to_vec(),
        TextEncoding::Utf16 => {
            let mut bom = vec![0xFF, 0xFE];
            bom.extend(text.encode_utf16().flat_map(|unit| unit.to_le_bytes()));
            bom
        }
        TextEncoding::Utf16BE => text.encode_utf16().flat_map(|unit| unit.to_be_bytes()).collect(),
        TextEncoding::Utf16LE => text.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect(),
        TextEncoding::Utf8 => UTF_8.encode(text).0.to_vec(),
    }
}

/// Strip trailing NUL terminators (of the encoding's width)
pub fn trim_terminator(data: &[u8], encoding: TextEncoding) -> &[u8] {
    let width = encoding.terminator_len();
    let mut end = data.len();
    while end >= width && data[end - width..end].iter().all(|&b| b == 0) {
        end -= width;
    }
    &data[..end]
}

/// Split at the first NUL terminator, returning the text and the bytes after it.
/// UTF-16 terminators are only recognised on even offsets.
pub fn split_terminated(data: &[u8], encoding: TextEncoding) -> (&[u8], &[u8]) {
    let width = encoding.terminator_len();
    let mut index = 0;
    while index + width <= data.len() {
        if data[index..index + width].iter().all(|&b| b == 0) {
            return (&data[..index], &data[index + width..]);
        }
        index += width;
    }
    (data, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16le_round_trip() {
        let encoded = encode_text("Ünïcode", TextEncoding::Utf16LE);
        assert_eq!(encoded.len(), 14);
        assert_eq!(decode_text(&encoded, TextEncoding::Utf16LE), "Ünïcode");
    }

    #[test]
    fn test_utf16_bom_detection() {
        let encoded = encode_text("abc", TextEncoding::Utf16);
        assert_eq!(&encoded[..2], &[0xFF, 0xFE]);
        assert_eq!(decode_text(&encoded, TextEncoding::Utf16), "abc");

        let mut big_endian = vec![0xFE, 0xFF];
        big_endian.extend(encode_text("abc", TextEncoding::Utf16BE));
        assert_eq!(decode_text(&big_endian, TextEncoding::Utf16), "abc");
    }

    #[test]
    fn test_latin1() {
        let encoded = encode_text("café", TextEncoding::Iso8859_1);
        assert_eq!(encoded, b"caf\xE9");
        assert_eq!(decode_text(&encoded, TextEncoding::Iso8859_1), "café");
    }

    #[test]
    fn test_terminators() {
        assert_eq!(trim_terminator(b"abc\0\0", TextEncoding::Utf8), b"abc");
        assert_eq!(trim_terminator(&[b'a', 0, 0, 0], TextEncoding::Utf16LE), &[b'a', 0]);

        let (text, rest) = split_terminated(&[b'a', 0, 0, 0, b'b', 0], TextEncoding::Utf16LE);
        assert_eq!(text, &[b'a', 0]);
        assert_eq!(rest, &[b'b', 0]);

        let (text, rest) = split_terminated(b"image/png\0\x03", TextEncoding::Iso8859_1);
        assert_eq!(text, b"image/png");
        assert_eq!(rest, b"\x03");
    }
}
