// ASF object GUIDs

use std::fmt;

/// 128-bit object identifier, stored in its on-disk byte order.
///
/// The first three groups are little-endian on disk, the last two are plain
/// byte sequences.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid([u8; 16]);

impl Guid {
    pub const HEADER: Guid = Guid::new(
        0x75B2_2630,
        0x668E,
        0x11CF,
        [0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C],
    );
    pub const DATA: Guid = Guid::new(
        0x75B2_2636,
        0x668E,
        0x11CF,
        [0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C],
    );
    pub const FILE_PROPERTIES: Guid = Guid::new(
        0x8CAB_DCA1,
        0xA947,
        0x11CF,
        [0x8E, 0xE4, 0x00, 0xC0, 0x0C, 0x20, 0x53, 0x65],
    );
    pub const STREAM_PROPERTIES: Guid = Guid::new(
        0xB7DC_0791,
        0xA9B7,
        0x11CF,
        [0x8E, 0xE6, 0x00, 0xC0, 0x0C, 0x20, 0x53, 0x65],
    );
    pub const HEADER_EXTENSION: Guid = Guid::new(
        0x5FBF_03B5,
        0xA92E,
        0x11CF,
        [0x8E, 0xE3, 0x00, 0xC0, 0x0C, 0x20, 0x53, 0x65],
    );
    /// Fixed value of the "reserved field 1" inside the header extension
    pub const HEADER_EXTENSION_RESERVED: Guid = Guid::new(
        0xABD3_D211,
        0xA9BA,
        0x11CF,
        [0x8E, 0xE6, 0x00, 0xC0, 0x0C, 0x20, 0x53, 0x65],
    );
    pub const CONTENT_DESCRIPTION: Guid = Guid::new(
        0x75B2_2633,
        0x668E,
        0x11CF,
        [0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C],
    );
    pub const EXTENDED_CONTENT_DESCRIPTION: Guid = Guid::new(
        0xD2D0_A440,
        0xE307,
        0x11D2,
        [0x97, 0xF0, 0x00, 0xA0, 0xC9, 0x5E, 0xA8, 0x50],
    );
    pub const METADATA: Guid = Guid::new(
        0xC5F8_CBEA,
        0x5BAF,
        0x4877,
        [0x84, 0x67, 0xAA, 0x8C, 0x44, 0xFA, 0x4C, 0xCA],
    );
    pub const METADATA_LIBRARY: Guid = Guid::new(
        0x4423_1C94,
        0x9498,
        0x49D1,
        [0xA1, 0x41, 0x1D, 0x13, 0x4E, 0x45, 0x70, 0x54],
    );
    pub const PADDING: Guid = Guid::new(
        0x1806_D474,
        0xCADF,
        0x4509,
        [0xA4, 0xBA, 0x9A, 0xAB, 0xCB, 0x96, 0xAA, 0xE8],
    );

    pub const fn new(d1: u32, d2: u16, d3: u16, d4: [u8; 8]) -> Self {
        let a = d1.to_le_bytes();
        let b = d2.to_le_bytes();
        let c = d3.to_le_bytes();
        Guid([
            a[0], a[1], a[2], a[3], b[0], b[1], c[0], c[1], d4[0], d4[1], d4[2], d4[3], d4[4],
            d4[5], d4[6], d4[7],
        ])
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Guid(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Object name for the GUIDs this crate knows about
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Guid::HEADER => "Header",
            Guid::DATA => "Data",
            Guid::FILE_PROPERTIES => "File Properties",
            Guid::STREAM_PROPERTIES => "Stream Properties",
            Guid::HEADER_EXTENSION => "Header Extension",
            Guid::CONTENT_DESCRIPTION => "Content Description",
            Guid::EXTENDED_CONTENT_DESCRIPTION => "Extended Content Description",
            Guid::METADATA => "Metadata",
            Guid::METADATA_LIBRARY => "Metadata Library",
            Guid::PADDING => "Padding",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}{:02X}{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-",
            b[3], b[2], b[1], b[0], b[5], b[4], b[7], b[6], b[8], b[9]
        )?;
        for byte in &b[10..] {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self),
            None => write!(f, "{}", self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_guid_disk_order() {
        assert_eq!(
            Guid::HEADER.as_bytes(),
            &[
                0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11, 0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62,
                0xCE, 0x6C
            ]
        );
        assert_eq!(
            Guid::HEADER.to_string(),
            "75B22630-668E-11CF-A6D9-00AA0062CE6C"
        );
    }

    #[test]
    fn test_names() {
        assert_eq!(Guid::METADATA_LIBRARY.name(), Some("Metadata Library"));
        assert_eq!(Guid::from_bytes([7; 16]).name(), None);
    }
}
