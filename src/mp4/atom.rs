// MP4 atom layout

use crate::chunk::{ChunkHeader, ChunkLayout};
use crate::error::{Result, TagError};
use crate::utils::io::{read_be_u32, read_be_u64};
use std::fmt;
use std::io::Read;

/// Four-character atom type
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fourcc(pub [u8; 4]);

impl Fourcc {
    pub const FILE: Fourcc = Fourcc(*b"\0\0\0\0");
    pub const FTYP: Fourcc = Fourcc(*b"ftyp");
    pub const MOOV: Fourcc = Fourcc(*b"moov");
    pub const MDAT: Fourcc = Fourcc(*b"mdat");
    pub const UDTA: Fourcc = Fourcc(*b"udta");
    pub const META: Fourcc = Fourcc(*b"meta");
    pub const HDLR: Fourcc = Fourcc(*b"hdlr");
    pub const ILST: Fourcc = Fourcc(*b"ilst");
    pub const TRAK: Fourcc = Fourcc(*b"trak");
    pub const MDIA: Fourcc = Fourcc(*b"mdia");
    pub const MINF: Fourcc = Fourcc(*b"minf");
    pub const STBL: Fourcc = Fourcc(*b"stbl");
    pub const STCO: Fourcc = Fourcc(*b"stco");
    pub const CO64: Fourcc = Fourcc(*b"co64");
    pub const DATA: Fourcc = Fourcc(*b"data");
    pub const FREEFORM: Fourcc = Fourcc(*b"----");
    pub const MEAN: Fourcc = Fourcc(*b"mean");
    pub const NAME: Fourcc = Fourcc(*b"name");
    pub const COVR: Fourcc = Fourcc(*b"covr");
    pub const GNRE: Fourcc = Fourcc(*b"gnre");
    pub const TRKN: Fourcc = Fourcc(*b"trkn");
    pub const DISK: Fourcc = Fourcc(*b"disk");
    pub const TMPO: Fourcc = Fourcc(*b"tmpo");

    /// Field id form: each byte as a Latin-1 character, so `©nam` stays `©nam`
    pub fn to_id(&self) -> String {
        self.0.iter().map(|&b| b as char).collect()
    }

    /// Inverse of [`to_id`](Self::to_id)
    pub fn from_id(id: &str) -> Option<Self> {
        let mut bytes = [0u8; 4];
        let mut chars = id.chars();
        for byte in bytes.iter_mut() {
            *byte = u8::try_from(u32::from(chars.next()?)).ok()?;
        }
        chars.next().is_none().then_some(Fourcc(bytes))
    }
}

impl fmt::Display for Fourcc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_id())
    }
}

impl fmt::Debug for Fourcc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.to_id())
    }
}

/// u32 big-endian size including the header, then the type. A size of 1
/// means a u64 size follows the type; 0 means the atom runs to the end of
/// its parent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mp4Layout;

impl ChunkLayout for Mp4Layout {
    type Id = Fourcc;

    fn read_header<R: Read>(
        &self,
        reader: &mut R,
        offset: u64,
        remaining: u64,
    ) -> Result<Option<ChunkHeader<Fourcc>>> {
        if remaining < 8 {
            return Err(TagError::malformed(
                offset,
                format!("{} trailing bytes cannot hold an atom header", remaining),
            ));
        }
        let size = read_be_u32(reader).map_err(|e| TagError::from_read(e, offset, "atom header"))?;
        let mut id = [0u8; 4];
        reader
            .read_exact(&mut id)
            .map_err(|e| TagError::from_read(e, offset, "atom header"))?;
        let id = Fourcc(id);

        let mut raw = size.to_be_bytes().to_vec();
        raw.extend_from_slice(&id.0);

        let (declared_length, header_len, total) = match size {
            0 => (0, 8, remaining),
            1 => {
                if remaining < 16 {
                    return Err(TagError::malformed(offset, "truncated 64-bit atom size"));
                }
                let large = read_be_u64(reader)
                    .map_err(|e| TagError::from_read(e, offset, "atom header"))?;
                raw.extend_from_slice(&large.to_be_bytes());
                (large, 16, large)
            }
            size => (size as u64, 8, size as u64),
        };

        if total < header_len {
            return Err(TagError::malformed(
                offset,
                format!("atom {} declares size {}", id, total),
            ));
        }

        Ok(Some(ChunkHeader {
            id,
            declared_length,
            header_len,
            payload_len: total - header_len,
            raw,
        }))
    }

    fn encode_header(&self, id: &Fourcc, payload_len: u64) -> Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(16);
        match u32::try_from(payload_len + 8) {
            Ok(size) => {
                raw.extend_from_slice(&size.to_be_bytes());
                raw.extend_from_slice(&id.0);
            }
            Err(_) => {
                raw.extend_from_slice(&1u32.to_be_bytes());
                raw.extend_from_slice(&id.0);
                raw.extend_from_slice(&(payload_len + 16).to_be_bytes());
            }
        }
        Ok(raw)
    }
}

/// A child atom borrowed from its parent's payload
#[derive(Debug, Clone, Copy)]
pub struct Atom<'a> {
    pub id: Fourcc,
    /// Absolute offset of the payload
    pub offset: u64,
    pub payload: &'a [u8],
}

/// Split a payload into its child atoms
pub fn child_atoms(payload: &[u8], origin: u64) -> Result<Vec<Atom<'_>>> {
    let mut atoms = Vec::new();
    let mut pos = 0usize;
    while pos < payload.len() {
        let remaining = (payload.len() - pos) as u64;
        let offset = origin + pos as u64;
        let mut cursor = &payload[pos..];
        let Some(header) = Mp4Layout.read_header(&mut cursor, offset, remaining)? else {
            break;
        };
        if header.total_len() > remaining {
            return Err(TagError::malformed(
                offset,
                format!(
                    "atom {} declares {} bytes but only {} remain",
                    header.id,
                    header.total_len(),
                    remaining
                ),
            ));
        }
        let start = pos + header.header_len as usize;
        let end = pos + header.total_len() as usize;
        atoms.push(Atom {
            id: header.id,
            offset: origin + start as u64,
            payload: &payload[start..end],
        });
        pos = end;
    }
    Ok(atoms)
}

/// `data` atom: version, 24-bit type class, 4-byte locale, value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataAtom {
    pub data_type: u32,
    pub value: Vec<u8>,
}

impl DataAtom {
    pub const IMPLICIT: u32 = 0;
    pub const UTF8: u32 = 1;
    pub const UTF16: u32 = 2;
    pub const JPEG: u32 = 13;
    pub const PNG: u32 = 14;
    pub const INTEGER: u32 = 21;
    pub const BMP: u32 = 27;

    pub fn new(data_type: u32, value: Vec<u8>) -> Self {
        DataAtom { data_type, value }
    }

    pub fn parse(atom: &Atom<'_>) -> Result<Self> {
        if atom.payload.len() < 8 {
            return Err(TagError::malformed(
                atom.offset,
                "data atom shorter than its type and locale fields",
            ));
        }
        let data_type = u32::from_be_bytes([0, atom.payload[1], atom.payload[2], atom.payload[3]]);
        Ok(DataAtom {
            data_type,
            value: atom.payload[8..].to_vec(),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut payload = (self.data_type & 0x00FF_FFFF).to_be_bytes().to_vec();
        payload.extend_from_slice(&[0; 4]);
        payload.extend_from_slice(&self.value);
        Mp4Layout.encode_chunk(&Fourcc::DATA, &payload)
    }
}
