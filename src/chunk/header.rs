// Chunk headers and per-format header layouts

use crate::error::Result;
use std::fmt::Debug;
use std::hash::Hash;
use std::io::Read;

/// A child chunk header as it appeared in the stream.
///
/// `raw` keeps the header bytes exactly as read so that pass-through copies
/// reproduce them byte for byte, whatever flags or size encoding they used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader<I> {
    pub id: I,
    /// Length field exactly as declared, in the format's own convention
    pub declared_length: u64,
    pub header_len: u64,
    pub payload_len: u64,
    pub raw: Vec<u8>,
}

impl<I> ChunkHeader<I> {
    /// Header plus payload
    pub fn total_len(&self) -> u64 {
        self.header_len + self.payload_len
    }

    /// A structurally valid chunk that reserves a slot without carrying data
    pub fn is_placeholder(&self) -> bool {
        self.payload_len == 0
    }
}

/// Header conventions of one container family.
///
/// Whether a declared length includes the header differs per family; the
/// layout turns it into `header_len`/`payload_len` and rejects lengths that
/// cannot be honoured.
pub trait ChunkLayout {
    type Id: Clone + Eq + Hash + Debug;

    /// Read the next child header.
    ///
    /// `offset` is the absolute position of the header, `remaining` the bytes
    /// left in the parent's payload. Returns `None` when the list ends with a
    /// format terminator (padding) instead of another chunk.
    fn read_header<R: Read>(
        &self,
        reader: &mut R,
        offset: u64,
        remaining: u64,
    ) -> Result<Option<ChunkHeader<Self::Id>>>;

    /// Encode a header for a new chunk with a payload of `payload_len` bytes
    fn encode_header(&self, id: &Self::Id, payload_len: u64) -> Result<Vec<u8>>;

    /// Build a complete chunk around `payload`
    fn encode_chunk(&self, id: &Self::Id, payload: &[u8]) -> Result<Vec<u8>> {
        let mut chunk = self.encode_header(id, payload.len() as u64)?;
        chunk.extend_from_slice(payload);
        Ok(chunk)
    }
}
