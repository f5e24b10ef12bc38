// Recursive container reader

use crate::chunk::header::ChunkLayout;
use crate::chunk::modifier::ChunkSource;
use crate::error::{Result, TagError};
use crate::utils::io::{read_bytes, CountingReader};
use std::collections::HashSet;
use std::io::{Cursor, Read, Seek};
use tracing::{debug, warn};

/// Summary of one child chunk encountered while reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo<I> {
    pub id: I,
    /// Absolute offset of the chunk header
    pub offset: u64,
    /// Header plus payload
    pub length: u64,
    /// Whether a registered reader decoded it
    pub handled: bool,
}

/// Decodes one kind of chunk into the read target `T`
pub trait ChunkReader<I, T> {
    fn can_read(&self, id: &I) -> bool;

    fn read(&self, chunk: ChunkSource<'_, I>, target: &mut T) -> Result<()>;

    /// Chunks that legitimately repeat (pictures, comment frames) are exempt
    /// from the single-occurrence policy
    fn allows_repeats(&self) -> bool {
        false
    }
}

/// Walks a container's child list, dispatching each child to the first
/// registered reader that accepts its id and skipping the rest.
pub struct ContainerReader<'r, L: ChunkLayout, T> {
    layout: L,
    readers: Vec<Box<dyn ChunkReader<L::Id, T> + 'r>>,
    single_occurrence: bool,
}

impl<'r, L: ChunkLayout, T> ContainerReader<'r, L, T> {
    pub fn new(layout: L) -> Self {
        ContainerReader {
            layout,
            readers: Vec::new(),
            single_occurrence: true,
        }
    }

    pub fn with_reader(mut self, reader: impl ChunkReader<L::Id, T> + 'r) -> Self {
        self.readers.push(Box::new(reader));
        self
    }

    pub fn single_occurrence(mut self, enabled: bool) -> Self {
        self.single_occurrence = enabled;
        self
    }

    pub fn layout(&self) -> &L {
        &self.layout
    }

    /// Read children until `payload_len` bytes have been consumed from `source`.
    ///
    /// The caller has already consumed the container's own header and fixed
    /// preamble.
    pub fn read_children<R: Read + Seek>(
        &self,
        source: &mut CountingReader<R>,
        payload_len: u64,
        target: &mut T,
    ) -> Result<Vec<ChunkInfo<L::Id>>> {
        let start = source.consumed();
        let mut resolved: HashSet<L::Id> = HashSet::new();
        let mut children = Vec::new();

        while source.consumed() - start < payload_len {
            let remaining = payload_len - (source.consumed() - start);
            let offset = source.position();

            source.mark()?;
            let header = match self.layout.read_header(source, offset, remaining)? {
                Some(header) => header,
                None => {
                    source.reset()?;
                    debug!(offset, remaining, "child list ends with padding");
                    source
                        .skip(remaining)
                        .map_err(|e| TagError::from_read(e, offset, "padding"))?;
                    break;
                }
            };

            if header.total_len() > remaining {
                return Err(TagError::malformed(
                    offset,
                    format!(
                        "chunk {:?} declares {} bytes but only {} remain in its parent",
                        header.id,
                        header.total_len(),
                        remaining
                    ),
                ));
            }

            let reader = self.readers.iter().find(|r| r.can_read(&header.id));
            let excess = self.single_occurrence
                && resolved.contains(&header.id)
                && !reader.is_some_and(|r| r.allows_repeats());

            let handled = match reader {
                Some(reader) if !excess => {
                    let payload_offset = source.position();
                    let payload = read_bytes(source, header.payload_len)
                        .map_err(|e| TagError::from_read(e, offset, "chunk payload"))?;
                    reader.read(
                        ChunkSource {
                            header: &header,
                            offset: payload_offset,
                            payload: &payload,
                        },
                        target,
                    )?;
                    resolved.insert(header.id.clone());
                    true
                }
                Some(_) => {
                    warn!(id = ?header.id, offset, "skipping repeated chunk");
                    source
                        .skip(header.payload_len)
                        .map_err(|e| TagError::from_read(e, offset, "chunk payload"))?;
                    false
                }
                None => {
                    debug!(id = ?header.id, offset, len = header.total_len(), "passing over chunk");
                    source
                        .skip(header.payload_len)
                        .map_err(|e| TagError::from_read(e, offset, "chunk payload"))?;
                    false
                }
            };

            children.push(ChunkInfo {
                id: header.id,
                offset,
                length: header.header_len + header.payload_len,
                handled,
            });
        }

        Ok(children)
    }

    /// Read the children packed in an in-memory payload starting at absolute `origin`
    pub fn read_slice(
        &self,
        payload: &[u8],
        origin: u64,
        target: &mut T,
    ) -> Result<Vec<ChunkInfo<L::Id>>> {
        let mut source = CountingReader::with_origin(Cursor::new(payload), origin);
        self.read_children(&mut source, payload.len() as u64, target)
    }
}

/// List the children of a payload without decoding any of them
pub fn scan_children<L: ChunkLayout>(
    layout: L,
    payload: &[u8],
    origin: u64,
) -> Result<Vec<ChunkInfo<L::Id>>> {
    ContainerReader::<L, ()>::new(layout).read_slice(payload, origin, &mut ())
}

/// Reader that recurses into a nested container.
///
/// `preamble` returns how many fixed bytes precede the child list, given the
/// container's payload.
pub struct NestedContainer<'r, L: ChunkLayout, T> {
    id: L::Id,
    preamble: fn(&[u8]) -> usize,
    inner: ContainerReader<'r, L, T>,
}

impl<'r, L: ChunkLayout, T> NestedContainer<'r, L, T> {
    pub fn new(id: L::Id, inner: ContainerReader<'r, L, T>) -> Self {
        NestedContainer {
            id,
            preamble: |_| 0,
            inner,
        }
    }

    pub fn with_preamble(mut self, preamble: fn(&[u8]) -> usize) -> Self {
        self.preamble = preamble;
        self
    }
}

impl<'r, L: ChunkLayout, T> ChunkReader<L::Id, T> for NestedContainer<'r, L, T> {
    fn can_read(&self, id: &L::Id) -> bool {
        *id == self.id
    }

    fn read(&self, chunk: ChunkSource<'_, L::Id>, target: &mut T) -> Result<()> {
        let skip = (self.preamble)(chunk.payload);
        if skip > chunk.payload.len() {
            return Err(TagError::malformed(
                chunk.offset,
                format!("{:?} is shorter than its preamble", self.id),
            ));
        }
        self.inner
            .read_slice(&chunk.payload[skip..], chunk.offset + skip as u64, target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::header::ChunkHeader;
    use crate::utils::io::read_be_u32;

    /// 4-byte id, big-endian u32 length that includes the 8-byte header
    struct TestLayout;

    impl ChunkLayout for TestLayout {
        type Id = [u8; 4];

        fn read_header<R: Read>(
            &self,
            reader: &mut R,
            offset: u64,
            _remaining: u64,
        ) -> Result<Option<ChunkHeader<[u8; 4]>>> {
            let mut id = [0u8; 4];
            reader.read_exact(&mut id)?;
            if id == [0; 4] {
                return Ok(None);
            }
            let length = read_be_u32(reader)? as u64;
            if length < 8 {
                return Err(TagError::malformed(offset, "short"));
            }
            let mut raw = id.to_vec();
            raw.extend_from_slice(&(length as u32).to_be_bytes());
            Ok(Some(ChunkHeader {
                id,
                declared_length: length,
                header_len: 8,
                payload_len: length - 8,
                raw,
            }))
        }

        fn encode_header(&self, id: &[u8; 4], payload_len: u64) -> Result<Vec<u8>> {
            let mut raw = id.to_vec();
            raw.extend_from_slice(&((payload_len + 8) as u32).to_be_bytes());
            Ok(raw)
        }
    }

    struct Collect;

    impl ChunkReader<[u8; 4], Vec<Vec<u8>>> for Collect {
        fn can_read(&self, id: &[u8; 4]) -> bool {
            id == b"text"
        }

        fn read(&self, chunk: ChunkSource<'_, [u8; 4]>, target: &mut Vec<Vec<u8>>) -> Result<()> {
            target.push(chunk.payload.to_vec());
            Ok(())
        }
    }

    fn chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        TestLayout.encode_chunk(id, payload).unwrap()
    }

    #[test]
    fn test_dispatch_and_skip() {
        let mut data = chunk(b"text", b"one");
        data.extend(chunk(b"blob", &[9; 5]));
        data.extend(chunk(b"text", b"two"));

        let reader = ContainerReader::new(TestLayout)
            .with_reader(Collect)
            .single_occurrence(false);
        let mut found = Vec::new();
        let children = reader.read_slice(&data, 0, &mut found).unwrap();

        assert_eq!(found, vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(children.len(), 3);
        assert!(!children[1].handled);
        assert_eq!(children[1].offset, 11);
        assert_eq!(children[1].length, 13);
    }

    #[test]
    fn test_single_occurrence_keeps_first() {
        let mut data = chunk(b"text", b"first");
        data.extend(chunk(b"text", b"second"));

        let reader = ContainerReader::new(TestLayout).with_reader(Collect);
        let mut found = Vec::new();
        let children = reader.read_slice(&data, 0, &mut found).unwrap();

        assert_eq!(found, vec![b"first".to_vec()]);
        assert!(children[0].handled);
        assert!(!children[1].handled);
    }

    #[test]
    fn test_placeholder_chunk_is_not_end_of_list() {
        let mut data = chunk(b"text", b"");
        data.extend(chunk(b"text", b"after"));

        let reader = ContainerReader::new(TestLayout)
            .with_reader(Collect)
            .single_occurrence(false);
        let mut found = Vec::new();
        reader.read_slice(&data, 0, &mut found).unwrap();
        assert_eq!(found, vec![Vec::new(), b"after".to_vec()]);
    }

    #[test]
    fn test_child_overrunning_parent_is_malformed() {
        let mut data = chunk(b"text", b"ok");
        let mut bad = chunk(b"blob", &[0; 4]);
        bad[7] = 200;
        data.extend(bad);

        let err = scan_children(TestLayout, &data, 1000).unwrap_err();
        match err {
            TagError::MalformedContainer { offset, .. } => assert_eq!(offset, 1010),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_terminator_consumes_padding() {
        let mut data = chunk(b"text", b"x");
        data.extend([0u8; 12]);
        let children = scan_children(TestLayout, &data, 0).unwrap();
        assert_eq!(children.len(), 1);
    }
}
