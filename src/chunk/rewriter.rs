// Streaming container rewriter

use crate::chunk::header::ChunkLayout;
use crate::chunk::modifier::{ChunkModifier, ChunkSource, ModificationResult, Modifiers};
use crate::error::{Result, TagError};
use crate::utils::io::{read_bytes, CountingReader};
use std::io::{Cursor, Read, Seek};
use tracing::debug;

/// Rewrite a container's child list into `dest`.
///
/// Each child goes to the first remaining modifier (in registration order)
/// that accepts its id; that modifier is then used up. Children nobody claims
/// are copied verbatim. Modifiers left over at the end synthesize new chunks
/// after all original children, in registration order. Bytes after a format
/// terminator (padding) are kept and emitted last.
///
/// `dest` is only extended once every child and modifier succeeded. The
/// returned result carries the total byte and chunk-count change, seeded with
/// `parent_id` in its occurred set.
pub fn rewrite_children<'m, L, R>(
    layout: &L,
    source: &mut CountingReader<R>,
    payload_len: u64,
    parent_id: L::Id,
    modifiers: Modifiers<'m, L::Id>,
    dest: &mut Vec<u8>,
) -> Result<ModificationResult<L::Id>>
where
    L: ChunkLayout,
    R: Read + Seek,
{
    let start = source.consumed();
    let mut pending = modifiers;
    let mut result = ModificationResult::unchanged(Some(parent_id));
    let mut out = Vec::new();
    let mut tail = Vec::new();

    while source.consumed() - start < payload_len {
        let remaining = payload_len - (source.consumed() - start);
        let offset = source.position();

        source.mark()?;
        let header = match layout.read_header(source, offset, remaining)? {
            Some(header) => header,
            None => {
                source.reset()?;
                tail = read_bytes(source, remaining)
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

        let payload_offset = source.position();
        let payload = read_bytes(source, header.payload_len)
            .map_err(|e| TagError::from_read(e, offset, "chunk payload"))?;

        match pending.iter().position(|m| m.is_applicable(&header.id)) {
            Some(index) => {
                let mut modifier = pending.remove(index);
                let change = modifier.modify(
                    Some(ChunkSource {
                        header: &header,
                        offset: payload_offset,
                        payload: &payload,
                    }),
                    &mut out,
                )?;
                result.merge(change);
            }
            None => {
                out.extend_from_slice(&header.raw);
                out.extend_from_slice(&payload);
                result.add_occurred(header.id);
            }
        }
    }

    for mut modifier in pending {
        let change = modifier.modify(None, &mut out)?;
        result.merge(change);
    }

    out.extend_from_slice(&tail);
    debug!(
        byte_difference = result.byte_difference(),
        chunk_count_difference = result.chunk_count_difference(),
        "rewrote child list"
    );
    dest.extend_from_slice(&out);
    Ok(result)
}

/// [`rewrite_children`] over an in-memory payload starting at absolute `origin`
pub fn rewrite_slice<'m, L: ChunkLayout>(
    layout: &L,
    payload: &[u8],
    origin: u64,
    parent_id: L::Id,
    modifiers: Modifiers<'m, L::Id>,
    dest: &mut Vec<u8>,
) -> Result<ModificationResult<L::Id>> {
    let mut source = CountingReader::with_origin(Cursor::new(payload), origin);
    rewrite_children(
        layout,
        &mut source,
        payload.len() as u64,
        parent_id,
        modifiers,
        dest,
    )
}

/// Rewrites a nested container with its own modifier list and re-encodes its
/// header with the new length.
///
/// When the container does not exist, it is synthesized from `template`
/// (preamble plus fixed children) and the inner modifiers, but only if the
/// inner modifiers actually produced something.
pub struct ContainerModifier<'m, L: ChunkLayout> {
    layout: L,
    id: L::Id,
    preamble: fn(&[u8]) -> usize,
    template: Option<Vec<u8>>,
    inner: Modifiers<'m, L::Id>,
}

impl<'m, L: ChunkLayout> ContainerModifier<'m, L> {
    pub fn new(layout: L, id: L::Id, inner: Modifiers<'m, L::Id>) -> Self {
        ContainerModifier {
            layout,
            id,
            preamble: |_| 0,
            template: None,
            inner,
        }
    }

    pub fn with_preamble(mut self, preamble: fn(&[u8]) -> usize) -> Self {
        self.preamble = preamble;
        self
    }

    /// Payload prefix used when the container has to be created
    pub fn synthesize_with(mut self, template: Vec<u8>) -> Self {
        self.template = Some(template);
        self
    }
}

impl<'m, L: ChunkLayout> ChunkModifier<L::Id> for ContainerModifier<'m, L> {
    fn is_applicable(&self, id: &L::Id) -> bool {
        *id == self.id
    }

    fn modify(
        &mut self,
        source: Option<ChunkSource<'_, L::Id>>,
        dest: &mut Vec<u8>,
    ) -> Result<ModificationResult<L::Id>> {
        let inner = std::mem::take(&mut self.inner);

        match source {
            Some(source) => {
                let skip = (self.preamble)(source.payload);
                if skip > source.payload.len() {
                    return Err(TagError::malformed(
                        source.offset,
                        format!("{:?} is shorter than its preamble", self.id),
                    ));
                }
                let mut payload = source.payload[..skip].to_vec();
                let change = rewrite_slice(
                    &self.layout,
                    &source.payload[skip..],
                    source.offset + skip as u64,
                    self.id.clone(),
                    inner,
                    &mut payload,
                )?;

                // the header may change width (e.g. 64-bit atom sizes), so the
                // delta is measured on the encoded chunk
                let chunk = self.layout.encode_chunk(&self.id, &payload)?;
                let byte_difference = chunk.len() as i64 - source.total_len() as i64;
                dest.extend_from_slice(&chunk);

                let mut result = ModificationResult::new(0, byte_difference, None);
                for id in change.occurred() {
                    result.add_occurred(id.clone());
                }
                Ok(result)
            }
            None => {
                let Some(template) = self.template.take() else {
                    return Ok(ModificationResult::unchanged(None));
                };
                let mut payload = template;
                let change = rewrite_slice(&self.layout, &[], 0, self.id.clone(), inner, &mut payload)?;
                if change.byte_difference() == 0 {
                    return Ok(ModificationResult::unchanged(None));
                }

                let chunk = self.layout.encode_chunk(&self.id, &payload)?;
                dest.extend_from_slice(&chunk);
                let mut result = ModificationResult::new(1, chunk.len() as i64, None);
                for id in change.occurred() {
                    result.add_occurred(id.clone());
                }
                Ok(result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::header::ChunkHeader;
    use crate::chunk::modifier::{RemoveChunk, ReplaceChunk};
    use crate::utils::io::read_be_u32;

    /// 4-byte id + big-endian u32 length including the header, zero id = padding
    #[derive(Clone, Copy)]
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

    fn chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        TestLayout.encode_chunk(id, payload).unwrap()
    }

    struct Failing;

    impl ChunkModifier<[u8; 4]> for Failing {
        fn is_applicable(&self, id: &[u8; 4]) -> bool {
            id == b"bbbb"
        }

        fn modify(
            &mut self,
            _source: Option<ChunkSource<'_, [u8; 4]>>,
            _dest: &mut Vec<u8>,
        ) -> Result<ModificationResult<[u8; 4]>> {
            Err(TagError::InvalidFieldValue("refused".into()))
        }
    }

    #[test]
    fn test_no_modifiers_is_identity() {
        let mut data = chunk(b"aaaa", b"123");
        data.extend(chunk(b"bbbb", b""));
        data.extend(chunk(b"cccc", &[1, 2, 3, 4, 5]));

        let mut out = Vec::new();
        let result = rewrite_slice(&TestLayout, &data, 0, *b"root", Vec::new(), &mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(result.byte_difference(), 0);
        assert!(result.has_occurred(b"root"));
        assert!(result.has_occurred(b"cccc"));
    }

    #[test]
    fn test_first_match_in_registration_order() {
        let mut data = chunk(b"aaaa", b"1");
        data.extend(chunk(b"aaaa", b"2"));

        let modifiers: Modifiers<'_, [u8; 4]> = vec![
            Box::new(ReplaceChunk::new(*b"aaaa", chunk(b"aaaa", b"first"))),
            Box::new(ReplaceChunk::new(*b"aaaa", chunk(b"aaaa", b"second"))),
            Box::new(ReplaceChunk::new(*b"aaaa", chunk(b"aaaa", b"third"))),
        ];
        let mut out = Vec::new();
        let result = rewrite_slice(&TestLayout, &data, 0, *b"root", modifiers, &mut out).unwrap();

        let mut expected = chunk(b"aaaa", b"first");
        expected.extend(chunk(b"aaaa", b"second"));
        expected.extend(chunk(b"aaaa", b"third"));
        assert_eq!(out, expected);
        assert_eq!(result.chunk_count_difference(), 1);
        assert_eq!(result.byte_difference(), (expected.len() - data.len()) as i64);
    }

    #[test]
    fn test_synthesized_chunks_precede_padding() {
        let mut data = chunk(b"aaaa", b"1");
        data.extend([0u8; 6]);

        let modifiers: Modifiers<'_, [u8; 4]> = vec![
            Box::new(RemoveChunk::new(*b"aaaa")),
            Box::new(ReplaceChunk::new(*b"nnnn", chunk(b"nnnn", b"new"))),
        ];
        let mut out = Vec::new();
        let result = rewrite_slice(&TestLayout, &data, 0, *b"root", modifiers, &mut out).unwrap();

        let mut expected = chunk(b"nnnn", b"new");
        expected.extend([0u8; 6]);
        assert_eq!(out, expected);
        assert_eq!(result.chunk_count_difference(), 0);
        assert_eq!(result.byte_difference(), 2);
    }

    #[test]
    fn test_failing_modifier_leaves_destination_untouched() {
        let mut data = chunk(b"aaaa", b"1");
        data.extend(chunk(b"bbbb", b"2"));

        let mut out = b"keep".to_vec();
        let modifiers: Modifiers<'_, [u8; 4]> = vec![Box::new(Failing)];
        assert!(rewrite_slice(&TestLayout, &data, 0, *b"root", modifiers, &mut out).is_err());
        assert_eq!(out, b"keep");
    }

    #[test]
    fn test_nested_container_propagates_size() {
        let inner = chunk(b"leaf", b"abc");
        let mut data = chunk(b"node", &inner);
        data.extend(chunk(b"skip", b"zz"));

        let leaf: Modifiers<'_, [u8; 4]> =
            vec![Box::new(ReplaceChunk::new(*b"leaf", chunk(b"leaf", b"abcdefgh")))];
        let modifiers: Modifiers<'_, [u8; 4]> =
            vec![Box::new(ContainerModifier::new(TestLayout, *b"node", leaf))];

        let mut out = Vec::new();
        let result = rewrite_slice(&TestLayout, &data, 0, *b"root", modifiers, &mut out).unwrap();
        assert_eq!(result.byte_difference(), 5);
        assert!(result.has_occurred(b"leaf"));

        let mut expected = chunk(b"node", &chunk(b"leaf", b"abcdefgh"));
        expected.extend(chunk(b"skip", b"zz"));
        assert_eq!(out, expected);
    }

    #[test]
    fn test_container_synthesized_only_when_non_empty() {
        let data = chunk(b"skip", b"zz");

        let empty: Modifiers<'_, [u8; 4]> = vec![Box::new(RemoveChunk::new(*b"leaf"))];
        let modifiers: Modifiers<'_, [u8; 4]> = vec![Box::new(
            ContainerModifier::new(TestLayout, *b"node", empty).synthesize_with(Vec::new()),
        )];
        let mut out = Vec::new();
        let result = rewrite_slice(&TestLayout, &data, 0, *b"root", modifiers, &mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(result.chunk_count_difference(), 0);

        let leaf: Modifiers<'_, [u8; 4]> =
            vec![Box::new(ReplaceChunk::new(*b"leaf", chunk(b"leaf", b"x")))];
        let modifiers: Modifiers<'_, [u8; 4]> = vec![Box::new(
            ContainerModifier::new(TestLayout, *b"node", leaf).synthesize_with(b"pre!".to_vec()),
        )];
        let mut out = Vec::new();
        let result = rewrite_slice(&TestLayout, &data, 0, *b"root", modifiers, &mut out).unwrap();

        let mut payload = b"pre!".to_vec();
        payload.extend(chunk(b"leaf", b"x"));
        let mut expected = data.clone();
        expected.extend(chunk(b"node", &payload));
        assert_eq!(out, expected);
        assert_eq!(result.chunk_count_difference(), 1);
        assert_eq!(result.byte_difference(), 21);
    }
}
