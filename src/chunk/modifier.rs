// Chunk modifiers and the delta records they produce

use crate::chunk::header::{ChunkHeader, ChunkLayout};
use crate::error::Result;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Size and count delta produced by one modifier or accumulated over a pass.
///
/// The bytes themselves go to the destination buffer; this only records how
/// the parent's declared length and child count must change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationResult<I: Eq + Hash> {
    byte_difference: i64,
    chunk_count_difference: i32,
    occurred: HashSet<I>,
}

impl<I: Eq + Hash> ModificationResult<I> {
    /// Result of a single modifier. `chunk_count_difference` must be -1, 0 or 1.
    pub fn new(chunk_count_difference: i32, byte_difference: i64, occurred: Option<I>) -> Self {
        debug_assert!((-1..=1).contains(&chunk_count_difference));
        ModificationResult {
            byte_difference,
            chunk_count_difference,
            occurred: occurred.into_iter().collect(),
        }
    }

    /// No change, optionally recording an id that was seen
    pub fn unchanged(occurred: Option<I>) -> Self {
        Self::new(0, 0, occurred)
    }

    pub fn byte_difference(&self) -> i64 {
        self.byte_difference
    }

    pub fn chunk_count_difference(&self) -> i32 {
        self.chunk_count_difference
    }

    pub fn occurred(&self) -> &HashSet<I> {
        &self.occurred
    }

    pub fn has_occurred(&self, id: &I) -> bool {
        self.occurred.contains(id)
    }

    pub fn add_occurred(&mut self, id: I) {
        self.occurred.insert(id);
    }

    /// Fold another result into this one
    pub fn merge(&mut self, other: ModificationResult<I>) {
        self.byte_difference += other.byte_difference;
        self.chunk_count_difference += other.chunk_count_difference;
        self.occurred.extend(other.occurred);
    }

    /// Apply the byte difference to a declared length
    pub fn apply_to(&self, declared_length: u64) -> Option<u64> {
        declared_length.checked_add_signed(self.byte_difference)
    }
}

/// An existing chunk handed to a modifier, positioned at its content
#[derive(Debug, Clone, Copy)]
pub struct ChunkSource<'a, I> {
    pub header: &'a ChunkHeader<I>,
    /// Absolute offset of the payload
    pub offset: u64,
    pub payload: &'a [u8],
}

impl<'a, I> ChunkSource<'a, I> {
    pub fn id(&self) -> &'a I {
        &self.header.id
    }

    pub fn total_len(&self) -> u64 {
        self.header.total_len()
    }
}

/// Transforms one existing chunk, or synthesizes a new one when invoked
/// without a source. Each instance resolves at most one chunk per pass.
pub trait ChunkModifier<I: Eq + Hash> {
    fn is_applicable(&self, id: &I) -> bool;

    fn modify(
        &mut self,
        source: Option<ChunkSource<'_, I>>,
        dest: &mut Vec<u8>,
    ) -> Result<ModificationResult<I>>;
}

/// Boxed modifier list, in registration order
pub type Modifiers<'a, I> = Vec<Box<dyn ChunkModifier<I> + 'a>>;

/// Replaces the matched chunk with prepared bytes, or appends them when no
/// chunk of this id exists.
pub struct ReplaceChunk<I> {
    id: I,
    chunk: Vec<u8>,
}

impl<I> ReplaceChunk<I> {
    /// `chunk` is the complete encoded chunk, header included
    pub fn new(id: I, chunk: Vec<u8>) -> Self {
        ReplaceChunk { id, chunk }
    }

    pub fn encoded<L: ChunkLayout<Id = I>>(layout: &L, id: I, payload: &[u8]) -> Result<Self> {
        let chunk = layout.encode_chunk(&id, payload)?;
        Ok(ReplaceChunk { id, chunk })
    }
}

impl<I: Clone + Eq + Hash> ChunkModifier<I> for ReplaceChunk<I> {
    fn is_applicable(&self, id: &I) -> bool {
        *id == self.id
    }

    fn modify(
        &mut self,
        source: Option<ChunkSource<'_, I>>,
        dest: &mut Vec<u8>,
    ) -> Result<ModificationResult<I>> {
        dest.extend_from_slice(&self.chunk);
        let new_len = self.chunk.len() as i64;
        Ok(match source {
            Some(source) => ModificationResult::new(
                0,
                new_len - source.total_len() as i64,
                Some(self.id.clone()),
            ),
            None => ModificationResult::new(1, new_len, Some(self.id.clone())),
        })
    }
}

/// Drops the matched chunk; does nothing when there is none
pub struct RemoveChunk<I> {
    id: I,
}

impl<I> RemoveChunk<I> {
    pub fn new(id: I) -> Self {
        RemoveChunk { id }
    }
}

impl<I: Clone + Eq + Hash> ChunkModifier<I> for RemoveChunk<I> {
    fn is_applicable(&self, id: &I) -> bool {
        *id == self.id
    }

    fn modify(
        &mut self,
        source: Option<ChunkSource<'_, I>>,
        _dest: &mut Vec<u8>,
    ) -> Result<ModificationResult<I>> {
        Ok(match source {
            Some(source) => ModificationResult::new(-1, -(source.total_len() as i64), None),
            None => ModificationResult::unchanged(None),
        })
    }
}

/// Plan modifiers that turn the managed chunks of a container into `desired`.
///
/// The n-th desired chunk of an id replaces the n-th existing occurrence of
/// that id in place (first-match in registration order does the pairing),
/// desired chunks without a counterpart are appended, and surplus managed
/// occurrences are removed. Unmanaged chunks pass through untouched.
pub fn sync_chunks<'a, I, F>(
    existing: &[I],
    desired: Vec<(I, Vec<u8>)>,
    is_managed: F,
) -> Modifiers<'a, I>
where
    I: Clone + Eq + Hash + 'a,
    F: Fn(&I) -> bool,
{
    let mut wanted: HashMap<I, usize> = HashMap::new();
    let mut modifiers: Modifiers<'a, I> = Vec::with_capacity(desired.len());

    for (id, chunk) in desired {
        *wanted.entry(id.clone()).or_default() += 1;
        modifiers.push(Box::new(ReplaceChunk::new(id, chunk)));
    }

    let mut seen: HashMap<I, usize> = HashMap::new();
    for id in existing {
        let count = seen.entry(id.clone()).or_default();
        *count += 1;
        let keep = wanted.get(id).copied().unwrap_or(0);
        if *count > keep && (is_managed(id) || keep > 0) {
            modifiers.push(Box::new(RemoveChunk::new(id.clone())));
        }
    }

    modifiers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(id: &'static str, total: u64) -> ChunkHeader<&'static str> {
        ChunkHeader {
            id,
            declared_length: total,
            header_len: 4,
            payload_len: total - 4,
            raw: vec![0; 4],
        }
    }

    #[test]
    fn test_merge_accumulates() {
        let mut total = ModificationResult::unchanged(Some("parent"));
        total.merge(ModificationResult::new(1, 40, Some("new")));
        total.merge(ModificationResult::new(-1, -24, None));
        assert_eq!(total.byte_difference(), 16);
        assert_eq!(total.chunk_count_difference(), 0);
        assert!(total.has_occurred(&"parent"));
        assert!(total.has_occurred(&"new"));
        assert_eq!(total.apply_to(70), Some(86));
    }

    #[test]
    fn test_replace_chunk_existing_and_synthesized() {
        let mut modifier = ReplaceChunk::new("abcd", vec![7u8; 10]);
        let source_header = header("abcd", 16);
        let payload = [0u8; 12];
        let mut dest = Vec::new();

        let result = modifier
            .modify(
                Some(ChunkSource {
                    header: &source_header,
                    offset: 4,
                    payload: &payload,
                }),
                &mut dest,
            )
            .unwrap();
        assert_eq!(result.byte_difference(), -6);
        assert_eq!(result.chunk_count_difference(), 0);
        assert_eq!(dest.len(), 10);

        let result = modifier.modify(None, &mut dest).unwrap();
        assert_eq!(result.byte_difference(), 10);
        assert_eq!(result.chunk_count_difference(), 1);
    }

    #[test]
    fn test_remove_chunk() {
        let mut modifier = RemoveChunk::new("abcd");
        let source_header = header("abcd", 20);
        let mut dest = Vec::new();
        let result = modifier
            .modify(
                Some(ChunkSource {
                    header: &source_header,
                    offset: 0,
                    payload: &[0; 16],
                }),
                &mut dest,
            )
            .unwrap();
        assert_eq!(result.byte_difference(), -20);
        assert_eq!(result.chunk_count_difference(), -1);
        assert!(dest.is_empty());

        let result = modifier.modify(None, &mut dest).unwrap();
        assert_eq!(result, ModificationResult::unchanged(None));
    }

    #[test]
    fn test_sync_chunks_plans_surplus_removals() {
        let existing = ["info", "pict", "pict", "pad ", "pict"];
        let desired = vec![("pict", vec![1]), ("vcmt", vec![2])];
        let modifiers = sync_chunks(&existing, desired, |id| *id == "pict" || *id == "vcmt");

        // two replacements, then removals for the 2nd and 3rd "pict"
        assert_eq!(modifiers.len(), 4);
        assert!(modifiers[2].is_applicable(&"pict"));
        assert!(modifiers[3].is_applicable(&"pict"));
        assert!(!modifiers.iter().any(|m| m.is_applicable(&"pad ")));
    }
}
