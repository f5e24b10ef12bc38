// Header extension object
//
// Layout: GUID(16) + u64 length + reserved GUID(16) + u16 reserved (6) +
// u32 data size + child objects. The data size always equals
// `length - 46`; both are rewritten together when the children change.

use crate::asf::guid::Guid;
use crate::asf::layout::AsfLayout;
use crate::chunk::{
    rewrite_slice, ChunkLayout, ChunkModifier, ChunkReader, ChunkSource, ContainerReader,
    ModificationResult, Modifiers,
};
use crate::error::{Result, TagError};
use tracing::debug;

/// Reserved GUID, reserved u16 and the u32 data size
pub const EXTENSION_PREAMBLE_LEN: usize = 22;

/// Object header plus preamble
pub const EXTENSION_OVERHEAD: u64 = 24 + EXTENSION_PREAMBLE_LEN as u64;

const RESERVED_FIELD_2: u16 = 6;

/// Validate the preamble and return the child list it announces
pub fn extension_children(payload: &[u8], offset: u64) -> Result<&[u8]> {
    if payload.len() < EXTENSION_PREAMBLE_LEN {
        return Err(TagError::malformed(
            offset,
            format!("header extension payload of {} bytes has no preamble", payload.len()),
        ));
    }
    let mut size = [0u8; 4];
    size.copy_from_slice(&payload[18..22]);
    let data_size = u32::from_le_bytes(size) as usize;
    let available = payload.len() - EXTENSION_PREAMBLE_LEN;
    if data_size != available {
        return Err(TagError::malformed(
            offset + 18,
            format!(
                "header extension data size {} disagrees with object length ({} bytes of children)",
                data_size, available
            ),
        ));
    }
    Ok(&payload[EXTENSION_PREAMBLE_LEN..])
}

fn preamble(data_size: usize) -> Result<Vec<u8>> {
    let data_size = u32::try_from(data_size)
        .map_err(|_| TagError::InvalidFieldValue("header extension exceeds 4 GiB".into()))?;
    let mut preamble = Guid::HEADER_EXTENSION_RESERVED.as_bytes().to_vec();
    preamble.extend_from_slice(&RESERVED_FIELD_2.to_le_bytes());
    preamble.extend_from_slice(&data_size.to_le_bytes());
    Ok(preamble)
}

/// Reads the objects nested in the header extension
pub struct HeaderExtensionReader<'r, T> {
    inner: ContainerReader<'r, AsfLayout, T>,
}

impl<'r, T> HeaderExtensionReader<'r, T> {
    pub fn new(inner: ContainerReader<'r, AsfLayout, T>) -> Self {
        HeaderExtensionReader { inner }
    }
}

impl<'r, T> ChunkReader<Guid, T> for HeaderExtensionReader<'r, T> {
    fn can_read(&self, id: &Guid) -> bool {
        *id == Guid::HEADER_EXTENSION
    }

    fn read(&self, chunk: ChunkSource<'_, Guid>, target: &mut T) -> Result<()> {
        let children = extension_children(chunk.payload, chunk.offset)?;
        self.inner.read_slice(
            children,
            chunk.offset + EXTENSION_PREAMBLE_LEN as u64,
            target,
        )?;
        Ok(())
    }
}

/// Rewrites the header extension's children with `inner`, or creates the
/// extension when it is missing and `inner` produced objects.
pub struct HeaderExtensionModifier<'m> {
    inner: Modifiers<'m, Guid>,
}

impl<'m> HeaderExtensionModifier<'m> {
    pub fn new(inner: Modifiers<'m, Guid>) -> Self {
        HeaderExtensionModifier { inner }
    }
}

impl<'m> ChunkModifier<Guid> for HeaderExtensionModifier<'m> {
    fn is_applicable(&self, id: &Guid) -> bool {
        *id == Guid::HEADER_EXTENSION
    }

    fn modify(
        &mut self,
        source: Option<ChunkSource<'_, Guid>>,
        dest: &mut Vec<u8>,
    ) -> Result<ModificationResult<Guid>> {
        let inner = std::mem::take(&mut self.inner);

        let (children, change, old_len) = match source {
            Some(source) => {
                let old = extension_children(source.payload, source.offset)?;
                let mut children = Vec::new();
                let change = rewrite_slice(
                    &AsfLayout,
                    old,
                    source.offset + EXTENSION_PREAMBLE_LEN as u64,
                    Guid::HEADER_EXTENSION,
                    inner,
                    &mut children,
                )?;
                (children, change, Some(source.total_len()))
            }
            None => {
                let mut children = Vec::new();
                let change =
                    rewrite_slice(&AsfLayout, &[], 0, Guid::HEADER_EXTENSION, inner, &mut children)?;
                if change.byte_difference() == 0 {
                    return Ok(ModificationResult::unchanged(None));
                }
                (children, change, None)
            }
        };

        let mut payload = preamble(children.len())?;
        payload.extend_from_slice(&children);
        let chunk = AsfLayout.encode_chunk(&Guid::HEADER_EXTENSION, &payload)?;
        debug!(
            length = chunk.len(),
            byte_difference = change.byte_difference(),
            "rewrote header extension"
        );

        let mut result = match old_len {
            Some(old_len) => ModificationResult::new(0, chunk.len() as i64 - old_len as i64, None),
            None => ModificationResult::new(1, chunk.len() as i64, None),
        };
        for id in change.occurred() {
            result.add_occurred(*id);
        }
        dest.extend_from_slice(&chunk);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{scan_children, ReplaceChunk};

    fn extension_with(children: &[u8]) -> Vec<u8> {
        let mut payload = preamble(children.len()).unwrap();
        payload.extend_from_slice(children);
        AsfLayout.encode_chunk(&Guid::HEADER_EXTENSION, &payload).unwrap()
    }

    #[test]
    fn test_synthesized_child_extends_length() {
        // 46 fixed bytes + one 24-byte placeholder object
        let placeholder = AsfLayout.encode_chunk(&Guid::PADDING, &[]).unwrap();
        let extension = extension_with(&placeholder);
        assert_eq!(extension.len(), 70);

        let new_object = AsfLayout
            .encode_chunk(&Guid::METADATA_LIBRARY, &[0u8; 16])
            .unwrap();
        assert_eq!(new_object.len(), 40);
        let inner: Modifiers<'_, Guid> =
            vec![Box::new(ReplaceChunk::new(Guid::METADATA_LIBRARY, new_object.clone()))];
        let outer: Modifiers<'_, Guid> = vec![Box::new(HeaderExtensionModifier::new(inner))];

        let mut out = Vec::new();
        let result = rewrite_slice(&AsfLayout, &extension, 30, Guid::HEADER, outer, &mut out).unwrap();

        assert_eq!(result.byte_difference(), 40);
        assert_eq!(result.chunk_count_difference(), 0);
        assert!(result.has_occurred(&Guid::METADATA_LIBRARY));
        assert!(result.has_occurred(&Guid::PADDING));

        assert_eq!(out.len(), 110);
        assert_eq!(&out[16..24], &110u64.to_le_bytes());
        assert_eq!(&out[42..46], &64u32.to_le_bytes());
        assert_eq!(&out[46..70], placeholder.as_slice());
        assert_eq!(&out[70..110], new_object.as_slice());
    }

    #[test]
    fn test_reader_rejects_inconsistent_data_size() {
        let mut extension = extension_with(&AsfLayout.encode_chunk(&Guid::PADDING, &[]).unwrap());
        extension[42] = 30;
        assert!(matches!(
            extension_children(&extension[24..], 24),
            Err(TagError::MalformedContainer { offset: 42, .. })
        ));
    }

    #[test]
    fn test_missing_extension_only_created_when_needed() {
        let unrelated = AsfLayout.encode_chunk(&Guid::PADDING, &[1, 2]).unwrap();

        let outer: Modifiers<'_, Guid> = vec![Box::new(HeaderExtensionModifier::new(Vec::new()))];
        let mut out = Vec::new();
        rewrite_slice(&AsfLayout, &unrelated, 0, Guid::HEADER, outer, &mut out).unwrap();
        assert_eq!(out, unrelated);

        let object = AsfLayout.encode_chunk(&Guid::METADATA_LIBRARY, &[0, 0]).unwrap();
        let inner: Modifiers<'_, Guid> =
            vec![Box::new(ReplaceChunk::new(Guid::METADATA_LIBRARY, object))];
        let outer: Modifiers<'_, Guid> = vec![Box::new(HeaderExtensionModifier::new(inner))];
        let mut out = Vec::new();
        let result = rewrite_slice(&AsfLayout, &unrelated, 0, Guid::HEADER, outer, &mut out).unwrap();
        assert_eq!(result.chunk_count_difference(), 1);

        let children = scan_children(AsfLayout, &out, 0).unwrap();
        assert_eq!(children[1].id, Guid::HEADER_EXTENSION);
        assert_eq!(children[1].length, 46 + 26);
    }
}
