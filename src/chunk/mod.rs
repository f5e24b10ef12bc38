// Format-agnostic chunk container engine
//
// Every supported tag container is a list of self-describing chunks:
// - ASF: 16-byte GUID + u64 length (header included)
// - MP4: u32 size (header included) + fourcc, optional 64-bit size
// - FLAC: last flag + 7-bit type + 24-bit length (header excluded)
// - ID3v2: 4-char frame id + u32 size (header excluded) + flags
//
// A `ChunkLayout` captures one family's header conventions. The reader walks
// a child list and dispatches to registered `ChunkReader`s; the rewriter
// streams the same list through `ChunkModifier`s and reports the size delta
// so every enclosing length field can be fixed without re-reading the output.

pub mod header;
pub mod modifier;
pub mod reader;
pub mod rewriter;

pub use header::{ChunkHeader, ChunkLayout};
pub use modifier::{
    sync_chunks, ChunkModifier, ChunkSource, ModificationResult, Modifiers, RemoveChunk,
    ReplaceChunk,
};
pub use reader::{scan_children, ChunkInfo, ChunkReader, ContainerReader, NestedContainer};
pub use rewriter::{rewrite_children, rewrite_slice, ContainerModifier};
