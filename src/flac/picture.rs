// FLAC PICTURE block codec
//
// type u32, mime length u32, mime, description length u32, description
// (UTF-8), width, height, depth, colors, data length u32, data. All
// integers are big-endian.

use crate::error::{Result, TagError};
use crate::tag::artwork::PictureType;
use crate::tag::Artwork;
use tracing::warn;

/// Bounds-checked cursor over a block payload that reports absolute offsets
struct Fields<'a> {
    data: &'a [u8],
    pos: usize,
    origin: u64,
}

impl<'a> Fields<'a> {
    fn u32(&mut self, what: &str) -> Result<u32> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let remaining = self.data.len() - self.pos;
        if len > remaining {
            return Err(TagError::malformed(
                self.origin + self.pos as u64,
                format!("picture {} needs {} bytes, {} remain", what, len, remaining),
            ));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn string(&mut self, what: &str) -> Result<String> {
        let len = self.u32(what)? as usize;
        Ok(String::from_utf8_lossy(self.take(len, what)?).into_owned())
    }
}

/// Decode a PICTURE block payload that starts at absolute `offset`
pub fn decode_picture(payload: &[u8], offset: u64) -> Result<Artwork> {
    let mut fields = Fields {
        data: payload,
        pos: 0,
        origin: offset,
    };

    let picture_type = fields.u32("type")?;
    if picture_type > PictureType::MAX {
        warn!(picture_type, offset, "unrecognised picture type in PICTURE block");
    }
    let mime_type = fields.string("mime type")?;
    let description = fields.string("description")?;
    let width = fields.u32("width")?;
    let height = fields.u32("height")?;
    let depth = fields.u32("depth")?;
    let colors = fields.u32("colors")?;
    let data_len = fields.u32("data length")? as usize;
    let data = fields.take(data_len, "data")?.to_vec();

    Ok(Artwork {
        picture_type,
        mime_type,
        description,
        width,
        height,
        depth,
        colors,
        data,
    })
}

pub fn encode_picture(artwork: &Artwork) -> Result<Vec<u8>> {
    let len = |what: &str, n: usize| {
        u32::try_from(n)
            .map_err(|_| TagError::InvalidFieldValue(format!("picture {} is too long", what)))
    };

    let mut payload = Vec::with_capacity(32 + artwork.mime_type.len() + artwork.data.len());
    payload.extend_from_slice(&artwork.picture_type.to_be_bytes());
    payload.extend_from_slice(&len("mime type", artwork.mime_type.len())?.to_be_bytes());
    payload.extend_from_slice(artwork.mime_type.as_bytes());
    payload.extend_from_slice(&len("description", artwork.description.len())?.to_be_bytes());
    payload.extend_from_slice(artwork.description.as_bytes());
    payload.extend_from_slice(&artwork.width.to_be_bytes());
    payload.extend_from_slice(&artwork.height.to_be_bytes());
    payload.extend_from_slice(&artwork.depth.to_be_bytes());
    payload.extend_from_slice(&artwork.colors.to_be_bytes());
    payload.extend_from_slice(&len("data", artwork.data.len())?.to_be_bytes());
    payload.extend_from_slice(&artwork.data);
    Ok(payload)
}
