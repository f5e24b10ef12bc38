// I/O utilities shared by the container readers

use std::io::{self, Read, Seek, SeekFrom};

/// Read a single byte
pub fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut buffer = [0u8; 1];
    reader.read_exact(&mut buffer)?;
    Ok(buffer[0])
}

/// Read big-endian 32-bit integer
pub fn read_be_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buffer = [0u8; 4];
    reader.read_exact(&mut buffer)?;
    Ok(u32::from_be_bytes(buffer))
}

/// Read big-endian 64-bit integer
pub fn read_be_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buffer = [0u8; 8];
    reader.read_exact(&mut buffer)?;
    Ok(u64::from_be_bytes(buffer))
}

/// Read little-endian 16-bit integer
pub fn read_le_u16<R: Read>(reader: &mut R) -> io::Result<u16> {
    let mut buffer = [0u8; 2];
    reader.read_exact(&mut buffer)?;
    Ok(u16::from_le_bytes(buffer))
}

/// Read little-endian 32-bit integer
pub fn read_le_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buffer = [0u8; 4];
    reader.read_exact(&mut buffer)?;
    Ok(u32::from_le_bytes(buffer))
}

/// Read little-endian 64-bit integer
pub fn read_le_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buffer = [0u8; 8];
    reader.read_exact(&mut buffer)?;
    Ok(u64::from_le_bytes(buffer))
}

/// Read exactly `len` bytes.
///
/// The buffer grows with the data actually read, so a corrupted length
/// cannot trigger a huge up-front allocation.
pub fn read_bytes<R: Read>(reader: &mut R, len: u64) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let read = reader.take(len).read_to_end(&mut buffer)?;
    if (read as u64) < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, got {}", len, read),
        ));
    }
    Ok(buffer)
}

/// Decode a synchsafe 32-bit integer (7 bits per byte)
pub fn decode_synchsafe(bytes: [u8; 4]) -> u32 {
    ((bytes[0] as u32 & 0x7F) << 21)
        | ((bytes[1] as u32 & 0x7F) << 14)
        | ((bytes[2] as u32 & 0x7F) << 7)
        | (bytes[3] as u32 & 0x7F)
}

/// Encode a synchsafe 32-bit integer, `None` if the value needs more than 28 bits
pub fn encode_synchsafe(value: u32) -> Option<[u8; 4]> {
    if value > 0x0FFF_FFFF {
        return None;
    }
    Some([
        ((value >> 21) & 0x7F) as u8,
        ((value >> 14) & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
        (value & 0x7F) as u8,
    ])
}

/// Position captured by [`CountingReader::mark`]
#[derive(Debug, Clone, Copy)]
struct Mark {
    stream_position: u64,
    consumed: u64,
}

/// Reader decorator that tracks how many bytes were consumed.
///
/// Comparing [`consumed`](Self::consumed) against a container's declared
/// payload size is how the readers find the end of a child list.
#[derive(Debug)]
pub struct CountingReader<R> {
    inner: R,
    origin: u64,
    consumed: u64,
    mark: Option<Mark>,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_origin(inner, 0)
    }

    /// `origin` is the absolute offset of the first byte `inner` yields,
    /// used for error reporting.
    pub fn with_origin(inner: R, origin: u64) -> Self {
        CountingReader {
            inner,
            origin,
            consumed: 0,
            mark: None,
        }
    }

    /// Bytes consumed by reads and skips so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Absolute offset of the next byte
    pub fn position(&self) -> u64 {
        self.origin + self.consumed
    }
}

impl<R: Read> CountingReader<R> {
    /// Skip `len` bytes, failing with `UnexpectedEof` if the source is shorter
    pub fn skip(&mut self, len: u64) -> io::Result<()> {
        let skipped = io::copy(&mut (&mut self.inner).take(len), &mut io::sink())?;
        self.consumed += skipped;
        if skipped < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("tried to skip {} bytes, only {} available", len, skipped),
            ));
        }
        Ok(())
    }
}

impl<R: Read + Seek> CountingReader<R> {
    /// Remember the current position and byte count
    pub fn mark(&mut self) -> io::Result<()> {
        let stream_position = self.inner.stream_position()?;
        self.mark = Some(Mark {
            stream_position,
            consumed: self.consumed,
        });
        Ok(())
    }

    /// Return to the last mark, restoring the byte count captured there
    pub fn reset(&mut self) -> io::Result<()> {
        let mark = self
            .mark
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "reset without mark"))?;
        self.inner.seek(SeekFrom::Start(mark.stream_position))?;
        self.consumed = mark.consumed;
        Ok(())
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.consumed += read as u64;
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_counting_reader_tracks_reads_and_skips() {
        let mut reader = CountingReader::with_origin(Cursor::new(vec![1u8; 32]), 100);
        read_be_u32(&mut reader).unwrap();
        reader.skip(8).unwrap();
        assert_eq!(reader.consumed(), 12);
        assert_eq!(reader.position(), 112);
    }

    #[test]
    fn test_mark_reset_restores_counter() {
        let mut reader = CountingReader::new(Cursor::new((0u8..16).collect::<Vec<_>>()));
        reader.skip(4).unwrap();
        reader.mark().unwrap();
        assert_eq!(read_u8(&mut reader).unwrap(), 4);
        reader.skip(3).unwrap();
        assert_eq!(reader.consumed(), 8);

        reader.reset().unwrap();
        assert_eq!(reader.consumed(), 4);
        assert_eq!(read_u8(&mut reader).unwrap(), 4);
    }

    #[test]
    fn test_short_skip_and_read_fail() {
        let mut reader = CountingReader::new(Cursor::new(vec![0u8; 3]));
        let err = reader.skip(5).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err = read_bytes(&mut Cursor::new(vec![0u8; 2]), 10).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_synchsafe() {
        assert_eq!(decode_synchsafe([0x00, 0x00, 0x02, 0x01]), 257);
        assert_eq!(encode_synchsafe(257), Some([0x00, 0x00, 0x02, 0x01]));
        assert_eq!(encode_synchsafe(0x1000_0000), None);
    }
}
