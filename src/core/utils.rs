use std::io;

use byteorder::{LittleEndian, ReadBytesExt};
use zstd::stream::copy_decode;
use zstd::zstd_safe;

use crate::error::{Result, StreamError};

pub(crate) fn sized_compress(
    dst: &mut Vec<u8>,
    src: &[u8],
    level: i32,
    cctx: &mut zstd_safe::CCtx,
) -> Result<()> {
    // determine the maximum compressed size
    let max_z_size = zstd_safe::compress_bound(src.len());
    dst.clear();
    dst.resize(max_z_size, 0);

    // Compress the data using the provided compression context
    let true_size = cctx
        .compress(dst, src, level)
        .map_err(|e| io::Error::other(zstd_safe::get_error_name(e)))?;

    // clip to the true size
    dst.truncate(true_size);

    Ok(())
}

/// Decompresses a whole zstd column into `dst`
///
/// Any decoding failure is reported as a malformed `column` of block `block`.
pub(crate) fn column_decompress(
    dst: &mut Vec<u8>,
    src: &[u8],
    column: &'static str,
    block: usize,
) -> Result<()> {
    dst.clear();
    copy_decode(src, &mut *dst).map_err(|_| StreamError::MalformedColumn { column, block })?;
    Ok(())
}

/// Reads until `buffer` is full or the stream ends
///
/// Returns the number of bytes read, which is less than `buffer.len()` only at EOF.
pub(crate) fn read_full<R: io::Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

pub(crate) fn slice_and_increment<'a>(offset: &mut usize, len: u64, bytes: &'a [u8]) -> &'a [u8] {
    let len = usize::try_from(len).unwrap_or(usize::MAX);
    let end = offset.saturating_add(len).min(bytes.len());
    let start = (*offset).min(end);
    *offset = end;
    &bytes[start..end]
}

/// Little-endian cursor over a decompressed column
///
/// Every short read is reported as a malformed column.
pub(crate) struct ColumnReader<'a> {
    bytes: &'a [u8],
    column: &'static str,
    block: usize,
}
impl<'a> ColumnReader<'a> {
    pub(crate) fn new(bytes: &'a [u8], column: &'static str, block: usize) -> Self {
        Self {
            bytes,
            column,
            block,
        }
    }

    pub(crate) fn malformed(&self) -> StreamError {
        StreamError::MalformedColumn {
            column: self.column,
            block: self.block,
        }
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        self.bytes.read_u8().map_err(|_| self.malformed().into())
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        self.bytes
            .read_u16::<LittleEndian>()
            .map_err(|_| self.malformed().into())
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        self.bytes
            .read_u32::<LittleEndian>()
            .map_err(|_| self.malformed().into())
    }

    pub(crate) fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.bytes.len() {
            return Err(self.malformed().into());
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    /// Fails unless the whole column has been consumed
    pub(crate) fn finish(self) -> Result<()> {
        if self.bytes.is_empty() {
            Ok(())
        } else {
            Err(self.malformed().into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_round_trip() -> Result<()> {
        let src: Vec<u8> = (0..4096u32).map(|i| (i % 7) as u8).collect();
        let mut cctx = zstd_safe::CCtx::create();
        let mut z = Vec::new();
        sized_compress(&mut z, &src, 3, &mut cctx)?;
        assert!(z.len() < src.len());

        let mut out = vec![1, 2, 3];
        column_decompress(&mut out, &z, "test", 0)?;
        assert_eq!(out, src);
        Ok(())
    }

    #[test]
    fn test_decompress_garbage() {
        let mut out = Vec::new();
        let err = column_decompress(&mut out, b"not zstd at all", "layout", 3).unwrap_err();
        assert!(err.is_corrupt_stream());
    }

    #[test]
    fn test_read_full_short() -> io::Result<()> {
        let mut src: &[u8] = b"abc";
        let mut buffer = [0u8; 5];
        assert_eq!(read_full(&mut src, &mut buffer)?, 3);
        assert_eq!(read_full(&mut src, &mut buffer)?, 0);
        Ok(())
    }

    #[test]
    fn test_slice_and_increment() {
        let bytes = b"0123456789";
        let mut offset = 0;
        assert_eq!(slice_and_increment(&mut offset, 3, bytes), b"012");
        assert_eq!(slice_and_increment(&mut offset, 4, bytes), b"3456");
        assert_eq!(slice_and_increment(&mut offset, 10, bytes), b"789");
        assert_eq!(offset, 10);
    }

    #[test]
    fn test_column_reader() -> Result<()> {
        let bytes = [7u8, 1, 0, 2, 0, 0, 0, 9, 9];
        let mut reader = ColumnReader::new(&bytes, "test", 0);
        assert_eq!(reader.read_u8()?, 7);
        assert_eq!(reader.read_u16()?, 1);
        assert_eq!(reader.read_u32()?, 2);
        assert!(reader.read_slice(3).is_err());
        assert_eq!(reader.read_slice(2)?, &[9, 9]);
        reader.finish()
    }
}
