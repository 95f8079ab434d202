use std::io::Write;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{Result, StreamError};

use super::header::write_padding;
use super::BLOCK_MAGIC;

/// Size of the serialized block header in bytes
pub const SIZE_BLOCK_HEADER: usize = 56;

/// Version of the block layout
const BLOCK_VERSION: u8 = 1;

/// Header of one frame: declares the frame length and the length of each column
///
/// ```text
/// magic[3] version[1] reserved[4] frame_len[8] num_records[8]
/// len_z_layout[8] len_z_qidx[8] len_mapped[8] len_unmapped[8]
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct BlockHeader {
    /// Number of bytes following the header
    pub frame_len: u64,
    /// Number of records in the block
    pub num_records: u64,

    // length of each column
    pub(crate) len_z_layout: u64,
    pub(crate) len_z_qidx: u64,
    pub(crate) len_mapped: u64,
    pub(crate) len_unmapped: u64,
}
impl BlockHeader {
    pub(crate) fn new(
        num_records: u64,
        len_z_layout: u64,
        len_z_qidx: u64,
        len_mapped: u64,
        len_unmapped: u64,
    ) -> Self {
        Self {
            frame_len: len_z_layout + len_z_qidx + len_mapped + len_unmapped,
            num_records,
            len_z_layout,
            len_z_qidx,
            len_mapped,
            len_unmapped,
        }
    }

    /// Sum of the column lengths, which must equal the declared frame length
    pub fn block_len(&self) -> u64 {
        self.len_z_layout
            .saturating_add(self.len_z_qidx)
            .saturating_add(self.len_mapped)
            .saturating_add(self.len_unmapped)
    }

    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(BLOCK_MAGIC)?;
        writer.write_u8(BLOCK_VERSION)?;
        write_padding(writer, 4)?;
        writer.write_u64::<LittleEndian>(self.frame_len)?;
        writer.write_u64::<LittleEndian>(self.num_records)?;
        writer.write_u64::<LittleEndian>(self.len_z_layout)?;
        writer.write_u64::<LittleEndian>(self.len_z_qidx)?;
        writer.write_u64::<LittleEndian>(self.len_mapped)?;
        writer.write_u64::<LittleEndian>(self.len_unmapped)?;
        Ok(())
    }

    /// Parses the header of block number `block`
    pub fn from_bytes(buffer: &[u8; SIZE_BLOCK_HEADER], block: usize) -> Result<Self> {
        if buffer[..3] != BLOCK_MAGIC[..] {
            return Err(StreamError::InvalidBlockMagic(block).into());
        }
        if buffer[3] != BLOCK_VERSION {
            return Err(StreamError::UnsupportedVersion(buffer[3]).into());
        }
        let header = Self {
            frame_len: LittleEndian::read_u64(&buffer[8..16]),
            num_records: LittleEndian::read_u64(&buffer[16..24]),
            len_z_layout: LittleEndian::read_u64(&buffer[24..32]),
            len_z_qidx: LittleEndian::read_u64(&buffer[32..40]),
            len_mapped: LittleEndian::read_u64(&buffer[40..48]),
            len_unmapped: LittleEndian::read_u64(&buffer[48..56]),
        };
        if header.block_len() != header.frame_len {
            return Err(StreamError::FrameLengthMismatch {
                block,
                declared: header.frame_len,
                actual: header.block_len(),
            }
            .into());
        }
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_block_header_round_trip() -> Result<()> {
        let header = BlockHeader::new(10, 31, 12, 400, 9);
        assert_eq!(header.frame_len, 452);

        let mut buffer = Vec::new();
        header.write_bytes(&mut buffer)?;
        assert_eq!(buffer.len(), SIZE_BLOCK_HEADER);

        let mut fixed = [0u8; SIZE_BLOCK_HEADER];
        fixed.copy_from_slice(&buffer);
        assert_eq!(BlockHeader::from_bytes(&fixed, 0)?, header);
        Ok(())
    }

    #[test]
    fn test_block_header_bad_magic() {
        let mut buffer = Vec::new();
        BlockHeader::new(1, 1, 1, 1, 1)
            .write_bytes(&mut buffer)
            .unwrap();
        buffer[0] = b'Z';
        let mut fixed = [0u8; SIZE_BLOCK_HEADER];
        fixed.copy_from_slice(&buffer);
        let err = BlockHeader::from_bytes(&fixed, 4).unwrap_err();
        assert!(matches!(
            err,
            Error::StreamError(StreamError::InvalidBlockMagic(4))
        ));
    }

    #[test]
    fn test_block_header_length_mismatch() {
        let mut buffer = Vec::new();
        BlockHeader::new(1, 10, 10, 10, 10)
            .write_bytes(&mut buffer)
            .unwrap();
        // declared frame length 41 instead of 40
        buffer[8] = 41;
        let mut fixed = [0u8; SIZE_BLOCK_HEADER];
        fixed.copy_from_slice(&buffer);
        let err = BlockHeader::from_bytes(&fixed, 2).unwrap_err();
        assert!(matches!(
            err,
            Error::StreamError(StreamError::FrameLengthMismatch {
                block: 2,
                declared: 41,
                actual: 40
            })
        ));
    }
}
