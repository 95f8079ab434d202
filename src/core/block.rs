use std::io::{self, Read};

use zstd::zstd_safe;

use crate::error::{Result, StreamError};
use crate::record::{Cigar, CigarKind, CigarOp};

use super::pileup::QuantizerMap;
use super::utils::{
    column_decompress, read_full, sized_compress, slice_and_increment, ColumnReader,
};
use super::{BlockHeader, SIZE_BLOCK_HEADER};

/// Name used when reporting a malformed layout column
const LAYOUT_COLUMN: &str = "record layout";

const KIND_UNMAPPED: u8 = 0;
const KIND_MAPPED: u8 = 1;

/// What the decoder needs to know about a record to place its qualities
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecordLayout {
    Unmapped {
        qual_len: u32,
    },
    Mapped {
        qual_len: u32,
        ref_slot: u32,
        pos_min: u32,
        cigar: Cigar,
    },
}
impl RecordLayout {
    pub(crate) fn qual_len(&self) -> usize {
        match self {
            Self::Unmapped { qual_len } | Self::Mapped { qual_len, .. } => *qual_len as usize,
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Self::Unmapped { qual_len } => {
                out.push(KIND_UNMAPPED);
                out.extend_from_slice(&qual_len.to_le_bytes());
            }
            Self::Mapped {
                qual_len,
                ref_slot,
                pos_min,
                cigar,
            } => {
                out.push(KIND_MAPPED);
                out.extend_from_slice(&qual_len.to_le_bytes());
                out.extend_from_slice(&ref_slot.to_le_bytes());
                out.extend_from_slice(&pos_min.to_le_bytes());
                out.extend_from_slice(&(cigar.ops().len() as u16).to_le_bytes());
                for op in cigar.ops() {
                    out.extend_from_slice(&op.len.to_le_bytes());
                    out.push(op.kind.as_byte());
                }
            }
        }
    }

    fn read_from(reader: &mut ColumnReader<'_>) -> Result<Self> {
        let kind = reader.read_u8()?;
        let qual_len = reader.read_u32()?;
        match kind {
            KIND_UNMAPPED => Ok(Self::Unmapped { qual_len }),
            KIND_MAPPED => {
                let ref_slot = reader.read_u32()?;
                let pos_min = reader.read_u32()?;
                let num_ops = reader.read_u16()?;
                let mut ops = Vec::with_capacity(num_ops as usize);
                for _ in 0..num_ops {
                    let len = reader.read_u32()?;
                    let kind = CigarKind::from_byte(reader.read_u8()?)
                        .ok_or_else(|| reader.malformed())?;
                    ops.push(CigarOp { kind, len });
                }
                let cigar = Cigar::new(ops);
                if cigar.query_len() != qual_len as usize {
                    return Err(reader.malformed().into());
                }
                Ok(Self::Mapped {
                    qual_len,
                    ref_slot,
                    pos_min,
                    cigar,
                })
            }
            _ => Err(reader.malformed().into()),
        }
    }
}

/// The columns of one frame, with reusable buffers
///
/// ```text
/// [BlockHeader][z_layout][z_qidx][mapped][unmapped]
/// ```
///
/// The layout and quantizer index columns are zstd compressed; the two quality
/// payloads are range coded by the caller.
#[derive(Debug, Default)]
pub struct QualityBlock {
    pub(crate) layouts: Vec<RecordLayout>,
    pub(crate) quantizer_map: QuantizerMap,
    /// Range coded mapped quality levels
    pub(crate) mapped: Vec<u8>,
    /// Range coded unmapped quality characters
    pub(crate) unmapped: Vec<u8>,

    // reusable column buffers
    layout: Vec<u8>,
    qidx: Vec<u8>,
    z_layout: Vec<u8>,
    z_qidx: Vec<u8>,
    frame: Vec<u8>,
}
impl QualityBlock {
    pub(crate) fn clear(&mut self) {
        self.layouts.clear();
        self.quantizer_map = QuantizerMap::default();
        self.mapped.clear();
        self.unmapped.clear();
        self.layout.clear();
        self.qidx.clear();
        self.z_layout.clear();
        self.z_qidx.clear();
        self.frame.clear();
    }

    /// Number of records in the block
    pub fn num_records(&self) -> usize {
        self.layouts.len()
    }

    /// Number of reference slots, one past the largest slot of a mapped record
    pub(crate) fn num_slots(&self) -> usize {
        self.layouts
            .iter()
            .filter_map(|layout| match layout {
                RecordLayout::Mapped { ref_slot, .. } => Some(*ref_slot as usize + 1),
                RecordLayout::Unmapped { .. } => None,
            })
            .max()
            .unwrap_or(0)
    }

    fn compress_columns(&mut self, level: i32, cctx: &mut zstd_safe::CCtx) -> Result<()> {
        self.layout.clear();
        for layout in &self.layouts {
            layout.write_to(&mut self.layout);
        }
        sized_compress(&mut self.z_layout, &self.layout, level, cctx)?;

        self.qidx.clear();
        self.quantizer_map.write_column(&mut self.qidx);
        sized_compress(&mut self.z_qidx, &self.qidx, level, cctx)?;
        Ok(())
    }

    /// Serializes the frame and writes it with a single call
    ///
    /// An interrupted write can therefore only leave a truncated tail frame.
    pub(crate) fn flush_to<W: io::Write>(
        &mut self,
        writer: &mut W,
        level: i32,
        cctx: &mut zstd_safe::CCtx,
    ) -> Result<BlockHeader> {
        self.compress_columns(level, cctx)?;

        let header = BlockHeader::new(
            self.layouts.len() as u64,
            self.z_layout.len() as u64,
            self.z_qidx.len() as u64,
            self.mapped.len() as u64,
            self.unmapped.len() as u64,
        );

        self.frame.clear();
        header.write_bytes(&mut self.frame)?;
        self.frame.extend_from_slice(&self.z_layout);
        self.frame.extend_from_slice(&self.z_qidx);
        self.frame.extend_from_slice(&self.mapped);
        self.frame.extend_from_slice(&self.unmapped);
        writer.write_all(&self.frame)?;

        Ok(header)
    }

    /// Reads and parses the next frame, `None` on a clean end of stream
    ///
    /// `block` is the number of the frame, used in error reports.
    pub(crate) fn read_from<R: io::Read>(
        &mut self,
        reader: &mut R,
        block: usize,
    ) -> Result<Option<BlockHeader>> {
        self.clear();

        let mut header_buf = [0u8; SIZE_BLOCK_HEADER];
        match read_full(reader, &mut header_buf)? {
            0 => return Ok(None),
            SIZE_BLOCK_HEADER => {}
            found => {
                return Err(StreamError::TruncatedFrame {
                    block,
                    expected: SIZE_BLOCK_HEADER,
                    found,
                }
                .into())
            }
        }
        let header = BlockHeader::from_bytes(&header_buf, block)?;

        // grows with the data actually present, whatever the declared length
        reader
            .by_ref()
            .take(header.frame_len)
            .read_to_end(&mut self.frame)?;
        if (self.frame.len() as u64) < header.frame_len {
            return Err(StreamError::TruncatedFrame {
                block,
                expected: usize::try_from(header.frame_len).unwrap_or(usize::MAX),
                found: self.frame.len(),
            }
            .into());
        }

        let frame = std::mem::take(&mut self.frame);
        let result = self.parse_columns(&frame, &header, block);
        self.frame = frame;
        result?;

        Ok(Some(header))
    }

    fn parse_columns(&mut self, frame: &[u8], header: &BlockHeader, block: usize) -> Result<()> {
        let mut offset = 0;
        let z_layout = slice_and_increment(&mut offset, header.len_z_layout, frame);
        let z_qidx = slice_and_increment(&mut offset, header.len_z_qidx, frame);
        let mapped = slice_and_increment(&mut offset, header.len_mapped, frame);
        let unmapped = slice_and_increment(&mut offset, header.len_unmapped, frame);

        column_decompress(&mut self.layout, z_layout, LAYOUT_COLUMN, block)?;
        let mut reader = ColumnReader::new(&self.layout, LAYOUT_COLUMN, block);
        // each record takes at least five bytes
        let capacity = usize::try_from(header.num_records)
            .unwrap_or(usize::MAX)
            .min(self.layout.len() / 5);
        let mut layouts = Vec::with_capacity(capacity);
        for _ in 0..header.num_records {
            layouts.push(RecordLayout::read_from(&mut reader)?);
        }
        reader.finish()?;
        self.layouts = layouts;

        column_decompress(&mut self.qidx, z_qidx, "quantizer index", block)?;
        self.quantizer_map = QuantizerMap::read_column(&self.qidx, self.num_slots(), block)?;

        self.mapped.extend_from_slice(mapped);
        self.unmapped.extend_from_slice(unmapped);
        Ok(())
    }
}
