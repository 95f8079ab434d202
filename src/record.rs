//! Alignment records as consumed by the codec
//!
//! The codec needs very little of a SAM record: whether it is mapped, where it
//! starts on which reference, how its bases align (CIGAR), the bases and the
//! quality string. Everything else is left to the record source.

use crate::error::Result;

/// SAM FLAG bit marking an unmapped segment
pub const FLAG_UNMAPPED: u16 = 0x4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CigarKind {
    /// `M`
    Match,
    /// `I`
    Insertion,
    /// `D`
    Deletion,
    /// `N`
    Skip,
    /// `S`
    SoftClip,
    /// `H`
    HardClip,
    /// `P`
    Padding,
    /// `=`
    SequenceMatch,
    /// `X`
    SequenceMismatch,
}
impl CigarKind {
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            b'M' => Self::Match,
            b'I' => Self::Insertion,
            b'D' => Self::Deletion,
            b'N' => Self::Skip,
            b'S' => Self::SoftClip,
            b'H' => Self::HardClip,
            b'P' => Self::Padding,
            b'=' => Self::SequenceMatch,
            b'X' => Self::SequenceMismatch,
            _ => return None,
        })
    }

    #[must_use]
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Match => b'M',
            Self::Insertion => b'I',
            Self::Deletion => b'D',
            Self::Skip => b'N',
            Self::SoftClip => b'S',
            Self::HardClip => b'H',
            Self::Padding => b'P',
            Self::SequenceMatch => b'=',
            Self::SequenceMismatch => b'X',
        }
    }

    #[must_use]
    pub fn consumes_query(self) -> bool {
        matches!(
            self,
            Self::Match
                | Self::Insertion
                | Self::SoftClip
                | Self::SequenceMatch
                | Self::SequenceMismatch
        )
    }

    #[must_use]
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            Self::Match
                | Self::Deletion
                | Self::Skip
                | Self::SequenceMatch
                | Self::SequenceMismatch
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CigarOp {
    pub kind: CigarKind,
    pub len: u32,
}

/// A parsed CIGAR string; empty for `*`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cigar(Vec<CigarOp>);
impl Cigar {
    #[must_use]
    pub fn new(ops: Vec<CigarOp>) -> Self {
        Self(ops)
    }

    /// Parses a textual CIGAR; `None` if it is malformed
    #[must_use]
    pub fn parse(text: &[u8]) -> Option<Self> {
        if text == b"*" {
            return Some(Self::default());
        }
        let mut ops = Vec::new();
        let mut len: u32 = 0;
        let mut has_digits = false;
        for &byte in text {
            if byte.is_ascii_digit() {
                len = len.checked_mul(10)?.checked_add(u32::from(byte - b'0'))?;
                has_digits = true;
            } else {
                let kind = CigarKind::from_byte(byte)?;
                if !has_digits || len == 0 {
                    return None;
                }
                ops.push(CigarOp { kind, len });
                len = 0;
                has_digits = false;
            }
        }
        if has_digits || ops.is_empty() {
            return None;
        }
        Some(Self(ops))
    }

    #[must_use]
    pub fn ops(&self) -> &[CigarOp] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of query bases described by the CIGAR
    #[must_use]
    pub fn query_len(&self) -> usize {
        self.0
            .iter()
            .filter(|op| op.kind.consumes_query())
            .map(|op| op.len as usize)
            .sum()
    }

    /// Number of reference bases spanned by the CIGAR
    #[must_use]
    pub fn reference_len(&self) -> usize {
        self.0
            .iter()
            .filter(|op| op.kind.consumes_reference())
            .map(|op| op.len as usize)
            .sum()
    }

    /// Calls `f(query_index, ref_pos, aligned)` once per query base, in query order
    ///
    /// Aligned bases (`M`, `=`, `X`) report their own reference position. Inserted and
    /// soft-clipped bases report the last aligned position before them, or `pos_min`.
    pub fn walk<F: FnMut(usize, u32, bool)>(&self, pos_min: u32, mut f: F) {
        let mut ref_pos = pos_min;
        let mut anchor = pos_min;
        let mut query_idx = 0;
        for op in &self.0 {
            match op.kind {
                CigarKind::Match | CigarKind::SequenceMatch | CigarKind::SequenceMismatch => {
                    for _ in 0..op.len {
                        f(query_idx, ref_pos, true);
                        anchor = ref_pos;
                        query_idx += 1;
                        ref_pos += 1;
                    }
                }
                CigarKind::Insertion | CigarKind::SoftClip => {
                    for _ in 0..op.len {
                        f(query_idx, anchor, false);
                        query_idx += 1;
                    }
                }
                CigarKind::Deletion | CigarKind::Skip => ref_pos += op.len,
                CigarKind::HardClip | CigarKind::Padding => {}
            }
        }
    }
}

/// One alignment record
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AlignmentRecord {
    pub qname: Vec<u8>,
    pub flag: u16,
    pub rname: Vec<u8>,
    /// 1-based leftmost mapping position, 0 when unavailable
    pub pos: u32,
    pub cigar: Cigar,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
}
impl AlignmentRecord {
    /// A mapped record starting at the 0-based position `pos_min`
    #[must_use]
    pub fn mapped(rname: &[u8], pos_min: u32, cigar: Cigar, seq: &[u8], qual: &[u8]) -> Self {
        Self {
            qname: Vec::new(),
            flag: 0,
            rname: rname.to_vec(),
            pos: pos_min + 1,
            cigar,
            seq: seq.to_vec(),
            qual: qual.to_vec(),
        }
    }

    /// An unmapped record carrying only its quality string
    #[must_use]
    pub fn unmapped(seq: &[u8], qual: &[u8]) -> Self {
        Self {
            qname: Vec::new(),
            flag: FLAG_UNMAPPED,
            rname: b"*".to_vec(),
            pos: 0,
            cigar: Cigar::default(),
            seq: seq.to_vec(),
            qual: qual.to_vec(),
        }
    }

    /// Whether the record takes part in the pileup
    ///
    /// Records flagged as mapped but lacking a usable alignment (no position, no CIGAR,
    /// missing sequence or qualities, CIGAR disagreeing with the sequence length) are
    /// treated as unmapped and coded losslessly.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.flag & FLAG_UNMAPPED == 0
            && self.pos > 0
            && self.rname != b"*"
            && !self.cigar.is_empty()
            && self.seq != b"*"
            && self.qual != b"*"
            && !self.qual.is_empty()
            && self.seq.len() == self.qual.len()
            && self.cigar.query_len() == self.qual.len()
    }

    /// 0-based leftmost reference position of a mapped record
    #[must_use]
    pub fn pos_min(&self) -> Option<u32> {
        self.is_mapped().then(|| self.pos - 1)
    }

    /// 0-based rightmost reference position of a mapped record
    #[must_use]
    pub fn pos_max(&self) -> Option<u32> {
        let pos_min = self.pos_min()?;
        let span = self.cigar.reference_len().max(1) as u32;
        Some(pos_min + span - 1)
    }
}

/// A source of alignment records, pulled one block at a time
pub trait RecordSource {
    /// Replaces the content of `block` with up to `max_records` records
    ///
    /// Returns the number of records read; `0` once the source is exhausted.
    fn read_block(&mut self, block: &mut Vec<AlignmentRecord>, max_records: usize)
        -> Result<usize>;
}

impl<I> RecordSource for I
where
    I: Iterator<Item = Result<AlignmentRecord>>,
{
    fn read_block(
        &mut self,
        block: &mut Vec<AlignmentRecord>,
        max_records: usize,
    ) -> Result<usize> {
        block.clear();
        for record in self.by_ref().take(max_records) {
            block.push(record?);
        }
        Ok(block.len())
    }
}
