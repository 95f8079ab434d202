//! Per-block pileup and the quantizer index map derived from it
//!
//! Reference positions are grouped by reference slot (the order in which reference
//! names first appear in the block). Within a slot only the positions covered by at
//! least one mapped record are laid out, as a sorted list of disjoint segments, so an
//! unsorted block spanning a whole chromosome stays small.

use crate::error::Result;
use crate::genotyper::Genotyper;

use super::utils::ColumnReader;

/// Name used when reporting a malformed quantizer index column
const QIDX_COLUMN: &str = "quantizer index";

/// A run of consecutive reference positions starting at `pos_start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment<T> {
    pub(crate) pos_start: u32,
    pub(crate) values: Vec<T>,
}
impl<T> Segment<T> {
    fn get(&self, pos: u32) -> Option<&T> {
        let offset = pos.checked_sub(self.pos_start)?;
        self.values.get(offset as usize)
    }

    fn get_mut(&mut self, pos: u32) -> Option<&mut T> {
        let offset = pos.checked_sub(self.pos_start)?;
        self.values.get_mut(offset as usize)
    }
}

/// Segments of one slot, sorted by `pos_start` and disjoint
fn find_segment<T>(segments: &[Segment<T>], pos: u32) -> Option<usize> {
    let idx = segments.partition_point(|s| s.pos_start <= pos);
    idx.checked_sub(1)
}

/// Merges overlapping or adjacent inclusive intervals `[start, end]`
fn merge_intervals(mut intervals: Vec<(u32, u32)>) -> Vec<(u32, u32)> {
    intervals.sort_unstable();
    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(intervals.len());
    for (start, end) in intervals {
        match merged.last_mut() {
            Some(last) if start <= last.1.saturating_add(1) => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Bases and quality characters observed at one reference position
#[derive(Debug, Clone, Default)]
struct Column {
    bases: Vec<u8>,
    qualities: Vec<u8>,
}

/// Observations of the mapped records of one block
#[derive(Debug, Default)]
pub(crate) struct Pileup {
    slots: Vec<Vec<Segment<Column>>>,
}
impl Pileup {
    /// Lays out the positions spanned by `intervals` (`(slot, pos_min, pos_max)`)
    pub(crate) fn new<I>(num_slots: usize, intervals: I) -> Self
    where
        I: IntoIterator<Item = (usize, u32, u32)>,
    {
        let mut per_slot = vec![Vec::new(); num_slots];
        for (slot, start, end) in intervals {
            if let Some(list) = per_slot.get_mut(slot) {
                list.push((start, end.max(start)));
            }
        }
        let slots = per_slot
            .into_iter()
            .map(|list| {
                merge_intervals(list)
                    .into_iter()
                    .map(|(start, end)| Segment {
                        pos_start: start,
                        values: vec![Column::default(); (end - start) as usize + 1],
                    })
                    .collect()
            })
            .collect();
        Self { slots }
    }

    /// Adds one aligned base; positions outside the laid out segments are ignored
    pub(crate) fn add(&mut self, slot: usize, pos: u32, base: u8, quality: u8) {
        let Some(segments) = self.slots.get_mut(slot) else {
            return;
        };
        let Some(idx) = find_segment(segments, pos) else {
            return;
        };
        if let Some(column) = segments[idx].get_mut(pos) {
            column.bases.push(base.to_ascii_uppercase());
            column.qualities.push(quality);
        }
    }

    /// Number of laid out reference positions
    pub(crate) fn num_positions(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .map(|segment| segment.values.len())
            .sum()
    }

    /// Chooses a quantizer index for every laid out position
    ///
    /// Positions without observations get `fallback`. Quality values the genotyper
    /// cannot model are reported, never clamped.
    pub(crate) fn quantizer_map(
        &self,
        genotyper: &mut Genotyper,
        fallback: u8,
    ) -> Result<QuantizerMap> {
        let mut slots = Vec::with_capacity(self.slots.len());
        for segments in &self.slots {
            let mut mapped = Vec::with_capacity(segments.len());
            for segment in segments {
                let mut values = Vec::with_capacity(segment.values.len());
                for column in &segment.values {
                    let index = genotyper
                        .compute_quantizer_index(&column.bases, &column.qualities)?
                        .map_or(fallback, |idx| idx as u8);
                    values.push(index);
                }
                mapped.push(Segment {
                    pos_start: segment.pos_start,
                    values,
                });
            }
            slots.push(mapped);
        }
        Ok(QuantizerMap { slots })
    }
}

/// Quantizer index of every covered reference position of a block
///
/// Serialized as the quantizer index column of a frame:
///
/// ```text
/// n_segments: u32
/// n_segments * (ref_slot: u32, pos_start: u32, count: u32, count * index: u8)
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct QuantizerMap {
    slots: Vec<Vec<Segment<u8>>>,
}
impl QuantizerMap {
    pub(crate) fn index_at(&self, slot: usize, pos: u32) -> Option<u8> {
        let segments = self.slots.get(slot)?;
        let idx = find_segment(segments, pos)?;
        segments[idx].get(pos).copied()
    }

    pub(crate) fn indices(&self) -> impl Iterator<Item = u8> + '_ {
        self.slots
            .iter()
            .flatten()
            .flat_map(|segment| segment.values.iter().copied())
    }

    pub(crate) fn write_column(&self, out: &mut Vec<u8>) {
        let num_segments: usize = self.slots.iter().map(Vec::len).sum();
        out.extend_from_slice(&(num_segments as u32).to_le_bytes());
        for (slot, segments) in self.slots.iter().enumerate() {
            for segment in segments {
                out.extend_from_slice(&(slot as u32).to_le_bytes());
                out.extend_from_slice(&segment.pos_start.to_le_bytes());
                out.extend_from_slice(&(segment.values.len() as u32).to_le_bytes());
                out.extend_from_slice(&segment.values);
            }
        }
    }

    /// Parses the column of block `block`, which must describe `num_slots` slots
    ///
    /// Segments must be listed by slot, then by increasing disjoint position.
    pub(crate) fn read_column(bytes: &[u8], num_slots: usize, block: usize) -> Result<Self> {
        let mut reader = ColumnReader::new(bytes, QIDX_COLUMN, block);
        let num_segments = reader.read_u32()?;
        let mut slots: Vec<Vec<Segment<u8>>> = vec![Vec::new(); num_slots];
        let mut previous: Option<(usize, u64)> = None;
        for _ in 0..num_segments {
            let slot = reader.read_u32()? as usize;
            let pos_start = reader.read_u32()?;
            let count = reader.read_u32()? as usize;
            let values = reader.read_slice(count)?.to_vec();

            let end = u64::from(pos_start) + count as u64;
            let ordered = match previous {
                Some((prev_slot, prev_end)) => {
                    slot > prev_slot || (slot == prev_slot && u64::from(pos_start) >= prev_end)
                }
                None => true,
            };
            if !ordered || slot >= num_slots || count == 0 {
                return Err(reader.malformed().into());
            }
            previous = Some((slot, end));
            slots[slot].push(Segment { pos_start, values });
        }
        reader.finish()?;
        Ok(Self { slots })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFSET: i32 = 33;

    fn genotyper() -> Genotyper {
        Genotyper::new(2, 8, 0, 7, OFFSET).unwrap()
    }

    #[test]
    fn test_merge_intervals() {
        let merged = merge_intervals(vec![(10, 20), (0, 4), (5, 6), (15, 30), (40, 40)]);
        assert_eq!(merged, vec![(0, 6), (10, 30), (40, 40)]);
    }

    #[test]
    fn test_layout_is_sparse() {
        let pileup = Pileup::new(2, [(0, 0, 9), (0, 1_000_000, 1_000_009), (1, 5, 5)]);
        assert_eq!(pileup.num_positions(), 21);
    }

    #[test]
    fn test_quantizer_map_depths() -> Result<()> {
        let mut pileup = Pileup::new(1, [(0, 100, 102)]);
        // eight agreeing high-quality bases at 100, mixed case
        for base in *b"aAaAaAaA" {
            pileup.add(0, 100, base, b'I');
        }
        // depth 1 at 101, nothing at 102
        pileup.add(0, 101, b'C', b'I');
        // outside of the layout
        pileup.add(0, 500, b'C', b'I');
        pileup.add(3, 100, b'C', b'I');

        let map = pileup.quantizer_map(&mut genotyper(), 3)?;
        assert_eq!(map.index_at(0, 100), Some(0));
        assert_eq!(map.index_at(0, 101), Some(7));
        assert_eq!(map.index_at(0, 102), Some(3));
        assert_eq!(map.index_at(0, 103), None);
        assert_eq!(map.index_at(0, 99), None);
        assert_eq!(map.index_at(1, 100), None);
        Ok(())
    }

    #[test]
    fn test_unmodelled_quality_is_an_error() {
        let mut pileup = Pileup::new(1, [(0, 0, 0)]);
        // 'Z' is 57 with offset 33
        pileup.add(0, 0, b'G', b'Z');
        pileup.add(0, 0, b'G', b'Z');
        let err = pileup.quantizer_map(&mut genotyper(), 7).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::OutOfRange);
    }

    #[test]
    fn test_column_round_trip() -> Result<()> {
        let mut pileup = Pileup::new(2, [(0, 3, 5), (0, 50, 51), (1, 0, 2)]);
        pileup.add(1, 1, b'T', b'5');
        pileup.add(1, 1, b'G', b'5');
        let map = pileup.quantizer_map(&mut genotyper(), 7)?;

        let mut bytes = Vec::new();
        map.write_column(&mut bytes);
        let parsed = QuantizerMap::read_column(&bytes, 2, 0)?;
        assert_eq!(parsed, map);
        assert_eq!(parsed.indices().count(), 8);
        Ok(())
    }

    #[test]
    fn test_column_rejects_bad_slot_and_order() {
        let map = QuantizerMap {
            slots: vec![vec![
                Segment {
                    pos_start: 10,
                    values: vec![1, 2],
                },
                Segment {
                    pos_start: 11,
                    values: vec![1],
                },
            ]],
        };
        let mut bytes = Vec::new();
        map.write_column(&mut bytes);
        assert!(QuantizerMap::read_column(&bytes, 1, 0).is_err());

        let mut bytes = Vec::new();
        QuantizerMap {
            slots: vec![vec![], vec![Segment {
                pos_start: 0,
                values: vec![0],
            }]],
        }
        .write_column(&mut bytes);
        assert!(QuantizerMap::read_column(&bytes, 1, 0).is_err());
        assert!(QuantizerMap::read_column(&bytes[..bytes.len() - 1], 2, 0).is_err());
    }
}
