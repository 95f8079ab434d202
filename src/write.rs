//! Block encoder
//!
//! The [`Encoder`] consumes alignment records one block at a time. For every block
//! it builds a pileup of the mapped records, lets the [`Genotyper`] choose a
//! quantizer for each covered reference position, quantizes the mapped quality
//! values with the chosen quantizers and range codes them, one adaptive model per
//! quantizer. Unmapped quality strings are range coded losslessly with a separate
//! order-0 model. Models are carried from block to block.
//!
//! # Example
//!
//! ```rust
//! use pileq::{AlignmentRecord, Cigar, CodecConfig, Decoder, Encoder};
//!
//! let config = CodecConfig::default();
//! let records = vec![
//!     AlignmentRecord::mapped(b"chr1", 0, Cigar::parse(b"4M").unwrap(), b"ACGT", b"IIII"),
//!     AlignmentRecord::unmapped(b"ACG", b"#,:"),
//! ];
//!
//! let mut encoder = Encoder::new(Vec::new(), &config).unwrap();
//! encoder.encode(&mut records.into_iter().map(pileq::Result::Ok)).unwrap();
//! let (bytes, _stats) = encoder.finish().unwrap();
//!
//! let mut decoded = Vec::new();
//! Decoder::new(bytes.as_slice()).unwrap().decode_to(&mut decoded).unwrap();
//! assert_eq!(decoded, b"IIII\n#,:\n");
//! ```

use std::collections::{HashMap, HashSet};
use std::io;

use tracing::{debug, warn};
use zstd::zstd_safe;

use crate::config::CodecConfig;
use crate::core::pileup::Pileup;
use crate::core::range_coder::{AdaptiveModel, ContextModels, RangeEncoder};
use crate::core::{
    BlockHeader, FileHeader, QualityBlock, RecordLayout, SIZE_BLOCK_HEADER, SIZE_HEADER,
};
use crate::error::{EncodeError, Result, StreamError};
use crate::fasta::ReferenceSet;
use crate::genotyper::Genotyper;
use crate::quantizer::QuantizerBank;
use crate::record::{AlignmentRecord, RecordSource};
use crate::stats::CodecStats;
use crate::DEFAULT_COMPRESSION_LEVEL;

/// Number of symbols of the unmapped quality model
pub(crate) const UNMAPPED_ALPHABET: usize = 256;

pub struct Encoder<W: io::Write> {
    /// Internal writer for the container
    inner: W,

    config: CodecConfig,
    header: FileHeader,

    genotyper: Genotyper,
    bank: QuantizerBank,

    /// One model per quantizer, carried across blocks
    mapped_models: ContextModels,
    unmapped_model: AdaptiveModel,

    /// A reusable block for this encoder
    block: QualityBlock,
    /// Reusable record buffer for [`Encoder::encode`]
    records: Vec<AlignmentRecord>,

    /// Compression context for the layout and quantizer index columns
    cctx: zstd_safe::CCtx<'static>,

    references: ReferenceSet,
    /// Reference names already reported as unknown or overrun
    warned: HashSet<Vec<u8>>,

    stats: CodecStats,
}
impl<W: io::Write> Encoder<W> {
    /// Validates `config` and writes the file header
    pub fn new(mut inner: W, config: &CodecConfig) -> Result<Self> {
        config.validate()?;
        let header = FileHeader::from_config(config);
        let genotyper = Genotyper::from_config(config)?;
        let bank = QuantizerBank::from_config(config)?;
        let mapped_models = ContextModels::new(bank.iter().map(|q| q.num_levels()));

        header.write_bytes(&mut inner)?;
        debug!(
            "Wrote file header: block size {}, polyploidy {}, {} quantizers, qv [{}, {}] offset {}",
            config.block_size,
            config.polyploidy,
            config.num_quantizers,
            config.qv_min,
            config.qv_max,
            config.qv_offset
        );

        let mut stats = CodecStats::default();
        stats.format_bytes += SIZE_HEADER as u64;

        Ok(Self {
            inner,
            config: *config,
            header,
            genotyper,
            bank,
            mapped_models,
            unmapped_model: AdaptiveModel::new(UNMAPPED_ALPHABET),
            block: QualityBlock::default(),
            records: Vec::new(),
            cctx: zstd_safe::CCtx::create(),
            references: ReferenceSet::default(),
            warned: HashSet::new(),
            stats,
        })
    }

    /// Uses `references` to sanity check the alignments
    pub fn set_references(&mut self, references: ReferenceSet) {
        self.references = references;
    }

    pub fn header(&self) -> FileHeader {
        self.header
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn stats(&self) -> &CodecStats {
        &self.stats
    }

    /// Encodes every record of `source`, `block_size` records per frame
    pub fn encode<S: RecordSource>(&mut self, source: &mut S) -> Result<()> {
        let mut records = std::mem::take(&mut self.records);
        let result = loop {
            match source.read_block(&mut records, self.config.block_size) {
                Ok(0) => break Ok(()),
                Ok(_) => {
                    if let Err(e) = self.encode_block(&records) {
                        break Err(e);
                    }
                }
                Err(e) => break Err(e),
            }
        };
        records.clear();
        self.records = records;
        result
    }

    /// Encodes `records` as one frame; an empty slice writes nothing
    pub fn encode_block(&mut self, records: &[AlignmentRecord]) -> Result<Option<BlockHeader>> {
        if records.is_empty() {
            return Ok(None);
        }
        self.check_qualities(records)?;
        self.block.clear();

        let slots = self.assign_slots(records);
        let num_slots = slots.iter().flatten().max().map_or(0, |&s| s as usize + 1);

        // record layouts and the reference span of each mapped record
        let mut intervals = Vec::new();
        for (record, slot) in records.iter().zip(&slots) {
            let qual_len = record.qual.len() as u32;
            let layout = match (slot, record.pos_min(), record.pos_max()) {
                (Some(slot), Some(pos_min), Some(pos_max)) => {
                    intervals.push((*slot as usize, pos_min, pos_max));
                    RecordLayout::Mapped {
                        qual_len,
                        ref_slot: *slot,
                        pos_min,
                        cigar: record.cigar.clone(),
                    }
                }
                _ => RecordLayout::Unmapped { qual_len },
            };
            self.block.layouts.push(layout);
        }

        // pileup and quantizer selection
        let mut pileup = Pileup::new(num_slots, intervals);
        for (record, layout) in records.iter().zip(&self.block.layouts) {
            if let RecordLayout::Mapped {
                ref_slot,
                pos_min,
                cigar,
                ..
            } = layout
            {
                cigar.walk(*pos_min, |idx, pos, aligned| {
                    if aligned {
                        pileup.add(*ref_slot as usize, pos, record.seq[idx], record.qual[idx]);
                    }
                });
            }
        }
        let fallback = self.config.fallback_index() as u8;
        self.block.quantizer_map = pileup.quantizer_map(&mut self.genotyper, fallback)?;

        // entropy coding
        let mut mapped = RangeEncoder::new();
        let mut unmapped = RangeEncoder::new();
        let mut positions = Vec::new();
        for (record, layout) in records.iter().zip(&self.block.layouts) {
            match layout {
                RecordLayout::Mapped {
                    ref_slot,
                    pos_min,
                    cigar,
                    ..
                } => {
                    positions.clear();
                    cigar.walk(*pos_min, |_, pos, _| positions.push(pos));
                    for (&pos, &qual) in positions.iter().zip(&record.qual) {
                        let index = self
                            .block
                            .quantizer_map
                            .index_at(*ref_slot as usize, pos)
                            .unwrap_or(fallback) as usize;
                        let (Some(quantizer), Some(model)) =
                            (self.bank.get(index), self.mapped_models.get_mut(index))
                        else {
                            return Err(StreamError::InvalidQuantizerIndex {
                                index: index as u8,
                                num_quantizers: self.bank.len(),
                            }
                            .into());
                        };
                        let level = quantizer.quantize(i32::from(qual) - self.config.qv_offset);
                        mapped.encode_symbol(model, level as usize);
                    }
                    self.stats.num_mapped_records += 1;
                    self.stats.uncompressed_mapped_bytes += record.qual.len() as u64;
                }
                RecordLayout::Unmapped { .. } => {
                    for &qual in &record.qual {
                        unmapped.encode_symbol(&mut self.unmapped_model, qual as usize);
                    }
                    self.stats.num_unmapped_records += 1;
                    self.stats.uncompressed_unmapped_bytes += record.qual.len() as u64;
                }
            }
        }
        self.block.mapped = mapped.finish();
        self.block.unmapped = unmapped.finish();

        let header = self
            .block
            .flush_to(&mut self.inner, DEFAULT_COMPRESSION_LEVEL, &mut self.cctx)?;

        self.stats.num_blocks += 1;
        self.stats.compressed_mapped_bytes += header.len_mapped;
        self.stats.compressed_unmapped_bytes += header.len_unmapped;
        self.stats.format_bytes +=
            SIZE_BLOCK_HEADER as u64 + header.len_z_layout + header.len_z_qidx;
        debug!(
            "Block {}: {} records, {} slots, {} positions, {} mapped bytes, {} unmapped bytes",
            self.stats.num_blocks - 1,
            records.len(),
            num_slots,
            pileup.num_positions(),
            header.len_mapped,
            header.len_unmapped
        );

        Ok(Some(header))
    }

    /// Rejects mapped records with quality values outside of `[qv_min, qv_max]`
    fn check_qualities(&self, records: &[AlignmentRecord]) -> Result<()> {
        let first = self.stats.num_records() as u64;
        for (i, record) in records.iter().enumerate() {
            if !record.is_mapped() {
                continue;
            }
            for &qual in &record.qual {
                let value = i32::from(qual) - self.config.qv_offset;
                if value < self.config.qv_min || value > self.config.qv_max {
                    return Err(EncodeError::QualityOutOfRange {
                        record: first + i as u64,
                        value,
                        min: self.config.qv_min,
                        max: self.config.qv_max,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Numbers the reference names of the mapped records by first appearance
    fn assign_slots(&mut self, records: &[AlignmentRecord]) -> Vec<Option<u32>> {
        let mut slots: HashMap<&[u8], u32> = HashMap::new();
        let mut assigned = Vec::with_capacity(records.len());
        for record in records {
            if !record.is_mapped() {
                assigned.push(None);
                continue;
            }
            let next = slots.len() as u32;
            let slot = *slots.entry(record.rname.as_slice()).or_insert(next);
            assigned.push(Some(slot));
            self.check_reference(record);
        }
        assigned
    }

    fn check_reference(&mut self, record: &AlignmentRecord) {
        if self.references.is_empty() || self.warned.contains(&record.rname) {
            return;
        }
        let name = String::from_utf8_lossy(&record.rname);
        match self.references.get(&record.rname) {
            None => warn!("Reference {name} is not among the provided references"),
            Some(reference) => match record.pos_max() {
                Some(pos_max) if pos_max as usize >= reference.len => {
                    warn!(
                        "Record {} extends past the end of {name} ({} bp)",
                        String::from_utf8_lossy(&record.qname),
                        reference.len
                    );
                }
                _ => return,
            },
        }
        self.warned.insert(record.rname.clone());
    }

    /// Flushes the inner writer and returns it with the session statistics
    pub fn finish(mut self) -> Result<(W, CodecStats)> {
        self.inner.flush()?;
        self.stats.finish();
        Ok((self.inner, self.stats))
    }
}
