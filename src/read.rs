//! Block decoder
//!
//! The [`Decoder`] reads the file header, rebuilds the quantizer bank and entropy
//! models from the stored configuration, then decodes frames strictly in order:
//! the adaptive models evolve from block to block exactly as they did on the
//! encoder side.

use std::io;

use tracing::{debug, error};

use crate::config::CodecConfig;
use crate::core::range_coder::{AdaptiveModel, ContextModels, RangeDecoder};
use crate::core::{
    BlockHeader, FileHeader, QualityBlock, RecordLayout, SIZE_BLOCK_HEADER, SIZE_HEADER,
};
use crate::error::{Result, StreamError};
use crate::quantizer::QuantizerBank;
use crate::stats::CodecStats;
use crate::write::UNMAPPED_ALPHABET;

pub struct Decoder<R: io::Read> {
    inner: R,

    header: FileHeader,
    config: CodecConfig,
    bank: QuantizerBank,

    mapped_models: ContextModels,
    unmapped_model: AdaptiveModel,

    /// A reusable block for this decoder
    block: QualityBlock,

    /// Quality strings of the last decoded block, concatenated
    qualities: Vec<u8>,
    /// End offset of each quality string in `qualities`
    ends: Vec<usize>,

    positions: Vec<u32>,
    stats: CodecStats,
}
impl<R: io::Read> Decoder<R> {
    /// Reads and validates the file header
    ///
    /// A stream not starting with the file magic is rejected without consuming
    /// anything past the magic.
    pub fn new(mut inner: R) -> Result<Self> {
        let header = FileHeader::read_bytes(&mut inner)?;
        let config = header.config()?;
        let bank = QuantizerBank::from_config(&config)?;
        let mapped_models = ContextModels::new(bank.iter().map(|q| q.num_levels()));

        let mut stats = CodecStats::default();
        stats.format_bytes += SIZE_HEADER as u64;

        Ok(Self {
            inner,
            header,
            config,
            bank,
            mapped_models,
            unmapped_model: AdaptiveModel::new(UNMAPPED_ALPHABET),
            block: QualityBlock::default(),
            qualities: Vec::new(),
            ends: Vec::new(),
            positions: Vec::new(),
            stats,
        })
    }

    pub fn header(&self) -> FileHeader {
        self.header
    }

    /// The configuration the stream was encoded with
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn stats(&self) -> &CodecStats {
        &self.stats
    }

    /// Number of blocks decoded successfully so far
    pub fn num_blocks(&self) -> usize {
        self.stats.num_blocks
    }

    /// Number of records in the last decoded block
    pub fn num_records(&self) -> usize {
        self.ends.len()
    }

    /// Quality strings of the last decoded block, in record order
    pub fn qualities(&self) -> impl Iterator<Item = &[u8]> {
        let mut start = 0;
        self.ends.iter().map(move |&end| {
            let qual = &self.qualities[start..end];
            start = end;
            qual
        })
    }

    /// Decodes the next block, `None` once the stream ends at a frame boundary
    pub fn read_block(&mut self) -> Result<Option<BlockHeader>> {
        let block_idx = self.stats.num_blocks;
        let Some(header) = self.block.read_from(&mut self.inner, block_idx)? else {
            return Ok(None);
        };
        self.qualities.clear();
        self.ends.clear();

        // every stored quantizer index must address the bank
        let num_quantizers = self.bank.len();
        if let Some(index) = self
            .block
            .quantizer_map
            .indices()
            .find(|&index| index as usize >= num_quantizers)
        {
            return Err(StreamError::InvalidQuantizerIndex {
                index,
                num_quantizers,
            }
            .into());
        }

        self.decode_qualities(block_idx)?;

        self.stats.num_blocks += 1;
        self.stats.compressed_mapped_bytes += header.len_mapped;
        self.stats.compressed_unmapped_bytes += header.len_unmapped;
        self.stats.format_bytes +=
            SIZE_BLOCK_HEADER as u64 + header.len_z_layout + header.len_z_qidx;
        debug!(
            "Block {block_idx}: {} records, {} mapped bytes, {} unmapped bytes",
            header.num_records, header.len_mapped, header.len_unmapped
        );
        Ok(Some(header))
    }

    fn decode_qualities(&mut self, block_idx: usize) -> Result<()> {
        let mut num_mapped_symbols = 0;
        let mut num_unmapped_symbols = 0;
        for layout in &self.block.layouts {
            match layout {
                RecordLayout::Mapped { .. } => num_mapped_symbols += layout.qual_len(),
                RecordLayout::Unmapped { .. } => num_unmapped_symbols += layout.qual_len(),
            }
        }
        let mut mapped = open_payload(&self.block.mapped, num_mapped_symbols, "mapped", block_idx)?;
        let mut unmapped = open_payload(
            &self.block.unmapped,
            num_unmapped_symbols,
            "unmapped",
            block_idx,
        )?;

        let fallback = self.config.fallback_index() as u8;
        let offset = self.config.qv_offset;
        for layout in &self.block.layouts {
            match layout {
                RecordLayout::Mapped {
                    ref_slot,
                    pos_min,
                    cigar,
                    ..
                } => {
                    self.positions.clear();
                    cigar.walk(*pos_min, |_, pos, _| self.positions.push(pos));
                    for &pos in &self.positions {
                        let index = self
                            .block
                            .quantizer_map
                            .index_at(*ref_slot as usize, pos)
                            .unwrap_or(fallback) as usize;
                        let (Some(quantizer), Some(model), Some(decoder)) = (
                            self.bank.get(index),
                            self.mapped_models.get_mut(index),
                            mapped.as_mut(),
                        ) else {
                            return Err(StreamError::MalformedColumn {
                                column: "mapped",
                                block: block_idx,
                            }
                            .into());
                        };
                        let value = decoder
                            .decode_symbol(model)
                            .and_then(|level| u8::try_from(level).ok())
                            .and_then(|level| quantizer.dequantize(level))
                            .ok_or(StreamError::SymbolOutOfAlphabet {
                                block: block_idx,
                                alphabet: quantizer.num_levels(),
                            })?;
                        self.qualities.push((value + offset) as u8);
                    }
                    self.stats.num_mapped_records += 1;
                    self.stats.uncompressed_mapped_bytes += layout.qual_len() as u64;
                }
                RecordLayout::Unmapped { qual_len } => {
                    for _ in 0..*qual_len {
                        let Some(decoder) = unmapped.as_mut() else {
                            return Err(StreamError::MalformedColumn {
                                column: "unmapped",
                                block: block_idx,
                            }
                            .into());
                        };
                        let symbol = decoder
                            .decode_symbol(&mut self.unmapped_model)
                            .ok_or(StreamError::SymbolOutOfAlphabet {
                                block: block_idx,
                                alphabet: UNMAPPED_ALPHABET,
                            })?;
                        self.qualities.push(symbol as u8);
                    }
                    self.stats.num_unmapped_records += 1;
                    self.stats.uncompressed_unmapped_bytes += u64::from(*qual_len);
                }
            }
            self.ends.push(self.qualities.len());
        }

        for (decoder, column) in [(mapped, "mapped"), (unmapped, "unmapped")] {
            if decoder.is_some_and(|d| !d.is_exhausted()) {
                return Err(StreamError::MalformedColumn {
                    column,
                    block: block_idx,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Decodes every remaining block, writing one quality line per record
    ///
    /// On failure the number of blocks written out before the error is logged.
    pub fn decode_to<W: io::Write>(&mut self, writer: &mut W) -> Result<()> {
        loop {
            match self.read_block() {
                Ok(Some(_)) => {
                    for qual in self.qualities() {
                        writer.write_all(qual)?;
                        writer.write_all(b"\n")?;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(
                        "Decoding stopped after {} complete block(s): {e}",
                        self.stats.num_blocks
                    );
                    return Err(e);
                }
            }
        }
        writer.flush()?;
        self.stats.finish();
        Ok(())
    }
}

/// Opens a range coded payload expected to hold `num_symbols` symbols
///
/// A payload without symbols must be empty.
fn open_payload<'a>(
    payload: &'a [u8],
    num_symbols: usize,
    column: &'static str,
    block: usize,
) -> Result<Option<RangeDecoder<'a>>> {
    match (num_symbols, payload.is_empty()) {
        (0, true) => Ok(None),
        (0, false) | (_, true) => Err(StreamError::MalformedColumn { column, block }.into()),
        _ => Ok(Some(RangeDecoder::new(payload))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CodecConfigBuilder, FallbackQuantizer};
    use crate::error::Error;
    use crate::record::{AlignmentRecord, Cigar};
    use crate::write::Encoder;

    fn mapped(rname: &[u8], pos_min: u32, cigar: &str, seq: &[u8], qual: &[u8]) -> AlignmentRecord {
        AlignmentRecord::mapped(rname, pos_min, Cigar::parse(cigar.as_bytes()).unwrap(), seq, qual)
    }

    fn encode(config: &CodecConfig, blocks: &[Vec<AlignmentRecord>]) -> Vec<u8> {
        let mut encoder = Encoder::new(Vec::new(), config).unwrap();
        for block in blocks {
            encoder.encode_block(block).unwrap();
        }
        encoder.finish().unwrap().0
    }

    fn decode(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut decoder = Decoder::new(bytes)?;
        let mut out = Vec::new();
        while decoder.read_block()?.is_some() {
            out.extend(decoder.qualities().map(<[u8]>::to_vec));
        }
        Ok(out)
    }

    #[test]
    fn test_finest_only_is_lossless() -> Result<()> {
        let config = CodecConfigBuilder::new().num_quantizers(1).build()?;
        let block = vec![
            mapped(b"chr1", 100, "5M", b"ACGTA", b"!+5?I"),
            mapped(b"chr1", 102, "2S3M", b"TTGTA", b"#$%&'"),
            AlignmentRecord::unmapped(b"AC", b"J~"),
        ];
        let decoded = decode(&encode(&config, &[block.clone()]))?;
        let expected: Vec<Vec<u8>> = block.into_iter().map(|r| r.qual).collect();
        assert_eq!(decoded, expected);
        Ok(())
    }

    #[test]
    fn test_single_read_is_lossless() -> Result<()> {
        // every position has depth one and gets the finest quantizer
        let block = vec![mapped(b"chr1", 0, "3M2I3M", b"ACGTACGT", b"!+5?I5+!")];
        let decoded = decode(&encode(&CodecConfig::default(), &[block]))?;
        assert_eq!(decoded, vec![b"!+5?I5+!".to_vec()]);
        Ok(())
    }

    #[test]
    fn test_uncovered_positions_use_fallback() -> Result<()> {
        // a fully soft-clipped read leaves its anchor position without observations
        let block = vec![mapped(b"chr1", 7, "4S", b"ACGT", b"!+5?")];

        let coarsest = CodecConfigBuilder::new()
            .fallback(FallbackQuantizer::Coarsest)
            .build()?;
        let decoded = decode(&encode(&coarsest, &[block.clone()]))?;
        // six cells of seven values, reconstructed at 3, 10, 17 and 31
        assert_eq!(decoded, vec![b"$+2@".to_vec()]);

        let finest = CodecConfigBuilder::new()
            .fallback(FallbackQuantizer::Finest)
            .build()?;
        let decoded = decode(&encode(&finest, &[block]))?;
        assert_eq!(decoded, vec![b"!+5?".to_vec()]);
        Ok(())
    }

    #[test]
    fn test_stored_config_is_recovered() -> Result<()> {
        let config = CodecConfigBuilder::new()
            .polyploidy(4)
            .num_quantizers(3)
            .qv_max(45)
            .build()?;
        let bytes = encode(&config, &[]);
        let decoder = Decoder::new(bytes.as_slice())?;
        assert_eq!(decoder.config(), &config);
        assert_eq!(decoder.num_blocks(), 0);
        Ok(())
    }

    #[test]
    fn test_multiple_references_do_not_mix() -> Result<()> {
        let config = CodecConfig::default();
        let block = vec![
            mapped(b"chr1", 10, "4M", b"AAAA", b"IIII"),
            mapped(b"chr2", 10, "4M", b"CCCC", b"5555"),
            mapped(b"chr1", 11, "3M", b"AAA", b"III"),
        ];
        let decoded = decode(&encode(&config, &[block]))?;
        assert_eq!(decoded.len(), 3);
        // single-read positions are coded losslessly
        assert_eq!(decoded[1], b"5555");
        Ok(())
    }

    #[test]
    fn test_models_carry_across_blocks() -> Result<()> {
        let config = CodecConfig::default();
        let first = vec![mapped(b"chr1", 0, "4M", b"ACGT", b"IIII")];
        let second = vec![
            AlignmentRecord::unmapped(b"AC", b"##"),
            mapped(b"chr1", 50, "4M", b"ACGT", b"5555"),
        ];
        let bytes = encode(&config, &[first, second]);

        let mut decoder = Decoder::new(bytes.as_slice())?;
        assert!(decoder.read_block()?.is_some());
        assert_eq!(decoder.num_records(), 1);
        assert!(decoder.read_block()?.is_some());
        let quals: Vec<&[u8]> = decoder.qualities().collect();
        assert_eq!(quals, vec![&b"##"[..], &b"5555"[..]]);
        assert!(decoder.read_block()?.is_none());
        assert_eq!(decoder.num_blocks(), 2);
        Ok(())
    }

    #[test]
    fn test_foreign_stream() {
        let err = Decoder::new(&b"@HD\tVN:1.6\n"[..]).err().unwrap();
        assert!(matches!(err, Error::StreamError(StreamError::InvalidFileMagic)));
    }

    #[test]
    fn test_truncated_stream() {
        let config = CodecConfig::default();
        let bytes = encode(
            &config,
            &[vec![mapped(b"chr1", 0, "4M", b"ACGT", b"IIII")]],
        );
        let err = decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(
            err,
            Error::StreamError(StreamError::TruncatedFrame { block: 0, .. })
        ));
    }

    #[test]
    fn test_corrupt_payload_is_detected() {
        let config = CodecConfig::default();
        let block: Vec<AlignmentRecord> = (0..20)
            .map(|i| AlignmentRecord::unmapped(b"ACGTACGT", &[b'!' + i; 8]))
            .collect();
        let mut bytes = encode(&config, &[block]);
        // the unmapped payload ends the frame; drop its last byte and shrink the lengths
        let header_start = SIZE_HEADER;
        let frame_len_at = header_start + 8;
        let unmapped_len_at = header_start + 48;
        for at in [frame_len_at, unmapped_len_at] {
            let mut value = [0u8; 8];
            value.copy_from_slice(&bytes[at..at + 8]);
            let shrunk = u64::from_le_bytes(value) - 1;
            bytes[at..at + 8].copy_from_slice(&shrunk.to_le_bytes());
        }
        bytes.pop();
        let err = decode(&bytes).unwrap_err();
        assert!(err.is_corrupt_stream());
    }

    #[test]
    fn test_code_outside_range_is_out_of_alphabet() {
        let config = CodecConfig::default();
        let block = vec![AlignmentRecord::unmapped(b"ACGTACGT", b"!!##%%''")];
        let mut bytes = encode(&config, &[block]);
        let unmapped_len_at = SIZE_HEADER + 48;
        let mut value = [0u8; 8];
        value.copy_from_slice(&bytes[unmapped_len_at..unmapped_len_at + 8]);
        let payload_start = bytes.len() - u64::from_le_bytes(value) as usize;
        bytes[payload_start + 1..payload_start + 5].fill(0xFF);

        let err = decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            Error::StreamError(StreamError::SymbolOutOfAlphabet {
                block: 0,
                alphabet: UNMAPPED_ALPHABET
            })
        ));
        assert!(err.is_corrupt_stream());
    }

    #[test]
    fn test_decode_to_writes_lines() -> Result<()> {
        let config = CodecConfig::default();
        let bytes = encode(
            &config,
            &[vec![
                AlignmentRecord::unmapped(b"A", b"?"),
                AlignmentRecord::unmapped(b"", b""),
            ]],
        );
        let mut out = Vec::new();
        let mut decoder = Decoder::new(bytes.as_slice())?;
        decoder.decode_to(&mut out)?;
        assert_eq!(out, b"?\n\n");
        assert_eq!(decoder.stats().num_unmapped_records, 2);
        Ok(())
    }
}
