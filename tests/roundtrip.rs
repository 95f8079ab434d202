use std::fs;
use std::io::{BufReader, Write};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use pileq::{
    AlignmentRecord, Cigar, CodecConfig, CodecConfigBuilder, Decoder, Encoder, Error, ErrorKind,
    QuantizerBank, Result, SamReader, StreamError,
};

const BASES: &[u8] = b"ACGT";

/// Reads of length `read_len` tiling a reference of `ref_len` bases, plus some unmapped reads
fn random_records(
    rng: &mut SmallRng,
    num_records: usize,
    config: &CodecConfig,
) -> Vec<AlignmentRecord> {
    let ref_len = 500;
    let read_len = 30;
    let reference: Vec<u8> = (0..ref_len).map(|_| BASES[rng.random_range(0..4)]).collect();
    (0..num_records)
        .map(|_| {
            let qual: Vec<u8> = (0..read_len)
                .map(|_| {
                    (rng.random_range(config.qv_min..=config.qv_max) + config.qv_offset) as u8
                })
                .collect();
            if rng.random_bool(0.1) {
                let seq: Vec<u8> = (0..read_len).map(|_| BASES[rng.random_range(0..4)]).collect();
                return AlignmentRecord::unmapped(&seq, &qual);
            }
            let pos = rng.random_range(0..(ref_len - read_len) as u32);
            let mut seq = reference[pos as usize..pos as usize + read_len].to_vec();
            // sprinkle some sequencing errors
            for base in &mut seq {
                if rng.random_bool(0.02) {
                    *base = BASES[rng.random_range(0..4)];
                }
            }
            let cigar = if rng.random_bool(0.2) {
                Cigar::parse(b"3S20M2I5M").unwrap()
            } else {
                Cigar::parse(b"30M").unwrap()
            };
            let rname: &[u8] = if rng.random_bool(0.5) { b"chr1" } else { b"chr2" };
            AlignmentRecord::mapped(rname, pos, cigar, &seq, &qual)
        })
        .collect()
}

fn encode(config: &CodecConfig, records: &[AlignmentRecord]) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new(Vec::new(), config)?;
    encoder.encode(&mut records.iter().cloned().map(Result::Ok))?;
    Ok(encoder.finish()?.0)
}

fn decode(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut decoder = Decoder::new(bytes)?;
    let mut qualities = Vec::new();
    while decoder.read_block()?.is_some() {
        qualities.extend(decoder.qualities().map(<[u8]>::to_vec));
    }
    Ok(qualities)
}

#[test]
fn test_roundtrip_error_bound() -> Result<()> {
    let config = CodecConfigBuilder::new().block_size(128).build()?;
    let mut rng = SmallRng::seed_from_u64(7);
    let records = random_records(&mut rng, 1000, &config);

    let decoded = decode(&encode(&config, &records)?)?;
    assert_eq!(decoded.len(), records.len());

    let bank = QuantizerBank::from_config(&config)?;
    let max_error = bank.iter().map(pileq::Quantizer::max_error).max().unwrap();
    for (record, qual) in records.iter().zip(&decoded) {
        assert_eq!(record.qual.len(), qual.len());
        if record.is_mapped() {
            for (&original, &restored) in record.qual.iter().zip(qual) {
                let restored = i32::from(restored) - config.qv_offset;
                assert!((config.qv_min..=config.qv_max).contains(&restored));
                assert!((i32::from(original) - config.qv_offset - restored).abs() <= max_error);
            }
        } else {
            assert_eq!(&record.qual, qual);
        }
    }
    Ok(())
}

#[test]
fn test_single_quantizer_is_lossless() -> Result<()> {
    let config = CodecConfigBuilder::new()
        .block_size(100)
        .num_quantizers(1)
        .build()?;
    let mut rng = SmallRng::seed_from_u64(11);
    let records = random_records(&mut rng, 450, &config);
    let decoded = decode(&encode(&config, &records)?)?;
    let expected: Vec<Vec<u8>> = records.into_iter().map(|r| r.qual).collect();
    assert_eq!(decoded, expected);
    Ok(())
}

#[test]
fn test_encoding_is_deterministic() -> Result<()> {
    let config = CodecConfig::default();
    let mut rng = SmallRng::seed_from_u64(3);
    let records = random_records(&mut rng, 300, &config);
    assert_eq!(encode(&config, &records)?, encode(&config, &records)?);
    Ok(())
}

#[test]
fn test_sam_file_roundtrip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let sam_path = dir.path().join("reads.sam");
    let pq_path = dir.path().join("reads.sam.pq");

    let mut sam = fs::File::create(&sam_path)?;
    writeln!(sam, "@HD\tVN:1.6\tSO:coordinate")?;
    writeln!(sam, "@SQ\tSN:chr1\tLN:100")?;
    for i in 0..40u32 {
        writeln!(
            sam,
            "read{i}\t0\tchr1\t{}\t60\t8M\t*\t0\t0\tACGTACGT\tIIIII+++",
            1 + i % 4
        )?;
    }
    writeln!(sam, "orphan\t4\t*\t0\t0\t*\t*\t0\t0\tNNNN\t!!#~")?;
    drop(sam);

    let config = CodecConfigBuilder::new().block_size(16).build()?;
    let mut reader = SamReader::from_path(&sam_path)?;
    let mut encoder = Encoder::new(fs::File::create(&pq_path)?, &config)?;
    encoder.encode(&mut reader)?;
    let (_, stats) = encoder.finish()?;
    assert_eq!(stats.num_blocks, 3);
    assert_eq!(stats.num_mapped_records, 40);
    assert_eq!(stats.num_unmapped_records, 1);
    assert_eq!(fs::metadata(&pq_path)?.len(), stats.total_bytes());

    let mut decoder = Decoder::new(BufReader::new(fs::File::open(&pq_path)?))?;
    let mut out = Vec::new();
    decoder.decode_to(&mut out)?;
    let lines: Vec<&[u8]> = out.split(|&b| b == b'\n').collect();
    // trailing newline leaves an empty last element
    assert_eq!(lines.len(), 42);
    assert_eq!(lines[40], b"!!#~");
    assert!(lines[..40].iter().all(|line| line.len() == 8));
    Ok(())
}

#[test]
fn test_corrupt_magic() -> Result<()> {
    let mut bytes = encode(&CodecConfig::default(), &[])?;
    bytes[0] = b'X';
    let err = Decoder::new(bytes.as_slice()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::CorruptStream);
    assert!(matches!(err, Error::StreamError(StreamError::InvalidFileMagic)));
    Ok(())
}

#[test]
fn test_truncated_tail_keeps_complete_blocks() -> Result<()> {
    let config = CodecConfigBuilder::new().block_size(50).build()?;
    let mut rng = SmallRng::seed_from_u64(5);
    let records = random_records(&mut rng, 120, &config);
    let bytes = encode(&config, &records)?;
    let cut = &bytes[..bytes.len() - 10];

    let mut decoder = Decoder::new(cut)?;
    let mut out = Vec::new();
    let err = decoder.decode_to(&mut out).unwrap_err();
    assert!(matches!(
        err,
        Error::StreamError(StreamError::TruncatedFrame { block: 2, .. })
    ));
    assert_eq!(decoder.num_blocks(), 2);
    assert_eq!(out.iter().filter(|&&b| b == b'\n').count(), 100);
    Ok(())
}

#[test]
fn test_out_of_range_quality_is_rejected() -> Result<()> {
    let config = CodecConfigBuilder::new().qv_min(2).build()?;
    let record = AlignmentRecord::mapped(b"chr1", 0, Cigar::parse(b"2M").unwrap(), b"AC", b"!I");
    let err = encode(&config, &[record]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfRange);
    Ok(())
}
