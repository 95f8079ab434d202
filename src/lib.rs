//! # pileq
//!
//! Pileup-adaptive lossy compression of the quality values of aligned sequencing
//! reads.
//!
//! ## Overview
//!
//! Records are processed in blocks. For every reference position covered by the
//! mapped records of a block, a [`Genotyper`] evaluates how confidently the
//! observed bases determine the genotype. Confident positions are quantized
//! coarsely, ambiguous ones finely, using a bank of uniform quantizers shared by
//! the encoder and decoder ([`QuantizerBank`]). The quantized values are entropy
//! coded with adaptive models that persist across blocks. Quality strings of
//! unmapped records are coded losslessly.
//!
//! ## File Structure
//!
//! ```text
//! ┌───────────────────┐
//! │    File Header    │ 64 bytes
//! ├───────────────────┤
//! │   Block Header    │ 56 bytes
//! ├───────────────────┤
//! │                   │
//! │   Block Columns   │ Variable size
//! │                   │
//! ├───────────────────┤
//! │       ...         │ More blocks
//! └───────────────────┘
//! ```
//!
//! The [`FileHeader`] stores the [`CodecConfig`] the stream was encoded with.
//! Each block is a [`BlockHeader`] declaring the length of its four columns:
//!
//! 1. `z_layout` - zstd compressed record layout (kind, length, slot, position, CIGAR)
//! 2. `z_qidx` - zstd compressed quantizer index of every covered position
//! 3. `mapped` - range coded quantized mapped quality values
//! 4. `unmapped` - range coded unmapped quality values
//!
//! The stream ends at the last complete block. Blocks must be decoded in order.

mod config;
mod core;
mod error;
mod fasta;
mod genotyper;
mod quantizer;
mod read;
mod record;
mod sam;
mod stats;
mod write;

pub use config::{
    CodecConfig, CodecConfigBuilder, FallbackQuantizer, MAX_NUM_QUANTIZERS, MAX_POLYPLOIDY,
};
pub use core::{BlockHeader, FileHeader, QualityBlock, SIZE_BLOCK_HEADER, SIZE_HEADER};
pub use error::{
    ConfigError, EncodeError, Error, ErrorKind, FastaError, GenotyperError, IntoPileqError,
    Result, SamError, StreamError,
};
pub use fasta::{Reference, ReferenceSet};
pub use genotyper::{genotype_count, Genotyper, ALLELE_ALPHABET, MAX_QUALITY_VALUE};
pub use quantizer::{build_quantizer, Quantizer, QuantizerBank};
pub use read::Decoder;
pub use record::{AlignmentRecord, Cigar, CigarKind, CigarOp, RecordSource, FLAG_UNMAPPED};
pub use sam::SamReader;
pub use stats::CodecStats;
pub use write::Encoder;

/// Magic token opening every container
pub const FILE_MAGIC: &[u8; 7] = b"PILEQFL";

/// Magic token opening every block header
pub const BLOCK_MAGIC: &[u8; 3] = b"QBK";

/// Current version of the container format
pub const FILE_VERSION: u8 = 1;

/// File extension of compressed containers
pub const FILE_EXTENSION: &str = "pq";

/// Default number of records per block
pub const DEFAULT_BLOCK_SIZE: usize = 10_000;

/// Default number of allele copies per genotype
pub const DEFAULT_POLYPLOIDY: usize = 2;

/// Default smallest quality value
pub const DEFAULT_QV_MIN: i32 = 0;

/// Default largest quality value
pub const DEFAULT_QV_MAX: i32 = 41;

/// Default ASCII offset of quality characters (Sanger)
pub const DEFAULT_QV_OFFSET: i32 = 33;

/// Default number of quantizers in the bank
pub const DEFAULT_NUM_QUANTIZERS: usize = 8;

/// zstd level of the layout and quantizer index columns
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;
