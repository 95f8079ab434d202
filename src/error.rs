use std::error::Error as StdError;

/// Custom Result type for pileq operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the pileq library, encompassing all possible error cases
/// that can occur while quantizing, encoding, or decoding quality values.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Errors related to the codec configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] ConfigError),

    /// Errors raised by the genotype likelihood model
    #[error("Genotyper error: {0}")]
    GenotyperError(#[from] GenotyperError),

    /// Errors that occur while encoding a block of records
    #[error("Error encoding block: {0}")]
    EncodeError(#[from] EncodeError),

    /// Errors related to a malformed or truncated container
    #[error("Corrupt stream: {0}")]
    StreamError(#[from] StreamError),

    /// Errors from the SAM record source
    #[error("Error parsing SAM: {0}")]
    SamError(#[from] SamError),

    /// Errors from the FASTA reference provider
    #[error("Error parsing FASTA: {0}")]
    FastaError(#[from] FastaError),

    /// Standard I/O errors
    #[error("Error with IO: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic errors for other unexpected situations
    #[error("Generic error: {0}")]
    GenericError(#[from] Box<dyn StdError + Send + Sync>),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidConfiguration,
    InvalidInput,
    OutOfRange,
    CorruptStream,
    Parse,
    Io,
    Other,
}

impl Error {
    /// Classifies this error into one of the failure kinds of the codec.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigError(_) => ErrorKind::InvalidConfiguration,
            Self::GenotyperError(err) => err.kind(),
            Self::EncodeError(EncodeError::QualityOutOfRange { .. }) => ErrorKind::OutOfRange,
            Self::StreamError(_) => ErrorKind::CorruptStream,
            Self::SamError(_) | Self::FastaError(_) => ErrorKind::Parse,
            Self::IoError(_) => ErrorKind::Io,
            Self::GenericError(_) => ErrorKind::Other,
        }
    }

    /// Checks if the error indicates a corrupt or truncated container
    #[must_use]
    pub fn is_corrupt_stream(&self) -> bool {
        self.kind() == ErrorKind::CorruptStream
    }
}

/// Errors raised when validating a [`CodecConfig`](crate::CodecConfig)
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Block size must be greater than zero")]
    BlockSize,

    #[error("Polyploidy must be in [1, {}]", crate::config::MAX_POLYPLOIDY)]
    Polyploidy,

    #[error("Quality value offset must be greater than zero")]
    QualityOffset,

    /// The number of quantizers is zero or exceeds the number of representable indices
    #[error("Number of quantizers must be in [1, {max}] - found {found}")]
    NumQuantizers { found: usize, max: usize },

    /// The quality value bounds are inverted, exceed what the genotyper models, or
    /// cannot be represented with the offset
    #[error("Invalid quality value range [{min}, {max}] with offset {offset}")]
    QualityRange { min: i32, max: i32, offset: i32 },

    /// The quantizer index range handed to the genotyper is inverted or too wide
    #[error("Invalid quantizer index range [{min}, {max}] for {num_quantizers} quantizers")]
    QuantizerIndexRange {
        min: usize,
        max: usize,
        num_quantizers: usize,
    },
}

/// Errors raised while computing genotype likelihoods for a pileup column
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum GenotyperError {
    /// Observed bases and quality values have different lengths
    #[error("Observation lengths do not match: {bases} bases, {qualities} quality values")]
    LengthMismatch { bases: usize, qualities: usize },

    /// Fewer than two observations were provided
    #[error("Depth must be greater than one - found {0}")]
    InsufficientDepth(usize),

    /// A quality value (after offset removal) is outside the supported range
    #[error("Quality value {value} out of range [0, {max}]")]
    QualityOutOfRange { value: i32, max: i32 },
}
impl GenotyperError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LengthMismatch { .. } | Self::InsufficientDepth(_) => ErrorKind::InvalidInput,
            Self::QualityOutOfRange { .. } => ErrorKind::OutOfRange,
        }
    }
}

/// Errors that can occur while encoding a block
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    /// A mapped record carries a quality value outside of `[qv_min, qv_max]`
    #[error(
        "Record {record} has quality value {value} outside of the configured range [{min}, {max}]"
    )]
    QualityOutOfRange {
        record: u64,
        value: i32,
        min: i32,
        max: i32,
    },
}

/// Errors that can occur while reading a container
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    #[error("Invalid file header MAGIC found")]
    InvalidFileMagic,

    #[error("Invalid block header MAGIC found in block {0}")]
    InvalidBlockMagic(usize),

    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u8),

    /// The stream ended inside a block header or block body
    #[error("Block {block} is truncated: expected {expected} bytes, found {found}")]
    TruncatedFrame {
        block: usize,
        expected: usize,
        found: usize,
    },

    /// The declared frame length does not match the sum of its column lengths
    #[error("Block {block} declares {declared} bytes but its columns span {actual}")]
    FrameLengthMismatch {
        block: usize,
        declared: u64,
        actual: u64,
    },

    /// The range decoder left its valid state or produced a level the quantizer cannot reconstruct
    #[error("Decoded symbol outside of alphabet (size {alphabet}) in block {block}")]
    SymbolOutOfAlphabet { block: usize, alphabet: usize },

    #[error("Quantizer index {index} is out of range for {num_quantizers} quantizers")]
    InvalidQuantizerIndex { index: u8, num_quantizers: usize },

    /// A column could not be parsed into its declared structure
    #[error("Malformed {column} column in block {block}")]
    MalformedColumn { column: &'static str, block: usize },
}

/// Errors that can occur while parsing SAM records
#[derive(thiserror::Error, Debug)]
pub enum SamError {
    #[error("Line {line}: missing mandatory field {field}")]
    MissingField { line: usize, field: &'static str },

    #[error("Line {line}: invalid value in field {field}")]
    InvalidField { line: usize, field: &'static str },

    #[error("Line {line}: invalid CIGAR string {cigar}")]
    InvalidCigar { line: usize, cigar: String },
}

/// Errors that can occur while parsing FASTA references
#[derive(thiserror::Error, Debug)]
pub enum FastaError {
    #[error(transparent)]
    Reader(#[from] seq_io::fasta::Error),

    #[error("Empty reference name in record {0}")]
    EmptyName(usize),
}

/// Trait for converting arbitrary errors into `Error`
pub trait IntoPileqError {
    fn into_pileq_error(self) -> Error;
}

impl<E> IntoPileqError for E
where
    E: StdError + Send + Sync + 'static,
{
    fn into_pileq_error(self) -> Error {
        Error::GenericError(Box::new(self))
    }
}
