use std::io::{self, Read, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::config::{CodecConfig, FallbackQuantizer};
use crate::error::{ConfigError, Result, StreamError};

use super::{FILE_MAGIC, FILE_VERSION};

/// Size of the serialized file header in bytes
pub const SIZE_HEADER: usize = 64;

/// Number of reserved bytes at the end of the header
const SIZE_RESERVED: usize = 36;

/// Container header: magic token followed by the global parameter record
///
/// ```text
/// magic[7] version[1] block_size[8] polyploidy[4] num_quantizers[4]
/// qv_min[1] qv_max[1] qv_offset[1] fallback[1] reserved[36]
/// ```
///
/// All integers are little-endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileHeader {
    /// File magic number
    magic: [u8; 7],
    /// File version number
    pub version: u8,

    /// Maximum number of records per block
    pub block_size: u64,
    /// Number of allele copies per genotype
    pub polyploidy: u32,
    /// Number of quantizers in the bank
    pub num_quantizers: u32,
    pub qv_min: u8,
    pub qv_max: u8,
    pub qv_offset: u8,
    /// Quantizer used for positions without coverage
    pub fallback: u8,
}
impl FileHeader {
    /// Builds the header persisting `config`
    ///
    /// The configuration must have been validated, which guarantees every field fits.
    #[must_use]
    pub fn from_config(config: &CodecConfig) -> Self {
        Self {
            magic: *FILE_MAGIC,
            version: FILE_VERSION,
            block_size: config.block_size as u64,
            polyploidy: config.polyploidy as u32,
            num_quantizers: config.num_quantizers as u32,
            qv_min: config.qv_min as u8,
            qv_max: config.qv_max as u8,
            qv_offset: config.qv_offset as u8,
            fallback: config.fallback.as_u8(),
        }
    }

    /// Rebuilds and validates the configuration stored in this header
    pub fn config(&self) -> Result<CodecConfig> {
        let fallback = FallbackQuantizer::from_u8(self.fallback)
            .ok_or(StreamError::MalformedColumn {
                column: "file header",
                block: 0,
            })?;
        let block_size = usize::try_from(self.block_size).map_err(|_| ConfigError::BlockSize)?;
        let config = CodecConfig {
            block_size,
            polyploidy: self.polyploidy as usize,
            qv_min: i32::from(self.qv_min),
            qv_max: i32::from(self.qv_max),
            qv_offset: i32::from(self.qv_offset),
            num_quantizers: self.num_quantizers as usize,
            fallback,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_bytes(&self) -> [u8; SIZE_HEADER] {
        let mut buffer = [0u8; SIZE_HEADER];
        buffer[..7].copy_from_slice(&self.magic);
        buffer[7] = self.version;
        LittleEndian::write_u64(&mut buffer[8..16], self.block_size);
        LittleEndian::write_u32(&mut buffer[16..20], self.polyploidy);
        LittleEndian::write_u32(&mut buffer[20..24], self.num_quantizers);
        buffer[24] = self.qv_min;
        buffer[25] = self.qv_max;
        buffer[26] = self.qv_offset;
        buffer[27] = self.fallback;
        buffer
    }

    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Parses a header from its serialized form
    pub fn from_bytes(buffer: &[u8; SIZE_HEADER]) -> Result<Self> {
        let mut magic = [0u8; 7];
        magic.copy_from_slice(&buffer[..7]);
        if magic != *FILE_MAGIC {
            return Err(StreamError::InvalidFileMagic.into());
        }
        let version = buffer[7];
        if version != FILE_VERSION {
            return Err(StreamError::UnsupportedVersion(version).into());
        }
        if buffer[SIZE_HEADER - SIZE_RESERVED..].iter().any(|&b| b != 0) {
            return Err(StreamError::MalformedColumn {
                column: "file header",
                block: 0,
            }
            .into());
        }
        Ok(Self {
            magic,
            version,
            block_size: LittleEndian::read_u64(&buffer[8..16]),
            polyploidy: LittleEndian::read_u32(&buffer[16..20]),
            num_quantizers: LittleEndian::read_u32(&buffer[20..24]),
            qv_min: buffer[24],
            qv_max: buffer[25],
            qv_offset: buffer[26],
            fallback: buffer[27],
        })
    }

    /// Reads a header from a stream
    ///
    /// The magic token is read and checked on its own, so a foreign stream is rejected
    /// without consuming anything past the magic.
    pub fn read_bytes<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buffer = [0u8; SIZE_HEADER];
        read_header_part(reader, &mut buffer[..FILE_MAGIC.len()])?;
        if buffer[..FILE_MAGIC.len()] != FILE_MAGIC[..] {
            return Err(StreamError::InvalidFileMagic.into());
        }
        read_header_part(reader, &mut buffer[FILE_MAGIC.len()..])?;
        Self::from_bytes(&buffer)
    }
}

/// Reads `buffer.len()` header bytes, reporting a short stream as a bad magic
fn read_header_part<R: Read>(reader: &mut R, buffer: &mut [u8]) -> Result<()> {
    match reader.read_exact(buffer) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(StreamError::InvalidFileMagic.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Writes `n` zero bytes, used to pad reserved fields
pub(crate) fn write_padding<W: Write>(writer: &mut W, n: usize) -> io::Result<()> {
    for _ in 0..n {
        writer.write_u8(0)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::config::CodecConfigBuilder;
    use crate::error::Error;

    #[test]
    fn test_header_round_trip() -> Result<()> {
        let config = CodecConfigBuilder::new()
            .block_size(250)
            .polyploidy(3)
            .qv_min(2)
            .qv_max(40)
            .qv_offset(64)
            .num_quantizers(5)
            .fallback(FallbackQuantizer::Coarsest)
            .build()?;
        let header = FileHeader::from_config(&config);

        let mut buffer = Vec::new();
        header.write_bytes(&mut buffer)?;
        assert_eq!(buffer.len(), SIZE_HEADER);
        assert_eq!(&buffer[..7], FILE_MAGIC);

        let parsed = FileHeader::read_bytes(&mut buffer.as_slice())?;
        assert_eq!(parsed, header);
        assert_eq!(parsed.config()?, config);
        Ok(())
    }

    #[test]
    fn test_header_is_little_endian() {
        let config = CodecConfigBuilder::new().block_size(0x0102).build().unwrap();
        let bytes = FileHeader::from_config(&config).to_bytes();
        assert_eq!(bytes[8], 0x02);
        assert_eq!(bytes[9], 0x01);
    }

    #[test]
    fn test_bad_magic_consumes_only_magic() {
        let mut bytes = FileHeader::from_config(&CodecConfig::default())
            .to_bytes()
            .to_vec();
        bytes[0] = b'X';
        let mut cursor = Cursor::new(bytes);
        let err = FileHeader::read_bytes(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            Error::StreamError(StreamError::InvalidFileMagic)
        ));
        assert_eq!(cursor.position(), FILE_MAGIC.len() as u64);
    }

    #[test]
    fn test_short_stream() {
        let mut bytes: &[u8] = b"PIL";
        let err = FileHeader::read_bytes(&mut bytes).unwrap_err();
        assert!(err.is_corrupt_stream());
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = FileHeader::from_config(&CodecConfig::default()).to_bytes();
        bytes[7] = FILE_VERSION + 1;
        let err = FileHeader::from_bytes(&bytes).unwrap_err();
        assert!(matches!(
            err,
            Error::StreamError(StreamError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_invalid_stored_config() {
        let mut bytes = FileHeader::from_config(&CodecConfig::default()).to_bytes();
        // zero quantizers
        bytes[20..24].copy_from_slice(&[0; 4]);
        let header = FileHeader::from_bytes(&bytes).unwrap();
        assert!(header.config().is_err());
    }
}
