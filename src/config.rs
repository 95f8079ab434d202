//! Shared codec configuration
//!
//! A [`CodecConfig`] is handed by reference to the [`Encoder`](crate::Encoder), which
//! persists it in the [`FileHeader`](crate::FileHeader). The
//! [`Decoder`](crate::Decoder) recovers it from there and rebuilds the exact same
//! quantizer bank the encoder used.

use crate::error::{ConfigError, Result};
use crate::genotyper::MAX_QUALITY_VALUE;
use crate::{
    DEFAULT_BLOCK_SIZE, DEFAULT_NUM_QUANTIZERS, DEFAULT_POLYPLOIDY, DEFAULT_QV_MAX,
    DEFAULT_QV_MIN, DEFAULT_QV_OFFSET,
};

/// Largest number of quantizers addressable by a one-byte quantizer index
pub const MAX_NUM_QUANTIZERS: usize = u8::MAX as usize;

/// Largest supported polyploidy (4845 genotypes over five alleles)
pub const MAX_POLYPLOIDY: usize = 16;

/// Quantizer used for reference positions that received no observation in a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackQuantizer {
    /// Quantizer `0`, smallest output
    Coarsest,
    /// Quantizer `num_quantizers - 1`, near-lossless
    #[default]
    Finest,
}
impl FallbackQuantizer {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Coarsest => 0,
            Self::Finest => 1,
        }
    }

    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Coarsest),
            1 => Some(Self::Finest),
            _ => None,
        }
    }
}

/// Parameters shared by the encoder and decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecConfig {
    /// Maximum number of records per block
    pub block_size: usize,
    /// Number of allele copies per genotype
    pub polyploidy: usize,
    /// Smallest admissible quality value (offset removed)
    pub qv_min: i32,
    /// Largest admissible quality value (offset removed)
    pub qv_max: i32,
    /// ASCII offset of the stored quality characters (33 for Sanger)
    pub qv_offset: i32,
    /// Number of quantizers in the bank
    pub num_quantizers: usize,
    /// Quantizer chosen for positions without coverage
    pub fallback: FallbackQuantizer,
}
impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            polyploidy: DEFAULT_POLYPLOIDY,
            qv_min: DEFAULT_QV_MIN,
            qv_max: DEFAULT_QV_MAX,
            qv_offset: DEFAULT_QV_OFFSET,
            num_quantizers: DEFAULT_NUM_QUANTIZERS,
            fallback: FallbackQuantizer::default(),
        }
    }
}
impl CodecConfig {
    /// Checks every parameter and reports the first violation
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(ConfigError::BlockSize.into());
        }
        if self.polyploidy == 0 || self.polyploidy > MAX_POLYPLOIDY {
            return Err(ConfigError::Polyploidy.into());
        }
        if self.qv_offset < 1 {
            return Err(ConfigError::QualityOffset.into());
        }
        if self.num_quantizers == 0 || self.num_quantizers > MAX_NUM_QUANTIZERS {
            return Err(ConfigError::NumQuantizers {
                found: self.num_quantizers,
                max: MAX_NUM_QUANTIZERS,
            }
            .into());
        }
        let stored_max = self.qv_max + self.qv_offset;
        if self.qv_min < 0
            || self.qv_max < 0
            || self.qv_min > self.qv_max
            || self.qv_max > MAX_QUALITY_VALUE
            || stored_max > i32::from(u8::MAX)
        {
            return Err(ConfigError::QualityRange {
                min: self.qv_min,
                max: self.qv_max,
                offset: self.qv_offset,
            }
            .into());
        }
        Ok(())
    }

    /// Number of distinct quality values in `[qv_min, qv_max]`
    #[must_use]
    pub fn qv_range(&self) -> usize {
        (self.qv_max - self.qv_min + 1) as usize
    }

    /// Index of the finest quantizer
    #[must_use]
    pub fn quantizer_idx_max(&self) -> usize {
        self.num_quantizers - 1
    }

    /// Quantizer index used for positions without any observation
    #[must_use]
    pub fn fallback_index(&self) -> usize {
        match self.fallback {
            FallbackQuantizer::Coarsest => 0,
            FallbackQuantizer::Finest => self.quantizer_idx_max(),
        }
    }
}

/// A builder for validated [`CodecConfig`] instances
///
/// ```
/// use pileq::CodecConfigBuilder;
///
/// let config = CodecConfigBuilder::new()
///     .block_size(5000)
///     .polyploidy(2)
///     .num_quantizers(6)
///     .build()
///     .unwrap();
/// assert_eq!(config.num_quantizers, 6);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct CodecConfigBuilder {
    block_size: Option<usize>,
    polyploidy: Option<usize>,
    qv_min: Option<i32>,
    qv_max: Option<i32>,
    qv_offset: Option<i32>,
    num_quantizers: Option<usize>,
    fallback: Option<FallbackQuantizer>,
}
impl CodecConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = Some(block_size);
        self
    }

    #[must_use]
    pub fn polyploidy(mut self, polyploidy: usize) -> Self {
        self.polyploidy = Some(polyploidy);
        self
    }

    #[must_use]
    pub fn qv_min(mut self, qv_min: i32) -> Self {
        self.qv_min = Some(qv_min);
        self
    }

    #[must_use]
    pub fn qv_max(mut self, qv_max: i32) -> Self {
        self.qv_max = Some(qv_max);
        self
    }

    #[must_use]
    pub fn qv_offset(mut self, qv_offset: i32) -> Self {
        self.qv_offset = Some(qv_offset);
        self
    }

    #[must_use]
    pub fn num_quantizers(mut self, num_quantizers: usize) -> Self {
        self.num_quantizers = Some(num_quantizers);
        self
    }

    #[must_use]
    pub fn fallback(mut self, fallback: FallbackQuantizer) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn build(self) -> Result<CodecConfig> {
        let defaults = CodecConfig::default();
        let config = CodecConfig {
            block_size: self.block_size.unwrap_or(defaults.block_size),
            polyploidy: self.polyploidy.unwrap_or(defaults.polyploidy),
            qv_min: self.qv_min.unwrap_or(defaults.qv_min),
            qv_max: self.qv_max.unwrap_or(defaults.qv_max),
            qv_offset: self.qv_offset.unwrap_or(defaults.qv_offset),
            num_quantizers: self.num_quantizers.unwrap_or(defaults.num_quantizers),
            fallback: self.fallback.unwrap_or(defaults.fallback),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};

    #[test]
    fn test_default_is_valid() {
        assert!(CodecConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() -> Result<()> {
        let config = CodecConfigBuilder::new()
            .block_size(12)
            .polyploidy(3)
            .qv_min(2)
            .qv_max(40)
            .qv_offset(64)
            .num_quantizers(4)
            .fallback(FallbackQuantizer::Coarsest)
            .build()?;
        assert_eq!(config.block_size, 12);
        assert_eq!(config.polyploidy, 3);
        assert_eq!(config.qv_range(), 39);
        assert_eq!(config.quantizer_idx_max(), 3);
        assert_eq!(config.fallback_index(), 0);
        Ok(())
    }

    #[test]
    fn test_zero_block_size() {
        let err = CodecConfigBuilder::new().block_size(0).build().unwrap_err();
        assert!(matches!(err, Error::ConfigError(ConfigError::BlockSize)));
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn test_polyploidy_bounds() {
        let err = CodecConfigBuilder::new().polyploidy(0).build().unwrap_err();
        assert!(matches!(err, Error::ConfigError(ConfigError::Polyploidy)));

        assert!(CodecConfigBuilder::new()
            .polyploidy(MAX_POLYPLOIDY)
            .build()
            .is_ok());
        let err = CodecConfigBuilder::new()
            .polyploidy(MAX_POLYPLOIDY + 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(ConfigError::Polyploidy)));
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn test_qv_max_beyond_genotyper_range() {
        assert!(CodecConfigBuilder::new()
            .qv_max(MAX_QUALITY_VALUE)
            .build()
            .is_ok());
        let err = CodecConfigBuilder::new().qv_max(60).build().unwrap_err();
        assert!(matches!(
            err,
            Error::ConfigError(ConfigError::QualityRange { max: 60, .. })
        ));
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn test_non_positive_offset() {
        let err = CodecConfigBuilder::new().qv_offset(0).build().unwrap_err();
        assert!(matches!(err, Error::ConfigError(ConfigError::QualityOffset)));
    }

    #[test]
    fn test_negative_quality_bounds() {
        let err = CodecConfigBuilder::new().qv_min(-1).build().unwrap_err();
        assert!(matches!(
            err,
            Error::ConfigError(ConfigError::QualityRange { .. })
        ));

        let err = CodecConfigBuilder::new()
            .qv_min(10)
            .qv_max(5)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ConfigError(ConfigError::QualityRange { .. })
        ));
    }

    #[test]
    fn test_quantizer_count_bounds() {
        let err = CodecConfigBuilder::new()
            .num_quantizers(0)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ConfigError(ConfigError::NumQuantizers { found: 0, .. })
        ));
        assert!(CodecConfigBuilder::new()
            .num_quantizers(MAX_NUM_QUANTIZERS + 1)
            .build()
            .is_err());
    }

    #[test]
    fn test_fallback_round_trip() {
        for fallback in [FallbackQuantizer::Coarsest, FallbackQuantizer::Finest] {
            assert_eq!(FallbackQuantizer::from_u8(fallback.as_u8()), Some(fallback));
        }
        assert_eq!(FallbackQuantizer::from_u8(7), None);
    }
}
