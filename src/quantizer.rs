//! Uniform scalar quantizers over the configured quality value range
//!
//! A [`QuantizerBank`] holds `num_quantizers` quantizers whose number of
//! reconstruction levels grows with the index: quantizer `0` is the coarsest and
//! quantizer `num_quantizers - 1` keeps every value of `[qv_min, qv_max]`.
//! The bank depends on the configuration only, so the encoder and decoder build
//! identical banks without transmitting them.

use crate::config::CodecConfig;
use crate::error::{ConfigError, Result};

/// Monotone step function from `[qv_min, qv_max]` onto `0..num_levels`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantizer {
    qv_min: i32,
    qv_max: i32,
    /// Level of each quality value, indexed by `q - qv_min`
    levels: Vec<u8>,
    /// Reconstruction value of each level
    reconstruction: Vec<i32>,
}
impl Quantizer {
    /// Builds a uniform quantizer with `num_levels` cells over `[qv_min, qv_max]`
    ///
    /// Cell `j` holds every value `v` with `floor((v - qv_min) * num_levels / range) == j`
    /// and reconstructs to the midpoint of the cell.
    fn uniform(qv_min: i32, qv_max: i32, num_levels: usize) -> Self {
        let range = (qv_max - qv_min + 1) as usize;
        let num_levels = num_levels.clamp(1, range);

        let levels: Vec<u8> = (0..range)
            .map(|offset| (offset * num_levels / range) as u8)
            .collect();

        let mut reconstruction = Vec::with_capacity(num_levels);
        let mut start = 0;
        for level in 0..num_levels {
            let end = levels[start..]
                .iter()
                .position(|&l| l as usize != level)
                .map_or(range, |len| start + len);
            let midpoint = (start + end - 1) / 2;
            reconstruction.push(qv_min + midpoint as i32);
            start = end;
        }

        Self {
            qv_min,
            qv_max,
            levels,
            reconstruction,
        }
    }

    /// Number of reconstruction levels
    #[must_use]
    pub fn num_levels(&self) -> usize {
        self.reconstruction.len()
    }

    /// Maps a quality value onto its level
    ///
    /// Values outside of the configured range are saturated to the nearest bound;
    /// callers reject such values before quantizing.
    #[must_use]
    pub fn quantize(&self, q: i32) -> u8 {
        let offset = (q.clamp(self.qv_min, self.qv_max) - self.qv_min) as usize;
        self.levels[offset]
    }

    /// Reconstruction value of `level`, or `None` if the level is outside the alphabet
    #[must_use]
    pub fn dequantize(&self, level: u8) -> Option<i32> {
        self.reconstruction.get(level as usize).copied()
    }

    /// Largest absolute reconstruction error over the whole range
    #[must_use]
    pub fn max_error(&self) -> i32 {
        (self.qv_min..=self.qv_max)
            .map(|q| {
                let level = self.quantize(q);
                (self.reconstruction[level as usize] - q).abs()
            })
            .max()
            .unwrap_or(0)
    }
}

/// The family of quantizers selectable by quantizer index
#[derive(Debug, Clone)]
pub struct QuantizerBank {
    quantizers: Vec<Quantizer>,
}
impl QuantizerBank {
    pub fn new(qv_min: i32, qv_max: i32, num_quantizers: usize) -> Result<Self> {
        if qv_min < 0 || qv_max < qv_min {
            return Err(ConfigError::QualityRange {
                min: qv_min,
                max: qv_max,
                offset: 0,
            }
            .into());
        }
        if num_quantizers == 0 {
            return Err(ConfigError::NumQuantizers {
                found: 0,
                max: crate::config::MAX_NUM_QUANTIZERS,
            }
            .into());
        }
        let quantizers = (0..num_quantizers)
            .map(|index| build_quantizer(qv_min, qv_max, num_quantizers, index))
            .collect();
        Ok(Self { quantizers })
    }

    pub fn from_config(config: &CodecConfig) -> Result<Self> {
        Self::new(config.qv_min, config.qv_max, config.num_quantizers)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.quantizers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quantizers.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Quantizer> {
        self.quantizers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Quantizer> {
        self.quantizers.iter()
    }
}

/// Builds the `index`-th quantizer of a bank of `num_quantizers`
///
/// Quantizer `i` has `ceil((i + 1) * range / num_quantizers)` levels, so the last one is
/// lossless over the range.
#[must_use]
pub fn build_quantizer(qv_min: i32, qv_max: i32, num_quantizers: usize, index: usize) -> Quantizer {
    let range = (qv_max - qv_min + 1) as usize;
    let num_levels = ((index + 1) * range).div_ceil(num_quantizers);
    Quantizer::uniform(qv_min, qv_max, num_levels)
}
