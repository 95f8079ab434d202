//! Genotype likelihood model for a single pileup column
//!
//! The [`Genotyper`] turns the bases and quality values observed at one reference
//! position into a distribution over all genotypes of the configured polyploidy.
//! The gap between the two most likely genotypes is used as a confidence score and
//! mapped onto a quantizer index: confident calls may be quantized coarsely while
//! ambiguous calls keep their precision.
//!
//! The combination rule (sum over observations of the log of the mean allele
//! likelihood, then renormalised) treats overlapping reads as independent and is
//! not a Bayesian posterior. The downstream quantizer selection depends on its
//! exact shape.

use crate::config::CodecConfig;
use crate::error::{ConfigError, GenotyperError, Result};

/// The ordered allele alphabet
pub const ALLELE_ALPHABET: [u8; 5] = *b"ACGTN";

/// Largest quality value (offset removed) accepted by the likelihood model
pub const MAX_QUALITY_VALUE: i32 = 50;

/// Index of `base` in [`ALLELE_ALPHABET`]
#[inline]
fn allele_index(base: u8) -> Option<usize> {
    ALLELE_ALPHABET.iter().position(|&allele| allele == base)
}

/// Number of genotypes for a given polyploidy: `C(|alleles| + p - 1, p)`
#[must_use]
pub fn genotype_count(polyploidy: usize) -> usize {
    let n = ALLELE_ALPHABET.len();
    // multiplicative binomial keeps every intermediate integral
    (1..=polyploidy).fold(1usize, |acc, k| acc * (n - 1 + k) / k)
}

/// Enumerates all multisets of `polyploidy` alleles as non-decreasing index sequences
fn enumerate_genotypes(polyploidy: usize) -> Vec<Box<[u8]>> {
    fn recurse(out: &mut Vec<Box<[u8]>>, chosen: &mut [u8], n_chosen: usize, at: usize) {
        if n_chosen == chosen.len() {
            out.push(chosen.into());
            return;
        }
        for allele in at..ALLELE_ALPHABET.len() {
            chosen[n_chosen] = allele as u8;
            recurse(out, chosen, n_chosen + 1, allele);
        }
    }

    let mut genotypes = Vec::with_capacity(genotype_count(polyploidy));
    let mut chosen = vec![0u8; polyploidy];
    recurse(&mut genotypes, &mut chosen, 0, 0);
    genotypes
}

/// Per-column genotype likelihood model
///
/// The scratch likelihood tables are overwritten by every call, so a `Genotyper`
/// must not be shared between concurrently processed blocks.
#[derive(Debug, Clone)]
pub struct Genotyper {
    /// Genotypes as allele indices, in canonical order
    genotypes: Vec<Box<[u8]>>,

    /// Scratch likelihood per allele for the current observation
    allele_likelihoods: [f64; ALLELE_ALPHABET.len()],
    /// Scratch (log-)likelihood per genotype for the current column
    genotype_likelihoods: Vec<f64>,

    num_quantizers: usize,
    polyploidy: usize,
    qv_offset: i32,
    quantizer_idx_max: usize,
}
impl Genotyper {
    pub fn new(
        polyploidy: usize,
        num_quantizers: usize,
        quantizer_idx_min: usize,
        quantizer_idx_max: usize,
        qv_offset: i32,
    ) -> Result<Self> {
        if polyploidy == 0 || polyploidy > crate::config::MAX_POLYPLOIDY {
            return Err(ConfigError::Polyploidy.into());
        }
        if num_quantizers == 0 {
            return Err(ConfigError::NumQuantizers {
                found: num_quantizers,
                max: crate::config::MAX_NUM_QUANTIZERS,
            }
            .into());
        }
        if quantizer_idx_min > quantizer_idx_max || quantizer_idx_max >= num_quantizers {
            return Err(ConfigError::QuantizerIndexRange {
                min: quantizer_idx_min,
                max: quantizer_idx_max,
                num_quantizers,
            }
            .into());
        }
        if qv_offset < 1 {
            return Err(ConfigError::QualityOffset.into());
        }

        let genotypes = enumerate_genotypes(polyploidy);
        let genotype_likelihoods = vec![0.0; genotypes.len()];
        Ok(Self {
            genotypes,
            allele_likelihoods: [0.0; ALLELE_ALPHABET.len()],
            genotype_likelihoods,
            num_quantizers,
            polyploidy,
            qv_offset,
            quantizer_idx_max,
        })
    }

    /// Builds a genotyper spanning the full quantizer index range of `config`
    pub fn from_config(config: &CodecConfig) -> Result<Self> {
        Self::new(
            config.polyploidy,
            config.num_quantizers,
            0,
            config.quantizer_idx_max(),
            config.qv_offset,
        )
    }

    #[must_use]
    pub fn polyploidy(&self) -> usize {
        self.polyploidy
    }

    #[must_use]
    pub fn num_genotypes(&self) -> usize {
        self.genotypes.len()
    }

    /// Genotype at `index` spelled out with the allele alphabet (e.g. `"AC"`)
    #[must_use]
    pub fn genotype_label(&self, index: usize) -> Option<String> {
        self.genotypes.get(index).map(|genotype| {
            genotype
                .iter()
                .map(|&allele| ALLELE_ALPHABET[allele as usize] as char)
                .collect()
        })
    }

    /// Likelihoods of the most recently processed column, in genotype order
    #[must_use]
    pub fn genotype_likelihoods(&self) -> &[f64] {
        &self.genotype_likelihoods
    }

    fn reset_likelihoods(&mut self) {
        self.allele_likelihoods.fill(0.0);
        self.genotype_likelihoods.fill(0.0);
    }

    fn check_lengths(bases: &[u8], qualities: &[u8]) -> Result<usize> {
        if bases.len() != qualities.len() {
            return Err(GenotyperError::LengthMismatch {
                bases: bases.len(),
                qualities: qualities.len(),
            }
            .into());
        }
        Ok(bases.len())
    }

    /// Computes the normalised genotype distribution for one pileup column
    ///
    /// `bases` and `qualities` hold one entry per overlapping read. Quality characters
    /// are converted to values by subtracting the configured offset.
    pub fn compute_genotype_likelihoods(&mut self, bases: &[u8], qualities: &[u8]) -> Result<()> {
        self.reset_likelihoods();

        let depth = Self::check_lengths(bases, qualities)?;
        if depth < 2 {
            return Err(GenotyperError::InsufficientDepth(depth).into());
        }

        let p_error_share = 1.0 / (ALLELE_ALPHABET.len() - 1) as f64;
        let polyploidy = self.polyploidy as f64;
        for (&base, &qual) in bases.iter().zip(qualities) {
            let q = i32::from(qual) - self.qv_offset;
            if !(0..=MAX_QUALITY_VALUE).contains(&q) {
                return Err(GenotyperError::QualityOutOfRange {
                    value: q,
                    max: MAX_QUALITY_VALUE,
                }
                .into());
            }
            let p_strike = 1.0 - 10f64.powf(-f64::from(q) / 10.0);
            let p_error = (1.0 - p_strike) * p_error_share;

            // unknown bases match no allele
            let observed = allele_index(base);
            for (allele, likelihood) in self.allele_likelihoods.iter_mut().enumerate() {
                *likelihood = if Some(allele) == observed {
                    p_strike
                } else {
                    p_error
                };
            }

            for (genotype, log_likelihood) in self
                .genotypes
                .iter()
                .zip(self.genotype_likelihoods.iter_mut())
            {
                let p = genotype
                    .iter()
                    .map(|&allele| self.allele_likelihoods[allele as usize])
                    .sum::<f64>()
                    / polyploidy;
                *log_likelihood += p.ln();
            }
        }

        self.normalize();
        Ok(())
    }

    /// Exponentiates the accumulated log-likelihoods and rescales them to sum to one
    fn normalize(&mut self) {
        let max = self
            .genotype_likelihoods
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);

        // every genotype impossible: no information, spread uniformly
        if max == f64::NEG_INFINITY {
            let uniform = 1.0 / self.genotype_likelihoods.len() as f64;
            self.genotype_likelihoods.fill(uniform);
            return;
        }

        // shifting by the maximum cancels in the ratio and avoids underflow at depth
        let mut cum = 0.0;
        for likelihood in &mut self.genotype_likelihoods {
            *likelihood = (*likelihood - max).exp();
            cum += *likelihood;
        }
        for likelihood in &mut self.genotype_likelihoods {
            *likelihood /= cum;
        }
    }

    /// Shannon entropy (natural log) of the genotype distribution
    ///
    /// Returns `None` when fewer than two observations are available.
    pub fn compute_genotype_entropy(
        &mut self,
        bases: &[u8],
        qualities: &[u8],
    ) -> Result<Option<f64>> {
        let depth = Self::check_lengths(bases, qualities)?;
        if depth < 2 {
            return Ok(None);
        }

        self.compute_genotype_likelihoods(bases, qualities)?;

        let entropy = self
            .genotype_likelihoods
            .iter()
            .filter(|&&p| p != 0.0)
            .map(|&p| -p * p.ln())
            .sum();
        Ok(Some(entropy))
    }

    /// Gap between the largest and second largest genotype likelihood of the last column
    #[must_use]
    pub fn confidence(&self) -> f64 {
        let mut largest = 0.0;
        let mut second = 0.0;
        for &likelihood in &self.genotype_likelihoods {
            if likelihood > second {
                second = likelihood;
            }
            if second > largest {
                second = largest;
                largest = likelihood;
            }
        }
        largest - second
    }

    /// Selects a quantizer index for one pileup column
    ///
    /// * depth 0: `None`, there is nothing to decide on
    /// * depth 1: the finest quantizer of the target range
    /// * otherwise: `floor((1 - confidence) * (num_quantizers - 1))` over the whole bank
    pub fn compute_quantizer_index(
        &mut self,
        bases: &[u8],
        qualities: &[u8],
    ) -> Result<Option<usize>> {
        let depth = Self::check_lengths(bases, qualities)?;
        match depth {
            0 => return Ok(None),
            1 => return Ok(Some(self.quantizer_idx_max)),
            _ => {}
        }

        self.compute_genotype_likelihoods(bases, qualities)?;
        let confidence = self.confidence().clamp(0.0, 1.0);

        let raw = ((1.0 - confidence) * (self.num_quantizers - 1) as f64).floor() as usize;
        Ok(Some(raw.min(self.num_quantizers - 1)))
    }
}
