//! Adaptive range coding of small symbol alphabets
//!
//! Byte-oriented range coder (64-bit low with carry propagation) driven by
//! adaptive frequency models. Models outlive a single coder, so the statistics
//! gathered in one block are used to code the next one; each block still gets its
//! own encoder and therefore its own independently flushed payload.

/// Renormalisation threshold of the coder range
const RC_TOP: u32 = 1 << 24;

/// Bytes pushed out by [`RangeEncoder::finish`] and pulled in by [`RangeDecoder::new`]
const RC_FLUSH_BYTES: usize = 5;

/// Frequency added to a symbol each time it is coded
const MODEL_INCREMENT: u32 = 16;

/// Model total at which all frequencies are halved
const RESCALE_THRESHOLD: u32 = 1 << 16;

pub(crate) struct RangeEncoder {
    low: u64,
    range: u32,
    cache: u8,
    cache_size: u64,
    num_symbols: usize,
    output: Vec<u8>,
}

impl RangeEncoder {
    pub(crate) fn new() -> Self {
        Self {
            low: 0,
            range: 0xFFFF_FFFF,
            cache: 0,
            cache_size: 1,
            num_symbols: 0,
            output: Vec::new(),
        }
    }

    #[inline]
    fn shift_low(&mut self) {
        let carry = (self.low >> 32) as u8;
        if carry != 0 || (self.low as u32) < 0xFF00_0000 {
            let mut byte = self.cache;
            loop {
                self.output.push(byte.wrapping_add(carry));
                byte = 0xFF;
                self.cache_size -= 1;
                if self.cache_size == 0 {
                    break;
                }
            }
            self.cache = ((self.low >> 24) & 0xFF) as u8;
        }
        self.cache_size += 1;
        self.low = u64::from((self.low as u32) << 8);
    }

    #[inline]
    fn encode(&mut self, cum: u32, freq: u32, total: u32) {
        let r = self.range / total;
        self.low += u64::from(cum) * u64::from(r);
        if cum + freq < total {
            self.range = r * freq;
        } else {
            self.range -= r * cum;
        }
        while self.range < RC_TOP {
            self.range <<= 8;
            self.shift_low();
        }
    }

    /// Codes `symbol` with `model` and updates the model
    pub(crate) fn encode_symbol(&mut self, model: &mut AdaptiveModel, symbol: usize) {
        let (cum, freq, total) = model.encode_params(symbol);
        self.encode(cum, freq, total);
        model.update(symbol);
        self.num_symbols += 1;
    }

    /// Flushes the coder; an encoder that never coded a symbol yields no bytes
    pub(crate) fn finish(mut self) -> Vec<u8> {
        if self.num_symbols == 0 {
            return Vec::new();
        }
        for _ in 0..RC_FLUSH_BYTES {
            self.shift_low();
        }
        self.output
    }
}

pub(crate) struct RangeDecoder<'a> {
    range: u32,
    code: u32,
    input: &'a [u8],
    /// Number of bytes requested so far, may run past the end of a corrupt input
    pos: usize,
}

impl<'a> RangeDecoder<'a> {
    pub(crate) fn new(input: &'a [u8]) -> Self {
        let mut dec = Self {
            range: 0xFFFF_FFFF,
            code: 0,
            input,
            pos: 0,
        };
        // the first byte is the encoder's initial (empty) cache
        dec.next_byte();
        for _ in 1..RC_FLUSH_BYTES {
            dec.code = (dec.code << 8) | u32::from(dec.next_byte());
        }
        dec
    }

    #[inline]
    fn next_byte(&mut self) -> u8 {
        let byte = self.input.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        byte
    }

    #[inline]
    fn normalize(&mut self) {
        while self.range < RC_TOP {
            self.code = (self.code << 8) | u32::from(self.next_byte());
            self.range <<= 8;
        }
    }

    /// Decodes one symbol with `model` and updates the model
    ///
    /// Returns `None` when the code value lies outside of the coder range, which no
    /// encoder output can produce.
    pub(crate) fn decode_symbol(&mut self, model: &mut AdaptiveModel) -> Option<usize> {
        if self.code >= self.range {
            return None;
        }
        let total = model.total;
        let r = self.range / total;
        // the last symbol owns the rounding remainder of the range
        let target = (self.code / r).min(total - 1);

        let symbol = model.cum_freqs.partition_point(|&c| c <= target) - 1;
        let (cum, freq, _) = model.encode_params(symbol);

        self.code -= cum * r;
        if cum + freq < total {
            self.range = r * freq;
        } else {
            self.range -= r * cum;
        }
        self.normalize();
        model.update(symbol);
        Some(symbol)
    }

    /// A well-formed payload is consumed exactly, byte for byte
    pub(crate) fn is_exhausted(&self) -> bool {
        self.pos == self.input.len()
    }
}

/// Adaptive frequency model with integer cumulative frequencies
#[derive(Debug, Clone)]
pub(crate) struct AdaptiveModel {
    /// `cum_freqs[0] = 0`, `cum_freqs[n] = total`
    cum_freqs: Vec<u32>,
    total: u32,
}

impl AdaptiveModel {
    pub(crate) fn new(num_symbols: usize) -> Self {
        let num_symbols = num_symbols.max(1);
        let cum_freqs: Vec<u32> = (0..=num_symbols).map(|i| i as u32).collect();
        Self {
            cum_freqs,
            total: num_symbols as u32,
        }
    }

    #[inline]
    fn encode_params(&self, symbol: usize) -> (u32, u32, u32) {
        let cum = self.cum_freqs[symbol];
        let freq = self.cum_freqs[symbol + 1] - cum;
        (cum, freq, self.total)
    }

    #[inline]
    fn update(&mut self, symbol: usize) {
        for c in &mut self.cum_freqs[symbol + 1..] {
            *c += MODEL_INCREMENT;
        }
        self.total += MODEL_INCREMENT;
        if self.total >= RESCALE_THRESHOLD {
            self.rescale();
        }
    }

    /// Halves every frequency, keeping each symbol codable
    fn rescale(&mut self) {
        let mut cum = 0u32;
        let mut previous = 0u32;
        for c in self.cum_freqs.iter_mut().skip(1) {
            let freq = *c - previous;
            previous = *c;
            cum += (freq >> 1).max(1);
            *c = cum;
        }
        self.total = cum;
    }
}

/// A set of adaptive models addressed by a context key
#[derive(Debug, Clone)]
pub(crate) struct ContextModels {
    models: Vec<AdaptiveModel>,
}

impl ContextModels {
    /// One model per context, each with its own alphabet size
    pub(crate) fn new<I: IntoIterator<Item = usize>>(alphabet_sizes: I) -> Self {
        Self {
            models: alphabet_sizes.into_iter().map(AdaptiveModel::new).collect(),
        }
    }

    pub(crate) fn get_mut(&mut self, context: usize) -> Option<&mut AdaptiveModel> {
        self.models.get_mut(context)
    }
}
