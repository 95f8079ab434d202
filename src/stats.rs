//! Compression statistics accumulated over a coding session

use std::time::{Duration, Instant};

use tracing::info;

/// Counters of one encoding or decoding session
///
/// Uncompressed sizes count one byte per quality value; compressed sizes count the
/// range coded payload bytes of the corresponding stream.
#[derive(Debug, Clone)]
pub struct CodecStats {
    pub num_blocks: usize,
    pub num_mapped_records: usize,
    pub num_unmapped_records: usize,

    pub uncompressed_mapped_bytes: u64,
    pub uncompressed_unmapped_bytes: u64,
    pub compressed_mapped_bytes: u64,
    pub compressed_unmapped_bytes: u64,

    /// Headers and the layout and quantizer index columns
    pub format_bytes: u64,

    start: Instant,
    elapsed: Option<Duration>,
}
impl Default for CodecStats {
    fn default() -> Self {
        Self {
            num_blocks: 0,
            num_mapped_records: 0,
            num_unmapped_records: 0,
            uncompressed_mapped_bytes: 0,
            uncompressed_unmapped_bytes: 0,
            compressed_mapped_bytes: 0,
            compressed_unmapped_bytes: 0,
            format_bytes: 0,
            start: Instant::now(),
            elapsed: None,
        }
    }
}
impl CodecStats {
    #[must_use]
    pub fn num_records(&self) -> usize {
        self.num_mapped_records + self.num_unmapped_records
    }

    #[must_use]
    pub fn uncompressed_bytes(&self) -> u64 {
        self.uncompressed_mapped_bytes + self.uncompressed_unmapped_bytes
    }

    /// Quality payloads only
    #[must_use]
    pub fn compressed_bytes(&self) -> u64 {
        self.compressed_mapped_bytes + self.compressed_unmapped_bytes
    }

    /// Everything written to the container
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.compressed_bytes() + self.format_bytes
    }

    /// Stops the clock; later calls keep the first measurement
    pub fn finish(&mut self) {
        self.elapsed.get_or_insert_with(|| self.start.elapsed());
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.start.elapsed())
    }

    /// Logs the full statistics block
    pub fn report(&self) {
        info!("Blocks:            {}", self.num_blocks);
        info!(
            "Records:           {} ({} mapped, {} unmapped)",
            self.num_records(),
            self.num_mapped_records,
            self.num_unmapped_records
        );
        info!("Mapped qualities:");
        log_stream(self.uncompressed_mapped_bytes, self.compressed_mapped_bytes);
        info!("Unmapped qualities:");
        log_stream(
            self.uncompressed_unmapped_bytes,
            self.compressed_unmapped_bytes,
        );
        info!("All qualities:");
        log_stream(self.uncompressed_bytes(), self.compressed_bytes());
        info!("Format overhead:   {} bytes", self.format_bytes);
        info!("Total written:     {} bytes", self.total_bytes());
        info!("Elapsed:           {:.2}s", self.elapsed().as_secs_f64());
    }
}

/// Ratio, factor and bits per quality value of one stream
fn log_stream(uncompressed: u64, compressed: u64) {
    info!("  uncompressed:    {uncompressed} bytes");
    info!("  compressed:      {compressed} bytes");
    if uncompressed == 0 {
        return;
    }
    let ratio = compressed as f64 / uncompressed as f64;
    info!("  ratio:           {:.2}%", 100.0 * ratio);
    if compressed > 0 {
        info!("  factor:          {:.2}x", 1.0 / ratio);
    }
    info!("  bits per value:  {:.3}", 8.0 * ratio);
}
