use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use pileq::{
    CodecConfigBuilder, Decoder, Encoder, FallbackQuantizer, ReferenceSet, SamReader,
    DEFAULT_BLOCK_SIZE, DEFAULT_NUM_QUANTIZERS, DEFAULT_POLYPLOIDY, DEFAULT_QV_MAX,
    DEFAULT_QV_MIN, DEFAULT_QV_OFFSET, FILE_EXTENSION,
};

#[derive(Parser)]
#[command(name = "pileq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pileup-adaptive compression of aligned quality values", long_about = None)]
struct Cli {
    /// Input file: SAM when compressing, pq when decompressing
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file [default: <INPUT>.pq, or <INPUT> without .pq plus .qual]
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Number of records per block
    #[arg(short, long = "blocksz", value_name = "N", default_value_t = DEFAULT_BLOCK_SIZE, conflicts_with = "decompress")]
    block_size: usize,

    /// Decompress
    #[arg(short, long)]
    decompress: bool,

    /// Overwrite an existing output file
    #[arg(short, long)]
    force: bool,

    /// Log compression statistics
    #[arg(short, long)]
    stats: bool,

    /// Number of allele copies per genotype
    #[arg(short, long, default_value_t = DEFAULT_POLYPLOIDY)]
    polyploidy: usize,

    /// Number of quantizers
    #[arg(short = 'q', long = "quantizers", default_value_t = DEFAULT_NUM_QUANTIZERS)]
    num_quantizers: usize,

    /// Smallest quality value
    #[arg(long, default_value_t = DEFAULT_QV_MIN)]
    qv_min: i32,

    /// Largest quality value
    #[arg(long, default_value_t = DEFAULT_QV_MAX)]
    qv_max: i32,

    /// ASCII offset of quality characters
    #[arg(long, default_value_t = DEFAULT_QV_OFFSET)]
    qv_offset: i32,

    /// Quantizer for positions without coverage
    #[arg(long, value_enum, default_value = "finest")]
    fallback: CliFallback,

    /// Reference FASTA file(s) used to check the alignments
    #[arg(short, long = "reference", value_name = "FASTA")]
    references: Vec<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum CliFallback {
    /// Coarsest quantizer
    Coarsest,
    /// Finest quantizer
    Finest,
}
impl From<CliFallback> for FallbackQuantizer {
    fn from(value: CliFallback) -> Self {
        match value {
            CliFallback::Coarsest => Self::Coarsest,
            CliFallback::Finest => Self::Finest,
        }
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|ext| ext == extension)
}

/// Default output path: `<input>.pq`, or `<input>` without `.pq` plus `.qual`
fn default_output(input: &Path, decompress: bool) -> PathBuf {
    if decompress {
        input.with_extension("qual")
    } else {
        let mut name = input.as_os_str().to_owned();
        name.push(".");
        name.push(FILE_EXTENSION);
        PathBuf::from(name)
    }
}

fn compress(cli: &Cli, output: &Path) -> Result<()> {
    let config = CodecConfigBuilder::new()
        .block_size(cli.block_size)
        .polyploidy(cli.polyploidy)
        .num_quantizers(cli.num_quantizers)
        .qv_min(cli.qv_min)
        .qv_max(cli.qv_max)
        .qv_offset(cli.qv_offset)
        .fallback(cli.fallback.into())
        .build()?;

    let mut references = ReferenceSet::default();
    for path in &cli.references {
        references.extend_from_path(path)?;
    }

    let mut reader = SamReader::from_path(&cli.input)?;
    let handle = BufWriter::new(fs::File::create(output)?);
    let mut encoder = Encoder::new(handle, &config)?;
    encoder.set_references(references);
    encoder.encode(&mut reader)?;
    let (_, stats) = encoder.finish()?;

    info!(
        "Compressed {} records ({} mapped, {} unmapped) in {} blocks",
        reader.num_records(),
        reader.num_mapped(),
        reader.num_unmapped(),
        stats.num_blocks
    );
    if cli.stats {
        stats.report();
    }
    Ok(())
}

fn decompress(cli: &Cli, output: &Path) -> Result<()> {
    let handle = BufReader::new(fs::File::open(&cli.input)?);
    let mut decoder = Decoder::new(handle)?;
    let mut writer = BufWriter::new(fs::File::create(output)?);
    decoder.decode_to(&mut writer)?;

    let stats = decoder.stats();
    info!(
        "Decompressed {} records in {} blocks",
        stats.num_records(),
        stats.num_blocks
    );
    if cli.stats {
        stats.report();
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if !cli.input.is_file() {
        bail!("Input file {} does not exist", cli.input.display());
    }
    if cli.decompress && !has_extension(&cli.input, FILE_EXTENSION) {
        bail!(
            "Input file {} does not have the .{FILE_EXTENSION} extension",
            cli.input.display()
        );
    }
    if !cli.decompress && !has_extension(&cli.input, "sam") {
        bail!("Input file {} does not have the .sam extension", cli.input.display());
    }

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.input, cli.decompress));
    if output.exists() && !cli.force {
        bail!(
            "Output file {} already exists, use --force to overwrite",
            output.display()
        );
    }

    if cli.decompress {
        info!("Decompressing {} to {}", cli.input.display(), output.display());
        decompress(&cli, &output)?;
    } else {
        info!("Compressing {} to {}", cli.input.display(), output.display());
        compress(&cli, &output)?;
    }

    Ok(())
}
