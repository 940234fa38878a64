//! CLI binary for vetting a WW/CC composite: bins its reads and reports background and base state

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use invertyper_rs::{
    background::estimate_background,
    bam::{BamSource, PairingMode},
    bins::{count_bins, BinnedCounts},
    utils::{ensure_parent_dirs, get_num_cpus, validate_file_readable, Timer},
    CountConfig,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "strand_background")]
#[command(about = "Estimate background rate and base strand state of a WW/CC composite BAM")]
struct Args {
    /// Composite BAM file (indexed)
    #[arg(long, value_name = "FILE")]
    bam: PathBuf,

    /// Optional TSV of per-bin strand counts
    #[arg(long, value_name = "FILE")]
    bins_output: Option<PathBuf>,

    /// Bin width in bases
    #[arg(long, default_value_t = 1_000_000)]
    bin_width: u64,

    /// Count single-end reads instead of first mates of proper pairs
    #[arg(long)]
    unpaired: bool,

    /// Number of leading reference contigs to use
    #[arg(long, default_value_t = 22)]
    n_contigs: usize,

    /// Comma-separated contig names, overriding --n-contigs
    #[arg(long, value_delimiter = ',')]
    contigs: Option<Vec<String>>,

    /// Reads need a mapping quality above this value
    #[arg(long, default_value_t = 10)]
    min_mapq: u8,

    /// Number of processes to use for parallel processing
    #[arg(long, default_value_t = get_num_cpus())]
    num_processes: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn write_bins(binned: &BinnedCounts, path: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    writer.write_record(["chrom", "start", "end", "forward", "reverse"])?;
    for (bin, counts) in binned.iter() {
        writer.write_record([
            bin.contig.clone(),
            bin.start.to_string(),
            bin.end.to_string(),
            counts.forward.to_string(),
            counts.reverse.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();

    validate_file_readable(&args.bam).with_context(|| format!("checking {}", args.bam.display()))?;

    let config = CountConfig {
        bin_width: args.bin_width,
        pairing: if args.unpaired {
            PairingMode::Unpaired
        } else {
            PairingMode::Paired
        },
        n_contigs: args.n_contigs,
        contigs: args.contigs.clone(),
        min_mapq: args.min_mapq,
    };

    let binned = {
        let _timer = Timer::new("Counting composite bins");
        count_bins(|| BamSource::open(&args.bam), &config, args.num_processes)
            .with_context(|| format!("counting reads in {}", args.bam.display()))?
    };

    if let Some(path) = &args.bins_output {
        ensure_parent_dirs(path)?;
        write_bins(&binned, path)?;
        log::info!("Per-bin counts written to: {:?}", path);
    }

    let estimate = estimate_background(&binned)
        .with_context(|| format!("estimating background of {}", args.bam.display()))?;

    println!("base_state\tbackground\ttotal_reads");
    println!(
        "{}\t{:.6}\t{}",
        estimate.base_state, estimate.background_rate, estimate.total_reads
    );

    Ok(())
}
