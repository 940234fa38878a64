//! Combined CLI binary for InvertypeR - counts composite reads, estimates background and genotypes intervals

use clap::Parser;
use env_logger::Env;
use invertyper_rs::{
    background::estimate_background,
    bam::{AlignmentSource, BamSource, PairingMode},
    bins::{count_bins, select_contigs, validate_count_config},
    genotype::{
        count_intervals, genotype_intervals, validate_genotype_config, wc_model, CompositeCounts,
        CompositeModel,
    },
    io::{read_intervals, write_calls},
    utils::{ensure_parent_dirs, get_num_cpus, validate_file_readable, Timer},
    CountConfig, Genotype, GenotypeConfig, GenotypePrior, InvertypeError, InvertypeResult,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "invertyper")]
#[command(about = "InvertypeR - Bayesian inversion genotyping from Strand-seq composite files")]
#[command(long_about = "
InvertypeR genotypes candidate inversions using composite Strand-seq alignments:
1. Counts forward and reverse reads in fixed-width bins of the WW/CC composite
2. Estimates the composite's background rate and base strand state
3. Counts reads in every candidate interval of each composite
4. Computes posterior probabilities for 0|0, 0|1 and 1|1 and reports the MAP call

Either composite may be omitted, but at least one is required. BAM index files
(.bai) must be present next to each BAM file.

Output is a TSV file with one row per interval, gzip-compressed when the output
path ends in .gz.
")]
struct Args {
    /// WW/CC composite BAM file
    #[arg(long, value_name = "FILE")]
    ww_bam: Option<PathBuf>,

    /// WC/CW composite BAM file
    #[arg(long, value_name = "FILE")]
    wc_bam: Option<PathBuf>,

    /// Candidate intervals (BED: contig, start, end, optional name)
    #[arg(long, value_name = "FILE")]
    intervals: PathBuf,

    /// Path to the output TSV file
    #[arg(long, value_name = "FILE")]
    output: PathBuf,

    /// Bin width used for background estimation
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

    /// Prior weights for 0|0, 0|1 and 1|1, comma-separated
    #[arg(long, value_delimiter = ',')]
    prior: Option<Vec<f64>>,

    /// Share of inverted-orientation reads expected in heterozygous intervals
    #[arg(long, default_value_t = 0.5)]
    het_inverted_weight: f64,

    /// Background rate of the WC composite (defaults to the WW estimate)
    #[arg(long)]
    wc_background: Option<f64>,

    /// Posterior probability needed to flag a call as confident
    #[arg(long, default_value_t = 0.95)]
    posterior_cutoff: f64,

    /// Number of processes to use for parallel processing
    #[arg(long, default_value_t = get_num_cpus())]
    num_processes: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Force overwrite of output file if it exists
    #[arg(short, long)]
    force: bool,
}

fn count_config(args: &Args) -> CountConfig {
    CountConfig {
        bin_width: args.bin_width,
        pairing: if args.unpaired {
            PairingMode::Unpaired
        } else {
            PairingMode::Paired
        },
        n_contigs: args.n_contigs,
        contigs: args.contigs.clone(),
        min_mapq: args.min_mapq,
    }
}

fn genotype_config(args: &Args) -> InvertypeResult<GenotypeConfig> {
    let prior = match &args.prior {
        Some(weights) => GenotypePrior::from_slice(weights)?,
        None => GenotypePrior::default(),
    };

    Ok(GenotypeConfig {
        prior,
        het_inverted_weight: args.het_inverted_weight,
        wc_background: args.wc_background,
        posterior_cutoff: args.posterior_cutoff,
    })
}

fn run() -> InvertypeResult<()> {
    let args = Args::parse();

    // Initialize logging
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

    log::info!("Starting InvertypeR genotyping");
    log::info!("WW composite: {:?}", args.ww_bam);
    log::info!("WC composite: {:?}", args.wc_bam);
    log::info!("Intervals: {:?}", args.intervals);
    log::info!("Output: {:?}", args.output);
    log::info!("Number of processes: {}", args.num_processes);

    if args.ww_bam.is_none() && args.wc_bam.is_none() {
        return Err(InvertypeError::Input(
            "at least one of --ww-bam and --wc-bam is required".to_string(),
        ));
    }

    // Validate input files
    validate_file_readable(&args.intervals)?;
    for bam in args.ww_bam.iter().chain(args.wc_bam.iter()) {
        validate_file_readable(bam)?;
    }

    if args.output.exists() && !args.force {
        return Err(InvertypeError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("Output file {:?} already exists. Use --force to overwrite.", args.output),
        )));
    }
    ensure_parent_dirs(&args.output)?;

    let count_config = count_config(&args);
    let genotype_config = genotype_config(&args)?;
    validate_count_config(&count_config)?;
    validate_genotype_config(&genotype_config)?;

    log::info!(
        "Configuration: bin width={}, pairing={:?}, min MAPQ>{}, prior={:?}, het weight={}",
        count_config.bin_width,
        count_config.pairing,
        count_config.min_mapq,
        genotype_config.prior.weights(),
        genotype_config.het_inverted_weight
    );

    let intervals = {
        let _timer = Timer::new("Reading intervals");
        read_intervals(&args.intervals)?
    };
    log::info!("Read {} intervals", intervals.len());

    if intervals.is_empty() {
        log::warn!("No intervals found in the input file");
        write_calls(&[], &args.output)?;
        return Ok(());
    }

    // Step 1: WW/CC composite: background estimate, then interval counts
    let mut ww_estimate = None;
    let ww = match &args.ww_bam {
        Some(path) => {
            let open = || BamSource::open(path);

            let binned = {
                let _timer = Timer::new("Counting WW composite bins");
                count_bins(open, &count_config, args.num_processes)?
            };
            let estimate = estimate_background(&binned)?;
            log::info!(
                "WW composite: base state {}, background {:.4}, {} reads",
                estimate.base_state,
                estimate.background_rate,
                estimate.total_reads
            );
            ww_estimate = Some(estimate);

            let _timer = Timer::new("Counting WW composite intervals");
            let counts = count_intervals(
                open,
                &intervals,
                &binned.contigs,
                &count_config,
                args.num_processes,
            )?;
            Some(CompositeCounts {
                model: CompositeModel::from_estimate(
                    &estimate,
                    genotype_config.het_inverted_weight,
                ),
                counts,
            })
        }
        None => None,
    };

    // Step 2: WC/CW composite interval counts
    let wc = match &args.wc_bam {
        Some(path) => {
            let open = || BamSource::open(path);
            let model = wc_model(&genotype_config, ww_estimate.as_ref())?;
            let contigs = select_contigs(&open()?.contigs(), &count_config)?;

            let _timer = Timer::new("Counting WC composite intervals");
            let counts =
                count_intervals(open, &intervals, &contigs, &count_config, args.num_processes)?;
            Some(CompositeCounts { model, counts })
        }
        None => None,
    };

    // Step 3: genotype
    let calls = {
        let _timer = Timer::new("Genotyping intervals");
        genotype_intervals(&intervals, ww.as_ref(), wc.as_ref(), &genotype_config)?
    };

    log::info!("Genotype summary:");
    for genotype in Genotype::PRIORITY {
        let count = calls.iter().filter(|c| c.genotype == genotype).count();
        log::info!(
            "  {}: {} ({:.1}%)",
            genotype,
            count,
            (count as f64 / calls.len() as f64) * 100.0
        );
    }
    let confident = calls.iter().filter(|c| c.confident).count();
    log::info!(
        "  Confident calls (p >= {}): {}",
        genotype_config.posterior_cutoff,
        confident
    );

    let _timer = Timer::new("Writing results");
    write_calls(&calls, &args.output)?;
    log::info!("Results written to: {:?}", args.output);

    Ok(())
}

/// Handle application errors and provide user-friendly messages
fn handle_error(error: InvertypeError) -> ! {
    match error {
        InvertypeError::FileNotFound(path) => {
            eprintln!("Error: File not found: {}", path);
            eprintln!("Please check that the file exists and is readable.");
            eprintln!("For BAM files, ensure the index file (.bai) is present.");
        }
        InvertypeError::Input(msg) => {
            eprintln!("Error: Invalid input: {}", msg);
            eprintln!("Please check the interval file, the prior weights and the composite files.");
        }
        InvertypeError::Data(msg) => {
            eprintln!("Error: Composite file check failed: {}", msg);
            eprintln!("Please re-check how the composite file was constructed.");
        }
        InvertypeError::InvalidConfig(msg) => {
            eprintln!("Error: Invalid configuration: {}", msg);
            eprintln!("Please check the numeric options (bin width, weights, cutoffs).");
        }
        InvertypeError::Htslib(ref e) => {
            eprintln!("Error: BAM processing error: {}", e);
            eprintln!("Please check that your BAM file is valid and has an index (.bai) file.");
        }
        InvertypeError::Io(ref e) => {
            eprintln!("Error: I/O error: {}", e);
            eprintln!("Please check file permissions and disk space.");
        }
        InvertypeError::Csv(ref e) => {
            eprintln!("Error: Tabular data error: {}", e);
            eprintln!("Please check that the interval file is tab-separated.");
        }
    }
    std::process::exit(1);
}

fn main() {
    if let Err(e) = run() {
        handle_error(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec![
            "invertyper",
            "--ww-bam",
            "ww.bam",
            "--intervals",
            "inversions.bed",
            "--output",
            "calls.tsv",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_default_configs() {
        let args = parse(&[]);
        let count = count_config(&args);
        assert_eq!(count.bin_width, 1_000_000);
        assert_eq!(count.pairing, PairingMode::Paired);
        assert_eq!(count.n_contigs, 22);
        assert_eq!(count.min_mapq, 10);
        assert!(validate_count_config(&count).is_ok());

        let genotype = genotype_config(&args).unwrap();
        assert_eq!(genotype.prior, GenotypePrior::default());
        assert!(validate_genotype_config(&genotype).is_ok());
    }

    #[test]
    fn test_custom_configs() {
        let args = parse(&[
            "--unpaired",
            "--bin-width",
            "500000",
            "--contigs",
            "chr1,chr2",
            "--prior",
            "0.9,0.05,0.05",
            "--wc-background",
            "0.04",
        ]);
        let count = count_config(&args);
        assert_eq!(count.pairing, PairingMode::Unpaired);
        assert_eq!(count.bin_width, 500_000);
        assert_eq!(count.contigs, Some(vec!["chr1".to_string(), "chr2".to_string()]));

        let genotype = genotype_config(&args).unwrap();
        assert_eq!(genotype.prior.weight(Genotype::Normal), 0.9);
        assert_eq!(genotype.wc_background, Some(0.04));
    }

    #[test]
    fn test_malformed_prior() {
        let args = parse(&["--prior", "0.5,0.5,0.5"]);
        assert!(matches!(genotype_config(&args), Err(InvertypeError::Input(_))));
    }
}
