//! Genome tiling and binned strand-specific read counting

use crate::{
    bam::{AlignmentSource, Contig, ReadRecord},
    utils::chunk_work,
    CountConfig, GenomicBin, InvertypeError, InvertypeResult, StrandCounts,
};
use rayon::prelude::*;
use std::collections::HashSet;

/// Strand counts for every bin of the selected contigs, in genome order
#[derive(Debug, Clone, Default)]
pub struct BinnedCounts {
    pub contigs: Vec<Contig>,
    pub bins: Vec<GenomicBin>,
    pub counts: Vec<StrandCounts>,
}

impl BinnedCounts {
    pub fn total_reads(&self) -> u64 {
        self.counts.iter().map(|c| c.total()).sum()
    }

    /// Reverse fractions of all bins with at least one read
    pub fn reverse_fractions(&self) -> Vec<f64> {
        self.counts
            .iter()
            .filter_map(|c| c.reverse_fraction())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GenomicBin, &StrandCounts)> {
        self.bins.iter().zip(self.counts.iter())
    }

    fn extend(&mut self, contig: Contig, bins: Vec<GenomicBin>, counts: Vec<StrandCounts>) {
        debug_assert_eq!(bins.len(), counts.len());
        self.contigs.push(contig);
        self.bins.extend(bins);
        self.counts.extend(counts);
    }
}

/// Validate counting parameters
pub fn validate_count_config(config: &CountConfig) -> InvertypeResult<()> {
    if config.bin_width == 0 {
        return Err(InvertypeError::InvalidConfig(
            "bin width must be greater than 0".to_string(),
        ));
    }

    match &config.contigs {
        Some(contigs) if contigs.is_empty() => Err(InvertypeError::InvalidConfig(
            "contig list must not be empty".to_string(),
        )),
        Some(contigs) => {
            let mut seen = HashSet::new();
            match contigs.iter().find(|name| !seen.insert(name.as_str())) {
                Some(name) => Err(InvertypeError::InvalidConfig(format!(
                    "contig {} is listed more than once",
                    name
                ))),
                None => Ok(()),
            }
        }
        None if config.n_contigs == 0 => Err(InvertypeError::InvalidConfig(
            "number of contigs must be greater than 0".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Pick the contigs to count: an explicit list, or the first `n_contigs` in header order
pub fn select_contigs(
    available: &[Contig],
    config: &CountConfig,
) -> InvertypeResult<Vec<Contig>> {
    match &config.contigs {
        Some(names) => names
            .iter()
            .map(|name| {
                available
                    .iter()
                    .find(|c| &c.name == name)
                    .cloned()
                    .ok_or_else(|| {
                        InvertypeError::Input(format!(
                            "contig {} not present in alignment header",
                            name
                        ))
                    })
            })
            .collect(),
        None => {
            if available.len() < config.n_contigs {
                return Err(InvertypeError::Input(format!(
                    "expected at least {} contigs in alignment header, found {}",
                    config.n_contigs,
                    available.len()
                )));
            }
            Ok(available[..config.n_contigs].to_vec())
        }
    }
}

/// Tile a contig into [start, end) bins of `bin_width`; the last bin may be shorter
pub fn tile_contig(contig: &Contig, bin_width: u64) -> Vec<GenomicBin> {
    debug_assert!(bin_width > 0);
    let total_bins = contig.length.div_ceil(bin_width);

    (0..total_bins)
        .map(|bin| {
            let start = bin * bin_width;
            let end = (start + bin_width).min(contig.length);
            GenomicBin::new(contig.name.clone(), start, end)
        })
        .collect()
}

/// Count qualifying reads per bin on one contig
pub fn count_contig<S: AlignmentSource>(
    source: &mut S,
    contig: &Contig,
    config: &CountConfig,
) -> InvertypeResult<(Vec<GenomicBin>, Vec<StrandCounts>)> {
    let bins = tile_contig(contig, config.bin_width);
    let mut counts = vec![StrandCounts::default(); bins.len()];

    if bins.is_empty() {
        return Ok((bins, counts));
    }

    let mut rejected = 0u64;
    source.visit_region(&contig.name, 0, contig.length, &mut |read: &ReadRecord| {
        let index = (read.five_prime / config.bin_width) as usize;
        match counts.get_mut(index) {
            Some(bin_counts) => {
                if !config.pairing.tally(read, config.min_mapq, bin_counts) {
                    rejected += 1;
                }
            }
            None => rejected += 1,
        }
    })?;

    let total: u64 = counts.iter().map(|c| c.total()).sum();
    if total == 0 {
        log::warn!("No qualifying reads on contig {}", contig.name);
    }
    log::debug!(
        "Contig {}: {} bins, {} reads counted, {} filtered",
        contig.name,
        bins.len(),
        total,
        rejected
    );

    Ok((bins, counts))
}

/// Count strand-specific reads in fixed-width bins across the selected contigs.
///
/// `open` is called once to read the header and once per worker, so each worker
/// holds its own read-only handle. Per-contig results are merged in contig order.
pub fn count_bins<S, F>(
    open: F,
    config: &CountConfig,
    num_processes: usize,
) -> InvertypeResult<BinnedCounts>
where
    S: AlignmentSource,
    F: Fn() -> InvertypeResult<S> + Sync,
{
    validate_count_config(config)?;

    let contigs = select_contigs(&open()?.contigs(), config)?;
    log::info!(
        "Counting reads in {} bp bins over {} contigs",
        config.bin_width,
        contigs.len()
    );

    let chunks = chunk_work(contigs, num_processes.max(1));

    let chunk_results: InvertypeResult<Vec<Vec<_>>> = chunks
        .into_par_iter()
        .map(|chunk| {
            let mut source = open()?;
            chunk
                .into_iter()
                .map(|contig| {
                    let (bins, counts) = count_contig(&mut source, &contig, config)?;
                    Ok((contig, bins, counts))
                })
                .collect::<InvertypeResult<Vec<_>>>()
        })
        .collect();

    let mut binned = BinnedCounts::default();
    for (contig, bins, counts) in chunk_results?.into_iter().flatten() {
        binned.extend(contig, bins, counts);
    }

    log::info!(
        "Counted {} reads in {} bins",
        binned.total_reads(),
        binned.bins.len()
    );

    Ok(binned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bam::{
        mock::{write_bam, MemorySource},
        BamSource, PairingMode,
    };
    use tempfile::tempdir;

    fn contigs(n: usize, length: u64) -> Vec<Contig> {
        (1..=n)
            .map(|i| Contig::new(format!("chr{}", i), length))
            .collect()
    }

    #[test]
    fn test_tile_contig_even() {
        let contig = Contig::new("chr1".into(), 1000);
        let bins = tile_contig(&contig, 100);

        assert_eq!(bins.len(), 10);
        assert_eq!(bins[0].start, 0);
        assert_eq!(bins.last().unwrap().end, 1000);
        for pair in bins.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert_eq!(pair[0].len(), 100);
        }
    }

    #[test]
    fn test_tile_contig_short_last_bin() {
        let contig = Contig::new("chr1".into(), 1050);
        let bins = tile_contig(&contig, 100);

        assert_eq!(bins.len(), 11);
        assert_eq!(bins[10], GenomicBin::new("chr1".into(), 1000, 1050));
        let covered: u64 = bins.iter().map(|b| b.len()).sum();
        assert_eq!(covered, 1050);
    }

    #[test]
    fn test_tile_empty_contig() {
        let contig = Contig::new("chrUn".into(), 0);
        assert!(tile_contig(&contig, 100).is_empty());
    }

    #[test]
    fn test_select_first_contigs() {
        let available = contigs(24, 100);
        let config = CountConfig::default();

        let selected = select_contigs(&available, &config).unwrap();
        assert_eq!(selected.len(), 22);
        assert_eq!(selected[21].name, "chr22");
    }

    #[test]
    fn test_select_too_few_contigs() {
        let available = contigs(5, 100);
        let result = select_contigs(&available, &CountConfig::default());
        assert!(matches!(result, Err(InvertypeError::Input(_))));
    }

    #[test]
    fn test_select_explicit_contigs() {
        let available = contigs(3, 100);
        let config = CountConfig {
            contigs: Some(vec!["chr3".into(), "chr1".into()]),
            ..CountConfig::default()
        };
        let selected = select_contigs(&available, &config).unwrap();
        assert_eq!(selected[0].name, "chr3");
        assert_eq!(selected[1].name, "chr1");

        let missing = CountConfig {
            contigs: Some(vec!["chrX".into()]),
            ..CountConfig::default()
        };
        assert!(select_contigs(&available, &missing).is_err());
    }

    #[test]
    fn test_validate_count_config() {
        assert!(validate_count_config(&CountConfig::default()).is_ok());
        let zero_width = CountConfig {
            bin_width: 0,
            ..CountConfig::default()
        };
        assert!(validate_count_config(&zero_width).is_err());
    }

    #[test]
    fn test_duplicate_contigs_are_rejected() {
        let duplicated = CountConfig {
            contigs: Some(vec!["chr1".into(), "chr2".into(), "chr1".into()]),
            ..CountConfig::default()
        };
        match validate_count_config(&duplicated) {
            Err(InvertypeError::InvalidConfig(msg)) => assert!(msg.contains("chr1")),
            other => panic!("Expected InvalidConfig, got {:?}", other),
        }

        let open =
            || Ok::<_, InvertypeError>(MemorySource::new(vec![("chr1", 100), ("chr2", 100)]));
        assert!(count_bins(open, &duplicated, 1).is_err());
    }

    #[test]
    fn test_count_contig_exact() {
        let mut source = MemorySource::new(vec![("chr1", 300)]);
        source.fill("chr1", 0, 100, 7, 3);
        source.fill("chr1", 200, 300, 1, 9);

        let config = CountConfig {
            bin_width: 100,
            ..CountConfig::default()
        };
        let contig = Contig::new("chr1".into(), 300);
        let (bins, counts) = count_contig(&mut source, &contig, &config).unwrap();

        assert_eq!(bins.len(), 3);
        assert_eq!(counts[0], StrandCounts::new(7, 3));
        assert_eq!(counts[1], StrandCounts::new(0, 0));
        assert_eq!(counts[2], StrandCounts::new(1, 9));
    }

    #[test]
    fn test_count_contig_applies_filter() {
        let mut source = MemorySource::new(vec![("chr1", 100)]);
        source.push("chr1", MemorySource::good_read(10, false));
        source.push(
            "chr1",
            ReadRecord {
                is_duplicate: true,
                ..MemorySource::good_read(11, false)
            },
        );
        source.push(
            "chr1",
            ReadRecord {
                is_first_in_template: false,
                ..MemorySource::good_read(12, true)
            },
        );

        let config = CountConfig {
            bin_width: 50,
            pairing: PairingMode::Paired,
            ..CountConfig::default()
        };
        let contig = Contig::new("chr1".into(), 100);
        let (_, counts) = count_contig(&mut source, &contig, &config).unwrap();
        assert_eq!(counts[0], StrandCounts::new(1, 0));
    }

    #[test]
    fn test_count_bins_merges_in_contig_order() {
        let build = || {
            let mut source =
                MemorySource::new(vec![("chr1", 200), ("chr2", 100), ("chr3", 100)]);
            source.fill("chr1", 0, 100, 5, 0);
            source.fill("chr2", 0, 100, 0, 4);
            source.fill("chr3", 0, 100, 2, 2);
            Ok::<_, InvertypeError>(source)
        };

        let config = CountConfig {
            bin_width: 100,
            n_contigs: 2,
            ..CountConfig::default()
        };

        let single = count_bins(build, &config, 1).unwrap();
        let parallel = count_bins(build, &config, 4).unwrap();

        assert_eq!(single.bins, parallel.bins);
        assert_eq!(single.counts, parallel.counts);
        assert_eq!(single.contigs.len(), 2);
        assert_eq!(single.bins.len(), 3);
        assert_eq!(single.counts[0], StrandCounts::new(5, 0));
        assert_eq!(single.counts[2], StrandCounts::new(0, 4));
        assert_eq!(single.total_reads(), 9);
        assert_eq!(single.reverse_fractions(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_count_bins_from_bam_uses_five_prime_end() {
        let dir = tempdir().unwrap();
        let bam_path = dir.path().join("composite.bam");
        // 5' ends: 10, 104 (reverse, aligned to [95, 105)), 150, 199, 204
        write_bam(
            &bam_path,
            &[(10, false), (95, true), (150, false), (190, true), (195, true)],
        )
        .unwrap();

        let config = CountConfig {
            bin_width: 100,
            contigs: Some(vec!["chr1".into()]),
            ..CountConfig::default()
        };
        let binned = count_bins(|| BamSource::open(&bam_path), &config, 2).unwrap();

        assert_eq!(binned.bins.len(), 3);
        assert_eq!(binned.counts[0], StrandCounts::new(1, 0));
        assert_eq!(binned.counts[1], StrandCounts::new(1, 2));
        assert_eq!(binned.counts[2], StrandCounts::new(0, 1));
        assert_eq!(binned.total_reads(), 5);
    }
}
