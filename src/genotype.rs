//! Bayesian genotyping of candidate inversion intervals

use crate::{
    bam::{AlignmentSource, Contig, ReadRecord},
    utils::chunk_work,
    BackgroundEstimate, BaseState, CountConfig, Genotype, GenotypeConfig, GenotypePrior, Interval,
    IntervalCall, InvertypeError, InvertypeResult, StrandCounts,
};
use rayon::prelude::*;
use statrs::distribution::{Binomial, Discrete};

/// Expected strand fractions are kept away from 0 and 1 so every count stays possible
pub const RATE_FLOOR: f64 = 1e-6;

/// Strand-fraction model of one composite file
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompositeModel {
    /// WW/CC composite: every cell contributes reads from the same strand
    Homozygous {
        background: f64,
        base_state: BaseState,
        het_inverted_weight: f64,
    },
    /// WC/CW composite: one homolog is read from each strand
    Heterozygous { background: f64 },
}

impl CompositeModel {
    pub fn from_estimate(estimate: &BackgroundEstimate, het_inverted_weight: f64) -> Self {
        CompositeModel::Homozygous {
            background: estimate.background_rate,
            base_state: estimate.base_state,
            het_inverted_weight,
        }
    }

    /// Log-likelihood of the observed counts for one genotype
    pub fn ln_likelihood(&self, counts: &StrandCounts, genotype: Genotype) -> InvertypeResult<f64> {
        match *self {
            CompositeModel::Homozygous {
                background,
                base_state,
                het_inverted_weight,
            } => {
                let normal = match base_state {
                    BaseState::WW => background,
                    BaseState::CC => 1.0 - background,
                };
                let rate = match genotype {
                    Genotype::Normal => normal,
                    Genotype::HomInverted => 1.0 - normal,
                    Genotype::HetInverted => {
                        (1.0 - het_inverted_weight) * normal + het_inverted_weight * (1.0 - normal)
                    }
                };
                ln_binomial(counts, rate)
            }
            CompositeModel::Heterozygous { background } => match genotype {
                Genotype::Normal | Genotype::HomInverted => ln_binomial(counts, 0.5),
                Genotype::HetInverted => {
                    // The inverted homolog makes the region look WW or CC
                    let as_ww = ln_binomial(counts, background)?;
                    let as_cc = ln_binomial(counts, 1.0 - background)?;
                    Ok(log_sum_exp(&[as_ww, as_cc]) + 0.5f64.ln())
                }
            },
        }
    }
}

/// Read counts for every interval in one composite, paired with its model
#[derive(Debug, Clone)]
pub struct CompositeCounts {
    pub model: CompositeModel,
    pub counts: Vec<StrandCounts>,
}

fn ln_binomial(counts: &StrandCounts, rate: f64) -> InvertypeResult<f64> {
    let rate = rate.clamp(RATE_FLOOR, 1.0 - RATE_FLOOR);
    let binomial = Binomial::new(rate, counts.total()).map_err(|e| {
        InvertypeError::InvalidConfig(format!("invalid binomial rate {}: {}", rate, e))
    })?;
    Ok(binomial.ln_pmf(counts.reverse))
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Validate genotyping parameters
pub fn validate_genotype_config(config: &GenotypeConfig) -> InvertypeResult<()> {
    let [normal, het, hom] = config.prior.weights();
    GenotypePrior::new(normal, het, hom)?;

    if !(0.0..=1.0).contains(&config.het_inverted_weight) {
        return Err(InvertypeError::InvalidConfig(
            "heterozygous inverted weight must be between 0 and 1".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.posterior_cutoff) {
        return Err(InvertypeError::InvalidConfig(
            "posterior cutoff must be between 0 and 1".to_string(),
        ));
    }

    if let Some(background) = config.wc_background {
        if !(0.0..=0.5).contains(&background) {
            return Err(InvertypeError::InvalidConfig(
                "WC background must be between 0 and 0.5".to_string(),
            ));
        }
    }

    Ok(())
}

/// Model for the WC composite, borrowing the WW background unless one is configured
pub fn wc_model(
    config: &GenotypeConfig,
    ww_estimate: Option<&BackgroundEstimate>,
) -> InvertypeResult<CompositeModel> {
    let background = config
        .wc_background
        .or_else(|| ww_estimate.map(|e| e.background_rate))
        .ok_or_else(|| {
            InvertypeError::InvalidConfig(
                "a WC background rate is required when no WW composite is given".to_string(),
            )
        })?;
    Ok(CompositeModel::Heterozygous { background })
}

/// Check that every interval is non-empty and lies inside a counted contig
pub fn validate_intervals(intervals: &[Interval], contigs: &[Contig]) -> InvertypeResult<()> {
    for interval in intervals {
        let contig = contigs
            .iter()
            .find(|c| c.name == interval.contig)
            .ok_or_else(|| {
                InvertypeError::Input(format!("interval {} is not on a counted contig", interval))
            })?;

        if interval.start >= interval.end {
            return Err(InvertypeError::Input(format!(
                "interval {} has start >= end",
                interval
            )));
        }

        if interval.end > contig.length {
            return Err(InvertypeError::Input(format!(
                "interval {} extends past the end of {} ({} bp)",
                interval, contig.name, contig.length
            )));
        }
    }
    Ok(())
}

/// Count qualifying reads whose 5' end falls inside the interval
pub fn count_interval<S: AlignmentSource>(
    source: &mut S,
    interval: &Interval,
    config: &CountConfig,
) -> InvertypeResult<StrandCounts> {
    let mut counts = StrandCounts::default();
    source.visit_region(&interval.contig, interval.start, interval.end, &mut |read: &ReadRecord| {
        if read.five_prime >= interval.start && read.five_prime < interval.end {
            config.pairing.tally(read, config.min_mapq, &mut counts);
        }
    })?;
    Ok(counts)
}

/// Count reads for every interval, in input order.
///
/// Intervals are validated up front; a single bad interval fails the whole batch.
pub fn count_intervals<S, F>(
    open: F,
    intervals: &[Interval],
    contigs: &[Contig],
    config: &CountConfig,
    num_processes: usize,
) -> InvertypeResult<Vec<StrandCounts>>
where
    S: AlignmentSource,
    F: Fn() -> InvertypeResult<S> + Sync,
{
    validate_intervals(intervals, contigs)?;
    if intervals.is_empty() {
        return Ok(Vec::new());
    }

    let chunks = chunk_work(intervals.to_vec(), num_processes.max(1));

    let chunk_results: InvertypeResult<Vec<Vec<StrandCounts>>> = chunks
        .into_par_iter()
        .map(|chunk| {
            let mut source = open()?;
            chunk
                .iter()
                .map(|interval| count_interval(&mut source, interval, config))
                .collect::<InvertypeResult<Vec<_>>>()
        })
        .collect();

    Ok(chunk_results?.into_iter().flatten().collect())
}

/// Normalise prior-weighted log-likelihoods into a posterior distribution
pub fn posterior(ln_likelihoods: [f64; 3], prior: &GenotypePrior) -> [f64; 3] {
    let mut ln_joint = [f64::NEG_INFINITY; 3];
    for genotype in Genotype::PRIORITY {
        let i = genotype.index();
        ln_joint[i] = prior.weight(genotype).ln() + ln_likelihoods[i];
    }

    let ln_evidence = log_sum_exp(&ln_joint);
    if !ln_evidence.is_finite() {
        return prior.weights();
    }
    ln_joint.map(|v| (v - ln_evidence).exp())
}

/// MAP genotype; exact ties go to the earlier class in [`Genotype::PRIORITY`]
pub fn map_genotype(posterior: &[f64; 3]) -> (Genotype, f64) {
    let mut best = Genotype::PRIORITY[0];
    for genotype in &Genotype::PRIORITY[1..] {
        if posterior[genotype.index()] > posterior[best.index()] {
            best = *genotype;
        }
    }
    (best, posterior[best.index()])
}

/// Genotype one interval from its counts in each supplied composite
pub fn genotype_interval(
    interval: &Interval,
    ww: Option<(&CompositeModel, StrandCounts)>,
    wc: Option<(&CompositeModel, StrandCounts)>,
    config: &GenotypeConfig,
) -> InvertypeResult<IntervalCall> {
    let mut ln_likelihoods = [0.0; 3];
    for (model, counts) in ww.iter().chain(wc.iter()) {
        for genotype in Genotype::PRIORITY {
            ln_likelihoods[genotype.index()] += model.ln_likelihood(counts, genotype)?;
        }
    }

    let posterior = posterior(ln_likelihoods, &config.prior);
    let (genotype, probability) = map_genotype(&posterior);

    log::debug!(
        "{}: {} (p={:.4}) posterior {:?}",
        interval,
        genotype,
        probability,
        posterior
    );

    Ok(IntervalCall {
        interval: interval.clone(),
        posterior,
        genotype,
        probability,
        ww_counts: ww.map(|(_, c)| c),
        wc_counts: wc.map(|(_, c)| c),
        confident: probability >= config.posterior_cutoff,
    })
}

/// Genotype every interval, producing one call per interval in input order
pub fn genotype_intervals(
    intervals: &[Interval],
    ww: Option<&CompositeCounts>,
    wc: Option<&CompositeCounts>,
    config: &GenotypeConfig,
) -> InvertypeResult<Vec<IntervalCall>> {
    validate_genotype_config(config)?;

    if ww.is_none() && wc.is_none() {
        return Err(InvertypeError::Input(
            "at least one of the WW and WC composites is required".to_string(),
        ));
    }

    for composite in ww.iter().chain(wc.iter()) {
        if composite.counts.len() != intervals.len() {
            return Err(InvertypeError::Input(format!(
                "got {} interval counts for {} intervals",
                composite.counts.len(),
                intervals.len()
            )));
        }
    }

    let calls = intervals
        .iter()
        .enumerate()
        .map(|(i, interval)| {
            genotype_interval(
                interval,
                ww.map(|c| (&c.model, c.counts[i])),
                wc.map(|c| (&c.model, c.counts[i])),
                config,
            )
        })
        .collect::<InvertypeResult<Vec<_>>>()?;

    let inverted = calls.iter().filter(|c| c.genotype != Genotype::Normal).count();
    log::info!(
        "Genotyped {} intervals, {} inverted or heterozygous",
        calls.len(),
        inverted
    );

    Ok(calls)
}
