//! # InvertypeR - Strand-seq inversion genotyping
//!
//! A Rust implementation of the InvertypeR genotyping core: strand-specific read
//! counting over composite Strand-seq alignments, background-rate estimation, and
//! Bayesian genotyping of candidate inversion intervals.

pub mod background;
pub mod bam;
pub mod bins;
pub mod density;
pub mod genotype;
pub mod io;
pub mod utils;

use crate::bam::PairingMode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open genomic bin [start, end) on one contig
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenomicBin {
    pub contig: String,
    pub start: u64,
    pub end: u64,
}

impl GenomicBin {
    pub fn new(contig: String, start: u64, end: u64) -> Self {
        Self { contig, start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Forward and reverse read counts for a bin or interval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrandCounts {
    pub forward: u64,
    pub reverse: u64,
}

impl StrandCounts {
    pub fn new(forward: u64, reverse: u64) -> Self {
        Self { forward, reverse }
    }

    pub fn add_forward(&mut self) {
        self.forward += 1;
    }

    pub fn add_reverse(&mut self) {
        self.reverse += 1;
    }

    pub fn total(&self) -> u64 {
        self.forward + self.reverse
    }

    /// Fraction of reverse-strand reads, undefined for an empty bin
    pub fn reverse_fraction(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.reverse as f64 / total as f64),
        }
    }
}

/// Dominant strand state of a WW/CC composite file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseState {
    WW,
    CC,
}

impl fmt::Display for BaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseState::WW => write!(f, "WW"),
            BaseState::CC => write!(f, "CC"),
        }
    }
}

/// Background contamination and base strand state of one composite file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundEstimate {
    /// Always folded to the value <= 0.5
    pub background_rate: f64,
    pub base_state: BaseState,
    pub total_reads: u64,
}

/// Inversion genotype classes.
///
/// [`Genotype::PRIORITY`] doubles as the tie-breaking order for MAP calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Genotype {
    Normal,
    HetInverted,
    HomInverted,
}

impl Genotype {
    pub const PRIORITY: [Genotype; 3] = [
        Genotype::Normal,
        Genotype::HetInverted,
        Genotype::HomInverted,
    ];

    pub fn index(self) -> usize {
        match self {
            Genotype::Normal => 0,
            Genotype::HetInverted => 1,
            Genotype::HomInverted => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Genotype::Normal => "0|0",
            Genotype::HetInverted => "0|1",
            Genotype::HomInverted => "1|1",
        }
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prior weights over genotype classes, indexed by [`Genotype::index`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenotypePrior {
    weights: [f64; 3],
}

impl GenotypePrior {
    const SUM_TOLERANCE: f64 = 1e-6;

    pub fn new(normal: f64, het_inverted: f64, hom_inverted: f64) -> InvertypeResult<Self> {
        let weights = [normal, het_inverted, hom_inverted];

        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(InvertypeError::Input(format!(
                "prior weights must be finite and non-negative, got {:?}",
                weights
            )));
        }

        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > Self::SUM_TOLERANCE {
            return Err(InvertypeError::Input(format!(
                "prior weights must sum to 1, got {} (sum {})",
                weights
                    .iter()
                    .map(|w| w.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
                sum
            )));
        }

        Ok(Self { weights })
    }

    /// Build a prior from a slice ordered normal, heterozygous, homozygous
    pub fn from_slice(weights: &[f64]) -> InvertypeResult<Self> {
        match weights {
            [normal, het, hom] => Self::new(*normal, *het, *hom),
            _ => Err(InvertypeError::Input(format!(
                "prior needs exactly 3 weights (normal, heterozygous, homozygous), got {}",
                weights.len()
            ))),
        }
    }

    pub fn weight(&self, genotype: Genotype) -> f64 {
        self.weights[genotype.index()]
    }

    pub fn weights(&self) -> [f64; 3] {
        self.weights
    }
}

impl Default for GenotypePrior {
    fn default() -> Self {
        Self {
            weights: [1.0 / 3.0; 3],
        }
    }
}

/// A candidate interval to genotype, 0-based half-open
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub contig: String,
    pub start: u64,
    pub end: u64,
    pub name: Option<String>,
}

impl Interval {
    pub fn new(contig: String, start: u64, end: u64) -> Self {
        Self {
            contig,
            start,
            end,
            name: None,
        }
    }

    pub fn with_name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.contig, self.start, self.end)
    }
}

/// Genotype call for one interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalCall {
    pub interval: Interval,
    /// Posterior probabilities indexed by [`Genotype::index`]
    pub posterior: [f64; 3],
    pub genotype: Genotype,
    pub probability: f64,
    pub ww_counts: Option<StrandCounts>,
    pub wc_counts: Option<StrandCounts>,
    pub confident: bool,
}

impl IntervalCall {
    pub fn posterior_of(&self, genotype: Genotype) -> f64 {
        self.posterior[genotype.index()]
    }
}

/// Configuration for strand-specific read counting
#[derive(Debug, Clone)]
pub struct CountConfig {
    pub bin_width: u64,
    pub pairing: PairingMode,
    /// Number of leading reference contigs to use (the autosomes)
    pub n_contigs: usize,
    /// Explicit contig names, overriding `n_contigs`
    pub contigs: Option<Vec<String>>,
    /// Reads need a mapping quality strictly above this
    pub min_mapq: u8,
}

impl Default for CountConfig {
    fn default() -> Self {
        Self {
            bin_width: 1_000_000,
            pairing: PairingMode::Paired,
            n_contigs: 22,
            contigs: None,
            min_mapq: 10,
        }
    }
}

/// Configuration for the Bayesian interval genotyper
#[derive(Debug, Clone)]
pub struct GenotypeConfig {
    pub prior: GenotypePrior,
    /// Share of inverted-orientation reads expected in a heterozygous interval
    pub het_inverted_weight: f64,
    /// Background of the WC composite; the WW estimate is used when unset
    pub wc_background: Option<f64>,
    pub posterior_cutoff: f64,
}

impl Default for GenotypeConfig {
    fn default() -> Self {
        Self {
            prior: GenotypePrior::default(),
            het_inverted_weight: 0.5,
            wc_background: None,
            posterior_cutoff: 0.95,
        }
    }
}

/// Error types for the InvertypeR library
#[derive(Debug, thiserror::Error)]
pub enum InvertypeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTSlib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Composite data error: {0}")]
    Data(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl InvertypeError {
    /// Whether the error belongs to the input class (bad files, intervals, priors or settings)
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            InvertypeError::Input(_)
                | InvertypeError::FileNotFound(_)
                | InvertypeError::InvalidConfig(_)
                | InvertypeError::Htslib(_)
                | InvertypeError::Csv(_)
        )
    }
}

pub type InvertypeResult<T> = Result<T, InvertypeError>;
