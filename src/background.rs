//! Background-rate and base strand-state estimation for WW/CC composites

use crate::{
    bins::BinnedCounts,
    density::{GaussianKde, ModeFinder},
    BackgroundEstimate, BaseState, InvertypeError, InvertypeResult, StrandCounts,
};

/// Modes below this are WW, above `1 - WW_MODE_LIMIT` are CC
pub const WW_MODE_LIMIT: f64 = 0.1;

/// Modes strictly inside (WC_MODE_LOW, WC_MODE_HIGH) indicate a WC/CW composite
pub const WC_MODE_LOW: f64 = 0.3;
pub const WC_MODE_HIGH: f64 = 0.7;

/// Map the raw density mode of per-bin reverse fractions to a base state and background
pub fn classify_mode(mode: f64) -> InvertypeResult<(BaseState, f64)> {
    if mode < WW_MODE_LIMIT {
        Ok((BaseState::WW, mode))
    } else if mode > 1.0 - WW_MODE_LIMIT {
        Ok((BaseState::CC, 1.0 - mode))
    } else if mode > WC_MODE_LOW && mode < WC_MODE_HIGH {
        Err(InvertypeError::Data(format!(
            "input file appears to be WC/CW, not WW/CC (reverse-read mode {:.4})",
            mode
        )))
    } else {
        Err(InvertypeError::Data(format!(
            "input file has >10% background (reverse-read mode {:.4})",
            mode
        )))
    }
}

/// Estimate background from per-bin strand counts with an arbitrary mode finder
pub fn estimate_from_counts<M: ModeFinder>(
    counts: &[StrandCounts],
    mode_finder: &M,
) -> InvertypeResult<BackgroundEstimate> {
    let total_reads: u64 = counts.iter().map(|c| c.total()).sum();
    let fractions: Vec<f64> = counts.iter().filter_map(|c| c.reverse_fraction()).collect();

    log::debug!(
        "{} of {} bins covered, {} reads",
        fractions.len(),
        counts.len(),
        total_reads
    );

    // The grid can extend past the unit interval
    let mode = mode_finder.mode(&fractions)?.clamp(0.0, 1.0);
    let (base_state, background_rate) = classify_mode(mode)?;

    debug_assert!(background_rate <= 0.5);
    debug_assert!((background_rate - mode.min(1.0 - mode)).abs() < 1e-12);

    log::info!(
        "Base state {}, background {:.4} ({} reads)",
        base_state,
        background_rate,
        total_reads
    );

    Ok(BackgroundEstimate {
        background_rate,
        base_state,
        total_reads,
    })
}

/// Estimate background and base state of a WW/CC composite using a Gaussian KDE
pub fn estimate_background(binned: &BinnedCounts) -> InvertypeResult<BackgroundEstimate> {
    estimate_from_counts(&binned.counts, &GaussianKde::default())
}
