//! Kernel density estimation and mode finding

use crate::{InvertypeError, InvertypeResult};

/// Finds the location of maximum density of a continuous sample
pub trait ModeFinder {
    fn mode(&self, sample: &[f64]) -> InvertypeResult<f64>;
}

/// Gaussian kernel density estimate evaluated on a regular grid.
///
/// Bandwidth follows Silverman's rule of thumb, `0.9 * min(sd, IQR / 1.34) * n^(-1/5)`.
/// The grid spans `cut` bandwidths beyond the sample range on each side, and the
/// mode is the first grid point of maximal density, so results depend only on the
/// sample and these two settings.
#[derive(Debug, Clone)]
pub struct GaussianKde {
    pub grid_points: usize,
    pub cut: f64,
}

impl Default for GaussianKde {
    fn default() -> Self {
        Self {
            grid_points: 512,
            cut: 3.0,
        }
    }
}

impl GaussianKde {
    /// Silverman's rule-of-thumb bandwidth.
    ///
    /// Samples with fewer than two values have no spread; they get the
    /// single value's magnitude, or 1, scaled as for n = 1.
    pub fn bandwidth(sample: &[f64]) -> f64 {
        if sample.len() < 2 {
            let spread = sample.first().map_or(0.0, |x| x.abs());
            return 0.9 * if spread > 0.0 { spread } else { 1.0 };
        }

        let n = sample.len() as f64;
        let sd = standard_deviation(sample);

        let mut sorted = sample.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let iqr = quantile(&sorted, 0.75) - quantile(&sorted, 0.25);

        let mut spread = sd.min(iqr / 1.34);
        if spread == 0.0 || !spread.is_finite() {
            spread = sd;
        }
        if spread == 0.0 || !spread.is_finite() {
            spread = sample[0].abs();
        }
        if spread == 0.0 {
            spread = 1.0;
        }

        0.9 * spread * n.powf(-0.2)
    }

    /// Evaluate the density on the grid, returning (x, density) pairs
    pub fn evaluate(&self, sample: &[f64], bandwidth: f64) -> Vec<(f64, f64)> {
        let min = sample.iter().copied().fold(f64::INFINITY, f64::min);
        let max = sample.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let from = min - self.cut * bandwidth;
        let to = max + self.cut * bandwidth;

        let points = self.grid_points.max(2);
        let step = (to - from) / (points - 1) as f64;
        let norm = 1.0 / (sample.len() as f64 * bandwidth * (2.0 * std::f64::consts::PI).sqrt());

        (0..points)
            .map(|i| {
                let x = from + i as f64 * step;
                let density: f64 = sample
                    .iter()
                    .map(|xi| {
                        let u = (x - xi) / bandwidth;
                        (-0.5 * u * u).exp()
                    })
                    .sum();
                (x, density * norm)
            })
            .collect()
    }
}

impl ModeFinder for GaussianKde {
    fn mode(&self, sample: &[f64]) -> InvertypeResult<f64> {
        if sample.iter().any(|x| !x.is_finite()) {
            return Err(InvertypeError::Data(
                "density sample contains non-finite values".to_string(),
            ));
        }
        if sample.len() < 2 {
            return Err(InvertypeError::Data(format!(
                "need at least 2 covered bins to estimate a density, got {}",
                sample.len()
            )));
        }

        let bandwidth = Self::bandwidth(sample);
        let grid = self.evaluate(sample, bandwidth);

        let mut best = grid[0];
        for &(x, density) in &grid[1..] {
            if density > best.1 {
                best = (x, density);
            }
        }

        log::debug!(
            "KDE over {} values: bandwidth {:.5}, mode {:.5}",
            sample.len(),
            bandwidth,
            best.0
        );

        Ok(best.0)
    }
}

fn standard_deviation(sample: &[f64]) -> f64 {
    let n = sample.len() as f64;
    let mean = sample.iter().sum::<f64>() / n;
    let ss: f64 = sample.iter().map(|x| (x - mean).powi(2)).sum();
    (ss / (n - 1.0)).sqrt()
}

/// Linear-interpolation quantile of an ascending sample
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}
