//! p-value histogram on a log10 axis, floored at the comparison's smallest
//! non-zero p-value.
use crate::error::{DredgeError, Result};
use crate::pairwise::PairwiseComparison;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramBin {
    /// bounds in p-value space
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PValueHistogram {
    log_floor: f64,
    bins: Vec<HistogramBin>,
    excluded: usize,
}

impl PValueHistogram {
    /// `n_bins` equal-width bins over `[floor(log10(min p)), 0]`.
    /// Zero and missing p-values are counted as excluded.
    pub fn new(comparison: &PairwiseComparison, n_bins: usize) -> Result<Self> {
        if n_bins == 0 {
            return Err(DredgeError::invalid_scale("histogram needs at least one bin"));
        }
        let mut log_floor = comparison.min_p_value().log10().floor();
        if log_floor >= 0.0 {
            // no p-value below 1
            log_floor = -1.0;
        }
        let width = -log_floor / n_bins as f64;

        let mut bins: Vec<HistogramBin> = (0..n_bins)
            .map(|i| {
                let lo = log_floor + i as f64 * width;
                let hi = if i + 1 == n_bins { 0.0 } else { lo + width };
                HistogramBin { lower: 10f64.powf(lo), upper: 10f64.powf(hi), count: 0 }
            })
            .collect();

        let mut excluded = 0;
        for record in comparison.records() {
            match record.p_value {
                Some(p) if p > 0.0 => {
                    let i = ((p.log10() - log_floor) / width).floor().max(0.0) as usize;
                    bins[i.min(n_bins - 1)].count += 1;
                }
                _ => excluded += 1,
            }
        }
        Ok(PValueHistogram { log_floor, bins, excluded })
    }

    /// log10 of the lowest bin bound
    pub fn log_floor(&self) -> f64 {
        self.log_floor
    }

    pub fn bins(&self) -> &[HistogramBin] {
        &self.bins
    }

    /// records without a usable p-value
    pub fn excluded(&self) -> usize {
        self.excluded
    }

    pub fn total(&self) -> usize {
        self.bins.iter().map(|b| b.count).sum()
    }
}
