//! Binning a pairwise comparison into a 2D grid for the MA plot.
//!
//! The plot area is cut into `unit`-pixel slices along each axis: logATA on
//! the x axis, logFC on the y axis. Each slice is mapped back into data space,
//! and records are assigned to slices with one sweep over the comparison's
//! pre-sorted views (`fc_sorted` / `ata_sorted`) instead of searching a bin
//! per record. A record ends up in grid cell `(fc bin, ata bin)` only if both
//! sweeps placed it.
use std::collections::HashMap;
use crate::error::{DredgeError, Result};
use crate::pairwise::{DiffExpRecord, PairwiseComparison};
use crate::scale::LinearScale;

/// One slice of an axis: data bounds (ascending, inclusive) and its pixel bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisBin {
    pub min: f64,
    pub max: f64,
    pub px0: f64,
    pub px1: f64,
}

/// Cuts the pixel range of `scale` into `unit`-wide slices (the last one may
/// be narrower) and inverts them into data space. Bins are returned in
/// ascending data order; neighbours share their boundary value, and the
/// outermost bounds are exactly the domain endpoints.
pub fn axis_bins(scale: &LinearScale, unit: f64) -> Result<Vec<AxisBin>> {
    if !(unit.is_finite() && unit > 0.0) {
        return Err(DredgeError::invalid_scale(format!("bin width must be positive, got {unit}")));
    }
    let (r0, r1) = scale.range();
    let (lo, hi) = (r0.min(r1), r0.max(r1));
    let n = ((hi - lo) / unit).ceil() as usize;

    // rounding in the division may add a slice starting at `hi`
    let mut pixels: Vec<f64> = (0..n).map(|i| lo + i as f64 * unit).take_while(|px| *px < hi).collect();
    pixels.push(hi);

    let mut bins: Vec<AxisBin> = pixels
        .windows(2)
        .map(|w| {
            let (a, b) = (scale.invert(w[0]), scale.invert(w[1]));
            AxisBin { min: a.min(b), max: a.max(b), px0: w[0], px1: w[1] }
        })
        .collect();

    // an inverted range (or domain) yields descending data bounds
    if bins.len() > 1 && bins[0].min > bins[bins.len() - 1].min {
        bins.reverse();
    }

    let (dmin, dmax) = scale.domain_extent();
    if let Some(first) = bins.first_mut() {
        first.min = dmin;
    }
    if let Some(last) = bins.last_mut() {
        last.max = dmax;
    }
    Ok(bins)
}

/// Assigns each record of an ascending, nulls-last sequence to an axis bin.
///
/// Records below the first bin are skipped up front, after that every bin
/// consumes the run of records `<= bin.max`. Records above the last bin or
/// without a value are left out.
pub fn sweep_assign<'a>(
    sorted: impl Iterator<Item = &'a DiffExpRecord>,
    value: impl Fn(&DiffExpRecord) -> Option<f64>,
    bins: &[AxisBin],
) -> HashMap<&'a str, usize> {
    let mut assignment = HashMap::new();
    let first = match bins.first() {
        Some(b) => b,
        None => return assignment,
    };
    let mut records = sorted.peekable();

    while let Some(r) = records.peek() {
        match value(r) {
            Some(v) if v < first.min => {
                records.next();
            }
            _ => break,
        }
    }

    for (i, bin) in bins.iter().enumerate() {
        while let Some(r) = records.peek() {
            match value(r) {
                Some(v) if v <= bin.max => {
                    assignment.insert(r.name.as_str(), i);
                    records.next();
                }
                _ => break,
            }
        }
    }
    assignment
}

/// A cell of the MA plot grid
#[derive(Debug, Clone, PartialEq)]
pub struct Bin<'a> {
    pub fc_index: usize,
    pub ata_index: usize,
    pub min_fc: f64,
    pub max_fc: f64,
    pub min_ata: f64,
    pub max_ata: f64,
    /// on-screen rectangle: x from the logATA axis, y from the logFC axis
    pub x0: f64,
    pub x1: f64,
    pub y0: f64,
    pub y1: f64,
    pub transcripts: Vec<&'a DiffExpRecord>,
}

impl<'a> Bin<'a> {
    pub fn len(&self) -> usize {
        self.transcripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcripts.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.transcripts.iter().map(|r| r.name.as_str())
    }
}

/// Bins the records of `comparison` accepted by `filter` into the grid
/// spanned by `x_scale` (logATA) and `y_scale` (logFC).
///
/// Returns every cell of the grid, empty ones included, ordered by fc bin
/// then ata bin (both ascending in data space).
pub fn get_plot_bins<'a>(
    comparison: &'a PairwiseComparison,
    filter: impl Fn(&DiffExpRecord) -> bool,
    x_scale: &LinearScale,
    y_scale: &LinearScale,
    unit: f64,
) -> Result<Vec<Bin<'a>>> {
    let fc_bins = axis_bins(y_scale, unit)?;
    let ata_bins = axis_bins(x_scale, unit)?;

    let fc_of = sweep_assign(comparison.fc_sorted().filter(|r| filter(r)), |r| r.log_fc, &fc_bins);
    let ata_of = sweep_assign(comparison.ata_sorted().filter(|r| filter(r)), |r| r.log_ata, &ata_bins);

    let mut grid: Vec<Bin<'a>> = Vec::with_capacity(fc_bins.len() * ata_bins.len());
    for (i, fc_bin) in fc_bins.iter().enumerate() {
        for (j, ata_bin) in ata_bins.iter().enumerate() {
            grid.push(Bin {
                fc_index: i,
                ata_index: j,
                min_fc: fc_bin.min,
                max_fc: fc_bin.max,
                min_ata: ata_bin.min,
                max_ata: ata_bin.max,
                x0: ata_bin.px0,
                x1: ata_bin.px1,
                y0: fc_bin.px0,
                y1: fc_bin.px1,
                transcripts: Vec::new(),
            });
        }
    }

    for record in comparison.records() {
        let name = record.name.as_str();
        if let (Some(&i), Some(&j)) = (fc_of.get(name), ata_of.get(name)) {
            grid[i * ata_bins.len() + j].transcripts.push(record);
        }
    }
    Ok(grid)
}
