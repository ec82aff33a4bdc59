//! Turning a comparison into the ordered list of records shown to the user.
//!
//! Exactly one filter source is active at a time, picked by precedence:
//! brushed plot area, then the selected bin, then the hovered bin, then the
//! watched transcripts, then everything. Listed names (bin members, watched
//! transcripts) that the comparison does not contain show up as all-null
//! placeholder records at the end of the list.
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use log::debug;
use crate::bins::Bin;
use crate::error::{DredgeError, Result};
use crate::pairwise::{cmp_nulls_last, DiffExpRecord, PairwiseComparison};
use crate::project::Project;

/// Column the display list is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortPath {
    Label,
    PValue,
    LogFc,
    LogAta,
    MeanA,
    MedianA,
    MeanB,
    MedianB,
}

impl SortPath {
    /// numeric value of the column, `None` for `Label`
    pub fn value(&self, record: &DiffExpRecord) -> Option<f64> {
        match self {
            SortPath::Label => None,
            SortPath::PValue => record.p_value,
            SortPath::LogFc => record.log_fc,
            SortPath::LogAta => record.log_ata,
            SortPath::MeanA => record.treatment_a_mean,
            SortPath::MedianA => record.treatment_a_median,
            SortPath::MeanB => record.treatment_b_mean,
            SortPath::MedianB => record.treatment_b_median,
        }
    }

    fn compare(&self, a: &DiffExpRecord, b: &DiffExpRecord) -> Ordering {
        match self {
            SortPath::Label => a.label.cmp(&b.label).then_with(|| a.name.cmp(&b.name)),
            _ => cmp_nulls_last(self.value(a), self.value(b)),
        }
    }
}

impl FromStr for SortPath {
    type Err = DredgeError;

    fn from_str(s: &str) -> Result<Self> {
        let path = match s.to_ascii_lowercase().as_str() {
            "label" | "name" => SortPath::Label,
            "pvalue" | "p" => SortPath::PValue,
            "logfc" | "fc" => SortPath::LogFc,
            "logata" | "ata" => SortPath::LogAta,
            "mean_a" => SortPath::MeanA,
            "median_a" => SortPath::MedianA,
            "mean_b" => SortPath::MeanB,
            "median_b" => SortPath::MedianB,
            other => return Err(DredgeError::config(format!("unknown sort column {other}"))),
        };
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Brushed plot area in data space, inclusive on all sides
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrushRect {
    pub min_ata: f64,
    pub max_fc: f64,
    pub max_ata: f64,
    pub min_fc: f64,
}

impl BrushRect {
    pub fn contains(&self, record: &DiffExpRecord) -> bool {
        match (record.log_ata, record.log_fc) {
            (Some(ata), Some(fc)) => {
                self.min_ata <= ata && ata <= self.max_ata && self.min_fc <= fc && fc <= self.max_fc
            }
            _ => false,
        }
    }
}

/// transcript names of a plot bin, for use as a selected / hovered bin
pub fn bin_names(bin: &Bin) -> BTreeSet<String> {
    bin.names().map(str::to_string).collect()
}

/// User filter state
#[derive(Debug, Clone)]
pub struct DisplayFilters {
    /// applies to the brushed and the unfiltered list
    pub p_value_threshold: f64,
    pub brushed: Option<BrushRect>,
    pub selected_bin: Option<BTreeSet<String>>,
    pub hovered_bin: Option<BTreeSet<String>>,
    /// `Some` when the list is restricted to watched transcripts
    pub watched: Option<BTreeSet<String>>,
}

impl Default for DisplayFilters {
    fn default() -> Self {
        DisplayFilters { p_value_threshold: 1.0, brushed: None, selected_bin: None, hovered_bin: None, watched: None }
    }
}

/// The filter that decides which records are shown
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterSource<'f> {
    Brushed(BrushRect),
    SelectedBin(&'f BTreeSet<String>),
    HoveredBin(&'f BTreeSet<String>),
    Watched(&'f BTreeSet<String>),
    All,
}

impl DisplayFilters {
    pub fn active_source(&self) -> FilterSource<'_> {
        if let Some(rect) = self.brushed {
            FilterSource::Brushed(rect)
        } else if let Some(names) = &self.selected_bin {
            FilterSource::SelectedBin(names)
        } else if let Some(names) = &self.hovered_bin {
            FilterSource::HoveredBin(names)
        } else if let Some(names) = &self.watched {
            FilterSource::Watched(names)
        } else {
            FilterSource::All
        }
    }
}

/// Ordered display list of `comparison` under `filters`.
///
/// Numeric columns sort with missing values last in either order; the logFC
/// and logATA columns reuse the comparison's sorted views. Sorting by label
/// orders everything, placeholders included, alphabetically.
pub fn display_list<'a>(
    comparison: &'a PairwiseComparison,
    filters: &DisplayFilters,
    sort: SortPath,
    order: SortOrder,
) -> Vec<Cow<'a, DiffExpRecord>> {
    let threshold = filters.p_value_threshold;
    let source = filters.active_source();
    let include = |r: &DiffExpRecord| match source {
        FilterSource::Brushed(rect) => r.passes_p_value(threshold) && rect.contains(r),
        FilterSource::SelectedBin(names) | FilterSource::HoveredBin(names) | FilterSource::Watched(names) => {
            names.contains(&r.name) || names.contains(&r.label)
        }
        FilterSource::All => r.passes_p_value(threshold),
    };
    let listed = match source {
        FilterSource::SelectedBin(names) | FilterSource::HoveredBin(names) | FilterSource::Watched(names) => Some(names),
        _ => None,
    };

    let mut shown: Vec<&'a DiffExpRecord> = match sort {
        SortPath::LogFc => comparison.fc_sorted().filter(|r| include(r)).collect(),
        SortPath::LogAta => comparison.ata_sorted().filter(|r| include(r)).collect(),
        SortPath::Label => comparison.records().iter().filter(|r| include(r)).collect(),
        _ => {
            let mut v: Vec<&DiffExpRecord> = comparison.records().iter().filter(|r| include(r)).collect();
            v.sort_by(|a, b| sort.compare(a, b));
            v
        }
    };
    if sort != SortPath::Label && order == SortOrder::Desc {
        let k = shown.partition_point(|r| sort.value(r).is_some());
        shown[..k].reverse();
    }

    // a listed name is matched by a record id or by its label
    let labels: HashSet<&str> = match listed {
        Some(_) => comparison.records().iter().map(|r| r.label.as_str()).collect(),
        None => HashSet::new(),
    };
    // BTreeSet iterates in alphabetical order
    let placeholders = listed
        .into_iter()
        .flatten()
        .filter(|name| !comparison.contains(name) && !labels.contains(name.as_str()))
        .map(|name| Cow::Owned(DiffExpRecord::placeholder(name)));

    let mut list: Vec<Cow<'a, DiffExpRecord>> = shown.into_iter().map(Cow::Borrowed).chain(placeholders).collect();
    if sort == SortPath::Label {
        list.sort_by(|a, b| sort.compare(a, b));
        if order == SortOrder::Desc {
            list.reverse();
        }
    }
    list
}

/// Identifies one treatment pair selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionToken {
    id: u64,
    pub treatment_a: String,
    pub treatment_b: String,
}

/// Hands out a token per treatment pair selection so that a comparison
/// arriving after the user moved on to another pair can be dropped.
#[derive(Debug, Default)]
pub struct SelectionTracker {
    current: AtomicU64,
}

impl SelectionTracker {
    pub fn new() -> Self {
        SelectionTracker { current: AtomicU64::new(0) }
    }

    /// makes `(a, b)` the current selection; earlier tokens become stale
    pub fn select(&self, treatment_a: &str, treatment_b: &str) -> SelectionToken {
        let id = self.current.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        SelectionToken { id, treatment_a: treatment_a.to_string(), treatment_b: treatment_b.to_string() }
    }

    pub fn is_current(&self, token: &SelectionToken) -> bool {
        self.current.load(AtomicOrdering::SeqCst) == token.id
    }

    /// `Some(value)` if the token is still current
    pub fn apply<T>(&self, token: &SelectionToken, value: T) -> Option<T> {
        if self.is_current(token) {
            Some(value)
        } else {
            debug!("dropping stale result for {} vs {}", token.treatment_a, token.treatment_b);
            None
        }
    }
}

/// Selects `(a, b)` and loads its comparison. Returns `Ok(None)` if another
/// selection was made while loading.
pub fn load_selection(
    project: &Project,
    tracker: &SelectionTracker,
    treatment_a: &str,
    treatment_b: &str,
) -> Result<Option<Arc<PairwiseComparison>>> {
    let token = tracker.select(treatment_a, treatment_b);
    let comparison = project.pairwise_comparison(treatment_a, treatment_b)?;
    Ok(tracker.apply(&token, comparison))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use crate::pairwise::{DiffExpRecord, PairwiseComparison};
    use super::*;

    fn record(name: &str, fc: Option<f64>, ata: Option<f64>, p: Option<f64>) -> DiffExpRecord {
        DiffExpRecord { log_fc: fc, log_ata: ata, p_value: p, ..DiffExpRecord::placeholder(name) }
    }

    fn comparison() -> PairwiseComparison {
        PairwiseComparison::from_records("A", "B", vec![
            record("g3", Some(0.5), Some(1.0), Some(0.2)),
            record("g1", Some(-2.0), Some(4.0), Some(0.001)),
            record("g4", None, None, None),
            record("g2", Some(3.0), Some(2.0), Some(0.04)),
        ])
    }

    fn names(list: &[Cow<DiffExpRecord>]) -> Vec<String> {
        list.iter().map(|r| r.name.clone()).collect()
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_all_sorted_by_fc() {
        let c = comparison();
        let f = DisplayFilters::default();
        assert_eq!(names(&display_list(&c, &f, SortPath::LogFc, SortOrder::Asc)), vec!["g1", "g3", "g2", "g4"]);
        // nulls stay last when descending
        assert_eq!(names(&display_list(&c, &f, SortPath::LogFc, SortOrder::Desc)), vec!["g2", "g3", "g1", "g4"]);
    }

    #[test]
    fn test_p_value_threshold() {
        let c = comparison();
        let f = DisplayFilters { p_value_threshold: 0.05, ..Default::default() };
        assert_eq!(names(&display_list(&c, &f, SortPath::PValue, SortOrder::Asc)), vec!["g1", "g2"]);
    }

    #[test]
    fn test_brush() {
        let c = comparison();
        let f = DisplayFilters {
            brushed: Some(BrushRect { min_ata: 0.0, max_fc: 1.0, max_ata: 5.0, min_fc: -3.0 }),
            // ignored while brushing
            watched: Some(set(&["g2"])),
            ..Default::default()
        };
        assert_eq!(names(&display_list(&c, &f, SortPath::LogAta, SortOrder::Asc)), vec!["g3", "g1"]);
    }

    #[test]
    fn test_precedence() {
        let f = DisplayFilters {
            selected_bin: Some(set(&["g1"])),
            hovered_bin: Some(set(&["g2"])),
            watched: Some(set(&["g3"])),
            ..Default::default()
        };
        assert!(matches!(f.active_source(), FilterSource::SelectedBin(_)));

        let f = DisplayFilters { selected_bin: None, ..f };
        assert!(matches!(f.active_source(), FilterSource::HoveredBin(_)));

        let f = DisplayFilters { hovered_bin: None, ..f };
        assert!(matches!(f.active_source(), FilterSource::Watched(_)));

        assert_eq!(DisplayFilters::default().active_source(), FilterSource::All);
    }

    #[test]
    fn test_watched_with_placeholders() {
        let c = comparison();
        let f = DisplayFilters {
            // threshold does not apply to listed names
            p_value_threshold: 0.01,
            watched: Some(set(&["zeta", "g3", "alpha", "g2"])),
            ..Default::default()
        };
        let list = display_list(&c, &f, SortPath::LogFc, SortOrder::Desc);
        assert_eq!(names(&list), vec!["g2", "g3", "alpha", "zeta"]);
        assert_eq!(list[2].log_fc, None);
        assert!(matches!(list[2], Cow::Owned(_)));

        let list = display_list(&c, &f, SortPath::Label, SortOrder::Asc);
        assert_eq!(names(&list), vec!["alpha", "g2", "g3", "zeta"]);
    }

    #[test]
    fn test_watched_by_label() {
        // the comparison file uses an alias as id, the watch list the canonical name
        let c = PairwiseComparison::from_records("A", "B", vec![
            DiffExpRecord { label: "WBGene1".to_string(), ..record("unc-1", Some(1.0), Some(2.0), Some(0.5)) },
            record("g2", Some(3.0), Some(2.0), Some(0.04)),
        ]);
        let f = DisplayFilters { watched: Some(set(&["WBGene1"])), ..Default::default() };
        let list = display_list(&c, &f, SortPath::LogFc, SortOrder::Asc);
        assert_eq!(names(&list), vec!["unc-1"]);
        assert_eq!(list[0].log_fc, Some(1.0));
        assert!(matches!(list[0], Cow::Borrowed(_)));

        let f = DisplayFilters { hovered_bin: Some(set(&["unc-1", "g9"])), ..Default::default() };
        assert_eq!(names(&display_list(&c, &f, SortPath::Label, SortOrder::Asc)), vec!["unc-1", "g9"]);
    }

    #[test]
    fn test_sort_path_from_str() {
        assert_eq!("logFC".parse::<SortPath>().unwrap(), SortPath::LogFc);
        assert_eq!("median_b".parse::<SortPath>().unwrap(), SortPath::MedianB);
        assert!("volume".parse::<SortPath>().is_err());
    }

    #[test]
    fn test_selection_tracker() {
        let tracker = SelectionTracker::new();
        let first = tracker.select("A", "B");
        let second = tracker.select("A", "C");
        assert!(!tracker.is_current(&first));
        assert_eq!(tracker.apply(&first, 1), None);
        assert_eq!(tracker.apply(&second, 2), Some(2));
    }
}
