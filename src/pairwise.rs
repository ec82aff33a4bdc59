//! Pairwise differential-expression comparisons between two treatments
//!
//! A comparison file is tab separated, one header row, then one row per
//! transcript: `transcriptID\tlogFC\tlogATA\tpValue`. The file may exist for
//! only one direction of a treatment pair; reading the `B,A` file for an
//! `(A,B)` request negates every logFC (logATA has no direction).
//!
//! Comparisons are cached per project, see [`ComparisonCache`].
//! ```rust, no_run
//! # use dredge::project::Project;
//! # use dredge::fetch::FsFetcher;
//! # use std::sync::Arc;
//! let project = Project::load(Arc::new(FsFetcher::new("/path/to/project")), "project.json").unwrap();
//! let comparison = project.pairwise_comparison("control", "heat_shock").unwrap();
//! for record in comparison.fc_sorted() {
//!     // most down-regulated first
//! }
//! ```
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use log::{debug, info};
use crate::abundance::AbundanceLookup;
use crate::corpus::TranscriptCorpus;
use crate::error::{DredgeError, Result};
use crate::fetch::{pairwise_url, Response};
use crate::project::Project;
use crate::status::LoadStatus;
use crate::utils::{mean, median, parse_optional_float};

/// Differential expression of one transcript between treatment A and B
#[derive(Debug, Clone, PartialEq)]
pub struct DiffExpRecord {
    /// id as found in the comparison file
    pub name: String,
    /// canonical label from the transcript corpus (the id itself if unknown)
    pub label: String,
    pub p_value: Option<f64>,
    pub log_fc: Option<f64>,
    pub log_ata: Option<f64>,
    pub treatment_a_mean: Option<f64>,
    pub treatment_a_median: Option<f64>,
    pub treatment_b_mean: Option<f64>,
    pub treatment_b_median: Option<f64>,
}

impl DiffExpRecord {
    /// all-null record, used for listed transcripts the comparison does not contain
    pub fn placeholder(name: &str) -> Self {
        DiffExpRecord {
            name: name.to_string(),
            label: name.to_string(),
            p_value: None,
            log_fc: None,
            log_ata: None,
            treatment_a_mean: None,
            treatment_a_median: None,
            treatment_b_mean: None,
            treatment_b_median: None,
        }
    }

    /// the same record seen from the other treatment
    fn reversed(&self) -> Self {
        DiffExpRecord {
            log_fc: self.log_fc.map(|fc| -fc),
            treatment_a_mean: self.treatment_b_mean,
            treatment_a_median: self.treatment_b_median,
            treatment_b_mean: self.treatment_a_mean,
            treatment_b_median: self.treatment_a_median,
            ..self.clone()
        }
    }

    /// passes a p-value threshold; a threshold >= 1 lets everything through,
    /// otherwise records without a p-value are rejected
    pub fn passes_p_value(&self, threshold: f64) -> bool {
        if threshold >= 1.0 {
            return true
        }
        self.p_value.is_some_and(|p| p <= threshold)
    }
}

/// Ascending order with missing values last
pub fn cmp_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// A single data row of a comparison file
#[derive(Debug, Clone, PartialEq)]
pub struct PairwiseRow {
    pub id: String,
    pub log_fc: Option<f64>,
    pub log_ata: Option<f64>,
    pub p_value: Option<f64>,
}

/// Parses a comparison file. With `reverse`, logFC values are negated.
/// Any malformed row fails the whole file.
pub fn parse_pairwise_rows(text: &str, url: &str, reverse: bool) -> Result<Vec<PairwiseRow>> {
    let mut rows = Vec::new();
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    // header
    lines.next();
    for (i, line) in lines {
        let lineno = i + 1;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 4 {
            return Err(DredgeError::malformed(url, lineno, format!("expected 4 columns, got {}", fields.len())));
        }
        let id = fields[0].trim();
        if id.is_empty() {
            return Err(DredgeError::malformed(url, lineno, "missing transcript id"));
        }

        let log_fc = parse_optional_float(fields[1]).map(|fc| if reverse { -fc } else { fc });
        let log_ata = parse_optional_float(fields[2]);
        let p_value = parse_optional_float(fields[3]);

        if log_fc.is_some() && log_ata.is_none() {
            return Err(DredgeError::malformed(url, lineno, format!("{id} has a logFC but no logATA")));
        }
        if let Some(p) = p_value {
            if !(0.0..=1.0).contains(&p) {
                return Err(DredgeError::malformed(url, lineno, format!("p-value {p} outside [0, 1]")));
            }
        }
        rows.push(PairwiseRow { id: id.to_string(), log_fc, log_ata, p_value });
    }
    Ok(rows)
}

/// smallest strictly positive p-value, 1 if there is none
pub fn min_p_value(p_values: impl Iterator<Item = Option<f64>>) -> f64 {
    p_values
        .flatten()
        .filter(|p| *p > 0.0)
        .fold(1.0, f64::min)
}

#[derive(Debug, Clone)]
pub struct PairwiseComparison {
    treatment_a: String,
    treatment_b: String,
    // insertion order
    records: Vec<DiffExpRecord>,
    index: HashMap<String, usize>,
    // positions into `records`, ascending, nulls last
    fc_sorted: Vec<usize>,
    ata_sorted: Vec<usize>,
    min_p_value: f64,
}

fn sorted_positions(records: &[DiffExpRecord], key: impl Fn(&DiffExpRecord) -> Option<f64>) -> Vec<usize> {
    let mut positions: Vec<usize> = (0..records.len()).collect();
    positions.sort_by(|&i, &j| cmp_nulls_last(key(&records[i]), key(&records[j])));
    positions
}

impl PairwiseComparison {
    /// Builds the comparison and its sorted views. A name occurring twice
    /// keeps its first position and the later values.
    pub fn from_records(treatment_a: &str, treatment_b: &str, records: Vec<DiffExpRecord>) -> Self {
        let mut deduped: Vec<DiffExpRecord> = Vec::with_capacity(records.len());
        let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());
        for r in records {
            match index.get(&r.name) {
                Some(&i) => deduped[i] = r,
                None => {
                    index.insert(r.name.clone(), deduped.len());
                    deduped.push(r);
                }
            }
        }

        let fc_sorted = sorted_positions(&deduped, |r| r.log_fc);
        let ata_sorted = sorted_positions(&deduped, |r| r.log_ata);
        let min_p_value = min_p_value(deduped.iter().map(|r| r.p_value));

        PairwiseComparison {
            treatment_a: treatment_a.to_string(),
            treatment_b: treatment_b.to_string(),
            records: deduped,
            index,
            fc_sorted,
            ata_sorted,
            min_p_value,
        }
    }

    pub fn treatment_a(&self) -> &str {
        &self.treatment_a
    }

    pub fn treatment_b(&self) -> &str {
        &self.treatment_b
    }

    /// records in file order
    pub fn records(&self) -> &[DiffExpRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&DiffExpRecord> {
        self.index.get(name).map(|&i| &self.records[i])
    }

    /// looks `name` up directly, then through its canonical label
    pub fn get_by_alias(&self, name: &str, corpus: &TranscriptCorpus) -> Option<&DiffExpRecord> {
        self.get(name).or_else(|| {
            let canonical = corpus.canonical(name)?;
            self.get(canonical).or_else(|| self.records.iter().find(|r| r.label == canonical))
        })
    }

    /// ascending by logFC, nulls last
    pub fn fc_sorted(&self) -> impl DoubleEndedIterator<Item = &DiffExpRecord> + ExactSizeIterator + '_ {
        self.fc_sorted.iter().map(move |&i| &self.records[i])
    }

    /// ascending by logATA, nulls last
    pub fn ata_sorted(&self) -> impl DoubleEndedIterator<Item = &DiffExpRecord> + ExactSizeIterator + '_ {
        self.ata_sorted.iter().map(move |&i| &self.records[i])
    }

    /// smallest non-zero p-value; floor of the p-value histogram
    pub fn min_p_value(&self) -> f64 {
        self.min_p_value
    }

    /// The B-vs-A comparison: logFC negated, treatment abundances swapped.
    pub fn reversed(&self) -> Self {
        let records: Vec<DiffExpRecord> = self.records.iter().map(|r| r.reversed()).collect();
        let fc_sorted = sorted_positions(&records, |r| r.log_fc);
        PairwiseComparison {
            treatment_a: self.treatment_b.clone(),
            treatment_b: self.treatment_a.clone(),
            records,
            index: self.index.clone(),
            fc_sorted,
            ata_sorted: self.ata_sorted.clone(),
            min_p_value: self.min_p_value,
        }
    }
}

fn abundances_of(lookup: &AbundanceLookup, treatment: &str, id: &str, label: &str) -> Result<Vec<f64>> {
    let values = lookup.abundances(treatment, id)?;
    if values.is_empty() && label != id {
        return lookup.abundances(treatment, label)
    }
    Ok(values)
}

/// Turns parsed rows into a comparison: canonical labels via the corpus,
/// per-treatment mean / median abundance via the lookup.
pub fn build_comparison(
    treatment_a: &str,
    treatment_b: &str,
    rows: Vec<PairwiseRow>,
    corpus: &TranscriptCorpus,
    lookup: &AbundanceLookup,
) -> Result<PairwiseComparison> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let label = corpus.canonical_or(&row.id).to_string();
        let a_values = abundances_of(lookup, treatment_a, &row.id, &label)?;
        let b_values = abundances_of(lookup, treatment_b, &row.id, &label)?;

        records.push(DiffExpRecord {
            treatment_a_mean: mean(&a_values),
            treatment_a_median: median(&a_values),
            treatment_b_mean: mean(&b_values),
            treatment_b_median: median(&b_values),
            name: row.id,
            label,
            p_value: row.p_value,
            log_fc: row.log_fc,
            log_ata: row.log_ata,
        });
    }
    Ok(PairwiseComparison::from_records(treatment_a, treatment_b, records))
}

/// cache key of an ordered treatment pair
pub fn pair_key(treatment_a: &str, treatment_b: &str) -> String {
    format!("{treatment_a},{treatment_b}")
}

fn unordered_key(treatment_a: &str, treatment_b: &str) -> String {
    if treatment_a <= treatment_b {
        pair_key(treatment_a, treatment_b)
    } else {
        pair_key(treatment_b, treatment_a)
    }
}

// both directions of one unordered pair, keyed by `pair_key`
type Slot = Mutex<HashMap<String, Arc<PairwiseComparison>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Per-project cache of loaded comparisons.
///
/// Each unordered treatment pair has its own slot, locked for the whole
/// fetch + parse: concurrent requests for the same pair wait for the first
/// one instead of fetching again, different pairs load in parallel.
/// Failed loads are not cached.
#[derive(Debug, Default)]
pub struct ComparisonCache {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl ComparisonCache {
    pub fn new() -> Self {
        ComparisonCache::default()
    }

    /// The cached comparison for `(A,B)` if this exact direction was requested
    /// before. Does not wait: a pair that is being loaded counts as not cached.
    pub fn get(&self, treatment_a: &str, treatment_b: &str) -> Option<Arc<PairwiseComparison>> {
        let slot = lock(&self.slots).get(&unordered_key(treatment_a, treatment_b)).cloned()?;
        let key = pair_key(treatment_a, treatment_b);
        let found = match slot.try_lock() {
            Ok(entries) => entries.get(&key).cloned(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().get(&key).cloned(),
            Err(TryLockError::WouldBlock) => None,
        };
        found
    }

    /// number of cached comparisons (both directions count)
    pub fn len(&self) -> usize {
        let slots: Vec<Arc<Slot>> = lock(&self.slots).values().cloned().collect();
        slots.iter().map(|s| lock(s).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// drops every cached comparison
    pub fn clear(&self) {
        lock(&self.slots).clear();
    }

    /// Returns the `(A,B)` comparison: from the cache, derived from a cached
    /// `(B,A)`, or via `load` (called at most once at a time per unordered pair).
    pub fn get_or_load<F>(&self, treatment_a: &str, treatment_b: &str, load: F) -> Result<Arc<PairwiseComparison>>
    where
        F: FnOnce() -> Result<PairwiseComparison>,
    {
        let slot_key = unordered_key(treatment_a, treatment_b);
        let key = pair_key(treatment_a, treatment_b);

        let slot = lock(&self.slots).entry(slot_key.clone()).or_default().clone();
        let mut entries = lock(&slot);
        if !self.is_registered(&slot_key, &slot) {
            // dropped by a failed load while we were waiting on it
            drop(entries);
            return self.get_or_load(treatment_a, treatment_b, load)
        }

        if let Some(c) = entries.get(&key) {
            return Ok(c.clone())
        }
        if let Some(other) = entries.get(&pair_key(treatment_b, treatment_a)) {
            debug!("deriving {key} from cached {}", pair_key(treatment_b, treatment_a));
            let c = Arc::new(other.reversed());
            entries.insert(key, c.clone());
            return Ok(c)
        }

        match load() {
            Ok(c) => {
                let c = Arc::new(c);
                entries.insert(key, c.clone());
                Ok(c)
            }
            Err(e) => {
                if entries.is_empty() {
                    let mut slots = lock(&self.slots);
                    if slots.get(&slot_key).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
                        slots.remove(&slot_key);
                    }
                }
                Err(e)
            }
        }
    }

    fn is_registered(&self, slot_key: &str, slot: &Arc<Slot>) -> bool {
        lock(&self.slots).get(slot_key).is_some_and(|s| Arc::ptr_eq(s, slot))
    }
}

fn try_fetch(project: &Project, label: &str, url: &str) -> Option<Response> {
    let sink = project.sink();
    sink.report(label, url, LoadStatus::Pending, None);
    match project.fetcher().fetch(url) {
        Ok(r) if r.ok() => Some(r),
        Ok(r) => {
            sink.report(label, url, LoadStatus::Missing, Some(&format!("status {}", r.status)));
            None
        }
        Err(e) => {
            sink.report(label, url, LoadStatus::Failed, Some(&e.to_string()));
            None
        }
    }
}

/// Fetches, parses and builds the `(A,B)` comparison, bypassing the cache.
/// Use [`Project::pairwise_comparison`] for the cached version.
pub fn fetch_pairwise_comparison(project: &Project, treatment_a: &str, treatment_b: &str) -> Result<PairwiseComparison> {
    project.treatment(treatment_a)?;
    project.treatment(treatment_b)?;

    let label = format!("Pairwise comparison {treatment_a} vs {treatment_b}");
    let template = &project.config().pairwise_name;
    let forward_url = pairwise_url(template, treatment_a, treatment_b);
    let reverse_url = pairwise_url(template, treatment_b, treatment_a);

    let (response, url, reverse) = match try_fetch(project, &label, &forward_url) {
        Some(r) => (r, forward_url, false),
        None if reverse_url == forward_url => {
            return Err(DredgeError::ComparisonNotFound {
                treatment_a: treatment_a.to_string(),
                treatment_b: treatment_b.to_string(),
                tried: vec![forward_url],
            })
        }
        None => match try_fetch(project, &label, &reverse_url) {
            Some(r) => (r, reverse_url, true),
            None => {
                return Err(DredgeError::ComparisonNotFound {
                    treatment_a: treatment_a.to_string(),
                    treatment_b: treatment_b.to_string(),
                    tried: vec![forward_url, reverse_url],
                })
            }
        },
    };

    let built = response
        .text()
        .and_then(|text| parse_pairwise_rows(text, &url, reverse))
        .and_then(|rows| {
            let lookup = project.abundance_lookup();
            build_comparison(treatment_a, treatment_b, rows, project.corpus(), &lookup)
        });

    match built {
        Ok(comparison) => {
            let msg = format!("{} transcripts{}", comparison.len(), if reverse { " (reversed)" } else { "" });
            project.sink().report(&label, &url, LoadStatus::Ok, Some(&msg));
            info!("loaded {treatment_a} vs {treatment_b} from {url}: {msg}");
            Ok(comparison)
        }
        Err(e) => {
            project.sink().report(&label, &url, LoadStatus::Failed, Some(&e.to_string()));
            Err(e)
        }
    }
}
