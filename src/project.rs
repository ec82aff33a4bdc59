//! DrEdGE projects: configuration, treatments and loading of all project files
//!
//! A project is described by a `project.json` next to its data files. Every
//! field is fetched and validated on its own and reported to the
//! [`StatusSink`]; optional fields may fail without failing the project.
//!
//! ```rust, no_run
//! # use dredge::project::Project;
//! # use dredge::fetch::FsFetcher;
//! # use std::sync::Arc;
//! let project = Project::load(Arc::new(FsFetcher::new("/path/to/project")), "project.json").unwrap();
//! for (key, treatment) in project.treatments() {
//!     println!("{key}: {} ({} replicates)", treatment.label, treatment.replicates.len());
//! }
//! ```
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use serde::{Serialize, Deserialize};
use log::{info, log_enabled, warn, Level};
use indicatif::ProgressDrawTarget;
use crate::abundance::{AbundanceLookup, AbundanceMatrix};
use crate::corpus::{parse_alias_file, TranscriptCorpus};
use crate::error::{DredgeError, Result};
use crate::fetch::{Fetcher, Response};
use crate::pairwise::{fetch_pairwise_comparison, ComparisonCache, PairwiseComparison};
use crate::singlecell::cells::{parse_cells, parse_clusters, parse_transcript_list};
use crate::singlecell::expression::SparseExpressionMatrix;
use crate::singlecell::SingleCellDataset;
use crate::status::{LoadStatus, LogSink, StatusSink};
use crate::utils::get_progressbar;

/// A named group of replicate samples
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Treatment {
    pub label: String,
    pub replicates: Vec<String>,
}

impl Treatment {
    pub fn new(label: &str, replicates: &[&str]) -> Self {
        Treatment {
            label: label.to_string(),
            replicates: replicates.iter().map(|r| r.to_string()).collect(),
        }
    }
}

/// External link for a transcript, `%name` is replaced by the transcript label
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TranscriptHyperlink {
    pub label: String,
    pub url: String,
}

impl TranscriptHyperlink {
    pub fn url_for(&self, transcript: &str) -> String {
        self.url.replace("%name", transcript)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SingleCellConfig {
    pub expression_data: String,
    pub transcripts: String,
    pub cells: String,
    #[serde(default)]
    pub clusters: Option<String>,
}

/// Contents of `project.json`; all paths are URLs relative to the project root
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub label: String,
    #[serde(default)]
    pub readme: Option<String>,
    pub treatments: String,
    pub abundance_measures: String,
    /// template with `%A` and `%B` placeholders
    pub pairwise_name: String,
    #[serde(default)]
    pub transcript_aliases: Option<String>,
    #[serde(default)]
    pub transcript_hyperlink: Vec<TranscriptHyperlink>,
    #[serde(default)]
    pub single_cell: Option<SingleCellConfig>,
}

impl ProjectConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// checks that do not need any other file
    pub fn validate(&self) -> Result<()> {
        if !self.pairwise_name.contains("%A") || !self.pairwise_name.contains("%B") {
            return Err(DredgeError::config(format!(
                "pairwiseName {:?} must contain both %A and %B",
                self.pairwise_name
            )));
        }
        Ok(())
    }
}

/// Parses `treatments.json` and checks every treatment has replicates
pub fn parse_treatments(text: &str) -> Result<BTreeMap<String, Treatment>> {
    let treatments: BTreeMap<String, Treatment> = serde_json::from_str(text)?;
    if treatments.is_empty() {
        return Err(DredgeError::config("no treatments defined"));
    }
    for (key, t) in treatments.iter() {
        if t.replicates.is_empty() {
            return Err(DredgeError::config(format!("treatment {key} has no replicates")));
        }
    }
    Ok(treatments)
}

static NEXT_PROJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Fetches the fields of one project, reporting each of them.
struct FieldLoader<'a> {
    fetcher: &'a dyn Fetcher,
    sink: &'a dyn StatusSink,
    failed: Vec<String>,
}

impl<'a> FieldLoader<'a> {
    /// Fetches `url` and hands the response to `parse`. Returns `None` (and
    /// remembers the field if `required`) when the resource is missing or bad.
    fn load<T>(
        &mut self,
        label: &str,
        url: &str,
        required: bool,
        parse: impl FnOnce(&Response) -> Result<(T, String)>,
    ) -> Option<T> {
        self.sink.report(label, url, LoadStatus::Pending, None);
        let outcome = match self.fetcher.fetch(url) {
            Ok(r) if r.ok() => parse(&r).map_err(|e| (LoadStatus::Failed, e.to_string())),
            Ok(r) => Err((LoadStatus::Missing, DredgeError::Fetch { url: url.to_string(), status: r.status }.to_string())),
            Err(e) => Err((LoadStatus::Failed, e.to_string())),
        };
        match outcome {
            Ok((value, message)) => {
                self.sink.report(label, url, LoadStatus::Ok, Some(&message));
                Some(value)
            }
            Err((status, message)) => {
                self.sink.report(label, url, status, Some(&message));
                if required {
                    self.failed.push(label.to_string());
                }
                None
            }
        }
    }

    /// reports a validation step that needs no fetch
    fn check(&mut self, label: &str, url: &str, result: Result<()>) {
        match result {
            Ok(()) => self.sink.report(label, url, LoadStatus::Ok, None),
            Err(e) => {
                self.sink.report(label, url, LoadStatus::Failed, Some(&e.to_string()));
                self.failed.push(label.to_string());
            }
        }
    }
}

/// A loaded project. Owns the caches derived from its data: the abundance
/// lookup and the pairwise comparisons. Reloading a project means building a
/// new `Project`, which starts with empty caches.
pub struct Project {
    id: u64,
    config: ProjectConfig,
    treatments: BTreeMap<String, Treatment>,
    abundances: Arc<AbundanceMatrix>,
    corpus: TranscriptCorpus,
    readme: Option<String>,
    single_cell: Option<SingleCellDataset>,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn StatusSink>,
    abundance_lookup: OnceLock<Arc<AbundanceLookup>>,
    comparisons: ComparisonCache,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("label", &self.config.label)
            .field("treatments", &self.treatments.len())
            .field("transcripts", &self.abundances.transcripts().len())
            .finish()
    }
}

impl Project {
    /// Loads a project, reporting to the log
    pub fn load(fetcher: Arc<dyn Fetcher>, config_url: &str) -> Result<Project> {
        Project::load_with_sink(fetcher, Arc::new(LogSink), config_url)
    }

    pub fn load_with_sink(fetcher: Arc<dyn Fetcher>, sink: Arc<dyn StatusSink>, config_url: &str) -> Result<Project> {
        let mut loader = FieldLoader { fetcher: fetcher.as_ref(), sink: sink.as_ref(), failed: Vec::new() };

        let config = loader
            .load("Project configuration", config_url, true, |r| {
                let config = ProjectConfig::from_json(r.text()?)?;
                let msg = config.label.clone();
                Ok((config, msg))
            })
            .ok_or_else(|| DredgeError::ProjectLoad { fields: loader.failed.clone() })?;

        loader.check("Pairwise file template", &config.pairwise_name, config.validate());

        let treatments = loader.load("Treatments", &config.treatments, true, |r| {
            let t = parse_treatments(r.text()?)?;
            let msg = format!("{} treatments", t.len());
            Ok((t, msg))
        });

        let abundances = loader.load("Abundance measures", &config.abundance_measures, true, |r| {
            let m = AbundanceMatrix::parse(r.text()?, &config.abundance_measures)?;
            let msg = format!("{} transcripts x {} replicates", m.transcripts().len(), m.replicates().len());
            Ok((m, msg))
        });

        let aliases = match &config.transcript_aliases {
            Some(url) => loader
                .load("Transcript aliases", url, false, |r| {
                    let a = parse_alias_file(r.text()?);
                    let msg = format!("{} transcripts with aliases", a.len());
                    Ok((a, msg))
                })
                .unwrap_or_default(),
            None => Vec::new(),
        };

        let readme = config.readme.as_ref().and_then(|url| {
            loader.load("Readme", url, false, |r| Ok((r.text()?.to_string(), String::new())))
        });

        let single_cell = config
            .single_cell
            .as_ref()
            .and_then(|sc| load_single_cell(&mut loader, sc));

        let (treatments, abundances) = match (treatments, abundances) {
            (Some(t), Some(a)) if loader.failed.is_empty() => (t, a),
            _ => return Err(DredgeError::ProjectLoad { fields: loader.failed }),
        };

        for (key, t) in treatments.iter() {
            let unknown: Vec<&String> = t.replicates.iter().filter(|r| !abundances.has_replicate(r)).collect();
            if !unknown.is_empty() {
                warn!("treatment {key}: replicates without abundance measures {unknown:?}");
            }
        }

        let bar = get_progressbar(0);
        if !log_enabled!(Level::Info) {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        let corpus = TranscriptCorpus::build_with_progress(abundances.transcripts(), &aliases, &bar);

        info!(
            "project {:?}: {} treatments, {} transcripts, {} names",
            config.label,
            treatments.len(),
            abundances.transcripts().len(),
            corpus.len()
        );

        Ok(Project {
            id: NEXT_PROJECT_ID.fetch_add(1, Ordering::Relaxed),
            config,
            treatments,
            abundances: Arc::new(abundances),
            corpus,
            readme,
            single_cell,
            fetcher,
            sink,
            abundance_lookup: OnceLock::new(),
            comparisons: ComparisonCache::new(),
        })
    }

    /// Assembles a project from already loaded parts
    pub fn from_parts(
        config: ProjectConfig,
        treatments: BTreeMap<String, Treatment>,
        abundances: AbundanceMatrix,
        corpus: TranscriptCorpus,
        fetcher: Arc<dyn Fetcher>,
        sink: Arc<dyn StatusSink>,
    ) -> Project {
        Project {
            id: NEXT_PROJECT_ID.fetch_add(1, Ordering::Relaxed),
            config,
            treatments,
            abundances: Arc::new(abundances),
            corpus,
            readme: None,
            single_cell: None,
            fetcher,
            sink,
            abundance_lookup: OnceLock::new(),
            comparisons: ComparisonCache::new(),
        }
    }

    /// process-unique identity of this loaded project
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn treatments(&self) -> &BTreeMap<String, Treatment> {
        &self.treatments
    }

    pub fn treatment(&self, key: &str) -> Result<&Treatment> {
        self.treatments
            .get(key)
            .ok_or_else(|| DredgeError::UnknownTreatment(key.to_string()))
    }

    pub fn abundances(&self) -> &Arc<AbundanceMatrix> {
        &self.abundances
    }

    pub fn corpus(&self) -> &TranscriptCorpus {
        &self.corpus
    }

    pub fn readme(&self) -> Option<&str> {
        self.readme.as_deref()
    }

    pub fn single_cell(&self) -> Option<&SingleCellDataset> {
        self.single_cell.as_ref()
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    pub fn sink(&self) -> &dyn StatusSink {
        self.sink.as_ref()
    }

    pub fn comparisons(&self) -> &ComparisonCache {
        &self.comparisons
    }

    /// The abundance lookup of this project, built on first use; every call
    /// returns the same instance.
    pub fn abundance_lookup(&self) -> Arc<AbundanceLookup> {
        self.abundance_lookup
            .get_or_init(|| Arc::new(AbundanceLookup::new(&self.treatments, self.abundances.clone())))
            .clone()
    }

    /// abundances of one transcript in every replicate of a treatment
    pub fn abundances_for(&self, treatment: &str, transcript: &str) -> Result<Vec<f64>> {
        self.abundance_lookup().abundances(treatment, transcript)
    }

    /// The `(A,B)` comparison, loaded at most once per treatment pair.
    pub fn pairwise_comparison(&self, treatment_a: &str, treatment_b: &str) -> Result<Arc<PairwiseComparison>> {
        self.comparisons
            .get_or_load(treatment_a, treatment_b, || fetch_pairwise_comparison(self, treatment_a, treatment_b))
    }

    /// links configured for a transcript, as `(label, url)`
    pub fn hyperlinks(&self, transcript: &str) -> Vec<(String, String)> {
        let label = self.corpus.canonical_or(transcript);
        self.config
            .transcript_hyperlink
            .iter()
            .map(|h| (h.label.clone(), h.url_for(label)))
            .collect()
    }
}

fn load_single_cell(loader: &mut FieldLoader, sc: &SingleCellConfig) -> Option<SingleCellDataset> {
    let transcripts = loader.load("Single-cell transcripts", &sc.transcripts, false, |r| {
        let t = parse_transcript_list(r.text()?);
        let msg = format!("{} transcripts", t.len());
        Ok((t, msg))
    })?;

    let cells = loader.load("Single-cell cells", &sc.cells, false, |r| {
        let c = parse_cells(r.text()?, &sc.cells)?;
        let msg = format!("{} cells", c.len());
        Ok((c, msg))
    })?;

    let clusters = match &sc.clusters {
        Some(url) => loader.load("Single-cell clusters", url, false, |r| {
            let c = parse_clusters(r.text()?)?;
            let msg = format!("{} clusters", c.len());
            Ok((c, msg))
        })?,
        None => BTreeMap::new(),
    };

    let n_cells = cells.len();
    loader.load("Single-cell expression", &sc.expression_data, false, move |r| {
        let m = SparseExpressionMatrix::new(r.bytes().to_vec(), transcripts, n_cells)?;
        let msg = format!("{} of {} transcripts expressed", m.n_expressed_transcripts(), m.transcripts().len());
        let dataset = SingleCellDataset::new(m, cells, clusters)?;
        Ok((dataset, msg))
    })
}
