//! # dredge
//!
//! Data layer of a differential gene-expression explorer: loads a project
//! (treatments, abundance measures, transcript aliases, pairwise comparisons,
//! optional single-cell data) and turns it into what an MA plot and a
//! transcript table need.
//!
//! # Basics of the library
//! Everything starts with a [`project::Project`], loaded through a
//! [`fetch::Fetcher`] (a directory on disk via [`fetch::FsFetcher`], or an
//! in-memory map via [`fetch::MemoryFetcher`] for testing).
//! Each field of the project is loaded independently and reported to a
//! [`status::StatusSink`].
//! ```rust, no_run
//! # use dredge::project::Project;
//! # use dredge::fetch::FsFetcher;
//! # use std::sync::Arc;
//! let project = Project::load(Arc::new(FsFetcher::new("/path/to/project")), "project.json").unwrap();
//! for (key, treatment) in project.treatments() {
//!     println!("{key}: {} ({} replicates)", treatment.label, treatment.replicates.len());
//! }
//! ```
//!
//! ## Pairwise comparisons
//! [`pairwise::PairwiseComparison`]s are loaded on demand and cached per
//! project. Asking for `(B, A)` when only the `A, B` file exists gives the
//! same records with logFC negated.
//! ```rust, no_run
//! # use dredge::project::Project;
//! # use dredge::fetch::FsFetcher;
//! # use std::sync::Arc;
//! # let project = Project::load(Arc::new(FsFetcher::new("/path/to/project")), "project.json").unwrap();
//! let comparison = project.pairwise_comparison("control", "heat_shock").unwrap();
//! let most_down = comparison.fc_sorted().next();
//! ```
//!
//! ## MA plot and table
//! [`bins::get_plot_bins`] bins a comparison into a grid of plot cells,
//! [`display::display_list`] filters and sorts records for the table.
//! ```rust, no_run
//! # use dredge::project::Project;
//! # use dredge::fetch::FsFetcher;
//! # use std::sync::Arc;
//! use dredge::bins::get_plot_bins;
//! use dredge::display::{display_list, DisplayFilters, SortOrder, SortPath};
//! use dredge::scale::LinearScale;
//! # let project = Project::load(Arc::new(FsFetcher::new("/path/to/project")), "project.json").unwrap();
//! # let comparison = project.pairwise_comparison("control", "heat_shock").unwrap();
//! let x = LinearScale::new((0.0, 12.0), (0.0, 600.0)).unwrap();
//! let y = LinearScale::new((-6.0, 6.0), (400.0, 0.0)).unwrap();
//! let bins = get_plot_bins(&comparison, |r| r.passes_p_value(0.05), &x, &y, 10.0).unwrap();
//!
//! let filters = DisplayFilters { p_value_threshold: 0.05, ..Default::default() };
//! let table = display_list(&comparison, &filters, SortPath::PValue, SortOrder::Asc);
//! ```
//!
//! ## Single-cell data
//! [`singlecell::expression::SparseExpressionMatrix`] decodes the binary
//! sparse expression blob, [`singlecell::SingleCellDataset`] adds cell and
//! cluster metadata.

pub mod abundance;
pub mod bins;
pub mod corpus;
pub mod display;
pub mod error;
pub mod fetch;
pub mod histogram;
pub mod pairwise;
pub mod project;
pub mod scale;
pub mod singlecell;
pub mod status;
pub mod utils;
