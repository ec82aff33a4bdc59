//! Single-cell datasets: sparse expression blob plus cell / cluster metadata
//!
//! # Example
//! ```rust
//! use dredge::singlecell::expression::{encode_expression_blob, SparseExpressionMatrix, SparseRecord};
//! let blob = encode_expression_blob(&[2.5], &[SparseRecord { transcript: 0, cell: 1, value_index: 0 }]).unwrap();
//! let matrix = SparseExpressionMatrix::new(blob, vec!["geneA".to_string()], 3).unwrap();
//! let dense = matrix.expressions_for_transcript("geneA", true).unwrap();
//! assert_eq!(dense.len(), 3);
//! ```
pub mod cells;
pub mod expression;

use std::collections::BTreeMap;
use crate::error::{DredgeError, Result};
use cells::{Cell, Cluster};
use expression::{SparseExpressionMatrix, TranscriptKey};

/// expression of one transcript summarized over the cells of one cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    pub cluster: String,
    pub label: String,
    pub n_cells: usize,
    /// cells with expression > 0
    pub n_expressing: usize,
    pub fraction_expressing: f64,
    /// mean over all cells of the cluster, zeros included
    pub mean_expression: f64,
}

#[derive(Debug, Clone)]
pub struct SingleCellDataset {
    expression: SparseExpressionMatrix,
    cells: Vec<Cell>,
    clusters: BTreeMap<String, Cluster>,
}

impl SingleCellDataset {
    pub fn new(expression: SparseExpressionMatrix, cells: Vec<Cell>, clusters: BTreeMap<String, Cluster>) -> Result<Self> {
        if expression.n_cells() != cells.len() {
            return Err(DredgeError::format(format!(
                "expression data covers {} cells, cell table has {}",
                expression.n_cells(),
                cells.len()
            )));
        }
        Ok(SingleCellDataset { expression, cells, clusters })
    }

    pub fn expression(&self) -> &SparseExpressionMatrix {
        &self.expression
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn clusters(&self) -> &BTreeMap<String, Cluster> {
        &self.clusters
    }

    /// Per-cluster expression of a transcript, ordered by cluster ID.
    /// Clusters referenced by cells but not declared are labelled by their ID.
    pub fn cluster_summaries<'a>(&self, key: impl Into<TranscriptKey<'a>>) -> Result<Vec<ClusterSummary>> {
        let expressions = self.expression.expressions_for_transcript(key, true)?;

        // cluster -> (n_cells, n_expressing, sum)
        let mut acc: BTreeMap<&str, (usize, usize, f64)> = BTreeMap::new();
        for (cell_idx, value) in expressions {
            let cell = &self.cells[cell_idx.0 as usize];
            let e = acc.entry(cell.cluster.as_str()).or_insert((0, 0, 0.0));
            e.0 += 1;
            if value > 0.0 {
                e.1 += 1;
            }
            e.2 += value as f64;
        }

        let summaries = acc
            .into_iter()
            .map(|(cluster, (n_cells, n_expressing, sum))| ClusterSummary {
                cluster: cluster.to_string(),
                label: self
                    .clusters
                    .get(cluster)
                    .map(|c| c.label.clone())
                    .unwrap_or_else(|| cluster.to_string()),
                n_cells,
                n_expressing,
                fraction_expressing: n_expressing as f64 / n_cells as f64,
                mean_expression: sum / n_cells as f64,
            })
            .collect();
        Ok(summaries)
    }
}
