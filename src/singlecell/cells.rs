//! Cell and cluster metadata of a single-cell dataset
use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use crate::error::{DredgeError, Result};
use crate::utils::parse_optional_float;

/// A single cell: its cluster assignment and 2D UMAP embedding
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub id: String,
    pub cluster: String,
    pub umap: (f64, f64),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub label: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// cells TSV: header row, then `cellID\tclusterID\tumap1\tumap2`.
/// The row order defines the cell indices of the expression blob.
pub fn parse_cells(text: &str, url: &str) -> Result<Vec<Cell>> {
    let mut cells = Vec::new();
    for (i, line) in text.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').map(|f| f.trim()).collect();
        if fields.len() != 4 {
            return Err(DredgeError::malformed(url, i + 1, format!("expected 4 columns, got {}", fields.len())));
        }
        let x = parse_optional_float(fields[2])
            .ok_or_else(|| DredgeError::malformed(url, i + 1, format!("bad UMAP coordinate {}", fields[2])))?;
        let y = parse_optional_float(fields[3])
            .ok_or_else(|| DredgeError::malformed(url, i + 1, format!("bad UMAP coordinate {}", fields[3])))?;
        cells.push(Cell { id: fields[0].to_string(), cluster: fields[1].to_string(), umap: (x, y) });
    }
    Ok(cells)
}

/// clusters JSON: `{ "<clusterID>": { "label": "...", "color": "#..." } }`
pub fn parse_clusters(text: &str) -> Result<BTreeMap<String, Cluster>> {
    Ok(serde_json::from_str(text)?)
}

/// transcript labels, one per line; line `i` is row `i` of the expression blob
pub fn parse_transcript_list(text: &str) -> Vec<String> {
    let mut labels: Vec<String> = text.lines().map(|l| l.trim().to_string()).collect();
    // only trailing blank lines can be dropped without shifting indices
    while labels.last().is_some_and(|l| l.is_empty()) {
        labels.pop();
    }
    labels
}
