//! Abundance measures: transcript x replicate matrix and the per-treatment lookup over it.
//!
//! The matrix file is tab separated: a header row naming the replicates,
//! then one row per transcript (`transcriptID\tvalue\tvalue...`).
//! Empty / `NA` cells are treated as not measured.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use crate::error::{DredgeError, Result};
use crate::project::Treatment;
use crate::utils::parse_optional_float;

#[derive(Debug, Clone)]
pub struct AbundanceMatrix {
    replicates: Vec<String>,
    replicate_index: HashMap<String, usize>,
    transcripts: Vec<String>,
    transcript_index: HashMap<String, usize>,
    values: Vec<Vec<Option<f64>>>,
}

impl AbundanceMatrix {
    /// parses the TSV abundance file; `url` is only used in error messages
    pub fn parse(text: &str, url: &str) -> Result<Self> {
        let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

        let (_, header) = lines
            .next()
            .ok_or_else(|| DredgeError::malformed(url, 1, "empty abundance file"))?;
        let replicates: Vec<String> = header
            .split('\t')
            .skip(1)
            .map(|r| r.trim().to_string())
            .collect();
        if replicates.is_empty() {
            return Err(DredgeError::malformed(url, 1, "header names no replicates"));
        }
        let replicate_index = replicates
            .iter()
            .enumerate()
            .map(|(i, r)| (r.clone(), i))
            .collect();

        let mut transcripts = Vec::new();
        let mut transcript_index = HashMap::new();
        let mut values = Vec::new();

        for (i, line) in lines {
            let lineno = i + 1;
            let mut fields = line.split('\t');
            let transcript = fields.next().unwrap_or("").trim();
            if transcript.is_empty() {
                return Err(DredgeError::malformed(url, lineno, "missing transcript id"));
            }
            let row: Vec<Option<f64>> = fields.map(parse_optional_float).collect();
            if row.len() != replicates.len() {
                return Err(DredgeError::malformed(
                    url,
                    lineno,
                    format!("expected {} values, got {}", replicates.len(), row.len()),
                ));
            }
            if transcript_index.contains_key(transcript) {
                return Err(DredgeError::malformed(url, lineno, format!("duplicate transcript {transcript}")));
            }
            transcript_index.insert(transcript.to_string(), transcripts.len());
            transcripts.push(transcript.to_string());
            values.push(row);
        }

        Ok(AbundanceMatrix { replicates, replicate_index, transcripts, transcript_index, values })
    }

    /// replicate IDs in column order
    pub fn replicates(&self) -> &[String] {
        &self.replicates
    }

    /// transcript IDs in row order
    pub fn transcripts(&self) -> &[String] {
        &self.transcripts
    }

    pub fn has_replicate(&self, replicate: &str) -> bool {
        self.replicate_index.contains_key(replicate)
    }

    pub fn has_transcript(&self, transcript: &str) -> bool {
        self.transcript_index.contains_key(transcript)
    }

    /// the measured value, `None` if not measured or either key is unknown
    pub fn value(&self, transcript: &str, replicate: &str) -> Option<f64> {
        let row = *self.transcript_index.get(transcript)?;
        let col = *self.replicate_index.get(replicate)?;
        self.values[row][col]
    }
}

/// Resolves `(treatment, transcript)` to the list of replicate abundances.
///
/// Replicate columns are resolved once at construction, so a lookup is two
/// hash probes plus a walk over the treatment's columns.
/// Obtain it via [`crate::project::Project::abundance_lookup`] to get the memoized instance.
#[derive(Debug)]
pub struct AbundanceLookup {
    matrix: Arc<AbundanceMatrix>,
    columns: HashMap<String, Vec<usize>>,
}

impl AbundanceLookup {
    pub fn new(treatments: &BTreeMap<String, Treatment>, matrix: Arc<AbundanceMatrix>) -> Self {
        let columns = treatments
            .iter()
            .map(|(key, treatment)| {
                // replicates missing from the matrix contribute nothing
                let cols: Vec<usize> = treatment
                    .replicates
                    .iter()
                    .filter_map(|r| matrix.replicate_index.get(r).copied())
                    .collect();
                (key.clone(), cols)
            })
            .collect();
        AbundanceLookup { matrix, columns }
    }

    pub fn matrix(&self) -> &Arc<AbundanceMatrix> {
        &self.matrix
    }

    /// Abundances of `transcript` in each replicate of `treatment`, in the
    /// treatment's replicate order. Unmeasured cells are skipped, an unknown
    /// transcript yields an empty list.
    pub fn abundances(&self, treatment: &str, transcript: &str) -> Result<Vec<f64>> {
        let cols = self
            .columns
            .get(treatment)
            .ok_or_else(|| DredgeError::UnknownTreatment(treatment.to_string()))?;

        let row = match self.matrix.transcript_index.get(transcript) {
            Some(&row) => &self.matrix.values[row],
            None => return Ok(Vec::new()),
        };
        Ok(cols.iter().filter_map(|&c| row[c]).collect())
    }
}
