//! Decoding the sparse single-cell expression blob
//!
//! Layout, all little endian:
//!
//! | field | size |
//! |---|---|
//! | version (must be 2) | u16 |
//! | float table size `n` | u16 |
//! | float table | `n` x f32 |
//! | records | repeated `[transcript: u16][cell: u16][float index: u16]` |
//!
//! Only non-zero cells are stored, and the actual values are indirected
//! through the float table. Records of one transcript are contiguous, which
//! lets us index each transcript's byte range in a single pass.
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use serde::{Serialize, Deserialize};
use log::debug;
use crate::error::{DredgeError, Result};

pub const SUPPORTED_VERSION: u16 = 2;
pub const HEADER_SIZE: usize = 4;
pub const RECORD_SIZE: usize = 6;
const FLOAT_SIZE: usize = 4;
/// transcripts and cells are addressed by u16 in the records
pub const MAX_ENTRIES: usize = u16::MAX as usize + 1;

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub struct ExpressionHeader {
    pub version: u16,
    pub float_table_size: u16,
}

/// a single non-zero entry of the matrix
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub struct SparseRecord {
    pub transcript: u16,
    pub cell: u16,
    pub value_index: u16,
}

/// row of the matrix (position in the transcript list)
#[derive(Eq, PartialEq, Hash, Ord, PartialOrd, Copy, Clone, Debug)]
pub struct TranscriptIndex(pub u16);

/// column of the matrix (position in the cell list)
#[derive(Eq, PartialEq, Hash, Ord, PartialOrd, Copy, Clone, Debug)]
pub struct CellIndex(pub u16);

/// A transcript given either by its row or by its label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptKey<'a> {
    Index(TranscriptIndex),
    Label(&'a str),
}

impl<'a> From<&'a str> for TranscriptKey<'a> {
    fn from(label: &'a str) -> Self {
        TranscriptKey::Label(label)
    }
}

impl From<TranscriptIndex> for TranscriptKey<'_> {
    fn from(idx: TranscriptIndex) -> Self {
        TranscriptKey::Index(idx)
    }
}

fn decode_record(bytes: &[u8]) -> Result<SparseRecord> {
    bincode::deserialize(bytes).map_err(|e| DredgeError::format(format!("bad record: {e}")))
}

#[derive(Debug, Clone)]
pub struct SparseExpressionMatrix {
    buffer: Vec<u8>,
    header: ExpressionHeader,
    float_table: Vec<f32>,
    // byte range of each transcript's records
    ranges: HashMap<TranscriptIndex, Range<usize>>,
    transcripts: Vec<String>,
    label_index: HashMap<String, TranscriptIndex>,
    n_cells: usize,
}

impl SparseExpressionMatrix {
    /// Decodes the header and float table and indexes the record section.
    ///
    /// `transcripts` are the row labels (line `i` of the transcript file is row `i`),
    /// `n_cells` the number of columns. Any inconsistency is a [`DredgeError::Format`].
    pub fn new(buffer: Vec<u8>, transcripts: Vec<String>, n_cells: usize) -> Result<Self> {
        if transcripts.len() > MAX_ENTRIES {
            return Err(DredgeError::format(format!(
                "{} transcripts, records can address at most {MAX_ENTRIES}",
                transcripts.len()
            )));
        }
        if n_cells > MAX_ENTRIES {
            return Err(DredgeError::format(format!("{n_cells} cells, records can address at most {MAX_ENTRIES}")));
        }
        if buffer.len() < HEADER_SIZE {
            return Err(DredgeError::format(format!("buffer of {} bytes has no header", buffer.len())));
        }
        let header: ExpressionHeader = bincode::deserialize(&buffer[..HEADER_SIZE])
            .map_err(|e| DredgeError::format(format!("bad header: {e}")))?;

        if header.version != SUPPORTED_VERSION {
            return Err(DredgeError::format(format!(
                "unsupported expression data version {} (expected {})",
                header.version, SUPPORTED_VERSION
            )));
        }

        let records_start = HEADER_SIZE + header.float_table_size as usize * FLOAT_SIZE;
        if buffer.len() < records_start {
            return Err(DredgeError::format(format!(
                "truncated float table: need {} bytes, have {}",
                records_start,
                buffer.len()
            )));
        }
        let float_table: Vec<f32> = buffer[HEADER_SIZE..records_start]
            .chunks_exact(FLOAT_SIZE)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        if (buffer.len() - records_start) % RECORD_SIZE != 0 {
            return Err(DredgeError::format(format!(
                "record section of {} bytes is not a multiple of {}",
                buffer.len() - records_start,
                RECORD_SIZE
            )));
        }

        let ranges = index_transcripts(&buffer, records_start, &float_table, transcripts.len(), n_cells)?;

        // a label listed twice resolves to its first row
        let mut label_index = HashMap::with_capacity(transcripts.len());
        for (t, i) in transcripts.iter().zip(0..=u16::MAX) {
            label_index.entry(t.clone()).or_insert(TranscriptIndex(i));
        }

        debug!(
            "expression blob: {} transcripts with data, {} float values, {} records",
            ranges.len(),
            float_table.len(),
            (buffer.len() - records_start) / RECORD_SIZE
        );

        Ok(SparseExpressionMatrix { buffer, header, float_table, ranges, transcripts, label_index, n_cells })
    }

    pub fn header(&self) -> ExpressionHeader {
        self.header
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn transcripts(&self) -> &[String] {
        &self.transcripts
    }

    pub fn float_table(&self) -> &[f32] {
        &self.float_table
    }

    /// number of transcripts that have at least one record
    pub fn n_expressed_transcripts(&self) -> usize {
        self.ranges.len()
    }

    pub fn transcript_index<'a>(&self, key: impl Into<TranscriptKey<'a>>) -> Result<TranscriptIndex> {
        match key.into() {
            TranscriptKey::Label(label) => self
                .label_index
                .get(label)
                .copied()
                .ok_or_else(|| DredgeError::not_found(format!("transcript {label}"))),
            TranscriptKey::Index(idx) => {
                if (idx.0 as usize) < self.transcripts.len() {
                    Ok(idx)
                } else {
                    Err(DredgeError::not_found(format!("transcript index {}", idx.0)))
                }
            }
        }
    }

    /// Expression of one transcript per cell.
    ///
    /// Without `include_zeros` only cells that have a record are returned,
    /// with it every cell of the dataset is present, defaulting to 0.
    pub fn expressions_for_transcript<'a>(
        &self,
        key: impl Into<TranscriptKey<'a>>,
        include_zeros: bool,
    ) -> Result<BTreeMap<CellIndex, f32>> {
        let idx = self.transcript_index(key)?;

        let mut expressions: BTreeMap<CellIndex, f32> = if include_zeros {
            (0..=u16::MAX).take(self.n_cells).map(|c| (CellIndex(c), 0.0)).collect()
        } else {
            BTreeMap::new()
        };

        if let Some(range) = self.ranges.get(&idx) {
            for chunk in self.buffer[range.clone()].chunks_exact(RECORD_SIZE) {
                let record = decode_record(chunk)?;
                // float indices were validated while indexing
                let value = self.float_table[record.value_index as usize];
                expressions.insert(CellIndex(record.cell), value);
            }
        }
        Ok(expressions)
    }
}

/// single pass over the records, noting where each transcript starts;
/// also validates every record against the table and the dimensions
fn index_transcripts(
    buffer: &[u8],
    records_start: usize,
    float_table: &[f32],
    n_transcripts: usize,
    n_cells: usize,
) -> Result<HashMap<TranscriptIndex, Range<usize>>> {
    let mut ranges: HashMap<TranscriptIndex, Range<usize>> = HashMap::new();
    let mut current: Option<(TranscriptIndex, usize)> = None;

    for (i, chunk) in buffer[records_start..].chunks_exact(RECORD_SIZE).enumerate() {
        let offset = records_start + i * RECORD_SIZE;
        let record = decode_record(chunk)?;

        if record.transcript as usize >= n_transcripts {
            return Err(DredgeError::format(format!(
                "record at byte {offset} references transcript {} of {}",
                record.transcript, n_transcripts
            )));
        }
        if record.cell as usize >= n_cells {
            return Err(DredgeError::format(format!(
                "record at byte {offset} references cell {} of {}",
                record.cell, n_cells
            )));
        }
        if record.value_index as usize >= float_table.len() {
            return Err(DredgeError::format(format!(
                "record at byte {offset} references float {} of {}",
                record.value_index,
                float_table.len()
            )));
        }

        let t = TranscriptIndex(record.transcript);
        match current {
            Some((cur, _)) if cur == t => {}
            _ => {
                if let Some((prev, start)) = current {
                    ranges.insert(prev, start..offset);
                }
                if ranges.contains_key(&t) {
                    return Err(DredgeError::format(format!(
                        "records of transcript {} are not contiguous",
                        t.0
                    )));
                }
                current = Some((t, offset));
            }
        }
    }
    if let Some((last, start)) = current {
        ranges.insert(last, start..buffer.len());
    }
    Ok(ranges)
}

/// Writes a blob in the layout read by [`SparseExpressionMatrix`].
/// Records are written in the order given; keep each transcript's records together.
pub fn encode_expression_blob(float_table: &[f32], records: &[SparseRecord]) -> Result<Vec<u8>> {
    let table_size = u16::try_from(float_table.len())
        .map_err(|_| DredgeError::format(format!("float table of {} entries too large", float_table.len())))?;
    let header = ExpressionHeader { version: SUPPORTED_VERSION, float_table_size: table_size };

    let mut buf = bincode::serialize(&header).map_err(|e| DredgeError::format(e.to_string()))?;
    for f in float_table {
        buf.extend_from_slice(&f.to_le_bytes());
    }
    for r in records {
        let bytes = bincode::serialize(r).map_err(|e| DredgeError::format(e.to_string()))?;
        buf.extend_from_slice(&bytes);
    }
    Ok(buf)
}
