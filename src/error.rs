//! Error taxonomy shared by every loader and decoder of the crate.
//!
//! None of these are retried internally: a failed load is reported to the
//! caller, who may simply invoke it again.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DredgeError {
    /// I/O errors other than a missing file (those surface as a 404 [`crate::fetch::Response`])
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// project.json / treatments.json / clusters.json could not be deserialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed single-cell expression blob (bad version, truncated buffer)
    #[error("Format error: {message}")]
    Format { message: String },

    /// Unknown transcript (by label or index) or other lookup key
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// A text file with a row that does not have the expected shape
    #[error("Malformed file {url} at line {line}: {message}")]
    MalformedFile {
        url: String,
        line: usize,
        message: String,
    },

    /// Neither `url(A,B)` nor `url(B,A)` could be fetched
    #[error("No pairwise comparison for {treatment_a} vs {treatment_b} (tried {tried:?})")]
    ComparisonNotFound {
        treatment_a: String,
        treatment_b: String,
        tried: Vec<String>,
    },

    #[error("Unknown treatment: {0}")]
    UnknownTreatment(String),

    /// A required resource answered with a non-OK status
    #[error("Failed to fetch {url}: status {status}")]
    Fetch { url: String, status: u16 },

    /// Degenerate axis handed to the plot binning
    #[error("Invalid scale: {message}")]
    InvalidScale { message: String },

    /// Invalid project configuration (bad template, empty treatment, ...)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// One or more required project fields failed to load
    #[error("Project failed to load, failed fields: {fields:?}")]
    ProjectLoad { fields: Vec<String> },
}

pub type Result<T> = std::result::Result<T, DredgeError>;

impl DredgeError {
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn malformed(url: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::MalformedFile {
            url: url.into(),
            line,
            message: message.into(),
        }
    }

    pub fn invalid_scale(message: impl Into<String>) -> Self {
        Self::InvalidScale {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
