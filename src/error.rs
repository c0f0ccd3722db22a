//! Error Taxonomy Module
//!
//! Every failure in a filter run is fatal. The three kinds a caller may want
//! to tell apart are collected in [`FilterError`]; everything else (I/O,
//! corrupt database files) travels as a plain `anyhow::Error` with context.
//!
//! Library functions return `anyhow::Result`, so the typed variant is
//! recovered with `err.downcast_ref::<FilterError>()`.

/// Fatal conditions raised by the filter pipeline.
#[derive(thiserror::Error, Debug)]
pub enum FilterError {
    /// Invalid option combination, detected before any input is read.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An input line that is not a valid 12-column BLAST tabular record.
    #[error("invalid BLAST tabular record on line {line_number}: {reason}: {line:?}")]
    MalformedRecord {
        line_number: usize,
        reason: String,
        line: String,
    },

    /// A gene name that does not resolve to exactly one datastore record.
    #[error("gene lookup failed for {gene:?}: {reason}")]
    Lookup { gene: String, reason: String },
}

impl FilterError {
    pub(crate) fn malformed(line_number: usize, reason: impl Into<String>, line: &str) -> Self {
        FilterError::MalformedRecord {
            line_number,
            reason: reason.into(),
            line: line.trim_end_matches(['\r', '\n']).to_string(),
        }
    }

    pub(crate) fn lookup(gene: &str, reason: impl Into<String>) -> Self {
        FilterError::Lookup {
            gene: gene.to_string(),
            reason: reason.into(),
        }
    }
}
