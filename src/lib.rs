//! simpairs - find highly similar sequence pairs in BLAST tabular output
//!
//! Filters all-vs-all BLAST results down to pairs of sequences that are
//! identical or nearly so, optionally requiring full-length or contained
//! matches checked against reference protein lengths.
//!
//! # Modules
//! - `blast`: BLAST tabular (`-m 8` / `-outfmt 6`) parsing
//! - `pairs`: unordered pair deduplication
//! - `classifier`: submatch / full-match / containment rules
//! - `genedb`: gene name to reference protein lookup
//! - `gdb`: indexed gene database format and builder
//! - `seqio`: FASTA reading with gzip support
//! - `filter`: the filtering loop and run configuration
//! - `error`: fatal error taxonomy

pub mod error;
pub mod seqio;
pub mod blast;
pub mod pairs;
pub mod gdb;
pub mod genedb;
pub mod classifier;
pub mod filter;

pub use error::FilterError;
pub use filter::{run_filter, FilterConfig, FilterStats, SimilarityFilter};
