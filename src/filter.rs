//! Similarity Filter Module
//!
//! The single-pass filtering loop. For every input line:
//!
//! 1. Parse the line (fatal on malformed input)
//! 2. Skip self-pairs and pairs already emitted
//! 3. Skip records below the identity threshold
//! 4. Classify, resolving gene lengths when needed
//! 5. On a hit, echo the raw line and remember the pair
//!
//! Any error aborts the run; lines after the failing one are never written.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::blast::{AlignmentRecord, BlastReader};
use crate::classifier::{ClassificationModes, HitClassifier};
use crate::error::FilterError;
use crate::genedb::GeneLengthResolver;
use crate::pairs::PairTracker;

// ============================================================================
// Configuration
// ============================================================================

/// Resolved options for one filter run.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Records below this percent identity are ignored.
    pub min_percent_id: f64,
    /// Enabled classification modes.
    pub modes: ClassificationModes,
    /// Gene database or protein FASTA, required for length-based modes.
    pub gene_db: Option<PathBuf>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_percent_id: 100.0,
            modes: ClassificationModes::default(),
            gene_db: None,
        }
    }
}

impl FilterConfig {
    /// Checks option combinations without touching the filesystem.
    pub fn validate(&self) -> Result<(), FilterError> {
        if !self.modes.any() {
            return Err(FilterError::Configuration(
                "need to display at least one of submatches, contained sequences or full matches"
                    .to_string(),
            ));
        }
        if self.modes.needs_gene_lengths() && self.gene_db.is_none() {
            return Err(FilterError::Configuration(
                "checking for full-length or contained matches requires a gene database (--gene-db)"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Per-run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub lines: usize,
    pub self_pairs: usize,
    pub duplicate_pairs: usize,
    pub below_threshold: usize,
    pub not_hits: usize,
    pub emitted: usize,
}

// ============================================================================
// Similarity Filter
// ============================================================================

/// Owns the state of one run: the classifier and the set of emitted pairs.
pub struct SimilarityFilter {
    min_percent_id: f64,
    classifier: HitClassifier,
    pairs: PairTracker,
    stats: FilterStats,
}

impl SimilarityFilter {
    pub fn new(min_percent_id: f64, classifier: HitClassifier) -> Self {
        Self {
            min_percent_id,
            classifier,
            pairs: PairTracker::new(),
            stats: FilterStats::default(),
        }
    }

    /// Validates `config` and opens the gene store if a length-based mode needs it.
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        config.validate()?;

        let resolver = match (&config.gene_db, config.modes.needs_gene_lengths()) {
            (Some(path), true) => {
                info!("Opening gene database {}", path.display());
                Some(GeneLengthResolver::open(path)?)
            }
            (Some(path), false) => {
                warn!("Gene database {} not needed for submatches only; ignoring", path.display());
                None
            }
            (None, _) => None,
        };

        let classifier = HitClassifier::new(config.modes, resolver)?;
        Ok(Self::new(config.min_percent_id, classifier))
    }

    /// Runs the filter over every line of `reader`, writing hits to `out`.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        reader: &mut BlastReader<R>,
        out: &mut W,
    ) -> Result<FilterStats> {
        while let Some(record) = reader.read_next()? {
            self.stats.lines += 1;
            if self.process(&record)? {
                out.write_all(reader.raw_line().as_bytes())
                    .context("Failed to write output line")?;
            }
        }

        debug!(
            "{} distinct pairs emitted, {} gene names resolved",
            self.pairs.len(),
            self.classifier.resolved_genes()
        );
        Ok(self.stats.clone())
    }

    /// Decides whether `record` is emitted, marking its pair when it is.
    pub fn process(&mut self, record: &AlignmentRecord) -> Result<bool> {
        if record.is_self_pair() {
            self.stats.self_pairs += 1;
            return Ok(false);
        }
        if !self.pairs.is_new(&record.query_id, &record.subject_id) {
            self.stats.duplicate_pairs += 1;
            return Ok(false);
        }
        // NaN identities never pass.
        if record.percent_identity.is_nan() || record.percent_identity < self.min_percent_id {
            self.stats.below_threshold += 1;
            return Ok(false);
        }

        match self.classifier.classify(record)? {
            Some(kind) => {
                debug!("{:?}: {} {}", kind, record.query_id, record.subject_id);
                self.pairs.mark_seen(&record.query_id, &record.subject_id);
                self.stats.emitted += 1;
                Ok(true)
            }
            None => {
                self.stats.not_hits += 1;
                Ok(false)
            }
        }
    }

    pub fn stats(&self) -> &FilterStats {
        &self.stats
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Filters `input` into `output` (stdout when `None`).
///
/// The configuration is validated before the input is opened. On failure,
/// output already produced is flushed before the error is returned.
pub fn run_filter(config: &FilterConfig, input: &Path, output: Option<&Path>) -> Result<FilterStats> {
    let mut filter = SimilarityFilter::from_config(config)?;
    let mut reader = BlastReader::open(input)?;

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("Failed to create output: {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(sink);

    match filter.run(&mut reader, &mut writer) {
        Ok(stats) => {
            writer.flush().context("Failed to flush output")?;
            Ok(stats)
        }
        Err(e) => {
            let _ = writer.flush();
            Err(e)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
