//! Hit Classifier Module
//!
//! Decides whether an alignment that passed the identity threshold is a hit
//! under the active modes.
//!
//! # Modes
//! - **submatches**: every record is a hit; protein lengths are never consulted
//! - **full_matches**: both hit spans cover their whole reference protein
//! - **contained_sequences**: exactly one side covers its whole protein while
//!   the other side's span is strictly shorter than its protein
//!
//! Submatches overrides the length-based modes. The two length-based modes
//! are ORed. Because containment is an exclusive or, a pair where both sides
//! are full length is only reported by `full_matches`.

use anyhow::Result;

use crate::blast::AlignmentRecord;
use crate::error::FilterError;
use crate::genedb::GeneLengthResolver;

// ============================================================================
// Modes
// ============================================================================

/// Which classification rules are enabled. Modes are not mutually exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationModes {
    pub submatches: bool,
    pub contained_sequences: bool,
    pub full_matches: bool,
}

impl ClassificationModes {
    /// True if at least one mode is enabled.
    pub fn any(&self) -> bool {
        self.submatches || self.contained_sequences || self.full_matches
    }

    /// True if a length-based mode is enabled, which requires a gene store.
    pub fn needs_gene_lengths(&self) -> bool {
        self.contained_sequences || self.full_matches
    }
}

/// Rule that selected a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    Submatch,
    FullMatch,
    Contained,
}

// ============================================================================
// Length Rules
// ============================================================================

/// Hit spans and reference protein lengths for both sides of an alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanLengths {
    pub q_hit: i64,
    pub s_hit: i64,
    pub q_protein: i64,
    pub s_protein: i64,
}

impl SpanLengths {
    /// Both hit spans equal their protein lengths.
    pub fn is_full_match(&self) -> bool {
        self.q_hit == self.q_protein && self.s_hit == self.s_protein
    }

    /// One side spans its whole protein and the other is a proper sub-region.
    pub fn is_contained(&self) -> bool {
        let query_contained = self.q_hit == self.q_protein && self.s_hit < self.s_protein;
        let subject_contained = self.s_hit == self.s_protein && self.q_hit < self.q_protein;
        query_contained ^ subject_contained
    }

    /// Applies the enabled length-based modes, full match first.
    pub fn classify(&self, modes: ClassificationModes) -> Option<HitKind> {
        if modes.full_matches && self.is_full_match() {
            Some(HitKind::FullMatch)
        } else if modes.contained_sequences && self.is_contained() {
            Some(HitKind::Contained)
        } else {
            None
        }
    }
}

// ============================================================================
// Hit Classifier
// ============================================================================

/// Applies the configured modes to alignment records.
///
/// The gene length resolver is present exactly when a length-based mode is
/// enabled; this is checked once at construction.
pub struct HitClassifier {
    modes: ClassificationModes,
    resolver: Option<GeneLengthResolver>,
}

impl HitClassifier {
    /// Creates a classifier.
    ///
    /// # Errors
    /// [`FilterError::Configuration`] if no mode is enabled, or if a
    /// length-based mode is enabled without a resolver.
    pub fn new(modes: ClassificationModes, resolver: Option<GeneLengthResolver>) -> Result<Self> {
        if !modes.any() {
            return Err(FilterError::Configuration(
                "at least one of submatches, contained sequences or full matches must be enabled"
                    .to_string(),
            )
            .into());
        }
        if modes.needs_gene_lengths() && resolver.is_none() {
            return Err(FilterError::Configuration(
                "checking for full-length or contained matches requires a gene database".to_string(),
            )
            .into());
        }
        Ok(Self { modes, resolver })
    }

    pub fn modes(&self) -> ClassificationModes {
        self.modes
    }

    /// Classifies a record that already passed the identity threshold.
    ///
    /// Query then subject lengths are resolved only when submatches is off.
    ///
    /// # Errors
    /// Propagates [`FilterError::Lookup`] from the gene store.
    pub fn classify(&mut self, record: &AlignmentRecord) -> Result<Option<HitKind>> {
        if self.modes.submatches {
            return Ok(Some(HitKind::Submatch));
        }

        let resolver = match self.resolver.as_mut() {
            Some(resolver) => resolver,
            None => return Ok(None),
        };
        let q_protein = resolver.protein_length(&record.query_id)? as i64;
        let s_protein = resolver.protein_length(&record.subject_id)? as i64;

        let spans = SpanLengths {
            q_hit: record.q_hit_length(),
            s_hit: record.s_hit_length(),
            q_protein,
            s_protein,
        };
        Ok(spans.classify(self.modes))
    }

    /// Gene names resolved so far, zero without a resolver.
    pub fn resolved_genes(&self) -> usize {
        self.resolver.as_ref().map_or(0, |r| r.resolved_genes())
    }
}

// ============================================================================
// Tests
// ============================================================================
