//! BLAST Tabular Parser Module
//!
//! Parses the 12-column tabular output produced by `blastall -m 8` or
//! `blast+ -outfmt 6`.
//!
//! # Tabular Format (12 mandatory columns)
//! ```text
//! Col  Type    Description
//! 1    string  Query id (db|gene_name|...)
//! 2    string  Subject id (db|gene_name|...)
//! 3    float   Percent identity
//! 4    int     Alignment length
//! 5    int     Number of mismatches
//! 6    int     Number of gap openings
//! 7    int     Query start (1-based, inclusive)
//! 8    int     Query end
//! 9    int     Subject start (1-based, inclusive)
//! 10   int     Subject end
//! 11   float   E-value
//! 12   float   Bit score
//! ```
//!
//! Unlike PAF-style readers, nothing is skipped: blank lines and comment
//! lines are malformed records. The reader keeps the raw text of the last
//! line (terminator included) so that hits can be echoed verbatim.
//!
//! # Example Usage
//! ```no_run
//! use simpairs::blast::BlastReader;
//!
//! let mut reader = BlastReader::open("hits.m8").unwrap();
//! while let Some(record) = reader.read_next().unwrap() {
//!     println!("{} -> {} ({:.1}% identity)",
//!              record.query_id, record.subject_id, record.percent_identity);
//! }
//! ```

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use crate::error::FilterError;

/// Number of columns in a BLAST tabular line.
pub const BLAST_TABULAR_FIELDS: usize = 12;

// ============================================================================
// Alignment Record
// ============================================================================

/// A single BLAST tabular alignment record.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    /// Query sequence id (column 1).
    pub query_id: String,
    /// Subject sequence id (column 2).
    pub subject_id: String,
    /// Percent identity (column 3).
    pub percent_identity: f64,
    /// Alignment length (column 4).
    pub alignment_length: i64,
    /// Mismatch count (column 5).
    pub num_mismatches: i64,
    /// Gap opening count (column 6).
    pub num_gap_opens: i64,
    /// Query start, 1-based (column 7).
    pub q_start: i64,
    /// Query end, inclusive (column 8).
    pub q_end: i64,
    /// Subject start, 1-based (column 9).
    pub s_start: i64,
    /// Subject end, inclusive (column 10). Smaller than `s_start` on the minus strand.
    pub s_end: i64,
    /// Expect value (column 11).
    pub e_value: f64,
    /// Bit score (column 12).
    pub score: f64,
}

impl AlignmentRecord {
    /// Parses a record from one line of tabular output.
    ///
    /// The line is split on any whitespace and must yield exactly 12 fields.
    /// `line_number` is only used for error reporting.
    ///
    /// # Errors
    /// Returns [`FilterError::MalformedRecord`] if:
    /// - The line does not have exactly 12 fields
    /// - Any numeric field cannot be parsed
    pub fn parse_line(line: &str, line_number: usize) -> Result<Self, FilterError> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != BLAST_TABULAR_FIELDS {
            return Err(FilterError::malformed(
                line_number,
                format!("expected {} fields, got {}", BLAST_TABULAR_FIELDS, fields.len()),
                line,
            ));
        }

        let record = Self {
            query_id: fields[0].to_string(),
            subject_id: fields[1].to_string(),
            percent_identity: parse_field(fields[2], "percent identity", line_number, line)?,
            alignment_length: parse_field(fields[3], "alignment length", line_number, line)?,
            num_mismatches: parse_field(fields[4], "mismatch count", line_number, line)?,
            num_gap_opens: parse_field(fields[5], "gap open count", line_number, line)?,
            q_start: parse_field(fields[6], "query start", line_number, line)?,
            q_end: parse_field(fields[7], "query end", line_number, line)?,
            s_start: parse_field(fields[8], "subject start", line_number, line)?,
            s_end: parse_field(fields[9], "subject end", line_number, line)?,
            e_value: parse_field(fields[10], "e-value", line_number, line)?,
            score: parse_field(fields[11], "bit score", line_number, line)?,
        };

        if span_length(record.q_start, record.q_end).is_none() {
            return Err(FilterError::malformed(line_number, "query span overflows", line));
        }
        if span_length(record.s_start, record.s_end).is_none() {
            return Err(FilterError::malformed(line_number, "subject span overflows", line));
        }
        Ok(record)
    }

    /// Length of the aligned region on the query: `q_end - q_start + 1`.
    ///
    /// Saturates for coordinates that [`parse_line`](Self::parse_line) would reject.
    pub fn q_hit_length(&self) -> i64 {
        span_length(self.q_start, self.q_end).unwrap_or(i64::MAX)
    }

    /// Length of the aligned region on the subject: `s_end - s_start + 1`.
    ///
    /// Zero or negative for minus-strand subject coordinates.
    pub fn s_hit_length(&self) -> i64 {
        span_length(self.s_start, self.s_end).unwrap_or(i64::MAX)
    }

    /// True when query and subject are the same sequence.
    pub fn is_self_pair(&self) -> bool {
        self.query_id == self.subject_id
    }
}

/// Inclusive span length `end - start + 1`, `None` on i64 overflow.
fn span_length(start: i64, end: i64) -> Option<i64> {
    end.checked_sub(start)?.checked_add(1)
}

/// Parses one column, mapping failure to a malformed-record error.
fn parse_field<T: FromStr>(
    raw: &str,
    name: &str,
    line_number: usize,
    line: &str,
) -> Result<T, FilterError> {
    raw.parse::<T>().map_err(|_| {
        FilterError::malformed(line_number, format!("invalid {}: {:?}", name, raw), line)
    })
}

// ============================================================================
// BLAST Reader
// ============================================================================

/// Sequential reader for BLAST tabular files.
///
/// After a successful [`read_next`](Self::read_next), [`raw_line`](Self::raw_line)
/// returns the exact text the record was parsed from.
pub struct BlastReader<R: BufRead> {
    reader: R,
    line_buf: String,
    line_number: usize,
}

impl BlastReader<Box<dyn BufRead>> {
    /// Opens a tabular file for reading.
    ///
    /// `-` reads from stdin. Files ending in `.gz` are decompressed on the fly.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path == Path::new("-") {
            return Ok(Self::new(Box::new(BufReader::new(io::stdin()))));
        }

        let file = File::open(path)
            .with_context(|| format!("Failed to open BLAST table: {}", path.display()))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let reader: Box<dyn BufRead> = if ext == "gz" {
            Box::new(BufReader::with_capacity(1024 * 1024, MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::with_capacity(1024 * 1024, file))
        };
        Ok(Self::new(reader))
    }
}

impl<R: BufRead> BlastReader<R> {
    /// Wraps any buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_buf: String::with_capacity(512),
            line_number: 0,
        }
    }

    /// Reads and parses the next line.
    ///
    /// # Returns
    /// - `Ok(Some(record))` - Successfully read a record
    /// - `Ok(None)` - End of input reached
    /// - `Err(e)` - I/O error or malformed record
    pub fn read_next(&mut self) -> Result<Option<AlignmentRecord>> {
        self.line_buf.clear();
        let n = self
            .reader
            .read_line(&mut self.line_buf)
            .with_context(|| format!("Failed to read BLAST line {}", self.line_number + 1))?;
        if n == 0 {
            return Ok(None);
        }
        self.line_number += 1;

        Ok(Some(AlignmentRecord::parse_line(&self.line_buf, self.line_number)?))
    }

    /// Raw text of the most recently read line, including its terminator.
    pub fn raw_line(&self) -> &str {
        &self.line_buf
    }

    /// Number of lines consumed so far.
    pub fn line_number(&self) -> usize {
        self.line_number
    }
}

impl<R: BufRead> Iterator for BlastReader<R> {
    type Item = Result<AlignmentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const LINE: &str = "sp|geneA|P1\tsp|geneB|P2\t98.50\t120\t2\t0\t1\t120\t5\t124\t1e-30\t250.0";

    #[test]
    fn test_parse_blast_line() {
        let record = AlignmentRecord::parse_line(LINE, 1).unwrap();

        assert_eq!(record.query_id, "sp|geneA|P1");
        assert_eq!(record.subject_id, "sp|geneB|P2");
        assert_eq!(record.percent_identity, 98.5);
        assert_eq!(record.alignment_length, 120);
        assert_eq!(record.num_mismatches, 2);
        assert_eq!(record.num_gap_opens, 0);
        assert_eq!(record.q_start, 1);
        assert_eq!(record.q_end, 120);
        assert_eq!(record.s_start, 5);
        assert_eq!(record.s_end, 124);
        assert_eq!(record.e_value, 1e-30);
        assert_eq!(record.score, 250.0);
        assert_eq!(record.q_hit_length(), 120);
        assert_eq!(record.s_hit_length(), 120);
    }

    #[test]
    fn test_parse_space_separated() {
        let line = "geneA geneB 100.0 50 0 0 1 50 1 50 1e-30 100.0";
        let record = AlignmentRecord::parse_line(line, 1).unwrap();
        assert_eq!(record.alignment_length, 50);
        assert!(!record.is_self_pair());
    }

    #[test]
    fn test_reverse_strand_hit_length() {
        let line = "a b 100.0 50 0 0 1 50 50 1 1e-30 100.0";
        let record = AlignmentRecord::parse_line(line, 1).unwrap();
        assert_eq!(record.q_hit_length(), 50);
        assert_eq!(record.s_hit_length(), -48);
    }

    #[test]
    fn test_wrong_field_count() {
        for line in [
            "a b 100.0 50 0 0 1 50 1 50 1e-30",
            "a b 100.0 50 0 0 1 50 1 50 1e-30 100.0 extra",
            "",
        ] {
            match AlignmentRecord::parse_line(line, 7) {
                Err(FilterError::MalformedRecord { line_number, reason, .. }) => {
                    assert_eq!(line_number, 7);
                    assert!(reason.starts_with("expected 12 fields"), "{}", reason);
                }
                other => panic!("expected malformed record, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_invalid_numeric_field() {
        let line = "a b 100.0 fifty 0 0 1 50 1 50 1e-30 100.0";
        match AlignmentRecord::parse_line(line, 1) {
            Err(FilterError::MalformedRecord { reason, .. }) => {
                assert!(reason.contains("alignment length"));
            }
            other => panic!("expected malformed record, got {:?}", other),
        }

        let line = "a b 100.0 50 0 0 1.5 50 1 50 1e-30 100.0";
        assert!(AlignmentRecord::parse_line(line, 1).is_err());
    }

    #[test]
    fn test_span_overflow_is_malformed() {
        let line = format!("a b 100.0 3 0 0 0 {} 1 3 1e-5 20.0", i64::MAX);
        match AlignmentRecord::parse_line(&line, 4) {
            Err(FilterError::MalformedRecord { line_number, reason, .. }) => {
                assert_eq!(line_number, 4);
                assert_eq!(reason, "query span overflows");
            }
            other => panic!("expected malformed record, got {:?}", other),
        }

        let line = format!("a b 100.0 3 0 0 1 3 {} {} 1e-5 20.0", i64::MAX, i64::MIN);
        assert!(matches!(
            AlignmentRecord::parse_line(&line, 1),
            Err(FilterError::MalformedRecord { .. })
        ));

        // Largest span that still fits.
        let line = format!("a b 100.0 3 0 0 1 {} 1 3 1e-5 20.0", i64::MAX);
        let record = AlignmentRecord::parse_line(&line, 1).unwrap();
        assert_eq!(record.q_hit_length(), i64::MAX);
    }

    #[test]
    fn test_open_plain_and_gzip() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("hits.m8");
        std::fs::write(&plain, format!("{}\n", LINE)).unwrap();

        let gz = dir.path().join("hits.m8.gz");
        let mut enc = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        enc.write_all(format!("{}\n", LINE).as_bytes()).unwrap();
        enc.finish().unwrap();

        for path in [&plain, &gz] {
            let mut reader = BlastReader::open(path).unwrap();
            let record = reader.read_next().unwrap().unwrap();
            assert_eq!(record.query_id, "sp|geneA|P1");
            assert_eq!(reader.raw_line(), format!("{}\n", LINE));
            assert!(reader.read_next().unwrap().is_none());
        }

        assert!(BlastReader::open(dir.path().join("missing.m8")).is_err());
    }

    #[test]
    fn test_reader_keeps_raw_line() {
        let input = format!("{}\n{}", LINE, "x y 90 10 1 0 1 10 1 10 0.001 20.5");
        let mut reader = BlastReader::new(Cursor::new(input));

        reader.read_next().unwrap().unwrap();
        assert_eq!(reader.raw_line(), format!("{}\n", LINE));
        assert_eq!(reader.line_number(), 1);

        let second = reader.read_next().unwrap().unwrap();
        assert_eq!(second.query_id, "x");
        assert_eq!(reader.raw_line(), "x y 90 10 1 0 1 10 1 10 0.001 20.5");

        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn test_reader_rejects_blank_line() {
        let input = format!("{}\n\n{}\n", LINE, LINE);
        let err = BlastReader::new(Cursor::new(input))
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FilterError>(),
            Some(FilterError::MalformedRecord { line_number: 2, .. })
        ));
    }
}
