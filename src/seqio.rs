//! Sequence I/O Module
//!
//! FASTA reading for reference protein sets, plain or gzip-compressed.
//!
//! # Examples
//! ```no_run
//! use simpairs::seqio::FastaReader;
//!
//! let mut reader = FastaReader::open("proteins.faa.gz").unwrap();
//! while let Some(record) = reader.read_next().unwrap() {
//!     println!("{}: {} aa", record.name, record.seq.len());
//! }
//! ```

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A FASTA record containing sequence name and residues.
#[derive(Debug, Clone, PartialEq)]
pub struct FastaRecord {
    /// Sequence identifier (text after '>' up to first whitespace).
    pub name: String,
    /// Sequence, concatenated from all sequence lines.
    pub seq: String,
}

/// Sequential reader for FASTA data.
///
/// Lines before the first header are ignored. Multi-line sequences are joined
/// and trailing whitespace is stripped from each line.
pub struct FastaReader<R: BufRead> {
    reader: R,
    line_buf: String,
    current_name: Option<String>,
}

impl FastaReader<Box<dyn BufRead>> {
    /// Opens a FASTA file, decompressing it if the name ends in `.gz`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open FASTA: {}", path.display()))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let reader: Box<dyn BufRead> = if ext == "gz" {
            Box::new(BufReader::with_capacity(1024 * 1024, MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::with_capacity(1024 * 1024, file))
        };
        FastaReader::new(reader)
    }
}

impl<R: BufRead> FastaReader<R> {
    /// Wraps a buffered reader and advances to the first header line.
    pub fn new(reader: R) -> Result<Self> {
        let mut fasta = Self {
            reader,
            line_buf: String::with_capacity(256),
            current_name: None,
        };

        loop {
            fasta.line_buf.clear();
            if fasta.reader.read_line(&mut fasta.line_buf)? == 0 {
                break;
            }
            if let Some(header) = fasta.line_buf.strip_prefix('>') {
                fasta.current_name = Some(header_name(header));
                break;
            }
        }

        Ok(fasta)
    }

    /// Reads the next FASTA record.
    ///
    /// # Returns
    /// - `Ok(Some(record))` - Successfully read a record
    /// - `Ok(None)` - End of input reached
    /// - `Err(e)` - I/O error occurred
    pub fn read_next(&mut self) -> Result<Option<FastaRecord>> {
        let name = match self.current_name.take() {
            Some(n) => n,
            None => return Ok(None),
        };

        let mut seq = String::with_capacity(1024);

        loop {
            self.line_buf.clear();
            if self.reader.read_line(&mut self.line_buf)? == 0 {
                break;
            }

            if let Some(header) = self.line_buf.strip_prefix('>') {
                self.current_name = Some(header_name(header));
                break;
            }
            seq.push_str(self.line_buf.trim());
        }

        Ok(Some(FastaRecord { name, seq }))
    }
}

impl<R: BufRead> Iterator for FastaReader<R> {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

fn header_name(header: &str) -> String {
    header.split_whitespace().next().unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_multiline_records() {
        let text = ">sp|geneA|P1 some protein\nMKV\nLLA\n>sp|geneB|P2\nMA\n";
        let records: Vec<FastaRecord> = FastaReader::new(Cursor::new(text))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "sp|geneA|P1");
        assert_eq!(records[0].seq, "MKVLLA");
        assert_eq!(records[1].name, "sp|geneB|P2");
        assert_eq!(records[1].seq, "MA");
    }

    #[test]
    fn test_leading_junk_and_empty_input() {
        let text = "# comment\n\n>x\nAC\r\nGT\n";
        let mut reader = FastaReader::new(Cursor::new(text)).unwrap();
        let rec = reader.read_next().unwrap().unwrap();
        assert_eq!(rec.seq, "ACGT");
        assert!(reader.read_next().unwrap().is_none());

        let mut empty = FastaReader::new(Cursor::new("")).unwrap();
        assert!(empty.read_next().unwrap().is_none());
    }

    #[test]
    fn test_open_gzip() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prot.faa.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(b">db|geneZ|1\nMKKK\n").unwrap();
        enc.finish().unwrap();

        let mut reader = FastaReader::open(&path).unwrap();
        let rec = reader.read_next().unwrap().unwrap();
        assert_eq!(rec.name, "db|geneZ|1");
        assert_eq!(rec.seq.len(), 4);
    }
}
