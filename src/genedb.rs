//! Gene Datastore Module
//!
//! Resolves gene names to reference protein records so the classifier can
//! compare hit spans with full protein lengths.
//!
//! Sequence ids in BLAST output look like `db|gene_name|...`; the second
//! `|`-delimited token names the gene. A name must match exactly one record
//! in the store, anything else aborts the run.
//!
//! # Stores
//! - [`GeneDatabase`]: indexed `.gdb` file built by [`gdb::build`](crate::gdb::build)
//! - [`FastaGeneStore`]: protein FASTA (plain or gzip) loaded into memory

use anyhow::{Context, Result};
use log::debug;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::FilterError;
use crate::gdb::{MAGIC, VERSION};
use crate::seqio::{FastaReader, FastaRecord};

// ============================================================================
// Data Structures
// ============================================================================

/// A reference protein resolved by gene name.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneRecord {
    /// Gene name the record was looked up by.
    pub name: String,
    /// Full FASTA identifier of the stored protein.
    pub header: String,
    /// Protein sequence.
    pub protein: String,
}

impl GeneRecord {
    /// Length of the reference protein in residues.
    pub fn protein_len(&self) -> usize {
        self.protein.len()
    }
}

/// Extracts the gene name from a BLAST sequence id (`db|gene_name|...`).
///
/// # Errors
/// [`FilterError::Lookup`] if the id has no second `|` field.
pub fn gene_name_of(seq_id: &str) -> Result<&str, FilterError> {
    seq_id
        .split('|')
        .nth(1)
        .ok_or_else(|| FilterError::lookup(seq_id, "sequence id has no '|'-delimited gene name"))
}

/// Gene name under which a FASTA header is stored.
///
/// Uses the second `|` field when present, otherwise the whole identifier,
/// so both `sp|geneA|P1` and a bare `geneA` are keyed as `geneA`.
pub fn gene_key_for_header(name: &str) -> &str {
    name.split('|').nth(1).unwrap_or(name)
}

/// Query-by-name access to reference proteins.
pub trait GeneStore {
    /// Returns the single record stored under `gene`.
    ///
    /// # Errors
    /// [`FilterError::Lookup`] when zero or more than one record matches.
    fn fetch_gene(&mut self, gene: &str) -> Result<GeneRecord>;
}

/// Picks exactly one record out of the matches for `gene`.
fn single_record(gene: &str, mut matches: Vec<FastaRecord>) -> Result<GeneRecord> {
    match matches.len() {
        1 => {
            let rec = matches.remove(0);
            Ok(GeneRecord {
                name: gene.to_string(),
                header: rec.name,
                protein: rec.seq,
            })
        }
        0 => Err(FilterError::lookup(gene, "no record found").into()),
        n => Err(FilterError::lookup(gene, format!("{} records found, expected exactly one", n)).into()),
    }
}

/// Opens the store behind a datastore target.
///
/// Paths ending in `.gdb` open a [`GeneDatabase`]; anything else is read as
/// protein FASTA.
pub fn open_gene_store<P: AsRef<Path>>(path: P) -> Result<Box<dyn GeneStore>> {
    let path = path.as_ref();
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if ext == "gdb" {
        Ok(Box::new(GeneDatabase::open(path)?))
    } else {
        Ok(Box::new(FastaGeneStore::open(path)?))
    }
}

// ============================================================================
// GDB Index Entry
// ============================================================================

/// Index entry for compressed gene blocks in GDB format.
#[derive(Debug, Clone)]
struct GdbIndexEntry {
    offset: u64,
    compressed_len: u32,
    record_count: u32,
}

// ============================================================================
// Gene Database Reader
// ============================================================================

/// Reader for compressed gene database (.gdb) files.
///
/// Only the index is held in memory; gene blocks are decompressed on demand.
pub struct GeneDatabase<R: Read + Seek = File> {
    file: R,
    index: FxHashMap<String, GdbIndexEntry>,
}

impl GeneDatabase<File> {
    /// Opens a gene database file and loads its index.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("Failed to open gene database: {}", path.as_ref().display()))?;
        Self::from_reader(file)
            .with_context(|| format!("Failed to read gene database: {}", path.as_ref().display()))
    }
}

impl<R: Read + Seek> GeneDatabase<R> {
    /// Reads and validates the header, then loads the gene index.
    pub fn from_reader(mut file: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            anyhow::bail!("Invalid gene database magic");
        }

        let mut buf4 = [0u8; 4];
        let mut buf8 = [0u8; 8];

        file.read_exact(&mut buf4)?;
        let version = u32::from_le_bytes(buf4);
        if version != VERSION {
            anyhow::bail!("Unsupported gene database version {}", version);
        }

        file.read_exact(&mut buf4)?;
        let gene_count = u32::from_le_bytes(buf4);

        file.read_exact(&mut buf8)?;
        let index_offset = u64::from_le_bytes(buf8);

        file.seek(SeekFrom::Start(index_offset))?;
        let mut index = FxHashMap::default();

        for _ in 0..gene_count {
            let mut buf2 = [0u8; 2];
            file.read_exact(&mut buf2)?;
            let name_len = u16::from_le_bytes(buf2) as usize;

            let mut name_buf = vec![0u8; name_len];
            file.read_exact(&mut name_buf)?;
            let gene = String::from_utf8(name_buf)?;

            file.read_exact(&mut buf8)?;
            let offset = u64::from_le_bytes(buf8);

            file.read_exact(&mut buf4)?;
            let compressed_len = u32::from_le_bytes(buf4);

            file.read_exact(&mut buf4)?;
            let record_count = u32::from_le_bytes(buf4);

            index.insert(gene, GdbIndexEntry {
                offset,
                compressed_len,
                record_count,
            });
        }

        debug!("Loaded gene database index with {} genes", index.len());
        Ok(Self { file, index })
    }

    /// Number of distinct gene names in the index.
    pub fn gene_count(&self) -> usize {
        self.index.len()
    }

    /// Checks if a gene name exists in the database.
    pub fn has_gene(&self, gene: &str) -> bool {
        self.index.contains_key(gene)
    }

    /// Decompresses and parses every record stored under `gene`.
    pub fn get_gene_records(&mut self, gene: &str) -> Result<Vec<FastaRecord>> {
        let entry = match self.index.get(gene) {
            Some(entry) => entry.clone(),
            None => return Ok(Vec::new()),
        };

        self.file.seek(SeekFrom::Start(entry.offset))?;
        let mut compressed = vec![0u8; entry.compressed_len as usize];
        self.file.read_exact(&mut compressed)?;

        let decompressed = zstd::decode_all(&compressed[..])
            .with_context(|| format!("Corrupt gene block for {}", gene))?;

        let mut records = Vec::with_capacity(entry.record_count as usize);
        for record in FastaReader::new(Cursor::new(decompressed))? {
            records.push(record?);
        }
        Ok(records)
    }
}

impl<R: Read + Seek> GeneStore for GeneDatabase<R> {
    fn fetch_gene(&mut self, gene: &str) -> Result<GeneRecord> {
        // Ambiguity is known from the index alone.
        if let Some(entry) = self.index.get(gene) {
            if entry.record_count > 1 {
                return Err(FilterError::lookup(
                    gene,
                    format!("{} records found, expected exactly one", entry.record_count),
                )
                .into());
            }
        }
        let records = self.get_gene_records(gene)?;
        single_record(gene, records)
    }
}

// ============================================================================
// FASTA Gene Store
// ============================================================================

/// In-memory store built from a protein FASTA file.
#[derive(Debug, Default)]
pub struct FastaGeneStore {
    genes: FxHashMap<String, Vec<FastaRecord>>,
}

impl FastaGeneStore {
    /// Loads every record of a protein FASTA file (plain or `.gz`).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = Self::from_records(FastaReader::open(path.as_ref())?)?;
        debug!(
            "Loaded {} gene names from {}",
            store.genes.len(),
            path.as_ref().display()
        );
        Ok(store)
    }

    /// Groups records by gene name.
    pub fn from_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<FastaRecord>>,
    {
        let mut genes: FxHashMap<String, Vec<FastaRecord>> = FxHashMap::default();
        for record in records {
            let record = record?;
            genes
                .entry(gene_key_for_header(&record.name).to_string())
                .or_default()
                .push(record);
        }
        Ok(Self { genes })
    }
}

impl GeneStore for FastaGeneStore {
    fn fetch_gene(&mut self, gene: &str) -> Result<GeneRecord> {
        let matches = self.genes.get(gene).cloned().unwrap_or_default();
        single_record(gene, matches)
    }
}

// ============================================================================
// Gene Length Resolver
// ============================================================================

/// Resolves BLAST sequence ids to reference protein lengths.
///
/// Lengths are cached per gene name; the store is read-only for the run so
/// the cache never changes an answer.
pub struct GeneLengthResolver {
    store: Box<dyn GeneStore>,
    cache: FxHashMap<String, usize>,
}

impl GeneLengthResolver {
    pub fn new(store: Box<dyn GeneStore>) -> Self {
        Self {
            store,
            cache: FxHashMap::default(),
        }
    }

    /// Opens the store at `path` (see [`open_gene_store`]).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(open_gene_store(path)?))
    }

    /// Protein length for the gene named in `seq_id`.
    pub fn protein_length(&mut self, seq_id: &str) -> Result<usize> {
        let gene = gene_name_of(seq_id)?;
        if let Some(&len) = self.cache.get(gene) {
            return Ok(len);
        }

        let record = self.store.fetch_gene(gene)?;
        let len = record.protein_len();
        debug!("Resolved {} -> {} ({} aa)", gene, record.header, len);
        self.cache.insert(gene.to_string(), len);
        Ok(len)
    }

    /// Number of distinct gene names resolved so far.
    pub fn resolved_genes(&self) -> usize {
        self.cache.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdb;

    const PROTEINS: &str = "\
>sp|geneA|P001 alpha
MKVLLAGG
>sp|geneB|P002
MKV
>sp|dup|P003
MA
>tr|dup|P004
MAA
>plain
MMMMM
";

    fn fasta_store() -> FastaGeneStore {
        FastaGeneStore::from_records(FastaReader::new(Cursor::new(PROTEINS)).unwrap()).unwrap()
    }

    fn gdb_store() -> GeneDatabase<Cursor<Vec<u8>>> {
        let mut buf = Cursor::new(Vec::new());
        gdb::write_database(FastaReader::new(Cursor::new(PROTEINS)).unwrap(), &mut buf).unwrap();
        GeneDatabase::from_reader(Cursor::new(buf.into_inner())).unwrap()
    }

    fn assert_lookup_error(err: anyhow::Error, expected_gene: &str) {
        match err.downcast_ref::<FilterError>() {
            Some(FilterError::Lookup { gene, .. }) => assert_eq!(gene, expected_gene),
            other => panic!("expected lookup error, got {:?}", other),
        }
    }

    #[test]
    fn test_gene_name_of() {
        assert_eq!(gene_name_of("sp|geneA|P001").unwrap(), "geneA");
        assert_eq!(gene_name_of("db|geneA").unwrap(), "geneA");
        assert_eq!(gene_name_of("db|").unwrap(), "");
        assert!(matches!(gene_name_of("geneA"), Err(FilterError::Lookup { .. })));
    }

    #[test]
    fn test_gene_key_for_header() {
        assert_eq!(gene_key_for_header("sp|geneA|P001"), "geneA");
        assert_eq!(gene_key_for_header("geneA"), "geneA");
    }

    #[test]
    fn test_fasta_store_lookup() {
        let mut store = fasta_store();
        let rec = store.fetch_gene("geneA").unwrap();
        assert_eq!(rec.header, "sp|geneA|P001");
        assert_eq!(rec.protein_len(), 8);
        assert_eq!(store.fetch_gene("plain").unwrap().protein_len(), 5);

        assert_lookup_error(store.fetch_gene("missing").unwrap_err(), "missing");
        assert_lookup_error(store.fetch_gene("dup").unwrap_err(), "dup");
    }

    #[test]
    fn test_gdb_store_matches_fasta_store() {
        let mut fasta = fasta_store();
        let mut db = gdb_store();
        assert_eq!(db.gene_count(), 4);
        assert!(db.has_gene("geneB"));

        for gene in ["geneA", "geneB", "plain"] {
            assert_eq!(db.fetch_gene(gene).unwrap(), fasta.fetch_gene(gene).unwrap());
        }
        assert_eq!(db.get_gene_records("dup").unwrap().len(), 2);
        assert_lookup_error(db.fetch_gene("dup").unwrap_err(), "dup");
        assert_lookup_error(db.fetch_gene("missing").unwrap_err(), "missing");
    }

    #[test]
    fn test_gdb_rejects_bad_magic() {
        let bytes = b"NOTADB\0\0\x01\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0".to_vec();
        assert!(GeneDatabase::from_reader(Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_open_gene_store_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let fasta_path = dir.path().join("proteins.faa");
        std::fs::write(&fasta_path, PROTEINS).unwrap();
        let gdb_path = dir.path().join("proteins.gdb");
        gdb::build(&fasta_path, &gdb_path).unwrap();

        for path in [&fasta_path, &gdb_path] {
            let mut store = open_gene_store(path).unwrap();
            assert_eq!(store.fetch_gene("geneB").unwrap().protein_len(), 3);
        }
    }

    #[test]
    fn test_resolver_caches_lengths() {
        let mut resolver = GeneLengthResolver::new(Box::new(fasta_store()));
        assert_eq!(resolver.protein_length("sp|geneA|x").unwrap(), 8);
        assert_eq!(resolver.protein_length("tr|geneA|y").unwrap(), 8);
        assert_eq!(resolver.protein_length("sp|geneB|z").unwrap(), 3);
        assert_eq!(resolver.resolved_genes(), 2);

        assert_lookup_error(resolver.protein_length("nogene").unwrap_err(), "nogene");
        assert_lookup_error(resolver.protein_length("sp|dup|1").unwrap_err(), "dup");
    }
}
