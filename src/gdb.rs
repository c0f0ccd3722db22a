//! GDB (Gene Database) Format Module
//!
//! Builds an indexed, compressed protein database keyed by gene name from a
//! protein FASTA file. The filter reads it back through
//! [`GeneDatabase`](crate::genedb::GeneDatabase) to resolve protein lengths.
//!
//! # File Format
//! ```text
//! [Header]
//!   - Magic: "GENEDB\0\0" (8 bytes)
//!   - Version: u32 (4 bytes)
//!   - Gene count: u32 (4 bytes)
//!   - Index offset: u64 (8 bytes)
//! [Gene Blocks]
//!   - Zstd-compressed FASTA text, one block per gene name
//! [Index]
//!   - Gene name → (offset, compressed_len, record_count)
//! ```
//!
//! Several proteins may share a gene name. They are stored in the same block
//! and the count is kept in the index, so an ambiguous name is reported when
//! it is looked up rather than rejected at build time.

use anyhow::{Context, Result};
use log::{info, warn};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::genedb::gene_key_for_header;
use crate::seqio::{FastaReader, FastaRecord};

pub(crate) const MAGIC: &[u8; 8] = b"GENEDB\0\0";
pub(crate) const VERSION: u32 = 1;

/// Byte offset of the gene count field, patched once all blocks are written.
const GENE_COUNT_OFFSET: u64 = 12;

/// Counts reported after a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Distinct gene names written.
    pub genes: u32,
    /// Protein records written.
    pub records: u64,
    /// Gene names carried by more than one record.
    pub ambiguous: u32,
}

/// Builds a GDB file from a protein FASTA file (plain or `.gz`).
///
/// Records are grouped by gene name (see
/// [`gene_key_for_header`]) and written in sorted name order.
///
/// # Example
/// ```no_run
/// use simpairs::gdb;
/// use std::path::Path;
///
/// gdb::build(Path::new("proteins.faa"), Path::new("proteins.gdb")).unwrap();
/// ```
pub fn build(fasta_path: &Path, gdb_path: &Path) -> Result<BuildSummary> {
    info!("Building gene database from {}", fasta_path.display());

    let reader = FastaReader::open(fasta_path)?;
    let mut output = BufWriter::with_capacity(
        4 * 1024 * 1024,
        File::create(gdb_path)
            .with_context(|| format!("Failed to create gene database: {}", gdb_path.display()))?,
    );

    let summary = write_database(reader, &mut output)?;
    output.flush()?;

    info!(
        "Gene database written to {}: {} genes, {} records",
        gdb_path.display(),
        summary.genes,
        summary.records
    );
    Ok(summary)
}

/// Writes a complete GDB image for `records` to `output`.
pub fn write_database<I, W>(records: I, output: &mut W) -> Result<BuildSummary>
where
    I: IntoIterator<Item = Result<FastaRecord>>,
    W: Write + Seek,
{
    let mut groups: FxHashMap<String, Vec<FastaRecord>> = FxHashMap::default();
    let mut total_records = 0u64;

    for record in records {
        let record = record?;
        total_records += 1;
        let key = gene_key_for_header(&record.name).to_string();
        groups.entry(key).or_default().push(record);
    }

    let mut names: Vec<&String> = groups.keys().collect();
    names.sort();

    // Header placeholder
    output.write_all(MAGIC)?;
    output.write_all(&VERSION.to_le_bytes())?;
    output.write_all(&0u32.to_le_bytes())?; // gene_count placeholder
    output.write_all(&0u64.to_le_bytes())?; // index_offset placeholder

    let mut index_entries: Vec<(&str, u64, u32, u32)> = Vec::with_capacity(names.len());
    let mut compressor = zstd::bulk::Compressor::new(3)?;
    let mut ambiguous = 0u32;

    for name in names {
        let block = &groups[name];
        if block.len() > 1 {
            ambiguous += 1;
            warn!("Gene name {:?} is shared by {} records", name, block.len());
        }
        write_gene_block(output, &mut compressor, name, block, &mut index_entries)?;
    }

    let index_offset = output.stream_position()?;
    for (gene, offset, comp_len, record_count) in &index_entries {
        let gene_bytes = gene.as_bytes();
        let name_len = u16::try_from(gene_bytes.len())
            .with_context(|| format!("Gene name too long for index: {}", gene))?;
        output.write_all(&name_len.to_le_bytes())?;
        output.write_all(gene_bytes)?;
        output.write_all(&offset.to_le_bytes())?;
        output.write_all(&comp_len.to_le_bytes())?;
        output.write_all(&record_count.to_le_bytes())?;
    }

    let gene_count = u32::try_from(index_entries.len()).context("Too many genes for index")?;
    output.seek(SeekFrom::Start(GENE_COUNT_OFFSET))?;
    output.write_all(&gene_count.to_le_bytes())?;
    output.write_all(&index_offset.to_le_bytes())?;
    output.seek(SeekFrom::End(0))?;

    Ok(BuildSummary {
        genes: gene_count,
        records: total_records,
        ambiguous,
    })
}

/// Write a compressed gene block and record its index entry.
fn write_gene_block<'a, W: Write + Seek>(
    output: &mut W,
    compressor: &mut zstd::bulk::Compressor<'_>,
    gene: &'a str,
    records: &[FastaRecord],
    index_entries: &mut Vec<(&'a str, u64, u32, u32)>,
) -> Result<()> {
    let mut content = String::with_capacity(records.iter().map(|r| r.seq.len() + 64).sum());
    for record in records {
        content.push('>');
        content.push_str(&record.name);
        content.push('\n');
        content.push_str(&record.seq);
        content.push('\n');
    }

    let compressed = compressor.compress(content.as_bytes())?;
    let offset = output.stream_position()?;
    output.write_all(&compressed)?;

    index_entries.push((
        gene,
        offset,
        u32::try_from(compressed.len()).context("Gene block too large")?,
        u32::try_from(records.len()).context("Too many records for one gene")?,
    ));

    Ok(())
}
