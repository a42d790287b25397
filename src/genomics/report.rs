use anyhow::{anyhow, Result};
use std::io::Write;

use super::{
    AllelicMethylationRow, FrequencyBuffers, FrequencyMatrix, JunctionCounts, MethylationRow,
    SnvRow,
};

const JUNCTION_HEADER: &str = "id\tcount\n";
const ALLELIC_JUNCTION_HEADER: &str = "id\tR\tU\tA\n";
const METHYLATION_HEADER: &str = "chr\tposition\tstrand\tT\tM\n";
const ALLELIC_METHYLATION_HEADER: &str = "chr\tposition\tstrand\tTR\tMR\tTU\tMU\tTA\tMA\n";
const SNV_HEADER: &str = "chr\tposition\tnTotal\tnMatch\n";
const FREQUENCY_HEADER: &str = "read\tcycle\tread_base\tref_base\tcount\n";

fn render_with<F>(write: F) -> Result<String>
where
    F: FnOnce(&mut Vec<u8>) -> Result<()>,
{
    let mut buffer = Vec::new();
    write(&mut buffer)?;
    String::from_utf8(buffer).map_err(|_| anyhow!("rendered table is not valid UTF-8"))
}

/// Write junction counts, flat (`id`, `count`) or per allele (`id`, `R`, `U`, `A`).
///
/// Rows are sorted by junction identifier.
pub fn write_junctions<W: Write>(writer: &mut W, counts: &JunctionCounts) -> Result<()> {
    if counts.is_allelic() {
        writer.write_all(ALLELIC_JUNCTION_HEADER.as_bytes())?;
        for row in counts.allelic_rows() {
            writeln!(writer, "{}\t{}\t{}\t{}", row.id, row.r, row.u, row.a)?;
        }
    } else {
        writer.write_all(JUNCTION_HEADER.as_bytes())?;
        for (id, count) in counts.unstratified() {
            writeln!(writer, "{id}\t{count}")?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Render junction counts into a string.
pub fn render_junctions(counts: &JunctionCounts) -> Result<String> {
    render_with(|buffer| write_junctions(buffer, counts))
}

/// Write the methylation table.
pub fn write_methylation<W: Write>(writer: &mut W, rows: &[MethylationRow]) -> Result<()> {
    writer.write_all(METHYLATION_HEADER.as_bytes())?;
    for row in rows {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}",
            row.chrom, row.position, row.strand, row.total, row.methylated
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Render the methylation table into a string.
pub fn render_methylation(rows: &[MethylationRow]) -> Result<String> {
    render_with(|buffer| write_methylation(buffer, rows))
}

/// Write the allele-stratified methylation table (R, U, A column pairs).
pub fn write_allelic_methylation<W: Write>(
    writer: &mut W,
    rows: &[AllelicMethylationRow],
) -> Result<()> {
    writer.write_all(ALLELIC_METHYLATION_HEADER.as_bytes())?;
    for row in rows {
        write!(writer, "{}\t{}\t{}", row.chrom, row.position, row.strand)?;
        for (total, methylated) in row.total.iter().zip(&row.methylated) {
            write!(writer, "\t{total}\t{methylated}")?;
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Render the allele-stratified methylation table into a string.
pub fn render_allelic_methylation(rows: &[AllelicMethylationRow]) -> Result<String> {
    render_with(|buffer| write_allelic_methylation(buffer, rows))
}

/// Write the SNV concordance table.
pub fn write_snvs<W: Write>(writer: &mut W, rows: &[SnvRow]) -> Result<()> {
    writer.write_all(SNV_HEADER.as_bytes())?;
    for row in rows {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            row.chrom, row.position, row.total, row.matches
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Render the SNV table into a string.
pub fn render_snvs(rows: &[SnvRow]) -> Result<String> {
    render_with(|buffer| write_snvs(buffer, rows))
}

fn write_matrix<W: Write>(writer: &mut W, read: u8, matrix: &FrequencyMatrix) -> Result<()> {
    for (cycle, read_base, ref_base, count) in matrix.nonzero() {
        writeln!(
            writer,
            "{read}\t{}\t{}\t{}\t{count}",
            cycle + 1,
            read_base.to_ascii() as char,
            ref_base.to_ascii() as char,
        )?;
    }
    Ok(())
}

/// Write non-zero frequency cells (1-based cycles) followed by `#`-prefixed
/// summary lines for the maximum read length, uniqueness and non-empty
/// fragment-length buckets.
pub fn write_frequencies<W: Write>(
    writer: &mut W,
    buffers: &FrequencyBuffers,
    max_len: usize,
) -> Result<()> {
    writer.write_all(FREQUENCY_HEADER.as_bytes())?;
    write_matrix(writer, 1, &buffers.read1)?;
    write_matrix(writer, 2, &buffers.read2)?;
    writeln!(writer, "#max_read_length\t{max_len}")?;
    writeln!(
        writer,
        "#uniqueness\t{}\t{}",
        buffers.uniqueness.unique, buffers.uniqueness.total
    )?;
    for (idx, &count) in buffers.fragments.buckets().iter().enumerate() {
        if count > 0 {
            writeln!(writer, "#fragment_length\t{}\t{count}", idx + 1)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Render frequency buffers into a string.
pub fn render_frequencies(buffers: &FrequencyBuffers, max_len: usize) -> Result<String> {
    render_with(|buffer| write_frequencies(buffer, buffers, max_len))
}
