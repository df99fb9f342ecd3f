use crate::vcf_parser::open_vcf;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

/// Minimum alt-allele read fraction for a record to be kept.
const MIN_ALT_FRACTION: f64 = 0.30;

/// Counts from one filtering pass
#[derive(Debug, Default, Clone, Copy)]
pub struct FilterSummary {
    pub records_total: u64,
    pub records_retained: u64,
}

/// ALT index of the G->A or C->T transition for this record, supporting
/// multi-allelic ALT lists. None when the record carries no such allele.
fn transition_alt_index(ref_allele: &str, alt_alleles: &[&str]) -> Option<usize> {
    let wanted = match ref_allele {
        "G" => "A",
        "C" => "T",
        _ => return None,
    };
    alt_alleles.iter().position(|alt| *alt == wanted)
}

/// Alt-allele read fraction (AD/DP) of the transition allele, read from
/// the last sample column. None when the record is not a qualifying
/// transition or its depth fields cannot be read.
fn record_alt_fraction(columns: &[&str]) -> Option<f64> {
    let ref_allele = *columns.get(3)?;
    let alt_alleles: Vec<&str> = columns.get(4)?.split(',').collect();
    let alt_idx = transition_alt_index(ref_allele, &alt_alleles)?;

    let format_keys: Vec<&str> = columns.get(8)?.split(':').collect();
    let ad_pos = format_keys.iter().position(|k| *k == "AD")?;
    let dp_pos = format_keys.iter().position(|k| *k == "DP")?;

    let fields: Vec<&str> = columns.last()?.split(':').collect();
    // AD is reference-first, so the transition allele sits at alt_idx + 1
    let alt_depth: f64 = fields.get(ad_pos)?.split(',').nth(alt_idx + 1)?.parse().ok()?;
    let total_depth: f64 = fields.get(dp_pos)?.parse().ok()?;
    if total_depth <= 0.0 {
        return None;
    }
    Some(alt_depth / total_depth)
}

/// Single pass over a VCF writing a reduced VCF: header lines are copied
/// unchanged, data lines are kept verbatim and in order when they carry a
/// G->A or C->T transition allele whose read fraction is at least 0.30.
/// Lines that cannot be classified are omitted, never an error.
pub fn filter_transitions(input: &Path, output: &Path) -> Result<FilterSummary> {
    let reader = open_vcf(input)?;
    let out = File::create(output)
        .with_context(|| format!("Failed to create output VCF: {}", output.display()))?;
    let mut writer = BufWriter::new(out);

    let mut summary = FilterSummary::default();
    for line in reader.lines() {
        let line = line.with_context(|| format!("Failed to read {}", input.display()))?;

        if line.starts_with('#') {
            writeln!(writer, "{}", line)?;
            continue;
        }

        summary.records_total += 1;
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 10 {
            continue;
        }
        if let Some(fraction) = record_alt_fraction(&columns) {
            if fraction >= MIN_ALT_FRACTION {
                writeln!(writer, "{}", line)?;
                summary.records_retained += 1;
            }
        }
    }
    writer.flush()?;

    Ok(summary)
}
