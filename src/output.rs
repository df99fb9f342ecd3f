use crate::types::MutationMap;
use anyhow::Result;
use csv::Writer;
use std::path::Path;

/// Write the frequency mapping as a chrom/pos/frequency table.
pub fn write_frequencies(mutations: &MutationMap, path: &Path) -> Result<()> {
    let mut wtr = Writer::from_path(path)?;

    wtr.write_record(["chrom", "pos", "frequency_percent"])?;

    for (chrom, observations) in mutations {
        for obs in observations {
            wtr.write_record([
                chrom.clone(),
                obs.pos.to_string(),
                format!("{:.6}", obs.frequency),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
