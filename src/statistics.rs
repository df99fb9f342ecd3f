use crate::types::{ChromosomeStats, FrequencyObservation, MutationMap};
use rayon::prelude::*;

/// Compute descriptive statistics for every chromosome carrying at least
/// one observation. Chromosome order follows the input map; chromosomes
/// with no observations are omitted rather than reported as nulls.
pub fn mutation_statistics(mutations: &MutationMap) -> Vec<(String, ChromosomeStats)> {
    let entries: Vec<(&String, &Vec<FrequencyObservation>)> = mutations
        .iter()
        .filter(|(_, observations)| !observations.is_empty())
        .collect();

    entries
        .par_iter()
        .map(|(chrom, observations)| ((*chrom).clone(), chromosome_stats(observations)))
        .collect()
}

/// Statistics over a non-empty observation slice.
fn chromosome_stats(observations: &[FrequencyObservation]) -> ChromosomeStats {
    let count = observations.len();
    let frequencies: Vec<f64> = observations.iter().map(|obs| obs.frequency).collect();

    let mean = frequencies.iter().sum::<f64>() / count as f64;
    // Population variance, matching how these summaries have always been
    // reported downstream.
    let variance = frequencies
        .iter()
        .map(|f| (f - mean).powi(2))
        .sum::<f64>()
        / count as f64;

    let max = frequencies.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = frequencies.iter().copied().fold(f64::INFINITY, f64::min);

    ChromosomeStats {
        count,
        mean_frequency: mean,
        median_frequency: median(&frequencies),
        max_frequency: max,
        min_frequency: min,
        std_frequency: variance.sqrt(),
        min_position: observations.iter().map(|obs| obs.pos).min().unwrap_or(0),
        max_position: observations.iter().map(|obs| obs.pos).max().unwrap_or(0),
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
