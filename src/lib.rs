//! Mutant allele frequency extraction and transition-signature filtering
//! for mapping-by-sequencing experiments.
//!
//! The core is a single streaming pass over a VCF that resolves per-sample
//! genotype fields, applies the frequency inclusion policy, and aggregates
//! qualifying sites per chromosome. A companion single-pass filter reduces
//! a VCF to G->A / C->T transition SNPs with sufficient alt-read support.

pub mod output;
pub mod statistics;
pub mod transition;
pub mod types;
pub mod vcf_parser;

#[cfg(feature = "plotting")]
pub mod plotting;
