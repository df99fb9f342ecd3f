use indexmap::IndexMap;

/// One qualifying site: 1-based position and mean mutant allele
/// frequency as a percentage in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyObservation {
    pub pos: u64,
    pub frequency: f64,
}

/// Chromosome -> observations, keyed in first-seen file order.
/// Within a chromosome, observations are sorted by position ascending
/// before the map is handed to statistics or plotting.
pub type MutationMap = IndexMap<String, Vec<FrequencyObservation>>;

/// Descriptive statistics over one chromosome's frequency observations
#[derive(Debug, Clone)]
pub struct ChromosomeStats {
    pub count: usize,
    pub mean_frequency: f64,
    pub median_frequency: f64,
    pub max_frequency: f64,
    pub min_frequency: f64,
    pub std_frequency: f64,
    pub min_position: u64,
    pub max_position: u64,
}
