use crate::types::{FrequencyObservation, MutationMap};
use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use indexmap::IndexMap;
use indicatif::ProgressBar;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Configuration for frequency extraction
pub struct ParseConfig {
    /// Control sample name. Every sample whose name *contains* this string
    /// is excluded from frequency computation. Containment rather than
    /// equality is load-bearing for existing sample naming schemes, but it
    /// can also exclude unrelated samples whose names embed the control's
    /// name as a substring.
    pub control: Option<String>,
    /// Minimum total read depth for a sample to contribute. The applied
    /// threshold is never below 1.
    pub min_depth: u32,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            control: None,
            min_depth: 1,
        }
    }
}

const MAX_RECORDED_WARNINGS: usize = 50;

/// Per-invocation sink for recoverable parse problems. Each invocation of
/// [`parse_vcf_frequencies`] gets its own sink, so repeated or concurrent
/// runs never interleave diagnostics.
#[derive(Debug, Default)]
pub struct ParseDiagnostics {
    pub lines_total: u64,
    pub records_skipped: u64,
    pub samples_skipped: u64,
    suppressed: u64,
    messages: Vec<String>,
}

impl ParseDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn warn(&mut self, line_no: u64, msg: impl AsRef<str>) {
        self.records_skipped += 1;
        self.record(format!("line {}: {}", line_no, msg.as_ref()));
    }

    fn warn_sample(&mut self, line_no: u64, sample_idx: usize, msg: &str) {
        self.samples_skipped += 1;
        self.record(format!("line {}, sample {}: {}", line_no, sample_idx + 1, msg));
    }

    fn record(&mut self, message: String) {
        if self.messages.len() < MAX_RECORDED_WARNINGS {
            self.messages.push(message);
        } else {
            self.suppressed += 1;
        }
    }

    /// Recorded warnings, capped at a fixed number per invocation.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Warnings dropped after the cap was reached.
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

/// Parser state: we stream forward and only remember whether the `#CHROM`
/// header has been seen yet.
enum HeaderState {
    AwaitingHeader,
    Streaming { mutant_indices: Vec<usize> },
}

/// FORMAT-keyed view of one sample's colon-delimited fields.
struct SampleFields<'a> {
    keys: &'a [&'a str],
    values: Vec<&'a str>,
}

impl<'a> SampleFields<'a> {
    fn new(keys: &'a [&'a str], raw: &'a str) -> Self {
        Self {
            keys,
            values: raw.split(':').collect(),
        }
    }

    /// Value for a FORMAT key. None when the key is not declared or the
    /// sample carries fewer fields than FORMAT does.
    fn get(&self, key: &str) -> Option<&'a str> {
        let idx = self.keys.iter().position(|k| *k == key)?;
        self.values.get(idx).copied()
    }
}

fn parse_depths(raw: &str) -> Option<Vec<u32>> {
    raw.split(',').map(|v| v.parse::<u32>().ok()).collect()
}

/// Per-allele depths: AD preferred, otherwise element-wise ADF + ADR
/// reconstruction. None when neither path yields at least two values.
fn resolve_allele_depths(fields: &SampleFields) -> Option<Vec<u32>> {
    if let Some(ad) = fields.get("AD").and_then(parse_depths) {
        if ad.len() >= 2 {
            return Some(ad);
        }
    }
    let adf = fields.get("ADF").and_then(parse_depths)?;
    let adr = fields.get("ADR").and_then(parse_depths)?;
    let summed: Vec<u32> = adf.iter().zip(adr.iter()).map(|(f, r)| f + r).collect();
    if summed.len() >= 2 {
        Some(summed)
    } else {
        None
    }
}

/// Alt-allele read fraction in [0, 1] for one sample with resolved
/// per-allele depths, or None when the total depth falls below
/// max(1, min_depth).
fn qualifying_fraction(fields: &SampleFields, depths: &[u32], min_depth: u32) -> Option<f64> {
    let ref_depth = u64::from(depths[0]);
    // Multi-allelic sites: every non-reference allele counts toward alt.
    let alt_depth: u64 = depths[1..].iter().map(|&d| u64::from(d)).sum();
    let mut total_depth = ref_depth + alt_depth;

    // DP can exceed the AD-derived sum when AD undercounts; trust it then.
    if let Some(dp) = fields.get("DP").and_then(|v| v.parse::<u64>().ok()) {
        if dp > total_depth {
            total_depth = dp;
        }
    }

    if total_depth < u64::from(min_depth.max(1)) {
        return None;
    }
    Some(alt_depth as f64 / total_depth as f64)
}

/// Sample indices that count as mutant: everything whose name does not
/// contain the control name.
fn mutant_indices(samples: &[&str], control: Option<&str>) -> Vec<usize> {
    match control {
        Some(ctrl) => samples
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.contains(ctrl))
            .map(|(i, _)| i)
            .collect(),
        None => (0..samples.len()).collect(),
    }
}

/// Open a VCF for reading, transparently decompressing `.gz` input.
pub(crate) fn open_vcf(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open VCF file: {}", path.display()))?;
    if path.extension().map_or(false, |ext| ext == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Stream a VCF once and build the chromosome -> (position, frequency%)
/// mapping. Chromosomes keep first-seen order; positions are sorted
/// ascending (stable on ties) before the map is returned.
///
/// Recoverable problems (short lines, bad positions, unparseable depths)
/// go to `diagnostics` and parsing continues; an unopenable input is a
/// hard error with no partial mapping.
pub fn parse_vcf_frequencies(
    path: &Path,
    config: &ParseConfig,
    diagnostics: &mut ParseDiagnostics,
    progress: Option<&ProgressBar>,
) -> Result<MutationMap> {
    let reader = open_vcf(path)?;
    let mut mutations: MutationMap = IndexMap::new();
    let mut state = HeaderState::AwaitingHeader;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx as u64 + 1;
        let line = line
            .with_context(|| format!("Failed to read line {} of {}", line_no, path.display()))?;
        diagnostics.lines_total += 1;
        if let Some(pb) = progress {
            pb.inc(1);
        }

        if let Some(rest) = line.strip_prefix('#') {
            if rest.starts_with("CHROM") {
                let columns: Vec<&str> = line.split('\t').collect();
                let samples = columns.get(9..).unwrap_or(&[]);
                state = HeaderState::Streaming {
                    mutant_indices: mutant_indices(samples, config.control.as_deref()),
                };
            }
            continue;
        }

        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 10 {
            diagnostics.warn(line_no, "insufficient columns, skipping");
            continue;
        }

        // No #CHROM header before data: infer the sample count from this
        // line's column count and treat every sample as mutant.
        if matches!(state, HeaderState::AwaitingHeader) {
            state = HeaderState::Streaming {
                mutant_indices: (0..columns.len() - 9).collect(),
            };
        }
        let mutant = match &state {
            HeaderState::Streaming { mutant_indices } => mutant_indices,
            HeaderState::AwaitingHeader => unreachable!(),
        };

        let chrom = columns[0];
        let pos: u64 = match columns[1].parse() {
            Ok(p) => p,
            Err(_) => {
                diagnostics.warn(line_no, format!("non-integer position '{}'", columns[1]));
                continue;
            }
        };

        let format_keys: Vec<&str> = columns[8].split(':').collect();
        let samples = &columns[9..];

        let mut fractions: Vec<f64> = Vec::new();
        for &sample_idx in mutant {
            let Some(&raw) = samples.get(sample_idx) else {
                continue;
            };
            if raw == "." || raw == "./." {
                continue; // no call
            }
            let fields = SampleFields::new(&format_keys, raw);

            // Inclusion policy step 1: genotype must carry a non-reference
            // allele. Failing this is ordinary exclusion, not a problem.
            let Some(gt) = fields.get("GT") else {
                continue;
            };
            if !gt.contains('1') {
                continue;
            }

            let Some(depths) = resolve_allele_depths(&fields) else {
                diagnostics.warn_sample(line_no, sample_idx, "no usable AD or ADF/ADR depths");
                continue;
            };
            if let Some(fraction) = qualifying_fraction(&fields, &depths, config.min_depth) {
                fractions.push(fraction);
            }
        }

        // A site where no sample qualifies is silently absent, not an error.
        if fractions.is_empty() {
            continue;
        }

        let frequency = fractions.iter().sum::<f64>() / fractions.len() as f64 * 100.0;
        mutations
            .entry(chrom.to_string())
            .or_default()
            .push(FrequencyObservation { pos, frequency });
    }

    // Stable sort keeps encounter order on position ties.
    for observations in mutations.values_mut() {
        observations.sort_by_key(|obs| obs.pos);
    }

    Ok(mutations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2";

    fn write_vcf(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn parse_with(contents: &str, config: &ParseConfig) -> (MutationMap, ParseDiagnostics) {
        let file = write_vcf(contents);
        let mut diag = ParseDiagnostics::new();
        let map = parse_vcf_frequencies(file.path(), config, &mut diag, None).unwrap();
        (map, diag)
    }

    fn parse(contents: &str) -> MutationMap {
        parse_with(contents, &ParseConfig::default()).0
    }

    #[test]
    fn test_two_sample_mean() {
        let vcf = format!(
            "{}\nchr1\t1000\t.\tG\tA\t.\t.\t.\tGT:AD:DP\t0/1:7,3:10\t0/1:5,5:10\n",
            HEADER
        );
        let map = parse(&vcf);
        assert_eq!(map.len(), 1);
        let obs = &map["chr1"];
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].pos, 1000);
        // mean of 30% and 50%
        assert_relative_eq!(obs[0].frequency, 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_control_sample_excluded() {
        let vcf = format!(
            "{}\nchr1\t1000\t.\tG\tA\t.\t.\t.\tGT:AD:DP\t0/1:7,3:10\t0/1:5,5:10\n",
            HEADER
        );
        let config = ParseConfig {
            control: Some("S1".to_string()),
            min_depth: 1,
        };
        let (map, _) = parse_with(&vcf, &config);
        assert_relative_eq!(map["chr1"][0].frequency, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_control_substring_excludes_all_matching() {
        // "S" is contained in both sample names, so nothing contributes
        let vcf = format!(
            "{}\nchr1\t1000\t.\tG\tA\t.\t.\t.\tGT:AD\t0/1:7,3\t0/1:5,5\n",
            HEADER
        );
        let config = ParseConfig {
            control: Some("S".to_string()),
            min_depth: 1,
        };
        let (map, _) = parse_with(&vcf, &config);
        assert!(map.is_empty());
    }

    #[test]
    fn test_hom_ref_site_absent() {
        let vcf = format!(
            "{}\nchr1\t1000\t.\tG\tA\t.\t.\t.\tGT:AD:DP\t0/0:7,3:10\t0/0:5,5:10\n",
            HEADER
        );
        assert!(parse(&vcf).is_empty());
    }

    #[test]
    fn test_multi_allelic_alt_depths_combined() {
        let header = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1";
        let vcf = format!("{}\nchr1\t500\t.\tG\tA,T\t.\t.\t.\tGT:AD\t1/2:10,3,7\n", header);
        let map = parse(&vcf);
        // ref=10, alt=3+7=10, total=20 -> 50%
        assert_relative_eq!(map["chr1"][0].frequency, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_dp_overrides_ad_sum_when_larger() {
        let header = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1";
        let vcf = format!("{}\nchr1\t500\t.\tG\tA\t.\t.\t.\tGT:AD:DP\t0/1:10,8:25\n", header);
        let map = parse(&vcf);
        // AD sums to 18, DP=25 wins: 8/25
        assert_relative_eq!(map["chr1"][0].frequency, 32.0, epsilon = 1e-9);
    }

    #[test]
    fn test_dp_not_applied_when_smaller() {
        let header = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1";
        let vcf = format!("{}\nchr1\t500\t.\tG\tA\t.\t.\t.\tGT:AD:DP\t0/1:10,10:5\n", header);
        let map = parse(&vcf);
        assert_relative_eq!(map["chr1"][0].frequency, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_adf_adr_reconstruction() {
        let header = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1";
        let vcf = format!(
            "{}\nchr1\t500\t.\tC\tT\t.\t.\t.\tGT:ADF:ADR\t0/1:5,2:5,3\n",
            header
        );
        let map = parse(&vcf);
        // ref=5+5=10, alt=2+3=5 -> 5/15
        assert_relative_eq!(map["chr1"][0].frequency, 100.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_min_depth_threshold() {
        let header = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1";
        let vcf = format!("{}\nchr1\t500\t.\tG\tA\t.\t.\t.\tGT:AD\t0/1:7,3\n", header);
        let deep = ParseConfig {
            control: None,
            min_depth: 11,
        };
        let (map, _) = parse_with(&vcf, &deep);
        assert!(map.is_empty());

        let shallow = ParseConfig {
            control: None,
            min_depth: 10,
        };
        let (map, _) = parse_with(&vcf, &shallow);
        assert_eq!(map["chr1"].len(), 1);
    }

    #[test]
    fn test_no_call_sample_skipped() {
        let vcf = format!(
            "{}\nchr1\t1000\t.\tG\tA\t.\t.\t.\tGT:AD\t./.\t0/1:5,5\n",
            HEADER
        );
        let map = parse(&vcf);
        assert_relative_eq!(map["chr1"][0].frequency, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_gt_key_skips_sample() {
        let header = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1";
        let vcf = format!("{}\nchr1\t500\t.\tG\tA\t.\t.\t.\tAD:DP\t7,3:10\n", header);
        assert!(parse(&vcf).is_empty());
    }

    #[test]
    fn test_single_ad_value_rejected_with_diagnostic() {
        let header = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1";
        let vcf = format!("{}\nchr1\t500\t.\tG\tA\t.\t.\t.\tGT:AD\t0/1:7\n", header);
        let (map, diag) = parse_with(&vcf, &ParseConfig::default());
        assert!(map.is_empty());
        assert_eq!(diag.samples_skipped, 1);
    }

    #[test]
    fn test_headerless_input_treats_all_samples_as_mutant() {
        let vcf = "chr1\t1000\t.\tG\tA\t.\t.\t.\tGT:AD\t0/1:7,3\t0/1:5,5\n";
        let map = parse(vcf);
        assert_relative_eq!(map["chr1"][0].frequency, 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_malformed_lines_logged_and_skipped() {
        let vcf = format!(
            "{}\nchr1\t1000\t.\tG\n\
             chr1\tnot_a_number\t.\tG\tA\t.\t.\t.\tGT:AD\t0/1:7,3\t0/1:5,5\n\
             chr1\t2000\t.\tG\tA\t.\t.\t.\tGT:AD\t0/1:5,5\t0/1:5,5\n",
            HEADER
        );
        let (map, diag) = parse_with(&vcf, &ParseConfig::default());
        assert_eq!(diag.records_skipped, 2);
        assert_eq!(diag.messages().len(), 2);
        assert_eq!(map["chr1"].len(), 1);
        assert_eq!(map["chr1"][0].pos, 2000);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let mut diag = ParseDiagnostics::new();
        let result = parse_vcf_frequencies(
            Path::new("/nonexistent/input.vcf"),
            &ParseConfig::default(),
            &mut diag,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_chromosome_order_and_position_sort() {
        let vcf = format!(
            "{}\nchr2\t3000\t.\tG\tA\t.\t.\t.\tGT:AD\t0/1:5,5\t0/1:5,5\n\
             chr2\t1000\t.\tG\tA\t.\t.\t.\tGT:AD\t0/1:5,5\t0/1:5,5\n\
             chr1\t2000\t.\tG\tA\t.\t.\t.\tGT:AD\t0/1:5,5\t0/1:5,5\n",
            HEADER
        );
        let map = parse(&vcf);
        let chroms: Vec<&str> = map.keys().map(|c| c.as_str()).collect();
        assert_eq!(chroms, ["chr2", "chr1"]);
        let positions: Vec<u64> = map["chr2"].iter().map(|o| o.pos).collect();
        assert_eq!(positions, [1000, 3000]);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let vcf = format!(
            "{}\nchr1\t1000\t.\tG\tA\t.\t.\t.\tGT:AD:DP\t0/1:7,3:10\t0/1:5,5:10\n\
             chr2\t500\t.\tC\tT\t.\t.\t.\tGT:AD\t1/1:0,9\t0/1:4,4\n",
            HEADER
        );
        let first = parse(&vcf);
        let second = parse(&vcf);
        assert_eq!(
            first.keys().collect::<Vec<_>>(),
            second.keys().collect::<Vec<_>>()
        );
        for (chrom, observations) in &first {
            assert_eq!(observations, &second[chrom]);
        }
    }

    #[test]
    fn test_gzipped_input() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let vcf = format!(
            "{}\nchr1\t1000\t.\tG\tA\t.\t.\t.\tGT:AD\t0/1:5,5\t0/1:5,5\n",
            HEADER
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.vcf.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(vcf.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let mut diag = ParseDiagnostics::new();
        let map =
            parse_vcf_frequencies(&path, &ParseConfig::default(), &mut diag, None).unwrap();
        assert_relative_eq!(map["chr1"][0].frequency, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_frequencies_within_bounds() {
        let vcf = format!(
            "{}\nchr1\t1\t.\tG\tA\t.\t.\t.\tGT:AD\t1/1:0,30\t1/1:0,12\n\
             chr1\t2\t.\tG\tA\t.\t.\t.\tGT:AD\t0/1:30,0\t0/1:12,1\n",
            HEADER
        );
        let map = parse(&vcf);
        for obs in &map["chr1"] {
            assert!(obs.frequency >= 0.0 && obs.frequency <= 100.0);
        }
    }
}
