use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mutfreq::{output, statistics, transition, vcf_parser};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "mutfreq")]
#[command(version)]
#[command(about = "Mutant allele frequencies and transition filtering for mapping-by-sequencing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract per-site mutant allele frequencies and plot them per chromosome
    Freq(FreqArgs),
    /// Reduce a VCF to G->A / C->T transition SNPs with alt fraction >= 0.30
    Filter(FilterArgs),
}

#[derive(Args)]
struct FreqArgs {
    /// Input VCF file (can be gzipped)
    vcf: String,

    /// Output plot path (defaults to <input stem>_frequency.png)
    #[arg(short, long)]
    output: Option<String>,

    /// Plot title
    #[arg(short, long)]
    title: Option<String>,

    /// Skip plot rendering (statistics only)
    #[arg(long)]
    no_plot: bool,

    /// Control sample name; samples whose name contains it are excluded
    #[arg(long)]
    control: Option<String>,

    /// Minimum total depth for a sample to contribute
    #[arg(long, default_value = "1")]
    min_depth: u32,

    /// DPI for saved plots
    #[arg(long, default_value = "300")]
    dpi: u32,

    /// Figure size in inches as width height
    #[arg(long, num_args = 2, value_names = ["WIDTH", "HEIGHT"], default_values_t = [12.0, 8.0])]
    figsize: Vec<f64>,

    /// Also write the frequency table to a CSV file
    #[arg(long)]
    csv: Option<String>,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Args)]
struct FilterArgs {
    /// Input VCF file (can be gzipped)
    input: String,

    /// Output VCF path for retained records
    output: String,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

macro_rules! progress {
    ($quiet:expr) => {
        if !$quiet {
            eprintln!();
        }
    };
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            eprintln!($($arg)*);
        }
    };
}

fn make_spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("  {spinner} [{elapsed_precise}] {pos} {msg}").unwrap(),
    );
    pb
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Freq(args) => run_freq(&args),
        Command::Filter(args) => run_filter(&args),
    }
}

fn run_freq(args: &FreqArgs) -> Result<()> {
    if !Path::new(&args.vcf).exists() {
        anyhow::bail!("Input file not found: {}", args.vcf);
    }

    progress!(args.quiet, "Mutant Allele Frequency Extractor");
    progress!(args.quiet, "=========================================");
    progress!(args.quiet, "Input VCF: {}", args.vcf);
    match &args.control {
        Some(control) => progress!(args.quiet, "Control sample: {} (substring match)", control),
        None => progress!(args.quiet, "Control sample: none (all samples treated as mutant)"),
    }
    progress!(args.quiet, "Min depth: {}", args.min_depth);
    progress!(args.quiet);

    progress!(args.quiet, "Step 1: Parsing VCF...");
    let config = vcf_parser::ParseConfig {
        control: args.control.clone(),
        min_depth: args.min_depth,
    };
    let mut diagnostics = vcf_parser::ParseDiagnostics::new();

    let pb = make_spinner(args.quiet);
    pb.set_message("lines scanned");
    let mutations =
        vcf_parser::parse_vcf_frequencies(Path::new(&args.vcf), &config, &mut diagnostics, Some(&pb))?;
    pb.finish_and_clear();

    for message in diagnostics.messages() {
        progress!(args.quiet, "  Warning: {}", message);
    }
    if diagnostics.suppressed() > 0 {
        progress!(args.quiet, "  ({} further warnings suppressed)", diagnostics.suppressed());
    }
    progress!(
        args.quiet,
        "  Scanned {} lines, skipped {} malformed record(s) and {} sample field(s)",
        diagnostics.lines_total,
        diagnostics.records_skipped,
        diagnostics.samples_skipped
    );

    if mutations.is_empty() {
        anyhow::bail!("No qualifying mutations found in {}", args.vcf);
    }

    progress!(args.quiet);
    progress!(args.quiet, "Found mutations on {} chromosome(s):", mutations.len());
    for (chrom, observations) in &mutations {
        progress!(args.quiet, "  {}: {} mutation(s)", chrom, observations.len());
    }

    progress!(args.quiet);
    progress!(args.quiet, "Step 2: Calculating summary statistics...");
    let stats = statistics::mutation_statistics(&mutations);
    for (chrom, s) in &stats {
        progress!(args.quiet, "Chromosome {}:", chrom);
        progress!(args.quiet, "  Count: {}", s.count);
        progress!(args.quiet, "  Mean frequency: {:.2}%", s.mean_frequency);
        progress!(args.quiet, "  Median frequency: {:.2}%", s.median_frequency);
        progress!(args.quiet, "  Std deviation: {:.2}", s.std_frequency);
        progress!(
            args.quiet,
            "  Frequency range: {:.2}% - {:.2}%",
            s.min_frequency,
            s.max_frequency
        );
        progress!(
            args.quiet,
            "  Position range: {} - {}",
            s.min_position,
            s.max_position
        );
    }

    if let Some(ref csv_path) = args.csv {
        progress!(args.quiet);
        progress!(args.quiet, "Step 3: Writing frequency table to {}...", csv_path);
        output::write_frequencies(&mutations, Path::new(csv_path))?;
    }

    #[cfg(feature = "plotting")]
    if !args.no_plot {
        use mutfreq::plotting;

        let plot_path = resolve_plot_path(args);
        let config = plotting::PlotConfig {
            width: (args.figsize[0] * args.dpi as f64) as u32,
            row_height: (args.figsize[1] * args.dpi as f64) as u32,
            format: plotting::PlotFormat::from_path(&plot_path),
        };
        let title = args.title.clone().unwrap_or_else(|| {
            format!(
                "Mutation Frequency vs. Chromosome Location - {}",
                input_stem(&args.vcf)
            )
        });

        progress!(args.quiet);
        progress!(args.quiet, "Generating plot...");
        plotting::plot_frequencies(&mutations, &plot_path, &title, &config)?;
    }

    #[cfg(not(feature = "plotting"))]
    if !args.no_plot {
        eprintln!("Warning: plotting feature not enabled. Rebuild with default features to enable plots.");
    }

    progress!(args.quiet);
    progress!(args.quiet, "Done!");

    Ok(())
}

fn run_filter(args: &FilterArgs) -> Result<()> {
    if !Path::new(&args.input).exists() {
        anyhow::bail!("Input file not found: {}", args.input);
    }

    progress!(args.quiet, "Transition SNP Filter (G->A / C->T)");
    progress!(args.quiet, "=========================================");
    progress!(args.quiet, "Input VCF: {}", args.input);
    progress!(args.quiet, "Output VCF: {}", args.output);
    progress!(args.quiet);

    let summary = transition::filter_transitions(Path::new(&args.input), Path::new(&args.output))?;

    progress!(
        args.quiet,
        "Retained {} of {} record(s) ({:.1}%)",
        summary.records_retained,
        summary.records_total,
        100.0 * summary.records_retained as f64 / summary.records_total.max(1) as f64
    );
    progress!(args.quiet, "Done! Filtered VCF written to: {}", args.output);

    Ok(())
}

/// Strip `.vcf` / `.vcf.gz` from the input name for titles and defaults.
fn input_stem(input: &str) -> String {
    let path = Path::new(input);
    path.file_stem()
        .map(|stem| {
            let stem = stem.to_string_lossy();
            stem.trim_end_matches(".vcf").to_string()
        })
        .unwrap_or_else(|| "output".to_string())
}

/// Default plot path: next to the input, named after its stem.
#[cfg(feature = "plotting")]
fn resolve_plot_path(args: &FreqArgs) -> PathBuf {
    if let Some(ref output) = args.output {
        return PathBuf::from(output);
    }
    let input_path = Path::new(&args.vcf);
    let dir = input_path.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("{}_frequency.png", input_stem(&args.vcf)))
}
