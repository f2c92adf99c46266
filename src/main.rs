use anyhow::{Context, Result};
use centoscan::aggregate::{self, Granularity, PositionTable};
use centoscan::config::AppConfig;
use centoscan::corpus::{self, Corpus, LoadOptions, LoadReport};
use centoscan::counter::{Bucketing, PositionScheme};
use centoscan::{patterns, report, structure};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "centoscan",
    version,
    about = "Cento position analysis for segmented music corpora"
)]
struct Cli {
    /// Config file (defaults to the XDG config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct CorpusArgs {
    /// Directory of MusicXML scores (defaults to config scores_dir)
    #[arg(long)]
    scores: Option<PathBuf>,

    /// Annotation JSON file (defaults to config annotations)
    #[arg(long)]
    annotations: Option<PathBuf>,

    /// Number of parallel workers (0 = auto-detect from config)
    #[arg(short = 'j', long, default_value = "0")]
    jobs: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Count where each pattern occurs within sanai and lines
    Count {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// Pattern source file: json, yaml or toml (defaults to config patterns)
        #[arg(long)]
        patterns: Option<PathBuf>,

        /// Position buckets (defaults to config scheme)
        #[arg(long, value_enum)]
        scheme: Option<PositionScheme>,

        /// Write a JSON report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Draw PNG charts into the configured output_dir
        #[arg(long)]
        plots: bool,
    },

    /// Show the annotated structure of every loaded piece
    Structure {
        #[command(flatten)]
        corpus: CorpusArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let config = AppConfig::load(cli.config.as_deref());

    match cli.command {
        Commands::Count {
            corpus: corpus_args,
            patterns: patterns_path,
            scheme,
            output,
            plots,
        } => {
            // Resolve inputs: CLI > config
            let patterns_path = patterns_path
                .or(config.patterns.clone())
                .context("No pattern file. Pass --patterns or set patterns in config.")?;
            let sources = patterns::load_sources(&patterns_path).with_context(|| {
                format!("Failed to load patterns from {}", patterns_path.display())
            })?;
            let scheme = scheme.unwrap_or(config.scheme);
            let workers = resolve_jobs(corpus_args.jobs, &config);

            let (corpus, load) = load_inputs(&corpus_args, &config, workers)?;
            print_load_summary(&load);
            if corpus.is_empty() {
                anyhow::bail!("No pieces loaded; nothing to count.");
            }

            let analysis =
                aggregate::analyze(&corpus, &sources, scheme, workers, &config.mode_family)
                    .context("Aggregation failed")?;

            for level in Granularity::ALL {
                let level_analysis = analysis.level(level);
                for (group, table) in &level_analysis.groups {
                    println!("\n{group} ({level})");
                    print_position_table(table);
                }
                println!("\nCorpus-wide distribution ({level})");
                print_distribution(&level_analysis.distribution);
            }

            if let Some(path) = output {
                let names = sources.iter().map(|s| s.name.clone()).collect();
                report::Report::new(&analysis, &load, names)
                    .write(&path)
                    .with_context(|| format!("Failed to write report to {}", path.display()))?;
                println!("\nReport written to {}", path.display());
            }

            if plots {
                draw_plots(&analysis, &config.output_dir)?;
            }
        }

        Commands::Structure { corpus: corpus_args } => {
            let workers = resolve_jobs(corpus_args.jobs, &config);
            let (corpus, load) = load_inputs(&corpus_args, &config, workers)?;
            print_structure_table(&corpus);
            print_load_summary(&load);
        }
    }

    Ok(())
}

fn resolve_jobs(jobs: usize, config: &AppConfig) -> usize {
    if jobs > 0 { jobs } else { config.resolve_workers() }
}

fn load_inputs(
    args: &CorpusArgs,
    config: &AppConfig,
    workers: usize,
) -> Result<(Corpus, LoadReport)> {
    let scores = args
        .scores
        .clone()
        .or(config.scores_dir.clone())
        .context("No scores directory. Pass --scores or set scores_dir in config.")?;
    let annotations = args
        .annotations
        .clone()
        .or(config.annotations.clone())
        .context("No annotation file. Pass --annotations or set annotations in config.")?;

    let opts = LoadOptions {
        jobs: workers,
        parse_timeout: config.parse_timeout(),
    };
    corpus::load_corpus(&scores, &annotations, &opts).context("Failed to load corpus")
}

#[cfg(feature = "plots")]
fn draw_plots(analysis: &aggregate::Analysis, output_dir: &Path) -> Result<()> {
    let written =
        centoscan::plot::plot_analysis(analysis, output_dir).context("Plotting failed")?;
    println!("\n{} charts written to {}", written.len(), output_dir.display());
    Ok(())
}

#[cfg(not(feature = "plots"))]
fn draw_plots(_analysis: &aggregate::Analysis, _output_dir: &Path) -> Result<()> {
    anyhow::bail!("This build has no chart support; rebuild with `--features plots`.")
}

fn print_load_summary(load: &LoadReport) {
    println!(
        "\nLoaded {} of {} scores ({} skipped)",
        load.loaded,
        load.discovered,
        load.failures.len()
    );
    for f in &load.failures {
        println!("  {:<40} {}", truncate(&f.piece_id, 40), f.cause);
    }
}

fn print_position_table(table: &PositionTable) {
    let labels = table.scheme().labels();
    let width = match table.scheme() {
        PositionScheme::Quartile => 11,
        PositionScheme::Decile => 6,
    };

    print!("{:<24}", "Pattern");
    for label in labels {
        print!(" {:>width$}", short_label(label), width = width);
    }
    println!(" {:>7}", "Total");
    println!("{}", "-".repeat(24 + (width + 1) * labels.len() + 8));

    for (pattern, buckets) in table.rows() {
        print!("{:<24}", truncate(pattern, 24));
        for n in buckets {
            print!(" {:>width$}", n, width = width);
        }
        println!(" {:>7}", table.row_total(pattern));
    }
}

fn print_distribution(dist: &aggregate::Distribution) {
    let shares = dist.shares();
    for ((label, total), share) in dist.labeled().zip(shares) {
        println!("  {:<18} {:>9.3} {:>6.1}%", label, total, share * 100.0);
    }
    println!(
        "  ({} rows normalized, {} all-zero rows skipped)",
        dist.rows_used, dist.rows_skipped
    );
}

fn print_structure_table(corpus: &Corpus) {
    println!(
        "{:<40} {:>4} {:>5} {:>5} {:>6} {:>7}  {}",
        "Piece", "Sec", "Sanai", "Lines", "LnSec", "Pitched", "Mizans"
    );
    println!("{}", "-".repeat(100));

    for piece in corpus.pieces() {
        let s = structure::summarize(&piece.sections);
        let mizans: Vec<&str> = piece.mizans.iter().map(String::as_str).collect();
        println!(
            "{:<40} {:>4} {:>5} {:>5} {:>6} {:>7}  {}",
            truncate(&piece.id, 40),
            s.sections,
            s.sanai,
            s.lines,
            s.line_sections,
            s.pitched_events,
            mizans.join(", ")
        );
        log::debug!("{}: lines per sana {:?}", piece.id, s.lines_per_sana);
    }
}

/// "Start 25%" → "Start", "10th Percentile" → "10th".
fn short_label(label: &str) -> &str {
    label.split_whitespace().next().unwrap_or(label)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 3).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}
