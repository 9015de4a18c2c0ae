//! claimscope - batch anomaly detection over tabular claims records
//!
//! The main entry point, handling:
//! - Full batch runs (load → classify → normalize → reduce → score → export)
//! - Re-scoring reduced rows against a saved mixture model
//! - Run bundle inspection and verification
//! - Configuration display and validation

use clap::{Args, Parser, Subcommand};
use cs_bundle::{BundleError, BundleReader};
use cs_common::{format_error_human, Error, OutputFormat, StructuredError, SCHEMA_VERSION};
use cs_config::{load_config, ConfigOverrides, ExportSpace, ValidationError};
use cs_core::exit_codes::ExitCode;
use cs_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use cs_core::pipeline::{RunOutcome, RunSummary};
use cs_core::report::{BundleReporter, NullReporter, RunReporter};
use cs_core::score::{below_threshold, GaussianMixture};
use cs_core::table::read_csv_path;
use cs_core::Pipeline;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

/// Flag the low-density tail of a claims table under a Gaussian mixture
#[derive(Parser)]
#[command(name = "claimscope")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Configuration file (overrides CLAIMSCOPE_CONFIG and the XDG location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format for the command payload on stdout
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full batch pass over a CSV table
    Run(RunArgs),

    /// Score rows already in the reduced feature space against a saved model
    Rescore(RescoreArgs),

    /// Show a run bundle's manifest and summary
    Inspect(InspectArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Input CSV with a header row
    input: PathBuf,

    /// Write a run bundle here
    #[arg(long)]
    bundle: Option<PathBuf>,

    /// Also write the anomalous rows to this CSV (requires --bundle)
    #[arg(long, requires = "bundle")]
    anomalies_csv: Option<PathBuf>,

    #[command(flatten)]
    overrides: OverrideArgs,
}

/// Flags that override the resolved configuration file
#[derive(Args, Debug, Default)]
struct OverrideArgs {
    /// Seed for the mixture restarts
    #[arg(long)]
    seed: Option<u64>,

    /// Number of mixture components
    #[arg(long)]
    components: Option<usize>,

    /// Number of mixture restarts
    #[arg(long)]
    restarts: Option<usize>,

    /// Fraction of variance the projection retains
    #[arg(long)]
    variance: Option<f64>,

    /// Lower-tail percentile of log-density used as the threshold
    #[arg(long)]
    percentile: Option<f64>,

    /// Feature space of the anomaly table: reduced or normalized
    #[arg(long)]
    export_space: Option<ExportSpace>,
}

impl From<&OverrideArgs> for ConfigOverrides {
    fn from(args: &OverrideArgs) -> Self {
        ConfigOverrides {
            n_components: args.components,
            n_init: args.restarts,
            seed: args.seed,
            variance_retained: args.variance,
            percentile: args.percentile,
            export_space: args.export_space,
        }
    }
}

#[derive(Args, Debug)]
struct RescoreArgs {
    /// Mixture model JSON, or a run bundle containing one
    #[arg(long)]
    model: PathBuf,

    /// CSV of reduced rows (pc_0, pc_1, ...)
    input: PathBuf,

    /// Log-density threshold; defaults to the one recorded in a bundle
    #[arg(long)]
    threshold: Option<f64>,

    /// Write per-row scores to this CSV
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Run bundle to inspect
    bundle: PathBuf,

    /// Verify every file checksum
    #[arg(long)]
    verify: bool,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate a configuration file
    Validate {
        /// File to validate (defaults to the resolved configuration)
        path: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(
        LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet),
        cli.global.log_format,
    );
    init_logging(&log_config);

    let exit_code = match &cli.command {
        Commands::Run(args) => run_batch(&cli.global, args),
        Commands::Rescore(args) => run_rescore(&cli.global, args),
        Commands::Inspect(args) => run_inspect(&cli.global, args),
        Commands::Config(args) => match &args.command {
            ConfigCommands::Show => run_config_show(&cli.global),
            ConfigCommands::Validate { path } => run_config_validate(&cli.global, path.as_deref()),
        },
        Commands::Version => {
            print_version(&cli.global);
            ExitCode::Clean
        }
    };

    std::process::exit(exit_code.as_i32());
}

fn config_error(err: ValidationError) -> Error {
    match err {
        ValidationError::InvalidValue { field, message } => Error::InvalidConfig { field, message },
        other => Error::Config(other.to_string()),
    }
}

fn bundle_error(err: BundleError) -> Error {
    match err {
        BundleError::Io(e) => Error::Io(e),
        other if other.is_integrity_failure() => {
            Error::Ingest(format!("run bundle failed integrity checks: {other}"))
        }
        other => Error::Ingest(format!("unreadable run bundle: {other}")),
    }
}

fn use_color(global: &GlobalOpts) -> bool {
    !global.no_color && std::io::stderr().is_terminal()
}

/// Report a fatal error on stderr and pick the exit code for it.
fn output_error(global: &GlobalOpts, err: &Error) -> ExitCode {
    output_error_as(global, err, ExitCode::for_error(err))
}

fn output_error_as(global: &GlobalOpts, err: &Error, exit: ExitCode) -> ExitCode {
    match global.format {
        OutputFormat::Json => {
            let structured = StructuredError::from(err).with_context("exit_code", exit.as_i32());
            eprintln!("{}", structured.to_json_pretty());
        }
        OutputFormat::Human => eprintln!("{}", format_error_human(err, use_color(global))),
    }
    exit
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}

fn run_batch(global: &GlobalOpts, args: &RunArgs) -> ExitCode {
    let overrides = ConfigOverrides::from(&args.overrides);
    let loaded = match load_config(global.config.as_deref(), &overrides) {
        Ok(l) => l,
        Err(e) => return output_error(global, &config_error(e)),
    };

    let pipeline = Pipeline::new(loaded.config, loaded.snapshot);
    let mut bundle_reporter = args.bundle.as_ref().map(|path| {
        let reporter = BundleReporter::new(path);
        match &args.anomalies_csv {
            Some(csv) => reporter.with_anomalies_csv(csv),
            None => reporter,
        }
    });
    let mut null = NullReporter;
    let reporter: &mut dyn RunReporter = match bundle_reporter.as_mut() {
        Some(r) => r,
        None => &mut null,
    };

    match pipeline.run_path(&args.input, reporter) {
        Ok(outcome) => {
            print_run(global, &outcome, args.bundle.as_deref());
            ExitCode::Clean
        }
        Err(e) => output_error(global, &e),
    }
}

fn print_run(global: &GlobalOpts, outcome: &RunOutcome, bundle: Option<&Path>) {
    let s = &outcome.summary;
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "command": "run",
            "run_id": outcome.run_id,
            "rows": s.rows,
            "normalized_columns": outcome.metrics.normalized_columns,
            "retained_components": s.reduce.retained_components,
            "explained_variance": s.reduce.cumulative_variance_ratio,
            "threshold": s.score.threshold,
            "converged": s.score.converged,
            "anomaly_count": s.anomalies.len(),
            "anomalies": s.anomalies,
            "diagnostics": s.diagnostics.len(),
            "bundle": bundle.map(|p| p.display().to_string()),
        })),
        OutputFormat::Human => {
            println!("claimscope run {}", outcome.run_id);
            println!(
                "  rows: {}  features: {}  components: {} ({:.1}% variance)",
                s.rows,
                outcome.metrics.normalized_columns,
                s.reduce.retained_components,
                s.reduce.cumulative_variance_ratio * 100.0
            );
            println!(
                "  threshold: {:.4}  anomalous: {} ({:.2}%)",
                s.score.threshold,
                s.anomalies.len(),
                s.score.anomaly_rate * 100.0
            );
            for a in &s.anomalies {
                println!("    row {:>6}  log-density {:.4}", a.row, a.log_density);
            }
            for d in &s.diagnostics {
                println!("  note: {d}");
            }
            if let Some(path) = bundle {
                println!("  bundle: {}", path.display());
            }
        }
    }
}

/// Model and, for bundles, the threshold recorded with it.
fn load_model(path: &Path) -> Result<(GaussianMixture, Option<f64>), Error> {
    let bytes = std::fs::read(path)?;
    let (model, recorded): (GaussianMixture, Option<f64>) = if bytes.starts_with(b"PK") {
        let mut reader = BundleReader::from_bytes(bytes).map_err(bundle_error)?;
        let model = reader.read_model().map_err(bundle_error)?;
        let summary: RunSummary = reader.read_summary().map_err(bundle_error)?;
        (model, Some(summary.score.threshold))
    } else {
        (serde_json::from_slice(&bytes)?, None)
    };
    model.validate()?;
    Ok((model, recorded))
}

fn write_scores_csv(path: &Path, scores: &[f64], flags: Option<&[bool]>) -> Result<(), Error> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| Error::ArtifactExport(e.to_string()))?;
    let export = |e: csv::Error| Error::ArtifactExport(e.to_string());
    let header: &[&str] = match flags {
        Some(_) => &["row", "log_density", "anomalous"],
        None => &["row", "log_density"],
    };
    writer.write_record(header).map_err(export)?;
    for (row, score) in scores.iter().enumerate() {
        let mut record = vec![row.to_string(), score.to_string()];
        if let Some(flags) = flags {
            record.push(flags[row].to_string());
        }
        writer.write_record(&record).map_err(export)?;
    }
    writer.flush()?;
    Ok(())
}

fn run_rescore(global: &GlobalOpts, args: &RescoreArgs) -> ExitCode {
    let (model, recorded) = match load_model(&args.model) {
        Ok(m) => m,
        Err(e) => return output_error(global, &e),
    };
    let x = match read_csv_path(&args.input).and_then(|t| t.to_matrix()) {
        Ok(x) => x,
        Err(e) => return output_error(global, &e.into()),
    };
    let scores = match model.score_samples(&x) {
        Ok(s) => s,
        Err(e) => return output_error(global, &e.into()),
    };

    let threshold = args.threshold.or(recorded);
    let flags: Option<Vec<bool>> = threshold.map(|t| {
        let below = below_threshold(&scores, t);
        (0..scores.len()).map(|i| below.binary_search(&i).is_ok()).collect()
    });

    if let Some(path) = &args.output {
        if let Err(e) = write_scores_csv(path, &scores, flags.as_deref()) {
            return output_error(global, &e);
        }
    }

    let anomaly_count = flags.as_ref().map(|f| f.iter().filter(|b| **b).count());
    match global.format {
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = scores
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    serde_json::json!({
                        "row": i,
                        "log_density": s,
                        "anomalous": flags.as_ref().map(|f| f[i]),
                    })
                })
                .collect();
            print_json(&serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "command": "rescore",
                "rows": scores.len(),
                "n_components": model.n_components(),
                "threshold": threshold,
                "anomaly_count": anomaly_count,
                "scores": rows,
            }));
        }
        OutputFormat::Human => {
            println!(
                "rescored {} row(s) against a {}-component model",
                scores.len(),
                model.n_components()
            );
            match (threshold, anomaly_count) {
                (Some(t), Some(n)) => println!("threshold {t:.4}: {n} anomalous"),
                _ => println!("no threshold supplied; scores only"),
            }
        }
    }
    ExitCode::Clean
}

fn run_inspect(global: &GlobalOpts, args: &InspectArgs) -> ExitCode {
    let mut reader = match BundleReader::open(&args.bundle) {
        Ok(r) => r,
        Err(e) => return output_error_as(global, &bundle_error(e), ExitCode::BundleError),
    };
    let summary: Option<RunSummary> = reader.read_summary().ok();
    let failures = if args.verify {
        reader.verify_all()
    } else {
        Vec::new()
    };
    let manifest = reader.manifest().clone();

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "command": "inspect",
            "manifest": manifest,
            "summary": summary.as_ref().map(|s| serde_json::json!({
                "rows": s.rows,
                "retained_components": s.reduce.retained_components,
                "threshold": s.score.threshold,
                "anomaly_count": s.anomalies.len(),
            })),
            "missing_artifacts": manifest.missing_artifacts(),
            "verified": args.verify.then_some(failures.is_empty()),
            "checksum_failures": failures,
        })),
        OutputFormat::Human => {
            println!("bundle {} (run {})", args.bundle.display(), manifest.run_id);
            for file in &manifest.files {
                let short = &file.sha256[..12.min(file.sha256.len())];
                println!("  {:<24} {:>10} bytes  {}", file.path, file.bytes, short);
            }
            for path in manifest.missing_artifacts() {
                println!("  missing: {path}");
            }
            if let Some(s) = &summary {
                println!(
                    "  rows: {}  components: {}  anomalous: {}",
                    s.rows,
                    s.reduce.retained_components,
                    s.anomalies.len()
                );
            }
            if args.verify {
                if failures.is_empty() {
                    println!("  checksums: ok");
                } else {
                    for path in &failures {
                        println!("  checksum FAILED: {path}");
                    }
                }
            }
        }
    }

    if failures.is_empty() {
        ExitCode::Clean
    } else {
        ExitCode::BundleError
    }
}

fn run_config_show(global: &GlobalOpts) -> ExitCode {
    let loaded = match load_config(global.config.as_deref(), &ConfigOverrides::default()) {
        Ok(l) => l,
        Err(e) => return output_error(global, &config_error(e)),
    };
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "source": loaded.snapshot.source,
            "path": loaded.snapshot.path,
            "effective_hash": loaded.snapshot.effective_hash,
            "config": loaded.config,
        })),
        OutputFormat::Human => {
            println!(
                "source: {} {}",
                loaded.snapshot.source,
                loaded.snapshot.path.as_deref().unwrap_or("(built-in defaults)")
            );
            match loaded.config.to_json() {
                Ok(s) => println!("{s}"),
                Err(e) => return output_error(global, &Error::Json(e)),
            }
        }
    }
    ExitCode::Clean
}

fn run_config_validate(global: &GlobalOpts, path: Option<&Path>) -> ExitCode {
    let target = path.or(global.config.as_deref());
    match load_config(target, &ConfigOverrides::default()) {
        Ok(loaded) => {
            match global.format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "schema_version": SCHEMA_VERSION,
                    "status": "valid",
                    "source": loaded.snapshot.source,
                    "path": loaded.snapshot.path,
                })),
                OutputFormat::Human => println!(
                    "valid: {}",
                    loaded.snapshot.path.as_deref().unwrap_or("built-in defaults")
                ),
            }
            ExitCode::Clean
        }
        Err(e) => output_error(global, &config_error(e)),
    }
}

fn print_version(global: &GlobalOpts) {
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "claimscope_version": env!("CARGO_PKG_VERSION"),
            "rust_version": env!("CARGO_PKG_RUST_VERSION"),
        })),
        OutputFormat::Human => {
            println!("claimscope {}", env!("CARGO_PKG_VERSION"));
            println!("schema version: {SCHEMA_VERSION}");
        }
    }
}
