//! branch-trends - bank branch trend reports
//!
//! A CLI tool that turns pre-fetched branch rows into county and bank
//! trend reports, with narrative sections written by a language model
//! and deterministic fallbacks when it is unavailable.
//!
//! Exit codes:
//!   0   - Success
//!   1   - Runtime error (bad input, empty selection, export failure, etc.)
//!   130 - Cancelled (Ctrl-C)

mod analysis;
mod cli;
mod config;
mod error;
mod input;
mod models;
mod narrative;
mod pipeline;
mod progress;
mod report;

use anyhow::{bail, Context, Result};
use cli::Args;
use config::{Config, Provider};
use error::PipelineError;
use models::Selection;
use narrative::{create_backend, NarrativeOrchestrator, RetryPolicy};
use pipeline::{CancelHandle, Pipeline, PipelineOptions, RunContext, RunOutcome};
use progress::{LogProgress, ProgressSink, SpinnerProgress};
use report::Exporter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("branch-trends v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_report(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Report failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .branch-trends.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", config::CONFIG_FILE);
    println!("   Edit it to choose the narrative provider, model, formats, and more.");
    Ok(())
}

fn init_logging(args: &Args) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete report workflow. Returns the exit code.
async fn run_report(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let input_path = args.input.clone().context("--input is required")?;

    // Step 1: Load the query results
    println!("📥 Loading branch data: {}", input_path.display());
    let loaded = input::load(&input_path)?;
    info!(
        "Loaded {} rows from {} files",
        loaded.rows.len(),
        loaded.files.len()
    );
    if loaded.undecodable > 0 {
        warn!("{} input records could not be decoded", loaded.undecodable);
    }

    let selection = resolve_selection(&args, &loaded.rows)?;
    if selection.is_empty() {
        bail!("Nothing to report: no counties or years selected");
    }
    println!(
        "   Counties: {}\n   Years: {}",
        selection.counties.join("; "),
        selection
            .years
            .iter()
            .map(|y| y.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let grouped = input::group_by_selection(&selection, loaded.rows);

    // Handle --dry-run: normalize and aggregate, then exit
    if args.dry_run {
        handle_dry_run(&grouped);
        return Ok(0);
    }

    // Step 2: Narrative backend
    let backend = create_backend(&config.narrative)?;
    let narrator = NarrativeOrchestrator::new(
        backend,
        RetryPolicy::from_config(&config.narrative),
        config.narrative.concurrency,
        config.analysis.top_banks,
    );

    println!("🤖 Narrative provider: {}", narrator.provider_name());
    if config.narrative.provider != Provider::Offline {
        println!("   Timeout: {}s per section", config.narrative.timeout_seconds);
    }

    let exporters = build_exporters(&config.report.formats)?;
    let options = PipelineOptions {
        output_dir: PathBuf::from(&config.report.output_dir),
        file_stem: config.report.file_stem.clone(),
        title: config.report.title.clone(),
        concentration_threshold: config.analysis.concentration_threshold,
    };

    let progress: Arc<dyn ProgressSink> = if config.general.show_progress && !config.general.verbose
    {
        Arc::new(SpinnerProgress::new())
    } else {
        Arc::new(LogProgress)
    };

    let (handle, token) = CancelHandle::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            handle.cancel();
        }
    });

    // Step 3: Run the pipeline
    println!("\n📊 Building report...");
    let ctx = RunContext::new(token, progress);
    let pipeline = Pipeline::new(options, narrator, exporters);

    match pipeline.run(&selection, &grouped.results, ctx).await {
        Ok(outcome) => {
            print_summary(&outcome, grouped.skipped);
            Ok(0)
        }
        Err(PipelineError::Cancelled) => {
            eprintln!("\n⚠️  Run cancelled. No reports were written.");
            Ok(EXIT_CANCELLED)
        }
        Err(e) => Err(e.into()),
    }
}

/// Load configuration from --config, the current directory, or defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default()? {
        Some(config) => {
            info!("Loaded {}", config::CONFIG_FILE);
            Ok(config)
        }
        None => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

/// Selection from the flags, falling back to what the input contains.
fn resolve_selection(args: &Args, rows: &[models::RawBranchRow]) -> Result<Selection> {
    let derived = input::derive_selection(rows);

    let counties = match args.counties {
        Some(ref counties) => counties.clone(),
        None => derived.counties,
    };
    let years = match args.years {
        Some(ref years) => input::parse_years(years)?,
        None => derived.years,
    };

    Ok(Selection::new(counties, years))
}

fn build_exporters(formats: &[String]) -> Result<Vec<Box<dyn Exporter>>> {
    let mut exporters: Vec<Box<dyn Exporter>> = Vec::new();

    for format in formats {
        let Some(exporter) = report::exporter_for(format) else {
            bail!(
                "Unknown format '{}'. Expected one of: {}",
                format,
                report::FORMATS.join(", ")
            );
        };
        if exporters.iter().any(|e| e.name() == exporter.name()) {
            continue;
        }
        exporters.push(exporter);
    }

    if exporters.is_empty() {
        warn!("No output formats configured, writing every format");
        return Ok(report::default_exporters());
    }

    Ok(exporters)
}

/// Handle --dry-run: show what the report would contain.
fn handle_dry_run(grouped: &input::GroupedRows) {
    let normalized = analysis::normalize(&grouped.results);
    let aggregates = analysis::aggregate(&normalized.records);
    let banks = analysis::aggregator::distinct_banks(&aggregates.banks);

    println!("\n🔍 Dry run: no narrative or report files will be produced\n");
    println!("   Rows read: {}", normalized.rows_seen + grouped.skipped);
    println!("   Outside selection: {}", grouped.skipped);
    println!("   Rejected: {}", normalized.rejected.len());
    println!("   Duplicates merged: {}", normalized.duplicates_merged);
    println!("   Legacy feed rows: {}", normalized.legacy_rows);
    println!("   Branch records: {}", normalized.records.len());
    println!("   Banks: {}", banks.len());
    println!("   County-years with data: {}", aggregates.counties.len());

    for county in &aggregates.counties {
        println!(
            "   • {} {}: {} branches, {} banks",
            county.county_state, county.year, county.total_branches, county.bank_count
        );
    }

    for rejected in normalized.rejected.iter().take(10) {
        println!(
            "   ✗ {} {} row {}: {}",
            rejected.county_state, rejected.year, rejected.index, rejected.error
        );
    }
}

fn print_summary(outcome: &RunOutcome, skipped: usize) {
    let stats = &outcome.stats;

    println!("\n✅ Report complete: {}", outcome.model.metadata.title);
    println!("   Run: {}", outcome.context.run_id);
    println!(
        "   Records: {} ({} rejected, {} outside selection)",
        stats.records, stats.rows_rejected, skipped
    );
    if stats.narrative_offline {
        println!(
            "   Narrative: offline, {} sections from statistics",
            stats.narratives_fallback
        );
    } else {
        println!(
            "   Narrative: {} generated, {} from statistics",
            stats.narratives_generated, stats.narratives_fallback
        );
    }

    println!("\n📄 Files:");
    for path in &outcome.written {
        println!("   {}", path.display());
    }
}
