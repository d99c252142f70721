use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use trending_enricher::app::enrich_use_case::{progress_summary, EnrichUseCase, RunStatus};
use trending_enricher::app::lookup_use_case::LookupUseCase;
use trending_enricher::app::normalize_use_case::NormalizeUseCase;
use trending_enricher::app::ports::VideoMetadataPort;
use trending_enricher::app::snapshot_use_case::SnapshotUseCase;
use trending_enricher::common::config::AppConfig;
use trending_enricher::common::types::IdSource;
use trending_enricher::infra::YoutubeClient;
use trending_enricher::observability::{init_logging, metrics};
use trending_enricher::pipeline::processing::enrich::EnrichConfig;
use trending_enricher::pipeline::processing::normalize::DateWindow;
use trending_enricher::pipeline::storage::{CheckpointStore, CsvOptions};

const DEFAULT_RAW_FILE: &str = "trending_yt_videos_113_countries.csv";
const DEFAULT_CLEANED_FILE: &str = "cleaned_youtube_data.csv";
const DEFAULT_ENRICHED_FILE: &str = "enriched_youtube_data.csv";

#[derive(Parser)]
#[command(name = "trending-enricher")]
#[command(about = "Clean a YouTube trending export and enrich it with video metadata")]
#[command(version = "0.1.0")]
struct Cli {
    /// TOML config file (defaults to ./trending.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the rolling JSON log file
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    /// Write Prometheus metrics text here when the command finishes
    #[arg(long, global = true)]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the enrichment settings in the config file
#[derive(Args, Debug, Clone, Default)]
struct EnrichTuning {
    /// Checkpoint file recording processed video IDs
    #[arg(long)]
    progress_file: Option<PathBuf>,
    /// IDs per request (1..=50)
    #[arg(long)]
    batch_size: Option<usize>,
    /// Pause between batches in milliseconds
    #[arg(long)]
    pacing_ms: Option<u64>,
    /// API key; overrides YOUTUBE_API_KEY
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean the raw trending export and filter it to a date window
    Normalize {
        #[arg(long, default_value = DEFAULT_RAW_FILE)]
        input: PathBuf,
        #[arg(long, default_value = DEFAULT_CLEANED_FILE)]
        output: PathBuf,
        /// First trending day kept (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last trending day kept (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Fetch language and duration for videos not yet in the checkpoint
    Enrich {
        #[arg(long, default_value = DEFAULT_CLEANED_FILE)]
        input: PathBuf,
        #[arg(long, default_value = DEFAULT_ENRICHED_FILE)]
        output: PathBuf,
        #[command(flatten)]
        tuning: EnrichTuning,
    },
    /// Run normalize and enrich sequentially
    Run {
        #[arg(long, default_value = DEFAULT_RAW_FILE)]
        raw: PathBuf,
        #[arg(long, default_value = DEFAULT_CLEANED_FILE)]
        cleaned: PathBuf,
        #[arg(long, default_value = DEFAULT_ENRICHED_FILE)]
        output: PathBuf,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[command(flatten)]
        tuning: EnrichTuning,
    },
    /// Show enrichment progress without calling the API
    Status {
        #[arg(long, default_value = DEFAULT_CLEANED_FILE)]
        input: PathBuf,
        #[arg(long, default_value = DEFAULT_ENRICHED_FILE)]
        output: PathBuf,
        #[arg(long)]
        progress_file: Option<PathBuf>,
    },
    /// Look up metadata for specific videos by ID or by name
    Lookup {
        /// Comma-separated video IDs
        #[arg(long, value_delimiter = ',', required_unless_present = "names", conflicts_with = "names")]
        ids: Vec<String>,
        /// Video name to search for; repeat for several
        #[arg(long = "name")]
        names: Vec<String>,
        /// Write the results as CSV instead of printing them
        #[arg(long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        tuning: EnrichTuning,
    },
    /// Save today's most-popular chart for a region
    Snapshot {
        #[arg(long, default_value = "US")]
        region: String,
        #[arg(long, default_value_t = 50)]
        max_results: u32,
        /// Defaults to trending_<region>_<date>.csv
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        api_key: Option<String>,
    },
}

fn apply_tuning(config: &mut AppConfig, tuning: &EnrichTuning) -> Result<()> {
    if let Some(path) = &tuning.progress_file {
        config.enrich.progress_file = path.display().to_string();
    }
    if let Some(batch_size) = tuning.batch_size {
        config.enrich.batch_size = batch_size;
    }
    if let Some(pacing_ms) = tuning.pacing_ms {
        config.enrich.pacing_ms = pacing_ms;
    }
    if let Some(key) = &tuning.api_key {
        config.youtube.api_key = Some(key.clone());
    }
    config.validate()?;
    Ok(())
}

fn youtube_port(config: &AppConfig) -> Result<Arc<dyn VideoMetadataPort>> {
    let client = YoutubeClient::from_config(config).context("Failed to create YouTube client")?;
    Ok(Arc::new(client))
}

fn run_normalize(
    config: &mut AppConfig,
    input: &Path,
    output: &Path,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<()> {
    if let Some(start) = start {
        config.normalize.start_date = start;
    }
    if let Some(end) = end {
        config.normalize.end_date = end;
    }
    config.validate()?;

    println!(
        "🧹 Normalizing {} ({} to {})...",
        input.display(),
        config.normalize.start_date,
        config.normalize.end_date
    );
    let csv_options = CsvOptions {
        escape: config.csv.escape_byte()?,
        ..CsvOptions::default()
    };
    let window = DateWindow::from_dates(config.normalize.start_date, config.normalize.end_date);
    let use_case = NormalizeUseCase::with_default_normalizer(window, csv_options);
    let stats = use_case
        .run(input, output)
        .with_context(|| format!("Normalizing {} failed", input.display()))?;

    println!("\n📊 Normalize Results:");
    println!("   Rows read: {}", stats.rows_read);
    println!("   Rows kept: {} ({:.1}%)", stats.rows_kept, stats.kept_rate());
    println!("   Rows dropped: {}", stats.rows_dropped());
    println!("   Unparseable dates: {}", stats.unparseable_dates);
    println!("   Output file: {}", output.display());
    Ok(())
}

async fn run_enrich(config: &AppConfig, input: &Path, output: &Path) -> Result<()> {
    println!("🌐 Enriching {}...", input.display());
    let port = youtube_port(config)?;
    let use_case = EnrichUseCase::new(
        port,
        PathBuf::from(&config.enrich.progress_file),
        EnrichConfig::from(&config.enrich),
    );
    let report = use_case
        .run(input, output)
        .await
        .with_context(|| format!("Enriching {} failed", input.display()))?;

    let outcome = &report.outcome;
    println!("\n📊 Enrich Results:");
    println!("   Total videos: {}", outcome.total_ids);
    println!("   Already processed: {}", outcome.already_processed);
    println!(
        "   Batches: {}/{} succeeded, {} deferred",
        outcome.chunks_succeeded, outcome.chunks_total, outcome.chunks_deferred
    );
    println!("   Videos enriched this run: {}", outcome.ids_enriched);
    println!("   Not found: {}", outcome.ids_missing);
    println!("   Rows updated: {}", outcome.rows_updated);
    println!(
        "   Progress: {}/{} ({:.1}%)",
        outcome.total_ids - outcome.remaining(),
        outcome.total_ids,
        outcome.percent_complete()
    );
    println!("   Output file: {}", report.output_file.display());

    match report.status {
        RunStatus::QuotaExceeded => {
            println!("\n⚠️  API quota was exceeded. Run again later to continue processing.")
        }
        RunStatus::Incomplete => println!(
            "\n⏳ {} videos still pending. Run again to continue.",
            outcome.remaining()
        ),
        RunStatus::Complete => println!("\n✅ All videos have been processed successfully!"),
    }
    Ok(())
}

fn run_status(config: &AppConfig, input: &Path, output: &Path) -> Result<()> {
    // Status never touches the network, so a missing key is fine here
    let table = EnrichUseCase::load_working_table(input, output)?;
    let checkpoint = CheckpointStore::new(&config.enrich.progress_file).load();
    let summary = progress_summary(&table, &checkpoint)?;
    println!("📈 Enrichment progress:");
    println!("   Total videos: {}", summary.total_ids);
    println!("   Processed: {}", summary.processed);
    println!("   Remaining: {}", summary.remaining);
    println!("   Complete: {:.1}%", summary.percent_complete);
    match summary.last_updated {
        Some(ts) => println!("   Last checkpoint: {}", ts.to_rfc3339()),
        None => println!("   Last checkpoint: never"),
    }
    Ok(())
}

async fn run_lookup(config: &AppConfig, source: IdSource, output: Option<&Path>) -> Result<()> {
    println!("🔎 Looking up {} videos...", source.len());
    let use_case = LookupUseCase::new(youtube_port(config)?, EnrichConfig::from(&config.enrich));
    let report = use_case.run(source).await;

    match output {
        Some(path) => {
            report.to_table().write_csv(path)?;
            println!("   Saved {} results to {}", report.items.len(), path.display());
        }
        None => {
            for item in &report.items {
                println!("   {}  {}  {}s", item.id, item.language, item.duration_seconds);
            }
        }
    }
    for name in &report.unresolved_names {
        println!("   ⚠️  No video found for '{}'", name);
    }
    if !report.not_found_ids.is_empty() {
        println!("   ⚠️  Unknown IDs: {}", report.not_found_ids.join(", "));
    }
    if !report.deferred_ids.is_empty() {
        println!("   ⚠️  Gave up after retries: {}", report.deferred_ids.join(", "));
    }
    if report.quota_exceeded {
        println!("\n⚠️  API quota was exceeded before the lookup finished.");
    }
    Ok(())
}

async fn run_snapshot(
    config: &AppConfig,
    region: &str,
    max_results: u32,
    output: Option<PathBuf>,
) -> Result<()> {
    let today = Utc::now().date_naive();
    let output = output.unwrap_or_else(|| PathBuf::from(format!("trending_{}_{}.csv", region, today)));
    println!("📸 Fetching most popular videos for {}...", region);

    let use_case = SnapshotUseCase::new(youtube_port(config)?);
    let table = use_case.run(region, max_results, today).await?;
    table.write_csv(&output)?;
    println!("   Saved {} videos to {}", table.len(), output.display());
    Ok(())
}

fn write_metrics(path: &Path) {
    match metrics::render() {
        Some(text) => match fs::write(path, text) {
            Ok(()) => info!("Metrics written to {}", path.display()),
            Err(e) => warn!("Failed to write metrics to {}: {}", path.display(), e),
        },
        None => warn!("No metrics recorder installed; skipping {}", path.display()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let _log_guard = init_logging(&cli.log_dir);
    if let Err(e) = metrics::init() {
        warn!("Metrics disabled: {}", e);
    }

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let result = match cli.command {
        Commands::Normalize {
            input,
            output,
            start,
            end,
        } => run_normalize(&mut config, &input, &output, start, end),
        Commands::Enrich {
            input,
            output,
            tuning,
        } => match apply_tuning(&mut config, &tuning) {
            Ok(()) => run_enrich(&config, &input, &output).await,
            Err(e) => Err(e),
        },
        Commands::Run {
            raw,
            cleaned,
            output,
            start,
            end,
            tuning,
        } => {
            println!("🚀 Running full pipeline (normalize + enrich)...");
            println!("\n🧹 Step 1: Normalizing...");
            let step = apply_tuning(&mut config, &tuning)
                .and_then(|_| run_normalize(&mut config, &raw, &cleaned, start, end));
            match step {
                Ok(()) => {
                    println!("\n🌐 Step 2: Enriching...");
                    run_enrich(&config, &cleaned, &output).await
                }
                Err(e) => Err(e),
            }
        }
        Commands::Status {
            input,
            output,
            progress_file,
        } => {
            if let Some(path) = progress_file {
                config.enrich.progress_file = path.display().to_string();
            }
            run_status(&config, &input, &output)
        }
        Commands::Lookup {
            ids,
            names,
            output,
            tuning,
        } => {
            let source = if names.is_empty() {
                IdSource::Ids(ids)
            } else {
                IdSource::Names(names)
            };
            match apply_tuning(&mut config, &tuning) {
                Ok(()) => run_lookup(&config, source, output.as_deref()).await,
                Err(e) => Err(e),
            }
        }
        Commands::Snapshot {
            region,
            max_results,
            output,
            api_key,
        } => {
            if let Some(key) = api_key {
                config.youtube.api_key = Some(key);
            }
            run_snapshot(&config, &region, max_results, output).await
        }
    };

    if let Some(path) = &cli.metrics_out {
        write_metrics(path);
    }

    if let Err(e) = &result {
        error!("Command failed: {:#}", e);
        println!("❌ {:#}", e);
    }
    result
}
