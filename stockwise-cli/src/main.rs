//! Stockwise CLI: sync, seed, status and analytics commands.
//!
//! Commands:
//! - `seed`: register instruments from a TOML list (or the bundled default)
//! - `sync`: incremental sync of every registered instrument
//! - `status`: stored date range per instrument
//! - `show`: price history with SMA/EMA overlay
//! - `abrupt`, `risk`, `signals`: single-instrument analytics
//! - `compare`: aligned closes and correlation matrix
//! - `export`: stored history as CSV

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use stockwise_core::analytics;
use stockwise_core::data::{InstrumentList, ProviderChain};
use stockwise_core::export;
use stockwise_core::sync::{BatchReport, SyncProgress};
use stockwise_core::{
    AppConfig, ParquetStore, PriceSeries, PriceStore, SeriesReader, SyncEngine, SyncError,
    SyncResult,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "stockwise.toml";

#[derive(Parser)]
#[command(
    name = "stockwise",
    about = "Stockwise: daily price history sync and analytics"
)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store directory (overrides the config file).
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Alpha Vantage API key (overrides the config file).
    #[arg(long, global = true)]
    alpha_vantage_key: Option<String>,

    /// Debug-level logging.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register instruments in the store.
    Seed {
        /// TOML instrument list. Defaults to the bundled NIFTY list.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Fetch and store new daily prices.
    Sync {
        /// Instruments to sync. Defaults to every registered instrument.
        instruments: Vec<String>,

        /// Sync instruments in parallel.
        #[arg(long, default_value_t = false)]
        parallel: bool,

        /// Treat this date (YYYY-MM-DD) as today.
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Report stored date ranges.
    Status,
    /// Price history with SMA/EMA overlay.
    Show {
        instrument: String,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        /// SMA/EMA window. Defaults to the config value.
        #[arg(long)]
        window: Option<usize>,

        /// Rows to print from the end.
        #[arg(long, default_value_t = 10)]
        tail: usize,

        /// Write the full overlay as CSV.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Day-over-day changes above a threshold.
    Abrupt {
        instrument: String,

        /// Fractional threshold (0.05 = 5%). Defaults to the config value.
        #[arg(long)]
        threshold: Option<f64>,

        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Rolling volatility and risk.
    Risk {
        instrument: String,

        #[arg(long)]
        window: Option<usize>,

        #[arg(long, default_value_t = 10)]
        tail: usize,

        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Dates where the close is above its 20-day average.
    Signals {
        instrument: String,

        #[arg(long, default_value_t = 10)]
        tail: usize,
    },
    /// Aligned closes and correlation matrix for several instruments.
    Compare {
        #[arg(required = true, num_args = 2..)]
        instruments: Vec<String>,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        /// Write aligned closes as CSV.
        #[arg(long)]
        aligned_csv: Option<PathBuf>,

        /// Write the correlation matrix as CSV.
        #[arg(long)]
        correlation_csv: Option<PathBuf>,
    },
    /// Export stored history as CSV.
    Export {
        instrument: String,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let store = ParquetStore::open(&config.store.path, config.store.create_if_missing)
        .with_context(|| format!("failed to open store at {}", config.store.path.display()))?;

    match cli.command {
        Commands::Seed { file } => run_seed(&store, file.as_deref()),
        Commands::Sync {
            instruments,
            parallel,
            as_of,
        } => run_sync(&config, &store, instruments, parallel, as_of.as_deref()),
        Commands::Status => run_status(&store),
        Commands::Show {
            instrument,
            start,
            end,
            window,
            tail,
            csv,
        } => {
            let series = load_series(&store, &instrument, start.as_deref(), end.as_deref())?;
            run_show(&config, &store, &series, window, tail, csv.as_deref())
        }
        Commands::Abrupt {
            instrument,
            threshold,
            csv,
        } => {
            let series = load_series(&store, &instrument, None, None)?;
            run_abrupt(&series, threshold.unwrap_or(config.analytics.abrupt_threshold), csv.as_deref())
        }
        Commands::Risk {
            instrument,
            window,
            tail,
            csv,
        } => {
            let series = load_series(&store, &instrument, None, None)?;
            run_risk(&series, window.unwrap_or(config.analytics.window), tail, csv.as_deref())
        }
        Commands::Signals { instrument, tail } => {
            let series = load_series(&store, &instrument, None, None)?;
            let dates = analytics::above_moving_average(&series, config.analytics.trend_window);
            println!("{}: {} days above the {}-day average", series.label(), dates.len(), config.analytics.trend_window);
            for date in tail_of(&dates, tail) {
                println!("  {date}");
            }
            Ok(())
        }
        Commands::Compare {
            instruments,
            start,
            end,
            aligned_csv,
            correlation_csv,
        } => run_compare(
            &store,
            &instruments,
            start.as_deref(),
            end.as_deref(),
            aligned_csv.as_deref(),
            correlation_csv.as_deref(),
        ),
        Commands::Export {
            instrument,
            start,
            end,
            out,
        } => {
            let series = load_series(&store, &instrument, start.as_deref(), end.as_deref())?;
            export::save(&out, &export::series_csv(&series)?)?;
            println!("Wrote {} rows to {}", series.len(), out.display());
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "stockwise=debug" } else { "stockwise=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            AppConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => AppConfig::default(),
    };

    if let Some(store) = &cli.store {
        config.store.path = store.clone();
    }
    if let Some(key) = &cli.alpha_vantage_key {
        config.providers.alpha_vantage.api_key = Some(key.clone());
    }
    config.validate()?;
    debug!(store = %config.store.path.display(), "configuration loaded");
    Ok(config)
}

fn parse_date(s: Option<&str>) -> Result<Option<NaiveDate>> {
    s.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
    })
    .transpose()
}

fn load_series(
    store: &dyn PriceStore,
    instrument: &str,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<PriceSeries> {
    let series = SeriesReader::new(store).get_range(instrument, parse_date(start)?, parse_date(end)?)?;
    if series.is_empty() {
        bail!("no stored prices for {instrument} in the requested range; run `stockwise sync` first");
    }
    Ok(series)
}

fn tail_of<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

fn fmt_num(v: f64, precision: usize) -> String {
    if v.is_nan() {
        "-".to_string()
    } else {
        format!("{v:.precision$}")
    }
}

fn run_seed(store: &dyn PriceStore, file: Option<&Path>) -> Result<()> {
    let list = match file {
        Some(path) => InstrumentList::from_file(path)?,
        None => InstrumentList::default_nifty(),
    };
    for instrument in list.to_instruments() {
        store.put_instrument(instrument)?;
    }
    info!(count = list.len(), "instruments registered");
    println!("Registered {} instruments", list.len());
    Ok(())
}

/// Prints per-instrument progress to stdout.
struct StdoutProgress;

impl SyncProgress for StdoutProgress {
    fn on_start(&self, instrument_id: &str, index: usize, total: usize) {
        println!("[{}/{}] Syncing {instrument_id}...", index + 1, total);
    }

    fn on_complete(
        &self,
        instrument_id: &str,
        _index: usize,
        _total: usize,
        result: &Result<SyncResult, SyncError>,
    ) {
        match result {
            Ok(r) => match &r.provider {
                Some(provider) => println!(
                    "  {instrument_id}: {} ({} rows via {provider})",
                    r.status, r.rows_written
                ),
                None => println!("  {instrument_id}: {}", r.status),
            },
            Err(e) => println!("  {instrument_id}: failed ({e})"),
        }
    }

    fn on_batch_complete(&self, report: &BatchReport) {
        use stockwise_core::SyncStatus::*;
        println!(
            "Done: {} updated, {} no new data, {} up to date, {} failed ({} rows written)",
            report.count(Updated),
            report.count(NoNewData),
            report.count(UpToDate),
            report.count(Failed),
            report.rows_written()
        );
    }
}

fn run_sync(
    config: &AppConfig,
    store: &ParquetStore,
    instruments: Vec<String>,
    parallel: bool,
    as_of: Option<&str>,
) -> Result<()> {
    let chain = ProviderChain::from_config(&config.providers)?;
    info!(providers = ?chain.provider_names(), "provider chain ready");

    let engine = SyncEngine::from_config(store, &chain, config).with_parallel(parallel || config.sync.parallel);
    let today = parse_date(as_of)?.unwrap_or_else(|| chrono::Local::now().date_naive());

    let report = if instruments.is_empty() {
        engine.sync_all_as_of(today, &StdoutProgress)?
    } else {
        engine.sync_instruments(&instruments, today, &StdoutProgress)?
    };

    if report.has_failures() {
        for (id, err) in &report.errors {
            eprintln!("Error for {id}: {err}");
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run_status(store: &ParquetStore) -> Result<()> {
    let instruments = store.list_instruments()?;
    if instruments.is_empty() {
        println!("No instruments registered. Run `stockwise seed` first.");
        return Ok(());
    }

    println!("Store: {}", store.root().display());
    println!("{:<16} {:<36} {:>12} {:>12} {:>8}", "ID", "NAME", "FIRST", "LAST", "ROWS");
    for inst in &instruments {
        match store.meta(&inst.instrument_id) {
            Some(meta) => println!(
                "{:<16} {:<36} {:>12} {:>12} {:>8}",
                inst.instrument_id, inst.label(), meta.first_date, meta.last_date, meta.row_count
            ),
            None => println!(
                "{:<16} {:<36} {:>12} {:>12} {:>8}",
                inst.instrument_id, inst.label(), "-", "-", 0
            ),
        }
    }
    Ok(())
}

fn run_show(
    config: &AppConfig,
    store: &dyn PriceStore,
    series: &PriceSeries,
    window: Option<usize>,
    tail: usize,
    csv: Option<&Path>,
) -> Result<()> {
    let rows = match window {
        Some(w) => analytics::overlay(series, w),
        None => analytics::overlay_with(series, config.analytics.window, config.analytics.ema_window),
    };

    if let Some(latest) = SeriesReader::new(store).get_latest(series.instrument_id())? {
        println!(
            "{} ({}): {} on {}",
            series.label(),
            series.instrument_id(),
            fmt_num(latest.close_price, 2),
            latest.trade_date
        );
    }
    println!("{:>12} {:>12} {:>12} {:>12}", "DATE", "CLOSE", "SMA", "EMA");
    for r in tail_of(&rows, tail) {
        println!(
            "{:>12} {:>12} {:>12} {:>12}",
            r.trade_date,
            fmt_num(r.close_price, 2),
            fmt_num(r.sma, 2),
            fmt_num(r.ema, 2)
        );
    }

    if let Some(path) = csv {
        export::save(path, &export::overlay_csv(&rows)?)?;
        println!("Wrote {} rows to {}", rows.len(), path.display());
    }
    Ok(())
}

fn run_abrupt(series: &PriceSeries, threshold: f64, csv: Option<&Path>) -> Result<()> {
    let changes = analytics::abrupt_changes(series, threshold);
    println!(
        "{}: {} changes beyond {:.2}%",
        series.label(),
        changes.len(),
        threshold * 100.0
    );
    for c in &changes {
        println!(
            "  {}  {:>12}  {:>+8.2}%",
            c.trade_date,
            fmt_num(c.close_price, 2),
            c.pct_change * 100.0
        );
    }
    if let Some(path) = csv {
        export::save(path, &export::abrupt_csv(&changes)?)?;
    }
    Ok(())
}

fn run_risk(series: &PriceSeries, window: usize, tail: usize, csv: Option<&Path>) -> Result<()> {
    let points = analytics::volatility_and_risk(series, window);
    println!("{:>12} {:>12} {:>12} {:>10}", "DATE", "CLOSE", "VOLATILITY", "RISK");
    for p in tail_of(&points, tail) {
        println!(
            "{:>12} {:>12} {:>12} {:>10}",
            p.trade_date,
            fmt_num(p.close_price, 2),
            fmt_num(p.volatility, 4),
            fmt_num(p.risk, 4)
        );
    }
    if let Some(path) = csv {
        export::save(path, &export::risk_csv(&points)?)?;
    }
    Ok(())
}

fn run_compare(
    store: &dyn PriceStore,
    instruments: &[String],
    start: Option<&str>,
    end: Option<&str>,
    aligned_csv: Option<&Path>,
    correlation_csv: Option<&Path>,
) -> Result<()> {
    let reader = SeriesReader::new(store);
    let (start, end) = (parse_date(start)?, parse_date(end)?);
    let series = instruments
        .iter()
        .map(|id| reader.get_range(id, start, end))
        .collect::<Result<Vec<_>, _>>()?;

    for s in series.iter().filter(|s| s.is_empty()) {
        eprintln!("No stored prices for {}; left out", s.instrument_id());
    }

    let aligned = analytics::align(&series);
    let matrix = analytics::correlate(&series);
    println!("{} common dates", aligned.len());

    if !matrix.is_empty() {
        let width = matrix.labels.iter().map(String::len).max().unwrap_or(0).max(8);
        print!("{:width$}", "");
        for label in &matrix.labels {
            print!(" {label:>width$}");
        }
        println!();
        for (label, row) in matrix.labels.iter().zip(&matrix.values) {
            print!("{label:width$}");
            for v in row {
                print!(" {:>width$}", fmt_num(*v, 4));
            }
            println!();
        }
    }

    if let Some(path) = aligned_csv {
        export::save(path, &export::aligned_csv(&aligned)?)?;
    }
    if let Some(path) = correlation_csv {
        export::save(path, &export::correlation_csv(&matrix)?)?;
    }
    Ok(())
}
