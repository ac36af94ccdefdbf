use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result, bail};
use asset_sync::{
    config::{Config, load_config_path},
    duration::format_duration,
    freshness::assess,
    identity::SeriesPlan,
    logging::{init_tracing, log_dir_from_env},
    orchestrator::{Orchestrator, default_provider},
    quality::{check_store, write_report},
    sink::{BarSink, CsvExportSink, SqliteSink, export},
    store::MasterStore,
};
use chrono::Utc;
use clap::{Parser, Subcommand};

const DEFAULT_REPORT_DIR: &str = "logs/quality_reports";

#[derive(Parser)]
#[command(version, about = "Incremental OHLCV sync")]
struct Cli {
    /// Sync config file (TOML).
    #[arg(long, short, value_name = "FILE", default_value = "asset_sync.toml")]
    config: PathBuf,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Fetch and merge every stale series.
    Refresh {
        /// Only this symbol group.
        #[arg(long)]
        group: Option<String>,
        /// Print each series' freshness without fetching.
        #[arg(long)]
        dry_run: bool,
    },
    /// Deliver rows newer than each sink's watermark. Without flags, every
    /// configured sink.
    Export {
        #[arg(long)]
        sqlite: bool,
        #[arg(long)]
        csv: bool,
    },
    /// Check master tables and write a JSON report.
    Quality {
        /// Report directory; overrides `[quality].report_path`.
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// Load the config and print what it resolves to.
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match init_tracing(log_dir_from_env().as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("asset-sync failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config_path(&cli.config)
        .with_context(|| format!("load config {}", cli.config.display()))?;

    match cli.cmd {
        Cmd::Refresh { group, dry_run } => refresh(&config, group.as_deref(), dry_run).await,
        Cmd::Export { sqlite, csv } => {
            run_export(&config, sqlite, csv).await?;
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Quality { out } => {
            let dir = out
                .or_else(|| config.quality.report_path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_DIR));
            let store = MasterStore::new(&config.base_folder);
            let report = tokio::task::spawn_blocking(move || check_store(&store, Utc::now()))
                .await??;
            let path = write_report(&dir, &report)?;
            println!(
                "{} series, {} with issues, {} anomalies; report at {}",
                report.total_series,
                report.series_with_issues,
                report.anomalies_detected,
                path.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Validate => {
            validate(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn refresh(config: &Config, group: Option<&str>, dry_run: bool) -> Result<ExitCode> {
    let plans: Vec<SeriesPlan> = match group {
        Some(name) => match config.series_in_group(name) {
            Some(plans) => plans,
            None => bail!("unknown symbol group '{name}'"),
        },
        None => config.series(),
    };
    let now = Utc::now();

    if dry_run {
        let store = MasterStore::new(&config.base_folder);
        for plan in &plans {
            let master = store.read(&plan.id)?;
            let freshness = assess(master.as_ref(), now, plan.staleness);
            let action = if freshness.needs_refresh() { "fetch" } else { "skip" };
            println!("{action:5} {:<16} {freshness}", plan.id.to_string());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let orchestrator = Orchestrator::from_config(config, default_provider()?)?;
    let summary = orchestrator.run(plans, now).await;
    for report in summary.failures() {
        eprintln!("{}: {}", report.id, report.outcome);
    }
    println!("{summary}");
    Ok(if summary.failed() > 0 {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}

async fn run_export(config: &Config, sqlite: bool, csv: bool) -> Result<()> {
    let all = !sqlite && !csv;
    let mut sinks: Vec<Box<dyn BarSink>> = Vec::new();

    if sqlite || all {
        match &config.sinks.sqlite_path {
            Some(path) => sinks.push(Box::new(SqliteSink::open(path.to_string_lossy())?)),
            None if sqlite => bail!("--sqlite given but [sinks].sqlite_path is not set"),
            None => {}
        }
    }
    if csv || all {
        match &config.sinks.export_folder {
            Some(folder) => sinks.push(Box::new(CsvExportSink::new(folder))),
            None if csv => bail!("--csv given but [sinks].export_folder is not set"),
            None => {}
        }
    }
    if sinks.is_empty() {
        bail!("no sinks configured under [sinks]");
    }

    let store = MasterStore::new(&config.base_folder);
    let ids: Vec<_> = config.series().into_iter().map(|p| p.id).collect();
    let mut skipped = 0;
    for sink in &sinks {
        let delivery = export(sink.as_ref(), &store, &ids).await?;
        println!(
            "{}: {} series, {} rows offered, {} written",
            sink.name(),
            delivery.series,
            delivery.rows_offered,
            delivery.rows_written
        );
        skipped += delivery.skipped;
    }
    if skipped > 0 {
        bail!("{skipped} unreadable master table(s) were not exported; see the log");
    }
    Ok(())
}

fn validate(config: &Config) {
    println!("base folder: {}", config.base_folder.display());
    for class in &config.classes {
        let intervals: Vec<String> = class.intervals.iter().map(|i| i.to_string()).collect();
        println!(
            "class {}: [{}], stale after {}",
            class.name,
            intervals.join(", "),
            format_duration(class.staleness)
        );
    }
    for (group, symbols) in &config.symbols {
        println!("group {group}: {}", symbols.join(", "));
    }
    println!("{} series", config.series().len());
}
