mod cli;
mod kpi_value;
mod render;

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use cli::{Cli, Commands};
use stockpanel_features::run_etl;
use stockpanel_rs::{CsvDirectorySource, DashboardTable, ParquetSink};
use tracing_appender::non_blocking;
use tracing_subscriber::{EnvFilter, prelude::*};

fn init_tracing(log_file: Option<PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|err| anyhow!("failed to create log directory {parent:?}: {err}"))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| anyhow!("failed to open log file {path:?}: {err}"))?;
        let (non_blocking_writer, guard) = non_blocking(file);
        // Keep the writer alive for the whole process.
        let _guard = Box::leak(Box::new(guard));
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking_writer);
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    }
}

fn log_invocation(log_file: Option<&PathBuf>) {
    let cwd = std::env::current_dir().ok();
    let argv: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    tracing::info!("==================== new stockpanel run ====================");
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        cwd = ?cwd,
        log_file = ?log_file,
        argv = ?argv,
        "stockpanel invoked"
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Run(args) if !args.no_file_log => {
            let dir = args
                .output
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            Some(dir.join("stockpanel.log"))
        }
        _ => None,
    };

    init_tracing(log_file.clone())?;

    match cli.command {
        Commands::Run(args) => {
            log_invocation(log_file.as_ref());
            let config = args.into_config()?;
            let source = CsvDirectorySource::new(&config.input_dir);
            let sink = ParquetSink::new(&config.output_path);
            let outcome = run_etl(&config, &source, &sink)?;
            println!("{}", render::run_outcome(&outcome));
        }
        Commands::Show(args) => {
            let table = DashboardTable::open(&args.table)?;
            let summary = table.summary(&args.ticker)?;
            let rows = table.ticker_rows(&args.ticker)?;
            let recent = &rows[rows.len().saturating_sub(args.rows)..];
            println!("{}", render::summary(&summary, recent));
        }
        Commands::Compare(args) => {
            let table = DashboardTable::open(&args.table)?;
            let kpi = args.kpi.to_kpi();
            let mut points = Vec::new();
            for ticker in &args.tickers {
                let history = table.compare(kpi, &[ticker])?;
                let skip = args
                    .last
                    .map_or(0, |n| history.len().saturating_sub(n));
                points.extend(history.into_iter().skip(skip));
            }
            println!("{}", render::comparison(kpi, &points));
        }
        Commands::Top(args) => {
            let table = DashboardTable::open(&args.table)?;
            let kpi = args.kpi.to_kpi();
            let board = table.leaderboard(kpi, args.top_k);
            println!("{}", render::leaderboard(kpi, &board));
        }
    }

    Ok(())
}
