use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use testledger::analysis::AnalyticsEngine;
use testledger::config::{LoggingConfig, TestLedgerConfig};
use testledger::context::{self, RunContext};
use testledger::report;
use testledger::storage::HistoryStore;

#[derive(Parser)]
#[command(
    name = "testledger",
    about = "Test-run history with flakiness, trend and pass-rate reports",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// View the latest test run report
    Latest,

    /// View summary statistics for the last 7 days
    Summary,

    /// View the most flaky tests of the last 14 days
    Flaky,

    /// View one test's per-run history over the last 30 days
    Trend {
        /// Test id as shown by `latest` or `flaky`
        test_id: String,
    },

    /// Record a JSON-lines event stream as one run
    Ingest {
        /// Event file, or `-` for stdin
        input: PathBuf,
    },
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let loaded = TestLedgerConfig::load_or_default();
    init_logging(&loaded.config.logging);
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }
    tracing::debug!(source = %loaded.source, "configuration resolved");
    let config = loaded.config;

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.print()?;
            return Ok(());
        }
        Err(e) => {
            tracing::debug!(error = %e, "unrecognised command line");
            print!("{}", report::usage());
            return Ok(());
        }
    };

    let Some(command) = cli.command else {
        print!("{}", report::usage());
        return Ok(());
    };

    let store = HistoryStore::from_config(&config.storage);
    let analytics = &config.analytics;

    match command {
        Commands::Latest => match store.latest_run() {
            Some(run) => print!("{}", report::render_latest(&run)),
            None => println!("No reports found"),
        },
        Commands::Summary => {
            let history = store.load();
            let stats = AnalyticsEngine::new(&history).summary(analytics.summary_window_days);
            print!(
                "{}",
                report::render_summary(stats.as_ref(), analytics.summary_window_days)
            );
        }
        Commands::Flaky => {
            let history = store.load();
            let flaky = AnalyticsEngine::new(&history).flaky_tests(analytics.flaky_window_days);
            print!(
                "{}",
                report::render_flaky(&flaky, analytics.flaky_window_days, analytics.flaky_limit)
            );
        }
        Commands::Trend { test_id } => {
            let history = store.load();
            let points =
                AnalyticsEngine::new(&history).trend(&test_id, analytics.trend_window_days);
            print!(
                "{}",
                report::render_trend(&test_id, &points, analytics.trend_window_days)
            );
        }
        Commands::Ingest { input } => {
            let providers = context::default_providers();
            let run_context = RunContext::collect(&providers, &config.recorder.environment);

            // Reporting failures are logged, never turned into a failing exit.
            if let Err(e) = ingest(&input, &config, run_context).await {
                tracing::error!(error = %format!("{:#}", e), "ingest failed");
                println!("Nothing recorded: {:#}", e);
            }
        }
    }

    Ok(())
}

async fn ingest(input: &Path, config: &TestLedgerConfig, run_context: RunContext) -> Result<()> {
    let outcome = if input.as_os_str() == "-" {
        tracing::info!("reading events from stdin");
        testledger::ingest_stream(io::stdin().lock(), config, run_context).await?
    } else {
        let file = File::open(input)
            .with_context(|| format!("failed to open event file: {}", input.display()))?;
        tracing::info!(path = %input.display(), "reading events");
        testledger::ingest_stream(BufReader::new(file), config, run_context).await?
    };
    print!("{}", report::render_ingest(&outcome));
    Ok(())
}
