use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use sitewatch::config::Settings;
use sitewatch::db::{self, schema, targets};
use sitewatch::monitor::target::load_targets_file;
use sitewatch::monitor::{
    CheckerOptions, PgMetricsSink, Supervisor, Target, TargetSpec, wait_for_os_signal,
};
use sitewatch::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the JSON list of targets, overriding `targets_file`
    #[arg(short, long)]
    targets: Option<PathBuf>,
}

fn init_logging(log_dir: &str, log_level: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "sitewatch.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // RUST_LOG wins over the configured level.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},sqlx::query=warn")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

/// Validates stored rows, skipping (and logging) any that no longer pass.
fn validate_targets(specs: Vec<TargetSpec>) -> Vec<Target> {
    specs
        .into_iter()
        .filter_map(|spec| match spec.validate() {
            Ok(target) => Some(target),
            Err(e) => {
                error!(url = %spec.url, error = %e, "Skipping invalid monitored URL.");
                None
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Manually check for --version before full parsing to keep the output terse.
    if std::env::args().any(|arg| arg == "--version") {
        println!("sitewatch version: {VERSION}");
        return Ok(());
    }

    let args = Args::parse();

    let mut settings = match Settings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            init_logging("logs", "info");
            error!(error = %e, "Failed to load configuration.");
            return Err(e.into());
        }
    };
    if let Some(path) = args.targets {
        settings.targets_file = path;
    }

    init_logging(&settings.log_dir, &settings.log_level);
    info!(version = VERSION, "Starting sitewatch.");

    let pool = db::connect_pool(&settings).await.map_err(|e| {
        error!(error = %e, "Failed to open database pool.");
        e
    })?;
    schema::ensure_schema(&pool).await?;

    // A bad targets file is not fatal; whatever is already stored still runs.
    match load_targets_file(&settings.targets_file) {
        Ok(specs) => {
            if let Err(e) = targets::upsert_targets(&pool, &specs).await {
                error!(error = %e, "Failed to store monitored URLs from file.");
            }
        }
        Err(e) => warn!(
            path = %settings.targets_file.display(),
            error = %e,
            "Failed to load monitored URLs from file."
        ),
    }

    let monitored = validate_targets(targets::fetch_targets(&pool).await?);
    if monitored.is_empty() {
        warn!("No monitored URLs found. Exiting.");
        pool.close().await;
        return Ok(());
    }

    let options = CheckerOptions {
        fetch_timeout: settings.fetch_timeout,
        start_jitter: settings.start_jitter,
    };
    let sink = Arc::new(PgMetricsSink::new(pool.clone()));
    let supervisor = Supervisor::new(sink, options);

    let outcome = supervisor.run_until(monitored, wait_for_os_signal()).await;

    pool.close().await;
    match outcome {
        Ok(ticks) => {
            info!(ticks, "Database pool closed; exiting.");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Monitor failed to start.");
            Err(e.into())
        }
    }
}
