//! Pool Keeper - Main entry point.
//!
//! Runs one statement through a lazily created MySQL pool and prints the
//! resulting rows as JSON.

use pool_keeper::config::Config;
use pool_keeper::source::JsonConfigSource;
use pool_keeper::types::rows_to_json;
use pool_keeper::PoolKeeper;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout carries only the result rows
    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Initialize logging
    init_tracing(&config);

    let pool_options = config.pool_options();
    pool_options.validate()?;

    info!(
        config_dir = %config.config_dir.display(),
        environment = %config.environment,
        "Starting Pool Keeper v{}",
        env!("CARGO_PKG_VERSION")
    );

    let source = JsonConfigSource::from_dir(&config.config_dir, &config.environment)?;
    let keeper = PoolKeeper::mysql(pool_options, Arc::new(source));

    if let Some(options) = config.connect_options()? {
        keeper.set_config(Some(options))?;
    }

    let result = run(&keeper, &config).await;

    // Always tear down, even when the statement failed
    if let Err(e) = keeper.close().await {
        error!(error = %e, "Failed to drain connection pool");
    }

    match result {
        Ok(output) => {
            println!("{output}");
            Ok(())
        }
        Err(e) if e.is_configuration_error() => {
            error!(
                error = %e,
                config_dir = %config.config_dir.display(),
                environment = %config.environment,
                "No usable database configuration"
            );
            Err(e.into())
        }
        Err(e) => {
            error!(error = %e, "Statement failed");
            Err(e.into())
        }
    }
}

async fn run(
    keeper: &PoolKeeper<pool_keeper::MySqlDriver>,
    config: &Config,
) -> Result<String, pool_keeper::PoolError> {
    let mut handle = keeper.touch().await?;
    let params = config.query_params();

    let rows = handle.query(&config.sql, &params).await;
    keeper.release(Some(handle))?;
    let rows = rows?;

    info!(rows = rows.len(), "Statement complete");
    let json = rows_to_json(&rows, true);
    let output = if config.pretty {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    };
    output.map_err(|e| pool_keeper::PoolError::query(e.to_string(), None))
}
