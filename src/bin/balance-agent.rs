use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use balance_agent::config::cache::{
    REFRESH_CHECK_INTERVAL_SECONDS_DEFAULT, REQUEST_TIMEOUT_SECONDS_DEFAULT,
};
use balance_agent::coordinator::builder;
use balance_agent::coordinator::scheduler::loop_refresh_stale_balance;
use balance_agent::helpers::time::SystemClock;
use balance_agent::observability::service_resources_metrics::collect_process_metrics;
use balance_agent::server;
use balance_agent::server::routes::BalanceState;
use balance_agent::utils::config_loader;
use balance_agent::utils::logging;
use balance_agent::utils::logging::LogLevel;
use clap::Parser;
use reqwest::Client;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "balance-agent.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Read args, load YAML config
    // -------------------------------

    let args = Args::parse();
    let service_config = config_loader::run(&args.config).await?;
    logging::run(&service_config, args.log_level).await?;

    // -------------------------------
    // 2. Create request client
    // -------------------------------

    let client = Client::builder().build()?;

    // -------------------------------
    // 3. Wire token manager, upstream client and balance cache
    // -------------------------------

    let coordinator = builder::build_file_backed(&service_config, client, Arc::new(SystemClock));
    if let Err(err) = coordinator.cache().warm().await {
        warn!("cannot load persisted balance, starting empty: {}", err);
    }

    // -------------------------------
    // 4. Background refresh of a stale balance
    // -------------------------------

    let check_interval = Duration::from_secs(
        service_config
            .cache
            .refresh_check_interval_seconds
            .unwrap_or(REFRESH_CHECK_INTERVAL_SECONDS_DEFAULT),
    );
    let scheduler = loop_refresh_stale_balance(coordinator.clone(), check_interval);

    // -------------------------------
    // 5. Start http server
    // -------------------------------

    let balance_state = BalanceState {
        coordinator,
        request_timeout: Duration::from_secs(
            service_config
                .cache
                .request_timeout_seconds
                .unwrap_or(REQUEST_TIMEOUT_SECONDS_DEFAULT),
        ),
    };
    let http_server = server::server::start(&service_config.settings, balance_state);

    // -------------------------------
    // 6. Start scraping system resources consumption metrics
    // -------------------------------

    let service_metrics = collect_process_metrics(service_config.settings.metrics.is_enabled);

    info!("Service starting...");
    // the server returns on SIGINT/SIGTERM, which ends the other workers too
    tokio::select! {
        res = http_server => res?,
        res = async { tokio::try_join!(scheduler, service_metrics) } => { res?; }
    }

    info!("Service stopped");
    Ok(())
}
