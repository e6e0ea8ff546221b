//! Main entry point for the crawl-engine CLI

use clap::Parser;
use crawl_engine::cli::{CliError, Cli, Commands};
use crawl_engine::config::CrawlConfig;
use crawl_engine::shutdown::ShutdownCoordinator;
use crawl_engine::{logging, metrics};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match CrawlConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };
    cli.apply_to(&mut config);

    // Keep the file writer's guard alive until exit
    let _log_guard = match logging::init(&config.log_level, config.log_format, config.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            std::process::exit(2);
        }
    };

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = metrics::init_metrics(addr).await {
            warn!("Metrics exporter disabled: {e}");
        }
    }

    // Install shutdown coordinator and Ctrl+C handler
    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received - finishing in-flight pages and saving progress...");
                shutdown.request_shutdown();
            }
        }
    });

    let result: anyhow::Result<bool> = match &cli.command {
        Commands::Crawl(args) => args
            .execute(&config, cli.output_format, shutdown.clone())
            .await
            .map(|()| true)
            .map_err(anyhow::Error::from),
        Commands::Ledger(cmd) => cmd
            .execute(&config.progress_file, cli.output_format)
            .map_err(anyhow::Error::from),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            if shutdown.is_shutdown_requested() {
                info!("Stopped by shutdown request; rerun to resume");
            }
            if let Some(CliError::TargetsFailed { .. }) = e.downcast_ref::<CliError>() {
                error!("Crawl incomplete: {e}");
            } else {
                error!("Command failed: {e:#}");
            }
            std::process::exit(1);
        }
    }
}
