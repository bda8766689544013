use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use fleet_monitoring::{
    api::{AppState, spawn_api_server},
    config::read_config_file,
    orchestrator::ChannelOrchestrator,
    poller::Poller,
};
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: PathBuf,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleet_monitoring", LevelFilter::TRACE),
        ("hub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();

    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    let endpoints = config.servers.clone().unwrap_or_default();

    let poller = Arc::new(Poller::new(endpoints, config.poll.clone()));
    let orchestrator = Arc::new(ChannelOrchestrator::new(config.channel.clone()));

    poller.start().await;
    info!(
        "poller started, monitoring {} endpoints",
        poller.endpoint_count().await
    );

    let state = AppState::new(
        Arc::clone(&poller),
        orchestrator,
        args.file.clone(),
        config.poll.interval_secs,
    );
    let addr = spawn_api_server(config.api.clone(), state).await?;
    info!("hub ready on {addr}");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    poller.stop().await;

    Ok(())
}
