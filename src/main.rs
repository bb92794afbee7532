//! Spin Draw Lottery Server
//!
//! Runs the WebSocket lottery server with in-memory ledger and key
//! custody. Configuration comes from `SPIN_*` and `AUTH_*` environment
//! variables; log filtering from `RUST_LOG`.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn, Level};
use tracing_subscriber::{filter::LevelFilter, EnvFilter, FmtSubscriber};

use spin_draw::{
    network::{AuthConfig, LotteryServer, ServerConfig},
    service::{InMemoryKeyCustody, InMemoryLedger, ServiceConfig, TicketService},
    Price, VERSION,
};

#[cfg(feature = "debug-tracing")]
const DEFAULT_LEVEL: Level = Level::DEBUG;
#[cfg(not(feature = "debug-tracing"))]
const DEFAULT_LEVEL: Level = Level::INFO;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(DEFAULT_LEVEL).into())
                .from_env_lossy(),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Spin Draw Server v{}", VERSION);

    let server_config = ServerConfig::from_env()?;
    let service_config = ServiceConfig::from_env()?;
    let auth_config = AuthConfig::from_env();

    info!(
        "Draw: {} numbers from 1..={}, reveal after draw: {}",
        service_config.draw.count, service_config.draw.max, service_config.reveal_after_draw
    );

    let service = Arc::new(TicketService::new(
        service_config,
        Arc::new(InMemoryLedger::new()),
        Arc::new(InMemoryKeyCustody::new()),
    ));

    open_initial_round(&service)?;

    let server = Arc::new(LotteryServer::new(server_config, auth_config, service));

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal_server.shutdown();
            }
            Err(e) => warn!("Could not listen for Ctrl-C: {}", e),
        }
    });

    server.run().await?;
    info!("Server stopped");
    Ok(())
}

/// Open a round at startup when `SPIN_OPEN_ROUND_PRICE` is set.
fn open_initial_round(service: &TicketService) -> anyhow::Result<()> {
    let Ok(price) = std::env::var("SPIN_OPEN_ROUND_PRICE") else {
        return Ok(());
    };
    let ticket_price = Price::parse_ether(&price).context("SPIN_OPEN_ROUND_PRICE")?;
    let jackpot = match std::env::var("SPIN_OPEN_ROUND_JACKPOT") {
        Ok(v) => Price::parse_ether(&v).context("SPIN_OPEN_ROUND_JACKPOT")?,
        Err(_) => Price::ZERO,
    };

    let round = service.open_round(ticket_price, jackpot, None)?;
    info!(
        "Opened round {} at {} ETH per ticket, closes {}",
        round.round_id, round.ticket_price, round.closes_at
    );
    Ok(())
}
