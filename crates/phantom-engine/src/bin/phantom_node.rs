//! # phantom-node
//!
//! Runs a dark pool coordinator with an in-process executor committee on a
//! fixed round cadence. Settlement instructions are logged; order
//! submission and balance feeds are wired by the embedding service.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use phantom_crypto::VrfKeypair;
use phantom_engine::{DarkPoolCoordinator, IntervalScheduler, LocalCommittee};
use phantom_finality::ChannelSink;
use phantom_ingress::InMemoryBalanceSource;
use phantom_types::EngineConfig;
use rand::rngs::OsRng;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "phantom-node")]
#[command(about = "Privacy-preserving batch matching node", long_about = None)]
struct Args {
    /// JSON engine configuration. Built-in defaults when omitted.
    #[arg(long, env = "PHANTOM_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, env = "PHANTOM_LOG_JSON", default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,phantom::security=warn".into());
    if args.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.validate().context("invalid engine configuration")?;

    let now = Utc::now();
    let committee = LocalCommittee::generate(&config, now).context("committee setup")?;
    let (sink, mut instructions) = ChannelSink::new();
    let balances = Arc::new(InMemoryBalanceSource::new());
    let coordinator = Arc::new(
        DarkPoolCoordinator::new(
            config.clone(),
            &committee.key,
            Arc::clone(&committee.registry),
            committee.services(Arc::new(sink), balances),
            VrfKeypair::generate(&mut OsRng),
            now,
        )
        .context("coordinator setup")?,
    );

    info!(
        pairs = ?coordinator.pairs().map(ToString::to_string).collect::<Vec<_>>(),
        round_interval_ms = u64::try_from(config.round_interval.as_millis()).unwrap_or(u64::MAX),
        vrf_public_key = ?coordinator.vrf_public_key(),
        "phantom-node started"
    );

    tokio::spawn(async move {
        while let Some(ix) = instructions.recv().await {
            match serde_json::to_string(&ix) {
                Ok(json) => info!(target: "phantom::settlement", instruction = %json, "settlement instruction"),
                Err(err) => warn!(error = %err, "unserializable settlement instruction"),
            }
        }
    });

    // Executors are in-process, so their heartbeat feed is a timer.
    let heartbeat_every = (config.reputation.heartbeat_timeout / 2).max(Duration::from_millis(100));
    let committee = Arc::new(committee);
    let heartbeats = Arc::clone(&committee);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(heartbeat_every);
        loop {
            interval.tick().await;
            heartbeats.heartbeat_all(Utc::now());
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        let _ = shutdown_tx.send(true);
    });

    coordinator
        .drive(IntervalScheduler::new(config.round_interval, shutdown_rx))
        .await;
    Ok(())
}
