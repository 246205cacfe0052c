//! Cortexcore demo runner.
//!
//! Drives the decision core end to end against synthetic market data: builds
//! indicator-enriched random-walk tables per symbol, streams candle-close
//! ticks through the orchestrator and prints every emitted signal. Useful
//! for smoke-testing a configuration without any exchange connectivity.
//!
//! # Usage
//! ```sh
//! cargo run --bin core -- --symbols BTCUSDT,ETHUSDT --candles 300
//! ```

use anyhow::Result;
use clap::Parser;
use cortexcore::application::orchestrator::Orchestrator;
use cortexcore::config::CoreConfig;
use cortexcore::domain::market::PriceTick;
use cortexcore::domain::ports::MarketDataProvider;
use cortexcore::infrastructure::mock::{
    MockMacroMetrics, MockMarketDataProvider, MockTradingSession,
};
use cortexcore::infrastructure::synthetic::SyntheticSeries;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "core", about = "Decision core demo over synthetic data")]
struct Args {
    /// Comma-separated symbols to simulate.
    #[arg(long, default_value = "BTCUSDT,ETHUSDT,SOLUSDT")]
    symbols: String,

    /// Candles generated per symbol and timeframe.
    #[arg(long, default_value_t = 300)]
    candles: usize,

    /// RNG seed for the synthetic walks.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Per-candle drift fraction (positive for an uptrend).
    #[arg(long, default_value_t = 0.0005)]
    drift: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let args = Args::parse();
    info!("Cortexcore {} starting...", env!("CARGO_PKG_VERSION"));

    let config = CoreConfig::from_env()?;
    info!(
        "Configuration loaded: reference={}, mtf={}, model={}, max_concurrent={}",
        config.shield.reference_symbol,
        config.mtf.enabled,
        config.model.enabled,
        config.max_concurrent_analyses
    );

    let symbols: Vec<String> = args
        .symbols
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    let provider = Arc::new(MockMarketDataProvider::new());
    let now = chrono::Utc::now().timestamp();
    for (i, symbol) in symbols.iter().enumerate() {
        let seed = args.seed + i as u64;
        let mut main_tf = SyntheticSeries::new(seed, 100.0, args.drift, 0.008);
        let mut macro_tf = SyntheticSeries::new(seed + 1000, 100.0, args.drift * 4.0, 0.015);
        let mut micro_tf = SyntheticSeries::new(seed + 2000, 100.0, args.drift / 3.0, 0.004);
        provider
            .set_table(symbol, main_tf.generate(symbol, args.candles, now))
            .await;
        provider
            .set_macro_table(symbol, macro_tf.generate(symbol, args.candles, now))
            .await;
        provider
            .set_micro_table(symbol, micro_tf.generate(symbol, args.candles, now))
            .await;
    }
    info!("Synthetic tables ready for {} symbols", symbols.len());

    let (tick_tx, tick_rx) = mpsc::channel(128);
    let (signal_tx, mut signal_rx) = mpsc::channel(128);
    let session = Arc::new(MockTradingSession::new(10_000.0).with_config(config.session.clone()));

    let mut orchestrator = Orchestrator::new(
        tick_rx,
        signal_tx,
        provider.clone(),
        session,
        Arc::new(MockMacroMetrics::new()),
        config,
    );
    tokio::spawn(async move { orchestrator.run().await });

    for symbol in &symbols {
        let price = provider
            .get_candles(symbol)
            .await?
            .last()
            .map(|r| r.close)
            .unwrap_or(100.0);
        tick_tx
            .send(PriceTick {
                symbol: symbol.clone(),
                price,
                is_closed: true,
                timestamp: now,
            })
            .await?;
    }

    // Give the bounded analysis tasks a moment, then drain what they emitted.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    let mut emitted = 0;
    while let Ok(signal) = signal_rx.try_recv() {
        emitted += 1;
        info!(
            "signal: {} {} @ {:.4} (confidence {:.2}, strategy {})",
            signal.symbol,
            signal.action,
            signal.price,
            signal.confidence,
            signal.strategy.as_deref().unwrap_or("?")
        );
    }
    info!(
        "Demo complete: {} symbols analyzed, {} signals emitted",
        symbols.len(),
        emitted
    );
    Ok(())
}
