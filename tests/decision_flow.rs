//! End-to-end decision flow: ticks in, signals out, with the real
//! orchestrator wired to in-memory collaborators.

use cortexcore::application::orchestrator::Orchestrator;
use cortexcore::config::CoreConfig;
use cortexcore::domain::market::{IndicatorRow, MarketData, PriceTick};
use cortexcore::domain::trading::{Signal, SignalAction};
use cortexcore::infrastructure::mock::{
    MockMacroMetrics, MockMarketDataProvider, MockTradingSession,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn ranging_rows(n: usize) -> Vec<IndicatorRow> {
    (0..n as i64)
        .map(|i| {
            let mut r = IndicatorRow::bare(i * 900, 100.0, 101.0, 99.0, 100.0, 500.0);
            r.rsi = Some(50.0);
            r.adx = Some(15.0);
            r.atr = Some(1.0);
            r.ema_20 = Some(100.0);
            r.ema_50 = Some(100.0);
            r.ema_200 = Some(100.0);
            r.bb_upper = Some(102.0);
            r.bb_lower = Some(98.0);
            r
        })
        .collect()
}

/// Oversold bounce below the lower band: MeanReversion BUY territory.
fn oversold_table(symbol: &str) -> MarketData {
    let mut rows = ranging_rows(60);
    let n = rows.len();
    rows[n - 2].rsi = Some(22.0);
    rows[n - 1].rsi = Some(25.0);
    rows[n - 1].close = 97.0;
    MarketData::new(symbol, rows)
}

fn bearish_rows(n: usize) -> Vec<IndicatorRow> {
    (0..n as i64)
        .map(|i| {
            let mut r = IndicatorRow::bare(i * 900, 100.0, 101.0, 97.0, 98.0, 500.0);
            r.ema_20 = Some(99.0);
            r.ema_50 = Some(100.5);
            r.ema_200 = Some(102.0);
            r.rsi = Some(45.0);
            r
        })
        .collect()
}

/// Reference-symbol candle dropping more than the black swan threshold.
fn crash_table(symbol: &str) -> MarketData {
    let mut data = oversold_table(symbol);
    if let Some(last) = data.rows.last_mut() {
        last.open = 100.0;
        last.close = 95.0;
    }
    data
}

struct Rig {
    tick_tx: mpsc::Sender<PriceTick>,
    signal_rx: mpsc::Receiver<Signal>,
    provider: Arc<MockMarketDataProvider>,
}

fn spawn_core(config: CoreConfig) -> Rig {
    let (tick_tx, tick_rx) = mpsc::channel(32);
    let (signal_tx, signal_rx) = mpsc::channel(32);
    let provider = Arc::new(MockMarketDataProvider::new());
    let mut orchestrator = Orchestrator::new(
        tick_rx,
        signal_tx,
        provider.clone(),
        Arc::new(MockTradingSession::new(10_000.0)),
        Arc::new(MockMacroMetrics::new()),
        config,
    );
    tokio::spawn(async move { orchestrator.run().await });
    Rig {
        tick_tx,
        signal_rx,
        provider,
    }
}

fn closed_tick(symbol: &str, price: f64) -> PriceTick {
    PriceTick {
        symbol: symbol.to_string(),
        price,
        is_closed: true,
        timestamp: 0,
    }
}

async fn recv_signal(rx: &mut mpsc::Receiver<Signal>) -> Signal {
    tokio::time::timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("timed out waiting for signal")
        .expect("signal channel closed")
}

#[tokio::test]
async fn tick_to_signal_round_trip() {
    let mut config = CoreConfig::default();
    config.mtf.enabled = false;
    let mut rig = spawn_core(config);
    rig.provider
        .set_table("ETHUSDT", oversold_table("ETHUSDT"))
        .await;

    rig.tick_tx
        .send(closed_tick("ETHUSDT", 97.0))
        .await
        .unwrap();

    let signal = recv_signal(&mut rig.signal_rx).await;
    assert_eq!(signal.symbol, "ETHUSDT");
    assert_eq!(signal.action, SignalAction::Buy);
    assert_eq!(signal.strategy.as_deref(), Some("MeanReversion"));
    assert!(signal.confidence > 0.5);
}

#[tokio::test]
async fn mtf_filter_blocks_low_confluence_entry() {
    // Same oversold setup, but the confluence gate is on and the macro
    // timeframe is in a decided downtrend.
    let config = CoreConfig::default();
    assert!(config.mtf.enabled);
    let mut rig = spawn_core(config);
    rig.provider
        .set_table("ETHUSDT", oversold_table("ETHUSDT"))
        .await;
    rig.provider
        .set_macro_table("ETHUSDT", MarketData::new("ETHUSDT", bearish_rows(60)))
        .await;

    rig.tick_tx
        .send(closed_tick("ETHUSDT", 97.0))
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_millis(300), rig.signal_rx.recv()).await;
    assert!(result.is_err(), "low-confluence entry must be dropped");
}

#[tokio::test]
async fn black_swan_exit_bypasses_mtf_filter() {
    let config = CoreConfig::default();
    assert!(config.mtf.enabled);
    let mut rig = spawn_core(config);
    rig.provider
        .set_table("BTCUSDT", crash_table("BTCUSDT"))
        .await;

    rig.tick_tx
        .send(closed_tick("BTCUSDT", 95.0))
        .await
        .unwrap();

    let signal = recv_signal(&mut rig.signal_rx).await;
    assert_eq!(signal.action, SignalAction::ExitLong);
    assert_eq!(signal.strategy.as_deref(), Some("Sentinel"));
    assert_eq!(signal.confidence, 1.0);
    assert_eq!(
        signal.metadata.get("reason").map(String::as_str),
        Some("BLACK_SWAN_PROTOCOL")
    );
}

#[tokio::test]
async fn debounce_is_per_symbol() {
    let mut config = CoreConfig::default();
    config.mtf.enabled = false;
    let mut rig = spawn_core(config);
    rig.provider
        .set_table("ETHUSDT", oversold_table("ETHUSDT"))
        .await;
    rig.provider
        .set_table("SOLUSDT", oversold_table("SOLUSDT"))
        .await;

    // Burst on one symbol plus a single event on another: two signals total.
    rig.tick_tx
        .send(closed_tick("ETHUSDT", 97.0))
        .await
        .unwrap();
    rig.tick_tx
        .send(closed_tick("ETHUSDT", 97.0))
        .await
        .unwrap();
    rig.tick_tx
        .send(closed_tick("SOLUSDT", 97.0))
        .await
        .unwrap();

    let first = recv_signal(&mut rig.signal_rx).await;
    let second = recv_signal(&mut rig.signal_rx).await;
    let mut symbols = vec![first.symbol, second.symbol];
    symbols.sort();
    assert_eq!(symbols, vec!["ETHUSDT".to_string(), "SOLUSDT".to_string()]);

    let third = tokio::time::timeout(Duration::from_millis(300), rig.signal_rx.recv()).await;
    assert!(third.is_err(), "debounced burst must not re-analyze");
}

#[tokio::test]
async fn shark_context_arms_short_on_target_symbols() {
    let mut config = CoreConfig::default();
    config.mtf.enabled = false;
    config.enabled_strategies.shark = true;
    let mut rig = spawn_core(config);

    // Reference drops -2%: shark context, not black swan.
    let mut reference = oversold_table("BTCUSDT");
    if let Some(last) = reference.rows.last_mut() {
        last.open = 100.0;
        last.close = 98.0;
    }
    rig.provider.set_table("BTCUSDT", reference).await;

    // Target symbol in confirmed bear structure.
    let mut target = MarketData::new("ETHUSDT", ranging_rows(60));
    if let Some(last) = target.rows.last_mut() {
        last.close = 90.0;
        last.ema_50 = Some(95.0);
        last.ema_200 = Some(100.0);
        last.adx = Some(30.0);
        last.rsi = Some(40.0);
    }
    rig.provider.set_table("ETHUSDT", target).await;

    rig.tick_tx
        .send(closed_tick("BTCUSDT", 98.0))
        .await
        .unwrap();
    // Wait until the reference analysis has flipped the shield.
    let _reference_signal =
        tokio::time::timeout(Duration::from_millis(500), rig.signal_rx.recv()).await;

    rig.tick_tx
        .send(closed_tick("ETHUSDT", 90.0))
        .await
        .unwrap();
    let signal = recv_signal(&mut rig.signal_rx).await;
    assert_eq!(signal.symbol, "ETHUSDT");
    assert_eq!(signal.action, SignalAction::Sell);
    assert_eq!(signal.strategy.as_deref(), Some("Sentinel"));
    assert_eq!(
        signal.metadata.get("sub_mode").map(String::as_str),
        Some("SHARK_HUNT")
    );
}

#[tokio::test]
async fn breakeven_safeguard_fires_once_per_position() {
    let mut config = CoreConfig::default();
    config.mtf.enabled = false;
    let (tick_tx, tick_rx) = mpsc::channel(32);
    let (signal_tx, _signal_rx) = mpsc::channel(32);
    let provider = Arc::new(MockMarketDataProvider::new());
    let session = Arc::new(MockTradingSession::new(10_000.0));
    let orchestrator = Orchestrator::new(
        tick_rx,
        signal_tx,
        provider,
        session.clone(),
        Arc::new(MockMacroMetrics::new()),
        config,
    );
    orchestrator.track_position("ETHUSDT", 100.0).await;
    let mut orchestrator = orchestrator;
    tokio::spawn(async move { orchestrator.run().await });

    // Entry 100 with default fees puts breakeven at 100.25; 101 clears it
    // with margin to spare. Intrabar ticks, not candle closes.
    let tick = PriceTick {
        symbol: "ETHUSDT".to_string(),
        price: 101.0,
        is_closed: false,
        timestamp: 0,
    };
    tick_tx.send(tick.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    tick_tx.send(tick).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let calls = session.breakeven_calls.lock().unwrap().clone();
    assert_eq!(calls, vec!["ETHUSDT".to_string()]);
}
