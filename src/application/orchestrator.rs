use crate::application::classifiers::rule::MIN_ROWS;
use crate::application::mtf_filter::MtfFilter;
use crate::application::shield::Shield;
use crate::application::strategies::{SentinelStrategy, StrategyFactory, TradingStrategy};
use crate::config::CoreConfig;
use crate::domain::errors::AnalysisError;
use crate::domain::market::{MarketData, OverrideAction, PriceTick};
use crate::domain::ports::{MacroMetricsProvider, MarketDataProvider, TradingSession};
use crate::domain::trading::Signal;
use crate::infrastructure::log_throttle::LogThrottle;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::{RwLock, Semaphore};
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};

/// A tracked open position, watched by the profit safeguard.
#[derive(Debug, Clone)]
pub struct PositionWatch {
    pub entry_price: f64,
    pub breakeven_requested: bool,
}

/// Event-driven decision core.
///
/// Consumes price ticks, runs bounded per-symbol analysis on closed candles,
/// and emits signals through the single registered sender. Per-symbol task
/// failures are contained and logged; nothing here aborts the loop.
pub struct Orchestrator {
    tick_rx: Receiver<PriceTick>,
    signal_tx: Sender<Signal>,
    provider: Arc<dyn MarketDataProvider>,
    session: Arc<dyn TradingSession>,
    macro_provider: Arc<dyn MacroMetricsProvider>,
    config: Arc<CoreConfig>,
    shield: Arc<RwLock<Shield>>,
    semaphore: Arc<Semaphore>,
    last_analysis: HashMap<String, Instant>,
    positions: Arc<RwLock<HashMap<String, PositionWatch>>>,
    throttle: Arc<LogThrottle>,
}

impl Orchestrator {
    pub fn new(
        tick_rx: Receiver<PriceTick>,
        signal_tx: Sender<Signal>,
        provider: Arc<dyn MarketDataProvider>,
        session: Arc<dyn TradingSession>,
        macro_provider: Arc<dyn MacroMetricsProvider>,
        config: CoreConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_analyses));
        let shield = Arc::new(RwLock::new(Shield::new(config.shield.clone())));
        Self {
            tick_rx,
            signal_tx,
            provider,
            session,
            macro_provider,
            config: Arc::new(config),
            shield,
            semaphore,
            last_analysis: HashMap::new(),
            positions: Arc::new(RwLock::new(HashMap::new())),
            throttle: Arc::new(LogThrottle::default()),
        }
    }

    /// Shared handle to the position cache, for the execution layer to
    /// register fills and clear exits.
    pub fn positions(&self) -> Arc<RwLock<HashMap<String, PositionWatch>>> {
        Arc::clone(&self.positions)
    }

    pub fn shield(&self) -> Arc<RwLock<Shield>> {
        Arc::clone(&self.shield)
    }

    pub async fn track_position(&self, symbol: &str, entry_price: f64) {
        self.positions.write().await.insert(
            symbol.to_string(),
            PositionWatch {
                entry_price,
                breakeven_requested: false,
            },
        );
    }

    pub async fn run(&mut self) {
        info!(
            "Orchestrator started (max {} concurrent analyses, {:?} debounce)",
            self.config.max_concurrent_analyses, self.config.debounce
        );
        let mut maintenance = time::interval(Duration::from_secs(60));
        maintenance.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_tick = self.tick_rx.recv() => {
                    match maybe_tick {
                        Some(tick) => self.on_price_update(tick).await,
                        None => {
                            info!("Tick stream closed, orchestrator stopping");
                            return;
                        }
                    }
                }
                _ = maintenance.tick() => {
                    self.run_maintenance().await;
                }
            }
        }
    }

    async fn on_price_update(&mut self, tick: PriceTick) {
        // 1. Position safeguard first; runs on every tick, closed or not.
        if self.positions.read().await.contains_key(&tick.symbol) {
            self.spawn_profit_safeguard(tick.clone());
        }

        // 2. Analysis only on closed candles.
        if !tick.is_closed {
            return;
        }

        // 3. Per-symbol debounce; the timestamp commits before the task is
        // scheduled so a burst of closes triggers a single analysis.
        let now = Instant::now();
        if let Some(last) = self.last_analysis.get(&tick.symbol) {
            if now.duration_since(*last) < self.config.debounce {
                debug!("{}: debounced", tick.symbol);
                return;
            }
        }
        self.last_analysis.insert(tick.symbol.clone(), now);

        // 4. Administrative exclusion.
        if self.config.disabled_assets.contains(&tick.symbol) {
            return;
        }

        self.spawn_analysis(tick);
    }

    fn spawn_analysis(&self, tick: PriceTick) {
        let semaphore = Arc::clone(&self.semaphore);
        let provider = Arc::clone(&self.provider);
        let shield = Arc::clone(&self.shield);
        let config = Arc::clone(&self.config);
        let signal_tx = self.signal_tx.clone();
        let throttle = Arc::clone(&self.throttle);

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return, // semaphore closed: shutting down
            };
            if let Err(e) =
                Self::analyze_symbol(&tick, provider, shield, &config, &signal_tx).await
            {
                if throttle.should_log(&tick.symbol) {
                    warn!("{}: analysis failed: {}", tick.symbol, e);
                }
            }
        });
    }

    async fn analyze_symbol(
        tick: &PriceTick,
        provider: Arc<dyn MarketDataProvider>,
        shield: Arc<RwLock<Shield>>,
        config: &CoreConfig,
        signal_tx: &Sender<Signal>,
    ) -> Result<(), AnalysisError> {
        let symbol = &tick.symbol;

        let mut data: MarketData = if config.mtf.enabled {
            provider
                .get_multiframe_candles(symbol)
                .await?
                .into_market_data()
        } else {
            provider.get_candles(symbol).await?
        };

        // Shield evaluation: the reference symbol's tick is the single writer.
        let override_action = shield.write().await.override_action(symbol, &data);
        data.override_action = override_action;

        let (strategy, is_override): (Arc<dyn TradingStrategy>, bool) = match override_action {
            Some(action) if Self::override_enabled(action, config) => {
                info!("{}: risk override active ({})", symbol, action);
                (Arc::new(SentinelStrategy), true)
            }
            _ => {
                data.override_action = None;
                // Overrides above work on whatever rows exist; the normal
                // selection path needs the classifier's full window.
                if data.len() < MIN_ROWS {
                    return Err(AnalysisError::DataUnavailable {
                        symbol: symbol.clone(),
                        rows: data.len(),
                        needed: MIN_ROWS,
                    });
                }
                let selection = StrategyFactory::get_strategy(symbol, &data, config);
                (selection.strategy, false)
            }
        };

        let mut signal = match strategy.analyze(&data) {
            Some(signal) => signal,
            None => return Ok(()),
        };

        // Confluence gate: override signals (exits, shark shorts) bypass it.
        if !is_override && config.mtf.enabled {
            let filter = MtfFilter::new(&config.mtf);
            let (passes, analysis) = filter.should_trade(&data, signal.action);
            if !passes {
                debug!("{}: signal dropped by MTF filter: {}", symbol, analysis.reason);
                return Ok(());
            }
            signal = signal.with_meta("mtf_score", format!("{:.2}", analysis.confluence_score));
        }

        signal.strategy = Some(strategy.name().to_string());
        info!(
            "{}: {} signal from {} (confidence {:.2})",
            symbol, signal.action, strategy.name(), signal.confidence
        );
        signal_tx
            .send(signal)
            .await
            .map_err(|e| anyhow::anyhow!("signal channel closed: {}", e))?;
        Ok(())
    }

    fn override_enabled(action: OverrideAction, config: &CoreConfig) -> bool {
        match action {
            OverrideAction::BlackSwan => config.enabled_strategies.black_swan,
            OverrideAction::SharkMode => config.enabled_strategies.shark,
        }
    }

    /// Fire-and-forget safeguard for an open position: move the stop to the
    /// true breakeven once price clears it, and flatten on black swan.
    fn spawn_profit_safeguard(&self, tick: PriceTick) {
        let positions = Arc::clone(&self.positions);
        let session = Arc::clone(&self.session);
        let shield = Arc::clone(&self.shield);
        let config = Arc::clone(&self.config);
        let throttle = Arc::clone(&self.throttle);

        tokio::spawn(async move {
            if let Err(e) =
                Self::check_position(&tick, positions, session, shield, &config).await
            {
                if throttle.should_log("safeguard") {
                    error!("{}: profit safeguard failed: {:#}", tick.symbol, e);
                }
            }
        });
    }

    async fn check_position(
        tick: &PriceTick,
        positions: Arc<RwLock<HashMap<String, PositionWatch>>>,
        session: Arc<dyn TradingSession>,
        shield: Arc<RwLock<Shield>>,
        config: &CoreConfig,
    ) -> anyhow::Result<()> {
        let symbol = &tick.symbol;

        // Black swan: flatten regardless of profit.
        let black_swan = {
            let shield = shield.read().await;
            shield.action_for(symbol) == Some(OverrideAction::BlackSwan)
        };
        if black_swan {
            warn!("{}: closing position under black swan protocol", symbol);
            session.close_position(symbol, "BLACK_SWAN_PROTOCOL").await?;
            positions.write().await.remove(symbol);
            return Ok(());
        }

        let session_cfg = session.session_config();

        // Claim the flag under the write lock before awaiting the session
        // call; overlapping safeguard tasks for the same symbol must stay
        // exactly-once.
        let breakeven = {
            let mut positions = positions.write().await;
            let watch = match positions.get_mut(symbol) {
                Some(watch) => watch,
                None => return Ok(()),
            };
            if watch.breakeven_requested {
                return Ok(());
            }
            let breakeven = Shield::real_breakeven(
                watch.entry_price,
                session_cfg.fee_rate,
                session_cfg.slippage,
            );
            if tick.price <= breakeven * (1.0 + config.breakeven_margin) {
                return Ok(());
            }
            watch.breakeven_requested = true;
            breakeven
        };

        info!(
            "{}: price {:.4} cleared breakeven {:.4}, locking in",
            symbol, tick.price, breakeven
        );
        if let Err(e) = session.move_to_breakeven(symbol).await {
            // Release the claim so a later tick can retry.
            if let Some(watch) = positions.write().await.get_mut(symbol) {
                watch.breakeven_requested = false;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Maintenance heartbeat: refresh the macro health cache. The poll has
    /// its own rate limit, so running this every minute is cheap.
    async fn run_maintenance(&self) {
        let mut shield = self.shield.write().await;
        shield.update_macro_health(&self.macro_provider).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::IndicatorRow;
    use crate::infrastructure::mock::{
        MockMacroMetrics, MockMarketDataProvider, MockTradingSession,
    };
    use tokio::sync::mpsc;

    fn oversold_table(symbol: &str) -> MarketData {
        // Ranging, oversold and bouncing: MeanReversion BUY territory.
        let mut rows: Vec<IndicatorRow> = (0..60)
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
            .collect();
        let n = rows.len();
        rows[n - 2].rsi = Some(22.0);
        rows[n - 1].rsi = Some(25.0);
        rows[n - 1].close = 97.0;
        MarketData::new(symbol, rows)
    }

    fn crash_table(symbol: &str) -> MarketData {
        let mut data = oversold_table(symbol);
        if let Some(last) = data.rows.last_mut() {
            last.open = 100.0;
            last.close = 95.0; // -5%
        }
        data
    }

    struct Harness {
        tick_tx: mpsc::Sender<PriceTick>,
        signal_rx: mpsc::Receiver<Signal>,
        provider: Arc<MockMarketDataProvider>,
        session: Arc<MockTradingSession>,
    }

    fn harness(config: CoreConfig) -> (Orchestrator, Harness) {
        let (tick_tx, tick_rx) = mpsc::channel(32);
        let (signal_tx, signal_rx) = mpsc::channel(32);
        let provider = Arc::new(MockMarketDataProvider::new());
        let session = Arc::new(MockTradingSession::new(10_000.0));
        let orchestrator = Orchestrator::new(
            tick_rx,
            signal_tx,
            provider.clone(),
            session.clone(),
            Arc::new(MockMacroMetrics::new()),
            config,
        );
        (
            orchestrator,
            Harness {
                tick_tx,
                signal_rx,
                provider,
                session,
            },
        )
    }

    fn closed_tick(symbol: &str, price: f64) -> PriceTick {
        PriceTick {
            symbol: symbol.to_string(),
            price,
            is_closed: true,
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_closed_candle_produces_signal() {
        let mut config = CoreConfig::default();
        config.mtf.enabled = false;
        let (mut orchestrator, mut h) = harness(config);
        h.provider.set_table("ETHUSDT", oversold_table("ETHUSDT")).await;

        tokio::spawn(async move { orchestrator.run().await });
        h.tick_tx.send(closed_tick("ETHUSDT", 97.0)).await.unwrap();

        let signal = tokio::time::timeout(Duration::from_millis(500), h.signal_rx.recv())
            .await
            .expect("timed out")
            .expect("channel open");
        assert_eq!(signal.symbol, "ETHUSDT");
        assert_eq!(signal.strategy.as_deref(), Some("MeanReversion"));
    }

    #[tokio::test]
    async fn test_unclosed_candle_is_ignored() {
        let mut config = CoreConfig::default();
        config.mtf.enabled = false;
        let (mut orchestrator, mut h) = harness(config);
        h.provider.set_table("ETHUSDT", oversold_table("ETHUSDT")).await;

        tokio::spawn(async move { orchestrator.run().await });
        let mut tick = closed_tick("ETHUSDT", 97.0);
        tick.is_closed = false;
        h.tick_tx.send(tick).await.unwrap();

        let result = tokio::time::timeout(Duration::from_millis(200), h.signal_rx.recv()).await;
        assert!(result.is_err(), "open candle must not trigger analysis");
    }

    #[tokio::test]
    async fn test_debounce_collapses_burst() {
        let mut config = CoreConfig::default();
        config.mtf.enabled = false;
        let (mut orchestrator, mut h) = harness(config);
        h.provider.set_table("ETHUSDT", oversold_table("ETHUSDT")).await;

        tokio::spawn(async move { orchestrator.run().await });
        h.tick_tx.send(closed_tick("ETHUSDT", 97.0)).await.unwrap();
        h.tick_tx.send(closed_tick("ETHUSDT", 97.1)).await.unwrap();
        h.tick_tx.send(closed_tick("ETHUSDT", 97.2)).await.unwrap();

        let first = tokio::time::timeout(Duration::from_millis(500), h.signal_rx.recv()).await;
        assert!(first.is_ok(), "first closed candle analyzes");
        let second = tokio::time::timeout(Duration::from_millis(300), h.signal_rx.recv()).await;
        assert!(second.is_err(), "burst within debounce yields one analysis");
    }

    #[tokio::test]
    async fn test_disabled_asset_skipped() {
        let mut config = CoreConfig::default();
        config.mtf.enabled = false;
        config.disabled_assets.insert("ETHUSDT".to_string());
        let (mut orchestrator, mut h) = harness(config);
        h.provider.set_table("ETHUSDT", oversold_table("ETHUSDT")).await;

        tokio::spawn(async move { orchestrator.run().await });
        h.tick_tx.send(closed_tick("ETHUSDT", 97.0)).await.unwrap();

        let result = tokio::time::timeout(Duration::from_millis(200), h.signal_rx.recv()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_black_swan_reference_crash_emits_exit() {
        let mut config = CoreConfig::default();
        config.mtf.enabled = false;
        let (mut orchestrator, mut h) = harness(config);
        h.provider.set_table("BTCUSDT", crash_table("BTCUSDT")).await;

        tokio::spawn(async move { orchestrator.run().await });
        h.tick_tx.send(closed_tick("BTCUSDT", 95.0)).await.unwrap();

        let signal = tokio::time::timeout(Duration::from_millis(500), h.signal_rx.recv())
            .await
            .expect("timed out")
            .expect("channel open");
        assert_eq!(signal.strategy.as_deref(), Some("Sentinel"));
        assert_eq!(
            signal.action,
            crate::domain::trading::SignalAction::ExitLong
        );
    }

    #[tokio::test]
    async fn test_provider_failure_contained() {
        let mut config = CoreConfig::default();
        config.mtf.enabled = false;
        let (mut orchestrator, mut h) = harness(config);
        // No table registered: provider errors for every symbol.

        tokio::spawn(async move { orchestrator.run().await });
        h.tick_tx.send(closed_tick("ETHUSDT", 97.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Loop still alive: a late registration analyzes fine.
        h.provider.set_table("SOLUSDT", oversold_table("SOLUSDT")).await;
        h.tick_tx.send(closed_tick("SOLUSDT", 97.0)).await.unwrap();
        let signal = tokio::time::timeout(Duration::from_millis(500), h.signal_rx.recv())
            .await
            .expect("timed out")
            .expect("channel open");
        assert_eq!(signal.symbol, "SOLUSDT");
    }

    #[tokio::test]
    async fn test_profit_safeguard_moves_to_breakeven_once() {
        let mut config = CoreConfig::default();
        config.mtf.enabled = false;
        let (orchestrator, h) = harness(config);
        orchestrator.track_position("ETHUSDT", 100.0).await;

        let mut orchestrator = orchestrator;
        tokio::spawn(async move { orchestrator.run().await });

        // Breakeven for entry 100 is 100.25; margin 0.2% puts the arm
        // threshold just above 100.45.
        let mut tick = closed_tick("ETHUSDT", 101.0);
        tick.is_closed = false;
        h.tick_tx.send(tick.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.tick_tx.send(tick).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let calls = h.session.breakeven_calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["ETHUSDT".to_string()]);
    }

    #[tokio::test]
    async fn test_black_swan_closes_tracked_position() {
        let mut config = CoreConfig::default();
        config.mtf.enabled = false;
        let (orchestrator, h) = harness(config);
        orchestrator.track_position("ETHUSDT", 100.0).await;

        let mut orchestrator = orchestrator;
        tokio::spawn(async move { orchestrator.run().await });

        // Crash the reference symbol first to flip global state.
        h.provider.set_table("BTCUSDT", crash_table("BTCUSDT")).await;
        h.tick_tx.send(closed_tick("BTCUSDT", 95.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut tick = closed_tick("ETHUSDT", 99.0);
        tick.is_closed = false;
        h.tick_tx.send(tick).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let calls = h.session.close_calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "BLACK_SWAN_PROTOCOL");
    }

    /// Session whose breakeven command is slow enough for safeguard tasks
    /// to overlap.
    #[derive(Default)]
    struct SlowBreakevenSession {
        calls: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl crate::domain::ports::TradingSession for SlowBreakevenSession {
        async fn wallet_balance(&self) -> anyhow::Result<f64> {
            Ok(10_000.0)
        }

        fn session_config(&self) -> crate::domain::trading::SessionConfig {
            crate::domain::trading::SessionConfig::default()
        }

        async fn move_to_breakeven(&self, symbol: &str) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.calls.lock().unwrap().push(symbol.to_string());
            Ok(())
        }

        async fn close_position(&self, _symbol: &str, _reason: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_overlapping_safeguard_ticks_move_breakeven_once() {
        let mut config = CoreConfig::default();
        config.mtf.enabled = false;
        let (tick_tx, tick_rx) = mpsc::channel(32);
        let (signal_tx, _signal_rx) = mpsc::channel(32);
        let session = Arc::new(SlowBreakevenSession::default());
        let orchestrator = Orchestrator::new(
            tick_rx,
            signal_tx,
            Arc::new(MockMarketDataProvider::new()),
            session.clone(),
            Arc::new(MockMacroMetrics::new()),
            config,
        );
        orchestrator.track_position("ETHUSDT", 100.0).await;
        let mut orchestrator = orchestrator;
        tokio::spawn(async move { orchestrator.run().await });

        // Second tick lands while the first breakeven request is still in
        // flight; the claim must already be visible to it.
        let mut tick = closed_tick("ETHUSDT", 101.0);
        tick.is_closed = false;
        tick_tx.send(tick.clone()).await.unwrap();
        tick_tx.send(tick).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let calls = session.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["ETHUSDT".to_string()]);
    }

    #[tokio::test]
    async fn test_thin_table_skips_normal_analysis() {
        let mut config = CoreConfig::default();
        config.mtf.enabled = false;
        let (mut orchestrator, mut h) = harness(config);
        let thin = MarketData::new("ETHUSDT", oversold_table("ETHUSDT").rows[..20].to_vec());
        h.provider.set_table("ETHUSDT", thin).await;

        tokio::spawn(async move { orchestrator.run().await });
        h.tick_tx.send(closed_tick("ETHUSDT", 97.0)).await.unwrap();

        let result = tokio::time::timeout(Duration::from_millis(300), h.signal_rx.recv()).await;
        assert!(result.is_err(), "thin table must not reach strategy selection");
    }

    #[tokio::test]
    async fn test_thin_reference_table_still_triggers_black_swan() {
        let mut config = CoreConfig::default();
        config.mtf.enabled = false;
        let (mut orchestrator, mut h) = harness(config);
        let full = crash_table("BTCUSDT");
        let thin = MarketData::new("BTCUSDT", full.rows[full.rows.len() - 5..].to_vec());
        h.provider.set_table("BTCUSDT", thin).await;

        tokio::spawn(async move { orchestrator.run().await });
        h.tick_tx.send(closed_tick("BTCUSDT", 95.0)).await.unwrap();

        let signal = tokio::time::timeout(Duration::from_millis(500), h.signal_rx.recv())
            .await
            .expect("timed out")
            .expect("channel open");
        assert_eq!(
            signal.action,
            crate::domain::trading::SignalAction::ExitLong
        );
    }
}
