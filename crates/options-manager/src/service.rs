//! Trading session loop: fetch quotes → aggregate → decide → review →
//! execute → apply fills, one tick at a time.

use chrono::{Local, NaiveTime};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{timeout, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use delta_neutral_core::{
    AppConfig, Instrument, IntentReason, MarketDataAdapter, OptionChain, OrderExecutor,
    OrderIntent, PortfolioSnapshot, Quote, RiskLimits, TradingError, TradingHours,
};

use crate::positions::PositionManager;
use crate::report::{IntentRecord, TickReport};
use crate::risk::RiskController;
use crate::strategy::{MarketView, StrategyEngine};
use crate::types::{
    Disposition, EngineState, Execution, HaltReason, SessionSummary, Verdict,
};

/// One trading session. Owns the position manager, engine and risk
/// controller; adapters are borrowed through their traits only.
pub struct TradingSession<M, X> {
    market: M,
    executor: X,
    engine: StrategyEngine,
    book: PositionManager,
    risk: RiskController,
    limits: RiskLimits,
    underlying: Instrument,
    trading_hours: Option<TradingHours>,
    tick_interval: Duration,
    adapter_timeout: Duration,
    seq: u64,
    summary: SessionSummary,
}

impl<M, X> TradingSession<M, X>
where
    M: MarketDataAdapter,
    X: OrderExecutor,
{
    /// Builds a session from a validated configuration.
    pub fn new(config: &AppConfig, market: M, executor: X) -> Self {
        let limits = config.risk_limits();
        info!(
            mode = ?config.trading.mode,
            executor = executor.name(),
            underlying = %config.strategy.underlying,
            capital = %limits.capital,
            max_loss = %limits.max_loss_amount(),
            target_profit = %limits.target_profit_amount(),
            threshold = limits.adjustment_threshold,
            "Trading session created"
        );
        Self {
            market,
            executor,
            engine: StrategyEngine::new(config.strategy.clone(), limits.clone()),
            book: PositionManager::new(),
            risk: RiskController::new(config.session.max_consecutive_rejections),
            limits,
            underlying: Instrument::underlying(&config.strategy.underlying),
            trading_hours: config.trading.trading_hours.clone(),
            tick_interval: Duration::from_secs(config.session.tick_interval_secs),
            adapter_timeout: Duration::from_millis(config.session.adapter_timeout_ms),
            seq: 0,
            summary: SessionSummary::default(),
        }
    }

    pub const fn state(&self) -> EngineState {
        self.engine.state()
    }

    pub const fn book(&self) -> &PositionManager {
        &self.book
    }

    pub const fn engine(&self) -> &StrategyEngine {
        &self.engine
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            final_state: self.engine.state(),
            realized_pnl: self.book.realized_pnl(),
            ..self.summary.clone()
        }
    }

    /// Arms the open trigger for the next tick.
    pub fn request_open(&mut self) -> bool {
        self.engine.request_open()
    }

    /// Operator reset out of `Halted`.
    pub fn reset(&mut self) -> bool {
        let reset = self.engine.reset();
        if reset {
            self.risk.record_success();
        }
        reset
    }

    /// Runs one tick at the local wall-clock time.
    ///
    /// # Errors
    ///
    /// Only invariant violations (`UnknownInstrument`, `UnmatchedFill`) are
    /// returned; market-data failures skip the tick.
    pub async fn tick(&mut self) -> Result<TickReport, TradingError> {
        self.tick_at(Local::now().time()).await
    }

    /// Runs one tick as if the local time were `now`.
    pub async fn tick_at(&mut self, now: NaiveTime) -> Result<TickReport, TradingError> {
        self.seq += 1;
        self.summary.ticks += 1;

        if let Some(hours) = &self.trading_hours {
            if !hours.contains(now) {
                let reason = format!("outside trading hours {}-{}", hours.start, hours.end);
                return Ok(self.skip(reason));
            }
        }

        let chain = if self.engine.wants_chain() {
            match self.fetch_chain().await {
                Ok(chain) => Some(chain),
                Err(e) => return self.skip_or_fail(e),
            }
        } else {
            None
        };

        let mut quotes = match self.fetch_quotes().await {
            Ok(quotes) => quotes,
            Err(e) => return self.skip_or_fail(e),
        };
        if let Some(chain) = &chain {
            for quote in &chain.quotes {
                quotes
                    .entry(quote.instrument.clone())
                    .or_insert_with(|| quote.clone());
            }
        }

        let snapshot = match self.book.snapshot(&quotes) {
            Ok(snapshot) => snapshot,
            Err(e) => return self.skip_or_fail(e),
        };

        if self.engine.state() != EngineState::Halted {
            if let Err(violation) = self.risk.kill_switch(&snapshot, &self.limits) {
                self.engine.halt(HaltReason::RiskViolation(violation));
            }
        }

        let market = MarketView {
            quotes: &quotes,
            chain: chain.as_ref(),
        };
        let intents = self.engine.evaluate(&snapshot, &self.book, &market);

        let mut working = snapshot;
        let mut records = Vec::with_capacity(intents.len());
        for intent in intents {
            records.push(self.process(intent, &mut working, &quotes).await?);
        }
        self.engine.after_fills(&working);

        let report = TickReport::completed(self.seq, self.engine.state(), &working, records);
        report.log();
        Ok(report)
    }

    /// Reviews, submits and applies one intent. `working` is re-projected
    /// after every fill so later intents in the tick see earlier ones.
    async fn process(
        &mut self,
        intent: OrderIntent,
        working: &mut PortfolioSnapshot,
        quotes: &HashMap<Instrument, Quote>,
    ) -> Result<IntentRecord, TradingError> {
        self.summary.intents += 1;

        let verdict = if self.engine.state() == EngineState::Halted
            && intent.reason != IntentReason::Close
        {
            Verdict::Reject(TradingError::Rejected("session halted".to_string()))
        } else {
            self.risk.review(&intent, working, &self.limits)
        };
        self.engine.on_verdict(&intent, &verdict);
        let mut record = IntentRecord::new(&intent, Disposition::from(&verdict));

        let approved = match verdict {
            Verdict::Approve(approved) | Verdict::Scale { intent: approved, .. } => approved,
            Verdict::Reject(reason) => {
                if matches!(reason, TradingError::CapitalBreach { .. })
                    && matches!(intent.reason, IntentReason::Hedge | IntentReason::Adjust)
                {
                    self.engine.halt(HaltReason::RiskViolation(reason));
                }
                return Ok(record);
            }
        };

        self.book.register(&approved);
        let outcome = match timeout(self.adapter_timeout, self.executor.submit(&approved)).await {
            Ok(result) => result,
            Err(_) => Err(TradingError::timeout("submit", self.adapter_timeout)),
        };

        match outcome {
            Ok(fill) => {
                self.book.apply_fill(&fill).map_err(|e| {
                    error!(intent_id = %approved.id, error = %e, "Fill rejected by position manager");
                    e
                })?;
                self.risk.record_success();
                self.summary.fills += 1;
                record.execution = Some(Execution::Filled {
                    quantity: fill.quantity,
                    price: fill.price,
                    commission: fill.commission,
                });
                match self.book.snapshot(quotes) {
                    Ok(projected) => *working = projected,
                    Err(e) => warn!(error = %e, "Could not re-project snapshot after fill"),
                }
            }
            Err(e) => {
                self.book.forget(approved.id);
                self.summary.failures += 1;
                warn!(
                    intent_id = %approved.id,
                    instrument = %approved.instrument,
                    executor = self.executor.name(),
                    error = %e,
                    "Execution failed"
                );
                record.execution = Some(Execution::Failed {
                    error: e.to_string(),
                });
                self.engine.on_execution_failed();
                if self.risk.record_failure() {
                    self.engine.halt(HaltReason::SustainedRejection {
                        failures: self.risk.rejection_streak(),
                    });
                }
            }
        }
        Ok(record)
    }

    /// Instruments the book holds. Their quotes are required to mark it.
    fn held_instruments(&self) -> BTreeSet<Instrument> {
        self.book
            .open_positions()
            .into_iter()
            .map(|p| p.instrument)
            .collect()
    }

    /// Watchlist and underlying, minus anything already held.
    fn optional_instruments(&self, held: &BTreeSet<Instrument>) -> BTreeSet<Instrument> {
        let mut request: BTreeSet<Instrument> = self.engine.watchlist().iter().cloned().collect();
        request.insert(self.underlying.clone());
        request.retain(|instrument| !held.contains(instrument));
        request
    }

    /// Held positions must all be quoted or the tick is skipped. The rest is
    /// best effort: instruments the feed cannot quote are dropped and the
    /// request retried without them.
    async fn fetch_quotes(&self) -> Result<HashMap<Instrument, Quote>, TradingError> {
        let held = self.held_instruments();
        let mut quotes = if held.is_empty() {
            HashMap::new()
        } else {
            debug!(instruments = held.len(), "Fetching held quotes");
            match timeout(self.adapter_timeout, self.market.get_quotes(&held)).await {
                Ok(result) => result?,
                Err(_) => return Err(TradingError::timeout("get_quotes", self.adapter_timeout)),
            }
        };

        let mut optional = self.optional_instruments(&held);
        let deadline = Instant::now() + self.adapter_timeout;
        while !optional.is_empty() {
            debug!(instruments = optional.len(), "Fetching optional quotes");
            let result = timeout_at(deadline, self.market.get_quotes(&optional)).await;
            match result {
                Ok(Ok(extra)) => {
                    for (instrument, quote) in extra {
                        quotes.entry(instrument).or_insert(quote);
                    }
                    break;
                }
                Ok(Err(TradingError::MissingQuote { instrument }))
                    if optional.contains(&instrument) =>
                {
                    warn!(%instrument, "No quote; continuing without it");
                    optional.remove(&instrument);
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Optional quotes unavailable");
                    break;
                }
                Err(_) => {
                    warn!(budget = ?self.adapter_timeout, "Optional quotes timed out");
                    break;
                }
            }
        }
        Ok(quotes)
    }

    async fn fetch_chain(&self) -> Result<OptionChain, TradingError> {
        debug!(underlying = %self.underlying, "Fetching option chain");
        let underlying = self.underlying.underlying.as_str();
        match timeout(self.adapter_timeout, self.market.option_chain(underlying)).await {
            Ok(result) => result,
            Err(_) => Err(TradingError::timeout("option_chain", self.adapter_timeout)),
        }
    }

    fn skip(&mut self, reason: String) -> TickReport {
        self.summary.skipped_ticks += 1;
        let report = TickReport::skipped(
            self.seq,
            self.engine.state(),
            reason,
            self.book.realized_pnl(),
            self.book.open_positions().len(),
        );
        report.log();
        report
    }

    /// Transient market-data failures skip the tick; anything else is fatal.
    fn skip_or_fail(&mut self, e: TradingError) -> Result<TickReport, TradingError> {
        if e.is_transient() {
            Ok(self.skip(e.to_string()))
        } else {
            error!(error = %e, "Fatal error while preparing tick");
            Err(e)
        }
    }

    /// Ticks every `tick_interval` until `shutdown` flips to true or its
    /// sender is dropped. Shutdown is only observed between ticks.
    ///
    /// # Errors
    ///
    /// Returns the first fatal tick error.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<SessionSummary, TradingError> {
        info!(
            tick_secs = self.tick_interval.as_secs(),
            timeout_ms = self.adapter_timeout.as_millis() as u64,
            "Trading session started"
        );

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Trading session aborted");
                        return Err(e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let summary = self.summary();
        info!(
            ticks = summary.ticks,
            skipped = summary.skipped_ticks,
            fills = summary.fills,
            failures = summary.failures,
            state = %summary.final_state,
            realized_pnl = %summary.realized_pnl,
            "Trading session stopped"
        );
        Ok(summary)
    }
}
