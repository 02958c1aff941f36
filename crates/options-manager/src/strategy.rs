//! Strategy engine: the Flat / Neutral / Skewed / Closing / Halted state
//! machine that turns a portfolio snapshot into order intents.
//!
//! The engine never touches positions. It reads the snapshot and the
//! position manager, and the session feeds back risk verdicts and fills.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, error, info, warn};

use delta_neutral_core::{
    Instrument, IntentReason, OptionChain, OrderIntent, PortfolioSnapshot, Quote, RiskLimits,
    StrategyConfig,
};

use crate::entry;
use crate::greeks::DELTA_EPSILON;
use crate::hedge;
use crate::positions::PositionManager;
use crate::stops;
use crate::targets;
use crate::types::{CloseReason, EngineState, HaltReason, Verdict};

/// Market inputs for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct MarketView<'a> {
    pub quotes: &'a HashMap<Instrument, Quote>,
    /// Present on ticks where an open trigger is pending.
    pub chain: Option<&'a OptionChain>,
}

/// Everything an evaluation depends on. Two evaluations with equal keys
/// must not both emit intents.
#[derive(Debug, PartialEq, Eq)]
struct InputKey {
    positions: Vec<(Instrument, i64)>,
    quotes: Vec<(Instrument, Decimal, u64, DateTime<Utc>)>,
}

impl InputKey {
    fn new(book: &PositionManager, quotes: &HashMap<Instrument, Quote>) -> Self {
        let positions = book
            .open_positions()
            .into_iter()
            .map(|p| (p.instrument, p.quantity))
            .collect();
        let mut quotes: Vec<_> = quotes
            .values()
            .map(|q| (q.instrument.clone(), q.last, q.delta.to_bits(), q.timestamp))
            .collect();
        quotes.sort_by(|a, b| a.0.cmp(&b.0));
        Self { positions, quotes }
    }
}

#[derive(Debug)]
pub struct StrategyEngine {
    config: StrategyConfig,
    limits: RiskLimits,
    state: EngineState,
    open_requested: bool,
    /// Target quantity per entry leg until it is fully filled.
    targets: BTreeMap<Instrument, i64>,
    /// Instruments quoted every tick besides open positions.
    watchlist: BTreeSet<Instrument>,
    last_inputs: Option<InputKey>,
    close_reason: Option<CloseReason>,
    halt_reason: Option<HaltReason>,
}

impl StrategyEngine {
    #[must_use]
    pub fn new(config: StrategyConfig, limits: RiskLimits) -> Self {
        Self {
            config,
            limits,
            state: EngineState::Flat,
            open_requested: false,
            targets: BTreeMap::new(),
            watchlist: BTreeSet::new(),
            last_inputs: None,
            close_reason: None,
            halt_reason: None,
        }
    }

    pub const fn state(&self) -> EngineState {
        self.state
    }

    pub const fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    pub const fn halt_reason(&self) -> Option<&HaltReason> {
        self.halt_reason.as_ref()
    }

    pub const fn targets(&self) -> &BTreeMap<Instrument, i64> {
        &self.targets
    }

    pub const fn watchlist(&self) -> &BTreeSet<Instrument> {
        &self.watchlist
    }

    /// True when the next evaluation needs an option chain.
    pub fn wants_chain(&self) -> bool {
        self.open_requested && self.state == EngineState::Flat
    }

    /// Arms the open trigger. Only honored while flat.
    pub fn request_open(&mut self) -> bool {
        if self.state != EngineState::Flat {
            warn!(state = %self.state, "Open trigger ignored outside Flat");
            return false;
        }
        info!("Open trigger armed");
        self.open_requested = true;
        self.last_inputs = None;
        true
    }

    /// Decides this tick's intents. Emits nothing when positions and quotes
    /// are identical to the previous evaluation.
    pub fn evaluate(
        &mut self,
        snapshot: &PortfolioSnapshot,
        book: &PositionManager,
        market: &MarketView<'_>,
    ) -> Vec<OrderIntent> {
        let inputs = InputKey::new(book, market.quotes);
        if self.last_inputs.as_ref() == Some(&inputs) {
            debug!(state = %self.state, "Inputs unchanged since last evaluation");
            return Vec::new();
        }
        self.last_inputs = Some(inputs);

        match self.state {
            EngineState::Halted => book.close_all(),
            EngineState::Closing if book.is_flat() => {
                self.finish_closing();
                Vec::new()
            }
            EngineState::Closing => book.close_all(),
            EngineState::Flat | EngineState::Neutral | EngineState::Skewed => {
                self.manage(snapshot, book, market)
            }
        }
    }

    fn manage(
        &mut self,
        snapshot: &PortfolioSnapshot,
        book: &PositionManager,
        market: &MarketView<'_>,
    ) -> Vec<OrderIntent> {
        if book.is_flat() && self.targets.is_empty() {
            self.transition(EngineState::Flat);
            return self.open(market);
        }

        if !book.is_flat() {
            let exit = stops::check_stop_loss(snapshot, &self.limits)
                .or_else(|| targets::check_take_profit(snapshot, &self.limits));
            if let Some(reason) = exit {
                self.close_reason = Some(reason);
                self.targets.clear();
                self.open_requested = false;
                self.transition(EngineState::Closing);
                return book.close_all();
            }
        }

        if self.open_requested {
            warn!("Open trigger dropped: positions already open");
            self.open_requested = false;
        }

        let deviation = snapshot.net_delta - self.config.target_delta;
        let skewed = deviation.abs() > self.config.adjustment_threshold + DELTA_EPSILON;
        if !book.is_flat() {
            self.classify(snapshot);
        }

        let follow_ups = self.follow_ups(book);
        if !follow_ups.is_empty() {
            return follow_ups;
        }

        if !skewed {
            return Vec::new();
        }
        match hedge::plan_hedge(deviation, market.quotes.values(), snapshot, &self.config) {
            Some(plan) => {
                info!(
                    instrument = %plan.instrument,
                    quantity = plan.quantity,
                    deviation,
                    residual = plan.residual,
                    "Hedge planned"
                );
                vec![OrderIntent::market(
                    plan.instrument,
                    plan.quantity,
                    IntentReason::Hedge,
                )]
            }
            None => {
                warn!(deviation, "No hedge candidate reduces the deviation");
                Vec::new()
            }
        }
    }

    fn open(&mut self, market: &MarketView<'_>) -> Vec<OrderIntent> {
        if !self.open_requested {
            return Vec::new();
        }
        let Some(chain) = market.chain else {
            debug!("Open trigger pending an option chain");
            return Vec::new();
        };
        self.open_requested = false;

        let Some(plan) = entry::plan_entry(chain, &self.config, &self.limits) else {
            warn!(underlying = %chain.underlying, "Open trigger consumed without an entry");
            return Vec::new();
        };

        self.targets = plan.legs.iter().cloned().collect();
        self.watchlist = plan.watchlist;
        self.close_reason = None;
        plan.legs
            .into_iter()
            .map(|(instrument, quantity)| {
                OrderIntent::market(instrument, quantity, IntentReason::Open)
            })
            .collect()
    }

    /// `adjust` intents for entry legs that are not yet fully filled.
    fn follow_ups(&mut self, book: &PositionManager) -> Vec<OrderIntent> {
        let mut intents = Vec::new();
        self.targets.retain(|instrument, target| {
            let shortfall = *target - book.quantity_of(instrument);
            if shortfall == 0 || shortfall.signum() != target.signum() {
                return false;
            }
            intents.push(OrderIntent::market(
                instrument.clone(),
                shortfall,
                IntentReason::Adjust,
            ));
            true
        });
        intents
    }

    /// Lowers or drops entry-leg targets the risk controller cut.
    pub fn on_verdict(&mut self, intent: &OrderIntent, verdict: &Verdict) {
        if !matches!(intent.reason, IntentReason::Open | IntentReason::Adjust) {
            return;
        }
        match verdict {
            Verdict::Approve(_) => {}
            Verdict::Scale { intent: scaled, requested } => {
                let cut = requested - scaled.quantity;
                let keep = self.targets.get_mut(&intent.instrument).map(|target| {
                    *target -= cut;
                    *target != 0 && target.signum() == requested.signum()
                });
                if keep == Some(false) {
                    self.targets.remove(&intent.instrument);
                }
            }
            Verdict::Reject(reason) => {
                if self.targets.remove(&intent.instrument).is_some() {
                    warn!(instrument = %intent.instrument, reason = %reason, "Entry leg dropped");
                }
            }
        }
    }

    /// An approved intent failed at the executor; retry on the next tick.
    pub fn on_execution_failed(&mut self) {
        self.last_inputs = None;
    }

    /// Reclassifies after the tick's fills were applied.
    pub fn after_fills(&mut self, snapshot: &PortfolioSnapshot) {
        match self.state {
            EngineState::Closing if snapshot.is_flat() => self.finish_closing(),
            EngineState::Flat | EngineState::Neutral | EngineState::Skewed => {
                if snapshot.is_flat() {
                    self.transition(EngineState::Flat);
                } else {
                    self.classify(snapshot);
                }
            }
            EngineState::Closing | EngineState::Halted => {}
        }
    }

    /// Enters `Halted`. Liquidation continues every tick until an operator
    /// reset.
    pub fn halt(&mut self, reason: HaltReason) {
        if self.state == EngineState::Halted {
            return;
        }
        error!(from = %self.state, reason = %reason, "Engine halted");
        self.state = EngineState::Halted;
        self.halt_reason = Some(reason);
        self.targets.clear();
        self.open_requested = false;
        self.last_inputs = None;
    }

    /// Operator reset out of `Halted`. The next evaluation reclassifies from
    /// whatever positions remain.
    pub fn reset(&mut self) -> bool {
        if self.state != EngineState::Halted {
            warn!(state = %self.state, "Reset ignored: engine is not halted");
            return false;
        }
        info!(reason = ?self.halt_reason, "Engine reset by operator");
        self.state = EngineState::Flat;
        self.halt_reason = None;
        self.close_reason = None;
        self.last_inputs = None;
        true
    }

    fn classify(&mut self, snapshot: &PortfolioSnapshot) {
        let deviation = snapshot.net_delta - self.config.target_delta;
        if deviation.abs() > self.config.adjustment_threshold + DELTA_EPSILON {
            self.transition(EngineState::Skewed);
        } else {
            self.transition(EngineState::Neutral);
        }
    }

    fn finish_closing(&mut self) {
        self.transition(EngineState::Flat);
        self.targets.clear();
        self.watchlist.clear();
    }

    fn transition(&mut self, to: EngineState) {
        if self.state != to {
            info!(from = %self.state, to = %to, "Engine state change");
            self.state = to;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use delta_neutral_core::{AppConfig, Fill, OptionRight, TradingError};
    use rust_decimal_macros::dec;

    struct Fixture {
        engine: StrategyEngine,
        book: PositionManager,
        quotes: HashMap<Instrument, Quote>,
    }

    fn call() -> Instrument {
        Instrument::option(
            "NIFTY",
            NaiveDate::from_ymd_opt(2026, 3, 26).unwrap(),
            dec!(22500),
            OptionRight::Call,
            Decimal::ONE,
        )
    }

    fn put() -> Instrument {
        Instrument::option(
            "NIFTY",
            NaiveDate::from_ymd_opt(2026, 3, 26).unwrap(),
            dec!(21500),
            OptionRight::Put,
            Decimal::ONE,
        )
    }

    impl Fixture {
        fn new() -> Self {
            let config = AppConfig::default();
            Self {
                engine: StrategyEngine::new(config.strategy.clone(), config.risk_limits()),
                book: PositionManager::new(),
                quotes: HashMap::new(),
            }
        }

        fn quote(&mut self, instrument: Instrument, last: Decimal, delta: f64) {
            let quote = Quote::new(instrument.clone(), last, delta, Utc::now());
            self.quotes.insert(instrument, quote);
        }

        fn chain(&self) -> OptionChain {
            OptionChain {
                underlying: Instrument::underlying("NIFTY"),
                spot: dec!(22000),
                quotes: self.quotes.values().cloned().collect(),
                as_of: Utc::now(),
            }
        }

        fn evaluate(&mut self, chain: Option<&OptionChain>) -> Vec<OrderIntent> {
            let snapshot = self.book.snapshot(&self.quotes).unwrap();
            let market = MarketView {
                quotes: &self.quotes,
                chain,
            };
            self.engine.evaluate(&snapshot, &self.book, &market)
        }

        fn fill(&mut self, intent: &OrderIntent, quantity: i64) {
            self.book.register(intent);
            let price = self.quotes[&intent.instrument].last;
            self.book
                .apply_fill(&Fill::for_intent(intent, quantity, price))
                .unwrap();
        }

        fn settle(&mut self) {
            let snapshot = self.book.snapshot(&self.quotes).unwrap();
            self.engine.after_fills(&snapshot);
        }

        /// Opens a 20-lot strangle at call 0.248 / put −0.25 (net +0.04).
        fn opened() -> Self {
            let mut fx = Self::new();
            fx.quote(call(), dec!(100), 0.248);
            fx.quote(put(), dec!(100), -0.25);
            fx.engine.request_open();
            let chain = fx.chain();
            for intent in fx.evaluate(Some(&chain)) {
                fx.fill(&intent, intent.quantity);
            }
            fx.settle();
            fx
        }
    }

    #[test]
    fn open_trigger_sells_both_legs_and_goes_neutral() {
        let fx = Fixture::opened();
        assert_eq!(fx.engine.state(), EngineState::Neutral);
        assert!(fx.book.quantity_of(&call()) < 0);
        assert_eq!(fx.book.quantity_of(&call()), fx.book.quantity_of(&put()));
        assert!(fx.engine.watchlist().contains(&Instrument::underlying("NIFTY")));
    }

    #[test]
    fn flat_without_trigger_does_nothing() {
        let mut fx = Fixture::new();
        fx.quote(call(), dec!(100), 0.25);
        assert!(fx.evaluate(None).is_empty());
        assert_eq!(fx.engine.state(), EngineState::Flat);
    }

    #[test]
    fn unchanged_inputs_emit_nothing_twice() {
        let mut fx = Fixture::opened();
        fx.quote(call(), dec!(100), 0.05);
        let first = fx.evaluate(None);
        assert!(!first.is_empty());
        assert_eq!(fx.engine.state(), EngineState::Skewed);

        let second = fx.evaluate(None);
        assert!(second.is_empty());
    }

    #[test]
    fn stop_loss_moves_to_closing_with_full_close_intents() {
        let mut fx = Fixture::opened();
        let lots = fx.book.quantity_of(&call()).abs();
        // Loss of 2000 on the call leg alone.
        let jump = Decimal::from(2000) / Decimal::from(lots);
        fx.quote(call(), dec!(100) + jump, 0.248);

        let intents = fx.evaluate(None);
        assert_eq!(fx.engine.state(), EngineState::Closing);
        assert_eq!(fx.engine.close_reason(), Some(CloseReason::StopLoss));
        assert_eq!(intents.len(), 2);
        for intent in &intents {
            assert_eq!(intent.reason, IntentReason::Close);
            assert_eq!(intent.quantity, -fx.book.quantity_of(&intent.instrument));
        }

        for intent in intents {
            fx.fill(&intent, intent.quantity);
        }
        fx.settle();
        assert_eq!(fx.engine.state(), EngineState::Flat);
        assert!(fx.book.is_flat());
    }

    #[test]
    fn partial_fill_gets_adjust_follow_up() {
        let mut fx = Fixture::new();
        fx.quote(call(), dec!(100), 0.248);
        fx.quote(put(), dec!(100), -0.25);
        fx.engine.request_open();
        let chain = fx.chain();
        let intents = fx.evaluate(Some(&chain));
        let full = intents[0].quantity;
        fx.fill(&intents[0], full + 2);
        fx.fill(&intents[1], intents[1].quantity);
        fx.settle();

        fx.quote(put(), dec!(100), -0.25);
        let follow_up = fx.evaluate(None);
        assert_eq!(follow_up.len(), 1);
        assert_eq!(follow_up[0].reason, IntentReason::Adjust);
        assert_eq!(follow_up[0].instrument, call());
        assert_eq!(follow_up[0].quantity, -2);
    }

    #[test]
    fn rejected_leg_target_is_dropped() {
        let mut fx = Fixture::new();
        fx.quote(call(), dec!(100), 0.248);
        fx.quote(put(), dec!(100), -0.25);
        fx.engine.request_open();
        let chain = fx.chain();
        let intents = fx.evaluate(Some(&chain));

        fx.engine.on_verdict(
            &intents[0],
            &Verdict::Reject(TradingError::Rejected("test".into())),
        );
        let scaled = intents[1].with_quantity(intents[1].quantity + 1);
        fx.engine.on_verdict(
            &intents[1],
            &Verdict::Scale {
                intent: scaled.clone(),
                requested: intents[1].quantity,
            },
        );

        assert!(!fx.engine.targets().contains_key(&call()));
        assert_eq!(fx.engine.targets()[&put()], scaled.quantity);
    }

    #[test]
    fn halt_liquidates_until_reset() {
        let mut fx = Fixture::opened();
        fx.engine.halt(HaltReason::SustainedRejection { failures: 3 });
        assert!(!fx.engine.request_open());

        let intents = fx.evaluate(None);
        assert_eq!(intents.len(), 2);
        assert!(intents.iter().all(|i| i.reason == IntentReason::Close));
        for intent in intents {
            fx.fill(&intent, intent.quantity);
        }
        fx.settle();
        assert_eq!(fx.engine.state(), EngineState::Halted);

        assert!(fx.engine.reset());
        assert_eq!(fx.engine.state(), EngineState::Flat);
        assert!(fx.engine.halt_reason().is_none());
    }

    #[test]
    fn take_profit_closes() {
        let mut fx = Fixture::opened();
        let lots = fx.book.quantity_of(&put()).abs();
        // Both legs decay: gain of 1000 split across them.
        let drop = Decimal::from(500) / Decimal::from(lots);
        fx.quote(call(), dec!(100) - drop, 0.248);
        fx.quote(put(), dec!(100) - drop, -0.25);

        let intents = fx.evaluate(None);
        assert_eq!(fx.engine.state(), EngineState::Closing);
        assert_eq!(fx.engine.close_reason(), Some(CloseReason::TakeProfit));
        assert_eq!(intents.len(), 2);
    }
}
