//! Risk controller: the gate between the strategy engine and the executor.
//!
//! Every intent is reviewed against the current (or projected) snapshot:
//! 1. Capital: post-trade gross notional must stay within capital. Oversized
//!    intents are scaled down to whole lots, or rejected if none fit.
//! 2. Loss: current drawdown plus the intent's stressed loss must stay within
//!    the stop-loss amount.
//!
//! Intents that only shrink a position skip both checks, so liquidation is
//! never blocked.

use rust_decimal::Decimal;
use tracing::{debug, error, warn};

use delta_neutral_core::{OrderIntent, OrderType, PortfolioSnapshot, RiskLimits, TradingError};

use crate::allocation::{check_allocation, max_lots_within, AllocationCheck};
use crate::types::Verdict;

#[derive(Debug)]
pub struct RiskController {
    max_consecutive_rejections: u32,
    rejection_streak: u32,
}

impl RiskController {
    #[must_use]
    pub const fn new(max_consecutive_rejections: u32) -> Self {
        Self {
            max_consecutive_rejections,
            rejection_streak: 0,
        }
    }

    /// Reviews one intent.
    pub fn review(
        &self,
        intent: &OrderIntent,
        snapshot: &PortfolioSnapshot,
        limits: &RiskLimits,
    ) -> Verdict {
        if intent.quantity == 0 {
            return Verdict::Reject(TradingError::Rejected("zero quantity".to_string()));
        }

        let held = snapshot.quantity_of(&intent.instrument);
        if intent.is_reducing(held) {
            debug!(intent_id = %intent.id, held, quantity = intent.quantity, "Risk-reducing intent approved");
            return Verdict::Approve(intent.clone());
        }

        let price = match (snapshot.mark(&intent.instrument), &intent.order_type) {
            (Some(mark), _) => mark,
            (None, OrderType::Limit { price }) => *price,
            (None, OrderType::Market) => {
                return Verdict::Reject(TradingError::missing_quote(&intent.instrument));
            }
        };

        let quantity = match Self::fit_capital(intent, held, price, snapshot, limits) {
            Ok(quantity) => quantity,
            Err(e) => {
                warn!(intent_id = %intent.id, instrument = %intent.instrument, error = %e, "Intent rejected");
                return Verdict::Reject(e);
            }
        };

        let stressed = intent.instrument.notional(quantity, price) * limits.loss_stress_percentage
            / Decimal::ONE_HUNDRED;
        let potential_loss = snapshot.session_loss() + stressed;
        let limit = limits.max_loss_amount();
        if potential_loss > limit {
            warn!(
                intent_id = %intent.id,
                instrument = %intent.instrument,
                potential_loss = %potential_loss,
                limit = %limit,
                "Intent rejected on loss limit"
            );
            return Verdict::Reject(TradingError::LossLimit {
                potential_loss,
                limit,
            });
        }

        if quantity == intent.quantity {
            Verdict::Approve(intent.clone())
        } else {
            warn!(
                intent_id = %intent.id,
                instrument = %intent.instrument,
                requested = intent.quantity,
                approved = quantity,
                "Intent scaled to fit capital"
            );
            Verdict::Scale {
                intent: intent.with_quantity(quantity),
                requested: intent.quantity,
            }
        }
    }

    /// Largest signed quantity, up to the requested one, whose post-trade
    /// gross exposure fits capital.
    fn fit_capital(
        intent: &OrderIntent,
        held: i64,
        price: Decimal,
        snapshot: &PortfolioSnapshot,
        limits: &RiskLimits,
    ) -> Result<i64, TradingError> {
        let instrument = &intent.instrument;
        let current = snapshot
            .position(instrument)
            .map_or(Decimal::ZERO, |p| p.notional);
        let other = snapshot.gross_exposure - current;
        let post_trade = other + instrument.notional(held + intent.quantity, price);

        match check_allocation(post_trade, limits.capital) {
            AllocationCheck::Approved {
                utilization_pct, ..
            } => {
                debug!(instrument = %instrument, utilization_pct = %utilization_pct, "Capital check passed");
                return Ok(intent.quantity);
            }
            AllocationCheck::Rejected { would_be_pct } => {
                debug!(instrument = %instrument, would_be_pct = %would_be_pct, "Capital check failed");
            }
        }

        let max_position = max_lots_within(limits.capital, other, price, instrument.multiplier);
        // Lots of the intent that keep |held + lots| within max_position.
        let allowed = if held == 0 || held.signum() == intent.quantity.signum() {
            max_position.saturating_sub(held.abs())
        } else {
            max_position.saturating_add(held.abs())
        };

        if allowed < 1 {
            return Err(TradingError::CapitalBreach {
                exposure: post_trade,
                capital: limits.capital,
            });
        }
        Ok(allowed.min(intent.quantity.abs()) * intent.quantity.signum())
    }

    /// Errors with `KillSwitchTriggered` once the session loss passes the
    /// kill-switch level.
    pub fn kill_switch(
        &self,
        snapshot: &PortfolioSnapshot,
        limits: &RiskLimits,
    ) -> Result<(), TradingError> {
        let loss = snapshot.session_loss();
        let limit = limits.kill_switch_loss();
        if loss > limit {
            error!(loss = %loss, limit = %limit, "Kill switch triggered");
            return Err(TradingError::KillSwitchTriggered { loss, limit });
        }
        Ok(())
    }

    pub fn check_kill_switch(&self, snapshot: &PortfolioSnapshot, limits: &RiskLimits) -> bool {
        self.kill_switch(snapshot, limits).is_err()
    }

    /// Resets the rejection streak after a successful execution.
    pub fn record_success(&mut self) {
        self.rejection_streak = 0;
    }

    /// Counts an execution failure. Returns true once the streak reaches
    /// the configured limit.
    pub fn record_failure(&mut self) -> bool {
        self.rejection_streak += 1;
        self.rejection_streak >= self.max_consecutive_rejections
    }

    pub const fn rejection_streak(&self) -> u32 {
        self.rejection_streak
    }
}
