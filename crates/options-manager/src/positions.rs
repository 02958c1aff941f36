//! Position manager: the session's single source of truth for holdings.
//!
//! Positions change only through [`PositionManager::apply_fill`], and every
//! fill must pair with an intent registered after risk approval.

use rust_decimal::Decimal;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use delta_neutral_core::{
    Fill, Instrument, IntentId, IntentReason, OrderIntent, PortfolioSnapshot, Position, Quote,
    TradingError,
};

use crate::greeks;

/// An approved intent awaiting its fill.
#[derive(Debug, Clone)]
struct PendingIntent {
    instrument: Instrument,
    quantity: i64,
    reason: IntentReason,
}

#[derive(Debug, Default)]
pub struct PositionManager {
    positions: BTreeMap<Instrument, Position>,
    pending: HashMap<IntentId, PendingIntent>,
    realized_pnl: Decimal,
}

impl PositionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an approved intent so its fill can be matched.
    pub fn register(&mut self, intent: &OrderIntent) {
        self.pending.insert(
            intent.id,
            PendingIntent {
                instrument: intent.instrument.clone(),
                quantity: intent.quantity,
                reason: intent.reason,
            },
        );
    }

    /// Drops a registered intent that failed at the executor.
    pub fn forget(&mut self, id: IntentId) {
        self.pending.remove(&id);
    }

    /// Applies a fill. Returns the realized P&L (net of commission) when the
    /// fill reduced or flipped a position, `None` when it only opened or
    /// added.
    ///
    /// # Errors
    ///
    /// `UnmatchedFill` if the fill does not pair with a registered intent,
    /// `UnknownInstrument` for a close fill with nothing to close. Both
    /// leave the book unchanged.
    pub fn apply_fill(&mut self, fill: &Fill) -> Result<Option<Decimal>, TradingError> {
        let pending = self.match_intent(fill)?;

        let pos = match self.positions.entry(fill.instrument.clone()) {
            Entry::Vacant(slot) => {
                if pending.reason == IntentReason::Close {
                    return Err(TradingError::UnknownInstrument {
                        instrument: fill.instrument.clone(),
                    });
                }
                slot.insert(Position {
                    instrument: fill.instrument.clone(),
                    quantity: fill.quantity,
                    avg_entry_price: fill.price,
                    opened_at: fill.filled_at,
                });
                self.pending.remove(&fill.intent_id);
                self.realized_pnl -= fill.commission;
                debug!(instrument = %fill.instrument, quantity = fill.quantity, "Position opened");
                return Ok(None);
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };
        let held = pos.quantity;

        // Adding to the position: weighted average cost.
        if held.signum() == fill.quantity.signum() {
            let held_lots = Decimal::from(held.abs());
            let added = Decimal::from(fill.quantity.abs());
            pos.avg_entry_price =
                (pos.avg_entry_price * held_lots + fill.price * added) / (held_lots + added);
            pos.quantity += fill.quantity;
            self.pending.remove(&fill.intent_id);
            self.realized_pnl -= fill.commission;
            return Ok(None);
        }

        // Reducing, closing or flipping.
        let closed = fill.quantity.abs().min(held.abs());
        let gross = Decimal::from(closed * held.signum())
            * (fill.price - pos.avg_entry_price)
            * pos.instrument.multiplier;
        let realized = gross - fill.commission;
        let remaining = held + fill.quantity;

        if remaining.signum() == held.signum() {
            pos.quantity = remaining;
        } else if remaining != 0 {
            // Flipped: the remainder opens at the fill price.
            pos.quantity = remaining;
            pos.avg_entry_price = fill.price;
            pos.opened_at = fill.filled_at;
            info!(instrument = %fill.instrument, quantity = remaining, "Position flipped");
        } else {
            self.positions.remove(&fill.instrument);
            info!(instrument = %fill.instrument, pnl = %realized, "Position closed");
        }

        self.pending.remove(&fill.intent_id);
        self.realized_pnl += realized;
        Ok(Some(realized))
    }

    fn match_intent(&self, fill: &Fill) -> Result<PendingIntent, TradingError> {
        let unmatched = |detail: String| TradingError::UnmatchedFill {
            intent_id: fill.intent_id,
            detail,
        };

        let pending = self
            .pending
            .get(&fill.intent_id)
            .ok_or_else(|| unmatched("no registered intent, or its fill was already applied".into()))?;

        if pending.instrument != fill.instrument {
            return Err(unmatched(format!(
                "intent is for {}, fill is for {}",
                pending.instrument, fill.instrument
            )));
        }
        if fill.quantity == 0 || fill.quantity.signum() != pending.quantity.signum() {
            return Err(unmatched(format!(
                "fill quantity {} does not match intent direction {}",
                fill.quantity, pending.quantity
            )));
        }
        if fill.quantity.abs() > pending.quantity.abs() {
            return Err(unmatched(format!(
                "fill quantity {} exceeds intent quantity {}",
                fill.quantity, pending.quantity
            )));
        }
        Ok(pending.clone())
    }

    /// Open positions in instrument order.
    pub fn open_positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    /// Intents that bring every open position to exactly zero.
    pub fn close_all(&self) -> Vec<OrderIntent> {
        self.positions
            .values()
            .map(|p| OrderIntent::market(p.instrument.clone(), -p.quantity, IntentReason::Close))
            .collect()
    }

    pub fn position(&self, instrument: &Instrument) -> Option<&Position> {
        self.positions.get(instrument)
    }

    /// Signed lots held; zero when flat in the instrument.
    pub fn quantity_of(&self, instrument: &Instrument) -> i64 {
        self.positions.get(instrument).map_or(0, |p| p.quantity)
    }

    pub fn is_flat(&self) -> bool {
        self.positions.is_empty()
    }

    /// Realized P&L since session start, net of commission.
    pub const fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    /// Snapshot of the book at `quotes`.
    pub fn snapshot(
        &self,
        quotes: &HashMap<Instrument, Quote>,
    ) -> Result<PortfolioSnapshot, TradingError> {
        greeks::aggregate(&self.open_positions(), quotes, self.realized_pnl)
    }
}
