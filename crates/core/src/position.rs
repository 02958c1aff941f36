use crate::instrument::Instrument;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An open position. Quantity is never zero while the position exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: Instrument,
    /// Signed lots: positive long, negative short.
    pub quantity: i64,
    pub avg_entry_price: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    #[must_use]
    pub const fn is_short(&self) -> bool {
        self.quantity < 0
    }

    /// Mark-to-market P&L at `price`. The signed quantity makes shorts gain
    /// when the price falls.
    #[must_use]
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        Decimal::from(self.quantity) * (price - self.avg_entry_price) * self.instrument.multiplier
    }
}

/// One row of a [`PortfolioSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionExposure {
    pub instrument: Instrument,
    pub quantity: i64,
    pub avg_entry_price: Decimal,
    pub mark: Decimal,
    /// Per-lot delta from the current quote.
    pub delta: f64,
    /// `quantity × delta`.
    pub delta_contribution: f64,
    pub notional: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Derived, read-only view of the book at current quotes. Built fresh every
/// tick by the greeks aggregator and never cached across ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub taken_at: DateTime<Utc>,
    pub positions: Vec<PositionExposure>,
    /// Last price of every quoted instrument, held or not.
    pub marks: BTreeMap<Instrument, Decimal>,
    pub net_delta: f64,
    pub net_gamma: f64,
    pub net_theta: f64,
    pub net_vega: f64,
    /// Σ |notional| across open positions.
    pub gross_exposure: Decimal,
    pub unrealized_pnl: Decimal,
    /// Realized since session start, net of commission.
    pub realized_pnl: Decimal,
}

impl PortfolioSnapshot {
    /// Snapshot of an empty book.
    #[must_use]
    pub fn flat(realized_pnl: Decimal) -> Self {
        Self {
            taken_at: Utc::now(),
            positions: Vec::new(),
            marks: BTreeMap::new(),
            net_delta: 0.0,
            net_gamma: 0.0,
            net_theta: 0.0,
            net_vega: 0.0,
            gross_exposure: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl,
        }
    }

    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.positions.is_empty()
    }

    #[must_use]
    pub fn total_pnl(&self) -> Decimal {
        self.realized_pnl + self.unrealized_pnl
    }

    /// Session drawdown as a non-negative amount.
    #[must_use]
    pub fn session_loss(&self) -> Decimal {
        (-self.total_pnl()).max(Decimal::ZERO)
    }

    #[must_use]
    pub fn position(&self, instrument: &Instrument) -> Option<&PositionExposure> {
        self.positions.iter().find(|p| &p.instrument == instrument)
    }

    /// Signed lots held in `instrument` (zero if none).
    #[must_use]
    pub fn quantity_of(&self, instrument: &Instrument) -> i64 {
        self.position(instrument).map_or(0, |p| p.quantity)
    }

    #[must_use]
    pub fn mark(&self, instrument: &Instrument) -> Option<Decimal> {
        self.marks.get(instrument).copied()
    }
}
