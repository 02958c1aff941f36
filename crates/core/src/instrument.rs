//! Instruments, quotes and option chains.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Option right (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    Call,
    Put,
}

impl fmt::Display for OptionRight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "C"),
            Self::Put => write!(f, "P"),
        }
    }
}

/// What an [`Instrument`] refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstrumentKind {
    /// The underlying itself (index future, stock, spot).
    Underlying,
    /// An option contract on the underlying.
    Option {
        strike: Decimal,
        expiry: NaiveDate,
        right: OptionRight,
    },
}

/// A tradeable contract. Immutable once created.
///
/// Ordering is total so position books and quote requests iterate
/// deterministically: underlying before options, then by expiry/strike/right
/// through the derived field order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instrument {
    pub underlying: String,
    pub kind: InstrumentKind,
    /// Units per lot (1 for the underlying, e.g. 100 for US equity options).
    pub multiplier: Decimal,
}

impl Instrument {
    /// The underlying with a multiplier of one.
    pub fn underlying(symbol: &str) -> Self {
        Self {
            underlying: symbol.to_uppercase(),
            kind: InstrumentKind::Underlying,
            multiplier: Decimal::ONE,
        }
    }

    /// An option contract.
    pub fn option(
        symbol: &str,
        expiry: NaiveDate,
        strike: Decimal,
        right: OptionRight,
        multiplier: Decimal,
    ) -> Self {
        Self {
            underlying: symbol.to_uppercase(),
            kind: InstrumentKind::Option {
                strike,
                expiry,
                right,
            },
            multiplier,
        }
    }

    pub fn is_option(&self) -> bool {
        matches!(self.kind, InstrumentKind::Option { .. })
    }

    pub fn right(&self) -> Option<OptionRight> {
        match self.kind {
            InstrumentKind::Option { right, .. } => Some(right),
            InstrumentKind::Underlying => None,
        }
    }

    pub fn strike(&self) -> Option<Decimal> {
        match self.kind {
            InstrumentKind::Option { strike, .. } => Some(strike),
            InstrumentKind::Underlying => None,
        }
    }

    pub fn expiry(&self) -> Option<NaiveDate> {
        match self.kind {
            InstrumentKind::Option { expiry, .. } => Some(expiry),
            InstrumentKind::Underlying => None,
        }
    }

    /// Absolute notional of `quantity` lots at `price`.
    pub fn notional(&self, quantity: i64, price: Decimal) -> Decimal {
        Decimal::from(quantity.unsigned_abs()) * price * self.multiplier
    }
}

impl fmt::Display for Instrument {
    /// e.g. "NIFTY" or "NIFTY 22000C 2026-03-26".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            InstrumentKind::Underlying => write!(f, "{}", self.underlying),
            InstrumentKind::Option {
                strike,
                expiry,
                right,
            } => write!(f, "{} {}{} {}", self.underlying, strike, right, expiry),
        }
    }
}

/// Point-in-time quote with greeks. Refreshed every tick, never kept as history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub instrument: Instrument,
    pub timestamp: DateTime<Utc>,
    pub last: Decimal,
    /// Per-lot delta as quoted by the venue (1.0 for the underlying).
    pub delta: f64,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
}

impl Quote {
    pub fn new(instrument: Instrument, last: Decimal, delta: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            instrument,
            timestamp,
            last,
            delta,
            gamma: None,
            theta: None,
            vega: None,
            bid: None,
            ask: None,
        }
    }

    #[must_use]
    pub fn with_greeks(mut self, gamma: f64, theta: f64, vega: f64) -> Self {
        self.gamma = Some(gamma);
        self.theta = Some(theta);
        self.vega = Some(vega);
        self
    }

    #[must_use]
    pub fn with_spread(mut self, bid: Decimal, ask: Decimal) -> Self {
        self.bid = Some(bid);
        self.ask = Some(ask);
        self
    }

    /// Bid/ask width when both sides are quoted.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((ask - bid).abs()),
            _ => None,
        }
    }
}

/// Option chain snapshot for one underlying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionChain {
    pub underlying: Instrument,
    pub spot: Decimal,
    pub quotes: Vec<Quote>,
    pub as_of: DateTime<Utc>,
}

impl OptionChain {
    /// Quotes of the given right, in chain order.
    pub fn of_right(&self, right: OptionRight) -> impl Iterator<Item = &Quote> {
        self.quotes
            .iter()
            .filter(move |q| q.instrument.right() == Some(right))
    }
}
