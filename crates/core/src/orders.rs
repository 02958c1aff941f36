//! Order intents and fills.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::instrument::Instrument;

/// Order side, derived from the sign of a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn of(quantity: i64) -> Self {
        if quantity >= 0 {
            Self::Buy
        } else {
            Self::Sell
        }
    }
}

/// Order type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit { price: Decimal },
}

/// Why an intent was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentReason {
    Open,
    Hedge,
    Adjust,
    Close,
}

impl fmt::Display for IntentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Hedge => write!(f, "hedge"),
            Self::Adjust => write!(f, "adjust"),
            Self::Close => write!(f, "close"),
        }
    }
}

/// Identity pairing an intent with the fill it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentId(Uuid);

impl IntentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IntentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A requested position change. Lives for one tick only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub id: IntentId,
    pub instrument: Instrument,
    /// Signed lots: positive buys, negative sells.
    pub quantity: i64,
    pub order_type: OrderType,
    pub reason: IntentReason,
    pub created_at: DateTime<Utc>,
}

impl OrderIntent {
    pub fn market(instrument: Instrument, quantity: i64, reason: IntentReason) -> Self {
        Self {
            id: IntentId::new(),
            instrument,
            quantity,
            order_type: OrderType::Market,
            reason,
            created_at: Utc::now(),
        }
    }

    pub fn limit(instrument: Instrument, quantity: i64, price: Decimal, reason: IntentReason) -> Self {
        Self {
            order_type: OrderType::Limit { price },
            ..Self::market(instrument, quantity, reason)
        }
    }

    pub fn side(&self) -> OrderSide {
        OrderSide::of(self.quantity)
    }

    /// Same intent (same id) with a different quantity; used when scaling.
    #[must_use]
    pub fn with_quantity(&self, quantity: i64) -> Self {
        Self {
            quantity,
            ..self.clone()
        }
    }

    /// True if executing this intent against `held` lots only shrinks the
    /// position without flipping it.
    pub fn is_reducing(&self, held: i64) -> bool {
        held != 0
            && self.quantity != 0
            && held.signum() != self.quantity.signum()
            && self.quantity.abs() <= held.abs()
    }
}

/// An execution report for one intent. Possibly partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub intent_id: IntentId,
    pub instrument: Instrument,
    /// Signed lots actually executed.
    pub quantity: i64,
    pub price: Decimal,
    pub commission: Decimal,
    pub filled_at: DateTime<Utc>,
}

impl Fill {
    /// A commission-free fill for `intent`, stamped now.
    pub fn for_intent(intent: &OrderIntent, quantity: i64, price: Decimal) -> Self {
        Self {
            intent_id: intent.id,
            instrument: intent.instrument.clone(),
            quantity,
            price,
            commission: Decimal::ZERO,
            filled_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spot() -> Instrument {
        Instrument::underlying("NIFTY")
    }

    #[test]
    fn reducing_requires_opposite_sign_and_no_flip() {
        let sell_two = OrderIntent::market(spot(), -2, IntentReason::Hedge);
        assert!(sell_two.is_reducing(5));
        assert!(sell_two.is_reducing(2));
        assert!(!sell_two.is_reducing(1)); // flips to short
        assert!(!sell_two.is_reducing(0));
        assert!(!sell_two.is_reducing(-3)); // adds to short
    }

    #[test]
    fn scaling_keeps_identity() {
        let intent = OrderIntent::market(spot(), 10, IntentReason::Open);
        let scaled = intent.with_quantity(4);
        assert_eq!(scaled.id, intent.id);
        assert_eq!(scaled.quantity, 4);
    }

    #[test]
    fn side_follows_sign() {
        assert_eq!(OrderIntent::market(spot(), -1, IntentReason::Close).side(), OrderSide::Sell);
        assert_eq!(OrderIntent::market(spot(), 1, IntentReason::Close).side(), OrderSide::Buy);
    }
}
