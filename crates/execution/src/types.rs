//! Wire-neutral order types exchanged with a brokerage gateway.

use delta_neutral_core::{Instrument, OrderSide, OrderType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An order as handed to the broker. Quantity is unsigned; direction is in `side`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrder {
    /// Client order tag; the originating intent id.
    pub client_order_id: String,
    pub instrument: Instrument,
    pub side: OrderSide,
    pub quantity: u64,
    pub order_type: OrderType,
}

/// Lifecycle state reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Pending,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected { reason: String },
}

impl OrderState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected { .. })
    }
}

/// Broker view of one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub state: OrderState,
    pub filled_quantity: u64,
    pub avg_fill_price: Decimal,
    pub commission: Decimal,
}

impl OrderStatus {
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            state: OrderState::Pending,
            filled_quantity: 0,
            avg_fill_price: Decimal::ZERO,
            commission: Decimal::ZERO,
        }
    }
}
