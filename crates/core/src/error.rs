//! Error taxonomy for the trading core.
//!
//! Market-data failures (`MissingQuote`, `AdapterTimeout`) are transient: the
//! session skips the tick. `Rejected` leaves positions untouched.
//! `UnknownInstrument` and `UnmatchedFill` are invariant violations and end
//! the run.

use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

use crate::instrument::Instrument;
use crate::orders::IntentId;

/// Errors raised by the core and its adapters.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TradingError {
    /// No quote for an instrument that was required.
    #[error("missing quote for {instrument}")]
    MissingQuote {
        /// The instrument without a quote.
        instrument: Instrument,
    },

    /// An adapter did not answer within its budget.
    #[error("{operation} timed out after {budget:?}")]
    AdapterTimeout {
        /// Adapter operation (e.g. "get_quotes", "submit").
        operation: String,
        /// Budget that was exceeded.
        budget: Duration,
    },

    /// Order refused by the execution venue.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// A close fill arrived for an instrument with no open position.
    #[error("unknown instrument: {instrument} has no open position to reduce")]
    UnknownInstrument {
        /// Instrument named by the fill.
        instrument: Instrument,
    },

    /// A fill that does not match a registered, approved intent.
    #[error("fill for intent {intent_id} does not match an approved intent: {detail}")]
    UnmatchedFill {
        /// Intent named by the fill.
        intent_id: IntentId,
        /// What did not match.
        detail: String,
    },

    /// Post-trade exposure would exceed capital and scaling cannot fix it.
    #[error("capital breach: exposure {exposure} would exceed capital {capital}")]
    CapitalBreach {
        /// Projected gross exposure.
        exposure: Decimal,
        /// Session capital.
        capital: Decimal,
    },

    /// Post-trade potential loss would exceed the stop-loss amount.
    #[error("loss limit: potential loss {potential_loss} would exceed {limit}")]
    LossLimit {
        /// Current drawdown plus the intent's stressed loss.
        potential_loss: Decimal,
        /// Stop-loss amount.
        limit: Decimal,
    },

    /// Session loss passed the kill-switch level.
    #[error("kill switch triggered: session loss {loss} exceeds {limit}")]
    KillSwitchTriggered {
        /// Current session loss.
        loss: Decimal,
        /// Kill-switch loss level.
        limit: Decimal,
    },
}

impl TradingError {
    /// Creates a timeout error for `operation`.
    pub fn timeout(operation: impl Into<String>, budget: Duration) -> Self {
        Self::AdapterTimeout {
            operation: operation.into(),
            budget,
        }
    }

    /// Creates a missing-quote error.
    pub fn missing_quote(instrument: &Instrument) -> Self {
        Self::MissingQuote {
            instrument: instrument.clone(),
        }
    }

    /// Market-data or submission failures the session survives by skipping
    /// or retrying next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::MissingQuote { .. } | Self::AdapterTimeout { .. } | Self::Rejected(_)
        )
    }

    /// Correctness violations that must end the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownInstrument { .. } | Self::UnmatchedFill { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let spot = Instrument::underlying("NIFTY");
        assert!(TradingError::missing_quote(&spot).is_transient());
        assert!(TradingError::timeout("get_quotes", Duration::from_millis(500)).is_transient());
        assert!(TradingError::Rejected("margin".into()).is_transient());
        assert!(TradingError::UnknownInstrument { instrument: spot }.is_fatal());
    }

    #[test]
    fn messages_name_the_instrument() {
        let err = TradingError::missing_quote(&Instrument::underlying("nifty"));
        assert_eq!(err.to_string(), "missing quote for NIFTY");
    }
}
