//! Types shared by the strategy engine, risk controller and session.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use delta_neutral_core::{OrderIntent, TradingError};

/// Strategy engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// No positions, waiting for an open trigger.
    #[default]
    Flat,
    /// Positions open, delta inside the threshold band.
    Neutral,
    /// Positions open, delta outside the band; hedging.
    Skewed,
    /// Liquidating after a stop loss or take profit.
    Closing,
    /// Hard risk violation. Liquidates and waits for an operator reset.
    Halted,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flat => write!(f, "flat"),
            Self::Neutral => write!(f, "neutral"),
            Self::Skewed => write!(f, "skewed"),
            Self::Closing => write!(f, "closing"),
            Self::Halted => write!(f, "halted"),
        }
    }
}

/// Why the engine started liquidating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "stop_loss"),
            Self::TakeProfit => write!(f, "take_profit"),
        }
    }
}

/// Hard violation that halted the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum HaltReason {
    /// Kill switch or an unresolvable capital breach on a hedge.
    RiskViolation(TradingError),
    /// Consecutive execution failures reached the configured limit.
    SustainedRejection { failures: u32 },
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RiskViolation(e) => write!(f, "{e}"),
            Self::SustainedRejection { failures } => {
                write!(f, "{failures} consecutive execution failures")
            }
        }
    }
}

/// Risk controller decision on one intent.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Approve(OrderIntent),
    /// Approved at a smaller quantity. Same intent id.
    Scale { intent: OrderIntent, requested: i64 },
    Reject(TradingError),
}

/// Per-intent entry in the tick report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    Approved,
    Scaled { from: i64, to: i64 },
    Rejected { reason: String },
}

impl From<&Verdict> for Disposition {
    fn from(verdict: &Verdict) -> Self {
        match verdict {
            Verdict::Approve(_) => Self::Approved,
            Verdict::Scale { intent, requested } => Self::Scaled {
                from: *requested,
                to: intent.quantity,
            },
            Verdict::Reject(e) => Self::Rejected {
                reason: e.to_string(),
            },
        }
    }
}

/// What happened to an approved intent at the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Execution {
    Filled {
        quantity: i64,
        price: Decimal,
        commission: Decimal,
    },
    Failed {
        error: String,
    },
}

/// Session counters, returned when the loop stops.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub intents: u64,
    pub fills: u64,
    pub failures: u64,
    pub final_state: EngineState,
    pub realized_pnl: Decimal,
}
