//! Per-tick session log record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use delta_neutral_core::{IntentId, IntentReason, OrderIntent, PortfolioSnapshot};

use crate::types::{Disposition, EngineState, Execution};

/// One intent as it went through review and execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRecord {
    pub intent_id: IntentId,
    pub instrument: String,
    pub reason: IntentReason,
    /// Quantity the engine asked for, before any scaling.
    pub requested: i64,
    pub disposition: Disposition,
    /// `None` when the intent never reached the executor.
    pub execution: Option<Execution>,
}

impl IntentRecord {
    pub fn new(intent: &OrderIntent, disposition: Disposition) -> Self {
        Self {
            intent_id: intent.id,
            instrument: intent.instrument.to_string(),
            reason: intent.reason,
            requested: intent.quantity,
            disposition,
            execution: None,
        }
    }
}

/// Everything that happened in one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub state: EngineState,
    /// Why the tick was skipped, if it was.
    pub skipped: Option<String>,
    /// Mark-dependent figures; `None` when the tick was skipped unmarked.
    pub net_delta: Option<f64>,
    pub gross_exposure: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub realized_pnl: Decimal,
    pub open_positions: usize,
    pub intents: Vec<IntentRecord>,
}

impl TickReport {
    /// Report for a tick that completed, from the post-fill snapshot.
    pub fn completed(
        seq: u64,
        state: EngineState,
        snapshot: &PortfolioSnapshot,
        intents: Vec<IntentRecord>,
    ) -> Self {
        Self {
            seq,
            at: Utc::now(),
            state,
            skipped: None,
            net_delta: Some(snapshot.net_delta),
            gross_exposure: Some(snapshot.gross_exposure),
            unrealized_pnl: Some(snapshot.unrealized_pnl),
            realized_pnl: snapshot.realized_pnl,
            open_positions: snapshot.positions.len(),
            intents,
        }
    }

    /// Report for a tick that was skipped before any decision. Nothing was
    /// marked, so only book-level figures are carried.
    pub fn skipped(
        seq: u64,
        state: EngineState,
        reason: String,
        realized_pnl: Decimal,
        open_positions: usize,
    ) -> Self {
        Self {
            seq,
            at: Utc::now(),
            state,
            skipped: Some(reason),
            net_delta: None,
            gross_exposure: None,
            unrealized_pnl: None,
            realized_pnl,
            open_positions,
            intents: Vec::new(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }

    /// Emits the record as one structured event.
    pub fn log(&self) {
        if let Some(reason) = &self.skipped {
            warn!(
                seq = self.seq,
                state = %self.state,
                reason = %reason,
                open_positions = self.open_positions,
                "Tick skipped"
            );
            return;
        }
        let intents = serde_json::to_string(&self.intents).unwrap_or_default();
        info!(
            seq = self.seq,
            state = %self.state,
            net_delta = self.net_delta.unwrap_or_default(),
            gross_exposure = %self.gross_exposure.unwrap_or_default(),
            unrealized_pnl = %self.unrealized_pnl.unwrap_or_default(),
            realized_pnl = %self.realized_pnl,
            open_positions = self.open_positions,
            intents = %intents,
            "Tick"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delta_neutral_core::Instrument;
    use rust_decimal_macros::dec;

    #[test]
    fn serializes_intent_outcomes() {
        let intent = OrderIntent::market(Instrument::underlying("NIFTY"), -3, IntentReason::Hedge);
        let mut record = IntentRecord::new(&intent, Disposition::Scaled { from: -3, to: -2 });
        record.execution = Some(Execution::Filled {
            quantity: -2,
            price: dec!(22000),
            commission: Decimal::ZERO,
        });
        let report = TickReport::completed(
            7,
            EngineState::Skewed,
            &PortfolioSnapshot::flat(dec!(-12.5)),
            vec![record],
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["seq"], 7);
        assert_eq!(json["state"], "skewed");
        assert_eq!(json["intents"][0]["reason"], "hedge");
        assert_eq!(json["intents"][0]["disposition"]["disposition"], "scaled");
        assert_eq!(json["intents"][0]["execution"]["outcome"], "filled");
    }

    #[test]
    fn skipped_report_has_no_intents() {
        let report =
            TickReport::skipped(3, EngineState::Neutral, "missing quote".into(), dec!(50), 2);
        assert!(report.is_skipped());
        assert!(report.intents.is_empty());
        assert_eq!(report.realized_pnl, dec!(50));
        assert_eq!(report.open_positions, 2);
        assert_eq!(report.net_delta, None);
        assert_eq!(report.gross_exposure, None);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["unrealized_pnl"].is_null());
    }
}
