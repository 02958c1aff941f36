//! Portfolio stop loss.

use delta_neutral_core::{PortfolioSnapshot, RiskLimits};

use crate::types::CloseReason;

/// Stop loss on the open book: unrealized P&L at or below
/// `−max_loss% × capital`.
pub fn check_stop_loss(snapshot: &PortfolioSnapshot, limits: &RiskLimits) -> Option<CloseReason> {
    if snapshot.is_flat() {
        return None;
    }
    let limit = limits.max_loss_amount();
    if snapshot.unrealized_pnl <= -limit {
        tracing::warn!(
            unrealized_pnl = %snapshot.unrealized_pnl,
            limit = %limit,
            "Stop loss triggered"
        );
        return Some(CloseReason::StopLoss);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use delta_neutral_core::{AppConfig, Instrument, PositionExposure};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn book_with_pnl(pnl: Decimal) -> PortfolioSnapshot {
        let mut snapshot = PortfolioSnapshot::flat(Decimal::ZERO);
        snapshot.positions.push(PositionExposure {
            instrument: Instrument::underlying("NIFTY"),
            quantity: -1,
            avg_entry_price: dec!(100),
            mark: dec!(100),
            delta: 1.0,
            delta_contribution: -1.0,
            notional: dec!(100),
            unrealized_pnl: pnl,
        });
        snapshot.unrealized_pnl = pnl;
        snapshot
    }

    #[test]
    fn triggers_at_exactly_the_limit() {
        // 2% of 100k.
        let limits = AppConfig::default().risk_limits();
        assert_eq!(
            check_stop_loss(&book_with_pnl(dec!(-2000)), &limits),
            Some(CloseReason::StopLoss)
        );
    }

    #[test]
    fn does_not_trigger_inside_the_limit() {
        let limits = AppConfig::default().risk_limits();
        assert_eq!(check_stop_loss(&book_with_pnl(dec!(-1999.99)), &limits), None);
    }

    #[test]
    fn ignores_a_flat_book() {
        let limits = AppConfig::default().risk_limits();
        let mut snapshot = PortfolioSnapshot::flat(dec!(-5000));
        snapshot.unrealized_pnl = dec!(-5000);
        assert_eq!(check_stop_loss(&snapshot, &limits), None);
    }
}
