//! Take profit on the open book.

use delta_neutral_core::{PortfolioSnapshot, RiskLimits};

use crate::types::CloseReason;

/// Returns `TakeProfit` once unrealized P&L reaches `target_profit% × capital`.
pub fn check_take_profit(snapshot: &PortfolioSnapshot, limits: &RiskLimits) -> Option<CloseReason> {
    if snapshot.is_flat() {
        return None;
    }
    let target = limits.target_profit_amount();
    if snapshot.unrealized_pnl >= target {
        tracing::info!(
            unrealized_pnl = %snapshot.unrealized_pnl,
            target = %target,
            "Take profit hit, closing everything"
        );
        return Some(CloseReason::TakeProfit);
    }
    None
}
