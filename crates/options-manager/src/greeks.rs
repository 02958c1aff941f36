//! Greeks aggregation: positions + current quotes → portfolio snapshot.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use delta_neutral_core::{
    Instrument, PortfolioSnapshot, Position, PositionExposure, Quote, TradingError,
};

/// Tolerance for comparing aggregated deltas.
pub const DELTA_EPSILON: f64 = 1e-9;

/// Builds a snapshot of `positions` at `quotes`.
///
/// Pure. Every position must have a quote; quotes for instruments that are
/// not held only contribute their mark price.
pub fn aggregate(
    positions: &[Position],
    quotes: &HashMap<Instrument, Quote>,
    realized_pnl: Decimal,
) -> Result<PortfolioSnapshot, TradingError> {
    let mut snapshot = PortfolioSnapshot::flat(realized_pnl);
    snapshot.marks = quotes
        .iter()
        .map(|(instrument, quote)| (instrument.clone(), quote.last))
        .collect::<BTreeMap<_, _>>();

    for position in positions {
        let quote = quotes
            .get(&position.instrument)
            .ok_or_else(|| TradingError::missing_quote(&position.instrument))?;

        let lots = position.quantity as f64;
        let notional = position.instrument.notional(position.quantity, quote.last);
        let unrealized = position.unrealized_pnl(quote.last);

        snapshot.net_delta += lots * quote.delta;
        snapshot.net_gamma += lots * quote.gamma.unwrap_or(0.0);
        snapshot.net_theta += lots * quote.theta.unwrap_or(0.0);
        snapshot.net_vega += lots * quote.vega.unwrap_or(0.0);
        snapshot.gross_exposure += notional;
        snapshot.unrealized_pnl += unrealized;

        snapshot.positions.push(PositionExposure {
            instrument: position.instrument.clone(),
            quantity: position.quantity,
            avg_entry_price: position.avg_entry_price,
            mark: quote.last,
            delta: quote.delta,
            delta_contribution: lots * quote.delta,
            notional,
            unrealized_pnl: unrealized,
        });
    }

    snapshot.taken_at = quotes
        .values()
        .map(|q| q.timestamp)
        .max()
        .unwrap_or_else(Utc::now);

    Ok(snapshot)
}
