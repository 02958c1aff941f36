//! Hedge sizing and candidate selection.
//!
//! Each quoted instrument the configuration allows is sized to offset the
//! delta deviation. Candidates that land inside the threshold band compete on
//! notional, then prefer instruments already held (smallest holding first).
//! When none land inside the band, the smallest residual deviation wins,
//! provided it improves on doing nothing.

use rust_decimal::Decimal;
use std::cmp::Ordering;

use delta_neutral_core::{HedgeSizing, Instrument, PortfolioSnapshot, Quote, StrategyConfig};

use crate::greeks::DELTA_EPSILON;

#[derive(Debug, Clone, PartialEq)]
pub struct HedgePlan {
    pub instrument: Instrument,
    pub quantity: i64,
    /// Deviation from target left after the hedge.
    pub residual: f64,
    pub notional: Decimal,
    /// Lots already held in the instrument before the hedge.
    held: i64,
}

impl HedgePlan {
    fn is_feasible(&self, threshold: f64) -> bool {
        self.residual.abs() <= threshold + DELTA_EPSILON
    }

    /// Cheapest notional, then held before new, then smallest holding.
    fn preference(&self, other: &Self) -> Ordering {
        self.notional
            .cmp(&other.notional)
            .then_with(|| (self.held == 0).cmp(&(other.held == 0)))
            .then_with(|| self.held.abs().cmp(&other.held.abs()))
            .then_with(|| self.instrument.cmp(&other.instrument))
    }
}

/// Plans a single hedge intent for `deviation` (net delta minus target).
pub fn plan_hedge<'a>(
    deviation: f64,
    candidates: impl IntoIterator<Item = &'a Quote>,
    snapshot: &PortfolioSnapshot,
    config: &StrategyConfig,
) -> Option<HedgePlan> {
    let threshold = config.adjustment_threshold;
    let sized: Vec<HedgePlan> = candidates
        .into_iter()
        .filter(|q| {
            if q.instrument.is_option() {
                config.hedge_with.allows_options()
            } else {
                config.hedge_with.allows_underlying()
            }
        })
        .filter_map(|q| size_candidate(deviation, q, snapshot, config))
        .collect();

    let best_feasible = sized
        .iter()
        .filter(|plan| plan.is_feasible(threshold))
        .min_by(|a, b| a.preference(b));
    if let Some(plan) = best_feasible {
        return Some(plan.clone());
    }

    sized
        .into_iter()
        .filter(|plan| plan.residual.abs() < deviation.abs() - DELTA_EPSILON)
        .min_by(|a, b| {
            a.residual
                .abs()
                .total_cmp(&b.residual.abs())
                .then_with(|| a.preference(b))
        })
}

fn size_candidate(
    deviation: f64,
    quote: &Quote,
    snapshot: &PortfolioSnapshot,
    config: &StrategyConfig,
) -> Option<HedgePlan> {
    if quote.delta.abs() < DELTA_EPSILON || quote.last <= Decimal::ZERO {
        return None;
    }

    let raw = -deviation / quote.delta;
    let lots = match config.hedge_sizing {
        HedgeSizing::ToTarget => raw.round(),
        HedgeSizing::ToThreshold => {
            let excess = deviation.abs() - config.adjustment_threshold;
            if excess <= 0.0 {
                return None;
            }
            ((excess - DELTA_EPSILON) / quote.delta.abs()).ceil() * raw.signum()
        }
    };

    let cap = config.max_hedge_quantity as f64;
    let quantity = lots.clamp(-cap, cap) as i64;
    if quantity == 0 {
        return None;
    }

    Some(HedgePlan {
        instrument: quote.instrument.clone(),
        quantity,
        residual: deviation + quantity as f64 * quote.delta,
        notional: quote.instrument.notional(quantity, quote.last),
        held: snapshot.quantity_of(&quote.instrument),
    })
}
