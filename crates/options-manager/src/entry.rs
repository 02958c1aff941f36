//! Entry selection and sizing for the short strangle / short straddle.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::{info, warn};

use delta_neutral_core::{
    EntryStructure, Instrument, OptionChain, OptionRight, Quote, RiskLimits, StrategyConfig,
};

use crate::greeks::DELTA_EPSILON;

/// Legs to sell and the instruments to keep quoting for hedges.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPlan {
    /// Signed (negative) quantities per leg.
    pub legs: Vec<(Instrument, i64)>,
    pub expected_delta: f64,
    pub watchlist: BTreeSet<Instrument>,
}

/// Picks and sizes the entry from `chain`. `None` when no eligible legs
/// exist or even one lot would open outside the threshold band.
pub fn plan_entry(
    chain: &OptionChain,
    config: &StrategyConfig,
    limits: &RiskLimits,
) -> Option<EntryPlan> {
    let candidates: Vec<&Quote> = chain
        .quotes
        .iter()
        .filter(|q| q.instrument.is_option())
        .filter(|q| q.last > Decimal::ZERO && q.last >= config.min_premium)
        .collect();

    let front = candidates.iter().filter_map(|q| q.instrument.expiry()).min()?;
    let front_month: Vec<&Quote> = candidates
        .into_iter()
        .filter(|q| q.instrument.expiry() == Some(front))
        .collect();

    let (call, put) = match config.structure {
        EntryStructure::ShortStrangle => select_strangle(&front_month, config.strangle_delta)?,
        EntryStructure::ShortStraddle => select_straddle(&front_month, chain.spot)?,
    };

    let sized = lots_for(call, limits).min(lots_for(put, limits));
    let Some(quantity) = fit_delta(sized, call.delta + put.delta, config) else {
        warn!(
            call = %call.instrument,
            put = %put.instrument,
            combined_delta = call.delta + put.delta,
            "No entry size fits the delta threshold"
        );
        return None;
    };

    let expected_delta = -(quantity as f64) * (call.delta + put.delta);
    let legs = vec![
        (call.instrument.clone(), -quantity),
        (put.instrument.clone(), -quantity),
    ];

    let mut watchlist: BTreeSet<Instrument> = legs.iter().map(|(i, _)| i.clone()).collect();
    if config.hedge_with.allows_options() {
        watchlist.extend(nearest_spot(&front_month, chain.spot, config.hedge_candidates));
    }
    if config.hedge_with.allows_underlying() {
        watchlist.insert(chain.underlying.clone());
    }

    info!(
        structure = ?config.structure,
        call = %call.instrument,
        put = %put.instrument,
        quantity,
        expected_delta,
        "Entry planned"
    );

    Some(EntryPlan {
        legs,
        expected_delta,
        watchlist,
    })
}

/// Tighter spread first; quotes without a spread sort last.
fn by_spread(a: &Quote, b: &Quote) -> Ordering {
    let width = |q: &Quote| q.spread().unwrap_or(Decimal::MAX);
    width(a).cmp(&width(b))
}

fn select_strangle<'a>(quotes: &[&'a Quote], strangle_delta: f64) -> Option<(&'a Quote, &'a Quote)> {
    let closest = |right: OptionRight| {
        quotes
            .iter()
            .copied()
            .filter(|q| q.instrument.right() == Some(right))
            .min_by(|a, b| {
                let distance = |q: &Quote| (q.delta.abs() - strangle_delta).abs();
                distance(a)
                    .total_cmp(&distance(b))
                    .then_with(|| by_spread(a, b))
                    .then_with(|| a.instrument.cmp(&b.instrument))
            })
    };
    Some((closest(OptionRight::Call)?, closest(OptionRight::Put)?))
}

fn select_straddle<'a>(quotes: &[&'a Quote], spot: Decimal) -> Option<(&'a Quote, &'a Quote)> {
    let pairs = quotes
        .iter()
        .copied()
        .filter(|q| q.instrument.right() == Some(OptionRight::Call))
        .filter_map(|call| {
            let put = quotes.iter().copied().find(|q| {
                q.instrument.right() == Some(OptionRight::Put)
                    && q.instrument.strike() == call.instrument.strike()
            })?;
            Some((call, put))
        });

    pairs.min_by(|(ca, pa), (cb, pb)| {
        let distance = |q: &Quote| (q.instrument.strike().unwrap_or_default() - spot).abs();
        // Pairs missing a spread on either leg sort after quoted pairs.
        let width = |c: &Quote, p: &Quote| match (c.spread(), p.spread()) {
            (Some(a), Some(b)) => (false, a + b),
            _ => (true, Decimal::ZERO),
        };
        distance(ca)
            .cmp(&distance(cb))
            .then_with(|| width(ca, pa).cmp(&width(cb, pb)))
            .then_with(|| ca.instrument.cmp(&cb.instrument))
    })
}

/// `floor(max_loss_amount / (premium × multiplier) × position_sizing)`, at
/// least one lot.
fn lots_for(quote: &Quote, limits: &RiskLimits) -> i64 {
    let per_lot = quote.last * quote.instrument.multiplier;
    if per_lot <= Decimal::ZERO {
        return 1;
    }
    (limits.max_loss_amount() / per_lot * limits.position_sizing)
        .floor()
        .to_i64()
        .unwrap_or(1)
        .max(1)
}

/// Largest quantity up to `sized` whose short-both-legs delta lands inside
/// the band around `target_delta`.
fn fit_delta(sized: i64, combined_delta: f64, config: &StrategyConfig) -> Option<i64> {
    let band = config.adjustment_threshold + DELTA_EPSILON;
    if combined_delta.abs() < DELTA_EPSILON {
        return (config.target_delta.abs() <= band).then_some(sized);
    }

    // Expected delta is −q × combined; solve |−q × combined − target| ≤ band.
    let a = (config.target_delta - band) / -combined_delta;
    let b = (config.target_delta + band) / -combined_delta;
    let (low, high) = if a <= b { (a, b) } else { (b, a) };

    let quantity = (sized as f64).min(high.floor()) as i64;
    let least = low.ceil().max(1.0) as i64;
    (quantity >= least).then_some(quantity)
}

/// The `count` options whose strike is nearest spot.
fn nearest_spot(quotes: &[&Quote], spot: Decimal, count: usize) -> Vec<Instrument> {
    let mut by_distance: Vec<&Quote> = quotes.to_vec();
    by_distance.sort_by(|a, b| {
        let distance = |q: &Quote| (q.instrument.strike().unwrap_or_default() - spot).abs();
        distance(a)
            .cmp(&distance(b))
            .then_with(|| a.instrument.cmp(&b.instrument))
    });
    by_distance
        .into_iter()
        .take(count)
        .map(|q| q.instrument.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use delta_neutral_core::{AppConfig, HedgeInstrument};
    use rust_decimal_macros::dec;

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 26).unwrap()
    }

    fn option(strike: Decimal, right: OptionRight, last: Decimal, delta: f64) -> Quote {
        let instrument = Instrument::option("NIFTY", expiry(), strike, right, Decimal::ONE);
        Quote::new(instrument, last, delta, Utc::now())
    }

    fn chain(quotes: Vec<Quote>) -> OptionChain {
        let spot = Instrument::underlying("NIFTY");
        OptionChain {
            underlying: spot,
            spot: dec!(22000),
            quotes,
            as_of: Utc::now(),
        }
    }

    fn sample_chain() -> OptionChain {
        chain(vec![
            option(dec!(21500), OptionRight::Put, dec!(120), -0.24),
            option(dec!(21800), OptionRight::Put, dec!(170), -0.38),
            option(dec!(22000), OptionRight::Put, dec!(210), -0.49),
            option(dec!(22000), OptionRight::Call, dec!(205), 0.51),
            option(dec!(22200), OptionRight::Call, dec!(160), 0.37),
            option(dec!(22500), OptionRight::Call, dec!(115), 0.26),
        ])
    }

    #[test]
    fn strangle_picks_legs_nearest_target_delta() {
        let config = AppConfig::default();
        let plan = plan_entry(&sample_chain(), &config.strategy, &config.risk_limits()).unwrap();

        let strikes: Vec<_> = plan.legs.iter().map(|(i, _)| i.strike().unwrap()).collect();
        assert_eq!(strikes, vec![dec!(22500), dec!(21500)]);
        // Sized to 16 lots by premium, then cut to 5 so that
        // 5 × (0.26 − 0.24) stays inside the 0.1 band.
        assert!(plan.legs.iter().all(|(_, q)| *q == -5));
        assert!((plan.expected_delta - (-0.1)).abs() < 1e-9);
    }

    #[test]
    fn straddle_picks_atm_strike() {
        let mut config = AppConfig::default();
        config.strategy.structure = EntryStructure::ShortStraddle;
        let plan = plan_entry(&sample_chain(), &config.strategy, &config.risk_limits()).unwrap();

        assert!(plan
            .legs
            .iter()
            .all(|(i, _)| i.strike() == Some(dec!(22000))));
        // 2000 / 210 → 9 lots; 9 × 0.02 = 0.18 > 0.1 → reduced to 5.
        assert!(plan.legs.iter().all(|(_, q)| *q == -5));
        assert!(plan.expected_delta.abs() <= 0.1 + 1e-9);
    }

    #[test]
    fn min_premium_filters_candidates() {
        let mut config = AppConfig::default();
        config.strategy.min_premium = dec!(150);
        let plan = plan_entry(&sample_chain(), &config.strategy, &config.risk_limits()).unwrap();

        let strikes: Vec<_> = plan.legs.iter().map(|(i, _)| i.strike().unwrap()).collect();
        assert_eq!(strikes, vec![dec!(22200), dec!(21800)]);
    }

    #[test]
    fn spread_breaks_delta_ties() {
        let config = AppConfig::default();
        let wide = option(dec!(22500), OptionRight::Call, dec!(100), 0.25)
            .with_spread(dec!(95), dec!(105));
        let tight = option(dec!(22600), OptionRight::Call, dec!(100), 0.25)
            .with_spread(dec!(99), dec!(101));
        let put = option(dec!(21500), OptionRight::Put, dec!(100), -0.25);

        let plan = plan_entry(
            &chain(vec![wide, tight.clone(), put]),
            &config.strategy,
            &config.risk_limits(),
        )
        .unwrap();
        assert_eq!(plan.legs[0].0, tight.instrument);
    }

    #[test]
    fn nothing_opens_when_one_lot_is_outside_the_band() {
        let config = AppConfig::default();
        let call = option(dec!(22500), OptionRight::Call, dec!(100), 0.45);
        let put = option(dec!(21500), OptionRight::Put, dec!(100), -0.25);

        assert!(plan_entry(&chain(vec![call, put]), &config.strategy, &config.risk_limits()).is_none());
    }

    #[test]
    fn empty_chain_plans_nothing() {
        let config = AppConfig::default();
        assert!(plan_entry(&chain(vec![]), &config.strategy, &config.risk_limits()).is_none());
    }

    #[test]
    fn watchlist_follows_hedge_instruments() {
        let mut config = AppConfig::default();
        config.strategy.hedge_candidates = 2;
        let plan = plan_entry(&sample_chain(), &config.strategy, &config.risk_limits()).unwrap();

        // Legs + two strikes at 22000 + the underlying.
        assert_eq!(plan.watchlist.len(), 5);
        assert!(plan.watchlist.contains(&Instrument::underlying("NIFTY")));

        config.strategy.hedge_with = HedgeInstrument::Underlying;
        let plan = plan_entry(&sample_chain(), &config.strategy, &config.risk_limits()).unwrap();
        assert_eq!(plan.watchlist.len(), 3);
    }

    #[test]
    fn fit_delta_respects_target_offset() {
        let mut config = AppConfig::default().strategy;
        config.target_delta = 0.5;
        // −q × (−0.1) = 0.1q must land in [0.4, 0.6] → q in 4..=6.
        assert_eq!(fit_delta(10, -0.1, &config), Some(6));
        assert_eq!(fit_delta(3, -0.1, &config), None);
    }
}
