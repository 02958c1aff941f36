//! Paper trading execution.
//!
//! Fills against the shared [`SimulatedMarket`] without touching a broker.
//! Market orders fill at the last quoted price (plus optional slippage),
//! limit orders at their limit price.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use delta_neutral_core::{
    Fill, OrderExecutor, OrderIntent, OrderSide, OrderType, PaperConfig, TradingError,
};

use crate::market::SimulatedMarket;

pub struct SimulatedExecutor {
    market: Arc<SimulatedMarket>,
    config: PaperConfig,
}

impl SimulatedExecutor {
    #[must_use]
    pub fn new(market: Arc<SimulatedMarket>, config: PaperConfig) -> Self {
        Self { market, config }
    }

    fn apply_slippage(&self, price: Decimal, side: OrderSide) -> Decimal {
        let slippage = price * self.config.slippage_bps / Decimal::from(10_000);
        match side {
            OrderSide::Buy => price + slippage,
            OrderSide::Sell => price - slippage,
        }
    }

    /// Lots that fill under the configured fill ratio; at least one.
    fn filled_lots(&self, requested: i64) -> i64 {
        let lots = (Decimal::from(requested.abs()) * self.config.fill_ratio)
            .floor()
            .to_i64()
            .unwrap_or(0);
        lots.clamp(1, requested.abs())
    }
}

#[async_trait]
impl OrderExecutor for SimulatedExecutor {
    async fn submit(&self, intent: &OrderIntent) -> Result<Fill, TradingError> {
        if intent.quantity == 0 {
            return Err(TradingError::Rejected("zero quantity".to_string()));
        }

        let quote = self.market.quote(&intent.instrument).ok_or_else(|| {
            TradingError::Rejected(format!("no market data available for {}", intent.instrument))
        })?;

        let price = match &intent.order_type {
            OrderType::Market => self.apply_slippage(quote.last, intent.side()),
            OrderType::Limit { price } => *price,
        };

        let lots = self.filled_lots(intent.quantity);
        let fill = Fill {
            intent_id: intent.id,
            instrument: intent.instrument.clone(),
            quantity: lots * intent.quantity.signum(),
            price,
            commission: self.config.commission_per_lot * Decimal::from(lots),
            filled_at: Utc::now(),
        };

        info!(
            intent_id = %fill.intent_id,
            instrument = %fill.instrument,
            requested = intent.quantity,
            filled = fill.quantity,
            price = %fill.price,
            "Paper fill simulated"
        );

        Ok(fill)
    }

    fn name(&self) -> &str {
        "paper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delta_neutral_core::{Instrument, IntentReason, Quote};
    use rust_decimal_macros::dec;

    fn market_with_spot(price: Decimal) -> (Arc<SimulatedMarket>, Instrument) {
        let market = Arc::new(SimulatedMarket::new());
        let spot = Instrument::underlying("NIFTY");
        market.upsert(Quote::new(spot.clone(), price, 1.0, Utc::now()));
        (market, spot)
    }

    #[tokio::test]
    async fn fills_at_quote_without_slippage_by_default() {
        let (market, spot) = market_with_spot(dec!(22000));
        let executor = SimulatedExecutor::new(market, PaperConfig::default());

        let intent = OrderIntent::market(spot, -3, IntentReason::Hedge);
        let fill = executor.submit(&intent).await.unwrap();

        assert_eq!(fill.intent_id, intent.id);
        assert_eq!(fill.quantity, -3);
        assert_eq!(fill.price, dec!(22000));
        assert_eq!(fill.commission, Decimal::ZERO);
    }

    #[tokio::test]
    async fn slippage_and_commission_applied() {
        let (market, spot) = market_with_spot(dec!(20000));
        let config = PaperConfig {
            slippage_bps: dec!(5),
            commission_per_lot: dec!(20),
            fill_ratio: Decimal::ONE,
        };
        let executor = SimulatedExecutor::new(market, config);

        let fill = executor
            .submit(&OrderIntent::market(spot.clone(), 2, IntentReason::Hedge))
            .await
            .unwrap();
        assert_eq!(fill.price, dec!(20010));
        assert_eq!(fill.commission, dec!(40));

        let fill = executor
            .submit(&OrderIntent::market(spot, -1, IntentReason::Hedge))
            .await
            .unwrap();
        assert_eq!(fill.price, dec!(19990));
    }

    #[tokio::test]
    async fn limit_fills_at_limit_without_slippage() {
        let (market, spot) = market_with_spot(dec!(22000));
        let config = PaperConfig {
            slippage_bps: dec!(5),
            ..PaperConfig::default()
        };
        let executor = SimulatedExecutor::new(market, config);

        let intent = OrderIntent::limit(spot, 2, dec!(21990), IntentReason::Hedge);
        let fill = executor.submit(&intent).await.unwrap();
        assert_eq!(fill.quantity, 2);
        assert_eq!(fill.price, dec!(21990));
    }

    #[tokio::test]
    async fn partial_fill_ratio() {
        let (market, spot) = market_with_spot(dec!(100));
        let config = PaperConfig {
            fill_ratio: dec!(0.6),
            ..PaperConfig::default()
        };
        let executor = SimulatedExecutor::new(market, config);

        let fill = executor
            .submit(&OrderIntent::market(spot.clone(), 10, IntentReason::Open))
            .await
            .unwrap();
        assert_eq!(fill.quantity, 6);

        // Never rounds a single lot down to nothing.
        let fill = executor
            .submit(&OrderIntent::market(spot, -1, IntentReason::Open))
            .await
            .unwrap();
        assert_eq!(fill.quantity, -1);
    }

    #[tokio::test]
    async fn rejects_unquoted_instrument() {
        let executor = SimulatedExecutor::new(Arc::new(SimulatedMarket::new()), PaperConfig::default());
        let intent = OrderIntent::market(Instrument::underlying("BANKNIFTY"), 1, IntentReason::Hedge);
        let err = executor.submit(&intent).await.unwrap_err();
        assert!(matches!(err, TradingError::Rejected(_)));
    }
}
