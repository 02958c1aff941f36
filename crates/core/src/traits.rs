use crate::error::TradingError;
use crate::instrument::{Instrument, OptionChain, Quote};
use crate::orders::{Fill, OrderIntent};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Source of quotes and option chains.
#[async_trait]
pub trait MarketDataAdapter: Send + Sync {
    /// Current quote for every requested instrument.
    ///
    /// # Errors
    ///
    /// `MissingQuote` if any instrument is not quoted, `AdapterTimeout` if
    /// the feed does not answer.
    async fn get_quotes(
        &self,
        instruments: &BTreeSet<Instrument>,
    ) -> Result<HashMap<Instrument, Quote>, TradingError>;

    /// Chain of listed options on `underlying` with spot.
    ///
    /// # Errors
    ///
    /// `MissingQuote` for an unknown underlying, `AdapterTimeout` if the feed
    /// does not answer.
    async fn option_chain(&self, underlying: &str) -> Result<OptionChain, TradingError>;
}

/// Order execution capability. The core never knows whether fills are
/// simulated or real.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Executes `intent` and reports what filled. The fill may be partial.
    ///
    /// # Errors
    ///
    /// `Rejected` if the venue refuses the order, `AdapterTimeout` if
    /// nothing filled within the budget.
    async fn submit(&self, intent: &OrderIntent) -> Result<Fill, TradingError>;

    fn name(&self) -> &str;
}

#[async_trait]
impl<T: MarketDataAdapter + ?Sized> MarketDataAdapter for Arc<T> {
    async fn get_quotes(
        &self,
        instruments: &BTreeSet<Instrument>,
    ) -> Result<HashMap<Instrument, Quote>, TradingError> {
        (**self).get_quotes(instruments).await
    }

    async fn option_chain(&self, underlying: &str) -> Result<OptionChain, TradingError> {
        (**self).option_chain(underlying).await
    }
}

#[async_trait]
impl<T: OrderExecutor + ?Sized> OrderExecutor for Arc<T> {
    async fn submit(&self, intent: &OrderIntent) -> Result<Fill, TradingError> {
        (**self).submit(intent).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
