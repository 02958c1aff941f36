//! Order execution variants and the paper market feed.
//!
//! Two [`OrderExecutor`](delta_neutral_core::OrderExecutor) implementations:
//! - [`SimulatedExecutor`]: paper fills against [`SimulatedMarket`] quotes
//! - [`BrokerageExecutor`]: live orders through an external [`BrokerGateway`]
//!
//! The options manager is written against the trait only and never learns
//! which one is active.

pub mod brokerage;
pub mod market;
pub mod paper;
pub mod types;

pub use brokerage::{BrokerGateway, BrokerageConfig, BrokerageExecutor};
pub use market::SimulatedMarket;
pub use paper::SimulatedExecutor;
pub use types::{BrokerOrder, OrderState, OrderStatus};
