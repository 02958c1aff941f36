//! Delta-neutral options position management.
//!
//! Runs a tick-driven session that:
//! - Aggregates portfolio greeks and P&L from the latest quotes
//! - Opens a short strangle or straddle on an operator trigger
//! - Hedges back inside the delta band when the book skews
//! - Enforces the capital cap, the session loss limit and the profit target
//! - Liquidates and halts on kill switch or sustained execution failure
//!
//! All decisions are deterministic; adapters are reached only through the
//! [`MarketDataAdapter`](delta_neutral_core::MarketDataAdapter) and
//! [`OrderExecutor`](delta_neutral_core::OrderExecutor) traits.
//!
//! # Modules
//!
//! - [`greeks`]: Portfolio aggregation
//! - [`positions`]: Fill accounting and pending intents
//! - [`risk`]: Pre-trade review and the kill switch
//! - [`strategy`]: The engine state machine
//! - [`service`]: The session loop

pub mod allocation;
pub mod entry;
pub mod greeks;
pub mod hedge;
pub mod positions;
pub mod report;
pub mod risk;
pub mod service;
pub mod stops;
pub mod strategy;
pub mod targets;
pub mod types;

pub use positions::PositionManager;
pub use report::{IntentRecord, TickReport};
pub use risk::RiskController;
pub use service::TradingSession;
pub use strategy::{MarketView, StrategyEngine};
pub use types::{
    CloseReason, Disposition, EngineState, Execution, HaltReason, SessionSummary, Verdict,
};
