//! Core types, adapter traits, errors and configuration shared by the
//! delta-neutral options manager and its execution adapters.

pub mod config;
pub mod config_loader;
pub mod error;
pub mod instrument;
pub mod orders;
pub mod position;
pub mod traits;

pub use config::{
    AppConfig, ConfigError, EntryStructure, HedgeInstrument, HedgeSizing, PaperConfig, RiskLimits,
    SessionConfig, StrategyConfig, TradingConfig, TradingHours, TradingMode,
};
pub use config_loader::ConfigLoader;
pub use error::TradingError;
pub use instrument::{Instrument, InstrumentKind, OptionChain, OptionRight, Quote};
pub use orders::{Fill, IntentId, IntentReason, OrderIntent, OrderSide, OrderType};
pub use position::{PortfolioSnapshot, Position, PositionExposure};
pub use traits::{MarketDataAdapter, OrderExecutor};
