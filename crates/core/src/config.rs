//! Session configuration.
//!
//! Loaded once at startup and treated as immutable for the session. Unknown
//! keys are rejected by serde, out-of-range values by [`AppConfig::validate`].

use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub trading: TradingConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Paper,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TradingConfig {
    pub mode: TradingMode,
    pub capital: Decimal,
    /// Stop-loss level as percent of capital (2.0 = 2%).
    pub max_loss_percentage: Decimal,
    /// Take-profit level as percent of capital.
    pub target_profit_percentage: Decimal,
    /// Kill switch fires when session loss exceeds this multiple of the
    /// stop-loss amount.
    #[serde(default = "default_kill_switch_multiple")]
    pub kill_switch_multiple: Decimal,
    /// Share of an intent's notional counted as potential loss by the risk
    /// controller.
    #[serde(default = "default_loss_stress_percentage")]
    pub loss_stress_percentage: Decimal,
    #[serde(default)]
    pub trading_hours: Option<TradingHours>,
}

/// Daily trading window, local exchange time, "HH:MM".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TradingHours {
    pub start: String,
    pub end: String,
}

impl TradingHours {
    /// Parsed `(start, end)` bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if either bound is not `HH:MM` or start is not before end.
    pub fn window(&self) -> Result<(NaiveTime, NaiveTime), ConfigError> {
        let parse = |field: &'static str, raw: &str| {
            NaiveTime::parse_from_str(raw, "%H:%M").map_err(|e| ConfigError::Invalid {
                field,
                reason: format!("'{raw}' is not HH:MM ({e})"),
            })
        };
        let start = parse("trading.trading_hours.start", &self.start)?;
        let end = parse("trading.trading_hours.end", &self.end)?;
        if start >= end {
            return Err(ConfigError::Invalid {
                field: "trading.trading_hours",
                reason: format!("start {start} must be before end {end}"),
            });
        }
        Ok((start, end))
    }

    /// Whether `time` falls inside the window (bounds inclusive). An
    /// unparsable window never contains anything.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.window()
            .map(|(start, end)| start <= time && time <= end)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStructure {
    #[default]
    ShortStrangle,
    ShortStraddle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HedgeInstrument {
    Underlying,
    Options,
    #[default]
    Both,
}

impl HedgeInstrument {
    #[must_use]
    pub const fn allows_underlying(self) -> bool {
        matches!(self, Self::Underlying | Self::Both)
    }

    #[must_use]
    pub const fn allows_options(self) -> bool {
        matches!(self, Self::Options | Self::Both)
    }
}

/// How far a hedge moves delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HedgeSizing {
    /// Quantity that lands closest to `target_delta`.
    #[default]
    ToTarget,
    /// Smallest quantity that gets back inside the threshold band.
    ToThreshold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    pub underlying: String,
    #[serde(default)]
    pub structure: EntryStructure,
    #[serde(default)]
    pub target_delta: f64,
    /// Delta deviation from target that triggers a rebalance.
    pub adjustment_threshold: f64,
    /// Multiplier on the risk-based lot count (1.0 = full size).
    pub position_sizing: Decimal,
    #[serde(default)]
    pub min_premium: Decimal,
    #[serde(default = "default_strangle_delta")]
    pub strangle_delta: f64,
    #[serde(default)]
    pub hedge_with: HedgeInstrument,
    #[serde(default)]
    pub hedge_sizing: HedgeSizing,
    /// Chain options near spot kept on the hedge watchlist.
    #[serde(default = "default_hedge_candidates")]
    pub hedge_candidates: usize,
    #[serde(default = "default_max_hedge_quantity")]
    pub max_hedge_quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    pub tick_interval_secs: u64,
    /// Budget for a single adapter call.
    pub adapter_timeout_ms: u64,
    /// Execution failures in a row before the session halts.
    pub max_consecutive_rejections: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5,
            adapter_timeout_ms: 2_000,
            max_consecutive_rejections: 3,
        }
    }
}

/// Simulated execution knobs. Zero slippage and full fills by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaperConfig {
    pub slippage_bps: Decimal,
    pub commission_per_lot: Decimal,
    /// Share of each order that fills (1.0 = complete fills).
    pub fill_ratio: Decimal,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            slippage_bps: Decimal::ZERO,
            commission_per_lot: Decimal::ZERO,
            fill_ratio: Decimal::ONE,
        }
    }
}

fn default_kill_switch_multiple() -> Decimal {
    Decimal::from(2)
}

fn default_loss_stress_percentage() -> Decimal {
    Decimal::from(5)
}

const fn default_strangle_delta() -> f64 {
    0.25
}

const fn default_hedge_candidates() -> usize {
    6
}

const fn default_max_hedge_quantity() -> i64 {
    50
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            trading: TradingConfig {
                mode: TradingMode::Paper,
                capital: Decimal::from(100_000),
                max_loss_percentage: Decimal::from(2),
                target_profit_percentage: Decimal::ONE,
                kill_switch_multiple: default_kill_switch_multiple(),
                loss_stress_percentage: default_loss_stress_percentage(),
                trading_hours: None,
            },
            strategy: StrategyConfig {
                underlying: "NIFTY".to_string(),
                structure: EntryStructure::default(),
                target_delta: 0.0,
                adjustment_threshold: 0.1,
                position_sizing: Decimal::ONE,
                min_premium: Decimal::ZERO,
                strangle_delta: default_strangle_delta(),
                hedge_with: HedgeInstrument::default(),
                hedge_sizing: HedgeSizing::default(),
                hedge_candidates: default_hedge_candidates(),
                max_hedge_quantity: default_max_hedge_quantity(),
            },
            session: SessionConfig::default(),
            paper: PaperConfig::default(),
        }
    }
}

/// Configuration rejected at load time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} = {value} is out of range ({expected})")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn check(ok: bool, field: &'static str, value: impl ToString, expected: &'static str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            expected,
        })
    }
}

impl AppConfig {
    /// Checks every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns the first field found out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.trading;
        let hundred = Decimal::ONE_HUNDRED;
        check(t.capital > Decimal::ZERO, "trading.capital", t.capital, "> 0")?;
        check(
            t.max_loss_percentage > Decimal::ZERO && t.max_loss_percentage <= hundred,
            "trading.max_loss_percentage",
            t.max_loss_percentage,
            "0 < x <= 100",
        )?;
        check(
            t.target_profit_percentage > Decimal::ZERO && t.target_profit_percentage <= hundred,
            "trading.target_profit_percentage",
            t.target_profit_percentage,
            "0 < x <= 100",
        )?;
        check(
            t.kill_switch_multiple >= Decimal::ONE,
            "trading.kill_switch_multiple",
            t.kill_switch_multiple,
            ">= 1",
        )?;
        check(
            t.loss_stress_percentage >= Decimal::ZERO && t.loss_stress_percentage <= hundred,
            "trading.loss_stress_percentage",
            t.loss_stress_percentage,
            "0 <= x <= 100",
        )?;
        if let Some(hours) = &t.trading_hours {
            hours.window()?;
        }

        let s = &self.strategy;
        if s.underlying.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "strategy.underlying",
                reason: "must not be empty".to_string(),
            });
        }
        check(s.target_delta.is_finite(), "strategy.target_delta", s.target_delta, "finite")?;
        check(
            s.adjustment_threshold.is_finite() && s.adjustment_threshold > 0.0,
            "strategy.adjustment_threshold",
            s.adjustment_threshold,
            "> 0",
        )?;
        check(
            s.position_sizing > Decimal::ZERO && s.position_sizing <= Decimal::TEN,
            "strategy.position_sizing",
            s.position_sizing,
            "0 < x <= 10",
        )?;
        check(s.min_premium >= Decimal::ZERO, "strategy.min_premium", s.min_premium, ">= 0")?;
        check(
            s.strangle_delta > 0.0 && s.strangle_delta < 1.0,
            "strategy.strangle_delta",
            s.strangle_delta,
            "0 < x < 1",
        )?;
        check(
            s.max_hedge_quantity >= 1,
            "strategy.max_hedge_quantity",
            s.max_hedge_quantity,
            ">= 1",
        )?;

        let sess = &self.session;
        check(
            sess.tick_interval_secs >= 1,
            "session.tick_interval_secs",
            sess.tick_interval_secs,
            ">= 1",
        )?;
        check(
            sess.adapter_timeout_ms >= 1,
            "session.adapter_timeout_ms",
            sess.adapter_timeout_ms,
            ">= 1",
        )?;
        check(
            sess.max_consecutive_rejections >= 1,
            "session.max_consecutive_rejections",
            sess.max_consecutive_rejections,
            ">= 1",
        )?;

        let p = &self.paper;
        check(p.slippage_bps >= Decimal::ZERO, "paper.slippage_bps", p.slippage_bps, ">= 0")?;
        check(
            p.commission_per_lot >= Decimal::ZERO,
            "paper.commission_per_lot",
            p.commission_per_lot,
            ">= 0",
        )?;
        check(
            p.fill_ratio > Decimal::ZERO && p.fill_ratio <= Decimal::ONE,
            "paper.fill_ratio",
            p.fill_ratio,
            "0 < x <= 1",
        )?;

        Ok(())
    }

    /// Risk limits for the session.
    #[must_use]
    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            capital: self.trading.capital,
            max_loss_percentage: self.trading.max_loss_percentage,
            target_profit_percentage: self.trading.target_profit_percentage,
            adjustment_threshold: self.strategy.adjustment_threshold,
            position_sizing: self.strategy.position_sizing,
            kill_switch_multiple: self.trading.kill_switch_multiple,
            loss_stress_percentage: self.trading.loss_stress_percentage,
        }
    }
}

/// Capital and loss limits. Immutable for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub capital: Decimal,
    pub max_loss_percentage: Decimal,
    pub target_profit_percentage: Decimal,
    pub adjustment_threshold: f64,
    pub position_sizing: Decimal,
    pub kill_switch_multiple: Decimal,
    pub loss_stress_percentage: Decimal,
}

impl RiskLimits {
    /// Stop-loss amount in currency.
    #[must_use]
    pub fn max_loss_amount(&self) -> Decimal {
        self.capital * self.max_loss_percentage / Decimal::ONE_HUNDRED
    }

    /// Take-profit amount in currency.
    #[must_use]
    pub fn target_profit_amount(&self) -> Decimal {
        self.capital * self.target_profit_percentage / Decimal::ONE_HUNDRED
    }

    /// Loss beyond which the kill switch fires.
    #[must_use]
    pub fn kill_switch_loss(&self) -> Decimal {
        self.max_loss_amount() * self.kill_switch_multiple
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn limit_amounts() {
        let limits = AppConfig::default().risk_limits();
        assert_eq!(limits.max_loss_amount(), dec!(2000));
        assert_eq!(limits.target_profit_amount(), dec!(1000));
        assert_eq!(limits.kill_switch_loss(), dec!(4000));
    }

    #[test]
    fn rejects_out_of_range_loss_percentage() {
        let mut config = AppConfig::default();
        config.trading.max_loss_percentage = dec!(150);
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                field: "trading.max_loss_percentage",
                ..
            }
        ));
    }

    #[test]
    fn rejects_zero_threshold_and_bad_fill_ratio() {
        let mut config = AppConfig::default();
        config.strategy.adjustment_threshold = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.paper.fill_ratio = dec!(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn trading_hours_window() {
        let hours = TradingHours {
            start: "09:15".to_string(),
            end: "15:30".to_string(),
        };
        assert!(hours.contains(NaiveTime::from_hms_opt(9, 15, 0).unwrap()));
        assert!(hours.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(!hours.contains(NaiveTime::from_hms_opt(15, 31, 0).unwrap()));

        let inverted = TradingHours {
            start: "15:30".to_string(),
            end: "09:15".to_string(),
        };
        assert!(inverted.window().is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let json = r#"{
            "trading": {"mode": "paper", "capital": 100000, "max_loss_percentage": 2,
                        "target_profit_percentage": 1, "leverage": 5},
            "strategy": {"underlying": "NIFTY", "adjustment_threshold": 0.1, "position_sizing": 1}
        }"#;
        assert!(serde_json::from_str::<AppConfig>(json).is_err());
    }
}
