use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use std::path::Path;
use tracing::{info, warn};

/// Environment variable prefix; `DN_TRADING__CAPITAL=50000` overrides
/// `trading.capital`.
pub const ENV_PREFIX: &str = "DN_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the session configuration from a TOML file, then environment
    /// overrides, then validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, contains
    /// unknown keys, or fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        let config: AppConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        config.validate()?;
        info!(path = %path.display(), mode = ?config.trading.mode, "Config loaded");
        Ok(config)
    }

    /// Like [`ConfigLoader::load`], with a profile file (`Config.<profile>.toml`
    /// next to the base file) and an optional JSON override file joined last.
    ///
    /// # Errors
    ///
    /// Returns an error if any source cannot be parsed or validation fails.
    pub fn load_with_profile(path: impl AsRef<Path>, profile: &str) -> Result<AppConfig> {
        let path = path.as_ref();
        let profile_path = path.with_extension(format!("{profile}.toml"));
        let json_path = path.with_extension("json");
        if !profile_path.exists() {
            warn!(
                profile,
                path = %profile_path.display(),
                "Profile file not found; using base config"
            );
        }

        let config: AppConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Toml::file(&profile_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .join(Json::file(&json_path))
            .extract()
            .with_context(|| {
                format!(
                    "Failed to load config from {} (profile {profile})",
                    path.display()
                )
            })?;

        config.validate()?;
        info!(
            path = %path.display(),
            profile,
            mode = ?config.trading.mode,
            "Config loaded"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HedgeSizing, TradingMode};
    use figment::Jail;
    use rust_decimal_macros::dec;

    const BASE: &str = r#"
        [trading]
        mode = "paper"
        capital = 100000
        max_loss_percentage = 2.0
        target_profit_percentage = 1.0

        [strategy]
        underlying = "NIFTY"
        adjustment_threshold = 0.1
        position_sizing = 0.5
        hedge_sizing = "to_threshold"
    "#;

    #[test]
    fn loads_toml_with_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("Config.toml", BASE)?;
            let config = ConfigLoader::load("Config.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.trading.mode, TradingMode::Paper);
            assert_eq!(config.trading.capital, dec!(100000));
            assert_eq!(config.strategy.hedge_sizing, HedgeSizing::ToThreshold);
            assert_eq!(config.session.max_consecutive_rejections, 3);
            assert_eq!(config.paper.fill_ratio, dec!(1));
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("Config.toml", BASE)?;
            jail.set_env("DN_TRADING__CAPITAL", "50000");
            let config = ConfigLoader::load("Config.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.trading.capital, dec!(50000));
            Ok(())
        });
    }

    #[test]
    fn profile_file_overrides_base() {
        Jail::expect_with(|jail| {
            jail.create_file("Config.toml", BASE)?;
            jail.create_file("Config.live.toml", "[trading]\nmode = \"live\"\n")?;
            let config =
                ConfigLoader::load_with_profile("Config.toml", "live").map_err(|e| e.to_string())?;
            assert_eq!(config.trading.mode, TradingMode::Live);
            Ok(())
        });
    }

    #[test]
    fn missing_profile_file_falls_back_to_base() {
        Jail::expect_with(|jail| {
            jail.create_file("Config.toml", BASE)?;
            let config =
                ConfigLoader::load_with_profile("Config.toml", "staging").map_err(|e| e.to_string())?;
            assert_eq!(config.trading.mode, TradingMode::Paper);
            assert_eq!(config.trading.capital, dec!(100000));
            Ok(())
        });
    }

    #[test]
    fn out_of_range_value_fails_at_load() {
        Jail::expect_with(|jail| {
            jail.create_file("Config.toml", &BASE.replace("position_sizing = 0.5", "position_sizing = 0"))?;
            assert!(ConfigLoader::load("Config.toml").is_err());
            Ok(())
        });
    }
}
