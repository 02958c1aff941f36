//! Config validation.
//!
//! Loads the file through the same layering the session uses and prints the
//! limits the risk controller will enforce.

use anyhow::Result;
use clap::Args;

/// Arguments for the config check command.
#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    pub config: String,

    /// Profile overlay (`Config.<profile>.toml` next to the base file)
    #[arg(long)]
    pub profile: Option<String>,
}

pub fn run(args: CheckConfigArgs) -> Result<()> {
    let config = super::load_config(&args.config, args.profile.as_deref())?;
    let limits = config.risk_limits();

    println!();
    println!("Config OK: {}", args.config);
    println!("  mode                 {:?}", config.trading.mode);
    println!("  underlying           {}", config.strategy.underlying);
    println!("  structure            {:?}", config.strategy.structure);
    println!("  capital              {}", limits.capital);
    println!("  stop loss            {}", limits.max_loss_amount());
    println!("  take profit          {}", limits.target_profit_amount());
    println!("  kill switch          {}", limits.kill_switch_loss());
    println!(
        "  delta band           {} ± {}",
        config.strategy.target_delta, limits.adjustment_threshold
    );
    println!("  hedge with           {:?}", config.strategy.hedge_with);
    println!("  hedge sizing         {:?}", config.strategy.hedge_sizing);
    println!(
        "  tick / timeout       {}s / {}ms",
        config.session.tick_interval_secs, config.session.adapter_timeout_ms
    );
    if let Some(hours) = &config.trading.trading_hours {
        println!("  trading hours        {}-{}", hours.start, hours.end);
    }
    println!();

    Ok(())
}
