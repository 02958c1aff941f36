//! Paper session over a CSV quote replay.
//!
//! Each replay frame is applied to the simulated market and followed by one
//! session tick, stamped with the frame's time of day. Ctrl+C is only
//! honored between ticks, so fills are never dropped mid-flight.

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use delta_neutral_core::{OrderExecutor, TradingMode};
use delta_neutral_execution::{SimulatedExecutor, SimulatedMarket};
use delta_neutral_options_manager::{EngineState, TradingSession};

/// Arguments for the paper session command.
#[derive(Args, Debug)]
pub struct PaperArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    pub config: String,

    /// Profile overlay (`Config.<profile>.toml` next to the base file)
    #[arg(long)]
    pub profile: Option<String>,

    /// Quote replay CSV
    #[arg(short, long)]
    pub quotes: String,

    /// Request a position open on the first tick
    #[arg(long)]
    pub open: bool,
}

pub async fn run(args: PaperArgs) -> Result<()> {
    let config = super::load_config(&args.config, args.profile.as_deref())?;
    if config.trading.mode == TradingMode::Live {
        bail!("live mode needs a brokerage gateway; this binary only runs paper sessions");
    }

    let market = Arc::new(
        SimulatedMarket::from_csv(&args.quotes)
            .with_context(|| format!("Failed to load quotes from {}", args.quotes))?,
    );
    let executor = SimulatedExecutor::new(Arc::clone(&market), config.paper.clone());
    let mut session = TradingSession::new(&config, Arc::clone(&market), executor);

    info!(
        quotes = %args.quotes,
        frames = market.remaining_frames(),
        open = args.open,
        "Paper session starting"
    );
    if args.open {
        session.request_open();
    }

    let (shutdown_tx, shutdown) = watch::channel(false);
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping after the current tick");
            shutdown_tx.send(true).ok();
        }
    });

    let result = replay(&mut session, &market, &shutdown).await;
    signal.abort();
    result?;

    let summary = session.summary();
    let open_positions = session.book().open_positions();
    println!();
    println!("Paper session finished");
    println!("  ticks          {} ({} skipped)", summary.ticks, summary.skipped_ticks);
    println!("  intents        {}", summary.intents);
    println!("  fills          {}", summary.fills);
    println!("  failures       {}", summary.failures);
    println!("  final state    {}", summary.final_state);
    println!("  realized P&L   {}", summary.realized_pnl);
    println!("  open positions {}", open_positions.len());
    for position in &open_positions {
        println!(
            "    {:<32} {:>6} @ {}",
            position.instrument.to_string(),
            position.quantity,
            position.avg_entry_price
        );
    }
    println!();

    Ok(())
}

/// Ticks once per replay frame until the frames run out, shutdown is
/// signalled, or the session halts flat.
async fn replay<X: OrderExecutor>(
    session: &mut TradingSession<Arc<SimulatedMarket>, X>,
    market: &SimulatedMarket,
    shutdown: &watch::Receiver<bool>,
) -> Result<()> {
    loop {
        if *shutdown.borrow() {
            info!(remaining = market.remaining_frames(), "Replay interrupted");
            return Ok(());
        }
        let Some(frame_at) = market.advance() else {
            return Ok(());
        };
        session
            .tick_at(frame_at.with_timezone(&Local).time())
            .await
            .context("Paper session aborted")?;
        if session.state() == EngineState::Halted && session.book().is_flat() {
            warn!(
                reason = ?session.engine().halt_reason(),
                "Session halted and flat; stopping replay"
            );
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn demo_session() -> (
        Arc<SimulatedMarket>,
        TradingSession<Arc<SimulatedMarket>, SimulatedExecutor>,
    ) {
        let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
        let config = super::super::load_config(
            root.join("config/Config.toml").to_str().unwrap(),
            None,
        )
        .unwrap();
        let market = Arc::new(SimulatedMarket::from_csv(root.join("demos/quotes.csv")).unwrap());
        let executor = SimulatedExecutor::new(Arc::clone(&market), config.paper.clone());
        let mut session = TradingSession::new(&config, Arc::clone(&market), executor);
        session.request_open();
        (market, session)
    }

    #[tokio::test]
    async fn shutdown_stops_before_next_frame() {
        let (market, mut session) = demo_session();
        let (_tx, shutdown) = watch::channel(true);

        replay(&mut session, &market, &shutdown).await.unwrap();
        assert_eq!(session.summary().ticks, 0);
        assert_eq!(market.remaining_frames(), 4);
    }

    #[tokio::test]
    async fn replay_runs_every_frame() {
        let (market, mut session) = demo_session();
        let (_tx, shutdown) = watch::channel(false);

        replay(&mut session, &market, &shutdown).await.unwrap();
        assert_eq!(session.summary().ticks, 4);
        assert_eq!(market.remaining_frames(), 0);
        assert!(session.summary().fills >= 2);
    }
}
