//! In-memory market for paper trading.
//!
//! Holds the latest quote per instrument and, optionally, a CSV replay that
//! is stepped one timestamp at a time. Shared (via `Arc`) between the paper
//! feed and the simulated executor so both see the same prices.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::debug;

use delta_neutral_core::{
    Instrument, MarketDataAdapter, OptionChain, OptionRight, Quote, TradingError,
};

#[derive(Debug, Default)]
struct QuoteBook {
    quotes: BTreeMap<Instrument, Quote>,
    /// Pending replay frames, oldest first.
    frames: Vec<(DateTime<Utc>, Vec<Quote>)>,
    cursor: usize,
}

/// Paper quote book implementing [`MarketDataAdapter`].
#[derive(Debug, Default)]
pub struct SimulatedMarket {
    book: RwLock<QuoteBook>,
}

/// One CSV replay row:
/// `timestamp,underlying,kind,strike,expiry,right,multiplier,last,delta,bid,ask`.
#[derive(Debug, Deserialize)]
struct ReplayRow {
    timestamp: DateTime<Utc>,
    underlying: String,
    kind: RowKind,
    strike: Option<Decimal>,
    expiry: Option<NaiveDate>,
    right: Option<OptionRight>,
    multiplier: Option<Decimal>,
    last: Decimal,
    delta: f64,
    bid: Option<Decimal>,
    ask: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RowKind {
    Underlying,
    Option,
}

impl ReplayRow {
    fn into_quote(self, line: usize) -> Result<Quote> {
        let instrument = match self.kind {
            RowKind::Underlying => Instrument::underlying(&self.underlying),
            RowKind::Option => {
                let strike = self.strike.with_context(|| format!("row {line}: option without strike"))?;
                let expiry = self.expiry.with_context(|| format!("row {line}: option without expiry"))?;
                let right = self.right.with_context(|| format!("row {line}: option without right"))?;
                Instrument::option(
                    &self.underlying,
                    expiry,
                    strike,
                    right,
                    self.multiplier.unwrap_or(Decimal::ONE),
                )
            }
        };

        let mut quote = Quote::new(instrument, self.last, self.delta, self.timestamp);
        if let (Some(bid), Some(ask)) = (self.bid, self.ask) {
            quote = quote.with_spread(bid, ask);
        }
        Ok(quote)
    }
}

impl SimulatedMarket {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a replay from CSV. Rows are grouped into frames by timestamp;
    /// nothing is quoted until [`SimulatedMarket::advance`] is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a row is malformed.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open replay {}", path.display()))?;

        let mut frames: BTreeMap<DateTime<Utc>, Vec<Quote>> = BTreeMap::new();
        for (index, row) in reader.deserialize::<ReplayRow>().enumerate() {
            let line = index + 2; // header is line 1
            let row = row.with_context(|| format!("Malformed replay row {line}"))?;
            let quote = row.into_quote(line)?;
            frames.entry(quote.timestamp).or_default().push(quote);
        }

        debug!(path = %path.display(), frames = frames.len(), "Loaded quote replay");

        Ok(Self {
            book: RwLock::new(QuoteBook {
                quotes: BTreeMap::new(),
                frames: frames.into_iter().collect(),
                cursor: 0,
            }),
        })
    }

    /// Inserts or replaces the quote for its instrument.
    pub fn upsert(&self, quote: Quote) {
        self.book.write().quotes.insert(quote.instrument.clone(), quote);
    }

    /// Stops quoting `instrument`.
    pub fn remove(&self, instrument: &Instrument) {
        self.book.write().quotes.remove(instrument);
    }

    /// Latest quote for `instrument`, if any.
    #[must_use]
    pub fn quote(&self, instrument: &Instrument) -> Option<Quote> {
        self.book.read().quotes.get(instrument).cloned()
    }

    /// Applies the next replay frame. Returns its timestamp, or `None` when
    /// the replay is exhausted.
    pub fn advance(&self) -> Option<DateTime<Utc>> {
        let mut book = self.book.write();
        let (timestamp, quotes) = book.frames.get(book.cursor).cloned()?;
        book.cursor += 1;
        for quote in quotes {
            book.quotes.insert(quote.instrument.clone(), quote);
        }
        Some(timestamp)
    }

    /// Replay frames not yet applied.
    #[must_use]
    pub fn remaining_frames(&self) -> usize {
        let book = self.book.read();
        book.frames.len() - book.cursor
    }
}

#[async_trait]
impl MarketDataAdapter for SimulatedMarket {
    async fn get_quotes(
        &self,
        instruments: &BTreeSet<Instrument>,
    ) -> Result<HashMap<Instrument, Quote>, TradingError> {
        let book = self.book.read();
        instruments
            .iter()
            .map(|instrument| {
                book.quotes
                    .get(instrument)
                    .map(|q| (instrument.clone(), q.clone()))
                    .ok_or_else(|| TradingError::missing_quote(instrument))
            })
            .collect()
    }

    async fn option_chain(&self, underlying: &str) -> Result<OptionChain, TradingError> {
        let spot_instrument = Instrument::underlying(underlying);
        let book = self.book.read();
        let spot = book
            .quotes
            .get(&spot_instrument)
            .ok_or_else(|| TradingError::missing_quote(&spot_instrument))?;

        let quotes: Vec<Quote> = book
            .quotes
            .values()
            .filter(|q| q.instrument.is_option() && q.instrument.underlying == spot_instrument.underlying)
            .cloned()
            .collect();

        Ok(OptionChain {
            underlying: spot_instrument.clone(),
            spot: spot.last,
            quotes,
            as_of: spot.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    const REPLAY: &str = "\
timestamp,underlying,kind,strike,expiry,right,multiplier,last,delta,bid,ask
2026-03-02T09:15:00Z,NIFTY,underlying,,,,,22000,1.0,,
2026-03-02T09:15:00Z,NIFTY,option,22200,2026-03-26,call,50,110,0.30,109,111
2026-03-02T09:15:00Z,NIFTY,option,21800,2026-03-26,put,50,105,-0.28,104,106
2026-03-02T09:16:00Z,NIFTY,underlying,,,,,22080,1.0,,
";

    fn write_replay() -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("dn-replay-{}.csv", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(REPLAY.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn replay_steps_frame_by_frame() {
        let path = write_replay();
        let market = SimulatedMarket::from_csv(&path).unwrap();
        assert_eq!(market.remaining_frames(), 2);

        let spot = Instrument::underlying("NIFTY");
        assert!(market.quote(&spot).is_none());

        market.advance().unwrap();
        assert_eq!(market.quote(&spot).unwrap().last, dec!(22000));
        let chain = market.option_chain("NIFTY").await.unwrap();
        assert_eq!(chain.spot, dec!(22000));
        assert_eq!(chain.quotes.len(), 2);
        assert_eq!(chain.of_right(OptionRight::Put).count(), 1);

        market.advance().unwrap();
        assert_eq!(market.quote(&spot).unwrap().last, dec!(22080));
        assert!(market.advance().is_none());

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn missing_instrument_fails_whole_request() {
        let market = SimulatedMarket::new();
        let spot = Instrument::underlying("NIFTY");
        market.upsert(Quote::new(spot.clone(), dec!(22000), 1.0, Utc::now()));

        let expiry = NaiveDate::from_ymd_opt(2026, 3, 26).unwrap();
        let call = Instrument::option("NIFTY", expiry, dec!(22200), OptionRight::Call, dec!(50));
        let request: BTreeSet<_> = [spot, call.clone()].into_iter().collect();

        let err = market.get_quotes(&request).await.unwrap_err();
        assert_eq!(err, TradingError::missing_quote(&call));
    }
}
