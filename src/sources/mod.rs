//! Source adapters — one independent producer per signal family.
//!
//! Each family is a trait with a single `fetch` operation and one production
//! implementation talking to a public endpoint. A decision request fans out
//! every family concurrently; each call is bounded by its own deadline and
//! retry policy, and a missed family simply contributes its neutral default
//! downstream. Nothing here blocks the whole decision on one slow source.

pub mod ai;
pub mod candles;
pub mod futures_data;
pub mod gas;
pub mod macro_data;
pub mod news;
pub mod orderbook;
pub mod prediction_market;
pub mod sentiment;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, warn};

/// Sentinel error message marking a family that is configured off, as
/// opposed to one that failed.
const DISABLED: &str = "disabled";

use crate::config::AdapterConfig;
use crate::types::{
    AiPrediction, Candle, GasQuote, MarketSnapshot, NewsItem, OrderBookSnapshot,
};

pub use ai::{AiPredictor, PredictorContext};
pub use candles::CandleSource;
pub use futures_data::FuturesSource;
pub use gas::GasSource;
pub use macro_data::MacroSource;
pub use news::NewsSource;
pub use orderbook::OrderBookSource;
pub use prediction_market::PredictionMarketSource;
pub use sentiment::SentimentSource;

// ---------------------------------------------------------------------------
// TTL cache
// ---------------------------------------------------------------------------

/// A single cache entry with expiration.
#[derive(Clone)]
struct CacheEntry<T: Clone> {
    data: T,
    expires_at: Instant,
}

impl<T: Clone> CacheEntry<T> {
    fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Read-mostly per-family cache keyed `(symbol, family, minute-bucket)`.
/// Owned by the service layer and passed explicitly — there is no
/// module-level state.
#[derive(Default)]
struct SnapshotCache {
    candles: HashMap<String, CacheEntry<Vec<Candle>>>,
    order_book: HashMap<String, CacheEntry<OrderBookSnapshot>>,
    gas: HashMap<String, CacheEntry<GasQuote>>,
    news: HashMap<String, CacheEntry<Vec<NewsItem>>>,
}

// ---------------------------------------------------------------------------
// SourceSet
// ---------------------------------------------------------------------------

/// The full adapter collection for one deployment. Tests and the backtester
/// swap individual families for stubs; `None` disables a family entirely
/// (missing API key, offline run) and yields neutral features.
pub struct SourceSet {
    pub candles: Option<Arc<dyn CandleSource>>,
    pub order_book: Option<Arc<dyn OrderBookSource>>,
    pub gas: Option<Arc<dyn GasSource>>,
    pub news: Option<Arc<dyn NewsSource>>,
    pub sentiment: Option<Arc<dyn SentimentSource>>,
    pub macro_data: Option<Arc<dyn MacroSource>>,
    pub futures: Option<Arc<dyn FuturesSource>>,
    pub prediction_market: Option<Arc<dyn PredictionMarketSource>>,
    pub predictors: Vec<Arc<dyn AiPredictor>>,
    config: AdapterConfig,
    cache: Mutex<SnapshotCache>,
}

impl SourceSet {
    /// Empty set: every family disabled. The integrator turns this into the
    /// exact neutral vector.
    pub fn disabled(config: AdapterConfig) -> Self {
        Self {
            candles: None,
            order_book: None,
            gas: None,
            news: None,
            sentiment: None,
            macro_data: None,
            futures: None,
            prediction_market: None,
            predictors: Vec::new(),
            config,
            cache: Mutex::new(SnapshotCache::default()),
        }
    }

    /// Production set: every family backed by its public endpoint. Families
    /// whose `<SOURCE>_API_KEY` is required but missing stay disabled.
    pub fn production(config: AdapterConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.default_deadline_secs))
            .build()
            .expect("reqwest client should build");

        let news: Option<Arc<dyn NewsSource>> =
            news::NewsApiSource::from_env(client.clone(), &config)
                .map(|s| Arc::new(s) as Arc<dyn NewsSource>);

        let predictors = ai::predictors_from_env(client.clone());

        Self {
            candles: Some(Arc::new(candles::BinanceCandles::new(
                client.clone(),
                config.candle_interval.clone(),
                config.candle_limit,
            ))),
            order_book: Some(Arc::new(orderbook::BinanceOrderBook::new(
                client.clone(),
                config.order_book_depth,
            ))),
            gas: Some(Arc::new(gas::PublicGasSource::from_env(client.clone()))),
            news,
            sentiment: Some(Arc::new(sentiment::AlternativeMeSentiment::new(
                client.clone(),
            ))),
            macro_data: Some(Arc::new(macro_data::YahooMacroSource::new(client.clone()))),
            futures: Some(Arc::new(futures_data::BinanceFutures::new(client.clone()))),
            prediction_market: Some(Arc::new(prediction_market::PolymarketSource::new(client))),
            predictors,
            config,
            cache: Mutex::new(SnapshotCache::default()),
        }
    }

    /// Builder-style replacement used by tests and the full-system backtest.
    pub fn with_candles(mut self, source: Arc<dyn CandleSource>) -> Self {
        self.candles = Some(source);
        self
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    /// Fetch every enabled family concurrently. Arrival order is irrelevant;
    /// each family is independently retried and deadline-bounded, and a
    /// failure leaves its slot `None`.
    pub async fn fetch_all(&self, symbol: &str, now: i64) -> MarketSnapshot {
        let bucket = now / 60_000;

        // Cache hits short-circuit the network for the hot families.
        let cached = self.cached_families(symbol, bucket);

        let (candles, order_book, gas, news, sentiment, macro_data, futures, prediction_market) = tokio::join!(
            self.fetch_family("candles", cached.0, || async {
                self.candles
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!(DISABLED))?
                    .fetch(symbol, now)
                    .await
            }),
            self.fetch_family("order_book", cached.1, || async {
                self.order_book
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!(DISABLED))?
                    .fetch(symbol, now)
                    .await
            }),
            self.fetch_family("gas", cached.2, || async {
                self.gas
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!(DISABLED))?
                    .fetch(symbol, now)
                    .await
            }),
            self.fetch_family("news", cached.3, || async {
                self.news
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!(DISABLED))?
                    .fetch(symbol, now)
                    .await
            }),
            self.fetch_family("sentiment", None, || async {
                self.sentiment
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!(DISABLED))?
                    .fetch(symbol, now)
                    .await
            }),
            self.fetch_family("macro", None, || async {
                self.macro_data
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!(DISABLED))?
                    .fetch(symbol, now)
                    .await
            }),
            self.fetch_family("futures", None, || async {
                self.futures
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!(DISABLED))?
                    .fetch(symbol, now)
                    .await
            }),
            self.fetch_family("prediction_market", None, || async {
                self.prediction_market
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!(DISABLED))?
                    .fetch(symbol, now)
                    .await
            }),
        );

        self.store_cached(symbol, bucket, &candles, &order_book, &gas, &news);

        // Predictors run after the data families: they consume a context
        // digest of what actually arrived.
        let ai_predictions = self
            .run_predictors(&candles, &news, &sentiment)
            .await;

        MarketSnapshot {
            candles,
            order_book,
            gas,
            news,
            sentiment,
            macro_data,
            futures,
            prediction_market,
            ai_predictions,
        }
    }

    /// Retry-with-backoff wrapper bounded by the family deadline. A disabled
    /// family resolves to `None` immediately without logging noise.
    async fn fetch_family<T, F, Fut>(
        &self,
        family: &'static str,
        cached: Option<T>,
        fetch: F,
    ) -> Option<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if let Some(hit) = cached {
            debug!(family, "adapter cache hit");
            return Some(hit);
        }

        let deadline = self.config.deadline_for(family);
        let attempts = self.config.retries.max(1);

        let work = async {
            for attempt in 0..attempts {
                match fetch().await {
                    Ok(value) => return Some(value),
                    Err(e) if e.to_string() == DISABLED => return None,
                    Err(e) => {
                        debug!(family, attempt, error = %e, "adapter attempt failed");
                        if attempt + 1 < attempts {
                            let backoff = Duration::from_millis(
                                self.config.backoff_base_ms * (1u64 << attempt),
                            );
                            tokio::time::sleep(backoff).await;
                        }
                    }
                }
            }
            warn!(family, attempts, "adapter failed after retries");
            None
        };

        match tokio::time::timeout(deadline, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(family, deadline_secs = deadline.as_secs(), "adapter deadline exceeded");
                None
            }
        }
    }

    async fn run_predictors(
        &self,
        candles: &Option<Vec<Candle>>,
        news: &Option<Vec<NewsItem>>,
        sentiment: &Option<crate::types::SentimentSnapshot>,
    ) -> Option<Vec<AiPrediction>> {
        if self.predictors.is_empty() {
            return None;
        }

        let ctx = PredictorContext::from_families(candles.as_deref(), news.as_deref(), sentiment);
        let deadline = self.config.deadline_for("ai");

        let mut predictions = Vec::with_capacity(self.predictors.len());
        let futs = self
            .predictors
            .iter()
            .map(|p| {
                let ctx = ctx.clone();
                let p = p.clone();
                async move {
                    match tokio::time::timeout(deadline, p.predict(&ctx)).await {
                        Ok(Ok(pred)) => Some(pred),
                        Ok(Err(e)) => {
                            debug!(predictor = p.name(), error = %e, "predictor failed");
                            None
                        }
                        Err(_) => {
                            debug!(predictor = p.name(), "predictor deadline exceeded");
                            None
                        }
                    }
                }
            })
            .collect::<Vec<_>>();

        for result in futures_join_all(futs).await {
            if let Some(pred) = result {
                predictions.push(pred);
            }
        }

        if predictions.is_empty() {
            None
        } else {
            Some(predictions)
        }
    }

    // -----------------------------------------------------------------------
    // Cache plumbing
    // -----------------------------------------------------------------------

    #[allow(clippy::type_complexity)]
    fn cached_families(
        &self,
        symbol: &str,
        bucket: i64,
    ) -> (
        Option<Vec<Candle>>,
        Option<OrderBookSnapshot>,
        Option<GasQuote>,
        Option<Vec<NewsItem>>,
    ) {
        let cache = self.cache.lock().expect("cache lock poisoned");
        let key = |family: &str| format!("{symbol}:{family}:{bucket}");

        (
            cache
                .candles
                .get(&key("candles"))
                .filter(|e| e.is_valid())
                .map(|e| e.data.clone()),
            cache
                .order_book
                .get(&key("order_book"))
                .filter(|e| e.is_valid())
                .map(|e| e.data.clone()),
            cache
                .gas
                .get(&key("gas"))
                .filter(|e| e.is_valid())
                .map(|e| e.data.clone()),
            cache
                .news
                .get(&key("news"))
                .filter(|e| e.is_valid())
                .map(|e| e.data.clone()),
        )
    }

    fn store_cached(
        &self,
        symbol: &str,
        bucket: i64,
        candles: &Option<Vec<Candle>>,
        order_book: &Option<OrderBookSnapshot>,
        gas: &Option<GasQuote>,
        news: &Option<Vec<NewsItem>>,
    ) {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        let mut cache = self.cache.lock().expect("cache lock poisoned");
        let key = |family: &str| format!("{symbol}:{family}:{bucket}");

        if let Some(v) = candles {
            cache
                .candles
                .insert(key("candles"), CacheEntry::new(v.clone(), ttl));
        }
        if let Some(v) = order_book {
            cache
                .order_book
                .insert(key("order_book"), CacheEntry::new(v.clone(), ttl));
        }
        if let Some(v) = gas {
            cache.gas.insert(key("gas"), CacheEntry::new(v.clone(), ttl));
        }
        if let Some(v) = news {
            cache.news.insert(key("news"), CacheEntry::new(v.clone(), ttl));
        }
    }
}

/// Join a vec of futures preserving order (small local helper — the adapter
/// fan-out proper uses `tokio::join!`).
async fn futures_join_all<F, T>(futs: Vec<F>) -> Vec<T>
where
    F: std::future::Future<Output = T>,
{
    let mut out = Vec::with_capacity(futs.len());
    for f in futs {
        out.push(f.await);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterConfig;

    #[tokio::test]
    async fn test_disabled_set_yields_empty_snapshot() {
        let set = SourceSet::disabled(AdapterConfig::default());
        let snap = set.fetch_all("BTCUSDT", 0).await;
        assert!(snap.candles.is_none());
        assert!(snap.gas.is_none());
        assert!(snap.ai_predictions.is_none());
    }

    #[tokio::test]
    async fn test_failing_family_is_none_not_error() {
        struct Failing;

        #[async_trait::async_trait]
        impl CandleSource for Failing {
            async fn fetch(&self, _symbol: &str, _now: i64) -> Result<Vec<Candle>> {
                anyhow::bail!("boom")
            }
        }

        let mut config = AdapterConfig::default();
        config.retries = 1;
        config.backoff_base_ms = 1;
        let set = SourceSet::disabled(config).with_candles(Arc::new(Failing));

        let snap = set.fetch_all("BTCUSDT", 0).await;
        assert!(snap.candles.is_none());
    }
}
