use crate::data_structures::{FinancialSnapshot, IndexHistory, StockBundle, SymbolMetrics, LOOKBACK_DAYS};
use crate::provider::{ProviderError, SharedSource};
use crate::retry::{with_retry, RetryPolicy};
use crate::utils::cache::{CacheKey, CacheOp, CachedFrame, SharedCache};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use chrono_tz::America::New_York;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, instrument};

/// Fetch-and-cache layer. Every operation returns a populated frame or an
/// explicitly empty one; provider errors never cross this boundary.
pub struct DashboardService {
    source: SharedSource,
    cache: SharedCache,
    retry: RetryPolicy,
    // One lock per cache key so a burst of identical requests performs a
    // single provider call. Keys come from the fixed symbol lists, so the
    // map stays small.
    flights: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl DashboardService {
    pub fn new(source: SharedSource, cache: SharedCache, retry: RetryPolicy) -> Self {
        DashboardService {
            source,
            cache,
            retry,
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// One calendar year ending on the exchange's current local date.
    fn lookback_window() -> (NaiveDate, NaiveDate) {
        let today = Utc::now().with_timezone(&New_York).date_naive();
        (today - ChronoDuration::days(LOOKBACK_DAYS), today)
    }

    async fn cached(&self, key: &CacheKey) -> Option<CachedFrame> {
        self.cache.lock().await.get(key, SystemTime::now())
    }

    async fn store(&self, key: CacheKey, frame: CachedFrame) {
        self.cache.lock().await.put(key, frame, SystemTime::now());
    }

    async fn flight_guard(&self, key: &CacheKey) -> OwnedMutexGuard<()> {
        let slot = {
            let mut flights = self.flights.lock().await;
            flights
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }

    pub async fn invalidate_all(&self) {
        self.cache.lock().await.invalidate_all();
    }

    /// One year of daily index history with the derived columns appended.
    #[instrument(skip(self))]
    pub async fn index_history(&self, symbol: &str) -> IndexHistory {
        let key = CacheKey::new(CacheOp::IndexHistory, symbol);
        if let Some(CachedFrame::Index(frame)) = self.cached(&key).await {
            return frame;
        }
        let _flight = self.flight_guard(&key).await;
        if let Some(CachedFrame::Index(frame)) = self.cached(&key).await {
            return frame;
        }

        let (start, end) = Self::lookback_window();
        let source = Arc::clone(&self.source);
        let sym = symbol.to_string();

        let fetched = with_retry(self.retry, "index history", symbol, || {
            let source = Arc::clone(&source);
            let sym = sym.clone();
            async move { source.lock().await.daily_history(&sym, start, end).await }
        })
        .await;

        match fetched {
            Ok(bars) => {
                let frame = IndexHistory::from_bars(symbol, bars);
                self.store(key, CachedFrame::Index(frame.clone())).await;
                frame
            }
            Err(err) => {
                error!(%err, symbol, "could not fetch index history after retries");
                IndexHistory::empty(symbol)
            }
        }
    }

    /// One year of daily history plus the key-metric snapshot. Both parts
    /// belong to one attempt: if either fails, both are retried together.
    #[instrument(skip(self))]
    pub async fn stock_bundle(&self, symbol: &str) -> StockBundle {
        let key = CacheKey::new(CacheOp::StockBundle, symbol);
        if let Some(CachedFrame::Stock(frame)) = self.cached(&key).await {
            return frame;
        }
        let _flight = self.flight_guard(&key).await;
        if let Some(CachedFrame::Stock(frame)) = self.cached(&key).await {
            return frame;
        }

        let (start, end) = Self::lookback_window();
        let source = Arc::clone(&self.source);
        let sym = symbol.to_string();

        let fetched = with_retry(self.retry, "stock bundle", symbol, || {
            let source = Arc::clone(&source);
            let sym = sym.clone();
            async move {
                let bars = source.lock().await.daily_history(&sym, start, end).await?;
                let summary = source.lock().await.summary(&sym).await?;
                Ok::<_, ProviderError>((bars, summary))
            }
        })
        .await;

        match fetched {
            Ok((bars, summary)) => {
                let frame = StockBundle {
                    symbol: symbol.to_string(),
                    rows: bars,
                    metrics: SymbolMetrics::from_summary(&summary),
                };
                self.store(key, CachedFrame::Stock(frame.clone())).await;
                frame
            }
            Err(err) => {
                error!(%err, symbol, "could not fetch stock data after retries");
                StockBundle::empty(symbol)
            }
        }
    }

    /// Selected financial-statement line items joined on reporting period.
    #[instrument(skip(self))]
    pub async fn financial_snapshot(&self, symbol: &str) -> FinancialSnapshot {
        let key = CacheKey::new(CacheOp::Financials, symbol);
        if let Some(CachedFrame::Financials(frame)) = self.cached(&key).await {
            return frame;
        }
        let _flight = self.flight_guard(&key).await;
        if let Some(CachedFrame::Financials(frame)) = self.cached(&key).await {
            return frame;
        }

        let source = Arc::clone(&self.source);
        let sym = symbol.to_string();

        let fetched = with_retry(self.retry, "financial snapshot", symbol, || {
            let source = Arc::clone(&source);
            let sym = sym.clone();
            async move {
                let balance = source.lock().await.balance_sheet(&sym).await?;
                let income = source.lock().await.income_statement(&sym).await?;
                Ok::<_, ProviderError>((balance, income))
            }
        })
        .await;

        match fetched {
            Ok((balance, income)) => {
                let frame = FinancialSnapshot::from_statements(symbol, &balance, &income);
                self.store(key, CachedFrame::Financials(frame.clone())).await;
                frame
            }
            Err(err) => {
                error!(%err, symbol, "could not fetch financial data after retries");
                FinancialSnapshot::empty(symbol)
            }
        }
    }
}
