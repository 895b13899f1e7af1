use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use rand::seq::IndexedRandom;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// How far back the fundamentals query reaches. Annual statements only go
/// back a handful of periods, so five years covers everything the provider
/// will actually return.
const FUNDAMENTALS_LOOKBACK_DAYS: i64 = 5 * 365;

/// Balance-sheet line items the dashboard selects, as (provider key, label).
pub const BALANCE_SHEET_ITEMS: [(&str, &str); 2] = [
    ("annualTotalAssets", "Total Assets"),
    ("annualTotalDebt", "Total Debt"),
];

/// Income-statement line items the dashboard selects.
pub const INCOME_STATEMENT_ITEMS: [(&str, &str); 5] = [
    ("annualTotalRevenue", "Total Revenue"),
    ("annualEBITDA", "EBITDA"),
    ("annualBasicEPS", "Basic EPS"),
    ("annualOperatingIncome", "Operating Income"),
    ("annualOperatingExpense", "Operating Expense"),
];

/// Single error kind at the fetch boundary: a provider call failed. The
/// variants only exist so logs say what went wrong; callers treat them all
/// the same way.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),
    #[error("provider omits line item: {0}")]
    MissingLineItem(String),
    #[error("no data for symbol {0}")]
    NoData(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Raw quote-summary figures. Absent fields stay `None`; formatting into
/// display strings happens in the dashboard frame layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarySnapshot {
    pub trailing_pe: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub beta: Option<f64>,
    pub market_cap: Option<f64>,
}

/// One selected line item of a financial statement: reporting period
/// (YYYY-MM-DD) to reported value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemSeries {
    pub name: String,
    pub values: HashMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementTable {
    pub items: Vec<LineItemSeries>,
}

/// Seam between the fetch layer and the wire. Production uses [`YahooClient`];
/// tests substitute counting stubs.
#[async_trait]
pub trait MarketDataSource: Send {
    async fn daily_history(
        &mut self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, ProviderError>;

    async fn summary(&mut self, symbol: &str) -> Result<SummarySnapshot, ProviderError>;

    async fn balance_sheet(&mut self, symbol: &str) -> Result<StatementTable, ProviderError>;

    async fn income_statement(&mut self, symbol: &str) -> Result<StatementTable, ProviderError>;
}

pub type SharedSource = Arc<Mutex<dyn MarketDataSource>>;

pub struct YahooClient {
    client: Client,
    base_url: String,
    rate_limit_per_minute: u32,
    request_timestamps: Vec<SystemTime>,
    user_agents: Vec<String>,
    random_agent: bool,
}

impl YahooClient {
    pub fn new(base_url: &str, random_agent: bool, rate_limit_per_minute: u32) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let user_agents = vec![
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0".to_string(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.3 Safari/605.1.15".to_string(),
        ];

        Ok(YahooClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limit_per_minute,
            request_timestamps: Vec::new(),
            user_agents,
            random_agent,
        })
    }

    fn user_agent(&self) -> String {
        if self.random_agent {
            self.user_agents
                .choose(&mut rand::rng())
                .unwrap_or(&self.user_agents[0])
                .clone()
        } else {
            self.user_agents[0].clone()
        }
    }

    async fn enforce_rate_limit(&mut self) {
        let current_time = SystemTime::now();

        // Drop timestamps older than one minute.
        self.request_timestamps.retain(|&timestamp| {
            current_time.duration_since(timestamp).unwrap_or(Duration::from_secs(0)) < Duration::from_secs(60)
        });

        if self.request_timestamps.len() >= self.rate_limit_per_minute as usize {
            if let Some(&oldest_request) = self.request_timestamps.first() {
                let wait_time = Duration::from_secs(60)
                    - current_time.duration_since(oldest_request).unwrap_or(Duration::from_secs(0));
                if !wait_time.is_zero() {
                    sleep(wait_time + Duration::from_millis(100)).await;
                }
            }
        }

        self.request_timestamps.push(current_time);
    }

    /// One shot at one endpoint. Retrying lives a layer up, in the retry
    /// policy wrapper, so this maps every transport or status problem
    /// straight into a `ProviderError`.
    async fn get_json(&mut self, url: &str, params: &[(&str, String)]) -> Result<Value, ProviderError> {
        self.enforce_rate_limit().await;

        let user_agent = self.user_agent();
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json, text/plain, */*")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Connection", "keep-alive")
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .header("User-Agent", user_agent)
            .header("Referer", "https://finance.yahoo.com/")
            .header("Origin", "https://finance.yahoo.com")
            .query(params)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<Value>().await?)
    }

    async fn fundamentals(
        &mut self,
        symbol: &str,
        items: &[(&str, &str)],
    ) -> Result<StatementTable, ProviderError> {
        let url = format!(
            "{}/ws/fundamentals-timeseries/v1/finance/timeseries/{}",
            self.base_url,
            symbol.to_uppercase()
        );

        let now = Utc::now();
        let period1 = (now - ChronoDuration::days(FUNDAMENTALS_LOOKBACK_DAYS)).timestamp();
        let period2 = now.timestamp();
        let type_param = items.iter().map(|(key, _)| *key).collect::<Vec<_>>().join(",");

        let params = [
            ("symbol", symbol.to_uppercase()),
            ("type", type_param),
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
        ];

        let body = self.get_json(&url, &params).await?;
        parse_timeseries(symbol, items, &body)
    }
}

#[async_trait]
impl MarketDataSource for YahooClient {
    async fn daily_history(
        &mut self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, ProviderError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);

        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        // End is inclusive, so the window closes at the following midnight.
        let period2 = (end + ChronoDuration::days(1)).and_time(NaiveTime::MIN).and_utc().timestamp();

        let params = [
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
            ("interval", "1d".to_string()),
            ("includePrePost", "false".to_string()),
        ];

        let body = self.get_json(&url, &params).await?;
        parse_chart(symbol, start, &body)
    }

    async fn summary(&mut self, symbol: &str) -> Result<SummarySnapshot, ProviderError> {
        let url = format!(
            "{}/v10/finance/quoteSummary/{}",
            self.base_url,
            symbol.to_uppercase()
        );
        let params = [(
            "modules",
            "summaryDetail,defaultKeyStatistics,price".to_string(),
        )];

        let body = self.get_json(&url, &params).await?;
        parse_summary(symbol, &body)
    }

    async fn balance_sheet(&mut self, symbol: &str) -> Result<StatementTable, ProviderError> {
        self.fundamentals(symbol, &BALANCE_SHEET_ITEMS).await
    }

    async fn income_statement(&mut self, symbol: &str) -> Result<StatementTable, ProviderError> {
        self.fundamentals(symbol, &INCOME_STATEMENT_ITEMS).await
    }
}

fn field_array<'a>(container: &'a Value, key: &str) -> Result<&'a Vec<Value>, ProviderError> {
    container
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::InvalidResponse(format!("missing array field: {key}")))
}

fn parse_chart(symbol: &str, start: NaiveDate, body: &Value) -> Result<Vec<DailyBar>, ProviderError> {
    let result = body
        .pointer("/chart/result/0")
        .ok_or_else(|| ProviderError::InvalidResponse("missing chart result".to_string()))?;

    let timestamps = result
        .get("timestamp")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::NoData(symbol.to_string()))?;

    let quote = result
        .pointer("/indicators/quote/0")
        .ok_or_else(|| ProviderError::InvalidResponse("missing quote block".to_string()))?;

    let opens = field_array(quote, "open")?;
    let highs = field_array(quote, "high")?;
    let lows = field_array(quote, "low")?;
    let closes = field_array(quote, "close")?;
    let volumes = field_array(quote, "volume")?;

    let length = timestamps.len();
    if [opens.len(), highs.len(), lows.len(), closes.len(), volumes.len()]
        .iter()
        .any(|&len| len != length)
    {
        return Err(ProviderError::InvalidResponse("inconsistent array lengths".to_string()));
    }

    let mut bars = Vec::new();
    for i in 0..length {
        let timestamp = timestamps[i]
            .as_i64()
            .ok_or_else(|| ProviderError::InvalidResponse(format!("invalid timestamp at index {i}")))?;
        let time = DateTime::<Utc>::from_timestamp(timestamp, 0).ok_or_else(|| {
            ProviderError::InvalidResponse(format!("timestamp {timestamp} out of range at index {i}"))
        })?;

        let date = time.date_naive();
        if date < start {
            continue;
        }

        // The provider emits nulls for days a symbol did not trade.
        let (Some(open), Some(high), Some(low), Some(close)) = (
            opens[i].as_f64(),
            highs[i].as_f64(),
            lows[i].as_f64(),
            closes[i].as_f64(),
        ) else {
            continue;
        };

        bars.push(DailyBar {
            date,
            open,
            high,
            low,
            close,
            volume: volumes[i].as_u64().unwrap_or(0),
        });
    }

    if bars.is_empty() {
        return Err(ProviderError::NoData(symbol.to_string()));
    }

    bars.sort_by(|a, b| a.date.cmp(&b.date));
    Ok(bars)
}

fn parse_summary(symbol: &str, body: &Value) -> Result<SummarySnapshot, ProviderError> {
    let result = body
        .pointer("/quoteSummary/result/0")
        .ok_or_else(|| ProviderError::NoData(symbol.to_string()))?;

    let raw = |path: &str| result.pointer(path).and_then(Value::as_f64);

    Ok(SummarySnapshot {
        trailing_pe: raw("/summaryDetail/trailingPE/raw"),
        dividend_yield: raw("/summaryDetail/dividendYield/raw"),
        beta: raw("/defaultKeyStatistics/beta/raw").or_else(|| raw("/summaryDetail/beta/raw")),
        market_cap: raw("/price/marketCap/raw").or_else(|| raw("/summaryDetail/marketCap/raw")),
    })
}

fn parse_timeseries(
    symbol: &str,
    items: &[(&str, &str)],
    body: &Value,
) -> Result<StatementTable, ProviderError> {
    let results = body
        .pointer("/timeseries/result")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::InvalidResponse("missing timeseries result".to_string()))?;

    let mut table_items = Vec::with_capacity(items.len());
    for (provider_key, label) in items {
        let entry = results
            .iter()
            .find(|entry| entry.pointer("/meta/type/0").and_then(Value::as_str) == Some(*provider_key));

        // A line item the provider omits entirely for this symbol is a hard
        // failure for the whole attempt, not a partial table.
        let series = entry
            .and_then(|entry| entry.get(*provider_key))
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::MissingLineItem(label.to_string()))?;

        let mut values = HashMap::new();
        for point in series {
            let Some(period) = point.pointer("/asOfDate").and_then(Value::as_str) else {
                continue;
            };
            let Some(value) = point.pointer("/reportedValue/raw").and_then(Value::as_f64) else {
                continue;
            };
            values.insert(period.to_string(), value);
        }

        if values.is_empty() {
            return Err(ProviderError::MissingLineItem(label.to_string()));
        }

        table_items.push(LineItemSeries {
            name: label.to_string(),
            values,
        });
    }

    Ok(StatementTable { items: table_items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_creation() {
        let client = YahooClient::new(DEFAULT_BASE_URL, true, 30);
        assert!(client.is_ok());
    }

    fn chart_body() -> Value {
        json!({
            "chart": {
                "result": [{
                    "timestamp": [1704412800i64, 1704499200i64, 1704758400i64],
                    "indicators": {
                        "quote": [{
                            "open":   [100.0, null, 102.0],
                            "high":   [101.0, null, 103.5],
                            "low":    [99.0,  null, 101.0],
                            "close":  [100.5, null, 103.0],
                            "volume": [1000,  null, 1200]
                        }]
                    }
                }],
                "error": null
            }
        })
    }

    #[test]
    fn parse_chart_skips_null_rows_and_sorts() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = parse_chart("^GSPC", start, &chart_body()).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(bars[0].close, 100.5);
        assert_eq!(bars[1].volume, 1200);
        assert!(bars[0].date < bars[1].date);
    }

    #[test]
    fn parse_chart_filters_rows_before_start() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let bars = parse_chart("^GSPC", start, &chart_body()).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 103.0);
    }

    #[test]
    fn parse_chart_rejects_mismatched_arrays() {
        let body = json!({
            "chart": {
                "result": [{
                    "timestamp": [1704412800i64, 1704499200i64],
                    "indicators": {
                        "quote": [{
                            "open": [100.0], "high": [101.0], "low": [99.0],
                            "close": [100.5], "volume": [1000]
                        }]
                    }
                }]
            }
        });
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert!(matches!(
            parse_chart("^GSPC", start, &body),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn parse_summary_reads_raw_values() {
        let body = json!({
            "quoteSummary": {
                "result": [{
                    "summaryDetail": {
                        "trailingPE": { "raw": 28.4, "fmt": "28.40" },
                        "dividendYield": { "raw": 0.0123, "fmt": "1.23%" }
                    },
                    "defaultKeyStatistics": { "beta": { "raw": 1.1 } },
                    "price": { "marketCap": { "raw": 2.5e12 } }
                }]
            }
        });
        let summary = parse_summary("AAPL", &body).unwrap();
        assert_eq!(summary.trailing_pe, Some(28.4));
        assert_eq!(summary.dividend_yield, Some(0.0123));
        assert_eq!(summary.beta, Some(1.1));
        assert_eq!(summary.market_cap, Some(2.5e12));
    }

    #[test]
    fn parse_summary_tolerates_absent_fields() {
        let body = json!({ "quoteSummary": { "result": [{ "summaryDetail": {} }] } });
        let summary = parse_summary("AAPL", &body).unwrap();
        assert_eq!(summary.trailing_pe, None);
        assert_eq!(summary.market_cap, None);
    }

    fn timeseries_body() -> Value {
        json!({
            "timeseries": {
                "result": [
                    {
                        "meta": { "type": ["annualTotalAssets"] },
                        "annualTotalAssets": [
                            { "asOfDate": "2022-12-31", "reportedValue": { "raw": 900.0 } },
                            { "asOfDate": "2023-12-31", "reportedValue": { "raw": 1000.0 } }
                        ]
                    },
                    {
                        "meta": { "type": ["annualTotalDebt"] },
                        "annualTotalDebt": [
                            { "asOfDate": "2023-12-31", "reportedValue": { "raw": 250.0 } },
                            null
                        ]
                    }
                ]
            }
        })
    }

    #[test]
    fn parse_timeseries_collects_requested_items() {
        let table = parse_timeseries("AAPL", &BALANCE_SHEET_ITEMS, &timeseries_body()).unwrap();
        assert_eq!(table.items.len(), 2);
        assert_eq!(table.items[0].name, "Total Assets");
        assert_eq!(table.items[0].values.get("2023-12-31"), Some(&1000.0));
        assert_eq!(table.items[1].values.get("2022-12-31"), None);
    }

    #[test]
    fn parse_timeseries_fails_hard_on_omitted_item() {
        let result = parse_timeseries("AAPL", &INCOME_STATEMENT_ITEMS, &timeseries_body());
        assert!(matches!(result, Err(ProviderError::MissingLineItem(_))));
    }
}
