use crate::indicators::{ema, rolling_std, sma};
use crate::provider::{DailyBar, StatementTable, SummarySnapshot};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// --- Fixed dashboard selections ---

pub const INDEX_SYMBOLS: [&str; 4] = ["^DJI", "^GSPC", "^IXIC", "^RUT"];
pub const STOCK_SYMBOLS: [&str; 5] = ["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA"];

/// Trailing window shared by all derived columns.
pub const INDICATOR_WINDOW: usize = 20;

/// History lookback, one calendar year.
pub const LOOKBACK_DAYS: i64 = 365;

/// Placeholder for a metric the provider did not supply.
pub const UNAVAILABLE: &str = "N/A";

pub fn is_known_index(symbol: &str) -> bool {
    INDEX_SYMBOLS.contains(&symbol)
}

pub fn is_known_stock(symbol: &str) -> bool {
    STOCK_SYMBOLS.contains(&symbol)
}

// --- Dashboard frames ---

/// A daily bar with the derived columns appended. The derived fields are
/// `None` for the first `INDICATOR_WINDOW - 1` rows of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub sma_20: Option<f64>,
    pub ema_20: Option<f64>,
    pub volatility_20: Option<f64>,
}

/// Index dashboard frame. An empty `rows` means "nothing to render" and is
/// the only failure signal the presentation layer ever sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHistory {
    pub symbol: String,
    pub rows: Vec<EnrichedBar>,
}

impl IndexHistory {
    pub fn empty(symbol: &str) -> Self {
        IndexHistory { symbol: symbol.to_string(), rows: Vec::new() }
    }

    pub fn from_bars(symbol: &str, bars: Vec<DailyBar>) -> Self {
        let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
        let sma_20 = sma(&closes, INDICATOR_WINDOW);
        let ema_20 = ema(&closes, INDICATOR_WINDOW);
        let volatility_20 = rolling_std(&closes, INDICATOR_WINDOW);

        let rows = bars
            .into_iter()
            .enumerate()
            .map(|(i, bar)| EnrichedBar {
                date: bar.date,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                sma_20: sma_20[i],
                ema_20: ema_20[i],
                volatility_20: volatility_20[i],
            })
            .collect();

        IndexHistory { symbol: symbol.to_string(), rows }
    }
}

/// Key metrics as display strings. Every field is always present; `"N/A"`
/// marks a value the provider did not supply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMetrics {
    pub pe_ratio: String,
    pub dividend_yield: String,
    pub beta: String,
    pub market_cap: String,
}

impl SymbolMetrics {
    pub fn unavailable() -> Self {
        SymbolMetrics {
            pe_ratio: UNAVAILABLE.to_string(),
            dividend_yield: UNAVAILABLE.to_string(),
            beta: UNAVAILABLE.to_string(),
            market_cap: UNAVAILABLE.to_string(),
        }
    }

    pub fn from_summary(summary: &SummarySnapshot) -> Self {
        SymbolMetrics {
            pe_ratio: format_ratio(summary.trailing_pe),
            dividend_yield: format_percent(summary.dividend_yield),
            beta: format_ratio(summary.beta),
            market_cap: format_market_cap(summary.market_cap),
        }
    }
}

fn format_ratio(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => UNAVAILABLE.to_string(),
    }
}

/// Renders a raw fraction as a percentage with two decimals. A zero yield is
/// treated the same as a missing one.
fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) if v != 0.0 => format!("{:.2}%", v * 100.0),
        _ => UNAVAILABLE.to_string(),
    }
}

fn format_market_cap(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.0}"),
        None => UNAVAILABLE.to_string(),
    }
}

/// Stock dashboard frame: raw OHLCV plus the key metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockBundle {
    pub symbol: String,
    pub rows: Vec<DailyBar>,
    pub metrics: SymbolMetrics,
}

impl StockBundle {
    pub fn empty(symbol: &str) -> Self {
        StockBundle {
            symbol: symbol.to_string(),
            rows: Vec::new(),
            metrics: SymbolMetrics::unavailable(),
        }
    }
}

// --- Financial snapshot ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub line_item: String,
    pub values: Vec<Option<f64>>,
}

/// Selected balance-sheet and income-statement line items joined on
/// reporting period and transposed, so each period is a column. Periods are
/// the balance-sheet periods, newest first; income values the provider lacks
/// for a period stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSnapshot {
    pub symbol: String,
    pub periods: Vec<String>,
    pub rows: Vec<SnapshotRow>,
}

impl FinancialSnapshot {
    pub fn empty(symbol: &str) -> Self {
        FinancialSnapshot {
            symbol: symbol.to_string(),
            periods: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn from_statements(symbol: &str, balance: &StatementTable, income: &StatementTable) -> Self {
        let mut periods: Vec<String> = balance
            .items
            .iter()
            .flat_map(|item| item.values.keys().cloned())
            .collect();
        periods.sort();
        periods.dedup();
        periods.reverse();

        let rows = balance
            .items
            .iter()
            .chain(income.items.iter())
            .map(|item| SnapshotRow {
                line_item: item.name.clone(),
                values: periods.iter().map(|period| item.values.get(period).copied()).collect(),
            })
            .collect();

        FinancialSnapshot {
            symbol: symbol.to_string(),
            periods,
            rows,
        }
    }
}
