use super::MarketDataProvider;
use crate::errors::{AnalysisError, AnalysisResult};
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate};
use reqwest::Client;
use std::time::Duration;

/// Yahoo Finance v8 chart API client (daily bars).
#[derive(Clone)]
pub struct YahooChartClient {
    client: Client,
    base_url: String,
}

// Response shape (fields we use):
// {
//   "chart": {
//     "result": [{
//       "meta": { "symbol": "^GSPC", "gmtoffset": -14400 },
//       "timestamp": [1720791000, 1721050200],
//       "indicators": { "quote": [{ "close": [5615.35, null] }] }
//     }],
//     "error": null
//   }
// }

#[derive(serde::Deserialize)]
struct ChartEnvelope {
    chart: Option<Chart>,
}

#[derive(serde::Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(serde::Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(serde::Deserialize)]
struct ChartResult {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(serde::Deserialize)]
struct ChartMeta {
    gmtoffset: Option<i64>,
}

#[derive(serde::Deserialize)]
struct Indicators {
    quote: Option<Vec<Quote>>,
}

#[derive(serde::Deserialize)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

/// One daily bar keyed by its exchange-local trading date.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DailyClose {
    date: NaiveDate,
    close: f64,
}

impl ChartResult {
    fn daily_closes(&self) -> Vec<DailyClose> {
        let offset = self.meta.as_ref().and_then(|m| m.gmtoffset).unwrap_or(0);
        let closes = self
            .indicators
            .as_ref()
            .and_then(|i| i.quote.as_ref())
            .and_then(|q| q.first())
            .and_then(|q| q.close.as_ref());
        let (Some(timestamps), Some(closes)) = (self.timestamp.as_ref(), closes) else {
            return Vec::new();
        };

        timestamps
            .iter()
            .zip(closes.iter())
            .filter_map(|(ts, close)| {
                let close = (*close)?;
                let date = DateTime::from_timestamp(ts + offset, 0)?.date_naive();
                Some(DailyClose { date, close })
            })
            .collect()
    }
}

impl YahooChartClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .user_agent("Mozilla/5.0 (compatible; analysis-service)")
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_chart(&self, symbol: &str, query: &str) -> AnalysisResult<Vec<DailyClose>> {
        let url = format!("{}/v8/finance/chart/{symbol}?{query}&interval=1d", self.base_url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AnalysisError::MarketData(format!("{symbol}: request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AnalysisError::MarketData(format!("{symbol}: HTTP {status}: {body}")));
        }

        let envelope: ChartEnvelope = resp
            .json()
            .await
            .map_err(|e| AnalysisError::MarketData(format!("{symbol}: parse: {e}")))?;

        let chart = envelope
            .chart
            .ok_or_else(|| AnalysisError::MarketData(format!("{symbol}: empty chart response")))?;
        if let Some(err) = chart.error {
            return Err(AnalysisError::MarketData(format!(
                "{symbol}: {} {}",
                err.code.unwrap_or_default(),
                err.description.unwrap_or_default()
            )));
        }

        Ok(chart
            .result
            .as_ref()
            .and_then(|r| r.first())
            .map(ChartResult::daily_closes)
            .unwrap_or_default())
    }
}

#[async_trait]
impl MarketDataProvider for YahooChartClient {
    async fn close_on(&self, symbol: &str, date: NaiveDate) -> AnalysisResult<Option<f64>> {
        // Pad the window a day each side so exchanges far from UTC still
        // have their bar for `date` inside it.
        let start = date.checked_sub_days(Days::new(1)).unwrap_or(date);
        let end = date.checked_add_days(Days::new(2)).unwrap_or(date);
        let period1 = start.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp()).unwrap_or(0);
        let period2 = end.and_hms_opt(0, 0, 0).map(|t| t.and_utc().timestamp()).unwrap_or(0);

        let bars = self
            .fetch_chart(symbol, &format!("period1={period1}&period2={period2}"))
            .await?;
        Ok(bars.iter().find(|b| b.date == date).map(|b| b.close))
    }

    async fn recent_close(&self, symbol: &str) -> AnalysisResult<Option<f64>> {
        let bars = self.fetch_chart(symbol, "range=5d").await?;
        Ok(bars.last().map(|b| b.close))
    }
}
