use crate::errors::{AnalysisError, AnalysisResult};
use chrono::NaiveDate;
use serde::Deserialize;
use smallvec::SmallVec;
use std::collections::HashMap;

// ── Wire format ──

/// `GET /v1/product/{id}` payload, e.g.
/// ```json
/// {
///   "initialBasePriceEvaluationDate": "2024-07-12",
///   "equities": "KOSPI200 Index / S&P500 Index",
///   "equityTickerSymbols": { "KOSPI200 Index": "^KS200", "S&P500 Index": "^GSPC" }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub initial_base_price_evaluation_date: String,
    pub equities: String,
    #[serde(default)]
    pub equity_ticker_symbols: HashMap<String, String>,
}

// ── Validated product ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Equity {
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone)]
pub struct ProductReference {
    pub product_id: i64,
    pub reference_date: NaiveDate,
    /// In the product's declared order; names are unique.
    pub equities: SmallVec<[Equity; 4]>,
}

impl ProductResponse {
    pub fn into_reference(self, product_id: i64) -> AnalysisResult<ProductReference> {
        let raw_date = self.initial_base_price_evaluation_date.trim();
        let reference_date = NaiveDate::parse_from_str(raw_date.get(..10).unwrap_or(raw_date), "%Y-%m-%d")
            .map_err(|e| AnalysisError::catalog(product_id, format!("bad reference date {raw_date:?}: {e}")))?;

        // Names may themselves contain a bare '/', e.g. "S&P/ASX 200 Index".
        let mut equities: SmallVec<[Equity; 4]> = SmallVec::new();
        for name in self.equities.split(" / ").map(str::trim).filter(|n| !n.is_empty()) {
            if equities.iter().any(|e| e.name == name) {
                return Err(AnalysisError::catalog(product_id, format!("duplicate equity {name:?}")));
            }
            let symbol = self
                .equity_ticker_symbols
                .get(name)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| AnalysisError::catalog(product_id, format!("no ticker symbol for {name:?}")))?;
            equities.push(Equity {
                name: name.to_string(),
                symbol: symbol.to_string(),
            });
        }

        if equities.is_empty() {
            return Err(AnalysisError::catalog(product_id, "product has no equities"));
        }

        Ok(ProductReference {
            product_id,
            reference_date,
            equities,
        })
    }
}
