pub mod calculator;

use serde::ser::SerializeMap;

/// Round half away from zero to 2 decimal places.
#[inline]
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// `recent / initial * 100`, rounded to 2 decimals.
/// `None` when either price is non-positive or not finite.
#[inline]
pub fn price_ratio(initial: f64, recent: f64) -> Option<f64> {
    let usable = |p: f64| p.is_finite() && p > 0.0;
    if !usable(initial) || !usable(recent) {
        return None;
    }
    Some(round2(recent / initial * 100.0))
}

/// Distance of the worst-performing equity from its reference price,
/// in percentage points: `round(min(ratios) - 100, 2)`.
pub fn worst_case_scalar(ratios: impl IntoIterator<Item = f64>) -> Option<f64> {
    ratios
        .into_iter()
        .reduce(f64::min)
        .map(|worst| round2(worst - 100.0))
}

/// Per-equity values in the product's declared order.
/// Serialized as a JSON object whose keys keep that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EquityPrices(pub Vec<(String, f64)>);

#[cfg(test)]
impl EquityPrices {
    pub fn get(&self, equity: &str) -> Option<f64> {
        self.0.iter().find(|(name, _)| name == equity).map(|(_, v)| *v)
    }
}

impl serde::Serialize for EquityPrices {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Single-product response: every map fully populated.
#[derive(Debug, Clone, PartialEq, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PriceRatioReport {
    /// Close on the reference date, by equity name.
    #[schema(value_type = Object)]
    pub initial: EquityPrices,
    /// Latest close, by equity name.
    #[schema(value_type = Object)]
    pub recent: EquityPrices,
    /// `recent / initial * 100`, by equity name.
    #[schema(value_type = Object)]
    pub ratio: EquityPrices,
    /// Worst equity ratio minus 100.
    pub recent_and_initial_price_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchRatioEntry {
    pub id: i64,
    pub recent_and_initial_price_ratio: Option<f64>,
}
