use super::bands::{RepaymentOption, RiskPropensity};
use crate::config::{RepaymentBoundaries, RiskBands};
use crate::db::{DbPool, Predicate, ProductIdQuery};
use crate::errors::AnalysisResult;

/// Narrows a candidate product list to the products matching an investor's
/// risk propensity and repayment preference.
///
/// Two passes over the result store:
///   1. AI results: safety score inside the propensity's band.
///   2. Monte Carlo results: repayment predicate, skipped for NO_PREFERENCE.
/// An empty first pass returns immediately.
#[derive(Debug, Clone, Copy)]
pub struct PropensityFilter {
    bands: RiskBands,
    repayment: RepaymentBoundaries,
}

impl PropensityFilter {
    pub fn new(bands: RiskBands, repayment: RepaymentBoundaries) -> Self {
        Self { bands, repayment }
    }

    pub fn risk_query(&self, product_ids: &[i64], risk: RiskPropensity) -> ProductIdQuery {
        risk.score_range(&self.bands).predicates().fold(
            ProductIdQuery::ai_results().filter(Predicate::ProductIdIn(product_ids.to_vec())),
            ProductIdQuery::filter,
        )
    }

    pub fn repayment_query(&self, product_ids: &[i64], repayment: RepaymentOption) -> Option<ProductIdQuery> {
        repayment.predicate(&self.repayment).map(|predicate| {
            ProductIdQuery::monte_carlo_results()
                .filter(Predicate::ProductIdIn(product_ids.to_vec()))
                .filter(predicate)
        })
    }

    pub async fn filter(
        &self,
        db: &DbPool,
        product_ids: &[i64],
        risk: RiskPropensity,
        repayment: RepaymentOption,
    ) -> AnalysisResult<Vec<i64>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let in_band = db.select_product_ids(self.risk_query(product_ids, risk)).await?;
        tracing::debug!(risk = %risk, candidates = product_ids.len(), in_band = in_band.len(), "risk band pass");
        if in_band.is_empty() {
            return Ok(in_band);
        }

        let Some(query) = self.repayment_query(&in_band, repayment) else {
            return Ok(in_band);
        };
        let matched = db.select_product_ids(query).await?;
        tracing::debug!(repayment = %repayment, matched = matched.len(), "repayment pass");
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures::*;

    fn propensity_filter(early: f64) -> PropensityFilter {
        PropensityFilter::new(
            RiskBands::new(0.3, 0.5, 0.7).unwrap(),
            RepaymentBoundaries { early, maturity: 0.1 },
        )
    }

    async fn store() -> std::sync::Arc<DbPool> {
        let db = memory_pool().await;
        insert_ai_result(&db, 1, false, 0.2).await;
        insert_ai_result(&db, 2, true, 0.75).await;
        insert_ai_result(&db, 3, true, 0.9).await;
        insert_ai_result(&db, 4, true, 0.95).await;
        insert_monte_carlo(&db, 1, (0.6, 0.3), 0.05).await;
        insert_monte_carlo(&db, 2, (0.5, 0.3), 0.08).await;
        insert_monte_carlo(&db, 3, (0.7, 0.4), 0.2).await;
        db
    }

    #[tokio::test]
    async fn test_no_preference_returns_risk_band() {
        let db = store().await;
        let ids = propensity_filter(1.0)
            .filter(&db, &[1, 2, 3], RiskPropensity::Low, RepaymentOption::NoPreference)
            .await
            .unwrap();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_early_repayment_sum_threshold() {
        let db = store().await;
        let ids = propensity_filter(1.0)
            .filter(&db, &[1, 2, 3], RiskPropensity::Low, RepaymentOption::Early)
            .await
            .unwrap();
        // 2: 0.5 + 0.3 < 1.0, 3: 0.7 + 0.4 >= 1.0
        assert_eq!(ids, vec![3]);

        let ids = propensity_filter(0.75)
            .filter(&db, &[1, 2, 3], RiskPropensity::Low, RepaymentOption::Early)
            .await
            .unwrap();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_maturity_loss_ceiling() {
        let db = store().await;
        let ids = propensity_filter(1.0)
            .filter(&db, &[1, 2, 3, 4], RiskPropensity::Low, RepaymentOption::Maturity)
            .await
            .unwrap();
        // 3 loses too often, 4 has no simulation row.
        assert_eq!(ids, vec![2]);
    }

    #[tokio::test]
    async fn test_empty_band_short_circuits() {
        let db = store().await;
        let ids = propensity_filter(0.0)
            .filter(&db, &[1, 2, 3], RiskPropensity::Medium, RepaymentOption::Early)
            .await
            .unwrap();
        assert!(ids.is_empty());

        let ids = propensity_filter(0.0)
            .filter(&db, &[], RiskPropensity::Extreme, RepaymentOption::NoPreference)
            .await
            .unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_candidates_outside_list_ignored() {
        let db = store().await;
        let ids = propensity_filter(1.0)
            .filter(&db, &[1], RiskPropensity::Extreme, RepaymentOption::Maturity)
            .await
            .unwrap();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn test_long_candidate_list() {
        let db = store().await;
        let candidates: Vec<i64> = (1..=40_000).collect();
        let ids = propensity_filter(1.0)
            .filter(&db, &candidates, RiskPropensity::Low, RepaymentOption::NoPreference)
            .await
            .unwrap();
        assert_eq!(ids, vec![2, 3, 4]);

        let ids = propensity_filter(1.0)
            .filter(&db, &candidates, RiskPropensity::Low, RepaymentOption::Maturity)
            .await
            .unwrap();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_no_repayment_query_without_preference() {
        let f = propensity_filter(1.0);
        assert!(f.repayment_query(&[1], RepaymentOption::NoPreference).is_none());
        let builder = f.repayment_query(&[1], RepaymentOption::Early).unwrap().build().unwrap();
        assert!(builder.sql().starts_with("SELECT product_id FROM monte_carlo_result WHERE product_id IN ("));
        assert!(builder.sql().contains("early_repayment_probability_first + early_repayment_probability_second >= "));
    }
}
