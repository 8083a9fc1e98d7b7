//! Investor preference -> numeric filter mapping.
//!
//! Risk bands partition the safety-score axis at three configured cuts:
//!
//!   EXTREME_RISK  [0,            extreme_high)
//!   HIGH_RISK     [extreme_high, high_medium)
//!   MEDIUM_RISK   [high_medium,  medium_low)
//!   LOW_RISK      [medium_low,   +inf)
//!
//! Repayment preferences become a single predicate on the Monte Carlo row:
//!
//!   EARLY_REPAYMENT     first + second early probability >= early boundary
//!   MATURITY_REPAYMENT  loss probability <= maturity boundary
//!   NO_PREFERENCE       no predicate
//!
//! Pure functions.

use crate::config::{RepaymentBoundaries, RiskBands};
use crate::db::Predicate;
use crate::errors::AnalysisError;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskPropensity {
    Extreme,
    High,
    Medium,
    Low,
}

impl RiskPropensity {
    /// Riskiest first, i.e. ascending safety score.
    pub const ALL: [RiskPropensity; 4] = [Self::Extreme, Self::High, Self::Medium, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extreme => "EXTREME_RISK",
            Self::High => "HIGH_RISK",
            Self::Medium => "MEDIUM_RISK",
            Self::Low => "LOW_RISK",
        }
    }

    fn band_index(self) -> usize {
        match self {
            Self::Extreme => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    /// Half-open safety-score interval this propensity accepts.
    pub fn score_range(self, bands: &RiskBands) -> ScoreRange {
        let cuts = [bands.extreme_high, bands.high_medium, bands.medium_low];
        let i = self.band_index();
        ScoreRange {
            min: if i == 0 { 0.0 } else { cuts[i - 1] },
            max: cuts.get(i).copied(),
        }
    }
}

impl std::fmt::Display for RiskPropensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskPropensity {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| AnalysisError::InvalidPreferenceValue {
                field: "riskPropensity",
                value: s.to_string(),
            })
    }
}

/// `min <= score < max`; no upper bound when `max` is `None`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: f64,
    pub max: Option<f64>,
}

impl ScoreRange {
    pub fn predicates(&self) -> impl Iterator<Item = Predicate> {
        std::iter::once(Predicate::SafetyScoreAtLeast(self.min))
            .chain(self.max.map(Predicate::SafetyScoreBelow))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepaymentOption {
    Early,
    Maturity,
    NoPreference,
}

impl RepaymentOption {
    pub const ALL: [RepaymentOption; 3] = [Self::Early, Self::Maturity, Self::NoPreference];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Early => "EARLY_REPAYMENT",
            Self::Maturity => "MATURITY_REPAYMENT",
            Self::NoPreference => "NO_PREFERENCE",
        }
    }

    pub fn predicate(self, boundaries: &RepaymentBoundaries) -> Option<Predicate> {
        match self {
            Self::Early => Some(Predicate::EarlyRepaymentSumAtLeast(boundaries.early)),
            Self::Maturity => Some(Predicate::LossProbabilityAtMost(boundaries.maturity)),
            Self::NoPreference => None,
        }
    }
}

impl std::fmt::Display for RepaymentOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepaymentOption {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|o| o.as_str() == s)
            .ok_or_else(|| AnalysisError::InvalidPreferenceValue {
                field: "repaymentOption",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
impl ScoreRange {
    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && self.max.map_or(true, |max| score < max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bands() -> RiskBands {
        RiskBands::new(0.3, 0.5, 0.7).unwrap()
    }

    #[test]
    fn test_band_table() {
        let b = bands();
        assert_eq!(RiskPropensity::Extreme.score_range(&b), ScoreRange { min: 0.0, max: Some(0.3) });
        assert_eq!(RiskPropensity::High.score_range(&b), ScoreRange { min: 0.3, max: Some(0.5) });
        assert_eq!(RiskPropensity::Medium.score_range(&b), ScoreRange { min: 0.5, max: Some(0.7) });
        assert_eq!(RiskPropensity::Low.score_range(&b), ScoreRange { min: 0.7, max: None });
    }

    #[test]
    fn test_bands_partition_unit_interval() {
        let b = bands();
        for step in 0..1000 {
            let score = step as f64 / 1000.0;
            let matching = RiskPropensity::ALL
                .iter()
                .filter(|p| p.score_range(&b).contains(score))
                .count();
            assert_eq!(matching, 1, "score {score} matched {matching} bands");
        }
        // Boundaries belong to the safer band.
        assert!(RiskPropensity::High.score_range(&b).contains(0.3));
        assert!(!RiskPropensity::Extreme.score_range(&b).contains(0.3));
        assert!(RiskPropensity::Low.score_range(&b).contains(1.0));
    }

    #[test]
    fn test_range_predicates() {
        let b = bands();
        let low: Vec<Predicate> = RiskPropensity::Low.score_range(&b).predicates().collect();
        assert_eq!(low, vec![Predicate::SafetyScoreAtLeast(0.7)]);
        let high: Vec<Predicate> = RiskPropensity::High.score_range(&b).predicates().collect();
        assert_eq!(
            high,
            vec![Predicate::SafetyScoreAtLeast(0.3), Predicate::SafetyScoreBelow(0.5)]
        );
    }

    #[test]
    fn test_repayment_predicates() {
        let b = RepaymentBoundaries { early: 1.0, maturity: 0.2 };
        assert_eq!(RepaymentOption::Early.predicate(&b), Some(Predicate::EarlyRepaymentSumAtLeast(1.0)));
        assert_eq!(RepaymentOption::Maturity.predicate(&b), Some(Predicate::LossProbabilityAtMost(0.2)));
        assert_eq!(RepaymentOption::NoPreference.predicate(&b), None);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("LOW_RISK".parse::<RiskPropensity>().unwrap(), RiskPropensity::Low);
        assert_eq!("NO_PREFERENCE".parse::<RepaymentOption>().unwrap(), RepaymentOption::NoPreference);
        let err = "SAFE".parse::<RiskPropensity>().unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidPreferenceValue { field: "riskPropensity", .. }));
        assert!("early_repayment".parse::<RepaymentOption>().is_err());
    }
}
