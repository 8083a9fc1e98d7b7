pub mod bands;
pub mod classifier;

pub use bands::{RepaymentOption, RiskPropensity, ScoreRange};
pub use classifier::PropensityFilter;
