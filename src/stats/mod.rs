//! Statistics of iteration results, per site and across sites

pub mod comparison;
pub mod summary;

pub use comparison::SiteComparison;
pub use summary::{
    OutcomeStatistics, PERCENTILE_LEVELS, Percentiles, RiskCategory, SiteSummary, percentile,
    summarize,
};
