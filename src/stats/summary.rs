use itertools::Itertools;
use serde::Serialize;
use std::fmt;

use crate::core::SiteRun;
use crate::errors::{QmraError, Result};

/// Percentile levels reported for every outcome.
pub const PERCENTILE_LEVELS: [f64; 6] = [5., 25., 50., 75., 95., 99.];

/// Percentile of sorted values using linear interpolation between the order statistics at
/// ranks `floor(h)` and `ceil(h)`, where `h = level / 100 * (n - 1)`.
pub fn percentile(sorted: &[f64], level: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = level / 100. * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Percentiles {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Percentiles {
    pub fn from_sorted(sorted: &[f64]) -> Self {
        let [p5, p25, p50, p75, p95, p99] = PERCENTILE_LEVELS.map(|level| percentile(sorted, level));
        Self {
            p5,
            p25,
            p50,
            p75,
            p95,
            p99,
        }
    }

    pub fn values(&self) -> [f64; 6] {
        [self.p5, self.p25, self.p50, self.p75, self.p95, self.p99]
    }
}

/// Summary of one outcome (infections or illness) across all iterations.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct OutcomeStatistics {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Percentiles,
}

impl OutcomeStatistics {
    pub fn from_counts(counts: impl Iterator<Item = u64>) -> Result<Self> {
        let sorted: Vec<f64> = counts
            .map(|count| count as f64)
            .sorted_by(f64::total_cmp)
            .collect();
        if sorted.is_empty() {
            return Err(QmraError::ValidationError(
                "cannot summarize an empty outcome sequence".to_string(),
            ));
        }
        let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
        Ok(Self {
            mean,
            median: percentile(&sorted, 50.),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            percentiles: Percentiles::from_sorted(&sorted),
        })
    }
}

/// Regulatory risk band of the mean infection risk per person.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RiskCategory {
    Low,
    Moderate,
    High,
}

impl RiskCategory {
    /// Low below 1 %, Moderate from 1 % to below 5 %, High from 5 %.
    pub fn from_risk(risk_per_person: f64) -> Self {
        if risk_per_person < 0.01 {
            RiskCategory::Low
        } else if risk_per_person < 0.05 {
            RiskCategory::Moderate
        } else {
            RiskCategory::High
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RiskCategory::Low => write!(f, "Low"),
            RiskCategory::Moderate => write!(f, "Moderate"),
            RiskCategory::High => write!(f, "High"),
        }
    }
}

/// Reportable statistics of one site.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SiteSummary {
    pub site: String,
    pub population_size: usize,
    pub iterations: usize,
    pub dilution_mean: f64,
    pub dilution_median: f64,
    pub infections: OutcomeStatistics,
    pub illness: OutcomeStatistics,
    /// Mean infections divided by the population size, as a fraction.
    pub risk_per_person: f64,
    pub risk_per_person_median: f64,
    pub risk_category: RiskCategory,
    pub numerical_warnings: usize,
}

/// Reduce the iterations of a site to its summary. Every iteration the site asked for has to be
/// present.
pub fn summarize(run: &SiteRun) -> Result<SiteSummary> {
    if run.results.is_empty() || run.results.len() != run.iterations {
        return Err(QmraError::ValidationError(format!(
            "site '{}' has {} of {} iteration results",
            run.site,
            run.results.len(),
            run.iterations
        )));
    }
    if run.population_size == 0 {
        return Err(QmraError::ValidationError(format!(
            "site '{}' has an empty population",
            run.site
        )));
    }

    let infections = OutcomeStatistics::from_counts(run.results.iter().map(|r| r.infections))?;
    let illness = OutcomeStatistics::from_counts(run.results.iter().map(|r| r.illness))?;
    let population_size = run.population_size as f64;
    let risk_per_person = infections.mean / population_size;

    Ok(SiteSummary {
        site: run.site.clone(),
        population_size: run.population_size,
        iterations: run.iterations,
        dilution_mean: run.dilution_mean,
        dilution_median: run.dilution_median,
        infections,
        illness,
        risk_per_person,
        risk_per_person_median: infections.median / population_size,
        risk_category: RiskCategory::from_risk(risk_per_person),
        numerical_warnings: run.numerical_warnings,
    })
}
