//! Site inputs: the monitoring site and its dilution measurements.

use serde::{Deserialize, Serialize};

use crate::errors::{QmraError, Result};

/// Below this many measurements the empirical dilution distribution is considered thin.
pub const MIN_RECOMMENDED_DILUTIONS: usize = 5;

/// Triangular effluent concentration parameters in genome copies per litre.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EffluentRange {
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

impl EffluentRange {
    pub fn new(min: f64, median: f64, max: f64) -> Self {
        Self { min, median, max }
    }

    /// All three values coincide and the distribution collapses to a constant.
    pub fn is_degenerate(&self) -> bool {
        self.min == self.median && self.median == self.max
    }

    pub fn validate(&self) -> Result<()> {
        let values = [self.min, self.median, self.max];
        if values.iter().any(|value| !value.is_finite() || *value <= 0.) {
            return Err(QmraError::ConfigurationError(format!(
                "effluent concentrations must be positive, got min={}, median={}, max={}",
                self.min, self.median, self.max
            )));
        }
        if self.min > self.median || self.median > self.max {
            return Err(QmraError::ConfigurationError(format!(
                "effluent concentrations must satisfy min <= median <= max, got min={}, median={}, max={}",
                self.min, self.median, self.max
            )));
        }
        Ok(())
    }
}

/// One monitored shellfish site.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SiteConfig {
    pub name: String,

    pub effluent: EffluentRange,

    /// Treatment plant removal in log10 units.
    pub log_removal: f64,

    /// Reference meal size in grams, used when the meal size is not sampled.
    pub meal_size: f64,

    /// Number of people simulated per iteration.
    pub population_size: usize,

    /// Number of Monte Carlo iterations.
    pub iterations: usize,
}

impl SiteConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(QmraError::ConfigurationError(
                "site name must not be empty".to_string(),
            ));
        }
        self.effluent.validate().map_err(|err| match err {
            QmraError::ConfigurationError(message) => {
                QmraError::ConfigurationError(format!("site '{}': {}", self.name, message))
            }
            other => other,
        })?;
        if !self.log_removal.is_finite() || self.log_removal < 0. {
            return Err(QmraError::ConfigurationError(format!(
                "site '{}': log removal must be non-negative, got {}",
                self.name, self.log_removal
            )));
        }
        if !self.meal_size.is_finite() || self.meal_size <= 0. {
            return Err(QmraError::ConfigurationError(format!(
                "site '{}': meal size must be positive, got {}",
                self.name, self.meal_size
            )));
        }
        if self.population_size == 0 {
            return Err(QmraError::ConfigurationError(format!(
                "site '{}': population size must be positive",
                self.name
            )));
        }
        if self.iterations == 0 {
            return Err(QmraError::ConfigurationError(format!(
                "site '{}': iteration count must be positive",
                self.name
            )));
        }
        Ok(())
    }
}

/// Empirical dilution factors measured for one site.
///
/// The values are resampled with replacement and never fitted to a parametric distribution.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DilutionDataset {
    pub site_name: String,
    pub values: Vec<f64>,
}

impl DilutionDataset {
    pub fn new(site_name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            site_name: site_name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.is_empty() {
            return f64::NAN;
        }
        self.values.iter().sum::<f64>() / self.len() as f64
    }

    pub fn median(&self) -> f64 {
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);
        crate::stats::percentile(&sorted, 50.)
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(QmraError::ConfigurationError(format!(
                "site '{}' has no dilution measurements",
                self.site_name
            )));
        }
        if let Some(value) = self
            .values
            .iter()
            .find(|value| !value.is_finite() || **value <= 0.)
        {
            return Err(QmraError::ConfigurationError(format!(
                "site '{}': dilution factors must be positive, got {}",
                self.site_name, value
            )));
        }
        if self.len() < MIN_RECOMMENDED_DILUTIONS {
            log::warn!(
                "Site '{}' has only {} dilution measurement(s), the empirical distribution is thin.",
                self.site_name,
                self.len()
            );
        }
        Ok(())
    }
}
