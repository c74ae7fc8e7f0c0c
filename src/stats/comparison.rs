use itertools::Itertools;
use std::collections::HashMap;

use super::summary::{RiskCategory, SiteSummary};

/// Trait extension to compare site summaries of a batch
pub trait SiteComparison {
    /// Summaries ordered from the highest to the lowest mean risk per person.
    fn ranked_by_risk(&self) -> Vec<&SiteSummary>;

    fn highest_risk(&self) -> Option<&SiteSummary>;

    /// Number of sites in each risk category.
    fn category_counts(&self) -> HashMap<RiskCategory, usize>;

    /// Mean risk per person across sites, weighting every site equally.
    fn mean_risk(&self) -> Option<f64>;
}

impl SiteComparison for [SiteSummary] {
    fn ranked_by_risk(&self) -> Vec<&SiteSummary> {
        self.iter()
            .sorted_by(|a, b| {
                b.risk_per_person
                    .total_cmp(&a.risk_per_person)
                    .then_with(|| a.site.cmp(&b.site))
            })
            .collect()
    }

    fn highest_risk(&self) -> Option<&SiteSummary> {
        self.iter()
            .max_by(|a, b| a.risk_per_person.total_cmp(&b.risk_per_person))
    }

    fn category_counts(&self) -> HashMap<RiskCategory, usize> {
        self.iter().map(|summary| summary.risk_category).counts()
    }

    fn mean_risk(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(self.iter().map(|summary| summary.risk_per_person).sum::<f64>() / self.len() as f64)
    }
}
