//! Batch entry point: simulate and summarize many sites in one call.
//!
//! Configuration errors of a site are isolated and reported next to the summaries of the other
//! sites. Validation errors indicate a defect and abort the whole batch.

use std::collections::{HashMap, HashSet};

use crate::config::{DilutionDataset, ExposureParameters, SiteConfig};
use crate::core::{CancellationToken, SiteRun, SiteSimulation};
use crate::errors::{QmraError, Result};
use crate::stats::{SiteSummary, summarize};

#[derive(Clone, Debug, Default)]
pub struct BatchOptions {
    /// Seed of the random streams of all sites.
    pub seed: u64,
    pub cancellation: CancellationToken,
}

impl BatchOptions {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }
}

/// Raw iterations and summary of a successfully simulated site.
#[derive(Clone, Debug, PartialEq)]
pub struct SiteResult {
    pub run: SiteRun,
    pub summary: SiteSummary,
}

/// A site that could not be simulated.
#[derive(Clone, Debug, PartialEq)]
pub struct SiteFailure {
    pub site: String,
    pub error: QmraError,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchResult {
    pub sites: Vec<SiteResult>,
    pub failures: Vec<SiteFailure>,
}

impl BatchResult {
    pub fn summaries(&self) -> Vec<SiteSummary> {
        self.sites.iter().map(|site| site.summary.clone()).collect()
    }

    pub fn get(&self, site: &str) -> Option<&SiteResult> {
        self.sites.iter().find(|result| result.run.site == site)
    }

    pub fn failure(&self, site: &str) -> Option<&SiteFailure> {
        self.failures.iter().find(|failure| failure.site == site)
    }
}

/// Simulate every site with its matching dilution dataset.
pub fn simulate_batch(
    sites: &[SiteConfig],
    dilutions: &[DilutionDataset],
    parameters: &ExposureParameters,
    options: &BatchOptions,
) -> Result<BatchResult> {
    simulate_batch_with(sites, dilutions, parameters, options, |_| {})
}

/// Like [`simulate_batch`], calling `on_site` with the name of every site once it is done.
pub fn simulate_batch_with<F>(
    sites: &[SiteConfig],
    dilutions: &[DilutionDataset],
    parameters: &ExposureParameters,
    options: &BatchOptions,
    mut on_site: F,
) -> Result<BatchResult>
where
    F: FnMut(&str),
{
    let mut datasets: HashMap<&str, &DilutionDataset> = HashMap::new();
    for dataset in dilutions {
        datasets.entry(dataset.site_name.as_str()).or_insert(dataset);
    }

    let mut batch = BatchResult::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for (site_index, site) in sites.iter().enumerate() {
        let outcome = if !seen.insert(site.name.as_str()) {
            Err(QmraError::ConfigurationError(format!(
                "site '{}' is defined more than once",
                site.name
            )))
        } else if options.cancellation.is_cancelled() {
            Err(QmraError::Cancelled)
        } else {
            match datasets.get(site.name.as_str()) {
                None => Err(QmraError::ConfigurationError(format!(
                    "site '{}' has no dilution data",
                    site.name
                ))),
                Some(dataset) => simulate_site(site, dataset, parameters, options, site_index),
            }
        };

        match outcome {
            Ok(result) => {
                log::info!(
                    "Site '{}': mean infections {:.2}, mean illness {:.2}, risk per person {:.4}",
                    result.summary.site,
                    result.summary.infections.mean,
                    result.summary.illness.mean,
                    result.summary.risk_per_person
                );
                batch.sites.push(result);
            }
            Err(error @ QmraError::ValidationError(_)) => {
                log::error!("Aborting batch: {error}");
                return Err(error);
            }
            Err(error) => {
                log::warn!("Skipping site '{}': {}", site.name, error);
                batch.failures.push(SiteFailure {
                    site: site.name.clone(),
                    error,
                });
            }
        }
        on_site(&site.name);
    }

    Ok(batch)
}

fn simulate_site(
    site: &SiteConfig,
    dilutions: &DilutionDataset,
    parameters: &ExposureParameters,
    options: &BatchOptions,
    site_index: usize,
) -> Result<SiteResult> {
    let simulation =
        SiteSimulation::new(site, dilutions, parameters, options.seed, site_index as u64)?;
    let run = simulation.run(&options.cancellation)?;
    let summary = summarize(&run)?;
    Ok(SiteResult { run, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DoseResponseParameters, EffluentRange};

    fn site(name: &str) -> SiteConfig {
        SiteConfig {
            name: name.to_string(),
            effluent: EffluentRange::new(1., 1000., 100000.),
            log_removal: 2.,
            meal_size: 50.,
            population_size: 20,
            iterations: 25,
        }
    }

    fn dilutions(name: &str) -> DilutionDataset {
        DilutionDataset::new(name, vec![50., 80., 100., 120., 150.])
    }

    #[test]
    fn isolates_configuration_errors() {
        let mut broken = site("Broken");
        broken.effluent = EffluentRange::new(100., 10., 1000.);
        let sites = vec![site("A"), site("Orphan"), broken, site("B")];
        let datasets = vec![dilutions("A"), dilutions("B"), dilutions("Broken")];

        let batch = simulate_batch(
            &sites,
            &datasets,
            &Default::default(),
            &BatchOptions::with_seed(1),
        )
        .unwrap();

        let names: Vec<&str> = batch.sites.iter().map(|s| s.summary.site.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(batch.failures.len(), 2);
        assert!(matches!(
            batch.failure("Orphan").unwrap().error,
            QmraError::ConfigurationError(_)
        ));
        assert!(matches!(
            batch.failure("Broken").unwrap().error,
            QmraError::ConfigurationError(_)
        ));
        assert!(batch.get("Orphan").is_none());
    }

    #[test]
    fn duplicate_sites() {
        let sites = vec![site("A"), site("A")];
        let batch = simulate_batch(
            &sites,
            &[dilutions("A")],
            &Default::default(),
            &BatchOptions::with_seed(1),
        )
        .unwrap();
        assert_eq!(batch.sites.len(), 1);
        assert_eq!(batch.failures.len(), 1);
    }

    #[test]
    fn validation_errors_abort() {
        let parameters = ExposureParameters {
            dose_response: DoseResponseParameters {
                alpha: 0.,
                beta: 0.055,
            },
            ..Default::default()
        };
        let result = simulate_batch(
            &[site("A")],
            &[dilutions("A")],
            &parameters,
            &BatchOptions::with_seed(1),
        );
        assert!(matches!(result, Err(QmraError::ValidationError(_))));
    }

    #[test]
    fn cancellation_keeps_completed_sites() {
        let sites = vec![site("A"), site("B"), site("C")];
        let datasets = vec![dilutions("A"), dilutions("B"), dilutions("C")];
        let options = BatchOptions::with_seed(3);
        let token = options.cancellation.clone();
        let mut done = Vec::new();
        let batch = simulate_batch_with(&sites, &datasets, &Default::default(), &options, |name| {
            done.push(name.to_string());
            if name == "A" {
                token.cancel();
            }
        })
        .unwrap();

        assert_eq!(done, vec!["A", "B", "C"]);
        assert_eq!(batch.sites.len(), 1);
        assert_eq!(batch.sites[0].summary.site, "A");
        assert_eq!(batch.sites[0].run.results.len(), 25);
        assert!(
            batch
                .failures
                .iter()
                .all(|failure| failure.error == QmraError::Cancelled)
        );
    }

    #[test]
    fn sites_use_distinct_streams() {
        let sites = vec![site("A"), site("B")];
        let datasets = vec![dilutions("A"), dilutions("B")];
        let batch = simulate_batch(
            &sites,
            &datasets,
            &Default::default(),
            &BatchOptions::with_seed(5),
        )
        .unwrap();
        assert_ne!(batch.sites[0].run.results, batch.sites[1].run.results);
    }
}
