//! Site simulation: the Monte Carlo iteration loop for one site.
//!
//! Every iteration draws from its own random stream, seeded from the run seed, the index of the
//! site in its batch and the iteration number. Iterations therefore do not depend on each other
//! and sequential and parallel execution produce identical results.

use rand::SeedableRng;
use rand::rngs::StdRng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::cancel::CancellationToken;
use super::exposure::ExposureModel;
use super::outcome::{OutcomeModel, PopulationOutcome};
use crate::config::{DilutionDataset, ExposureParameters, ExposureSharing, SiteConfig};
use crate::errors::{QmraError, Result};

/// Outcome of one Monte Carlo iteration of one site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IterationResult {
    /// 1-based iteration number.
    pub iteration: usize,
    pub infections: u64,
    pub illness: u64,
}

/// All iterations of one site.
#[derive(Clone, Debug, PartialEq)]
pub struct SiteRun {
    pub site: String,
    pub population_size: usize,
    pub iterations: usize,
    pub dilution_mean: f64,
    pub dilution_median: f64,
    pub results: Vec<IterationResult>,
    /// Number of dose-response evaluations that had to be clamped.
    pub numerical_warnings: usize,
}

pub struct SiteSimulation<'a> {
    site: &'a SiteConfig,
    dilutions: &'a DilutionDataset,
    exposure: ExposureModel<'a>,
    outcome: OutcomeModel,
    seed: u64,
    site_index: u64,
}

impl<'a> SiteSimulation<'a> {
    /// Validate the inputs of a site and prepare its samplers. Fails before any iteration runs.
    pub fn new(
        site: &'a SiteConfig,
        dilutions: &'a DilutionDataset,
        parameters: &ExposureParameters,
        seed: u64,
        site_index: u64,
    ) -> Result<Self> {
        site.validate()?;
        if dilutions.site_name != site.name {
            return Err(QmraError::ConfigurationError(format!(
                "dilution data of site '{}' passed for site '{}'",
                dilutions.site_name, site.name
            )));
        }
        dilutions.validate()?;
        parameters.validate()?;

        Ok(Self {
            site,
            dilutions,
            exposure: ExposureModel::new(site, dilutions, parameters)?,
            outcome: OutcomeModel::new(parameters.illness_given_infection)?,
            seed,
            site_index,
        })
    }

    /// Simulate one iteration. Returns the iteration result and the number of clamped
    /// dose-response evaluations.
    pub fn run_iteration(&self, iteration: usize) -> Result<(IterationResult, usize)> {
        let mut rng = StdRng::seed_from_u64(stream_seed(self.seed, self.site_index, iteration));
        let mut clamped = 0;
        let population_size = self.site.population_size;

        let outcome: Result<PopulationOutcome> = match self.exposure.sharing() {
            ExposureSharing::PerIteration => {
                let water = self.exposure.draw_water(&mut rng);
                log::trace!(
                    "site={} iteration={iteration} effluent={} dilution={} concentration={}",
                    self.site.name,
                    water.effluent,
                    water.dilution,
                    water.site_concentration
                );
                self.outcome.simulate(population_size, &mut rng, |rng| {
                    let exposure = self.exposure.expose(&water, rng)?;
                    clamped += exposure.evaluation.clamped as usize;
                    Ok(exposure.probability())
                })
            }
            ExposureSharing::PerPerson => {
                self.outcome.simulate(population_size, &mut rng, |rng| {
                    let exposure = self.exposure.expose_person(rng)?;
                    clamped += exposure.evaluation.clamped as usize;
                    Ok(exposure.probability())
                })
            }
        };
        let outcome = outcome.map_err(|err| err.in_iteration(&self.site.name, iteration))?;

        Ok((
            IterationResult {
                iteration,
                infections: outcome.infections,
                illness: outcome.illness,
            },
            clamped,
        ))
    }

    #[cfg(not(feature = "parallel"))]
    fn run_iterations(&self, cancel: &CancellationToken) -> Result<Vec<(IterationResult, usize)>> {
        (1..=self.site.iterations)
            .map(|iteration| {
                if cancel.is_cancelled() {
                    return Err(QmraError::Cancelled);
                }
                self.run_iteration(iteration)
            })
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn run_iterations(&self, cancel: &CancellationToken) -> Result<Vec<(IterationResult, usize)>> {
        (1..=self.site.iterations)
            .into_par_iter()
            .map(|iteration| {
                if cancel.is_cancelled() {
                    return Err(QmraError::Cancelled);
                }
                self.run_iteration(iteration)
            })
            .collect()
    }

    pub fn run(&self, cancel: &CancellationToken) -> Result<SiteRun> {
        log::debug!(
            "Simulating site '{}': {} iterations of {} people...",
            self.site.name,
            self.site.iterations,
            self.site.population_size
        );
        let outcomes = self.run_iterations(cancel)?;

        let numerical_warnings: usize = outcomes.iter().map(|(_, clamped)| clamped).sum();
        if numerical_warnings > 0 {
            log::warn!(
                "Site '{}': {} dose-response evaluation(s) were clamped to 1.",
                self.site.name,
                numerical_warnings
            );
        }
        let results: Vec<IterationResult> = outcomes.into_iter().map(|(result, _)| result).collect();
        log::debug!("Finished site '{}'.", self.site.name);

        Ok(SiteRun {
            site: self.site.name.clone(),
            population_size: self.site.population_size,
            iterations: self.site.iterations,
            dilution_mean: self.dilutions.mean(),
            dilution_median: self.dilutions.median(),
            results,
            numerical_warnings,
        })
    }
}

/// Run all iterations of a single site.
pub fn run(
    site: &SiteConfig,
    dilutions: &DilutionDataset,
    parameters: &ExposureParameters,
    seed: u64,
) -> Result<SiteRun> {
    SiteSimulation::new(site, dilutions, parameters, seed, 0)?.run(&CancellationToken::new())
}

/// Seed of the random stream of one iteration of one site.
pub fn stream_seed(seed: u64, site_index: u64, iteration: usize) -> u64 {
    splitmix(splitmix(splitmix(seed) ^ site_index) ^ iteration as u64)
}

fn splitmix(value: u64) -> u64 {
    let mut z = value.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BafMode, EffluentRange, MealSizeMode, NormalBaf, TriangularBaf, UniformBaf,
    };

    fn site(log_removal: f64, iterations: usize) -> SiteConfig {
        SiteConfig {
            name: "Harbour".to_string(),
            effluent: EffluentRange::new(1., 1000., 100000.),
            log_removal,
            meal_size: 50.,
            population_size: 100,
            iterations,
        }
    }

    fn dilutions() -> DilutionDataset {
        DilutionDataset::new(
            "Harbour",
            vec![55., 70., 80., 90., 100., 100., 110., 120., 130., 145.],
        )
    }

    #[test]
    fn counts_are_bounded() {
        let site = site(2., 200);
        let parameters = ExposureParameters {
            meal_size: MealSizeMode::Variable(Default::default()),
            sharing: ExposureSharing::PerPerson,
            ..Default::default()
        };
        let run = run(&site, &dilutions(), &parameters, 1).unwrap();
        assert_eq!(run.results.len(), 200);
        for (index, result) in run.results.iter().enumerate() {
            assert_eq!(result.iteration, index + 1);
            assert!(result.infections <= 100);
            assert!(result.illness <= result.infections);
        }
    }

    #[test]
    fn reproducible_with_seed() {
        let site = site(2., 100);
        let first = run(&site, &dilutions(), &Default::default(), 42).unwrap();
        let second = run(&site, &dilutions(), &Default::default(), 42).unwrap();
        assert_eq!(first, second);
        let other = run(&site, &dilutions(), &Default::default(), 43).unwrap();
        assert_ne!(first.results, other.results);
    }

    #[test]
    fn iterations_are_independent() {
        let site = site(2., 50);
        let dilutions = dilutions();
        let parameters = ExposureParameters::default();
        let simulation = SiteSimulation::new(&site, &dilutions, &parameters, 7, 3).unwrap();
        let full = simulation.run(&CancellationToken::new()).unwrap();
        // any iteration can be replayed on its own
        for iteration in [50, 1, 17] {
            let (result, _) = simulation.run_iteration(iteration).unwrap();
            assert_eq!(result, full.results[iteration - 1]);
        }
    }

    #[test]
    fn more_removal_fewer_infections() {
        let dilutions = dilutions();
        let mean = |log_removal: f64| {
            let run = run(&site(log_removal, 300), &dilutions, &Default::default(), 11).unwrap();
            run.results.iter().map(|r| r.infections).sum::<u64>() as f64 / 300.
        };
        let low = mean(1.);
        let mid = mean(3.);
        let high = mean(6.);
        assert!(low > mid);
        assert!(mid > high);
    }

    #[test]
    fn variable_baf_drives_infections() {
        let site = site(3., 300);
        let dilutions = dilutions();
        let mean = |baf: BafMode| {
            let parameters = ExposureParameters {
                baf,
                sharing: ExposureSharing::PerPerson,
                ..Default::default()
            };
            let first = run(&site, &dilutions, &parameters, 5).unwrap();
            assert_eq!(first, run(&site, &dilutions, &parameters, 5).unwrap());
            assert!(first.results.iter().all(|r| r.infections <= 100));
            first.results.iter().map(|r| r.infections).sum::<u64>() as f64 / 300.
        };
        let low = mean(BafMode::Uniform(UniformBaf { low: 1., high: 2. }));
        let normal = mean(BafMode::Normal(NormalBaf {
            mean: 18.5,
            std_dev: 5.2,
            floor: 1.,
        }));
        let high = mean(BafMode::Triangular(TriangularBaf {
            min: 40.,
            mode: 60.,
            max: 80.,
        }));
        assert!(low < normal);
        assert!(normal < high);
    }

    #[test]
    fn mismatched_dilutions() {
        let site = site(2., 10);
        let dilutions = DilutionDataset::new("Elsewhere", vec![100.]);
        assert!(matches!(
            SiteSimulation::new(&site, &dilutions, &Default::default(), 1, 0),
            Err(QmraError::ConfigurationError(_))
        ));
    }

    #[test]
    fn empty_dilutions_fail_before_iterations() {
        let site = site(2., 10);
        let dilutions = DilutionDataset::new("Harbour", vec![]);
        assert!(matches!(
            run(&site, &dilutions, &Default::default(), 1),
            Err(QmraError::ConfigurationError(_))
        ));
    }

    #[test]
    fn unordered_effluent_fails() {
        let mut site = site(2., 10);
        site.effluent = EffluentRange::new(10., 1., 100.);
        assert!(matches!(
            run(&site, &dilutions(), &Default::default(), 1),
            Err(QmraError::ConfigurationError(_))
        ));
    }

    #[test]
    fn cancelled_before_start() {
        let site = site(2., 10);
        let dilutions = dilutions();
        let parameters = ExposureParameters::default();
        let simulation = SiteSimulation::new(&site, &dilutions, &parameters, 1, 0).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(simulation.run(&cancel), Err(QmraError::Cancelled));
    }

    #[test]
    fn distinct_streams() {
        assert_ne!(stream_seed(1, 0, 1), stream_seed(1, 0, 2));
        assert_ne!(stream_seed(1, 0, 1), stream_seed(1, 1, 1));
        assert_ne!(stream_seed(1, 0, 1), stream_seed(2, 0, 1));
    }
}
