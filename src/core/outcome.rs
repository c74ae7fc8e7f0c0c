//! Population outcome: per-person infection and illness trials for one iteration.

use rand::Rng;
use rand::distr::{Bernoulli, Distribution};

use crate::errors::{QmraError, Result};

/// Infection and illness counts of one simulated population.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PopulationOutcome {
    pub infections: u64,
    pub illness: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct OutcomeModel {
    illness: Bernoulli,
}

impl OutcomeModel {
    pub fn new(illness_given_infection: f64) -> Result<Self> {
        let illness = Bernoulli::new(illness_given_infection).map_err(|_| {
            QmraError::ValidationError(format!(
                "illness given infection must be a probability, got {illness_given_infection}"
            ))
        })?;
        Ok(Self { illness })
    }

    /// Bernoulli infection trial for one person, followed by the illness trial if infected.
    /// Returns `(infected, ill)`.
    pub fn trial<R: Rng + ?Sized>(&self, probability: f64, rng: &mut R) -> Result<(bool, bool)> {
        let infection = Bernoulli::new(probability).map_err(|_| {
            QmraError::ValidationError(format!(
                "infection probability must lie in [0, 1], got {probability}"
            ))
        })?;
        if infection.sample(rng) {
            Ok((true, self.illness.sample(rng)))
        } else {
            Ok((false, false))
        }
    }

    /// Simulate a population of `population_size` people. `probability` is called once per
    /// person and yields that person's infection probability.
    pub fn simulate<R, F>(
        &self,
        population_size: usize,
        rng: &mut R,
        mut probability: F,
    ) -> Result<PopulationOutcome>
    where
        R: Rng + ?Sized,
        F: FnMut(&mut R) -> Result<f64>,
    {
        let mut outcome = PopulationOutcome::default();
        for _ in 0..population_size {
            let p = probability(rng)?;
            let (infected, ill) = self.trial(p, rng)?;
            outcome.infections += infected as u64;
            outcome.illness += ill as u64;
        }
        Ok(outcome)
    }
}
