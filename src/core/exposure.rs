//! Exposure pipeline: effluent concentration to ingested dose to infection probability.
//!
//! ```text
//! C_treated   = C_effluent / 10^log_removal
//! C_site      = C_treated / dilution            (or the hockey-stick response)
//! C_shellfish = C_site * BAF
//! dose        = C_shellfish * meal_size / GRAMS_PER_LITRE_EQUIVALENT
//! ```

use rand::Rng;
use rand::distr::{Bernoulli, Distribution};

use super::dose_response::{BetaBinomial, Evaluation};
use super::sampling::{BafSampler, DilutionSampler, EffluentSampler, MealSizeSampler};
use crate::config::{
    DilutionDataset, DilutionResponse, ExposureParameters, ExposureSharing, SiteConfig,
};
use crate::errors::{QmraError, Result};

/// Grams of shellfish flesh per litre of water equivalent.
pub const GRAMS_PER_LITRE_EQUIVALENT: f64 = 1000.;

/// Water-side draws of one exposure: everything up to the concentration at the site.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaterSample {
    pub effluent: f64,
    pub dilution: f64,
    pub site_concentration: f64,
}

/// One person's exposure.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Exposure {
    pub dose: f64,
    pub evaluation: Evaluation,
}

impl Exposure {
    pub fn probability(&self) -> f64 {
        self.evaluation.probability
    }
}

/// The exposure pipeline of one site, parameterized by the configured modes.
#[derive(Clone, Debug)]
pub struct ExposureModel<'a> {
    effluent: EffluentSampler,
    dilution: DilutionSampler<'a>,
    meal_size: MealSizeSampler,
    baf: BafSampler,
    treatment_factor: f64,
    response: DilutionResponse,
    sharing: ExposureSharing,
    discretize_dose: bool,
    dose_response: BetaBinomial,
}

impl<'a> ExposureModel<'a> {
    pub fn new(
        site: &SiteConfig,
        dilutions: &'a DilutionDataset,
        parameters: &ExposureParameters,
    ) -> Result<Self> {
        Ok(Self {
            effluent: EffluentSampler::new(&site.effluent, &parameters.effluent)?,
            dilution: DilutionSampler::new(dilutions)?,
            meal_size: MealSizeSampler::new(&parameters.meal_size, site.meal_size)?,
            baf: BafSampler::new(&parameters.baf)?,
            treatment_factor: 10f64.powf(site.log_removal),
            response: parameters.dilution_response.clone(),
            sharing: parameters.sharing,
            discretize_dose: parameters.discretize_dose,
            dose_response: BetaBinomial::from_parameters(&parameters.dose_response)?,
        })
    }

    pub fn sharing(&self) -> ExposureSharing {
        self.sharing
    }

    /// Concentration at the site for a given effluent concentration and dilution factor.
    pub fn site_concentration(&self, effluent: f64, dilution: f64) -> f64 {
        let treated = effluent / self.treatment_factor;
        let diluted = treated / dilution;
        match self.response {
            DilutionResponse::Linear => diluted,
            DilutionResponse::HockeyStick {
                threshold_dilution,
                floor_concentration,
            } => {
                if dilution <= threshold_dilution {
                    diluted
                } else {
                    f64::max(diluted, floor_concentration)
                }
            }
        }
    }

    /// Draw effluent concentration and dilution and combine them into the site concentration.
    pub fn draw_water<R: Rng + ?Sized>(&self, rng: &mut R) -> WaterSample {
        let effluent = self.effluent.sample(rng);
        let dilution = self.dilution.sample(rng);
        WaterSample {
            effluent,
            dilution,
            site_concentration: self.site_concentration(effluent, dilution),
        }
    }

    /// Expected number of organisms ingested with one meal.
    pub fn dose<R: Rng + ?Sized>(&self, site_concentration: f64, rng: &mut R) -> Result<f64> {
        let shellfish_concentration = site_concentration * self.baf.sample(rng);
        let meal_size = self.meal_size.sample(rng)?;
        let dose = shellfish_concentration * meal_size / GRAMS_PER_LITRE_EQUIVALENT;
        if self.discretize_dose {
            discretize(dose, rng)
        } else {
            Ok(dose)
        }
    }

    /// Dose and infection probability of one person drinking from a given water sample.
    pub fn expose<R: Rng + ?Sized>(&self, water: &WaterSample, rng: &mut R) -> Result<Exposure> {
        let dose = self.dose(water.site_concentration, rng)?;
        Ok(Exposure {
            dose,
            evaluation: self.dose_response.evaluate(dose)?,
        })
    }

    /// Run the full chain for one person.
    pub fn expose_person<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Exposure> {
        let water = self.draw_water(rng);
        self.expose(&water, rng)
    }
}

/// Convert an expected dose into a whole number of organisms: the integer part plus one more
/// organism with probability equal to the fractional part.
pub fn discretize<R: Rng + ?Sized>(dose: f64, rng: &mut R) -> Result<f64> {
    if dose.is_nan() || dose < 0. {
        return Err(QmraError::ValidationError(format!(
            "dose must be non-negative, got {dose}"
        )));
    }
    if !dose.is_finite() {
        return Ok(dose);
    }
    let whole = dose.floor();
    let extra = Bernoulli::new(dose - whole)
        .map_err(|err| QmraError::ValidationError(format!("invalid dose fraction: {err}")))?;
    Ok(whole + if extra.sample(rng) { 1. } else { 0. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EffluentRange, MealSizeMode};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn site(log_removal: f64) -> SiteConfig {
        SiteConfig {
            name: "Harbour".to_string(),
            effluent: EffluentRange::new(1000., 1000., 1000.),
            log_removal,
            meal_size: 50.,
            population_size: 10,
            iterations: 10,
        }
    }

    fn continuous() -> ExposureParameters {
        ExposureParameters {
            discretize_dose: false,
            ..Default::default()
        }
    }

    #[test]
    fn deterministic_chain() {
        let site = site(2.);
        let dilutions = DilutionDataset::new("Harbour", vec![5.]);
        let model = ExposureModel::new(&site, &dilutions, &continuous()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let exposure = model.expose_person(&mut rng).unwrap();
        // 1000 / 10^2 / 5 * 19.5 * 50 / 1000
        assert!((exposure.dose - 1.95).abs() < 1e-12);
        let expected = super::super::dose_response::infection_probability(1.95, 0.04, 0.055);
        assert_eq!(exposure.probability(), expected.unwrap());
    }

    #[test]
    fn zero_concentration_is_safe() {
        let site = site(400.);
        let dilutions = DilutionDataset::new("Harbour", vec![5.]);
        let model = ExposureModel::new(&site, &dilutions, &Default::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let exposure = model.expose_person(&mut rng).unwrap();
        assert_eq!(exposure.dose, 0.);
        assert_eq!(exposure.probability(), 0.);
    }

    #[test]
    fn hockey_stick_floor() {
        let site = site(0.);
        let dilutions = DilutionDataset::new("Harbour", vec![5.]);
        let parameters = ExposureParameters {
            dilution_response: DilutionResponse::HockeyStick {
                threshold_dilution: 100.,
                floor_concentration: 2.,
            },
            ..Default::default()
        };
        let model = ExposureModel::new(&site, &dilutions, &parameters).unwrap();
        assert_eq!(model.site_concentration(1000., 10.), 100.);
        assert_eq!(model.site_concentration(1000., 100.), 10.);
        assert_eq!(model.site_concentration(1000., 250.), 4.);
        assert_eq!(model.site_concentration(1000., 1000.), 2.);
        assert_eq!(model.site_concentration(1000., 1e6), 2.);
    }

    #[test]
    fn variable_meal_sizes_change_doses() {
        let site = site(2.);
        let dilutions = DilutionDataset::new("Harbour", vec![5.]);
        let parameters = ExposureParameters {
            meal_size: MealSizeMode::Variable(Default::default()),
            ..continuous()
        };
        let model = ExposureModel::new(&site, &dilutions, &parameters).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let water = model.draw_water(&mut rng);
        let doses: Vec<f64> = (0..100)
            .map(|_| model.expose(&water, &mut rng).unwrap().dose)
            .collect();
        assert!(doses.iter().any(|dose| (dose - doses[0]).abs() > 1e-9));
        // 5 g to 800 g meals
        assert!(doses.iter().all(|dose| (0.195..=31.2 + 1e-9).contains(dose)));
    }

    #[test]
    fn discretized_doses_are_whole() {
        let mut rng = StdRng::seed_from_u64(4);
        let draws: Vec<f64> = (0..10000)
            .map(|_| discretize(2.3, &mut rng).unwrap())
            .collect();
        assert!(draws.iter().all(|d| *d == 2. || *d == 3.));
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        assert!((mean - 2.3).abs() < 0.03);
        assert_eq!(discretize(4., &mut rng).unwrap(), 4.);
        assert!(discretize(-1., &mut rng).is_err());
    }

    #[test]
    fn missing_dilutions() {
        let site = site(2.);
        let dilutions = DilutionDataset::new("Harbour", vec![]);
        assert!(matches!(
            ExposureModel::new(&site, &dilutions, &Default::default()),
            Err(QmraError::ConfigurationError(_))
        ));
    }
}
