use serde::{Deserialize, Serialize};

use crate::errors::{QmraError, Result};

/// Mean method harmonisation factor for mussels, used as the fixed bioaccumulation factor.
pub const DEFAULT_BAF: f64 = 19.5;

/// Teunis et al. (2008) norovirus dose-response parameters.
pub const DEFAULT_ALPHA: f64 = 0.04;
pub const DEFAULT_BETA: f64 = 0.055;

pub const DEFAULT_ILLNESS_GIVEN_INFECTION: f64 = 0.75;

/// LogLogistic meal size fit to the New Zealand shellfish consumption survey.
pub const DEFAULT_MEAL_SHAPE: f64 = 0.96;
pub const DEFAULT_MEAL_SCALE: f64 = 76.37;
pub const DEFAULT_MEAL_MIN: f64 = 5.;
pub const DEFAULT_MEAL_MAX: f64 = 800.;

pub const DEFAULT_PERCENTILE_BREAK: f64 = 0.95;

/// Parameters of the exposure and dose-response pipeline shared by all sites of a run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExposureParameters {
    /// Bioaccumulation factor from water to shellfish flesh.
    #[serde(default)]
    pub baf: BafMode,

    /// Meal size in grams.
    #[serde(default)]
    pub meal_size: MealSizeMode,

    /// Shape of the effluent concentration distribution between min, median and max.
    #[serde(default)]
    pub effluent: EffluentDistribution,

    /// Response of the site concentration to the dilution factor.
    #[serde(default)]
    pub dilution_response: DilutionResponse,

    /// Which draws are shared by the whole simulated population of an iteration.
    #[serde(default)]
    pub sharing: ExposureSharing,

    /// Convert the expected dose into a whole number of organisms before the dose-response
    /// evaluation.
    #[serde(default = "default_discretize_dose")]
    pub discretize_dose: bool,

    #[serde(default)]
    pub dose_response: DoseResponseParameters,

    /// Probability that an infected person becomes ill.
    #[serde(default = "default_illness_given_infection")]
    pub illness_given_infection: f64,
}

fn default_discretize_dose() -> bool {
    true
}

fn default_illness_given_infection() -> f64 {
    DEFAULT_ILLNESS_GIVEN_INFECTION
}

impl Default for ExposureParameters {
    fn default() -> Self {
        Self {
            baf: BafMode::default(),
            meal_size: MealSizeMode::default(),
            effluent: EffluentDistribution::default(),
            dilution_response: DilutionResponse::default(),
            sharing: ExposureSharing::default(),
            discretize_dose: default_discretize_dose(),
            dose_response: DoseResponseParameters::default(),
            illness_given_infection: default_illness_given_infection(),
        }
    }
}

impl ExposureParameters {
    pub fn validate(&self) -> Result<()> {
        self.baf.validate()?;
        self.meal_size.validate()?;
        self.effluent.validate()?;
        self.dilution_response.validate()?;
        self.dose_response.validate()?;
        if !(0. ..=1.).contains(&self.illness_given_infection) {
            return Err(QmraError::ConfigurationError(format!(
                "illness given infection must be a probability, got {}",
                self.illness_given_infection
            )));
        }
        Ok(())
    }
}

/// Bioaccumulation factor: a constant, or a distribution representing measurement uncertainty.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum BafMode {
    Fixed(f64),
    Uniform(UniformBaf),
    Triangular(TriangularBaf),
    Normal(NormalBaf),
}

impl Default for BafMode {
    fn default() -> Self {
        BafMode::Fixed(DEFAULT_BAF)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct UniformBaf {
    pub low: f64,
    pub high: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TriangularBaf {
    pub min: f64,
    pub mode: f64,
    pub max: f64,
}

/// Normal distribution truncated from below at `floor`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NormalBaf {
    pub mean: f64,
    pub std_dev: f64,
    pub floor: f64,
}

impl BafMode {
    fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(QmraError::ConfigurationError(message));
        match self {
            BafMode::Fixed(value) if !value.is_finite() || *value <= 0. => {
                invalid(format!("fixed BAF must be positive, got {value}"))
            }
            BafMode::Fixed(_) => Ok(()),
            BafMode::Uniform(UniformBaf { low, high }) => {
                if *low <= 0. || low > high {
                    invalid(format!("uniform BAF requires 0 < low <= high, got [{low}, {high}]"))
                } else {
                    Ok(())
                }
            }
            BafMode::Triangular(TriangularBaf { min, mode, max }) => {
                if *min <= 0. || min > mode || mode > max {
                    invalid(format!(
                        "triangular BAF requires 0 < min <= mode <= max, got ({min}, {mode}, {max})"
                    ))
                } else {
                    Ok(())
                }
            }
            BafMode::Normal(NormalBaf {
                mean,
                std_dev,
                floor,
            }) => {
                if !mean.is_finite() || *std_dev < 0. || *floor <= 0. {
                    invalid(format!(
                        "normal BAF requires std_dev >= 0 and floor > 0, got mean={mean}, std_dev={std_dev}, floor={floor}"
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub enum MealSizeMode {
    /// Use the reference meal size of the site.
    #[default]
    Fixed,
    Variable(LogLogisticParameters),
}

impl MealSizeMode {
    fn validate(&self) -> Result<()> {
        match self {
            MealSizeMode::Fixed => Ok(()),
            MealSizeMode::Variable(parameters) => parameters.validate(),
        }
    }
}

/// LogLogistic (Fisk) distribution, optionally shifted by `location` and truncated to
/// `[min, max]`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogLogisticParameters {
    pub shape: f64,
    pub scale: f64,
    #[serde(default)]
    pub location: f64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl Default for LogLogisticParameters {
    fn default() -> Self {
        Self {
            shape: DEFAULT_MEAL_SHAPE,
            scale: DEFAULT_MEAL_SCALE,
            location: 0.,
            min: Some(DEFAULT_MEAL_MIN),
            max: Some(DEFAULT_MEAL_MAX),
        }
    }
}

impl LogLogisticParameters {
    fn validate(&self) -> Result<()> {
        if !(self.shape > 0. && self.scale > 0.) || !self.location.is_finite() {
            return Err(QmraError::ConfigurationError(format!(
                "meal size distribution requires positive shape and scale, got shape={}, scale={}",
                self.shape, self.scale
            )));
        }
        let lower = self.min.unwrap_or(0.);
        let upper = self.max.unwrap_or(f64::INFINITY);
        if lower >= upper || upper <= 0. {
            return Err(QmraError::ConfigurationError(format!(
                "meal size truncation [{lower}, {upper}] leaves no positive meal sizes"
            )));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub enum EffluentDistribution {
    #[default]
    Triangular,
    /// Piecewise distribution rising to the median, linear up to a break percentile and a tail
    /// towards the maximum.
    HockeyStick { percentile_break: f64 },
}

impl EffluentDistribution {
    fn validate(&self) -> Result<()> {
        match self {
            EffluentDistribution::Triangular => Ok(()),
            EffluentDistribution::HockeyStick { percentile_break } => {
                if *percentile_break > 0.5 && *percentile_break < 1. {
                    Ok(())
                } else {
                    Err(QmraError::ConfigurationError(format!(
                        "hockey-stick percentile break must lie in (0.5, 1), got {percentile_break}"
                    )))
                }
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub enum DilutionResponse {
    /// Site concentration scales with the inverse of the dilution factor.
    #[default]
    Linear,
    /// Beyond `threshold_dilution` the site concentration does not fall below
    /// `floor_concentration`.
    HockeyStick {
        threshold_dilution: f64,
        floor_concentration: f64,
    },
}

impl DilutionResponse {
    fn validate(&self) -> Result<()> {
        match self {
            DilutionResponse::Linear => Ok(()),
            DilutionResponse::HockeyStick {
                threshold_dilution,
                floor_concentration,
            } => {
                if *threshold_dilution > 0. && *floor_concentration >= 0. {
                    Ok(())
                } else {
                    Err(QmraError::ConfigurationError(format!(
                        "hockey-stick dilution requires a positive threshold and a non-negative floor, got threshold={threshold_dilution}, floor={floor_concentration}"
                    )))
                }
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExposureSharing {
    /// Effluent concentration and dilution are drawn once per iteration; meal size, BAF and dose
    /// discretization are drawn for every person.
    #[default]
    PerIteration,
    /// Every person draws the full exposure chain.
    PerPerson,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct DoseResponseParameters {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for DoseResponseParameters {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
        }
    }
}

impl DoseResponseParameters {
    fn validate(&self) -> Result<()> {
        if self.alpha > 0. && self.beta > 0. && self.alpha.is_finite() && self.beta.is_finite() {
            Ok(())
        } else {
            Err(QmraError::ValidationError(format!(
                "dose-response parameters must be positive, got alpha={}, beta={}",
                self.alpha, self.beta
            )))
        }
    }
}
