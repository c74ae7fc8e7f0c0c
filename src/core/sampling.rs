//! Random draws for effluent concentration, dilution, meal size and bioaccumulation factor.
//!
//! Samplers hold only their configuration. All randomness comes from the generator passed to
//! each call, so the same sampler can be shared by concurrently running iterations.

use rand::Rng;
use rand::distr::{Distribution, Open01, Uniform};
use rand_distr::{Normal, Triangular};

use crate::config::{
    BafMode, DilutionDataset, EffluentDistribution, EffluentRange, LogLogisticParameters,
    MealSizeMode, NormalBaf, TriangularBaf, UniformBaf,
};
use crate::errors::{QmraError, Result};

/// Upper bound on rejected meal size draws before giving up.
pub const MAX_MEAL_REDRAWS: usize = 10_000;

/// Effluent concentration in genome copies per litre.
#[derive(Clone, Debug)]
pub enum EffluentSampler {
    Constant(f64),
    Triangular(Triangular<f64>),
    HockeyStick(HockeyStick),
}

impl EffluentSampler {
    pub fn new(range: &EffluentRange, distribution: &EffluentDistribution) -> Result<Self> {
        range.validate()?;
        if range.is_degenerate() {
            return Ok(EffluentSampler::Constant(range.median));
        }
        match distribution {
            EffluentDistribution::Triangular => Triangular::new(range.min, range.max, range.median)
                .map(EffluentSampler::Triangular)
                .map_err(|err| {
                    QmraError::ConfigurationError(format!(
                        "invalid triangular effluent distribution: {err}"
                    ))
                }),
            EffluentDistribution::HockeyStick { percentile_break } => Ok(
                EffluentSampler::HockeyStick(HockeyStick::new(range, *percentile_break)?),
            ),
        }
    }
}

impl Distribution<f64> for EffluentSampler {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            EffluentSampler::Constant(value) => *value,
            EffluentSampler::Triangular(triangular) => triangular.sample(rng),
            EffluentSampler::HockeyStick(hockey_stick) => hockey_stick.sample(rng),
        }
    }
}

/// Piecewise effluent distribution: a triangular rise from the minimum to the median, a linear
/// section up to the break percentile and a linear tail towards the maximum.
#[derive(Clone, Debug, PartialEq)]
pub struct HockeyStick {
    min: f64,
    median: f64,
    breakpoint: f64,
    max: f64,
    percentile_break: f64,
}

impl HockeyStick {
    pub fn new(range: &EffluentRange, percentile_break: f64) -> Result<Self> {
        if !(percentile_break > 0.5 && percentile_break < 1.) {
            return Err(QmraError::ConfigurationError(format!(
                "hockey-stick percentile break must lie in (0.5, 1), got {percentile_break}"
            )));
        }
        Ok(Self {
            min: range.min,
            median: range.median,
            breakpoint: range.median + (range.max - range.median) * percentile_break,
            max: range.max,
            percentile_break,
        })
    }

    /// Map a uniform quantile onto the distribution.
    pub fn quantile(&self, u: f64) -> f64 {
        if u <= 0.5 {
            self.min + (self.median - self.min) * (2. * u).sqrt()
        } else if u <= self.percentile_break {
            self.median
                + (u - 0.5) * (self.breakpoint - self.median) / (self.percentile_break - 0.5)
        } else {
            self.breakpoint
                + (u - self.percentile_break) * (self.max - self.breakpoint)
                    / (1. - self.percentile_break)
        }
    }
}

impl Distribution<f64> for HockeyStick {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.quantile(rng.random::<f64>())
    }
}

/// Resamples measured dilution factors with replacement.
#[derive(Clone, Debug)]
pub struct DilutionSampler<'a> {
    values: &'a [f64],
}

impl<'a> DilutionSampler<'a> {
    pub fn new(dataset: &'a DilutionDataset) -> Result<Self> {
        if dataset.is_empty() {
            return Err(QmraError::ConfigurationError(format!(
                "site '{}' has no dilution measurements",
                dataset.site_name
            )));
        }
        Ok(Self {
            values: &dataset.values,
        })
    }
}

impl Distribution<f64> for DilutionSampler<'_> {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.values[rng.random_range(0..self.values.len())]
    }
}

/// LogLogistic (Fisk) distribution with shape `c`, scale `s` and location `l`, sampled by
/// inversion: `l + s * (u / (1 - u))^(1 / c)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LogLogistic {
    shape: f64,
    scale: f64,
    location: f64,
}

impl LogLogistic {
    pub fn new(shape: f64, scale: f64, location: f64) -> Result<Self> {
        if !(shape > 0. && scale > 0.) || !shape.is_finite() || !scale.is_finite() {
            return Err(QmraError::ConfigurationError(format!(
                "loglogistic distribution requires positive shape and scale, got shape={shape}, scale={scale}"
            )));
        }
        Ok(Self {
            shape,
            scale,
            location,
        })
    }

    pub fn quantile(&self, u: f64) -> f64 {
        self.location + self.scale * (u / (1. - u)).powf(1. / self.shape)
    }
}

impl Distribution<f64> for LogLogistic {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = Open01.sample(rng);
        self.quantile(u)
    }
}

/// Meal size in grams.
#[derive(Clone, Debug)]
pub enum MealSizeSampler {
    Fixed(f64),
    Variable {
        distribution: LogLogistic,
        min: f64,
        max: f64,
    },
}

impl MealSizeSampler {
    pub fn new(mode: &MealSizeMode, reference_meal_size: f64) -> Result<Self> {
        match mode {
            MealSizeMode::Fixed => {
                if reference_meal_size.is_finite() && reference_meal_size > 0. {
                    Ok(MealSizeSampler::Fixed(reference_meal_size))
                } else {
                    Err(QmraError::ConfigurationError(format!(
                        "meal size must be positive, got {reference_meal_size}"
                    )))
                }
            }
            MealSizeMode::Variable(LogLogisticParameters {
                shape,
                scale,
                location,
                min,
                max,
            }) => Ok(MealSizeSampler::Variable {
                distribution: LogLogistic::new(*shape, *scale, *location)?,
                min: min.unwrap_or(0.),
                max: max.unwrap_or(f64::INFINITY),
            }),
        }
    }

    /// Draw a strictly positive meal size within the truncation bounds, redrawing rejected
    /// values.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        match self {
            MealSizeSampler::Fixed(value) => Ok(*value),
            MealSizeSampler::Variable {
                distribution,
                min,
                max,
            } => {
                for _ in 0..MAX_MEAL_REDRAWS {
                    let meal_size = distribution.sample(rng);
                    if meal_size > 0. && meal_size >= *min && meal_size <= *max {
                        return Ok(meal_size);
                    }
                }
                Err(QmraError::ValidationError(format!(
                    "no meal size within [{min}, {max}] after {MAX_MEAL_REDRAWS} draws"
                )))
            }
        }
    }
}

/// Bioaccumulation factor.
#[derive(Clone, Debug)]
pub enum BafSampler {
    Fixed(f64),
    Uniform(Uniform<f64>),
    Triangular(Triangular<f64>),
    Normal { distribution: Normal<f64>, floor: f64 },
}

impl BafSampler {
    pub fn new(mode: &BafMode) -> Result<Self> {
        let invalid = |message: String| QmraError::ConfigurationError(message);
        match mode {
            BafMode::Fixed(value) => {
                if value.is_finite() && *value > 0. {
                    Ok(BafSampler::Fixed(*value))
                } else {
                    Err(invalid(format!("fixed BAF must be positive, got {value}")))
                }
            }
            BafMode::Uniform(UniformBaf { low, high }) => {
                Uniform::new_inclusive(*low, *high)
                    .map(BafSampler::Uniform)
                    .map_err(|err| invalid(format!("invalid uniform BAF distribution: {err}")))
            }
            BafMode::Triangular(TriangularBaf { min, mode, max }) => {
                if min == max {
                    return Ok(BafSampler::Fixed(*mode));
                }
                Triangular::new(*min, *max, *mode)
                    .map(BafSampler::Triangular)
                    .map_err(|err| invalid(format!("invalid triangular BAF distribution: {err}")))
            }
            BafMode::Normal(NormalBaf {
                mean,
                std_dev,
                floor,
            }) => Normal::new(*mean, *std_dev)
                .map(|distribution| BafSampler::Normal {
                    distribution,
                    floor: *floor,
                })
                .map_err(|err| invalid(format!("invalid normal BAF distribution: {err}"))),
        }
    }
}

impl Distribution<f64> for BafSampler {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            BafSampler::Fixed(value) => *value,
            BafSampler::Uniform(uniform) => uniform.sample(rng),
            BafSampler::Triangular(triangular) => triangular.sample(rng),
            BafSampler::Normal {
                distribution,
                floor,
            } => f64::max(distribution.sample(rng), *floor),
        }
    }
}
