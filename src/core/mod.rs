//! The risk simulation engine.
//!
//! Samplers and the dose-response model are composed by the exposure pipeline, whose per-person
//! infection probabilities drive the population outcome model. The site simulation repeats this
//! for every Monte Carlo iteration.

mod cancel;

pub mod dose_response;
pub mod exposure;
pub mod outcome;
pub mod sampling;
pub mod site;

pub use cancel::CancellationToken;
pub use dose_response::{BetaBinomial, Evaluation, infection_probability};
pub use exposure::{Exposure, ExposureModel, GRAMS_PER_LITRE_EQUIVALENT, WaterSample};
pub use outcome::{OutcomeModel, PopulationOutcome};
pub use site::{IterationResult, SiteRun, SiteSimulation};
