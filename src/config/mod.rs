//! Configuration data structures for risk assessment runs.

mod parameters;
mod settings;
mod site;

pub use parameters::{
    BafMode, DEFAULT_ALPHA, DEFAULT_BAF, DEFAULT_BETA,
    DEFAULT_ILLNESS_GIVEN_INFECTION, DEFAULT_PERCENTILE_BREAK, DilutionResponse,
    DoseResponseParameters, EffluentDistribution, ExposureParameters, ExposureSharing,
    LogLogisticParameters, MealSizeMode, NormalBaf, TriangularBaf, UniformBaf,
};
pub use settings::{Settings, SettingsError};
pub use site::{DilutionDataset, EffluentRange, MIN_RECOMMENDED_DILUTIONS, SiteConfig};
