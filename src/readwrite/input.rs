//! Tabular inputs: one row per site and one row per dilution measurement.
//!
//! Records keep every field optional so that missing values reach the quality report instead of
//! failing the whole file.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::{fs, io, path::Path};

use crate::config::{DilutionDataset, EffluentRange, SiteConfig};
use crate::errors::{QmraError, Result};

pub const SITE_COLUMNS: [&str; 8] = [
    "Site_Name",
    "Effluent_Min",
    "Effluent_Median",
    "Effluent_Max",
    "WWTP_Log_Removal",
    "Meal_Size_g",
    "Num_People",
    "Iterations",
];

pub const DILUTION_COLUMNS: [&str; 2] = ["Site_Name", "Dilution_Value"];

/// Largest accepted population size or iteration count.
pub const MAX_COUNT: u32 = u32::MAX;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SiteRecord {
    #[serde(rename = "Site_Name")]
    pub site_name: Option<String>,
    #[serde(rename = "Effluent_Min")]
    pub effluent_min: Option<f64>,
    #[serde(rename = "Effluent_Median")]
    pub effluent_median: Option<f64>,
    #[serde(rename = "Effluent_Max")]
    pub effluent_max: Option<f64>,
    #[serde(rename = "WWTP_Log_Removal")]
    pub log_removal: Option<f64>,
    #[serde(rename = "Meal_Size_g")]
    pub meal_size: Option<f64>,
    // read as reals so that fractional counts can be reported
    #[serde(rename = "Num_People")]
    pub population_size: Option<f64>,
    #[serde(rename = "Iterations")]
    pub iterations: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DilutionRecord {
    #[serde(rename = "Site_Name")]
    pub site_name: Option<String>,
    #[serde(rename = "Dilution_Value")]
    pub dilution: Option<f64>,
}

/// Rows of one input file together with the required columns its header lacks.
#[derive(Debug, Clone, PartialEq)]
pub struct Table<T> {
    pub records: Vec<T>,
    pub missing_columns: Vec<&'static str>,
}

impl<T> Table<T> {
    pub fn is_complete(&self) -> bool {
        self.missing_columns.is_empty()
    }
}

pub type SiteTable = Table<SiteRecord>;
pub type DilutionTable = Table<DilutionRecord>;

impl SiteTable {
    pub fn read(reader: impl io::Read) -> Result<Self> {
        read_table(reader, &SITE_COLUMNS, "site table")
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(|err| {
            QmraError::ReadError(format!("Failed to open {}: {err}", path.display()))
        })?;
        read_table(file, &SITE_COLUMNS, &path.display().to_string())
    }
}

impl DilutionTable {
    pub fn read(reader: impl io::Read) -> Result<Self> {
        read_table(reader, &DILUTION_COLUMNS, "dilution table")
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(|err| {
            QmraError::ReadError(format!("Failed to open {}: {err}", path.display()))
        })?;
        read_table(file, &DILUTION_COLUMNS, &path.display().to_string())
    }

    /// Group the measurements by site, in order of first appearance. Rows with missing values
    /// are skipped.
    pub fn datasets(&self) -> Vec<DilutionDataset> {
        let mut datasets: Vec<DilutionDataset> = Vec::new();
        for record in &self.records {
            let (Some(site_name), Some(dilution)) = (&record.site_name, record.dilution) else {
                continue;
            };
            match datasets
                .iter_mut()
                .find(|dataset| &dataset.site_name == site_name)
            {
                Some(dataset) => dataset.values.push(dilution),
                None => datasets.push(DilutionDataset::new(site_name.clone(), vec![dilution])),
            }
        }
        datasets
    }
}

fn read_table<T, R>(reader: R, columns: &[&'static str], source: &str) -> Result<Table<T>>
where
    T: DeserializeOwned,
    R: io::Read,
{
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|err| QmraError::ReadError(format!("Failed to read header of {source}: {err}")))?
        .clone();
    let missing_columns = columns
        .iter()
        .filter(|column| !headers.iter().any(|header| header == **column))
        .copied()
        .collect();

    let records = reader
        .deserialize()
        .enumerate()
        .map(|(row, record)| {
            record.map_err(|err| {
                QmraError::ReadError(format!("Failed to parse row {} of {source}: {err}", row + 1))
            })
        })
        .collect::<Result<Vec<T>>>()?;

    Ok(Table {
        records,
        missing_columns,
    })
}

impl SiteRecord {
    /// Convert into a site configuration. Values are only checked for presence and integrality
    /// here, range checks happen when the site is simulated.
    pub fn to_config(&self) -> Result<SiteConfig> {
        let name = self
            .site_name
            .clone()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| QmraError::ConfigurationError("site without a name".to_string()))?;
        let field = |value: Option<f64>, column: &str| {
            value.ok_or_else(|| {
                QmraError::ConfigurationError(format!("site '{name}': missing value for {column}"))
            })
        };
        let count = |value: Option<f64>, column: &str| -> Result<usize> {
            let value = field(value, column)?;
            if value.fract() != 0. || value < 0. || !value.is_finite() {
                return Err(QmraError::ConfigurationError(format!(
                    "site '{name}': {column} must be a non-negative integer, got {value}"
                )));
            }
            if value > MAX_COUNT as f64 {
                return Err(QmraError::ConfigurationError(format!(
                    "site '{name}': {column} must not exceed {MAX_COUNT}, got {value}"
                )));
            }
            Ok(value as usize)
        };

        Ok(SiteConfig {
            effluent: EffluentRange::new(
                field(self.effluent_min, "Effluent_Min")?,
                field(self.effluent_median, "Effluent_Median")?,
                field(self.effluent_max, "Effluent_Max")?,
            ),
            log_removal: field(self.log_removal, "WWTP_Log_Removal")?,
            meal_size: field(self.meal_size, "Meal_Size_g")?,
            population_size: count(self.population_size, "Num_People")?,
            iterations: count(self.iterations, "Iterations")?,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITES: &str = "\
Site_Name,Effluent_Min,Effluent_Median,Effluent_Max,WWTP_Log_Removal,Meal_Size_g,Num_People,Iterations
Harbour,1,1000,100000,2,50,100,1000
Estuary, 10 ,500,5000,1.5,75,,100
";

    const DILUTIONS: &str = "\
Site_Name,Dilution_Value
Harbour,100
Estuary,250
Harbour,120
Harbour,
";

    #[test]
    fn read_sites() {
        let table = SiteTable::read(SITES.as_bytes()).unwrap();
        assert!(table.is_complete());
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[1].effluent_min, Some(10.));
        assert_eq!(table.records[1].population_size, None);

        let site = table.records[0].to_config().unwrap();
        assert_eq!(site.name, "Harbour");
        assert_eq!(site.effluent, EffluentRange::new(1., 1000., 100000.));
        assert_eq!(site.population_size, 100);
        assert_eq!(site.iterations, 1000);

        assert!(matches!(
            table.records[1].to_config(),
            Err(QmraError::ConfigurationError(_))
        ));
    }

    #[test]
    fn missing_columns() {
        let table = SiteTable::read("Site_Name,Effluent_Min\nA,1\n".as_bytes()).unwrap();
        assert!(!table.is_complete());
        assert_eq!(table.missing_columns.len(), 6);
        assert!(table.missing_columns.contains(&"Iterations"));
        assert_eq!(table.records[0].site_name.as_deref(), Some("A"));
    }

    #[test]
    fn fractional_counts() {
        let record = SiteRecord {
            site_name: Some("A".to_string()),
            effluent_min: Some(1.),
            effluent_median: Some(2.),
            effluent_max: Some(3.),
            log_removal: Some(0.),
            meal_size: Some(50.),
            population_size: Some(10.5),
            iterations: Some(10.),
        };
        assert!(record.to_config().is_err());
    }

    #[test]
    fn oversized_counts() {
        let record = |iterations: f64| SiteRecord {
            site_name: Some("A".to_string()),
            effluent_min: Some(1.),
            effluent_median: Some(2.),
            effluent_max: Some(3.),
            log_removal: Some(0.),
            meal_size: Some(50.),
            population_size: Some(100.),
            iterations: Some(iterations),
        };
        assert!(matches!(
            record(1e20).to_config(),
            Err(QmraError::ConfigurationError(_))
        ));
        assert!(record(MAX_COUNT as f64 + 1.).to_config().is_err());
        assert_eq!(record(1e6).to_config().unwrap().iterations, 1_000_000);
    }

    #[test]
    fn non_numeric_values() {
        let result = DilutionTable::read("Site_Name,Dilution_Value\nA,lots\n".as_bytes());
        assert!(matches!(result, Err(QmraError::ReadError(_))));
    }

    #[test]
    fn group_dilutions() {
        let table = DilutionTable::read(DILUTIONS.as_bytes()).unwrap();
        assert_eq!(table.records.len(), 4);
        let datasets = table.datasets();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0], DilutionDataset::new("Harbour", vec![100., 120.]));
        assert_eq!(datasets[1], DilutionDataset::new("Estuary", vec![250.]));
    }
}
