//! Result tables of a batch.

use serde::Serialize;
use std::{fs, io, path::Path, path::PathBuf};

use crate::batch::{BatchResult, SiteFailure};
use crate::core::SiteRun;
use crate::errors::{QmraError, Result};
use crate::stats::SiteSummary;

pub const SUMMARY_FILE: &str = "summary_results.csv";
pub const PERCENTILE_FILE: &str = "percentile_results.csv";
pub const ITERATION_FILE: &str = "full_iteration_data.csv";
pub const FAILURE_FILE: &str = "failures.csv";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SummaryRecord<'a> {
    pub site: &'a str,
    #[serde(rename = "Num_People")]
    pub population_size: usize,
    pub iterations: usize,
    #[serde(rename = "Dilution_Mean")]
    pub dilution_mean: f64,
    #[serde(rename = "Dilution_Median")]
    pub dilution_median: f64,
    #[serde(rename = "Infections_Mean")]
    pub infections_mean: f64,
    #[serde(rename = "Infections_Median")]
    pub infections_median: f64,
    #[serde(rename = "Infections_Min")]
    pub infections_min: f64,
    #[serde(rename = "Infections_Max")]
    pub infections_max: f64,
    #[serde(rename = "Illness_Mean")]
    pub illness_mean: f64,
    #[serde(rename = "Illness_Median")]
    pub illness_median: f64,
    #[serde(rename = "Illness_Min")]
    pub illness_min: f64,
    #[serde(rename = "Illness_Max")]
    pub illness_max: f64,
    #[serde(rename = "Risk_Per_Person_Fraction")]
    pub risk_fraction: f64,
    #[serde(rename = "Risk_Per_Person_Percent")]
    pub risk_percent: f64,
    #[serde(rename = "Risk_Category")]
    pub risk_category: String,
    #[serde(rename = "Numerical_Warnings")]
    pub numerical_warnings: usize,
}

impl<'a> From<&'a SiteSummary> for SummaryRecord<'a> {
    fn from(summary: &'a SiteSummary) -> Self {
        Self {
            site: &summary.site,
            population_size: summary.population_size,
            iterations: summary.iterations,
            dilution_mean: summary.dilution_mean,
            dilution_median: summary.dilution_median,
            infections_mean: summary.infections.mean,
            infections_median: summary.infections.median,
            infections_min: summary.infections.min,
            infections_max: summary.infections.max,
            illness_mean: summary.illness.mean,
            illness_median: summary.illness.median,
            illness_min: summary.illness.min,
            illness_max: summary.illness.max,
            risk_fraction: summary.risk_per_person,
            risk_percent: summary.risk_per_person * 100.,
            risk_category: summary.risk_category.to_string(),
            numerical_warnings: summary.numerical_warnings,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PercentileRecord<'a> {
    #[serde(rename = "Site")]
    pub site: &'a str,
    #[serde(rename = "Inf_5th")]
    pub inf_5: f64,
    #[serde(rename = "Inf_25th")]
    pub inf_25: f64,
    #[serde(rename = "Inf_50th")]
    pub inf_50: f64,
    #[serde(rename = "Inf_75th")]
    pub inf_75: f64,
    #[serde(rename = "Inf_95th")]
    pub inf_95: f64,
    #[serde(rename = "Inf_99th")]
    pub inf_99: f64,
    #[serde(rename = "Ill_5th")]
    pub ill_5: f64,
    #[serde(rename = "Ill_25th")]
    pub ill_25: f64,
    #[serde(rename = "Ill_50th")]
    pub ill_50: f64,
    #[serde(rename = "Ill_75th")]
    pub ill_75: f64,
    #[serde(rename = "Ill_95th")]
    pub ill_95: f64,
    #[serde(rename = "Ill_99th")]
    pub ill_99: f64,
}

impl<'a> From<&'a SiteSummary> for PercentileRecord<'a> {
    fn from(summary: &'a SiteSummary) -> Self {
        let [inf_5, inf_25, inf_50, inf_75, inf_95, inf_99] =
            summary.infections.percentiles.values();
        let [ill_5, ill_25, ill_50, ill_75, ill_95, ill_99] = summary.illness.percentiles.values();
        Self {
            site: &summary.site,
            inf_5,
            inf_25,
            inf_50,
            inf_75,
            inf_95,
            inf_99,
            ill_5,
            ill_25,
            ill_50,
            ill_75,
            ill_95,
            ill_99,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IterationRecord<'a> {
    pub site: &'a str,
    pub iteration: usize,
    pub infections: u64,
    pub illness: u64,
}

impl<'a> IterationRecord<'a> {
    pub fn from_run(run: &'a SiteRun) -> impl Iterator<Item = IterationRecord<'a>> {
        run.results.iter().map(|result| IterationRecord {
            site: &run.site,
            iteration: result.iteration,
            infections: result.infections,
            illness: result.illness,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FailureRecord<'a> {
    pub site: &'a str,
    pub error: String,
}

impl<'a> From<&'a SiteFailure> for FailureRecord<'a> {
    fn from(failure: &'a SiteFailure) -> Self {
        Self {
            site: &failure.site,
            error: failure.error.to_string(),
        }
    }
}

/// Serialize records with a header row.
pub fn write_records<T, W>(writer: W, records: impl IntoIterator<Item = T>) -> Result<()>
where
    T: Serialize,
    W: io::Write,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer
            .serialize(record)
            .map_err(|err| QmraError::WriteError(format!("Failed to write record: {err}")))?;
    }
    csv_writer
        .flush()
        .map_err(|err| QmraError::WriteError(format!("Failed to flush records: {err}")))?;
    Ok(())
}

pub trait ResultWriter {
    /// Write all tables of a batch and return the paths written.
    fn write(&self, batch: &BatchResult) -> Result<Vec<PathBuf>>;
}

/// Writes the result tables of a batch as csv files into one directory.
pub struct CsvResultWriter {
    outdir: PathBuf,
    full_iterations: bool,
}

impl CsvResultWriter {
    pub fn new(outdir: impl AsRef<Path>, full_iterations: bool) -> Result<Self> {
        let outdir = outdir.as_ref().to_path_buf();
        fs::create_dir_all(&outdir).map_err(|err| {
            QmraError::WriteError(format!("Failed to create {}: {err}", outdir.display()))
        })?;
        Ok(Self {
            outdir,
            full_iterations,
        })
    }

    fn write_file<T: Serialize>(
        &self,
        file_name: &str,
        records: impl IntoIterator<Item = T>,
    ) -> Result<PathBuf> {
        let path = self.outdir.join(file_name);
        let file = fs::File::create(&path).map_err(|err| {
            QmraError::WriteError(format!("Failed to create {}: {err}", path.display()))
        })?;
        write_records(io::BufWriter::new(file), records)?;
        log::debug!("Wrote {}", path.display());
        Ok(path)
    }
}

impl ResultWriter for CsvResultWriter {
    fn write(&self, batch: &BatchResult) -> Result<Vec<PathBuf>> {
        log::info!("Writing results to {}", self.outdir.display());
        let summaries = batch.sites.iter().map(|site| &site.summary);
        let mut paths = vec![
            self.write_file(SUMMARY_FILE, summaries.clone().map(SummaryRecord::from))?,
            self.write_file(PERCENTILE_FILE, summaries.map(PercentileRecord::from))?,
        ];
        if self.full_iterations {
            paths.push(self.write_file(
                ITERATION_FILE,
                batch
                    .sites
                    .iter()
                    .flat_map(|site| IterationRecord::from_run(&site.run)),
            )?);
        }
        if !batch.failures.is_empty() {
            paths.push(self.write_file(FAILURE_FILE, batch.failures.iter().map(FailureRecord::from))?);
        }
        Ok(paths)
    }
}
