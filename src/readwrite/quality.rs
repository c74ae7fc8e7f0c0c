//! Data quality report of the input tables.
//!
//! Findings attached to a site only exclude that site from a run. Findings without a site concern
//! the tables as a whole and block the run.

use itertools::Itertools;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

use super::input::{DilutionTable, SiteRecord, SiteTable};
use crate::config::MIN_RECOMMENDED_DILUTIONS;
use crate::stats::percentile;

const MAX_TYPICAL_LOG_REMOVAL: f64 = 10.;
const MAX_TYPICAL_MEAL_SIZE: f64 = 1000.;
const MAX_TYPICAL_DILUTION: f64 = 100_000.;
const MIN_RELIABLE_ITERATIONS: f64 = 100.;
const MIN_PRODUCTION_ITERATIONS: f64 = 1000.;
const ROBUST_DILUTIONS: usize = 10;
const OUTLIER_IQR_FACTOR: f64 = 3.;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    /// Affected site, `None` for findings about the tables as a whole.
    pub site: Option<String>,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.site {
            Some(site) => write!(f, "{}: site '{}': {}", self.severity, site, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QualitySummary {
    pub num_sites: usize,
    pub total_dilution_measurements: usize,
    pub min_dilution_measurements: usize,
    pub max_dilution_measurements: usize,
    pub total_iterations: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QualityReport {
    pub findings: Vec<Finding>,
    pub summary: QualitySummary,
}

impl QualityReport {
    pub fn check(sites: &SiteTable, dilutions: &DilutionTable) -> Self {
        let mut report = Self::default();

        for column in &sites.missing_columns {
            report.table_error(format!("site table lacks required column '{column}'"));
        }
        for column in &dilutions.missing_columns {
            report.table_error(format!("dilution table lacks required column '{column}'"));
        }
        if !report.findings.is_empty() {
            return report;
        }

        if sites.records.is_empty() {
            report.table_error("site table contains no data rows".to_string());
        }
        if dilutions.records.is_empty() {
            report.table_error("dilution table contains no data rows".to_string());
        }

        for (row, record) in sites.records.iter().enumerate() {
            match &record.site_name {
                Some(name) if !name.is_empty() => report.check_site(name, record),
                _ => report.table_error(format!("site table row {} has no site name", row + 1)),
            }
        }

        let unnamed = dilutions
            .records
            .iter()
            .filter(|record| record.site_name.is_none())
            .count();
        if unnamed > 0 {
            report.table_error(format!(
                "{unnamed} dilution measurement(s) without a site name"
            ));
        }

        let mut values: HashMap<&str, Vec<f64>> = HashMap::new();
        let mut missing: HashMap<&str, usize> = HashMap::new();
        for record in &dilutions.records {
            let Some(name) = record.site_name.as_deref() else {
                continue;
            };
            match record.dilution {
                Some(value) => values.entry(name).or_default().push(value),
                None => *missing.entry(name).or_default() += 1,
            }
        }

        let site_names: Vec<&str> = sites
            .records
            .iter()
            .filter_map(|record| record.site_name.as_deref())
            .filter(|name| !name.is_empty())
            .collect();

        for name in site_names.iter().duplicates() {
            report.site(Severity::Error, name, "site name is defined more than once".to_string());
        }

        for name in site_names.iter().unique() {
            if let Some(count) = missing.get(name) {
                report.site(
                    Severity::Error,
                    name,
                    format!("{count} missing dilution value(s)"),
                );
            }
            match values.get(name) {
                Some(values) => report.check_dilutions(name, values),
                None if !missing.contains_key(name) => {
                    report.site(Severity::Error, name, "no dilution data".to_string())
                }
                None => {}
            }
        }

        let known: HashSet<&str> = site_names.iter().copied().collect();
        let orphaned: Vec<&str> = values
            .keys()
            .chain(missing.keys())
            .copied()
            .filter(|name| !known.contains(name))
            .unique()
            .sorted()
            .collect();
        for name in orphaned {
            report.site(
                Severity::Warning,
                name,
                "dilution data of an unknown site will be ignored".to_string(),
            );
        }

        let counts: Vec<usize> = site_names
            .iter()
            .unique()
            .map(|name| values.get(name).map_or(0, Vec::len))
            .collect();
        report.summary = QualitySummary {
            num_sites: site_names.iter().unique().count(),
            total_dilution_measurements: dilutions.records.len(),
            min_dilution_measurements: counts.iter().copied().min().unwrap_or(0),
            max_dilution_measurements: counts.iter().copied().max().unwrap_or(0),
            total_iterations: sites
                .records
                .iter()
                .filter_map(|record| record.iterations)
                .filter(|iterations| *iterations > 0.)
                .map(|iterations| iterations as u64)
                .sum(),
        };

        report
    }

    fn check_site(&mut self, name: &str, record: &SiteRecord) {
        let fields = [
            ("Effluent_Min", record.effluent_min),
            ("Effluent_Median", record.effluent_median),
            ("Effluent_Max", record.effluent_max),
            ("WWTP_Log_Removal", record.log_removal),
            ("Meal_Size_g", record.meal_size),
            ("Num_People", record.population_size),
            ("Iterations", record.iterations),
        ];
        for (column, value) in fields {
            if value.is_none() {
                self.site(Severity::Error, name, format!("missing value for {column}"));
            }
        }

        let effluent = [
            ("Effluent_Min", record.effluent_min),
            ("Effluent_Median", record.effluent_median),
            ("Effluent_Max", record.effluent_max),
        ];
        for (column, value) in effluent {
            if value.is_some_and(|value| value <= 0.) {
                self.site(Severity::Error, name, format!("{column} must be positive"));
            }
        }
        if let (Some(min), Some(median), Some(max)) = (
            record.effluent_min,
            record.effluent_median,
            record.effluent_max,
        ) {
            if min > median || median > max {
                self.site(
                    Severity::Error,
                    name,
                    "effluent values must satisfy Min <= Median <= Max".to_string(),
                );
            }
        }

        if let Some(log_removal) = record.log_removal {
            if log_removal < 0. {
                self.site(
                    Severity::Error,
                    name,
                    "WWTP_Log_Removal cannot be negative".to_string(),
                );
            } else if log_removal > MAX_TYPICAL_LOG_REMOVAL {
                self.site(
                    Severity::Warning,
                    name,
                    format!("WWTP_Log_Removal of {log_removal} is unusually high"),
                );
            }
        }

        if let Some(meal_size) = record.meal_size {
            if meal_size <= 0. {
                self.site(Severity::Error, name, "Meal_Size_g must be positive".to_string());
            } else if meal_size > MAX_TYPICAL_MEAL_SIZE {
                self.site(
                    Severity::Warning,
                    name,
                    format!("Meal_Size_g of {meal_size} g is unusually large"),
                );
            }
        }

        if let Some(people) = record.population_size {
            if people <= 0. {
                self.site(Severity::Error, name, "Num_People must be positive".to_string());
            } else if people.fract() != 0. {
                self.site(Severity::Error, name, "Num_People must be an integer".to_string());
            }
        }

        if let Some(iterations) = record.iterations {
            if iterations <= 0. {
                self.site(Severity::Error, name, "Iterations must be positive".to_string());
            } else if iterations.fract() != 0. {
                self.site(Severity::Error, name, "Iterations must be an integer".to_string());
            } else {
                if iterations < MIN_RELIABLE_ITERATIONS {
                    self.site(
                        Severity::Warning,
                        name,
                        format!("{iterations} iterations may produce unreliable statistics"),
                    );
                }
                if iterations < MIN_PRODUCTION_ITERATIONS {
                    self.site(
                        Severity::Info,
                        name,
                        format!(
                            "{iterations} iterations, production runs should use at least 10000"
                        ),
                    );
                }
            }
        }
    }

    fn check_dilutions(&mut self, name: &str, values: &[f64]) {
        let non_positive = values.iter().filter(|value| **value <= 0.).count();
        if non_positive > 0 {
            self.site(
                Severity::Error,
                name,
                format!("{non_positive} non-positive dilution value(s)"),
            );
        }
        if values.iter().any(|value| *value > MAX_TYPICAL_DILUTION) {
            self.site(
                Severity::Warning,
                name,
                "some dilution values exceed 100000".to_string(),
            );
        }

        let count = values.len();
        if count < MIN_RECOMMENDED_DILUTIONS {
            self.site(
                Severity::Warning,
                name,
                format!("only {count} dilution measurement(s)"),
            );
        } else if count < ROBUST_DILUTIONS {
            self.site(
                Severity::Info,
                name,
                format!("{count} dilution measurements, at least 20 give a robust distribution"),
            );
        }

        if count > 1 && values.iter().all(|value| *value == values[0]) {
            self.site(
                Severity::Warning,
                name,
                "identical dilution values, no variability".to_string(),
            );
        }

        if count >= 4 {
            let sorted: Vec<f64> = values.iter().copied().sorted_by(f64::total_cmp).collect();
            let q1 = percentile(&sorted, 25.);
            let q3 = percentile(&sorted, 75.);
            let iqr = q3 - q1;
            let outliers = sorted
                .iter()
                .filter(|value| {
                    **value < q1 - OUTLIER_IQR_FACTOR * iqr || **value > q3 + OUTLIER_IQR_FACTOR * iqr
                })
                .count();
            if outliers > 0 {
                self.site(
                    Severity::Info,
                    name,
                    format!("{outliers} extreme outlier(s) in dilution data"),
                );
            }
        }
    }

    fn table_error(&mut self, message: String) {
        self.findings.push(Finding {
            severity: Severity::Error,
            site: None,
            message,
        });
    }

    fn site(&mut self, severity: Severity, site: &str, message: String) {
        self.findings.push(Finding {
            severity,
            site: Some(site.to_string()),
            message,
        });
    }

    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(move |finding| finding.severity == severity)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.with_severity(Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.with_severity(Severity::Warning)
    }

    pub fn info(&self) -> impl Iterator<Item = &Finding> {
        self.with_severity(Severity::Info)
    }

    /// No errors at all.
    pub fn passed(&self) -> bool {
        self.errors().next().is_none()
    }

    /// An error concerns the tables as a whole and no site can be run.
    pub fn is_blocking(&self) -> bool {
        self.errors().any(|finding| finding.site.is_none())
    }

    /// Sites excluded from the run, with their first error.
    pub fn excluded_sites(&self) -> HashMap<&str, &Finding> {
        let mut excluded = HashMap::new();
        for finding in self.errors() {
            if let Some(site) = finding.site.as_deref() {
                excluded.entry(site).or_insert(finding);
            }
        }
        excluded
    }

    pub fn log(&self) {
        for finding in &self.findings {
            match finding.severity {
                Severity::Error => log::error!("{finding}"),
                Severity::Warning => log::warn!("{finding}"),
                Severity::Info => log::info!("{finding}"),
            }
        }
        log::info!(
            "Data quality: {} error(s), {} warning(s), {} note(s) for {} site(s) with {} dilution measurement(s).",
            self.errors().count(),
            self.warnings().count(),
            self.info().count(),
            self.summary.num_sites,
            self.summary.total_dilution_measurements
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Site_Name,Effluent_Min,Effluent_Median,Effluent_Max,WWTP_Log_Removal,Meal_Size_g,Num_People,Iterations\n";

    fn check(sites: &str, dilutions: &str) -> QualityReport {
        let sites = SiteTable::read(format!("{HEADER}{sites}").as_bytes()).unwrap();
        let dilutions =
            DilutionTable::read(format!("Site_Name,Dilution_Value\n{dilutions}").as_bytes())
                .unwrap();
        QualityReport::check(&sites, &dilutions)
    }

    fn ten_dilutions(site: &str) -> String {
        (1..=10).map(|i| format!("{site},{}\n", 90 + 2 * i)).collect()
    }

    fn messages<'a>(findings: impl Iterator<Item = &'a Finding>) -> Vec<String> {
        findings.map(|finding| finding.to_string()).collect()
    }

    #[test]
    fn clean_input() {
        let report = check("A,1,1000,100000,2,50,100,10000\n", &ten_dilutions("A"));
        assert!(report.findings.is_empty(), "{:?}", report.findings);
        assert!(report.passed());
        assert_eq!(report.summary.num_sites, 1);
        assert_eq!(report.summary.total_dilution_measurements, 10);
        assert_eq!(report.summary.min_dilution_measurements, 10);
        assert_eq!(report.summary.total_iterations, 10000);
    }

    #[test]
    fn missing_columns_block() {
        let sites = SiteTable::read("Site_Name,Effluent_Min\nA,1\n".as_bytes()).unwrap();
        let dilutions = DilutionTable::read("Site_Name,Dilution_Value\nA,1\n".as_bytes()).unwrap();
        let report = QualityReport::check(&sites, &dilutions);
        assert!(report.is_blocking());
        assert_eq!(report.errors().count(), 6);
        assert!(report.excluded_sites().is_empty());
    }

    #[test]
    fn site_errors_exclude_only_that_site() {
        let sites = "\
A,1,1000,100000,2,50,100,10000
B,100,10,1000,2,50,100,10000
C,1,1000,100000,-1,0,100.5,10000
";
        let dilutions = format!("{}{}{}", ten_dilutions("A"), ten_dilutions("B"), ten_dilutions("C"));
        let report = check(sites, &dilutions);
        assert!(!report.passed());
        assert!(!report.is_blocking());
        let excluded = report.excluded_sites();
        assert_eq!(excluded.len(), 2);
        assert!(excluded.contains_key("B"));
        assert!(excluded.contains_key("C"));
        assert_eq!(report.errors().filter(|f| f.site.as_deref() == Some("C")).count(), 3);
    }

    #[test]
    fn dilution_coverage() {
        let sites = "\
A,1,1000,100000,2,50,100,10000
B,1,1000,100000,2,50,100,10000
C,1,1000,100000,2,50,100,10000
A,1,1000,100000,2,50,100,10000
";
        let dilutions = format!("{}B,50\nB,50\nB,50\nZ,10\n", ten_dilutions("A"));
        let report = check(sites, &dilutions);

        let errors = messages(report.errors());
        assert!(errors.contains(&"ERROR: site 'A': site name is defined more than once".to_string()));
        assert!(errors.contains(&"ERROR: site 'C': no dilution data".to_string()));

        let warnings = messages(report.warnings());
        assert!(warnings.contains(&"WARNING: site 'B': only 3 dilution measurement(s)".to_string()));
        assert!(
            warnings.contains(&"WARNING: site 'B': identical dilution values, no variability".to_string())
        );
        assert!(warnings.iter().any(|w| w.starts_with("WARNING: site 'Z'")));
        assert_eq!(report.summary.num_sites, 3);
        assert_eq!(report.summary.min_dilution_measurements, 0);
        assert_eq!(report.summary.max_dilution_measurements, 10);
    }

    #[test]
    fn warnings_and_notes() {
        let dilutions = "A,100\nA,101\nA,102\nA,103\nA,104\nA,105\nA,200000\n";
        let report = check("A,1,1000,100000,12,1500,100,50\n", dilutions);
        assert!(report.passed());
        assert_eq!(report.warnings().count(), 4);
        let info = messages(report.info());
        assert!(info.contains(&"INFO: site 'A': 1 extreme outlier(s) in dilution data".to_string()));
        assert!(info.iter().any(|note| note.contains("7 dilution measurements")));
    }

    #[test]
    fn few_iterations_note() {
        let report = check("A,1,1000,100000,2,50,100,500\n", &ten_dilutions("A"));
        assert_eq!(report.warnings().count(), 0);
        assert_eq!(report.info().count(), 1);
    }

    #[test]
    fn very_few_iterations_warn_and_note() {
        let report = check("A,1,1000,100000,2,50,100,50\n", &ten_dilutions("A"));
        assert_eq!(
            messages(report.warnings()),
            vec!["WARNING: site 'A': 50 iterations may produce unreliable statistics".to_string()]
        );
        assert_eq!(
            messages(report.info()),
            vec![
                "INFO: site 'A': 50 iterations, production runs should use at least 10000"
                    .to_string()
            ]
        );
    }
}
