//! Reading input tables, checking their quality and writing result tables.

pub mod input;
pub mod output;
pub mod quality;

pub use input::{DilutionRecord, DilutionTable, SiteRecord, SiteTable};
pub use output::{CsvResultWriter, ResultWriter};
pub use quality::{Finding, QualityReport, Severity};
