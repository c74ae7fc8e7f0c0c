use anyhow::{Result, bail};

use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;

use crate::args::Args;
use crate::batch::{BatchOptions, BatchResult, SiteFailure, simulate_batch_with};
use crate::config::{DilutionDataset, Settings, SiteConfig};
use crate::errors::QmraError;
use crate::readwrite::{CsvResultWriter, DilutionTable, QualityReport, ResultWriter, SiteTable};
use crate::stats::SiteComparison;

pub struct Runner {
    args: Args,
    settings: Settings,
    seed: u64,
    sites: Vec<SiteConfig>,
    dilutions: Vec<DilutionDataset>,
    rejected: Vec<SiteFailure>,
}

impl Runner {
    pub fn new(args: Args) -> Result<Runner> {
        Self::setup_logger(&args);
        #[cfg(feature = "parallel")]
        Self::setup_rayon(&args);

        let settings = Self::load_settings(args.settings.as_deref())?;
        let seed = args.seed.or(settings.seed).unwrap_or_else(rand::random);
        log::info!("Using seed {seed}.");

        let (sites, dilutions, rejected) = Self::load_inputs(&args)?;

        Ok(Self {
            args,
            settings,
            seed,
            sites,
            dilutions,
            rejected,
        })
    }

    pub fn start(&mut self) -> Result<()> {
        let batch = self.run()?;
        self.finish(&batch)
    }

    fn setup_logger(args: &Args) {
        let log_level = match args.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        simple_logging::log_to_file(args.log_file.as_str(), log_level).unwrap_or_else(|_| {
            eprintln!("Unable to open log file.");
            std::process::exit(1);
        });
    }

    /// Setup rayon thread pool
    #[cfg(feature = "parallel")]
    fn setup_rayon(args: &Args) {
        if let Some(n_threads) = args.threads {
            println!("Setting number of threads to {}.", n_threads);
            rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build_global()
                .unwrap_or_else(|_| {
                    eprintln!("Unable to set number of threads.");
                    std::process::exit(1);
                });
        }
    }

    /// Load settings from file, falling back to the defaults
    fn load_settings(path: Option<&str>) -> Result<Settings> {
        let settings = match path {
            Some(path) => Settings::read_from_file(path)?,
            None => Settings::default(),
        };
        settings.exposure.validate()?;
        log::info!("Loaded settings\n{}", settings);
        Ok(settings)
    }

    /// Read both input tables and drop the sites the quality check rejects.
    fn load_inputs(
        args: &Args,
    ) -> Result<(Vec<SiteConfig>, Vec<DilutionDataset>, Vec<SiteFailure>)> {
        let site_table = SiteTable::read_from_file(&args.sites)?;
        let dilution_table = DilutionTable::read_from_file(&args.dilutions)?;

        let report = QualityReport::check(&site_table, &dilution_table);
        report.log();
        for finding in report.errors() {
            eprintln!("{finding}");
        }
        if report.is_blocking() {
            bail!("Input tables failed the data quality check.");
        }
        if args.strict && !report.passed() {
            bail!(
                "Data quality check reported {} error(s).",
                report.errors().count()
            );
        }

        let excluded = report.excluded_sites();
        let mut sites = Vec::new();
        let mut rejected = Vec::new();
        let mut seen = HashSet::new();
        for record in &site_table.records {
            let Some(name) = record.site_name.as_deref() else {
                continue;
            };
            // duplicated names are reported once
            if !seen.insert(name) {
                continue;
            }
            let config = match excluded.get(name) {
                Some(finding) => Err(QmraError::ConfigurationError(finding.message.clone())),
                None => record.to_config(),
            };
            match config {
                Ok(site) => sites.push(site),
                Err(error) => rejected.push(SiteFailure {
                    site: name.to_string(),
                    error,
                }),
            }
        }
        println!(
            "Loaded {} site(s), {} rejected by the data quality check.",
            sites.len(),
            rejected.len()
        );

        Ok((sites, dilution_table.datasets(), rejected))
    }

    fn run(&mut self) -> Result<BatchResult> {
        let bar = match self.args.disable_progress_bar {
            true => None,
            false => {
                let bar = ProgressBar::new(self.sites.len() as u64);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template(
                            "[{bar:40}] {pos:>7}/{len:7} [{elapsed_precise} / {duration_precise}] {msg}",
                        )?
                        .progress_chars("=> "),
                );
                Some(bar)
            }
        };

        log::info!("Simulating {} site(s)...", self.sites.len());
        let options = BatchOptions::with_seed(self.seed);
        let mut batch = simulate_batch_with(
            &self.sites,
            &self.dilutions,
            &self.settings.exposure,
            &options,
            |site| {
                if let Some(bar) = &bar {
                    bar.inc(1);
                    bar.set_message(site.to_string());
                }
            },
        )?;
        let mut failures = std::mem::take(&mut self.rejected);
        failures.append(&mut batch.failures);
        batch.failures = failures;

        if let Some(bar) = bar {
            bar.finish_with_message("Done.");
        }
        log::info!("Finished simulation.");
        Ok(batch)
    }

    fn finish(&self, batch: &BatchResult) -> Result<()> {
        let summaries = batch.summaries();
        for summary in summaries.ranked_by_risk() {
            println!(
                "{}: mean infections {:.2}, mean illness {:.2}, risk per person {:.3}% ({})",
                summary.site,
                summary.infections.mean,
                summary.illness.mean,
                summary.risk_per_person * 100.,
                summary.risk_category
            );
        }
        for failure in &batch.failures {
            println!("{}: failed with {}", failure.site, failure.error);
        }
        if let Some(mean_risk) = summaries.mean_risk() {
            log::info!("Mean risk per person across sites: {mean_risk:.6}");
        }
        for (category, count) in summaries.category_counts() {
            log::info!("{count} site(s) with {category} risk");
        }

        let writer = CsvResultWriter::new(&self.args.outdir, self.args.full_iterations)?;
        for path in writer.write(batch)? {
            println!("Wrote {}", path.display());
        }
        Ok(())
    }
}
