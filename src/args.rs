use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(
    author,
    version,
    about,
    long_about = None,
    name = "shellfish-qmra",
)]
pub struct Args {
    /// Path to site table (csv file).
    #[clap(long)]
    pub sites: String,

    /// Path to dilution measurements (csv file).
    #[clap(long)]
    pub dilutions: String,

    /// Path to exposure settings (yaml file).
    #[clap(long)]
    pub settings: Option<String>,

    /// Output directory for result tables.
    #[clap(long, short, default_value = "./results")]
    pub outdir: String,

    /// Seed for the random streams. Overrides the seed in the settings.
    #[clap(long)]
    pub seed: Option<u64>,

    /// Number of threads to use for the iterations.
    #[clap(long)]
    pub threads: Option<usize>,

    /// Path to log file.
    #[clap(long, default_value = "shellfish-qmra.log")]
    pub log_file: String,

    /// Increase logging verbosity.
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable the progress bar.
    #[clap(long)]
    pub disable_progress_bar: bool,

    /// Write the outcome of every iteration.
    #[clap(long)]
    pub full_iterations: bool,

    /// Abort when the input data quality check reports errors.
    #[clap(long)]
    pub strict: bool,
}
