use clap::Parser;

use shellfish_qmra::args::Args;
use shellfish_qmra::runner::Runner;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut runner = Runner::new(args)?;
    runner.start()
}
