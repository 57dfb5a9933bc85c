#![deny(
    clippy::nursery,
    clippy::pedantic,
    missing_docs,
    clippy::missing_docs_in_private_items,
)]

//! Command line front-end: generate a random process (optionally evolve it), simulate an event
//! log from it and write the log as JSON.

use std::fs::File;
use std::io::{
    self,
    BufWriter,
    Write,
};
use std::path::PathBuf;

use anyhow::{
    Context,
    Result,
};
use clap::Parser;
use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use plg_core::logging;
use plg_gen::{
    evolve_process,
    generate_process,
    GeneratorConfig,
    LogGenerator,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{
    info,
    instrument,
};

/// plg-gen command-line interface to generate random processes and synthetic event logs
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Number of traces to simulate (overrides the config file).
    #[arg(short = 'n', long)]
    traces: Option<usize>,

    /// Seed for process generation and simulation; runs are reproducible when set.
    #[arg(short, long)]
    seed: Option<u64>,

    /// YAML or JSON file with generator, simulation and noise settings.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulate an evolution of the generated process instead of the process itself.
    #[arg(short, long)]
    evolve: bool,

    /// Name of the generated process.
    #[arg(long, default_value = "Process")]
    name: String,

    /// Where to write the JSON event log (stdout when absent).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Logging verbosity level (`trace`, `debug`, `info`, `warn`, `error`).
    #[arg(short, long, default_value = "info")]
    verbosity: String,
}

/// Progress bar over `len` traces.
fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} traces") {
        bar.set_style(style);
    }
    bar
}

/// Generate, simulate and write the log as requested on the command line.
#[instrument(skip_all)]
fn run(cli: &Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => GeneratorConfig::load(path)?,
        None => GeneratorConfig::default(),
    };
    if let Some(traces) = cli.traces {
        config.simulation.number_of_traces = traces;
    }
    if cli.seed.is_some() {
        config.simulation.seed = cli.seed;
    }
    config.validate()?;

    let mut rng = config.simulation.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
    let mut process = generate_process(&cli.name, &config.randomization, &mut rng)?;
    if cli.evolve {
        process = evolve_process(&process, &config.evolution, &mut rng)?;
    }
    info!(process = %process.name(), tasks = process.tasks().len(), "simulating");

    let bar = progress_bar(config.simulation.number_of_traces);
    let log = LogGenerator::new(&process, &config.simulation, &config.noise).generate(&bar)?;
    bar.finish_and_clear();
    info!(traces = log.traces.len(), failures = log.failures.len(), "log ready");

    let writer: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(File::create(path).with_context(|| format!("creating {}", path.display()))?),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(writer);
    serde_json::to_writer_pretty(&mut writer, &log)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Entry point.
fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::setup(&cli.verbosity);
    run(&cli)
}
