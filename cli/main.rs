#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::ops::ControlFlow;
use std::path::Path;
use std::process;

use pseudostate::aalen_johansen_engine;
use pseudostate::config::{OutputMode, PseudoConfig};
use pseudostate::data::load_sample;
use pseudostate::frame::{to_dataframe, write_tsv};
use pseudostate::progress::LeaveOneOutObserver;

#[derive(Parser)]
#[command(
    name = "pseudostate",
    version,
    about = "Jackknife pseudo-observations for Aalen-Johansen state occupation",
    long_about = "Computes one block of pseudo-observations per individual by re-estimating \
                  Aalen-Johansen state occupation probabilities with that individual left out."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute pseudo-observations for a sample
    #[command(about = "Compute pseudo-observations (outputs: pseudo_observations.tsv)")]
    Compute(ComputeArgs),

    /// Write a configuration file holding the defaults
    #[command(about = "Write a default configuration (outputs: pseudostate.toml)")]
    InitConfig(InitConfigArgs),
}

#[derive(Args)]
struct ComputeArgs {
    /// Path to a TSV file with one row per individual
    data: String,

    /// Fixed time horizon at which state occupation is evaluated
    #[arg(long, allow_negative_numbers = true)]
    horizon: Option<f64>,

    /// TOML configuration file; flags given here override its values
    #[arg(long)]
    config: Option<String>,

    /// Name of the event/censoring time column
    #[arg(long)]
    time_column: Option<String>,

    /// Name of the realized state column
    #[arg(long)]
    state_column: Option<String>,

    /// State code that marks a censored individual
    #[arg(long)]
    censoring_state: Option<u32>,

    /// Name of the output column recording the excluded individual
    #[arg(long)]
    row_index_column: Option<String>,

    /// Output TSV path
    #[arg(long)]
    output: Option<String>,

    /// Write the raw leave-one-out estimates instead of pseudo-observations
    #[arg(long)]
    leave_one_out: bool,
}

#[derive(Args)]
struct InitConfigArgs {
    /// Where to write the configuration
    #[arg(long, default_value = "pseudostate.toml")]
    output: String,
}

/// Bar over the `n` leave-one-out passes; hidden when stderr is not a terminal.
fn leave_one_out_bar(total_passes: usize) -> ProgressBar {
    if !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total_passes as u64);
    let style = ProgressStyle::with_template(
        "{prefix:.bold} [{elapsed_precise}] {wide_bar:.green/white} {pos}/{len} passes, eta {eta} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=> ");
    bar.set_style(style);
    bar.set_prefix("leave-one-out");
    bar
}

/// Reports each finished pass and the individual it left out.
#[derive(Default)]
struct BarProgress {
    bar: Option<ProgressBar>,
}

impl LeaveOneOutObserver for BarProgress {
    fn on_start(&mut self, total_passes: usize) {
        self.bar = Some(leave_one_out_bar(total_passes));
    }

    fn on_pass_complete(&mut self, excluded: usize) -> ControlFlow<()> {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("(left out individual {excluded})"));
            bar.inc(1);
        }
        ControlFlow::Continue(())
    }

    fn on_finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

fn resolve_config(args: &ComputeArgs) -> Result<PseudoConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            println!("Loading configuration from: {path}");
            PseudoConfig::load(path)?
        }
        None => PseudoConfig::default(),
    };

    if let Some(horizon) = args.horizon {
        config.fixed_time_horizon = Some(horizon);
    }
    if let Some(column) = &args.time_column {
        config.time_column = column.clone();
    }
    if let Some(column) = &args.state_column {
        config.state_column = column.clone();
    }
    if let Some(state) = args.censoring_state {
        config.censoring_state = state;
    }
    if let Some(column) = &args.row_index_column {
        config.row_index_column = column.clone();
    }
    if let Some(output) = &args.output {
        config.output = output.clone();
    }
    if args.leave_one_out {
        config.mode = OutputMode::LeaveOneOut;
    }

    config.validate()?;
    Ok(config)
}

fn compute(args: ComputeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&args)?;
    let horizon = config
        .fixed_time_horizon
        .ok_or("no fixed time horizon given; pass --horizon or set fixed_time_horizon")?;

    println!("Loading sample from: {}", args.data);
    let sample = load_sample(&args.data, &config.sample_columns())?;
    println!(
        "Loaded {} individuals; evaluating at horizon {horizon}",
        sample.len()
    );

    let engine =
        aalen_johansen_engine(&sample, config.censoring_state).with_options(config.engine_options());
    let mut progress = BarProgress::default();
    let table = match config.mode {
        OutputMode::Pseudo => engine.compute_with_observer(&sample, horizon, &mut progress)?,
        OutputMode::LeaveOneOut => {
            engine.leave_one_out_estimates_with_observer(&sample, horizon, &mut progress)?
        }
    };

    let mut df = to_dataframe(&table)?;
    write_tsv(&mut df, Path::new(&config.output))?;
    println!(
        "Wrote {} rows ({} blocks) to: {}",
        table.len(),
        table.n_blocks(),
        config.output
    );
    Ok(())
}

fn init_config(args: InitConfigArgs) -> Result<(), Box<dyn std::error::Error>> {
    PseudoConfig::default().save(&args.output)?;
    println!("Configuration saved to: {}", args.output);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Compute(args) => compute(args),
        Commands::InitConfig(args) => init_config(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
