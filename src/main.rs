//! Monte Carlo driver
//!
//! Loads a YAML configuration, runs the full step budget and appends the
//! trajectory to a dump file.

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;

use lj_mc::{EnergyEvaluation, McConfig, Simulation, StepConvention};

mod cli;
mod output;

use cli::Args;
use output::setup_output;

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    setup_output(args.output.as_ref());

    let config = load_config(&args)?;
    info!("Configuration loaded:\n{:?}", config);

    let mut simulation =
        Simulation::new(config.to_params()).wrap_err("Invalid simulation parameters")?;
    simulation.initialize();
    info!("Initial energy: {:.6}", simulation.energy());

    run(&mut simulation, config.output.report_interval)?;

    simulation
        .save_snapshots(&config.output.dump_file)
        .wrap_err_with(|| format!("Unable to save trajectory to {}", config.output.dump_file))?;

    let stats = simulation.statistics();
    info!("Run finished after {} steps", simulation.current_step());
    info!(
        "Accepted {} / {} moves ({:.2}%)",
        stats.accepted,
        stats.attempts,
        100.0 * stats.acceptance_rate()
    );
    info!("Final energy: {:.6}", simulation.energy());

    Ok(())
}

/// Read the configuration file (or defaults) and apply command-line overrides
fn load_config(args: &Args) -> Result<McConfig> {
    let mut config = match &args.config_file {
        Some(path) => {
            info!("Reading configuration from: {}", path);
            McConfig::from_file(path)
                .wrap_err_with(|| format!("Unable to load configuration file: {}", path))?
        }
        None => {
            info!("No configuration file given, using defaults");
            McConfig::default()
        }
    };

    if let Some(n) = args.particles {
        info!("Overriding n_particles with: {}", n);
        config.system.n_particles = n;
    }
    if let Some(steps) = args.steps {
        info!("Overriding n_steps with: {}", steps);
        config.simulation.n_steps = steps;
    }
    if let Some(t) = args.temperature {
        info!("Overriding temperature with: {}", t);
        config.simulation.temperature = t;
    }
    if let Some(interval) = args.interval {
        info!("Overriding interval with: {}", interval);
        config.simulation.interval = interval;
    }
    if let Some(d) = args.max_displacement {
        info!("Overriding max_displacement with: {}", d);
        config.simulation.max_displacement = d;
    }
    if let Some(seed) = args.seed {
        info!("Overriding seed with: {}", seed);
        config.simulation.seed = seed;
    }
    if let Some(ref dump_file) = args.dump_file {
        info!("Overriding dump_file with: {}", dump_file);
        config.output.dump_file = dump_file.clone();
    }
    if args.legacy {
        info!("Overriding convention with: {:?}", StepConvention::Legacy);
        config.simulation.convention = StepConvention::Legacy;
    }
    if args.local_energy {
        info!("Overriding energy evaluation with: {:?}", EnergyEvaluation::Local);
        config.simulation.energy = EnergyEvaluation::Local;
    }

    config.validate().wrap_err("Invalid configuration")?;
    Ok(config)
}

/// Run the step budget in report-sized chunks.
///
/// Chunks continue the step counter, so the stored trajectory is the same as
/// a single `run_full` after `initialize`.
fn run(simulation: &mut Simulation, report_interval: u64) -> Result<()> {
    let total = simulation.num_steps();
    info!(
        "Starting {} steps at T = {:.4}",
        total,
        simulation.temperature()
    );

    while simulation.current_step() < total {
        let chunk = report_interval.min(total - simulation.current_step());
        simulation.run_steps(chunk)?;
        info!(
            "Step {:>8}: energy = {:>14.6}, acceptance = {:6.2}%",
            simulation.current_step(),
            simulation.energy(),
            100.0 * simulation.statistics().acceptance_rate()
        );
    }
    Ok(())
}
