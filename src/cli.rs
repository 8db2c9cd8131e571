//! Command-line arguments for the Monte Carlo driver

use clap::Parser;

/// Metropolis Monte Carlo of Lennard-Jones particles in a periodic box
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file (built-in defaults when omitted)
    #[arg(short, long)]
    pub config_file: Option<String>,

    /// Log file (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Override number of particles
    #[arg(long)]
    pub particles: Option<usize>,

    /// Override total number of steps
    #[arg(long)]
    pub steps: Option<u64>,

    /// Override temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Override snapshot interval
    #[arg(long)]
    pub interval: Option<u64>,

    /// Override maximum displacement per axis
    #[arg(long)]
    pub max_displacement: Option<f64>,

    /// Override random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override trajectory dump file
    #[arg(long)]
    pub dump_file: Option<String>,

    /// Reproduce the historical inverted-sign acceptance step
    #[arg(long)]
    pub legacy: bool,

    /// Evaluate only the moved particle's interactions per step
    #[arg(long)]
    pub local_energy: bool,
}
