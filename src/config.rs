use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::simulation::{
    EnergyEvaluation, SimulationParams, StepConvention, DEFAULT_MAX_DISPLACEMENT,
};

/// Configuration for a Monte Carlo run
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct McConfig {
    /// Particle population and box
    pub system: SystemConfig,
    /// Sampling parameters
    pub simulation: SamplingConfig,
    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// System setup configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Number of particles placed by `initialize`
    pub n_particles: usize,
    /// Edge length of the cubic periodic box
    pub box_size: f64,
}

/// Sampling configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SamplingConfig {
    /// Reduced temperature (k_B = 1)
    pub temperature: f64,
    /// Total number of trial moves
    pub n_steps: u64,
    /// Snapshot interval in steps
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Half-width of the per-axis trial displacement
    #[serde(default = "default_max_displacement")]
    pub max_displacement: f64,
    /// Random seed
    #[serde(default)]
    pub seed: u64,
    /// Energy-change convention
    #[serde(default)]
    pub convention: StepConvention,
    /// Full or local energy evaluation
    #[serde(default)]
    pub energy: EnergyEvaluation,
}

/// Output configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OutputConfig {
    /// Trajectory dump file (appended to)
    #[serde(default = "default_dump_file")]
    pub dump_file: String,
    /// Progress report interval in steps
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dump_file: default_dump_file(),
            report_interval: default_report_interval(),
        }
    }
}

// Default value functions
fn default_interval() -> u64 {
    10
}
fn default_max_displacement() -> f64 {
    DEFAULT_MAX_DISPLACEMENT
}
fn default_dump_file() -> String {
    "particles.dump".to_string()
}
fn default_report_interval() -> u64 {
    1000
}

impl Default for McConfig {
    fn default() -> Self {
        Self {
            system: SystemConfig {
                n_particles: 100,
                box_size: 10.0,
            },
            simulation: SamplingConfig {
                temperature: 1.0,
                n_steps: 10_000,
                interval: default_interval(),
                max_displacement: default_max_displacement(),
                seed: 0,
                convention: StepConvention::default(),
                energy: EnergyEvaluation::default(),
            },
            output: OutputConfig::default(),
        }
    }
}

impl McConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_yaml(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_yml::to_string(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, content).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.output.report_interval == 0 {
            return Err(Error::invalid("report interval must be positive"));
        }
        if self.output.dump_file.trim().is_empty() {
            return Err(Error::invalid("dump file name must not be empty"));
        }
        self.to_params().validate()
    }

    pub fn to_params(&self) -> SimulationParams {
        SimulationParams {
            n_particles: self.system.n_particles,
            n_steps: self.simulation.n_steps,
            temperature: self.simulation.temperature,
            box_size: self.system.box_size,
            interval: self.simulation.interval,
            max_displacement: self.simulation.max_displacement,
            seed: self.simulation.seed,
            convention: self.simulation.convention,
            energy: self.simulation.energy,
        }
    }
}
