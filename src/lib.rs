pub mod config;
pub mod error;
pub mod metropolis;
pub mod particle;
pub mod sim_box;
pub mod simulation;
pub mod trajectory;
pub mod view;

pub use config::McConfig;
pub use error::{Error, Result};
pub use metropolis::{metropolis_accept, MoveStatistics};
pub use particle::Particle;
pub use sim_box::{lennard_jones, SimBox};
pub use simulation::{
    EnergyEvaluation, Proposal, Simulation, SimulationParams, SimulationState, StepConvention,
    StepOutcome,
};
pub use trajectory::{parse_dump, read_dump, write_dump, DumpFrame, History, Snapshot};
pub use view::BoxView;
