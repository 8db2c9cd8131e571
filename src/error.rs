use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the Monte Carlo engine.
///
/// Configuration problems are reported where the value is set, never in the
/// middle of a run. A failed operation leaves the simulation state as it was.
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected configuration value (box size, temperature, interval, ...).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Particle index outside `[0, len)`.
    #[error("particle index {index} out of range for {len} particles")]
    IndexOutOfRange { index: usize, len: usize },

    /// `step`/`run_*` called before `initialize`.
    #[error("simulation has not been initialized")]
    NotInitialized,

    /// Trial moves need at least one particle.
    #[error("cannot perform a trial move on an empty system")]
    EmptySystem,

    /// Trajectory file could not be opened or written.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed trajectory dump.
    #[error("dump parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// YAML configuration could not be read or written.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }
}
